//! Scenario-based tests for cirun

mod channel_gating;
mod descriptor_roundtrip;
mod environment;
mod failure_semantics;
mod matrix_behavior;
