//! Core domain models
//!
//! This module defines the CI descriptor, the build matrix, and the jobs
//! and commands resolved from them.

pub mod build;
pub mod command;
pub mod config;
pub mod context;
pub mod job;
pub mod matrix;
pub mod phase;
pub mod plan;
pub mod state;

pub use build::*;
pub use command::*;
pub use context::*;
pub use job::*;
pub use phase::*;
pub use plan::*;
pub use state::*;
