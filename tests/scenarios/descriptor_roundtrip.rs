//! Test: Descriptor Round-Trip - parse, emit and parse again

use crate::helpers::*;
use cirun::core::config::CiConfig;
use cirun::core::Phase;

#[test]
fn test_fixture_round_trip() {
    let config = CiConfig::from_yaml(FIXTURE).unwrap();
    let emitted = config.to_yaml().unwrap();
    let reparsed = CiConfig::from_yaml(&emitted).unwrap();

    assert_eq!(config, reparsed);
    assert_eq!(reparsed.channels(), vec!["stable", "nightly"]);
    assert_eq!(reparsed.phase_entries(Phase::Script).len(), 5);
}

#[test]
fn test_unknown_keys_survive_round_trip() {
    let yaml = r#"
language: rust
os: linux
dist: trusty
notifications:
  email: false
script: cargo test
"#;
    let config = CiConfig::from_yaml(yaml).unwrap();
    let reparsed = CiConfig::from_yaml(&config.to_yaml().unwrap()).unwrap();

    assert_eq!(config, reparsed);
    assert!(reparsed.extra.contains_key("notifications"));
    assert!(reparsed.extra.contains_key("dist"));
}

#[test]
fn test_fixture_file_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/travis.yml");
    let config = CiConfig::from_file(path).unwrap();
    assert_eq!(
        config.apt_packages(),
        ["libcurl4-openssl-dev", "libelf-dev", "libdw-dev"]
    );
    assert!(!config.requires_sudo());
}
