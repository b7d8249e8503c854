//! Config loading and override integration tests

use std::io::Write;

use surety_node::NodeConfig;

#[test]
fn test_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = NodeConfig::load(dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.simulation.oracles, 20);
    assert_eq!(config.ledger.oracles.min_responses, 3);
}

#[test]
fn test_partial_file_keeps_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[ledger.oracles]
min_responses = 2

[ledger.genesis]
first_airline = "gol"

[simulation]
oracles = 12
entropy_seed = "{}"
"#,
        "0f".repeat(32)
    )
    .unwrap();

    let config = NodeConfig::load(file.path()).unwrap();
    assert_eq!(config.ledger.oracles.min_responses, 2);
    assert_eq!(config.ledger.oracles.index_range, 10);
    assert_eq!(config.ledger.genesis.first_airline.as_str(), "gol");
    assert_eq!(config.simulation.oracles, 12);
    assert_eq!(config.simulation.passengers, 4);
    assert_eq!(config.simulation.entropy_seed.as_deref(), Some("0f".repeat(32).as_str()));
}

#[test]
fn test_invalid_ledger_section_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[ledger.oracles]
indexes_per_oracle = 5
index_range = 4
"#
    )
    .unwrap();
    assert!(NodeConfig::load(file.path()).is_err());
}

#[test]
fn test_show_config_roundtrip() {
    let config = NodeConfig::default();
    let rendered = toml::to_string_pretty(&config).unwrap();
    let parsed: NodeConfig = toml::from_str(&rendered).unwrap();
    assert_eq!(parsed.simulation.premium, config.simulation.premium);
    assert_eq!(parsed.ledger.genesis.owner, config.ledger.genesis.owner);
}
