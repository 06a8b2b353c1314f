//! Tests for Config module

use ocr_config::{Config, ConfigError, LocalConfig, LoggingConfig, SharedConfig};
use ocr_types::OracleIdentity;

fn oracle(i: u8) -> OracleIdentity {
    OracleIdentity {
        onchain_public_key: vec![i; 20],
        offchain_public_key: vec![i; 33],
        peer_id: format!("peer-{}", i),
        transmit_account: format!("0x{:040x}", i),
    }
}

fn committee(n: u8, f: usize) -> SharedConfig {
    SharedConfig::default().with_oracles((0..n).map(oracle).collect(), f)
}

#[test]
fn test_default_shared_config_needs_committee() {
    assert!(matches!(
        SharedConfig::default().validate(),
        Err(ConfigError::InvalidCommitteeSize { n: 0, .. })
    ));
    assert!(committee(4, 1).validate().is_ok());
}

#[test]
fn test_quorums() {
    let config = committee(4, 1);
    assert_eq!(config.observation_quorum(), 3);
    assert_eq!(config.report_quorum(true), 3);
    assert_eq!(config.report_quorum(false), 2);

    let config = committee(7, 2);
    assert_eq!(config.observation_quorum(), 5);
    assert_eq!(config.report_quorum(true), 5);
    assert_eq!(config.report_quorum(false), 3);

    let config = committee(10, 3);
    assert_eq!(config.report_quorum(true), 7);
}

#[test]
fn test_too_many_faults_rejected() {
    assert!(matches!(
        committee(3, 1).validate(),
        Err(ConfigError::InvalidFaultTolerance { n: 3, f: 1 })
    ));
    assert!(matches!(
        committee(4, 0).validate(),
        Err(ConfigError::InvalidFaultTolerance { n: 4, f: 0 })
    ));
}

#[test]
fn test_too_many_oracles_rejected() {
    assert!(matches!(
        committee(32, 10).validate(),
        Err(ConfigError::InvalidCommitteeSize { n: 32, max: 31 })
    ));
}

#[test]
fn test_invalid_r_max() {
    let mut config = committee(4, 1);
    config.r_max = 0;
    assert!(matches!(config.validate(), Err(ConfigError::InvalidRMax(0))));
    config.r_max = 255;
    assert!(matches!(config.validate(), Err(ConfigError::InvalidRMax(255))));
}

#[test]
fn test_grace_must_be_shorter_than_round() {
    let mut config = committee(4, 1);
    config.delta_grace_ms = config.delta_round_ms;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidTimeoutOrdering(_))
    ));
}

#[test]
fn test_zero_timeout_rejected() {
    let mut config = committee(4, 1);
    config.delta_resend_ms = 0;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidTimeout {
            name: "delta_resend_ms",
            value: 0
        })
    ));
}

#[test]
fn test_schedule_validation() {
    let config = committee(4, 1).with_schedule(vec![]);
    assert!(matches!(config.validate(), Err(ConfigError::InvalidSchedule(_))));

    let config = committee(4, 1).with_schedule(vec![0, 0]);
    assert!(matches!(config.validate(), Err(ConfigError::InvalidSchedule(_))));
}

#[test]
fn test_duplicate_peer_rejected() {
    let mut config = committee(4, 1);
    config.oracles[2].peer_id = config.oracles[1].peer_id.clone();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::DuplicateOracle {
            field: "peer_id",
            ..
        })
    ));
}

#[test]
fn test_local_and_logging_validation() {
    let mut local = LocalConfig::default();
    assert!(local.validate().is_ok());
    local.persistence_capacity = 0;
    assert!(matches!(
        local.validate(),
        Err(ConfigError::InvalidCapacity("persistence_capacity"))
    ));

    let logging = LoggingConfig {
        level: "loud".to_string(),
        format: "pretty".to_string(),
    };
    assert!(matches!(
        logging.validate(),
        Err(ConfigError::InvalidLogLevel(_))
    ));
}

#[test]
fn test_save_and_load_roundtrip() {
    let config = Config {
        shared: committee(4, 1).fast(),
        ..Default::default()
    };
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ocr.toml");
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.shared, config.shared);
    assert_eq!(loaded.local, config.local);
}

#[test]
fn test_from_str_defaults_optional_sections() {
    let toml = r#"
[shared]
config_digest = "0x0101010101010101010101010101010101010101010101010101010101010101"
f = 1
r_max = 5
delta_progress_ms = 2000
delta_resend_ms = 500
delta_round_ms = 300
delta_grace_ms = 50
delta_stage_ms = 200
s = [1, 2]
leader_selection_key = "0x0000000000000000000000000000000000000000000000000000000000000001"
transmission_order_key = "0x0000000000000000000000000000000000000000000000000000000000000002"

[[shared.oracles]]
onchain_public_key = "0x00"
offchain_public_key = "0x00"
peer_id = "a"
transmit_account = "a"

[[shared.oracles]]
onchain_public_key = "0x01"
offchain_public_key = "0x01"
peer_id = "b"
transmit_account = "b"

[[shared.oracles]]
onchain_public_key = "0x02"
offchain_public_key = "0x02"
peer_id = "c"
transmit_account = "c"

[[shared.oracles]]
onchain_public_key = "0x03"
offchain_public_key = "0x03"
peer_id = "d"
transmit_account = "d"
"#;
    let config = Config::from_str(toml).unwrap();
    assert_eq!(config.shared.n(), 4);
    assert_eq!(config.shared.max_duration_report_ms, 1000);
    assert_eq!(config.local, LocalConfig::default());
    assert_eq!(config.shared.transmission_order_key[31], 2);
}
