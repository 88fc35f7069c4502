//! Tests for configuration loading, contract resolution and polling policy

use std::time::Duration;

use alloy_primitives::Address;
use study_wizard::chain::ConfirmationPolicy;
use study_wizard::config::{
    load_config, save_config, ConfigError, ConfigOverrides, GlobalConfig, NetworkType,
};
use study_wizard::contracts::{ContractKind, ContractRegistry};
use study_wizard::storage::file_system::{deployments_path, ensure_data_dir, index_db_path};

#[test]
fn test_missing_config_file_uses_network_defaults() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("config.json");

    let mut overrides = ConfigOverrides::new();
    overrides.network = Some(NetworkType::Sepolia);
    overrides.rpc_url = Some("http://sepolia.test:8545".to_string());

    let config = load_config(Some(&path), overrides).unwrap();

    assert_eq!(config.chain.network, NetworkType::Sepolia);
    assert_eq!(config.chain.chain_id, 11_155_111);
    assert_eq!(config.chain.rpc_url, "http://sepolia.test:8545");
    assert!(!path.exists(), "Loading must not create the file");
}

#[test]
fn test_saved_config_is_loaded_with_cli_overrides_on_top() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("nested").join("config.json");

    let mut config = GlobalConfig::for_network(NetworkType::Local);
    config.chain.rpc_url = "http://node.test:8545".to_string();
    config.confirmation.max_attempts = 5;
    save_config(&config, Some(&path)).unwrap();

    let mut overrides = ConfigOverrides::new();
    overrides.chain_id = Some(1337);
    overrides.escrow_address = Some(Address::repeat_byte(0x11));

    let loaded = load_config(Some(&path), overrides).unwrap();

    assert_eq!(loaded.chain.rpc_url, "http://node.test:8545");
    assert_eq!(loaded.chain.chain_id, 1337);
    assert_eq!(loaded.confirmation.max_attempts, 5);
    assert_eq!(
        loaded.deployments.get(&1337).and_then(|d| d.escrow),
        Some(Address::repeat_byte(0x11))
    );
}

#[test]
fn test_invalid_polling_policy_rejected() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("config.json");

    let mut config = GlobalConfig::default_local();
    config.confirmation.max_attempts = 0;
    save_config(&config, Some(&path)).unwrap();

    let result = load_config(Some(&path), ConfigOverrides::new());

    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_network_names() {
    assert_eq!("local".parse::<NetworkType>().unwrap(), NetworkType::Local);
    assert_eq!("Sepolia".parse::<NetworkType>().unwrap(), NetworkType::Sepolia);
    assert!(matches!(
        "regtest".parse::<NetworkType>(),
        Err(ConfigError::InvalidNetwork(_))
    ));
}

#[test]
fn test_overrides_merge_prefers_later_values() {
    let mut env = ConfigOverrides::new();
    env.rpc_url = Some("http://env".to_string());
    env.chain_id = Some(5);

    let mut cli = ConfigOverrides::new();
    cli.rpc_url = Some("http://cli".to_string());

    let merged = env.merge(cli);

    assert_eq!(merged.rpc_url.as_deref(), Some("http://cli"));
    assert_eq!(merged.chain_id, Some(5));
}

#[test]
fn test_backoff_grows_and_caps() {
    let policy = GlobalConfig::default_local().confirmation.to_policy();

    assert_eq!(policy.delay_before(1), Duration::ZERO);
    assert_eq!(policy.delay_before(2), Duration::from_secs(2));
    assert_eq!(policy.delay_before(3), Duration::from_secs(4));
    assert_eq!(policy.delay_before(5), Duration::from_secs(16));
    assert_eq!(policy.delay_before(6), Duration::from_secs(30));
    assert_eq!(policy.delay_before(20), Duration::from_secs(30));
    assert_eq!(policy.max_attempts, 20);

    let immediate = ConfirmationPolicy::immediate(3);
    assert_eq!(immediate.delay_before(3), Duration::ZERO);
}

#[test]
fn test_deployments_file_overrides_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    let data_dir = temp_dir.path().to_str().unwrap();
    let path = deployments_path(Some(data_dir)).unwrap();
    std::fs::write(
        &path,
        r#"{ "31337": { "escrow": "0x2222222222222222222222222222222222222222", "registry": null } }"#,
    )
    .unwrap();

    let mut config = GlobalConfig::default_local();
    config.deployments.entry(1).or_default().registry = Some(Address::repeat_byte(0x33));

    let registry = ContractRegistry::from_config(&config).load_file(&path).unwrap();

    assert_eq!(
        registry.resolve(ContractKind::StudyEscrow, 31337).unwrap().address,
        Address::repeat_byte(0x22)
    );
    assert!(registry.resolve(ContractKind::StudyRegistry, 31337).is_err());
    assert_eq!(
        registry.resolve(ContractKind::StudyRegistry, 1).unwrap().address,
        Address::repeat_byte(0x33)
    );
}

#[test]
fn test_missing_deployments_file_is_not_an_error() {
    let temp_dir = tempfile::tempdir().unwrap();

    let registry = ContractRegistry::new()
        .load_file(&temp_dir.path().join("deployments.json"))
        .unwrap();

    assert!(registry.resolve(ContractKind::StudyEscrow, 31337).is_err());
}

#[test]
fn test_data_dir_layout() {
    let temp_dir = tempfile::tempdir().unwrap();
    let custom = temp_dir.path().join("data");
    let custom = custom.to_str().unwrap();

    let dir = ensure_data_dir(Some(custom)).unwrap();

    assert!(dir.is_dir());
    assert_eq!(
        index_db_path(Some(custom)).unwrap(),
        dir.join("study_index.db")
    );
}
