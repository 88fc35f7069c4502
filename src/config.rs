//! Configuration types for study-wizard
//!
//! Manages global configuration including chain selection, the JSON-RPC
//! endpoint, contract deployments, and the confirmation polling policy.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::chain::ConfirmationPolicy;

/// Global wizard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub chain: ChainConfig,

    /// Confirmation polling policy
    #[serde(default)]
    pub confirmation: ConfirmationConfig,

    /// Deployed contract addresses keyed by chain id
    #[serde(default)]
    pub deployments: BTreeMap<u64, Deployments>,

    /// Optional custom data directory (index database lives here)
    pub data_dir: Option<String>,
}

/// Chain connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub network: NetworkType,
    pub chain_id: u64,
    pub rpc_url: String,

    /// Per-request timeout for JSON-RPC calls
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Contract addresses on one chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployments {
    /// StudyEscrow contract
    pub escrow: Option<Address>,

    /// StudyRegistry contract
    pub registry: Option<Address>,
}

/// Bounded exponential backoff for confirmation polling
///
/// With the defaults a transaction gets roughly eight minutes to be mined
/// before the wizard reports it as still pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 2_000,
            max_interval_ms: 30_000,
            multiplier: 2.0,
            max_attempts: 20,
        }
    }
}

impl ConfirmationConfig {
    /// Convert to the runtime polling policy
    pub fn to_policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            initial_interval: Duration::from_millis(self.initial_interval_ms),
            max_interval: Duration::from_millis(self.max_interval_ms),
            multiplier: self.multiplier,
            max_attempts: self.max_attempts,
        }
    }
}

/// Supported networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// Local development node (anvil / hardhat)
    Local,
    Sepolia,
    Mainnet,
}

impl NetworkType {
    /// EIP-155 chain id
    pub fn chain_id(self) -> u64 {
        match self {
            NetworkType::Local => 31337,
            NetworkType::Sepolia => 11_155_111,
            NetworkType::Mainnet => 1,
        }
    }

    /// Default public JSON-RPC endpoint
    pub fn default_rpc_url(self) -> &'static str {
        match self {
            NetworkType::Local => "http://localhost:8545",
            NetworkType::Sepolia => "https://ethereum-sepolia-rpc.publicnode.com",
            NetworkType::Mainnet => "https://ethereum-rpc.publicnode.com",
        }
    }
}

impl FromStr for NetworkType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "anvil" => Ok(NetworkType::Local),
            "sepolia" => Ok(NetworkType::Sepolia),
            "mainnet" => Ok(NetworkType::Mainnet),
            _ => Err(ConfigError::InvalidNetwork(s.to_string())),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl GlobalConfig {
    /// Create default configuration for a network
    pub fn for_network(network: NetworkType) -> Self {
        Self {
            chain: ChainConfig {
                network,
                chain_id: network.chain_id(),
                rpc_url: network.default_rpc_url().to_string(),
                request_timeout_secs: default_request_timeout_secs(),
            },
            confirmation: ConfirmationConfig::default(),
            deployments: BTreeMap::new(),
            data_dir: None,
        }
    }

    /// Create default configuration for a local development node
    pub fn default_local() -> Self {
        Self::for_network(NetworkType::Local)
    }

    /// Deployments for the configured chain
    pub fn active_deployments(&self) -> Option<&Deployments> {
        self.deployments.get(&self.chain.chain_id)
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self::default_local()
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid network: {0}")]
    InvalidNetwork(String),

    #[error("Config directory not found")]
    DirectoryNotFound,
}

/// Configuration overrides from CLI arguments or environment variables
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub network: Option<NetworkType>,
    pub chain_id: Option<u64>,
    pub rpc_url: Option<String>,
    pub data_dir: Option<String>,
    pub escrow_address: Option<Address>,
    pub registry_address: Option<Address>,
}

impl ConfigOverrides {
    /// Create empty overrides
    pub fn new() -> Self {
        Self::default()
    }

    /// Create overrides from environment variables
    ///
    /// Unparseable values are ignored with a warning rather than failing the load.
    pub fn from_env() -> Self {
        Self {
            network: env_parsed("STUDY_WIZARD_NETWORK"),
            chain_id: env_parsed("CHAIN_ID"),
            rpc_url: std::env::var("RPC_URL").ok(),
            data_dir: std::env::var("STUDY_WIZARD_DATA_DIR").ok(),
            escrow_address: env_parsed("ESCROW_ADDRESS"),
            registry_address: env_parsed("REGISTRY_ADDRESS"),
        }
    }

    /// Merge with another set of overrides (other takes precedence)
    pub fn merge(mut self, other: Self) -> Self {
        if other.network.is_some() {
            self.network = other.network;
        }
        if other.chain_id.is_some() {
            self.chain_id = other.chain_id;
        }
        if other.rpc_url.is_some() {
            self.rpc_url = other.rpc_url;
        }
        if other.data_dir.is_some() {
            self.data_dir = other.data_dir;
        }
        if other.escrow_address.is_some() {
            self.escrow_address = other.escrow_address;
        }
        if other.registry_address.is_some() {
            self.registry_address = other.registry_address;
        }
        self
    }
}

fn env_parsed<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring invalid value for {}: {}", name, raw);
            None
        }
    }
}

/// Get the default configuration directory path
///
/// Returns: `~/.study-wizard/`
pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(".study-wizard"))
        .ok_or(ConfigError::DirectoryNotFound)
}

/// Get the default configuration file path
///
/// Returns: `~/.study-wizard/config.json`
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(default_config_dir()?.join("config.json"))
}

/// Load configuration from file with overrides
///
/// # Priority (highest to lowest):
/// 1. CLI overrides (passed as argument)
/// 2. Environment variables
/// 3. Config file
/// 4. Network defaults
///
/// # Example
///
/// ```ignore
/// use study_wizard::config::{load_config, ConfigOverrides, NetworkType};
///
/// let mut cli_overrides = ConfigOverrides::new();
/// cli_overrides.network = Some(NetworkType::Sepolia);
///
/// let config = load_config(None, cli_overrides)?;
/// ```
pub fn load_config(
    config_path: Option<&Path>,
    cli_overrides: ConfigOverrides,
) -> Result<GlobalConfig, ConfigError> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    let mut config = if path.exists() {
        let contents = std::fs::read_to_string(&path)?;
        serde_json::from_str(&contents)?
    } else {
        let network = cli_overrides.network.unwrap_or(NetworkType::Local);
        GlobalConfig::for_network(network)
    };

    let overrides = ConfigOverrides::from_env().merge(cli_overrides);
    apply_overrides(&mut config, overrides);

    validate(&config)?;

    Ok(config)
}

/// Save configuration to file
///
/// Creates parent directories if they don't exist.
pub fn save_config(config: &GlobalConfig, config_path: Option<&Path>) -> Result<(), ConfigError> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json)?;

    Ok(())
}

/// Apply configuration overrides (internal helper)
fn apply_overrides(config: &mut GlobalConfig, overrides: ConfigOverrides) {
    // Switching network resets chain id and endpoint unless those are overridden too
    if let Some(network) = overrides.network {
        if config.chain.network != network {
            config.chain.network = network;
            config.chain.chain_id = network.chain_id();
            config.chain.rpc_url = network.default_rpc_url().to_string();
        }
    }

    if let Some(chain_id) = overrides.chain_id {
        config.chain.chain_id = chain_id;
    }

    if let Some(url) = overrides.rpc_url {
        config.chain.rpc_url = url;
    }

    if let Some(data_dir) = overrides.data_dir {
        config.data_dir = Some(data_dir);
    }

    if overrides.escrow_address.is_some() || overrides.registry_address.is_some() {
        let deployments = config
            .deployments
            .entry(config.chain.chain_id)
            .or_default();
        if let Some(escrow) = overrides.escrow_address {
            deployments.escrow = Some(escrow);
        }
        if let Some(registry) = overrides.registry_address {
            deployments.registry = Some(registry);
        }
    }
}

fn validate(config: &GlobalConfig) -> Result<(), ConfigError> {
    if config.chain.rpc_url.trim().is_empty() {
        return Err(ConfigError::Invalid("rpc_url must not be empty".to_string()));
    }
    let c = &config.confirmation;
    if c.max_attempts == 0 {
        return Err(ConfigError::Invalid(
            "confirmation.max_attempts must be at least 1".to_string(),
        ));
    }
    if c.multiplier < 1.0 {
        return Err(ConfigError::Invalid(
            "confirmation.multiplier must be >= 1.0".to_string(),
        ));
    }
    if c.max_interval_ms < c.initial_interval_ms {
        return Err(ConfigError::Invalid(
            "confirmation.max_interval_ms must be >= initial_interval_ms".to_string(),
        ));
    }
    Ok(())
}
