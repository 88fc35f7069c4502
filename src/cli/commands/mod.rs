//! CLI command implementations

pub mod audit;
pub mod config;
pub mod output;
pub mod session;
pub mod step;
pub mod study;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use alloy_primitives::{Address, B256};
use uuid::Uuid;

use crate::audit::AuditError;
use crate::chain::{JsonRpcClient, NetworkError};
use crate::config::{load_config, ConfigError, ConfigOverrides, GlobalConfig};
use crate::contracts::{ConfigurationError, ContractRegistry, StepInput, TransactionBuilder};
use crate::orchestrator::{WizardError, WizardOrchestrator};
use crate::storage::file_system::{deployments_path, ensure_data_dir, FileSystemError};
use crate::storage::{IndexError, StepIndexer, StorageError};
use crate::types::OutputFormat;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("File system error: {0}")]
    FileSystem(#[from] FileSystemError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("{0}")]
    Wizard(#[from] WizardError),

    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Global options shared by every command
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    pub config_path: Option<PathBuf>,
    pub overrides: ConfigOverrides,
    pub format: OutputFormat,
}

impl CommandContext {
    pub fn load_config(&self) -> Result<GlobalConfig, CommandError> {
        Ok(load_config(
            self.config_path.as_deref(),
            self.overrides.clone(),
        )?)
    }

    /// Open the index in the configured data directory
    pub fn open_indexer(&self, config: &GlobalConfig) -> Result<StepIndexer, CommandError> {
        let dir = ensure_data_dir(config.data_dir.as_deref())?;
        Ok(StepIndexer::new(dir)?)
    }

    /// Contract registry from config plus the data directory's deployments file
    pub fn contract_registry(&self, config: &GlobalConfig) -> Result<ContractRegistry, CommandError> {
        let path = deployments_path(config.data_dir.as_deref())?;
        Ok(ContractRegistry::from_config(config).load_file(&path)?)
    }

    /// Orchestrator wired to the configured chain and index
    pub fn orchestrator(
        &self,
    ) -> Result<(GlobalConfig, WizardOrchestrator<JsonRpcClient>), CommandError> {
        let config = self.load_config()?;
        let indexer = self.open_indexer(&config)?;
        let builder = TransactionBuilder::new(self.contract_registry(&config)?);
        let client = JsonRpcClient::from_config(&config.chain)?;
        let policy = config.confirmation.to_policy();

        log::debug!(
            "Using chain {} via {}",
            config.chain.chain_id,
            config.chain.rpc_url
        );

        let orchestrator = WizardOrchestrator::new(indexer, builder, client, policy);
        Ok((config, orchestrator))
    }
}

pub(crate) fn parse_session_id(s: &str) -> Result<Uuid, CommandError> {
    Uuid::parse_str(s.trim())
        .map_err(|e| CommandError::InvalidArgument(format!("Invalid session id '{}': {}", s, e)))
}

pub(crate) fn parse_address(s: &str) -> Result<Address, CommandError> {
    Address::from_str(s.trim())
        .map_err(|e| CommandError::InvalidArgument(format!("Invalid address '{}': {}", s, e)))
}

pub(crate) fn parse_tx_hash(s: &str) -> Result<B256, CommandError> {
    B256::from_str(s.trim()).map_err(|e| {
        CommandError::InvalidArgument(format!("Invalid transaction hash '{}': {}", s, e))
    })
}

/// Read a step input JSON file
pub(crate) fn read_step_input(path: &Path) -> Result<StepInput, CommandError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
