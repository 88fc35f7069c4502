//! Contract registry
//!
//! Maps `(contract kind, chain id)` to a deployed address. Deployments come
//! from the config file and, when present, a `deployments.json` in the data
//! directory; the file wins for any chain it lists.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::{Deployments, GlobalConfig};

/// The two external contracts the wizard talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractKind {
    StudyEscrow,
    StudyRegistry,
}

impl std::fmt::Display for ContractKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContractKind::StudyEscrow => write!(f, "StudyEscrow"),
            ContractKind::StudyRegistry => write!(f, "StudyRegistry"),
        }
    }
}

/// A resolved deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedContract {
    pub kind: ContractKind,
    pub chain_id: u64,
    pub address: Address,
}

/// Contract resolution errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("{contract} is not deployed on chain {chain_id}")]
    NotDeployed { contract: ContractKind, chain_id: u64 },

    #[error("Failed to read deployments file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid deployments file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Deployed contract addresses for every known chain
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    deployments: BTreeMap<u64, Deployments>,
}

impl ContractRegistry {
    /// Empty registry; every lookup fails with `NotDeployed`
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded from the config's `deployments` table
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            deployments: config.deployments.clone(),
        }
    }

    /// Merge a `deployments.json` file (`{ "<chain id>": { "escrow": .., "registry": .. } }`)
    ///
    /// A missing file is not an error.
    pub fn load_file(mut self, path: &Path) -> Result<Self, ConfigurationError> {
        if !path.exists() {
            return Ok(self);
        }
        let contents = std::fs::read_to_string(path)?;
        let file: BTreeMap<u64, Deployments> = serde_json::from_str(&contents)?;
        log::debug!(
            "Loaded deployments for {} chain(s) from {}",
            file.len(),
            path.display()
        );
        self.deployments.extend(file);
        Ok(self)
    }

    /// Builder-style registration, mostly for tests
    pub fn with_deployment(mut self, chain_id: u64, kind: ContractKind, address: Address) -> Self {
        let entry = self.deployments.entry(chain_id).or_default();
        match kind {
            ContractKind::StudyEscrow => entry.escrow = Some(address),
            ContractKind::StudyRegistry => entry.registry = Some(address),
        }
        self
    }

    /// Resolve a contract on a chain
    pub fn resolve(
        &self,
        kind: ContractKind,
        chain_id: u64,
    ) -> Result<DeployedContract, ConfigurationError> {
        let address = self
            .deployments
            .get(&chain_id)
            .and_then(|d| match kind {
                ContractKind::StudyEscrow => d.escrow,
                ContractKind::StudyRegistry => d.registry,
            })
            .ok_or(ConfigurationError::NotDeployed {
                contract: kind,
                chain_id,
            })?;

        Ok(DeployedContract {
            kind,
            chain_id,
            address,
        })
    }
}
