//! Index audit
//!
//! Re-reads the ledger for every recorded step of a session and compares
//! the emitted ids with what the index holds.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chain::{ChainReader, LogFilter, NetworkError};
use crate::contracts::extractor::{ids_from_logs, step_contract, step_event};
use crate::contracts::{ConfigurationError, ContractRegistry};
use crate::storage::{IndexError, StepIndexer};
use crate::types::{decimal, WizardStep};

/// Outcome of auditing one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// The recorded ids were emitted by the recorded transaction
    Consistent,

    /// No matching event was found at the recorded block
    Missing,

    /// Events were found but carry different ids
    Diverged,
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditStatus::Consistent => write!(f, "consistent"),
            AuditStatus::Missing => write!(f, "missing"),
            AuditStatus::Diverged => write!(f, "diverged"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepAudit {
    pub step: WizardStep,
    pub contract: Address,
    pub tx_hash: B256,
    pub block_number: u64,

    #[serde(with = "decimal::vec")]
    pub recorded_ids: Vec<U256>,

    #[serde(with = "decimal::vec")]
    pub onchain_ids: Vec<U256>,

    pub status: AuditStatus,
}

/// Audit errors
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
}

/// Audit every recorded step of a session against on-chain logs
///
/// # Example
///
/// ```ignore
/// for audit in audit_session(&indexer, &registry, &client, session_id).await? {
///     println!("{}: {}", audit.step, audit.status);
/// }
/// ```
pub async fn audit_session<R: ChainReader>(
    indexer: &StepIndexer,
    registry: &ContractRegistry,
    reader: &R,
    session_id: Uuid,
) -> Result<Vec<StepAudit>, AuditError> {
    let snapshot = indexer.load_session(session_id)?;
    let chain_id = snapshot.session.chain_id;

    let mut audits = Vec::with_capacity(snapshot.recorded.len());

    for recorded in &snapshot.recorded {
        let step = recorded.step;
        let contract = registry.resolve(step_contract(step), chain_id)?;
        let filter =
            LogFilter::at_block(contract.address, step_event(step).topic(), recorded.block_number);

        let logs: Vec<_> = reader
            .logs(&filter)
            .await?
            .into_iter()
            .filter(|log| {
                log.transaction_hash
                    .map_or(true, |hash| hash == recorded.tx_hash)
            })
            .collect();

        let onchain_ids = ids_from_logs(step, &logs);
        let recorded_ids = recorded.extracted_id.ids();

        let status = if onchain_ids.is_empty() {
            AuditStatus::Missing
        } else if ids_match(step, &recorded_ids, &onchain_ids) {
            AuditStatus::Consistent
        } else {
            AuditStatus::Diverged
        };

        if status != AuditStatus::Consistent {
            log::warn!(
                "Audit of {} for session {}: {} (recorded {:?}, on-chain {:?})",
                step,
                session_id,
                status,
                recorded_ids,
                onchain_ids
            );
        } else {
            log::debug!("Audit of {} for session {}: consistent", step, session_id);
        }

        audits.push(StepAudit {
            step,
            contract: contract.address,
            tx_hash: recorded.tx_hash,
            block_number: recorded.block_number,
            recorded_ids,
            onchain_ids,
            status,
        });
    }

    Ok(audits)
}

fn ids_match(step: WizardStep, recorded: &[U256], onchain: &[U256]) -> bool {
    match step {
        WizardStep::Milestones => recorded == onchain,
        _ => recorded.iter().all(|id| onchain.contains(id)),
    }
}
