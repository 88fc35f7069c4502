//! Receipt extractor
//!
//! Decodes the identifier a step produced from the event logs of its
//! confirmed receipt. Ids are read from `topic[1]` of the step's event.

use alloy_primitives::{B256, U256};
use serde::{Deserialize, Serialize};

use crate::chain::receipt::{Log, TransactionReceipt};
use crate::contracts::abi::{self, EventAbi};
use crate::contracts::registry::ContractKind;
use crate::types::{decimal, WizardStep};

/// Topic position holding the emitted id
const ID_TOPIC: usize = 1;

/// Identifier(s) produced by a confirmed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", content = "id", rename_all = "snake_case")]
pub enum ExtractedId {
    Escrow(#[serde(with = "decimal")] U256),
    Registry(#[serde(with = "decimal")] U256),
    /// Study id echoed by `StudyCriteriaSet`
    Criteria(#[serde(with = "decimal")] U256),
    Milestones(#[serde(with = "decimal::vec")] Vec<U256>),
}

impl ExtractedId {
    pub fn step(&self) -> WizardStep {
        match self {
            ExtractedId::Escrow(_) => WizardStep::Escrow,
            ExtractedId::Registry(_) => WizardStep::Registry,
            ExtractedId::Criteria(_) => WizardStep::Criteria,
            ExtractedId::Milestones(_) => WizardStep::Milestones,
        }
    }

    /// All ids carried, in log order
    pub fn ids(&self) -> Vec<U256> {
        match self {
            ExtractedId::Escrow(id) | ExtractedId::Registry(id) | ExtractedId::Criteria(id) => {
                vec![*id]
            }
            ExtractedId::Milestones(ids) => ids.clone(),
        }
    }

    /// The single id of a single-id step; the first milestone id otherwise
    pub fn primary(&self) -> Option<U256> {
        self.ids().first().copied()
    }

    /// Convert to database string representation (comma-separated decimals)
    pub fn to_db_string(&self) -> String {
        self.ids()
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse from database string for a given step
    pub fn from_db_string(step: WizardStep, s: &str) -> Result<Self, String> {
        let ids = s
            .split(',')
            .filter(|part| !part.is_empty())
            .map(crate::types::parse_u256)
            .collect::<Result<Vec<_>, _>>()?;

        let single = |ids: &[U256]| match ids {
            [id] => Ok(*id),
            _ => Err(format!("Expected one {} id, found {}", step, ids.len())),
        };

        match step {
            WizardStep::Escrow => Ok(ExtractedId::Escrow(single(&ids)?)),
            WizardStep::Registry => Ok(ExtractedId::Registry(single(&ids)?)),
            WizardStep::Criteria => Ok(ExtractedId::Criteria(single(&ids)?)),
            WizardStep::Milestones if ids.is_empty() => {
                Err("Expected at least one milestone id".to_string())
            }
            WizardStep::Milestones => Ok(ExtractedId::Milestones(ids)),
        }
    }
}

impl std::fmt::Display for ExtractedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractedId::Milestones(ids) => {
                let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
                write!(f, "[{}]", ids.join(", "))
            }
            other => f.write_str(&other.to_db_string()),
        }
    }
}

/// Receipt extraction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("Receipt has no logs")]
    NoLogs,

    #[error("Receipt has no log at index {index}")]
    MissingLog { index: usize },

    #[error("Log {log_index} has no topic {topic_index}")]
    MissingTopic { log_index: usize, topic_index: usize },

    #[error("Expected {expected} event, found topic {}", .found.map(|t| t.to_string()).unwrap_or_else(|| "<none>".to_string()))]
    UnexpectedEvent {
        expected: &'static str,
        found: Option<B256>,
    },

    #[error("Receipt contains no {event} events")]
    NoMatchingEvents { event: &'static str },

    #[error("Transaction reverted; nothing to extract")]
    Reverted,
}

/// Event emitted by a step's contract call
pub fn step_event(step: WizardStep) -> EventAbi {
    match step {
        WizardStep::Escrow => abi::ESCROW_CREATED,
        WizardStep::Registry => abi::STUDY_PUBLISHED,
        WizardStep::Criteria => abi::STUDY_CRITERIA_SET,
        WizardStep::Milestones => abi::MILESTONE_CREATED,
    }
}

/// Contract a step calls
pub fn step_contract(step: WizardStep) -> ContractKind {
    match step {
        WizardStep::Escrow | WizardStep::Milestones => ContractKind::StudyEscrow,
        WizardStep::Registry | WizardStep::Criteria => ContractKind::StudyRegistry,
    }
}

/// Extract a step's id(s) from its confirmed receipt
///
/// Single-id steps read the first log of the receipt. Its `topic[0]` must be
/// the keccak-256 hash of the step's event signature (see [`step_event`]);
/// a log carrying an id at `topic[1]` under any other signature is
/// [`ExtractionError::UnexpectedEvent`]. The milestones step collects every
/// `MilestoneCreated` log in order.
///
/// # Example
///
/// ```ignore
/// let id = extract_step_id(WizardStep::Escrow, &receipt)?;
/// assert_eq!(id, ExtractedId::Escrow(U256::from(42)));
/// ```
pub fn extract_step_id(
    step: WizardStep,
    receipt: &TransactionReceipt,
) -> Result<ExtractedId, ExtractionError> {
    if !receipt.succeeded() {
        return Err(ExtractionError::Reverted);
    }
    if receipt.logs.is_empty() {
        return Err(ExtractionError::NoLogs);
    }

    let event = step_event(step);

    match step {
        WizardStep::Escrow => Ok(ExtractedId::Escrow(single_id(receipt, &event)?)),
        WizardStep::Registry => Ok(ExtractedId::Registry(single_id(receipt, &event)?)),
        WizardStep::Criteria => Ok(ExtractedId::Criteria(single_id(receipt, &event)?)),
        WizardStep::Milestones => {
            let topic = event.topic();
            let ids = receipt
                .logs
                .iter()
                .enumerate()
                .filter(|(_, log)| log.topics.first() == Some(&topic))
                .map(|(index, log)| id_topic(log, index))
                .collect::<Result<Vec<_>, _>>()?;

            if ids.is_empty() {
                return Err(ExtractionError::NoMatchingEvents { event: event.name });
            }
            Ok(ExtractedId::Milestones(ids))
        }
    }
}

fn single_id(receipt: &TransactionReceipt, event: &EventAbi) -> Result<U256, ExtractionError> {
    let index = 0;
    let log = receipt
        .logs
        .get(index)
        .ok_or(ExtractionError::MissingLog { index })?;

    let found = log.topics.first().copied();
    if found != Some(event.topic()) {
        return Err(ExtractionError::UnexpectedEvent {
            expected: event.name,
            found,
        });
    }

    id_topic(log, index)
}

fn id_topic(log: &Log, log_index: usize) -> Result<U256, ExtractionError> {
    log.topics
        .get(ID_TOPIC)
        .map(|topic| U256::from_be_bytes(topic.0))
        .ok_or(ExtractionError::MissingTopic {
            log_index,
            topic_index: ID_TOPIC,
        })
}

/// Ids carried by every log of a step's event, in order
///
/// Used when re-reading historical logs, where the logs are not tied to a
/// single receipt.
pub fn ids_from_logs(step: WizardStep, logs: &[Log]) -> Vec<U256> {
    let topic = step_event(step).topic();
    logs.iter()
        .filter(|log| log.topics.first() == Some(&topic))
        .filter_map(|log| log.topics.get(ID_TOPIC))
        .map(|t| U256::from_be_bytes(t.0))
        .collect()
}
