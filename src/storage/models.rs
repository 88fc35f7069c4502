//! Storage data models
//!
//! Rows of the off-chain study index: sessions, step attempts, recorded
//! (confirmed) steps, and the per-study index entry.

use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::contracts::{ExtractedId, StepInput};
use crate::storage::index_storage::StorageError;
use crate::types::{decimal, FailureKind, WizardStep};

/// A wizard session row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,

    /// Wallet that started the session; the only party allowed to advance it
    pub owner: Address,

    pub chain_id: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persisted status of a step attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Broadcast, not yet confirmed
    AwaitingConfirmation,
    Confirmed,
    Failed,
}

impl AttemptStatus {
    /// Convert to database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            AttemptStatus::AwaitingConfirmation => "awaiting_confirmation",
            AttemptStatus::Confirmed => "confirmed",
            AttemptStatus::Failed => "failed",
        }
    }

    /// Parse from database string
    pub fn from_db_string(s: &str) -> Result<Self, StorageError> {
        match s {
            "awaiting_confirmation" => Ok(AttemptStatus::AwaitingConfirmation),
            "confirmed" => Ok(AttemptStatus::Confirmed),
            "failed" => Ok(AttemptStatus::Failed),
            _ => Err(StorageError::InvalidData(format!(
                "Invalid attempt status: {}",
                s
            ))),
        }
    }
}

/// One broadcast or failure of a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepAttempt {
    /// Database ID
    pub id: i64,

    pub session_id: Uuid,
    pub step: WizardStep,

    /// 1-based, per session and step
    pub attempt_no: u32,

    pub status: AttemptStatus,
    pub tx_hash: Option<B256>,
    pub input: Option<StepInput>,

    /// Error message (if status is Failed)
    pub error: Option<String>,
    pub failure_kind: Option<FailureKind>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A confirmed step, ready to be indexed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepConfirmation {
    pub step: WizardStep,
    pub tx_hash: B256,
    pub extracted_id: ExtractedId,
    pub block_number: u64,

    /// Input the transaction was built from; carries title and funding
    pub input: Option<StepInput>,
}

/// A step recorded in the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedStep {
    pub session_id: Uuid,
    pub step: WizardStep,
    pub tx_hash: B256,
    pub extracted_id: ExtractedId,
    pub block_number: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Outcome of `record_step`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexResult {
    pub entry: StudyIndexEntry,
    pub recorded: RecordedStep,

    /// True when the same `(step, tx_hash)` was already in the index
    pub already_recorded: bool,
}

/// Lifecycle status of an indexed study
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyStatus {
    Draft,
    EscrowCreated,
    Published,
    CriteriaSet,
    Active,
}

impl StudyStatus {
    /// Status once `step` is recorded
    pub fn after(step: WizardStep) -> Self {
        match step {
            WizardStep::Escrow => StudyStatus::EscrowCreated,
            WizardStep::Registry => StudyStatus::Published,
            WizardStep::Criteria => StudyStatus::CriteriaSet,
            WizardStep::Milestones => StudyStatus::Active,
        }
    }

    /// Convert to database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            StudyStatus::Draft => "draft",
            StudyStatus::EscrowCreated => "escrow_created",
            StudyStatus::Published => "published",
            StudyStatus::CriteriaSet => "criteria_set",
            StudyStatus::Active => "active",
        }
    }

    /// Parse from database string
    pub fn from_db_string(s: &str) -> Result<Self, StorageError> {
        match s {
            "draft" => Ok(StudyStatus::Draft),
            "escrow_created" => Ok(StudyStatus::EscrowCreated),
            "published" => Ok(StudyStatus::Published),
            "criteria_set" => Ok(StudyStatus::CriteriaSet),
            "active" => Ok(StudyStatus::Active),
            _ => Err(StorageError::InvalidData(format!(
                "Invalid study status: {}",
                s
            ))),
        }
    }
}

impl std::fmt::Display for StudyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Off-chain index entry for one study
///
/// Identified by `(registry_id, escrow_id, chain_id)` once complete; keyed by
/// session until then.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyIndexEntry {
    pub session_id: Uuid,
    pub chain_id: u64,
    pub researcher_address: Address,

    pub title: Option<String>,
    pub description: Option<String>,

    #[serde(with = "decimal::option")]
    pub total_funding: Option<U256>,

    #[serde(with = "decimal::option")]
    pub escrow_id: Option<U256>,
    pub escrow_tx_hash: Option<B256>,
    pub escrow_block_number: Option<u64>,

    #[serde(with = "decimal::option")]
    pub registry_id: Option<U256>,
    pub registry_tx_hash: Option<B256>,
    pub registry_block_number: Option<u64>,

    pub criteria_tx_hash: Option<B256>,
    pub criteria_block_number: Option<u64>,

    #[serde(with = "decimal::vec")]
    pub milestone_ids: Vec<U256>,
    pub milestones_tx_hash: Option<B256>,
    pub milestones_block_number: Option<u64>,

    pub status: StudyStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudyIndexEntry {
    /// Whether the composite identity is fully known
    pub fn is_complete(&self) -> bool {
        self.registry_id.is_some() && self.escrow_id.is_some()
    }

    /// Block a step was recorded at
    pub fn block_number(&self, step: WizardStep) -> Option<u64> {
        match step {
            WizardStep::Escrow => self.escrow_block_number,
            WizardStep::Registry => self.registry_block_number,
            WizardStep::Criteria => self.criteria_block_number,
            WizardStep::Milestones => self.milestones_block_number,
        }
    }

    /// Transaction a step was recorded with
    pub fn tx_hash(&self, step: WizardStep) -> Option<B256> {
        match step {
            WizardStep::Escrow => self.escrow_tx_hash,
            WizardStep::Registry => self.registry_tx_hash,
            WizardStep::Criteria => self.criteria_tx_hash,
            WizardStep::Milestones => self.milestones_tx_hash,
        }
    }

    /// Whether the step's id is recorded
    pub fn has_step(&self, step: WizardStep) -> bool {
        self.tx_hash(step).is_some()
    }
}

/// Everything needed to rebuild a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session: SessionRecord,

    /// Confirmed steps in wizard order
    pub recorded: Vec<RecordedStep>,

    /// Latest attempt per step, for steps that have any
    pub latest_attempts: Vec<StepAttempt>,

    pub entry: Option<StudyIndexEntry>,
}

/// Row of `list_sessions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session: SessionRecord,
    pub title: Option<String>,
    pub status: StudyStatus,
}
