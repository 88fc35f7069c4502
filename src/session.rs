//! Wizard session state
//!
//! A session holds one slot per wizard step. Each slot is an explicit
//! tagged state; the whole session can be rebuilt from the index.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::contracts::{ExtractedId, PriorIds, StepInput, UnsignedTransaction};
use crate::storage::{AttemptStatus, SessionSnapshot};
use crate::types::{decimal, FailureKind, StepStatus, WizardStep};

/// State of one step slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepState {
    NotStarted,

    /// Unsigned transaction handed to the wallet; not persisted
    Built {
        transaction: UnsignedTransaction,
        input: StepInput,
    },

    /// Broadcast, waiting to be mined
    AwaitingConfirmation { tx_hash: B256, input: StepInput },

    Confirmed {
        tx_hash: B256,
        extracted_id: ExtractedId,
        block_number: u64,
    },

    /// Retryable: building again starts a fresh attempt
    Failed {
        kind: FailureKind,
        reason: String,
        tx_hash: Option<B256>,
    },
}

impl StepState {
    pub fn status(&self) -> StepStatus {
        match self {
            StepState::NotStarted => StepStatus::NotStarted,
            StepState::Built { .. } => StepStatus::Built,
            StepState::AwaitingConfirmation { .. } => StepStatus::AwaitingConfirmation,
            StepState::Confirmed { .. } => StepStatus::Confirmed,
            StepState::Failed { .. } => StepStatus::Failed,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, StepState::Confirmed { .. })
    }
}

/// Session state errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Cannot build {step}: {dependency} is not confirmed")]
    DependencyNotConfirmed {
        step: WizardStep,
        dependency: WizardStep,
    },

    #[error("{step} transaction {tx_hash} is still awaiting confirmation")]
    StepInFlight { step: WizardStep, tx_hash: B256 },

    #[error("{0} is already confirmed")]
    AlreadyConfirmed(WizardStep),

    #[error("{step} is {status}, expected Built")]
    NotBuilt { step: WizardStep, status: StepStatus },

    #[error("No step has been built")]
    NothingBuilt,

    #[error("No transaction is awaiting confirmation")]
    NothingInFlight,

    #[error("Cannot abandon {step} once it is {status}")]
    CannotAbandon { step: WizardStep, status: StepStatus },

    #[error("Inconsistent session record: {0}")]
    Malformed(String),
}

/// A study-creation wizard session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardSession {
    pub id: Uuid,

    /// The only wallet allowed to advance this session
    pub owner: Address,

    pub chain_id: u64,

    /// Slots in wizard order: escrow, registry, criteria, milestones
    steps: [StepState; 4],

    /// Funding declared at the escrow step, known once escrow is confirmed
    #[serde(with = "decimal::option")]
    pub total_funding: Option<U256>,
}

impl WizardSession {
    /// Fresh session with every step NotStarted
    pub fn new(id: Uuid, owner: Address, chain_id: u64) -> Self {
        Self {
            id,
            owner,
            chain_id,
            steps: [
                StepState::NotStarted,
                StepState::NotStarted,
                StepState::NotStarted,
                StepState::NotStarted,
            ],
            total_funding: None,
        }
    }

    /// Rebuild a session from what the index persisted
    ///
    /// Confirmed steps come from recorded steps; in-flight and failed steps
    /// from the latest attempt. Built is never persisted and comes back as
    /// NotStarted.
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Result<Self, SessionError> {
        let record = &snapshot.session;
        let mut session = Self::new(record.id, record.owner, record.chain_id);

        for recorded in &snapshot.recorded {
            session.set(
                recorded.step,
                StepState::Confirmed {
                    tx_hash: recorded.tx_hash,
                    extracted_id: recorded.extracted_id.clone(),
                    block_number: recorded.block_number,
                },
            );
        }

        for attempt in &snapshot.latest_attempts {
            if session.state(attempt.step).is_confirmed() {
                continue;
            }
            let state = match attempt.status {
                AttemptStatus::AwaitingConfirmation => {
                    let (Some(tx_hash), Some(input)) = (attempt.tx_hash, attempt.input.clone())
                    else {
                        return Err(SessionError::Malformed(format!(
                            "in-flight {} attempt #{} has no transaction or input",
                            attempt.step, attempt.attempt_no
                        )));
                    };
                    StepState::AwaitingConfirmation { tx_hash, input }
                }
                AttemptStatus::Failed => StepState::Failed {
                    kind: attempt.failure_kind.unwrap_or(FailureKind::Validation),
                    reason: attempt.error.clone().unwrap_or_default(),
                    tx_hash: attempt.tx_hash,
                },
                AttemptStatus::Confirmed => {
                    log::warn!(
                        "Session {}: {} attempt #{} is confirmed but not indexed",
                        record.id,
                        attempt.step,
                        attempt.attempt_no
                    );
                    StepState::NotStarted
                }
            };
            session.set(attempt.step, state);
        }

        session.total_funding = snapshot.entry.as_ref().and_then(|e| e.total_funding);

        Ok(session)
    }

    pub fn state(&self, step: WizardStep) -> &StepState {
        &self.steps[step.index()]
    }

    pub fn status(&self, step: WizardStep) -> StepStatus {
        self.state(step).status()
    }

    pub(crate) fn set(&mut self, step: WizardStep, state: StepState) {
        self.steps[step.index()] = state;
    }

    /// All slots with their step, in wizard order
    pub fn steps(&self) -> impl Iterator<Item = (WizardStep, &StepState)> {
        WizardStep::ALL.into_iter().zip(self.steps.iter())
    }

    /// The step awaiting confirmation, if any
    pub fn in_flight(&self) -> Option<(WizardStep, B256, &StepInput)> {
        self.steps().find_map(|(step, state)| match state {
            StepState::AwaitingConfirmation { tx_hash, input } => Some((step, *tx_hash, input)),
            _ => None,
        })
    }

    /// The step with an unsigned transaction ready, if any
    pub fn built(&self) -> Option<(WizardStep, &UnsignedTransaction, &StepInput)> {
        self.steps().find_map(|(step, state)| match state {
            StepState::Built { transaction, input } => Some((step, transaction, input)),
            _ => None,
        })
    }

    /// Id extracted for a confirmed step
    pub fn extracted_id(&self, step: WizardStep) -> Option<&ExtractedId> {
        match self.state(step) {
            StepState::Confirmed { extracted_id, .. } => Some(extracted_id),
            _ => None,
        }
    }

    /// Ids the next step's builder consumes
    pub fn prior_ids(&self) -> PriorIds {
        PriorIds {
            escrow_id: self
                .extracted_id(WizardStep::Escrow)
                .and_then(ExtractedId::primary),
            registry_id: self
                .extracted_id(WizardStep::Registry)
                .and_then(ExtractedId::primary),
            total_funding: self.total_funding,
        }
    }

    /// First step that is not confirmed
    pub fn next_step(&self) -> Option<WizardStep> {
        self.steps()
            .find(|(_, state)| !state.is_confirmed())
            .map(|(step, _)| step)
    }

    pub fn is_complete(&self) -> bool {
        self.next_step().is_none()
    }

    /// Whether `step` may be built now
    pub fn ensure_buildable(&self, step: WizardStep) -> Result<(), SessionError> {
        if let Some((pending, tx_hash, _)) = self.in_flight() {
            return Err(SessionError::StepInFlight {
                step: pending,
                tx_hash,
            });
        }
        if self.state(step).is_confirmed() {
            return Err(SessionError::AlreadyConfirmed(step));
        }
        for &dependency in step.dependencies() {
            if !self.state(dependency).is_confirmed() {
                return Err(SessionError::DependencyNotConfirmed { step, dependency });
            }
        }
        Ok(())
    }
}
