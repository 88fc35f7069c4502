//! Wizard orchestrator
//!
//! Drives each step through build → sign → confirm → extract → index and
//! turns every recoverable error into step-level `Failed` state. One
//! orchestrator serves any number of sessions, one step at a time.

use alloy_primitives::{Address, B256};
use uuid::Uuid;

use crate::chain::{
    await_confirmation_with_progress, ChainReader, ConfirmationError, ConfirmationPolicy,
    NetworkError,
};
use crate::contracts::extractor::{extract_step_id, step_event};
use crate::contracts::{BuildError, StepInput, TransactionBuilder, UnsignedTransaction};
use crate::session::{SessionError, StepState, WizardSession};
use crate::storage::{IndexError, IndexResult, StepConfirmation, StepIndexer, StorageError};
use crate::types::{FailureKind, StepStatus, WizardStep};

/// External wallet that signs and broadcasts a transaction
///
/// The wallet is human-controlled: the call may take arbitrarily long and
/// the owner may refuse.
#[allow(async_fn_in_trait)]
pub trait WalletSigner {
    async fn sign_and_send(&self, transaction: &UnsignedTransaction) -> Result<B256, SignerError>;
}

/// Wallet signer errors
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("Signature request rejected by the wallet owner")]
    Rejected,

    #[error("Wallet error: {0}")]
    Wallet(String),
}

/// Orchestrator errors
#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("{step} step failed ({kind}): {reason}")]
    StepFailed {
        step: WizardStep,
        kind: FailureKind,
        reason: String,
    },

    #[error("{step} transaction {tx_hash} not mined after {attempts} polls; confirm again later")]
    ConfirmationPending {
        step: WizardStep,
        tx_hash: B256,
        attempts: u32,
    },

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),
}

impl WizardError {
    /// Failure kind for step-level failures
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            WizardError::StepFailed { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether retrying later (without changing input) may succeed
    pub fn is_pending(&self) -> bool {
        matches!(self, WizardError::ConfirmationPending { .. })
    }
}

/// Wizard orchestrator
///
/// Owns the index, the transaction builder and a chain reader.
pub struct WizardOrchestrator<R: ChainReader> {
    indexer: StepIndexer,
    builder: TransactionBuilder,
    reader: R,
    policy: ConfirmationPolicy,
}

impl<R: ChainReader> WizardOrchestrator<R> {
    pub fn new(
        indexer: StepIndexer,
        builder: TransactionBuilder,
        reader: R,
        policy: ConfirmationPolicy,
    ) -> Self {
        Self {
            indexer,
            builder,
            reader,
            policy,
        }
    }

    pub fn indexer(&self) -> &StepIndexer {
        &self.indexer
    }

    pub fn builder(&self) -> &TransactionBuilder {
        &self.builder
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn policy(&self) -> &ConfirmationPolicy {
        &self.policy
    }

    /// Start a new session for a wallet
    pub fn start(&mut self, owner: Address, chain_id: u64) -> Result<WizardSession, WizardError> {
        let record = self.indexer.create_session(owner, chain_id)?;

        log::info!(
            "✓ Started session {} for {} on chain {}",
            record.id,
            owner,
            chain_id
        );

        Ok(WizardSession::new(record.id, record.owner, record.chain_id))
    }

    /// Rebuild a session purely from the index
    ///
    /// # Example
    ///
    /// ```ignore
    /// let session = orchestrator.resume(session_id)?;
    /// if let Some(step) = session.next_step() {
    ///     println!("Next: {}", step);
    /// }
    /// ```
    pub fn resume(&self, session_id: Uuid) -> Result<WizardSession, WizardError> {
        let snapshot = self.indexer.load_session(session_id)?;
        let session = WizardSession::from_snapshot(&snapshot)?;

        log::info!(
            "Resumed session {} (next step: {})",
            session_id,
            session
                .next_step()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "none, complete".to_string())
        );

        Ok(session)
    }

    /// Build the unsigned transaction for the input's step
    ///
    /// Valid from NotStarted, Built (replaces the transaction) and Failed
    /// (starts a fresh attempt). Builder rejections are persisted and the
    /// step is marked Failed.
    pub fn build(
        &mut self,
        session: &mut WizardSession,
        input: StepInput,
    ) -> Result<UnsignedTransaction, WizardError> {
        let step = input.step();
        session.ensure_buildable(step)?;

        let prior = session.prior_ids();
        let transaction =
            match self
                .builder
                .build_step_transaction(session.chain_id, step, &input, &prior)
            {
                Ok(tx) => tx,
                Err(e) => {
                    let kind = match e {
                        BuildError::Validation(_) => FailureKind::Validation,
                        BuildError::Configuration(_) => FailureKind::Configuration,
                    };
                    return Err(self.fail_step(session, step, kind, e.to_string(), None, Some(&input)));
                }
            };

        log::info!(
            "Built {} transaction for session {} ({} -> {})",
            step,
            session.id,
            transaction.function,
            transaction.to
        );

        session.set(
            step,
            StepState::Built {
                transaction: transaction.clone(),
                input,
            },
        );

        Ok(transaction)
    }

    /// Record that the wallet broadcast the built transaction for `step`
    pub fn submit(
        &mut self,
        session: &mut WizardSession,
        step: WizardStep,
        tx_hash: B256,
    ) -> Result<(), WizardError> {
        let input = match session.state(step) {
            StepState::Built { input, .. } => input.clone(),
            other => {
                return Err(SessionError::NotBuilt {
                    step,
                    status: other.status(),
                }
                .into())
            }
        };

        match self
            .indexer
            .record_submission(session.id, step, tx_hash, &input)
        {
            Ok(_) => {}
            Err(IndexError::Conflict(conflict)) => {
                return Err(self.fail_step(
                    session,
                    step,
                    FailureKind::IndexConflict,
                    conflict.to_string(),
                    Some(tx_hash),
                    Some(&input),
                ));
            }
            Err(e) => return Err(e.into()),
        }

        log::info!("{} transaction {} broadcast, awaiting confirmation", step, tx_hash);

        session.set(step, StepState::AwaitingConfirmation { tx_hash, input });
        Ok(())
    }

    /// Hand the built transaction to the wallet and record the broadcast
    pub async fn sign_and_submit<S: WalletSigner>(
        &mut self,
        session: &mut WizardSession,
        signer: &S,
    ) -> Result<B256, WizardError> {
        let (step, transaction, input) = session
            .built()
            .map(|(step, tx, input)| (step, tx.clone(), input.clone()))
            .ok_or(SessionError::NothingBuilt)?;

        log::info!("Requesting wallet signature for {} step", step);

        match signer.sign_and_send(&transaction).await {
            Ok(tx_hash) => {
                self.submit(session, step, tx_hash)?;
                Ok(tx_hash)
            }
            Err(SignerError::Rejected) => Err(self.fail_step(
                session,
                step,
                FailureKind::Rejected,
                SignerError::Rejected.to_string(),
                None,
                Some(&input),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Cancel a step that has not been broadcast
    pub fn abandon(
        &mut self,
        session: &mut WizardSession,
        step: WizardStep,
    ) -> Result<(), WizardError> {
        match session.status(step) {
            StepStatus::Built => {
                session.set(step, StepState::NotStarted);
                log::info!("Abandoned {} step of session {}", step, session.id);
                Ok(())
            }
            StepStatus::NotStarted => Ok(()),
            status => Err(SessionError::CannotAbandon { step, status }.into()),
        }
    }

    /// Wait for the in-flight transaction, extract its id and index it
    pub async fn confirm(&mut self, session: &mut WizardSession) -> Result<IndexResult, WizardError> {
        self.confirm_with_progress(session, |_| {}).await
    }

    /// Like `confirm`, reporting each receipt poll via callback
    pub async fn confirm_with_progress<F: FnMut(&str)>(
        &mut self,
        session: &mut WizardSession,
        progress_fn: F,
    ) -> Result<IndexResult, WizardError> {
        let (step, tx_hash, input) = session
            .in_flight()
            .map(|(step, hash, input)| (step, hash, input.clone()))
            .ok_or(SessionError::NothingInFlight)?;

        let receipt =
            match await_confirmation_with_progress(&self.reader, tx_hash, &self.policy, progress_fn)
                .await
            {
                Ok(receipt) => receipt,
                Err(ConfirmationError::Timeout { attempts, .. }) => {
                    log::warn!(
                        "{} transaction {} still pending; session {} stays awaiting confirmation",
                        step,
                        tx_hash,
                        session.id
                    );
                    return Err(WizardError::ConfirmationPending {
                        step,
                        tx_hash,
                        attempts,
                    });
                }
                Err(ConfirmationError::Reverted { reason, .. }) => {
                    let reason = reason.unwrap_or_else(|| "execution reverted".to_string());
                    return Err(self.fail_step(
                        session,
                        step,
                        FailureKind::Reverted,
                        reason,
                        Some(tx_hash),
                        Some(&input),
                    ));
                }
                Err(ConfirmationError::Network(e)) => return Err(e.into()),
            };

        if receipt.from != session.owner {
            let reason = format!(
                "transaction sent by {}, session owner is {}",
                receipt.from, session.owner
            );
            return Err(self.fail_step(
                session,
                step,
                FailureKind::Unauthorized,
                reason,
                Some(tx_hash),
                Some(&input),
            ));
        }

        let extracted_id = match extract_step_id(step, &receipt) {
            Ok(id) => id,
            Err(e) => {
                log::error!(
                    "Could not extract {} id from {}: {}. Check that the deployed contract emits {}",
                    step,
                    tx_hash,
                    e,
                    step_event(step).signature()
                );
                return Err(self.fail_step(
                    session,
                    step,
                    FailureKind::Extraction,
                    e.to_string(),
                    Some(tx_hash),
                    Some(&input),
                ));
            }
        };

        let confirmation = StepConfirmation {
            step,
            tx_hash,
            extracted_id: extracted_id.clone(),
            block_number: receipt.block_number,
            input: Some(input.clone()),
        };

        let result = match self.indexer.record_step(session.id, &confirmation) {
            Ok(result) => result,
            Err(IndexError::Conflict(conflict)) => {
                return Err(self.fail_step(
                    session,
                    step,
                    FailureKind::IndexConflict,
                    conflict.to_string(),
                    Some(tx_hash),
                    Some(&input),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        if step == WizardStep::Escrow {
            session.total_funding = result.entry.total_funding;
        }
        session.set(
            step,
            StepState::Confirmed {
                tx_hash,
                extracted_id,
                block_number: receipt.block_number,
            },
        );

        log::info!(
            "✓ {} confirmed for session {} (id {}, block {})",
            step,
            session.id,
            result.recorded.extracted_id,
            receipt.block_number
        );

        Ok(result)
    }

    /// Build, sign and confirm one step
    ///
    /// # Example
    ///
    /// ```ignore
    /// let result = orchestrator.advance(&mut session, escrow_input, &wallet).await?;
    /// println!("Escrow id: {}", result.recorded.extracted_id);
    /// ```
    pub async fn advance<S: WalletSigner>(
        &mut self,
        session: &mut WizardSession,
        input: StepInput,
        signer: &S,
    ) -> Result<IndexResult, WizardError> {
        self.build(session, input)?;
        self.sign_and_submit(session, signer).await?;
        self.confirm(session).await
    }

    /// Persist a step failure and mark the slot Failed
    ///
    /// Returns the error to surface. If the failure cannot be persisted the
    /// storage error is returned instead and the slot is left unchanged.
    fn fail_step(
        &mut self,
        session: &mut WizardSession,
        step: WizardStep,
        kind: FailureKind,
        reason: String,
        tx_hash: Option<B256>,
        input: Option<&StepInput>,
    ) -> WizardError {
        if let Err(e) = self
            .indexer
            .record_failure(session.id, step, kind, &reason, tx_hash, input)
        {
            return e.into();
        }

        log::warn!(
            "{} step of session {} failed ({}): {}",
            step,
            session.id,
            kind,
            reason
        );

        session.set(
            step,
            StepState::Failed {
                kind,
                reason: reason.clone(),
                tx_hash,
            },
        );

        WizardError::StepFailed { step, kind, reason }
    }
}
