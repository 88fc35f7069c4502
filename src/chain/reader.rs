//! Confirmation polling
//!
//! Waits for a broadcast transaction to be mined under a bounded exponential
//! backoff policy. Polling is read-only, so a caller that gets `Timeout` can
//! simply poll again.

use alloy_primitives::B256;
use std::time::Duration;

use crate::chain::network::{JsonRpcClient, NetworkError};
use crate::chain::receipt::{Log, LogFilter, TransactionReceipt};
use crate::contracts::abi::decode_revert_reason;

/// Read access to the chain
///
/// Implemented by [`JsonRpcClient`]; tests substitute an in-memory chain.
#[allow(async_fn_in_trait)]
pub trait ChainReader {
    /// Receipt for a transaction, `None` while it is not yet mined
    async fn transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> Result<Option<TransactionReceipt>, NetworkError>;

    /// Historical logs matching a filter
    async fn logs(&self, filter: &LogFilter) -> Result<Vec<Log>, NetworkError>;

    /// Best-effort revert reason for a reverted receipt
    async fn revert_reason(
        &self,
        _receipt: &TransactionReceipt,
    ) -> Result<Option<String>, NetworkError> {
        Ok(None)
    }
}

impl ChainReader for JsonRpcClient {
    async fn transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> Result<Option<TransactionReceipt>, NetworkError> {
        self.get_transaction_receipt(tx_hash).await
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<Log>, NetworkError> {
        self.get_logs(filter).await
    }

    async fn revert_reason(
        &self,
        receipt: &TransactionReceipt,
    ) -> Result<Option<String>, NetworkError> {
        let Some(tx) = self.get_transaction(receipt.transaction_hash).await? else {
            return Ok(None);
        };
        let data = self
            .replay_for_revert_data(&tx, receipt.block_number)
            .await?;
        Ok(data.and_then(|bytes| decode_revert_reason(&bytes)))
    }
}

/// Errors that can occur while waiting for confirmation
#[derive(Debug, thiserror::Error)]
pub enum ConfirmationError {
    #[error("Transaction {tx_hash} not mined after {attempts} polls")]
    Timeout { tx_hash: B256, attempts: u32 },

    #[error("Transaction {tx_hash} reverted in block {block_number}: {}", .reason.as_deref().unwrap_or("no reason given"))]
    Reverted {
        tx_hash: B256,
        block_number: u64,
        reason: Option<String>,
        receipt: Box<TransactionReceipt>,
    },

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
}

/// Bounded exponential backoff for receipt polling
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmationPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        crate::config::ConfirmationConfig::default().to_policy()
    }
}

impl ConfirmationPolicy {
    /// Poll as fast as possible; used by tests and one-shot checks
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            initial_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            multiplier: 1.0,
            max_attempts,
        }
    }

    /// Delay before poll number `attempt` (1-based); the first poll is immediate
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2) as i32;
        let secs = self.initial_interval.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_interval.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }
}

/// Wait for a transaction to be mined
///
/// # Returns
///
/// The receipt of a successful transaction, `Reverted` for a mined failure,
/// or `Timeout` once the policy's attempts are exhausted.
///
/// # Example
///
/// ```ignore
/// let receipt = await_confirmation(&client, tx_hash, &ConfirmationPolicy::default()).await?;
/// println!("Mined in block {}", receipt.block_number);
/// ```
pub async fn await_confirmation<R: ChainReader>(
    reader: &R,
    tx_hash: B256,
    policy: &ConfirmationPolicy,
) -> Result<TransactionReceipt, ConfirmationError> {
    await_confirmation_with_progress(reader, tx_hash, policy, |_| {}).await
}

/// Wait for a transaction with progress callback
///
/// Similar to `await_confirmation` but reports each poll via callback.
pub async fn await_confirmation_with_progress<R, F>(
    reader: &R,
    tx_hash: B256,
    policy: &ConfirmationPolicy,
    mut progress_fn: F,
) -> Result<TransactionReceipt, ConfirmationError>
where
    R: ChainReader,
    F: FnMut(&str),
{
    log::info!("Waiting for confirmation of {}", tx_hash);

    for attempt in 1..=policy.max_attempts {
        let delay = policy.delay_before(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        progress_fn(&format!(
            "Polling receipt ({}/{})...",
            attempt, policy.max_attempts
        ));

        let Some(receipt) = reader.transaction_receipt(tx_hash).await? else {
            log::debug!("{} not mined yet (poll {})", tx_hash, attempt);
            continue;
        };

        if receipt.succeeded() {
            log::info!(
                "✓ {} confirmed in block {}",
                tx_hash,
                receipt.block_number
            );
            progress_fn(&format!("Confirmed in block {}", receipt.block_number));
            return Ok(receipt);
        }

        let reason = match reader.revert_reason(&receipt).await {
            Ok(reason) => reason,
            Err(e) => {
                log::warn!("Could not recover revert reason for {}: {}", tx_hash, e);
                None
            }
        };
        log::warn!(
            "{} reverted in block {}: {}",
            tx_hash,
            receipt.block_number,
            reason.as_deref().unwrap_or("no reason given")
        );
        return Err(ConfirmationError::Reverted {
            tx_hash,
            block_number: receipt.block_number,
            reason,
            receipt: Box::new(receipt),
        });
    }

    log::warn!(
        "{} still pending after {} polls",
        tx_hash,
        policy.max_attempts
    );
    Err(ConfirmationError::Timeout {
        tx_hash,
        attempts: policy.max_attempts,
    })
}
