//! Common test utilities for study-wizard integration tests
//!
//! This module provides shared test infrastructure including:
//! - An in-memory chain implementing `ChainReader`
//! - A scripted wallet implementing `WalletSigner`
//! - Receipt, log and step input fixtures
//! - Orchestrator setup over a temporary index

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use alloy_primitives::{Address, Bytes, B256, U256};
use tempfile::TempDir;

use study_wizard::chain::{
    ChainReader, ConfirmationPolicy, Log, LogFilter, NetworkError, TransactionReceipt,
};
use study_wizard::contracts::extractor::step_event;
use study_wizard::contracts::{
    ContractKind, ContractRegistry, CriteriaInput, EscrowInput, MilestoneInput, MilestoneKind,
    MilestonesInput, RegistryInput, StepInput, TransactionBuilder, UnsignedTransaction,
};
use study_wizard::orchestrator::{SignerError, WalletSigner, WizardOrchestrator};
use study_wizard::storage::StepIndexer;
use study_wizard::types::WizardStep;

pub const CHAIN_ID: u64 = 31337;

pub fn owner() -> Address {
    Address::repeat_byte(0xaa)
}

pub fn stranger() -> Address {
    Address::repeat_byte(0xbb)
}

pub fn escrow_contract() -> Address {
    Address::repeat_byte(0x11)
}

pub fn registry_contract() -> Address {
    Address::repeat_byte(0x22)
}

/// Distinct, recognizable transaction hash
pub fn tx_hash(n: u8) -> B256 {
    B256::repeat_byte(n)
}

pub fn id_topic(id: u64) -> B256 {
    B256::from(U256::from(id).to_be_bytes::<32>())
}

pub fn contract_registry() -> ContractRegistry {
    ContractRegistry::new()
        .with_deployment(CHAIN_ID, ContractKind::StudyEscrow, escrow_contract())
        .with_deployment(CHAIN_ID, ContractKind::StudyRegistry, registry_contract())
}

pub fn step_address(step: WizardStep) -> Address {
    match step {
        WizardStep::Escrow | WizardStep::Milestones => escrow_contract(),
        WizardStep::Registry | WizardStep::Criteria => registry_contract(),
    }
}

/// Log of the step's event carrying `id` at topic 1
pub fn step_log(step: WizardStep, id: u64, block: u64, tx: B256) -> Log {
    Log {
        address: step_address(step),
        topics: vec![step_event(step).topic(), id_topic(id), B256::ZERO],
        data: Bytes::new(),
        block_number: Some(block),
        transaction_hash: Some(tx),
        log_index: Some(0),
    }
}

/// Log with an unrelated event signature
pub fn foreign_log(block: u64, tx: B256) -> Log {
    Log {
        address: Address::repeat_byte(0x99),
        topics: vec![B256::repeat_byte(0xee), id_topic(7)],
        data: Bytes::new(),
        block_number: Some(block),
        transaction_hash: Some(tx),
        log_index: Some(0),
    }
}

pub fn receipt(tx: B256, block: u64, from: Address, logs: Vec<Log>) -> TransactionReceipt {
    TransactionReceipt {
        transaction_hash: tx,
        block_number: block,
        block_hash: Some(B256::repeat_byte(0x0b)),
        from,
        to: None,
        status: 1,
        logs,
    }
}

pub fn reverted_receipt(tx: B256, block: u64, from: Address) -> TransactionReceipt {
    TransactionReceipt {
        status: 0,
        ..receipt(tx, block, from, Vec::new())
    }
}

/// Successful receipt for a step emitting `ids` (one log per id)
pub fn step_receipt(step: WizardStep, tx: B256, block: u64, ids: &[u64]) -> TransactionReceipt {
    let logs = ids
        .iter()
        .enumerate()
        .map(|(i, id)| Log {
            log_index: Some(i as u64),
            ..step_log(step, *id, block, tx)
        })
        .collect();
    receipt(tx, block, owner(), logs)
}

/// In-memory chain
///
/// Receipts are only visible once mined; logs are served from every mined
/// receipt.
#[derive(Default)]
pub struct MockChain {
    receipts: Mutex<HashMap<B256, TransactionReceipt>>,
    revert_reasons: Mutex<HashMap<B256, String>>,
    polls: Mutex<u32>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mine(&self, receipt: TransactionReceipt) {
        self.receipts
            .lock()
            .unwrap()
            .insert(receipt.transaction_hash, receipt);
    }

    pub fn mine_reverted(&self, receipt: TransactionReceipt, reason: &str) {
        self.revert_reasons
            .lock()
            .unwrap()
            .insert(receipt.transaction_hash, reason.to_string());
        self.mine(receipt);
    }

    /// Replace the logs of a mined receipt (simulates a diverging ledger)
    pub fn rewrite_logs(&self, tx: B256, logs: Vec<Log>) {
        if let Some(receipt) = self.receipts.lock().unwrap().get_mut(&tx) {
            receipt.logs = logs;
        }
    }

    pub fn polls(&self) -> u32 {
        *self.polls.lock().unwrap()
    }
}

impl ChainReader for MockChain {
    async fn transaction_receipt(
        &self,
        tx_hash: B256,
    ) -> Result<Option<TransactionReceipt>, NetworkError> {
        *self.polls.lock().unwrap() += 1;
        Ok(self.receipts.lock().unwrap().get(&tx_hash).cloned())
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<Log>, NetworkError> {
        let receipts = self.receipts.lock().unwrap();
        Ok(receipts
            .values()
            .filter(|r| r.succeeded())
            .flat_map(|r| r.logs.iter())
            .filter(|log| filter.matches(log))
            .cloned()
            .collect())
    }

    async fn revert_reason(
        &self,
        receipt: &TransactionReceipt,
    ) -> Result<Option<String>, NetworkError> {
        Ok(self
            .revert_reasons
            .lock()
            .unwrap()
            .get(&receipt.transaction_hash)
            .cloned())
    }
}

/// What the scripted wallet does on its next signature request
pub enum SignerAction {
    Send(B256),
    Reject,
    Fail(String),
}

/// Wallet that follows a script and remembers what it was asked to sign
#[derive(Default)]
pub struct MockSigner {
    script: Mutex<VecDeque<SignerAction>>,
    signed: Mutex<Vec<UnsignedTransaction>>,
}

impl MockSigner {
    pub fn new(script: Vec<SignerAction>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            signed: Mutex::new(Vec::new()),
        }
    }

    pub fn sending(hashes: &[B256]) -> Self {
        Self::new(hashes.iter().copied().map(SignerAction::Send).collect())
    }

    pub fn requests(&self) -> Vec<UnsignedTransaction> {
        self.signed.lock().unwrap().clone()
    }
}

impl WalletSigner for MockSigner {
    async fn sign_and_send(&self, transaction: &UnsignedTransaction) -> Result<B256, SignerError> {
        self.signed.lock().unwrap().push(transaction.clone());
        match self.script.lock().unwrap().pop_front() {
            Some(SignerAction::Send(hash)) => Ok(hash),
            Some(SignerAction::Reject) => Err(SignerError::Rejected),
            Some(SignerAction::Fail(message)) => Err(SignerError::Wallet(message)),
            None => Err(SignerError::Wallet("no scripted response".to_string())),
        }
    }
}

/// Orchestrator over a temporary index and an in-memory chain
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub orchestrator: WizardOrchestrator<MockChain>,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator_in(&temp_dir);
        Self {
            temp_dir,
            orchestrator,
        }
    }

    pub fn chain(&self) -> &MockChain {
        self.orchestrator.reader()
    }

    /// A second orchestrator over the same index, as after a restart
    pub fn reopen(&self) -> WizardOrchestrator<MockChain> {
        orchestrator_in(&self.temp_dir)
    }
}

fn orchestrator_in(temp_dir: &TempDir) -> WizardOrchestrator<MockChain> {
    let indexer = StepIndexer::new(temp_dir.path()).unwrap();
    let builder = TransactionBuilder::new(contract_registry());
    WizardOrchestrator::new(
        indexer,
        builder,
        MockChain::new(),
        ConfirmationPolicy::immediate(3),
    )
}

pub fn escrow_input(funding: u64) -> StepInput {
    StepInput::Escrow(EscrowInput {
        title: "Sleep and glucose study".to_string(),
        total_funding: U256::from(funding),
        max_participants: 40,
    })
}

pub fn registry_input() -> StepInput {
    StepInput::Registry(RegistryInput {
        title: "Sleep and Glucose".to_string(),
        description: "Effect of sleep duration on fasting glucose".to_string(),
    })
}

pub fn criteria_input() -> StepInput {
    StepInput::Criteria(CriteriaInput {
        min_age: 18,
        max_age: 65,
        required_diagnoses: vec!["E11.9".to_string()],
    })
}

pub fn milestones_input(rewards: &[u64]) -> StepInput {
    StepInput::Milestones(MilestonesInput {
        milestones: rewards
            .iter()
            .enumerate()
            .map(|(i, reward)| MilestoneInput {
                description: format!("Milestone {}", i + 1),
                reward_amount: U256::from(*reward),
                kind: MilestoneKind::DataSubmission,
            })
            .collect(),
    })
}
