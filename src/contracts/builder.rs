//! Transaction builder
//!
//! Turns a validated step input into an unsigned contract call. The builder
//! is pure: it never signs, broadcasts, or touches storage.

use alloy_primitives::{Address, Bytes, FixedBytes, U256};
use alloy_sol_types::SolCall;
use serde::{Deserialize, Serialize};

use crate::contracts::abi::{
    self, addMilestonesCall, createStudyEscrowCall, publishStudyCall, setStudyCriteriaCall,
    AbiValue, FunctionAbi,
};
use crate::contracts::inputs::{PriorIds, StepInput, ValidationError};
use crate::contracts::registry::{ConfigurationError, ContractKind, ContractRegistry};
use crate::types::{decimal, WizardStep};

/// An unsigned contract call, ready for the user's wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedTransaction {
    pub step: WizardStep,
    pub chain_id: u64,
    pub to: Address,
    pub contract: ContractKind,

    /// Function name, e.g. `publishStudy`
    pub function: String,

    /// Canonical signature, e.g. `publishStudy(uint256,string,string)`
    pub signature: String,

    pub selector: FixedBytes<4>,

    /// Call arguments in declaration order
    pub args: Vec<NamedArg>,

    /// Wei sent with the call
    #[serde(with = "decimal")]
    pub value: U256,

    /// Full calldata (selector + encoded arguments)
    pub data: Bytes,

    /// JSON ABI fragment of the called function
    pub abi: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedArg {
    pub name: String,
    pub value: AbiValue,
}

/// Transaction builder errors
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

/// Builds unsigned step transactions against the deployed contracts
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    registry: ContractRegistry,
}

impl TransactionBuilder {
    pub fn new(registry: ContractRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    /// Build the unsigned transaction for a step
    ///
    /// # Arguments
    ///
    /// * `chain_id` - Chain the transaction targets
    /// * `step` - Step being built; must match the input's step
    /// * `input` - Form input for the step
    /// * `prior` - Ids produced by earlier confirmed steps
    ///
    /// # Example
    ///
    /// ```ignore
    /// let input = StepInput::Escrow(EscrowInput {
    ///     title: "Sleep study".into(),
    ///     total_funding: U256::from(500),
    ///     max_participants: 40,
    /// });
    /// let tx = builder.build_step_transaction(31337, WizardStep::Escrow, &input, &PriorIds::default())?;
    /// ```
    pub fn build_step_transaction(
        &self,
        chain_id: u64,
        step: WizardStep,
        input: &StepInput,
        prior: &PriorIds,
    ) -> Result<UnsignedTransaction, BuildError> {
        if input.step() != step {
            return Err(ValidationError::StepMismatch {
                expected: step,
                found: input.step(),
            }
            .into());
        }

        input.validate(prior)?;

        let (kind, function, args, value, data) = match input {
            StepInput::Escrow(escrow) => {
                let call = createStudyEscrowCall {
                    title: escrow.title.trim().to_string(),
                    totalFunding: escrow.total_funding,
                    maxParticipants: U256::from(escrow.max_participants),
                };
                (
                    ContractKind::StudyEscrow,
                    abi::CREATE_STUDY_ESCROW,
                    vec![
                        AbiValue::String(call.title.clone()),
                        AbiValue::Uint(call.totalFunding),
                        AbiValue::Uint(call.maxParticipants),
                    ],
                    escrow.total_funding,
                    call.abi_encode(),
                )
            }
            StepInput::Registry(registry) => {
                let call = publishStudyCall {
                    escrowId: prior.escrow(step)?,
                    title: registry.title.trim().to_string(),
                    description: registry.description.clone(),
                };
                (
                    ContractKind::StudyRegistry,
                    abi::PUBLISH_STUDY,
                    vec![
                        AbiValue::Uint(call.escrowId),
                        AbiValue::String(call.title.clone()),
                        AbiValue::String(call.description.clone()),
                    ],
                    U256::ZERO,
                    call.abi_encode(),
                )
            }
            StepInput::Criteria(criteria) => {
                let call = setStudyCriteriaCall {
                    studyId: prior.registry(step)?,
                    escrowId: prior.escrow(step)?,
                    minAge: U256::from(criteria.min_age),
                    maxAge: U256::from(criteria.max_age),
                    diagnosisHashes: criteria.diagnosis_hashes(),
                };
                (
                    ContractKind::StudyRegistry,
                    abi::SET_STUDY_CRITERIA,
                    vec![
                        AbiValue::Uint(call.studyId),
                        AbiValue::Uint(call.escrowId),
                        AbiValue::Uint(call.minAge),
                        AbiValue::Uint(call.maxAge),
                        AbiValue::Array(
                            call.diagnosisHashes.iter().copied().map(AbiValue::Bytes32).collect(),
                        ),
                    ],
                    U256::ZERO,
                    call.abi_encode(),
                )
            }
            StepInput::Milestones(milestones) => {
                let items = &milestones.milestones;
                let call = addMilestonesCall {
                    escrowId: prior.escrow(step)?,
                    studyId: prior.registry(step)?,
                    descriptions: items.iter().map(|m| m.description.trim().to_string()).collect(),
                    rewards: items.iter().map(|m| m.reward_amount).collect(),
                    kinds: items.iter().map(|m| m.kind.as_u8()).collect(),
                };
                (
                    ContractKind::StudyEscrow,
                    abi::ADD_MILESTONES,
                    vec![
                        AbiValue::Uint(call.escrowId),
                        AbiValue::Uint(call.studyId),
                        AbiValue::Array(
                            call.descriptions.iter().cloned().map(AbiValue::String).collect(),
                        ),
                        AbiValue::Array(call.rewards.iter().copied().map(AbiValue::Uint).collect()),
                        AbiValue::Array(
                            call.kinds.iter().map(|k| AbiValue::Uint(U256::from(*k))).collect(),
                        ),
                    ],
                    U256::ZERO,
                    call.abi_encode(),
                )
            }
        };

        let contract = self.registry.resolve(kind, chain_id)?;

        log::debug!(
            "Built {} call {} -> {} ({} bytes calldata)",
            step,
            function.name,
            contract.address,
            data.len()
        );

        Ok(UnsignedTransaction {
            step,
            chain_id,
            to: contract.address,
            contract: kind,
            function: function.name.to_string(),
            signature: function.signature().to_string(),
            selector: function.selector(),
            args: named_args(&function, args),
            value,
            data: Bytes::from(data),
            abi: function.to_json(),
        })
    }
}

fn named_args(function: &FunctionAbi, values: Vec<AbiValue>) -> Vec<NamedArg> {
    function
        .inputs
        .iter()
        .zip(values)
        .map(|(param, value)| NamedArg {
            name: param.name.to_string(),
            value,
        })
        .collect()
}
