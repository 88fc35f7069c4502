//! Step inputs and their validation
//!
//! Each wizard step takes a form-shaped input. Inputs are validated against
//! the ids produced by earlier steps before any calldata is built.

use alloy_primitives::{keccak256, B256, U256};
use serde::{Deserialize, Serialize};

use crate::types::{decimal, WizardStep};

/// Oldest participant age the criteria step accepts
pub const MAX_AGE_LIMIT: u32 = 150;

/// Input for one wizard step
///
/// JSON form: `{ "step": "escrow", "title": "...", "totalFunding": "500", ... }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepInput {
    Escrow(EscrowInput),
    Registry(RegistryInput),
    Criteria(CriteriaInput),
    Milestones(MilestonesInput),
}

impl StepInput {
    /// The step this input belongs to
    pub fn step(&self) -> WizardStep {
        match self {
            StepInput::Escrow(_) => WizardStep::Escrow,
            StepInput::Registry(_) => WizardStep::Registry,
            StepInput::Criteria(_) => WizardStep::Criteria,
            StepInput::Milestones(_) => WizardStep::Milestones,
        }
    }

    /// Check the input against the ids of earlier steps
    pub fn validate(&self, prior: &PriorIds) -> Result<(), ValidationError> {
        match self {
            StepInput::Escrow(input) => input.validate(),
            StepInput::Registry(input) => input.validate(prior),
            StepInput::Criteria(input) => input.validate(prior),
            StepInput::Milestones(input) => input.validate(prior).map(|_| ()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowInput {
    pub title: String,

    /// Wei locked in escrow; sent as the call value
    #[serde(with = "decimal")]
    pub total_funding: U256,

    pub max_participants: u64,
}

impl EscrowInput {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if self.max_participants == 0 {
            return Err(ValidationError::ZeroParticipants);
        }
        if self.total_funding.is_zero() {
            return Err(ValidationError::ZeroFunding);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryInput {
    pub title: String,

    #[serde(default)]
    pub description: String,
}

impl RegistryInput {
    fn validate(&self, prior: &PriorIds) -> Result<(), ValidationError> {
        prior.escrow(WizardStep::Registry)?;
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriteriaInput {
    pub min_age: u32,
    pub max_age: u32,

    /// ICD-10 codes a participant must hold, e.g. `"E11.9"`
    #[serde(default)]
    pub required_diagnoses: Vec<String>,
}

impl CriteriaInput {
    fn validate(&self, prior: &PriorIds) -> Result<(), ValidationError> {
        prior.escrow(WizardStep::Criteria)?;
        prior.registry(WizardStep::Criteria)?;
        if self.min_age > self.max_age {
            return Err(ValidationError::AgeRange {
                min: self.min_age,
                max: self.max_age,
            });
        }
        if self.max_age > MAX_AGE_LIMIT {
            return Err(ValidationError::MaxAgeTooHigh { max: self.max_age });
        }
        if let Some(index) = self
            .required_diagnoses
            .iter()
            .position(|code| code.trim().is_empty())
        {
            return Err(ValidationError::EmptyDiagnosisCode { index });
        }
        Ok(())
    }

    /// Commitments for the required diagnoses, in input order
    pub fn diagnosis_hashes(&self) -> Vec<B256> {
        self.required_diagnoses
            .iter()
            .map(|code| diagnosis_hash(code))
            .collect()
    }
}

/// Commitment for one diagnosis code: keccak-256 of the trimmed, upper-cased code
pub fn diagnosis_hash(code: &str) -> B256 {
    keccak256(code.trim().to_uppercase().as_bytes())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestonesInput {
    pub milestones: Vec<MilestoneInput>,
}

impl MilestonesInput {
    /// Validate and return the cumulative reward
    fn validate(&self, prior: &PriorIds) -> Result<U256, ValidationError> {
        prior.escrow(WizardStep::Milestones)?;
        prior.registry(WizardStep::Milestones)?;
        let funding = prior
            .total_funding
            .ok_or(ValidationError::MissingTotalFunding)?;

        if self.milestones.is_empty() {
            return Err(ValidationError::NoMilestones);
        }

        let mut total = U256::ZERO;
        for (index, milestone) in self.milestones.iter().enumerate() {
            if milestone.description.trim().is_empty() {
                return Err(ValidationError::EmptyMilestoneDescription { index });
            }
            if milestone.reward_amount.is_zero() {
                return Err(ValidationError::ZeroReward { index });
            }
            total = total
                .checked_add(milestone.reward_amount)
                .ok_or(ValidationError::RewardOverflow)?;
        }

        if total > funding {
            return Err(ValidationError::RewardsExceedFunding { total, funding });
        }
        Ok(total)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneInput {
    pub description: String,

    #[serde(with = "decimal")]
    pub reward_amount: U256,

    #[serde(default)]
    pub kind: MilestoneKind,
}

/// Milestone category, encoded on-chain as `uint8`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneKind {
    Enrollment,
    #[default]
    DataSubmission,
    FollowUp,
    Completion,
}

impl MilestoneKind {
    pub fn as_u8(self) -> u8 {
        match self {
            MilestoneKind::Enrollment => 0,
            MilestoneKind::DataSubmission => 1,
            MilestoneKind::FollowUp => 2,
            MilestoneKind::Completion => 3,
        }
    }
}

/// Identifiers produced by confirmed earlier steps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorIds {
    #[serde(default, with = "decimal::option")]
    pub escrow_id: Option<U256>,

    #[serde(default, with = "decimal::option")]
    pub registry_id: Option<U256>,

    /// Funding declared at the escrow step
    #[serde(default, with = "decimal::option")]
    pub total_funding: Option<U256>,
}

impl PriorIds {
    /// Escrow id, or the validation error a builder would report
    pub fn escrow(&self, step: WizardStep) -> Result<U256, ValidationError> {
        self.escrow_id.ok_or(ValidationError::MissingPriorId {
            step,
            dependency: WizardStep::Escrow,
        })
    }

    /// Registry id, or the validation error a builder would report
    pub fn registry(&self, step: WizardStep) -> Result<U256, ValidationError> {
        self.registry_id.ok_or(ValidationError::MissingPriorId {
            step,
            dependency: WizardStep::Registry,
        })
    }
}

/// Step input validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Title must not be empty")]
    EmptyTitle,

    #[error("Max participants must be greater than zero")]
    ZeroParticipants,

    #[error("Total funding must be greater than zero")]
    ZeroFunding,

    #[error("{step} step needs the {dependency} id, which is not confirmed yet")]
    MissingPriorId {
        step: WizardStep,
        dependency: WizardStep,
    },

    #[error("Total funding from the escrow step is unknown")]
    MissingTotalFunding,

    #[error("Minimum age {min} is greater than maximum age {max}")]
    AgeRange { min: u32, max: u32 },

    #[error("Maximum age {max} exceeds the limit of {limit}", limit = MAX_AGE_LIMIT)]
    MaxAgeTooHigh { max: u32 },

    #[error("Diagnosis code #{index} is empty")]
    EmptyDiagnosisCode { index: usize },

    #[error("At least one milestone is required")]
    NoMilestones,

    #[error("Milestone #{index} has an empty description")]
    EmptyMilestoneDescription { index: usize },

    #[error("Milestone #{index} has a zero reward")]
    ZeroReward { index: usize },

    #[error("Milestone rewards overflow uint256")]
    RewardOverflow,

    #[error("Milestone rewards total {total} exceeds escrow funding {funding}")]
    RewardsExceedFunding { total: U256, funding: U256 },

    #[error("Input is for the {found} step, expected {expected}")]
    StepMismatch {
        expected: WizardStep,
        found: WizardStep,
    },
}
