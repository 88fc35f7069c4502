//! Tests for the transaction builder and step input validation

mod common;

use alloy_primitives::{Address, U256};
use common::*;
use study_wizard::contracts::abi::{self, AbiValue};
use study_wizard::contracts::inputs::diagnosis_hash;
use study_wizard::contracts::{
    BuildError, ConfigurationError, ContractKind, ContractRegistry, CriteriaInput, PriorIds,
    StepInput, TransactionBuilder, ValidationError,
};
use study_wizard::types::WizardStep;

fn builder() -> TransactionBuilder {
    TransactionBuilder::new(contract_registry())
}

fn prior_after_registry(funding: u64) -> PriorIds {
    PriorIds {
        escrow_id: Some(U256::from(42)),
        registry_id: Some(U256::from(7)),
        total_funding: Some(U256::from(funding)),
    }
}

fn validation_error(result: Result<impl std::fmt::Debug, BuildError>) -> ValidationError {
    match result {
        Err(BuildError::Validation(e)) => e,
        other => panic!("Expected validation error, got {:?}", other),
    }
}

#[test]
fn test_escrow_transaction_targets_escrow_contract() {
    let tx = builder()
        .build_step_transaction(
            CHAIN_ID,
            WizardStep::Escrow,
            &escrow_input(500),
            &PriorIds::default(),
        )
        .unwrap();

    assert_eq!(tx.to, escrow_contract());
    assert_eq!(tx.contract, ContractKind::StudyEscrow);
    assert_eq!(tx.chain_id, CHAIN_ID);
    assert_eq!(tx.function, "createStudyEscrow");
    assert_eq!(tx.signature, "createStudyEscrow(string,uint256,uint256)");
    assert_eq!(tx.value, U256::from(500), "Funding is sent as call value");
    assert_eq!(&tx.data[..4], abi::CREATE_STUDY_ESCROW.selector().as_slice());
    assert_eq!(tx.selector, abi::CREATE_STUDY_ESCROW.selector());

    // selector + 3 head words + string length word + one padded word
    assert_eq!(tx.data.len(), 4 + 96 + 32 + 32);

    let names: Vec<&str> = tx.args.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["title", "totalFunding", "maxParticipants"]);
    assert_eq!(tx.args[2].value, AbiValue::Uint(U256::from(40)));
}

#[test]
fn test_registry_transaction_carries_escrow_id() {
    let prior = PriorIds {
        escrow_id: Some(U256::from(42)),
        registry_id: None,
        total_funding: Some(U256::from(500)),
    };

    let tx = builder()
        .build_step_transaction(CHAIN_ID, WizardStep::Registry, &registry_input(), &prior)
        .unwrap();

    assert_eq!(tx.to, registry_contract());
    assert_eq!(tx.value, U256::ZERO);
    assert_eq!(tx.args[0].value, AbiValue::Uint(U256::from(42)));
    // escrow id is the first head word after the selector
    assert_eq!(U256::from_be_slice(&tx.data[4..36]), U256::from(42));
}

#[test]
fn test_registry_without_escrow_id_is_rejected() {
    let result = builder().build_step_transaction(
        CHAIN_ID,
        WizardStep::Registry,
        &registry_input(),
        &PriorIds::default(),
    );

    assert_eq!(
        validation_error(result),
        ValidationError::MissingPriorId {
            step: WizardStep::Registry,
            dependency: WizardStep::Escrow
        }
    );
}

#[test]
fn test_criteria_transaction_hashes_diagnoses() {
    let tx = builder()
        .build_step_transaction(
            CHAIN_ID,
            WizardStep::Criteria,
            &criteria_input(),
            &prior_after_registry(500),
        )
        .unwrap();

    assert_eq!(tx.function, "setStudyCriteria");
    assert_eq!(tx.args[0].value, AbiValue::Uint(U256::from(7)));
    assert_eq!(tx.args[1].value, AbiValue::Uint(U256::from(42)));
    assert_eq!(
        tx.args[4].value,
        AbiValue::Array(vec![AbiValue::Bytes32(diagnosis_hash("E11.9"))])
    );
}

#[test]
fn test_diagnosis_hash_normalizes_codes() {
    assert_eq!(diagnosis_hash(" e11.9 "), diagnosis_hash("E11.9"));
    assert_ne!(diagnosis_hash("E11.9"), diagnosis_hash("E10.9"));
}

#[test]
fn test_criteria_age_range_validated() {
    let input = StepInput::Criteria(CriteriaInput {
        min_age: 70,
        max_age: 18,
        required_diagnoses: Vec::new(),
    });

    let result = builder().build_step_transaction(
        CHAIN_ID,
        WizardStep::Criteria,
        &input,
        &prior_after_registry(500),
    );

    assert_eq!(
        validation_error(result),
        ValidationError::AgeRange { min: 70, max: 18 }
    );

    let input = StepInput::Criteria(CriteriaInput {
        min_age: 18,
        max_age: 200,
        required_diagnoses: Vec::new(),
    });
    let result = builder().build_step_transaction(
        CHAIN_ID,
        WizardStep::Criteria,
        &input,
        &prior_after_registry(500),
    );
    assert_eq!(
        validation_error(result),
        ValidationError::MaxAgeTooHigh { max: 200 }
    );
}

#[test]
fn test_milestone_rewards_exceeding_funding_rejected() {
    let result = builder().build_step_transaction(
        CHAIN_ID,
        WizardStep::Milestones,
        &milestones_input(&[600, 400]),
        &prior_after_registry(500),
    );

    assert_eq!(
        validation_error(result),
        ValidationError::RewardsExceedFunding {
            total: U256::from(1000),
            funding: U256::from(500)
        }
    );
}

#[test]
fn test_milestone_rewards_within_funding_accepted() {
    let tx = builder()
        .build_step_transaction(
            CHAIN_ID,
            WizardStep::Milestones,
            &milestones_input(&[300, 200]),
            &prior_after_registry(500),
        )
        .unwrap();

    assert_eq!(tx.to, escrow_contract());
    assert_eq!(
        tx.args[3].value,
        AbiValue::Array(vec![
            AbiValue::Uint(U256::from(300)),
            AbiValue::Uint(U256::from(200))
        ])
    );
}

#[test]
fn test_milestones_require_positive_rewards() {
    let result = builder().build_step_transaction(
        CHAIN_ID,
        WizardStep::Milestones,
        &milestones_input(&[100, 0]),
        &prior_after_registry(500),
    );

    assert_eq!(validation_error(result), ValidationError::ZeroReward { index: 1 });

    let result = builder().build_step_transaction(
        CHAIN_ID,
        WizardStep::Milestones,
        &milestones_input(&[]),
        &prior_after_registry(500),
    );
    assert_eq!(validation_error(result), ValidationError::NoMilestones);
}

#[test]
fn test_escrow_input_validation() {
    let result = builder().build_step_transaction(
        CHAIN_ID,
        WizardStep::Escrow,
        &escrow_input(0),
        &PriorIds::default(),
    );
    assert_eq!(validation_error(result), ValidationError::ZeroFunding);
}

#[test]
fn test_input_for_wrong_step_rejected() {
    let result = builder().build_step_transaction(
        CHAIN_ID,
        WizardStep::Registry,
        &escrow_input(500),
        &PriorIds::default(),
    );

    assert_eq!(
        validation_error(result),
        ValidationError::StepMismatch {
            expected: WizardStep::Registry,
            found: WizardStep::Escrow
        }
    );
}

#[test]
fn test_missing_deployment_is_configuration_error() {
    let registry = ContractRegistry::new().with_deployment(
        CHAIN_ID,
        ContractKind::StudyEscrow,
        Address::repeat_byte(0x11),
    );
    let builder = TransactionBuilder::new(registry);

    let result = builder.build_step_transaction(
        1,
        WizardStep::Escrow,
        &escrow_input(500),
        &PriorIds::default(),
    );

    assert!(matches!(
        result,
        Err(BuildError::Configuration(ConfigurationError::NotDeployed {
            contract: ContractKind::StudyEscrow,
            chain_id: 1
        }))
    ));
}

#[test]
fn test_step_input_json_form() {
    let json = r#"{
        "step": "milestones",
        "milestones": [
            { "description": "Baseline visit", "rewardAmount": "250", "kind": "enrollment" },
            { "description": "Final visit", "rewardAmount": "250" }
        ]
    }"#;

    let input: StepInput = serde_json::from_str(json).unwrap();

    assert_eq!(input.step(), WizardStep::Milestones);
    let StepInput::Milestones(milestones) = input else {
        panic!("Expected milestones input");
    };
    assert_eq!(milestones.milestones.len(), 2);
    assert_eq!(milestones.milestones[0].reward_amount, U256::from(250));
    assert_eq!(milestones.milestones[0].kind.as_u8(), 0);
    assert_eq!(milestones.milestones[1].kind.as_u8(), 1);
}
