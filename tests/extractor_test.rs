//! Tests for receipt id extraction

mod common;

use alloy_primitives::{B256, U256};
use common::*;
use study_wizard::contracts::extractor::{ids_from_logs, step_event};
use study_wizard::contracts::{extract_step_id, ExtractedId, ExtractionError};
use study_wizard::types::WizardStep;

#[test]
fn test_extract_escrow_id_from_first_topic() {
    let receipt = step_receipt(WizardStep::Escrow, tx_hash(1), 100, &[42]);

    let id = extract_step_id(WizardStep::Escrow, &receipt).unwrap();

    assert_eq!(id, ExtractedId::Escrow(U256::from(42)));
    assert_eq!(id.primary(), Some(U256::from(42)));
}

#[test]
fn test_extract_fails_on_receipt_without_logs() {
    let receipt = receipt(tx_hash(1), 100, owner(), Vec::new());

    let result = extract_step_id(WizardStep::Escrow, &receipt);

    assert_eq!(result, Err(ExtractionError::NoLogs));
}

#[test]
fn test_extract_rejects_unexpected_first_event() {
    let mut logs = vec![foreign_log(100, tx_hash(1))];
    logs.push(step_log(WizardStep::Registry, 9, 100, tx_hash(1)));
    let receipt = receipt(tx_hash(1), 100, owner(), logs);

    let result = extract_step_id(WizardStep::Registry, &receipt);

    assert!(
        matches!(
            result,
            Err(ExtractionError::UnexpectedEvent { expected: "StudyPublished", found: Some(_) })
        ),
        "First log must be the step's event, got {:?}",
        result
    );
}

#[test]
fn test_extract_requires_event_signature_topic() {
    let mut log = step_log(WizardStep::Escrow, 42, 100, tx_hash(1));
    log.topics[0] = B256::ZERO;
    let receipt = receipt(tx_hash(1), 100, owner(), vec![log]);

    let result = extract_step_id(WizardStep::Escrow, &receipt);

    assert_eq!(
        result,
        Err(ExtractionError::UnexpectedEvent {
            expected: "EscrowCreated",
            found: Some(B256::ZERO),
        })
    );
}

#[test]
fn test_extract_fails_when_id_topic_missing() {
    let mut log = step_log(WizardStep::Criteria, 5, 100, tx_hash(1));
    log.topics.truncate(1);
    let receipt = receipt(tx_hash(1), 100, owner(), vec![log]);

    let result = extract_step_id(WizardStep::Criteria, &receipt);

    assert_eq!(
        result,
        Err(ExtractionError::MissingTopic {
            log_index: 0,
            topic_index: 1
        })
    );
}

#[test]
fn test_extract_reverted_receipt_fails() {
    let mut receipt = step_receipt(WizardStep::Escrow, tx_hash(1), 100, &[42]);
    receipt.status = 0;

    assert_eq!(
        extract_step_id(WizardStep::Escrow, &receipt),
        Err(ExtractionError::Reverted)
    );
}

#[test]
fn test_extract_milestone_ids_in_log_order() {
    let tx = tx_hash(4);
    let logs = vec![
        step_log(WizardStep::Milestones, 7, 200, tx),
        foreign_log(200, tx),
        step_log(WizardStep::Milestones, 8, 200, tx),
        step_log(WizardStep::Milestones, 9, 200, tx),
    ];
    let receipt = receipt(tx, 200, owner(), logs);

    let id = extract_step_id(WizardStep::Milestones, &receipt).unwrap();

    assert_eq!(
        id,
        ExtractedId::Milestones(vec![U256::from(7), U256::from(8), U256::from(9)])
    );
    assert_eq!(id.to_string(), "[7, 8, 9]");
}

#[test]
fn test_extract_milestones_without_matching_events() {
    let receipt = receipt(tx_hash(4), 200, owner(), vec![foreign_log(200, tx_hash(4))]);

    let result = extract_step_id(WizardStep::Milestones, &receipt);

    assert_eq!(
        result,
        Err(ExtractionError::NoMatchingEvents {
            event: "MilestoneCreated"
        })
    );
}

#[test]
fn test_large_ids_survive_extraction() {
    let tx = tx_hash(2);
    let mut log = step_log(WizardStep::Registry, 0, 100, tx);
    log.topics[1] = B256::repeat_byte(0xff);
    let receipt = receipt(tx, 100, owner(), vec![log]);

    let id = extract_step_id(WizardStep::Registry, &receipt).unwrap();

    assert_eq!(id, ExtractedId::Registry(U256::MAX));
    assert_eq!(
        ExtractedId::from_db_string(WizardStep::Registry, &id.to_db_string()).unwrap(),
        id
    );
}

#[test]
fn test_extracted_id_from_db_string_rejects_wrong_arity() {
    assert!(ExtractedId::from_db_string(WizardStep::Escrow, "1,2").is_err());
    assert!(ExtractedId::from_db_string(WizardStep::Milestones, "").is_err());
    assert_eq!(
        ExtractedId::from_db_string(WizardStep::Milestones, "3,4").unwrap(),
        ExtractedId::Milestones(vec![U256::from(3), U256::from(4)])
    );
}

#[test]
fn test_ids_from_logs_filters_by_event() {
    let tx = tx_hash(3);
    let logs = vec![
        foreign_log(10, tx),
        step_log(WizardStep::Escrow, 11, 10, tx),
        step_log(WizardStep::Registry, 12, 10, tx),
    ];

    assert_eq!(ids_from_logs(WizardStep::Escrow, &logs), vec![U256::from(11)]);
    assert_eq!(ids_from_logs(WizardStep::Registry, &logs), vec![U256::from(12)]);
    assert!(ids_from_logs(WizardStep::Milestones, &logs).is_empty());
}

#[test]
fn test_step_events_have_distinct_topics() {
    let topics: std::collections::HashSet<_> =
        WizardStep::ALL.iter().map(|s| step_event(*s).topic()).collect();
    assert_eq!(topics.len(), 4);
}
