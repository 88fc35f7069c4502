//! Tests for auditing the index against on-chain logs

mod common;

use alloy_primitives::U256;
use common::*;
use study_wizard::audit::{audit_session, AuditError, AuditStatus};
use study_wizard::contracts::ContractRegistry;
use study_wizard::types::WizardStep;

async fn complete_study(env: &mut TestEnv) -> uuid::Uuid {
    let mut session = env.orchestrator.start(owner(), CHAIN_ID).unwrap();
    let steps = [
        (escrow_input(500), 1u8, 100u64, vec![42u64]),
        (registry_input(), 2, 101, vec![7]),
        (criteria_input(), 3, 102, vec![7]),
        (milestones_input(&[300, 200]), 4, 103, vec![1, 2]),
    ];
    for (input, n, block, ids) in steps {
        let step = input.step();
        env.orchestrator.build(&mut session, input).unwrap();
        env.orchestrator
            .submit(&mut session, step, tx_hash(n))
            .unwrap();
        env.chain().mine(step_receipt(step, tx_hash(n), block, &ids));
        env.orchestrator.confirm(&mut session).await.unwrap();
    }
    session.id
}

#[tokio::test]
async fn test_audit_of_consistent_study() {
    let mut env = TestEnv::new();
    let session_id = complete_study(&mut env).await;

    let audits = audit_session(
        env.orchestrator.indexer(),
        env.orchestrator.builder().registry(),
        env.orchestrator.reader(),
        session_id,
    )
    .await
    .unwrap();

    assert_eq!(audits.len(), 4);
    let steps: Vec<WizardStep> = audits.iter().map(|a| a.step).collect();
    assert_eq!(steps, WizardStep::ALL.to_vec());
    assert!(audits.iter().all(|a| a.status == AuditStatus::Consistent));
    assert_eq!(audits[0].contract, escrow_contract());
    assert_eq!(audits[1].contract, registry_contract());
    assert_eq!(audits[3].onchain_ids, vec![U256::from(1), U256::from(2)]);
}

#[tokio::test]
async fn test_audit_detects_diverged_and_missing_logs() {
    let mut env = TestEnv::new();
    let session_id = complete_study(&mut env).await;

    env.chain().rewrite_logs(
        tx_hash(2),
        vec![step_log(WizardStep::Registry, 8, 101, tx_hash(2))],
    );
    env.chain().rewrite_logs(tx_hash(4), Vec::new());

    let audits = audit_session(
        env.orchestrator.indexer(),
        env.orchestrator.builder().registry(),
        env.orchestrator.reader(),
        session_id,
    )
    .await
    .unwrap();

    assert_eq!(audits[0].status, AuditStatus::Consistent);
    assert_eq!(audits[1].status, AuditStatus::Diverged);
    assert_eq!(audits[1].recorded_ids, vec![U256::from(7)]);
    assert_eq!(audits[1].onchain_ids, vec![U256::from(8)]);
    assert_eq!(audits[3].status, AuditStatus::Missing);
}

#[tokio::test]
async fn test_audit_needs_deployments_for_session_chain() {
    let mut env = TestEnv::new();
    let session_id = complete_study(&mut env).await;

    let result = audit_session(
        env.orchestrator.indexer(),
        &ContractRegistry::new(),
        env.orchestrator.reader(),
        session_id,
    )
    .await;

    assert!(matches!(result, Err(AuditError::Configuration(_))));
}
