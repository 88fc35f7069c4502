//! Audit command implementation

use crate::audit::{audit_session, AuditStatus};
use crate::cli::commands::output::emit;
use crate::cli::commands::{parse_session_id, CommandContext, CommandError};

/// Compare a session's recorded steps with on-chain logs
pub async fn run(ctx: &CommandContext, session_id: String) -> Result<(), CommandError> {
    let session_id = parse_session_id(&session_id)?;
    let (_, orchestrator) = ctx.orchestrator()?;
    orchestrator.reader().ensure_chain().await?;
    let head = orchestrator.reader().get_block_number().await?;
    log::info!("Auditing session {} against chain head {}", session_id, head);

    let audits = audit_session(
        orchestrator.indexer(),
        orchestrator.builder().registry(),
        orchestrator.reader(),
        session_id,
    )
    .await?;

    emit(ctx.format, &audits, |audits| {
        if audits.is_empty() {
            println!("No recorded steps for session {}", session_id);
            return;
        }

        println!("Audit of session {}:", session_id);
        for audit in audits {
            let marker = match audit.status {
                AuditStatus::Consistent => "✓",
                AuditStatus::Missing | AuditStatus::Diverged => "✗",
            };
            println!(
                "  {} {:<11} {:<10} block {} tx {}",
                marker, audit.step.as_str(), audit.status.to_string(), audit.block_number, audit.tx_hash
            );
            if audit.status == AuditStatus::Diverged {
                let recorded: Vec<String> = audit.recorded_ids.iter().map(|id| id.to_string()).collect();
                let onchain: Vec<String> = audit.onchain_ids.iter().map(|id| id.to_string()).collect();
                println!("      recorded [{}], on chain [{}]", recorded.join(", "), onchain.join(", "));
            }
        }
    })
}
