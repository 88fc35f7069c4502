//! Session command implementations

use crate::cli::commands::output::emit;
use crate::cli::commands::{parse_address, parse_session_id, CommandContext, CommandError};
use crate::session::{StepState, WizardSession};

/// Start a new wizard session
pub fn start(ctx: &CommandContext, owner: String) -> Result<(), CommandError> {
    let owner = parse_address(&owner)?;
    let (config, mut orchestrator) = ctx.orchestrator()?;

    let session = orchestrator.start(owner, config.chain.chain_id)?;

    emit(ctx.format, &session, |s| {
        println!("✓ Session started");
        println!();
        println!("  Session id: {}", s.id);
        println!("  Owner:      {}", s.owner);
        println!("  Chain id:   {}", s.chain_id);
        println!();
        println!("  Next: study-wizard step build {} --input escrow.json", s.id);
    })
}

/// Show a session's step states
pub fn show(ctx: &CommandContext, session_id: String) -> Result<(), CommandError> {
    let session_id = parse_session_id(&session_id)?;
    let (_, orchestrator) = ctx.orchestrator()?;

    let session = orchestrator.resume(session_id)?;

    emit(ctx.format, &session, print_session)
}

/// List all sessions
pub fn list(ctx: &CommandContext) -> Result<(), CommandError> {
    let config = ctx.load_config()?;
    let indexer = ctx.open_indexer(&config)?;

    let sessions = indexer.list_sessions()?;

    emit(ctx.format, &sessions, |sessions| {
        if sessions.is_empty() {
            println!("No sessions found.");
            return;
        }
        println!("Sessions:");
        for summary in sessions {
            println!(
                "  {}  chain {:<9} {:<15} {}",
                summary.session.id,
                summary.session.chain_id,
                summary.status,
                summary.title.as_deref().unwrap_or("(untitled)")
            );
        }
    })
}

pub(crate) fn print_session(session: &WizardSession) {
    println!("Session {}", session.id);
    println!("  Owner:    {}", session.owner);
    println!("  Chain id: {}", session.chain_id);
    if let Some(funding) = session.total_funding {
        println!("  Funding:  {} wei", funding);
    }
    println!();

    for (step, state) in session.steps() {
        let detail = match state {
            StepState::NotStarted => String::new(),
            StepState::Built { transaction, .. } => format!("{} -> {}", transaction.function, transaction.to),
            StepState::AwaitingConfirmation { tx_hash, .. } => format!("tx {}", tx_hash),
            StepState::Confirmed {
                extracted_id,
                block_number,
                ..
            } => format!("id {} (block {})", extracted_id, block_number),
            StepState::Failed { kind, reason, .. } => format!("{}: {}", kind, reason),
        };
        println!("  {:<11} {:<22} {}", step.as_str(), state.status().to_string(), detail);
    }

    println!();
    match session.next_step() {
        Some(step) => println!("  Next step: {}", step),
        None => println!("  ✓ All steps confirmed"),
    }
}
