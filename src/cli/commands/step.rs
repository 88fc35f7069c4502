//! Step command implementations

use std::path::PathBuf;

use serde::Serialize;

use crate::cli::commands::output::emit;
use crate::cli::commands::{
    parse_session_id, parse_tx_hash, read_step_input, CommandContext, CommandError,
};
use crate::contracts::UnsignedTransaction;
use crate::types::{OutputFormat, WizardStep};

/// Build the unsigned transaction for a step
///
/// The transaction is printed for the wallet to sign; nothing is recorded
/// until `step submit` reports the broadcast hash.
pub fn build(ctx: &CommandContext, session_id: String, input: PathBuf) -> Result<(), CommandError> {
    let session_id = parse_session_id(&session_id)?;
    let input = read_step_input(&input)?;
    let (_, mut orchestrator) = ctx.orchestrator()?;

    let mut session = orchestrator.resume(session_id)?;
    let transaction = orchestrator.build(&mut session, input)?;

    emit(ctx.format, &transaction, print_transaction)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitOutput {
    session_id: String,
    step: WizardStep,
    tx_hash: String,
    already_submitted: bool,
}

/// Record the hash of a transaction broadcast by the wallet
pub fn submit(
    ctx: &CommandContext,
    session_id: String,
    input: PathBuf,
    tx_hash: String,
) -> Result<(), CommandError> {
    let session_id = parse_session_id(&session_id)?;
    let tx_hash = parse_tx_hash(&tx_hash)?;
    let input = read_step_input(&input)?;
    let step = input.step();
    let (_, mut orchestrator) = ctx.orchestrator()?;

    let mut session = orchestrator.resume(session_id)?;

    let already_submitted = matches!(
        session.in_flight(),
        Some((s, hash, _)) if s == step && hash == tx_hash
    );

    if !already_submitted {
        orchestrator.build(&mut session, input)?;
        orchestrator.submit(&mut session, step, tx_hash)?;
    }

    let output = SubmitOutput {
        session_id: session.id.to_string(),
        step,
        tx_hash: format!("{}", tx_hash),
        already_submitted,
    };

    emit(ctx.format, &output, |o| {
        if o.already_submitted {
            println!("✓ {} transaction already recorded as in flight", o.step);
        } else {
            println!("✓ {} transaction recorded", o.step);
        }
        println!("  Tx hash: {}", o.tx_hash);
        println!();
        println!("  Next: study-wizard step confirm {}", o.session_id);
    })
}

/// Wait for the in-flight transaction and index its result
pub async fn confirm(ctx: &CommandContext, session_id: String) -> Result<(), CommandError> {
    let session_id = parse_session_id(&session_id)?;
    let (_, mut orchestrator) = ctx.orchestrator()?;

    let mut session = orchestrator.resume(session_id)?;
    orchestrator.reader().ensure_chain().await?;

    let show_progress = ctx.format == OutputFormat::Text;
    let result = orchestrator
        .confirm_with_progress(&mut session, |message| {
            if show_progress {
                println!("  {}", message);
            }
        })
        .await?;

    emit(ctx.format, &result, |r| {
        if r.already_recorded {
            println!("✓ {} already indexed", r.recorded.step);
        } else {
            println!("✓ {} confirmed and indexed", r.recorded.step);
        }
        println!("  Id:     {}", r.recorded.extracted_id);
        println!("  Block:  {}", r.recorded.block_number);
        println!("  Status: {}", r.entry.status);
        println!();
        match session.next_step() {
            Some(step) => println!("  Next step: {}", step),
            None => println!("  ✓ Study fully created"),
        }
    })
}

fn print_transaction(tx: &UnsignedTransaction) {
    println!("✓ {} transaction built", tx.step);
    println!();
    println!("  Chain id:  {}", tx.chain_id);
    println!("  To:        {} ({})", tx.to, tx.contract);
    println!("  Function:  {}", tx.signature);
    for arg in &tx.args {
        println!("    {:<18} {}", arg.name, arg.value);
    }
    println!("  Value:     {} wei", tx.value);
    println!("  Data:      {}", tx.data);
    println!();
    println!("  Sign and broadcast with the session owner's wallet, then run `step submit`");
}
