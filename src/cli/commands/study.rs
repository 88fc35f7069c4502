//! Study index query commands

use alloy_primitives::U256;

use crate::cli::commands::output::emit;
use crate::cli::commands::{parse_session_id, parse_tx_hash, CommandContext, CommandError};
use crate::storage::StudyIndexEntry;
use crate::types::parse_u256;

/// Show the index entry of a session
pub fn show(ctx: &CommandContext, session_id: String) -> Result<(), CommandError> {
    let session_id = parse_session_id(&session_id)?;
    let config = ctx.load_config()?;
    let indexer = ctx.open_indexer(&config)?;

    let entry = indexer
        .get_entry(session_id)?
        .ok_or_else(|| CommandError::NotFound(format!("No index entry for session {}", session_id)))?;

    emit(ctx.format, &entry, print_entry)
}

/// Find an index entry by transaction hash or by composite key
pub fn find(
    ctx: &CommandContext,
    tx_hash: Option<String>,
    registry_id: Option<String>,
    escrow_id: Option<String>,
) -> Result<(), CommandError> {
    let config = ctx.load_config()?;
    let indexer = ctx.open_indexer(&config)?;

    let entry = match (tx_hash, registry_id, escrow_id) {
        (Some(hash), _, _) => {
            let hash = parse_tx_hash(&hash)?;
            indexer.get_entry_by_tx_hash(hash)?
        }
        (None, Some(registry_id), Some(escrow_id)) => {
            let registry_id = parse_id(&registry_id)?;
            let escrow_id = parse_id(&escrow_id)?;
            indexer.get_entry_by_key(registry_id, escrow_id, config.chain.chain_id)?
        }
        _ => {
            return Err(CommandError::InvalidArgument(
                "Provide --tx-hash or both --registry-id and --escrow-id".to_string(),
            ))
        }
    };

    let entry = entry.ok_or_else(|| CommandError::NotFound("No matching study".to_string()))?;

    emit(ctx.format, &entry, print_entry)
}

fn parse_id(s: &str) -> Result<U256, CommandError> {
    parse_u256(s).map_err(|e| CommandError::InvalidArgument(format!("Invalid id '{}': {}", s, e)))
}

fn print_entry(entry: &StudyIndexEntry) {
    println!("Study {}", entry.title.as_deref().unwrap_or("(untitled)"));
    println!("  Session:    {}", entry.session_id);
    println!("  Chain id:   {}", entry.chain_id);
    println!("  Researcher: {}", entry.researcher_address);
    println!("  Status:     {}", entry.status);
    if let Some(funding) = entry.total_funding {
        println!("  Funding:    {} wei", funding);
    }
    println!();

    if let (Some(id), Some(tx), Some(block)) =
        (entry.escrow_id, entry.escrow_tx_hash, entry.escrow_block_number)
    {
        println!("  Escrow     id {} (tx {}, block {})", id, tx, block);
    }
    if let (Some(id), Some(tx), Some(block)) =
        (entry.registry_id, entry.registry_tx_hash, entry.registry_block_number)
    {
        println!("  Registry   id {} (tx {}, block {})", id, tx, block);
    }
    if let (Some(tx), Some(block)) = (entry.criteria_tx_hash, entry.criteria_block_number) {
        println!("  Criteria   tx {} (block {})", tx, block);
    }
    if let (Some(tx), Some(block)) = (entry.milestones_tx_hash, entry.milestones_block_number) {
        let ids: Vec<String> = entry.milestone_ids.iter().map(|id| id.to_string()).collect();
        println!("  Milestones ids [{}] (tx {}, block {})", ids.join(", "), tx, block);
    }
}
