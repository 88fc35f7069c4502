//! Config command implementations

use std::path::Path;

use serde::Serialize;

use crate::cli::commands::output::emit;
use crate::cli::commands::CommandError;
use crate::config::{GlobalConfig, NetworkType};
use crate::types::OutputFormat;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InitOutput {
    network: NetworkType,
    chain_id: u64,
    rpc_url: String,
    config_file: String,
}

/// Initialize configuration file with network-specific defaults
pub fn init(
    network: Option<String>,
    config_path: Option<&Path>,
    format: OutputFormat,
) -> Result<(), CommandError> {
    let network_type = match network.as_deref() {
        Some(n) => n.parse::<NetworkType>()?,
        None => NetworkType::Local,
    };

    let config = GlobalConfig::for_network(network_type);
    crate::config::save_config(&config, config_path)?;

    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => crate::config::default_config_path()?,
    };

    let output = InitOutput {
        network: network_type,
        chain_id: config.chain.chain_id,
        rpc_url: config.chain.rpc_url.clone(),
        config_file: path.display().to_string(),
    };

    emit(format, &output, |o| {
        println!("✓ Configuration initialized for {:?}", o.network);
        println!("  Chain id:    {}", o.chain_id);
        println!("  RPC URL:     {}", o.rpc_url);
        println!("  Config file: {}", o.config_file);
        println!();
        println!("  Add contract addresses under \"deployments\" or in deployments.json");
    })
}
