//! CLI argument definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "study-wizard",
    version,
    about = "Study Wizard - create clinical studies on-chain: escrow, registry, criteria, milestones",
    long_about = None
)]
pub struct Cli {
    /// Network to use: local, sepolia, mainnet (overrides config)
    #[arg(short, long, global = true)]
    pub network: Option<String>,

    /// JSON-RPC endpoint (overrides config)
    #[arg(long, global = true)]
    pub rpc_url: Option<String>,

    /// Chain id (overrides config)
    #[arg(long, global = true)]
    pub chain_id: Option<u64>,

    /// Custom data directory for the study index
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    /// Config file path (defaults to ~/.study-wizard/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print a JSON envelope instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize or manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Wizard session commands
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Build, submit and confirm wizard steps
    Step {
        #[command(subcommand)]
        action: StepAction,
    },

    /// Query the study index
    Study {
        #[command(subcommand)]
        action: StudyAction,
    },

    /// Compare a session's index records with on-chain logs
    Audit {
        /// Session id
        session_id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Initialize configuration file with defaults
    Init {
        /// Network to initialize for (defaults to local)
        #[arg(short, long)]
        network: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// Start a new wizard session
    Start {
        /// Wallet address that will sign every step
        #[arg(short, long)]
        owner: String,
    },

    /// Show a session's step states
    Show {
        /// Session id
        session_id: String,
    },

    /// List all sessions
    List,
}

#[derive(Subcommand, Debug)]
pub enum StepAction {
    /// Build the unsigned transaction for a step
    Build {
        /// Session id
        session_id: String,

        /// Step input JSON file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Record the hash of a transaction broadcast by the wallet
    Submit {
        /// Session id
        session_id: String,

        /// Step input JSON file the transaction was built from
        #[arg(short, long)]
        input: PathBuf,

        /// Transaction hash returned by the wallet
        #[arg(short, long)]
        tx_hash: String,
    },

    /// Wait for the in-flight transaction and index its result
    Confirm {
        /// Session id
        session_id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum StudyAction {
    /// Show the index entry of a session
    Show {
        /// Session id
        session_id: String,
    },

    /// Find an index entry by transaction hash or by (registry id, escrow id)
    Find {
        /// Any recorded step transaction
        #[arg(short, long)]
        tx_hash: Option<String>,

        /// Registry (study) id
        #[arg(long, requires = "escrow_id")]
        registry_id: Option<String>,

        /// Escrow id
        #[arg(long, requires = "registry_id")]
        escrow_id: Option<String>,
    },
}
