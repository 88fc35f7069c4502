//! Study Wizard CLI
//!
//! Command-line interface for creating clinical studies on-chain step by step

use clap::Parser;
use std::process;
use study_wizard::cli::args::{
    Cli, Commands, ConfigAction, SessionAction, StepAction, StudyAction,
};
use study_wizard::cli::commands::{self, output::error_envelope, CommandContext, CommandError};
use study_wizard::config::{ConfigOverrides, NetworkType};
use study_wizard::types::OutputFormat;

fn main() {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let network = match cli.network.as_deref().map(str::parse::<NetworkType>).transpose() {
        Ok(network) => network,
        Err(e) => {
            report(format, &format!("{}. Use: local, sepolia, or mainnet", e));
            process::exit(1);
        }
    };

    // Build config overrides from global arguments
    let overrides = ConfigOverrides {
        network,
        chain_id: cli.chain_id,
        rpc_url: cli.rpc_url.clone(),
        data_dir: cli.data_dir.clone(),
        ..ConfigOverrides::default()
    };

    let ctx = CommandContext {
        config_path: cli.config.clone(),
        overrides,
        format,
    };

    let result = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt.block_on(run(cli.command, &ctx)),
        Err(e) => Err(CommandError::Io(e)),
    };

    if let Err(e) = result {
        report(format, &e.to_string());
        process::exit(1);
    }
}

async fn run(command: Commands, ctx: &CommandContext) -> Result<(), CommandError> {
    match command {
        Commands::Config { action } => match action {
            ConfigAction::Init { network } => {
                commands::config::init(network, ctx.config_path.as_deref(), ctx.format)
            }
        },

        Commands::Session { action } => match action {
            SessionAction::Start { owner } => commands::session::start(ctx, owner),
            SessionAction::Show { session_id } => commands::session::show(ctx, session_id),
            SessionAction::List => commands::session::list(ctx),
        },

        Commands::Step { action } => match action {
            StepAction::Build { session_id, input } => {
                commands::step::build(ctx, session_id, input)
            }
            StepAction::Submit {
                session_id,
                input,
                tx_hash,
            } => commands::step::submit(ctx, session_id, input, tx_hash),
            StepAction::Confirm { session_id } => commands::step::confirm(ctx, session_id).await,
        },

        Commands::Study { action } => match action {
            StudyAction::Show { session_id } => commands::study::show(ctx, session_id),
            StudyAction::Find {
                tx_hash,
                registry_id,
                escrow_id,
            } => commands::study::find(ctx, tx_hash, registry_id, escrow_id),
        },

        Commands::Audit { session_id } => commands::audit::run(ctx, session_id).await,
    }
}

fn report(format: OutputFormat, message: &str) {
    match format {
        OutputFormat::Json => println!("{}", error_envelope(message)),
        OutputFormat::Text => eprintln!("Error: {}", message),
    }
}
