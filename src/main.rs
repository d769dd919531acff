//! Runboard - Main Entry Point
//!
//! Experiment-tracking API server and local training runner.

use clap::Parser;
use runboard::cli::{cmd_models, cmd_serve, cmd_train, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "runboard=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Train { data, model, params }) => {
            tokio::task::spawn_blocking(move || cmd_train(&data, &model, &params)).await??;
        }
        Some(Commands::Models) => {
            cmd_models()?;
        }
        Some(Commands::Serve { port, host }) => {
            cmd_serve(host, port).await?;
        }
        None => {
            cmd_serve(None, None).await?;
        }
    }

    Ok(())
}
