//! DataChat - conversational data-analytics client
//!
//! Main entry point for the DataChat terminal client.

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use datachat::cli::{Cli, Commands};
use datachat::commands;
use datachat::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Chat {
            resume,
            new,
            project,
        } => {
            tracing::info!("Starting interactive chat mode");
            if let Some(session) = &resume {
                tracing::debug!("Resuming session: {}", session);
            }
            if new {
                tracing::debug!("Minting a fresh thread id");
            }

            commands::chat::run_chat(config, resume, new, project).await?;
            Ok(())
        }
        Commands::Sessions { command } => {
            tracing::info!("Managing sessions");
            commands::sessions::handle_sessions(config, command).await?;
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "datachat=debug"
    } else {
        "datachat=info"
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
