//! MeshLink CLI entry point

use clap::Parser;
use tracing::{error, info};

use meshlink_cli::{
    app::{MeshApp, TransportSelection},
    cli::Cli,
    commands::CommandDispatcher,
    config::AppConfig,
    error::Result,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    setup_logging(cli.verbose);

    // Load configuration, then let flags override it
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.tcp.hosts.extend(cli.hosts.iter().cloned());

    let app = match MeshApp::new(config, TransportSelection::from_cli(&cli)) {
        Ok(app) => app,
        Err(e) => {
            error!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = CommandDispatcher::execute(cli.command, app).await {
        error!("Command execution failed: {}", e);
        std::process::exit(1);
    }

    info!("MeshLink CLI exited successfully");
    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
