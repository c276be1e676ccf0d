use anyhow::Result;
use clap::Parser;
use polyglot_repl::cli::Cli;
use std::path::Path;
use std::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const LOG_FILE_NAME: &str = "polyglot-repl.log";

fn init_tracing(verbose: bool, log_dir: Option<&Path>) -> Result<()> {
    // RUST_LOG wins over the verbosity flag
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(LOG_FILE_NAME))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_path.as_deref())?;
    info!("Starting polyglot-repl");

    // Execute with user-friendly error handling
    match cli.execute().await {
        Ok(code) => {
            info!(code, "Shell finished");
            std::process::exit(code);
        }
        Err(e) => {
            // Log the full error for debugging
            error!("Shell failed: {:?}", e);

            // Display user-friendly error message
            eprintln!("Error: {}", e.user_message());

            std::process::exit(1);
        }
    }
}
