//! Facecloak CLI - anonymize faces in photos before they are shared.
//!
//! Faces are blurred locally, the blurred photo is uploaded to object storage
//! and a remote service re-anonymizes it server-side.
//!
//! # Usage
//!
//! ```bash
//! # Blur faces in a photo (or a whole directory) without uploading
//! facecloak anonymize ./photos/ --output results.jsonl --format jsonl
//!
//! # Full pipeline: blur, upload, remote re-processing
//! facecloak upload stall.jpg --owner 3f2c9a
//!
//! # Pre-flight connectivity check
//! facecloak check
//!
//! # View configuration
//! facecloak config show
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// Facecloak - anonymize faces in photos before they are shared.
#[derive(Parser, Debug)]
#[command(name = "facecloak")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Detect and blur faces locally
    Anonymize(cli::anonymize::AnonymizeArgs),

    /// Blur, upload and remotely re-process a photo
    Upload(cli::upload::UploadArgs),

    /// Check database and anonymization service reachability
    Check(cli::check::CheckArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so config warnings go through eprintln
    let config = match facecloak_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `facecloak config path`."
            );
            facecloak_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("facecloak v{}", facecloak_core::VERSION);

    match cli.command {
        Commands::Anonymize(args) => cli::anonymize::execute(args).await,
        Commands::Upload(args) => cli::upload::execute(args).await,
        Commands::Check(args) => cli::check::execute(args).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}
