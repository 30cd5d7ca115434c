//! mdrive: certificate renewal drive for managed domains
//!
//! Main binary with subcommands:
//! - `daemon`: Drive renewals until interrupted
//! - `status`: Show the persisted drive state of every domain
//! - `reset`: Discard a domain's drive state and staged progress

use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mdrive_store::FsStore;

mod config;
mod daemon;
mod renewer;
mod status;

use config::Config;

#[derive(Parser)]
#[command(name = "mdrive")]
#[command(about = "Certificate renewal drive for managed domains", long_about = None)]
struct Cli {
    /// Configuration file (defaults to <config dir>/mdrive/config.json)
    #[arg(long, global = true, env = "MDRIVE_CONFIG")]
    config: Option<PathBuf>,

    /// Store directory, overrides store_dir from the configuration
    #[arg(long, global = true, env = "MDRIVE_STORE_DIR")]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive renewals of all watched domains until interrupted
    Daemon,

    /// Show the drive state of every configured domain
    Status,

    /// Purge a domain's job record, staged progress and challenge artifacts
    Reset {
        /// Domain name
        domain: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "mdrive=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path().map_err(|e| miette::miette!("{}", e))?,
    };
    let config = Config::load(&config_path)
        .await
        .map_err(|e| miette::miette!("{}", e))?;
    let store_dir = config
        .store_dir(cli.store_dir)
        .map_err(|e| miette::miette!("{}", e))?;

    match cli.command {
        Commands::Daemon => daemon::run(config, store_dir).await,

        Commands::Status => {
            let store = FsStore::new(&store_dir);
            let now = Utc::now();
            let registry = config
                .registry(&store, now)
                .await
                .map_err(|e| miette::miette!("{}", e))?;
            let rows = status::collect(&registry, &store, now)
                .await
                .map_err(|e| miette::miette!("failed to read drive state: {}", e))?;
            print!("{}", status::render(&rows, now));
            Ok(())
        }

        Commands::Reset { domain } => {
            let store = FsStore::new(&store_dir);
            mdrive_scheduler::reset_domain(&store, &domain)
                .await
                .map_err(|e| miette::miette!("failed to reset {}: {}", domain, e))?;
            println!("reset drive state of {domain}");
            Ok(())
        }
    }
}
