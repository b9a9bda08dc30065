//! LanShare command-line entry point.

mod app;
mod config;
mod files;
mod speed;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lanshare")]
#[command(about = "Send files to devices on the local network", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen for incoming transfers
    Serve {
        /// Directory accepted files are saved into
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Accept every request without asking
        #[arg(long)]
        auto_accept: bool,
    },
    /// Send one file
    Send {
        /// Recipient, as `host`, `ip` or `ip:port`
        addr: String,

        /// File to send
        file: PathBuf,

        /// Encrypt the payload
        #[arg(long)]
        encrypt: bool,
    },
    /// Ask a device for its name and platform
    Probe {
        /// Device to ask, as `host`, `ip` or `ip:port`
        addr: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = config::Config::load()?;
    tracing::debug!(name = %config.name, port = config.port, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(async {
        match cli.command {
            Commands::Serve { dir, auto_accept } => {
                let dir = dir.unwrap_or_else(|| PathBuf::from(&config.download_dir));
                let auto_accept = auto_accept || config.auto_accept;
                app::serve(&config, dir, auto_accept).await
            }
            Commands::Send {
                addr,
                file,
                encrypt,
            } => app::send(&config, &addr, file, encrypt).await,
            Commands::Probe { addr } => app::probe(&config, &addr).await,
        }
    });
    // The stdin reader may be parked in a blocking read.
    rt.shutdown_background();
    result
}
