// SPDX-FileCopyrightText: 2026 Outpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outpost - outbound WhatsApp message pipeline.
//!
//! `outpost serve` runs the HTTP trigger server. The `dispatch`, `ingest`,
//! and `followup` subcommands run a single cycle and print its summary as
//! JSON, for cron-style scheduling.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod cycles;
mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Outpost - outbound WhatsApp message pipeline.
#[derive(Parser, Debug)]
#[command(name = "outpost", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the default search path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP trigger server.
    Serve,
    /// Run one outbox dispatch cycle.
    Dispatch {
        /// Override `dispatch.max_channels`.
        #[arg(long)]
        max_channels: Option<usize>,
        /// Override `dispatch.items_per_channel`.
        #[arg(long)]
        items_per_channel: Option<usize>,
    },
    /// Process one batch of stored webhook events.
    Ingest {
        /// Override `ingest.batch_size`.
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Reconcile and schedule follow-ups once.
    Followup,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => outpost_config::load_and_validate_path(path),
        None => outpost_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            outpost_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.service.log_level);

    let result = match cli.command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Dispatch {
            max_channels,
            items_per_channel,
        } => cycles::run_dispatch(config, max_channels, items_per_channel).await,
        Commands::Ingest { batch_size } => cycles::run_ingest(config, batch_size).await,
        Commands::Followup => cycles::run_followup(config).await,
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "outpost exited with an error");
        eprintln!("outpost: {e}");
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins over the configured level when set.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("outpost={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn parses_cycle_overrides() {
        let cli = Cli::parse_from([
            "outpost",
            "--config",
            "/tmp/outpost.toml",
            "dispatch",
            "--max-channels",
            "3",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/outpost.toml")));
        match cli.command {
            Commands::Dispatch {
                max_channels,
                items_per_channel,
            } => {
                assert_eq!(max_channels, Some(3));
                assert_eq!(items_per_channel, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
