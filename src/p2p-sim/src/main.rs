// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod config;
mod scenario;

use std::path::PathBuf;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};

use p2p_app::init_logging;
use p2p_core::DynResult;

use config::SimConfig;

const PKG_DESCRIPTION: &str = concat!(
    env!("CARGO_PKG_NAME"),
    " - P2P remain-on-channel scheduler simulator"
);

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Log level override (trace, debug, info, warn, error)
    #[arg(long = "log-level", short = 'l')]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", SimConfig::example_combined_toml());
        return Ok(());
    }

    let (cfg, config_path) = if let Some(ref path) = cli.config {
        let cfg = SimConfig::load_from_file(path)?;
        (cfg, Some(path.clone()))
    } else {
        SimConfig::load_from_default_paths()?
    };
    cfg.validate()
        .map_err(|e| format!("Invalid simulator configuration: {}", e))?;

    init_logging(
        cli.log_level
            .as_deref()
            .or(cfg.general.log_level.as_deref()),
    );

    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }
    info!(
        "Starting p2p-sim ({} vdevs, {} requests, {} frames)",
        cfg.vdevs.len(),
        cfg.requests.len(),
        cfg.frames.len()
    );

    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(line) = out_rx.recv().await {
            match serde_json::to_string(&line) {
                Ok(json) => println!("{}", json),
                Err(e) => error!("Failed to encode output line: {}", e),
            }
        }
    });

    let report = scenario::run_scenario(&cfg, out_tx).await?;
    printer.await?;
    info!(
        "Simulation finished ({} cancelled, {} timed out during cleanup)",
        report.canceled, report.timed_out
    );
    Ok(())
}
