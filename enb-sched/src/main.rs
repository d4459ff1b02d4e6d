/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::{error, info, warn};

use enb_sched::config::{load_slice_requests, SchedConfigManager};
use enb_sched::Scheduler;

// ── CLI argument definition ───────────────────────────────────────────────────

/// Validate a scheduler configuration and optional slice requests.
///
/// Example:
///   enb-sched --config sched.yaml --slices slices.yaml
#[derive(Debug, Parser)]
#[command(
    name = "enb-sched",
    about = "LTE eNB MAC scheduler – configuration checker",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML scheduler / cell configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// YAML file with slice-control requests applied after cell setup.
    #[arg(short = 's', long = "slices")]
    slices: Option<PathBuf>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!(config = ?cli.config, slices = ?cli.slices, "Configuration");

    // ── Load scheduler configuration ──────────────────────────────────────────
    let mut config_manager = SchedConfigManager::new();
    match &cli.config {
        Some(path) => {
            if let Err(e) = config_manager.load_from_file(path) {
                error!("Failed to load scheduler configuration: {:#}", e);
                process::exit(1);
            }
        }
        None => {
            warn!("No configuration file provided, using default scheduler settings");
        }
    }
    let cells = if config_manager.is_loaded() {
        config_manager.cells().to_vec()
    } else {
        vec![Default::default()]
    };

    // ── Configure cells ───────────────────────────────────────────────────────
    let scheduler = Scheduler::new(config_manager.sched_args().clone());
    if let Err(e) = scheduler.cell_cfg(&cells) {
        error!("Cell configuration rejected: {:#}", e);
        process::exit(1);
    }
    info!(nof_carriers = scheduler.nof_carriers(), "Cells configured");

    // ── Apply slice requests ──────────────────────────────────────────────────
    if let Some(path) = &cli.slices {
        let requests = match load_slice_requests(path) {
            Ok(r) => r,
            Err(e) => {
                error!("Failed to load slice requests: {:#}", e);
                process::exit(1);
            }
        };
        for (i, request) in requests.iter().enumerate() {
            if let Err(e) = scheduler.slice(request) {
                error!(request = i, "Slice request rejected: {:#}", e);
                process::exit(1);
            }
        }
        let stats = scheduler.slice_stats();
        info!(sched = ?stats.sched_name, "Slice table:");
        for s in &stats.slices {
            info!(
                "  [{id}] {label}  rbg=[{lo}, {hi})  policy={policy}",
                id = s.id,
                label = s.label,
                lo = s.pos_low,
                hi = s.pos_high,
                policy = s.policy,
            );
        }
    }

    info!("Configuration OK");
}
