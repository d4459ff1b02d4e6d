/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Manual simulator for the eNB scheduler.
//!
//! A blocking "radio" thread plays the PHY: every TTI it asks for the DL and
//! UL results, then feeds back ACK/NACK, CRC, CQI and buffer reports for the
//! grants it received.  An async control-plane loop applies slice requests
//! and polls UE metrics, the way an E2 agent would.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use enb_sched::config::{load_slice_requests, SchedConfigManager};
use enb_sched::tti::{TtiPoint, FDD_HARQ_DELAY_UL_MS, TX_ENB_DELAY};
use enb_sched::ue::{BearerCfg, BearerDirection, UeCfg};
use enb_sched::Scheduler;

const FIRST_RNTI: u16 = 0x46;
const DRB_LCID: u32 = 3;
const DRB_LCG: u32 = 1;
const CQI_PERIOD: u32 = 5;
const BUFFER_PERIOD: u32 = 20;

// ── CLI argument definition ───────────────────────────────────────────────────

/// eNB scheduler simulator – NOT for production.
///
/// Example:
///   enb-sim --config sched.yaml --slices slices.yaml --ues 8 --ttis 20000
#[derive(Debug, Parser)]
#[command(
    name = "enb-sim",
    about = "Radio / control-plane simulator for enb-sched",
    long_about = None,
)]
struct Cli {
    /// Scheduler / cell configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Slice-control requests applied once the UEs are attached.
    #[arg(short = 's', long = "slices")]
    slices: Option<PathBuf>,

    /// Number of UEs attached at start-up.
    #[arg(short = 'u', long = "ues", default_value_t = 4)]
    ues: u16,

    /// TTIs to simulate.
    #[arg(short = 't', long = "ttis", default_value_t = 10_000)]
    ttis: u32,

    /// Every n-th transmission of a UE is NACKed (0 = never).
    #[arg(long = "nack-every", default_value_t = 10)]
    nack_every: u32,

    /// Bytes added to every DL and UL queue each buffer period.
    #[arg(long = "load", default_value_t = 2_000)]
    load: u32,

    /// Pace the radio loop at one TTI per millisecond.
    #[arg(long = "realtime", default_value_t = false)]
    realtime: bool,

    /// Metrics polling period of the control plane.
    #[arg(long = "metrics-period-ms", default_value_t = 1_000)]
    metrics_period_ms: u64,
}

// ── Radio loop ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Feedback {
    DlAck { rnti: u16, ok: bool },
    UlCrc { rnti: u16, ok: bool },
}

struct Radio {
    scheduler: Arc<Scheduler>,
    rntis: Vec<u16>,
    nack_every: u32,
    load: u32,
    /// Feedback in order of the TTI it is reported at.
    pending: VecDeque<(TtiPoint, Feedback)>,
    dl_queued: Vec<u32>,
    nof_tx: u64,
}

impl Radio {
    fn is_nack(&self, rnti: u16, count: u64) -> bool {
        self.nack_every > 0 && (count + u64::from(rnti)) % u64::from(self.nack_every) == 0
    }

    fn deliver_feedback(&mut self, now: TtiPoint) {
        while let Some(&(due, fb)) = self.pending.front() {
            if due != now {
                break;
            }
            self.pending.pop_front();
            let res = match fb {
                Feedback::DlAck { rnti, ok } => self.scheduler.dl_ack_info(now, rnti, 0, 0, ok),
                Feedback::UlCrc { rnti, ok } => self.scheduler.ul_crc_info(now, rnti, 0, ok),
            };
            match res {
                Ok(outcome) => debug!(tti = %now, ?fb, ?outcome, "feedback"),
                Err(e) => warn!(tti = %now, "feedback dropped: {}", e),
            }
        }
    }

    fn report_channel(&mut self, now: TtiPoint, tick: u32) {
        for (i, &rnti) in self.rntis.iter().enumerate() {
            if tick % CQI_PERIOD == 0 {
                // Spread the UEs over the CQI range.
                let cqi = 6 + (i as u32 * 3 + tick / 100) % 10;
                let _ = self.scheduler.dl_cqi_info(now, rnti, 0, cqi);
                let _ = self.scheduler.ul_snr_info(rnti, 0, 5.0 + i as f32 * 2.0);
            }
            if tick % BUFFER_PERIOD == 0 {
                self.dl_queued[i] = self.dl_queued[i].saturating_add(self.load);
                let _ = self.scheduler.dl_rlc_buffer_state(rnti, DRB_LCID, self.dl_queued[i], 0);
                let _ = self.scheduler.ul_buffer_add(rnti, DRB_LCID, self.load);
            }
        }
    }

    fn run(mut self, ttis: u32, realtime: bool, stop: &AtomicBool) {
        info!(ttis, nof_ues = self.rntis.len(), "radio loop started");
        for tick in 0..ttis {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            let now = TtiPoint::new(tick);
            self.deliver_feedback(now);
            self.report_channel(now, tick);

            // DL is sent at now + 4 and acknowledged 4 TTIs later.
            let tti_tx_dl = now + TX_ENB_DELAY;
            let dl = self.scheduler.dl_sched(tti_tx_dl, 0);
            for g in &dl.data {
                self.nof_tx += 1;
                let ok = !self.is_nack(g.rnti, self.nof_tx);
                if g.nof_retx == 0 {
                    if let Some(i) = self.rntis.iter().position(|&r| r == g.rnti) {
                        self.dl_queued[i] = self.dl_queued[i].saturating_sub(g.tbs);
                    }
                }
                self.pending.push_back((
                    tti_tx_dl + FDD_HARQ_DELAY_UL_MS,
                    Feedback::DlAck { rnti: g.rnti, ok },
                ));
            }

            // PUSCH is received at now + 8; the CRC is known in that TTI.
            let tti_tx_ul = now + TX_ENB_DELAY + FDD_HARQ_DELAY_UL_MS;
            let ul = self.scheduler.ul_sched(tti_tx_ul, 0);
            for g in &ul.pusch {
                self.nof_tx += 1;
                let ok = !self.is_nack(g.rnti, self.nof_tx);
                self.pending
                    .push_back((tti_tx_ul, Feedback::UlCrc { rnti: g.rnti, ok }));
            }

            if !dl.is_empty() || !ul.is_empty() {
                debug!(
                    tti = %now,
                    dl = dl.data.len(),
                    rar = dl.rar.len(),
                    ul = ul.pusch.len(),
                    cce = dl.nof_cce_used,
                    "TTI"
                );
            }
            if realtime {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        info!(nof_tx = self.nof_tx, "radio loop finished");
    }
}

// ── Setup ─────────────────────────────────────────────────────────────────────

fn build_scheduler(cli: &Cli) -> Result<Arc<Scheduler>> {
    let mut config_manager = SchedConfigManager::new();
    if let Some(path) = &cli.config {
        config_manager.load_from_file(path)?;
    } else {
        warn!("No configuration file provided, using default scheduler settings");
    }
    let cells = if config_manager.is_loaded() {
        config_manager.cells().to_vec()
    } else {
        vec![Default::default()]
    };

    let scheduler = Scheduler::new(config_manager.sched_args().clone());
    scheduler
        .cell_cfg(&cells)
        .context("Cell configuration rejected")?;

    let drb = BearerCfg {
        direction: BearerDirection::Both,
        priority: 1,
        group: DRB_LCG,
    };
    for i in 0..cli.ues {
        let rnti = FIRST_RNTI + i;
        scheduler.ue_cfg(rnti, &UeCfg::default())?;
        scheduler.bearer_ue_cfg(rnti, DRB_LCID, drb)?;
        scheduler.phy_config_enabled(rnti, true)?;
    }
    info!(nof_ues = cli.ues, "UEs attached");
    Ok(Arc::new(scheduler))
}

fn apply_slices(scheduler: &Scheduler, path: &Path) -> Result<()> {
    for (i, request) in load_slice_requests(path)?.iter().enumerate() {
        scheduler
            .slice(request)
            .with_context(|| format!("Slice request {} rejected", i))?;
    }
    let stats = scheduler.slice_stats();
    info!(
        sched = ?stats.sched_name,
        nof_slices = stats.slices.len(),
        nof_ues = stats.ues.len(),
        "Slices applied"
    );
    Ok(())
}

fn log_metrics(scheduler: &Scheduler) {
    for m in scheduler.metrics_read_all() {
        info!(
            "  [0x{rnti:x}] slice={slice:?} dl={dl}B ul={ul}B tx={tx}/{txe} rx={rx}/{rxe} cqi={cqi:.1} prb={prb}",
            rnti = m.rnti,
            slice = m.slice_id,
            dl = m.tx_brate,
            ul = m.rx_brate,
            tx = m.tx_pkts,
            txe = m.tx_errors,
            rx = m.rx_pkts,
            rxe = m.rx_errors,
            cqi = m.dl_cqi,
            prb = m.allocated_prbs,
        );
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!(?cli, "enb-sim starting up...");

    let scheduler = match build_scheduler(&cli) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to set up the scheduler: {:#}", e);
            process::exit(1);
        }
    };
    if let Some(path) = &cli.slices {
        if let Err(e) = apply_slices(&scheduler, path) {
            error!("{:#}", e);
            process::exit(1);
        }
    }

    // ── Radio loop ────────────────────────────────────────────────────────────
    let stop = Arc::new(AtomicBool::new(false));
    let radio = Radio {
        scheduler: Arc::clone(&scheduler),
        rntis: (0..cli.ues).map(|i| FIRST_RNTI + i).collect(),
        nack_every: cli.nack_every,
        load: cli.load,
        pending: VecDeque::new(),
        dl_queued: vec![0; usize::from(cli.ues)],
        nof_tx: 0,
    };
    let (ttis, realtime) = (cli.ttis, cli.realtime);
    let radio_stop = Arc::clone(&stop);
    let mut radio_handle =
        tokio::task::spawn_blocking(move || radio.run(ttis, realtime, &radio_stop));

    // ── Control plane ─────────────────────────────────────────────────────────
    let mut ticker = interval(Duration::from_millis(cli.metrics_period_ms.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                info!(last_tti = ?scheduler.last_tti(), "UE metrics:");
                log_metrics(&scheduler);
            }
            res = &mut radio_handle => {
                if let Err(e) = res {
                    error!("radio loop panicked: {}", e);
                    process::exit(1);
                }
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted, stopping radio loop");
                stop.store(true, Ordering::Relaxed);
            }
        }
    }

    info!("Final UE metrics:");
    log_metrics(&scheduler);
}
