//! Scheduler configuration loading.
//!
//! The expected YAML structure is:
//! ```yaml
//! scheduler:
//!   policy: time_pf
//!   policy_args: "2"
//!   pdsch_max_mcs: 28
//!   max_aggr_level: 3
//! cells:
//!   - nof_prb: 50
//!     nrb_pucch: 2
//!     prach_rar_window: 10
//! ```
//!
//! Every field is optional; absent values take the defaults below.  A file
//! without cells gets a single default 25-PRB carrier.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::slicing::SliceCtrlRequest;

// ── Private YAML deserialization types ────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct SchedConfigFile {
    #[serde(default)]
    scheduler: SchedArgs,
    #[serde(default)]
    cells: Vec<CellCfg>,
}

#[derive(Debug, Deserialize)]
struct SliceCtrlFile {
    #[serde(default)]
    requests: Vec<SliceCtrlRequest>,
}

// ── Public data structures ────────────────────────────────────────────────────

/// Scheduler-wide tuning shared by every carrier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedArgs {
    /// Per-TTI scheduling policy: `time_rr` or `time_pf`.
    pub policy: String,
    /// Policy specific argument (PF: fairness exponent).
    pub policy_args: String,
    /// Fixed DL MCS; `None` lets CQI drive it.
    pub pdsch_mcs: Option<u32>,
    pub pdsch_max_mcs: u32,
    /// Fixed UL MCS; `None` lets SNR drive it.
    pub pusch_mcs: Option<u32>,
    pub pusch_max_mcs: u32,
    /// log2 of the largest PDCCH aggregation level (0..=3).
    pub max_aggr_level: u32,
    pub min_nof_ctrl_symbols: u32,
    pub max_nof_ctrl_symbols: u32,
    /// Extra PRBs reserved at each band edge for PUCCH HARQ feedback.
    pub pucch_harq_max_rb: u32,
    pub target_bler: f32,
}

impl Default for SchedArgs {
    fn default() -> Self {
        Self {
            policy: String::from("time_pf"),
            policy_args: String::from("2"),
            pdsch_mcs: None,
            pdsch_max_mcs: 28,
            pusch_mcs: None,
            pusch_max_mcs: 28,
            max_aggr_level: 3,
            min_nof_ctrl_symbols: 1,
            max_nof_ctrl_symbols: 3,
            pucch_harq_max_rb: 0,
            target_bler: 0.05,
        }
    }
}

/// Static configuration of one carrier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellCfg {
    pub nof_prb: u32,
    /// PRBs reserved for PUCCH at each edge of the UL band.
    pub nrb_pucch: u32,
    pub maxharq_msg3tx: u32,
    /// Subframes after PRACH during which the RAR may still be sent.
    pub prach_rar_window: u32,
    /// CQI assumed for a UE until its first report.
    pub initial_dl_cqi: u32,
}

impl Default for CellCfg {
    fn default() -> Self {
        Self {
            nof_prb: 25,
            nrb_pucch: 2,
            maxharq_msg3tx: 4,
            prach_rar_window: 10,
            initial_dl_cqi: 5,
        }
    }
}

// ── SchedConfigManager ────────────────────────────────────────────────────────

/// Loads and holds the scheduler configuration from a YAML file.
#[derive(Debug, Default)]
pub struct SchedConfigManager {
    args: SchedArgs,
    cells: Vec<CellCfg>,
    loaded: bool,
}

impl SchedConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `path`, replacing anything loaded before.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is invalid.
    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        info!("Loading scheduler configuration from: {}", path.display());

        self.args = SchedArgs::default();
        self.cells.clear();
        self.loaded = false;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let file: SchedConfigFile = if content.trim().is_empty() {
            SchedConfigFile::default()
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?
        };

        self.args = file.scheduler;
        self.cells = file.cells;

        if self.cells.is_empty() {
            warn!("No cells found in configuration file, using default cell configuration");
            self.cells.push(CellCfg::default());
        }

        for (cc, cell) in self.cells.iter().enumerate() {
            debug!(
                cc,
                nof_prb = cell.nof_prb,
                nrb_pucch = cell.nrb_pucch,
                rar_window = cell.prach_rar_window,
                "cell configuration entry"
            );
        }

        self.loaded = true;
        info!(
            policy = %self.args.policy,
            nof_cells = self.cells.len(),
            "Successfully loaded scheduler configuration"
        );
        Ok(())
    }

    pub fn sched_args(&self) -> &SchedArgs {
        &self.args
    }

    pub fn cells(&self) -> &[CellCfg] {
        &self.cells
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

/// Reads a list of slice-control requests:
/// ```yaml
/// requests:
///   - type: add_mod
///     sched_name: RR
///     slices: [...]
/// ```
pub fn load_slice_requests(path: &Path) -> Result<Vec<SliceCtrlRequest>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot open slice control file: {}", path.display()))?;
    let file: SliceCtrlFile = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse slice control file: {}", path.display()))?;
    debug!(count = file.requests.len(), "loaded slice control requests");
    Ok(file.requests)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
