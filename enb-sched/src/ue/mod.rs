/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! UE scheduling context.
//!
//! A [`SchedUe`] is owned by the coordinator's UE database and holds
//! everything the allocation pass reads about one terminal: its carriers
//! (with HARQ and channel reports), logical channel buffers, slice membership
//! and the metrics accumulated since the last [`SchedUe::metrics_read`].

pub mod cell;
pub mod lch;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cell::SchedCellParams;
use crate::harq::HarqFeedback;
use crate::mask::Interval;
use crate::scheduler::error::SchedError;
use crate::tti::{to_tx_dl, to_tx_ul, TtiPoint};

pub use cell::{CcState, SchedUeCell};
pub use lch::{BearerCfg, BearerDirection, LchManager, MAX_NOF_LCGS, MAX_NOF_LCIDS};

/// Bytes granted on a scheduling request when no BSR is pending.
pub const SR_GRANT_BYTES: u32 = 512;

/// Subframes of PDSCH/PUSCH blackout per measurement gap.
pub const MEASGAP_DURATION: u32 = 6;

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UeCarrierCfg {
    pub enb_cc_idx: usize,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasGapCfg {
    /// 40 or 80 subframes.
    pub period: u32,
    pub offset: u32,
}

/// UE configuration as passed to `ue_cfg`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UeCfg {
    /// First entry is the PCell.
    pub supported_cc_list: Vec<UeCarrierCfg>,
    pub maxharq_tx: u32,
    pub measgap: Option<MeasGapCfg>,
    pub bearers: BTreeMap<u32, BearerCfg>,
}

impl Default for UeCfg {
    fn default() -> Self {
        Self {
            supported_cc_list: vec![UeCarrierCfg {
                enb_cc_idx: 0,
                active: true,
            }],
            maxharq_tx: 5,
            measgap: None,
            bearers: BTreeMap::new(),
        }
    }
}

/// DL DCI format used for new grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DciFormat {
    /// Resource allocation type 0 (any RBG set).
    Format1,
    /// Compact format, contiguous allocation.
    Format1A,
}

// ── Metrics ───────────────────────────────────────────────────────────────────

/// Counters of one reporting period.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UeMetrics {
    pub rnti: u16,
    pub tx_pkts: u32,
    pub tx_errors: u32,
    /// Acknowledged DL bytes.
    pub tx_brate: u64,
    pub rx_pkts: u32,
    pub rx_errors: u32,
    /// Correctly received UL bytes.
    pub rx_brate: u64,
    pub dl_buffer: u32,
    pub ul_buffer: u32,
    /// Average wideband CQI of the period.
    pub dl_cqi: f32,
    pub dl_ri: u32,
    pub dl_pmi: u32,
    pub phr: f32,
    pub allocated_prbs: u32,
    pub nof_tti: u32,
    pub slice_id: Option<u32>,
}

// ── SchedUe ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SchedUe {
    rnti: u16,
    cfg: UeCfg,
    cells: Vec<SchedUeCell>,
    lch: LchManager,
    phy_cfg_enabled: bool,
    sr: bool,
    phr: f32,
    slice_id: Option<u32>,
    metrics: UeMetrics,
    cqi_sum: u64,
    cqi_count: u32,
}

impl SchedUe {
    pub fn new(
        rnti: u16,
        cell_params: &[Arc<SchedCellParams>],
        cfg: &UeCfg,
    ) -> Result<Self, SchedError> {
        let mut ue = Self {
            rnti,
            cfg: UeCfg::default(),
            cells: cell_params
                .iter()
                .map(|p| SchedUeCell::new(rnti, Arc::clone(p)))
                .collect(),
            lch: LchManager::new(),
            phy_cfg_enabled: false,
            sr: false,
            phr: 0.0,
            slice_id: None,
            metrics: UeMetrics::default(),
            cqi_sum: 0,
            cqi_count: 0,
        };
        ue.set_cfg(cfg)?;
        Ok(ue)
    }

    pub fn rnti(&self) -> u16 {
        self.rnti
    }

    pub fn cfg(&self) -> &UeCfg {
        &self.cfg
    }

    fn invalid(&self, detail: impl Into<String>) -> SchedError {
        SchedError::InvalidUeCfg {
            rnti: self.rnti,
            detail: detail.into(),
        }
    }

    fn validate_cfg(&self, cfg: &UeCfg) -> Result<(), SchedError> {
        if cfg.supported_cc_list.is_empty() {
            return Err(self.invalid("no carriers configured"));
        }
        let mut seen = BTreeSet::new();
        for cc in &cfg.supported_cc_list {
            if cc.enb_cc_idx >= self.cells.len() {
                return Err(self.invalid(format!("eNB carrier {} does not exist", cc.enb_cc_idx)));
            }
            if !seen.insert(cc.enb_cc_idx) {
                return Err(self.invalid(format!("eNB carrier {} listed twice", cc.enb_cc_idx)));
            }
        }
        if cfg.maxharq_tx == 0 {
            return Err(self.invalid("maxharq_tx must be at least 1"));
        }
        if let Some(gap) = cfg.measgap {
            if !matches!(gap.period, 40 | 80) || gap.offset >= gap.period {
                return Err(self.invalid(format!(
                    "invalid measurement gap period {} offset {}",
                    gap.period, gap.offset
                )));
            }
        }
        for (&lcid, bearer) in &cfg.bearers {
            if lcid as usize >= MAX_NOF_LCIDS || bearer.group as usize >= MAX_NOF_LCGS {
                return Err(self.invalid(format!("invalid bearer lcid {} group {}", lcid, bearer.group)));
            }
        }
        Ok(())
    }

    /// Apply a (re)configuration.  Validation happens before anything changes.
    pub fn set_cfg(&mut self, cfg: &UeCfg) -> Result<(), SchedError> {
        self.validate_cfg(cfg)?;

        for (enb_cc_idx, cell) in self.cells.iter_mut().enumerate() {
            let entry = cfg
                .supported_cc_list
                .iter()
                .position(|c| c.enb_cc_idx == enb_cc_idx);
            let active = entry.is_some_and(|i| cfg.supported_cc_list[i].active);
            cell.set_cfg(entry, active);
        }
        for (&lcid, &bearer) in &cfg.bearers {
            self.lch
                .config_lcid(lcid, bearer)
                .map_err(|e| self.invalid(e))?;
        }
        self.cfg = cfg.clone();
        Ok(())
    }

    /// Pick up new carrier parameters after a cell reconfiguration.
    pub fn refresh_cells(&mut self, cell_params: &[Arc<SchedCellParams>]) {
        self.cells = cell_params
            .iter()
            .map(|p| SchedUeCell::new(self.rnti, Arc::clone(p)))
            .collect();
        for (enb_cc_idx, cell) in self.cells.iter_mut().enumerate() {
            let entry = self
                .cfg
                .supported_cc_list
                .iter()
                .position(|c| c.enb_cc_idx == enb_cc_idx);
            let active = entry.is_some_and(|i| self.cfg.supported_cc_list[i].active);
            cell.set_cfg(entry, active);
        }
    }

    pub fn reset(&mut self) {
        self.cells.iter_mut().for_each(SchedUeCell::reset);
        self.lch.reset();
        self.sr = false;
        self.phr = 0.0;
    }

    // ── Carriers ──────────────────────────────────────────────────────────────

    pub fn cell(&self, enb_cc_idx: usize) -> Option<&SchedUeCell> {
        self.cells.get(enb_cc_idx)
    }

    pub fn cell_mut(&mut self, enb_cc_idx: usize) -> Option<&mut SchedUeCell> {
        self.cells.get_mut(enb_cc_idx)
    }

    /// UE carrier index of `enb_cc_idx` if that carrier is configured.
    pub fn get_cell_index(&self, enb_cc_idx: usize) -> Option<usize> {
        self.cells
            .get(enb_cc_idx)
            .filter(|c| c.state() != CcState::Idle)
            .and_then(SchedUeCell::ue_cc_idx)
    }

    /// UE carrier index of `enb_cc_idx` if that carrier is active.
    pub fn get_active_cell_index(&self, enb_cc_idx: usize) -> Option<usize> {
        self.cells
            .get(enb_cc_idx)
            .filter(|c| c.is_active())
            .and_then(SchedUeCell::ue_cc_idx)
    }

    /// eNB carrier index of the PCell.
    pub fn pcell_idx(&self) -> usize {
        self.cfg.supported_cc_list[0].enb_cc_idx
    }

    // ── Per-TTI ───────────────────────────────────────────────────────────────

    /// Housekeeping before the allocation pass of `tti_rx` on one carrier.
    pub fn new_subframe(&mut self, tti_rx: TtiPoint, enb_cc_idx: usize) {
        let pcell = self.pcell_idx();
        let Some(cell) = self.cells.get_mut(enb_cc_idx) else {
            return;
        };
        if cell.state() == CcState::Idle {
            return;
        }
        let timeouts = cell.harq.new_tti(to_tx_dl(tti_rx), to_tx_ul(tti_rx));
        self.metrics.tx_errors += timeouts as u32;
        if enb_cc_idx == pcell {
            self.metrics.nof_tti += 1;
        }
    }

    fn in_measgap(&self, tti: TtiPoint) -> bool {
        self.cfg.measgap.is_some_and(|gap| {
            (tti.to_uint() + gap.period - gap.offset) % gap.period < MEASGAP_DURATION
        })
    }

    /// PDSCH may be scheduled for the DL subframe of `tti_rx`.
    pub fn pdsch_enabled(&self, tti_rx: TtiPoint, enb_cc_idx: usize) -> bool {
        self.get_active_cell_index(enb_cc_idx).is_some() && !self.in_measgap(to_tx_dl(tti_rx))
    }

    /// PUSCH may be scheduled for the UL subframe of `tti_rx`.  With
    /// `needs_pdcch` the DCI subframe must be usable too.
    pub fn pusch_enabled(&self, tti_rx: TtiPoint, enb_cc_idx: usize, needs_pdcch: bool) -> bool {
        self.get_active_cell_index(enb_cc_idx).is_some()
            && !self.in_measgap(to_tx_ul(tti_rx))
            && !(needs_pdcch && self.in_measgap(to_tx_dl(tti_rx)))
    }

    pub fn dci_format(&self) -> DciFormat {
        if self.phy_cfg_enabled {
            DciFormat::Format1
        } else {
            DciFormat::Format1A
        }
    }

    pub fn needs_contiguous_dl(&self) -> bool {
        self.dci_format() == DciFormat::Format1A
    }

    pub fn set_phy_cfg_enabled(&mut self, enabled: bool) {
        self.phy_cfg_enabled = enabled;
    }

    // ── Slicing ───────────────────────────────────────────────────────────────

    pub fn slice_id(&self) -> Option<u32> {
        self.slice_id
    }

    pub fn set_slice_id(&mut self, id: Option<u32>) {
        self.slice_id = id;
    }

    // ── Bearers & buffers ─────────────────────────────────────────────────────

    pub fn bearer_cfg(&mut self, lcid: u32, cfg: BearerCfg) -> Result<(), SchedError> {
        self.lch.config_lcid(lcid, cfg).map_err(|e| self.invalid(e))?;
        self.cfg.bearers.insert(lcid, cfg);
        Ok(())
    }

    pub fn bearer_rem(&mut self, lcid: u32) -> Result<(), SchedError> {
        self.lch.rem_lcid(lcid).map_err(|e| self.invalid(e))?;
        self.cfg.bearers.remove(&lcid);
        Ok(())
    }

    pub fn dl_buffer_state(&mut self, lcid: u32, tx_queue: u32, prio_tx_queue: u32) -> Result<(), SchedError> {
        self.lch
            .dl_buffer_state(lcid, tx_queue, prio_tx_queue)
            .map_err(|e| self.invalid(e))
    }

    pub fn mac_buffer_state(&mut self, ce_code: u32, nof_cmds: u32) {
        self.lch.dl_mac_buffer_state(ce_code, nof_cmds);
    }

    pub fn ul_bsr(&mut self, lcg: u32, bsr: u32) -> Result<(), SchedError> {
        self.lch.ul_bsr(lcg, bsr).map_err(|e| self.invalid(e))
    }

    pub fn ul_buffer_add(&mut self, lcid: u32, bytes: u32) -> Result<(), SchedError> {
        self.lch.ul_buffer_add(lcid, bytes).map_err(|e| self.invalid(e))
    }

    pub fn ul_phr(&mut self, phr: f32) {
        self.phr = phr;
    }

    pub fn ul_sr_info(&mut self) {
        self.sr = true;
    }

    pub fn has_pending_sr(&self) -> bool {
        self.sr
    }

    /// `[min, max)` DL bytes this UE can use on a new transmission.
    pub fn get_requested_dl_bytes(&self, enb_cc_idx: usize) -> Interval {
        if self.get_active_cell_index(enb_cc_idx).is_none() {
            return Interval::default();
        }
        self.lch.requested_dl_bytes()
    }

    pub fn get_pending_dl_bytes(&self) -> u32 {
        self.lch
            .dl_buffer_total()
            .saturating_add(self.lch.pending_ce_bytes())
    }

    /// UL bytes reported but not yet granted.  An outstanding SR without data
    /// yields a minimum grant.
    pub fn get_pending_ul_new_data(&self) -> u32 {
        let in_flight = self
            .cells
            .iter()
            .map(|c| c.harq.ul_pending_bytes())
            .fold(0, u32::saturating_add);
        let pending = self.lch.bsr_total().saturating_sub(in_flight);
        if pending == 0 && self.sr {
            SR_GRANT_BYTES
        } else {
            pending
        }
    }

    pub fn get_pending_ul_data_total(&self) -> u32 {
        self.lch.bsr_total()
    }

    // ── Allocation commit ─────────────────────────────────────────────────────

    /// Account a DL new transmission: drain buffers by `tbs`.
    pub fn on_dl_newtx(&mut self, tbs: u32, nof_prb: u32) {
        let used = self.lch.alloc_dl_bytes(tbs);
        debug!(rnti = self.rnti, tbs, used, nof_prb, "DL buffers drained");
        self.metrics.allocated_prbs += nof_prb;
    }

    pub fn on_ul_newtx(&mut self, nof_prb: u32) {
        self.sr = false;
        self.metrics.allocated_prbs += nof_prb;
    }

    // ── HARQ feedback ─────────────────────────────────────────────────────────

    /// DL ACK/NACK received at `tti_rx` for carrier `enb_cc_idx`.
    pub fn set_ack_info(&mut self, tti_rx: TtiPoint, enb_cc_idx: usize, ack: bool) -> Option<HarqFeedback> {
        let rnti = self.rnti;
        let (pid, fb) = self.cells.get_mut(enb_cc_idx)?.harq.set_ack_info(tti_rx, ack)?;
        match fb {
            HarqFeedback::Acked { tbs } => {
                self.metrics.tx_pkts += 1;
                self.metrics.tx_brate += u64::from(tbs);
            }
            HarqFeedback::Nacked => self.metrics.tx_errors += 1,
            HarqFeedback::MaxRetxReached { tbs } => {
                self.metrics.tx_errors += 1;
                warn!(rnti, pid, tbs, "DL HARQ reached max retransmissions, dropping TB");
            }
        }
        Some(fb)
    }

    /// PUSCH CRC received at `tti_rx`.
    pub fn set_ul_crc(&mut self, tti_rx: TtiPoint, enb_cc_idx: usize, crc: bool) -> Option<HarqFeedback> {
        let rnti = self.rnti;
        let (pid, fb) = self.cells.get_mut(enb_cc_idx)?.harq.set_ul_crc(tti_rx, crc)?;
        match fb {
            HarqFeedback::Acked { tbs } => {
                self.metrics.rx_pkts += 1;
                self.metrics.rx_brate += u64::from(tbs);
                self.lch.ul_buffer_sub(tbs);
            }
            HarqFeedback::Nacked => self.metrics.rx_errors += 1,
            HarqFeedback::MaxRetxReached { tbs } => {
                self.metrics.rx_errors += 1;
                warn!(rnti, pid, tbs, "UL HARQ reached max retransmissions, dropping TB");
            }
        }
        Some(fb)
    }

    // ── Channel reports ───────────────────────────────────────────────────────

    pub fn set_dl_cqi(&mut self, tti_rx: TtiPoint, enb_cc_idx: usize, cqi: u32) {
        if let Some(cell) = self.cells.get_mut(enb_cc_idx) {
            cell.set_dl_cqi(tti_rx, cqi);
            self.cqi_sum += u64::from(cell.dl_cqi());
            self.cqi_count += 1;
        }
    }

    pub fn set_dl_sb_cqi(&mut self, tti_rx: TtiPoint, enb_cc_idx: usize, sb_idx: u32, cqi: u32) {
        if let Some(cell) = self.cells.get_mut(enb_cc_idx) {
            cell.set_dl_sb_cqi(tti_rx, sb_idx, cqi);
        }
    }

    pub fn set_dl_ri(&mut self, enb_cc_idx: usize, ri: u32) {
        if let Some(cell) = self.cells.get_mut(enb_cc_idx) {
            cell.set_dl_ri(ri);
        }
    }

    pub fn set_dl_pmi(&mut self, enb_cc_idx: usize, pmi: u32) {
        if let Some(cell) = self.cells.get_mut(enb_cc_idx) {
            cell.set_dl_pmi(pmi);
        }
    }

    pub fn set_ul_snr(&mut self, enb_cc_idx: usize, snr_db: f32) {
        if let Some(cell) = self.cells.get_mut(enb_cc_idx) {
            cell.set_ul_snr(snr_db);
        }
    }

    // ── Metrics ───────────────────────────────────────────────────────────────

    /// Snapshot of the current reporting period; counters restart from zero.
    pub fn metrics_read(&mut self) -> UeMetrics {
        let pcell = self.pcell_idx();
        let mut m = std::mem::take(&mut self.metrics);
        m.rnti = self.rnti;
        m.dl_buffer = self.get_pending_dl_bytes();
        m.ul_buffer = self.get_pending_ul_data_total();
        m.phr = self.phr;
        m.slice_id = self.slice_id;
        if let Some(cell) = self.cells.get(pcell) {
            m.dl_cqi = if self.cqi_count > 0 {
                self.cqi_sum as f32 / self.cqi_count as f32
            } else {
                cell.dl_cqi() as f32
            };
            m.dl_ri = cell.dl_ri();
            m.dl_pmi = cell.dl_pmi();
        }
        self.cqi_sum = 0;
        self.cqi_count = 0;
        m
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
