/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! eNB MAC scheduler coordinator.
//!
//! [`Scheduler`] owns every piece of scheduler state (UE database, carrier
//! schedulers, per-TTI result cache, slicing registry) behind one
//! [`parking_lot::Mutex`].  Every public operation takes the lock for its
//! whole duration, so the DL and UL results of a TTI, and all carriers of
//! that TTI, are computed from one consistent snapshot of UE state.
//!
//! # Call flow
//!
//! ```text
//!  radio thread                      control / reporting threads
//!  ────────────                      ───────────────────────────
//!  dl_sched(tti_tx_dl, cc) ─┐        cell_cfg, ue_cfg, ue_rem
//!  ul_sched(tti_tx_ul, cc) ─┤        dl_ack_info, ul_crc_info, dl_cqi_info …
//!                           ▼        slice(request), metrics_read(rnti)
//!                 new_tti(tti_rx)               │
//!                 every carrier not yet         ▼
//!                 generated for tti_rx     SchedState (one mutex)
//! ```
//!
//! # State ownership
//!
//! | State | Owner |
//! |---|---|
//! | Slice table and UE associations | [`SlicingRegistry`] inside `SchedState` |
//! | UE contexts | `UeDb`, keyed by RNTI |
//! | Per-carrier RAR queue, policy | [`CarrierSched`] |
//! | Last 16 TTI results | [`SchedResultList`] |
//!
//! `ue_rem` drops the UE's slice association together with its context.

pub mod alloc;
pub mod carrier;
pub mod error;
pub mod policy;
pub mod result;
pub mod sf_sched;

pub use carrier::RarInfo;
pub use error::{AllocError, CellCfgReason, SchedError, SliceCtrlError};
pub use result::{CcSchedResult, DlSchedResult, UlSchedResult};

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::cell::SchedCellParams;
use crate::config::{CellCfg, SchedArgs};
use crate::harq::HarqFeedback;
use crate::mask::MAX_NOF_RBG;
use crate::slicing::{Slice, SliceConf, SliceCtrlRequest, SliceStats, SlicingRegistry, UeSliceAssoc};
use crate::tti::{TtiPoint, FDD_HARQ_DELAY_UL_MS, TX_ENB_DELAY};
use crate::ue::{BearerCfg, SchedUe, UeCfg, UeMetrics};

use alloc::UeDb;
use carrier::CarrierSched;
use policy::{make_policy, PolicyKind};
use result::SchedResultList;

// ── Internal state ────────────────────────────────────────────────────────────

struct SchedState {
    args: SchedArgs,
    cell_params: Vec<Arc<SchedCellParams>>,
    carriers: Vec<CarrierSched>,
    ue_db: UeDb,
    results: SchedResultList,
    slicing: SlicingRegistry,
    last_tti: Option<TtiPoint>,
    configured: bool,
}

impl SchedState {
    fn new(args: SchedArgs) -> Self {
        let policy = initial_policy(&args);
        let first = CarrierSched::new(0, make_policy(policy, &args));
        Self {
            args,
            cell_params: Vec::new(),
            carriers: vec![first],
            ue_db: UeDb::new(),
            results: SchedResultList::new(),
            slicing: SlicingRegistry::new(),
            last_tti: None,
            configured: false,
        }
    }

    fn reset(&mut self) {
        self.ue_db.clear();
        self.results.clear();
        self.slicing.clear_associations();
        self.last_tti = None;
        self.carriers.iter_mut().for_each(CarrierSched::reset);
    }

    /// Generate every carrier not yet generated for `tti_rx`.
    fn new_tti(&mut self, tti_rx: TtiPoint) {
        self.last_tti = Some(self.last_tti.map_or(tti_rx, |last| last.latest(tti_rx)));
        self.results.new_tti(tti_rx);

        let SchedState {
            carriers,
            ue_db,
            slicing,
            results,
            ..
        } = self;
        for carrier in carriers.iter_mut() {
            let cc = carrier.enb_cc_idx();
            if !results.is_generated(tti_rx, cc) {
                let result = carrier.generate_tti_result(tti_rx, ue_db, slicing);
                results.set(tti_rx, cc, result);
            }
        }
    }
}

/// Policy of carriers created before any cell configuration.  An unknown
/// name is reported by `cell_cfg`.
fn initial_policy(args: &SchedArgs) -> PolicyKind {
    PolicyKind::from_name(&args.policy).unwrap_or_else(|| {
        warn!(policy = %args.policy, "unknown scheduling policy, starting with time_pf");
        PolicyKind::TimePf
    })
}

fn ue_db_access_locked<T>(
    ue_db: &mut UeDb,
    rnti: u16,
    op: &'static str,
    f: impl FnOnce(&mut SchedUe) -> T,
) -> Result<T, SchedError> {
    match ue_db.get_mut(&rnti) {
        Some(ue) => Ok(f(ue)),
        None => {
            error!(rnti = %format!("0x{rnti:x}"), op, "user not found");
            Err(SchedError::UeNotFound { rnti, op })
        }
    }
}

// ── Scheduler ─────────────────────────────────────────────────────────────────

/// The eNB MAC scheduler.  `Send + Sync`; share it through an `Arc`.
pub struct Scheduler {
    state: Mutex<SchedState>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedArgs::default())
    }
}

impl Scheduler {
    /// Create an unconfigured scheduler with one (unconfigured) carrier.
    pub fn new(args: SchedArgs) -> Self {
        Self {
            state: Mutex::new(SchedState::new(args)),
        }
    }

    /// Start over with new scheduler arguments.  Cells must be configured
    /// again.
    pub fn init(&self, args: SchedArgs) {
        let mut state = self.state.lock();
        *state = SchedState::new(args);
        info!(policy = %state.args.policy, "scheduler initialised");
    }

    /// Drop every UE, pending random access and cached result.  Cell
    /// configuration and the slice table survive.
    pub fn reset(&self) {
        self.state.lock().reset();
        info!("scheduler reset");
    }

    // ── Configuration ─────────────────────────────────────────────────────────

    /// Derive the parameters of every cell and (re)create their carrier
    /// schedulers.
    ///
    /// On error, carriers before the failing one have already been
    /// reconfigured; treat the whole call as failed.
    pub fn cell_cfg(&self, cells: &[CellCfg]) -> Result<(), SchedError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if cells.is_empty() {
            error!("cell configuration without cells");
            return Err(SchedError::InvalidCellCfg {
                cc: 0,
                reason: CellCfgReason::NoCells,
            });
        }

        let slice_policy = state.slicing.policy();
        state.cell_params.clear();
        let mut outcome = Ok(());
        for (cc, cfg) in cells.iter().enumerate() {
            let params = match SchedCellParams::set_cfg(cc, cfg, &state.args) {
                Ok(p) => Arc::new(p),
                Err(reason) => {
                    error!(cc, %reason, "cell configuration rejected");
                    outcome = Err(SchedError::InvalidCellCfg { cc, reason });
                    break;
                }
            };
            if state.carriers.len() <= cc {
                state
                    .carriers
                    .push(CarrierSched::new(cc, make_policy(params.policy, &state.args)));
            }
            state.carriers[cc].carrier_cfg(Arc::clone(&params), slice_policy);
            state.cell_params.push(params);
        }

        for ue in state.ue_db.values_mut() {
            ue.refresh_cells(&state.cell_params);
        }
        outcome?;

        state.carriers.truncate(cells.len());
        state.configured = true;
        info!(nof_cells = cells.len(), "cells configured");
        Ok(())
    }

    /// Add a UE, or reconfigure it if it exists.
    pub fn ue_cfg(&self, rnti: u16, cfg: &UeCfg) -> Result<(), SchedError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Some(ue) = state.ue_db.get_mut(&rnti) {
            ue.set_cfg(cfg)
                .inspect_err(|e| error!(error = %e, "UE reconfiguration rejected"))?;
            info!(rnti, nof_cc = cfg.supported_cc_list.len(), "UE reconfigured");
            return Ok(());
        }

        let mut ue = SchedUe::new(rnti, &state.cell_params, cfg)
            .inspect_err(|e| error!(error = %e, "UE configuration rejected"))?;
        ue.set_slice_id(state.slicing.register_ue(rnti));
        info!(rnti, nof_cc = cfg.supported_cc_list.len(), slice = ?ue.slice_id(), "UE added");
        state.ue_db.insert(rnti, ue);
        Ok(())
    }

    /// Remove a UE and its slice association.
    pub fn ue_rem(&self, rnti: u16) -> Result<(), SchedError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.ue_db.remove(&rnti).is_none() {
            error!(rnti = %format!("0x{rnti:x}"), op = "ue_rem", "user not found");
            return Err(SchedError::UeNotFound { rnti, op: "ue_rem" });
        }
        state.slicing.remove_ue(rnti);
        info!(rnti, "UE removed");
        Ok(())
    }

    pub fn ue_exists(&self, rnti: u16) -> bool {
        self.state.lock().ue_db.contains_key(&rnti)
    }

    pub fn bearer_ue_cfg(&self, rnti: u16, lcid: u32, cfg: BearerCfg) -> Result<(), SchedError> {
        self.ue_db_access(rnti, "bearer_ue_cfg", |ue| ue.bearer_cfg(lcid, cfg))?
    }

    pub fn bearer_ue_rem(&self, rnti: u16, lcid: u32) -> Result<(), SchedError> {
        self.ue_db_access(rnti, "bearer_ue_rem", |ue| ue.bearer_rem(lcid))?
    }

    /// Dedicated PHY configuration is (not) active; DCI format 1A until it is.
    pub fn phy_config_enabled(&self, rnti: u16, enabled: bool) -> Result<(), SchedError> {
        self.ue_db_access(rnti, "phy_config_enabled", |ue| ue.set_phy_cfg_enabled(enabled))
    }

    // ── Per-UE reports ────────────────────────────────────────────────────────

    fn ue_db_access<T>(
        &self,
        rnti: u16,
        op: &'static str,
        f: impl FnOnce(&mut SchedUe) -> T,
    ) -> Result<T, SchedError> {
        ue_db_access_locked(&mut self.state.lock().ue_db, rnti, op, f)
    }

    /// HARQ ACK/NACK for the DL transport block `tb_idx` sent 4 TTIs before
    /// `tti_rx`.
    pub fn dl_ack_info(
        &self,
        tti_rx: TtiPoint,
        rnti: u16,
        enb_cc_idx: usize,
        tb_idx: u32,
        ack: bool,
    ) -> Result<Option<HarqFeedback>, SchedError> {
        let mut state = self.state.lock();
        ue_db_access_locked(&mut state.ue_db, rnti, "dl_ack_info", |ue| {
            if tb_idx > 0 {
                warn!(rnti, tb_idx, "ACK for unsupported TB index ignored");
                return Err(SchedError::InvalidTbIdx { rnti, tb_idx });
            }
            Ok(ue.set_ack_info(tti_rx, enb_cc_idx, ack))
        })?
    }

    pub fn ul_crc_info(
        &self,
        tti_rx: TtiPoint,
        rnti: u16,
        enb_cc_idx: usize,
        crc: bool,
    ) -> Result<Option<HarqFeedback>, SchedError> {
        self.ue_db_access(rnti, "ul_crc_info", |ue| ue.set_ul_crc(tti_rx, enb_cc_idx, crc))
    }

    pub fn dl_cqi_info(&self, tti_rx: TtiPoint, rnti: u16, enb_cc_idx: usize, cqi: u32) -> Result<(), SchedError> {
        self.ue_db_access(rnti, "dl_cqi_info", |ue| ue.set_dl_cqi(tti_rx, enb_cc_idx, cqi))
    }

    pub fn dl_sb_cqi_info(
        &self,
        tti_rx: TtiPoint,
        rnti: u16,
        enb_cc_idx: usize,
        sb_idx: u32,
        cqi: u32,
    ) -> Result<(), SchedError> {
        self.ue_db_access(rnti, "dl_sb_cqi_info", |ue| {
            ue.set_dl_sb_cqi(tti_rx, enb_cc_idx, sb_idx, cqi)
        })
    }

    pub fn dl_ri_info(&self, rnti: u16, enb_cc_idx: usize, ri: u32) -> Result<(), SchedError> {
        self.ue_db_access(rnti, "dl_ri_info", |ue| ue.set_dl_ri(enb_cc_idx, ri))
    }

    pub fn dl_pmi_info(&self, rnti: u16, enb_cc_idx: usize, pmi: u32) -> Result<(), SchedError> {
        self.ue_db_access(rnti, "dl_pmi_info", |ue| ue.set_dl_pmi(enb_cc_idx, pmi))
    }

    pub fn ul_snr_info(&self, rnti: u16, enb_cc_idx: usize, snr_db: f32) -> Result<(), SchedError> {
        self.ue_db_access(rnti, "ul_snr_info", |ue| ue.set_ul_snr(enb_cc_idx, snr_db))
    }

    pub fn ul_bsr(&self, rnti: u16, lcg: u32, bsr: u32) -> Result<(), SchedError> {
        self.ue_db_access(rnti, "ul_bsr", |ue| ue.ul_bsr(lcg, bsr))?
    }

    pub fn ul_buffer_add(&self, rnti: u16, lcid: u32, bytes: u32) -> Result<(), SchedError> {
        self.ue_db_access(rnti, "ul_buffer_add", |ue| ue.ul_buffer_add(lcid, bytes))?
    }

    pub fn ul_phr(&self, rnti: u16, phr: f32) -> Result<(), SchedError> {
        self.ue_db_access(rnti, "ul_phr", |ue| ue.ul_phr(phr))
    }

    pub fn ul_sr_info(&self, rnti: u16) -> Result<(), SchedError> {
        self.ue_db_access(rnti, "ul_sr_info", SchedUe::ul_sr_info)
    }

    pub fn dl_rlc_buffer_state(
        &self,
        rnti: u16,
        lcid: u32,
        tx_queue: u32,
        prio_tx_queue: u32,
    ) -> Result<(), SchedError> {
        self.ue_db_access(rnti, "dl_rlc_buffer_state", |ue| {
            ue.dl_buffer_state(lcid, tx_queue, prio_tx_queue)
        })?
    }

    pub fn dl_mac_buffer_state(&self, rnti: u16, ce_code: u32, nof_cmds: u32) -> Result<(), SchedError> {
        self.ue_db_access(rnti, "dl_mac_buffer_state", |ue| {
            ue.mac_buffer_state(ce_code, nof_cmds)
        })
    }

    pub fn get_dl_buffer(&self, rnti: u16) -> Result<u32, SchedError> {
        self.ue_db_access(rnti, "get_dl_buffer", |ue| ue.get_pending_dl_bytes())
    }

    pub fn get_ul_buffer(&self, rnti: u16) -> Result<u32, SchedError> {
        self.ue_db_access(rnti, "get_ul_buffer", |ue| ue.get_pending_ul_data_total())
    }

    /// Counters of the current reporting period; they restart from zero.
    pub fn metrics_read(&self, rnti: u16) -> Result<UeMetrics, SchedError> {
        self.ue_db_access(rnti, "metrics_read", SchedUe::metrics_read)
    }

    /// [`metrics_read`](Self::metrics_read) for every UE, in RNTI order.
    pub fn metrics_read_all(&self) -> Vec<UeMetrics> {
        self.state
            .lock()
            .ue_db
            .values_mut()
            .map(SchedUe::metrics_read)
            .collect()
    }

    /// Per eNB carrier, the UE carrier index of every configured carrier.
    pub fn get_enb_ue_cc_map(&self, rnti: u16) -> Result<Vec<Option<usize>>, SchedError> {
        let mut state = self.state.lock();
        let nof_cells = state.cell_params.len();
        ue_db_access_locked(&mut state.ue_db, rnti, "get_enb_ue_cc_map", |ue| {
            (0..nof_cells).map(|cc| ue.get_cell_index(cc)).collect()
        })
    }

    /// Same as [`get_enb_ue_cc_map`](Self::get_enb_ue_cc_map), active
    /// carriers only.
    pub fn get_enb_ue_activ_cc_map(&self, rnti: u16) -> Result<Vec<Option<usize>>, SchedError> {
        let mut state = self.state.lock();
        let nof_cells = state.cell_params.len();
        ue_db_access_locked(&mut state.ue_db, rnti, "get_enb_ue_activ_cc_map", |ue| {
            (0..nof_cells).map(|cc| ue.get_active_cell_index(cc)).collect()
        })
    }

    // ── Random access & subframe mask ─────────────────────────────────────────

    pub fn dl_rach_info(&self, enb_cc_idx: usize, rar: RarInfo) -> Result<(), SchedError> {
        let mut state = self.state.lock();
        let nof_carriers = state.carriers.len();
        let carrier = state
            .carriers
            .get_mut(enb_cc_idx)
            .ok_or(SchedError::CarrierOutOfRange {
                cc: enb_cc_idx,
                nof_carriers,
            })
            .inspect_err(|e| error!(error = %e, "RACH indication dropped"))?;
        carrier.dl_rach_info(rar);
        Ok(())
    }

    /// Mark DL subframes (by `tti_tx_dl mod mask.len()`) as unavailable on
    /// the primary carrier.
    pub fn set_dl_tti_mask(&self, mask: Vec<bool>) {
        if let Some(carrier) = self.state.lock().carriers.first_mut() {
            carrier.set_dl_tti_mask(mask);
        }
    }

    // ── Per-TTI scheduling ────────────────────────────────────────────────────

    /// DL grants to transmit at `tti_tx_dl` on carrier `enb_cc_idx`.  Empty
    /// before configuration or for an unknown carrier.
    pub fn dl_sched(&self, tti_tx_dl: TtiPoint, enb_cc_idx: usize) -> DlSchedResult {
        let tti_rx = tti_tx_dl - TX_ENB_DELAY;
        let mut state = self.state.lock();
        if !state.configured || enb_cc_idx >= state.carriers.len() {
            debug!(tti = %tti_tx_dl, cc = enb_cc_idx, "DL scheduling skipped");
            return DlSchedResult {
                tti_tx_dl,
                ..Default::default()
            };
        }
        state.new_tti(tti_rx);
        state
            .results
            .get(tti_rx, enb_cc_idx)
            .map(|r| r.dl.clone())
            .unwrap_or_else(|| DlSchedResult {
                tti_tx_dl,
                ..Default::default()
            })
    }

    /// UL grants to be received at `tti_tx_ul` on carrier `enb_cc_idx`.
    pub fn ul_sched(&self, tti_tx_ul: TtiPoint, enb_cc_idx: usize) -> UlSchedResult {
        let tti_rx = tti_tx_ul - (TX_ENB_DELAY + FDD_HARQ_DELAY_UL_MS);
        let mut state = self.state.lock();
        if !state.configured || enb_cc_idx >= state.carriers.len() {
            debug!(tti = %tti_tx_ul, cc = enb_cc_idx, "UL scheduling skipped");
            return UlSchedResult {
                tti_tx_ul,
                ..Default::default()
            };
        }
        state.new_tti(tti_rx);
        state
            .results
            .get(tti_rx, enb_cc_idx)
            .map(|r| r.ul.clone())
            .unwrap_or_else(|| UlSchedResult {
                tti_tx_ul,
                ..Default::default()
            })
    }

    // ── Slicing ───────────────────────────────────────────────────────────────

    /// Apply one slice-control request.
    pub fn slice(&self, request: &SliceCtrlRequest) -> Result<(), SliceCtrlError> {
        match request {
            SliceCtrlRequest::AddMod(conf) => self.slice_add_mod(conf),
            SliceCtrlRequest::UeSliceAssoc { ues } => self.ue_slice_conf(ues),
            SliceCtrlRequest::Delete { ids } => {
                warn!(?ids, "slice deletion requested, not supported");
                Err(SliceCtrlError::DeleteUnsupported)
            }
        }
    }

    /// Replace the slice table; every carrier switches to its policy.
    pub fn slice_add_mod(&self, conf: &SliceConf) -> Result<(), SliceCtrlError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let nof_rbg = state
            .cell_params
            .first()
            .map_or(MAX_NOF_RBG as u32, |p| p.nof_rbg);
        let policy = state
            .slicing
            .add_mod(conf, nof_rbg, &mut state.ue_db)
            .inspect_err(|e| error!(error = %e, "slice configuration rejected"))?;
        for carrier in &mut state.carriers {
            carrier.set_policy(policy);
        }
        Ok(())
    }

    pub fn ue_slice_conf(&self, ues: &[UeSliceAssoc]) -> Result<(), SliceCtrlError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state
            .slicing
            .ue_slice_conf(ues, &mut state.ue_db)
            .inspect_err(|e| error!(error = %e, "UE slice association rejected"))
    }

    /// RNTIs currently associated with `slice_id`.
    pub fn ues_in_slice(&self, slice_id: u32) -> Vec<u16> {
        self.state
            .lock()
            .ue_db
            .values()
            .filter(|ue| ue.slice_id() == Some(slice_id))
            .map(SchedUe::rnti)
            .collect()
    }

    pub fn slice_stats(&self) -> SliceStats {
        self.state.lock().slicing.stats()
    }

    pub fn slice_table(&self) -> Vec<Slice> {
        self.state.lock().slicing.slices().cloned().collect()
    }

    pub fn ue_slice_associations(&self) -> Vec<(u16, Option<u32>)> {
        self.state.lock().slicing.associations().collect()
    }

    pub fn ue_slice_id(&self, rnti: u16) -> Option<u32> {
        self.state.lock().ue_db.get(&rnti).and_then(SchedUe::slice_id)
    }

    // ── Observability ─────────────────────────────────────────────────────────

    pub fn is_configured(&self) -> bool {
        self.state.lock().configured
    }

    pub fn nof_carriers(&self) -> usize {
        self.state.lock().carriers.len()
    }

    /// Latest receive TTI scheduled so far.
    pub fn last_tti(&self) -> Option<TtiPoint> {
        self.state.lock().last_tti
    }

    /// Results generated by carrier `enb_cc_idx` since it was created.
    pub fn nof_generated_ttis(&self, enb_cc_idx: usize) -> u64 {
        self.state
            .lock()
            .carriers
            .get(enb_cc_idx)
            .map_or(0, CarrierSched::nof_generated)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slicing::{FrSlice, SliceAlgoParams};
    use crate::ue::BearerDirection;

    // ── Test helpers ──────────────────────────────────────────────────────────

    fn cell(nof_prb: u32) -> CellCfg {
        CellCfg {
            nof_prb,
            ..Default::default()
        }
    }

    /// 25-PRB single-carrier scheduler (13 RBGs).
    fn configured() -> Scheduler {
        let sched = Scheduler::new(SchedArgs::default());
        sched.cell_cfg(&[cell(25)]).unwrap();
        sched
    }

    fn add_ue_with_data(sched: &Scheduler, rnti: u16, bytes: u32) {
        sched.ue_cfg(rnti, &UeCfg::default()).unwrap();
        sched
            .bearer_ue_cfg(
                rnti,
                3,
                BearerCfg {
                    direction: BearerDirection::Both,
                    priority: 1,
                    group: 1,
                },
            )
            .unwrap();
        sched.dl_rlc_buffer_state(rnti, 3, bytes, 0).unwrap();
        sched.dl_cqi_info(TtiPoint::new(0), rnti, 0, 12).unwrap();
    }

    fn static_slice(id: u32, pos_low: u32, pos_high: u32) -> FrSlice {
        FrSlice {
            id,
            label: format!("slice{id}"),
            sched: "RR".to_string(),
            algo: SliceAlgoParams::Static { pos_low, pos_high },
        }
    }

    // ── Configuration ─────────────────────────────────────────────────────────

    #[test]
    fn unconfigured_scheduler_returns_empty_results() {
        let sched = Scheduler::default();
        let dl = sched.dl_sched(TtiPoint::new(100), 0);
        assert!(dl.is_empty());
        assert_eq!(dl.tti_tx_dl, TtiPoint::new(100));
        assert!(sched.ul_sched(TtiPoint::new(100), 0).is_empty());
        assert_eq!(sched.nof_generated_ttis(0), 0);
        assert!(!sched.is_configured());
    }

    #[test]
    fn out_of_range_carrier_returns_empty_result() {
        let sched = configured();
        assert!(sched.dl_sched(TtiPoint::new(10), 3).is_empty());
        assert!(sched.ul_sched(TtiPoint::new(10), 3).is_empty());
    }

    #[test]
    fn cell_cfg_failure_reports_failing_cell() {
        let sched = Scheduler::default();
        let err = sched.cell_cfg(&[cell(25), cell(3)]).unwrap_err();
        assert!(matches!(
            err,
            SchedError::InvalidCellCfg {
                cc: 1,
                reason: CellCfgReason::InvalidBandwidth { nof_prb: 3 }
            }
        ));
        assert!(!sched.is_configured());
    }

    #[test]
    fn cell_cfg_without_cells_is_invalid_config() {
        let sched = Scheduler::default();
        assert_eq!(
            sched.cell_cfg(&[]),
            Err(SchedError::InvalidCellCfg {
                cc: 0,
                reason: CellCfgReason::NoCells
            })
        );
        assert!(!sched.is_configured());
    }

    #[test]
    fn cell_cfg_creates_missing_carriers() {
        let sched = Scheduler::default();
        sched.cell_cfg(&[cell(25), cell(50)]).unwrap();
        assert_eq!(sched.nof_carriers(), 2);
        sched.cell_cfg(&[cell(25)]).unwrap();
        assert_eq!(sched.nof_carriers(), 1);
    }

    #[test]
    fn unknown_policy_rejected_at_cell_cfg() {
        let sched = Scheduler::new(SchedArgs {
            policy: "edf".to_string(),
            ..Default::default()
        });
        assert!(matches!(
            sched.cell_cfg(&[cell(25)]),
            Err(SchedError::InvalidCellCfg {
                reason: CellCfgReason::UnknownPolicy { .. },
                ..
            })
        ));
    }

    // ── UE lifecycle ──────────────────────────────────────────────────────────

    #[test]
    fn ue_lifecycle() {
        let sched = configured();
        assert!(!sched.ue_exists(0x46));
        sched.ue_cfg(0x46, &UeCfg::default()).unwrap();
        assert!(sched.ue_exists(0x46));

        sched.ue_rem(0x46).unwrap();
        assert!(!sched.ue_exists(0x46));
        assert_eq!(
            sched.ul_bsr(0x46, 1, 100),
            Err(SchedError::UeNotFound {
                rnti: 0x46,
                op: "ul_bsr"
            })
        );
        assert!(sched.dl_cqi_info(TtiPoint::new(0), 0x46, 0, 9).is_err());
        assert!(sched.metrics_read(0x46).is_err());
    }

    #[test]
    fn ue_rem_unknown_is_not_found() {
        let sched = configured();
        assert_eq!(
            sched.ue_rem(0x99),
            Err(SchedError::UeNotFound {
                rnti: 0x99,
                op: "ue_rem"
            })
        );
    }

    #[test]
    fn ue_cfg_on_missing_carrier_rejected() {
        let sched = configured();
        let cfg = UeCfg {
            supported_cc_list: vec![crate::ue::UeCarrierCfg {
                enb_cc_idx: 2,
                active: true,
            }],
            ..Default::default()
        };
        assert!(matches!(
            sched.ue_cfg(0x46, &cfg),
            Err(SchedError::InvalidUeCfg { rnti: 0x46, .. })
        ));
        assert!(!sched.ue_exists(0x46));
    }

    #[test]
    fn ack_for_second_tb_rejected() {
        let sched = configured();
        sched.ue_cfg(0x46, &UeCfg::default()).unwrap();
        assert_eq!(
            sched.dl_ack_info(TtiPoint::new(8), 0x46, 0, 1, true),
            Err(SchedError::InvalidTbIdx {
                rnti: 0x46,
                tb_idx: 1
            })
        );
    }

    #[test]
    fn cc_maps_follow_ue_config() {
        let sched = Scheduler::default();
        sched.cell_cfg(&[cell(25), cell(25)]).unwrap();
        let cfg = UeCfg {
            supported_cc_list: vec![
                crate::ue::UeCarrierCfg {
                    enb_cc_idx: 1,
                    active: true,
                },
                crate::ue::UeCarrierCfg {
                    enb_cc_idx: 0,
                    active: true,
                },
            ],
            ..Default::default()
        };
        sched.ue_cfg(0x46, &cfg).unwrap();
        assert_eq!(sched.get_enb_ue_cc_map(0x46).unwrap(), vec![Some(1), Some(0)]);
        // SCell waits for its first CQI.
        assert_eq!(sched.get_enb_ue_activ_cc_map(0x46).unwrap(), vec![None, Some(0)]);
        sched.dl_cqi_info(TtiPoint::new(0), 0x46, 0, 7).unwrap();
        assert_eq!(sched.get_enb_ue_activ_cc_map(0x46).unwrap(), vec![Some(1), Some(0)]);
    }

    // ── Per-TTI scheduling ────────────────────────────────────────────────────

    #[test]
    fn results_are_cached_per_rx_tti() {
        let sched = configured();
        add_ue_with_data(&sched, 0x46, 5000);

        // tti_tx_dl 104 and tti_tx_ul 108 both map to tti_rx 100.
        let dl1 = sched.dl_sched(TtiPoint::new(104), 0);
        let ul1 = sched.ul_sched(TtiPoint::new(108), 0);
        let dl2 = sched.dl_sched(TtiPoint::new(104), 0);
        assert_eq!(sched.nof_generated_ttis(0), 1);
        assert_eq!(dl1, dl2);
        assert_eq!(sched.ul_sched(TtiPoint::new(108), 0), ul1);
        assert_eq!(dl1.data.len(), 1);
        assert_eq!(sched.last_tti(), Some(TtiPoint::new(100)));

        sched.dl_sched(TtiPoint::new(105), 0);
        assert_eq!(sched.nof_generated_ttis(0), 2);
    }

    #[test]
    fn grants_never_overlap() {
        let sched = configured();
        for i in 0..6 {
            add_ue_with_data(&sched, 0x46 + i, 400);
            sched.ul_bsr(0x46 + i, 1, 300).unwrap();
        }
        for t in 0..40u32 {
            let dl = sched.dl_sched(TtiPoint::new(t + 4), 0);
            let mut used = crate::mask::RbgMask::new(13);
            for g in &dl.data {
                assert!((used & g.rbgmask).none());
                used |= g.rbgmask;
            }
            let ul = sched.ul_sched(TtiPoint::new(t + 8), 0);
            for (i, a) in ul.pusch.iter().enumerate() {
                for b in &ul.pusch[i + 1..] {
                    assert!(!a.prbs.overlaps(&b.prbs));
                }
            }
        }
    }

    #[test]
    fn huge_buffer_reports_saturate() {
        let sched = configured();
        add_ue_with_data(&sched, 0x46, u32::MAX);
        sched
            .bearer_ue_cfg(
                0x46,
                4,
                BearerCfg {
                    direction: BearerDirection::Both,
                    priority: 2,
                    group: 1,
                },
            )
            .unwrap();
        sched.dl_rlc_buffer_state(0x46, 4, 3_000_000_000, 0).unwrap();
        sched.ul_bsr(0x46, 0, u32::MAX).unwrap();
        sched.ul_bsr(0x46, 1, 10).unwrap();

        assert_eq!(sched.get_dl_buffer(0x46), Ok(u32::MAX));
        assert_eq!(sched.get_ul_buffer(0x46), Ok(u32::MAX));
        let dl = sched.dl_sched(TtiPoint::new(4), 0);
        assert_eq!(dl.data.len(), 1);
        sched.ul_sched(TtiPoint::new(8), 0);
    }

    #[test]
    fn nack_leads_to_retransmission() {
        let sched = configured();
        add_ue_with_data(&sched, 0x46, 300);
        let dl = sched.dl_sched(TtiPoint::new(4), 0);
        assert_eq!(dl.data.len(), 1);
        let first = dl.data[0].clone();

        // ACK/NACK arrives 4 TTIs after transmission.
        sched
            .dl_ack_info(TtiPoint::new(8), 0x46, 0, 0, false)
            .unwrap();
        let dl = sched.dl_sched(TtiPoint::new(9), 0);
        let retx = dl.data.iter().find(|g| g.pid == first.pid).unwrap();
        assert_eq!(retx.nof_retx, 1);
        assert_eq!(retx.tbs, first.tbs);
        assert_eq!(retx.rbgmask.count(), first.rbgmask.count());
    }

    #[test]
    fn rach_on_unknown_carrier_rejected() {
        let sched = configured();
        let rar = RarInfo {
            prach_tti: TtiPoint::new(0),
            preamble_idx: 0,
            temp_crnti: 0x50,
            ta_cmd: 0,
            msg3_size: 7,
        };
        assert!(matches!(
            sched.dl_rach_info(4, rar),
            Err(SchedError::CarrierOutOfRange { cc: 4, .. })
        ));
        sched.dl_rach_info(0, rar).unwrap();
    }

    // ── Slicing ───────────────────────────────────────────────────────────────

    #[test]
    fn delete_request_unsupported() {
        let sched = configured();
        assert_eq!(
            sched.slice(&SliceCtrlRequest::Delete { ids: vec![0] }),
            Err(SliceCtrlError::DeleteUnsupported)
        );
    }

    #[test]
    fn slice_table_switches_policy_and_moves_ues() {
        let sched = configured();
        sched.ue_cfg(0x46, &UeCfg::default()).unwrap();
        let conf = SliceConf {
            sched_name: "RR".to_string(),
            slices: vec![static_slice(4, 0, 6), static_slice(2, 6, 13)],
        };
        sched.slice_add_mod(&conf).unwrap();
        assert_eq!(sched.ue_slice_id(0x46), Some(4));
        assert_eq!(sched.ues_in_slice(4), vec![0x46]);
        assert_eq!(sched.slice_stats().sched_name, Some("time_rr"));
        assert_eq!(sched.slice_table().len(), 2);

        // UEs created afterwards join the first slice too.
        sched.ue_cfg(0x47, &UeCfg::default()).unwrap();
        assert_eq!(sched.ue_slice_id(0x47), Some(4));
    }

    #[test]
    fn slice_range_bounded_by_primary_carrier() {
        let sched = configured();
        let conf = SliceConf {
            sched_name: "RR".to_string(),
            slices: vec![static_slice(0, 0, 14)],
        };
        assert!(matches!(
            sched.slice_add_mod(&conf),
            Err(SliceCtrlError::InvalidRbgRange { nof_rbg: 13, .. })
        ));
    }

    #[test]
    fn ue_rem_prunes_slice_association() {
        let sched = configured();
        sched.ue_cfg(0x46, &UeCfg::default()).unwrap();
        sched
            .slice_add_mod(&SliceConf {
                sched_name: "PF".to_string(),
                slices: vec![static_slice(0, 0, 13)],
            })
            .unwrap();
        assert_eq!(sched.ue_slice_associations(), vec![(0x46, Some(0))]);
        sched.ue_rem(0x46).unwrap();
        assert!(sched.ue_slice_associations().is_empty());
    }

    #[test]
    fn reset_keeps_slice_table_and_cells() {
        let sched = configured();
        sched.ue_cfg(0x46, &UeCfg::default()).unwrap();
        sched
            .slice_add_mod(&SliceConf {
                sched_name: "RR".to_string(),
                slices: vec![static_slice(0, 0, 13)],
            })
            .unwrap();
        sched.reset();
        assert!(!sched.ue_exists(0x46));
        assert!(sched.ue_slice_associations().is_empty());
        assert_eq!(sched.slice_table().len(), 1);
        assert!(sched.is_configured());
    }
}
