/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Scheduler of one carrier: builds the DL and UL result of a receive TTI.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cell::SchedCellParams;
use crate::mask::Interval;
use crate::scheduler::alloc::UeDb;
use crate::scheduler::policy::{make_policy, PolicyKind, SchedPolicy};
use crate::scheduler::result::{CcSchedResult, Msg3Grant};
use crate::scheduler::sf_sched::{SfSched, MSG3_NOF_PRB};
use crate::slicing::SlicingRegistry;
use crate::tti::{TtiPoint, MSG3_DELAY_MS};

/// Subframes between a PRACH and the start of its RAR window.
const RAR_WINDOW_OFFSET: u32 = 3;

/// PRACH detection forwarded by the PHY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RarInfo {
    pub prach_tti: TtiPoint,
    pub preamble_idx: u32,
    pub temp_crnti: u16,
    pub ta_cmd: u32,
    pub msg3_size: u32,
}

impl RarInfo {
    /// RA-RNTI of the PRACH occasion (FDD, first frequency resource).
    pub fn ra_rnti(&self) -> u16 {
        1 + self.prach_tti.sf_idx() as u16
    }
}

#[derive(Debug)]
pub struct CarrierSched {
    enb_cc_idx: usize,
    params: Option<Arc<SchedCellParams>>,
    policy: Box<dyn SchedPolicy>,
    pending_rars: VecDeque<RarInfo>,
    /// Msg3 grants keyed by their UL transmission TTI.
    pending_msg3: BTreeMap<u32, Vec<Msg3Grant>>,
    dl_tti_mask: Vec<bool>,
    nof_generated: u64,
}

impl CarrierSched {
    pub fn new(enb_cc_idx: usize, policy: Box<dyn SchedPolicy>) -> Self {
        Self {
            enb_cc_idx,
            params: None,
            policy,
            pending_rars: VecDeque::new(),
            pending_msg3: BTreeMap::new(),
            dl_tti_mask: Vec::new(),
            nof_generated: 0,
        }
    }

    pub fn enb_cc_idx(&self) -> usize {
        self.enb_cc_idx
    }

    pub fn params(&self) -> Option<&Arc<SchedCellParams>> {
        self.params.as_ref()
    }

    pub fn policy(&self) -> PolicyKind {
        self.policy.kind()
    }

    /// Install new carrier parameters.  The policy follows the configuration
    /// unless `slice_policy` overrides it.
    pub fn carrier_cfg(&mut self, params: Arc<SchedCellParams>, slice_policy: Option<PolicyKind>) {
        let kind = slice_policy.unwrap_or(params.policy);
        if kind != self.policy.kind() {
            self.policy = make_policy(kind, &params.sched_args);
        }
        info!(
            cc = self.enb_cc_idx,
            nof_prb = params.nof_prb,
            nof_rbg = params.nof_rbg,
            nof_cce = params.nof_cce,
            policy = kind.name(),
            "carrier configured"
        );
        self.params = Some(params);
    }

    pub fn set_policy(&mut self, kind: PolicyKind) {
        if kind == self.policy.kind() {
            return;
        }
        let Some(params) = &self.params else {
            return;
        };
        self.policy = make_policy(kind, &params.sched_args);
        info!(cc = self.enb_cc_idx, policy = kind.name(), "scheduling policy switched");
    }

    pub fn reset(&mut self) {
        self.pending_rars.clear();
        self.pending_msg3.clear();
        if let Some(params) = &self.params {
            self.policy = make_policy(self.policy.kind(), &params.sched_args);
        }
    }

    pub fn dl_rach_info(&mut self, rar: RarInfo) {
        debug!(
            cc = self.enb_cc_idx,
            prach_tti = %rar.prach_tti,
            temp_crnti = rar.temp_crnti,
            preamble = rar.preamble_idx,
            "RACH detected"
        );
        self.pending_rars.push_back(rar);
    }

    /// Subframes (indexed by `tti_tx_dl mod len`) where no DL is scheduled.
    pub fn set_dl_tti_mask(&mut self, mask: Vec<bool>) {
        self.dl_tti_mask = mask;
    }

    fn is_dl_tti_blocked(&self, tti_tx_dl: TtiPoint) -> bool {
        if self.dl_tti_mask.is_empty() {
            return false;
        }
        let idx = tti_tx_dl.to_uint() as usize % self.dl_tti_mask.len();
        self.dl_tti_mask[idx]
    }

    /// Number of results generated since creation.
    pub fn nof_generated(&self) -> u64 {
        self.nof_generated
    }

    /// Build the result of `tti_rx`.  Called at most once per TTI.
    pub fn generate_tti_result(
        &mut self,
        tti_rx: TtiPoint,
        ue_db: &mut UeDb,
        slicing: &SlicingRegistry,
    ) -> CcSchedResult {
        let Some(params) = self.params.clone() else {
            return CcSchedResult::default();
        };
        let cc = self.enb_cc_idx;
        for ue in ue_db.values_mut() {
            ue.new_subframe(tti_rx, cc);
        }

        let mut sf = SfSched::new(params, tti_rx);
        if self.is_dl_tti_blocked(sf.tti_tx_dl()) {
            sf.block_dl();
        }

        self.alloc_msg3s(&mut sf, ue_db);
        self.alloc_rars(&mut sf);
        self.policy.sched_dl_users(ue_db, &mut sf, slicing);
        self.policy.sched_ul_users(ue_db, &mut sf);

        self.nof_generated += 1;
        let result = sf.into_result();
        debug!(
            cc,
            tti_rx = %tti_rx,
            nof_dl = result.dl.data.len(),
            nof_rar = result.dl.rar.len(),
            nof_ul = result.ul.pusch.len(),
            cce = result.dl.nof_cce_used,
            "TTI result generated"
        );
        result
    }

    // ── Random access ─────────────────────────────────────────────────────────

    fn alloc_msg3s(&mut self, sf: &mut SfSched, ue_db: &mut UeDb) {
        let key = sf.tti_tx_ul().to_uint();
        let Some(grants) = self.pending_msg3.remove(&key) else {
            return;
        };
        let maxharq_msg3tx = sf.cell_params().cfg.maxharq_msg3tx;
        for grant in grants {
            let ue = ue_db.get_mut(&grant.temp_crnti);
            if let Err(e) = sf.alloc_msg3(&grant, ue, maxharq_msg3tx) {
                warn!(
                    cc = self.enb_cc_idx,
                    temp_crnti = grant.temp_crnti,
                    error = %e,
                    "Msg3 could not be placed"
                );
            }
        }
    }

    /// First PRBs past the lower PUCCH edge not used by other Msg3s of the
    /// same UL TTI.
    fn msg3_prbs(&self, params: &SchedCellParams, tti_tx_ul: TtiPoint) -> Option<Interval> {
        let edge = params.pucch_mask.find_lowest(0, false)? as u32;
        let taken = self
            .pending_msg3
            .get(&tti_tx_ul.to_uint())
            .map_or(0, Vec::len) as u32;
        let start = edge + taken * MSG3_NOF_PRB;
        let prbs = Interval::new(start, start + MSG3_NOF_PRB);
        if prbs.stop > params.nof_prb {
            return None;
        }
        // 6-PRB carriers place Msg3 over the upper PUCCH edge.
        let mut upper_edge = params.pucch_mask;
        upper_edge.fill(0, prbs.start as usize, false);
        let collides = upper_edge.any_in(prbs.start as usize, prbs.stop as usize);
        (!collides || params.nof_prb == 6).then_some(prbs)
    }

    fn alloc_rars(&mut self, sf: &mut SfSched) {
        let tti_tx_dl = sf.tti_tx_dl();
        let window = sf.cell_params().cfg.prach_rar_window;
        let mut remaining = VecDeque::with_capacity(self.pending_rars.len());

        while let Some(rar) = self.pending_rars.pop_front() {
            let start = rar.prach_tti + RAR_WINDOW_OFFSET;
            let end = start + window;
            if tti_tx_dl.diff(end) >= 0 {
                warn!(
                    cc = self.enb_cc_idx,
                    prach_tti = %rar.prach_tti,
                    temp_crnti = rar.temp_crnti,
                    "RAR window expired, dropping"
                );
                continue;
            }
            if tti_tx_dl.diff(start) < 0 {
                remaining.push_back(rar);
                continue;
            }

            let msg3_tti = tti_tx_dl + MSG3_DELAY_MS;
            let Some(prbs) = self.msg3_prbs(sf.cell_params(), msg3_tti) else {
                remaining.push_back(rar);
                continue;
            };
            match sf.alloc_rar(rar.ra_rnti(), rar.temp_crnti, rar.preamble_idx, prbs) {
                Ok(grant) => {
                    self.pending_msg3
                        .entry(msg3_tti.to_uint())
                        .or_default()
                        .push(grant.msg3);
                }
                Err(e) => {
                    debug!(cc = self.enb_cc_idx, temp_crnti = rar.temp_crnti, error = %e, "RAR postponed");
                    remaining.push_back(rar);
                }
            }
        }
        self.pending_rars = remaining;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CellCfg, SchedArgs};
    use crate::scheduler::sf_sched::MSG3_MCS;
    use crate::tti::{to_tx_ul, TTI_PERIOD};
    use crate::ue::{SchedUe, UeCfg};

    fn carrier(nof_prb: u32) -> CarrierSched {
        let args = SchedArgs::default();
        let params = Arc::new(
            SchedCellParams::set_cfg(
                0,
                &CellCfg {
                    nof_prb,
                    ..Default::default()
                },
                &args,
            )
            .unwrap(),
        );
        let mut c = CarrierSched::new(0, make_policy(params.policy, &args));
        c.carrier_cfg(params, None);
        c
    }

    fn rar(prach: u32, temp_crnti: u16) -> RarInfo {
        RarInfo {
            prach_tti: TtiPoint::new(prach),
            preamble_idx: 3,
            temp_crnti,
            ta_cmd: 0,
            msg3_size: 7,
        }
    }

    #[test]
    fn unconfigured_carrier_generates_nothing() {
        let mut c = CarrierSched::new(0, make_policy(PolicyKind::TimeRr, &SchedArgs::default()));
        let r = c.generate_tti_result(TtiPoint::new(0), &mut UeDb::new(), &SlicingRegistry::new());
        assert!(!r.generated);
        assert_eq!(c.nof_generated(), 0);
    }

    // ── Random access ─────────────────────────────────────────────────────────

    #[test]
    fn rar_sent_inside_window_and_msg3_placed_later() {
        let mut c = carrier(25);
        let mut db = UeDb::new();
        let slicing = SlicingRegistry::new();
        c.dl_rach_info(rar(10, 0x50));

        // tti_tx_dl 13 = prach + 3
        let r = c.generate_tti_result(TtiPoint::new(9), &mut db, &slicing);
        assert_eq!(r.dl.rar.len(), 1);
        let msg3 = r.dl.rar[0].msg3.clone();
        assert_eq!(msg3.mcs, MSG3_MCS);
        assert_eq!(msg3.prbs, Interval::new(2, 5));

        // Msg3 goes out at tti_tx_dl + 6 = 19 → tti_rx 11
        let mut found = false;
        for t in 10..=12 {
            let r = c.generate_tti_result(TtiPoint::new(t), &mut db, &slicing);
            if to_tx_ul(TtiPoint::new(t)) == TtiPoint::new(19) {
                assert_eq!(r.ul.pusch.len(), 1);
                assert!(r.ul.pusch[0].is_msg3);
                found = true;
            }
        }
        assert!(found);
    }

    #[test]
    fn rar_before_window_waits() {
        let mut c = carrier(25);
        c.dl_rach_info(rar(100, 0x50));
        let r = c.generate_tti_result(TtiPoint::new(96), &mut UeDb::new(), &SlicingRegistry::new());
        assert!(r.dl.rar.is_empty());
        assert_eq!(c.pending_rars.len(), 1);
    }

    #[test]
    fn expired_rar_dropped() {
        let mut c = carrier(25);
        c.dl_rach_info(rar(10, 0x50));
        // window [13, 23), tti_tx_dl = 30
        let r = c.generate_tti_result(TtiPoint::new(26), &mut UeDb::new(), &SlicingRegistry::new());
        assert!(r.dl.rar.is_empty());
        assert!(c.pending_rars.is_empty());
    }

    #[test]
    fn two_rars_get_disjoint_msg3() {
        let mut c = carrier(25);
        c.dl_rach_info(rar(10, 0x50));
        c.dl_rach_info(rar(10, 0x51));
        let r = c.generate_tti_result(TtiPoint::new(9), &mut UeDb::new(), &SlicingRegistry::new());
        assert_eq!(r.dl.rar.len(), 2);
        assert!(!r.dl.rar[0].msg3.prbs.overlaps(&r.dl.rar[1].msg3.prbs));
        assert!((r.dl.rar[0].rbgmask & r.dl.rar[1].rbgmask).none());
    }

    #[test]
    fn msg3_recorded_in_existing_ue_harq() {
        let mut c = carrier(25);
        let params = Arc::clone(c.params().unwrap());
        let mut db = UeDb::new();
        db.insert(0x50, SchedUe::new(0x50, &[params], &UeCfg::default()).unwrap());
        let slicing = SlicingRegistry::new();
        c.dl_rach_info(rar(10, 0x50));
        c.generate_tti_result(TtiPoint::new(9), &mut db, &slicing);
        c.generate_tti_result(TtiPoint::new(10), &mut db, &slicing);
        c.generate_tti_result(TtiPoint::new(11), &mut db, &slicing);
        let pid = crate::harq::HarqEntity::ul_pid(TtiPoint::new(19));
        assert!(db[&0x50].cell(0).unwrap().harq.ul(pid).is_msg3());
    }

    // ── Subframe mask ─────────────────────────────────────────────────────────

    #[test]
    fn masked_dl_subframe_gets_no_grants() {
        let mut c = carrier(25);
        let mut mask = vec![false; 10];
        mask[3] = true;
        c.set_dl_tti_mask(mask);
        c.dl_rach_info(rar(0, 0x50));
        // tti_tx_dl 3 is masked: RAR postponed to the next subframe
        let last = TtiPoint::new(TTI_PERIOD - 1);
        let r = c.generate_tti_result(last, &mut UeDb::new(), &SlicingRegistry::new());
        assert!(r.dl.rar.is_empty());
        let r = c.generate_tti_result(TtiPoint::new(0), &mut UeDb::new(), &SlicingRegistry::new());
        assert_eq!(r.dl.rar.len(), 1);
    }

    #[test]
    fn policy_switch_keeps_parameters() {
        let mut c = carrier(25);
        assert_eq!(c.policy(), PolicyKind::TimePf);
        c.set_policy(PolicyKind::TimeRr);
        assert_eq!(c.policy(), PolicyKind::TimeRr);
        assert!(c.params().is_some());
    }
}
