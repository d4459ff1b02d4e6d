/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Time-domain proportional fair.
//!
//! New-data candidates are ranked by `rate / avg^fairness`, where `rate` is
//! the TBS the UE would get on the whole carrier at its current MCS and
//! `avg` the exponentially averaged bytes served per TTI.  `fairness` comes
//! from `policy_args` (0 degenerates to max-rate, larger values favour
//! starved UEs).  Ties are broken by RNTI.

use std::collections::BTreeMap;

use tracing::warn;

use super::{sched_dl_newtxs, sched_dl_retxs, sched_ul_newtxs, sched_ul_retxs};
use super::{PolicyKind, SchedPolicy};
use crate::config::SchedArgs;
use crate::scheduler::alloc::{self, UeDb};
use crate::scheduler::sf_sched::SfSched;
use crate::slicing::SlicingRegistry;
use crate::tbs;

const DEFAULT_FAIRNESS: f32 = 1.0;
/// Weight of the current TTI in the served-rate average.
const EWMA_COEFF: f32 = 0.01;

#[derive(Debug, Default)]
struct ServedRate {
    dl: f32,
    ul: f32,
}

#[derive(Debug)]
pub struct TimePf {
    fairness: f32,
    rates: BTreeMap<u16, ServedRate>,
}

impl TimePf {
    pub fn new(args: &SchedArgs) -> Self {
        let fairness = match args.policy_args.trim().parse::<f32>() {
            Ok(v) if v >= 0.0 => v,
            _ => {
                warn!(
                    policy_args = %args.policy_args,
                    default = DEFAULT_FAIRNESS,
                    "invalid PF fairness coefficient, using default"
                );
                DEFAULT_FAIRNESS
            }
        };
        Self {
            fairness,
            rates: BTreeMap::new(),
        }
    }

    pub fn fairness(&self) -> f32 {
        self.fairness
    }

    fn priority(&self, rate: u32, avg: f32) -> f32 {
        rate as f32 / avg.max(1.0).powf(self.fairness)
    }

    /// Candidates ordered by descending priority, ties by RNTI.
    fn rank(&self, mut cands: Vec<(u16, f32)>) -> Vec<u16> {
        cands.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        cands.into_iter().map(|(rnti, _)| rnti).collect()
    }

    /// Forget UEs that left and fold this TTI's service into the averages.
    fn update_rates(&mut self, ue_db: &UeDb, served: &[(u16, u32)], dl: bool) {
        self.rates.retain(|rnti, _| ue_db.contains_key(rnti));
        for &rnti in ue_db.keys() {
            let bytes = served
                .iter()
                .find(|(r, _)| *r == rnti)
                .map_or(0, |&(_, b)| b);
            let entry = self.rates.entry(rnti).or_default();
            let avg = if dl { &mut entry.dl } else { &mut entry.ul };
            *avg = (1.0 - EWMA_COEFF) * *avg + EWMA_COEFF * bytes as f32;
        }
    }

    fn avg(&self, rnti: u16, dl: bool) -> f32 {
        self.rates
            .get(&rnti)
            .map_or(0.0, |r| if dl { r.dl } else { r.ul })
    }
}

impl SchedPolicy for TimePf {
    fn kind(&self) -> PolicyKind {
        PolicyKind::TimePf
    }

    fn sched_dl_users(&mut self, ue_db: &mut UeDb, sf: &mut SfSched, slicing: &SlicingRegistry) {
        let by_rnti: Vec<u16> = ue_db.keys().copied().collect();
        let retx = sched_dl_retxs(ue_db, sf, &by_rnti);

        let mut served = Vec::new();
        if !retx.cch_exhausted {
            let cc = sf.enb_cc_idx();
            let nof_prb = sf.cell_params().nof_prb;
            let nof_re = sf.cell_params().dl_nof_re_per_prb();
            let view: &SfSched = sf;
            let cands = ue_db
                .values()
                .filter(|ue| alloc::get_dl_newtx_harq(ue, view).is_some())
                .filter(|ue| !ue.get_requested_dl_bytes(cc).is_empty())
                .filter_map(|ue| {
                    let mcs = ue.cell(cc)?.dl_mcs();
                    let rate = tbs::tbs_bytes(mcs, nof_prb, nof_re).unwrap_or(0);
                    Some((ue.rnti(), self.priority(rate, self.avg(ue.rnti(), true))))
                })
                .collect();
            let order = self.rank(cands);
            served = sched_dl_newtxs(ue_db, sf, slicing, &order).served;
        }
        self.update_rates(ue_db, &served, true);
    }

    fn sched_ul_users(&mut self, ue_db: &mut UeDb, sf: &mut SfSched) {
        let by_rnti: Vec<u16> = ue_db.keys().copied().collect();
        let retx = sched_ul_retxs(ue_db, sf, &by_rnti);

        let mut served = Vec::new();
        if !retx.cch_exhausted {
            let cc = sf.enb_cc_idx();
            let nof_prb = sf.cell_params().nof_prb;
            let view: &SfSched = sf;
            let cands = ue_db
                .values()
                .filter(|ue| alloc::get_ul_newtx_harq(ue, view).is_some())
                .filter(|ue| ue.get_pending_ul_new_data() > 0)
                .filter_map(|ue| {
                    let mcs = ue.cell(cc)?.ul_mcs();
                    let rate =
                        tbs::tbs_bytes(mcs, nof_prb, tbs::nof_ul_re_per_prb()).unwrap_or(0);
                    Some((ue.rnti(), self.priority(rate, self.avg(ue.rnti(), false))))
                })
                .collect();
            let order = self.rank(cands);
            served = sched_ul_newtxs(ue_db, sf, &order).served;
        }
        self.update_rates(ue_db, &served, false);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
