/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Pluggable scheduling policies.
//!
//! A policy only decides the order in which UEs are offered to the
//! allocation helpers of [`alloc`](super::alloc); whether a grant fits the
//! TTI is decided there.  Both policies serve HARQ retransmissions before new
//! data.

pub mod time_pf;
pub mod time_rr;

use std::fmt;

use serde::Serialize;

use crate::config::SchedArgs;
use crate::scheduler::alloc::{self, UeDb};
use crate::scheduler::error::AllocError;
use crate::scheduler::sf_sched::SfSched;
use crate::slicing::SlicingRegistry;

pub use time_pf::TimePf;
pub use time_rr::TimeRr;

// ── Policy selection ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    TimeRr,
    TimePf,
}

impl PolicyKind {
    /// Policy from its configuration name (`time_rr`, `time_pf`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "time_rr" => Some(PolicyKind::TimeRr),
            "time_pf" => Some(PolicyKind::TimePf),
            _ => None,
        }
    }

    /// Policy from its slice-control wire name (`RR`, `PF`).
    pub fn from_slice_name(name: &str) -> Option<Self> {
        match name {
            "RR" => Some(PolicyKind::TimeRr),
            "PF" => Some(PolicyKind::TimePf),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PolicyKind::TimeRr => "time_rr",
            PolicyKind::TimePf => "time_pf",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-carrier scheduling policy.
pub trait SchedPolicy: Send + fmt::Debug {
    fn kind(&self) -> PolicyKind;

    fn sched_dl_users(&mut self, ue_db: &mut UeDb, sf: &mut SfSched, slicing: &SlicingRegistry);

    fn sched_ul_users(&mut self, ue_db: &mut UeDb, sf: &mut SfSched);
}

pub fn make_policy(kind: PolicyKind, args: &SchedArgs) -> Box<dyn SchedPolicy> {
    match kind {
        PolicyKind::TimeRr => Box::new(TimeRr::new()),
        PolicyKind::TimePf => Box::new(TimePf::new(args)),
    }
}

// ── Shared passes ─────────────────────────────────────────────────────────────

/// Outcome of one pass over a candidate list.
#[derive(Debug, Default)]
pub(crate) struct PassOutcome {
    /// New-data bytes granted, per RNTI.
    pub served: Vec<(u16, u32)>,
    /// PDCCH ran out; later passes of this TTI are pointless.
    pub cch_exhausted: bool,
}

fn log_outcome(rnti: u16, what: &'static str, res: &Result<(), AllocError>) {
    if let Err(e) = res {
        tracing::debug!(rnti, error = %e, "{} not allocated", what);
    }
}

/// Offer DL retransmissions in `order`.
pub(crate) fn sched_dl_retxs(ue_db: &mut UeDb, sf: &mut SfSched, order: &[u16]) -> PassOutcome {
    let mut out = PassOutcome::default();
    for rnti in order {
        let Some(ue) = ue_db.get_mut(rnti) else {
            continue;
        };
        let Some(pid) = alloc::get_dl_retx_harq(ue, sf) else {
            continue;
        };
        let res = alloc::try_dl_retx_alloc(sf, ue, pid).map(|_| ());
        log_outcome(*rnti, "DL retx", &res);
        if res == Err(AllocError::NoCchSpace) {
            out.cch_exhausted = true;
            break;
        }
    }
    out
}

/// Offer DL new transmissions in `order`.
pub(crate) fn sched_dl_newtxs(
    ue_db: &mut UeDb,
    sf: &mut SfSched,
    slicing: &SlicingRegistry,
    order: &[u16],
) -> PassOutcome {
    let mut out = PassOutcome::default();
    for rnti in order {
        if sf.dl_mask().all() {
            break;
        }
        let Some(ue) = ue_db.get_mut(rnti) else {
            continue;
        };
        let Some(pid) = alloc::get_dl_newtx_harq(ue, sf) else {
            continue;
        };
        let res = alloc::try_dl_newtx_alloc_greedy(sf, ue, pid, slicing).map(|_| ());
        log_outcome(*rnti, "DL newtx", &res);
        match res {
            Ok(()) => {
                let tbs = ue
                    .cell(sf.enb_cc_idx())
                    .map_or(0, |c| c.harq.dl(pid).tbs());
                out.served.push((*rnti, tbs));
            }
            Err(AllocError::NoCchSpace) => {
                out.cch_exhausted = true;
                break;
            }
            Err(_) => {}
        }
    }
    out
}

/// Offer UL retransmissions in `order`.
pub(crate) fn sched_ul_retxs(ue_db: &mut UeDb, sf: &mut SfSched, order: &[u16]) -> PassOutcome {
    let mut out = PassOutcome::default();
    for rnti in order {
        let Some(ue) = ue_db.get_mut(rnti) else {
            continue;
        };
        let Some(pid) = alloc::get_ul_retx_harq(ue, sf) else {
            continue;
        };
        let res = alloc::try_ul_retx_alloc(sf, ue, pid);
        log_outcome(*rnti, "UL retx", &res);
        if res == Err(AllocError::NoCchSpace) {
            out.cch_exhausted = true;
            break;
        }
    }
    out
}

/// Offer UL new transmissions in `order`.
pub(crate) fn sched_ul_newtxs(ue_db: &mut UeDb, sf: &mut SfSched, order: &[u16]) -> PassOutcome {
    let mut out = PassOutcome::default();
    for rnti in order {
        let Some(ue) = ue_db.get_mut(rnti) else {
            continue;
        };
        if alloc::get_ul_newtx_harq(ue, sf).is_none() {
            continue;
        }
        match alloc::try_ul_newtx_alloc_greedy(sf, ue) {
            Ok(prbs) => {
                let pid = crate::harq::HarqEntity::ul_pid(sf.tti_tx_ul());
                let tbs = ue
                    .cell(sf.enb_cc_idx())
                    .map_or(0, |c| c.harq.ul(pid).tbs());
                tracing::debug!(rnti, prbs = %prbs, tbs, "UL newtx allocated");
                out.served.push((*rnti, tbs));
            }
            Err(AllocError::NoCchSpace) => {
                out.cch_exhausted = true;
                break;
            }
            Err(e) => tracing::debug!(rnti, error = %e, "UL newtx not allocated"),
        }
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
