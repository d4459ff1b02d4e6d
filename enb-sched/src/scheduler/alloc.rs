/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Allocation helpers: can this UE's request be satisfied on this TTI?
//!
//! The helpers never choose between UEs; policies call them in their own
//! order.  Every helper either commits a grant through [`SfSched`] or leaves
//! the TTI untouched.
//!
//! Eligibility is checked by the `get_*_harq` functions (same gates for DL
//! and UL):
//!
//! 1. the UE has no grant in this direction yet,
//! 2. the carrier is active for the UE,
//! 3. the physical channel is usable at this TTI (no measurement gap).

use std::collections::BTreeMap;

use crate::harq::HarqEntity;
use crate::mask::{find_available_rbgmask, find_contiguous_ul_prbs, Interval, PrbInterval, RbgMask};
use crate::scheduler::error::AllocError;
use crate::scheduler::sf_sched::SfSched;
use crate::slicing::SlicingRegistry;
use crate::tbs;
use crate::ue::{SchedUe, SchedUeCell};

/// UE database of the scheduler, ordered by RNTI.
pub type UeDb = BTreeMap<u16, SchedUe>;

// ── Eligibility ───────────────────────────────────────────────────────────────

/// UE carrier index if the UE may receive PDSCH on this TTI.
pub fn get_ue_cc_idx_if_pdsch_enabled(ue: &SchedUe, sf: &SfSched) -> Option<usize> {
    if sf.is_dl_alloc(ue.rnti()) {
        return None;
    }
    let cc = sf.enb_cc_idx();
    let ue_cc_idx = ue.get_active_cell_index(cc)?;
    ue.pdsch_enabled(sf.tti_rx(), cc).then_some(ue_cc_idx)
}

/// UE carrier index if the UE may transmit PUSCH on this TTI.
pub fn get_ue_cc_idx_if_pusch_enabled(ue: &SchedUe, sf: &SfSched, needs_pdcch: bool) -> Option<usize> {
    if sf.is_ul_alloc(ue.rnti()) {
        return None;
    }
    let cc = sf.enb_cc_idx();
    let ue_cc_idx = ue.get_active_cell_index(cc)?;
    ue.pusch_enabled(sf.tti_rx(), cc, needs_pdcch)
        .then_some(ue_cc_idx)
}

/// Oldest DL HARQ process waiting for retransmission.
pub fn get_dl_retx_harq(ue: &SchedUe, sf: &SfSched) -> Option<usize> {
    get_ue_cc_idx_if_pdsch_enabled(ue, sf)?;
    ue.cell(sf.enb_cc_idx())?
        .harq
        .find_pending_dl_harq(sf.tti_tx_dl())
}

/// Free DL HARQ process for new data.
pub fn get_dl_newtx_harq(ue: &SchedUe, sf: &SfSched) -> Option<usize> {
    get_ue_cc_idx_if_pdsch_enabled(ue, sf)?;
    ue.cell(sf.enb_cc_idx())?.harq.find_empty_dl_harq()
}

/// UL HARQ process of this TTI if it waits for retransmission.
pub fn get_ul_retx_harq(ue: &SchedUe, sf: &SfSched) -> Option<usize> {
    get_ue_cc_idx_if_pusch_enabled(ue, sf, false)?;
    let pid = HarqEntity::ul_pid(sf.tti_tx_ul());
    ue.cell(sf.enb_cc_idx())?
        .harq
        .ul(pid)
        .has_pending_retx()
        .then_some(pid)
}

/// UL HARQ process of this TTI if it is free for new data.
pub fn get_ul_newtx_harq(ue: &SchedUe, sf: &SfSched) -> Option<usize> {
    get_ue_cc_idx_if_pusch_enabled(ue, sf, true)?;
    let pid = HarqEntity::ul_pid(sf.tti_tx_ul());
    ue.cell(sf.enb_cc_idx())?
        .harq
        .ul(pid)
        .is_empty()
        .then_some(pid)
}

// ── DL ────────────────────────────────────────────────────────────────────────

/// Smallest RBG set within the free RBGs of `current_mask` whose TBS covers
/// the largest useful byte count of `req_bytes`, or the whole free space if
/// nothing is that large.  Fails when even that TBS is below the minimum.
pub fn find_optimal_rbgmask(
    ue_cell: &SchedUeCell,
    current_mask: &RbgMask,
    is_contiguous: bool,
    req_bytes: Interval,
) -> Option<(RbgMask, u32)> {
    if req_bytes.is_empty() {
        return None;
    }
    let params = ue_cell.params();
    let mcs = ue_cell.dl_mcs();
    let nof_re = params.dl_nof_re_per_prb();
    let max_bytes = req_bytes.stop - 1;
    let nof_free = (!*current_mask).count();

    let mut best = None;
    for nof_rbg in 1..=nof_free {
        let mask = find_available_rbgmask(nof_rbg, is_contiguous, current_mask);
        if mask.count() < nof_rbg {
            break;
        }
        let tbs = tbs::tbs_bytes(mcs, params.rbg_mask_to_nof_prb(&mask), nof_re)?;
        best = Some((mask, tbs));
        if tbs >= max_bytes {
            break;
        }
    }
    best.filter(|&(_, tbs)| tbs >= req_bytes.start)
}

/// Retransmit DL HARQ process `pid`, preferring its previous RBGs.  Slicing
/// does not apply to retransmissions.
pub fn try_dl_retx_alloc(sf: &mut SfSched, ue: &mut SchedUe, pid: usize) -> Result<RbgMask, AllocError> {
    let prev = ue
        .cell(sf.enb_cc_idx())
        .ok_or(AllocError::NoRntiOpportunity)?
        .harq
        .dl(pid)
        .rbgmask();

    match sf.alloc_dl_user(ue, prev, pid) {
        Err(AllocError::SchCollision) => {}
        other => return other.map(|()| prev),
    }

    let nof_rbg = prev.count();
    let mask = find_available_rbgmask(nof_rbg, ue.needs_contiguous_dl(), &sf.dl_mask());
    if mask.count() != nof_rbg {
        return Err(AllocError::NoSchSpace);
    }
    sf.alloc_dl_user(ue, mask, pid)?;
    Ok(mask)
}

/// New DL transmission on HARQ process `pid`, confined to the UE's slice.
pub fn try_dl_newtx_alloc_greedy(
    sf: &mut SfSched,
    ue: &mut SchedUe,
    pid: usize,
    slicing: &SlicingRegistry,
) -> Result<RbgMask, AllocError> {
    let cc = sf.enb_cc_idx();
    let available = slicing.confine(ue.slice_id(), sf.dl_mask());
    if available.all() {
        return Err(AllocError::NoSchSpace);
    }

    let req_bytes = ue.get_requested_dl_bytes(cc);
    if req_bytes.is_empty() {
        return Err(AllocError::NoRntiOpportunity);
    }

    let ue_cell = ue.cell(cc).ok_or(AllocError::NoRntiOpportunity)?;
    let (mask, _) = find_optimal_rbgmask(ue_cell, &available, ue.needs_contiguous_dl(), req_bytes)
        .ok_or(AllocError::NoSchSpace)?;

    sf.alloc_dl_user(ue, mask, pid)?;
    Ok(mask)
}

// ── UL ────────────────────────────────────────────────────────────────────────

/// Largest PRB count not above `nof_prb` of the form 2^a·3^b·5^c (DFT sizes
/// the PUSCH supports).
pub fn largest_valid_ul_nof_prb(nof_prb: u32) -> u32 {
    (1..=nof_prb)
        .rev()
        .find(|&n| {
            let mut v = n;
            for f in [2, 3, 5] {
                while v % f == 0 {
                    v /= f;
                }
            }
            v == 1
        })
        .unwrap_or(0)
}

/// Retransmit UL HARQ process `pid`.
pub fn try_ul_retx_alloc(sf: &mut SfSched, ue: &mut SchedUe, pid: usize) -> Result<(), AllocError> {
    let cc = sf.enb_cc_idx();
    let h = ue.cell(cc).ok_or(AllocError::NoRntiOpportunity)?.harq.ul(pid);
    let prev = h.alloc();

    // Narrow carriers cannot fit Msg3 between the PUCCH edges.
    if h.is_msg3() && sf.cell_params().nof_prb == 6 {
        return sf.alloc_ul_user(ue, prev, true);
    }

    if !sf.ul_mask().any_in(prev.start as usize, prev.stop as usize) {
        match sf.alloc_ul_user(ue, prev, false) {
            Err(AllocError::SchCollision) => {}
            other => return other,
        }
    }

    // Moving the grant needs a DCI.
    if !ue.pusch_enabled(sf.tti_rx(), cc, true) {
        return Err(AllocError::NoRntiOpportunity);
    }
    let alloc = find_contiguous_ul_prbs(prev.length(), &sf.ul_mask());
    if alloc.length() != prev.length() {
        return Err(AllocError::NoSchSpace);
    }
    sf.alloc_ul_user(ue, alloc, false)
}

/// New UL transmission sized to the UE's pending data.
pub fn try_ul_newtx_alloc_greedy(sf: &mut SfSched, ue: &mut SchedUe) -> Result<PrbInterval, AllocError> {
    let pending = ue.get_pending_ul_new_data();
    if pending == 0 {
        return Err(AllocError::NoRntiOpportunity);
    }
    let mcs = ue
        .cell(sf.enb_cc_idx())
        .ok_or(AllocError::NoRntiOpportunity)?
        .ul_mcs();
    let req_prbs = tbs::required_prbs(pending, mcs, tbs::nof_ul_re_per_prb(), sf.cell_params().nof_prb);

    let free = find_contiguous_ul_prbs(req_prbs, &sf.ul_mask());
    if free.is_empty() {
        return Err(AllocError::NoSchSpace);
    }
    let alloc = Interval::new(free.start, free.start + largest_valid_ul_nof_prb(free.length()));
    sf.alloc_ul_user(ue, alloc, false)?;
    Ok(alloc)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
