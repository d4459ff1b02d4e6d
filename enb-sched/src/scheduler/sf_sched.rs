/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Allocation state of one carrier for one receive TTI.
//!
//! An [`SfSched`] tracks the RBGs (DL) and PRBs (UL) already granted, the
//! PDCCH CCEs consumed and which UEs were served in each direction.  Every
//! `alloc_*` call either commits a grant (updating masks, HARQ and UE
//! buffers together) or changes nothing.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::cell::SchedCellParams;
use crate::harq::HarqEntity;
use crate::mask::{PrbInterval, PrbMask, RbgMask};
use crate::scheduler::error::AllocError;
use crate::scheduler::result::{
    CcSchedResult, DlDataGrant, DlSchedResult, Msg3Grant, RarGrant, UlGrant, UlSchedResult,
};
use crate::tbs;
use crate::tti::{to_tx_dl, to_tx_ul, TtiPoint};
use crate::ue::SchedUe;

/// PRBs of a RAR PDSCH.
pub const RAR_NOF_PRB: u32 = 3;
/// PRBs of a Msg3 PUSCH.
pub const MSG3_NOF_PRB: u32 = 3;
pub const MSG3_MCS: u32 = 0;
/// PDCCH aggregation level (log2) used for RAR DCIs.
const RAR_AGGR_LEVEL: u32 = 2;
/// Bytes of one RAR MAC PDU (subheader + payload).
const RAR_PDU_BYTES: u32 = 7;

pub struct SfSched {
    params: Arc<SchedCellParams>,
    tti_rx: TtiPoint,
    dl_mask: RbgMask,
    ul_mask: PrbMask,
    nof_cce_used: u32,
    dl_blocked: bool,
    dl_rntis: BTreeSet<u16>,
    ul_rntis: BTreeSet<u16>,
    dl: DlSchedResult,
    ul: UlSchedResult,
}

impl SfSched {
    pub fn new(params: Arc<SchedCellParams>, tti_rx: TtiPoint) -> Self {
        let dl_mask = params.empty_rbg_mask();
        let ul_mask = params.pucch_mask;
        let cfi = params.nof_ctrl_symbols;
        Self {
            params,
            tti_rx,
            dl_mask,
            ul_mask,
            nof_cce_used: 0,
            dl_blocked: false,
            dl_rntis: BTreeSet::new(),
            ul_rntis: BTreeSet::new(),
            dl: DlSchedResult {
                tti_tx_dl: to_tx_dl(tti_rx),
                cfi,
                ..Default::default()
            },
            ul: UlSchedResult {
                tti_tx_ul: to_tx_ul(tti_rx),
                ..Default::default()
            },
        }
    }

    pub fn tti_rx(&self) -> TtiPoint {
        self.tti_rx
    }

    pub fn tti_tx_dl(&self) -> TtiPoint {
        to_tx_dl(self.tti_rx)
    }

    pub fn tti_tx_ul(&self) -> TtiPoint {
        to_tx_ul(self.tti_rx)
    }

    pub fn enb_cc_idx(&self) -> usize {
        self.params.enb_cc_idx
    }

    pub fn cell_params(&self) -> &SchedCellParams {
        &self.params
    }

    /// RBGs already granted on the DL of this TTI.
    pub fn dl_mask(&self) -> RbgMask {
        self.dl_mask
    }

    /// PRBs already granted (or reserved for PUCCH) on the UL of this TTI.
    pub fn ul_mask(&self) -> PrbMask {
        self.ul_mask
    }

    pub fn nof_cce_used(&self) -> u32 {
        self.nof_cce_used
    }

    pub fn is_dl_alloc(&self, rnti: u16) -> bool {
        self.dl_rntis.contains(&rnti)
    }

    pub fn is_ul_alloc(&self, rnti: u16) -> bool {
        self.ul_rntis.contains(&rnti)
    }

    /// Mark the DL subframe unavailable (e.g. MBSFN); every DL allocation
    /// fails afterwards.
    pub fn block_dl(&mut self) {
        self.dl_blocked = true;
        self.dl_mask.fill(0, self.dl_mask.size(), true);
    }

    pub fn is_dl_blocked(&self) -> bool {
        self.dl_blocked
    }

    // ── PDCCH ─────────────────────────────────────────────────────────────────

    fn cce_needed(&self, aggr_level: u32) -> Result<u32, AllocError> {
        let nof_cce = self.params.nof_cce;
        if nof_cce == 0 {
            return Err(AllocError::NoCchSpace);
        }
        let max_level = nof_cce.ilog2().min(3);
        let ncce = 1 << aggr_level.min(max_level);
        if self.nof_cce_used + ncce > nof_cce {
            return Err(AllocError::NoCchSpace);
        }
        Ok(ncce)
    }

    // ── DL ────────────────────────────────────────────────────────────────────

    /// Grant `mask` to `ue` on DL HARQ process `pid`.
    ///
    /// A process pending retransmission is retransmitted (the mask must keep
    /// its RBG count); an empty process carries new data.
    pub fn alloc_dl_user(&mut self, ue: &mut SchedUe, mask: RbgMask, pid: usize) -> Result<(), AllocError> {
        let cc = self.enb_cc_idx();
        if self.dl_blocked {
            return Err(AllocError::NoSchSpace);
        }
        if self.is_dl_alloc(ue.rnti()) {
            return Err(AllocError::NoRntiOpportunity);
        }
        if mask.none() || mask.size() != self.dl_mask.size() {
            return Err(AllocError::InvalidGrantParams);
        }
        if (self.dl_mask & mask).any() {
            return Err(AllocError::SchCollision);
        }
        let maxharq_tx = ue.cfg().maxharq_tx;
        let dci_format = ue.dci_format();
        let ue_cell = ue.cell(cc).ok_or(AllocError::NoRntiOpportunity)?;
        let aggr_level = ue_cell.aggr_level();
        let ncce = self.cce_needed(aggr_level)?;
        let nof_prb = self.params.rbg_mask_to_nof_prb(&mask);
        let tti_tx_dl = self.tti_tx_dl();

        let h = ue_cell.harq.dl(pid);
        let grant = if h.has_pending_retx() {
            if h.rbgmask().count() != mask.count() {
                return Err(AllocError::InvalidGrantParams);
            }
            let ue_cell = ue.cell_mut(cc).ok_or(AllocError::NoRntiOpportunity)?;
            let h = ue_cell.harq.dl_mut(pid);
            h.new_retx(mask, tti_tx_dl);
            DlDataGrant {
                rnti: 0,
                pid,
                rbgmask: mask,
                nof_prb,
                mcs: h.mcs(),
                tbs: h.tbs(),
                ndi: h.ndi(),
                nof_retx: h.nof_retx(),
                dci_format,
                aggr_level,
            }
        } else if h.is_empty() {
            let mcs = ue_cell.dl_mcs();
            let tbs = tbs::tbs_bytes(mcs, nof_prb, self.params.dl_nof_re_per_prb())
                .ok_or(AllocError::InvalidCoderate)?;
            if tbs == 0 {
                return Err(AllocError::InvalidCoderate);
            }
            let ue_cell = ue.cell_mut(cc).ok_or(AllocError::NoRntiOpportunity)?;
            let h = ue_cell.harq.dl_mut(pid);
            h.new_tx(mask, tti_tx_dl, mcs, tbs, maxharq_tx);
            let ndi = h.ndi();
            ue.on_dl_newtx(tbs, nof_prb);
            DlDataGrant {
                rnti: 0,
                pid,
                rbgmask: mask,
                nof_prb,
                mcs,
                tbs,
                ndi,
                nof_retx: 0,
                dci_format,
                aggr_level,
            }
        } else {
            return Err(AllocError::InvalidGrantParams);
        };

        let rnti = ue.rnti();
        self.dl_mask |= mask;
        self.nof_cce_used += ncce;
        self.dl_rntis.insert(rnti);
        debug!(
            rnti,
            pid,
            tti = %tti_tx_dl,
            mask = %mask,
            tbs = grant.tbs,
            retx = grant.nof_retx,
            "DL grant"
        );
        self.dl.data.push(DlDataGrant { rnti, ..grant });
        Ok(())
    }

    /// Random access response for a PRACH detection, with a Msg3 grant on
    /// `msg3_prbs` to be transmitted `MSG3_DELAY_MS` later.
    pub fn alloc_rar(
        &mut self,
        ra_rnti: u16,
        temp_crnti: u16,
        preamble_idx: u32,
        msg3_prbs: PrbInterval,
    ) -> Result<RarGrant, AllocError> {
        if self.dl_blocked {
            return Err(AllocError::NoSchSpace);
        }
        let nof_rbg = self.params.prb_to_rbg(RAR_NOF_PRB) as usize;
        let mask = crate::mask::find_available_rbgmask(nof_rbg, true, &self.dl_mask);
        if mask.count() < nof_rbg {
            return Err(AllocError::NoSchSpace);
        }
        let ncce = self.cce_needed(RAR_AGGR_LEVEL)?;
        let nof_prb = self.params.rbg_mask_to_nof_prb(&mask);
        let tbs = tbs::tbs_bytes(0, nof_prb, self.params.dl_nof_re_per_prb())
            .ok_or(AllocError::InvalidCoderate)?;
        if tbs < RAR_PDU_BYTES {
            return Err(AllocError::InvalidCoderate);
        }

        self.dl_mask |= mask;
        self.nof_cce_used += ncce;
        let grant = RarGrant {
            ra_rnti,
            rbgmask: mask,
            tbs,
            msg3: Msg3Grant {
                temp_crnti,
                preamble_idx,
                prbs: msg3_prbs,
                mcs: MSG3_MCS,
            },
        };
        debug!(ra_rnti, temp_crnti, mask = %mask, msg3 = %msg3_prbs, "RAR grant");
        self.dl.rar.push(grant.clone());
        Ok(grant)
    }

    // ── UL ────────────────────────────────────────────────────────────────────

    /// Place a Msg3 granted by an earlier RAR.  Msg3 may overlap PUCCH.  When
    /// the temporary C-RNTI already has a context its UL HARQ records the
    /// transmission.
    pub fn alloc_msg3(&mut self, grant: &Msg3Grant, ue: Option<&mut SchedUe>, maxharq_msg3tx: u32) -> Result<(), AllocError> {
        let busy = self.ul_mask & !self.params.pucch_mask;
        let mut req = self.params.empty_prb_mask();
        req.fill(grant.prbs.start as usize, grant.prbs.stop as usize, true);
        if (busy & req).any() {
            return Err(AllocError::SchCollision);
        }
        let tbs = tbs::tbs_bytes(grant.mcs, grant.prbs.length(), tbs::nof_ul_re_per_prb())
            .ok_or(AllocError::InvalidCoderate)?;
        let tti_tx_ul = self.tti_tx_ul();
        let pid = HarqEntity::ul_pid(tti_tx_ul);
        let mut ndi = false;
        if let Some(ue) = ue {
            if let Some(cell) = ue.cell_mut(self.enb_cc_idx()) {
                let h = cell.harq.ul_mut(pid);
                h.new_tx(tti_tx_ul, grant.prbs, grant.mcs, tbs, maxharq_msg3tx, true);
                ndi = true;
            }
        }
        self.ul_mask |= req;
        self.ul_rntis.insert(grant.temp_crnti);
        self.ul.pusch.push(UlGrant {
            rnti: grant.temp_crnti,
            pid,
            prbs: grant.prbs,
            mcs: grant.mcs,
            tbs,
            ndi,
            nof_retx: 0,
            is_msg3: true,
            needs_pdcch: false,
        });
        Ok(())
    }

    /// Grant `alloc` to `ue` on the UL HARQ process of this TTI.
    ///
    /// With `allow_pucch_collision` only conflicts with other PUSCH grants
    /// count (Msg3 retransmissions on narrow carriers).
    pub fn alloc_ul_user(
        &mut self,
        ue: &mut SchedUe,
        alloc: PrbInterval,
        allow_pucch_collision: bool,
    ) -> Result<(), AllocError> {
        let cc = self.enb_cc_idx();
        if self.is_ul_alloc(ue.rnti()) {
            return Err(AllocError::NoRntiOpportunity);
        }
        if alloc.is_empty() || alloc.stop > self.params.nof_prb {
            return Err(AllocError::InvalidGrantParams);
        }
        let mut req = self.params.empty_prb_mask();
        req.fill(alloc.start as usize, alloc.stop as usize, true);
        let busy = if allow_pucch_collision {
            self.ul_mask & !self.params.pucch_mask
        } else {
            self.ul_mask
        };
        if (busy & req).any() {
            return Err(AllocError::SchCollision);
        }

        let tti_tx_ul = self.tti_tx_ul();
        let pid = HarqEntity::ul_pid(tti_tx_ul);
        let rnti = ue.rnti();
        let maxharq_tx = ue.cfg().maxharq_tx;
        let ue_cell = ue.cell(cc).ok_or(AllocError::NoRntiOpportunity)?;
        let aggr_level = ue_cell.aggr_level();
        let h = ue_cell.harq.ul(pid);

        let grant = if h.has_pending_retx() {
            if h.alloc().length() != alloc.length() {
                return Err(AllocError::InvalidGrantParams);
            }
            let adaptive = h.alloc() != alloc;
            let ncce = if adaptive { self.cce_needed(aggr_level)? } else { 0 };
            let ue_cell = ue.cell_mut(cc).ok_or(AllocError::NoRntiOpportunity)?;
            let h = ue_cell.harq.ul_mut(pid);
            h.new_retx(tti_tx_ul, alloc);
            self.nof_cce_used += ncce;
            UlGrant {
                rnti,
                pid,
                prbs: alloc,
                mcs: h.mcs(),
                tbs: h.tbs(),
                ndi: false,
                nof_retx: h.nof_retx(),
                is_msg3: h.is_msg3(),
                needs_pdcch: adaptive,
            }
        } else if h.is_empty() {
            let ncce = self.cce_needed(aggr_level)?;
            let mcs = ue_cell.ul_mcs();
            let tbs = tbs::tbs_bytes(mcs, alloc.length(), tbs::nof_ul_re_per_prb())
                .ok_or(AllocError::InvalidCoderate)?;
            if tbs == 0 {
                return Err(AllocError::InvalidCoderate);
            }
            let ue_cell = ue.cell_mut(cc).ok_or(AllocError::NoRntiOpportunity)?;
            ue_cell
                .harq
                .ul_mut(pid)
                .new_tx(tti_tx_ul, alloc, mcs, tbs, maxharq_tx, false);
            ue.on_ul_newtx(alloc.length());
            self.nof_cce_used += ncce;
            UlGrant {
                rnti,
                pid,
                prbs: alloc,
                mcs,
                tbs,
                ndi: true,
                nof_retx: 0,
                is_msg3: false,
                needs_pdcch: true,
            }
        } else {
            return Err(AllocError::InvalidGrantParams);
        };

        self.ul_mask |= req;
        self.ul_rntis.insert(grant.rnti);
        debug!(
            rnti = grant.rnti,
            pid,
            tti = %tti_tx_ul,
            prbs = %alloc,
            tbs = grant.tbs,
            retx = grant.nof_retx,
            "UL grant"
        );
        self.ul.pusch.push(grant);
        Ok(())
    }

    /// Finish the TTI and hand out its result.
    pub fn into_result(mut self) -> CcSchedResult {
        self.dl.nof_cce_used = self.nof_cce_used;
        CcSchedResult {
            generated: true,
            tti_rx: self.tti_rx,
            dl: self.dl,
            ul: self.ul,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
