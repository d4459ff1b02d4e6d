/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-TTI scheduling results and the ring buffer caching them.

use crate::mask::{PrbInterval, RbgMask};
use crate::tti::TtiPoint;
use crate::ue::DciFormat;

/// Number of receive TTIs kept in the result cache.
pub const SCHED_RESULT_RING_SIZE: usize = 16;

// ── DL ────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct DlDataGrant {
    pub rnti: u16,
    pub pid: usize,
    pub rbgmask: RbgMask,
    pub nof_prb: u32,
    pub mcs: u32,
    pub tbs: u32,
    pub ndi: bool,
    /// 0 on a new transmission.
    pub nof_retx: u32,
    pub dci_format: DciFormat,
    pub aggr_level: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Msg3Grant {
    pub temp_crnti: u16,
    pub preamble_idx: u32,
    pub prbs: PrbInterval,
    pub mcs: u32,
}

/// Random access response and the Msg3 grant it carries.
#[derive(Debug, Clone, PartialEq)]
pub struct RarGrant {
    pub ra_rnti: u16,
    pub rbgmask: RbgMask,
    pub tbs: u32,
    pub msg3: Msg3Grant,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DlSchedResult {
    pub tti_tx_dl: TtiPoint,
    pub cfi: u32,
    pub nof_cce_used: u32,
    pub data: Vec<DlDataGrant>,
    pub rar: Vec<RarGrant>,
}

impl DlSchedResult {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty() && self.rar.is_empty()
    }
}

// ── UL ────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct UlGrant {
    pub rnti: u16,
    pub pid: usize,
    pub prbs: PrbInterval,
    pub mcs: u32,
    pub tbs: u32,
    pub ndi: bool,
    pub nof_retx: u32,
    pub is_msg3: bool,
    /// Grant signalled on PDCCH (new data or adaptive retransmission).
    pub needs_pdcch: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UlSchedResult {
    pub tti_tx_ul: TtiPoint,
    pub pusch: Vec<UlGrant>,
}

impl UlSchedResult {
    pub fn is_empty(&self) -> bool {
        self.pusch.is_empty()
    }
}

// ── Cache ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CcSchedResult {
    pub generated: bool,
    pub tti_rx: TtiPoint,
    pub dl: DlSchedResult,
    pub ul: UlSchedResult,
}

#[derive(Debug, Clone, Default)]
struct SfResultEntry {
    tti_rx: Option<TtiPoint>,
    cc: Vec<CcSchedResult>,
}

/// Ring of per-TTI results keyed by `tti_rx`, one slot per carrier.
#[derive(Debug, Clone)]
pub struct SchedResultList {
    entries: Vec<SfResultEntry>,
}

impl Default for SchedResultList {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedResultList {
    pub fn new() -> Self {
        Self {
            entries: vec![SfResultEntry::default(); SCHED_RESULT_RING_SIZE],
        }
    }

    fn slot(tti_rx: TtiPoint) -> usize {
        tti_rx.to_uint() as usize % SCHED_RESULT_RING_SIZE
    }

    /// Claim the slot of `tti_rx`, discarding whatever older TTI occupied it.
    pub fn new_tti(&mut self, tti_rx: TtiPoint) {
        let entry = &mut self.entries[Self::slot(tti_rx)];
        if entry.tti_rx != Some(tti_rx) {
            entry.tti_rx = Some(tti_rx);
            entry.cc.clear();
        }
    }

    pub fn get(&self, tti_rx: TtiPoint, enb_cc_idx: usize) -> Option<&CcSchedResult> {
        let entry = &self.entries[Self::slot(tti_rx)];
        if entry.tti_rx != Some(tti_rx) {
            return None;
        }
        entry.cc.get(enb_cc_idx).filter(|r| r.generated)
    }

    pub fn is_generated(&self, tti_rx: TtiPoint, enb_cc_idx: usize) -> bool {
        self.get(tti_rx, enb_cc_idx).is_some()
    }

    pub fn set(&mut self, tti_rx: TtiPoint, enb_cc_idx: usize, result: CcSchedResult) {
        self.new_tti(tti_rx);
        let entry = &mut self.entries[Self::slot(tti_rx)];
        if entry.cc.len() <= enb_cc_idx {
            entry.cc.resize_with(enb_cc_idx + 1, CcSchedResult::default);
        }
        entry.cc[enb_cc_idx] = result;
    }

    pub fn clear(&mut self) {
        self.entries.iter_mut().for_each(|e| *e = SfResultEntry::default());
    }
}
