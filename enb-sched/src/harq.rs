/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! HARQ process state machines.
//!
//! ```text
//!            new_tx                 NACK (tx < max)
//!   Empty ───────────► WaitingAck ───────────────────► PendingRetx
//!     ▲                  │    ▲                             │
//!     │  ACK / max tx    │    └──────── new_retx ───────────┘
//!     └──────────────────┘
//! ```
//!
//! DL processes are asynchronous: any empty process can carry a new
//! transport block and the ACK is matched by transmission time.  UL processes
//! are synchronous: the process id is fixed by the PUSCH TTI
//! (`tti_tx_ul mod 8`).

use tracing::{debug, warn};

use crate::mask::{PrbInterval, RbgMask};
use crate::tti::{TtiPoint, FDD_HARQ_DELAY_UL_MS, HARQ_RTT_MS};

/// HARQ processes per carrier and direction (FDD).
pub const NOF_HARQ_PROCS: usize = 8;

/// A DL process still waiting for its ACK after this many subframes is
/// treated as NACKed.
pub const DL_ACK_TIMEOUT_MS: i32 = 2 * HARQ_RTT_MS as i32;

// ── Common state ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HarqState {
    #[default]
    Empty,
    WaitingAck,
    PendingRetx,
}

/// Outcome of feeding an ACK/NACK (or CRC) into a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarqFeedback {
    /// Transport block delivered; carries its size in bytes.
    Acked { tbs: u32 },
    /// Will be retransmitted.
    Nacked,
    /// NACK on the last allowed transmission; the block is dropped.
    MaxRetxReached { tbs: u32 },
}

#[derive(Debug, Clone, Default)]
struct HarqCommon {
    id: usize,
    state: HarqState,
    nof_retx: u32,
    max_tx: u32,
    tti: TtiPoint,
    mcs: u32,
    tbs: u32,
    ndi: bool,
}

impl HarqCommon {
    fn new(id: usize) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    fn new_tx(&mut self, tti: TtiPoint, mcs: u32, tbs: u32, max_tx: u32) {
        self.state = HarqState::WaitingAck;
        self.tti = tti;
        self.mcs = mcs;
        self.tbs = tbs;
        self.max_tx = max_tx.max(1);
        self.nof_retx = 0;
        self.ndi = !self.ndi;
    }

    fn new_retx(&mut self, tti: TtiPoint) {
        debug_assert_eq!(self.state, HarqState::PendingRetx);
        self.state = HarqState::WaitingAck;
        self.tti = tti;
        self.nof_retx += 1;
    }

    fn set_ack(&mut self, ack: bool) -> Option<HarqFeedback> {
        if self.state != HarqState::WaitingAck {
            warn!(pid = self.id, state = ?self.state, ack, "HARQ feedback for a process not waiting feedback");
            return None;
        }
        if ack {
            self.state = HarqState::Empty;
            return Some(HarqFeedback::Acked { tbs: self.tbs });
        }
        if self.nof_retx + 1 >= self.max_tx {
            self.state = HarqState::Empty;
            return Some(HarqFeedback::MaxRetxReached { tbs: self.tbs });
        }
        self.state = HarqState::PendingRetx;
        Some(HarqFeedback::Nacked)
    }

    fn reset(&mut self) {
        let id = self.id;
        let ndi = self.ndi;
        *self = Self::new(id);
        self.ndi = ndi;
    }
}

// ── DL process ────────────────────────────────────────────────────────────────

/// One DL HARQ process: the transport block in flight and the RBGs it used.
#[derive(Debug, Clone)]
pub struct DlHarqProc {
    common: HarqCommon,
    rbgmask: RbgMask,
}

impl DlHarqProc {
    pub fn new(id: usize) -> Self {
        Self {
            common: HarqCommon::new(id),
            rbgmask: RbgMask::default(),
        }
    }

    pub fn id(&self) -> usize {
        self.common.id
    }
    pub fn state(&self) -> HarqState {
        self.common.state
    }
    pub fn is_empty(&self) -> bool {
        self.common.state == HarqState::Empty
    }
    pub fn has_pending_retx(&self) -> bool {
        self.common.state == HarqState::PendingRetx
    }
    pub fn nof_retx(&self) -> u32 {
        self.common.nof_retx
    }
    pub fn max_tx(&self) -> u32 {
        self.common.max_tx
    }
    pub fn tti(&self) -> TtiPoint {
        self.common.tti
    }
    pub fn tbs(&self) -> u32 {
        self.common.tbs
    }
    pub fn mcs(&self) -> u32 {
        self.common.mcs
    }
    pub fn ndi(&self) -> bool {
        self.common.ndi
    }

    /// RBG mask of the last transmission.
    pub fn rbgmask(&self) -> RbgMask {
        self.rbgmask
    }

    pub fn new_tx(&mut self, mask: RbgMask, tti_tx_dl: TtiPoint, mcs: u32, tbs: u32, max_tx: u32) {
        self.rbgmask = mask;
        self.common.new_tx(tti_tx_dl, mcs, tbs, max_tx);
    }

    /// Retransmission of the same transport block, possibly on another mask
    /// of the same size.
    pub fn new_retx(&mut self, mask: RbgMask, tti_tx_dl: TtiPoint) {
        debug_assert_eq!(mask.count(), self.rbgmask.count());
        self.rbgmask = mask;
        self.common.new_retx(tti_tx_dl);
    }

    pub fn set_ack(&mut self, ack: bool) -> Option<HarqFeedback> {
        self.common.set_ack(ack)
    }

    pub fn reset(&mut self) {
        self.common.reset();
        self.rbgmask = RbgMask::default();
    }
}

// ── UL process ────────────────────────────────────────────────────────────────

/// One UL HARQ process: the PUSCH block in flight and its PRB interval.
#[derive(Debug, Clone)]
pub struct UlHarqProc {
    common: HarqCommon,
    alloc: PrbInterval,
    is_msg3: bool,
}

impl UlHarqProc {
    pub fn new(id: usize) -> Self {
        Self {
            common: HarqCommon::new(id),
            alloc: PrbInterval::default(),
            is_msg3: false,
        }
    }

    pub fn id(&self) -> usize {
        self.common.id
    }
    pub fn state(&self) -> HarqState {
        self.common.state
    }
    pub fn is_empty(&self) -> bool {
        self.common.state == HarqState::Empty
    }
    pub fn has_pending_retx(&self) -> bool {
        self.common.state == HarqState::PendingRetx
    }
    pub fn nof_retx(&self) -> u32 {
        self.common.nof_retx
    }
    pub fn tti(&self) -> TtiPoint {
        self.common.tti
    }
    pub fn tbs(&self) -> u32 {
        self.common.tbs
    }
    pub fn mcs(&self) -> u32 {
        self.common.mcs
    }

    /// PRB interval of the last transmission.
    pub fn alloc(&self) -> PrbInterval {
        self.alloc
    }

    pub fn is_msg3(&self) -> bool {
        self.is_msg3
    }

    pub fn new_tx(
        &mut self,
        tti_tx_ul: TtiPoint,
        alloc: PrbInterval,
        mcs: u32,
        tbs: u32,
        max_tx: u32,
        is_msg3: bool,
    ) {
        self.alloc = alloc;
        self.is_msg3 = is_msg3;
        self.common.new_tx(tti_tx_ul, mcs, tbs, max_tx);
    }

    pub fn new_retx(&mut self, tti_tx_ul: TtiPoint, alloc: PrbInterval) {
        debug_assert_eq!(alloc.length(), self.alloc.length());
        self.alloc = alloc;
        self.common.new_retx(tti_tx_ul);
    }

    pub fn set_ack(&mut self, crc: bool) -> Option<HarqFeedback> {
        self.common.set_ack(crc)
    }

    pub fn reset(&mut self) {
        self.common.reset();
        self.alloc = PrbInterval::default();
        self.is_msg3 = false;
    }
}

// ── Per-carrier entity ────────────────────────────────────────────────────────

/// The DL and UL HARQ processes of one UE on one carrier.
#[derive(Debug, Clone)]
pub struct HarqEntity {
    dl: Vec<DlHarqProc>,
    ul: Vec<UlHarqProc>,
}

impl Default for HarqEntity {
    fn default() -> Self {
        Self::new()
    }
}

impl HarqEntity {
    pub fn new() -> Self {
        Self {
            dl: (0..NOF_HARQ_PROCS).map(DlHarqProc::new).collect(),
            ul: (0..NOF_HARQ_PROCS).map(UlHarqProc::new).collect(),
        }
    }

    pub fn dl(&self, pid: usize) -> &DlHarqProc {
        &self.dl[pid]
    }
    pub fn dl_mut(&mut self, pid: usize) -> &mut DlHarqProc {
        &mut self.dl[pid]
    }
    pub fn ul(&self, pid: usize) -> &UlHarqProc {
        &self.ul[pid]
    }
    pub fn ul_mut(&mut self, pid: usize) -> &mut UlHarqProc {
        &mut self.ul[pid]
    }

    /// Oldest DL process waiting for a retransmission, aged relative to
    /// `tti_tx_dl` so the choice holds across the TTI wraparound.
    pub fn find_pending_dl_harq(&self, tti_tx_dl: TtiPoint) -> Option<usize> {
        self.dl
            .iter()
            .filter(|h| h.has_pending_retx())
            .max_by_key(|h| (tti_tx_dl - h.tti(), std::cmp::Reverse(h.id())))
            .map(|h| h.id())
    }

    /// Any empty DL process.
    pub fn find_empty_dl_harq(&self) -> Option<usize> {
        self.dl.iter().find(|h| h.is_empty()).map(|h| h.id())
    }

    /// Synchronous UL process id for a PUSCH transmission TTI.
    pub fn ul_pid(tti_tx_ul: TtiPoint) -> usize {
        tti_tx_ul.to_uint() as usize % NOF_HARQ_PROCS
    }

    /// Apply a DL ACK received at `tti_rx` to the process transmitted
    /// `FDD_HARQ_DELAY_UL_MS` earlier.  Returns the pid together with the
    /// outcome, or `None` if no process matches.
    pub fn set_ack_info(&mut self, tti_rx: TtiPoint, ack: bool) -> Option<(usize, HarqFeedback)> {
        let tti_tx = tti_rx - FDD_HARQ_DELAY_UL_MS;
        let h = self
            .dl
            .iter_mut()
            .find(|h| h.state() == HarqState::WaitingAck && h.tti() == tti_tx)?;
        let pid = h.id();
        h.set_ack(ack).map(|fb| (pid, fb))
    }

    /// Apply the PUSCH CRC received at `tti_rx`.
    pub fn set_ul_crc(&mut self, tti_rx: TtiPoint, crc: bool) -> Option<(usize, HarqFeedback)> {
        let pid = Self::ul_pid(tti_rx);
        let h = &mut self.ul[pid];
        if h.state() != HarqState::WaitingAck || h.tti() != tti_rx {
            return None;
        }
        h.set_ack(crc).map(|fb| (pid, fb))
    }

    /// Per-TTI housekeeping: time out processes whose feedback never came.
    ///
    /// Returns the number of processes forced into NACK.
    pub fn new_tti(&mut self, tti_tx_dl: TtiPoint, tti_tx_ul: TtiPoint) -> usize {
        let mut timeouts = 0;
        for h in self.dl.iter_mut() {
            if h.state() == HarqState::WaitingAck && tti_tx_dl - h.tti() >= DL_ACK_TIMEOUT_MS {
                debug!(pid = h.id(), tti = %h.tti(), "DL HARQ ACK timeout");
                h.set_ack(false);
                timeouts += 1;
            }
        }
        // The synchronous UL process comes around again without a CRC.
        let h = &mut self.ul[Self::ul_pid(tti_tx_ul)];
        if h.state() == HarqState::WaitingAck && tti_tx_ul - h.tti() >= HARQ_RTT_MS as i32 {
            debug!(pid = h.id(), tti = %h.tti(), "UL HARQ CRC timeout");
            h.set_ack(false);
            timeouts += 1;
        }
        timeouts
    }

    /// Bytes of UL data in flight (sent, not yet acknowledged).
    pub fn ul_pending_bytes(&self) -> u32 {
        self.ul
            .iter()
            .filter(|h| !h.is_empty())
            .map(|h| h.tbs())
            .sum()
    }

    pub fn reset(&mut self) {
        self.dl.iter_mut().for_each(DlHarqProc::reset);
        self.ul.iter_mut().for_each(UlHarqProc::reset);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
