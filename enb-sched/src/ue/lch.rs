/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Logical channel bookkeeping of one UE: DL RLC queues, MAC CEs and UL
//! buffer status per logical channel group.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::mask::Interval;

pub const MAX_NOF_LCIDS: usize = 11;
pub const MAX_NOF_LCGS: usize = 4;

/// MAC subheader for an SDU with a 16-bit length field.
const MAC_SDU_SUBHEADER: u32 = 3;
/// MAC subheader for a fixed-size control element.
const MAC_CE_SUBHEADER: u32 = 1;
/// Smallest RLC PDU worth sending (RLC header + 1 byte).
const MIN_RLC_PDU: u32 = 3;

/// DL MAC CE LCIDs.
pub const CE_SCELL_ACTIVATION: u32 = 27;
pub const CE_CON_RES_ID: u32 = 28;
pub const CE_TA_CMD: u32 = 29;
pub const CE_DRX_CMD: u32 = 30;

/// Payload size of a DL MAC CE.
pub fn ce_payload_size(ce_lcid: u32) -> u32 {
    match ce_lcid {
        CE_CON_RES_ID => 6,
        CE_TA_CMD | CE_SCELL_ACTIVATION => 1,
        _ => 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BearerDirection {
    #[default]
    Idle,
    Ul,
    Dl,
    Both,
}

impl BearerDirection {
    fn is_dl(self) -> bool {
        matches!(self, BearerDirection::Dl | BearerDirection::Both)
    }
    fn is_ul(self) -> bool {
        matches!(self, BearerDirection::Ul | BearerDirection::Both)
    }
}

/// Scheduling view of one radio bearer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BearerCfg {
    pub direction: BearerDirection,
    /// Lower value is served first.
    pub priority: u32,
    /// UL logical channel group.
    pub group: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct LogicalChannel {
    cfg: BearerCfg,
    buf_tx: u32,
    buf_prio_tx: u32,
}

impl LogicalChannel {
    fn pending(&self) -> u32 {
        self.buf_tx.saturating_add(self.buf_prio_tx)
    }
}

#[derive(Debug, Clone)]
pub struct LchManager {
    lch: [LogicalChannel; MAX_NOF_LCIDS],
    lcg_bsr: [u32; MAX_NOF_LCGS],
    pending_ces: VecDeque<u32>,
}

impl Default for LchManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LchManager {
    pub fn new() -> Self {
        let mut lch = [LogicalChannel::default(); MAX_NOF_LCIDS];
        // SRB0 always exists.
        lch[0].cfg = BearerCfg {
            direction: BearerDirection::Both,
            priority: 0,
            group: 0,
        };
        Self {
            lch,
            lcg_bsr: [0; MAX_NOF_LCGS],
            pending_ces: VecDeque::new(),
        }
    }

    pub fn config_lcid(&mut self, lcid: u32, cfg: BearerCfg) -> Result<(), String> {
        if lcid as usize >= MAX_NOF_LCIDS {
            return Err(format!("lcid {lcid} out of range"));
        }
        if cfg.group as usize >= MAX_NOF_LCGS {
            return Err(format!("lcid {lcid}: LCG {} out of range", cfg.group));
        }
        self.lch[lcid as usize].cfg = cfg;
        Ok(())
    }

    /// Remove a bearer; its DL queues are dropped.
    pub fn rem_lcid(&mut self, lcid: u32) -> Result<(), String> {
        let ch = self
            .lch
            .get_mut(lcid as usize)
            .ok_or_else(|| format!("lcid {lcid} out of range"))?;
        *ch = LogicalChannel::default();
        Ok(())
    }

    pub fn is_bearer_active(&self, lcid: u32) -> bool {
        self.lch
            .get(lcid as usize)
            .is_some_and(|ch| ch.cfg.direction != BearerDirection::Idle)
    }

    // ── DL ────────────────────────────────────────────────────────────────────

    pub fn dl_buffer_state(&mut self, lcid: u32, tx_queue: u32, prio_tx_queue: u32) -> Result<(), String> {
        let ch = self
            .lch
            .get_mut(lcid as usize)
            .ok_or_else(|| format!("lcid {lcid} out of range"))?;
        ch.buf_tx = tx_queue;
        ch.buf_prio_tx = prio_tx_queue;
        Ok(())
    }

    pub fn dl_mac_buffer_state(&mut self, ce_code: u32, nof_cmds: u32) {
        for _ in 0..nof_cmds {
            self.pending_ces.push_back(ce_code);
        }
    }

    pub fn pending_ce_bytes(&self) -> u32 {
        self.pending_ces
            .iter()
            .map(|&ce| ce_payload_size(ce) + MAC_CE_SUBHEADER)
            .fold(0, u32::saturating_add)
    }

    fn dl_lcids(&self) -> impl Iterator<Item = (usize, &LogicalChannel)> {
        self.lch
            .iter()
            .enumerate()
            .filter(|(_, ch)| ch.cfg.direction.is_dl())
    }

    /// RLC bytes waiting on DL bearers (without MAC overhead).
    pub fn dl_buffer_total(&self) -> u32 {
        self.dl_lcids()
            .map(|(_, ch)| ch.pending())
            .fold(0, u32::saturating_add)
    }

    pub fn has_pending_dl_txs(&self) -> bool {
        !self.pending_ces.is_empty() || self.dl_buffer_total() > 0
    }

    /// `[min, max)` bytes worth sending this TTI.
    ///
    /// The minimum covers pending CEs plus the smallest useful RLC PDU, or
    /// all of SRB0 since SRB0 cannot be segmented.  The maximum covers
    /// everything pending, MAC subheaders included.
    pub fn requested_dl_bytes(&self) -> Interval {
        let ce_bytes = self.pending_ce_bytes();
        let mut max = ce_bytes;
        for (_, ch) in self.dl_lcids().filter(|(_, ch)| ch.pending() > 0) {
            max = max.saturating_add(ch.pending().saturating_add(MAC_SDU_SUBHEADER));
        }

        let srb0 = self.lch[0].pending();
        let min_sdu = if srb0 > 0 {
            srb0.saturating_add(MAC_SDU_SUBHEADER)
        } else if max > ce_bytes {
            MIN_RLC_PDU + MAC_SDU_SUBHEADER
        } else {
            0
        };
        let min = ce_bytes.saturating_add(min_sdu);
        if max == 0 {
            return Interval::default();
        }
        Interval::new(min.min(max), max.saturating_add(1))
    }

    /// Consume up to `tbs` bytes of DL data: CEs first, then bearers in
    /// priority order (status PDUs before new data).  Returns bytes used.
    pub fn alloc_dl_bytes(&mut self, tbs: u32) -> u32 {
        let mut rem = tbs;
        while let Some(&ce) = self.pending_ces.front() {
            let size = ce_payload_size(ce) + MAC_CE_SUBHEADER;
            if size > rem {
                break;
            }
            rem -= size;
            self.pending_ces.pop_front();
        }

        let mut order: Vec<usize> = self.dl_lcids().map(|(lcid, _)| lcid).collect();
        order.sort_by_key(|&lcid| (self.lch[lcid].cfg.priority, lcid));
        for lcid in order {
            if rem <= MAC_SDU_SUBHEADER {
                break;
            }
            let ch = &mut self.lch[lcid];
            if ch.pending() == 0 {
                continue;
            }
            if lcid == 0 && ch.pending().saturating_add(MAC_SDU_SUBHEADER) > rem {
                continue;
            }
            rem -= MAC_SDU_SUBHEADER;
            let prio = ch.buf_prio_tx.min(rem);
            ch.buf_prio_tx -= prio;
            rem -= prio;
            let data = ch.buf_tx.min(rem);
            ch.buf_tx -= data;
            rem -= data;
        }
        tbs - rem
    }

    // ── UL ────────────────────────────────────────────────────────────────────

    pub fn ul_bsr(&mut self, lcg: u32, bsr: u32) -> Result<(), String> {
        let slot = self
            .lcg_bsr
            .get_mut(lcg as usize)
            .ok_or_else(|| format!("LCG {lcg} out of range"))?;
        *slot = bsr;
        Ok(())
    }

    /// Add bytes to the LCG the bearer `lcid` belongs to.
    pub fn ul_buffer_add(&mut self, lcid: u32, bytes: u32) -> Result<(), String> {
        let ch = self
            .lch
            .get(lcid as usize)
            .filter(|ch| ch.cfg.direction.is_ul())
            .ok_or_else(|| format!("lcid {lcid} is not an UL bearer"))?;
        let lcg = ch.cfg.group as usize;
        self.lcg_bsr[lcg] = self.lcg_bsr[lcg].saturating_add(bytes);
        Ok(())
    }

    /// Remove delivered UL bytes, highest priority LCG first.
    pub fn ul_buffer_sub(&mut self, mut bytes: u32) {
        for bsr in self.lcg_bsr.iter_mut() {
            let n = (*bsr).min(bytes);
            *bsr -= n;
            bytes -= n;
            if bytes == 0 {
                break;
            }
        }
    }

    pub fn bsr_total(&self) -> u32 {
        self.lcg_bsr.iter().fold(0, |acc, &bsr| acc.saturating_add(bsr))
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
