/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Subframe time arithmetic.
//!
//! A [`TtiPoint`] is an absolute subframe index modulo [`TTI_PERIOD`]
//! (1024 radio frames × 10 subframes).  All arithmetic wraps, and comparison
//! is *circular*: `a < b` when `b` lies less than half a period ahead of `a`.
//! That makes `max()` well defined for any two points that are close in time,
//! which is all the scheduler ever compares.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Wraparound period of the TTI counter (SFN 0..1023 × 10 subframes).
pub const TTI_PERIOD: u32 = 10_240;

/// Subframes between the reception TTI a decision is taken for and the DL
/// transmission it produces.
pub const TX_ENB_DELAY: u32 = 4;

/// DL data → UL grant offset used for PUSCH scheduling in FDD.
pub const FDD_HARQ_DELAY_DL_MS: u32 = 4;

/// DL transmission → HARQ ACK reception in FDD.
pub const FDD_HARQ_DELAY_UL_MS: u32 = 4;

/// HARQ round-trip time in FDD.
pub const HARQ_RTT_MS: u32 = 8;

/// RAR transmission → Msg3 PUSCH transmission.
pub const MSG3_DELAY_MS: u32 = 6;

// ── TtiPoint ──────────────────────────────────────────────────────────────────

/// Absolute subframe time, modulo [`TTI_PERIOD`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TtiPoint(u32);

impl TtiPoint {
    /// Build a point from any counter value; the value is reduced modulo
    /// [`TTI_PERIOD`].
    pub const fn new(tti: u32) -> Self {
        Self(tti % TTI_PERIOD)
    }

    /// Raw counter value in `0..TTI_PERIOD`.
    pub fn to_uint(self) -> u32 {
        self.0
    }

    /// System frame number (0..1023).
    pub fn sfn(self) -> u32 {
        self.0 / 10
    }

    /// Subframe index within the radio frame (0..9).
    pub fn sf_idx(self) -> u32 {
        self.0 % 10
    }

    /// Signed circular distance `self − other`, in `[-P/2, P/2)`.
    pub fn diff(self, other: TtiPoint) -> i32 {
        let period = TTI_PERIOD as i32;
        let mut d = self.0 as i32 - other.0 as i32;
        if d >= period / 2 {
            d -= period;
        } else if d < -(period / 2) {
            d += period;
        }
        d
    }

    /// Circular maximum: the later of the two points.
    pub fn latest(self, other: TtiPoint) -> TtiPoint {
        if other.diff(self) > 0 {
            other
        } else {
            self
        }
    }
}

impl Add<u32> for TtiPoint {
    type Output = TtiPoint;

    fn add(self, rhs: u32) -> TtiPoint {
        TtiPoint((self.0 + rhs % TTI_PERIOD) % TTI_PERIOD)
    }
}

impl Sub<u32> for TtiPoint {
    type Output = TtiPoint;

    fn sub(self, rhs: u32) -> TtiPoint {
        TtiPoint((self.0 + TTI_PERIOD - rhs % TTI_PERIOD) % TTI_PERIOD)
    }
}

impl Sub<TtiPoint> for TtiPoint {
    type Output = i32;

    fn sub(self, rhs: TtiPoint) -> i32 {
        self.diff(rhs)
    }
}

impl PartialOrd for TtiPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.diff(*other).cmp(&0))
    }
}

impl From<u32> for TtiPoint {
    fn from(v: u32) -> Self {
        TtiPoint::new(v)
    }
}

impl fmt::Display for TtiPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TtiPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tti={}(sfn={}.{})", self.0, self.sfn(), self.sf_idx())
    }
}

/// DL transmission TTI for a decision taken at `tti_rx`.
pub fn to_tx_dl(tti_rx: TtiPoint) -> TtiPoint {
    tti_rx + TX_ENB_DELAY
}

/// UL (PUSCH) transmission TTI for a decision taken at `tti_rx`.
pub fn to_tx_ul(tti_rx: TtiPoint) -> TtiPoint {
    tti_rx + TX_ENB_DELAY + FDD_HARQ_DELAY_DL_MS
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_reduces_modulo_period() {
        assert_eq!(TtiPoint::new(TTI_PERIOD + 5).to_uint(), 5);
        assert_eq!(TtiPoint::new(123).sfn(), 12);
        assert_eq!(TtiPoint::new(123).sf_idx(), 3);
    }

    #[test]
    fn add_and_sub_wrap_around() {
        let t = TtiPoint::new(TTI_PERIOD - 2);
        assert_eq!((t + 4).to_uint(), 2);
        assert_eq!((TtiPoint::new(1) - 4).to_uint(), TTI_PERIOD - 3);
    }

    #[test]
    fn diff_is_circular() {
        let a = TtiPoint::new(2);
        let b = TtiPoint::new(TTI_PERIOD - 3);
        assert_eq!(a - b, 5);
        assert_eq!(b - a, -5);
        assert!(b < a, "point just before wraparound is earlier");
    }

    #[test]
    fn latest_picks_circular_maximum() {
        let before = TtiPoint::new(TTI_PERIOD - 1);
        let after = TtiPoint::new(0);
        assert_eq!(before.latest(after), after);
        assert_eq!(after.latest(before), after);
        assert_eq!(after.latest(after), after);
    }

    #[test]
    fn tx_offsets_follow_fdd_timing() {
        let rx = TtiPoint::new(100);
        assert_eq!(to_tx_dl(rx).to_uint(), 104);
        assert_eq!(to_tx_ul(rx).to_uint(), 108);
    }
}
