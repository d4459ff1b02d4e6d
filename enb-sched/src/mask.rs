/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Resource bitmasks and intervals.
//!
//! [`BoundedBitset`] is a fixed-width bit sequence (up to 128 bits) used for
//! both RBG masks (DL, one bit per resource-block group) and PRB masks (UL,
//! one bit per physical resource block).  A set bit means "occupied".
//!
//! The search helpers at the bottom implement the two mask queries the
//! allocation layer needs: "give me `n` free RBGs" and "give me a contiguous
//! run of `n` free PRBs".

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

/// Maximum number of RBGs of one carrier (100 PRBs, RBG size 4).
pub const MAX_NOF_RBG: usize = 25;

/// Maximum number of PRBs of one carrier.
pub const MAX_NOF_PRB: usize = 100;

// ── BoundedBitset ─────────────────────────────────────────────────────────────

/// Fixed-width bitset with a runtime size of at most [`BoundedBitset::MAX_SIZE`].
///
/// Bits outside `0..size` are always zero, so whole-word operations
/// (`count`, `all`, `==`) stay exact.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BoundedBitset {
    bits: u128,
    size: usize,
}

/// One bit per resource-block group.
pub type RbgMask = BoundedBitset;

/// One bit per physical resource block.
pub type PrbMask = BoundedBitset;

impl BoundedBitset {
    pub const MAX_SIZE: usize = 128;

    /// An all-free mask of `size` bits.
    pub fn new(size: usize) -> Self {
        assert!(size <= Self::MAX_SIZE, "bitset size {size} exceeds 128");
        Self { bits: 0, size }
    }

    /// Build from an explicit list of set positions.
    pub fn from_positions(size: usize, positions: &[usize]) -> Self {
        let mut m = Self::new(size);
        for &p in positions {
            m.set(p);
        }
        m
    }

    fn range_bits(lo: usize, hi: usize) -> u128 {
        if hi <= lo {
            return 0;
        }
        let width = hi - lo;
        let ones = if width >= 128 {
            u128::MAX
        } else {
            (1u128 << width) - 1
        };
        ones << lo
    }

    fn valid_bits(&self) -> u128 {
        Self::range_bits(0, self.size)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn set(&mut self, pos: usize) {
        debug_assert!(pos < self.size, "bit {pos} out of range {}", self.size);
        if pos < self.size {
            self.bits |= 1u128 << pos;
        }
    }

    pub fn reset(&mut self, pos: usize) {
        if pos < self.size {
            self.bits &= !(1u128 << pos);
        }
    }

    pub fn test(&self, pos: usize) -> bool {
        pos < self.size && (self.bits >> pos) & 1 == 1
    }

    /// Set (or clear) every bit in `[lo, hi)`; the range is clipped to the
    /// bitset size.
    pub fn fill(&mut self, lo: usize, hi: usize, value: bool) {
        let hi = hi.min(self.size);
        let range = Self::range_bits(lo, hi);
        if value {
            self.bits |= range;
        } else {
            self.bits &= !range;
        }
    }

    /// Every bit set (fully occupied).  An empty bitset counts as full.
    pub fn all(&self) -> bool {
        self.bits == self.valid_bits()
    }

    pub fn any(&self) -> bool {
        self.bits != 0
    }

    pub fn none(&self) -> bool {
        self.bits == 0
    }

    /// Any bit set in `[lo, hi)`.
    pub fn any_in(&self, lo: usize, hi: usize) -> bool {
        self.bits & Self::range_bits(lo, hi.min(self.size)) != 0
    }

    pub fn count(&self) -> usize {
        self.bits.count_ones() as usize
    }

    /// Lowest position in `[start, self.size)` whose bit equals `value`.
    pub fn find_lowest(&self, start: usize, value: bool) -> Option<usize> {
        (start..self.size).find(|&i| self.test(i) == value)
    }

    /// Iterator over the positions of set bits, lowest first.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.size).filter(move |&i| self.test(i))
    }

    /// `true` if the set bits form one contiguous run (or the mask is empty).
    pub fn is_contiguous(&self) -> bool {
        if self.none() {
            return true;
        }
        let shifted = self.bits >> self.bits.trailing_zeros();
        shifted & (shifted + 1) == 0
    }
}

impl BitOr for BoundedBitset {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        debug_assert_eq!(self.size, rhs.size);
        Self {
            bits: self.bits | rhs.bits,
            size: self.size,
        }
    }
}

impl BitOrAssign for BoundedBitset {
    fn bitor_assign(&mut self, rhs: Self) {
        debug_assert_eq!(self.size, rhs.size);
        self.bits |= rhs.bits;
    }
}

impl BitAnd for BoundedBitset {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        debug_assert_eq!(self.size, rhs.size);
        Self {
            bits: self.bits & rhs.bits,
            size: self.size,
        }
    }
}

impl BitAndAssign for BoundedBitset {
    fn bitand_assign(&mut self, rhs: Self) {
        debug_assert_eq!(self.size, rhs.size);
        self.bits &= rhs.bits;
    }
}

impl Not for BoundedBitset {
    type Output = Self;

    fn not(self) -> Self {
        Self {
            bits: !self.bits & self.valid_bits(),
            size: self.size,
        }
    }
}

impl fmt::Display for BoundedBitset {
    /// Position 0 first, e.g. `1100000000000`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.size {
            f.write_str(if self.test(i) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl fmt::Debug for BoundedBitset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0b{}", self)
    }
}

// ── Interval ──────────────────────────────────────────────────────────────────

/// Half-open interval `[start, stop)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Interval {
    pub start: u32,
    pub stop: u32,
}

/// Contiguous PRB allocation on the uplink.
pub type PrbInterval = Interval;

impl Interval {
    pub fn new(start: u32, stop: u32) -> Self {
        debug_assert!(start <= stop, "invalid interval [{start}, {stop})");
        Self { start, stop }
    }

    pub fn length(&self) -> u32 {
        self.stop.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.length() == 0
    }

    pub fn contains(&self, v: u32) -> bool {
        v >= self.start && v < self.stop
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.stop && other.start < self.stop
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.stop)
    }
}

// ── Mask search helpers ───────────────────────────────────────────────────────

/// First free run of `max_len` positions in `used`, or the longest free run if
/// none is that long.  Returns an empty interval when nothing is free.
pub fn find_contiguous_interval(max_len: u32, used: &BoundedBitset) -> Interval {
    let mut best = Interval::default();
    let mut pos = 0usize;
    while let Some(start) = used.find_lowest(pos, false) {
        let stop = used.find_lowest(start, true).unwrap_or(used.size());
        let run = Interval::new(start as u32, stop as u32);
        if run.length() >= max_len {
            return Interval::new(run.start, run.start + max_len);
        }
        if run.length() > best.length() {
            best = run;
        }
        pos = stop;
    }
    best
}

/// Pick up to `max_nof_rbgs` free RBGs from `current_mask`.
///
/// With `is_contiguous` (DCI format 1A) the result is a single run, otherwise
/// the lowest free RBGs are taken.  The caller checks `count()` to see whether
/// the requested size was reached.
pub fn find_available_rbgmask(
    max_nof_rbgs: usize,
    is_contiguous: bool,
    current_mask: &RbgMask,
) -> RbgMask {
    let mut newtx = RbgMask::new(current_mask.size());
    if max_nof_rbgs == 0 {
        return newtx;
    }

    if is_contiguous {
        let interv = find_contiguous_interval(max_nof_rbgs as u32, current_mask);
        newtx.fill(interv.start as usize, interv.stop as usize, true);
        return newtx;
    }

    for pos in (!*current_mask).ones().take(max_nof_rbgs) {
        newtx.set(pos);
    }
    newtx
}

/// Contiguous run of `nof_prbs` free PRBs in `current_mask` (first fit), or
/// the longest free run when no run is long enough.
pub fn find_contiguous_ul_prbs(nof_prbs: u32, current_mask: &PrbMask) -> PrbInterval {
    find_contiguous_interval(nof_prbs, current_mask)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
