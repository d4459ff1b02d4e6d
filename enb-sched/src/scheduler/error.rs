/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the eNB MAC scheduler.
//!
//! Three layers:
//!
//! * [`CellCfgReason`]: why one carrier's parameters could not be derived
//!   (carries the offending values).
//! * [`SchedError`] / [`SliceCtrlError`]: failures returned by the public
//!   [`Scheduler`](super::Scheduler) API.
//! * [`AllocError`]: the outcome of a single allocation attempt inside one
//!   TTI.  These are expected, frequent results ("try again next TTI") and are
//!   never logged above `debug`.

use thiserror::Error;

// ── Cell configuration ────────────────────────────────────────────────────────

/// Detailed reason why a carrier configuration was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum CellCfgReason {
    NoCells,
    InvalidBandwidth { nof_prb: u32 },
    PucchCoversBand { nof_prb: u32, pucch_prbs_per_edge: u32 },
    InvalidCfiRange { min: u32, max: u32 },
    McsOutOfRange { field: &'static str, value: u32 },
    InvalidAggrLevel { level: u32 },
    InvalidMsg3MaxTx,
    InvalidTargetBler { bler: f32 },
    UnknownPolicy { name: String },
}

impl std::fmt::Display for CellCfgReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellCfgReason::NoCells => write!(f, "at least one cell is required"),

            CellCfgReason::InvalidBandwidth { nof_prb } => {
                write!(f, "nof_prb {} outside the supported range 6..=100", nof_prb)
            }

            CellCfgReason::PucchCoversBand {
                nof_prb,
                pucch_prbs_per_edge,
            } => write!(
                f,
                "{} PUCCH PRBs per band edge leave no PUSCH space in {} PRBs",
                pucch_prbs_per_edge, nof_prb
            ),

            CellCfgReason::InvalidCfiRange { min, max } => write!(
                f,
                "control symbols [{}, {}] must satisfy 1 <= min <= max <= 3",
                min, max
            ),

            CellCfgReason::McsOutOfRange { field, value } => {
                write!(f, "{} = {} exceeds the maximum MCS 28", field, value)
            }

            CellCfgReason::InvalidAggrLevel { level } => {
                write!(f, "max_aggr_level {} exceeds 3", level)
            }

            CellCfgReason::InvalidMsg3MaxTx => write!(f, "maxharq_msg3tx must be at least 1"),

            CellCfgReason::InvalidTargetBler { bler } => {
                write!(f, "target_bler {} outside (0, 1)", bler)
            }

            CellCfgReason::UnknownPolicy { name } => write!(
                f,
                "unknown scheduling policy '{}' (valid: time_rr, time_pf)",
                name
            ),
        }
    }
}

// ── Top-level scheduler errors ────────────────────────────────────────────────

/// Error returned by the per-UE and configuration operations of
/// [`Scheduler`](super::Scheduler).
#[derive(Debug, Error, PartialEq)]
pub enum SchedError {
    /// The operation referenced an RNTI with no UE context.  No state changed.
    #[error("user rnti=0x{rnti:x} not found, failed to call {op}")]
    UeNotFound { rnti: u16, op: &'static str },

    #[error("carrier index {cc} out of range ({nof_carriers} carriers)")]
    CarrierOutOfRange { cc: usize, nof_carriers: usize },

    /// Parameter derivation failed for one carrier.  Carriers before `cc`
    /// were already replaced.
    #[error("invalid configuration for cell {cc}: {reason}")]
    InvalidCellCfg { cc: usize, reason: CellCfgReason },

    #[error("invalid configuration for rnti=0x{rnti:x}: {detail}")]
    InvalidUeCfg { rnti: u16, detail: String },

    /// HARQ feedback for a transport block index this scheduler never uses.
    #[error("rnti=0x{rnti:x}: TB index {tb_idx} not supported (single codeword)")]
    InvalidTbIdx { rnti: u16, tb_idx: u32 },
}

/// Why a slice-control request was rejected.  A rejected request leaves the
/// slice table and every UE association untouched.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SliceCtrlError {
    #[error("unknown scheduling algorithm '{0}' (valid: RR, PF)")]
    UnsupportedPolicy(String),

    #[error("unsupported number of slices {0} (valid: 1..=4)")]
    UnsupportedSliceCount(usize),

    #[error("slice {id}: invalid RBG range [{pos_low}, {pos_high}] for {nof_rbg} RBGs")]
    InvalidRbgRange {
        id: u32,
        pos_low: u32,
        pos_high: u32,
        nof_rbg: u32,
    },

    #[error("slice {id}: only static slicing is supported (got {algo})")]
    UnsupportedAlgorithm { id: u32, algo: &'static str },

    #[error("slice id {0} appears more than once")]
    DuplicateSliceId(u32),

    #[error("no slice added, UE can not be associated")]
    NoSliceAdded,

    #[error("no UE connected")]
    NoUeConnected,

    #[error("empty UE slice association request")]
    EmptyAssociation,

    #[error("rnti=0x{0:04x} does not exist in the eNB")]
    UnknownRnti(u16),

    #[error("slice id {0} does not exist")]
    UnknownSlice(u32),

    #[error("rnti=0x{rnti:04x} is already associated with slice {id}")]
    AlreadyAssociated { rnti: u16, id: u32 },

    #[error("rnti=0x{0:04x} has no entry in the UE slice table")]
    NotInSliceTable(u16),

    #[error("slice deletion is not supported")]
    DeleteUnsupported,
}

// ── Allocation outcomes ───────────────────────────────────────────────────────

/// Result of one allocation attempt inside a TTI.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The requested resources overlap an accepted allocation.
    #[error("collision with an existing allocation")]
    SchCollision,

    /// Not enough free RBGs/PRBs for the request.
    #[error("no schedulable space")]
    NoSchSpace,

    /// The UE is not eligible this TTI or has nothing to send.
    #[error("no allocation opportunity")]
    NoRntiOpportunity,

    /// PDCCH CCE budget exhausted.
    #[error("no control channel space")]
    NoCchSpace,

    #[error("invalid grant parameters")]
    InvalidGrantParams,

    #[error("coderate too high for the allocated resources")]
    InvalidCoderate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_reason_display_carries_values() {
        let err = SchedError::InvalidCellCfg {
            cc: 1,
            reason: CellCfgReason::InvalidBandwidth { nof_prb: 120 },
        };
        let msg = err.to_string();
        assert!(msg.contains("cell 1"));
        assert!(msg.contains("120"));
    }

    #[test]
    fn ue_not_found_names_operation() {
        let err = SchedError::UeNotFound {
            rnti: 0x46,
            op: "ul_bsr",
        };
        assert_eq!(err.to_string(), "user rnti=0x46 not found, failed to call ul_bsr");
    }

    #[test]
    fn slice_errors_format_rnti_as_hex() {
        assert_eq!(
            SliceCtrlError::UnknownRnti(0x46).to_string(),
            "rnti=0x0046 does not exist in the eNB"
        );
    }
}
