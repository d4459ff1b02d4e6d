/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Link adaptation: channel quality → MCS → transport block size.
//!
//! The transport block size is estimated from spectral efficiency rather than
//! looked up in the 3GPP TBS table; the estimate is monotonic in both MCS and
//! PRB count, which is all the allocation search relies on.

// ── Tables ────────────────────────────────────────────────────────────────────

/// Spectral efficiency (bits per RE) reported by each 4-bit CQI
/// (36.213 table 7.2.3-1).  CQI 0 means out of range.
const CQI_EFFICIENCY: [f32; 16] = [
    0.0, 0.1523, 0.2344, 0.3770, 0.6016, 0.8770, 1.1758, 1.4766, 1.9141, 2.4063,
    2.7305, 3.3223, 3.9023, 4.5234, 5.1152, 5.5547,
];

/// Spectral efficiency of each PDSCH/PUSCH MCS index (64QAM table).
const MCS_EFFICIENCY: [f32; 29] = [
    0.15, 0.19, 0.23, 0.31, 0.38, 0.49, 0.60, 0.74, 0.88, 1.03, // QPSK
    1.18, 1.33, 1.48, 1.70, 1.91, 2.16, 2.41, // 16QAM
    2.57, 2.73, 3.03, 3.32, 3.61, 3.90, 4.21, 4.52, 4.82, 5.12, 5.33, 5.55, // 64QAM
];

pub const MAX_MCS: u32 = 28;
pub const MAX_CQI: u32 = 15;

/// Subcarriers per PRB.
const NOF_SC_PER_PRB: u32 = 12;
/// OFDM symbols per subframe (normal cyclic prefix).
const NOF_SYMBOLS_PER_SF: u32 = 14;
/// Cell reference signal REs per PRB outside the control region (2 ports).
const NOF_CRS_RE_PER_PRB: u32 = 12;
/// PUSCH symbols carrying data (two DMRS symbols per subframe).
const NOF_PUSCH_SYMBOLS: u32 = 12;

/// Largest coderate a UE is required to decode.
const MAX_CODERATE: f32 = 0.93;

// ── CQI / SNR → MCS ───────────────────────────────────────────────────────────

/// Highest MCS whose efficiency does not exceed what `cqi` reports, capped at
/// `max_mcs`.  CQI 0 maps to MCS 0.
pub fn cqi_to_mcs(cqi: u32, max_mcs: u32) -> u32 {
    let eff = CQI_EFFICIENCY[cqi.min(MAX_CQI) as usize];
    let mcs = MCS_EFFICIENCY
        .iter()
        .rposition(|&e| e <= eff)
        .unwrap_or(0) as u32;
    mcs.min(max_mcs).min(MAX_MCS)
}

/// Equivalent wideband CQI of a PUSCH SNR measurement (dB).
///
/// Linear map: CQI 1 at −6 dB, CQI 15 at +20 dB.
pub fn ul_snr_to_cqi(snr_db: f32) -> u32 {
    if !snr_db.is_finite() || snr_db < -6.0 {
        return 0;
    }
    let cqi = 1.0 + (snr_db + 6.0) * 14.0 / 26.0;
    (cqi.floor() as u32).min(MAX_CQI)
}

pub fn mcs_efficiency(mcs: u32) -> f32 {
    MCS_EFFICIENCY[mcs.min(MAX_MCS) as usize]
}

/// Modulation order (bits per symbol) of an MCS index.
pub fn mcs_to_qm(mcs: u32) -> u32 {
    match mcs {
        0..=9 => 2,
        10..=16 => 4,
        _ => 6,
    }
}

// ── Resource elements ─────────────────────────────────────────────────────────

/// PDSCH REs per PRB for a control region of `cfi` symbols.
pub fn nof_dl_re_per_prb(cfi: u32) -> u32 {
    NOF_SC_PER_PRB * (NOF_SYMBOLS_PER_SF - cfi.min(4)) - NOF_CRS_RE_PER_PRB
}

/// PUSCH REs per PRB.
pub const fn nof_ul_re_per_prb() -> u32 {
    NOF_SC_PER_PRB * NOF_PUSCH_SYMBOLS
}

// ── TBS ───────────────────────────────────────────────────────────────────────

/// Estimated transport block size, in bytes, of `nof_prb` PRBs at `mcs`.
///
/// Returns `None` when the resulting coderate exceeds what a UE decodes.
pub fn tbs_bytes(mcs: u32, nof_prb: u32, nof_re_per_prb: u32) -> Option<u32> {
    let nof_re = nof_prb * nof_re_per_prb;
    if nof_re == 0 {
        return Some(0);
    }
    let bits = (mcs_efficiency(mcs) * nof_re as f32).floor() as u32;
    let coderate = bits as f32 / (nof_re * mcs_to_qm(mcs)) as f32;
    if coderate > MAX_CODERATE {
        return None;
    }
    Some(bits / 8)
}

/// Fewest PRBs whose TBS at `mcs` carries `req_bytes`, bounded by `max_prb`.
pub fn required_prbs(req_bytes: u32, mcs: u32, nof_re_per_prb: u32, max_prb: u32) -> u32 {
    if req_bytes == 0 {
        return 0;
    }
    (1..=max_prb)
        .find(|&n| tbs_bytes(mcs, n, nof_re_per_prb).is_some_and(|tbs| tbs >= req_bytes))
        .unwrap_or(max_prb)
}

// ── PDCCH ─────────────────────────────────────────────────────────────────────

/// PDCCH aggregation level (log2 of the CCE count) needed for a DCI at
/// `cqi`, capped at `max_aggr_level`.
pub fn aggr_level_from_cqi(cqi: u32, max_aggr_level: u32) -> u32 {
    let level = match cqi {
        10.. => 0,
        7..=9 => 1,
        4..=6 => 2,
        _ => 3,
    };
    level.min(max_aggr_level)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
