/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-carrier parameters derived once from [`CellCfg`] + [`SchedArgs`].

use crate::config::{CellCfg, SchedArgs};
use crate::mask::{PrbMask, RbgMask, MAX_NOF_PRB};
use crate::scheduler::error::CellCfgReason;
use crate::scheduler::policy::PolicyKind;
use crate::tbs;

const MIN_NOF_PRB: u32 = 6;

/// REGs taken by PCFICH.
const NOF_PCFICH_REG: u32 = 4;
/// REGs per PHICH group.
const NOF_REG_PER_PHICH_GROUP: u32 = 3;
const NOF_REG_PER_CCE: u32 = 9;

/// RBG size P for a DL bandwidth (36.213 table 7.1.6.1-1).
pub fn rbg_size_for(nof_prb: u32) -> u32 {
    match nof_prb {
        0..=10 => 1,
        11..=26 => 2,
        27..=63 => 3,
        _ => 4,
    }
}

/// CQI subband size for a DL bandwidth (36.213 table 7.2.1-3).
fn cqi_subband_size_for(nof_prb: u32) -> u32 {
    match nof_prb {
        0..=7 => nof_prb,
        8..=26 => 4,
        27..=63 => 6,
        _ => 8,
    }
}

/// Number of CCEs in a control region of `nof_ctrl_symbols` symbols.
fn nof_cce_for(nof_prb: u32, nof_ctrl_symbols: u32) -> u32 {
    // First symbol carries CRS: 2 REGs per PRB, the rest 3.
    let nof_reg = nof_prb * (2 + 3 * nof_ctrl_symbols.saturating_sub(1));
    let nof_phich_reg = nof_prb.div_ceil(8) * NOF_REG_PER_PHICH_GROUP;
    nof_reg.saturating_sub(NOF_PCFICH_REG + nof_phich_reg) / NOF_REG_PER_CCE
}

/// Derived, immutable parameters of one carrier.
#[derive(Debug, Clone)]
pub struct SchedCellParams {
    pub enb_cc_idx: usize,
    pub cfg: CellCfg,
    pub sched_args: SchedArgs,
    pub policy: PolicyKind,
    pub nof_prb: u32,
    pub rbg_size: u32,
    pub nof_rbg: u32,
    /// Control region size used for PDCCH and PDSCH RE accounting.
    pub nof_ctrl_symbols: u32,
    pub nof_cce: u32,
    /// PRBs at the UL band edges reserved for PUCCH.
    pub pucch_mask: PrbMask,
    pub cqi_subband_size: u32,
    pub nof_cqi_subbands: u32,
}

impl SchedCellParams {
    /// Validate `cfg`/`args` and derive the carrier parameters.
    pub fn set_cfg(
        enb_cc_idx: usize,
        cfg: &CellCfg,
        args: &SchedArgs,
    ) -> Result<Self, CellCfgReason> {
        let nof_prb = cfg.nof_prb;
        if !(MIN_NOF_PRB..=MAX_NOF_PRB as u32).contains(&nof_prb) {
            return Err(CellCfgReason::InvalidBandwidth { nof_prb });
        }

        let pucch_prbs_per_edge = cfg.nrb_pucch + args.pucch_harq_max_rb;
        if 2 * pucch_prbs_per_edge >= nof_prb {
            return Err(CellCfgReason::PucchCoversBand {
                nof_prb,
                pucch_prbs_per_edge,
            });
        }

        let (min, max) = (args.min_nof_ctrl_symbols, args.max_nof_ctrl_symbols);
        if min < 1 || min > max || max > 3 {
            return Err(CellCfgReason::InvalidCfiRange { min, max });
        }

        for (field, value) in [
            ("pdsch_mcs", args.pdsch_mcs),
            ("pdsch_max_mcs", Some(args.pdsch_max_mcs)),
            ("pusch_mcs", args.pusch_mcs),
            ("pusch_max_mcs", Some(args.pusch_max_mcs)),
        ] {
            if let Some(value) = value.filter(|&v| v > tbs::MAX_MCS) {
                return Err(CellCfgReason::McsOutOfRange { field, value });
            }
        }

        if args.max_aggr_level > 3 {
            return Err(CellCfgReason::InvalidAggrLevel {
                level: args.max_aggr_level,
            });
        }
        if cfg.maxharq_msg3tx == 0 {
            return Err(CellCfgReason::InvalidMsg3MaxTx);
        }
        if !(args.target_bler > 0.0 && args.target_bler < 1.0) {
            return Err(CellCfgReason::InvalidTargetBler {
                bler: args.target_bler,
            });
        }
        let policy = PolicyKind::from_name(&args.policy).ok_or_else(|| {
            CellCfgReason::UnknownPolicy {
                name: args.policy.clone(),
            }
        })?;

        let rbg_size = rbg_size_for(nof_prb);
        let nof_rbg = nof_prb.div_ceil(rbg_size);

        let mut pucch_mask = PrbMask::new(nof_prb as usize);
        pucch_mask.fill(0, pucch_prbs_per_edge as usize, true);
        pucch_mask.fill(
            (nof_prb - pucch_prbs_per_edge) as usize,
            nof_prb as usize,
            true,
        );

        // Narrow carriers get one extra control symbol.
        let nof_ctrl_symbols = if nof_prb <= 10 { max + 1 } else { max };
        let cqi_subband_size = cqi_subband_size_for(nof_prb);

        Ok(Self {
            enb_cc_idx,
            cfg: cfg.clone(),
            sched_args: args.clone(),
            policy,
            nof_prb,
            rbg_size,
            nof_rbg,
            nof_ctrl_symbols,
            nof_cce: nof_cce_for(nof_prb, nof_ctrl_symbols),
            pucch_mask,
            cqi_subband_size,
            nof_cqi_subbands: nof_prb.div_ceil(cqi_subband_size),
        })
    }

    /// PRBs in RBG `rbg` (the last one may be shorter).
    pub fn nof_prbs_in_rbg(&self, rbg: u32) -> u32 {
        let start = rbg * self.rbg_size;
        self.nof_prb.saturating_sub(start).min(self.rbg_size)
    }

    /// Total PRBs covered by the RBGs set in `mask`.
    pub fn rbg_mask_to_nof_prb(&self, mask: &RbgMask) -> u32 {
        mask.ones().map(|rbg| self.nof_prbs_in_rbg(rbg as u32)).sum()
    }

    /// RBGs needed to cover `nof_prb` PRBs.
    pub fn prb_to_rbg(&self, nof_prb: u32) -> u32 {
        nof_prb.div_ceil(self.rbg_size)
    }

    pub fn empty_rbg_mask(&self) -> RbgMask {
        RbgMask::new(self.nof_rbg as usize)
    }

    pub fn empty_prb_mask(&self) -> PrbMask {
        PrbMask::new(self.nof_prb as usize)
    }

    /// PDSCH REs per PRB outside the control region.
    pub fn dl_nof_re_per_prb(&self) -> u32 {
        tbs::nof_dl_re_per_prb(self.nof_ctrl_symbols)
    }

    /// CQI subband index of an RBG (by its first PRB).
    pub fn rbg_to_subband(&self, rbg: u32) -> u32 {
        (rbg * self.rbg_size / self.cqi_subband_size).min(self.nof_cqi_subbands - 1)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
