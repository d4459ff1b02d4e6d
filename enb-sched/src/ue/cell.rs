/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-carrier view of a UE: activation state, channel reports and HARQ.

use std::sync::Arc;

use tracing::info;

use crate::cell::SchedCellParams;
use crate::harq::HarqEntity;
use crate::tbs;
use crate::tti::TtiPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CcState {
    /// Carrier not configured for this UE.
    #[default]
    Idle,
    /// Configured SCell waiting for its first valid CQI.
    Activating,
    Active,
}

#[derive(Debug, Clone)]
pub struct SchedUeCell {
    rnti: u16,
    params: Arc<SchedCellParams>,
    ue_cc_idx: Option<usize>,
    state: CcState,
    pub harq: HarqEntity,

    dl_cqi: u32,
    dl_cqi_tti: Option<TtiPoint>,
    dl_sb_cqi: Vec<u32>,
    dl_ri: u32,
    dl_pmi: u32,
    ul_cqi: u32,
    ul_snr_db: Option<f32>,
}

impl SchedUeCell {
    pub fn new(rnti: u16, params: Arc<SchedCellParams>) -> Self {
        let nof_sb = params.nof_cqi_subbands as usize;
        let initial_cqi = params.cfg.initial_dl_cqi.min(tbs::MAX_CQI);
        Self {
            rnti,
            params,
            ue_cc_idx: None,
            state: CcState::Idle,
            harq: HarqEntity::new(),
            dl_cqi: initial_cqi,
            dl_cqi_tti: None,
            dl_sb_cqi: vec![initial_cqi; nof_sb],
            dl_ri: 0,
            dl_pmi: 0,
            ul_cqi: 1,
            ul_snr_db: None,
        }
    }

    pub fn params(&self) -> &SchedCellParams {
        &self.params
    }

    pub fn ue_cc_idx(&self) -> Option<usize> {
        self.ue_cc_idx
    }

    pub fn state(&self) -> CcState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == CcState::Active
    }

    /// Apply the carrier part of a UE configuration.  `ue_cc_idx == 0` is the
    /// PCell and is active immediately; SCells wait for a CQI.
    pub fn set_cfg(&mut self, ue_cc_idx: Option<usize>, active: bool) {
        let prev = self.state;
        self.ue_cc_idx = ue_cc_idx;
        self.state = match ue_cc_idx {
            None => CcState::Idle,
            Some(0) => CcState::Active,
            Some(_) if !active => CcState::Idle,
            Some(_) if prev == CcState::Active => CcState::Active,
            Some(_) => CcState::Activating,
        };
        if self.state == CcState::Idle && prev != CcState::Idle {
            self.harq.reset();
        }
        if self.state != prev {
            info!(
                rnti = self.rnti,
                cc = self.params.enb_cc_idx,
                from = ?prev,
                to = ?self.state,
                "carrier state change"
            );
        }
    }

    pub fn reset(&mut self) {
        self.harq.reset();
        self.dl_cqi = self.params.cfg.initial_dl_cqi.min(tbs::MAX_CQI);
        self.dl_cqi_tti = None;
        self.dl_sb_cqi.fill(self.dl_cqi);
        self.dl_ri = 0;
        self.dl_pmi = 0;
        self.ul_cqi = 1;
        self.ul_snr_db = None;
    }

    // ── Channel reports ───────────────────────────────────────────────────────

    pub fn set_dl_cqi(&mut self, tti_rx: TtiPoint, cqi: u32) {
        self.dl_cqi = cqi.min(tbs::MAX_CQI);
        self.dl_cqi_tti = Some(tti_rx);
        self.dl_sb_cqi.fill(self.dl_cqi);
        if self.state == CcState::Activating && self.dl_cqi > 0 {
            self.state = CcState::Active;
            info!(
                rnti = self.rnti,
                cc = self.params.enb_cc_idx,
                "SCell activated"
            );
        }
    }

    /// Subband report; the wideband CQI becomes the subband average.
    pub fn set_dl_sb_cqi(&mut self, tti_rx: TtiPoint, sb_idx: u32, cqi: u32) {
        if let Some(sb) = self.dl_sb_cqi.get_mut(sb_idx as usize) {
            *sb = cqi.min(tbs::MAX_CQI);
        }
        let n = self.dl_sb_cqi.len().max(1) as u32;
        let avg = self.dl_sb_cqi.iter().sum::<u32>() / n;
        self.dl_cqi_tti = Some(tti_rx);
        self.dl_cqi = avg;
    }

    pub fn set_dl_ri(&mut self, ri: u32) {
        self.dl_ri = ri;
    }

    pub fn set_dl_pmi(&mut self, pmi: u32) {
        self.dl_pmi = pmi;
    }

    pub fn set_ul_snr(&mut self, snr_db: f32) {
        self.ul_snr_db = Some(snr_db);
        self.ul_cqi = tbs::ul_snr_to_cqi(snr_db).max(1);
    }

    pub fn dl_cqi(&self) -> u32 {
        self.dl_cqi
    }

    /// TTI of the last DL CQI report, if any arrived.
    pub fn dl_cqi_tti(&self) -> Option<TtiPoint> {
        self.dl_cqi_tti
    }

    pub fn dl_sb_cqi(&self, sb_idx: u32) -> u32 {
        self.dl_sb_cqi
            .get(sb_idx as usize)
            .copied()
            .unwrap_or(self.dl_cqi)
    }

    pub fn dl_ri(&self) -> u32 {
        self.dl_ri
    }

    pub fn dl_pmi(&self) -> u32 {
        self.dl_pmi
    }

    pub fn ul_cqi(&self) -> u32 {
        self.ul_cqi
    }

    pub fn ul_snr_db(&self) -> Option<f32> {
        self.ul_snr_db
    }

    // ── Link adaptation ───────────────────────────────────────────────────────

    pub fn dl_mcs(&self) -> u32 {
        let args = &self.params.sched_args;
        args.pdsch_mcs
            .unwrap_or_else(|| tbs::cqi_to_mcs(self.dl_cqi, args.pdsch_max_mcs))
    }

    pub fn ul_mcs(&self) -> u32 {
        let args = &self.params.sched_args;
        args.pusch_mcs
            .unwrap_or_else(|| tbs::cqi_to_mcs(self.ul_cqi, args.pusch_max_mcs))
    }

    /// PDCCH aggregation level (log2) for a DCI to this UE.
    pub fn aggr_level(&self) -> u32 {
        tbs::aggr_level_from_cqi(self.dl_cqi, self.params.sched_args.max_aggr_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CellCfg, SchedArgs};

    fn ue_cell() -> SchedUeCell {
        let params =
            SchedCellParams::set_cfg(0, &CellCfg::default(), &SchedArgs::default()).unwrap();
        SchedUeCell::new(0x46, Arc::new(params))
    }

    #[test]
    fn pcell_is_active_immediately() {
        let mut c = ue_cell();
        assert_eq!(c.state(), CcState::Idle);
        c.set_cfg(Some(0), true);
        assert!(c.is_active());
    }

    #[test]
    fn scell_activates_on_first_valid_cqi() {
        let mut c = ue_cell();
        c.set_cfg(Some(1), true);
        assert_eq!(c.state(), CcState::Activating);
        c.set_dl_cqi(TtiPoint::new(10), 0);
        assert_eq!(c.state(), CcState::Activating);
        c.set_dl_cqi(TtiPoint::new(20), 9);
        assert!(c.is_active());
    }

    #[test]
    fn deconfigured_carrier_goes_idle() {
        let mut c = ue_cell();
        c.set_cfg(Some(0), true);
        c.set_cfg(None, false);
        assert_eq!(c.state(), CcState::Idle);
    }

    #[test]
    fn subband_cqi_updates_wideband_average() {
        let mut c = ue_cell();
        // 25 PRB → 4-PRB subbands → 7 subbands, all at initial CQI 5
        for sb in 0..7 {
            c.set_dl_sb_cqi(TtiPoint::new(1), sb, 12);
        }
        assert_eq!(c.dl_cqi(), 12);
        assert_eq!(c.dl_sb_cqi(3), 12);
    }

    #[test]
    fn fixed_mcs_overrides_cqi() {
        let params = SchedCellParams::set_cfg(
            0,
            &CellCfg::default(),
            &SchedArgs {
                pdsch_mcs: Some(17),
                ..Default::default()
            },
        )
        .unwrap();
        let mut c = SchedUeCell::new(0x46, Arc::new(params));
        c.set_dl_cqi(TtiPoint::new(0), 2);
        assert_eq!(c.dl_mcs(), 17);
    }

    #[test]
    fn snr_drives_ul_mcs() {
        let mut c = ue_cell();
        let low = c.ul_mcs();
        c.set_ul_snr(18.0);
        assert!(c.ul_mcs() > low);
    }
}
