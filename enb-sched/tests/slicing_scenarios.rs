/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! End-to-end scenarios through the public `Scheduler` API.

use std::sync::Arc;
use std::thread;

use enb_sched::config::{CellCfg, SchedArgs};
use enb_sched::scheduler::{SchedError, SliceCtrlError};
use enb_sched::slicing::{FrSlice, SliceAlgoParams, SliceConf, SliceCtrlRequest, UeSliceAssoc};
use enb_sched::tti::TtiPoint;
use enb_sched::ue::{BearerCfg, BearerDirection, UeCarrierCfg, UeCfg};
use enb_sched::Scheduler;

// ── Test helpers ──────────────────────────────────────────────────────────────

/// 40 PRB with RBG size 3 gives 14 RBGs.
fn scheduler_14_rbg() -> Scheduler {
    let sched = Scheduler::new(SchedArgs::default());
    sched
        .cell_cfg(&[CellCfg {
            nof_prb: 40,
            ..Default::default()
        }])
        .unwrap();
    sched
}

fn add_backlogged_ue(sched: &Scheduler, rnti: u16, bytes: u32) {
    sched.ue_cfg(rnti, &UeCfg::default()).unwrap();
    sched
        .bearer_ue_cfg(
            rnti,
            3,
            BearerCfg {
                direction: BearerDirection::Both,
                priority: 1,
                group: 1,
            },
        )
        .unwrap();
    sched.dl_rlc_buffer_state(rnti, 3, bytes, 0).unwrap();
    sched.dl_cqi_info(TtiPoint::new(0), rnti, 0, 12).unwrap();
}

fn static_slice(id: u32, pos_low: u32, pos_high: u32) -> FrSlice {
    FrSlice {
        id,
        label: format!("slice-{id}"),
        sched: "RR".to_string(),
        algo: SliceAlgoParams::Static { pos_low, pos_high },
    }
}

fn two_slices() -> SliceConf {
    SliceConf {
        sched_name: "RR".to_string(),
        slices: vec![static_slice(0, 0, 7), static_slice(1, 7, 14)],
    }
}

fn assoc(rnti: u16, dl_id: u32) -> UeSliceAssoc {
    UeSliceAssoc {
        rnti,
        dl_id,
        ul_id: None,
    }
}

// ── Slice setup ───────────────────────────────────────────────────────────────

#[test]
fn association_requires_slice_table() {
    let sched = scheduler_14_rbg();
    add_backlogged_ue(&sched, 0x46, 100);

    assert_eq!(
        sched.ue_slice_conf(&[assoc(0x46, 1)]),
        Err(SliceCtrlError::NoSliceAdded)
    );
    assert_eq!(sched.ue_slice_id(0x46), None);
}

#[test]
fn new_data_confined_to_associated_slice() {
    let sched = scheduler_14_rbg();
    for rnti in [0x46, 0x47, 0x48] {
        add_backlogged_ue(&sched, rnti, 1_000_000);
    }
    sched
        .slice(&SliceCtrlRequest::AddMod(two_slices()))
        .unwrap();
    sched
        .slice(&SliceCtrlRequest::UeSliceAssoc {
            ues: vec![assoc(0x46, 1)],
        })
        .unwrap();
    assert_eq!(sched.ues_in_slice(1), vec![0x46]);
    assert_eq!(sched.ues_in_slice(0), vec![0x47, 0x48]);

    let mut served_0x46 = 0;
    for t in 0..30u32 {
        let tti_tx_dl = TtiPoint::new(t + 4);
        let dl = sched.dl_sched(tti_tx_dl, 0);
        for g in dl.data.iter().filter(|g| g.nof_retx == 0) {
            let range = if g.rnti == 0x46 { 7..14 } else { 0..7 };
            assert!(
                g.rbgmask.ones().all(|rbg| range.contains(&rbg)),
                "rnti=0x{:x} got {} outside {:?}",
                g.rnti,
                g.rbgmask,
                range
            );
            if g.rnti == 0x46 {
                served_0x46 += 1;
            }
            sched
                .dl_ack_info(tti_tx_dl + 4, g.rnti, 0, 0, true)
                .unwrap();
        }
    }
    assert!(served_0x46 > 0);
}

#[test]
fn rejected_slice_table_leaves_state_untouched() {
    let sched = scheduler_14_rbg();
    add_backlogged_ue(&sched, 0x46, 100);
    sched.slice_add_mod(&two_slices()).unwrap();
    sched.ue_slice_conf(&[assoc(0x46, 1)]).unwrap();

    let table = sched.slice_table();
    let assocs = sched.ue_slice_associations();

    let too_many = SliceConf {
        sched_name: "PF".to_string(),
        slices: (0..6).map(|id| static_slice(id, 0, 1)).collect(),
    };
    assert_eq!(
        sched.slice_add_mod(&too_many),
        Err(SliceCtrlError::UnsupportedSliceCount(6))
    );

    let inverted = SliceConf {
        sched_name: "PF".to_string(),
        slices: vec![static_slice(3, 10, 5)],
    };
    assert!(matches!(
        sched.slice_add_mod(&inverted),
        Err(SliceCtrlError::InvalidRbgRange {
            id: 3,
            pos_low: 10,
            pos_high: 5,
            ..
        })
    ));

    assert_eq!(sched.slice_table(), table);
    assert_eq!(sched.ue_slice_associations(), assocs);
    assert_eq!(sched.ue_slice_id(0x46), Some(1));
    assert_eq!(sched.slice_stats().sched_name, Some("time_rr"));
}

#[test]
fn slice_range_clamped_on_narrower_secondary_carrier() {
    // Slice ranges are validated against carrier 0 (14 RBGs); carrier 1 is
    // 15 PRB with RBG size 2, so only 8 RBGs.
    let sched = Scheduler::new(SchedArgs::default());
    sched
        .cell_cfg(&[
            CellCfg {
                nof_prb: 40,
                ..Default::default()
            },
            CellCfg {
                nof_prb: 15,
                ..Default::default()
            },
        ])
        .unwrap();
    let on_carrier_1 = UeCfg {
        supported_cc_list: vec![UeCarrierCfg {
            enb_cc_idx: 1,
            active: true,
        }],
        ..Default::default()
    };
    for rnti in [0x46, 0x47] {
        sched.ue_cfg(rnti, &on_carrier_1).unwrap();
        sched
            .bearer_ue_cfg(
                rnti,
                3,
                BearerCfg {
                    direction: BearerDirection::Both,
                    priority: 1,
                    group: 1,
                },
            )
            .unwrap();
        sched.dl_rlc_buffer_state(rnti, 3, 1_000_000, 0).unwrap();
        sched.dl_cqi_info(TtiPoint::new(0), rnti, 1, 12).unwrap();
    }
    sched.slice_add_mod(&two_slices()).unwrap();
    sched.ue_slice_conf(&[assoc(0x46, 1)]).unwrap();

    let mut served_0x46 = 0;
    for t in 0..20u32 {
        let tti_tx_dl = TtiPoint::new(t + 4);
        let dl = sched.dl_sched(tti_tx_dl, 1);
        for g in dl.data.iter().filter(|g| g.nof_retx == 0) {
            assert_eq!(g.rbgmask.size(), 8);
            let range = if g.rnti == 0x46 { 7..8 } else { 0..7 };
            assert!(
                g.rbgmask.ones().all(|rbg| range.contains(&rbg)),
                "rnti=0x{:x} got {} outside {:?}",
                g.rnti,
                g.rbgmask,
                range
            );
            if g.rnti == 0x46 {
                served_0x46 += 1;
            }
            sched
                .dl_ack_info(tti_tx_dl + 4, g.rnti, 1, 0, true)
                .unwrap();
        }
    }
    assert!(served_0x46 > 0);
}

// ── Unconfigured scheduler ────────────────────────────────────────────────────

#[test]
fn dl_sched_before_cell_cfg_is_empty() {
    let sched = Scheduler::new(SchedArgs::default());
    let dl = sched.dl_sched(TtiPoint::new(100), 0);
    assert!(dl.is_empty());
    assert_eq!(dl.tti_tx_dl, TtiPoint::new(100));
}

// ── Retransmissions ───────────────────────────────────────────────────────────

#[test]
fn retransmission_waits_for_free_subframe() {
    let sched = scheduler_14_rbg();
    add_backlogged_ue(&sched, 0x46, 300);

    let dl = sched.dl_sched(TtiPoint::new(4), 0);
    assert_eq!(dl.data.len(), 1);
    let first = dl.data[0].clone();
    sched
        .dl_ack_info(TtiPoint::new(8), 0x46, 0, 0, false)
        .unwrap();

    // No PDSCH at all in tti_tx_dl 9.
    let mut mask = vec![false; 20];
    mask[9] = true;
    sched.set_dl_tti_mask(mask);
    assert!(sched.dl_sched(TtiPoint::new(9), 0).data.is_empty());

    let dl = sched.dl_sched(TtiPoint::new(10), 0);
    let retx = dl.data.iter().find(|g| g.rnti == 0x46).unwrap();
    assert_eq!(retx.pid, first.pid);
    assert_eq!(retx.nof_retx, 1);
    assert_eq!(retx.rbgmask.count(), first.rbgmask.count());
}

// ── UE lifecycle ──────────────────────────────────────────────────────────────

#[test]
fn removed_ue_rejects_every_setter() {
    let sched = scheduler_14_rbg();
    add_backlogged_ue(&sched, 0x46, 100);
    sched.ue_rem(0x46).unwrap();

    assert!(!sched.ue_exists(0x46));
    let not_found = |op: &'static str| SchedError::UeNotFound { rnti: 0x46, op };
    assert_eq!(sched.ul_bsr(0x46, 1, 10), Err(not_found("ul_bsr")));
    assert_eq!(sched.ul_sr_info(0x46), Err(not_found("ul_sr_info")));
    assert_eq!(
        sched.dl_rlc_buffer_state(0x46, 3, 10, 0),
        Err(not_found("dl_rlc_buffer_state"))
    );
    assert_eq!(
        sched.dl_cqi_info(TtiPoint::new(0), 0x46, 0, 9),
        Err(not_found("dl_cqi_info"))
    );
    assert_eq!(
        sched.ul_crc_info(TtiPoint::new(0), 0x46, 0, true),
        Err(not_found("ul_crc_info"))
    );
}

// ── Concurrency ───────────────────────────────────────────────────────────────

#[test]
fn reports_and_scheduling_from_different_threads() {
    let sched = Arc::new(scheduler_14_rbg());
    for rnti in [0x46, 0x47] {
        add_backlogged_ue(&sched, rnti, 10_000);
    }

    let reporter = {
        let sched = Arc::clone(&sched);
        thread::spawn(move || {
            for i in 0..200u32 {
                sched.ul_bsr(0x46, 1, 100 + i).unwrap();
                sched.dl_cqi_info(TtiPoint::new(i), 0x47, 0, 5 + i % 10).unwrap();
            }
        })
    };
    for t in 0..200u32 {
        let dl = sched.dl_sched(TtiPoint::new(t + 4), 0);
        let mut used = 0u64;
        for g in &dl.data {
            let bits: u64 = g.rbgmask.ones().map(|b| 1u64 << b).sum();
            assert_eq!(used & bits, 0);
            used |= bits;
        }
        sched.ul_sched(TtiPoint::new(t + 8), 0);
    }
    reporter.join().unwrap();
    assert_eq!(sched.nof_generated_ttis(0), 200);
}
