/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Allocation latency against the 1 ms TTI budget.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use enb_sched::cell::SchedCellParams;
use enb_sched::config::{CellCfg, SchedArgs};
use enb_sched::mask::{Interval, RbgMask};
use enb_sched::scheduler::alloc::find_optimal_rbgmask;
use enb_sched::tti::TtiPoint;
use enb_sched::ue::{BearerCfg, BearerDirection, SchedUeCell, UeCfg};
use enb_sched::Scheduler;

fn cell_100_prb() -> CellCfg {
    CellCfg {
        nof_prb: 100,
        ..Default::default()
    }
}

fn bench_rbg_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_optimal_rbgmask");
    let params = Arc::new(SchedCellParams::set_cfg(0, &cell_100_prb(), &SchedArgs::default()).unwrap());
    let mut ue_cell = SchedUeCell::new(0x46, Arc::clone(&params));
    ue_cell.set_cfg(Some(0), true);
    ue_cell.set_dl_cqi(TtiPoint::new(0), 12);

    let empty = RbgMask::new(params.nof_rbg as usize);
    let fragmented = RbgMask::from_positions(params.nof_rbg as usize, &[1, 4, 5, 9, 13, 17, 20, 22]);

    group.bench_function("empty_band_full_buffer", |b| {
        b.iter(|| {
            find_optimal_rbgmask(
                black_box(&ue_cell),
                black_box(&empty),
                false,
                Interval::new(10, 100_000),
            )
        });
    });

    group.bench_function("fragmented_band_contiguous", |b| {
        b.iter(|| {
            find_optimal_rbgmask(
                black_box(&ue_cell),
                black_box(&fragmented),
                true,
                Interval::new(10, 3_000),
            )
        });
    });
    group.finish();
}

fn bench_full_tti(c: &mut Criterion) {
    let mut group = c.benchmark_group("tti_generation");

    for policy in ["time_rr", "time_pf"] {
        let sched = Scheduler::new(SchedArgs {
            policy: policy.to_string(),
            ..Default::default()
        });
        sched.cell_cfg(&[cell_100_prb()]).unwrap();
        for i in 0..32u16 {
            let rnti = 0x46 + i;
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
            sched.dl_cqi_info(TtiPoint::new(0), rnti, 0, 4 + u32::from(i) % 12).unwrap();
        }

        let mut tti = 0u32;
        group.bench_function(format!("32_ues_{policy}"), |b| {
            b.iter(|| {
                for i in 0..32u16 {
                    let _ = sched.dl_rlc_buffer_state(0x46 + i, 3, 50_000, 0);
                    let _ = sched.ul_bsr(0x46 + i, 1, 20_000);
                }
                let dl = sched.dl_sched(TtiPoint::new(tti + 4), 0);
                let ul = sched.ul_sched(TtiPoint::new(tti + 8), 0);
                tti = tti.wrapping_add(1);
                black_box((dl, ul))
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_rbg_search, bench_full_tti);
criterion_main!(benches);
