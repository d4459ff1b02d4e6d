/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Time-domain round robin: the UE list is rotated by one position per TTI.

use super::{sched_dl_newtxs, sched_dl_retxs, sched_ul_newtxs, sched_ul_retxs};
use super::{PolicyKind, SchedPolicy};
use crate::scheduler::alloc::UeDb;
use crate::scheduler::sf_sched::SfSched;
use crate::slicing::SlicingRegistry;
use crate::tti::TtiPoint;

#[derive(Debug, Default)]
pub struct TimeRr;

impl TimeRr {
    pub fn new() -> Self {
        Self
    }
}

/// RNTIs in id order, starting at position `tti_rx mod n`.
fn rotated_order(ue_db: &UeDb, tti_rx: TtiPoint) -> Vec<u16> {
    let mut order: Vec<u16> = ue_db.keys().copied().collect();
    if !order.is_empty() {
        let start = tti_rx.to_uint() as usize % order.len();
        order.rotate_left(start);
    }
    order
}

impl SchedPolicy for TimeRr {
    fn kind(&self) -> PolicyKind {
        PolicyKind::TimeRr
    }

    fn sched_dl_users(&mut self, ue_db: &mut UeDb, sf: &mut SfSched, slicing: &SlicingRegistry) {
        let order = rotated_order(ue_db, sf.tti_rx());
        if sched_dl_retxs(ue_db, sf, &order).cch_exhausted {
            return;
        }
        sched_dl_newtxs(ue_db, sf, slicing, &order);
    }

    fn sched_ul_users(&mut self, ue_db: &mut UeDb, sf: &mut SfSched) {
        let order = rotated_order(ue_db, sf.tti_rx());
        if sched_ul_retxs(ue_db, sf, &order).cch_exhausted {
            return;
        }
        sched_ul_newtxs(ue_db, sf, &order);
    }
}
