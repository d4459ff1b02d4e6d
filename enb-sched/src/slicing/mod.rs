/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Static RBG slicing.
//!
//! The [`SlicingRegistry`] holds the active slice table (slice id → RBG
//! range and policy) and the UE → slice association table.  It is owned by
//! the scheduler state and mutated only under the scheduler lock.
//!
//! Both control operations validate the whole request before touching any
//! state, so a rejected request leaves the table and every association
//! exactly as they were.
//!
//! ```text
//!   RBG   0  1  2  3  4  5  6 | 7  8  9 10 11 12 13
//!        └──── slice 0 ───────┘└──── slice 1 ───────┘
//!   UE 0x46 → slice 1: new-data grants only in RBGs 7..14
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::mask::RbgMask;
use crate::scheduler::alloc::UeDb;
use crate::scheduler::error::SliceCtrlError;
use crate::scheduler::policy::PolicyKind;

/// Slice tables hold between 1 and this many slices, exclusive.
pub const MAX_NOF_SLICES: usize = 5;

// ── Request types ─────────────────────────────────────────────────────────────

/// Per-slice resource algorithm.  Only `Static` is implemented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SliceAlgoParams {
    /// Fixed RBG range `[pos_low, pos_high)`.
    Static { pos_low: u32, pos_high: u32 },
    /// Network virtualization substrate (rate or capacity share).
    Nvs { capacity: f32 },
    /// Earliest deadline first.
    Edf {
        deadline: u32,
        guaranteed_prbs: u32,
        max_replenish: u32,
    },
}

impl SliceAlgoParams {
    pub fn name(&self) -> &'static str {
        match self {
            SliceAlgoParams::Static { .. } => "static",
            SliceAlgoParams::Nvs { .. } => "nvs",
            SliceAlgoParams::Edf { .. } => "edf",
        }
    }
}

fn default_slice_sched() -> String {
    String::from("RR")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrSlice {
    pub id: u32,
    #[serde(default)]
    pub label: String,
    /// Intra-slice policy wire name (`RR`, `PF`).
    #[serde(default = "default_slice_sched")]
    pub sched: String,
    pub algo: SliceAlgoParams,
}

/// Full DL slice table as sent by the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceConf {
    /// Scheduler policy wire name (`RR`, `PF`).
    pub sched_name: String,
    #[serde(default)]
    pub slices: Vec<FrSlice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UeSliceAssoc {
    pub rnti: u16,
    pub dl_id: u32,
    /// Accepted for compatibility; UL slicing is not implemented.
    #[serde(default)]
    pub ul_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SliceCtrlRequest {
    AddMod(SliceConf),
    UeSliceAssoc { ues: Vec<UeSliceAssoc> },
    Delete {
        #[serde(default)]
        ids: Vec<u32>,
    },
}

// ── Registry state ────────────────────────────────────────────────────────────

/// One accepted slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slice {
    pub id: u32,
    pub label: String,
    pub policy: PolicyKind,
    pub pos_low: u32,
    pub pos_high: u32,
}

/// Read-back of the registry, as reported to the control plane.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SliceStats {
    pub sched_name: Option<&'static str>,
    pub slices: Vec<Slice>,
    pub ues: Vec<UeSliceAssoc>,
}

#[derive(Debug, Clone, Default)]
pub struct SlicingRegistry {
    policy: Option<PolicyKind>,
    slices: BTreeMap<u32, Slice>,
    /// Id of the first slice of the last accepted request.
    default_id: Option<u32>,
    ue_assoc: BTreeMap<u16, Option<u32>>,
}

impl SlicingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A slice table is installed.
    pub fn is_active(&self) -> bool {
        !self.slices.is_empty()
    }

    /// Policy of the installed table.
    pub fn policy(&self) -> Option<PolicyKind> {
        self.policy
    }

    pub fn slice(&self, id: u32) -> Option<&Slice> {
        self.slices.get(&id)
    }

    /// Slices in id order.
    pub fn slices(&self) -> impl Iterator<Item = &Slice> {
        self.slices.values()
    }

    pub fn associations(&self) -> impl Iterator<Item = (u16, Option<u32>)> + '_ {
        self.ue_assoc.iter().map(|(&rnti, &id)| (rnti, id))
    }

    pub fn stats(&self) -> SliceStats {
        SliceStats {
            sched_name: self.policy.map(PolicyKind::name),
            slices: self.slices.values().cloned().collect(),
            ues: self
                .ue_assoc
                .iter()
                .filter_map(|(&rnti, &id)| {
                    id.map(|dl_id| UeSliceAssoc {
                        rnti,
                        dl_id,
                        ul_id: None,
                    })
                })
                .collect(),
        }
    }

    /// Restrict `free` to the RBG range of `slice_id` by marking every RBG
    /// outside `[pos_low, pos_high)` as used.  Without an installed table or
    /// a known slice the mask is returned unchanged.
    pub fn confine(&self, slice_id: Option<u32>, free: RbgMask) -> RbgMask {
        let Some(slice) = slice_id.and_then(|id| self.slices.get(&id)) else {
            return free;
        };
        let mut mask = free;
        mask.fill(0, slice.pos_low as usize, true);
        mask.fill(slice.pos_high as usize, mask.size(), true);
        mask
    }

    // ── UE tracking ───────────────────────────────────────────────────────────

    /// Track a newly created UE.  Returns the slice it starts in.
    pub fn register_ue(&mut self, rnti: u16) -> Option<u32> {
        let id = self.default_id.filter(|_| self.is_active());
        *self.ue_assoc.entry(rnti).or_insert(id)
    }

    pub fn remove_ue(&mut self, rnti: u16) {
        self.ue_assoc.remove(&rnti);
    }

    pub fn clear_associations(&mut self) {
        self.ue_assoc.clear();
    }

    // ── Control operations ────────────────────────────────────────────────────

    /// Replace the slice table wholesale.
    ///
    /// On success every tracked UE is moved to the first slice of `conf`,
    /// both here and in `ue_db`.
    pub fn add_mod(
        &mut self,
        conf: &SliceConf,
        nof_rbg: u32,
        ue_db: &mut UeDb,
    ) -> Result<PolicyKind, SliceCtrlError> {
        let policy = PolicyKind::from_slice_name(&conf.sched_name)
            .ok_or_else(|| SliceCtrlError::UnsupportedPolicy(conf.sched_name.clone()))?;

        let count = conf.slices.len();
        if count == 0 || count >= MAX_NOF_SLICES {
            return Err(SliceCtrlError::UnsupportedSliceCount(count));
        }

        let mut table = BTreeMap::new();
        for s in &conf.slices {
            let (pos_low, pos_high) = match s.algo {
                SliceAlgoParams::Static { pos_low, pos_high } => (pos_low, pos_high),
                ref other => {
                    return Err(SliceCtrlError::UnsupportedAlgorithm {
                        id: s.id,
                        algo: other.name(),
                    })
                }
            };
            if pos_low > pos_high || pos_high > nof_rbg {
                return Err(SliceCtrlError::InvalidRbgRange {
                    id: s.id,
                    pos_low,
                    pos_high,
                    nof_rbg,
                });
            }
            let slice_policy = PolicyKind::from_slice_name(&s.sched)
                .ok_or_else(|| SliceCtrlError::UnsupportedPolicy(s.sched.clone()))?;
            let slice = Slice {
                id: s.id,
                label: s.label.clone(),
                policy: slice_policy,
                pos_low,
                pos_high,
            };
            if table.insert(s.id, slice).is_some() {
                return Err(SliceCtrlError::DuplicateSliceId(s.id));
            }
        }

        let first = conf.slices[0].id;
        self.policy = Some(policy);
        self.slices = table;
        self.default_id = Some(first);
        for (rnti, id) in self.ue_assoc.iter_mut() {
            *id = Some(first);
            if let Some(ue) = ue_db.get_mut(rnti) {
                ue.set_slice_id(Some(first));
            }
        }

        for s in self.slices.values() {
            info!(
                id = s.id,
                label = %s.label,
                pos_low = s.pos_low,
                pos_high = s.pos_high,
                "DL slice configured"
            );
        }
        info!(
            policy = policy.name(),
            nof_slices = self.slices.len(),
            default_slice = first,
            nof_ues = self.ue_assoc.len(),
            "slice table replaced"
        );
        Ok(policy)
    }

    /// Associate a batch of UEs with DL slices.  The batch is applied only if
    /// every entry is valid.
    pub fn ue_slice_conf(
        &mut self,
        ues: &[UeSliceAssoc],
        ue_db: &mut UeDb,
    ) -> Result<(), SliceCtrlError> {
        if !self.is_active() {
            return Err(SliceCtrlError::NoSliceAdded);
        }
        if ue_db.is_empty() {
            return Err(SliceCtrlError::NoUeConnected);
        }
        if ues.is_empty() {
            return Err(SliceCtrlError::EmptyAssociation);
        }

        // Staged view so that repeated RNTIs in one batch see earlier entries.
        let mut staged: BTreeMap<u16, u32> = BTreeMap::new();
        for assoc in ues {
            let rnti = assoc.rnti;
            if let Some(ul_id) = assoc.ul_id {
                warn!(rnti, ul_id, "ignoring UL slice association");
            }
            let ue = ue_db.get(&rnti).ok_or(SliceCtrlError::UnknownRnti(rnti))?;
            let current = staged.get(&rnti).copied().or(ue.slice_id());
            if current == Some(assoc.dl_id) {
                return Err(SliceCtrlError::AlreadyAssociated {
                    rnti,
                    id: assoc.dl_id,
                });
            }
            if !self.slices.contains_key(&assoc.dl_id) {
                return Err(SliceCtrlError::UnknownSlice(assoc.dl_id));
            }
            if !self.ue_assoc.contains_key(&rnti) {
                return Err(SliceCtrlError::NotInSliceTable(rnti));
            }
            staged.insert(rnti, assoc.dl_id);
        }

        for (rnti, id) in staged {
            if let Some(ue) = ue_db.get_mut(&rnti) {
                ue.set_slice_id(Some(id));
            }
            self.ue_assoc.insert(rnti, Some(id));
            info!(rnti, dl_id = id, "UE associated with DL slice");
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::SchedCellParams;
    use crate::config::{CellCfg, SchedArgs};
    use crate::ue::{SchedUe, UeCfg};
    use std::sync::Arc;

    fn static_slice(id: u32, lo: u32, hi: u32) -> FrSlice {
        FrSlice {
            id,
            label: format!("s{id}"),
            sched: "RR".into(),
            algo: SliceAlgoParams::Static {
                pos_low: lo,
                pos_high: hi,
            },
        }
    }

    fn two_slices() -> SliceConf {
        SliceConf {
            sched_name: "RR".into(),
            slices: vec![static_slice(0, 0, 7), static_slice(1, 7, 14)],
        }
    }

    fn ue_db(rntis: &[u16], reg: &mut SlicingRegistry) -> UeDb {
        let cell = SchedCellParams::set_cfg(
            0,
            &CellCfg {
                nof_prb: 40,
                ..Default::default()
            },
            &SchedArgs::default(),
        )
        .unwrap();
        let cells = vec![Arc::new(cell)];
        let mut db = UeDb::new();
        for &rnti in rntis {
            let mut ue = SchedUe::new(rnti, &cells, &UeCfg::default()).unwrap();
            ue.set_slice_id(reg.register_ue(rnti));
            db.insert(rnti, ue);
        }
        db
    }

    // ── add_mod ───────────────────────────────────────────────────────────────

    #[test]
    fn add_two_slices_over_14_rbgs() {
        let mut reg = SlicingRegistry::new();
        let mut db = ue_db(&[0x46, 0x47], &mut reg);
        assert_eq!(reg.add_mod(&two_slices(), 14, &mut db), Ok(PolicyKind::TimeRr));
        assert!(reg.is_active());
        assert_eq!(reg.slice(1).unwrap().pos_low, 7);
        // every tracked UE lands in the first slice
        assert_eq!(db[&0x46].slice_id(), Some(0));
        assert_eq!(reg.associations().collect::<Vec<_>>(), vec![(0x46, Some(0)), (0x47, Some(0))]);
    }

    #[test]
    fn rejected_table_leaves_state_unchanged() {
        let mut reg = SlicingRegistry::new();
        let mut db = ue_db(&[0x46], &mut reg);
        reg.add_mod(&two_slices(), 14, &mut db).unwrap();
        reg.ue_slice_conf(
            &[UeSliceAssoc {
                rnti: 0x46,
                dl_id: 1,
                ul_id: None,
            }],
            &mut db,
        )
        .unwrap();
        let before = reg.stats();

        let too_many = SliceConf {
            sched_name: "RR".into(),
            slices: (0..6).map(|i| static_slice(i, 0, 1)).collect(),
        };
        assert_eq!(
            reg.add_mod(&too_many, 14, &mut db),
            Err(SliceCtrlError::UnsupportedSliceCount(6))
        );

        let inverted = SliceConf {
            sched_name: "RR".into(),
            slices: vec![static_slice(0, 10, 5)],
        };
        assert!(matches!(
            reg.add_mod(&inverted, 14, &mut db),
            Err(SliceCtrlError::InvalidRbgRange { pos_low: 10, pos_high: 5, .. })
        ));

        assert_eq!(reg.stats(), before);
        assert_eq!(db[&0x46].slice_id(), Some(1));
    }

    #[test]
    fn add_mod_rejects_bad_requests() {
        let mut reg = SlicingRegistry::new();
        let mut db = UeDb::new();

        let mut conf = two_slices();
        conf.sched_name = "WFQ".into();
        assert_eq!(
            reg.add_mod(&conf, 14, &mut db),
            Err(SliceCtrlError::UnsupportedPolicy("WFQ".into()))
        );

        let empty = SliceConf {
            sched_name: "PF".into(),
            slices: vec![],
        };
        assert_eq!(
            reg.add_mod(&empty, 14, &mut db),
            Err(SliceCtrlError::UnsupportedSliceCount(0))
        );

        let mut nvs = two_slices();
        nvs.slices[1].algo = SliceAlgoParams::Nvs { capacity: 0.5 };
        assert_eq!(
            reg.add_mod(&nvs, 14, &mut db),
            Err(SliceCtrlError::UnsupportedAlgorithm { id: 1, algo: "nvs" })
        );

        let mut dup = two_slices();
        dup.slices[1].id = 0;
        assert_eq!(reg.add_mod(&dup, 14, &mut db), Err(SliceCtrlError::DuplicateSliceId(0)));

        assert!(matches!(
            reg.add_mod(&two_slices(), 13, &mut db),
            Err(SliceCtrlError::InvalidRbgRange { id: 1, .. })
        ));
        assert!(!reg.is_active());
    }

    // ── ue_slice_conf ─────────────────────────────────────────────────────────

    fn assoc(rnti: u16, dl_id: u32) -> UeSliceAssoc {
        UeSliceAssoc {
            rnti,
            dl_id,
            ul_id: None,
        }
    }

    #[test]
    fn association_requires_slice_table() {
        let mut reg = SlicingRegistry::new();
        let mut db = ue_db(&[0x46], &mut reg);
        assert_eq!(
            reg.ue_slice_conf(&[assoc(0x46, 1)], &mut db),
            Err(SliceCtrlError::NoSliceAdded)
        );
    }

    #[test]
    fn association_batch_is_all_or_nothing() {
        let mut reg = SlicingRegistry::new();
        let mut db = ue_db(&[0x46, 0x47], &mut reg);
        reg.add_mod(&two_slices(), 14, &mut db).unwrap();

        let batch = [assoc(0x46, 1), assoc(0x48, 1)];
        assert_eq!(
            reg.ue_slice_conf(&batch, &mut db),
            Err(SliceCtrlError::UnknownRnti(0x48))
        );
        assert_eq!(db[&0x46].slice_id(), Some(0));

        let batch = [assoc(0x46, 1), assoc(0x47, 9)];
        assert_eq!(reg.ue_slice_conf(&batch, &mut db), Err(SliceCtrlError::UnknownSlice(9)));
        assert_eq!(db[&0x46].slice_id(), Some(0));
    }

    #[test]
    fn association_to_current_slice_rejected() {
        let mut reg = SlicingRegistry::new();
        let mut db = ue_db(&[0x46], &mut reg);
        reg.add_mod(&two_slices(), 14, &mut db).unwrap();
        assert_eq!(
            reg.ue_slice_conf(&[assoc(0x46, 0)], &mut db),
            Err(SliceCtrlError::AlreadyAssociated { rnti: 0x46, id: 0 })
        );
    }

    #[test]
    fn association_updates_ue_and_table() {
        let mut reg = SlicingRegistry::new();
        let mut db = ue_db(&[0x46, 0x47], &mut reg);
        reg.add_mod(&two_slices(), 14, &mut db).unwrap();
        let ul = UeSliceAssoc {
            rnti: 0x47,
            dl_id: 1,
            ul_id: Some(3),
        };
        reg.ue_slice_conf(&[assoc(0x46, 1), ul], &mut db).unwrap();
        assert_eq!(db[&0x46].slice_id(), Some(1));
        assert_eq!(db[&0x47].slice_id(), Some(1));
        let stats = reg.stats();
        assert_eq!(stats.ues.len(), 2);
        assert!(stats.ues.iter().all(|u| u.dl_id == 1 && u.ul_id.is_none()));
    }

    #[test]
    fn association_needs_connected_ues_and_entries() {
        let mut reg = SlicingRegistry::new();
        let mut db = ue_db(&[0x46], &mut reg);
        reg.add_mod(&two_slices(), 14, &mut db).unwrap();
        assert_eq!(reg.ue_slice_conf(&[], &mut db), Err(SliceCtrlError::EmptyAssociation));
        let mut empty = UeDb::new();
        assert_eq!(
            reg.ue_slice_conf(&[assoc(0x46, 1)], &mut empty),
            Err(SliceCtrlError::NoUeConnected)
        );
    }

    #[test]
    fn untracked_ue_rejected() {
        let mut reg = SlicingRegistry::new();
        let mut db = ue_db(&[0x46], &mut reg);
        reg.add_mod(&two_slices(), 14, &mut db).unwrap();
        reg.remove_ue(0x46);
        assert_eq!(
            reg.ue_slice_conf(&[assoc(0x46, 1)], &mut db),
            Err(SliceCtrlError::NotInSliceTable(0x46))
        );
    }

    // ── confine ───────────────────────────────────────────────────────────────

    #[test]
    fn confine_blocks_rbgs_outside_slice() {
        let mut reg = SlicingRegistry::new();
        let mut db = UeDb::new();
        reg.add_mod(&two_slices(), 14, &mut db).unwrap();
        let free = RbgMask::new(14);
        let m = reg.confine(Some(1), free);
        assert_eq!(m.to_string(), "11111110000000");
        assert_eq!(reg.confine(None, free), free);
        assert_eq!(reg.confine(Some(7), free), free);
    }

    #[test]
    fn new_ue_joins_default_slice_when_active() {
        let mut reg = SlicingRegistry::new();
        assert_eq!(reg.register_ue(0x46), None);
        let mut db = UeDb::new();
        reg.add_mod(&two_slices(), 14, &mut db).unwrap();
        assert_eq!(reg.register_ue(0x47), Some(0));
    }
}
