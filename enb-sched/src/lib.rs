/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! LTE eNB MAC scheduler
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── tti          – 10240-periodic TTI arithmetic
//! ├── mask         – RBG / PRB bitmasks and intervals
//! ├── tbs          – CQI / MCS / TBS tables and link adaptation
//! ├── harq         – DL/UL HARQ processes
//! ├── cell         – per-carrier derived parameters
//! ├── config/      – YAML scheduler + slice-request files
//! ├── ue/          – UE context, logical channels, per-carrier state
//! ├── slicing/     – static RBG slicing registry
//! └── scheduler/   – coordinator, carrier schedulers, policies
//!     ├── carrier    – RAR / Msg3 / DL / UL pass per TTI
//!     ├── sf_sched   – one TTI's resource grid
//!     ├── alloc      – allocation helpers
//!     ├── policy/    – time_rr, time_pf
//!     ├── result     – result types and the per-TTI cache
//!     └── error      – error types
//! ```

pub mod cell;
pub mod config;
pub mod harq;
pub mod mask;
pub mod scheduler;
pub mod slicing;
pub mod tbs;
pub mod tti;
pub mod ue;

pub use scheduler::Scheduler;
