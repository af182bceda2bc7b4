// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Remain-on-channel contexts and the per-radio admission queue.

pub mod context;
pub mod queue;

pub use context::{RocContext, RocCookie, RocState, RocTimer, RocType};
pub use queue::RocQueue;
