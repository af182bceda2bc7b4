// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod channel;
pub mod vdev;

pub use channel::{Channel, PhyMode};
pub use vdev::{VdevId, VdevMode};
