// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::BTreeSet;

use tracing::warn;

use crate::roc::RocCookie;

/// Runtime suspend prevention held while a RoC is admitted.
///
/// Each admitted context takes the lock once and releases it once; an
/// unbalanced call is logged and ignored.
#[derive(Debug, Default)]
pub struct RuntimePmLock {
    holders: BTreeSet<RocCookie>,
    acquired: u64,
    released: u64,
}

impl RuntimePmLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prevent_suspend(&mut self, cookie: RocCookie) {
        if self.holders.insert(cookie) {
            self.acquired += 1;
        } else {
            warn!("roc {} already prevents suspend", cookie);
        }
    }

    pub fn allow_suspend(&mut self, cookie: RocCookie) {
        if self.holders.remove(&cookie) {
            self.released += 1;
        } else {
            warn!("roc {} does not hold the suspend lock", cookie);
        }
    }

    pub fn is_suspend_prevented(&self) -> bool {
        !self.holders.is_empty()
    }

    /// Lifetime acquire/release counts.
    pub fn counts(&self) -> (u64, u64) {
        (self.acquired, self.released)
    }
}
