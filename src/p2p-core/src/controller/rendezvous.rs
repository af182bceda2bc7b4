// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Binary signal a cleanup caller blocks on until the active RoC has torn
//! down. Reset when a cancellation starts, set by the completion path.

use std::time::Duration;

use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct CancelRendezvous {
    signal: watch::Sender<bool>,
}

impl Default for CancelRendezvous {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelRendezvous {
    pub fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self { signal }
    }

    pub fn reset(&self) {
        self.signal.send_replace(false);
    }

    pub fn set(&self) {
        self.signal.send_replace(true);
    }

    pub fn is_set(&self) -> bool {
        *self.signal.borrow()
    }

    pub fn waiter(&self) -> RendezvousWaiter {
        RendezvousWaiter {
            rx: self.signal.subscribe(),
        }
    }
}

#[derive(Debug)]
pub struct RendezvousWaiter {
    rx: watch::Receiver<bool>,
}

impl RendezvousWaiter {
    /// Wait until the signal is set. Returns `false` on timeout.
    pub async fn wait(mut self, timeout: Duration) -> bool {
        matches!(
            tokio::time::timeout(timeout, self.rx.wait_for(|set| *set)).await,
            Ok(Ok(_))
        )
    }
}
