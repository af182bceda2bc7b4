// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! One-shot timers that post their expiry back to the controller.
//!
//! Every arm gets a fresh [`TimerTicket`]. The controller remembers the
//! ticket it expects, so an expiry that raced with a stop or restart is
//! recognised as stale and dropped.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::roc::RocCookie;
use crate::task::P2pMessage;
use crate::tx::TxCookie;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerTarget {
    /// Listen period expiry.
    Roc(RocCookie),
    /// Tx ack wait expiry.
    TxAck(TxCookie),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerTicket {
    pub target: TimerTarget,
    pub seq: u64,
}

pub trait TimerService: Send {
    fn arm(&mut self, ticket: TimerTicket, after: Duration);

    /// Forget a ticket. Must be safe to call for tickets that already fired.
    fn disarm(&mut self, ticket: TimerTicket);
}

/// Timer service backed by tokio sleeps.
pub struct TokioTimerService {
    sink: mpsc::UnboundedSender<P2pMessage>,
    armed: HashMap<TimerTicket, AbortHandle>,
}

impl TokioTimerService {
    pub fn new(sink: mpsc::UnboundedSender<P2pMessage>) -> Self {
        Self {
            sink,
            armed: HashMap::new(),
        }
    }

    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }
}

impl TimerService for TokioTimerService {
    fn arm(&mut self, ticket: TimerTicket, after: Duration) {
        let sink = self.sink.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = sink.send(P2pMessage::TimerExpired(ticket));
        });
        if let Some(old) = self.armed.insert(ticket, task.abort_handle()) {
            old.abort();
        }
    }

    fn disarm(&mut self, ticket: TimerTicket) {
        if let Some(handle) = self.armed.remove(&ticket) {
            handle.abort();
        } else {
            debug!("timer {:?} not armed", ticket.target);
        }
    }
}

impl Drop for TokioTimerService {
    fn drop(&mut self) {
        for (_, handle) in self.armed.drain() {
            handle.abort();
        }
    }
}
