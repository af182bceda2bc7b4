// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! RoC scheduling policy.
//!
//! Tunables controlling how long the radio stays off-channel, how long
//! callers wait for teardown, and how long off-channel tx waits for acks.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing and sizing policy for the RoC scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RocPolicy {
    /// Duration multiplier when a P2P GO is active on the radio.
    pub go_present_multiplier: u32,
    /// Duration multiplier when no P2P GO is active.
    pub go_absent_multiplier: u32,
    /// Allowance added to the expiry timer for event propagation (ms).
    pub propagate_time_ms: u64,
    /// Bounded wait for one cancellation during cleanup (ms).
    pub cancel_wait_ms: u64,
    /// Maximum number of queued RoC contexts per radio.
    pub max_queue_len: usize,
    /// Default wait for a peer response to an action frame (ms).
    pub action_default_wait_ms: u64,
    /// Extra wait after sending a response frame (ms).
    pub action_rsp_wait_ms: u64,
    /// Extra wait after sending a confirm or invitation response (ms).
    pub action_ack_wait_ms: u64,
    /// Time to wait for a tx ack before failing the frame (ms).
    pub tx_ack_timeout_ms: u64,
}

impl RocPolicy {
    /// Policy matching the firmware's expected listen timings.
    pub fn default_p2p() -> Self {
        Self {
            go_present_multiplier: 2,
            go_absent_multiplier: 5,
            propagate_time_ms: 10,
            cancel_wait_ms: 1000,
            max_queue_len: 20,
            action_default_wait_ms: 200,
            action_rsp_wait_ms: 500,
            action_ack_wait_ms: 300,
            tx_ack_timeout_ms: 2000,
        }
    }

    /// Multiplier applied to the requested duration at admission.
    pub fn duration_multiplier(&self, go_present: bool) -> u32 {
        if go_present {
            self.go_present_multiplier
        } else {
            self.go_absent_multiplier
        }
    }

    pub fn propagate_time(&self) -> Duration {
        Duration::from_millis(self.propagate_time_ms)
    }

    pub fn cancel_wait(&self) -> Duration {
        Duration::from_millis(self.cancel_wait_ms)
    }

    pub fn action_default_wait(&self) -> Duration {
        Duration::from_millis(self.action_default_wait_ms)
    }

    pub fn action_rsp_wait(&self) -> Duration {
        Duration::from_millis(self.action_rsp_wait_ms)
    }

    pub fn action_ack_wait(&self) -> Duration {
        Duration::from_millis(self.action_ack_wait_ms)
    }

    pub fn tx_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.tx_ack_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.go_present_multiplier == 0 || self.go_absent_multiplier == 0 {
            return Err("duration multipliers must be > 0".to_string());
        }
        if self.max_queue_len == 0 {
            return Err("max_queue_len must be > 0".to_string());
        }
        if self.cancel_wait_ms == 0 {
            return Err("cancel_wait_ms must be > 0".to_string());
        }
        if self.tx_ack_timeout_ms == 0 {
            return Err("tx_ack_timeout_ms must be > 0".to_string());
        }
        Ok(())
    }
}

impl Default for RocPolicy {
    fn default() -> Self {
        Self::default_p2p()
    }
}
