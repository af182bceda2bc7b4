// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::arena::Handle;
use crate::controller::engine::ScanId;
use crate::controller::timer::TimerTicket;
use crate::radio::{Channel, PhyMode, VdevId};
use crate::tx::TxCookie;

/// Opaque identifier of a RoC context, handed back to the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RocCookie(pub(crate) Handle);

impl RocCookie {
    pub fn to_u64(self) -> u64 {
        self.0.to_u64()
    }

    pub fn from_u64(raw: u64) -> Self {
        Self(Handle::from_u64(raw))
    }
}

impl fmt::Display for RocCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Serialize for RocCookie {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.to_u64())
    }
}

/// Why the radio is going off-channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RocType {
    /// Explicit listen request from the upper layer.
    UserRequested,
    /// Implicit listen so a queued management frame can go out.
    OffChannelTx,
}

/// Lifecycle of one RoC context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RocState {
    /// Queued, not yet handed to the scan engine.
    #[default]
    Idle,
    /// Listen scan requested.
    Requested,
    /// Scan engine acknowledged the scan.
    Started,
    /// Radio is parked on the target channel.
    OnChannel,
    /// Abort sent, waiting for the terminal scan event.
    CancelInProgress,
}

impl fmt::Display for RocState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Requested => "Requested",
            Self::Started => "Started",
            Self::OnChannel => "OnChannel",
            Self::CancelInProgress => "CancelInProgress",
        };
        f.write_str(name)
    }
}

/// Expiry timer of a RoC context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RocTimer {
    #[default]
    Uninit,
    /// Prepared at admission, not counting down.
    Ready,
    Running(TimerTicket),
}

impl RocTimer {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running(_))
    }
}

/// One request to park the radio on a channel for a bounded time.
#[derive(Debug, Clone)]
pub struct RocContext {
    pub vdev_id: VdevId,
    pub chan: Channel,
    pub phy_mode: PhyMode,
    /// Listen time. Scaled by the GO multiplier at admission.
    pub duration: Duration,
    pub roc_type: RocType,
    pub state: RocState,
    pub scan_id: Option<ScanId>,
    /// Paired frame for off-channel tx contexts.
    pub tx: Option<TxCookie>,
    pub timer: RocTimer,
    /// Set once the ready-on-channel notification went out.
    pub ready_sent: bool,
}

impl RocContext {
    pub fn user_requested(
        vdev_id: VdevId,
        chan: Channel,
        phy_mode: PhyMode,
        duration: Duration,
    ) -> Self {
        Self {
            vdev_id,
            chan,
            phy_mode,
            duration,
            roc_type: RocType::UserRequested,
            state: RocState::Idle,
            scan_id: None,
            tx: None,
            timer: RocTimer::Uninit,
            ready_sent: false,
        }
    }

    pub fn for_tx(vdev_id: VdevId, chan: Channel, duration: Duration, tx: TxCookie) -> Self {
        Self {
            roc_type: RocType::OffChannelTx,
            tx: Some(tx),
            ..Self::user_requested(vdev_id, chan, PhyMode::Auto, duration)
        }
    }

    pub fn is_user_requested(&self) -> bool {
        self.roc_type == RocType::UserRequested
    }

    pub fn is_idle(&self) -> bool {
        self.state == RocState::Idle
    }
}

impl fmt::Display for RocContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "vdev:{} scan:{} chan:{} phy:{:?} duration:{:?} type:{:?} state:{}",
            self.vdev_id,
            self.scan_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
            self.chan,
            self.phy_mode,
            self.duration,
            self.roc_type,
            self.state,
        )?;
        if let Some(tx) = self.tx {
            write!(f, " tx:{}", tx)?;
        }
        Ok(())
    }
}
