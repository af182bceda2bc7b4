// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::time::Duration;

use bytes::Bytes;

use crate::error::{P2pError, P2pResult};
use crate::radio::{Channel, PhyMode, VdevId};
use crate::roc::RocCookie;
use crate::tx::TxCookie;

/// Upper-layer request to listen on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RocRequest {
    pub vdev_id: VdevId,
    pub chan: Channel,
    pub phy_mode: PhyMode,
    pub duration: Duration,
}

impl RocRequest {
    pub fn new(vdev_id: VdevId, chan: Channel, duration: Duration) -> Self {
        Self {
            vdev_id,
            chan,
            phy_mode: PhyMode::Auto,
            duration,
        }
    }
}

/// Upper-layer request to send a management frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MgmtTxRequest {
    pub vdev_id: VdevId,
    pub chan: Channel,
    /// How long to stay on channel for the exchange when off-channel.
    pub wait: Duration,
    pub off_chan: bool,
    pub no_cck: bool,
    pub no_ack: bool,
    pub frame: Bytes,
}

/// Raw command tags as delivered by the upper layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    RocRequest,
    CancelRoc,
    MgmtTx,
    MgmtTxCancel,
}

impl TryFrom<u32> for CommandKind {
    type Error = P2pError;

    fn try_from(value: u32) -> P2pResult<Self> {
        match value {
            0 => Ok(Self::RocRequest),
            1 => Ok(Self::CancelRoc),
            2 => Ok(Self::MgmtTx),
            3 => Ok(Self::MgmtTxCancel),
            other => Err(P2pError::invalid_argument(format!(
                "unknown command tag {}",
                other
            ))),
        }
    }
}

/// Commands routed through the command dispatcher.
#[derive(Debug, Clone)]
pub enum P2pCommand {
    RocRequest(RocRequest),
    CancelRoc(RocCookie),
    MgmtTx(MgmtTxRequest),
    MgmtTxCancel(TxCookie),
}

impl P2pCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::RocRequest(_) => CommandKind::RocRequest,
            Self::CancelRoc(_) => CommandKind::CancelRoc,
            Self::MgmtTx(_) => CommandKind::MgmtTx,
            Self::MgmtTxCancel(_) => CommandKind::MgmtTxCancel,
        }
    }
}

/// Successful outcome of a dispatched command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum P2pReply {
    RocQueued(RocCookie),
    RocCancelled,
    TxQueued(TxCookie),
    TxCancelled,
}
