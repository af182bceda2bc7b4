// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Collaborator seams: the scan engine that parks the radio and the
//! management frame layer that moves frames on and off the air.
//!
//! Both are handed a typed sender at open time and report back by posting
//! messages to the controller task, never by calling into it.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::controller::events::P2pEvent;
use crate::error::{P2pError, P2pResult};
use crate::radio::{Channel, VdevId};
use crate::task::P2pMessage;
use crate::tx::TxCookie;

/// Scan identifier allocated by the scan engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScanId(pub u32);

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registration token for a scan event consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequesterId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPriority {
    Low,
    Medium,
    High,
}

/// Single-channel passive listen scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenScanRequest {
    pub requester: RequesterId,
    pub vdev_id: VdevId,
    pub chan: Channel,
    pub dwell: Duration,
    pub priority: ScanPriority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEventKind {
    Started,
    ForeignChannel,
    BssChannel,
    Completed,
    Dequeued,
    StartFailed,
}

impl ScanEventKind {
    /// Events after which the engine no longer owns the scan.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Dequeued | Self::StartFailed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEvent {
    pub requester: RequesterId,
    pub vdev_id: VdevId,
    pub scan_id: ScanId,
    pub kind: ScanEventKind,
}

/// Typed channel a scan engine uses to report events for one requester.
#[derive(Debug, Clone)]
pub struct ScanEventSender {
    tx: mpsc::UnboundedSender<P2pMessage>,
}

impl ScanEventSender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<P2pMessage>) -> Self {
        Self { tx }
    }

    pub fn send(&self, event: ScanEvent) -> P2pResult<()> {
        self.tx
            .send(P2pMessage::Scan(event))
            .map_err(|_| P2pError::Closed)
    }
}

/// Abstract scan engine.
pub trait ScanEngine: Send {
    /// Register an event consumer. Events for scans started under the
    /// returned id are posted to `events`.
    fn register_requester(&mut self, name: &str, events: ScanEventSender)
        -> P2pResult<RequesterId>;

    fn unregister_requester(&mut self, requester: RequesterId);

    fn start(&mut self, req: ListenScanRequest) -> P2pResult<ScanId>;

    /// Abort one scan. The engine reports a terminal event once the radio
    /// is back.
    fn cancel(&mut self, requester: RequesterId, vdev_id: VdevId, scan_id: ScanId)
        -> P2pResult<()>;
}

/// Frame classes the P2P component can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RxFrameType {
    ProbeReq,
    ActionVendorSpecific,
    ActionCategoryVendorSpecific,
}

pub const ACTION_RX_TYPES: [RxFrameType; 2] = [
    RxFrameType::ActionVendorSpecific,
    RxFrameType::ActionCategoryVendorSpecific,
];

/// Frame handed to the mgmt layer for transmission.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    pub cookie: TxCookie,
    pub vdev_id: VdevId,
    pub chan: Channel,
    pub freq_mhz: u32,
    pub no_cck: bool,
    /// Completion is reported on download instead of over-the-air ack.
    pub no_ack: bool,
    pub frame: Bytes,
}

/// Typed channel the mgmt layer uses to post acks, received frames and
/// firmware notifications.
#[derive(Debug, Clone)]
pub struct MgmtEventSender {
    tx: mpsc::UnboundedSender<P2pMessage>,
}

impl MgmtEventSender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<P2pMessage>) -> Self {
        Self { tx }
    }

    pub fn send(&self, event: P2pEvent) -> P2pResult<()> {
        self.tx
            .send(P2pMessage::Event(event))
            .map_err(|_| P2pError::Closed)
    }
}

/// Abstract management frame tx/rx layer.
pub trait MgmtFrameLayer: Send {
    fn connect(&mut self, events: MgmtEventSender);

    fn disconnect(&mut self) {}

    fn register_rx(&mut self, types: &[RxFrameType]) -> P2pResult<()>;

    fn deregister_rx(&mut self, types: &[RxFrameType]) -> P2pResult<()>;

    fn transmit(&mut self, frame: OutboundFrame) -> P2pResult<()>;
}
