// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Inbound lower-layer events and outbound upper-layer notifications.
//!
//! Listeners registered at start receive RoC, rx, tx-confirmation and
//! listen-offload notifications. All methods have default no-op
//! implementations so a listener only overrides what it consumes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use crate::error::{P2pError, P2pResult};
use crate::radio::{Channel, VdevId};
use crate::roc::RocCookie;
use crate::tx::TxCookie;

use super::engine::RxFrameType;

/// Unique identifier for a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RocEventKind {
    ReadyOnChannel,
    Completed,
}

/// Notification about a user-requested RoC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RocEvent {
    pub vdev_id: VdevId,
    pub kind: RocEventKind,
    pub cookie: RocCookie,
    pub chan: Channel,
    pub duration_ms: u64,
}

/// Final outcome of a management tx request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxConfirmation {
    pub vdev_id: VdevId,
    /// `None` for frames sent without waiting for an ack.
    pub cookie: Option<TxCookie>,
    pub acked: bool,
    pub frame: Bytes,
}

/// Ack report from the mgmt layer for a frame sent with `no_ack == false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxAckEvent {
    pub cookie: TxCookie,
    pub acked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxMgmtFrame {
    pub vdev_id: VdevId,
    pub rx_chan: Channel,
    pub frame_type: RxFrameType,
    pub rssi: i8,
    pub frame: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenOffloadStopped {
    pub vdev_id: VdevId,
    pub reason_code: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NoaDescriptor {
    pub type_count: u8,
    pub duration_us: u32,
    pub interval_us: u32,
    pub start_time: u32,
}

/// Notice-of-absence schedule reported by firmware for a GO interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoaInfo {
    pub vdev_id: VdevId,
    pub index: u8,
    pub opp_ps: bool,
    pub ct_window: u8,
    pub descriptors: Vec<NoaDescriptor>,
}

/// Raw event tags as delivered by the lower layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    MgmtTxAckConfirmation,
    RxMgmt,
    ListenOffloadStopped,
    NoticeOfAbsence,
}

impl TryFrom<u32> for EventKind {
    type Error = P2pError;

    fn try_from(value: u32) -> P2pResult<Self> {
        match value {
            0 => Ok(Self::MgmtTxAckConfirmation),
            1 => Ok(Self::RxMgmt),
            2 => Ok(Self::ListenOffloadStopped),
            3 => Ok(Self::NoticeOfAbsence),
            other => Err(P2pError::invalid_argument(format!(
                "unknown event tag {}",
                other
            ))),
        }
    }
}

/// Events routed through the event dispatcher.
#[derive(Debug, Clone)]
pub enum P2pEvent {
    MgmtTxAckConfirmation(TxAckEvent),
    RxMgmt(RxMgmtFrame),
    ListenOffloadStopped(ListenOffloadStopped),
    NoticeOfAbsence(NoaInfo),
}

impl P2pEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::MgmtTxAckConfirmation(_) => EventKind::MgmtTxAckConfirmation,
            Self::RxMgmt(_) => EventKind::RxMgmt,
            Self::ListenOffloadStopped(_) => EventKind::ListenOffloadStopped,
            Self::NoticeOfAbsence(_) => EventKind::NoticeOfAbsence,
        }
    }
}

/// Trait for components that want to receive P2P notifications.
pub trait P2pListener: Send + Sync {
    /// Called for ready-on-channel and completed notifications.
    fn on_roc_event(&self, _event: &RocEvent) {}

    /// Called for every management frame forwarded to the upper layer.
    fn on_rx_mgmt(&self, _frame: &RxMgmtFrame) {}

    /// Called once per management tx request with its final outcome.
    fn on_tx_confirm(&self, _conf: &TxConfirmation) {}

    /// Called when firmware stops a listen offload session.
    fn on_listen_offload_stopped(&self, _info: &ListenOffloadStopped) {}
}

/// Manages registered listeners and dispatches notifications.
pub struct P2pEventEmitter {
    listeners: Vec<(ListenerId, Arc<dyn P2pListener>)>,
}

impl Default for P2pEventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl P2pEventEmitter {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Register a listener to receive events.
    /// Returns an ID that can be used to unregister the listener.
    pub fn register(&mut self, listener: Arc<dyn P2pListener>) -> ListenerId {
        let id = ListenerId::new();
        self.listeners.push((id, listener));
        id
    }

    pub fn unregister(&mut self, id: ListenerId) {
        self.listeners.retain(|(lid, _)| *lid != id);
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn notify_roc_event(&self, event: &RocEvent) {
        for (_, listener) in &self.listeners {
            listener.on_roc_event(event);
        }
    }

    pub fn notify_rx_mgmt(&self, frame: &RxMgmtFrame) {
        for (_, listener) in &self.listeners {
            listener.on_rx_mgmt(frame);
        }
    }

    pub fn notify_tx_confirm(&self, conf: &TxConfirmation) {
        for (_, listener) in &self.listeners {
            listener.on_tx_confirm(conf);
        }
    }

    pub fn notify_listen_offload_stopped(&self, info: &ListenOffloadStopped) {
        for (_, listener) in &self.listeners {
            listener.on_listen_offload_stopped(info);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingListener {
        roc_events: AtomicUsize,
        lo_events: AtomicUsize,
    }

    impl P2pListener for CountingListener {
        fn on_roc_event(&self, _event: &RocEvent) {
            self.roc_events.fetch_add(1, Ordering::SeqCst);
        }

        fn on_listen_offload_stopped(&self, _info: &ListenOffloadStopped) {
            self.lo_events.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn roc_event() -> RocEvent {
        RocEvent {
            vdev_id: 0,
            kind: RocEventKind::ReadyOnChannel,
            cookie: RocCookie::from_u64(0x1_0000_0000),
            chan: Channel::new(6).unwrap(),
            duration_ms: 1000,
        }
    }

    #[test]
    fn test_register_and_notify() {
        let mut emitter = P2pEventEmitter::new();
        let listener = Arc::new(CountingListener::default());
        let id = emitter.register(listener.clone());
        assert_eq!(emitter.listener_count(), 1);

        emitter.notify_roc_event(&roc_event());
        emitter.notify_listen_offload_stopped(&ListenOffloadStopped {
            vdev_id: 0,
            reason_code: 2,
        });
        assert_eq!(listener.roc_events.load(Ordering::SeqCst), 1);
        assert_eq!(listener.lo_events.load(Ordering::SeqCst), 1);

        emitter.unregister(id);
        emitter.notify_roc_event(&roc_event());
        assert_eq!(listener.roc_events.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_default_methods_are_noops() {
        struct Silent;
        impl P2pListener for Silent {}

        let mut emitter = P2pEventEmitter::new();
        emitter.register(Arc::new(Silent));
        emitter.notify_roc_event(&roc_event());
        emitter.clear();
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn test_event_tags() {
        assert_eq!(EventKind::try_from(1).unwrap(), EventKind::RxMgmt);
        assert!(matches!(
            EventKind::try_from(9),
            Err(P2pError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_roc_event_serializes_cookie_as_integer() {
        let json = serde_json::to_value(roc_event()).unwrap();
        assert_eq!(json["cookie"], 0x1_0000_0000u64);
        assert_eq!(json["kind"], "ready_on_channel");
        assert_eq!(json["chan"], 6);
    }
}
