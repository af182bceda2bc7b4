// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! P2P controller components.
//!
//! This module contains the RoC admission state machine, the off-channel tx
//! path, the command/event dispatchers and the seams to the scan engine,
//! the management frame layer and the timer service.

pub mod command;
mod dispatch;
pub mod engine;
pub mod events;
pub mod machine;
mod offchan;
pub mod pm;
pub mod policies;
pub mod rendezvous;
pub mod timer;

#[cfg(test)]
pub(crate) mod testkit;

pub use command::{CommandKind, MgmtTxRequest, P2pCommand, P2pReply, RocRequest};
pub use engine::{
    ListenScanRequest, MgmtEventSender, MgmtFrameLayer, OutboundFrame, RequesterId, RxFrameType,
    ScanEngine, ScanEvent, ScanEventKind, ScanEventSender, ScanId, ScanPriority,
};
pub use events::{
    EventKind, ListenOffloadStopped, ListenerId, NoaDescriptor, NoaInfo, P2pEvent,
    P2pEventEmitter, P2pListener, RocEvent, RocEventKind, RxMgmtFrame, TxAckEvent,
    TxConfirmation,
};
pub use machine::{P2pController, VdevEntry};
pub use policies::RocPolicy;
pub use rendezvous::{CancelRendezvous, RendezvousWaiter};
pub use timer::{TimerService, TimerTarget, TimerTicket, TokioTimerService};
