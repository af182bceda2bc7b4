// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Controller task and the handle used to talk to it.
//!
//! Every mutation of a radio's P2P state happens on this task. Commands,
//! lower-layer events, scan events and timer expiries all arrive on one
//! unbounded channel and are handled one at a time, in order.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::controller::command::{MgmtTxRequest, P2pCommand, P2pReply, RocRequest};
use crate::controller::engine::ScanEvent;
use crate::controller::events::{ListenerId, P2pEvent, P2pListener};
use crate::controller::machine::P2pController;
use crate::controller::rendezvous::RendezvousWaiter;
use crate::controller::timer::{TimerTarget, TimerTicket};
use crate::error::{P2pError, P2pResult};
use crate::radio::{Channel, VdevId, VdevMode};
use crate::roc::{RocCookie, RocState, RocType};
use crate::tx::TxCookie;
use crate::DynResult;

/// A command plus the channel its outcome goes back on.
pub struct P2pRequest {
    pub cmd: P2pCommand,
    pub respond_to: oneshot::Sender<P2pResult<P2pReply>>,
}

/// Lifecycle and cleanup requests, internal to the handle.
pub enum ControlRequest {
    Start {
        listener: Arc<dyn P2pListener>,
        respond_to: oneshot::Sender<ListenerId>,
    },
    Stop {
        respond_to: oneshot::Sender<()>,
    },
    AttachVdev {
        vdev_id: VdevId,
        mode: VdevMode,
        respond_to: oneshot::Sender<P2pResult<()>>,
    },
    DetachVdev {
        vdev_id: VdevId,
        respond_to: oneshot::Sender<P2pResult<()>>,
    },
    BeginCleanup {
        vdev: Option<VdevId>,
        respond_to: oneshot::Sender<Vec<RocCookie>>,
    },
    CancelForCleanup {
        cookie: RocCookie,
        respond_to: oneshot::Sender<Option<RendezvousWaiter>>,
    },
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
}

/// Everything the controller task consumes.
pub enum P2pMessage {
    Request(P2pRequest),
    Event(P2pEvent),
    Scan(ScanEvent),
    TimerExpired(TimerTicket),
    Control(ControlRequest),
}

impl P2pMessage {
    /// Short description for logs.
    pub fn label(&self) -> String {
        match self {
            Self::Request(req) => format!("command {:?}", req.cmd.kind()),
            Self::Event(event) => format!("event {:?}", event.kind()),
            Self::Scan(event) => format!("scan {} {:?}", event.scan_id, event.kind),
            Self::TimerExpired(ticket) => match ticket.target {
                TimerTarget::Roc(cookie) => format!("roc {} timer", cookie),
                TimerTarget::TxAck(cookie) => format!("tx {} ack timer", cookie),
            },
            Self::Control(ctrl) => match ctrl {
                ControlRequest::Start { .. } => "start".to_string(),
                ControlRequest::Stop { .. } => "stop".to_string(),
                ControlRequest::AttachVdev { vdev_id, .. } => format!("attach vdev {}", vdev_id),
                ControlRequest::DetachVdev { vdev_id, .. } => format!("detach vdev {}", vdev_id),
                ControlRequest::BeginCleanup { vdev, .. } => format!("cleanup {:?}", vdev),
                ControlRequest::CancelForCleanup { cookie, .. } => {
                    format!("cleanup cancel roc {}", cookie)
                }
                ControlRequest::Shutdown { .. } => "shutdown".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RocEntrySnapshot {
    pub cookie: RocCookie,
    pub vdev_id: VdevId,
    pub chan: Channel,
    pub duration_ms: u64,
    pub state: RocState,
    pub roc_type: RocType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VdevSnapshot {
    pub vdev_id: VdevId,
    pub mode: VdevMode,
}

/// Read-only view of one radio, published after every message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct P2pSnapshot {
    pub started: bool,
    pub roc_queue: Vec<RocEntrySnapshot>,
    pub tx_wait_roc: usize,
    pub tx_wait_ack: usize,
    pub current_vdev: Option<VdevId>,
    pub suspend_prevented: bool,
    pub vdevs: Vec<VdevSnapshot>,
}

impl P2pSnapshot {
    /// The non-idle queue entry, if any.
    pub fn active(&self) -> Option<&RocEntrySnapshot> {
        self.roc_queue
            .iter()
            .find(|entry| entry.state != RocState::Idle)
    }
}

pub(crate) fn snapshot_from(controller: &P2pController) -> P2pSnapshot {
    P2pSnapshot {
        started: controller.is_started(),
        roc_queue: controller
            .roc_queue()
            .iter()
            .map(|(cookie, ctx)| RocEntrySnapshot {
                cookie,
                vdev_id: ctx.vdev_id,
                chan: ctx.chan,
                duration_ms: ctx.duration.as_millis() as u64,
                state: ctx.state,
                roc_type: ctx.roc_type,
            })
            .collect(),
        tx_wait_roc: controller.tx_queues().wait_roc_len(),
        tx_wait_ack: controller.tx_queues().wait_ack_len(),
        current_vdev: controller.current_vdev(),
        suspend_prevented: controller.pm().is_suspend_prevented(),
        vdevs: controller
            .vdevs()
            .map(|(vdev_id, entry)| VdevSnapshot {
                vdev_id,
                mode: entry.mode,
            })
            .collect(),
    }
}

/// Run the controller until a shutdown request arrives.
pub async fn run_p2p_task(
    mut controller: P2pController,
    mut rx: mpsc::UnboundedReceiver<P2pMessage>,
    snapshot_tx: watch::Sender<P2pSnapshot>,
) -> DynResult<()> {
    info!("P2P controller task running");
    snapshot_tx.send_replace(snapshot_from(&controller));

    while let Some(msg) = rx.recv().await {
        let label = msg.label();
        let started = Instant::now();

        let keep_running = handle_message(&mut controller, msg, &snapshot_tx);
        snapshot_tx.send_replace(snapshot_from(&controller));

        let elapsed = started.elapsed();
        if elapsed > Duration::from_millis(500) {
            warn!("P2P {} took {:?}", label, elapsed);
        } else {
            debug!("P2P {} completed in {:?}", label, elapsed);
        }
        if !keep_running {
            break;
        }
    }

    info!("P2P controller task shutting down");
    Ok(())
}

fn handle_message(
    controller: &mut P2pController,
    msg: P2pMessage,
    snapshot_tx: &watch::Sender<P2pSnapshot>,
) -> bool {
    match msg {
        P2pMessage::Request(P2pRequest { cmd, respond_to }) => {
            let result = controller.dispatch_command(cmd);
            // callers read the snapshot right after the reply
            snapshot_tx.send_replace(snapshot_from(controller));
            let _ = respond_to.send(result);
        }
        P2pMessage::Event(event) => {
            // failures are logged by the dispatcher
            let _ = controller.dispatch_event(event);
        }
        P2pMessage::Scan(event) => controller.handle_scan_event(event),
        P2pMessage::TimerExpired(ticket) => controller.handle_timer(ticket),
        P2pMessage::Control(ctrl) => return handle_control(controller, ctrl),
    }
    true
}

fn handle_control(controller: &mut P2pController, ctrl: ControlRequest) -> bool {
    match ctrl {
        ControlRequest::Start {
            listener,
            respond_to,
        } => {
            let _ = respond_to.send(controller.start(listener));
        }
        ControlRequest::Stop { respond_to } => {
            controller.stop();
            let _ = respond_to.send(());
        }
        ControlRequest::AttachVdev {
            vdev_id,
            mode,
            respond_to,
        } => {
            let _ = respond_to.send(controller.attach_vdev(vdev_id, mode));
        }
        ControlRequest::DetachVdev {
            vdev_id,
            respond_to,
        } => {
            let _ = respond_to.send(controller.detach_vdev(vdev_id));
        }
        ControlRequest::BeginCleanup { vdev, respond_to } => {
            let _ = respond_to.send(controller.begin_cleanup(vdev));
        }
        ControlRequest::CancelForCleanup { cookie, respond_to } => {
            let _ = respond_to.send(controller.cancel_for_cleanup(cookie));
        }
        ControlRequest::Shutdown { respond_to } => {
            controller.close();
            let _ = respond_to.send(());
            return false;
        }
    }
    true
}

/// Outcome of a cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Active contexts that tore down within the wait.
    pub canceled: usize,
    /// Active contexts whose teardown was not seen within the wait.
    pub timed_out: usize,
}

/// Cloneable handle to a running controller task.
#[derive(Clone)]
pub struct P2pHandle {
    tx: mpsc::UnboundedSender<P2pMessage>,
    snapshot_rx: watch::Receiver<P2pSnapshot>,
    cancel_wait: Duration,
}

impl P2pHandle {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<P2pMessage>,
        snapshot_rx: watch::Receiver<P2pSnapshot>,
        cancel_wait: Duration,
    ) -> Self {
        Self {
            tx,
            snapshot_rx,
            cancel_wait,
        }
    }

    async fn request(&self, cmd: P2pCommand) -> P2pResult<P2pReply> {
        let (respond_to, rx) = oneshot::channel();
        self.tx
            .send(P2pMessage::Request(P2pRequest { cmd, respond_to }))
            .map_err(|_| P2pError::Closed)?;
        rx.await.map_err(|_| P2pError::Closed)?
    }

    async fn control<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ControlRequest,
    ) -> P2pResult<T> {
        let (respond_to, rx) = oneshot::channel();
        self.tx
            .send(P2pMessage::Control(make(respond_to)))
            .map_err(|_| P2pError::Closed)?;
        rx.await.map_err(|_| P2pError::Closed)
    }

    pub async fn remain_on_channel(&self, req: RocRequest) -> P2pResult<RocCookie> {
        match self.request(P2pCommand::RocRequest(req)).await? {
            P2pReply::RocQueued(cookie) => Ok(cookie),
            other => Err(unexpected(other)),
        }
    }

    pub async fn cancel_remain_on_channel(&self, cookie: RocCookie) -> P2pResult<()> {
        match self.request(P2pCommand::CancelRoc(cookie)).await? {
            P2pReply::RocCancelled => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn mgmt_tx(&self, req: MgmtTxRequest) -> P2pResult<TxCookie> {
        match self.request(P2pCommand::MgmtTx(req)).await? {
            P2pReply::TxQueued(cookie) => Ok(cookie),
            other => Err(unexpected(other)),
        }
    }

    pub async fn mgmt_tx_cancel(&self, cookie: TxCookie) -> P2pResult<()> {
        match self.request(P2pCommand::MgmtTxCancel(cookie)).await? {
            P2pReply::TxCancelled => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn start(&self, listener: Arc<dyn P2pListener>) -> P2pResult<ListenerId> {
        self.control(|respond_to| ControlRequest::Start {
            listener,
            respond_to,
        })
        .await
    }

    pub async fn stop(&self) -> P2pResult<()> {
        self.control(|respond_to| ControlRequest::Stop { respond_to })
            .await
    }

    pub async fn attach_vdev(&self, vdev_id: VdevId, mode: VdevMode) -> P2pResult<()> {
        self.control(|respond_to| ControlRequest::AttachVdev {
            vdev_id,
            mode,
            respond_to,
        })
        .await?
    }

    pub async fn detach_vdev(&self, vdev_id: VdevId) -> P2pResult<()> {
        self.control(|respond_to| ControlRequest::DetachVdev {
            vdev_id,
            respond_to,
        })
        .await?
    }

    /// Tear down queued RoC contexts, all of them or only those of `vdev`.
    ///
    /// Idle contexts go at once. Each active one is cancelled and waited
    /// for, up to the policy's cancel wait.
    pub async fn cleanup(&self, vdev: Option<VdevId>) -> P2pResult<CleanupReport> {
        let pending = self
            .control(|respond_to| ControlRequest::BeginCleanup { vdev, respond_to })
            .await?;
        let mut report = CleanupReport::default();
        for cookie in pending {
            let waiter = self
                .control(|respond_to| ControlRequest::CancelForCleanup { cookie, respond_to })
                .await?;
            let Some(waiter) = waiter else {
                continue;
            };
            if waiter.wait(self.cancel_wait).await {
                report.canceled += 1;
            } else {
                warn!(
                    "roc {} not torn down within {:?}, continuing cleanup",
                    cookie, self.cancel_wait
                );
                report.timed_out += 1;
            }
        }
        debug!("cleanup {:?} done: {:?}", vdev, report);
        Ok(report)
    }

    /// Close the controller and stop its task.
    pub async fn shutdown(&self) -> P2pResult<()> {
        self.control(|respond_to| ControlRequest::Shutdown { respond_to })
            .await
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> P2pSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<P2pSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

fn unexpected(reply: P2pReply) -> P2pError {
    P2pError::invalid_state(format!("unexpected reply {:?}", reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Handle;

    #[test]
    fn test_labels() {
        let cookie = RocCookie(Handle::from_u64(0x1_0000_0002));
        let msg = P2pMessage::TimerExpired(TimerTicket {
            target: TimerTarget::Roc(cookie),
            seq: 4,
        });
        assert_eq!(msg.label(), format!("roc {} timer", cookie));

        let (respond_to, _rx) = oneshot::channel();
        let msg = P2pMessage::Control(ControlRequest::BeginCleanup {
            vdev: Some(1),
            respond_to,
        });
        assert_eq!(msg.label(), "cleanup Some(1)");
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = P2pSnapshot {
            started: true,
            roc_queue: vec![RocEntrySnapshot {
                cookie: RocCookie::from_u64(0x1_0000_0000),
                vdev_id: 0,
                chan: Channel::new(6).unwrap(),
                duration_ms: 1000,
                state: RocState::OnChannel,
                roc_type: RocType::UserRequested,
            }],
            current_vdev: Some(0),
            ..Default::default()
        };
        assert_eq!(snapshot.active().map(|e| e.vdev_id), Some(0));
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["roc_queue"][0]["state"], "on_channel");
        assert_eq!(json["roc_queue"][0]["roc_type"], "user_requested");
        assert_eq!(json["current_vdev"], 0);
    }

    #[tokio::test]
    async fn test_handle_reports_closed_task() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (_snapshot_tx, snapshot_rx) = watch::channel(P2pSnapshot::default());
        let handle = P2pHandle::new(tx, snapshot_rx, Duration::from_millis(10));
        drop(rx);
        assert!(handle.is_closed());
        assert_eq!(handle.stop().await, Err(P2pError::Closed));
    }
}
