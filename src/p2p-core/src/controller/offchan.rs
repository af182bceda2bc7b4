// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Management frame tx, on and off channel.
//!
//! Off-channel frames either piggyback on the active RoC when it already
//! sits on the right channel, or get a RoC of their own and wait parked
//! until it reaches the channel. Every tx request ends in exactly one
//! confirmation to the listener.

use tracing::{debug, error, warn};

use crate::error::{P2pError, P2pResult};
use crate::frame::{FrameInfo, MgmtSubtype};
use crate::roc::{RocContext, RocCookie, RocState};
use crate::tx::{TxContext, TxCookie, TxLocation};

use super::command::MgmtTxRequest;
use super::engine::{OutboundFrame, RxFrameType};
use super::events::{RxMgmtFrame, TxAckEvent, TxConfirmation};
use super::machine::P2pController;
use super::timer::{TimerTarget, TimerTicket};

impl P2pController {
    pub fn process_mgmt_tx(&mut self, req: MgmtTxRequest) -> P2pResult<TxCookie> {
        if req.frame.is_empty() {
            return Err(self.reject_tx(&req, P2pError::invalid_argument("empty tx frame")));
        }
        let frame_info = match FrameInfo::parse(&req.frame) {
            Ok(info) => info,
            Err(e) => return Err(self.reject_tx(&req, e)),
        };
        if frame_info.subtype == MgmtSubtype::ProbeReq {
            let err = P2pError::invalid_argument("probe requests are not sent through p2p");
            return Err(self.reject_tx(&req, err));
        }
        let mode = match self.check_vdev(req.vdev_id) {
            Ok(entry) => entry.mode,
            Err(e) => return Err(self.reject_tx(&req, e)),
        };
        if frame_info.subtype == MgmtSubtype::ProbeRsp && mode.drops_probe_response() {
            let err = P2pError::invalid_argument(format!(
                "probe response dropped on {:?} vdev {}",
                mode, req.vdev_id
            ));
            return Err(self.reject_tx(&req, err));
        }

        let mut wait = req.wait;
        if req.off_chan && wait.is_zero() {
            wait = self.policy.action_default_wait();
        }
        wait += frame_info.tx_wait_adjustment(&self.policy);

        let ctx = TxContext {
            vdev_id: req.vdev_id,
            chan: req.chan,
            no_ack: req.no_ack || frame_info.subtype == MgmtSubtype::ProbeRsp,
            frame: req.frame,
            frame_info,
            off_chan: req.off_chan,
            no_cck: req.no_cck,
            wait,
            roc: None,
            ack_timer: None,
        };
        debug!("mgmt tx: {}", ctx);
        let (vdev_id, chan, off_chan) = (ctx.vdev_id, ctx.chan, ctx.off_chan);
        let cookie = self.tx_queues.insert(ctx);

        if !off_chan {
            if let Err(e) = self.execute_tx(cookie) {
                return Err(self.fail_tx(cookie, e));
            }
            return Ok(cookie);
        }

        let on_channel = self.roc_queue.current().filter(|roc| {
            self.roc_queue
                .get(*roc)
                .is_some_and(|c| c.chan == chan && c.state == RocState::OnChannel)
        });
        if let Some(roc) = on_channel {
            debug!("tx {} rides on roc {}", cookie, roc);
            if let Some(roc_ctx) = self.roc_queue.get_mut(roc) {
                roc_ctx.duration = roc_ctx.duration.max(wait);
            }
            if let Err(e) = self.restart_roc_timer(roc) {
                return Err(self.fail_tx(cookie, e));
            }
            if let Err(e) = self.execute_tx(cookie) {
                return Err(self.fail_tx(cookie, e));
            }
            return Ok(cookie);
        }

        match self.admit(RocContext::for_tx(vdev_id, chan, wait, cookie)) {
            Ok(roc) => {
                if let Some(ctx) = self.tx_queues.get_mut(cookie) {
                    ctx.roc = Some(roc);
                }
                self.tx_queues.park_for_roc(cookie);
                debug!("tx {} waits for roc {}", cookie, roc);
                Ok(cookie)
            }
            Err(e) => Err(self.fail_tx(cookie, e)),
        }
    }

    /// Hand a frame to the mgmt layer and track its completion.
    fn execute_tx(&mut self, cookie: TxCookie) -> P2pResult<()> {
        let ctx = self
            .tx_queues
            .get(cookie)
            .ok_or_else(|| P2pError::not_found(format!("tx {} not queued", cookie)))?;
        let no_ack = ctx.no_ack;
        let frame = OutboundFrame {
            cookie,
            vdev_id: ctx.vdev_id,
            chan: ctx.chan,
            freq_mhz: ctx.chan.freq_mhz(),
            no_cck: ctx.no_cck,
            no_ack,
            frame: ctx.frame.clone(),
        };
        self.mgmt.transmit(frame)?;

        if no_ack {
            if let Some(ctx) = self.tx_queues.remove(cookie) {
                self.send_tx_conf(cookie, &ctx, true);
            }
            return Ok(());
        }
        let ticket = self.next_ticket(TimerTarget::TxAck(cookie));
        self.timers.arm(ticket, self.policy.tx_ack_timeout());
        if let Some(ctx) = self.tx_queues.get_mut(cookie) {
            ctx.ack_timer = Some(ticket);
        }
        self.tx_queues.move_to_ack(cookie);
        debug!("tx {} sent, waiting for ack", cookie);
        Ok(())
    }

    /// Send the frame parked on a tx-triggered RoC that just reached its
    /// channel.
    pub(super) fn ready_to_tx_frame(&mut self, roc: RocCookie) {
        match self.tx_queues.find_by_roc(roc) {
            Some((tx, TxLocation::WaitRoc)) => {
                if let Err(e) = self.execute_tx(tx) {
                    error!("failed to send tx {} on roc {}: {}", tx, roc, e);
                    let _ = self.fail_tx(tx, e);
                }
            }
            Some((tx, location)) => debug!("tx {} for roc {} already {:?}", tx, roc, location),
            None => warn!("roc {} on channel without a parked tx", roc),
        }
    }

    /// Fail the tx still parked on a RoC that is going away.
    pub(super) fn release_tx_for_roc(&mut self, roc_ctx: &RocContext) {
        let Some(tx) = roc_ctx.tx else {
            return;
        };
        if self.tx_queues.locate(tx) == Some(TxLocation::WaitRoc) {
            debug!("roc for tx {} ended before the frame went out", tx);
            let _ = self.fail_tx(tx, P2pError::invalid_state("roc ended before tx"));
        }
    }

    pub(super) fn on_tx_ack_timeout(&mut self, cookie: TxCookie, ticket: TimerTicket) {
        let armed = self.tx_queues.get(cookie).and_then(|ctx| ctx.ack_timer);
        if armed != Some(ticket) {
            debug!("stale ack timer for tx {}", cookie);
            return;
        }
        warn!("tx {} not acked in {:?}", cookie, self.policy.tx_ack_timeout());
        let _ = self.fail_tx(cookie, P2pError::invalid_state("tx ack timeout"));
    }

    pub fn process_tx_ack(&mut self, ack: TxAckEvent) -> P2pResult<()> {
        if self.tx_queues.locate(ack.cookie) != Some(TxLocation::WaitAck) {
            warn!("ack for unknown tx {}", ack.cookie);
            return Err(P2pError::not_found(format!(
                "tx {} not waiting for ack",
                ack.cookie
            )));
        }
        if let Some(ctx) = self.tx_queues.remove(ack.cookie) {
            if let Some(ticket) = ctx.ack_timer {
                self.timers.disarm(ticket);
            }
            debug!("tx {} acked: {}", ack.cookie, ack.acked);
            self.send_tx_conf(ack.cookie, &ctx, ack.acked);
        }
        Ok(())
    }

    pub fn process_mgmt_tx_cancel(&mut self, cookie: TxCookie) -> P2pResult<()> {
        match self.tx_queues.locate(cookie) {
            Some(TxLocation::WaitRoc) => {
                let roc = self
                    .tx_queues
                    .get(cookie)
                    .and_then(|ctx| ctx.roc)
                    .ok_or_else(|| P2pError::not_found(format!("tx {} has no roc", cookie)))?;
                debug!("cancelling roc {} of parked tx {}", roc, cookie);
                self.process_cancel_roc_req(roc)
            }
            Some(location) => {
                debug!("tx {} is {:?}, nothing to cancel", cookie, location);
                Ok(())
            }
            None => Err(P2pError::not_found(format!("tx {} not queued", cookie))),
        }
    }

    pub fn process_rx_mgmt(&mut self, frame: RxMgmtFrame) -> P2pResult<()> {
        match frame.frame_type {
            RxFrameType::ActionVendorSpecific => match FrameInfo::parse(&frame.frame) {
                Ok(info) if info.is_p2p() => {
                    debug!("rx {} on vdev {} chan {}", info, frame.vdev_id, frame.rx_chan);
                    self.extend_roc_timer(&info);
                }
                Ok(info) => {
                    debug!("dropping {}", info);
                    return Ok(());
                }
                Err(e) => {
                    debug!("dropping unparsable action frame: {}", e);
                    return Ok(());
                }
            },
            RxFrameType::ActionCategoryVendorSpecific => {
                if let Ok(info) = FrameInfo::parse(&frame.frame) {
                    debug!("rx {} on vdev {}", info, frame.vdev_id);
                }
            }
            RxFrameType::ProbeReq => {}
        }
        self.emitter.notify_rx_mgmt(&frame);
        Ok(())
    }

    /// Fail every tx still waiting for a RoC or an ack.
    pub(super) fn cleanup_tx_queue(&mut self) {
        let drained = self.tx_queues.drain();
        if !drained.is_empty() {
            debug!("failing {} pending tx", drained.len());
        }
        for (cookie, ctx) in drained {
            if let Some(ticket) = ctx.ack_timer {
                self.timers.disarm(ticket);
            }
            self.send_tx_conf(cookie, &ctx, false);
        }
    }

    /// Drop a tx context with a negative confirmation, returning `err`.
    fn fail_tx(&mut self, cookie: TxCookie, err: P2pError) -> P2pError {
        if let Some(ctx) = self.tx_queues.remove(cookie) {
            if let Some(ticket) = ctx.ack_timer {
                self.timers.disarm(ticket);
            }
            debug!("tx {} failed: {}", cookie, err);
            self.send_tx_conf(cookie, &ctx, false);
        }
        err
    }

    /// Negative confirmation for a request that never got a context.
    fn reject_tx(&self, req: &MgmtTxRequest, err: P2pError) -> P2pError {
        warn!("rejecting mgmt tx on vdev {}: {}", req.vdev_id, err);
        self.emitter.notify_tx_confirm(&TxConfirmation {
            vdev_id: req.vdev_id,
            cookie: None,
            acked: false,
            frame: req.frame.clone(),
        });
        err
    }

    fn send_tx_conf(&self, cookie: TxCookie, ctx: &TxContext, acked: bool) {
        self.emitter.notify_tx_confirm(&TxConfirmation {
            vdev_id: ctx.vdev_id,
            cookie: (!ctx.no_ack).then_some(cookie),
            acked,
            frame: ctx.frame.clone(),
        });
    }
}
