// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! RoC admission state machine.
//!
//! The controller owns one radio's RoC queue and drives each context
//! through `Idle -> Requested -> Started -> OnChannel -> CancelInProgress`
//! until the scan engine reports a terminal event. It is only ever mutated
//! from the controller task, so none of this needs locking.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::{P2pError, P2pResult};
use crate::frame::FrameInfo;
use crate::radio::{VdevId, VdevMode};
use crate::roc::{RocContext, RocCookie, RocQueue, RocState, RocTimer};
use crate::tx::TxQueues;

use super::command::RocRequest;
use super::engine::{
    ListenScanRequest, MgmtEventSender, MgmtFrameLayer, RequesterId, RxFrameType, ScanEngine,
    ScanEvent, ScanEventKind, ScanEventSender, ScanPriority, ACTION_RX_TYPES,
};
use super::events::{ListenerId, NoaInfo, P2pEventEmitter, P2pListener, RocEvent, RocEventKind};
use super::pm::RuntimePmLock;
use super::policies::RocPolicy;
use super::rendezvous::{CancelRendezvous, RendezvousWaiter};
use super::timer::{TimerService, TimerTarget, TimerTicket};

/// Per-interface record kept by the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VdevEntry {
    pub mode: VdevMode,
    /// Last notice-of-absence schedule reported for this interface.
    pub noa: Option<NoaInfo>,
}

/// Per-radio P2P state and the RoC state machine operating on it.
pub struct P2pController {
    pub(super) policy: RocPolicy,
    pub(super) scan: Box<dyn ScanEngine>,
    pub(super) mgmt: Box<dyn MgmtFrameLayer>,
    pub(super) timers: Box<dyn TimerService>,
    pub(super) requester: Option<RequesterId>,
    pub(super) roc_queue: RocQueue,
    pub(super) tx_queues: TxQueues,
    pub(super) vdevs: BTreeMap<VdevId, VdevEntry>,
    pub(super) current_vdev: Option<VdevId>,
    pub(super) pm: RuntimePmLock,
    pub(super) rendezvous: CancelRendezvous,
    pub(super) emitter: P2pEventEmitter,
    probe_rx_registered: bool,
    action_rx_registered: bool,
    started: bool,
    next_timer_seq: u64,
}

impl P2pController {
    pub fn new(
        policy: RocPolicy,
        scan: Box<dyn ScanEngine>,
        mgmt: Box<dyn MgmtFrameLayer>,
        timers: Box<dyn TimerService>,
    ) -> Self {
        let capacity = policy.max_queue_len;
        Self {
            policy,
            scan,
            mgmt,
            timers,
            requester: None,
            roc_queue: RocQueue::new(capacity),
            tx_queues: TxQueues::new(),
            vdevs: BTreeMap::new(),
            current_vdev: None,
            pm: RuntimePmLock::new(),
            rendezvous: CancelRendezvous::new(),
            emitter: P2pEventEmitter::new(),
            probe_rx_registered: false,
            action_rx_registered: false,
            started: false,
            next_timer_seq: 0,
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Register with the scan engine and connect the mgmt layer.
    pub fn open(
        &mut self,
        scan_events: ScanEventSender,
        mgmt_events: MgmtEventSender,
    ) -> P2pResult<()> {
        if self.requester.is_some() {
            return Err(P2pError::invalid_state("p2p controller already open"));
        }
        let requester = self.scan.register_requester("p2p", scan_events)?;
        self.requester = Some(requester);
        self.mgmt.connect(mgmt_events);
        match self.mgmt.register_rx(&ACTION_RX_TYPES) {
            Ok(()) => self.action_rx_registered = true,
            Err(e) => error!("failed to register action frame rx: {}", e),
        }
        info!("P2P controller open (scan requester {:?})", requester);
        Ok(())
    }

    /// Install the upper-layer listener.
    pub fn start(&mut self, listener: Arc<dyn P2pListener>) -> ListenerId {
        self.started = true;
        self.emitter.register(listener)
    }

    /// Fail pending tx and drop every listener.
    pub fn stop(&mut self) {
        self.cleanup_tx_queue();
        self.emitter.clear();
        self.started = false;
        debug!("P2P controller stopped");
    }

    /// Release everything the controller still holds and unregister from the
    /// collaborators. Callers run cleanup first; anything left is destroyed
    /// without notification.
    pub fn close(&mut self) {
        let leftovers = self.roc_queue.select(|_| true);
        if !leftovers.is_empty() {
            warn!("closing with {} roc contexts queued", leftovers.len());
        }
        for cookie in leftovers {
            let active = self.roc_queue.get(cookie).is_some_and(|ctx| !ctx.is_idle());
            if active {
                self.pm.allow_suspend(cookie);
            }
            self.destroy_roc(cookie, false);
        }
        self.current_vdev = None;
        self.cleanup_tx_queue();

        if let Err(e) = self.set_probe_rx(false) {
            error!("failed to deregister probe request rx: {}", e);
        }
        if self.action_rx_registered {
            if let Err(e) = self.mgmt.deregister_rx(&ACTION_RX_TYPES) {
                error!("failed to deregister action frame rx: {}", e);
            }
            self.action_rx_registered = false;
        }
        if let Some(requester) = self.requester.take() {
            self.scan.unregister_requester(requester);
        }
        self.mgmt.disconnect();
        info!("P2P controller closed");
    }

    pub fn attach_vdev(&mut self, vdev_id: VdevId, mode: VdevMode) -> P2pResult<()> {
        if self.vdevs.contains_key(&vdev_id) {
            return Err(P2pError::invalid_argument(format!(
                "vdev {} already attached",
                vdev_id
            )));
        }
        self.vdevs.insert(vdev_id, VdevEntry { mode, noa: None });
        debug!("vdev {} attached as {:?}", vdev_id, mode);
        Ok(())
    }

    pub fn detach_vdev(&mut self, vdev_id: VdevId) -> P2pResult<()> {
        match self.vdevs.remove(&vdev_id) {
            Some(entry) => {
                debug!("vdev {} ({:?}) detached", vdev_id, entry.mode);
                Ok(())
            }
            None => Err(P2pError::not_found(format!("vdev {} not attached", vdev_id))),
        }
    }

    pub fn vdev(&self, vdev_id: VdevId) -> Option<&VdevEntry> {
        self.vdevs.get(&vdev_id)
    }

    pub fn vdevs(&self) -> impl Iterator<Item = (VdevId, &VdevEntry)> + '_ {
        self.vdevs.iter().map(|(id, entry)| (*id, entry))
    }

    /// Number of P2P group owners on this radio.
    pub fn go_count(&self) -> usize {
        self.vdevs
            .values()
            .filter(|entry| entry.mode == VdevMode::P2pGo)
            .count()
    }

    pub fn policy(&self) -> &RocPolicy {
        &self.policy
    }

    pub fn roc_queue(&self) -> &RocQueue {
        &self.roc_queue
    }

    pub fn tx_queues(&self) -> &TxQueues {
        &self.tx_queues
    }

    pub fn current_vdev(&self) -> Option<VdevId> {
        self.current_vdev
    }

    pub fn pm(&self) -> &RuntimePmLock {
        &self.pm
    }

    pub fn rendezvous(&self) -> &CancelRendezvous {
        &self.rendezvous
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub(super) fn check_vdev(&self, vdev_id: VdevId) -> P2pResult<&VdevEntry> {
        self.vdevs
            .get(&vdev_id)
            .ok_or_else(|| P2pError::invalid_argument(format!("vdev {} not attached", vdev_id)))
    }

    pub(super) fn next_ticket(&mut self, target: TimerTarget) -> TimerTicket {
        self.next_timer_seq += 1;
        TimerTicket {
            target,
            seq: self.next_timer_seq,
        }
    }

    // ------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------

    /// Queue a user-requested RoC, starting it at once if the radio is free.
    pub fn process_roc_req(&mut self, req: RocRequest) -> P2pResult<RocCookie> {
        self.check_vdev(req.vdev_id)?;
        if req.duration.is_zero() {
            return Err(P2pError::invalid_argument("roc duration must be > 0"));
        }
        let ctx = RocContext::user_requested(req.vdev_id, req.chan, req.phy_mode, req.duration);
        self.admit(ctx)
    }

    /// Append a context and execute it when it is the only entry.
    ///
    /// A start failure destroys the context and is returned to the caller;
    /// the entries behind it stay idle.
    pub(super) fn admit(&mut self, ctx: RocContext) -> P2pResult<RocCookie> {
        let cookie = self.roc_queue.push_back(ctx)?;
        if let Some(ctx) = self.roc_queue.get(cookie) {
            debug!("roc {} queued: {}", cookie, ctx);
        }
        if self.roc_queue.len() == 1 {
            self.execute_roc_req(cookie)?;
        } else {
            debug!(
                "roc {} waits behind {} entries",
                cookie,
                self.roc_queue.len() - 1
            );
        }
        Ok(cookie)
    }

    fn execute_roc_req(&mut self, cookie: RocCookie) -> P2pResult<()> {
        let go_present = self.go_count() > 0;
        let multiplier = self.policy.duration_multiplier(go_present);

        self.pm.prevent_suspend(cookie);
        let Some(ctx) = self.roc_queue.get_mut(cookie) else {
            self.pm.allow_suspend(cookie);
            return Err(P2pError::not_found(format!("roc {} vanished", cookie)));
        };
        ctx.timer = RocTimer::Ready;
        ctx.state = RocState::Requested;
        ctx.duration = ctx.duration.saturating_mul(multiplier);
        debug!(
            "executing roc {} (go present: {}, x{}): {}",
            cookie, go_present, multiplier, ctx
        );

        let vdev_id = ctx.vdev_id;
        let started = match self.requester {
            Some(requester) => self.scan.start(ListenScanRequest {
                requester,
                vdev_id,
                chan: ctx.chan,
                dwell: ctx.duration,
                priority: ScanPriority::High,
            }),
            None => Err(P2pError::invalid_state("no scan requester registered")),
        };

        match started {
            Ok(scan_id) => {
                ctx.scan_id = Some(scan_id);
                debug!("roc {} listen scan {} requested", cookie, scan_id);
                self.current_vdev = Some(vdev_id);
                if let Err(e) = self.set_probe_rx(true) {
                    error!("failed to register probe request rx: {}", e);
                }
                Ok(())
            }
            Err(e) => {
                error!("failed to start listen scan for roc {}: {}", cookie, e);
                ctx.timer = RocTimer::Uninit;
                self.destroy_roc(cookie, true);
                self.pm.allow_suspend(cookie);
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Scan engine events
    // ------------------------------------------------------------------

    pub fn handle_scan_event(&mut self, event: ScanEvent) {
        if Some(event.requester) != self.requester {
            debug!(
                "scan event {:?} for requester {:?} ignored",
                event.kind, event.requester
            );
            return;
        }
        let Some(cookie) = self.roc_queue.current() else {
            warn!(
                "scan {} event {:?} without an active roc",
                event.scan_id, event.kind
            );
            return;
        };
        let scan_id = self.roc_queue.get(cookie).and_then(|ctx| ctx.scan_id);
        if scan_id != Some(event.scan_id) {
            debug!(
                "scan {} event {:?} does not belong to roc {}",
                event.scan_id, event.kind, cookie
            );
            return;
        }

        match event.kind {
            ScanEventKind::Started => self.on_scan_started(cookie),
            ScanEventKind::ForeignChannel => self.on_ready_on_channel(cookie),
            kind if kind.is_terminal() => self.on_scan_complete(cookie),
            kind => debug!("roc {} ignores scan event {:?}", cookie, kind),
        }
    }

    fn on_scan_started(&mut self, cookie: RocCookie) {
        let Some(ctx) = self.roc_queue.get_mut(cookie) else {
            return;
        };
        if ctx.state == RocState::Requested {
            ctx.state = RocState::Started;
            debug!("roc {} started: {}", cookie, ctx);
        } else {
            debug!("roc {} scan started while {}", cookie, ctx.state);
        }
    }

    fn on_ready_on_channel(&mut self, cookie: RocCookie) {
        let ticket = self.next_ticket(TimerTarget::Roc(cookie));
        let propagate = self.policy.propagate_time();
        let Some(ctx) = self.roc_queue.get_mut(cookie) else {
            return;
        };
        if !matches!(ctx.state, RocState::Requested | RocState::Started) {
            debug!("roc {} foreign channel while {}", cookie, ctx.state);
            return;
        }
        ctx.state = RocState::OnChannel;
        self.timers.arm(ticket, ctx.duration + propagate);
        ctx.timer = RocTimer::Running(ticket);
        debug!("roc {} on channel: {}", cookie, ctx);

        if ctx.is_user_requested() {
            ctx.ready_sent = true;
            let event = roc_event(cookie, ctx, RocEventKind::ReadyOnChannel);
            self.emitter.notify_roc_event(&event);
        } else {
            self.ready_to_tx_frame(cookie);
        }
    }

    fn on_scan_complete(&mut self, cookie: RocCookie) {
        self.pm.allow_suspend(cookie);
        let Some(mut ctx) = self.roc_queue.remove(cookie) else {
            return;
        };
        if let RocTimer::Running(ticket) = ctx.timer {
            self.timers.disarm(ticket);
        }
        ctx.timer = RocTimer::Uninit;
        if let Err(e) = self.set_probe_rx(false) {
            error!("failed to deregister probe request rx: {}", e);
        }
        self.current_vdev = None;
        debug!("roc {} complete: {}", cookie, ctx);

        if ctx.is_user_requested() {
            self.finish_roc_events(cookie, &mut ctx);
        }
        self.release_tx_for_roc(&ctx);
        self.rendezvous.set();
        self.start_idle_head();
    }

    /// Execute the queue head when nothing is active.
    fn start_idle_head(&mut self) {
        if self.roc_queue.current().is_some() {
            return;
        }
        let Some(next) = self.roc_queue.front() else {
            return;
        };
        if let Err(e) = self.execute_roc_req(next) {
            warn!("roc {} failed to start: {}", next, e);
        }
    }

    // ------------------------------------------------------------------
    // Cancellation and timers
    // ------------------------------------------------------------------

    /// Cancel a RoC by cookie.
    ///
    /// Idle entries are dropped silently. Active entries move to
    /// `CancelInProgress` and the scan is aborted; a repeated cancel is a
    /// no-op.
    pub fn process_cancel_roc_req(&mut self, cookie: RocCookie) -> P2pResult<()> {
        let Some(state) = self.roc_queue.get(cookie).map(|ctx| ctx.state) else {
            return Err(P2pError::not_found(format!("roc {} not queued", cookie)));
        };
        match state {
            RocState::Idle => {
                if let Some(ctx) = self.roc_queue.remove(cookie) {
                    debug!("roc {} removed before start: {}", cookie, ctx);
                    self.release_tx_for_roc(&ctx);
                }
                self.start_idle_head();
            }
            RocState::CancelInProgress => {
                debug!("roc {} cancellation already in progress", cookie);
            }
            _ => self.execute_cancel(cookie),
        }
        Ok(())
    }

    fn execute_cancel(&mut self, cookie: RocCookie) {
        let Some(ctx) = self.roc_queue.get_mut(cookie) else {
            return;
        };
        ctx.state = RocState::CancelInProgress;
        self.rendezvous.reset();
        if let RocTimer::Running(ticket) = ctx.timer {
            self.timers.disarm(ticket);
            ctx.timer = RocTimer::Ready;
        }
        debug!("cancelling roc {}: {}", cookie, ctx);

        let vdev_id = ctx.vdev_id;
        match (self.requester, ctx.scan_id) {
            (Some(requester), Some(scan_id)) => {
                if let Err(e) = self.scan.cancel(requester, vdev_id, scan_id) {
                    error!("failed to abort scan {} for roc {}: {}", scan_id, cookie, e);
                }
            }
            _ => warn!("roc {} has no listen scan to abort", cookie),
        }
    }

    pub fn handle_timer(&mut self, ticket: TimerTicket) {
        match ticket.target {
            TimerTarget::Roc(cookie) => self.on_roc_timeout(cookie, ticket),
            TimerTarget::TxAck(tx) => self.on_tx_ack_timeout(tx, ticket),
        }
    }

    fn on_roc_timeout(&mut self, cookie: RocCookie, ticket: TimerTicket) {
        let Some(ctx) = self.roc_queue.get_mut(cookie) else {
            debug!("stale timer for roc {}", cookie);
            return;
        };
        if ctx.timer != RocTimer::Running(ticket) {
            debug!("stale timer {} for roc {}", ticket.seq, cookie);
            return;
        }
        ctx.timer = RocTimer::Ready;
        self.timers.disarm(ticket);
        debug!("roc {} timed out: {}", cookie, ctx);
        if ctx.state == RocState::CancelInProgress {
            warn!("roc {} timed out during cancellation", cookie);
            return;
        }
        self.execute_cancel(cookie);
    }

    /// Re-arm a running RoC timer for the context's current duration.
    pub(super) fn restart_roc_timer(&mut self, cookie: RocCookie) -> P2pResult<()> {
        let ticket = self.next_ticket(TimerTarget::Roc(cookie));
        let ctx = self
            .roc_queue
            .get_mut(cookie)
            .ok_or_else(|| P2pError::not_found(format!("roc {} not queued", cookie)))?;
        let RocTimer::Running(old) = ctx.timer else {
            return Err(P2pError::invalid_state(format!(
                "roc {} timer is not running",
                cookie
            )));
        };
        self.timers.disarm(old);
        self.timers.arm(ticket, ctx.duration);
        ctx.timer = RocTimer::Running(ticket);
        debug!("roc {} timer restarted for {:?}", cookie, ctx.duration);
        Ok(())
    }

    /// Stretch the active RoC after receiving a negotiation-type frame.
    pub(super) fn extend_roc_timer(&mut self, info: &FrameInfo) {
        let Some(extension) = info.roc_extension(&self.policy) else {
            return;
        };
        let Some(cookie) = self.roc_queue.current() else {
            debug!("no active roc to extend for {}", info);
            return;
        };
        if let Some(ctx) = self.roc_queue.get_mut(cookie) {
            ctx.duration = extension;
        }
        match self.restart_roc_timer(cookie) {
            Ok(()) => debug!("roc {} extended to {:?} for {}", cookie, extension, info),
            Err(e) => debug!("roc {} not extended: {}", cookie, e),
        }
    }

    // ------------------------------------------------------------------
    // Cleanup
    // ------------------------------------------------------------------

    /// Drop idle contexts, optionally only those of one vdev, and return the
    /// active ones the caller still has to cancel and wait for.
    ///
    /// A full-radio cleanup notifies the listener for the dropped
    /// user-requested contexts; a per-vdev cleanup does not.
    pub fn begin_cleanup(&mut self, vdev: Option<VdevId>) -> Vec<RocCookie> {
        let in_scope = |ctx: &RocContext| vdev.map_or(true, |v| ctx.vdev_id == v);
        let idle = self.roc_queue.select(|ctx| ctx.is_idle() && in_scope(ctx));
        debug!(
            "cleanup {:?}: dropping {} idle of {} queued",
            vdev,
            idle.len(),
            self.roc_queue.len()
        );
        for cookie in idle {
            self.destroy_roc(cookie, vdev.is_none());
        }
        self.roc_queue
            .select(|ctx| !ctx.is_idle() && in_scope(ctx))
    }

    /// Cancel one active context for cleanup and hand back a waiter for its
    /// teardown. `None` means there is nothing left to wait for.
    pub fn cancel_for_cleanup(&mut self, cookie: RocCookie) -> Option<RendezvousWaiter> {
        let state = self.roc_queue.get(cookie)?.state;
        match state {
            RocState::Idle => {
                if let Some(ctx) = self.roc_queue.remove(cookie) {
                    self.release_tx_for_roc(&ctx);
                }
                return None;
            }
            RocState::CancelInProgress => {}
            _ => self.execute_cancel(cookie),
        }
        Some(self.rendezvous.waiter())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Remove a context, stopping its timer and failing its parked tx.
    pub(super) fn destroy_roc(&mut self, cookie: RocCookie, notify: bool) {
        let Some(mut ctx) = self.roc_queue.remove(cookie) else {
            return;
        };
        debug!("destroying roc {}: {}", cookie, ctx);
        if let RocTimer::Running(ticket) = ctx.timer {
            self.timers.disarm(ticket);
        }
        ctx.timer = RocTimer::Uninit;
        if notify && ctx.is_user_requested() {
            self.finish_roc_events(cookie, &mut ctx);
        }
        self.release_tx_for_roc(&ctx);
    }

    /// Emit whatever is left of the ready/completed pair.
    fn finish_roc_events(&self, cookie: RocCookie, ctx: &mut RocContext) {
        if !ctx.ready_sent {
            ctx.ready_sent = true;
            self.emitter
                .notify_roc_event(&roc_event(cookie, ctx, RocEventKind::ReadyOnChannel));
        }
        self.emitter
            .notify_roc_event(&roc_event(cookie, ctx, RocEventKind::Completed));
    }

    fn set_probe_rx(&mut self, register: bool) -> P2pResult<()> {
        if register == self.probe_rx_registered {
            return Ok(());
        }
        let types = [RxFrameType::ProbeReq];
        if register {
            self.mgmt.register_rx(&types)?;
        } else {
            self.mgmt.deregister_rx(&types)?;
        }
        self.probe_rx_registered = register;
        Ok(())
    }

    pub(super) fn store_noa(&mut self, noa: NoaInfo) -> P2pResult<()> {
        let entry = self
            .vdevs
            .get_mut(&noa.vdev_id)
            .ok_or_else(|| P2pError::not_found(format!("vdev {} not attached", noa.vdev_id)))?;
        debug!(
            "vdev {} noa index:{} opp_ps:{} ct_window:{} descriptors:{}",
            noa.vdev_id,
            noa.index,
            noa.opp_ps,
            noa.ct_window,
            noa.descriptors.len()
        );
        entry.noa = Some(noa);
        Ok(())
    }
}

fn roc_event(cookie: RocCookie, ctx: &RocContext, kind: RocEventKind) -> RocEvent {
    RocEvent {
        vdev_id: ctx.vdev_id,
        kind,
        cookie,
        chan: ctx.chan,
        duration_ms: ctx.duration.as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::controller::testkit::{chan, request, Harness};

    #[test]
    fn test_single_roc_lifecycle() {
        let mut h = Harness::new();
        let cookie = h.roc(0, 6, 200);

        let ctx = h.ctrl.roc_queue().get(cookie).unwrap();
        assert_eq!(ctx.state, RocState::Requested);
        assert_eq!(ctx.duration, Duration::from_millis(1000));
        assert_eq!(h.ctrl.current_vdev(), Some(0));
        assert!(h.ctrl.pm().is_suspend_prevented());
        assert!(h.probe_rx_registered());
        {
            let scan = h.scan.lock().unwrap();
            assert_eq!(scan.starts.len(), 1);
            assert_eq!(scan.starts[0].dwell, Duration::from_millis(1000));
            assert_eq!(scan.starts[0].priority, ScanPriority::High);
        }

        h.scan_event(cookie, ScanEventKind::Started);
        assert_eq!(h.state(cookie), Some(RocState::Started));

        h.scan_event(cookie, ScanEventKind::ForeignChannel);
        assert_eq!(h.state(cookie), Some(RocState::OnChannel));
        assert_eq!(h.armed_for(cookie), Some(Duration::from_millis(1010)));
        let events = h.roc_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, RocEventKind::ReadyOnChannel);
        assert_eq!(events[0].chan, chan(6));
        assert_eq!(events[0].duration_ms, 1000);

        h.fire_roc_timer(cookie);
        assert_eq!(h.state(cookie), Some(RocState::CancelInProgress));
        assert_eq!(h.scan.lock().unwrap().cancels.len(), 1);
        assert!(!h.ctrl.rendezvous().is_set());

        h.scan_event(cookie, ScanEventKind::Completed);
        assert!(h.ctrl.roc_queue().is_empty());
        assert_eq!(h.ctrl.current_vdev(), None);
        assert!(!h.ctrl.pm().is_suspend_prevented());
        assert_eq!(h.ctrl.pm().counts(), (1, 1));
        assert!(!h.probe_rx_registered());
        assert!(h.ctrl.rendezvous().is_set());
        assert_eq!(h.active_timers(), 0);

        let kinds: Vec<_> = h.roc_events().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![RocEventKind::ReadyOnChannel, RocEventKind::Completed]
        );
    }

    #[test]
    fn test_go_present_scales_by_two() {
        let mut h = Harness::new();
        h.ctrl.attach_vdev(1, VdevMode::P2pGo).unwrap();
        let cookie = h.roc(0, 6, 200);
        assert_eq!(
            h.ctrl.roc_queue().get(cookie).unwrap().duration,
            Duration::from_millis(400)
        );
    }

    #[test]
    fn test_fifo_admission() {
        let mut h = Harness::new();
        h.ctrl.attach_vdev(1, VdevMode::P2pDevice).unwrap();
        let first = h.roc(0, 1, 100);
        let second = h.roc(1, 11, 100);

        assert_eq!(h.state(first), Some(RocState::Requested));
        assert_eq!(h.state(second), Some(RocState::Idle));
        assert_eq!(h.scan.lock().unwrap().starts.len(), 1);

        h.scan_event(first, ScanEventKind::Started);
        h.scan_event(first, ScanEventKind::ForeignChannel);
        assert_eq!(h.state(second), Some(RocState::Idle));
        h.scan_event(first, ScanEventKind::Completed);

        assert_eq!(h.state(first), None);
        assert_eq!(h.state(second), Some(RocState::Requested));
        assert_eq!(h.ctrl.current_vdev(), Some(1));
        assert_eq!(h.scan.lock().unwrap().starts[1].chan, chan(11));
    }

    #[test]
    fn test_at_most_one_active() {
        let mut h = Harness::new();
        let cookies: Vec<_> = (0..4).map(|_| h.roc(0, 6, 50)).collect();
        for cookie in &cookies {
            assert_eq!(h.active_count(), 1);
            h.scan_event(*cookie, ScanEventKind::Started);
            h.scan_event(*cookie, ScanEventKind::ForeignChannel);
            assert_eq!(h.active_count(), 1);
            h.ctrl.process_cancel_roc_req(*cookie).unwrap();
            assert_eq!(h.active_count(), 1);
            h.scan_event(*cookie, ScanEventKind::Completed);
        }
        assert!(h.ctrl.roc_queue().is_empty());
        assert_eq!(h.ctrl.pm().counts(), (4, 4));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut h = Harness::new();
        let cookie = h.roc(0, 6, 200);
        h.scan_event(cookie, ScanEventKind::Started);
        h.scan_event(cookie, ScanEventKind::ForeignChannel);

        assert!(h.ctrl.process_cancel_roc_req(cookie).is_ok());
        assert!(h.ctrl.process_cancel_roc_req(cookie).is_ok());
        assert_eq!(h.scan.lock().unwrap().cancels.len(), 1);

        h.scan_event(cookie, ScanEventKind::Completed);
        let completed = h
            .roc_events()
            .iter()
            .filter(|e| e.kind == RocEventKind::Completed)
            .count();
        assert_eq!(completed, 1);
        assert!(matches!(
            h.ctrl.process_cancel_roc_req(cookie),
            Err(P2pError::NotFound(_))
        ));
    }

    #[test]
    fn test_timeout_and_cancel_share_teardown() {
        let mut by_timer = Harness::new();
        let a = by_timer.roc(0, 6, 200);
        by_timer.scan_event(a, ScanEventKind::Started);
        by_timer.scan_event(a, ScanEventKind::ForeignChannel);
        by_timer.fire_roc_timer(a);
        by_timer.scan_event(a, ScanEventKind::Completed);

        let mut by_cancel = Harness::new();
        let b = by_cancel.roc(0, 6, 200);
        by_cancel.scan_event(b, ScanEventKind::Started);
        by_cancel.scan_event(b, ScanEventKind::ForeignChannel);
        by_cancel.ctrl.process_cancel_roc_req(b).unwrap();
        by_cancel.scan_event(b, ScanEventKind::Completed);

        let kinds = |h: &Harness| h.roc_events().iter().map(|e| e.kind).collect::<Vec<_>>();
        assert_eq!(kinds(&by_timer), kinds(&by_cancel));
        assert_eq!(
            by_timer.scan.lock().unwrap().cancels.len(),
            by_cancel.scan.lock().unwrap().cancels.len()
        );
        assert_eq!(by_timer.ctrl.pm().counts(), by_cancel.ctrl.pm().counts());
    }

    #[test]
    fn test_cancel_before_on_channel_still_emits_ready_then_completed() {
        let mut h = Harness::new();
        let cookie = h.roc(0, 6, 200);
        h.scan_event(cookie, ScanEventKind::Started);
        h.ctrl.process_cancel_roc_req(cookie).unwrap();
        h.scan_event(cookie, ScanEventKind::Completed);

        let kinds: Vec<_> = h.roc_events().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![RocEventKind::ReadyOnChannel, RocEventKind::Completed]
        );
    }

    #[test]
    fn test_idle_cancel_behind_active_is_silent() {
        let mut h = Harness::new();
        let active = h.roc(0, 1, 100);
        let idle = h.roc(0, 6, 100);

        h.ctrl.process_cancel_roc_req(idle).unwrap();
        assert_eq!(h.state(idle), None);
        assert_eq!(h.state(active), Some(RocState::Requested));
        assert!(h.roc_events().is_empty());
        assert_eq!(h.scan.lock().unwrap().starts.len(), 1);
    }

    #[test]
    fn test_idle_cancel_starts_stranded_next() {
        let mut h = Harness::new();
        h.ctrl.attach_vdev(1, VdevMode::P2pDevice).unwrap();
        let head = h.roc(0, 1, 100);
        let failing = h.roc(0, 6, 100);
        let first = h.roc(0, 11, 100);
        let second = h.roc(1, 6, 100);

        h.scan.lock().unwrap().fail_next_start = true;
        h.ctrl.process_cancel_roc_req(head).unwrap();
        h.scan_event(head, ScanEventKind::Completed);
        assert_eq!(h.state(failing), None);
        assert_eq!(h.state(first), Some(RocState::Idle));
        let before = h.roc_events().len();

        h.ctrl.process_cancel_roc_req(first).unwrap();
        assert_eq!(h.roc_events().len(), before);
        assert_eq!(h.state(second), Some(RocState::Requested));
        assert_eq!(h.ctrl.current_vdev(), Some(1));
    }

    #[test]
    fn test_idle_head_removed_lets_next_request_start() {
        let mut h = Harness::new();
        h.ctrl.attach_vdev(1, VdevMode::P2pDevice).unwrap();
        h.scan.lock().unwrap().fail_next_start = true;
        assert!(h.ctrl.process_roc_req(request(0, 1, 100)).is_err());

        // failure left nothing behind, so the next request is admitted at once
        let next = h.roc(1, 6, 100);
        assert_eq!(h.state(next), Some(RocState::Requested));
    }

    #[test]
    fn test_admission_failure_emits_both_events() {
        let mut h = Harness::new();
        h.scan.lock().unwrap().fail_next_start = true;
        let err = h.ctrl.process_roc_req(request(0, 6, 200)).unwrap_err();
        assert!(matches!(err, P2pError::Engine(_)));

        let kinds: Vec<_> = h.roc_events().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![RocEventKind::ReadyOnChannel, RocEventKind::Completed]
        );
        assert!(h.ctrl.roc_queue().is_empty());
        assert!(!h.ctrl.pm().is_suspend_prevented());
        assert_eq!(h.ctrl.current_vdev(), None);
    }

    #[test]
    fn test_admission_failure_does_not_promote_next() {
        let mut h = Harness::new();
        let first = h.roc(0, 1, 100);
        let second = h.roc(0, 6, 100);
        let third = h.roc(0, 11, 100);

        h.scan.lock().unwrap().fail_next_start = true;
        h.ctrl.process_cancel_roc_req(first).unwrap();
        h.scan_event(first, ScanEventKind::Completed);

        // second failed to start on promotion; third is left waiting
        assert_eq!(h.state(second), None);
        assert_eq!(h.state(third), Some(RocState::Idle));
        assert_eq!(h.ctrl.roc_queue().current(), None);

        // a new request lands behind the stranded idle entry
        let fourth = h.roc(0, 6, 100);
        assert_eq!(h.state(fourth), Some(RocState::Idle));
    }

    #[test]
    fn test_queue_full_has_no_side_effects() {
        let mut policy = RocPolicy::default();
        policy.max_queue_len = 2;
        let mut h = Harness::with_policy(policy);
        h.roc(0, 6, 100);
        h.roc(0, 6, 100);
        let err = h.ctrl.process_roc_req(request(0, 6, 100)).unwrap_err();
        assert!(matches!(err, P2pError::ResourceExhausted(_)));
        assert_eq!(h.ctrl.roc_queue().len(), 2);
        assert_eq!(h.scan.lock().unwrap().starts.len(), 1);
        assert!(h.roc_events().is_empty());
    }

    #[test]
    fn test_rejects_unknown_vdev_and_zero_duration() {
        let mut h = Harness::new();
        assert!(matches!(
            h.ctrl.process_roc_req(request(9, 6, 100)),
            Err(P2pError::InvalidArgument(_))
        ));
        assert!(matches!(
            h.ctrl.process_roc_req(request(0, 6, 0)),
            Err(P2pError::InvalidArgument(_))
        ));
        assert!(h.ctrl.roc_queue().is_empty());
    }

    #[test]
    fn test_stale_timer_is_ignored() {
        let mut h = Harness::new();
        let cookie = h.roc(0, 6, 200);
        h.scan_event(cookie, ScanEventKind::Started);
        h.scan_event(cookie, ScanEventKind::ForeignChannel);
        let RocTimer::Running(ticket) = h.ctrl.roc_queue().get(cookie).unwrap().timer else {
            panic!("timer not running");
        };
        h.ctrl.restart_roc_timer(cookie).unwrap();

        h.ctrl.handle_timer(ticket);
        assert_eq!(h.state(cookie), Some(RocState::OnChannel));
        assert!(h.scan.lock().unwrap().cancels.is_empty());
    }

    #[test]
    fn test_foreign_scan_events_are_dropped() {
        let mut h = Harness::new();
        let cookie = h.roc(0, 6, 200);
        let scan_id = h.ctrl.roc_queue().get(cookie).unwrap().scan_id.unwrap();

        h.ctrl.handle_scan_event(ScanEvent {
            requester: h.requester(),
            vdev_id: 0,
            scan_id: crate::controller::engine::ScanId(scan_id.0 + 100),
            kind: ScanEventKind::Completed,
        });
        h.ctrl.handle_scan_event(ScanEvent {
            requester: RequesterId(99),
            vdev_id: 0,
            scan_id,
            kind: ScanEventKind::Completed,
        });
        assert_eq!(h.state(cookie), Some(RocState::Requested));
    }

    #[test]
    fn test_foreign_channel_after_cancel_is_ignored() {
        let mut h = Harness::new();
        let cookie = h.roc(0, 6, 200);
        h.ctrl.process_cancel_roc_req(cookie).unwrap();
        h.scan_event(cookie, ScanEventKind::ForeignChannel);
        assert_eq!(h.state(cookie), Some(RocState::CancelInProgress));
        assert_eq!(h.active_timers(), 0);
        assert!(h.roc_events().is_empty());
    }

    #[test]
    fn test_dequeued_counts_as_completion() {
        let mut h = Harness::new();
        let cookie = h.roc(0, 6, 200);
        h.scan_event(cookie, ScanEventKind::Dequeued);
        assert!(h.ctrl.roc_queue().is_empty());
        assert_eq!(h.roc_events().len(), 2);
    }

    #[test]
    fn test_full_cleanup_notifies_idle_user_contexts() {
        let mut h = Harness::new();
        let active = h.roc(0, 6, 200);
        let idle_a = h.roc(0, 1, 200);
        let idle_b = h.roc(0, 11, 200);

        let pending = h.ctrl.begin_cleanup(None);
        assert_eq!(pending, vec![active]);
        assert_eq!(h.state(idle_a), None);
        assert_eq!(h.state(idle_b), None);
        // ready + completed for each idle context
        assert_eq!(h.roc_events().len(), 4);

        assert!(h.ctrl.cancel_for_cleanup(active).is_some());
        assert_eq!(h.state(active), Some(RocState::CancelInProgress));
        h.scan_event(active, ScanEventKind::Completed);
        assert!(h.ctrl.roc_queue().is_empty());
        assert!(h.ctrl.rendezvous().is_set());
        assert!(h.ctrl.cancel_for_cleanup(active).is_none());
    }

    #[test]
    fn test_vdev_cleanup_is_scoped_and_silent() {
        let mut h = Harness::new();
        h.ctrl.attach_vdev(1, VdevMode::P2pDevice).unwrap();
        let active = h.roc(0, 6, 200);
        let other = h.roc(1, 1, 200);
        let mine = h.roc(0, 11, 200);

        let pending = h.ctrl.begin_cleanup(Some(1));
        assert!(pending.is_empty());
        assert_eq!(h.state(other), None);
        assert_eq!(h.state(mine), Some(RocState::Idle));
        assert_eq!(h.state(active), Some(RocState::Requested));
        assert!(h.roc_events().is_empty());

        assert_eq!(h.ctrl.begin_cleanup(Some(0)), vec![active]);
        assert_eq!(h.state(mine), None);
    }

    #[test]
    fn test_cleanup_of_empty_queue_has_nothing_to_wait_for() {
        let mut h = Harness::new();
        assert!(h.ctrl.begin_cleanup(None).is_empty());
    }

    #[test]
    fn test_close_releases_everything() {
        let mut h = Harness::new();
        h.roc(0, 6, 200);
        h.roc(0, 1, 200);
        h.ctrl.close();
        assert!(h.ctrl.roc_queue().is_empty());
        assert!(!h.ctrl.pm().is_suspend_prevented());
        let scan = h.scan.lock().unwrap();
        assert!(!scan.registered);
        let mgmt = h.mgmt.lock().unwrap();
        assert!(!mgmt.connected);
        assert!(mgmt.rx_registered.is_empty());
    }

    #[test]
    fn test_vdev_attach_detach() {
        let mut h = Harness::new();
        assert!(matches!(
            h.ctrl.attach_vdev(0, VdevMode::Sta),
            Err(P2pError::InvalidArgument(_))
        ));
        h.ctrl.attach_vdev(3, VdevMode::P2pGo).unwrap();
        assert_eq!(h.ctrl.go_count(), 1);
        h.ctrl.detach_vdev(3).unwrap();
        assert_eq!(h.ctrl.go_count(), 0);
        assert!(matches!(
            h.ctrl.detach_vdev(3),
            Err(P2pError::NotFound(_))
        ));
    }
}
