// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Recording doubles for driving the controller synchronously in tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::{P2pError, P2pResult};
use crate::radio::{Channel, VdevId, VdevMode};
use crate::roc::{RocCookie, RocState, RocTimer};
use crate::task::P2pMessage;

use super::command::RocRequest;
use super::engine::{
    ListenScanRequest, MgmtEventSender, MgmtFrameLayer, OutboundFrame, RequesterId, RxFrameType,
    ScanEngine, ScanEvent, ScanEventKind, ScanEventSender, ScanId,
};
use super::events::{
    ListenOffloadStopped, P2pListener, RocEvent, RxMgmtFrame, TxConfirmation,
};
use super::machine::P2pController;
use super::policies::RocPolicy;
use super::timer::{TimerService, TimerTicket};

pub(crate) const REQUESTER: RequesterId = RequesterId(7);

pub(crate) fn chan(number: u8) -> Channel {
    Channel::new(number).unwrap()
}

pub(crate) fn request(vdev_id: VdevId, number: u8, ms: u64) -> RocRequest {
    RocRequest::new(vdev_id, chan(number), Duration::from_millis(ms))
}

#[derive(Default)]
pub(crate) struct ScanLog {
    pub starts: Vec<ListenScanRequest>,
    pub cancels: Vec<ScanId>,
    pub fail_next_start: bool,
    pub registered: bool,
    next_id: u32,
}

pub(crate) struct FakeScan(Arc<Mutex<ScanLog>>);

impl ScanEngine for FakeScan {
    fn register_requester(
        &mut self,
        _name: &str,
        _events: ScanEventSender,
    ) -> P2pResult<RequesterId> {
        self.0.lock().unwrap().registered = true;
        Ok(REQUESTER)
    }

    fn unregister_requester(&mut self, _requester: RequesterId) {
        self.0.lock().unwrap().registered = false;
    }

    fn start(&mut self, req: ListenScanRequest) -> P2pResult<ScanId> {
        let mut log = self.0.lock().unwrap();
        if std::mem::take(&mut log.fail_next_start) {
            return Err(P2pError::engine("scan rejected"));
        }
        log.next_id += 1;
        log.starts.push(req);
        Ok(ScanId(log.next_id))
    }

    fn cancel(&mut self, _requester: RequesterId, _vdev_id: VdevId, scan_id: ScanId) -> P2pResult<()> {
        self.0.lock().unwrap().cancels.push(scan_id);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MgmtLog {
    pub sent: Vec<OutboundFrame>,
    pub rx_registered: HashSet<RxFrameType>,
    pub connected: bool,
    pub fail_tx: bool,
}

pub(crate) struct FakeMgmt(Arc<Mutex<MgmtLog>>);

impl MgmtFrameLayer for FakeMgmt {
    fn connect(&mut self, _events: MgmtEventSender) {
        self.0.lock().unwrap().connected = true;
    }

    fn disconnect(&mut self) {
        self.0.lock().unwrap().connected = false;
    }

    fn register_rx(&mut self, types: &[RxFrameType]) -> P2pResult<()> {
        self.0.lock().unwrap().rx_registered.extend(types);
        Ok(())
    }

    fn deregister_rx(&mut self, types: &[RxFrameType]) -> P2pResult<()> {
        let mut log = self.0.lock().unwrap();
        for t in types {
            log.rx_registered.remove(t);
        }
        Ok(())
    }

    fn transmit(&mut self, frame: OutboundFrame) -> P2pResult<()> {
        let mut log = self.0.lock().unwrap();
        if log.fail_tx {
            return Err(P2pError::engine("tx rejected"));
        }
        log.sent.push(frame);
        Ok(())
    }
}

/// Armed timers by ticket. Nothing fires on its own.
#[derive(Default)]
pub(crate) struct TimerLog {
    pub active: HashMap<TimerTicket, Duration>,
}

pub(crate) struct FakeTimers(Arc<Mutex<TimerLog>>);

impl TimerService for FakeTimers {
    fn arm(&mut self, ticket: TimerTicket, after: Duration) {
        self.0.lock().unwrap().active.insert(ticket, after);
    }

    fn disarm(&mut self, ticket: TimerTicket) {
        self.0.lock().unwrap().active.remove(&ticket);
    }
}

#[derive(Default)]
pub(crate) struct Recorder {
    pub roc: Mutex<Vec<RocEvent>>,
    pub rx: Mutex<Vec<RxMgmtFrame>>,
    pub tx: Mutex<Vec<TxConfirmation>>,
    pub lo: Mutex<Vec<ListenOffloadStopped>>,
}

impl P2pListener for Recorder {
    fn on_roc_event(&self, event: &RocEvent) {
        self.roc.lock().unwrap().push(event.clone());
    }

    fn on_rx_mgmt(&self, frame: &RxMgmtFrame) {
        self.rx.lock().unwrap().push(frame.clone());
    }

    fn on_tx_confirm(&self, conf: &TxConfirmation) {
        self.tx.lock().unwrap().push(conf.clone());
    }

    fn on_listen_offload_stopped(&self, info: &ListenOffloadStopped) {
        self.lo.lock().unwrap().push(info.clone());
    }
}

/// An open, started controller with vdev 0 attached as a P2P device.
pub(crate) struct Harness {
    pub ctrl: P2pController,
    pub scan: Arc<Mutex<ScanLog>>,
    pub mgmt: Arc<Mutex<MgmtLog>>,
    pub timers: Arc<Mutex<TimerLog>>,
    pub events: Arc<Recorder>,
    _rx: mpsc::UnboundedReceiver<P2pMessage>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(RocPolicy::default())
    }

    pub fn with_policy(policy: RocPolicy) -> Self {
        let scan = Arc::new(Mutex::new(ScanLog::default()));
        let mgmt = Arc::new(Mutex::new(MgmtLog::default()));
        let timers = Arc::new(Mutex::new(TimerLog::default()));
        let events = Arc::new(Recorder::default());
        let (tx, rx) = mpsc::unbounded_channel();

        let mut ctrl = P2pController::new(
            policy,
            Box::new(FakeScan(scan.clone())),
            Box::new(FakeMgmt(mgmt.clone())),
            Box::new(FakeTimers(timers.clone())),
        );
        ctrl.open(ScanEventSender::new(tx.clone()), MgmtEventSender::new(tx))
            .unwrap();
        ctrl.start(events.clone());
        ctrl.attach_vdev(0, VdevMode::P2pDevice).unwrap();

        Self {
            ctrl,
            scan,
            mgmt,
            timers,
            events,
            _rx: rx,
        }
    }

    pub fn requester(&self) -> RequesterId {
        REQUESTER
    }

    pub fn roc(&mut self, vdev_id: VdevId, number: u8, ms: u64) -> RocCookie {
        self.ctrl.process_roc_req(request(vdev_id, number, ms)).unwrap()
    }

    pub fn state(&self, cookie: RocCookie) -> Option<RocState> {
        self.ctrl.roc_queue().get(cookie).map(|ctx| ctx.state)
    }

    pub fn active_count(&self) -> usize {
        self.ctrl
            .roc_queue()
            .iter()
            .filter(|(_, ctx)| !ctx.is_idle())
            .count()
    }

    /// Deliver a scan event for the scan currently owned by `cookie`.
    pub fn scan_event(&mut self, cookie: RocCookie, kind: ScanEventKind) {
        let ctx = self.ctrl.roc_queue().get(cookie).unwrap();
        let event = ScanEvent {
            requester: REQUESTER,
            vdev_id: ctx.vdev_id,
            scan_id: ctx.scan_id.unwrap(),
            kind,
        };
        self.ctrl.handle_scan_event(event);
    }

    pub fn fire_roc_timer(&mut self, cookie: RocCookie) {
        let RocTimer::Running(ticket) = self.ctrl.roc_queue().get(cookie).unwrap().timer else {
            panic!("roc {} timer not running", cookie);
        };
        self.ctrl.handle_timer(ticket);
    }

    /// Duration the running timer of `cookie` was armed with.
    pub fn armed_for(&self, cookie: RocCookie) -> Option<Duration> {
        match self.ctrl.roc_queue().get(cookie)?.timer {
            RocTimer::Running(ticket) => self.armed(ticket),
            _ => None,
        }
    }

    pub fn armed(&self, ticket: TimerTicket) -> Option<Duration> {
        self.timers.lock().unwrap().active.get(&ticket).copied()
    }

    pub fn active_timers(&self) -> usize {
        self.timers.lock().unwrap().active.len()
    }

    pub fn probe_rx_registered(&self) -> bool {
        self.mgmt
            .lock()
            .unwrap()
            .rx_registered
            .contains(&RxFrameType::ProbeReq)
    }

    pub fn roc_events(&self) -> Vec<RocEvent> {
        self.events.roc.lock().unwrap().clone()
    }

    pub fn tx_confs(&self) -> Vec<TxConfirmation> {
        self.events.tx.lock().unwrap().clone()
    }
}
