// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Simulated collaborators.
//!
//! `SimScanEngine` parks a pretend radio with tokio timers and reports the
//! same event sequence a firmware scan engine would. `LoopbackMgmtLayer`
//! records outbound frames and acks them after a short delay.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::controller::engine::{
    ListenScanRequest, MgmtEventSender, MgmtFrameLayer, OutboundFrame, RequesterId, RxFrameType,
    ScanEngine, ScanEvent, ScanEventKind, ScanEventSender, ScanId,
};
use crate::controller::events::{P2pEvent, TxAckEvent};
use crate::error::{P2pError, P2pResult};
use crate::radio::VdevId;

/// Timing of the simulated scan engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimScanTiming {
    /// Delay before the scan reports started (ms).
    pub start_delay_ms: u64,
    /// Channel switch time before foreign channel is reported (ms).
    pub switch_delay_ms: u64,
    /// Time to return to the home channel after an abort (ms).
    pub abort_delay_ms: u64,
    /// Finish the scan after its dwell time without being aborted.
    pub self_complete: bool,
}

impl Default for SimScanTiming {
    fn default() -> Self {
        Self {
            start_delay_ms: 5,
            switch_delay_ms: 20,
            abort_delay_ms: 5,
            self_complete: true,
        }
    }
}

/// Fault injection and counters shared with a [`SimScanEngine`].
#[derive(Debug, Default)]
pub struct SimScanControl {
    fail_starts: AtomicU32,
    ignore_aborts: AtomicBool,
    started: AtomicU64,
    aborted: AtomicU64,
}

impl SimScanControl {
    /// Fail the next `count` scan starts.
    pub fn fail_next_starts(&self, count: u32) {
        self.fail_starts.store(count, Ordering::SeqCst);
    }

    /// Swallow aborts without ever reporting completion.
    pub fn set_ignore_aborts(&self, ignore: bool) {
        self.ignore_aborts.store(ignore, Ordering::SeqCst);
    }

    pub fn started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }

    pub fn aborted(&self) -> u64 {
        self.aborted.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.fail_starts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

pub struct SimScanEngine {
    timing: SimScanTiming,
    control: Arc<SimScanControl>,
    requesters: HashMap<RequesterId, ScanEventSender>,
    next_requester: u32,
    next_scan: u32,
    scans: HashMap<ScanId, AbortHandle>,
}

impl SimScanEngine {
    pub fn new(timing: SimScanTiming) -> Self {
        Self {
            timing,
            control: Arc::new(SimScanControl::default()),
            requesters: HashMap::new(),
            next_requester: 0,
            next_scan: 0,
            scans: HashMap::new(),
        }
    }

    pub fn control(&self) -> Arc<SimScanControl> {
        self.control.clone()
    }

    fn events_for(&self, requester: RequesterId) -> P2pResult<ScanEventSender> {
        self.requesters
            .get(&requester)
            .cloned()
            .ok_or_else(|| P2pError::not_found(format!("scan requester {:?}", requester)))
    }
}

impl ScanEngine for SimScanEngine {
    fn register_requester(
        &mut self,
        name: &str,
        events: ScanEventSender,
    ) -> P2pResult<RequesterId> {
        self.next_requester += 1;
        let requester = RequesterId(self.next_requester);
        self.requesters.insert(requester, events);
        debug!("sim scan: requester {} registered as {:?}", name, requester);
        Ok(requester)
    }

    fn unregister_requester(&mut self, requester: RequesterId) {
        self.requesters.remove(&requester);
    }

    fn start(&mut self, req: ListenScanRequest) -> P2pResult<ScanId> {
        if self.control.take_failure() {
            return Err(P2pError::engine("simulated scan start failure"));
        }
        let events = self.events_for(req.requester)?;
        self.scans.retain(|_, task| !task.is_finished());
        self.next_scan += 1;
        let scan_id = ScanId(self.next_scan);
        self.control.started.fetch_add(1, Ordering::SeqCst);

        debug!(
            "sim scan {}: vdev {} chan {} dwell {:?}",
            scan_id, req.vdev_id, req.chan, req.dwell
        );

        let timing = self.timing.clone();
        let (requester, vdev_id, dwell) = (req.requester, req.vdev_id, req.dwell);
        let post = move |kind| {
            events.send(ScanEvent {
                requester,
                vdev_id,
                scan_id,
                kind,
            })
        };
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(timing.start_delay_ms)).await;
            post(ScanEventKind::Started)?;
            tokio::time::sleep(Duration::from_millis(timing.switch_delay_ms)).await;
            post(ScanEventKind::ForeignChannel)?;
            if timing.self_complete {
                tokio::time::sleep(dwell).await;
                post(ScanEventKind::Completed)?;
            }
            Ok::<(), P2pError>(())
        });
        self.scans.insert(scan_id, task.abort_handle());
        Ok(scan_id)
    }

    fn cancel(&mut self, requester: RequesterId, vdev_id: VdevId, scan_id: ScanId) -> P2pResult<()> {
        let task = self
            .scans
            .remove(&scan_id)
            .ok_or_else(|| P2pError::not_found(format!("scan {} not running", scan_id)))?;
        task.abort();
        self.control.aborted.fetch_add(1, Ordering::SeqCst);
        if self.control.ignore_aborts.load(Ordering::SeqCst) {
            warn!("sim scan {}: abort swallowed", scan_id);
            return Ok(());
        }

        let events = self.events_for(requester)?;
        let delay = Duration::from_millis(self.timing.abort_delay_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(ScanEvent {
                requester,
                vdev_id,
                scan_id,
                kind: ScanEventKind::Completed,
            });
        });
        Ok(())
    }
}

/// Mgmt layer that acks every frame it is handed.
pub struct LoopbackMgmtLayer {
    events: Option<MgmtEventSender>,
    ack_delay: Duration,
    sent: Arc<Mutex<Vec<OutboundFrame>>>,
    rx_types: HashSet<RxFrameType>,
}

impl LoopbackMgmtLayer {
    pub fn new(ack_delay: Duration) -> Self {
        Self {
            events: None,
            ack_delay,
            sent: Arc::new(Mutex::new(Vec::new())),
            rx_types: HashSet::new(),
        }
    }

    /// Shared log of transmitted frames.
    pub fn sent_log(&self) -> Arc<Mutex<Vec<OutboundFrame>>> {
        self.sent.clone()
    }
}

impl MgmtFrameLayer for LoopbackMgmtLayer {
    fn connect(&mut self, events: MgmtEventSender) {
        self.events = Some(events);
    }

    fn disconnect(&mut self) {
        self.events = None;
        self.rx_types.clear();
    }

    fn register_rx(&mut self, types: &[RxFrameType]) -> P2pResult<()> {
        self.rx_types.extend(types);
        Ok(())
    }

    fn deregister_rx(&mut self, types: &[RxFrameType]) -> P2pResult<()> {
        for t in types {
            self.rx_types.remove(t);
        }
        Ok(())
    }

    fn transmit(&mut self, frame: OutboundFrame) -> P2pResult<()> {
        let events = self
            .events
            .clone()
            .ok_or_else(|| P2pError::invalid_state("mgmt layer not connected"))?;
        debug!(
            "loopback tx {}: vdev {} {} MHz, {} bytes",
            frame.cookie,
            frame.vdev_id,
            frame.freq_mhz,
            frame.frame.len()
        );
        let (cookie, no_ack) = (frame.cookie, frame.no_ack);
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(frame);

        if !no_ack {
            let delay = self.ack_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = events.send(P2pEvent::MgmtTxAckConfirmation(TxAckEvent {
                    cookie,
                    acked: true,
                }));
            });
        }
        Ok(())
    }
}
