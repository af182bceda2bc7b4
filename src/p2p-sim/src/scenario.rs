// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Scripted run of one simulated radio.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use p2p_core::frame::build_public_action;
use p2p_core::{
    CleanupReport, DynResult, LoopbackMgmtLayer, MgmtTxRequest, P2pError, P2pListener, P2pResult,
    P2pSoc, P2pVdev, RocEvent, SimScanEngine, TxConfirmation, TxCookie, VdevId,
};

use crate::config::{FrameConfig, RequestConfig, SimConfig};

const RETRY_DELAY: Duration = Duration::from_millis(50);

/// One line of simulator output.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SimOutput {
    Roc(RocEvent),
    TxConfirm {
        vdev_id: VdevId,
        cookie: Option<TxCookie>,
        acked: bool,
        len: usize,
    },
    Cleanup(CleanupReport),
}

struct OutputListener(mpsc::UnboundedSender<SimOutput>);

impl P2pListener for OutputListener {
    fn on_roc_event(&self, event: &RocEvent) {
        let _ = self.0.send(SimOutput::Roc(event.clone()));
    }

    fn on_tx_confirm(&self, conf: &TxConfirmation) {
        let _ = self.0.send(SimOutput::TxConfirm {
            vdev_id: conf.vdev_id,
            cookie: conf.cookie,
            acked: conf.acked,
            len: conf.frame.len(),
        });
    }
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

/// Run `op`, and run it once more if the first failure may clear up.
pub async fn retry_once<T, F, Fut>(what: &str, mut op: F) -> P2pResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = P2pResult<T>>,
{
    match op().await {
        Err(e) if e.is_transient() => {
            warn!("{} failed ({}), retrying in {:?}", what, e, RETRY_DELAY);
            tokio::time::sleep(RETRY_DELAY).await;
            op().await
        }
        other => other,
    }
}

async fn run_request(vdev: Arc<P2pVdev>, req: RequestConfig) -> P2pResult<()> {
    tokio::time::sleep(ms(req.start_after_ms)).await;
    let (chan, duration) = (req.channel, ms(req.duration_ms));
    let target: &P2pVdev = &vdev;
    let cookie = retry_once("remain on channel", move || {
        target.remain_on_channel(chan, duration)
    })
    .await?;
    info!(
        "vdev {}: roc {} queued on channel {} for {:?}",
        vdev.id(),
        cookie,
        chan,
        duration
    );

    if let Some(after) = req.cancel_after_ms {
        tokio::time::sleep(ms(after)).await;
        match vdev.cancel_remain_on_channel(cookie).await {
            Ok(()) => info!("vdev {}: roc {} cancel requested", vdev.id(), cookie),
            Err(P2pError::NotFound(_)) => debug!("roc {} already finished", cookie),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

async fn run_frame(vdev: Arc<P2pVdev>, frame: FrameConfig) -> P2pResult<()> {
    tokio::time::sleep(ms(frame.send_after_ms)).await;
    let req = MgmtTxRequest {
        vdev_id: vdev.id(),
        chan: frame.channel,
        wait: ms(frame.wait_ms),
        off_chan: frame.off_chan,
        no_cck: true,
        no_ack: frame.no_ack,
        frame: build_public_action(frame.action, 1),
    };
    let target: &P2pVdev = &vdev;
    let cookie = retry_once("mgmt tx", move || target.mgmt_tx(req.clone())).await?;
    info!(
        "vdev {}: {} queued for tx on channel {} as {}",
        vdev.id(),
        frame.action.name(),
        frame.channel,
        cookie
    );
    Ok(())
}

fn vdev_for(vdevs: &HashMap<VdevId, Arc<P2pVdev>>, id: VdevId) -> P2pResult<Arc<P2pVdev>> {
    vdevs
        .get(&id)
        .cloned()
        .ok_or_else(|| P2pError::invalid_argument(format!("vdev {} not attached", id)))
}

/// Bring a radio up, play the script, wait for the queues to drain and
/// tear everything down again.
pub async fn run_scenario(
    cfg: &SimConfig,
    out: mpsc::UnboundedSender<SimOutput>,
) -> DynResult<CleanupReport> {
    let mut soc = P2pSoc::attach(cfg.roc.clone())?;
    let handle = soc.open(
        Box::new(SimScanEngine::new(cfg.scan.clone())),
        Box::new(LoopbackMgmtLayer::new(ms(cfg.mgmt.ack_delay_ms))),
    )?;
    soc.start(Arc::new(OutputListener(out.clone()))).await?;

    let mut vdevs = HashMap::new();
    for vdev in &cfg.vdevs {
        let attached = soc.vdev_attach(vdev.id, vdev.mode).await?;
        vdevs.insert(vdev.id, Arc::new(attached));
    }

    let mut script = JoinSet::new();
    for req in &cfg.requests {
        script.spawn(run_request(vdev_for(&vdevs, req.vdev)?, req.clone()));
    }
    for frame in &cfg.frames {
        script.spawn(run_frame(vdev_for(&vdevs, frame.vdev)?, frame.clone()));
    }
    while let Some(joined) = script.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("scripted step failed: {}", e),
            Err(e) => warn!("scripted step panicked: {}", e),
        }
    }

    let settle = ms(cfg.settle_timeout_ms);
    let mut snapshots = handle.subscribe();
    let drained = tokio::time::timeout(
        settle,
        snapshots.wait_for(|s| s.roc_queue.is_empty() && s.tx_wait_roc == 0 && s.tx_wait_ack == 0),
    )
    .await
    .map(|waited| waited.is_ok());
    match drained {
        Ok(true) => debug!("queues drained"),
        Ok(false) => return Err(P2pError::Closed.into()),
        Err(_) => warn!("queues did not drain within {:?}", settle),
    }

    let mut report = CleanupReport::default();
    for (id, vdev) in vdevs {
        let Ok(vdev) = Arc::try_unwrap(vdev) else {
            warn!("vdev {} still referenced, leaving it to close", id);
            continue;
        };
        let detached = vdev.detach().await?;
        report.canceled += detached.canceled;
        report.timed_out += detached.timed_out;
    }
    let closed = soc.close().await?;
    report.canceled += closed.canceled;
    report.timed_out += closed.timed_out;
    soc.detach()?;

    let _ = out.send(SimOutput::Cleanup(report));
    Ok(report)
}
