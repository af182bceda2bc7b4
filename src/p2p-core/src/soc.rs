// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Radio and interface lifecycle.
//!
//! A [`P2pSoc`] goes attach -> open -> start -> stop -> close -> detach.
//! Opening spawns the controller task; everything after that talks to the
//! task through a [`P2pHandle`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::controller::command::{MgmtTxRequest, RocRequest};
use crate::controller::engine::{MgmtEventSender, MgmtFrameLayer, ScanEngine, ScanEventSender};
use crate::controller::events::{ListenerId, P2pListener};
use crate::controller::machine::P2pController;
use crate::controller::policies::RocPolicy;
use crate::controller::timer::TokioTimerService;
use crate::error::{P2pError, P2pResult};
use crate::radio::{Channel, VdevId, VdevMode};
use crate::roc::RocCookie;
use crate::task::{run_p2p_task, snapshot_from, CleanupReport, P2pHandle};
use crate::tx::TxCookie;
use crate::DynResult;

/// Per-radio P2P object.
pub struct P2pSoc {
    policy: RocPolicy,
    handle: Option<P2pHandle>,
    task: Option<JoinHandle<DynResult<()>>>,
    started: bool,
}

impl P2pSoc {
    pub fn attach(policy: RocPolicy) -> P2pResult<Self> {
        policy.validate().map_err(P2pError::invalid_argument)?;
        Ok(Self {
            policy,
            handle: None,
            task: None,
            started: false,
        })
    }

    /// Wire up the collaborators and spawn the controller task.
    pub fn open(
        &mut self,
        scan: Box<dyn ScanEngine>,
        mgmt: Box<dyn MgmtFrameLayer>,
    ) -> P2pResult<P2pHandle> {
        if self.handle.is_some() {
            return Err(P2pError::invalid_state("radio already open"));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let timers = TokioTimerService::new(tx.clone());
        let mut controller =
            P2pController::new(self.policy.clone(), scan, mgmt, Box::new(timers));
        controller.open(
            ScanEventSender::new(tx.clone()),
            MgmtEventSender::new(tx.clone()),
        )?;

        let (snapshot_tx, snapshot_rx) = watch::channel(snapshot_from(&controller));
        self.task = Some(tokio::spawn(run_p2p_task(controller, rx, snapshot_tx)));
        let handle = P2pHandle::new(tx, snapshot_rx, self.policy.cancel_wait());
        self.handle = Some(handle.clone());
        info!("P2P radio open");
        Ok(handle)
    }

    pub fn handle(&self) -> P2pResult<&P2pHandle> {
        self.handle
            .as_ref()
            .ok_or_else(|| P2pError::invalid_state("radio not open"))
    }

    pub async fn start(&mut self, listener: Arc<dyn P2pListener>) -> P2pResult<ListenerId> {
        if self.started {
            return Err(P2pError::invalid_state("radio already started"));
        }
        let id = self.handle()?.start(listener).await?;
        self.started = true;
        Ok(id)
    }

    /// Clean up every RoC, fail pending tx and drop the listener.
    pub async fn stop(&mut self) -> P2pResult<CleanupReport> {
        if !self.started {
            return Err(P2pError::invalid_state("radio not started"));
        }
        let handle = self.handle()?;
        let report = handle.cleanup(None).await?;
        handle.stop().await?;
        self.started = false;
        Ok(report)
    }

    /// Stop if needed, clean up and join the controller task.
    pub async fn close(&mut self) -> P2pResult<CleanupReport> {
        let report = if self.started {
            self.stop().await?
        } else {
            self.handle()?.cleanup(None).await?
        };
        let Some(handle) = self.handle.take() else {
            return Err(P2pError::invalid_state("radio not open"));
        };
        handle.shutdown().await?;
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("P2P controller task failed: {}", e),
                Err(e) => error!("P2P controller task panicked: {}", e),
            }
        }
        info!("P2P radio closed");
        Ok(report)
    }

    pub fn detach(self) -> P2pResult<()> {
        if self.handle.is_some() {
            return Err(P2pError::invalid_state("radio still open"));
        }
        Ok(())
    }

    pub async fn vdev_attach(&self, vdev_id: VdevId, mode: VdevMode) -> P2pResult<P2pVdev> {
        let handle = self.handle()?.clone();
        handle.attach_vdev(vdev_id, mode).await?;
        Ok(P2pVdev {
            vdev_id,
            mode,
            handle,
        })
    }
}

/// Per-interface view of a radio.
pub struct P2pVdev {
    vdev_id: VdevId,
    mode: VdevMode,
    handle: P2pHandle,
}

impl P2pVdev {
    pub fn id(&self) -> VdevId {
        self.vdev_id
    }

    pub fn mode(&self) -> VdevMode {
        self.mode
    }

    pub async fn remain_on_channel(
        &self,
        chan: Channel,
        duration: Duration,
    ) -> P2pResult<RocCookie> {
        self.handle
            .remain_on_channel(RocRequest::new(self.vdev_id, chan, duration))
            .await
    }

    pub async fn cancel_remain_on_channel(&self, cookie: RocCookie) -> P2pResult<()> {
        self.handle.cancel_remain_on_channel(cookie).await
    }

    /// Send a management frame from this interface.
    pub async fn mgmt_tx(&self, mut req: MgmtTxRequest) -> P2pResult<TxCookie> {
        req.vdev_id = self.vdev_id;
        self.handle.mgmt_tx(req).await
    }

    pub async fn mgmt_tx_cancel(&self, cookie: TxCookie) -> P2pResult<()> {
        self.handle.mgmt_tx_cancel(cookie).await
    }

    /// Clean up this interface's RoC contexts and forget it.
    pub async fn detach(self) -> P2pResult<CleanupReport> {
        let report = self.handle.cleanup(Some(self.vdev_id)).await?;
        self.handle.detach_vdev(self.vdev_id).await?;
        Ok(report)
    }
}
