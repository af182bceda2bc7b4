// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Command and event routing into the controller handlers.

use tracing::{debug, info, warn};

use crate::error::P2pResult;

use super::command::{P2pCommand, P2pReply};
use super::events::{NoaInfo, P2pEvent};
use super::machine::P2pController;

impl P2pController {
    /// Route one command to exactly one handler.
    pub fn dispatch_command(&mut self, cmd: P2pCommand) -> P2pResult<P2pReply> {
        let kind = cmd.kind();
        let result = match cmd {
            P2pCommand::RocRequest(req) => self.process_roc_req(req).map(P2pReply::RocQueued),
            P2pCommand::CancelRoc(cookie) => self
                .process_cancel_roc_req(cookie)
                .map(|()| P2pReply::RocCancelled),
            P2pCommand::MgmtTx(req) => self.process_mgmt_tx(req).map(P2pReply::TxQueued),
            P2pCommand::MgmtTxCancel(cookie) => self
                .process_mgmt_tx_cancel(cookie)
                .map(|()| P2pReply::TxCancelled),
        };
        match &result {
            Ok(reply) => debug!("{:?} -> {:?}", kind, reply),
            Err(e) => warn!("{:?} failed: {}", kind, e),
        }
        result
    }

    /// Route one lower-layer event to exactly one handler.
    pub fn dispatch_event(&mut self, event: P2pEvent) -> P2pResult<()> {
        let kind = event.kind();
        let result = match event {
            P2pEvent::MgmtTxAckConfirmation(ack) => self.process_tx_ack(ack),
            P2pEvent::RxMgmt(frame) => self.process_rx_mgmt(frame),
            P2pEvent::ListenOffloadStopped(info) => {
                info!(
                    "listen offload stopped on vdev {} (reason {})",
                    info.vdev_id, info.reason_code
                );
                self.emitter.notify_listen_offload_stopped(&info);
                Ok(())
            }
            P2pEvent::NoticeOfAbsence(noa) => self.process_noa(noa),
        };
        if let Err(e) = &result {
            warn!("{:?} event failed: {}", kind, e);
        }
        result
    }

    fn process_noa(&mut self, noa: NoaInfo) -> P2pResult<()> {
        self.store_noa(noa)
    }
}
