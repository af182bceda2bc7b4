// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod arena;
pub mod controller;
pub mod error;
pub mod frame;
pub mod radio;
pub mod roc;
pub mod sim;
pub mod soc;
pub mod task;
pub mod tx;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use controller::command::{MgmtTxRequest, P2pCommand, P2pReply, RocRequest};
pub use controller::events::{P2pEvent, P2pListener, RocEvent, RocEventKind, TxConfirmation};
pub use controller::policies::RocPolicy;
pub use error::{P2pError, P2pResult};
pub use radio::{Channel, PhyMode, VdevId, VdevMode};
pub use roc::{RocCookie, RocState, RocType};
pub use soc::{P2pSoc, P2pVdev};
pub use sim::{LoopbackMgmtLayer, SimScanControl, SimScanEngine, SimScanTiming};
pub use task::{CleanupReport, P2pHandle, P2pSnapshot};
pub use tx::TxCookie;
