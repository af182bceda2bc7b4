// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::{Deserialize, Serialize};

/// Virtual interface id, unique per radio.
pub type VdevId = u8;

/// Operating mode of a virtual interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VdevMode {
    Sta,
    Sap,
    P2pClient,
    P2pGo,
    P2pDevice,
}

impl VdevMode {
    /// Probe responses are answered by firmware in these modes, never by host tx.
    #[must_use]
    pub fn drops_probe_response(self) -> bool {
        matches!(self, Self::Sta | Self::Sap | Self::P2pGo)
    }
}
