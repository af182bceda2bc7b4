// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! P2P management frame classification.
//!
//! Only the fields the RoC scheduler cares about are decoded: the 802.11
//! frame control type/subtype and, for action frames, the Wi-Fi Direct
//! public action or P2P action subtype. Everything is bounds checked.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::controller::policies::RocPolicy;
use crate::error::{P2pError, P2pResult};

const MGMT_HEADER_LEN: usize = 24;
const FRAME_TYPE_MGMT: u8 = 0;
const SUBTYPE_PROBE_REQ: u8 = 4;
const SUBTYPE_PROBE_RSP: u8 = 5;
const SUBTYPE_ACTION: u8 = 13;

const CATEGORY_PUBLIC: u8 = 4;
const PUBLIC_ACTION_VENDOR_SPECIFIC: u8 = 9;
const CATEGORY_VENDOR_SPECIFIC: u8 = 0x7f;

/// Wi-Fi Alliance OUI followed by the P2P OUI type.
pub const P2P_OUI: [u8; 4] = [0x50, 0x6f, 0x9a, 0x09];

/// Management subtypes the P2P component handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MgmtSubtype {
    ProbeReq,
    ProbeRsp,
    Action,
}

/// Wi-Fi Direct public action frame subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublicActionType {
    NegReq,
    NegRsp,
    NegCnf,
    InvitReq,
    InvitRsp,
    DevDisReq,
    DevDisRsp,
    ProvDisReq,
    ProvDisRsp,
}

impl PublicActionType {
    fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::NegReq,
            1 => Self::NegRsp,
            2 => Self::NegCnf,
            3 => Self::InvitReq,
            4 => Self::InvitRsp,
            5 => Self::DevDisReq,
            6 => Self::DevDisRsp,
            7 => Self::ProvDisReq,
            8 => Self::ProvDisRsp,
            _ => return None,
        })
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::NegReq => 0,
            Self::NegRsp => 1,
            Self::NegCnf => 2,
            Self::InvitReq => 3,
            Self::InvitRsp => 4,
            Self::DevDisReq => 5,
            Self::DevDisRsp => 6,
            Self::ProvDisReq => 7,
            Self::ProvDisRsp => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::NegReq => "GO negotiation request",
            Self::NegRsp => "GO negotiation response",
            Self::NegCnf => "GO negotiation confirm",
            Self::InvitReq => "invitation request",
            Self::InvitRsp => "invitation response",
            Self::DevDisReq => "device discoverability request",
            Self::DevDisRsp => "device discoverability response",
            Self::ProvDisReq => "provision discovery request",
            Self::ProvDisRsp => "provision discovery response",
        }
    }
}

/// P2P (vendor-specific category) action frame subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum P2pActionType {
    NoticeOfAbsence,
    PresenceReq,
    PresenceRsp,
    GoDiscoverabilityReq,
}

impl P2pActionType {
    fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::NoticeOfAbsence,
            1 => Self::PresenceReq,
            2 => Self::PresenceRsp,
            3 => Self::GoDiscoverabilityReq,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::NoticeOfAbsence => "notice of absence",
            Self::PresenceReq => "presence request",
            Self::PresenceRsp => "presence response",
            Self::GoDiscoverabilityReq => "GO discoverability request",
        }
    }
}

/// Build a minimal Wi-Fi Direct public action frame with zeroed addresses.
pub fn build_public_action(action: PublicActionType, dialog_token: u8) -> Bytes {
    let mut buf = vec![0u8; MGMT_HEADER_LEN];
    buf[0] = SUBTYPE_ACTION << 4;
    buf.extend_from_slice(&[CATEGORY_PUBLIC, PUBLIC_ACTION_VENDOR_SPECIFIC]);
    buf.extend_from_slice(&P2P_OUI);
    buf.push(action.to_u8());
    buf.push(dialog_token);
    Bytes::from(buf)
}

/// Decoded classification of one management frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameInfo {
    pub subtype: MgmtSubtype,
    pub public_action: Option<PublicActionType>,
    pub p2p_action: Option<P2pActionType>,
}

impl FrameInfo {
    /// Classify a raw 802.11 management frame.
    pub fn parse(buf: &[u8]) -> P2pResult<Self> {
        let Some(&fc) = buf.first() else {
            return Err(P2pError::invalid_argument("empty frame"));
        };
        let frame_type = (fc & 0x0c) >> 2;
        let subtype = (fc & 0xf0) >> 4;
        if frame_type != FRAME_TYPE_MGMT {
            return Err(P2pError::invalid_argument(format!(
                "frame type {} is not management",
                frame_type
            )));
        }

        let subtype = match subtype {
            SUBTYPE_PROBE_REQ => MgmtSubtype::ProbeReq,
            SUBTYPE_PROBE_RSP => MgmtSubtype::ProbeRsp,
            SUBTYPE_ACTION => MgmtSubtype::Action,
            other => {
                return Err(P2pError::invalid_argument(format!(
                    "management subtype {} not supported",
                    other
                )))
            }
        };

        let mut info = Self {
            subtype,
            public_action: None,
            p2p_action: None,
        };
        if subtype != MgmtSubtype::Action {
            return Ok(info);
        }

        let Some(body) = buf.get(MGMT_HEADER_LEN..).filter(|b| !b.is_empty()) else {
            return Err(P2pError::invalid_argument("truncated action frame"));
        };
        match body {
            [CATEGORY_PUBLIC, PUBLIC_ACTION_VENDOR_SPECIFIC, oui @ .., ] if oui.starts_with(&P2P_OUI) => {
                info.public_action = oui
                    .get(P2P_OUI.len())
                    .copied()
                    .and_then(PublicActionType::from_u8);
            }
            [CATEGORY_VENDOR_SPECIFIC, oui @ ..] if oui.starts_with(&P2P_OUI) => {
                info.p2p_action = oui
                    .get(P2P_OUI.len())
                    .copied()
                    .and_then(P2pActionType::from_u8);
            }
            _ => {}
        }
        Ok(info)
    }

    /// True for Wi-Fi Direct public action and P2P action frames.
    #[must_use]
    pub fn is_p2p(&self) -> bool {
        self.public_action.is_some() || self.p2p_action.is_some()
    }

    /// Listen extension earned by receiving this frame during a RoC.
    ///
    /// Negotiation frames get two default waits, invitation and device
    /// discoverability requests get one.
    pub fn roc_extension(&self, policy: &RocPolicy) -> Option<Duration> {
        let wait = policy.action_default_wait();
        match self.public_action? {
            PublicActionType::NegReq | PublicActionType::NegRsp => Some(wait * 2),
            PublicActionType::InvitReq | PublicActionType::DevDisReq => Some(wait),
            _ => None,
        }
    }

    /// Extra on-channel wait after transmitting this frame.
    pub fn tx_wait_adjustment(&self, policy: &RocPolicy) -> Duration {
        match self.public_action {
            Some(PublicActionType::NegRsp | PublicActionType::ProvDisRsp) => {
                policy.action_rsp_wait()
            }
            Some(PublicActionType::NegCnf | PublicActionType::InvitRsp) => {
                policy.action_ack_wait()
            }
            _ => Duration::ZERO,
        }
    }
}

impl fmt::Display for FrameInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.subtype {
            MgmtSubtype::ProbeReq => write!(f, "probe request"),
            MgmtSubtype::ProbeRsp => write!(f, "probe response"),
            MgmtSubtype::Action => {
                if let Some(action) = self.p2p_action {
                    write!(f, "P2P {}", action.name())
                } else if let Some(action) = self.public_action {
                    write!(f, "{}", action.name())
                } else {
                    write!(f, "non-P2P action frame")
                }
            }
        }
    }
}
