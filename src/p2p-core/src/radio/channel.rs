// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{P2pError, P2pResult};

const CHAN_14_FREQ_MHZ: u32 = 2484;
const BAND_2G_BASE_MHZ: u32 = 2407;
const BAND_5G_BASE_MHZ: u32 = 5000;
const MAX_2G_CHAN: u8 = 14;
const MIN_5G_CHAN: u8 = 32;
const MAX_5G_CHAN: u8 = 177;

/// IEEE channel number in the 2.4 GHz or 5 GHz band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Channel(u8);

impl Channel {
    /// P2P social channels 1, 6 and 11 used for device discovery.
    pub const SOCIAL: [Channel; 3] = [Channel(1), Channel(6), Channel(11)];

    pub fn new(number: u8) -> P2pResult<Self> {
        let valid = (1..=MAX_2G_CHAN).contains(&number)
            || (MIN_5G_CHAN..=MAX_5G_CHAN).contains(&number);
        if !valid {
            return Err(P2pError::invalid_argument(format!(
                "channel {} is outside the 2.4/5 GHz ranges",
                number
            )));
        }
        Ok(Self(number))
    }

    #[must_use]
    pub fn number(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn is_2ghz(self) -> bool {
        self.0 <= MAX_2G_CHAN
    }

    /// Center frequency in MHz.
    #[must_use]
    pub fn freq_mhz(self) -> u32 {
        let chan = u32::from(self.0);
        if self.0 == MAX_2G_CHAN {
            CHAN_14_FREQ_MHZ
        } else if self.is_2ghz() {
            BAND_2G_BASE_MHZ + 5 * chan
        } else {
            BAND_5G_BASE_MHZ + 5 * chan
        }
    }
}

impl TryFrom<u8> for Channel {
    type Error = P2pError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Channel> for u8 {
    fn from(chan: Channel) -> Self {
        chan.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// PHY mode requested for the listen period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhyMode {
    #[default]
    Auto,
    Legacy,
    Ht20,
    Ht40,
    Vht80,
}
