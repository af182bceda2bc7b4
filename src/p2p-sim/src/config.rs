// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for p2p-sim.
//!
//! Config is loaded from the `[p2p-sim]` section of `p2p-rs.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./p2p-rs.toml`
//! 3. `~/.config/p2p-rs/p2p-rs.toml`
//! 4. `/etc/p2p-rs/p2p-rs.toml`

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use p2p_app::{ConfigError, ConfigFile};
use p2p_core::frame::PublicActionType;
use p2p_core::{Channel, RocPolicy, SimScanTiming, VdevId, VdevMode};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// How long to wait for queues to drain after the script ends (ms).
    pub settle_timeout_ms: u64,
    pub general: GeneralConfig,
    /// RoC scheduling tunables.
    pub roc: RocPolicy,
    /// Simulated scan engine timing.
    pub scan: SimScanTiming,
    /// Loopback management layer behavior.
    pub mgmt: MgmtConfig,
    #[serde(rename = "vdev")]
    pub vdevs: Vec<VdevConfig>,
    #[serde(rename = "request")]
    pub requests: Vec<RequestConfig>,
    #[serde(rename = "frame")]
    pub frames: Vec<FrameConfig>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            settle_timeout_ms: 10_000,
            general: GeneralConfig::default(),
            roc: RocPolicy::default(),
            scan: SimScanTiming::default(),
            mgmt: MgmtConfig::default(),
            vdevs: vec![VdevConfig {
                id: 0,
                mode: VdevMode::P2pDevice,
            }],
            requests: vec![RequestConfig {
                vdev: 0,
                channel: Channel::SOCIAL[1],
                duration_ms: 200,
                start_after_ms: 0,
                cancel_after_ms: None,
            }],
            frames: Vec::new(),
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MgmtConfig {
    /// Delay before a transmitted frame is acked (ms).
    pub ack_delay_ms: u64,
}

impl Default for MgmtConfig {
    fn default() -> Self {
        Self { ack_delay_ms: 3 }
    }
}

/// One virtual interface to attach at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VdevConfig {
    pub id: VdevId,
    pub mode: VdevMode,
}

/// One scripted remain-on-channel request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    pub vdev: VdevId,
    pub channel: Channel,
    pub duration_ms: u64,
    /// Delay from scenario start before the request is issued (ms).
    #[serde(default)]
    pub start_after_ms: u64,
    /// Cancel the request this long after it was queued (ms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_after_ms: Option<u64>,
}

/// One scripted P2P public action transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameConfig {
    pub vdev: VdevId,
    pub channel: Channel,
    pub action: PublicActionType,
    #[serde(default)]
    pub wait_ms: u64,
    #[serde(default = "default_true")]
    pub off_chan: bool,
    #[serde(default)]
    pub no_ack: bool,
    #[serde(default)]
    pub send_after_ms: u64,
}

fn default_true() -> bool {
    true
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.general.log_level.as_deref())?;
        self.roc.validate().map_err(|e| format!("[roc] {}", e))?;

        if self.settle_timeout_ms == 0 {
            return Err("settle_timeout_ms must be > 0".to_string());
        }

        let mut ids = HashSet::new();
        for vdev in &self.vdevs {
            if !ids.insert(vdev.id) {
                return Err(format!("[[vdev]] id {} is defined twice", vdev.id));
            }
        }

        for (idx, req) in self.requests.iter().enumerate() {
            if !ids.contains(&req.vdev) {
                return Err(format!(
                    "[[request]] #{} uses unknown vdev {}",
                    idx, req.vdev
                ));
            }
            if req.duration_ms == 0 {
                return Err(format!("[[request]] #{} duration_ms must be > 0", idx));
            }
        }

        for (idx, frame) in self.frames.iter().enumerate() {
            if !ids.contains(&frame.vdev) {
                return Err(format!(
                    "[[frame]] #{} uses unknown vdev {}",
                    idx, frame.vdev
                ));
            }
        }
        Ok(())
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        <Self as ConfigFile>::load_from_file(path)
    }

    /// Load configuration from the default search paths.
    /// Returns default config if no config file is found.
    pub fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        <Self as ConfigFile>::load_from_default_paths()
    }

    /// Example configuration under the `[p2p-sim]` header, for a combined
    /// `p2p-rs.toml`.
    pub fn example_combined_toml() -> String {
        #[derive(serde::Serialize)]
        struct Wrapper {
            #[serde(rename = "p2p-sim")]
            inner: SimConfig,
        }
        let example = SimConfig {
            general: GeneralConfig {
                log_level: Some("info".to_string()),
            },
            vdevs: vec![
                VdevConfig {
                    id: 0,
                    mode: VdevMode::P2pDevice,
                },
                VdevConfig {
                    id: 1,
                    mode: VdevMode::P2pClient,
                },
            ],
            requests: vec![
                RequestConfig {
                    vdev: 0,
                    channel: Channel::SOCIAL[1],
                    duration_ms: 200,
                    start_after_ms: 0,
                    cancel_after_ms: None,
                },
                RequestConfig {
                    vdev: 1,
                    channel: Channel::SOCIAL[0],
                    duration_ms: 100,
                    start_after_ms: 50,
                    cancel_after_ms: Some(100),
                },
            ],
            frames: vec![FrameConfig {
                vdev: 0,
                channel: Channel::SOCIAL[2],
                action: PublicActionType::ProvDisReq,
                wait_ms: 100,
                off_chan: true,
                no_ack: false,
                send_after_ms: 0,
            }],
            ..SimConfig::default()
        };
        toml::to_string_pretty(&Wrapper { inner: example }).unwrap_or_default()
    }
}

fn validate_log_level(level: Option<&str>) -> Result<(), String> {
    if let Some(level) = level {
        match level {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(format!(
                    "[general].log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
                    level
                ))
            }
        }
    }
    Ok(())
}

impl ConfigFile for SimConfig {
    fn section_key() -> &'static str {
        "p2p-sim"
    }
}
