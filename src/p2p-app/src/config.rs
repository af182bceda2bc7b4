// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config file {0}: {1}")]
    ParseError(PathBuf, String),
}

/// Default search paths for `p2p-rs.toml`: current directory, XDG config,
/// then /etc.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("p2p-rs.toml")];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("p2p-rs").join("p2p-rs.toml"));
    }
    paths.push(PathBuf::from("/etc/p2p-rs/p2p-rs.toml"));
    paths
}

/// Deserialize the `[key]` table of a TOML document.
///
/// `Ok(None)` when the section is absent.
fn parse_section<T: DeserializeOwned>(
    path: &Path,
    content: &str,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let table: toml::Table = toml::from_str(content).map_err(|e| parse_error(path, e))?;
    let Some(section) = table.get(key) else {
        return Ok(None);
    };

    // Round-trip through a string so serde defaults apply to missing keys.
    let section_toml = toml::to_string(section).map_err(|e| parse_error(path, e))?;
    let cfg = toml::from_str::<T>(&section_toml).map_err(|e| parse_error(path, e))?;
    Ok(Some(cfg))
}

fn parse_error(path: &Path, e: impl std::fmt::Display) -> ConfigError {
    ConfigError::ParseError(path.to_path_buf(), e.to_string())
}

fn load_section_from_file<T: DeserializeOwned>(
    path: &Path,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;
    parse_section(path, &content, key)
}

/// Trait for loading configuration from a `p2p-rs.toml` section.
pub trait ConfigFile: Sized + Default + DeserializeOwned {
    /// Section key in `p2p-rs.toml` (e.g. `"p2p-sim"`).
    fn section_key() -> &'static str;

    /// Load the section from a specific file path.
    ///
    /// Fails if the file cannot be read, is not valid TOML, or has no
    /// `[<section_key>]` table.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        load_section_from_file::<Self>(path, Self::section_key())?.ok_or_else(|| {
            ConfigError::ParseError(
                path.to_path_buf(),
                format!("missing [{}] section", Self::section_key()),
            )
        })
    }

    /// Load the first default path that has the expected section.
    ///
    /// Returns `(Default::default(), None)` when none does.
    fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        for path in config_search_paths() {
            if path.exists() {
                if let Some(cfg) = load_section_from_file::<Self>(&path, Self::section_key())? {
                    return Ok((cfg, Some(path)));
                }
            }
        }
        Ok((Self::default(), None))
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        name: String,
        retries: u32,
    }

    impl ConfigFile for Sample {
        fn section_key() -> &'static str {
            "sample"
        }
    }

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "p2p-app-{}-{}.toml",
            name,
            std::process::id()
        ));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_section_defaults_fill_missing_keys() {
        let path = temp_file(
            "defaults",
            "[sample]\nname = \"radio0\"\n\n[other]\nretries = 9\n",
        );
        let cfg = Sample::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(
            cfg,
            Sample {
                name: "radio0".to_string(),
                retries: 0,
            }
        );
    }

    #[test]
    fn test_missing_section_is_an_error() {
        let path = temp_file("missing", "[other]\nretries = 1\n");
        let err = Sample::load_from_file(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(err.to_string().contains("missing [sample] section"));
    }

    #[test]
    fn test_unreadable_and_malformed_files() {
        let err = Sample::load_from_file(Path::new("/nonexistent/p2p-rs.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError(_, _)));

        let err = parse_section::<Sample>(Path::new("x.toml"), "[sample\nname=", "sample")
            .unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_, _)));
    }

    #[test]
    fn test_absent_section_parses_to_none() {
        let parsed = parse_section::<Sample>(Path::new("x.toml"), "[other]\n", "sample").unwrap();
        assert!(parsed.is_none());
    }
}
