// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for the radscan binary.
//!
//! TOML files are searched in this order:
//! 1. Path given via `--config`
//! 2. `./radscan.toml` (current directory)
//! 3. `~/.config/radscan/config.toml`
//!
//! CLI arguments override config file values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use radscan_core::config::AnalyzerParams;
use radscan_core::source::SourceConfig;

/// Top-level configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub source: SourceConfig,
    pub analyzer: AnalyzerParams,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

fn candidate_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(path) = explicit {
        paths.push(path.to_path_buf());
    }
    paths.push(PathBuf::from("radscan.toml"));
    if let Some(home) = std::env::var_os("HOME") {
        let mut xdg = PathBuf::from(home);
        xdg.push(".config/radscan/config.toml");
        paths.push(xdg);
    }
    paths
}

impl Config {
    /// Load the first config file found; defaults when none exists. An
    /// explicitly named file that fails to parse is an error, the implicit
    /// candidates are skipped silently when absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self, String> {
        for (index, path) in candidate_paths(explicit).iter().enumerate() {
            let explicit_choice = explicit.is_some() && index == 0;
            match std::fs::read_to_string(path) {
                Ok(text) => {
                    tracing::debug!("loading configuration from {}", path.display());
                    return toml::from_str(&text)
                        .map_err(|e| format!("{}: {e}", path.display()));
                }
                Err(_) if !explicit_choice => continue,
                Err(e) => return Err(format!("{}: {e}", path.display())),
            }
        }
        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radscan_core::config::AnalyzerMode;

    #[test]
    fn defaults_when_no_file() {
        let config = Config::load(None).expect("defaults");
        assert_eq!(config.analyzer.mode, AnalyzerMode::Channel);
    }

    #[test]
    fn parses_partial_toml() {
        let text = r#"
            [general]
            log_level = "debug"

            [source]
            samp_rate = 2400000

            [analyzer]
            mode = "wide_spectrum"
            min_freq_hz = 88e6
            max_freq_hz = 108e6
        "#;
        let config: Config = toml::from_str(text).expect("parse");
        assert_eq!(config.general.log_level.as_deref(), Some("debug"));
        assert_eq!(config.source.samp_rate, 2_400_000);
        assert_eq!(config.analyzer.mode, AnalyzerMode::WideSpectrum);
        assert_eq!(config.analyzer.min_freq_hz, 88.0e6);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let result = Config::load(Some(Path::new("/nonexistent/radscan.toml")));
        assert!(result.is_err());
    }
}
