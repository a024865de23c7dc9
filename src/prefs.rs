//! User preferences.
//!
//! Optional defaults read from ~/.config/icmptrace/config.toml. Command-line
//! flags take precedence over anything set here.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// User preferences
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prefs {
    /// Probes per batch
    pub count: Option<u16>,
    /// Ping TTL
    pub ttl: Option<u8>,
    /// Traceroute hop ceiling
    pub max_ttl: Option<u8>,
    /// Reply wait budget in seconds
    pub wait: Option<f64>,
    /// Socket timeout in seconds
    pub socket_timeout: Option<f64>,
}

impl Prefs {
    /// Get config file path: ~/.config/icmptrace/config.toml
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("icmptrace").join("config.toml"))
    }

    /// Load preferences from disk (returns default if missing/invalid)
    pub fn load() -> Self {
        Self::path()
            .and_then(|p| fs::read_to_string(p).ok())
            .map(|s| Self::parse(&s))
            .unwrap_or_default()
    }

    /// Parse preferences, falling back to defaults on invalid TOML
    pub fn parse(s: &str) -> Self {
        match toml::from_str(s) {
            Ok(prefs) => prefs,
            Err(e) => {
                log::warn!("ignoring invalid preferences file: {}", e);
                Self::default()
            }
        }
    }
}
