//! CLI configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the console client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// USB transport settings.
    pub usb: UsbConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// USB transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UsbConfig {
    /// Per-transfer I/O deadline in milliseconds.
    pub io_timeout_ms: u64,
    /// Vendor ids to surface in addition to the built-in allowlist.
    pub extra_vendor_ids: Vec<u16>,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (overridden by `RUST_LOG`).
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            usb: UsbConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            io_timeout_ms: 15_000,
            extra_vendor_ids: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl CliConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::debug!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
