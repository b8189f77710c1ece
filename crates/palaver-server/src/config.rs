//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (PALAVER_*)
//! - TOML configuration file
//! - Command line switches (override the loaded values)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application name, used for the identity certificate subject.
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Security configuration.
    #[serde(default)]
    pub security: SecurityConfig,

    /// Run configuration.
    #[serde(default)]
    pub run: RunConfig,

    /// Session monitor configuration.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Security configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Accept untrusted client certificates.
    #[serde(default = "default_auto_accept")]
    pub auto_accept_untrusted: bool,
}

/// Run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Run duration in seconds; 0 runs until externally interrupted.
    #[serde(default = "default_run_seconds")]
    pub seconds: u64,
}

/// Session monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Polling period in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Idleness threshold in milliseconds.
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold_ms: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_application_name() -> String {
    std::env::var("PALAVER_APP_NAME").unwrap_or_else(|_| "palaver".to_string())
}

fn default_auto_accept() -> bool {
    std::env::var("PALAVER_AUTO_ACCEPT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(false)
}

fn default_run_seconds() -> u64 {
    std::env::var("PALAVER_RUN_SECONDS")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    1_000
}

fn default_idle_threshold() -> u64 {
    6_000
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            application_name: default_application_name(),
            security: SecurityConfig::default(),
            run: RunConfig::default(),
            monitor: MonitorConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            auto_accept_untrusted: default_auto_accept(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seconds: default_run_seconds(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            idle_threshold_ms: default_idle_threshold(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "palaver.toml",
            "/etc/palaver/palaver.toml",
            "~/.config/palaver/palaver.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// The monitor's polling period.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.poll_interval_ms)
    }

    /// The monitor's idleness threshold.
    #[must_use]
    pub fn idle_threshold(&self) -> Duration {
        Duration::from_millis(self.monitor.idle_threshold_ms)
    }
}
