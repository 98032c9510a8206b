use crate::health::HealthThresholds;
use crate::layout::{ForceConfig, Viewport};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Main configuration structure for Routemap.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub health: HealthThresholds,

    #[serde(default)]
    pub routes: RoutesConfig,

    #[serde(default)]
    pub layout: LayoutConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path.as_ref()).context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the file is missing.
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    "Failed to load config from {:?}: {}. Using defaults.",
                    path.as_ref(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Get the default configuration as a TOML string.
    pub fn default_toml() -> Result<String> {
        let config = Self::default();
        toml::to_string_pretty(&config).context("Failed to serialize default config")
    }

    /// Validate the configuration for obvious misconfiguration.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.ingest.lookback_minutes == 0 {
            anyhow::bail!("ingest.lookback_minutes must be greater than 0");
        }

        if self.ingest.max_records == 0 {
            anyhow::bail!("ingest.max_records must be greater than 0");
        }

        if self.health.healthy_loss_pct >= self.health.critical_loss_pct {
            anyhow::bail!("health.healthy_loss_pct must be below health.critical_loss_pct");
        }

        if self.health.healthy_latency_ms >= self.health.critical_latency_ms {
            anyhow::bail!("health.healthy_latency_ms must be below health.critical_latency_ms");
        }

        if self.layout.force.max_iterations == 0 {
            anyhow::bail!("layout.force.max_iterations must be greater than 0");
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!("Invalid log level: {}", other),
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).context("Failed to parse config")?;
        Ok(config)
    }
}

/// Runtime server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub verbose: bool,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            verbose: false,
            cors_enabled: true,
            cors_origins: default_cors_origins(),
        }
    }
}

/// Data window configuration: how much of the record stream each rebuild
/// considers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    #[serde(default = "default_lookback_minutes")]
    pub lookback_minutes: u64,

    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            lookback_minutes: default_lookback_minutes(),
            max_records: default_max_records(),
        }
    }
}

/// Route grouping configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutesConfig {
    /// Max loss above which a route group counts as having an issue.
    #[serde(default = "default_issue_loss_pct")]
    pub issue_loss_pct: f64,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            issue_loss_pct: default_issue_loss_pct(),
        }
    }
}

/// Layout configuration: viewport plus force tuning.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LayoutConfig {
    #[serde(default)]
    pub viewport: Viewport,

    #[serde(default)]
    pub force: ForceConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub include_modules: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            include_modules: false,
        }
    }
}

// Default providers ---------------------------------------------------------

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_lookback_minutes() -> u64 {
    60
}

fn default_max_records() -> usize {
    10_000
}

fn default_issue_loss_pct() -> f64 {
    10.0
}

fn default_log_level() -> String {
    "info".to_string()
}

// Tests ---------------------------------------------------------------------
