//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared configuration and logging primitives for Gridsight."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_telemetry_base_url() -> String {
    "https://api.thingspeak.com".to_owned()
}

fn default_channel_id() -> String {
    "3267441".to_owned()
}

fn default_read_key() -> String {
    "F32VD5KBS8RTBRBU".to_owned()
}

fn default_history_results() -> u32 {
    20
}

fn default_advisory_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_owned()
}

fn default_model() -> String {
    "gemini-3-pro-preview".to_owned()
}

fn default_refresh_interval() -> Duration {
    Duration::from_secs(300)
}

fn default_throttle_window() -> Duration {
    Duration::from_millis(3000)
}

fn default_insight_path() -> PathBuf {
    PathBuf::from("target/state/last_ai_insight.json")
}

fn default_budget_limit() -> f64 {
    100.0
}

fn default_days_passed() -> f64 {
    10.0
}

fn default_carbon_factor() -> f64 {
    0.82
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_console_enabled() -> bool {
    true
}

/// Primary configuration object for the Gridsight dashboard.
///
/// Every field carries a default equal to the production literal, so the
/// dashboard is fully operational without a configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub advisory: AdvisoryConfig,
    #[serde(default)]
    pub usage: UsageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "GRIDSIGHT_CONFIG";

    /// Load configuration from disk, respecting the `GRIDSIGHT_CONFIG`
    /// override. When no candidate file exists the built-in defaults are
    /// returned rather than an error.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                return Self::from_path(PathBuf::from(env_path));
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                return Self::from_path(candidate.as_ref().to_path_buf());
            }
        }

        debug!("no configuration file found; using built-in defaults");
        Ok(Self::default())
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.telemetry.validate()?;
        self.usage.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Identity of the upstream ThingSpeak-compatible telemetry channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_base_url")]
    pub base_url: String,
    #[serde(default = "default_channel_id")]
    pub channel_id: String,
    #[serde(default = "default_read_key")]
    pub read_key: String,
    /// Number of feeds requested from the history endpoint.
    #[serde(default = "default_history_results")]
    pub history_results: u32,
}

impl TelemetryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.channel_id.trim().is_empty() {
            return Err(anyhow!("telemetry channel_id must not be empty"));
        }
        if self.history_results == 0 {
            return Err(anyhow!("telemetry history_results must be at least 1"));
        }
        Ok(())
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            base_url: default_telemetry_base_url(),
            channel_id: default_channel_id(),
            read_key: default_read_key(),
            history_results: default_history_results(),
        }
    }
}

/// Settings for the generative advisory client.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisoryConfig {
    #[serde(default = "default_advisory_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Cadence of the full refresh cycle (telemetry plus advisory).
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: Duration,
    /// Minimum spacing between live advisory requests.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(default = "default_throttle_window")]
    pub throttle_window: Duration,
    /// Location of the persisted last-known advisory text.
    #[serde(default = "default_insight_path")]
    pub insight_path: PathBuf,
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_advisory_base_url(),
            model: default_model(),
            refresh_interval: default_refresh_interval(),
            throttle_window: default_throttle_window(),
            insight_path: default_insight_path(),
        }
    }
}

/// Constants feeding the derived-metrics calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageConfig {
    /// Monthly energy budget ceiling in kWh.
    #[serde(default = "default_budget_limit")]
    pub budget_limit_kwh: f64,
    /// Days elapsed in the current billing period, used for the linear
    /// monthly projection.
    #[serde(default = "default_days_passed")]
    pub days_passed: f64,
    /// Carbon emission factor in kg CO2 per kWh.
    #[serde(default = "default_carbon_factor")]
    pub carbon_factor_kg_per_kwh: f64,
}

impl UsageConfig {
    /// The calculator divides by `days_passed` and `budget_limit_kwh`
    /// without guarding, so reject values that would produce infinities.
    pub fn validate(&self) -> Result<()> {
        if self.days_passed <= 0.0 {
            return Err(anyhow!("usage days_passed must be positive"));
        }
        if self.budget_limit_kwh <= 0.0 {
            return Err(anyhow!("usage budget_limit_kwh must be positive"));
        }
        Ok(())
    }
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            budget_limit_kwh: default_budget_limit(),
            days_passed: default_days_passed(),
            carbon_factor_kg_per_kwh: default_carbon_factor(),
        }
    }
}

/// Logging sink configuration consumed by [`crate::logging::init_tracing`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default)]
    pub file_prefix: Option<String>,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// Whether events are also echoed to stdout. The rolling file sink is
    /// always written.
    #[serde(default = "default_console_enabled")]
    pub console: bool,
}

impl LoggingConfig {
    /// Variant for binaries that own the terminal: any stdout write would
    /// scribble over the rendered frame, so only the file sink stays on.
    pub fn for_interactive(&self) -> Self {
        Self {
            console: false,
            ..self.clone()
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            file_prefix: None,
            format: default_log_format(),
            console: default_console_enabled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: AppConfig = "".parse().unwrap();
        assert_eq!(config.telemetry.channel_id, "3267441");
        assert_eq!(config.telemetry.history_results, 20);
        assert_eq!(config.advisory.model, "gemini-3-pro-preview");
        assert_eq!(config.advisory.refresh_interval, Duration::from_secs(300));
        assert_eq!(config.advisory.throttle_window, Duration::from_millis(3000));
        assert_eq!(config.usage.budget_limit_kwh, 100.0);
        assert_eq!(config.usage.days_passed, 10.0);
        assert_eq!(config.usage.carbon_factor_kg_per_kwh, 0.82);
    }

    #[test]
    fn partial_overrides_keep_remaining_defaults() {
        let doc = r#"
            [usage]
            budget_limit_kwh = 250.0

            [advisory]
            refresh_interval = 60
            throttle_window = 500
        "#;
        let config: AppConfig = doc.parse().unwrap();
        assert_eq!(config.usage.budget_limit_kwh, 250.0);
        assert_eq!(config.usage.days_passed, 10.0);
        assert_eq!(config.advisory.refresh_interval, Duration::from_secs(60));
        assert_eq!(config.advisory.throttle_window, Duration::from_millis(500));
        assert_eq!(config.telemetry.base_url, "https://api.thingspeak.com");
    }

    #[test]
    fn interactive_logging_disables_console_only() {
        let logging = LoggingConfig {
            directory: PathBuf::from("var/logs"),
            file_prefix: Some("dash".to_owned()),
            format: LogFormat::StructuredJson,
            console: true,
        };
        let interactive = logging.for_interactive();
        assert!(!interactive.console);
        assert_eq!(interactive.directory, logging.directory);
        assert_eq!(interactive.file_prefix, logging.file_prefix);
        assert_eq!(interactive.format, logging.format);
    }

    #[test]
    fn console_logging_defaults_on_and_parses() {
        assert!(LoggingConfig::default().console);
        let doc = r#"
            [logging]
            console = false
        "#;
        let config: AppConfig = doc.parse().unwrap();
        assert!(!config.logging.console);
    }

    #[test]
    fn zero_days_passed_is_rejected() {
        let doc = r#"
            [usage]
            days_passed = 0.0
        "#;
        let err = doc.parse::<AppConfig>().unwrap_err();
        assert!(err.to_string().contains("days_passed"));
    }

    #[test]
    fn zero_history_results_is_rejected() {
        let doc = r#"
            [telemetry]
            history_results = 0
        "#;
        assert!(doc.parse::<AppConfig>().is_err());
    }
}
