use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::net::SocketAddr;
use tracing::warn;
use validator::Validate;

use crate::domain::{BatterySpec, Tariff};

/// Horizons above this still work but the search grows as 4^H.
pub const TRACTABLE_HORIZON_HOURS: u32 = 12;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Config {
    pub server: ServerConfig,
    #[validate(nested)]
    pub battery: BatterySpec,
    #[validate(nested)]
    pub tariff: Tariff,
    #[validate(nested)]
    pub planner: PlannerConfig,
    #[validate(nested)]
    pub regulator: RegulatorConfig,
    #[validate(nested)]
    pub maintenance: MaintenanceConfig,
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub db: DbConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Zone plan hours are rendered in, e.g. "Europe/Stockholm"
    #[serde(default = "default_display_timezone")]
    pub display_timezone: String,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    pub fn display_tz(&self) -> chrono_tz::Tz {
        self.display_timezone.parse().unwrap_or_else(|_| {
            warn!(timezone = %self.display_timezone, "unknown display timezone, using UTC");
            chrono_tz::UTC
        })
    }
}

fn default_display_timezone() -> String {
    "Europe/Stockholm".to_string()
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PlannerConfig {
    /// Maximum power to and from the grid, kW
    #[validate(range(exclusive_min = 0.0))]
    pub grid_max_power_kw: f64,
    /// Hours planned per run, starting with the next full hour.
    /// The upper bound is `optimizer::MAX_HORIZON_HOURS`.
    #[validate(range(min = 1, max = 24))]
    pub hours_ahead: u32,
    #[validate(range(min = 1))]
    pub run_every_minutes: u64,
    /// Upper bound on one search
    #[validate(range(min = 1))]
    pub timeout_seconds: u64,
    /// Search threads, 0 = one per core
    #[serde(default)]
    pub workers: usize,
    /// Candidates evaluated between cancellation checks
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1))]
    pub batch_size: u64,
}

fn default_batch_size() -> u64 {
    4096
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegulatorConfig {
    #[validate(range(min = 1))]
    pub interval_seconds: u64,
    /// A repeated action is re-sent only when its power moved by at least this much, kW
    #[validate(range(min = 0.0))]
    pub update_threshold_kw: f64,
    /// Headroom kept below the grid limit, kW
    #[validate(range(min = 0.0))]
    pub grid_safety_margin_kw: f64,
    /// Wait before the first regulation tick
    #[serde(default)]
    pub startup_delay_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MaintenanceConfig {
    #[validate(range(min = 1))]
    pub retention_days: i64,
    #[validate(range(min = 1))]
    pub run_every_hours: u64,
    #[validate(range(min = 1))]
    pub forecast_refresh_minutes: u64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TelemetryConfig {
    /// Readings older than this make the planner skip its run
    #[validate(range(min = 1))]
    pub max_age_seconds: u64,
    /// Level the simulated battery starts at
    #[validate(range(min = 0.0, max = 100.0))]
    pub initial_level_pct: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Used when RUST_LOG is not set
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,hyper=warn,tower_http=info,sqlx=warn".to_string(),
            format: LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    pub url: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://dispatch-planner.db?mode=rwc".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("DP__").split("__"));
        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Config = figment.extract().context("invalid configuration")?;
        cfg.validate().context("configuration out of range")?;

        if cfg.planner.hours_ahead > TRACTABLE_HORIZON_HOURS {
            warn!(
                hours_ahead = cfg.planner.hours_ahead,
                candidates = 4u64.pow(cfg.planner.hours_ahead),
                "planning horizon above {TRACTABLE_HORIZON_HOURS} hours, each run searches every candidate"
            );
        }

        Ok(cfg)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config::from_figment(Figment::from(Toml::string(SAMPLE))).expect("sample config")
}

#[cfg(test)]
pub(crate) const SAMPLE: &str = r#"
[server]
host = "127.0.0.1"
port = 8080

[battery]
capacity_kwh = 10.0
min_level_pct = 10.0
max_level_pct = 100.0
max_charge_rate_kw = 3.0
max_discharge_rate_kw = 3.0
degradation_cost_per_kwh = 0.1

[tariff]
energy_tax = 0.0
tax_reduction = 0.0
grid_benefit = 0.0

[planner]
grid_max_power_kw = 16.0
hours_ahead = 3
run_every_minutes = 60
timeout_seconds = 60
workers = 2

[regulator]
interval_seconds = 5
update_threshold_kw = 0.2
grid_safety_margin_kw = 1.0

[maintenance]
retention_days = 30
run_every_hours = 24
forecast_refresh_minutes = 30

[telemetry]
max_age_seconds = 120
initial_level_pct = 50.0
"#;
