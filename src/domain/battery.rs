use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Static description of the installed battery.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_level_bounds"))]
pub struct BatterySpec {
    /// Rated capacity in kWh
    #[validate(range(exclusive_min = 0.0))]
    pub capacity_kwh: f64,
    /// Lowest allowed level in percent
    #[validate(range(min = 0.0, max = 100.0))]
    pub min_level_pct: f64,
    /// Highest allowed level in percent
    #[validate(range(min = 0.0, max = 100.0))]
    pub max_level_pct: f64,
    /// Energy the battery can absorb in one hour (kW)
    #[validate(range(min = 0.0))]
    pub max_charge_rate_kw: f64,
    /// Energy the battery can deliver in one hour (kW)
    #[validate(range(min = 0.0))]
    pub max_discharge_rate_kw: f64,
    /// Wear cost per kWh moved in or out, SEK
    #[validate(range(min = 0.0))]
    pub degradation_cost_per_kwh: f64,
}

fn validate_level_bounds(spec: &BatterySpec) -> Result<(), ValidationError> {
    if spec.min_level_pct > spec.max_level_pct {
        return Err(ValidationError::new("min_level_above_max_level"));
    }
    Ok(())
}

impl BatterySpec {
    pub fn max_kwh(&self) -> f64 {
        self.capacity_kwh * self.max_level_pct / 100.0
    }

    pub fn min_kwh(&self) -> f64 {
        self.capacity_kwh * self.min_level_pct / 100.0
    }
}

/// A battery spec together with its current level.
///
/// Cheap to copy; the evaluator runs every candidate on its own copy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Battery {
    pub spec: BatterySpec,
    /// Current level in percent of capacity
    pub current_level_pct: f64,
}

impl Battery {
    pub fn new(spec: BatterySpec, current_level_pct: f64) -> Self {
        Self {
            spec,
            current_level_pct,
        }
    }

    pub fn to_kwh(&self, pct: f64) -> f64 {
        pct / 100.0 * self.spec.capacity_kwh
    }

    pub fn to_pct(&self, kwh: f64) -> f64 {
        kwh / self.spec.capacity_kwh * 100.0
    }

    /// Headroom left for charging, kWh.
    pub fn available_capacity(&self) -> f64 {
        self.to_kwh(self.spec.max_level_pct) - self.to_kwh(self.current_level_pct)
    }

    /// Energy left above the minimum level, kWh.
    pub fn remaining_capacity(&self) -> f64 {
        self.to_kwh(self.current_level_pct) - self.to_kwh(self.spec.min_level_pct)
    }

    /// Moves `load_kwh` into (positive) or out of (negative) the battery,
    /// clamped to the level bounds. Returns the delta actually applied.
    pub fn update_level(&mut self, load_kwh: f64) -> f64 {
        let old_kwh = self.to_kwh(self.current_level_pct);
        let new_kwh = if load_kwh > 0.0 {
            (old_kwh + load_kwh).min(self.to_kwh(self.spec.max_level_pct))
        } else {
            (old_kwh + load_kwh).max(self.to_kwh(self.spec.min_level_pct))
        };

        self.current_level_pct = self.to_pct(new_kwh);
        new_kwh - old_kwh
    }
}

/// One reading from the inverter.
///
/// Power convention: `battery_power_kw` positive while charging,
/// `grid_power_kw` positive while importing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub battery_level_pct: f64,
    pub battery_power_kw: f64,
    pub grid_power_kw: f64,
    pub observed_at: DateTime<Utc>,
}

impl TelemetrySnapshot {
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age_seconds: u64) -> bool {
        let age = now.signed_duration_since(self.observed_at).num_seconds();
        age >= 0 && (age as u64) <= max_age_seconds
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BatteryTelemetry: Send + Sync {
    async fn snapshot(&self) -> Result<TelemetrySnapshot>;
}

#[cfg(test)]
pub(crate) fn test_spec() -> BatterySpec {
    BatterySpec {
        capacity_kwh: 10.0,
        min_level_pct: 10.0,
        max_level_pct: 100.0,
        max_charge_rate_kw: 3.0,
        max_discharge_rate_kw: 3.0,
        degradation_cost_per_kwh: 0.1,
    }
}
