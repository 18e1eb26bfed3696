//! Realized grid exchange per elapsed hour.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{DateHour, Strategy};

/// Cumulative meter counters, kWh since the meter started.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeterReading {
    pub imported_kwh: f64,
    pub exported_kwh: f64,
    pub battery_level_pct: f64,
}

impl MeterReading {
    /// Import and export since `earlier`. A counter that went backwards
    /// (meter reset) counts as zero.
    pub fn since(&self, earlier: &MeterReading) -> (f64, f64) {
        (
            (self.imported_kwh - earlier.imported_kwh).max(0.0),
            (self.exported_kwh - earlier.exported_kwh).max(0.0),
        )
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GridMeter: Send + Sync {
    async fn reading(&self) -> Result<MeterReading>;
}

/// What one elapsed hour actually cost or earned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourlySummary {
    pub hour: DateHour,
    pub grid_import_kwh: f64,
    pub grid_export_kwh: f64,
    /// Spot price of the hour, SEK/kWh
    pub energy_price: f64,
    /// Positive for net revenue, negative for net cost, SEK
    pub cash_flow: f64,
    /// Level at the end of the hour
    pub battery_level_pct: f64,
    /// Strategy planned for the hour, if any
    pub strategy: Option<Strategy>,
}
