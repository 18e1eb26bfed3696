//! Books each elapsed hour's grid exchange and what it cost.

use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::domain::{DateHour, GridMeter, HourlySummary, MeterReading, Tariff};
use crate::forecast::ForecastSource;
use crate::repo::{HourlyStore, PlanningStore, Repositories};

pub struct HourlyRecorder {
    tariff: Tariff,
    meter: Arc<dyn GridMeter>,
    forecasts: Arc<dyn ForecastSource>,
    planning: Arc<dyn PlanningStore>,
    store: Arc<dyn HourlyStore>,
    /// Reading the next summary is measured from
    baseline: Mutex<Option<(DateHour, MeterReading)>>,
}

impl HourlyRecorder {
    pub fn new(cfg: &Config, meter: Arc<dyn GridMeter>, repos: &Repositories) -> Self {
        Self {
            tariff: cfg.tariff,
            meter,
            forecasts: repos.forecasts.clone(),
            planning: repos.planning.clone(),
            store: repos.hourly.clone(),
            baseline: Mutex::new(None),
        }
    }

    /// Stores a summary for the hour before `now` once `now` has moved past
    /// the baseline's hour. The first call only takes the baseline, so the
    /// first hour after start-up is partial.
    pub async fn record(&self, now: DateHour) -> Result<Option<HourlySummary>> {
        let reading = self.meter.reading().await?;

        let previous = *self.baseline.lock();
        let Some((since, earlier)) = previous else {
            *self.baseline.lock() = Some((now, reading));
            return Ok(None);
        };
        if now <= since {
            return Ok(None);
        }

        let hour = now.sub(1);
        if since < hour {
            warn!(%since, %hour, "meter readings missed hours, booking them on the last one");
        }

        let (grid_import_kwh, grid_export_kwh) = reading.since(&earlier);
        let energy_price = self.price(hour).await;
        let strategy = match self.planning.planning_for_hour(hour).await {
            Ok(row) => row.map(|r| r.strategy),
            Err(e) => {
                warn!(%hour, error = %format!("{e:#}"), "reading plan for summary failed");
                None
            }
        };

        let summary = HourlySummary {
            hour,
            grid_import_kwh,
            grid_export_kwh,
            energy_price,
            cash_flow: self.tariff.cash_flow(grid_import_kwh, grid_export_kwh, energy_price),
            battery_level_pct: reading.battery_level_pct,
            strategy,
        };
        self.store.save_hourly(summary).await?;
        *self.baseline.lock() = Some((now, reading));

        info!(
            %hour,
            import_kwh = grid_import_kwh,
            export_kwh = grid_export_kwh,
            cash_flow = summary.cash_flow,
            "hour booked"
        );
        Ok(Some(summary))
    }

    async fn price(&self, hour: DateHour) -> f64 {
        match self.forecasts.hour_forecast(hour).await {
            Ok(Some(f)) => f.energy_price,
            Ok(None) => {
                warn!(%hour, "no price for elapsed hour, booking at 0");
                0.0
            }
            Err(e) => {
                warn!(%hour, error = %format!("{e:#}"), "reading price failed, booking at 0");
                0.0
            }
        }
    }
}
