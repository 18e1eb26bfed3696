//! Process-local store used when no database is configured, and in tests.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::{ForecastStore, HourlyStore, PlanningStore};
use crate::domain::{DateHour, HourlyForecast, HourlySummary, PlanningRow, Strategy};
use crate::forecast::ForecastSource;

#[derive(Debug, Default)]
pub struct InMemoryStore {
    planning: RwLock<BTreeMap<DateHour, Strategy>>,
    forecasts: RwLock<BTreeMap<DateHour, HourlyForecast>>,
    hourly: RwLock<BTreeMap<DateHour, HourlySummary>>,
}

impl InMemoryStore {
    pub fn planning_len(&self) -> usize {
        self.planning.read().len()
    }

    pub fn forecast_len(&self) -> usize {
        self.forecasts.read().len()
    }

    pub fn hourly_len(&self) -> usize {
        self.hourly.read().len()
    }
}

fn purge_before<V>(map: &RwLock<BTreeMap<DateHour, V>>, before: DateHour) -> u64 {
    let mut map = map.write();
    let kept = map.split_off(&before);
    let purged = map.len() as u64;
    *map = kept;
    purged
}

#[async_trait]
impl PlanningStore for InMemoryStore {
    async fn save_planning(&self, row: PlanningRow) -> Result<()> {
        self.planning.write().insert(row.hour, row.strategy);
        Ok(())
    }

    async fn planning_for_hour(&self, hour: DateHour) -> Result<Option<PlanningRow>> {
        Ok(self
            .planning
            .read()
            .get(&hour)
            .map(|s| PlanningRow::new(hour, *s)))
    }

    async fn planning_from(&self, from: DateHour) -> Result<Vec<PlanningRow>> {
        Ok(self
            .planning
            .read()
            .range(from..)
            .map(|(h, s)| PlanningRow::new(*h, *s))
            .collect())
    }

    async fn purge_planning_before(&self, before: DateHour) -> Result<u64> {
        Ok(purge_before(&self.planning, before))
    }
}

#[async_trait]
impl ForecastSource for InMemoryStore {
    async fn hour_forecast(&self, hour: DateHour) -> Result<Option<HourlyForecast>> {
        Ok(self.forecasts.read().get(&hour).copied())
    }
}

#[async_trait]
impl ForecastStore for InMemoryStore {
    async fn save_forecast(&self, hour: DateHour, forecast: HourlyForecast) -> Result<()> {
        self.forecasts.write().insert(hour, forecast);
        Ok(())
    }

    async fn purge_forecasts_before(&self, before: DateHour) -> Result<u64> {
        Ok(purge_before(&self.forecasts, before))
    }
}

#[async_trait]
impl HourlyStore for InMemoryStore {
    async fn save_hourly(&self, summary: HourlySummary) -> Result<()> {
        self.hourly.write().insert(summary.hour, summary);
        Ok(())
    }

    async fn hourly_from(&self, from: DateHour) -> Result<Vec<HourlySummary>> {
        Ok(self.hourly.read().range(from..).map(|(_, s)| *s).collect())
    }

    async fn purge_hourly_before(&self, before: DateHour) -> Result<u64> {
        Ok(purge_before(&self.hourly, before))
    }
}
