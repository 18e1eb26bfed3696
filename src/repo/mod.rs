use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::domain::{DateHour, HourlyForecast, HourlySummary, PlanningRow};
use crate::forecast::ForecastSource;

pub mod memory;
#[cfg(feature = "db")]
pub mod sqlite;

pub use memory::InMemoryStore;

/// Chosen strategy per hour, one row per date and hour.
#[async_trait]
pub trait PlanningStore: Send + Sync {
    /// Inserts or replaces the row for `row.hour`.
    async fn save_planning(&self, row: PlanningRow) -> Result<()>;
    async fn planning_for_hour(&self, hour: DateHour) -> Result<Option<PlanningRow>>;
    /// Rows at or after `from`, oldest first.
    async fn planning_from(&self, from: DateHour) -> Result<Vec<PlanningRow>>;
    /// Deletes rows strictly before `before`, returns how many went.
    async fn purge_planning_before(&self, before: DateHour) -> Result<u64>;
}

#[async_trait]
pub trait ForecastStore: Send + Sync {
    async fn save_forecast(&self, hour: DateHour, forecast: HourlyForecast) -> Result<()>;
    async fn purge_forecasts_before(&self, before: DateHour) -> Result<u64>;
}

/// Realized grid exchange, one row per elapsed hour.
#[async_trait]
pub trait HourlyStore: Send + Sync {
    /// Inserts or replaces the summary for `summary.hour`.
    async fn save_hourly(&self, summary: HourlySummary) -> Result<()>;
    /// Summaries at or after `from`, oldest first.
    async fn hourly_from(&self, from: DateHour) -> Result<Vec<HourlySummary>>;
    async fn purge_hourly_before(&self, before: DateHour) -> Result<u64>;
}

#[derive(Clone)]
pub struct Repositories {
    pub planning: Arc<dyn PlanningStore>,
    pub forecasts: Arc<dyn ForecastSource>,
    pub forecast_store: Arc<dyn ForecastStore>,
    pub hourly: Arc<dyn HourlyStore>,
}

impl Repositories {
    pub async fn new(cfg: &Config) -> Result<Self> {
        #[cfg(feature = "db")]
        let repos = Self::from_store(Arc::new(sqlite::SqliteStore::connect(&cfg.db.url).await?));

        #[cfg(not(feature = "db"))]
        let repos = {
            let _ = cfg;
            tracing::warn!("built without the db feature, plans are kept in memory only");
            Self::from_store(Arc::new(InMemoryStore::default()))
        };

        Ok(repos)
    }

    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: PlanningStore + ForecastSource + ForecastStore + HourlyStore + 'static,
    {
        Self {
            planning: store.clone(),
            forecasts: store.clone(),
            forecast_store: store.clone(),
            hourly: store,
        }
    }
}
