//! One planning run: telemetry and forecasts in, persisted strategy rows out.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::domain::{
    Battery, BatterySpec, BatteryTelemetry, DateHour, PlanningRow, Strategy, Tariff,
};
use crate::forecast::ForecastSource;
use crate::optimizer::{evaluate, permutation_count, ParallelSearch, PlanningInput, SearchError};
use crate::repo::PlanningStore;

#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("telemetry from {observed_at} is older than {max_age_seconds}s")]
    StaleTelemetry {
        observed_at: DateTime<Utc>,
        max_age_seconds: u64,
    },
    #[error("no forecast for {0}")]
    MissingForecast(DateHour),
    #[error("reading telemetry failed")]
    Telemetry(#[source] anyhow::Error),
    #[error("reading forecast failed")]
    Forecast(#[source] anyhow::Error),
    #[error("planning store failed")]
    Store(#[source] anyhow::Error),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error("search did not finish within {0:?}")]
    Timeout(Duration),
    #[error("search task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("search returned {got} strategies for {expected} hours")]
    StrategyCount { expected: usize, got: usize },
}

/// Outcome of a successful run, also what the API returns.
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub run_id: Uuid,
    pub start: DateHour,
    pub rows: Vec<PlanningRow>,
    /// Expected cost over the horizon, SEK
    pub cost: f64,
    /// Level after the last planned hour
    pub battery_level_pct: f64,
    /// True when no feasible plan existed and every hour was set to default
    pub fallback: bool,
    pub candidates: u64,
    pub elapsed_ms: u64,
}

impl PlanReport {
    pub fn strategies(&self) -> Vec<Strategy> {
        self.rows.iter().map(|r| r.strategy).collect()
    }
}

pub struct Planner {
    battery: BatterySpec,
    tariff: Tariff,
    grid_max_power_kw: f64,
    hours_ahead: usize,
    timeout: Duration,
    max_telemetry_age_seconds: u64,
    search: ParallelSearch,
    forecasts: Arc<dyn ForecastSource>,
    telemetry: Arc<dyn BatteryTelemetry>,
    store: Arc<dyn PlanningStore>,
    shutdown: CancellationToken,
    running: Mutex<()>,
}

impl Planner {
    pub fn new(
        cfg: &Config,
        forecasts: Arc<dyn ForecastSource>,
        telemetry: Arc<dyn BatteryTelemetry>,
        store: Arc<dyn PlanningStore>,
    ) -> Self {
        let search = ParallelSearch::new(cfg.planner.workers, cfg.planner.batch_size);
        info!(
            hours_ahead = cfg.planner.hours_ahead,
            workers = search.workers(),
            "planner configured"
        );
        Self {
            battery: cfg.battery,
            tariff: cfg.tariff,
            grid_max_power_kw: cfg.planner.grid_max_power_kw,
            hours_ahead: cfg.planner.hours_ahead as usize,
            timeout: Duration::from_secs(cfg.planner.timeout_seconds),
            max_telemetry_age_seconds: cfg.telemetry.max_age_seconds,
            search,
            forecasts,
            telemetry,
            store,
            shutdown: CancellationToken::new(),
            running: Mutex::new(()),
        }
    }

    /// Stops a search in progress and every later one.
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    /// Plans the hours starting with the next full hour.
    pub async fn run_next(&self) -> Result<PlanReport, PlanningError> {
        self.run(DateHour::now().add(1)).await
    }

    /// Plans `hours_ahead` hours from `start` and persists one row per hour.
    /// Concurrent calls queue behind each other.
    pub async fn run(&self, start: DateHour) -> Result<PlanReport, PlanningError> {
        let _running = self.running.lock().await;
        let started = Instant::now();

        let snapshot = self
            .telemetry
            .snapshot()
            .await
            .map_err(PlanningError::Telemetry)?;
        if !snapshot.is_fresh(Utc::now(), self.max_telemetry_age_seconds) {
            return Err(PlanningError::StaleTelemetry {
                observed_at: snapshot.observed_at,
                max_age_seconds: self.max_telemetry_age_seconds,
            });
        }

        let mut forecast = Vec::with_capacity(self.hours_ahead);
        for offset in 0..self.hours_ahead {
            let hour = start.add(offset as i64);
            let hourly = self
                .forecasts
                .hour_forecast(hour)
                .await
                .map_err(PlanningError::Forecast)?
                .ok_or(PlanningError::MissingForecast(hour))?;
            forecast.push(hourly.to_forecast_hour());
        }

        let input = PlanningInput {
            battery: Battery::new(self.battery, snapshot.battery_level_pct),
            grid_max_power_kw: self.grid_max_power_kw,
            tariff: self.tariff,
            forecast,
        };
        debug!(%start, level_pct = snapshot.battery_level_pct, "searching strategies");

        let cancel = self.shutdown.child_token();
        let search = self.search;
        let search_input = input.clone();
        let search_cancel = cancel.clone();
        let task = tokio::task::spawn_blocking(move || search.run(&search_input, &search_cancel));
        let output = match tokio::time::timeout(self.timeout, task).await {
            Ok(joined) => joined??,
            Err(_) => {
                cancel.cancel();
                return Err(PlanningError::Timeout(self.timeout));
            }
        };

        let (strategies, cost, battery_level_pct, fallback) = if output.is_feasible() {
            (output.strategies, output.cost, output.battery_level_pct, false)
        } else {
            warn!(%start, "no feasible plan, falling back to default for every hour");
            let strategies = vec![Strategy::Default; self.hours_ahead];
            let eval = evaluate(&input, &strategies);
            (strategies, eval.cost, eval.battery_level_pct, true)
        };

        if strategies.len() != self.hours_ahead {
            return Err(PlanningError::StrategyCount {
                expected: self.hours_ahead,
                got: strategies.len(),
            });
        }

        let rows: Vec<PlanningRow> = strategies
            .iter()
            .enumerate()
            .map(|(offset, s)| PlanningRow::new(start.add(offset as i64), *s))
            .collect();
        for row in &rows {
            self.store
                .save_planning(*row)
                .await
                .map_err(PlanningError::Store)?;
        }

        let report = PlanReport {
            run_id: Uuid::new_v4(),
            start,
            rows,
            cost,
            battery_level_pct,
            fallback,
            candidates: permutation_count(self.hours_ahead),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            run_id = %report.run_id,
            %start,
            cost = report.cost,
            level_pct = report.battery_level_pct,
            fallback,
            elapsed_ms = report.elapsed_ms,
            "planning run finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::domain::{HourlyForecast, MockBatteryTelemetry, TelemetrySnapshot};
    use crate::forecast::MockForecastSource;
    use crate::repo::InMemoryStore;
    use mockall::predicate::eq;
    use Strategy::*;

    const EPS: f64 = 1e-9;

    fn start() -> DateHour {
        "2024-06-01 10".parse().unwrap()
    }

    fn telemetry(level_pct: f64, age_seconds: i64) -> MockBatteryTelemetry {
        let mut mock = MockBatteryTelemetry::new();
        mock.expect_snapshot().returning(move || {
            Ok(TelemetrySnapshot {
                battery_level_pct: level_pct,
                battery_power_kw: 0.0,
                grid_power_kw: 0.0,
                observed_at: Utc::now() - chrono::Duration::seconds(age_seconds),
            })
        });
        mock
    }

    /// The same three hours the optimizer tests use, as raw production and
    /// consumption figures.
    fn scenario_forecasts() -> MockForecastSource {
        let hours = [(-2.0, 2.5, 0.5), (0.0, 3.0, 1.0), (2.0, 0.25, 2.25)];
        let mut mock = MockForecastSource::new();
        for (offset, (price, production, consumption)) in hours.into_iter().enumerate() {
            mock.expect_hour_forecast()
                .with(eq(start().add(offset as i64)))
                .returning(move |_| {
                    Ok(Some(HourlyForecast {
                        energy_price: price,
                        production_kwh: production,
                        consumption_kwh: consumption,
                    }))
                });
        }
        mock
    }

    fn planner(
        cfg: &Config,
        forecasts: MockForecastSource,
        telemetry: MockBatteryTelemetry,
    ) -> (Planner, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::default());
        let planner = Planner::new(cfg, Arc::new(forecasts), Arc::new(telemetry), store.clone());
        (planner, store)
    }

    #[tokio::test]
    async fn test_run_persists_cheapest_plan() {
        let (planner, store) = planner(&test_config(), scenario_forecasts(), telemetry(10.0, 5));

        let report = planner.run(start()).await.unwrap();

        assert_eq!(report.strategies(), vec![Charge, Preserve, Discharge]);
        assert!((report.cost + 3.4).abs() < EPS);
        assert!((report.battery_level_pct - 10.0).abs() < EPS);
        assert!(!report.fallback);
        assert_eq!(report.candidates, 64);

        let rows = store.planning_from(start()).await.unwrap();
        assert_eq!(rows, report.rows);
        assert_eq!(rows[2].hour, start().add(2));
    }

    #[tokio::test]
    async fn test_stale_telemetry_skips_run() {
        let mut forecasts = MockForecastSource::new();
        forecasts.expect_hour_forecast().never();
        let (planner, store) = planner(&test_config(), forecasts, telemetry(50.0, 3600));

        let err = planner.run(start()).await.unwrap_err();

        assert!(matches!(err, PlanningError::StaleTelemetry { max_age_seconds: 120, .. }));
        assert_eq!(store.planning_len(), 0);
    }

    #[tokio::test]
    async fn test_missing_hour_aborts_before_search() {
        let mut forecasts = MockForecastSource::new();
        forecasts
            .expect_hour_forecast()
            .with(eq(start()))
            .returning(|_| {
                Ok(Some(HourlyForecast {
                    energy_price: 1.0,
                    production_kwh: 0.0,
                    consumption_kwh: 1.0,
                }))
            });
        forecasts
            .expect_hour_forecast()
            .with(eq(start().add(1)))
            .returning(|_| Ok(None));
        forecasts
            .expect_hour_forecast()
            .with(eq(start().add(2)))
            .never();
        let (planner, store) = planner(&test_config(), forecasts, telemetry(50.0, 0));

        let err = planner.run(start()).await.unwrap_err();

        assert!(matches!(err, PlanningError::MissingForecast(h) if h == start().add(1)));
        assert_eq!(store.planning_len(), 0);
    }

    #[tokio::test]
    async fn test_forecast_failure_is_reported() {
        let mut forecasts = MockForecastSource::new();
        forecasts
            .expect_hour_forecast()
            .returning(|_| Err(anyhow::anyhow!("price feed down")));
        let (planner, _) = planner(&test_config(), forecasts, telemetry(50.0, 0));

        let err = planner.run(start()).await.unwrap_err();
        assert!(matches!(err, PlanningError::Forecast(_)));
    }

    #[tokio::test]
    async fn test_telemetry_failure_is_reported() {
        let mut telemetry = MockBatteryTelemetry::new();
        telemetry
            .expect_snapshot()
            .returning(|| Err(anyhow::anyhow!("inverter offline")));
        let (planner, _) = planner(&test_config(), MockForecastSource::new(), telemetry);

        assert!(matches!(
            planner.run(start()).await.unwrap_err(),
            PlanningError::Telemetry(_)
        ));
    }

    #[tokio::test]
    async fn test_cancelled_planner_persists_nothing() {
        let mut cfg = test_config();
        cfg.planner.batch_size = 1;
        let (planner, store) = planner(&cfg, scenario_forecasts(), telemetry(10.0, 0));
        planner.cancel();

        let err = planner.run(start()).await.unwrap_err();

        assert!(matches!(err, PlanningError::Search(SearchError::Cancelled { .. })));
        assert_eq!(store.planning_len(), 0);
    }

    #[tokio::test]
    async fn test_rerun_overwrites_rows() {
        let (planner, store) = planner(&test_config(), scenario_forecasts(), telemetry(10.0, 0));
        store
            .save_planning(PlanningRow::new(start(), Discharge))
            .await
            .unwrap();

        planner.run(start()).await.unwrap();
        planner.run(start()).await.unwrap();

        assert_eq!(store.planning_len(), 3);
        let first = store.planning_for_hour(start()).await.unwrap().unwrap();
        assert_eq!(first.strategy, Charge);
    }
}
