use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::{HourlyRecorder, Planner};
use crate::config::Config;
use crate::domain::DateHour;
use crate::forecast::{self, ForecastSource};
use crate::repo::Repositories;

/// Periodic task intervals
#[derive(Debug, Clone)]
pub struct PeriodicTaskConfig {
    pub planning_interval: Duration,
    pub forecast_refresh_interval: Duration,
    pub maintenance_interval: Duration,
    /// How often the meter is checked for a finished hour
    pub hourly_interval: Duration,
    /// Hours of forecast pulled on each refresh
    pub forecast_hours: usize,
    pub retention_days: i64,
}

impl PeriodicTaskConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            planning_interval: Duration::from_secs(cfg.planner.run_every_minutes * 60),
            forecast_refresh_interval: Duration::from_secs(
                cfg.maintenance.forecast_refresh_minutes * 60,
            ),
            maintenance_interval: Duration::from_secs(cfg.maintenance.run_every_hours * 3600),
            hourly_interval: Duration::from_secs(60),
            // the run after next still finds its hours
            forecast_hours: cfg.planner.hours_ahead as usize + 2,
            retention_days: cfg.maintenance.retention_days,
        }
    }
}

/// Task status tracking
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskStatus {
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub run_count: u64,
    pub success_count: u64,
    pub error_count: u64,
}

impl TaskStatus {
    fn record<T>(&mut self, started: DateTime<Utc>, result: &Result<T>) {
        self.last_run = Some(started);
        self.run_count += 1;
        match result {
            Ok(_) => {
                self.last_success = Some(started);
                self.success_count += 1;
                self.last_error = None;
            }
            Err(e) => {
                self.error_count += 1;
                self.last_error = Some(format!("{e:#}"));
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub planning: TaskStatus,
    pub forecast_refresh: TaskStatus,
    pub maintenance: TaskStatus,
    pub hourly: TaskStatus,
}

/// Periodic task scheduler
pub struct TaskScheduler {
    config: PeriodicTaskConfig,
    planner: Arc<Planner>,
    recorder: Arc<HourlyRecorder>,
    repos: Repositories,
    upstream: Arc<dyn ForecastSource>,
    planning_status: Arc<RwLock<TaskStatus>>,
    forecast_status: Arc<RwLock<TaskStatus>>,
    maintenance_status: Arc<RwLock<TaskStatus>>,
    hourly_status: Arc<RwLock<TaskStatus>>,
}

impl TaskScheduler {
    pub fn new(
        config: PeriodicTaskConfig,
        planner: Arc<Planner>,
        recorder: Arc<HourlyRecorder>,
        repos: Repositories,
        upstream: Arc<dyn ForecastSource>,
    ) -> Self {
        Self {
            config,
            planner,
            recorder,
            repos,
            upstream,
            planning_status: Arc::new(RwLock::new(TaskStatus::default())),
            forecast_status: Arc::new(RwLock::new(TaskStatus::default())),
            maintenance_status: Arc::new(RwLock::new(TaskStatus::default())),
            hourly_status: Arc::new(RwLock::new(TaskStatus::default())),
        }
    }

    /// Start all periodic tasks; they stop when `shutdown` fires.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) {
        let scheduler = self.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            let period = scheduler.config.forecast_refresh_interval;
            let status = scheduler.forecast_status.clone();
            run_periodic("forecast refresh", period, status, token, || {
                scheduler.refresh_forecasts()
            })
            .await;
        });

        let scheduler = self.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            let period = scheduler.config.planning_interval;
            let status = scheduler.planning_status.clone();
            run_periodic("planning", period, status, token, || scheduler.plan()).await;
        });

        let scheduler = self.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            let period = scheduler.config.hourly_interval;
            let status = scheduler.hourly_status.clone();
            run_periodic("hourly summary", period, status, token, || {
                scheduler.book_elapsed_hour()
            })
            .await;
        });

        let scheduler = self.clone();
        tokio::spawn(async move {
            let period = scheduler.config.maintenance_interval;
            let status = scheduler.maintenance_status.clone();
            run_periodic("maintenance", period, status, shutdown, || {
                scheduler.purge_old_rows()
            })
            .await;
        });

        info!("all periodic tasks started");
    }

    pub async fn refresh_forecasts(&self) -> Result<()> {
        let written = forecast::refresh(
            self.upstream.as_ref(),
            self.repos.forecast_store.as_ref(),
            DateHour::now(),
            self.config.forecast_hours,
        )
        .await?;
        info!(hours = written, "forecasts refreshed");
        Ok(())
    }

    pub async fn plan(&self) -> Result<()> {
        self.planner.run_next().await?;
        Ok(())
    }

    pub async fn book_elapsed_hour(&self) -> Result<()> {
        self.recorder.record(DateHour::now()).await?;
        Ok(())
    }

    /// Drops planning, forecast and hourly rows older than the retention window.
    pub async fn purge_old_rows(&self) -> Result<()> {
        let cutoff = DateHour::now().sub(self.config.retention_days * 24);
        let planning = self.repos.planning.purge_planning_before(cutoff).await?;
        let forecasts = self.repos.forecast_store.purge_forecasts_before(cutoff).await?;
        let hourly = self.repos.hourly.purge_hourly_before(cutoff).await?;
        info!(%cutoff, planning, forecasts, hourly, "old rows purged");
        Ok(())
    }

    pub async fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            planning: self.planning_status.read().await.clone(),
            forecast_refresh: self.forecast_status.read().await.clone(),
            maintenance: self.maintenance_status.read().await.clone(),
            hourly: self.hourly_status.read().await.clone(),
        }
    }
}

async fn run_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    status: Arc<RwLock<TaskStatus>>,
    shutdown: CancellationToken,
    mut task: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut ticker = interval(period);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let started = Utc::now();
        let result = task().await;
        if let Err(e) = &result {
            error!(task = name, error = %format!("{e:#}"), "periodic task failed");
        }
        status.write().await.record(started, &result);
    }
    info!(task = name, "periodic task stopped");
}
