pub mod hourly;
pub mod planning;
pub mod regulator;
pub mod scheduler;

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::domain::{BatteryTelemetry, GridMeter};
use crate::forecast::ForecastSource;
use crate::repo::Repositories;
use crate::simulation::{SimulatedTelemetry, SyntheticForecaster};

pub use hourly::HourlyRecorder;
pub use planning::{PlanReport, Planner, PlanningError};
pub use regulator::{BatteryAction, BatteryInstruction, BatteryRegulator};
pub use scheduler::{PeriodicTaskConfig, SchedulerStatus, TaskScheduler, TaskStatus};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Config,
    pub repos: Repositories,
    pub planner: Arc<Planner>,
    pub scheduler: Arc<TaskScheduler>,
    pub telemetry: Arc<SimulatedTelemetry>,
}

impl AppState {
    pub async fn new(cfg: Config) -> Result<Self> {
        let repos = Repositories::new(&cfg).await?;
        let telemetry = Arc::new(SimulatedTelemetry::new(
            cfg.battery,
            cfg.telemetry.initial_level_pct,
        ));
        let upstream: Arc<dyn ForecastSource> = Arc::new(SyntheticForecaster::default());
        Ok(Self::with_parts(cfg, repos, telemetry, upstream))
    }

    pub fn with_parts(
        cfg: Config,
        repos: Repositories,
        telemetry: Arc<SimulatedTelemetry>,
        upstream: Arc<dyn ForecastSource>,
    ) -> Self {
        let planner = Arc::new(Planner::new(
            &cfg,
            repos.forecasts.clone(),
            telemetry.clone() as Arc<dyn BatteryTelemetry>,
            repos.planning.clone(),
        ));
        let recorder = Arc::new(HourlyRecorder::new(
            &cfg,
            telemetry.clone() as Arc<dyn GridMeter>,
            &repos,
        ));
        let scheduler = Arc::new(TaskScheduler::new(
            PeriodicTaskConfig::from_config(&cfg),
            planner.clone(),
            recorder,
            repos.clone(),
            upstream,
        ));
        Self {
            cfg,
            repos,
            planner,
            scheduler,
            telemetry,
        }
    }
}

/// Starts the scheduler, the regulator and the loop applying its
/// instructions to the simulated battery.
pub fn spawn_controller_tasks(state: &AppState, shutdown: CancellationToken) {
    state.scheduler.clone().start(shutdown.clone());

    let (tx, mut rx) = mpsc::channel::<BatteryInstruction>(16);
    let regulator = BatteryRegulator::new(
        &state.cfg,
        state.repos.planning.clone(),
        state.telemetry.clone(),
        tx,
    );
    tokio::spawn(regulator.run(shutdown.clone()));

    let telemetry = state.telemetry.clone();
    tokio::spawn(async move {
        while let Some(instruction) = rx.recv().await {
            telemetry.apply(instruction);
        }
        info!("instruction sink closed");
    });

    let planner = state.planner.clone();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        planner.cancel();
    });
}
