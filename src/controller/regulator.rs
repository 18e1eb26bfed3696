//! Turns the persisted strategy for the current hour into inverter instructions.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use strum::{AsRefStr, Display};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::domain::{BatterySpec, BatteryTelemetry, DateHour, Strategy, TelemetrySnapshot};
use crate::repo::PlanningStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BatteryAction {
    /// Inverter runs its own self-consumption logic
    Auto,
    Charge,
    Discharge,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatteryInstruction {
    pub action: BatteryAction,
    pub power_kw: f64,
}

impl BatteryInstruction {
    pub fn new(action: BatteryAction, power_kw: f64) -> Self {
        Self {
            action,
            power_kw: power_kw.max(0.0),
        }
    }
}

pub struct BatteryRegulator {
    battery: BatterySpec,
    grid_max_power_kw: f64,
    safety_margin_kw: f64,
    update_threshold_kw: f64,
    interval: Duration,
    startup_delay: Duration,
    store: Arc<dyn PlanningStore>,
    telemetry: Arc<dyn BatteryTelemetry>,
    tx: mpsc::Sender<BatteryInstruction>,
    last: Option<BatteryInstruction>,
    in_fallback: bool,
}

impl BatteryRegulator {
    pub fn new(
        cfg: &Config,
        store: Arc<dyn PlanningStore>,
        telemetry: Arc<dyn BatteryTelemetry>,
        tx: mpsc::Sender<BatteryInstruction>,
    ) -> Self {
        Self {
            battery: cfg.battery,
            grid_max_power_kw: cfg.planner.grid_max_power_kw,
            safety_margin_kw: cfg.regulator.grid_safety_margin_kw,
            update_threshold_kw: cfg.regulator.update_threshold_kw,
            interval: Duration::from_secs(cfg.regulator.interval_seconds),
            startup_delay: Duration::from_secs(cfg.regulator.startup_delay_seconds),
            store,
            telemetry,
            tx,
            last: None,
            in_fallback: false,
        }
    }

    /// What the inverter should do for `strategy` given the latest reading.
    ///
    /// Grid power is positive while importing, so charging eats into the
    /// import headroom and discharging gains from it.
    pub fn instruction_for(
        &self,
        strategy: Strategy,
        snapshot: &TelemetrySnapshot,
    ) -> BatteryInstruction {
        let level = snapshot.battery_level_pct;
        match strategy {
            Strategy::Default => BatteryInstruction::new(BatteryAction::Auto, 0.0),
            Strategy::Preserve => BatteryInstruction::new(BatteryAction::Charge, 0.0),
            Strategy::Charge => {
                let power = if level >= self.battery.max_level_pct {
                    0.0
                } else {
                    let headroom =
                        self.grid_max_power_kw - snapshot.grid_power_kw - self.safety_margin_kw;
                    self.battery.max_charge_rate_kw.min(headroom)
                };
                BatteryInstruction::new(BatteryAction::Charge, power)
            }
            Strategy::Discharge => {
                let power = if level <= self.battery.min_level_pct {
                    0.0
                } else {
                    let headroom =
                        self.grid_max_power_kw + snapshot.grid_power_kw - self.safety_margin_kw;
                    self.battery.max_discharge_rate_kw.min(headroom)
                };
                BatteryInstruction::new(BatteryAction::Discharge, power)
            }
        }
    }

    /// Same action and a power change below the threshold is a repeat.
    fn is_repeat(&self, next: &BatteryInstruction) -> bool {
        self.last.is_some_and(|last| {
            last.action == next.action
                && (last.power_kw - next.power_kw).abs() < self.update_threshold_kw
        })
    }

    /// Persisted strategy for `hour`, or `Default` when there is none or the
    /// store cannot be read. Switching into and out of the fallback is logged once.
    async fn current_strategy(&mut self, hour: DateHour) -> Strategy {
        let row = match self.store.planning_for_hour(hour).await {
            Ok(row) => row,
            Err(e) => {
                if !self.in_fallback {
                    warn!(%hour, error = %format!("{e:#}"), "reading plan failed, regulating with default");
                    self.in_fallback = true;
                }
                return Strategy::Default;
            }
        };

        match row {
            Some(row) => {
                if self.in_fallback {
                    info!(%hour, strategy = %row.strategy, "plan available again");
                    self.in_fallback = false;
                }
                row.strategy
            }
            None => {
                if !self.in_fallback {
                    warn!(%hour, "no plan for current hour, regulating with default");
                    self.in_fallback = true;
                }
                Strategy::Default
            }
        }
    }

    /// One regulation step for `hour`. Returns the instruction when one was sent.
    pub async fn tick(&mut self, hour: DateHour) -> Result<Option<BatteryInstruction>> {
        let strategy = self.current_strategy(hour).await;
        let snapshot = self.telemetry.snapshot().await?;
        let instruction = self.instruction_for(strategy, &snapshot);

        if self.is_repeat(&instruction) {
            debug!(action = %instruction.action, power_kw = instruction.power_kw, "instruction unchanged");
            return Ok(None);
        }

        self.tx
            .send(instruction)
            .await
            .map_err(|_| anyhow!("instruction channel closed"))?;
        info!(
            %strategy,
            action = %instruction.action,
            power_kw = instruction.power_kw,
            level_pct = snapshot.battery_level_pct,
            grid_kw = snapshot.grid_power_kw,
            "battery instruction sent"
        );
        self.last = Some(instruction);
        Ok(Some(instruction))
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        if !self.startup_delay.is_zero() {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(self.startup_delay) => {}
            }
        }

        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            if let Err(e) = self.tick(DateHour::now()).await {
                if self.tx.is_closed() {
                    warn!("instruction receiver gone, regulator stopping");
                    break;
                }
                warn!(error = %e, "regulation tick failed");
            }
        }
        info!("regulator stopped");
    }
}
