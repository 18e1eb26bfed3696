//! A battery that follows the regulator's instructions, so the planner has
//! live telemetry without an inverter attached.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use super::SyntheticForecaster;
use crate::controller::{BatteryAction, BatteryInstruction};
use crate::domain::{
    Battery, BatterySpec, BatteryTelemetry, DateHour, GridMeter, MeterReading, TelemetrySnapshot,
};

#[derive(Debug)]
struct SimState {
    battery: Battery,
    /// Positive while charging, kW
    power_kw: f64,
    action: BatteryAction,
    updated_at: DateTime<Utc>,
    /// Cumulative grid counters, kWh
    imported_kwh: f64,
    exported_kwh: f64,
}

#[derive(Debug)]
pub struct SimulatedTelemetry {
    state: Mutex<SimState>,
    household: SyntheticForecaster,
}

impl SimulatedTelemetry {
    pub fn new(spec: BatterySpec, initial_level_pct: f64) -> Self {
        Self::starting_at(spec, initial_level_pct, Utc::now())
    }

    pub fn starting_at(spec: BatterySpec, initial_level_pct: f64, now: DateTime<Utc>) -> Self {
        let level = initial_level_pct.clamp(spec.min_level_pct, spec.max_level_pct);
        Self {
            state: Mutex::new(SimState {
                battery: Battery::new(spec, level),
                power_kw: 0.0,
                action: BatteryAction::Auto,
                updated_at: now,
                imported_kwh: 0.0,
                exported_kwh: 0.0,
            }),
            household: SyntheticForecaster::default(),
        }
    }

    /// Net household load at `now`, positive when consuming more than producing.
    fn household_kw(&self, now: DateTime<Utc>) -> f64 {
        let f = self.household.forecast(DateHour::from_datetime(&now));
        f.consumption_kwh - f.production_kwh
    }

    /// Power the battery takes in auto mode: soak up surplus, cover deficit.
    fn auto_power(spec: &BatterySpec, household_kw: f64) -> f64 {
        if household_kw < 0.0 {
            (-household_kw).min(spec.max_charge_rate_kw)
        } else {
            -household_kw.min(spec.max_discharge_rate_kw)
        }
    }

    fn advance(&self, state: &mut SimState, now: DateTime<Utc>) {
        let hours = (now - state.updated_at).num_milliseconds().max(0) as f64 / 3_600_000.0;
        if state.action == BatteryAction::Auto {
            state.power_kw = Self::auto_power(&state.battery.spec, self.household_kw(now));
        }
        let battery_kwh = state.battery.update_level(state.power_kw * hours);
        let grid_kwh = self.household_kw(now) * hours + battery_kwh;
        if grid_kwh > 0.0 {
            state.imported_kwh += grid_kwh;
        } else {
            state.exported_kwh -= grid_kwh;
        }
        state.updated_at = now;
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> TelemetrySnapshot {
        let mut state = self.state.lock();
        self.advance(&mut state, now);
        TelemetrySnapshot {
            battery_level_pct: state.battery.current_level_pct,
            battery_power_kw: state.power_kw,
            grid_power_kw: self.household_kw(now) + state.power_kw,
            observed_at: now,
        }
    }

    pub fn reading_at(&self, now: DateTime<Utc>) -> MeterReading {
        let mut state = self.state.lock();
        self.advance(&mut state, now);
        MeterReading {
            imported_kwh: state.imported_kwh,
            exported_kwh: state.exported_kwh,
            battery_level_pct: state.battery.current_level_pct,
        }
    }

    pub fn apply_at(&self, instruction: BatteryInstruction, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        self.advance(&mut state, now);
        state.action = instruction.action;
        state.power_kw = match instruction.action {
            BatteryAction::Auto => Self::auto_power(&state.battery.spec, self.household_kw(now)),
            BatteryAction::Charge => instruction.power_kw,
            BatteryAction::Discharge => -instruction.power_kw,
        };
        debug!(
            action = %instruction.action,
            power_kw = state.power_kw,
            level_pct = state.battery.current_level_pct,
            "simulated battery updated"
        );
    }

    pub fn apply(&self, instruction: BatteryInstruction) {
        self.apply_at(instruction, Utc::now());
    }
}

#[async_trait]
impl BatteryTelemetry for SimulatedTelemetry {
    async fn snapshot(&self) -> Result<TelemetrySnapshot> {
        Ok(self.snapshot_at(Utc::now()))
    }
}

#[async_trait]
impl GridMeter for SimulatedTelemetry {
    async fn reading(&self) -> Result<MeterReading> {
        Ok(self.reading_at(Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::test_spec;
    use chrono::Duration;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_charge_integrates_over_time() {
        let t0 = Utc::now();
        let sim = SimulatedTelemetry::starting_at(test_spec(), 50.0, t0);
        sim.apply_at(BatteryInstruction::new(BatteryAction::Charge, 2.0), t0);

        let snap = sim.snapshot_at(t0 + Duration::minutes(30));

        // 1 kWh into a 10 kWh battery
        assert!((snap.battery_level_pct - 60.0).abs() < EPS);
        assert!((snap.battery_power_kw - 2.0).abs() < EPS);
    }

    #[test]
    fn test_discharge_stops_at_floor() {
        let t0 = Utc::now();
        let sim = SimulatedTelemetry::starting_at(test_spec(), 20.0, t0);
        sim.apply_at(BatteryInstruction::new(BatteryAction::Discharge, 3.0), t0);

        let snap = sim.snapshot_at(t0 + Duration::hours(2));
        assert!((snap.battery_level_pct - 10.0).abs() < EPS);
    }

    #[test]
    fn test_initial_level_is_clamped() {
        let sim = SimulatedTelemetry::new(test_spec(), 0.0);
        let snap = sim.snapshot_at(Utc::now());
        assert!(snap.battery_level_pct >= 10.0 - EPS);
    }

    #[test]
    fn test_grid_power_includes_battery() {
        let t0 = Utc::now();
        let sim = SimulatedTelemetry::starting_at(test_spec(), 50.0, t0);
        sim.apply_at(BatteryInstruction::new(BatteryAction::Charge, 3.0), t0);
        let snap = sim.snapshot_at(t0);
        assert!((snap.grid_power_kw - (sim.household_kw(t0) + 3.0)).abs() < EPS);
    }

    #[test]
    fn test_meter_counts_household_plus_battery() {
        let t0: DateTime<Utc> = "2024-06-01T10:00:00Z".parse().unwrap();
        let t1 = t0 + Duration::minutes(30);
        let sim = SimulatedTelemetry::starting_at(test_spec(), 50.0, t0);
        sim.apply_at(BatteryInstruction::new(BatteryAction::Charge, 2.0), t0);

        let reading = sim.reading_at(t1);

        // 1 kWh went into the battery on top of half an hour of household load
        let expected = sim.household_kw(t1) * 0.5 + 1.0;
        assert!((reading.imported_kwh - reading.exported_kwh - expected).abs() < EPS);
        assert!(reading.imported_kwh >= 0.0 && reading.exported_kwh >= 0.0);
        assert!((reading.battery_level_pct - 60.0).abs() < EPS);
    }

    #[test]
    fn test_full_battery_stops_adding_to_import() {
        let t0: DateTime<Utc> = "2024-06-01T02:00:00Z".parse().unwrap();
        let sim = SimulatedTelemetry::starting_at(test_spec(), 100.0, t0);
        sim.apply_at(BatteryInstruction::new(BatteryAction::Charge, 3.0), t0);

        let reading = sim.reading_at(t0 + Duration::minutes(30));
        let household = sim.household_kw(t0) * 0.5;
        assert!((reading.imported_kwh - reading.exported_kwh - household).abs() < EPS);
    }
}
