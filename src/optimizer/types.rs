use serde::{Deserialize, Serialize};

use crate::domain::{Battery, ForecastHour, Strategy, Tariff};

/// Everything one planning run searches over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningInput {
    /// State at the start of the first forecast hour
    pub battery: Battery,
    /// Maximum power to and from the grid, kW
    pub grid_max_power_kw: f64,
    pub tariff: Tariff,
    pub forecast: Vec<ForecastHour>,
}

impl PlanningInput {
    pub fn horizon(&self) -> usize {
        self.forecast.len()
    }
}

/// Best sequence found, with its cost and the battery level it ends at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningOutput {
    /// SEK; negative is a net profit, `f64::INFINITY` means no feasible plan
    pub cost: f64,
    pub battery_level_pct: f64,
    pub strategies: Vec<Strategy>,
}

impl PlanningOutput {
    pub fn is_feasible(&self) -> bool {
        self.cost.is_finite()
    }
}
