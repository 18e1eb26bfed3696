pub mod evaluator;
pub mod permutation;
pub mod search;
pub mod types;

pub use evaluator::*;
pub use permutation::*;
pub use search::*;
pub use types::*;

#[cfg(test)]
pub(crate) mod fixtures {
    use super::PlanningInput;
    use crate::domain::{test_spec, Battery, ForecastHour, Tariff};

    /// 10 kWh battery at its 10 % floor facing a cheap surplus hour, a free
    /// surplus hour and an expensive deficit hour.
    pub(crate) fn scenario() -> PlanningInput {
        PlanningInput {
            battery: Battery::new(test_spec(), 10.0),
            grid_max_power_kw: 25.0,
            tariff: Tariff::default(),
            forecast: vec![
                ForecastHour { energy_price: -2.0, energy_balance: 2.0 },
                ForecastHour { energy_price: 0.0, energy_balance: 2.0 },
                ForecastHour { energy_price: 2.0, energy_balance: -2.0 },
            ],
        }
    }
}
