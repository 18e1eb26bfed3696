use serde::{Deserialize, Serialize};

/// Exogenous inputs for one planned hour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastHour {
    /// Spot price, SEK/kWh
    pub energy_price: f64,
    /// Production minus consumption, kWh. Positive is surplus.
    pub energy_balance: f64,
}

/// What the forecast collaborators know about one hour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourlyForecast {
    pub energy_price: f64,
    pub production_kwh: f64,
    pub consumption_kwh: f64,
}

impl HourlyForecast {
    /// Net balance rounded to two decimals, the resolution forecasts are made at.
    pub fn energy_balance(&self) -> f64 {
        two_decimals(self.production_kwh - self.consumption_kwh)
    }

    pub fn to_forecast_hour(&self) -> ForecastHour {
        ForecastHour {
            energy_price: self.energy_price,
            energy_balance: self.energy_balance(),
        }
    }
}

pub fn two_decimals(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_is_rounded() {
        let f = HourlyForecast {
            energy_price: 1.0,
            production_kwh: 2.3456,
            consumption_kwh: 1.1,
        };
        assert_eq!(f.energy_balance(), 1.25);
        assert_eq!(f.to_forecast_hour().energy_price, 1.0);
    }

    #[test]
    fn test_two_decimals_negative() {
        assert_eq!(two_decimals(-0.456), -0.46);
    }
}
