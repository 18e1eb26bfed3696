//! Day-shaped synthetic forecasts for running without a price feed or a
//! weather service.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Datelike;
use std::f64::consts::PI;

use crate::domain::{two_decimals, DateHour, HourlyForecast};
use crate::forecast::ForecastSource;

#[derive(Debug, Clone)]
pub struct SyntheticForecaster {
    /// Panel output at solar noon, kW
    pub solar_peak_kw: f64,
    /// Household load outside the peaks, kW
    pub base_load_kw: f64,
    /// Extra load in the morning and evening peaks, kW
    pub peak_load_kw: f64,
    /// Spot price at night, SEK/kWh
    pub base_price: f64,
    /// Price added in the morning and evening peaks, SEK/kWh
    pub peak_price: f64,
    /// Offset of local time from UTC, hours
    pub utc_offset_hours: i64,
}

impl Default for SyntheticForecaster {
    fn default() -> Self {
        Self {
            solar_peak_kw: 6.0,
            base_load_kw: 0.6,
            peak_load_kw: 1.8,
            base_price: 0.4,
            peak_price: 1.6,
            utc_offset_hours: 1,
        }
    }
}

impl SyntheticForecaster {
    fn local_hour(&self, hour: DateHour) -> u32 {
        hour.add(self.utc_offset_hours).hour
    }

    /// Half-sine between 06 and 18 local, scaled down in winter.
    pub fn production_kwh(&self, hour: DateHour) -> f64 {
        let h = self.local_hour(hour) as f64 + 0.5;
        if !(6.0..18.0).contains(&h) {
            return 0.0;
        }
        let day = hour.date.ordinal() as f64;
        let season = 0.6 + 0.4 * (2.0 * PI * (day - 80.0) / 365.0).sin();
        two_decimals(self.solar_peak_kw * season * (PI * (h - 6.0) / 12.0).sin())
    }

    pub fn consumption_kwh(&self, hour: DateHour) -> f64 {
        let load = match self.local_hour(hour) {
            6..=8 => self.base_load_kw + self.peak_load_kw * 0.7,
            17..=21 => self.base_load_kw + self.peak_load_kw,
            0..=5 => self.base_load_kw * 0.8,
            _ => self.base_load_kw,
        };
        two_decimals(load)
    }

    pub fn price(&self, hour: DateHour) -> f64 {
        let price = match self.local_hour(hour) {
            7..=9 => self.base_price + self.peak_price * 0.8,
            17..=20 => self.base_price + self.peak_price,
            11..=14 => self.base_price * 0.5,
            _ => self.base_price,
        };
        two_decimals(price)
    }

    pub fn forecast(&self, hour: DateHour) -> HourlyForecast {
        HourlyForecast {
            energy_price: self.price(hour),
            production_kwh: self.production_kwh(hour),
            consumption_kwh: self.consumption_kwh(hour),
        }
    }
}

#[async_trait]
impl ForecastSource for SyntheticForecaster {
    async fn hour_forecast(&self, hour: DateHour) -> Result<Option<HourlyForecast>> {
        Ok(Some(self.forecast(hour)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateHour {
        s.parse().unwrap()
    }

    #[test]
    fn test_no_sun_at_night() {
        let f = SyntheticForecaster::default();
        assert_eq!(f.production_kwh(utc("2024-06-21 23")), 0.0);
        assert_eq!(f.production_kwh(utc("2024-06-21 02")), 0.0);
    }

    #[test]
    fn test_summer_noon_beats_winter_noon() {
        let f = SyntheticForecaster::default();
        let summer = f.production_kwh(utc("2024-06-21 11"));
        let winter = f.production_kwh(utc("2024-12-21 11"));
        assert!(summer > winter);
        assert!(summer <= f.solar_peak_kw);
        assert!(winter > 0.0);
    }

    #[test]
    fn test_evening_is_expensive_and_loaded() {
        let f = SyntheticForecaster::default();
        let evening = utc("2024-06-21 17"); // 18 local
        let night = utc("2024-06-21 01");
        assert!(f.price(evening) > f.price(night));
        assert!(f.consumption_kwh(evening) > f.consumption_kwh(night));
        assert!(f.forecast(evening).energy_balance() < 0.0);
    }
}
