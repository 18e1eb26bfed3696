use serde::{Deserialize, Serialize};
use validator::Validate;

/// Cost of importing `kwh` from the grid, in SEK.
pub fn buy_price(kwh: f64, price: f64, energy_tax: f64, grid_benefit: f64) -> f64 {
    kwh * (price + energy_tax - grid_benefit)
}

/// Revenue from exporting `kwh` to the grid, in SEK.
pub fn sell_price(kwh: f64, price: f64, tax_reduction: f64) -> f64 {
    kwh * (price + tax_reduction)
}

/// Net money flow for one hour of grid exchange.
///
/// Positive when more energy was exported than imported (revenue), negative
/// when the household was a net importer (cost).
pub fn cash_flow(
    grid_import_kwh: f64,
    grid_export_kwh: f64,
    price: f64,
    energy_tax: f64,
    tax_reduction: f64,
    grid_benefit: f64,
) -> f64 {
    let net_export = grid_export_kwh - grid_import_kwh;
    if net_export > 0.0 {
        sell_price(net_export, price, tax_reduction)
    } else if net_export < 0.0 {
        -buy_price(-net_export, price, energy_tax, grid_benefit)
    } else {
        0.0
    }
}

/// Per-kWh rates applied on top of the spot price.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct Tariff {
    /// Energy tax including VAT (energiskatt), SEK/kWh
    #[validate(range(min = 0.0))]
    pub energy_tax: f64,
    /// Credit per exported kWh (skattereduktion), SEK/kWh
    #[validate(range(min = 0.0))]
    pub tax_reduction: f64,
    /// Credit per imported kWh (nätnytta), SEK/kWh
    #[validate(range(min = 0.0))]
    pub grid_benefit: f64,
}

impl Tariff {
    pub fn buy_price(&self, kwh: f64, price: f64) -> f64 {
        buy_price(kwh, price, self.energy_tax, self.grid_benefit)
    }

    pub fn sell_price(&self, kwh: f64, price: f64) -> f64 {
        sell_price(kwh, price, self.tax_reduction)
    }

    pub fn cash_flow(&self, grid_import_kwh: f64, grid_export_kwh: f64, price: f64) -> f64 {
        cash_flow(
            grid_import_kwh,
            grid_export_kwh,
            price,
            self.energy_tax,
            self.tax_reduction,
            self.grid_benefit,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const EPS: f64 = 1e-9;

    #[rstest]
    #[case(2.0, 1.0, 0.5, 0.1, 2.8)]
    #[case(0.0, 1.0, 0.5, 0.1, 0.0)]
    #[case(3.0, -0.5, 0.0, 0.0, -1.5)]
    fn test_buy_price(
        #[case] kwh: f64,
        #[case] price: f64,
        #[case] tax: f64,
        #[case] benefit: f64,
        #[case] expected: f64,
    ) {
        assert!((buy_price(kwh, price, tax, benefit) - expected).abs() < EPS);
    }

    #[rstest]
    #[case(2.0, 1.0, 0.6, 3.2)]
    #[case(1.5, -1.0, 0.0, -1.5)]
    fn test_sell_price(
        #[case] kwh: f64,
        #[case] price: f64,
        #[case] reduction: f64,
        #[case] expected: f64,
    ) {
        assert!((sell_price(kwh, price, reduction) - expected).abs() < EPS);
    }

    #[test]
    fn test_cash_flow_net_export_is_revenue() {
        // 3 kWh out, 1 kWh in: 2 kWh sold at 1.0 + 0.6
        let cf = cash_flow(1.0, 3.0, 1.0, 0.5, 0.6, 0.1);
        assert!((cf - 3.2).abs() < EPS);
    }

    #[test]
    fn test_cash_flow_net_import_is_cost() {
        // 2 kWh bought at 1.0 + 0.5 - 0.1
        let cf = cash_flow(3.0, 1.0, 1.0, 0.5, 0.6, 0.1);
        assert!((cf + 2.8).abs() < EPS);
    }

    #[test]
    fn test_cash_flow_balanced_is_zero() {
        assert_eq!(cash_flow(2.0, 2.0, 1.0, 0.5, 0.6, 0.1), 0.0);
    }

    #[test]
    fn test_tariff_methods_delegate() {
        let tariff = Tariff {
            energy_tax: 0.5,
            tax_reduction: 0.6,
            grid_benefit: 0.1,
        };
        assert!((tariff.buy_price(2.0, 1.0) - 2.8).abs() < EPS);
        assert!((tariff.sell_price(2.0, 1.0) - 3.2).abs() < EPS);
        assert!((tariff.cash_flow(1.0, 3.0, 1.0) - 3.2).abs() < EPS);
    }
}
