use super::PlanningInput;
use crate::domain::Strategy;

/// Outcome of simulating one candidate sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Total grid cost in SEK, `f64::INFINITY` when disqualified
    pub cost: f64,
    /// Battery level after the last simulated hour
    pub battery_level_pct: f64,
}

impl Evaluation {
    pub fn is_disqualified(&self) -> bool {
        self.cost == f64::INFINITY
    }
}

/// Simulates `sequence` hour by hour on a copy of the input battery and sums
/// what is paid to (positive) or earned from (negative) the grid.
///
/// A forced charge needs free capacity and must import from the grid; a forced
/// discharge needs stored energy and must export to the grid. The first hour
/// that breaks either rule ends the simulation with infinite cost.
pub fn evaluate(input: &PlanningInput, sequence: &[Strategy]) -> Evaluation {
    let mut battery = input.battery;
    let tariff = &input.tariff;
    let degradation = battery.spec.degradation_cost_per_kwh;
    let mut cost = 0.0;
    let mut disqualified = false;

    for (strategy, hour) in sequence.iter().zip(&input.forecast) {
        let price = hour.energy_price;
        let balance = hour.energy_balance;

        match strategy {
            Strategy::Default => {
                let delta = battery.update_level(balance);
                let buy_kwh = (delta - balance).max(0.0);
                if buy_kwh > 0.0 {
                    cost += tariff.buy_price(buy_kwh, price);
                }
                let sell_kwh = (balance - delta).max(0.0);
                if sell_kwh > 0.0 {
                    cost -= tariff.sell_price(sell_kwh, price);
                }
                cost += degradation * delta.abs();
            }
            Strategy::Preserve => {
                if balance < 0.0 {
                    cost += tariff.buy_price(-balance, price);
                }
                if balance > 0.0 {
                    cost -= tariff.sell_price(balance, price);
                }
            }
            Strategy::Charge => {
                if battery.available_capacity() <= 0.0 {
                    disqualified = true;
                    break;
                }
                let delta = battery.update_level(battery.spec.max_charge_rate_kw);
                let buy_kwh = (delta - balance).max(0.0);
                if buy_kwh <= 0.0 {
                    disqualified = true;
                    break;
                }
                cost += tariff.buy_price(buy_kwh, price);
                cost += degradation * delta.abs();
            }
            Strategy::Discharge => {
                if battery.remaining_capacity() <= 0.0 {
                    disqualified = true;
                    break;
                }
                let delta = battery.update_level(-battery.spec.max_discharge_rate_kw);
                let sell_kwh = (balance - delta).max(0.0);
                if sell_kwh <= 0.0 {
                    disqualified = true;
                    break;
                }
                cost -= tariff.sell_price(sell_kwh, price);
                cost += degradation * delta.abs();
            }
        }
    }

    Evaluation {
        cost: if disqualified { f64::INFINITY } else { cost },
        battery_level_pct: battery.current_level_pct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Tariff;
    use crate::optimizer::fixtures::scenario;
    use Strategy::*;

    const EPS: f64 = 1e-9;

    fn assert_eval(input: &PlanningInput, seq: &[Strategy], cost: f64, level: f64) {
        let eval = evaluate(input, seq);
        assert!((eval.cost - cost).abs() < EPS, "cost {} != {}", eval.cost, cost);
        assert!(
            (eval.battery_level_pct - level).abs() < EPS,
            "level {} != {}",
            eval.battery_level_pct,
            level
        );
    }

    #[test]
    fn test_charge_then_hold() {
        assert_eval(&scenario(), &[Charge, Preserve, Preserve], 2.3, 40.0);
    }

    #[test]
    fn test_charge_then_sell() {
        assert_eval(&scenario(), &[Charge, Preserve, Discharge], -3.4, 10.0);
    }

    #[test]
    fn test_default_absorbs_surplus_and_covers_deficit() {
        // hour 0: +2 kWh stored, hour 1: +2 kWh stored, hour 2: 2 kWh drawn
        // degradation 0.1 * 6 kWh, nothing traded
        assert_eval(&scenario(), &[Default, Default, Default], 0.6, 30.0);
    }

    #[test]
    fn test_input_battery_is_untouched() {
        let input = scenario();
        let _ = evaluate(&input, &[Charge, Charge, Charge]);
        assert_eq!(input.battery.current_level_pct, 10.0);
    }

    #[test]
    fn test_discharge_from_empty_is_disqualified() {
        let eval = evaluate(&scenario(), &[Discharge, Default, Default]);
        assert!(eval.is_disqualified());
        assert!((eval.battery_level_pct - 10.0).abs() < EPS);
    }

    #[test]
    fn test_charge_when_full_is_disqualified() {
        let mut input = scenario();
        input.battery.current_level_pct = 100.0;
        assert!(evaluate(&input, &[Charge]).is_disqualified());
    }

    #[test]
    fn test_charge_covered_by_surplus_is_disqualified() {
        // Surplus equals the charge rate: physically fine, but no grid import,
        // so a forced charge is rejected.
        let mut input = scenario();
        input.forecast[0].energy_balance = 3.0;
        assert!(evaluate(&input, &[Charge]).is_disqualified());

        input.forecast[0].energy_balance = 2.99;
        assert!(!evaluate(&input, &[Charge]).is_disqualified());
    }

    #[test]
    fn test_discharge_into_deficit_is_disqualified() {
        // Deficit swallows the whole discharge, nothing is exported.
        let mut input = scenario();
        input.battery.current_level_pct = 80.0;
        input.forecast[0].energy_balance = -3.0;
        assert!(evaluate(&input, &[Discharge]).is_disqualified());
    }

    #[test]
    fn test_disqualification_is_final() {
        // Hour 1 discharges an empty battery; nothing after it can help.
        let input = scenario();
        for last in [Default, Preserve, Charge, Discharge] {
            let eval = evaluate(&input, &[Preserve, Discharge, last]);
            assert!(eval.is_disqualified());
            assert!((eval.battery_level_pct - 10.0).abs() < EPS);
        }
    }

    #[test]
    fn test_tariff_enters_cost() {
        let mut input = scenario();
        input.tariff = Tariff {
            energy_tax: 0.5,
            tax_reduction: 0.6,
            grid_benefit: 0.1,
        };
        // Charge buys 1 kWh at -2 + 0.5 - 0.1, Preserve sells 2 kWh at 0 + 0.6,
        // Discharge sells 1 kWh at 2 + 0.6, degradation 0.6
        let expected = -1.6 + 0.3 - 1.2 - 2.6 + 0.3;
        assert_eval(&input, &[Charge, Preserve, Discharge], expected, 10.0);
    }

    #[test]
    fn test_empty_sequence_costs_nothing() {
        assert_eval(&scenario(), &[], 0.0, 10.0);
    }
}
