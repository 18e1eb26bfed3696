//! Exhaustive search for the cheapest strategy sequence.
//!
//! Both the reference search and the parallel search return the candidate
//! with the lowest cost, ties going to the lowest enumeration index, so their
//! results are identical for the same input.

use std::num::NonZeroUsize;
use std::thread;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::evaluator::{evaluate, Evaluation};
use super::permutation::{decode_into, is_supported_horizon, permutation_count};
use super::{PlanningInput, PlanningOutput};
use crate::domain::Strategy;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("search over {total} candidates cancelled")]
    Cancelled { total: u64 },
}

/// Single-threaded reference search over every permutation.
///
/// Returns the first candidate when every sequence is disqualified; check
/// [`PlanningOutput::is_feasible`].
pub fn best_strategies(input: &PlanningInput) -> PlanningOutput {
    let hours = effective_horizon(input);
    let mut buf = vec![Strategy::Default; hours];
    let best = scan(input, 0, permutation_count(hours), &mut buf, None)
        .unwrap_or_else(|_| unreachable!("search without a token cannot be cancelled"));
    into_output(best, hours)
}

/// Worker-pool search. Splits the candidate range into one contiguous slice
/// per worker and merges the local minima.
#[derive(Debug, Clone, Copy)]
pub struct ParallelSearch {
    workers: NonZeroUsize,
    /// Candidates evaluated between cancellation checks
    batch_size: u64,
}

impl Default for ParallelSearch {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism().unwrap_or(NonZeroUsize::MIN),
            batch_size: 4096,
        }
    }
}

impl ParallelSearch {
    /// `workers == 0` picks one worker per available core.
    pub fn new(workers: usize, batch_size: u64) -> Self {
        let workers = NonZeroUsize::new(workers).unwrap_or_else(|| Self::default().workers);
        Self {
            workers,
            batch_size: batch_size.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers.get()
    }

    pub fn run(
        &self,
        input: &PlanningInput,
        cancel: &CancellationToken,
    ) -> Result<PlanningOutput, SearchError> {
        let hours = effective_horizon(input);
        let total = permutation_count(hours);
        let ranges = worker_ranges(total, self.workers.get() as u64);

        debug!(hours, candidates = total, workers = ranges.len(), "starting strategy search");

        let results: Vec<Result<Candidate, SearchError>> = thread::scope(|scope| {
            let handles: Vec<_> = ranges
                .into_iter()
                .map(|(start, end)| {
                    let batch = self.batch_size;
                    scope.spawn(move || {
                        let mut buf = vec![Strategy::Default; hours];
                        scan(input, start, end, &mut buf, Some((cancel, batch)))
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        });

        let mut best: Option<Candidate> = None;
        for result in results {
            let candidate = result.map_err(|_| SearchError::Cancelled { total })?;
            best = Some(match best {
                Some(current) if !candidate.beats(&current) => current,
                _ => candidate,
            });
        }

        // total >= 1, so at least one worker ran and returned a candidate
        let best = best.unwrap_or(Candidate {
            index: 0,
            eval: evaluate(input, &[]),
        });
        Ok(into_output(best, hours))
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    index: u64,
    eval: Evaluation,
}

impl Candidate {
    /// Lower cost wins; on equal cost the earlier index wins.
    fn beats(&self, other: &Candidate) -> bool {
        self.eval.cost < other.eval.cost
            || (self.eval.cost == other.eval.cost && self.index < other.index)
    }
}

/// Contiguous, non-empty `[start, end)` slices covering `0..total`, at most
/// `workers` of them. Rounding the chunk up can need fewer slices than workers.
fn worker_ranges(total: u64, workers: u64) -> Vec<(u64, u64)> {
    let chunk = total.div_ceil(workers.clamp(1, total.max(1))).max(1);
    (0..total.div_ceil(chunk))
        .map(|w| (w * chunk, ((w + 1) * chunk).min(total)))
        .collect()
}

fn effective_horizon(input: &PlanningInput) -> usize {
    let hours = input.horizon();
    if is_supported_horizon(hours) {
        hours
    } else {
        0
    }
}

/// Evaluates candidates `start..end` and keeps the first minimum.
/// `start < end` is required.
fn scan(
    input: &PlanningInput,
    start: u64,
    end: u64,
    buf: &mut [Strategy],
    cancel: Option<(&CancellationToken, u64)>,
) -> Result<Candidate, SearchError> {
    decode_into(start, buf);
    let mut best = Candidate {
        index: start,
        eval: evaluate(input, buf),
    };

    for index in start + 1..end {
        if let Some((token, batch)) = cancel {
            if (index - start) % batch == 0 && token.is_cancelled() {
                return Err(SearchError::Cancelled { total: end - start });
            }
        }
        decode_into(index, buf);
        let eval = evaluate(input, buf);
        if eval.cost < best.eval.cost {
            best = Candidate { index, eval };
        }
    }

    Ok(best)
}

fn into_output(best: Candidate, hours: usize) -> PlanningOutput {
    let mut strategies = vec![Strategy::Default; hours];
    decode_into(best.index, &mut strategies);
    PlanningOutput {
        cost: best.eval.cost,
        battery_level_pct: best.eval.battery_level_pct,
        strategies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{test_spec, Battery, ForecastHour, Tariff};
    use crate::optimizer::fixtures::scenario;
    use crate::optimizer::permute;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};
    use proptest::strategy::Strategy as PropStrategy;
    use Strategy::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_best_strategies_finds_known_optimum() {
        let out = best_strategies(&scenario());
        assert_eq!(out.strategies, vec![Charge, Preserve, Discharge]);
        assert!((out.cost + 3.4).abs() < EPS);
        assert!((out.battery_level_pct - 10.0).abs() < EPS);
        assert!(out.is_feasible());
    }

    #[test]
    fn test_empty_horizon() {
        let mut input = scenario();
        input.forecast.clear();
        let out = best_strategies(&input);
        assert!(out.strategies.is_empty());
        assert_eq!(out.cost, 0.0);
        assert!((out.battery_level_pct - 10.0).abs() < EPS);
    }

    #[test]
    fn test_horizon_above_cap_is_degenerate() {
        let mut input = scenario();
        input.forecast = vec![input.forecast[0]; 25];
        let out = ParallelSearch::new(2, 16)
            .run(&input, &CancellationToken::new())
            .unwrap();
        assert!(out.strategies.is_empty());
        assert_eq!(out.cost, 0.0);
    }

    #[test]
    fn test_matches_exhaustive_minimum() {
        let input = scenario();
        let min = permute(3)
            .map(|seq| evaluate(&input, &seq).cost)
            .fold(f64::INFINITY, f64::min);
        assert!(best_strategies(&input).cost <= min + EPS);
    }

    #[test]
    fn test_infinite_ties_resolve_to_lowest_index() {
        let a = Candidate {
            index: 3,
            eval: Evaluation { cost: f64::INFINITY, battery_level_pct: 0.0 },
        };
        let b = Candidate {
            index: 0,
            eval: Evaluation { cost: f64::INFINITY, battery_level_pct: 0.0 },
        };
        assert!(b.beats(&a));
        assert!(!a.beats(&b));
    }

    #[test]
    fn test_equal_costs_keep_first_sequence() {
        // Zero prices, no degradation, no balance: every feasible sequence
        // costs 0, so the first one (all Default) must win.
        let spec = crate::domain::BatterySpec {
            degradation_cost_per_kwh: 0.0,
            ..test_spec()
        };
        let input = PlanningInput {
            battery: Battery::new(spec, 50.0),
            grid_max_power_kw: 25.0,
            tariff: Tariff::default(),
            forecast: vec![ForecastHour { energy_price: 0.0, energy_balance: 0.0 }; 2],
        };
        let seq = best_strategies(&input).strategies;
        assert_eq!(seq, vec![Default, Default]);
        let par = ParallelSearch::new(3, 2)
            .run(&input, &CancellationToken::new())
            .unwrap();
        assert_eq!(par.strategies, seq);
    }

    #[test]
    fn test_parallel_matches_reference_on_scenario() {
        let input = scenario();
        for workers in [1, 2, 3, 7, 64, 100] {
            let out = ParallelSearch::new(workers, 5)
                .run(&input, &CancellationToken::new())
                .unwrap();
            assert_eq!(out, best_strategies(&input));
        }
    }

    #[test]
    fn test_worker_ranges_are_never_empty() {
        // 16 candidates over 5 workers rounds to chunks of 4, so only 4 slices
        assert_eq!(worker_ranges(16, 5), vec![(0, 4), (4, 8), (8, 12), (12, 16)]);
        assert_eq!(worker_ranges(1, 8), vec![(0, 1)]);
        assert_eq!(worker_ranges(64, 0), vec![(0, 64)]);

        for total in 1..=256u64 {
            for workers in 1..=12u64 {
                let ranges = worker_ranges(total, workers);
                assert!(ranges.len() as u64 <= workers);
                assert!(ranges.iter().all(|(start, end)| start < end));
                assert_eq!(ranges.first().map(|r| r.0), Some(0));
                assert_eq!(ranges.last().map(|r| r.1), Some(total));
                assert!(ranges.windows(2).all(|w| w[0].1 == w[1].0));
            }
        }
    }

    #[test]
    fn test_two_hours_over_five_workers_matches_reference() {
        let mut input = scenario();
        input.forecast.truncate(2);
        let out = ParallelSearch::new(5, 1)
            .run(&input, &CancellationToken::new())
            .unwrap();
        assert_eq!(out, best_strategies(&input));
        assert_eq!(out.strategies.len(), 2);
    }

    #[test]
    fn test_cancelled_search_stops() {
        let mut input = scenario();
        input.forecast = vec![input.forecast[0]; 8];
        let token = CancellationToken::new();
        token.cancel();
        let err = ParallelSearch::new(2, 8).run(&input, &token).unwrap_err();
        assert_eq!(err, SearchError::Cancelled { total: 4u64.pow(8) });
    }

    fn arb_input() -> impl PropStrategy<Value = PlanningInput> {
        (
            0.0f64..100.0,
            proptest::collection::vec((-3.0f64..3.0, -4.0f64..4.0), 1..=4),
            0.0f64..0.5,
        )
            .prop_map(|(level, hours, degradation)| {
                let spec = crate::domain::BatterySpec {
                    min_level_pct: 0.0,
                    degradation_cost_per_kwh: degradation,
                    ..test_spec()
                };
                PlanningInput {
                    battery: Battery::new(spec, level),
                    grid_max_power_kw: 25.0,
                    tariff: Tariff::default(),
                    forecast: hours
                        .into_iter()
                        .map(|(p, b)| ForecastHour { energy_price: p, energy_balance: b })
                        .collect(),
                }
            })
    }

    proptest! {
        #[test]
        fn prop_parallel_equals_reference(input in arb_input(), workers in 1usize..6) {
            let reference = best_strategies(&input);
            let parallel = ParallelSearch::new(workers, 3)
                .run(&input, &CancellationToken::new())
                .unwrap();
            prop_assert_eq!(parallel, reference);
        }

        #[test]
        fn prop_never_beats_ground_truth(input in arb_input()) {
            let truth = permute(input.horizon())
                .map(|seq| evaluate(&input, &seq).cost)
                .fold(f64::INFINITY, f64::min);
            let best = best_strategies(&input).cost;
            prop_assert!(best >= truth - EPS);
            prop_assert!(best <= truth + EPS);
        }
    }
}
