//! Enumeration of every strategy sequence over a horizon.
//!
//! Candidate `i` is `i` written in base 4 with hour 0 as the most significant
//! digit, so `[Default, Default]` is index 0 and `[Discharge, Discharge]` is 15.

use strum::EnumCount;

use crate::domain::Strategy;

/// Longest horizon the brute-force search accepts.
pub const MAX_HORIZON_HOURS: usize = 24;

const BASE: u64 = Strategy::COUNT as u64;

/// Number of candidates `permute(hours)` yields.
pub fn permutation_count(hours: usize) -> u64 {
    if is_supported_horizon(hours) {
        BASE.pow(hours as u32)
    } else {
        1
    }
}

pub fn is_supported_horizon(hours: usize) -> bool {
    (1..=MAX_HORIZON_HOURS).contains(&hours)
}

/// Writes candidate `index` into `out`, one strategy per hour.
pub fn decode_into(mut index: u64, out: &mut [Strategy]) {
    for slot in out.iter_mut().rev() {
        *slot = Strategy::from_digit(index % BASE);
        index /= BASE;
    }
}

pub fn sequence_at(index: u64, hours: usize) -> Vec<Strategy> {
    let mut out = vec![Strategy::Default; hours];
    decode_into(index, &mut out);
    out
}

/// Lazily yields all `4^hours` sequences in index order. Horizons outside
/// `1..=24` yield a single empty sequence.
pub fn permute(hours: usize) -> Permutations {
    let hours = if is_supported_horizon(hours) { hours } else { 0 };
    Permutations {
        hours,
        next: 0,
        end: permutation_count(hours),
    }
}

#[derive(Debug, Clone)]
pub struct Permutations {
    hours: usize,
    next: u64,
    end: u64,
}

impl Iterator for Permutations {
    type Item = Vec<Strategy>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let seq = sequence_at(self.next, self.hours);
        self.next += 1;
        Some(seq)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.end - self.next).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Permutations {}
