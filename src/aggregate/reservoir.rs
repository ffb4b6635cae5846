// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

/// Fixed-size uniform sample of a stream (Algorithm R).
pub struct Reservoir {
    capacity: usize,
    seen: u64,
    items: Vec<i64>,
    rng: StdRng,
}

impl Reservoir {
    pub fn new(capacity: usize, seed: Option<u64>) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            seen: 0,
            items: Vec::with_capacity(capacity.min(4096)),
            rng: match seed {
                Some(s) => StdRng::seed_from_u64(s),
                None => StdRng::from_entropy(),
            },
        }
    }

    pub fn push(&mut self, value: i64) {
        self.seen += 1;
        if self.items.len() < self.capacity {
            self.items.push(value);
            return;
        }
        let j = self.rng.gen_range(0..self.seen);
        if (j as usize) < self.capacity {
            self.items[j as usize] = value;
        }
    }

    pub fn seen(&self) -> u64 {
        self.seen
    }

    /// The sample holds every value pushed so far.
    pub fn is_exact(&self) -> bool {
        self.seen <= self.capacity as u64
    }

    /// Median of the sample in minor units, averaging the middle pair.
    pub fn median_minor(&self) -> Option<Decimal> {
        if self.items.is_empty() {
            return None;
        }
        let mut sorted = self.items.clone();
        sorted.sort_unstable();
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 1 {
            Some(Decimal::from(sorted[mid]))
        } else {
            let pair = sorted[mid - 1] as i128 + sorted[mid] as i128;
            Some(Decimal::from_i128_with_scale(pair, 0) / Decimal::TWO)
        }
    }
}
