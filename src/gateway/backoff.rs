// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rand::Rng;
use std::time::Duration;

/// Exponential backoff with additive jitter:
/// `min(base * 2^attempt + U[0, base), cap)`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    base: Duration,
    cap: Duration,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base.as_millis() as u64;
        let exp = base_ms.saturating_mul(2_u64.saturating_pow(attempt.min(32)));
        let jitter = if base_ms > 0 {
            rand::thread_rng().gen_range(0..base_ms)
        } else {
            0
        };
        std::cmp::min(
            Duration::from_millis(exp.saturating_add(jitter)),
            self.cap,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_and_caps() {
        let b = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_millis(1_000));
        for _ in 0..50 {
            let d0 = b.delay(0);
            assert!(d0 >= Duration::from_millis(100) && d0 < Duration::from_millis(200));
            let d2 = b.delay(2);
            assert!(d2 >= Duration::from_millis(400) && d2 < Duration::from_millis(500));
            assert_eq!(b.delay(10), Duration::from_millis(1_000));
        }
    }

    #[test]
    fn zero_base_is_immediate() {
        let b = ExponentialBackoff::new(Duration::ZERO, Duration::from_secs(1));
        assert_eq!(b.delay(3), Duration::ZERO);
    }
}
