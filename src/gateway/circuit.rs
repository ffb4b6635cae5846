// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open { until: Instant },
    /// Cooldown elapsed; `probing` is set while the single trial call runs.
    HalfOpen { probing: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Normal,
    Probe,
    Rejected { retry_after: Duration },
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    failures: u32,
    state: CircuitState,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            failures: 0,
            state: CircuitState::Closed,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn admit(&mut self, now: Instant) -> Admission {
        match self.state {
            CircuitState::Closed => Admission::Normal,
            CircuitState::Open { until } if now < until => Admission::Rejected {
                retry_after: until - now,
            },
            CircuitState::Open { .. } | CircuitState::HalfOpen { probing: false } => {
                self.state = CircuitState::HalfOpen { probing: true };
                Admission::Probe
            }
            CircuitState::HalfOpen { probing: true } => Admission::Rejected {
                retry_after: Duration::ZERO,
            },
        }
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
        self.state = CircuitState::Closed;
    }

    /// Counts a transient failure; returns true when this failure opened the
    /// circuit.
    pub fn record_failure(&mut self, now: Instant) -> bool {
        self.failures = self.failures.saturating_add(1);
        let trip = matches!(self.state, CircuitState::HalfOpen { .. })
            || self.failures >= self.threshold;
        if trip {
            self.state = CircuitState::Open {
                until: now + self.cooldown,
            };
        }
        trip
    }

    /// Gives the probe slot back when the probe never reached the network.
    pub fn abandon_probe(&mut self) {
        if self.state == (CircuitState::HalfOpen { probing: true }) {
            self.state = CircuitState::HalfOpen { probing: false };
        }
    }

    pub fn is_open(&self, now: Instant) -> bool {
        matches!(self.state, CircuitState::Open { until } if now < until)
    }

    pub fn open_until(&self) -> Option<Instant> {
        match self.state {
            CircuitState::Open { until } => Some(until),
            _ => None,
        }
    }
}
