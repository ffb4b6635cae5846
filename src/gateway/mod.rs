// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Remote data gateway: the only way the crate talks to the remote store.
//!
//! Every call passes three guards in order (configured, circuit, reachable),
//! then runs under a timeout with retry and backoff for transient failures.
//! Consecutive transient failures open a circuit that rejects calls without
//! I/O until its cooldown passes; the first call after the cooldown probes.

pub mod backoff;
pub mod circuit;
pub mod error;
pub mod reachability;
pub mod transport;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::Config;
use backoff::ExponentialBackoff;
use circuit::{Admission, CircuitBreaker};
pub use error::{ErrorClass, GatewayError};
pub use reachability::{AssumeOnline, NetworkState, Reachability, TcpReachability};
pub use transport::{HttpSqlTransport, RemoteTransport, Row};

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Total attempts per call, including the first.
    pub retries: u32,
    pub timeout: Duration,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub reachability_ttl: Duration,
    pub warm_timeout: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            retries: 3,
            timeout: Duration::from_secs(15),
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
            failure_threshold: 3,
            cooldown: Duration::from_secs(30),
            reachability_ttl: Duration::from_secs(5),
            warm_timeout: Duration::from_secs(5),
        }
    }
}

impl GatewaySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retries: config.retries.max(1),
            timeout: config.timeout,
            ..Self::default()
        }
    }
}

/// Per-call overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions {
    pub retries: Option<u32>,
    pub timeout: Option<Duration>,
}

/// Snapshot for status displays.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GatewayHealth {
    pub configured: bool,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_latency_ms: Option<u64>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub circuit_open_until: Option<DateTime<Utc>>,
}

struct GatewayState {
    circuit: CircuitBreaker,
    reachability: Option<(Instant, bool)>,
    last_success_at: Option<DateTime<Utc>>,
    last_latency: Option<Duration>,
    last_error: Option<String>,
}

pub struct RemoteGateway {
    transport: Option<Arc<dyn RemoteTransport>>,
    reachability: Arc<dyn Reachability>,
    settings: GatewaySettings,
    backoff: ExponentialBackoff,
    state: Mutex<GatewayState>,
}

impl RemoteGateway {
    pub fn new(
        transport: Option<Arc<dyn RemoteTransport>>,
        reachability: Arc<dyn Reachability>,
        settings: GatewaySettings,
    ) -> Self {
        let state = GatewayState {
            circuit: CircuitBreaker::new(settings.failure_threshold, settings.cooldown),
            reachability: None,
            last_success_at: None,
            last_latency: None,
            last_error: None,
        };
        Self {
            transport,
            reachability,
            backoff: ExponentialBackoff::new(settings.base_delay, settings.max_delay),
            settings,
            state: Mutex::new(state),
        }
    }

    /// Builds the HTTP transport when both the endpoint and the connection
    /// string are present; otherwise the gateway is unconfigured.
    pub fn from_config(config: &Config) -> Result<Self, GatewayError> {
        let settings = GatewaySettings::from_config(config);
        let (transport, reach): (Option<Arc<dyn RemoteTransport>>, Arc<dyn Reachability>) =
            match (&config.remote_url, &config.remote_connection) {
                (Some(url), Some(conn)) => {
                    let t = HttpSqlTransport::new(url, conn)?;
                    let reach: Arc<dyn Reachability> = match TcpReachability::for_url(url) {
                        Some(r) => Arc::new(r),
                        None => Arc::new(AssumeOnline),
                    };
                    (Some(Arc::new(t)), reach)
                }
                _ => (None, Arc::new(AssumeOnline)),
            };
        Ok(Self::new(transport, reach, settings))
    }

    pub fn is_configured(&self) -> bool {
        self.transport.is_some()
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    fn state(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn health(&self) -> GatewayHealth {
        let st = self.state();
        let now = Instant::now();
        let circuit_open_until = st
            .circuit
            .open_until()
            .filter(|until| *until > now)
            .and_then(|until| chrono::Duration::from_std(until - now).ok())
            .map(|left| Utc::now() + left);
        GatewayHealth {
            configured: self.is_configured(),
            last_success_at: st.last_success_at,
            last_latency_ms: st.last_latency.map(|d| d.as_millis() as u64),
            last_error: st.last_error.clone(),
            consecutive_failures: st.circuit.failures(),
            circuit_open_until,
        }
    }

    /// Runs one parameterized statement and returns its rows.
    pub async fn execute(
        &self,
        sql: &str,
        params: &[Value],
        opts: CallOptions,
    ) -> Result<Vec<Row>, GatewayError> {
        let Some(transport) = self.transport.clone() else {
            return Err(GatewayError::NotConfigured);
        };

        let admission = self.state().circuit.admit(Instant::now());
        let probing = match admission {
            Admission::Rejected { retry_after } => {
                log::debug!("circuit open, rejecting call ({:?} left)", retry_after);
                return Err(GatewayError::CircuitOpen { retry_after });
            }
            Admission::Probe => {
                log::info!("circuit half-open, probing remote");
                true
            }
            Admission::Normal => false,
        };
        let mut probe = ProbeSlot {
            gateway: self,
            held: probing,
        };

        if !self.is_online().await {
            self.state().last_error = Some(GatewayError::Offline.to_string());
            return Err(GatewayError::Offline);
        }

        let attempts = if probing {
            1
        } else {
            opts.retries.unwrap_or(self.settings.retries).max(1)
        };
        let timeout = opts.timeout.unwrap_or(self.settings.timeout);

        let mut attempt = 0;
        loop {
            let started = Instant::now();
            let outcome = match tokio::time::timeout(timeout, transport.query(sql, params)).await {
                Ok(r) => r,
                Err(_) => Err(GatewayError::Timeout(timeout)),
            };
            attempt += 1;
            // Every branch below records the outcome on the breaker.
            probe.held = false;

            let err = match outcome {
                Ok(rows) => {
                    let mut st = self.state();
                    st.circuit.record_success();
                    st.last_success_at = Some(Utc::now());
                    st.last_latency = Some(started.elapsed());
                    st.last_error = None;
                    return Ok(rows);
                }
                Err(e) => e,
            };

            if !err.is_retryable() {
                // The remote answered, so it is up even though the call failed.
                let mut st = self.state();
                st.circuit.record_success();
                st.last_error = Some(err.to_string());
                log::error!("remote call failed permanently: {}", err);
                return Err(err);
            }

            let opened = {
                let mut st = self.state();
                st.last_error = Some(err.to_string());
                st.circuit.record_failure(Instant::now())
            };
            if opened {
                log::error!(
                    "remote call failed ({}); circuit open for {:?}",
                    err,
                    self.settings.cooldown
                );
                return Err(err);
            }
            if attempt >= attempts {
                log::error!("remote call failed after {} attempt(s): {}", attempt, err);
                return Err(err);
            }

            let delay = self.backoff.delay(attempt - 1);
            log::warn!(
                "retry attempt {} of {} in {:?} after: {}",
                attempt + 1,
                attempts,
                delay,
                err
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// [`execute`](Self::execute) plus row decoding.
    pub async fn query_as<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &[Value],
        opts: CallOptions,
    ) -> Result<Vec<T>, GatewayError> {
        let rows = self.execute(sql, params, opts).await?;
        rows.into_iter()
            .map(|r| {
                serde_json::from_value(Value::Object(r))
                    .map_err(|e| GatewayError::Decode(e.to_string()))
            })
            .collect()
    }

    /// Wakes a cold remote endpoint in the background. Never blocks and
    /// never reports failure.
    pub fn warm(self: &Arc<Self>) {
        if !self.is_configured() {
            return;
        }
        if self.state().circuit.is_open(Instant::now()) {
            log::debug!("skipping warm-up while circuit is open");
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let gw = Arc::clone(self);
        handle.spawn(async move {
            let opts = CallOptions {
                retries: Some(1),
                timeout: Some(gw.settings.warm_timeout),
            };
            match gw.execute("SELECT 1", &[], opts).await {
                Ok(_) => log::debug!("remote warm-up ok"),
                Err(e) => log::debug!("remote warm-up failed: {}", e),
            }
        });
    }

    async fn is_online(&self) -> bool {
        let now = Instant::now();
        if let Some((at, online)) = self.state().reachability {
            if now.duration_since(at) < self.settings.reachability_ttl {
                return online;
            }
        }
        let online = self.reachability.probe().await.online();
        self.state().reachability = Some((Instant::now(), online));
        if !online {
            log::warn!("remote unreachable; skipping call");
        }
        online
    }
}

/// Gives the half-open probe slot back if the probing call is dropped before
/// it records an outcome, e.g. by an outer timeout or an aborted task.
struct ProbeSlot<'a> {
    gateway: &'a RemoteGateway,
    held: bool,
}

impl Drop for ProbeSlot<'_> {
    fn drop(&mut self) {
        if self.held {
            log::debug!("probe ended without an outcome; releasing the slot");
            self.gateway.state().circuit.abandon_probe();
        }
    }
}
