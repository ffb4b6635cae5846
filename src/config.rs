// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Runtime configuration from environment variables.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

/// Loaded from environment variables with defaults suited to a phone-sized
/// workload.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQL-over-HTTP endpoint of the remote store.
    pub remote_url: Option<String>,
    /// Connection string forwarded to the endpoint. Without it the gateway
    /// reports itself unconfigured.
    pub remote_connection: Option<String>,
    pub environment: Environment,
    /// Overrides the platform data dir location of the SQLite file.
    pub db_path: Option<String>,
    pub retries: u32,
    pub timeout: Duration,
    pub sync_interval: Duration,
}

impl Config {
    /// Environment variables:
    /// - `LEDGERLINE_REMOTE_URL`
    /// - `LEDGERLINE_REMOTE_CONNECTION`
    /// - `LEDGERLINE_ENV` (`development` | `production`, default production)
    /// - `LEDGERLINE_DB_PATH`
    /// - `LEDGERLINE_RETRIES` (default: 3)
    /// - `LEDGERLINE_TIMEOUT_MS` (default: 15000)
    /// - `LEDGERLINE_SYNC_INTERVAL_SECS` (default: 60)
    pub fn from_env() -> Self {
        Self {
            remote_url: non_empty("LEDGERLINE_REMOTE_URL"),
            remote_connection: non_empty("LEDGERLINE_REMOTE_CONNECTION"),
            environment: match env::var("LEDGERLINE_ENV") {
                Ok(v) if v.eq_ignore_ascii_case("development") || v.eq_ignore_ascii_case("dev") => {
                    Environment::Development
                }
                _ => Environment::Production,
            },
            db_path: non_empty("LEDGERLINE_DB_PATH"),
            retries: env::var("LEDGERLINE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            timeout: Duration::from_millis(
                env::var("LEDGERLINE_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(15_000),
            ),
            sync_interval: Duration::from_secs(
                env::var("LEDGERLINE_SYNC_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
        }
    }

    /// Minimum spacing between sync cycles that were not forced.
    pub fn sync_throttle(&self) -> Duration {
        match self.environment {
            Environment::Development => Duration::from_secs(30),
            Environment::Production => Duration::from_secs(120),
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
