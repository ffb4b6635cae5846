// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::time::Duration;
use thiserror::Error;

/// SQLSTATE codes that no amount of retrying will fix.
const PERMANENT_SQLSTATES: &[&str] = &[
    "23505", // unique_violation
    "42P01", // undefined_table
    "42601", // syntax_error
    "42703", // undefined_column
];

const PERMANENT_PATTERNS: &[&str] = &[
    "duplicate key",
    "unique constraint",
    "violates unique",
    "does not exist",
    "syntax error",
];

const TRANSIENT_PATTERNS: &[&str] = &[
    "network",
    "socket",
    "econnreset",
    "connection reset",
    "connection refused",
    "connection terminated",
    "enotfound",
    "getaddrinfo",
    "dns",
    "timed out",
    "timeout",
    "fetch failed",
    "bad gateway",
    "service unavailable",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Permanent,
    Transient,
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("remote store is not configured")]
    NotConfigured,
    #[error("remote service temporarily unavailable (retry in {}s)", .retry_after.as_secs())]
    CircuitOpen { retry_after: Duration },
    #[error("device is offline")]
    Offline,
    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),
    #[error("remote returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("remote database error {}: {message}", .code.as_deref().unwrap_or("-"))]
    Database {
        code: Option<String>,
        message: String,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("could not decode remote response: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn class(&self) -> ErrorClass {
        match self {
            GatewayError::NotConfigured | GatewayError::Decode(_) => ErrorClass::Permanent,
            GatewayError::CircuitOpen { .. }
            | GatewayError::Offline
            | GatewayError::Timeout(_)
            | GatewayError::Transport(_) => ErrorClass::Transient,
            GatewayError::Http { status, message } => {
                if matches!(*status, 502..=504) || matches_any(message, TRANSIENT_PATTERNS) {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Permanent
                }
            }
            GatewayError::Database { code, message } => {
                if code
                    .as_deref()
                    .is_some_and(|c| PERMANENT_SQLSTATES.contains(&c))
                    || matches_any(message, PERMANENT_PATTERNS)
                {
                    ErrorClass::Permanent
                } else if matches_any(message, TRANSIENT_PATTERNS)
                    || code.as_deref().is_some_and(|c| c.starts_with("08"))
                {
                    // class 08: connection exceptions
                    ErrorClass::Transient
                } else {
                    ErrorClass::Permanent
                }
            }
        }
    }

    /// Whether the gateway's own retry loop should try again. Guard errors
    /// are already rate limited and are never retried in place.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
            && !matches!(
                self,
                GatewayError::CircuitOpen { .. } | GatewayError::Offline
            )
    }

    /// Errors after which further calls in the same batch are pointless.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            GatewayError::NotConfigured | GatewayError::CircuitOpen { .. } | GatewayError::Offline
        )
    }
}

fn matches_any(message: &str, patterns: &[&str]) -> bool {
    let lower = message.to_ascii_lowercase();
    patterns.iter().any(|p| lower.contains(p))
}
