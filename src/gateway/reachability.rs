// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use async_trait::async_trait;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkState {
    pub connected: bool,
    pub reachable: bool,
}

impl NetworkState {
    pub fn online(&self) -> bool {
        self.connected && self.reachable
    }
}

/// Platform connectivity check. The gateway caches answers, so
/// implementations may be slow.
#[async_trait]
pub trait Reachability: Send + Sync {
    async fn probe(&self) -> NetworkState;
}

/// For local use and tests where connectivity is not in question.
pub struct AssumeOnline;

#[async_trait]
impl Reachability for AssumeOnline {
    async fn probe(&self) -> NetworkState {
        NetworkState {
            connected: true,
            reachable: true,
        }
    }
}

/// Resolves the endpoint host (connected) and opens a TCP connection to it
/// (reachable).
pub struct TcpReachability {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpReachability {
    pub fn for_url(url: &str) -> Option<Self> {
        let parsed = reqwest::Url::parse(url).ok()?;
        let host = parsed.host_str()?.to_string();
        let port = parsed.port_or_known_default()?;
        Some(Self {
            host,
            port,
            timeout: Duration::from_secs(2),
        })
    }
}

#[async_trait]
impl Reachability for TcpReachability {
    async fn probe(&self) -> NetworkState {
        let resolved = tokio::time::timeout(self.timeout, lookup_host((self.host.as_str(), self.port)))
            .await
            .ok()
            .and_then(|r| r.ok())
            .and_then(|mut addrs| addrs.next());
        let Some(addr) = resolved else {
            return NetworkState {
                connected: false,
                reachable: false,
            };
        };
        let reachable = matches!(
            tokio::time::timeout(self.timeout, TcpStream::connect(addr)).await,
            Ok(Ok(_))
        );
        NetworkState {
            connected: true,
            reachable,
        }
    }
}
