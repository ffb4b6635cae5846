// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! SQL-over-HTTP transport.
//!
//! Request:  `POST {endpoint}` `{"query": "...", "params": [...]}`
//! Response: `{"rows": [{...}, ...]}`, or `{"message": "...", "code": "23505"}`
//! on failure.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::error::GatewayError;

pub type Row = Map<String, Value>;

const UA: &str = concat!(
    "ledgerline/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/alphavelocity/ledgerline)"
);

#[async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, GatewayError>;
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    rows: Vec<Row>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

pub struct HttpSqlTransport {
    client: reqwest::Client,
    endpoint: String,
    connection: String,
}

impl HttpSqlTransport {
    pub fn new(endpoint: &str, connection: &str) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .user_agent(UA)
            .pool_max_idle_per_host(2)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            connection: connection.to_string(),
        })
    }
}

#[async_trait]
impl RemoteTransport for HttpSqlTransport {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, GatewayError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header("Neon-Connection-String", &self.connection)
            .json(&json!({ "query": sql, "params": params }))
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if !status.is_success() {
            let body: Option<ErrorBody> = serde_json::from_str(&text).ok();
            let (message, code) = match body {
                Some(b) => (b.message.unwrap_or_else(|| text.clone()), b.code),
                None => (text.clone(), None),
            };
            return Err(match code {
                Some(code) => GatewayError::Database {
                    code: Some(code),
                    message,
                },
                None => GatewayError::Http {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        let parsed: QueryResponse =
            serde_json::from_str(&text).map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(parsed.rows)
    }
}
