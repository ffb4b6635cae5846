// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

mod common;

use common::{row, CountingReachability, ScriptedTransport};
use ledgerline::gateway::{
    AssumeOnline, CallOptions, ErrorClass, GatewayError, GatewaySettings, RemoteGateway,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn reset() -> GatewayError {
    GatewayError::Transport("connection reset by peer".into())
}

#[tokio::test(start_paused = true)]
async fn unique_violation_is_attempted_once() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push(Err(GatewayError::Database {
        code: Some("23505".into()),
        message: "duplicate key value violates unique constraint".into(),
    }));
    let gw = common::gateway(transport.clone(), Arc::new(AssumeOnline));

    let err = gw
        .execute("INSERT INTO entries ...", &[], CallOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Permanent);
    assert_eq!(transport.calls(), 1);
    assert_eq!(gw.health().consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn timeouts_are_retried_up_to_the_configured_count() {
    let mut transport = ScriptedTransport::new();
    transport.delay = Some(Duration::from_secs(60));
    let transport = Arc::new(transport);
    let settings = GatewaySettings {
        failure_threshold: 10,
        timeout: Duration::from_secs(1),
        ..common::fast_settings()
    };
    let gw = RemoteGateway::new(Some(transport.clone()), Arc::new(AssumeOnline), settings);

    let err = gw
        .execute("SELECT 1", &[], CallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Timeout(_)));
    assert_eq!(transport.calls(), 3);

    let err = gw
        .execute(
            "SELECT 1",
            &[],
            CallOptions {
                retries: Some(5),
                timeout: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Timeout(_)));
    assert_eq!(transport.calls(), 8);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_then_success_resets_counter() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push(Err(reset()));
    transport.push(Ok(vec![row(json!({"one": 1}))]));
    let gw = common::gateway(transport.clone(), Arc::new(AssumeOnline));

    let rows = gw
        .execute("SELECT 1", &[], CallOptions::default())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(transport.calls(), 2);
    let health = gw.health();
    assert_eq!(health.consecutive_failures, 0);
    assert!(health.last_success_at.is_some());
    assert!(health.last_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn circuit_opens_rejects_then_probes_after_cooldown() {
    let transport = Arc::new(ScriptedTransport::new());
    for _ in 0..3 {
        transport.push(Err(reset()));
    }
    let gw = common::gateway(transport.clone(), Arc::new(AssumeOnline));

    let err = gw
        .execute("SELECT 1", &[], CallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Transport(_)));
    assert_eq!(transport.calls(), 3);
    assert!(gw.health().circuit_open_until.is_some());

    // Rejected without touching the transport.
    let err = gw
        .execute("SELECT 1", &[], CallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::CircuitOpen { .. }));
    assert_eq!(transport.calls(), 3);

    tokio::time::advance(Duration::from_secs(31)).await;

    // The probe fails: a single attempt and the circuit reopens.
    transport.push(Err(reset()));
    transport.push(Ok(Vec::new()));
    let err = gw
        .execute("SELECT 1", &[], CallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Transport(_)));
    assert_eq!(transport.calls(), 4);
    assert!(matches!(
        gw.execute("SELECT 1", &[], CallOptions::default()).await,
        Err(GatewayError::CircuitOpen { .. })
    ));

    tokio::time::advance(Duration::from_secs(31)).await;
    gw.execute("SELECT 1", &[], CallOptions::default())
        .await
        .unwrap();
    assert_eq!(transport.calls(), 5);
    let health = gw.health();
    assert_eq!(health.consecutive_failures, 0);
    assert!(health.circuit_open_until.is_none());
}

#[tokio::test(start_paused = true)]
async fn dropped_probe_gives_the_slot_back() {
    let mut transport = ScriptedTransport::new();
    transport.delay = Some(Duration::from_secs(600));
    let transport = Arc::new(transport);
    let settings = GatewaySettings {
        timeout: Duration::from_secs(1),
        failure_threshold: 1,
        ..common::fast_settings()
    };
    let gw = Arc::new(RemoteGateway::new(
        Some(transport.clone()),
        Arc::new(AssumeOnline),
        settings,
    ));

    let err = gw
        .execute("SELECT 1", &[], CallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Timeout(_)));
    assert!(gw.health().circuit_open_until.is_some());
    tokio::time::advance(Duration::from_secs(31)).await;

    // The probing task is aborted mid-call.
    let probe = tokio::spawn({
        let gw = Arc::clone(&gw);
        async move { gw.execute("SELECT 1", &[], CallOptions::default()).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(transport.calls(), 2);
    probe.abort();
    assert!(probe.await.unwrap_err().is_cancelled());

    // An outer timeout drops the next probe.
    let dropped = tokio::time::timeout(
        Duration::from_millis(10),
        gw.execute("SELECT 1", &[], CallOptions::default()),
    )
    .await;
    assert!(dropped.is_err());
    assert_eq!(transport.calls(), 3);

    // Later callers still get to probe instead of being turned away.
    let err = gw
        .execute("SELECT 1", &[], CallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Timeout(_)));
    assert_eq!(transport.calls(), 4);
}

#[tokio::test]
async fn unconfigured_gateway_fails_without_probing() {
    let reach = CountingReachability::online();
    let gw = RemoteGateway::new(None, reach.clone(), GatewaySettings::default());
    assert!(!gw.is_configured());
    let err = gw
        .execute("SELECT 1", &[], CallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NotConfigured));
    assert!(err.is_unavailable());
    assert_eq!(reach.probes(), 0);
    assert!(!gw.health().configured);
}

#[tokio::test(start_paused = true)]
async fn offline_fails_fast_and_caches_reachability() {
    let transport = Arc::new(ScriptedTransport::new());
    let reach = CountingReachability::offline();
    let gw = common::gateway(transport.clone(), reach.clone());

    for _ in 0..3 {
        let err = gw
            .execute("SELECT 1", &[], CallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Offline));
    }
    assert_eq!(transport.calls(), 0);
    assert_eq!(reach.probes(), 1);

    // Back online, but the cached answer holds until the TTL passes.
    reach.online.store(true, std::sync::atomic::Ordering::SeqCst);
    assert!(gw.execute("SELECT 1", &[], CallOptions::default()).await.is_err());
    tokio::time::advance(Duration::from_secs(6)).await;
    gw.execute("SELECT 1", &[], CallOptions::default())
        .await
        .unwrap();
    assert_eq!(reach.probes(), 2);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn query_as_decodes_rows() {
    #[derive(Debug, serde::Deserialize)]
    struct One {
        n: i64,
    }
    let transport = Arc::new(ScriptedTransport::new());
    transport.push(Ok(vec![row(json!({"n": 1})), row(json!({"n": 2}))]));
    transport.push(Ok(vec![row(json!({"m": "x"}))]));
    let gw = common::gateway(transport, Arc::new(AssumeOnline));

    let rows: Vec<One> = gw
        .query_as("SELECT n", &[], CallOptions::default())
        .await
        .unwrap();
    assert_eq!(rows.iter().map(|r| r.n).sum::<i64>(), 3);

    let err = gw
        .query_as::<One>("SELECT n", &[], CallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Decode(_)));
}
