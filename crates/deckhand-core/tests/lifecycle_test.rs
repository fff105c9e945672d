// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Integration tests for the instance lifecycle state machine.

mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use deckhand_core::artifacts::InstanceConfig;
use deckhand_core::backend::{BackendError, MockBackend};
use deckhand_core::error::Error;
use deckhand_core::lifecycle::{CreateRequest, WORKER_PORT};

use common::TestContext;

#[tokio::test]
async fn test_create_resolve_remove_roundtrip() {
    let ctx = TestContext::new();

    let created = ctx.create("u1", "d1").await.unwrap();
    assert!((8051..=8100).contains(&created.port));
    assert_eq!(created.url, format!("http://localhost:{}/", created.port));
    assert_eq!(created.key.to_string(), "u1:d1");

    let resolved = ctx.runtime.router().resolve(&TestContext::key("u1", "d1")).await.unwrap();
    assert_eq!(resolved, created.port);

    ctx.remove("u1", "d1").await.unwrap();

    let err = ctx
        .runtime
        .router()
        .resolve(&TestContext::key("u1", "d1"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InstanceNotFound(_)));
    assert_eq!(ctx.backend.worker_count().await, 0);
}

#[tokio::test]
async fn test_create_publishes_worker_port_onto_allocated_port() {
    let ctx = TestContext::new();

    let created = ctx.create("u1", "d1").await.unwrap();

    let specs = ctx.backend.specs().await;
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].host_port, created.port);
    assert_eq!(specs[0].worker_port, WORKER_PORT);
    assert_eq!(specs[0].image, "deckhand-dashboard");
}

#[tokio::test]
async fn test_create_replaces_existing_instance() {
    let ctx = TestContext::new();

    let first = ctx.create("u1", "d1").await.unwrap();
    let second = ctx.create("u1", "d1").await.unwrap();

    // Exactly one entry survives, and the old worker is gone.
    let all = ctx.runtime.router().list_all().await;
    assert_eq!(all.len(), 1);
    assert_eq!(all["u1:d1"], second.port);
    assert_eq!(ctx.backend.worker_count().await, 1);

    // The evicted entry freed its port before the rescan, so the
    // lowest-first scan hands it out again.
    assert_eq!(first.port, second.port);
}

#[tokio::test]
async fn test_replace_proceeds_when_teardown_fails() {
    let ctx = TestContext::new();

    ctx.create("u1", "d1").await.unwrap();
    ctx.backend.set_fail_stop(true);
    ctx.backend.set_fail_remove(true);

    // Teardown of the old worker fails, but the replacement must win.
    let created = ctx.create("u1", "d1").await.unwrap();

    let all = ctx.runtime.router().list_all().await;
    assert_eq!(all.len(), 1);
    assert_eq!(all["u1:d1"], created.port);
}

#[tokio::test]
async fn test_backend_start_failure_leaves_no_entry() {
    let ctx = TestContext::with_backend(Arc::new(MockBackend::failing()));

    let err = ctx.create("u1", "d1").await.unwrap_err();
    assert!(matches!(err, Error::Backend(BackendError::StartFailed(_))));
    assert!(ctx.runtime.router().list_all().await.is_empty());

    // The scanned port was only provisionally reserved; it must be
    // immediately eligible once the backend works again.
    ctx.backend.set_fail_start(false);
    let created = ctx.create("u1", "d1").await.unwrap();
    assert_eq!(created.port, 8051);
}

#[tokio::test]
async fn test_remove_nonexistent_returns_not_found() {
    let ctx = TestContext::new();
    ctx.create("u1", "d1").await.unwrap();

    let err = ctx.remove("u1", "other").await.unwrap_err();
    assert!(matches!(err, Error::InstanceNotFound(_)));
    assert_eq!(ctx.runtime.router().list_all().await.len(), 1);
}

#[tokio::test]
async fn test_remove_failure_retains_entry_for_retry() {
    let ctx = TestContext::new();
    let created = ctx.create("u1", "d1").await.unwrap();

    ctx.backend.set_fail_stop(true);
    let err = ctx.remove("u1", "d1").await.unwrap_err();
    assert!(matches!(err, Error::Backend(BackendError::StopFailed(_))));

    // The entry must survive so the handle is not lost.
    let resolved = ctx.runtime.router().resolve(&TestContext::key("u1", "d1")).await.unwrap();
    assert_eq!(resolved, created.port);

    ctx.backend.set_fail_stop(false);
    ctx.remove("u1", "d1").await.unwrap();
    assert!(ctx.runtime.router().list_all().await.is_empty());
}

#[tokio::test]
async fn test_concurrent_creates_get_disjoint_ports() {
    let ctx = TestContext::with_backend(Arc::new(MockBackend::with_start_delay(50)));

    let mut handles = Vec::new();
    for i in 0..10 {
        let lifecycle = ctx.runtime.lifecycle().clone();
        handles.push(tokio::spawn(async move {
            lifecycle
                .create(TestContext::request("user", &format!("dash{i}")))
                .await
        }));
    }

    let mut ports = Vec::new();
    for handle in futures::future::join_all(handles).await {
        let created = handle.unwrap().unwrap();
        assert!((8051..=8100).contains(&created.port));
        ports.push(created.port);
    }

    ports.sort_unstable();
    ports.dedup();
    assert_eq!(ports.len(), 10, "concurrent creates must get disjoint ports");
}

#[tokio::test]
async fn test_second_create_for_key_in_flight_is_rejected() {
    let ctx = TestContext::with_backend(Arc::new(MockBackend::with_start_delay(300)));

    let lifecycle = ctx.runtime.lifecycle().clone();
    let first = tokio::spawn(async move {
        lifecycle.create(TestContext::request("u1", "d1")).await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    let err = ctx.create("u1", "d1").await.unwrap_err();
    assert!(matches!(err, Error::OperationInFlight(_)));

    // The first create is unaffected by the rejected one.
    let created = first.await.unwrap().unwrap();
    assert_eq!(created.port, 8051);
    assert_eq!(ctx.runtime.router().list_all().await.len(), 1);
}

#[tokio::test]
async fn test_remove_while_create_in_flight_is_rejected() {
    let ctx = TestContext::with_backend(Arc::new(MockBackend::with_start_delay(300)));

    let lifecycle = ctx.runtime.lifecycle().clone();
    let create = tokio::spawn(async move {
        lifecycle.create(TestContext::request("u1", "d1")).await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    let err = ctx.remove("u1", "d1").await.unwrap_err();
    assert!(matches!(err, Error::OperationInFlight(_)));

    create.await.unwrap().unwrap();
    ctx.remove("u1", "d1").await.unwrap();
}

#[tokio::test]
async fn test_fifty_create_remove_cycles_stay_bounded() {
    let ctx = TestContext::new();
    let key = TestContext::key("u1", "d1");

    for _ in 0..50 {
        let created = ctx.create("u1", "d1").await.unwrap();
        assert!((8051..=8100).contains(&created.port));

        let all = ctx.runtime.router().list_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[&key.to_string()], created.port);

        ctx.remove("u1", "d1").await.unwrap();
        assert!(ctx.runtime.router().list_all().await.is_empty());
    }

    assert_eq!(ctx.backend.worker_count().await, 0);
}

#[tokio::test]
async fn test_data_source_binding_uses_base_name() {
    let ctx = TestContext::new();

    let request = CreateRequest {
        data_source_host_path: Some(PathBuf::from("/data/incoming/q3.csv")),
        ..TestContext::request("u1", "d1")
    };
    ctx.runtime.lifecycle().create(request).await.unwrap();

    let specs = ctx.backend.specs().await;
    let data_binding = specs[0]
        .bindings
        .iter()
        .find(|b| b.worker_path.starts_with("/data/sources"))
        .expect("data source binding present");
    assert!(data_binding.worker_path.ends_with("q3.csv"));
    assert_eq!(data_binding.host_path, PathBuf::from("/data/incoming/q3.csv"));

    // The written config carries the rewritten worker-visible path.
    let content = tokio::fs::read_to_string(ctx.configs_dir.join("u1_d1.json"))
        .await
        .unwrap();
    let parsed: InstanceConfig = serde_json::from_str(&content).unwrap();
    assert_eq!(parsed.data_source_path.as_deref(), Some("/data/sources/q3.csv"));
}

#[tokio::test]
async fn test_remove_deletes_config_artifact() {
    let ctx = TestContext::new();

    ctx.create("u1", "d1").await.unwrap();
    let config_path = ctx.configs_dir.join("u1_d1.json");
    assert!(config_path.exists());

    ctx.remove("u1", "d1").await.unwrap();
    assert!(!config_path.exists());
}

#[tokio::test]
async fn test_port_conflict_at_start_retries_next_port() {
    let backend = Arc::new(MockBackend::new());
    let ctx = TestContext::with_backend(backend.clone());

    backend.conflict_on_port(8051).await;
    let created = ctx.create("u1", "d1").await.unwrap();
    assert_eq!(created.port, 8052);
}

#[tokio::test]
async fn test_port_conflict_is_retried_only_once() {
    let backend = Arc::new(MockBackend::new());
    let ctx = TestContext::with_backend(backend.clone());

    backend.conflict_on_port(8051).await;
    backend.conflict_on_port(8052).await;

    let err = ctx.create("u1", "d1").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Backend(BackendError::PortConflict(8052))
    ));
    assert!(ctx.runtime.router().list_all().await.is_empty());

    // Both reservations were released; clearing the conflicts makes the
    // lowest port win again.
    backend.clear_conflict(8051).await;
    backend.clear_conflict(8052).await;
    assert_eq!(ctx.create("u1", "d1").await.unwrap().port, 8051);
}

#[tokio::test]
async fn test_os_occupied_port_is_skipped() {
    let ctx = TestContext::new();
    ctx.occupy_os_port(8051);
    ctx.occupy_os_port(8052);

    let created = ctx.create("u1", "d1").await.unwrap();
    assert_eq!(created.port, 8053);
}

#[tokio::test]
async fn test_ports_exhausted_leaves_registry_unchanged() {
    let ctx = TestContext::with_port_range(8051..=8052);

    ctx.create("u1", "d1").await.unwrap();
    ctx.create("u1", "d2").await.unwrap();

    let err = ctx.create("u1", "d3").await.unwrap_err();
    assert!(matches!(err, Error::PortsExhausted(_)));

    let all = ctx.runtime.router().list_all().await;
    assert_eq!(all.len(), 2);
    assert!(!all.contains_key("u1:d3"));
}
