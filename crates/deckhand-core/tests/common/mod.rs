// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for deckhand-core integration tests.
//!
//! Provides a TestContext wiring a Runtime over a MockBackend, a fake
//! port probe, and tempfile-backed artifact directories, so tests stay
//! hermetic and deterministic.

#![allow(dead_code)]

use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use deckhand_core::Runtime;
use deckhand_core::backend::{Backend, MockBackend};
use deckhand_core::config::Config;
use deckhand_core::error::Result;
use deckhand_core::lifecycle::{CreateRequest, CreatedInstance};
use deckhand_core::registry::InstanceKey;

/// Test context that manages a runtime, its mock backend, and the fake
/// OS port occupancy the probe reads.
pub struct TestContext {
    pub runtime: Runtime,
    pub backend: Arc<MockBackend>,
    pub os_ports: Arc<Mutex<HashSet<u16>>>,
    pub configs_dir: PathBuf,
    _temp_dir: tempfile::TempDir,
}

impl TestContext {
    /// Context with a plain mock backend and the default port pool.
    pub fn new() -> Self {
        Self::with_backend_and_range(Arc::new(MockBackend::new()), 8051..=8100)
    }

    /// Context with a specific mock backend.
    pub fn with_backend(backend: Arc<MockBackend>) -> Self {
        Self::with_backend_and_range(backend, 8051..=8100)
    }

    /// Context with a plain mock backend over a narrowed port pool.
    pub fn with_port_range(range: RangeInclusive<u16>) -> Self {
        Self::with_backend_and_range(Arc::new(MockBackend::new()), range)
    }

    /// Context with a specific mock backend and port pool.
    pub fn with_backend_and_range(
        backend: Arc<MockBackend>,
        range: RangeInclusive<u16>,
    ) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let configs_dir = temp_dir.path().join("configs");
        let secrets_file = temp_dir.path().join("secrets/secrets.env");

        let config = Config {
            http_addr: "127.0.0.1:0".parse().unwrap(),
            worker_image: "deckhand-dashboard".to_string(),
            public_host: "localhost".to_string(),
            configs_dir: configs_dir.clone(),
            host_configs_dir: configs_dir.clone(),
            secrets_file: secrets_file.clone(),
            host_secrets_file: secrets_file,
            port_range: range,
            docker_bin: "docker".to_string(),
        };

        let os_ports: Arc<Mutex<HashSet<u16>>> = Arc::new(Mutex::new(HashSet::new()));
        let probe_ports = os_ports.clone();

        let runtime = Runtime::builder()
            .config(config)
            .backend(backend.clone() as Arc<dyn Backend>)
            .port_probe(Arc::new(move |port| {
                probe_ports.lock().unwrap().contains(&port)
            }))
            .build()
            .expect("Failed to build runtime");

        Self {
            runtime,
            backend,
            os_ports,
            configs_dir,
            _temp_dir: temp_dir,
        }
    }

    /// Mark a port as occupied by an OS-level listener.
    pub fn occupy_os_port(&self, port: u16) {
        self.os_ports.lock().unwrap().insert(port);
    }

    /// Build a key; panics on invalid components (tests use valid ones).
    pub fn key(user: &str, dashboard: &str) -> InstanceKey {
        InstanceKey::new(user, dashboard).expect("valid key")
    }

    /// A create request without a data source.
    pub fn request(user: &str, dashboard: &str) -> CreateRequest {
        CreateRequest {
            key: Self::key(user, dashboard),
            description: format!("{dashboard} for {user}"),
            data_source_host_path: None,
        }
    }

    /// Create an instance for `user`/`dashboard`.
    pub async fn create(&self, user: &str, dashboard: &str) -> Result<CreatedInstance> {
        self.runtime
            .lifecycle()
            .create(Self::request(user, dashboard))
            .await
    }

    /// Remove the instance for `user`/`dashboard`.
    pub async fn remove(&self, user: &str, dashboard: &str) -> Result<()> {
        self.runtime.lifecycle().remove(&Self::key(user, dashboard)).await
    }
}
