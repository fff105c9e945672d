// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock backend for testing.
//!
//! A simple backend implementation that records started workers in memory
//! without running containers. Failure knobs can be flipped mid-test to
//! exercise rollback and retry paths.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use async_trait::async_trait;

use super::traits::{Backend, BackendError, BackendHandle, Result, StartSpec};

/// Mock worker state.
#[derive(Debug, Clone)]
struct MockWorker {
    spec: StartSpec,
    running: bool,
}

/// Mock backend for testing.
#[derive(Default)]
pub struct MockBackend {
    workers: Arc<Mutex<HashMap<String, MockWorker>>>,
    fail_start: AtomicBool,
    fail_stop: AtomicBool,
    fail_remove: AtomicBool,
    /// Ports that behave as if another process bound them between the
    /// allocator's probe and the backend's own bind.
    conflict_ports: Arc<Mutex<HashSet<u16>>>,
    /// Delay before `start` returns, to widen windows in concurrency tests.
    pub start_delay_ms: u64,
}

impl MockBackend {
    /// Create a new mock backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock backend whose starts fail.
    pub fn failing() -> Self {
        let backend = Self::new();
        backend.fail_start.store(true, Ordering::SeqCst);
        backend
    }

    /// Create a mock backend whose `start` takes `delay_ms` to return.
    pub fn with_start_delay(delay_ms: u64) -> Self {
        Self {
            start_delay_ms: delay_ms,
            ..Self::default()
        }
    }

    /// Make subsequent starts fail (or succeed again).
    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent stops fail (or succeed again).
    pub fn set_fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent removes fail (or succeed again).
    pub fn set_fail_remove(&self, fail: bool) {
        self.fail_remove.store(fail, Ordering::SeqCst);
    }

    /// Simulate an OS-level bind conflict on a port the probe missed.
    pub async fn conflict_on_port(&self, port: u16) {
        self.conflict_ports.lock().await.insert(port);
    }

    /// Clear a simulated bind conflict.
    pub async fn clear_conflict(&self, port: u16) {
        self.conflict_ports.lock().await.remove(&port);
    }

    /// Whether the worker behind a handle is still running.
    pub async fn is_running(&self, handle: &BackendHandle) -> bool {
        self.workers
            .lock()
            .await
            .get(&handle.handle_id)
            .map(|w| w.running)
            .unwrap_or(false)
    }

    /// The spec a handle was started with, if the worker still exists.
    pub async fn spec_for(&self, handle: &BackendHandle) -> Option<StartSpec> {
        self.workers
            .lock()
            .await
            .get(&handle.handle_id)
            .map(|w| w.spec.clone())
    }

    /// Number of workers that have been started and not yet removed.
    pub async fn worker_count(&self) -> usize {
        self.workers.lock().await.len()
    }

    /// Specs of all workers that have been started and not yet removed.
    pub async fn specs(&self) -> Vec<StartSpec> {
        self.workers
            .lock()
            .await
            .values()
            .map(|w| w.spec.clone())
            .collect()
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn backend_type(&self) -> &'static str {
        "mock"
    }

    async fn start(&self, spec: &StartSpec) -> Result<BackendHandle> {
        if self.start_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.start_delay_ms)).await;
        }

        if self.fail_start.load(Ordering::SeqCst) {
            return Err(BackendError::StartFailed("mock start failure".to_string()));
        }

        if self.conflict_ports.lock().await.contains(&spec.host_port) {
            return Err(BackendError::PortConflict(spec.host_port));
        }

        let id = Uuid::new_v4().simple().to_string();
        let handle = BackendHandle {
            handle_id: format!("mock_{}", &id[..12]),
            started_at: Utc::now(),
        };

        self.workers.lock().await.insert(
            handle.handle_id.clone(),
            MockWorker {
                spec: spec.clone(),
                running: true,
            },
        );

        Ok(handle)
    }

    async fn stop(&self, handle: &BackendHandle) -> Result<()> {
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(BackendError::StopFailed("mock stop failure".to_string()));
        }

        if let Some(worker) = self.workers.lock().await.get_mut(&handle.handle_id) {
            worker.running = false;
        }
        Ok(())
    }

    async fn remove(&self, handle: &BackendHandle) -> Result<()> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(BackendError::RemoveFailed(
                "mock remove failure".to_string(),
            ));
        }

        self.workers.lock().await.remove(&handle.handle_id);
        Ok(())
    }
}
