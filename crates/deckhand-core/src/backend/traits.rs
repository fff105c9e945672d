// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Backend trait definitions.
//!
//! Defines the abstract interface for worker execution backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors from backend operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackendError {
    /// Worker failed to start.
    #[error("Worker start failed: {0}")]
    StartFailed(String),

    /// The chosen host port was already bound when the worker tried to
    /// publish on it. Re-enterable: the caller may rescan and retry once.
    #[error("Host port {0} already bound")]
    PortConflict(u16),

    /// Worker failed to stop.
    #[error("Worker stop failed: {0}")]
    StopFailed(String),

    /// Worker could not be removed.
    #[error("Worker remove failed: {0}")]
    RemoveFailed(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("Other: {0}")]
    Other(String),
}

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// A read-only file mapping made visible to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBinding {
    /// Path on the host (or host-visible path, when the control plane is
    /// itself containerized).
    pub host_path: PathBuf,
    /// Absolute path the worker sees.
    pub worker_path: String,
}

/// Everything the backend needs to start one worker.
#[derive(Debug, Clone)]
pub struct StartSpec {
    /// Image reference for the worker.
    pub image: String,
    /// Host port to publish the worker on.
    pub host_port: u16,
    /// Port the worker listens on inside its sandbox.
    pub worker_port: u16,
    /// Read-only file bindings (config, secrets, optional data source).
    pub bindings: Vec<FileBinding>,
}

/// Handle for a started worker.
///
/// Owned by the backend; the core never inspects it beyond logging and
/// only ever passes it back for stop/remove.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendHandle {
    /// Backend-specific identifier (container id for Docker).
    pub handle_id: String,
    /// When the worker was started.
    pub started_at: DateTime<Utc>,
}

/// Trait for worker execution backends.
///
/// Backends are pure execution engines - they do NOT touch the registry.
/// Registry commits and rollbacks are handled by the lifecycle manager.
/// Calls carry no internal deadline; callers that need one should wrap
/// them in `tokio::time::timeout` and treat elapse as a failure.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Backend type identifier (e.g., "docker", "mock").
    fn backend_type(&self) -> &'static str;

    /// Start a worker and return its handle once the backend confirmed
    /// the start.
    async fn start(&self, spec: &StartSpec) -> Result<BackendHandle>;

    /// Stop a running worker.
    async fn stop(&self, handle: &BackendHandle) -> Result<()>;

    /// Remove a stopped worker and release its backend resources.
    async fn remove(&self, handle: &BackendHandle) -> Result<()>;
}
