// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Docker backend implementation.
//!
//! Starts dashboard workers as detached Docker containers via the docker
//! CLI. Pure execution logic, no registry access. The allocated host port
//! is published onto the worker's fixed internal port, and all file
//! bindings are mounted read-only.

use async_trait::async_trait;
use chrono::Utc;
use tokio::process::Command;
use tracing::{debug, info};

use super::traits::{Backend, BackendError, BackendHandle, Result, StartSpec};

/// Classify a docker error as a host-port bind conflict.
///
/// The port probe is racy against docker's own bind; this is how the
/// race surfaces, and the lifecycle manager treats it as re-enterable.
fn is_port_bind_conflict(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("port is already allocated") || lower.contains("address already in use")
}

/// Worker backend driving the docker CLI.
pub struct DockerBackend {
    docker_bin: String,
}

impl DockerBackend {
    /// Create a backend using the given docker binary.
    pub fn new(docker_bin: impl Into<String>) -> Self {
        Self {
            docker_bin: docker_bin.into(),
        }
    }

    /// Create from environment variables (`DECKHAND_DOCKER_BIN`).
    pub fn from_env() -> Self {
        Self::new(std::env::var("DECKHAND_DOCKER_BIN").unwrap_or_else(|_| "docker".to_string()))
    }
}

#[async_trait]
impl Backend for DockerBackend {
    fn backend_type(&self) -> &'static str {
        "docker"
    }

    async fn start(&self, spec: &StartSpec) -> Result<BackendHandle> {
        let publish = format!("{}:{}", spec.host_port, spec.worker_port);

        let mut cmd = Command::new(&self.docker_bin);
        cmd.args(["run", "-d", "-p", &publish]);
        for binding in &spec.bindings {
            cmd.arg("-v");
            cmd.arg(format!(
                "{}:{}:ro",
                binding.host_path.display(),
                binding.worker_path
            ));
        }
        cmd.arg(&spec.image);

        debug!(
            image = %spec.image,
            host_port = spec.host_port,
            bindings = spec.bindings.len(),
            "Spawning worker container"
        );

        let output = cmd.output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if is_port_bind_conflict(&stderr) {
                return Err(BackendError::PortConflict(spec.host_port));
            }
            return Err(BackendError::StartFailed(stderr));
        }

        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if container_id.is_empty() {
            return Err(BackendError::StartFailed(
                "docker run produced no container id".to_string(),
            ));
        }

        info!(
            container_id = %container_id,
            host_port = spec.host_port,
            "Worker container started"
        );

        Ok(BackendHandle {
            handle_id: container_id,
            started_at: Utc::now(),
        })
    }

    async fn stop(&self, handle: &BackendHandle) -> Result<()> {
        let output = Command::new(&self.docker_bin)
            .args(["stop", &handle.handle_id])
            .output()
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(BackendError::StopFailed(stderr));
        }

        debug!(container_id = %handle.handle_id, "Worker container stopped");
        Ok(())
    }

    async fn remove(&self, handle: &BackendHandle) -> Result<()> {
        let output = Command::new(&self.docker_bin)
            .args(["rm", &handle.handle_id])
            .output()
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(BackendError::RemoveFailed(stderr));
        }

        debug!(container_id = %handle.handle_id, "Worker container removed");
        Ok(())
    }
}
