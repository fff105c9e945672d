// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance lifecycle management.
//!
//! Orchestrates Create/Remove/Replace for dashboard workers. This is the
//! only component that mutates the registry or makes state-changing
//! backend calls.
//!
//! Concurrency discipline: the registry lock is never held across a
//! backend call. Create runs a two-phase protocol - under the lock it
//! claims the key and provisionally reserves a port, then starts the
//! worker unlocked, then reacquires the lock to either commit the record
//! or release the reservation. A record becomes visible only after the
//! backend confirmed the start, so the registry never exposes an entry in
//! `Provisioning` state.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use serde::Serialize;

use crate::artifacts::{ArtifactProvisioner, ProvisionedArtifacts};
use crate::backend::{Backend, BackendError, StartSpec};
use crate::error::{Error, Result};
use crate::ports::PortAllocator;
use crate::registry::{InstanceKey, InstanceRecord, InstanceState, Registry};

/// Port every worker listens on inside its sandbox; the allocated host
/// port is published onto it.
pub const WORKER_PORT: u16 = 8050;

/// Shared mutable state: the registry plus the bookkeeping that keeps
/// concurrent Create/Remove calls consistent.
#[derive(Debug, Default)]
pub struct RegistryState {
    /// The instance map. Router reads it; only the lifecycle manager
    /// writes it.
    pub(crate) registry: Registry,
    /// Keys with a Create or Remove currently in flight.
    in_flight: HashSet<InstanceKey>,
    /// Ports reserved by Creates that have not committed yet.
    reserved_ports: HashSet<u16>,
}

/// Handle to the shared registry state.
pub type SharedRegistry = Arc<RwLock<RegistryState>>;

/// Parameters for creating (or replacing) an instance.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    /// Instance identity.
    pub key: InstanceKey,
    /// Human-readable description, stored and passed to the worker.
    pub description: String,
    /// Optional host path of a data source file to mount read-only.
    pub data_source_host_path: Option<PathBuf>,
}

/// What a successful Create returns to the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedInstance {
    /// Instance identity.
    pub key: InstanceKey,
    /// Host port the worker is published on.
    pub port: u16,
    /// URL the dashboard is reachable at.
    pub url: String,
}

/// Orchestrates the instance state machine.
pub struct LifecycleManager {
    state: SharedRegistry,
    allocator: PortAllocator,
    provisioner: ArtifactProvisioner,
    backend: Arc<dyn Backend>,
    worker_image: String,
    public_host: String,
}

impl LifecycleManager {
    /// Create a lifecycle manager over the shared registry state.
    pub fn new(
        state: SharedRegistry,
        allocator: PortAllocator,
        provisioner: ArtifactProvisioner,
        backend: Arc<dyn Backend>,
        worker_image: String,
        public_host: String,
    ) -> Self {
        Self {
            state,
            allocator,
            provisioner,
            backend,
            worker_image,
            public_host,
        }
    }

    /// Create an instance, replacing any existing one for the same key.
    ///
    /// Rejects with [`Error::OperationInFlight`] when another Create or
    /// Remove for the key has not finished. On any failure after the old
    /// instance was evicted, no registry entry exists for the key and the
    /// scanned port is eligible again.
    pub async fn create(&self, request: CreateRequest) -> Result<CreatedInstance> {
        let key = request.key.clone();

        // Phase 1: claim the key and evict any previous instance. The old
        // entry leaves the registry before teardown even starts - a stale
        // entry must never block recreation.
        let evicted = {
            let mut state = self.state.write().await;
            if state.in_flight.contains(&key) {
                return Err(Error::OperationInFlight(key.to_string()));
            }
            state.in_flight.insert(key.clone());
            state.registry.delete(&key)
        };

        if let Some(old) = evicted {
            self.teardown_replaced(old).await;
        }

        let result = self.provision_and_start(&request).await;

        {
            let mut state = self.state.write().await;
            state.in_flight.remove(&key);
        }

        match &result {
            Ok(created) => {
                info!(key = %key, port = created.port, "Instance running");
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Create failed, no registry entry committed");
            }
        }
        result
    }

    /// Remove an instance.
    ///
    /// The backend must confirm stop and remove before the registry entry
    /// disappears; on backend failure the entry stays so the caller can
    /// retry without losing the only reference to the handle.
    pub async fn remove(&self, key: &InstanceKey) -> Result<()> {
        let record = {
            let mut state = self.state.write().await;
            if state.in_flight.contains(key) {
                return Err(Error::OperationInFlight(key.to_string()));
            }
            let Some(record) = state.registry.get(key).cloned() else {
                return Err(Error::InstanceNotFound(key.to_string()));
            };
            state.in_flight.insert(key.clone());
            record
        };

        let result = self.stop_and_release(&record).await;

        let mut state = self.state.write().await;
        state.in_flight.remove(key);
        if result.is_ok() {
            if let Some(mut removed) = state.registry.delete(key) {
                removed.state = InstanceState::Removed;
                info!(
                    key = %removed.key,
                    port = removed.port,
                    state = removed.state.as_str(),
                    "Instance removed"
                );
            }
        }
        result
    }

    /// URL a dashboard on `port` is reachable at.
    fn instance_url(&self, port: u16) -> String {
        format!("http://{}:{}/", self.public_host, port)
    }

    /// Provision artifacts, reserve a port, start the worker, commit.
    ///
    /// Holds no lock across the backend call. A `PortConflict` from the
    /// start step means the probe-to-bind window was lost to another
    /// process; the port-selection step is retried exactly once with the
    /// conflicting port excluded.
    async fn provision_and_start(&self, request: &CreateRequest) -> Result<CreatedInstance> {
        let key = &request.key;

        // Artifacts are harmlessly inert if a later step fails; no
        // cleanup path is needed here.
        let artifacts = self
            .provisioner
            .provision(
                key,
                &request.description,
                request.data_source_host_path.as_deref(),
            )
            .await?;

        let mut burned: Option<u16> = None;
        loop {
            // Phase 2: pick a port under the lock and reserve it
            // provisionally so a concurrent Create cannot take it.
            let port = {
                let mut state = self.state.write().await;
                let mut reserved: HashSet<u16> =
                    state.registry.snapshot().iter().map(|r| r.port).collect();
                reserved.extend(state.reserved_ports.iter().copied());
                if let Some(p) = burned {
                    reserved.insert(p);
                }
                let port = self.allocator.acquire(&reserved)?;
                state.reserved_ports.insert(port);
                port
            };

            let spec = StartSpec {
                image: self.worker_image.clone(),
                host_port: port,
                worker_port: WORKER_PORT,
                bindings: artifacts.bindings.clone(),
            };
            debug!(key = %key, port, image = %spec.image, "Starting worker");

            match self.backend.start(&spec).await {
                Ok(handle) => {
                    // Phase 3: commit. The record only becomes visible
                    // once the backend confirmed the worker started.
                    let record = self.build_record(request, &artifacts, port, handle);
                    let mut state = self.state.write().await;
                    state.reserved_ports.remove(&port);
                    state.registry.put(record.into_running());
                    return Ok(CreatedInstance {
                        key: key.clone(),
                        port,
                        url: self.instance_url(port),
                    });
                }
                Err(BackendError::PortConflict(conflicted)) if burned.is_none() => {
                    warn!(
                        key = %key,
                        port = conflicted,
                        "Port taken between probe and bind, rescanning once"
                    );
                    self.state.write().await.reserved_ports.remove(&port);
                    burned = Some(port);
                }
                Err(e) => {
                    self.state.write().await.reserved_ports.remove(&port);
                    return Err(e.into());
                }
            }
        }
    }

    fn build_record(
        &self,
        request: &CreateRequest,
        artifacts: &ProvisionedArtifacts,
        port: u16,
        handle: crate::backend::BackendHandle,
    ) -> InstanceRecord {
        InstanceRecord::provisioning(
            request.key.clone(),
            port,
            handle,
            request.description.clone(),
            artifacts.data_source_path.clone(),
        )
    }

    /// Best-effort teardown of a replaced instance. Failures are logged,
    /// never propagated: replacing must not be blocked by cleanup of the
    /// old worker.
    async fn teardown_replaced(&self, old: InstanceRecord) {
        info!(key = %old.key, port = old.port, "Replacing existing instance");

        if let Err(e) = self.backend.stop(&old.handle).await {
            warn!(key = %old.key, error = %e, "Failed to stop replaced worker");
        }
        if let Err(e) = self.backend.remove(&old.handle).await {
            warn!(key = %old.key, error = %e, "Failed to remove replaced worker");
        }
        if let Err(e) = self.provisioner.delete_config(&old.key).await {
            warn!(key = %old.key, error = %e, "Failed to delete replaced config artifact");
        }
    }

    /// Confirmed teardown for Remove: both backend calls must succeed.
    /// The shared secrets file is never deleted.
    async fn stop_and_release(&self, record: &InstanceRecord) -> Result<()> {
        self.backend.stop(&record.handle).await?;
        self.backend.remove(&record.handle).await?;

        if let Err(e) = self.provisioner.delete_config(&record.key).await {
            warn!(key = %record.key, error = %e, "Failed to delete config artifact");
        }
        Ok(())
    }
}
