// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for deckhand-core.
//!
//! This module provides [`Runtime`], which wires the allocator, the
//! artifact provisioner, and a backend into a lifecycle manager and
//! router sharing one registry. The HTTP server embeds it; tests embed
//! it with a [`MockBackend`](crate::backend::MockBackend) and an
//! injected port probe.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use deckhand_core::backend::DockerBackend;
//! use deckhand_core::{Config, Runtime};
//!
//! let config = Config::from_env()?;
//! let runtime = Runtime::builder()
//!     .config(config)
//!     .backend(Arc::new(DockerBackend::from_env()))
//!     .build()?;
//!
//! let created = runtime.lifecycle().create(request).await?;
//! ```

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::RwLock;

use crate::artifacts::{ArtifactProvisioner, ArtifactStore};
use crate::backend::Backend;
use crate::config::Config;
use crate::lifecycle::{LifecycleManager, RegistryState, SharedRegistry};
use crate::ports::{PortAllocator, PortProbe};
use crate::router::Router;

/// Builder for creating a [`Runtime`].
#[derive(Default)]
pub struct RuntimeBuilder {
    config: Option<Config>,
    backend: Option<Arc<dyn Backend>>,
    port_probe: Option<PortProbe>,
}

impl RuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration (required).
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the worker backend (required).
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Override the OS port probe.
    ///
    /// Default: TCP connect to localhost. Tests inject a probe over a
    /// fake occupancy set to stay hermetic.
    pub fn port_probe(mut self, probe: PortProbe) -> Self {
        self.port_probe = Some(probe);
        self
    }

    /// Wire everything together.
    pub fn build(self) -> Result<Runtime> {
        let config = self
            .config
            .ok_or_else(|| anyhow::anyhow!("config is required"))?;
        let backend = self
            .backend
            .ok_or_else(|| anyhow::anyhow!("backend is required"))?;

        let state: SharedRegistry = Arc::new(RwLock::new(RegistryState::default()));

        let store = ArtifactStore::new(
            config.configs_dir.clone(),
            config.host_configs_dir.clone(),
            config.secrets_file.clone(),
            config.host_secrets_file.clone(),
        );
        let provisioner = ArtifactProvisioner::new(store);

        let allocator = match self.port_probe {
            Some(probe) => PortAllocator::with_probe(config.port_range.clone(), probe),
            None => PortAllocator::new(config.port_range.clone()),
        };

        let lifecycle = Arc::new(LifecycleManager::new(
            state.clone(),
            allocator,
            provisioner,
            backend,
            config.worker_image.clone(),
            config.public_host.clone(),
        ));
        let router = Router::new(state);

        Ok(Runtime { lifecycle, router })
    }
}

/// The assembled lifecycle core: one registry shared between the
/// write side (lifecycle) and the read side (router).
pub struct Runtime {
    lifecycle: Arc<LifecycleManager>,
    router: Router,
}

impl Runtime {
    /// Create a builder with default settings.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// The write side: Create/Remove/Replace.
    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    /// The read side: resolve and list queries.
    pub fn router(&self) -> &Router {
        &self.router
    }
}
