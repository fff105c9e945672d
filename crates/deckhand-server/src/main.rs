// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deckhand - Dashboard Instance Control Plane
//!
//! An HTTP server responsible for:
//! - Creating and replacing per-user dashboard worker instances
//! - Tracking them in an in-memory registry with unique host ports
//! - Routing and listing queries against the registry
//! - Tearing instances down on request (Docker backend by default)

use std::sync::Arc;
use tracing::{info, warn};

use deckhand_core::backend::{Backend, DockerBackend};
use deckhand_core::{Config, Runtime};
use deckhand_server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deckhand_server=info,deckhand_core=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    // Load configuration
    let config = Config::from_env()?;

    info!(
        http_addr = %config.http_addr,
        worker_image = %config.worker_image,
        configs_dir = %config.configs_dir.display(),
        "Starting Deckhand"
    );

    // Create Docker backend
    let backend: Arc<dyn Backend> = Arc::new(DockerBackend::new(config.docker_bin.clone()));
    info!(backend_type = backend.backend_type(), "Backend initialized");

    // Wire the lifecycle core
    let runtime = Runtime::builder()
        .config(config.clone())
        .backend(backend)
        .build()?;

    let state = Arc::new(AppState {
        lifecycle: runtime.lifecycle().clone(),
        instances: runtime.router().clone(),
        public_host: config.public_host.clone(),
    });

    deckhand_server::serve(config.http_addr, state).await?;

    info!("Deckhand shut down");

    Ok(())
}
