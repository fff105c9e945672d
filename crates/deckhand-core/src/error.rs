// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for deckhand-core.

use thiserror::Error;

/// Lifecycle core errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Request validation failed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No registry entry exists for the requested instance.
    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    /// A Create or Remove is already in flight for the same instance.
    #[error("Operation already in flight for instance: {0}")]
    OperationInFlight(String),

    /// The port pool has no eligible port left.
    #[error("Port pool exhausted: {0}")]
    PortsExhausted(#[from] crate::ports::PortsExhausted),

    /// Backend (worker start/stop/remove) failed.
    #[error("Backend error: {0}")]
    Backend(#[from] crate::backend::BackendError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type using the core Error.
pub type Result<T> = std::result::Result<T, Error>;
