// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance registry.
//!
//! In-memory authoritative record of running dashboard workers, keyed by
//! `(user_id, dashboard_id)`. The registry is a pure data structure: all
//! invariant enforcement (port uniqueness, replace semantics, in-flight
//! serialization) lives in the lifecycle manager, which is its only
//! mutator. State is intentionally lost on restart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::backend::BackendHandle;
use crate::error::{Error, Result};

/// Identity of an instance: one worker per user/dashboard pair.
///
/// Both components are guaranteed non-empty; this constructor is the
/// single validation point for instance identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceKey {
    user_id: String,
    dashboard_id: String,
}

impl InstanceKey {
    /// Build a key, rejecting empty components.
    pub fn new(user_id: impl Into<String>, dashboard_id: impl Into<String>) -> Result<Self> {
        let user_id = user_id.into();
        let dashboard_id = dashboard_id.into();
        if user_id.is_empty() {
            return Err(Error::InvalidRequest("user_id must not be empty".into()));
        }
        if dashboard_id.is_empty() {
            return Err(Error::InvalidRequest(
                "dashboard_id must not be empty".into(),
            ));
        }
        Ok(Self {
            user_id,
            dashboard_id,
        })
    }

    /// The owning user.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The dashboard within that user's namespace.
    pub fn dashboard_id(&self) -> &str {
        &self.dashboard_id
    }

    /// Filesystem-safe stem used for per-instance artifact names.
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.user_id, self.dashboard_id)
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user_id, self.dashboard_id)
    }
}

/// Lifecycle state of an instance record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// Built during a Create call, before backend confirmation. Never
    /// visible in a committed registry entry.
    Provisioning,
    /// Worker confirmed started; the only state a committed entry holds.
    Running,
    /// Terminal marker set on an evicted record before it is dropped.
    /// Never stored; removal means deletion from the registry.
    Removed,
}

impl InstanceState {
    /// Get the state string.
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Provisioning => "provisioning",
            InstanceState::Running => "running",
            InstanceState::Removed => "removed",
        }
    }
}

/// One tracked dashboard worker.
#[derive(Debug, Clone)]
pub struct InstanceRecord {
    /// Instance identity.
    pub key: InstanceKey,
    /// Host port the worker is published on. Unique among live records.
    pub port: u16,
    /// Opaque backend reference; only ever handed back for stop/remove.
    pub handle: BackendHandle,
    /// Human-readable description supplied at creation.
    pub description: String,
    /// Worker-visible data source path, when one was supplied.
    pub data_source_path: Option<String>,
    /// Current lifecycle state.
    pub state: InstanceState,
    /// When the record was built.
    pub created_at: DateTime<Utc>,
}

impl InstanceRecord {
    /// Build a record awaiting backend confirmation.
    pub fn provisioning(
        key: InstanceKey,
        port: u16,
        handle: BackendHandle,
        description: String,
        data_source_path: Option<String>,
    ) -> Self {
        Self {
            key,
            port,
            handle,
            description,
            data_source_path,
            state: InstanceState::Provisioning,
            created_at: Utc::now(),
        }
    }

    /// Promote to `Running` once the backend confirmed the worker started.
    pub fn into_running(mut self) -> Self {
        self.state = InstanceState::Running;
        self
    }
}

/// The instance map. Four operations, no validation logic.
#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<InstanceKey, InstanceRecord>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the record for a key.
    pub fn get(&self, key: &InstanceKey) -> Option<&InstanceRecord> {
        self.entries.get(key)
    }

    /// Insert or replace the record for its key.
    pub fn put(&mut self, record: InstanceRecord) {
        self.entries.insert(record.key.clone(), record);
    }

    /// Remove and return the record for a key.
    pub fn delete(&mut self, key: &InstanceKey) -> Option<InstanceRecord> {
        self.entries.remove(key)
    }

    /// Clone out all current records.
    pub fn snapshot(&self) -> Vec<InstanceRecord> {
        self.entries.values().cloned().collect()
    }
}
