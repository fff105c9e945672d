// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Read-only queries against the instance registry.
//!
//! Resolves keys to ports and lists instances. No side effects and no
//! backend interaction; everything works on a registry snapshot taken
//! under the read lock.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::lifecycle::SharedRegistry;
use crate::registry::InstanceKey;

/// Read-side view of the registry.
#[derive(Clone)]
pub struct Router {
    state: SharedRegistry,
}

impl Router {
    /// Create a router over the shared registry state.
    pub fn new(state: SharedRegistry) -> Self {
        Self { state }
    }

    /// Resolve a key to the port its worker is published on.
    pub async fn resolve(&self, key: &InstanceKey) -> Result<u16> {
        let state = self.state.read().await;
        state
            .registry
            .get(key)
            .map(|record| record.port)
            .ok_or_else(|| Error::InstanceNotFound(key.to_string()))
    }

    /// All of one user's dashboards, as `dashboard_id -> port`.
    pub async fn list_for_user(&self, user_id: &str) -> BTreeMap<String, u16> {
        let state = self.state.read().await;
        state
            .registry
            .snapshot()
            .into_iter()
            .filter(|record| record.key.user_id() == user_id)
            .map(|record| (record.key.dashboard_id().to_string(), record.port))
            .collect()
    }

    /// Every running instance, as `user_id:dashboard_id -> port`.
    /// Diagnostic view.
    pub async fn list_all(&self) -> BTreeMap<String, u16> {
        let state = self.state.read().await;
        state
            .registry
            .snapshot()
            .into_iter()
            .map(|record| (record.key.to_string(), record.port))
            .collect()
    }
}
