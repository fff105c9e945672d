// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deckhand Server - HTTP API over the instance lifecycle core.
//!
//! Thin gateway: parses and validates requests once at this boundary,
//! maps them onto [`deckhand_core`] operations, and encodes the results.
//! No lifecycle logic lives here.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/create_dashboard` | Create (or replace) a dashboard instance |
//! | `POST` | `/remove_dashboard` | Stop and remove an instance |
//! | `GET`  | `/list_dashboards?user_id=` | List one user's dashboards |
//! | `GET`  | `/dashboard/{user_id}/{dashboard_id}` | Redirect to the dashboard |
//! | `GET`  | `/` | All running instances (diagnostic) |
//!
//! # Status mapping
//!
//! | Core error | Status |
//! |------------|--------|
//! | `InvalidRequest` | 400 |
//! | `InstanceNotFound` | 404 |
//! | `OperationInFlight` | 409 |
//! | `PortsExhausted` | 503 |
//! | `Backend` | 502 |
//! | anything else | 500 |

#![deny(missing_docs)]

/// Request handlers and JSON types.
pub mod handlers;

/// Router assembly and serving.
pub mod server;

pub use handlers::AppState;
pub use server::{app, serve};
