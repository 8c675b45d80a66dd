// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Donation Engine - validation, gateway routing and offline sync
//!
//! This crate is the donation transaction pipeline shared by every client
//! platform: it validates a gift against currency and compliance rules,
//! routes it to one of two payment gateways, persists it before confirming,
//! and reconciles it with the backend once connectivity returns.
//!
//! ## Modules
//!
//! - `currency` - Currency rules, conversion and display formatting
//! - `validation` - Donation validator and compliance policies
//! - `routing` - Gateway selection and request shaping
//! - `executor` - The single gateway call path with retries
//! - `sync` - Offline queue, backend reconciliation, background worker
//! - `storage` - Embedded redb store and audit trail
//! - `api` - HTTP API handlers (Axum)

pub mod api;
pub mod config;
pub mod currency;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod lifecycle;
pub mod models;
pub mod routing;
pub mod service;
pub mod state;
pub mod storage;
pub mod sync;
pub mod validation;
