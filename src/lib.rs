// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Herd Search: find your friends on a shared festival map
//!
//! This crate provides the backend for drawing named areas on the map,
//! following friends, and keeping every session's view of their positions
//! live through push-based store watches.

pub mod config;
pub mod db;
pub mod error;
pub mod geometry;
pub mod middleware;
pub mod models;
pub mod revision;
pub mod routes;
pub mod services;

use config::Config;
use db::RemoteStore;
use services::Sessions;
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub sessions: Sessions,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn RemoteStore>) -> Self {
        let sessions = Sessions::new(store, config.session_settings());
        Self { config, sessions }
    }
}
