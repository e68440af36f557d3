// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Map surface routes: the rendered scene and change notifications.

use crate::error::{AppError, Result};
use crate::models::Identity;
use crate::routes::session_for;
use crate::services::{Scene, Surface};
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::get,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

const DEFAULT_WAIT_SECS: u64 = 25;
const MAX_WAIT_SECS: u64 = 55;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/map/scene", get(get_scene))
        .route("/api/map/changes", get(wait_for_changes))
}

#[derive(Deserialize, Validate)]
pub struct SceneParams {
    #[validate(range(min = 1.0, max = 16384.0))]
    pub width: f64,
    #[validate(range(min = 1.0, max = 16384.0))]
    pub height: f64,
}

/// Draw primitives for a surface of the requested size.
async fn get_scene(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<SceneParams>,
) -> Result<Json<Scene>> {
    params
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let session = session_for(&state, &identity).await?;
    let scene = session
        .scene(Surface::sized(params.width, params.height))
        .await?;
    Ok(Json(scene))
}

#[derive(Deserialize)]
pub struct ChangesParams {
    #[serde(default)]
    pub since_areas: u64,
    #[serde(default)]
    pub since_presence: u64,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ChangesResponse {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub areas: u64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub presence: u64,
    /// Whether anything moved past the caller's revisions
    pub changed: bool,
}

/// Long poll: returns as soon as the areas or presence revision moves past
/// what the caller has seen, or when the wait times out.
async fn wait_for_changes(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<ChangesParams>,
) -> Result<Json<ChangesResponse>> {
    let session = session_for(&state, &identity).await?;
    let revisions = session.subscribe().await?;
    let wait = Duration::from_secs(
        params
            .timeout_secs
            .unwrap_or(DEFAULT_WAIT_SECS)
            .min(MAX_WAIT_SECS),
    );

    let (areas, presence) = revisions
        .wait_for_change(params.since_areas, params.since_presence, wait)
        .await;
    Ok(Json(ChangesResponse {
        areas,
        presence,
        changed: areas != params.since_areas || presence != params.since_presence,
    }))
}
