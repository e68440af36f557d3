// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Area routes: listing, export, deletion, and polygon authoring.

use crate::error::Result;
use crate::models::{Area, Identity};
use crate::routes::{session_for, ValidatedJson};
use crate::services::export::areas_to_geojson;
use crate::services::session::{AuthoringView, ClickResult};
use crate::services::{PixelPoint, Surface};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use geojson::GeoJson;
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/areas", get(list_areas))
        .route("/api/areas/geojson", get(export_areas))
        .route("/api/areas/{id}", delete(delete_area))
        .route(
            "/api/authoring",
            post(start_authoring).delete(cancel_authoring),
        )
        .route("/api/authoring/clicks", post(click))
        .route("/api/authoring/commit", post(commit))
}

async fn list_areas(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<Area>>> {
    let session = session_for(&state, &identity).await?;
    Ok(Json(session.areas().await?))
}

/// All areas as a GeoJSON FeatureCollection in normalized map units.
async fn export_areas(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse> {
    let session = session_for(&state, &identity).await?;
    let areas = session.areas().await?;
    let body = GeoJson::from(areas_to_geojson(&areas)).to_string();
    Ok(([(header::CONTENT_TYPE, "application/geo+json")], body))
}

async fn delete_area(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let session = session_for(&state, &identity).await?;
    session.remove_area(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Authoring ───────────────────────────────────────────────

async fn start_authoring(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<AuthoringView>> {
    let session = session_for(&state, &identity).await?;
    Ok(Json(session.start_authoring().await?))
}

async fn cancel_authoring(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<AuthoringView>> {
    let session = session_for(&state, &identity).await?;
    Ok(Json(session.cancel_authoring().await?))
}

/// A pointer click on the map, in surface pixels.
#[derive(Deserialize)]
pub struct ClickRequest {
    pub x: f64,
    pub y: f64,
    pub surface: Surface,
}

async fn click(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<ClickRequest>,
) -> Result<Json<ClickResult>> {
    let session = session_for(&state, &identity).await?;
    let result = session
        .click(PixelPoint::new(body.x, body.y), body.surface)
        .await?;
    Ok(Json(result))
}

#[derive(Deserialize, Validate)]
pub struct CommitRequest {
    /// Blank names are rejected when committing
    #[validate(length(max = 100))]
    pub name: String,
}

async fn commit(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    ValidatedJson(body): ValidatedJson<CommitRequest>,
) -> Result<(StatusCode, Json<Area>)> {
    let session = session_for(&state, &identity).await?;
    let area = session.commit(body.name).await?;
    Ok((StatusCode::CREATED, Json(area)))
}
