// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Squad routes: friends, GPS mode, and check-ins.

use crate::error::Result;
use crate::models::{Identity, Point};
use crate::routes::{session_for, ValidatedJson};
use crate::services::session::SquadMember;
use crate::AppState;
use axum::{
    extract::State,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/squad", get(get_squad))
        .route("/api/friends", post(add_friend))
        .route("/api/settings/gps", put(set_gps))
        .route("/api/check-in", post(check_in))
}

/// Current user first, then every friend with a snapshot.
async fn get_squad(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<SquadMember>>> {
    let session = session_for(&state, &identity).await?;
    Ok(Json(session.squad().await?))
}

// ─── Friends ─────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
pub struct AddFriendRequest {
    #[validate(length(min = 3, max = 320), contains(pattern = "@"))]
    pub email: String,
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AddFriendResponse {
    pub uid: String,
}

async fn add_friend(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    ValidatedJson(body): ValidatedJson<AddFriendRequest>,
) -> Result<Json<AddFriendResponse>> {
    let session = session_for(&state, &identity).await?;
    let uid = session.add_friend(body.email).await?;
    Ok(Json(AddFriendResponse { uid }))
}

// ─── GPS & Check-in ──────────────────────────────────────────

#[derive(Deserialize)]
pub struct GpsRequest {
    pub enabled: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GpsResponse {
    pub use_gps: bool,
}

async fn set_gps(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<GpsRequest>,
) -> Result<Json<GpsResponse>> {
    let session = session_for(&state, &identity).await?;
    session.set_use_gps(body.enabled).await?;
    Ok(Json(GpsResponse {
        use_gps: body.enabled,
    }))
}

#[derive(Deserialize, Validate)]
pub struct CheckInRequest {
    #[validate(length(min = 1, max = 128))]
    pub area_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInResponse {
    pub location: Option<Point>,
    pub current_area: Option<String>,
}

/// Report being at the centroid of an area.
async fn check_in(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    ValidatedJson(body): ValidatedJson<CheckInRequest>,
) -> Result<Json<CheckInResponse>> {
    let session = session_for(&state, &identity).await?;
    let patch = session.check_in(body.area_id).await?;
    Ok(Json(CheckInResponse {
        location: patch.location,
        current_area: patch.current_area,
    }))
}
