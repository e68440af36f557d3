// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session lifecycle routes.

use crate::error::Result;
use crate::middleware::auth::SESSION_COOKIE;
use crate::models::Identity;
use crate::routes::{session_for, ValidatedJson};
use crate::services::session::SessionStatus;
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/session", post(start_session).delete(end_session))
        .route("/api/me", get(get_me))
        .route("/api/developer/unlock", post(unlock_developer))
}

/// Start (or resume) the caller's session.
async fn start_session(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<SessionStatus>> {
    let session = session_for(&state, &identity).await?;
    Ok(Json(session.status().await?))
}

/// Sign out: close every watch and clear the session cookie.
async fn end_session(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    jar: CookieJar,
) -> (CookieJar, StatusCode) {
    if state.sessions.sign_out(&identity.uid).await {
        tracing::info!(uid = %identity.uid, "Signed out");
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, StatusCode::NO_CONTENT)
}

async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<SessionStatus>> {
    let session = session_for(&state, &identity).await?;
    Ok(Json(session.status().await?))
}

#[derive(Deserialize, Validate)]
pub struct UnlockRequest {
    #[validate(length(min = 1, max = 64))]
    pub passcode: String,
}

#[derive(Serialize)]
pub struct UnlockResponse {
    pub developer: bool,
}

/// Enable developer mode (area authoring and deletion) for this session.
async fn unlock_developer(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    ValidatedJson(body): ValidatedJson<UnlockRequest>,
) -> Result<Json<UnlockResponse>> {
    let session = session_for(&state, &identity).await?;
    session.unlock(body.passcode.trim().to_string()).await?;
    Ok(Json(UnlockResponse { developer: true }))
}
