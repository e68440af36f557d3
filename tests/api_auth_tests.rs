// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API authentication and CORS tests.
//!
//! These tests verify that:
//! 1. Protected routes reject requests without valid tokens
//! 2. A valid token (header or cookie) starts a session and creates the profile
//! 3. CORS preflight requests return correct headers

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use herd_search::config::Config;
use herd_search::middleware::auth::SESSION_COOKIE;
use std::time::Duration;
use tower::ServiceExt;

mod common;
use common::{create_test_app, create_test_app_with, create_test_jwt, eventually, identity, send};

#[tokio::test]
async fn test_protected_route_without_token() {
    let (app, _, _) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/me")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_route_with_invalid_token() {
    let (app, _, store) = create_test_app();

    let (status, _) = send(&app, "GET", "/api/squad", "invalid.token.here", None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(store.watcher_count(), 0, "no session should have started");
}

#[tokio::test]
async fn test_token_signed_with_other_key_rejected() {
    let (app, _, _) = create_test_app();
    let token = create_test_jwt(
        &identity("u-ada", "Ada Lovelace", "ada@example.com"),
        b"not_the_server_key_but_long_enough",
    );

    let (status, _) = send(&app, "GET", "/api/me", &token, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_first_request_creates_profile() {
    let (app, state, store) = create_test_app();
    let ada = identity("u-ada", "Ada Lovelace", "Ada@Example.com");
    let token = create_test_jwt(&ada, &state.config.jwt_signing_key);

    let (status, body) = send(&app, "POST", "/api/session", &token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["uid"], "u-ada");
    assert_eq!(body["developer"], false);
    assert_eq!(body["authoring"]["state"], "idle");

    let profile = store.profile("u-ada").expect("profile written on sign-in");
    assert_eq!(profile.display_name, "Ada Lovelace");
    assert_eq!(profile.current_area, "unknown");
    assert!(profile.use_gps);
    let public = store.public_profile("u-ada").expect("index entry written");
    assert_eq!(public.email.as_deref(), Some("ada@example.com"));
    assert_eq!(state.sessions.len(), 1);
}

#[tokio::test]
async fn test_cookie_token_accepted() {
    let (app, state, _) = create_test_app();
    let token = create_test_jwt(
        &identity("u-ada", "Ada Lovelace", "ada@example.com"),
        &state.config.jwt_signing_key,
    );

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/me")
                .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_sign_out_ends_session() {
    let (app, state, store) = create_test_app();
    let token = create_test_jwt(
        &identity("u-ada", "Ada Lovelace", "ada@example.com"),
        &state.config.jwt_signing_key,
    );

    let (status, _) = send(&app, "POST", "/api/session", &token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(store.watcher_count() > 0);

    let (status, _) = send(&app, "DELETE", "/api/session", &token, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(state.sessions.is_empty());
    let store = &store;
    assert!(
        eventually(|| async move { store.watcher_count() == 0 }).await,
        "all watches should close on sign-out"
    );
}

fn short_idle_config(idle: Duration) -> Config {
    Config {
        motion_interval: Duration::from_millis(20),
        session_idle_timeout: idle,
        ..Config::test_default()
    }
}

#[tokio::test]
async fn test_idle_session_shuts_down() {
    let (app, state, store) = create_test_app_with(short_idle_config(Duration::from_millis(100)));
    let token = create_test_jwt(
        &identity("u-ada", "Ada Lovelace", "ada@example.com"),
        &state.config.jwt_signing_key,
    );

    let (status, _) = send(&app, "POST", "/api/session", &token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(store.watcher_count() > 0);

    // The client goes away without signing out.
    let state_ref = &state;
    let store_ref = &store;
    assert!(
        eventually(|| async move {
            state_ref.sessions.is_empty() && store_ref.watcher_count() == 0
        })
        .await,
        "idle session should release its watches and registry entry"
    );

    // Simulated motion stops with the session.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let settled = store.profile("u-ada").unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(store.profile("u-ada").unwrap(), settled);

    // The next request starts a fresh session.
    let (status, _) = send(&app, "GET", "/api/me", &token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state.sessions.len(), 1);
}

#[tokio::test]
async fn test_requests_keep_session_alive() {
    let (app, state, store) = create_test_app_with(short_idle_config(Duration::from_millis(300)));
    let token = create_test_jwt(
        &identity("u-ada", "Ada Lovelace", "ada@example.com"),
        &state.config.jwt_signing_key,
    );

    send(&app, "POST", "/api/session", &token, None).await;
    let unlock = serde_json::json!({ "passcode": "1979" });
    let (status, _) = send(&app, "POST", "/api/developer/unlock", &token, Some(unlock)).await;
    assert_eq!(status, StatusCode::OK);

    for _ in 0..6 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let (status, _) = send(&app, "GET", "/api/me", &token, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    // Developer mode is per session, so it only survives if the session did.
    let (_, me) = send(&app, "GET", "/api/me", &token, None).await;
    assert_eq!(me["developer"], true);
    assert_eq!(state.sessions.len(), 1);
    assert_eq!(store.profile_watchers("u-ada"), 1);
}

#[tokio::test]
async fn test_cors_preflight() {
    let (app, _, _) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/squad")
                .header(header::ORIGIN, "http://localhost:5173")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    assert!(response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
}

#[tokio::test]
async fn test_public_route_no_auth_required() {
    let (app, _, _) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::X_CONTENT_TYPE_OPTIONS).unwrap(),
        "nosniff"
    );
}
