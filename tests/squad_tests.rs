// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Friends, check-ins, GPS mode, and simulated motion through the HTTP API.

use axum::http::StatusCode;
use herd_search::config::Config;
use herd_search::db::MemoryStore;
use herd_search::models::{Identity, Point, UserProfile};
use serde_json::{json, Value};
use std::time::Duration;

mod common;
use common::{create_test_app, create_test_app_with, create_test_jwt, eventually, identity, send};

struct User {
    app: axum::Router,
    token: String,
}

impl User {
    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        send(&self.app, method, uri, &self.token, body).await
    }

    async fn squad(&self) -> Vec<Value> {
        let (status, body) = self.send("GET", "/api/squad", None).await;
        assert_eq!(status, StatusCode::OK);
        body.as_array().cloned().unwrap_or_default()
    }
}

fn user(app: &axum::Router, config: &Config, who: &Identity) -> User {
    User {
        app: app.clone(),
        token: create_test_jwt(who, &config.jwt_signing_key),
    }
}

fn ada() -> Identity {
    identity("u-ada", "Ada Lovelace", "ada@example.com")
}

fn grace() -> Identity {
    identity("u-grace", "Grace Hopper", "grace@example.com")
}

/// Seed a stored area directly, as if another session had drawn it.
async fn seed_area(store: &MemoryStore, name: &str, polygon: Vec<Point>) -> String {
    use herd_search::db::RemoteStore;
    use herd_search::models::NewArea;

    store
        .add_area(&NewArea {
            name: name.to_string(),
            polygon,
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_add_friend_and_see_them_in_squad() {
    let (app, state, _) = create_test_app();
    let ada = user(&app, &state.config, &ada());
    let grace = user(&app, &state.config, &grace());

    // Grace must have signed in once to be findable.
    grace.send("POST", "/api/session", None).await;

    let (status, body) = ada
        .send(
            "POST",
            "/api/friends",
            Some(json!({ "email": "GRACE@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["uid"], "u-grace");

    let ada = &ada;
    assert!(eventually(|| async move { ada.squad().await.len() == 2 }).await);
    let squad = ada.squad().await;
    assert_eq!(squad[0]["uid"], "u-ada");
    assert_eq!(squad[0]["isYou"], true);
    assert_eq!(squad[1]["uid"], "u-grace");
    assert_eq!(squad[1]["isYou"], false);
    assert_eq!(squad[1]["displayName"], "Grace Hopper");
}

#[tokio::test]
async fn test_add_unknown_friend_not_found() {
    let (app, state, _) = create_test_app();
    let ada = user(&app, &state.config, &ada());

    let (status, body) = ada
        .send(
            "POST",
            "/api/friends",
            Some(json!({ "email": "nobody@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_add_self_rejected() {
    let (app, state, store) = create_test_app();
    let ada = user(&app, &state.config, &ada());

    let (status, body) = ada
        .send(
            "POST",
            "/api/friends",
            Some(json!({ "email": "ada@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "self_reference");
    assert!(store.profile("u-ada").unwrap().friends.is_empty());
}

#[tokio::test]
async fn test_malformed_email_rejected() {
    let (app, state, _) = create_test_app();
    let ada = user(&app, &state.config, &ada());

    let (status, body) = ada
        .send("POST", "/api/friends", Some(json!({ "email": "grace" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_friend_moves_show_up_with_area() {
    let (app, state, store) = create_test_app();
    seed_area(
        &store,
        "Main Stage",
        vec![
            Point::new(0.0, 0.0),
            Point::new(0.5, 0.0),
            Point::new(0.5, 0.5),
            Point::new(0.0, 0.5),
        ],
    )
    .await;
    let mut friend = UserProfile::for_identity(&grace());
    friend.location = Some(Point::new(0.25, 0.25));
    friend.current_area = String::new();
    store.put_profile(friend);

    let ada = user(&app, &state.config, &ada());
    ada.send(
        "POST",
        "/api/friends",
        Some(json!({ "email": "grace@example.com" })),
    )
    .await;

    let ada = &ada;
    assert!(eventually(|| async move { ada.squad().await.len() == 2 }).await);
    let squad = ada.squad().await;
    assert_eq!(squad[1]["currentArea"], "Unknown");
    assert_eq!(squad[1]["insideArea"], "Main Stage");
    assert_eq!(squad[1]["location"]["x"], 0.25);
}

#[tokio::test]
async fn test_check_in_sets_location_to_centroid() {
    let (app, state, store) = create_test_app();
    let area_id = seed_area(
        &store,
        "Food Court",
        vec![
            Point::new(0.6, 0.6),
            Point::new(0.9, 0.6),
            Point::new(0.9, 0.9),
            Point::new(0.6, 0.9),
        ],
    )
    .await;
    let ada = user(&app, &state.config, &ada());

    let (status, body) = ada
        .send("POST", "/api/check-in", Some(json!({ "area_id": area_id })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["currentArea"], "Food Court");

    let me = store.profile("u-ada").unwrap();
    assert_eq!(me.current_area, "Food Court");
    let at = me.location.unwrap();
    assert!((at.x - 0.75).abs() < 1e-9 && (at.y - 0.75).abs() < 1e-9);
}

#[tokio::test]
async fn test_check_in_unknown_area_not_found() {
    let (app, state, _) = create_test_app();
    let ada = user(&app, &state.config, &ada());

    let (status, _) = ada
        .send(
            "POST",
            "/api/check-in",
            Some(json!({ "area_id": "area-9999" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_gps_toggle_persisted() {
    let (app, state, store) = create_test_app();
    let ada = user(&app, &state.config, &ada());

    let (status, body) = ada
        .send("PUT", "/api/settings/gps", Some(json!({ "enabled": false })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["useGps"], false);
    assert!(!store.profile("u-ada").unwrap().use_gps);
}

fn fast_motion() -> Config {
    let mut config = Config::test_default();
    config.motion_interval = Duration::from_millis(20);
    config
}

#[tokio::test]
async fn test_motion_moves_user_with_gps_on() {
    let (app, state, store) = create_test_app_with(fast_motion());
    let ada = user(&app, &state.config, &ada());
    ada.send("POST", "/api/session", None).await;

    let store = &store;
    assert!(
        eventually(|| async move {
            store
                .profile("u-ada")
                .is_some_and(|p| p.location.is_some() && p.current_area == "The Wilds")
        })
        .await
    );
    let at = store.profile("u-ada").unwrap().location.unwrap();
    assert!(at.is_normalized());
}

#[tokio::test]
async fn test_motion_idle_with_gps_off() {
    let (app, state, store) = create_test_app_with(fast_motion());
    let mut profile = UserProfile::for_identity(&ada());
    profile.use_gps = false;
    store.put_profile(profile);

    let ada = user(&app, &state.config, &ada());
    ada.send("POST", "/api/session", None).await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    let me = store.profile("u-ada").unwrap();
    assert_eq!(me.location, None);
    assert_eq!(me.current_area, "unknown");
}

#[tokio::test]
async fn test_concurrent_first_requests_share_one_session() {
    let (app, state, store) = create_test_app();
    let ada = user(&app, &state.config, &ada());

    let (a, b, c) = tokio::join!(
        ada.send("GET", "/api/me", None),
        ada.send("GET", "/api/squad", None),
        ada.send("GET", "/api/areas", None),
    );
    assert_eq!(a.0, StatusCode::OK);
    assert_eq!(b.0, StatusCode::OK);
    assert_eq!(c.0, StatusCode::OK);
    assert_eq!(state.sessions.len(), 1);

    // Actors that lost the race stop and release their watches.
    let store = &store;
    assert!(eventually(|| async move { store.profile_watchers("u-ada") == 1 }).await);
}
