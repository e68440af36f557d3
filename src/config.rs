// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.

use crate::services::geofence::{GeofenceConfig, DEFAULT_REFERENCE_WIDTH};
use crate::services::motion::{MotionConfig, DEFAULT_MOTION_AREA_LABEL};
use crate::services::SessionSettings;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Which [`crate::db::RemoteStore`] backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::Invalid("STORE_BACKEND", s.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    pub store_backend: StoreBackend,

    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Passcode that unlocks area authoring and deletion
    pub developer_passcode: String,

    /// Nominal map width for the closure tolerance
    pub map_reference_width: f64,
    pub motion_interval: Duration,
    pub motion_area_label: String,
    /// A session with no requests for this long is shut down
    pub session_idle_timeout: Duration,
}

impl Config {
    /// Config for tests: in-memory store and fixed secrets.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            store_backend: StoreBackend::Memory,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            developer_passcode: "1979".to_string(),
            map_reference_width: DEFAULT_REFERENCE_WIDTH,
            motion_interval: Duration::from_secs(5),
            motion_area_label: DEFAULT_MOTION_AREA_LABEL.to_string(),
            session_idle_timeout: DEFAULT_SESSION_IDLE_TIMEOUT,
        }
    }

    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: parse_or("PORT", 8080)?,
            store_backend: env::var("STORE_BACKEND")
                .unwrap_or_else(|_| "firestore".to_string())
                .parse()?,

            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            developer_passcode: env::var("DEVELOPER_PASSCODE")
                .map(|v| v.trim().to_string())
                .unwrap_or_else(|_| "1979".to_string()),

            map_reference_width: parse_or("MAP_REFERENCE_WIDTH", DEFAULT_REFERENCE_WIDTH)?,
            motion_interval: Duration::from_secs(parse_or("MOTION_INTERVAL_SECS", 5)?),
            motion_area_label: env::var("MOTION_AREA_LABEL")
                .unwrap_or_else(|_| DEFAULT_MOTION_AREA_LABEL.to_string()),
            session_idle_timeout: Duration::from_secs(parse_or(
                "SESSION_IDLE_TIMEOUT_SECS",
                DEFAULT_SESSION_IDLE_TIMEOUT.as_secs(),
            )?),
        }
        .validate()
    }

    /// Reject values that would stall or break a session.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if !self.map_reference_width.is_finite() || self.map_reference_width <= 0.0 {
            return Err(ConfigError::Invalid(
                "MAP_REFERENCE_WIDTH",
                self.map_reference_width.to_string(),
            ));
        }
        if self.motion_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "MOTION_INTERVAL_SECS",
                "0".to_string(),
            ));
        }
        if self.session_idle_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "SESSION_IDLE_TIMEOUT_SECS",
                "0".to_string(),
            ));
        }
        Ok(self)
    }

    pub fn geofence(&self) -> GeofenceConfig {
        GeofenceConfig {
            reference_width: self.map_reference_width,
        }
    }

    pub fn motion(&self) -> MotionConfig {
        MotionConfig {
            interval: self.motion_interval,
            area_label: self.motion_area_label.clone(),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            geofence: self.geofence(),
            motion: self.motion(),
            developer_passcode: self.developer_passcode.clone(),
            idle_timeout: self.session_idle_timeout,
        }
    }
}

/// Parse `name` if set, otherwise use `default`. A set but unparsable value is an error.
fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
