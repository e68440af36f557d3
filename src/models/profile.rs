// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User profile models for storage and API.

use crate::models::Point;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Area label written for a brand-new profile.
pub const UNKNOWN_AREA: &str = "unknown";

/// Identity asserted by the sign-in provider for the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub display_name: String,
    pub email: Option<String>,
    pub photo_url: Option<String>,
}

/// Per-user profile document (`users/{uid}`).
///
/// Only the owning session writes it, except that nobody else's document
/// is touched when someone adds a friend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    #[serde(default)]
    pub display_name: String,
    /// Lowercased email, if the provider shared one
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "photoURL", default)]
    pub photo_url: Option<String>,
    /// UIDs this user follows (one-directional)
    #[serde(default)]
    pub friends: BTreeSet<String>,
    #[serde(default)]
    pub location: Option<Point>,
    #[serde(default = "default_current_area")]
    pub current_area: String,
    #[serde(default = "default_use_gps")]
    pub use_gps: bool,
}

fn default_current_area() -> String {
    UNKNOWN_AREA.to_string()
}

fn default_use_gps() -> bool {
    true
}

impl UserProfile {
    /// Profile created on first sign-in.
    pub fn for_identity(identity: &Identity) -> Self {
        Self {
            uid: identity.uid.clone(),
            display_name: identity.display_name.clone(),
            email: identity.email.as_deref().map(normalize_email),
            photo_url: identity.photo_url.clone(),
            friends: BTreeSet::new(),
            location: None,
            current_area: default_current_area(),
            use_gps: true,
        }
    }
}

/// Email-queryable projection of a profile (`user_profiles/{uid}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub uid: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "photoURL", default)]
    pub photo_url: Option<String>,
}

impl From<&UserProfile> for PublicProfile {
    fn from(profile: &UserProfile) -> Self {
        Self {
            uid: profile.uid.clone(),
            display_name: profile.display_name.clone(),
            email: profile.email.clone(),
            photo_url: profile.photo_url.clone(),
        }
    }
}

/// Partial update of the fields a session writes about itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Point>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_area: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_gps: Option<bool>,
}

impl ProfilePatch {
    pub fn position(location: Point, current_area: impl Into<String>) -> Self {
        Self {
            location: Some(location),
            current_area: Some(current_area.into()),
            use_gps: None,
        }
    }

    pub fn use_gps(enabled: bool) -> Self {
        Self {
            use_gps: Some(enabled),
            ..Self::default()
        }
    }

    /// Document field names this patch writes.
    pub fn fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.location.is_some() {
            fields.push("location");
        }
        if self.current_area.is_some() {
            fields.push("currentArea");
        }
        if self.use_gps.is_some() {
            fields.push("useGps");
        }
        fields
    }

    pub fn apply_to(&self, profile: &mut UserProfile) {
        if let Some(location) = self.location {
            profile.location = Some(location);
        }
        if let Some(area) = &self.current_area {
            profile.current_area = area.clone();
        }
        if let Some(enabled) = self.use_gps {
            profile.use_gps = enabled;
        }
    }
}

/// Canonical form used for email lookups.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity {
            uid: "u1".to_string(),
            display_name: "Ada Lovelace".to_string(),
            email: Some("Ada@Example.COM".to_string()),
            photo_url: None,
        }
    }

    #[test]
    fn test_new_profile_defaults() {
        let profile = UserProfile::for_identity(&identity());
        assert_eq!(profile.email.as_deref(), Some("ada@example.com"));
        assert!(profile.friends.is_empty());
        assert!(profile.location.is_none());
        assert_eq!(profile.current_area, UNKNOWN_AREA);
        assert!(profile.use_gps);
    }

    #[test]
    fn test_profile_document_field_names() {
        let profile = UserProfile::for_identity(&identity());
        let json = serde_json::to_value(&profile).unwrap();
        assert!(json.get("displayName").is_some());
        assert!(json.get("photoURL").is_some());
        assert!(json.get("currentArea").is_some());
        assert!(json.get("useGps").is_some());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let json = r#"{"uid":"u2","displayName":"B","friends":["u1"],"legacyField":42}"#;
        let profile: UserProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.uid, "u2");
        assert!(profile.friends.contains("u1"));
        assert_eq!(profile.current_area, UNKNOWN_AREA);
        assert!(profile.use_gps);
    }

    #[test]
    fn test_patch_fields_and_apply() {
        let patch = ProfilePatch::position(Point::new(0.5, 0.5), "Main Stage");
        assert_eq!(patch.fields(), vec!["location", "currentArea"]);

        let mut profile = UserProfile::for_identity(&identity());
        patch.apply_to(&mut profile);
        assert_eq!(profile.location, Some(Point::new(0.5, 0.5)));
        assert_eq!(profile.current_area, "Main Stage");
        assert!(profile.use_gps);

        ProfilePatch::use_gps(false).apply_to(&mut profile);
        assert!(!profile.use_gps);
        assert_eq!(profile.current_area, "Main Stage");
    }

    #[test]
    fn test_patch_serializes_only_set_fields() {
        let json = serde_json::to_value(ProfilePatch::use_gps(false)).unwrap();
        assert_eq!(json, serde_json::json!({"useGps": false}));
    }
}
