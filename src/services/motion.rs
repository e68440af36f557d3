// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Simulated GPS: random positions written on a fixed interval.

use crate::models::{Point, ProfilePatch, UserProfile};
use rand::Rng;
use std::time::Duration;

pub const DEFAULT_MOTION_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MOTION_AREA_LABEL: &str = "The Wilds";

#[derive(Debug, Clone)]
pub struct MotionConfig {
    /// Time between simulated position reports
    pub interval: Duration,
    /// Area label written with every simulated position
    pub area_label: String,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_MOTION_INTERVAL,
            area_label: DEFAULT_MOTION_AREA_LABEL.to_string(),
        }
    }
}

/// Uniformly random point in the unit square.
pub fn random_location<R: Rng + ?Sized>(rng: &mut R) -> Point {
    Point::new(rng.random::<f64>(), rng.random::<f64>())
}

/// Position update for this tick, if the user has GPS mode on.
pub fn next_position<R: Rng + ?Sized>(
    profile: Option<&UserProfile>,
    config: &MotionConfig,
    rng: &mut R,
) -> Option<ProfilePatch> {
    let profile = profile?;
    if !profile.use_gps {
        return None;
    }
    Some(ProfilePatch::position(
        random_location(rng),
        config.area_label.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Identity;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn profile(use_gps: bool) -> UserProfile {
        let mut profile = UserProfile::for_identity(&Identity {
            uid: "u1".to_string(),
            display_name: "Ada".to_string(),
            email: None,
            photo_url: None,
        });
        profile.use_gps = use_gps;
        profile
    }

    #[test]
    fn test_random_locations_are_normalized() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            assert!(random_location(&mut rng).is_normalized());
        }
    }

    #[test]
    fn test_next_position_with_gps() {
        let mut rng = StdRng::seed_from_u64(1);
        let patch = next_position(Some(&profile(true)), &MotionConfig::default(), &mut rng)
            .expect("GPS on should move");
        assert!(patch.location.unwrap().is_normalized());
        assert_eq!(patch.current_area.as_deref(), Some("The Wilds"));
        assert_eq!(patch.use_gps, None);
    }

    #[test]
    fn test_next_position_without_gps() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(next_position(Some(&profile(false)), &MotionConfig::default(), &mut rng).is_none());
        assert!(next_position(None, &MotionConfig::default(), &mut rng).is_none());
    }
}
