// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod area;
pub mod point;
pub mod profile;

pub use area::{Area, NewArea};
pub use point::Point;
pub use profile::{normalize_email, Identity, ProfilePatch, PublicProfile, UserProfile};
