// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

pub mod export;
pub mod geofence;
pub mod motion;
pub mod presence;
pub mod projection;
pub mod session;

pub use geofence::{AuthoringState, DraftOutcome, GeofenceConfig, GeofenceError, GeofenceModel};
pub use motion::MotionConfig;
pub use presence::{PresenceError, PresenceSync};
pub use projection::{PixelPoint, ProjectionError, Scene, Surface};
pub use session::{SessionError, SessionHandle, SessionSettings, Sessions};
