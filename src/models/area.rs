// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Named map areas (geofences).

use crate::geometry;
use crate::models::Point;
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// A named polygonal region of the map, as stored in the `areas` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Area {
    /// Store-assigned document ID
    #[serde(alias = "_firestore_id", default)]
    pub id: String,
    /// Display name (e.g., "Main Stage")
    pub name: String,
    /// Vertices in authoring order
    pub polygon: Vec<Point>,
}

impl Area {
    /// Arithmetic mean of the vertices. `None` for an empty polygon.
    pub fn centroid(&self) -> Option<Point> {
        geometry::centroid(&self.polygon)
    }

    /// Whether `point` falls inside this area's polygon.
    pub fn contains(&self, point: &Point) -> bool {
        geometry::contains(&self.polygon, point)
    }
}

/// An area that has not been persisted yet. The store assigns its ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewArea {
    pub name: String,
    pub polygon: Vec<Point>,
}

impl NewArea {
    pub fn with_id(self, id: impl Into<String>) -> Area {
        Area {
            id: id.into(),
            name: self.name,
            polygon: self.polygon,
        }
    }
}
