// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Geofence model: the shared area set plus the polygon being authored.
//!
//! Authoring runs through a small state machine:
//! `Idle -> Drawing` (start), `Drawing -> Drawing` (each click that adds a
//! vertex), `Drawing -> PendingName` (click near the first vertex), and back
//! to `Idle` on commit or cancel.

use crate::db::{RemoteStore, StoreError};
use crate::models::{Area, NewArea, Point};
use crate::revision::Revision;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Click tolerance around the first vertex, in reference-width pixels.
const CLOSURE_TOLERANCE_PX: f64 = 10.0;

/// Fewest vertices a persisted area may have.
pub const MIN_AREA_POINTS: usize = 3;

/// Nominal map width used to express the closure tolerance in normalized units.
pub const DEFAULT_REFERENCE_WIDTH: f64 = 1200.0;

#[derive(Debug, Clone, Copy)]
pub struct GeofenceConfig {
    /// Fixed nominal width of the map image, independent of rendered size
    pub reference_width: f64,
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            reference_width: DEFAULT_REFERENCE_WIDTH,
        }
    }
}

impl GeofenceConfig {
    /// Normalized distance within which a click counts as closing the polygon.
    pub fn closure_radius(&self) -> f64 {
        CLOSURE_TOLERANCE_PX / self.reference_width
    }
}

/// What a click did to the draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftOutcome {
    /// The point became the draft's newest vertex.
    Appended,
    /// The click closed the polygon; the point was not added and a name is needed.
    Closed,
}

/// In-progress polygon. Has no identity until committed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    points: Vec<Point>,
}

impl Draft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `point`, or treat it as the closing gesture.
    ///
    /// A click closes the draft only when at least three vertices exist and
    /// the click lands strictly within `closure_radius` of the first one.
    /// Closing clicks are consumed, never appended.
    pub fn append_or_close(&mut self, point: Point, closure_radius: f64) -> DraftOutcome {
        if self.points.len() >= MIN_AREA_POINTS {
            if let Some(first) = self.points.first() {
                if point.distance(first) < closure_radius {
                    return DraftOutcome::Closed;
                }
            }
        }
        self.points.push(point);
        DraftOutcome::Appended
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}

/// Authoring state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthoringState {
    Idle,
    Drawing,
    PendingName,
}

/// Errors from geofence operations.
#[derive(Debug, thiserror::Error)]
pub enum GeofenceError {
    #[error("Invalid area: {0}")]
    InvalidArea(String),

    #[error("Not drawing an area")]
    NotAuthoring,

    #[error("Polygon is closed; submit a name or cancel")]
    AwaitingName,

    #[error("Polygon is not closed; click the first vertex to finish it")]
    NotClosed,

    #[error("Unknown area: {0}")]
    UnknownArea(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Owns the synchronized area set and the local draft.
pub struct GeofenceModel {
    config: GeofenceConfig,
    store: Arc<dyn RemoteStore>,
    areas: BTreeMap<String, Area>,
    draft: Draft,
    state: AuthoringState,
    revision: Revision,
}

impl GeofenceModel {
    pub fn new(store: Arc<dyn RemoteStore>, config: GeofenceConfig) -> Self {
        Self {
            config,
            store,
            areas: BTreeMap::new(),
            draft: Draft::new(),
            state: AuthoringState::Idle,
            revision: Revision::new(),
        }
    }

    pub fn areas(&self) -> impl Iterator<Item = &Area> {
        self.areas.values()
    }

    pub fn area(&self, id: &str) -> Option<&Area> {
        self.areas.get(id)
    }

    pub fn draft(&self) -> &[Point] {
        self.draft.points()
    }

    pub fn state(&self) -> AuthoringState {
        self.state
    }

    pub fn is_authoring(&self) -> bool {
        self.state != AuthoringState::Idle
    }

    pub fn revision(&self) -> u64 {
        self.revision.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Replace the local area set with a snapshot from the store.
    pub fn replace_areas(&mut self, areas: Vec<Area>) {
        self.areas = areas.into_iter().map(|a| (a.id.clone(), a)).collect();
        tracing::debug!(count = self.areas.len(), "Area set updated");
        self.revision.bump();
    }

    /// First area (in ID order) whose polygon contains `point`.
    pub fn area_at(&self, point: &Point) -> Option<&Area> {
        self.areas.values().find(|a| a.contains(point))
    }

    /// Enter drawing mode with an empty draft. No-op if already authoring.
    pub fn start_authoring(&mut self) {
        if self.state == AuthoringState::Idle {
            self.draft.clear();
            self.state = AuthoringState::Drawing;
            tracing::debug!("Authoring started");
            self.revision.bump();
        }
    }

    /// Feed a normalized click into the draft.
    pub fn click(&mut self, point: Point) -> Result<DraftOutcome, GeofenceError> {
        match self.state {
            AuthoringState::Idle => Err(GeofenceError::NotAuthoring),
            AuthoringState::PendingName => Err(GeofenceError::AwaitingName),
            AuthoringState::Drawing => {
                let outcome = self
                    .draft
                    .append_or_close(point, self.config.closure_radius());
                match outcome {
                    DraftOutcome::Closed => {
                        self.state = AuthoringState::PendingName;
                        tracing::debug!(points = self.draft.len(), "Polygon closed");
                    }
                    DraftOutcome::Appended => {
                        tracing::debug!(points = self.draft.len(), "Vertex appended");
                    }
                }
                self.revision.bump();
                Ok(outcome)
            }
        }
    }

    /// Persist the closed draft as a named area.
    ///
    /// Only a polygon closed by clicking its first vertex can be committed.
    /// The new area reaches `areas()` through the store's area watch, not
    /// by local insertion. On failure the draft is left untouched.
    pub async fn commit(&mut self, name: &str) -> Result<Area, GeofenceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GeofenceError::InvalidArea("name is required".to_string()));
        }
        if self.draft.len() < MIN_AREA_POINTS {
            return Err(GeofenceError::InvalidArea(format!(
                "an area needs at least {} points, got {}",
                MIN_AREA_POINTS,
                self.draft.len()
            )));
        }
        match self.state {
            AuthoringState::PendingName => {}
            AuthoringState::Drawing => return Err(GeofenceError::NotClosed),
            AuthoringState::Idle => return Err(GeofenceError::NotAuthoring),
        }

        let new_area = NewArea {
            name: name.to_string(),
            polygon: self.draft.points().to_vec(),
        };
        let id = self.store.add_area(&new_area).await?;
        tracing::info!(area_id = %id, area_name = %new_area.name, points = new_area.polygon.len(), "Area created");

        self.draft.clear();
        self.state = AuthoringState::Idle;
        self.revision.bump();
        Ok(new_area.with_id(id))
    }

    /// Drop the draft without persisting anything.
    pub fn discard(&mut self) {
        let was_authoring = self.is_authoring() || !self.draft.is_empty();
        self.draft.clear();
        self.state = AuthoringState::Idle;
        if was_authoring {
            tracing::debug!("Authoring cancelled");
            self.revision.bump();
        }
    }

    /// Delete an area from the store. The local set follows via the watch.
    pub async fn remove(&mut self, area_id: &str) -> Result<(), GeofenceError> {
        if !self.areas.contains_key(area_id) {
            return Err(GeofenceError::UnknownArea(area_id.to_string()));
        }
        self.store.delete_area(area_id).await?;
        tracing::info!(area_id, "Area deleted");
        Ok(())
    }
}
