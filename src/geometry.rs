// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Polygon helpers shared by authoring, check-in, and rendering.

use crate::models::Point;
use geo::{Contains, LineString, Polygon};

/// Arithmetic mean of the vertices.
///
/// This is not the area-weighted centroid; areas only need a stable marker
/// position for check-in. Returns `None` for an empty polygon.
pub fn centroid(polygon: &[Point]) -> Option<Point> {
    if polygon.is_empty() {
        return None;
    }
    let n = polygon.len() as f64;
    let (sum_x, sum_y) = polygon
        .iter()
        .fold((0.0, 0.0), |(x, y), p| (x + p.x, y + p.y));
    Some(Point::new(sum_x / n, sum_y / n))
}

/// Build a `geo` polygon from vertices in authoring order.
///
/// The exterior ring is closed implicitly; self-intersecting input is
/// accepted as-is.
pub fn to_geo_polygon(polygon: &[Point]) -> Polygon<f64> {
    let ring: LineString<f64> = polygon.iter().map(|p| (p.x, p.y)).collect::<Vec<_>>().into();
    Polygon::new(ring, vec![])
}

/// Point-in-polygon membership. Degenerate polygons contain nothing.
pub fn contains(polygon: &[Point], point: &Point) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    to_geo_polygon(polygon).contains(&geo::Point::from(*point))
}
