// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Map projection surface.
//!
//! Stateless conversion between normalized map coordinates and pixels on a
//! drawing surface, and a pure scene renderer that turns the current areas,
//! draft, and friend positions into draw primitives.

use crate::models::{Area, Point, UserProfile};
use serde::{Deserialize, Serialize};

const AREA_FILL: &str = "rgba(29, 78, 216, 0.3)";
const AREA_STROKE: &str = "rgba(29, 78, 216, 0.7)";
const DRAFT_FILL: &str = "rgba(255, 255, 0, 0.3)";
const DRAFT_STROKE: &str = "rgba(255, 255, 0, 0.7)";
const VERTEX_FILL: &str = "yellow";
const LINE_WIDTH: f64 = 2.0;
const VERTEX_RADIUS: f64 = 5.0;
const FALLBACK_NAME: &str = "User";

/// A position in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Placement and size of the drawing surface, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    #[serde(default)]
    pub origin_x: f64,
    #[serde(default)]
    pub origin_y: f64,
    pub width: f64,
    pub height: f64,
}

impl Surface {
    /// A surface whose origin is at `(0, 0)`.
    pub const fn sized(width: f64, height: f64) -> Self {
        Self {
            origin_x: 0.0,
            origin_y: 0.0,
            width,
            height,
        }
    }

    /// Whether the surface has a usable size (it may not be laid out yet).
    pub fn is_laid_out(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("Drawing surface has no size ({width}x{height})")]
    SurfaceNotLaidOut { width: f64, height: f64 },
}

/// Pointer position to normalized map coordinates, clamped into `[0, 1]`.
pub fn to_normalized(pixel: PixelPoint, surface: &Surface) -> Result<Point, ProjectionError> {
    if !surface.is_laid_out() {
        return Err(ProjectionError::SurfaceNotLaidOut {
            width: surface.width,
            height: surface.height,
        });
    }
    Ok(Point::clamped(
        (pixel.x - surface.origin_x) / surface.width,
        (pixel.y - surface.origin_y) / surface.height,
    ))
}

/// Normalized coordinates to surface pixels. Out-of-range input is not
/// clamped; it simply lands outside the visible surface.
pub fn to_pixels(point: Point, surface: &Surface) -> PixelPoint {
    PixelPoint::new(
        surface.origin_x + point.x * surface.width,
        surface.origin_y + point.y * surface.height,
    )
}

/// One draw primitive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    Polygon {
        points: Vec<PixelPoint>,
        fill: &'static str,
        stroke: &'static str,
        line_width: f64,
        /// Closed and filled only with three or more points
        closed: bool,
    },
    Vertex {
        center: PixelPoint,
        radius: f64,
        fill: &'static str,
    },
    Marker {
        uid: String,
        label: String,
        avatar_url: String,
        at: PixelPoint,
    },
}

/// Everything the surface draws, in painting order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scene {
    pub width: f64,
    pub height: f64,
    pub shapes: Vec<Shape>,
}

/// Inputs to [`render`].
pub struct SceneInput<'a> {
    pub areas: Vec<&'a Area>,
    pub draft: &'a [Point],
    pub authoring: bool,
    pub friends: Vec<&'a UserProfile>,
}

/// Render a scene. Pure: identical inputs give an identical scene.
pub fn render(input: &SceneInput<'_>, surface: &Surface) -> Scene {
    let mut shapes = Vec::new();

    for area in &input.areas {
        push_polygon(&mut shapes, &area.polygon, surface, AREA_FILL, AREA_STROKE);
    }

    if input.authoring && !input.draft.is_empty() {
        push_polygon(&mut shapes, input.draft, surface, DRAFT_FILL, DRAFT_STROKE);
    }

    for friend in &input.friends {
        if let Some(location) = friend.location {
            shapes.push(Shape::Marker {
                uid: friend.uid.clone(),
                label: marker_label(&friend.display_name),
                avatar_url: avatar_url(friend),
                at: to_pixels(location, surface),
            });
        }
    }

    Scene {
        width: surface.width,
        height: surface.height,
        shapes,
    }
}

fn push_polygon(
    shapes: &mut Vec<Shape>,
    points: &[Point],
    surface: &Surface,
    fill: &'static str,
    stroke: &'static str,
) {
    if points.is_empty() {
        return;
    }
    let pixels: Vec<PixelPoint> = points.iter().map(|p| to_pixels(*p, surface)).collect();
    shapes.push(Shape::Polygon {
        points: pixels.clone(),
        fill,
        stroke,
        line_width: LINE_WIDTH,
        closed: points.len() > 2,
    });
    shapes.extend(pixels.into_iter().map(|center| Shape::Vertex {
        center,
        radius: VERTEX_RADIUS,
        fill: VERTEX_FILL,
    }));
}

/// First word of the display name.
fn marker_label(display_name: &str) -> String {
    display_name
        .split_whitespace()
        .next()
        .unwrap_or(FALLBACK_NAME)
        .to_string()
}

/// Profile photo, or a placeholder showing the name's initial.
fn avatar_url(profile: &UserProfile) -> String {
    if let Some(url) = profile.photo_url.as_deref().filter(|u| !u.is_empty()) {
        return url.to_string();
    }
    let initial = profile.display_name.trim().chars().next().unwrap_or('U');
    format!("https://placehold.co/40x40/E0E0E0/757575?text={}", initial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Identity;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_to_normalized_with_offset_origin() {
        let surface = Surface {
            origin_x: 100.0,
            origin_y: 50.0,
            width: 800.0,
            height: 400.0,
        };
        let p = to_normalized(PixelPoint::new(500.0, 150.0), &surface).unwrap();
        assert!(close(p.x, 0.5));
        assert!(close(p.y, 0.25));
    }

    #[test]
    fn test_to_normalized_clamps_outside_clicks() {
        let surface = Surface::sized(100.0, 100.0);
        let p = to_normalized(PixelPoint::new(-20.0, 250.0), &surface).unwrap();
        assert_eq!(p, Point::new(0.0, 1.0));
    }

    #[test]
    fn test_to_normalized_rejects_unsized_surface() {
        for surface in [Surface::sized(0.0, 100.0), Surface::sized(100.0, 0.0)] {
            assert!(matches!(
                to_normalized(PixelPoint::new(1.0, 1.0), &surface),
                Err(ProjectionError::SurfaceNotLaidOut { .. })
            ));
        }
    }

    #[test]
    fn test_round_trip_inside_surface() {
        let surface = Surface {
            origin_x: 13.0,
            origin_y: 7.5,
            width: 1187.0,
            height: 791.0,
        };
        for (x, y) in [(14.0, 8.0), (600.25, 400.5), (1199.0, 797.0)] {
            let pixel = PixelPoint::new(x, y);
            let back = to_pixels(to_normalized(pixel, &surface).unwrap(), &surface);
            assert!(close(back.x, x) && close(back.y, y), "{:?} -> {:?}", pixel, back);
        }
    }

    #[test]
    fn test_to_pixels_does_not_clamp() {
        let surface = Surface::sized(200.0, 100.0);
        assert_eq!(
            to_pixels(Point::new(1.5, -0.5), &surface),
            PixelPoint::new(300.0, -50.0)
        );
    }

    fn friend(uid: &str, name: &str, location: Option<Point>) -> UserProfile {
        let mut profile = UserProfile::for_identity(&Identity {
            uid: uid.to_string(),
            display_name: name.to_string(),
            email: None,
            photo_url: None,
        });
        profile.location = location;
        profile
    }

    #[test]
    fn test_render_layers_and_markers() {
        let area = Area {
            id: "a".to_string(),
            name: "Main Stage".to_string(),
            polygon: vec![
                Point::new(0.0, 0.0),
                Point::new(1.0, 0.0),
                Point::new(1.0, 1.0),
            ],
        };
        let draft = vec![Point::new(0.5, 0.5), Point::new(0.6, 0.5)];
        let ada = friend("u1", "Ada Lovelace", Some(Point::new(0.5, 0.25)));
        let nowhere = friend("u2", "Grace", None);

        let input = SceneInput {
            areas: vec![&area],
            draft: &draft,
            authoring: true,
            friends: vec![&ada, &nowhere],
        };
        let scene = render(&input, &Surface::sized(1200.0, 800.0));

        // Area polygon + 3 vertices, draft polyline + 2 vertices, one marker.
        assert_eq!(scene.shapes.len(), 8);
        match &scene.shapes[0] {
            Shape::Polygon { closed, fill, .. } => {
                assert!(*closed);
                assert_eq!(*fill, AREA_FILL);
            }
            other => panic!("expected polygon, got {:?}", other),
        }
        match &scene.shapes[4] {
            Shape::Polygon { closed, fill, .. } => {
                assert!(!*closed);
                assert_eq!(*fill, DRAFT_FILL);
            }
            other => panic!("expected draft polygon, got {:?}", other),
        }
        match scene.shapes.last().unwrap() {
            Shape::Marker {
                label,
                avatar_url,
                at,
                ..
            } => {
                assert_eq!(label, "Ada");
                assert!(avatar_url.ends_with("text=A"));
                assert_eq!(*at, PixelPoint::new(600.0, 200.0));
            }
            other => panic!("expected marker, got {:?}", other),
        }
    }

    #[test]
    fn test_render_hides_draft_when_not_authoring() {
        let draft = vec![Point::new(0.5, 0.5)];
        let input = SceneInput {
            areas: vec![],
            draft: &draft,
            authoring: false,
            friends: vec![],
        };
        assert!(render(&input, &Surface::sized(10.0, 10.0)).shapes.is_empty());
    }

    #[test]
    fn test_render_is_idempotent() {
        let ada = friend("u1", "Ada", Some(Point::new(0.1, 0.9)));
        let input = SceneInput {
            areas: vec![],
            draft: &[],
            authoring: false,
            friends: vec![&ada],
        };
        let surface = Surface::sized(640.0, 480.0);
        assert_eq!(render(&input, &surface), render(&input, &surface));
    }

    #[test]
    fn test_marker_label_fallback() {
        assert_eq!(marker_label(""), "User");
        assert_eq!(marker_label("  Grace  Hopper"), "Grace");
    }
}
