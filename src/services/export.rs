// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! GeoJSON export of the area set.
//!
//! Coordinates stay in normalized map units (`x` right, `y` down), so the
//! output lines up with the map image rather than with the globe.

use crate::geometry::to_geo_polygon;
use crate::models::Area;
use geojson::{feature::Id, Feature, FeatureCollection, Geometry, JsonObject, JsonValue};

/// Build a FeatureCollection with one Polygon feature per area.
pub fn areas_to_geojson<'a>(areas: impl IntoIterator<Item = &'a Area>) -> FeatureCollection {
    let features = areas.into_iter().map(area_feature).collect();
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

fn area_feature(area: &Area) -> Feature {
    let polygon = to_geo_polygon(&area.polygon);
    let mut properties = JsonObject::new();
    properties.insert("name".to_string(), JsonValue::from(area.name.clone()));
    properties.insert("id".to_string(), JsonValue::from(area.id.clone()));

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(geojson::Value::from(&polygon))),
        id: Some(Id::String(area.id.clone())),
        properties: Some(properties),
        foreign_members: None,
    }
}
