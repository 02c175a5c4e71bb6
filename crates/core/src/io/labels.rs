//! GeoJSON label reader
//!
//! Parses a FeatureCollection with the `geojson` crate and converts each
//! geometry to `geo_types`. Only Point, Polygon and MultiPolygon features can
//! be sampled; the class label is read from a named property.

use crate::error::{Error, Result};
use crate::vector::{label_value, LabelCollection, LabeledGeometry};
use geo_types::Geometry;
use geojson::{Feature, GeoJson};
use std::path::Path;

fn geometry_kind(value: &geojson::Value) -> &'static str {
    match value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
}

fn convert_geometry(index: usize, geometry: geojson::Geometry) -> Result<Geometry<f64>> {
    let sampled = matches!(
        geometry.value,
        geojson::Value::Point(_) | geojson::Value::Polygon(_) | geojson::Value::MultiPolygon(_)
    );
    if !sampled {
        return Err(Error::invalid_param(
            "labels.geometry",
            geometry_kind(&geometry.value),
            format!("feature {} is not a Point, Polygon or MultiPolygon", index),
        ));
    }
    Ok(Geometry::<f64>::try_from(geometry)?)
}

fn features(doc: GeoJson) -> Result<Vec<Feature>> {
    match doc {
        GeoJson::FeatureCollection(fc) => Ok(fc.features),
        GeoJson::Feature(f) => Ok(vec![f]),
        GeoJson::Geometry(g) => Err(Error::invalid_param(
            "labels",
            geometry_kind(&g.value),
            "expected a FeatureCollection, got a bare geometry",
        )),
    }
}

/// Parse a GeoJSON FeatureCollection, reading class labels from `label_property`.
///
/// Features without geometry are skipped. A missing or non-integral label
/// fails with `InvalidParameter`. Coordinates beyond x/y are ignored and
/// property values are kept as raw JSON.
pub fn parse_labels(json: &str, label_property: &str, classes: Option<&[i32]>) -> Result<LabelCollection> {
    let doc: GeoJson = json.parse()?;
    let features = features(doc)?;

    let mut labeled = Vec::with_capacity(features.len());
    for (i, feature) in features.into_iter().enumerate() {
        let Some(geometry) = feature.geometry else {
            continue;
        };
        let properties = feature.properties.unwrap_or_default();

        let label = properties
            .get(label_property)
            .and_then(label_value)
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| {
                Error::invalid_param(
                    "labels.property",
                    label_property,
                    format!("feature {} has no integer value for this property", i),
                )
            })?;

        labeled.push(LabeledGeometry {
            geometry: convert_geometry(i, geometry)?,
            label,
            properties,
        });
    }

    LabelCollection::new(labeled, classes)
}

/// Read labels from a GeoJSON file
pub fn read_labels<P: AsRef<Path>>(path: P, label_property: &str, classes: Option<&[i32]>) -> Result<LabelCollection> {
    let text = std::fs::read_to_string(path)?;
    parse_labels(&text, label_property, classes)
}
