//! Class-labeled vector geometries

use crate::error::{Error, Result};
use geo_types::Geometry;
use serde_json::Value;
use std::collections::BTreeSet;

/// Per-feature metadata, kept as the raw GeoJSON property object
pub type Properties = serde_json::Map<String, Value>;

/// Integer view of a property value; integral floats are accepted
pub fn label_value(value: &Value) -> Option<i64> {
    if let Some(v) = value.as_i64() {
        return Some(v);
    }
    match value.as_f64() {
        Some(v) if v.is_finite() && v.fract() == 0.0 => Some(v as i64),
        _ => None,
    }
}

/// A point or polygon carrying a class label.
///
/// Never mutated once sampling starts; buffering is expressed as a distance
/// at sampling time rather than by rewriting the geometry.
#[derive(Debug, Clone)]
pub struct LabeledGeometry {
    pub geometry: Geometry<f64>,
    pub label: i32,
    pub properties: Properties,
}

impl LabeledGeometry {
    /// Create a labeled geometry without metadata
    pub fn new(geometry: impl Into<Geometry<f64>>, label: i32) -> Self {
        Self {
            geometry: geometry.into(),
            label,
            properties: Properties::new(),
        }
    }

    /// Attach a metadata attribute
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Labeled geometries whose labels come from a fixed class set.
#[derive(Debug, Clone, Default)]
pub struct LabelCollection {
    features: Vec<LabeledGeometry>,
}

impl LabelCollection {
    /// Build a collection, checking geometry types and labels.
    ///
    /// Labels must be non-negative; when `classes` is given every label must
    /// belong to it.
    pub fn new(features: Vec<LabeledGeometry>, classes: Option<&[i32]>) -> Result<Self> {
        for (i, f) in features.iter().enumerate() {
            match f.geometry {
                Geometry::Point(_) | Geometry::Polygon(_) | Geometry::MultiPolygon(_) => {}
                _ => {
                    return Err(Error::invalid_param(
                        "labels.geometry",
                        i,
                        "only Point, Polygon and MultiPolygon geometries can be sampled",
                    ))
                }
            }
            if f.label < 0 {
                return Err(Error::invalid_param("labels.label", f.label, "class labels must be non-negative"));
            }
            if let Some(set) = classes {
                if !set.contains(&f.label) {
                    return Err(Error::invalid_param(
                        "labels.label",
                        f.label,
                        format!("label not in class set {:?}", set),
                    ));
                }
            }
        }
        Ok(Self { features })
    }

    /// Sorted distinct labels present in the collection
    pub fn classes(&self) -> Vec<i32> {
        self.features
            .iter()
            .map(|f| f.label)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabeledGeometry> {
        self.features.iter()
    }

    pub fn get(&self, index: usize) -> Option<&LabeledGeometry> {
        self.features.get(index)
    }
}

impl IntoIterator for LabelCollection {
    type Item = LabeledGeometry;
    type IntoIter = std::vec::IntoIter<LabeledGeometry>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}
