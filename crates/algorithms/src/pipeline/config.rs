//! Pipeline configuration
//!
//! Every tunable of a classification run lives in one immutable
//! [`PipelineConfig`], deserialized from JSON and checked once by
//! [`PipelineConfig::validate`] before any stage runs.

use crate::classification::{DegeneratePolicy, ForestParams};
use crate::segmentation::SnicParams;
use crate::statistics::region::{ReduceParams, Region};
use crate::texture::SpectralBands;
use bakau_core::io::DateRange;
use bakau_core::{Error, Result};
use geo::{LineString, Polygon};
use serde::{Deserialize, Serialize};

/// Pixel-based or object-based feature construction
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureMode {
    /// Features are the scene bands plus principal components
    #[default]
    PixelBased,
    /// Features are SNIC segment means of the principal components and scene bands
    ObjectBased(SnicParams),
}

/// Region of interest for statistics and the scene query
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegionConfig {
    /// The whole scene
    #[default]
    Full,
    /// Axis-aligned box in map units
    Bbox { min_x: f64, min_y: f64, max_x: f64, max_y: f64 },
    /// Exterior ring `[[x, y], ...]`; closed automatically
    Polygon { ring: Vec<[f64; 2]> },
}

impl RegionConfig {
    /// Polygon for the query and reducers, `None` for the whole scene
    pub fn polygon(&self) -> Option<Polygon<f64>> {
        match self {
            RegionConfig::Full => None,
            RegionConfig::Bbox { min_x, min_y, max_x, max_y } => Some(Polygon::new(
                LineString::from(vec![
                    (*min_x, *min_y),
                    (*max_x, *min_y),
                    (*max_x, *max_y),
                    (*min_x, *max_y),
                    (*min_x, *min_y),
                ]),
                vec![],
            )),
            RegionConfig::Polygon { ring } => Some(Polygon::new(
                LineString::from(ring.iter().map(|p| (p[0], p[1])).collect::<Vec<_>>()),
                vec![],
            )),
        }
    }

    pub fn region(&self) -> Region {
        self.polygon().map_or(Region::Full, Region::Polygon)
    }

    fn validate(&self) -> Result<()> {
        match self {
            RegionConfig::Full => Ok(()),
            RegionConfig::Bbox { min_x, min_y, max_x, max_y } => {
                if !(min_x < max_x && min_y < max_y) {
                    return Err(Error::invalid_param(
                        "region.bbox",
                        format!("[{}, {}, {}, {}]", min_x, min_y, max_x, max_y),
                        "min must be below max on both axes",
                    ));
                }
                Ok(())
            }
            RegionConfig::Polygon { ring } => {
                if ring.len() < 3 || ring.iter().flatten().any(|v| !v.is_finite()) {
                    return Err(Error::invalid_param(
                        "region.ring",
                        ring.len(),
                        "needs at least 3 finite vertices",
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Texture settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureConfig {
    /// GLCM window side (default: 3)
    pub window: usize,
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self { window: 3 }
    }
}

/// PCA settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcaConfig {
    /// Leading components kept as features (default: 1)
    pub n_components: usize,
    /// Nominal scale of the covariance reduction (default: native)
    pub scale: Option<f64>,
    pub tolerance: f64,
    pub degenerate: DegeneratePolicy,
}

impl Default for PcaConfig {
    fn default() -> Self {
        Self {
            n_components: 1,
            scale: None,
            tolerance: 1e-9,
            degenerate: DegeneratePolicy::NoData,
        }
    }
}

/// Random forest settings; the seed comes from [`PipelineConfig::seed`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_features: Option<usize>,
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
}

impl Default for ForestConfig {
    fn default() -> Self {
        let p = ForestParams::default();
        Self {
            n_trees: p.n_trees,
            max_features: p.max_features,
            max_depth: p.max_depth,
            min_samples_leaf: p.min_samples_leaf,
        }
    }
}

/// Region reducer budget; the seed comes from [`PipelineConfig::seed`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReducerConfig {
    /// Nominal scale of normalization statistics (default: native)
    pub scale: Option<f64>,
    pub max_pixels: usize,
    pub deadline_ms: Option<u64>,
    pub best_effort: bool,
}

impl Default for ReducerConfig {
    fn default() -> Self {
        let p = ReduceParams::default();
        Self {
            scale: p.scale,
            max_pixels: p.max_pixels,
            deadline_ms: p.deadline_ms,
            best_effort: p.best_effort,
        }
    }
}

/// Complete, immutable configuration of a classification run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Acquisition window forwarded to the raster source
    pub date_range: DateRange,
    pub region: RegionConfig,
    /// Scene cloud threshold forwarded to the raster source
    pub max_cloud_percent: f64,
    pub texture: TextureConfig,
    pub pca: PcaConfig,
    pub mode: FeatureMode,
    /// Test-fraction threshold: a geometry trains when its draw exceeds it
    pub split_ratio: f64,
    /// Buffer around training geometries, in map units
    pub buffer_distance: f64,
    pub forest: ForestConfig,
    pub reducer: ReducerConfig,
    pub seed: u64,
    /// Feature property holding the class label
    pub label_property: String,
    /// Allowed class labels
    pub classes: Vec<i32>,
    pub spectral: SpectralBands,
    /// Output pixel size of the exported classification (default: native)
    pub export_scale: Option<f64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            date_range: DateRange::new("2023-06-12", "2024-06-12"),
            region: RegionConfig::Full,
            max_cloud_percent: 50.0,
            texture: TextureConfig::default(),
            pca: PcaConfig::default(),
            mode: FeatureMode::PixelBased,
            split_ratio: 0.3,
            buffer_distance: 10.0,
            forest: ForestConfig::default(),
            reducer: ReducerConfig::default(),
            seed: 42,
            label_property: "LULC".into(),
            classes: vec![0, 1],
            spectral: SpectralBands::default(),
            export_scale: None,
        }
    }
}

impl PipelineConfig {
    /// Parse a JSON configuration; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Check every option, naming the offending component and parameter
    pub fn validate(&self) -> Result<()> {
        self.date_range.validate()?;
        self.region.validate()?;
        if !(0.0..=100.0).contains(&self.max_cloud_percent) {
            return Err(Error::invalid_param("max_cloud_percent", self.max_cloud_percent, "must be within [0, 100]"));
        }
        if self.texture.window < 3 || self.texture.window % 2 == 0 {
            return Err(Error::invalid_param("texture.window", self.texture.window, "must be an odd integer >= 3"));
        }
        if self.pca.n_components == 0 {
            return Err(Error::invalid_param("pca.n_components", 0, "must be > 0"));
        }
        if let Some(scale) = self.pca.scale {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(Error::invalid_param("pca.scale", scale, "must be a positive number"));
            }
        }
        if !(self.pca.tolerance.is_finite() && self.pca.tolerance >= 0.0) {
            return Err(Error::invalid_param("pca.tolerance", self.pca.tolerance, "must be finite and >= 0"));
        }
        if let FeatureMode::ObjectBased(snic) = &self.mode {
            snic.validate()?;
        }
        if !(0.0..=1.0).contains(&self.split_ratio) {
            return Err(Error::invalid_param("split.ratio", self.split_ratio, "must be within [0, 1]"));
        }
        if !(self.buffer_distance.is_finite() && self.buffer_distance >= 0.0) {
            return Err(Error::invalid_param("split.buffer_distance", self.buffer_distance, "must be finite and >= 0"));
        }
        self.forest_params().validate()?;
        self.reduce_params(self.reducer.scale).validate()?;
        if self.label_property.is_empty() {
            return Err(Error::invalid_param("labels.property", "\"\"", "must name a feature property"));
        }
        if self.classes.is_empty() || self.classes.iter().any(|&c| c < 0) {
            return Err(Error::invalid_param("labels.classes", format!("{:?}", self.classes), "need one or more non-negative labels"));
        }
        if let Some(scale) = self.export_scale {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(Error::invalid_param("export.scale", scale, "must be a positive number"));
            }
        }
        Ok(())
    }

    /// Reducer parameters at a given nominal scale
    pub fn reduce_params(&self, scale: Option<f64>) -> ReduceParams {
        ReduceParams {
            scale,
            max_pixels: self.reducer.max_pixels,
            deadline_ms: self.reducer.deadline_ms,
            best_effort: self.reducer.best_effort,
            seed: self.seed,
        }
    }

    pub fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_trees: self.forest.n_trees,
            max_features: self.forest.max_features,
            max_depth: self.forest.max_depth,
            min_samples_leaf: self.forest.min_samples_leaf,
            seed: self.seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let c = PipelineConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.texture.window, 3);
        assert_eq!(c.pca.n_components, 1);
        assert_eq!(c.forest.n_trees, 50);
        assert_eq!(c.label_property, "LULC");
    }

    #[test]
    fn test_partial_json() {
        let c = PipelineConfig::from_json(
            r#"{
                "mode": {"type": "object_based", "seed_spacing": 5},
                "region": {"type": "bbox", "min_x": 0, "min_y": 0, "max_x": 100, "max_y": 50},
                "forest": {"n_trees": 10}
            }"#,
        )
        .unwrap();
        assert_eq!(c.forest.n_trees, 10);
        assert_eq!(c.split_ratio, 0.3);
        match &c.mode {
            FeatureMode::ObjectBased(snic) => {
                assert_eq!(snic.seed_spacing, 5);
                assert_eq!(snic.compactness, 1.0);
            }
            FeatureMode::PixelBased => panic!("expected object-based mode"),
        }
        assert!(matches!(c.region.region(), Region::Polygon(_)));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_roundtrip_json() {
        let c = PipelineConfig::default();
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(PipelineConfig::from_json(&json).unwrap(), c);
    }

    #[test]
    fn test_validation_names_parameter() {
        let cases: Vec<(PipelineConfig, &str)> = vec![
            (PipelineConfig { texture: TextureConfig { window: 4 }, ..Default::default() }, "texture.window"),
            (PipelineConfig { pca: PcaConfig { n_components: 0, ..Default::default() }, ..Default::default() }, "pca.n_components"),
            (PipelineConfig { split_ratio: 1.2, ..Default::default() }, "split.ratio"),
            (PipelineConfig { buffer_distance: -1.0, ..Default::default() }, "split.buffer_distance"),
            (PipelineConfig { max_cloud_percent: 120.0, ..Default::default() }, "max_cloud_percent"),
            (
                PipelineConfig { forest: ForestConfig { n_trees: 0, ..Default::default() }, ..Default::default() },
                "forest.n_trees",
            ),
            (
                PipelineConfig {
                    mode: FeatureMode::ObjectBased(SnicParams { seed_spacing: 0, ..Default::default() }),
                    ..Default::default()
                },
                "snic.seed_spacing",
            ),
            (
                PipelineConfig { reducer: ReducerConfig { max_pixels: 0, ..Default::default() }, ..Default::default() },
                "reducer.max_pixels",
            ),
            (
                PipelineConfig { date_range: DateRange::new("2024-06-12", "2023-06-12"), ..Default::default() },
                "date_range",
            ),
        ];
        for (config, expected) in cases {
            match config.validate() {
                Err(Error::InvalidParameter { name, .. }) => assert_eq!(name, expected),
                other => panic!("{}: expected InvalidParameter, got {:?}", expected, other),
            }
        }
    }

    #[test]
    fn test_bad_connectivity_is_rejected_at_parse() {
        let err = PipelineConfig::from_json(r#"{"mode": {"type": "object_based", "connectivity": 6}}"#);
        assert!(err.is_err());
    }
}
