//! End-to-end classification pipeline
//!
//! One [`Pipeline`] owns an immutable [`PipelineConfig`]. Each scene (train,
//! test, classify) is turned into a feature stack independently:
//!
//! ```text
//! scene ─► texture ─► min-max normalize ─► PCA ─┬─► scene bands ++ pc*          (pixel-based)
//!                                               └─► SNIC means of pc* and bands (object-based)
//! ```
//!
//! Labeled geometries are split once, sampled from the train and test
//! feature stacks, and a random forest is trained and evaluated on them
//! before the classify scene is predicted.

mod config;

pub use config::{
    FeatureMode, ForestConfig, PcaConfig, PipelineConfig, ReducerConfig, RegionConfig, TextureConfig,
};

use crate::classification::{
    pca, AccuracyReport, ClassifierModel, DegeneratePolicy, PcaParams, PcaResult, RandomForest,
};
use crate::normalize::min_max_normalize;
use crate::sampling::{sample_regions, split_geometries, SampleSet};
use crate::segmentation::{snic, Segmentation};
use crate::statistics::region::Region;
use crate::texture::{texture_features, TextureParams};
use bakau_core::io::{RasterSink, RasterSource, SceneQuery};
use bakau_core::raster::{GeoTransform, Raster, RasterStack};
use bakau_core::{Error, LabelCollection, Result};
use std::time::Instant;
use tracing::{debug, info};

/// One value per scene role
#[derive(Debug, Clone, PartialEq)]
pub struct Scenes<T> {
    pub train: T,
    pub test: T,
    pub classify: T,
}

impl<T> Scenes<T> {
    pub fn new(train: T, test: T, classify: T) -> Self {
        Self { train, test, classify }
    }

    /// The same value for all three roles
    pub fn uniform(value: T) -> Self
    where
        T: Clone,
    {
        Self::new(value.clone(), value.clone(), value)
    }

    /// Apply a fallible function to each role, in train, test, classify order
    pub fn try_map<U, F>(&self, mut f: F) -> Result<Scenes<U>>
    where
        F: FnMut(&str, &T) -> Result<U>,
    {
        Ok(Scenes {
            train: f("train", &self.train)?,
            test: f("test", &self.test)?,
            classify: f("classify", &self.classify)?,
        })
    }
}

/// Derived layers of one scene
#[derive(Debug, Clone)]
pub struct SceneFeatures {
    /// Classifier inputs, in feature order
    pub features: RasterStack,
    /// Normalized GLCM bands
    pub texture: RasterStack,
    /// Per texture band `(min, max)` used for normalization
    pub texture_ranges: Vec<(f64, f64)>,
    pub pca: PcaResult,
    /// Present in object-based mode only
    pub segmentation: Option<Segmentation>,
}

/// Everything a run produces
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub feature_names: Vec<String>,
    pub model: ClassifierModel,
    /// Resubstitution accuracy on the training samples
    pub train_accuracy: AccuracyReport,
    /// Accuracy on the held-out test samples
    pub test_accuracy: AccuracyReport,
    /// Class per pixel of the classify scene, no-data `CLASS_NODATA`
    pub classified: Raster<i32>,
    pub test_samples: SampleSet,
    pub scene_features: Scenes<SceneFeatures>,
}

/// Configured classification pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    region: Region,
}

impl Pipeline {
    /// Validate `config` and build the pipeline
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let region = config.region.region();
        Ok(Self { config, region })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Query forwarding the acquisition window, region and cloud threshold
    pub fn scene_query(&self, scene: &str, bands: &[String]) -> SceneQuery {
        SceneQuery {
            date_range: Some(self.config.date_range.clone()),
            region: self.config.region.polygon(),
            max_cloud_percent: Some(self.config.max_cloud_percent),
            ..SceneQuery::new(scene, bands)
        }
    }

    /// Load the three scenes from `source`
    pub fn load_scenes(&self, source: &dyn RasterSource, names: &Scenes<String>, bands: &[String]) -> Result<Scenes<RasterStack>> {
        names.try_map(|role, scene| {
            let stack = source.load(&self.scene_query(scene, bands))?;
            info!(role, scene = %scene, bands = stack.len(), shape = ?stack.shape(), "scene loaded");
            Ok(stack)
        })
    }

    /// Texture, normalization, PCA and (object-based) segmentation of one scene
    pub fn scene_features(&self, scene: &RasterStack) -> Result<SceneFeatures> {
        let config = &self.config;

        let texture_params = TextureParams {
            window: config.texture.window,
            bands: config.spectral.clone(),
        };
        let texture = texture_features(scene, &texture_params)?;

        let normalized = min_max_normalize(&texture, &self.region, &config.reduce_params(config.reducer.scale))?;
        debug!(ranges = ?normalized.ranges, approximate = normalized.info.approximate, "texture normalized");

        let pca_params = PcaParams {
            n_components: config.pca.n_components,
            region: self.region.clone(),
            reduce: config.reduce_params(config.pca.scale),
            tolerance: config.pca.tolerance,
            degenerate: config.pca.degenerate,
        };
        let pca = pca(&normalized.stack, &pca_params)?;
        ensure_nondegenerate(&pca, config.pca.n_components, config.pca.degenerate)?;

        let (features, segmentation) = match &config.mode {
            FeatureMode::PixelBased => (scene.clone().concat(pca.components.clone())?, None),
            FeatureMode::ObjectBased(snic_params) => {
                let segmentation = snic(scene, snic_params)?.aligned_to(&pca.components)?;
                let features = segmentation
                    .aggregate(&pca.components)?
                    .concat(segmentation.means.clone())?;
                (features, Some(segmentation))
            }
        };

        Ok(SceneFeatures {
            features,
            texture: normalized.stack,
            texture_ranges: normalized.ranges,
            pca,
            segmentation,
        })
    }

    /// Run the whole pipeline on already loaded scenes
    pub fn run(&self, scenes: &Scenes<RasterStack>, labels: &LabelCollection) -> Result<PipelineOutput> {
        let config = &self.config;
        let start = Instant::now();

        let scene_features = scenes.try_map(|role, scene| {
            let features = self.scene_features(scene)?;
            info!(role, features = features.features.len(), "scene features computed");
            Ok(features)
        })?;
        let feature_names = feature_layout(
            &scene_features.train.features,
            [
                ("test", &scene_features.test.features),
                ("classify", &scene_features.classify.features),
            ],
        )?;

        let split = split_geometries(labels, config.split_ratio, config.seed)?;
        let (train, test) = sample_regions(
            &scene_features.train.features,
            &scene_features.test.features,
            labels,
            &split,
            config.buffer_distance,
        )?;
        info!(train = train.len(), test = test.len(), "samples extracted");

        let model = RandomForest::train(&feature_names, &train, &config.forest_params())?;
        let train_accuracy = model.training_accuracy()?;
        let test_accuracy = model.test_accuracy(&test)?;
        info!(
            train = train_accuracy.accuracy(),
            test = test_accuracy.accuracy(),
            trees = model.n_trees(),
            "model evaluated"
        );

        let classified = model.predict_raster(&scene_features.classify.features)?;
        info!(elapsed_ms = start.elapsed().as_millis() as u64, "classification complete");

        Ok(PipelineOutput {
            feature_names,
            model,
            train_accuracy,
            test_accuracy,
            classified,
            test_samples: test,
            scene_features,
        })
    }

    /// Write the classified raster as `name` at the export scale
    pub fn write(&self, output: &PipelineOutput, sink: &dyn RasterSink, name: &str) -> Result<()> {
        let native = output.classified.cell_size();
        let scale = self.config.export_scale.unwrap_or(native);
        let raster = resample_to_scale(&output.classified, scale);
        info!(name, scale, "writing classification");
        sink.write_labels(name, &raster, scale, raster.crs())
    }
}

/// Reject retained components that carry no variance.
///
/// Under `NoData` such a component would be an all-NaN feature band and
/// every pixel would count as no-data downstream.
fn ensure_nondegenerate(pca: &PcaResult, n_components: usize, policy: DegeneratePolicy) -> Result<()> {
    if policy == DegeneratePolicy::Drop {
        return Ok(());
    }
    match pca.eigenvalues.iter().take(n_components).position(|&ev| ev == 0.0) {
        Some(c) => Err(Error::NumericalInstability(format!(
            "pca: component {} is degenerate (zero variance over the region)",
            PcaResult::component_name(c)
        ))),
        None => Ok(()),
    }
}

/// Feature band names shared by every scene.
///
/// Dropped PCA components can differ between scenes; the model needs one
/// layout.
fn feature_layout(train: &RasterStack, others: [(&str, &RasterStack); 2]) -> Result<Vec<String>> {
    let names = train.band_names();
    for (role, stack) in others {
        let other = stack.band_names();
        if other != names {
            return Err(Error::NumericalInstability(format!(
                "pca: {} scene features {:?} differ from train features {:?}",
                role, other, names
            )));
        }
    }
    Ok(names)
}

/// Nearest-neighbour resample onto a north-up grid of pixel size `scale`
/// covering the same extent.
pub fn resample_to_scale<T: bakau_core::RasterElement>(raster: &Raster<T>, scale: f64) -> Raster<T> {
    let t = raster.transform();
    let (w, h) = (t.pixel_width.abs(), t.pixel_height.abs());
    if (w - scale).abs() <= 1e-9 * scale && (h - scale).abs() <= 1e-9 * scale {
        return raster.clone();
    }
    let rows = ((raster.rows() as f64 * h) / scale).ceil().max(1.0) as usize;
    let cols = ((raster.cols() as f64 * w) / scale).ceil().max(1.0) as usize;
    let target = GeoTransform::new(
        t.origin_x,
        t.origin_y,
        scale.copysign(t.pixel_width),
        scale.copysign(t.pixel_height),
    );
    raster.resample_nearest(target, rows, cols)
}
