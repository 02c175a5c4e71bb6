//! End-to-end runs on a synthetic 10×10 Sentinel-2-like scene.
//!
//! The left half (columns 0-4) is mangrove: high NIR, low red. The right half
//! is non-mangrove. Both classes share the same grayscale composite, so the
//! texture bands (and the principal component built on them) carry no class
//! signal and the spectral bands decide. Every pixel carries a small labeled
//! square around its center, so both halves are sampled on every side of the
//! split.

use bakau_algorithms::classification::AccuracyKind;
use bakau_algorithms::pipeline::{FeatureMode, ForestConfig, Pipeline, PipelineConfig, Scenes};
use bakau_algorithms::segmentation::SnicParams;
use bakau_core::io::RasterSink;
use bakau_core::raster::{GeoTransform, Raster, RasterStack};
use bakau_core::{Error, LabelCollection, LabeledGeometry, CRS};
use geo::{LineString, Polygon};
use std::sync::Mutex;

const SIZE: usize = 10;
const CELL: f64 = 10.0;

fn is_mangrove(col: usize) -> bool {
    col < SIZE / 2
}

/// (B8, B4, B3, B11) reflectance of each class; grayscale is ~0.1282 for both
fn reflectance(mangrove: bool) -> [f64; 4] {
    if mangrove {
        [0.35, 0.03, 0.05, 0.12]
    } else {
        [0.10, 0.1478, 0.10, 0.25]
    }
}

fn scene(jitter_seed: usize) -> RasterStack {
    let names = ["B8", "B4", "B3", "B11"];
    let mut bands = Vec::new();
    for (b, name) in names.iter().enumerate() {
        let mut r = Raster::new(SIZE, SIZE);
        r.set_transform(GeoTransform::new(0.0, SIZE as f64 * CELL, CELL, -CELL));
        for row in 0..SIZE {
            for col in 0..SIZE {
                let jitter = ((row * 7 + col * 3 + b + jitter_seed) % 5) as f64 * 0.002;
                r.set(row, col, reflectance(is_mangrove(col))[b] + jitter).unwrap();
            }
        }
        bands.push((*name, r));
    }
    RasterStack::from_bands(bands).unwrap()
}

fn scenes() -> Scenes<RasterStack> {
    Scenes::new(scene(0), scene(1), scene(2))
}

/// A 4 m square around every pixel center, labeled by half
fn labels() -> LabelCollection {
    let mut features = Vec::new();
    for row in 0..SIZE {
        for col in 0..SIZE {
            let x = col as f64 * CELL + 5.0;
            let y = SIZE as f64 * CELL - (row as f64 * CELL + 5.0);
            let square = Polygon::new(
                LineString::from(vec![
                    (x - 2.0, y - 2.0),
                    (x + 2.0, y - 2.0),
                    (x + 2.0, y + 2.0),
                    (x - 2.0, y + 2.0),
                    (x - 2.0, y - 2.0),
                ]),
                vec![],
            );
            features.push(LabeledGeometry::new(square, is_mangrove(col) as i32));
        }
    }
    LabelCollection::new(features, Some(&[0, 1])).unwrap()
}

fn config(mode: FeatureMode) -> PipelineConfig {
    PipelineConfig {
        mode,
        buffer_distance: 5.0,
        forest: ForestConfig {
            n_trees: 10,
            ..Default::default()
        },
        seed: 7,
        ..Default::default()
    }
}

fn object_mode() -> FeatureMode {
    FeatureMode::ObjectBased(SnicParams {
        seed_spacing: 2,
        compactness: 0.0,
        ..Default::default()
    })
}

#[test]
fn pixel_based_separates_classes() {
    let pipeline = Pipeline::new(config(FeatureMode::PixelBased)).unwrap();
    let out = pipeline.run(&scenes(), &labels()).unwrap();

    assert_eq!(out.feature_names, vec!["B8", "B4", "B3", "B11", "pc1"]);
    assert_eq!(out.train_accuracy.kind, AccuracyKind::Training);
    assert_eq!(out.test_accuracy.kind, AccuracyKind::Test);
    assert!(out.test_accuracy.accuracy() >= 0.9, "{}", out.test_accuracy);
    assert_eq!(out.test_accuracy.matrix.errors(), 0, "{}", out.test_accuracy);
    assert!(out.test_samples.len() > 0);

    for row in 0..SIZE {
        for col in 0..SIZE {
            assert_eq!(out.classified.get(row, col).unwrap(), is_mangrove(col) as i32, "pixel ({}, {})", row, col);
        }
    }
    assert!(out.scene_features.train.segmentation.is_none());
    assert_eq!(out.scene_features.classify.texture.len(), 4);
}

#[test]
fn object_based_separates_classes() {
    let pipeline = Pipeline::new(config(object_mode())).unwrap();
    let out = pipeline.run(&scenes(), &labels()).unwrap();

    assert_eq!(out.feature_names, vec!["pc1_mean", "B8_mean", "B4_mean", "B3_mean", "B11_mean"]);
    assert!(out.test_accuracy.accuracy() >= 0.9, "{}", out.test_accuracy);
    assert_eq!(out.test_accuracy.matrix.errors(), 0, "{}", out.test_accuracy);

    let segmentation = out.scene_features.classify.segmentation.as_ref().unwrap();
    assert!(segmentation.n_clusters > 1);
    // Clusters never straddle the class edge
    for row in 0..SIZE {
        for col in 0..SIZE {
            let id = segmentation.clusters.get(row, col).unwrap();
            for c in 0..SIZE {
                if is_mangrove(c) != is_mangrove(col) {
                    for r in 0..SIZE {
                        assert_ne!(segmentation.clusters.get(r, c).unwrap(), id);
                    }
                }
            }
        }
    }
}

#[test]
fn same_seed_same_result() {
    for mode in [FeatureMode::PixelBased, object_mode()] {
        let a = Pipeline::new(config(mode.clone())).unwrap().run(&scenes(), &labels()).unwrap();
        let b = Pipeline::new(config(mode)).unwrap().run(&scenes(), &labels()).unwrap();
        assert_eq!(a.classified.data(), b.classified.data());
        assert_eq!(a.train_accuracy, b.train_accuracy);
        assert_eq!(a.test_accuracy, b.test_accuracy);
        assert_eq!(a.test_samples, b.test_samples);
    }
}

#[test]
fn missing_spectral_band_is_reported() {
    let partial = scene(0).select(&["B8", "B4", "B11"]).unwrap();
    let scenes = Scenes::uniform(partial);
    let pipeline = Pipeline::new(config(FeatureMode::PixelBased)).unwrap();
    match pipeline.run(&scenes, &labels()) {
        Err(Error::MissingBand { band, .. }) => assert_eq!(band, "B3"),
        other => panic!("expected MissingBand, got {:?}", other.map(|o| o.feature_names)),
    }
}

#[derive(Default)]
struct MemorySink {
    written: Mutex<Vec<(String, (usize, usize), f64)>>,
}

impl RasterSink for MemorySink {
    fn write_labels(&self, name: &str, raster: &Raster<i32>, scale: f64, _crs: Option<&CRS>) -> bakau_core::Result<()> {
        self.written.lock().unwrap().push((name.to_string(), raster.shape(), scale));
        Ok(())
    }

    fn write_stack(&self, name: &str, stack: &RasterStack, scale: f64, _crs: Option<&CRS>) -> bakau_core::Result<()> {
        self.written.lock().unwrap().push((name.to_string(), stack.shape(), scale));
        Ok(())
    }
}

#[test]
fn export_resamples_to_scale() {
    let mut cfg = config(FeatureMode::PixelBased);
    cfg.export_scale = Some(20.0);
    let pipeline = Pipeline::new(cfg).unwrap();
    let out = pipeline.run(&scenes(), &labels()).unwrap();

    let sink = MemorySink::default();
    pipeline.write(&out, &sink, "classified").unwrap();
    let written = sink.written.lock().unwrap();
    assert_eq!(written.as_slice(), &[("classified".to_string(), (5, 5), 20.0)]);
}
