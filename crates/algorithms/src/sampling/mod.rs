//! Train/test partitioning and sample extraction
//!
//! Geometries are split by one seeded uniform draw each: a draw `u > ratio`
//! routes the geometry to training, anything else to testing. `ratio` is
//! therefore the test-fraction threshold; about `1 - ratio` of the
//! geometries train.
//!
//! Training geometries are sampled with a buffer distance, test geometries
//! without, so held-out pixels stay close to their labeled footprint.

mod coverage;

pub use coverage::covered_pixels;

use crate::maybe_rayon::*;
use bakau_core::raster::RasterStack;
use bakau_core::{Error, LabelCollection, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Geometry indices routed to each side of the split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// One labeled feature vector
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub features: Vec<f64>,
    pub label: i32,
    /// Index of the originating geometry in its collection
    pub source: usize,
}

/// Samples sharing one band layout
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SampleSet {
    pub band_names: Vec<String>,
    pub samples: Vec<Sample>,
}

impl SampleSet {
    pub fn new(band_names: Vec<String>, samples: Vec<Sample>) -> Self {
        Self { band_names, samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Labels in sample order
    pub fn labels(&self) -> Vec<i32> {
        self.samples.iter().map(|s| s.label).collect()
    }

    /// Distinct geometry indices that produced samples
    pub fn sources(&self) -> Vec<usize> {
        let mut s: Vec<usize> = self.samples.iter().map(|s| s.source).collect();
        s.dedup();
        s
    }
}

/// Assign every geometry to train or test.
///
/// One `StdRng::seed_from_u64(seed)` draw per geometry, in collection order;
/// `u > ratio` goes to train. The same seed always yields the same split.
pub fn split_geometries(labels: &LabelCollection, ratio: f64, seed: u64) -> Result<Split> {
    if !(0.0..=1.0).contains(&ratio) {
        return Err(Error::invalid_param("split.ratio", ratio, "must be within [0, 1]"));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut split = Split { train: Vec::new(), test: Vec::new() };
    for index in 0..labels.len() {
        let u: f64 = rng.gen();
        if u > ratio {
            split.train.push(index);
        } else {
            split.test.push(index);
        }
    }

    debug!(train = split.train.len(), test = split.test.len(), ratio, "geometry split");
    Ok(split)
}

/// Sample `stack` at every pixel covered by the selected geometries.
///
/// Pixels with no-data in any band are skipped. Samples are ordered by
/// geometry (in `indices` order), then row-major.
pub fn extract_samples(stack: &RasterStack, labels: &LabelCollection, indices: &[usize], buffer: f64) -> Result<SampleSet> {
    if !(buffer.is_finite() && buffer >= 0.0) {
        return Err(Error::invalid_param("split.buffer_distance", buffer, "must be finite and >= 0"));
    }
    let (rows, cols) = stack.shape();
    let transform = stack.transform();

    let per_geometry: Vec<Vec<Sample>> = indices
        .par_iter()
        .map(|&index| {
            let Some(feature) = labels.get(index) else {
                return Vec::new();
            };
            let mut pixel = Vec::with_capacity(stack.len());
            covered_pixels(&feature.geometry, &transform, rows, cols, buffer)
                .into_iter()
                .filter_map(|(row, col)| {
                    stack.pixel(row, col, &mut pixel).then(|| Sample {
                        features: pixel.clone(),
                        label: feature.label,
                        source: index,
                    })
                })
                .collect()
        })
        .collect();

    Ok(SampleSet::new(stack.band_names(), per_geometry.into_iter().flatten().collect()))
}

/// Draw the training samples (buffered) from `train_stack` and the test
/// samples from `test_stack`.
///
/// Fails with `EmptyFeatureSet` if either side ends up with no sample.
pub fn sample_regions(
    train_stack: &RasterStack,
    test_stack: &RasterStack,
    labels: &LabelCollection,
    split: &Split,
    buffer: f64,
) -> Result<(SampleSet, SampleSet)> {
    let train = extract_samples(train_stack, labels, &split.train, buffer)?;
    let test = extract_samples(test_stack, labels, &split.test, 0.0)?;

    if train.is_empty() {
        return Err(Error::EmptyFeatureSet(format!(
            "training split ({} geometries) produced no valid sample",
            split.train.len()
        )));
    }
    if test.is_empty() {
        return Err(Error::EmptyFeatureSet(format!(
            "test split ({} geometries) produced no valid sample",
            split.test.len()
        )));
    }

    debug!(train = train.len(), test = test.len(), buffer, "samples extracted");
    Ok((train, test))
}
