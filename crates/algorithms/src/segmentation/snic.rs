//! Simple Non-Iterative Clustering (SNIC)
//!
//! Seeds are placed on a regular grid and clusters grow from them through a
//! single priority queue. A candidate pixel's priority is its distance to
//! the cluster that reached it:
//!
//! ```text
//! d² = |x - mean_k|² + compactness · |p - centroid_k|² / spacing²
//! ```
//!
//! where `x` are the band values and `p` the pixel position. Cluster means
//! and centroids are updated online as pixels join.
//!
//! Reference:
//! Achanta, R., & Süsstrunk, S. (2017). Superpixels and polygons using
//! simple non-iterative clustering. *CVPR 2017*, 4651–4660.

use super::Segmentation;
use crate::statistics::zonal::zonal_mean_stack;
use bakau_core::raster::{Neighborhood, RasterStack};
use bakau_core::{Algorithm, Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::debug;

/// Pixel connectivity used while growing clusters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Connectivity {
    Four,
    #[default]
    Eight,
}

impl TryFrom<u8> for Connectivity {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            4 => Ok(Connectivity::Four),
            8 => Ok(Connectivity::Eight),
            other => Err(format!("connectivity must be 4 or 8, got {}", other)),
        }
    }
}

impl From<Connectivity> for u8 {
    fn from(c: Connectivity) -> u8 {
        match c {
            Connectivity::Four => 4,
            Connectivity::Eight => 8,
        }
    }
}

impl Connectivity {
    fn neighborhood(self) -> Neighborhood {
        match self {
            Connectivity::Four => Neighborhood::Rook3x3,
            Connectivity::Eight => Neighborhood::Queen3x3,
        }
    }
}

/// Parameters for SNIC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnicParams {
    /// Seed grid spacing in pixels (default: 10)
    pub seed_spacing: usize,
    /// Weight of spatial against spectral distance (default: 1.0)
    pub compactness: f64,
    pub connectivity: Connectivity,
}

impl Default for SnicParams {
    fn default() -> Self {
        Self {
            seed_spacing: 10,
            compactness: 1.0,
            connectivity: Connectivity::Eight,
        }
    }
}

impl SnicParams {
    pub fn validate(&self) -> Result<()> {
        if self.seed_spacing == 0 {
            return Err(Error::invalid_param("snic.seed_spacing", 0, "must be > 0"));
        }
        if !(self.compactness.is_finite() && self.compactness >= 0.0) {
            return Err(Error::invalid_param("snic.compactness", self.compactness, "must be finite and >= 0"));
        }
        Ok(())
    }
}

/// A candidate pixel in the priority queue, ordered by distance (min-heap)
#[derive(Debug, Clone)]
struct Candidate {
    distance: f64,
    order: u64,
    row: usize,
    col: usize,
    cluster: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reverse ordering so BinaryHeap (max-heap) acts as a min-heap; ties pop
// in insertion order.
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// Running sums of one cluster
#[derive(Debug, Clone)]
struct Centroid {
    count: f64,
    row: f64,
    col: f64,
    values: Vec<f64>,
}

impl Centroid {
    fn new(n_bands: usize) -> Self {
        Self {
            count: 0.0,
            row: 0.0,
            col: 0.0,
            values: vec![0.0; n_bands],
        }
    }

    fn add(&mut self, row: usize, col: usize, pixel: &[f64]) {
        self.count += 1.0;
        self.row += row as f64;
        self.col += col as f64;
        for (s, v) in self.values.iter_mut().zip(pixel) {
            *s += v;
        }
    }

    fn distance2(&self, row: usize, col: usize, pixel: &[f64], spatial_weight: f64) -> f64 {
        let spectral: f64 = self
            .values
            .iter()
            .zip(pixel)
            .map(|(s, v)| {
                let d = v - s / self.count;
                d * d
            })
            .sum();
        let dr = row as f64 - self.row / self.count;
        let dc = col as f64 - self.col / self.count;
        spectral + spatial_weight * (dr * dr + dc * dc)
    }
}

/// SNIC segmentation stage
#[derive(Debug, Clone, Default)]
pub struct Segmenter;

impl Algorithm for Segmenter {
    type Input = RasterStack;
    type Output = Segmentation;
    type Params = SnicParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Segmenter"
    }

    fn description(&self) -> &'static str {
        "SNIC superpixels seeded on a regular grid, with per-cluster band means"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        snic(&input, &params)
    }
}

/// Grid seed positions along an axis of length `len`
fn seed_positions(len: usize, spacing: usize) -> Vec<usize> {
    if spacing / 2 < len {
        (spacing / 2..len).step_by(spacing).collect()
    } else if len > 0 {
        vec![len / 2]
    } else {
        Vec::new()
    }
}

/// Segment a stack into superpixels.
///
/// Seeds sit at `spacing / 2 + i * spacing` in both axes; an axis too short
/// for that grid gets one seed at its centre. Seeds on no-data pixels are
/// skipped. Pixels with no-data in any band are never assigned.
pub fn snic(stack: &RasterStack, params: &SnicParams) -> Result<Segmentation> {
    params.validate()?;
    let template = stack.template()?;
    let (rows, cols) = stack.shape();
    let n_bands = stack.len();
    let spacing = params.seed_spacing;
    let spatial_weight = params.compactness / (spacing * spacing) as f64;
    let neighborhood = params.connectivity.neighborhood();

    let mut labels = vec![0i32; rows * cols];
    let mut centroids: Vec<Centroid> = Vec::new();
    let mut heap = BinaryHeap::new();
    let mut order = 0u64;
    let mut pixel = Vec::with_capacity(n_bands);

    let seed_cols = seed_positions(cols, spacing);
    for row in seed_positions(rows, spacing) {
        for &col in &seed_cols {
            if !stack.pixel(row, col, &mut pixel) {
                continue;
            }
            heap.push(Candidate { distance: 0.0, order, row, col, cluster: centroids.len() });
            order += 1;
            centroids.push(Centroid::new(n_bands));
        }
    }

    if centroids.is_empty() {
        return Err(Error::EmptyFeatureSet("snic: no seed falls on a valid pixel".into()));
    }

    while let Some(Candidate { row, col, cluster, .. }) = heap.pop() {
        let idx = row * cols + col;
        if labels[idx] != 0 {
            continue;
        }
        if !stack.pixel(row, col, &mut pixel) {
            continue;
        }
        labels[idx] = cluster as i32 + 1;
        centroids[cluster].add(row, col, &pixel);

        for (nr, nc) in neighborhood.neighbors(row, col, rows, cols) {
            if labels[nr * cols + nc] != 0 || !stack.pixel(nr, nc, &mut pixel) {
                continue;
            }
            let distance = centroids[cluster].distance2(nr, nc, &pixel, spatial_weight);
            heap.push(Candidate { distance, order, row: nr, col: nc, cluster });
            order += 1;
        }
    }

    let n_clusters = centroids.len();
    let clusters = template.derive(labels, Some(0))?;
    debug!(n_clusters, spacing, compactness = params.compactness, "snic segmentation");

    let means = zonal_mean_stack(stack, &clusters)?;
    Ok(Segmentation { clusters, means, n_clusters })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use bakau_core::{GeoTransform, Raster};

    fn band(rows: usize, cols: usize, f: impl Fn(usize, usize) -> f64) -> Raster<f64> {
        let mut r = Raster::new(rows, cols);
        r.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        for row in 0..rows {
            for col in 0..cols {
                r.set(row, col, f(row, col)).unwrap();
            }
        }
        r
    }

    fn halves() -> RasterStack {
        RasterStack::from_bands([("b", band(8, 8, |_, c| if c < 4 { 0.0 } else { 1.0 }))]).unwrap()
    }

    #[test]
    fn test_small_raster_gets_centre_seed() {
        let stack = RasterStack::from_bands([("b", band(2, 3, |r, c| (r + c) as f64))]).unwrap();
        let seg = snic(&stack, &SnicParams { seed_spacing: 10, ..Default::default() }).unwrap();
        assert_eq!(seg.n_clusters, 1);
        assert!(seg.clusters.data().iter().all(|&id| id == 1));
    }

    #[test]
    fn test_seed_positions() {
        assert_eq!(seed_positions(10, 4), vec![2, 6]);
        assert_eq!(seed_positions(3, 10), vec![1]);
        assert_eq!(seed_positions(12, 10), vec![5]);
        assert!(seed_positions(0, 10).is_empty());
    }

    #[test]
    fn test_every_valid_pixel_is_assigned() {
        let seg = snic(&halves(), &SnicParams { seed_spacing: 4, ..Default::default() }).unwrap();
        assert_eq!(seg.n_clusters, 4);
        assert!(seg.clusters.data().iter().all(|&id| id >= 1 && id <= 4));
    }

    #[test]
    fn test_clusters_respect_spectral_edge() {
        let params = SnicParams { seed_spacing: 4, compactness: 0.0, connectivity: Connectivity::Four };
        let seg = snic(&halves(), &params).unwrap();
        let m = seg.means.band("b_mean").unwrap();
        for row in 0..8 {
            for col in 0..8 {
                let expected = if col < 4 { 0.0 } else { 1.0 };
                assert_relative_eq!(m.get(row, col).unwrap(), expected);
            }
        }
    }

    #[test]
    fn test_nodata_is_unassigned() {
        let mut b = band(6, 6, |_, _| 1.0);
        b.set(1, 1, f64::NAN).unwrap();
        b.set(5, 5, f64::NAN).unwrap();
        let stack = RasterStack::from_bands([("b", b)]).unwrap();
        // Spacing 3: seeds at (1,1) [skipped], (1,4), (4,1), (4,4)
        let seg = snic(&stack, &SnicParams { seed_spacing: 3, ..Default::default() }).unwrap();
        assert_eq!(seg.n_clusters, 3);
        assert_eq!(seg.clusters.get(1, 1).unwrap(), 0);
        assert_eq!(seg.clusters.get(5, 5).unwrap(), 0);
        assert!(seg.means.band("b_mean").unwrap().get(1, 1).unwrap().is_nan());
    }

    #[test]
    fn test_deterministic() {
        let stack = RasterStack::from_bands([("b", band(9, 9, |r, c| ((r * 5 + c * 3) % 7) as f64))]).unwrap();
        let a = snic(&stack, &SnicParams { seed_spacing: 3, ..Default::default() }).unwrap();
        let b = snic(&stack, &SnicParams { seed_spacing: 3, ..Default::default() }).unwrap();
        assert_eq!(a.clusters.data(), b.clusters.data());
    }

    #[test]
    fn test_aligned_to_and_aggregate() {
        let seg = snic(&halves(), &SnicParams { seed_spacing: 4, compactness: 0.0, ..Default::default() }).unwrap();

        // Companion on a coarser grid is refused until aligned
        let mut coarse = band(4, 4, |_, c| c as f64);
        coarse.set_transform(GeoTransform::new(0.0, 8.0, 2.0, -2.0));
        let companion = RasterStack::from_bands([("f", coarse)]).unwrap();
        assert!(matches!(seg.aggregate(&companion), Err(Error::SizeMismatch { .. })));

        let aligned = seg.aligned_to(&companion).unwrap();
        assert_eq!(aligned.clusters.shape(), (4, 4));
        let agg = aligned.aggregate(&companion).unwrap();
        assert_eq!(agg.band_names(), vec!["f_mean"]);
    }

    #[test]
    fn test_connectivity_serde() {
        let p: SnicParams = serde_json::from_str(r#"{"seed_spacing": 5, "connectivity": 4}"#).unwrap();
        assert_eq!(p.connectivity, Connectivity::Four);
        assert_eq!(p.compactness, 1.0);
        assert!(serde_json::from_str::<SnicParams>(r#"{"connectivity": 6}"#).is_err());
    }
}
