//! Superpixel segmentation
//!
//! - **snic**: Simple Non-Iterative Clustering seeded on a regular grid
//!
//! A [`Segmentation`] carries the cluster-id band and the per-cluster means
//! of the segmented bands. Aggregating other stacks over the clusters goes
//! through [`Segmentation::aggregate`], which refuses a companion stack on a
//! different grid; use [`Segmentation::aligned_to`] to resample explicitly.

mod snic;

pub use snic::{snic, Connectivity, Segmenter, SnicParams};

use crate::statistics::zonal::zonal_mean_stack;
use bakau_core::raster::{Raster, RasterStack};
use bakau_core::Result;

/// Output of a segmentation run
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Cluster id per pixel, from 1; 0 is no-data or unreachable
    pub clusters: Raster<i32>,
    /// Per-cluster means of every segmented band, named `<band>_mean`
    pub means: RasterStack,
    pub n_clusters: usize,
}

impl Segmentation {
    /// Resample the cluster band onto the grid of `reference` (nearest neighbour)
    pub fn aligned_to(&self, reference: &RasterStack) -> Result<Segmentation> {
        let (rows, cols) = reference.shape();
        let clusters = self.clusters.resample_nearest(reference.transform(), rows, cols);
        let means = self
            .means
            .bands()
            .iter()
            .map(|b| (b.name.clone(), b.raster.resample_nearest(reference.transform(), rows, cols)))
            .collect::<Vec<_>>();

        Ok(Segmentation {
            clusters,
            means: RasterStack::from_bands(means)?,
            n_clusters: self.n_clusters,
        })
    }

    /// Per-cluster mean of every band of `companion`, broadcast to member pixels
    pub fn aggregate(&self, companion: &RasterStack) -> Result<RasterStack> {
        zonal_mean_stack(companion, &self.clusters)
    }
}
