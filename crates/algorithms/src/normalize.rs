//! Min-max feature normalization
//!
//! Rescales every band of a stack to `[0, 1]` using its minimum and maximum
//! over a region. Statistics may come from a best-effort subsample (see
//! [`ReduceParams`]), so out-of-range pixels are clamped.

use crate::maybe_rayon::*;
use crate::statistics::region::{min_max, ReduceParams, ReductionInfo, Region};
use bakau_core::raster::RasterStack;
use bakau_core::{Algorithm, Error, Result};
use tracing::debug;

/// Parameters for min-max normalization
#[derive(Debug, Clone, Default)]
pub struct NormalizeParams {
    /// Area over which min and max are estimated
    pub region: Region,
    pub reduce: ReduceParams,
}

/// Normalized stack plus the statistics used
#[derive(Debug, Clone)]
pub struct Normalized {
    pub stack: RasterStack,
    /// Per-band `(min, max)`, in band order
    pub ranges: Vec<(f64, f64)>,
    pub info: ReductionInfo,
}

/// Normalization stage of the pipeline
#[derive(Debug, Clone, Default)]
pub struct FeatureNormalizer;

impl Algorithm for FeatureNormalizer {
    type Input = RasterStack;
    type Output = Normalized;
    type Params = NormalizeParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "FeatureNormalizer"
    }

    fn description(&self) -> &'static str {
        "Per-band min-max rescaling to [0, 1] over a region"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        min_max_normalize(&input, &params.region, &params.reduce)
    }
}

/// Rescale every band to `[0, 1]` with its region min and max.
///
/// A band with `min == max` maps to 0 everywhere it has data; no-data stays
/// no-data.
pub fn min_max_normalize(stack: &RasterStack, region: &Region, reduce: &ReduceParams) -> Result<Normalized> {
    let stats = min_max(stack, region, reduce)?;
    let ranges: Vec<(f64, f64)> = stats.min.iter().copied().zip(stats.max.iter().copied()).collect();

    let bands: Vec<(String, _)> = stack
        .bands()
        .par_iter()
        .zip(ranges.par_iter())
        .map(|(band, &(min, max))| {
            let span = max - min;
            let mut raster = band.raster.clone();
            raster.data_mut().mapv_inplace(|v| {
                if v.is_nan() {
                    v
                } else if span <= 0.0 {
                    0.0
                } else {
                    ((v - min) / span).clamp(0.0, 1.0)
                }
            });
            (band.name.clone(), raster)
        })
        .collect();

    for (band, (min, max)) in bands.iter().zip(&ranges) {
        debug!(band = %band.0, min, max, "normalized");
    }

    Ok(Normalized {
        stack: RasterStack::from_bands(bands)?,
        ranges,
        info: stats.info,
    })
}
