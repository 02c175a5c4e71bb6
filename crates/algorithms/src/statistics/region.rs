//! Region-wide reducers
//!
//! Every reducer visits the pixels of a [`Region`] that hold valid data in
//! all bands of a stack. Large regions can be reduced approximately:
//!
//! - `scale` sets a sampling stride of `round(scale / cell_size)` pixels in
//!   both axes (the nominal scale of the reduction).
//! - When more than `max_pixels` candidates remain and `best_effort` is set,
//!   a seeded uniform random subsample of exactly `max_pixels` pixels is
//!   reduced instead. The error of the estimate is that of a simple random
//!   sample of that size.
//! - With a `deadline_ms`, pixels are visited in seeded random order in
//!   chunks of [`CHUNK`]; once the deadline passes, best-effort reducers
//!   return statistics over the pixels visited so far, otherwise the call
//!   fails with `DeadlineExceeded`.
//!
//! Results carry a [`ReductionInfo`] saying whether they are approximate.

use bakau_core::raster::RasterStack;
use bakau_core::{Error, Result};
use geo::{BoundingRect, Contains, Point, Polygon};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Pixels visited between deadline checks
pub const CHUNK: usize = 4096;

/// Area over which statistics are estimated
#[derive(Debug, Clone, Default)]
pub enum Region {
    /// Every pixel of the raster
    #[default]
    Full,
    /// Pixels whose centers fall inside the polygon
    Polygon(Polygon<f64>),
}

impl Region {
    /// Row-major membership mask over the stack's grid
    pub fn mask(&self, stack: &RasterStack) -> Vec<bool> {
        let (rows, cols) = stack.shape();
        match self {
            Region::Full => vec![true; rows * cols],
            Region::Polygon(polygon) => {
                let mut mask = vec![false; rows * cols];
                let Some(rect) = polygon.bounding_rect() else {
                    return mask;
                };
                let transform = stack.transform();

                for row in 0..rows {
                    for col in 0..cols {
                        let (x, y) = transform.pixel_to_geo(col, row);
                        if x < rect.min().x || x > rect.max().x || y < rect.min().y || y > rect.max().y {
                            continue;
                        }
                        mask[row * cols + col] = polygon.contains(&Point::new(x, y));
                    }
                }
                mask
            }
        }
    }
}

/// Controls how exhaustively a region is reduced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReduceParams {
    /// Nominal pixel scale of the reduction in map units (default: native)
    pub scale: Option<f64>,
    /// Maximum number of pixels reduced (default: 10 000 000)
    pub max_pixels: usize,
    /// Wall-clock budget for one reduction, in milliseconds
    pub deadline_ms: Option<u64>,
    /// Degrade to approximate statistics instead of failing (default: true)
    pub best_effort: bool,
    /// Seed for subsampling and visiting order
    pub seed: u64,
}

impl Default for ReduceParams {
    fn default() -> Self {
        Self {
            scale: None,
            max_pixels: 10_000_000,
            deadline_ms: None,
            best_effort: true,
            seed: 42,
        }
    }
}

impl ReduceParams {
    pub fn validate(&self) -> Result<()> {
        if let Some(scale) = self.scale {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(Error::invalid_param("reducer.scale", scale, "must be a positive number"));
            }
        }
        if self.max_pixels == 0 {
            return Err(Error::invalid_param("reducer.max_pixels", 0, "must be > 0"));
        }
        Ok(())
    }
}

/// How a reduction was carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReductionInfo {
    /// Valid in-region pixels on the sampling stride
    pub candidate_pixels: usize,
    /// Pixels actually reduced
    pub pixels_used: usize,
    /// True when `pixels_used < candidate_pixels`
    pub approximate: bool,
}

/// Per-band minimum and maximum
#[derive(Debug, Clone)]
pub struct MinMax {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
    pub info: ReductionInfo,
}

/// Per-band mean
#[derive(Debug, Clone)]
pub struct BandMeans {
    pub means: Vec<f64>,
    pub info: ReductionInfo,
}

/// Band-to-band covariance of mean-centered values
#[derive(Debug, Clone)]
pub struct Covariance {
    /// P x P symmetric matrix, unbiased (n - 1) estimator
    pub matrix: Array2<f64>,
    /// Per-band means the data was centered on
    pub means: Vec<f64>,
    pub info: ReductionInfo,
}

/// Flat pixel indices chosen for a reduction
struct PixelPlan {
    indices: Vec<usize>,
    candidate_pixels: usize,
}

fn plan(stack: &RasterStack, region: &Region, params: &ReduceParams, operation: &'static str) -> Result<PixelPlan> {
    params.validate()?;
    let template = stack.template()?;
    let (rows, cols) = stack.shape();

    let stride = params
        .scale
        .map(|s| (s / template.cell_size()).round().max(1.0) as usize)
        .unwrap_or(1);

    let mask = region.mask(stack);
    let mut pixel = Vec::with_capacity(stack.len());
    let mut indices = Vec::new();
    for row in (0..rows).step_by(stride) {
        for col in (0..cols).step_by(stride) {
            let idx = row * cols + col;
            if mask[idx] && stack.pixel(row, col, &mut pixel) {
                indices.push(idx);
            }
        }
    }

    let candidate_pixels = indices.len();
    if candidate_pixels == 0 {
        return Err(Error::EmptyFeatureSet(format!("{}: region holds no valid pixels", operation)));
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    if candidate_pixels > params.max_pixels {
        if !params.best_effort {
            return Err(Error::invalid_param(
                "reducer.max_pixels",
                params.max_pixels,
                format!("{} has {} candidate pixels; enable best_effort or raise the cap", operation, candidate_pixels),
            ));
        }
        indices = rand::seq::index::sample(&mut rng, candidate_pixels, params.max_pixels)
            .into_iter()
            .map(|i| indices[i])
            .collect();
        indices.sort_unstable();
        warn!(operation, candidate_pixels, used = params.max_pixels, "subsampling region");
    }
    if params.deadline_ms.is_some() {
        indices.shuffle(&mut rng);
    }

    debug!(operation, stride, candidate_pixels, used = indices.len(), "reduction plan");
    Ok(PixelPlan { indices, candidate_pixels })
}

/// Visit planned pixels, honoring the deadline. Returns the number visited.
fn visit<F>(stack: &RasterStack, plan: &PixelPlan, params: &ReduceParams, operation: &'static str, mut f: F) -> Result<usize>
where
    F: FnMut(&[f64]),
{
    let cols = stack.shape().1;
    let deadline = params.deadline_ms.map(Duration::from_millis);
    let start = Instant::now();
    let mut pixel = Vec::with_capacity(stack.len());
    let mut visited = 0;

    for chunk in plan.indices.chunks(CHUNK) {
        if let Some(limit) = deadline {
            let elapsed = start.elapsed();
            if elapsed > limit && visited > 0 {
                if !params.best_effort {
                    return Err(Error::DeadlineExceeded { operation, elapsed_ms: elapsed.as_millis() });
                }
                warn!(operation, visited, planned = plan.indices.len(), "deadline reached, statistics are approximate");
                break;
            }
        }
        for &idx in chunk {
            if stack.pixel(idx / cols, idx % cols, &mut pixel) {
                f(&pixel);
                visited += 1;
            }
        }
    }

    Ok(visited)
}

fn info(plan: &PixelPlan, used: usize) -> ReductionInfo {
    ReductionInfo {
        candidate_pixels: plan.candidate_pixels,
        pixels_used: used,
        approximate: used < plan.candidate_pixels,
    }
}

/// Per-band min and max over a region
pub fn min_max(stack: &RasterStack, region: &Region, params: &ReduceParams) -> Result<MinMax> {
    let plan = plan(stack, region, params, "min_max")?;
    let p = stack.len();
    let mut min = vec![f64::INFINITY; p];
    let mut max = vec![f64::NEG_INFINITY; p];

    let used = visit(stack, &plan, params, "min_max", |px| {
        for (b, &v) in px.iter().enumerate() {
            min[b] = min[b].min(v);
            max[b] = max[b].max(v);
        }
    })?;

    Ok(MinMax { min, max, info: info(&plan, used) })
}

/// Per-band mean over a region
pub fn mean(stack: &RasterStack, region: &Region, params: &ReduceParams) -> Result<BandMeans> {
    let plan = plan(stack, region, params, "mean")?;
    let mut sums = vec![0.0; stack.len()];

    let used = visit(stack, &plan, params, "mean", |px| {
        for (s, &v) in sums.iter_mut().zip(px) {
            *s += v;
        }
    })?;

    let means = sums.into_iter().map(|s| s / used as f64).collect();
    Ok(BandMeans { means, info: info(&plan, used) })
}

/// Centered covariance over a region.
///
/// Means and co-moments are accumulated in one pass with Welford updates,
/// so a deadline cut leaves both estimates over the same pixels.
pub fn centered_covariance(stack: &RasterStack, region: &Region, params: &ReduceParams) -> Result<Covariance> {
    let plan = plan(stack, region, params, "centered_covariance")?;
    let p = stack.len();
    let mut means = vec![0.0; p];
    let mut comoment = Array2::<f64>::zeros((p, p));
    let mut delta = vec![0.0; p];
    let mut n = 0.0;

    let used = visit(stack, &plan, params, "centered_covariance", |px| {
        n += 1.0;
        for b in 0..p {
            delta[b] = px[b] - means[b];
            means[b] += delta[b] / n;
        }
        for i in 0..p {
            let after_i = px[i] - means[i];
            for j in 0..p {
                comoment[(i, j)] += delta[j] * after_i;
            }
        }
    })?;

    let denom = (used.max(2) - 1) as f64;
    let mut matrix = comoment.mapv(|c| c / denom);
    // Symmetrize accumulated rounding
    for i in 0..p {
        for j in (i + 1)..p {
            let v = 0.5 * (matrix[(i, j)] + matrix[(j, i)]);
            matrix[(i, j)] = v;
            matrix[(j, i)] = v;
        }
    }

    Ok(Covariance { matrix, means, info: info(&plan, used) })
}
