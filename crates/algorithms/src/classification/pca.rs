//! Principal Component Analysis for multi-band rasters
//!
//! Estimates the band covariance matrix over a region, extracts eigenpairs
//! via Jacobi iteration and projects every pixel onto the leading
//! eigenvectors. Each component is divided by the square root of its
//! eigenvalue so it has unit variance over the region.

use crate::maybe_rayon::*;
use crate::statistics::region::{centered_covariance, ReduceParams, ReductionInfo, Region};
use bakau_core::raster::{Raster, RasterStack};
use bakau_core::{Algorithm, Error, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// What to do with a retained component whose eigenvalue is ~0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegeneratePolicy {
    /// Keep the band, filled with no-data
    #[default]
    NoData,
    /// Omit the band from the output
    Drop,
}

/// Parameters for PCA
#[derive(Debug, Clone)]
pub struct PcaParams {
    /// Number of leading components to return (default: 1)
    pub n_components: usize,
    /// Area over which means and covariance are estimated
    pub region: Region,
    pub reduce: ReduceParams,
    /// Relative threshold below which an eigenvalue counts as zero
    pub tolerance: f64,
    pub degenerate: DegeneratePolicy,
}

impl Default for PcaParams {
    fn default() -> Self {
        Self {
            n_components: 1,
            region: Region::Full,
            reduce: ReduceParams::default(),
            tolerance: 1e-9,
            degenerate: DegeneratePolicy::NoData,
        }
    }
}

/// Result of PCA
#[derive(Debug, Clone)]
pub struct PcaResult {
    /// Variance-normalized component bands `pc1`, `pc2`, ...
    pub components: RasterStack,
    /// Names of the input bands, in the order of the eigenvector columns
    pub input_bands: Vec<String>,
    /// All P eigenvalues, descending; values under tolerance are set to 0
    pub eigenvalues: Vec<f64>,
    /// P x P matrix whose rows are the eigenvectors, in eigenvalue order
    pub eigenvectors: Array2<f64>,
    /// Region means the bands were centered on
    pub means: Vec<f64>,
    /// Proportion of total variance carried by each eigenpair
    pub variance_explained: Vec<f64>,
    pub info: ReductionInfo,
}

impl PcaResult {
    /// Band name of component `index` (0-based)
    pub fn component_name(index: usize) -> String {
        format!("pc{}", index + 1)
    }

    /// Map component bands back to the original band space.
    ///
    /// Undoes the unit-variance scaling, the rotation and the centering.
    /// Exact when every non-degenerate component is present; missing or
    /// degenerate components contribute nothing.
    pub fn reconstruct(&self, components: &RasterStack) -> Result<RasterStack> {
        let p = self.input_bands.len();
        let template = components.template()?;
        let (rows, cols) = components.shape();

        let mut used: Vec<(usize, &Raster<f64>)> = Vec::new();
        for (c, &lambda) in self.eigenvalues.iter().enumerate() {
            let name = Self::component_name(c);
            if lambda > 0.0 && components.contains(&name) {
                used.push((c, components.band(&name)?));
            }
        }

        let data: Vec<f64> = (0..rows * cols)
            .into_par_iter()
            .flat_map(|idx| {
                let (row, col) = (idx / cols, idx % cols);
                let mut x = self.means.clone();
                for &(c, band) in &used {
                    let v = unsafe { band.get_unchecked(row, col) };
                    if v.is_nan() {
                        return vec![f64::NAN; p];
                    }
                    let scaled = v * self.eigenvalues[c].sqrt();
                    for (b, xb) in x.iter_mut().enumerate() {
                        *xb += scaled * self.eigenvectors[(c, b)];
                    }
                }
                x
            })
            .collect();

        let mut stack = RasterStack::new();
        for (b, name) in self.input_bands.iter().enumerate() {
            let band: Vec<f64> = data.iter().skip(b).step_by(p).copied().collect();
            stack.push_band(name.clone(), template.derive(band, Some(f64::NAN))?)?;
        }
        Ok(stack)
    }
}

/// PCA stage of the pipeline
#[derive(Debug, Clone, Default)]
pub struct PcaReducer;

impl Algorithm for PcaReducer {
    type Input = RasterStack;
    type Output = PcaResult;
    type Params = PcaParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "PcaReducer"
    }

    fn description(&self) -> &'static str {
        "Project bands onto leading covariance eigenvectors, scaled to unit variance"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        pca(&input, &params)
    }
}

/// Compute PCA on a stack of bands.
///
/// # Arguments
/// * `stack` - Input bands (P >= 1)
/// * `params` - PCA parameters
///
/// # Returns
/// PcaResult with `k` component bands (fewer under [`DegeneratePolicy::Drop`])
pub fn pca(stack: &RasterStack, params: &PcaParams) -> Result<PcaResult> {
    let n_bands = stack.len();
    if n_bands == 0 {
        return Err(Error::EmptyFeatureSet("PCA requires at least 1 band".into()));
    }
    let k = params.n_components;
    if k == 0 || k > n_bands {
        return Err(Error::invalid_param(
            "pca.n_components",
            k,
            format!("must be in 1..={} (number of input bands)", n_bands),
        ));
    }
    if !(params.tolerance.is_finite() && params.tolerance >= 0.0) {
        return Err(Error::invalid_param("pca.tolerance", params.tolerance, "must be finite and >= 0"));
    }

    let cov = centered_covariance(stack, &params.region, &params.reduce)?;
    let (raw_values, raw_vectors) = jacobi_eigen(&cov.matrix)?;

    // Sort by eigenvalue descending
    let mut indices: Vec<usize> = (0..n_bands).collect();
    indices.sort_by(|&a, &b| raw_values[b].partial_cmp(&raw_values[a]).unwrap_or(std::cmp::Ordering::Equal));

    let lambda_max = raw_values[indices[0]];
    let threshold = params.tolerance * lambda_max.max(1.0);

    let mut eigenvalues = Vec::with_capacity(n_bands);
    let mut eigenvectors = Array2::<f64>::zeros((n_bands, n_bands));
    for (row, &i) in indices.iter().enumerate() {
        let lambda = raw_values[i];
        if lambda < -threshold {
            return Err(Error::NumericalInstability(format!(
                "covariance has negative eigenvalue {:.3e}",
                lambda
            )));
        }
        eigenvalues.push(if lambda <= threshold { 0.0 } else { lambda });

        // Fix the sign so the largest-magnitude loading is positive
        let column = raw_vectors.column(i);
        let mut pivot = 0;
        for b in 1..n_bands {
            if column[b].abs() > column[pivot].abs() {
                pivot = b;
            }
        }
        let sign = if column[pivot] < 0.0 { -1.0 } else { 1.0 };
        for b in 0..n_bands {
            eigenvectors[(row, b)] = sign * column[b];
        }
    }

    if eigenvalues[0] == 0.0 {
        return Err(Error::NumericalInstability(
            "covariance is zero over the region: every band is constant".into(),
        ));
    }

    let total_var: f64 = eigenvalues.iter().sum();
    let variance_explained: Vec<f64> = eigenvalues.iter().map(|ev| ev / total_var).collect();
    debug!(?eigenvalues, ?variance_explained, pixels = cov.info.pixels_used, "pca eigen-decomposition");

    let retained: Vec<usize> = (0..k)
        .filter(|&c| {
            let degenerate = eigenvalues[c] == 0.0;
            if degenerate {
                warn!(component = c + 1, policy = ?params.degenerate, "degenerate principal component");
            }
            !degenerate || params.degenerate == DegeneratePolicy::NoData
        })
        .collect();

    let (rows, cols) = stack.shape();
    let n_out = retained.len();
    let scales: Vec<f64> = retained
        .iter()
        .map(|&c| if eigenvalues[c] > 0.0 { 1.0 / eigenvalues[c].sqrt() } else { f64::NAN })
        .collect();

    // Pixel-major output: n_out values per pixel
    let output_data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols * n_out];
            let mut pixel = Vec::with_capacity(n_bands);

            for col in 0..cols {
                if !stack.pixel(row, col, &mut pixel) {
                    continue;
                }
                for (o, &c) in retained.iter().enumerate() {
                    if scales[o].is_nan() {
                        continue;
                    }
                    let mut projected = 0.0;
                    for b in 0..n_bands {
                        projected += (pixel[b] - cov.means[b]) * eigenvectors[(c, b)];
                    }
                    row_data[col * n_out + o] = projected * scales[o];
                }
            }

            row_data
        })
        .collect();

    let template = stack.template()?;
    let mut components = RasterStack::new();
    for (o, &c) in retained.iter().enumerate() {
        let band: Vec<f64> = output_data.iter().skip(o).step_by(n_out).copied().collect();
        components.push_band(PcaResult::component_name(c), template.derive(band, Some(f64::NAN))?)?;
    }

    Ok(PcaResult {
        components,
        input_bands: stack.band_names(),
        eigenvalues,
        eigenvectors,
        means: cov.means,
        variance_explained,
        info: cov.info,
    })
}

/// Jacobi eigenvalue algorithm for symmetric matrices.
///
/// Returns eigenvalues (unsorted) and a matrix whose columns are the
/// matching eigenvectors.
fn jacobi_eigen(matrix: &Array2<f64>) -> Result<(Vec<f64>, Array2<f64>)> {
    let n = matrix.nrows();
    let max_iter = 100 * n * n + 100;
    let scale = matrix.iter().fold(0.0_f64, |m, v| m.max(v.abs())).max(f64::MIN_POSITIVE);
    let eps = 1e-12 * scale;

    let mut a = matrix.clone();
    let mut v = Array2::<f64>::eye(n);
    let mut converged = n < 2;

    for _ in 0..max_iter {
        // Find largest off-diagonal element
        let mut max_val = 0.0;
        let mut p = 0;
        let mut q = 1;
        for i in 0..n {
            for j in (i + 1)..n {
                if a[(i, j)].abs() > max_val {
                    max_val = a[(i, j)].abs();
                    p = i;
                    q = j;
                }
            }
        }

        if max_val < eps {
            converged = true;
            break;
        }

        // Compute rotation
        let theta = if (a[(p, p)] - a[(q, q)]).abs() < eps {
            std::f64::consts::FRAC_PI_4
        } else {
            0.5 * (2.0 * a[(p, q)] / (a[(p, p)] - a[(q, q)])).atan()
        };
        let cos_t = theta.cos();
        let sin_t = theta.sin();

        // Apply rotation to matrix
        let app = a[(p, p)];
        let aqq = a[(q, q)];
        let apq = a[(p, q)];
        for i in 0..n {
            if i != p && i != q {
                let aip = a[(i, p)];
                let aiq = a[(i, q)];
                a[(i, p)] = cos_t * aip + sin_t * aiq;
                a[(p, i)] = a[(i, p)];
                a[(i, q)] = -sin_t * aip + cos_t * aiq;
                a[(q, i)] = a[(i, q)];
            }
        }
        a[(p, p)] = cos_t * cos_t * app + 2.0 * sin_t * cos_t * apq + sin_t * sin_t * aqq;
        a[(q, q)] = sin_t * sin_t * app - 2.0 * sin_t * cos_t * apq + cos_t * cos_t * aqq;
        a[(p, q)] = 0.0;
        a[(q, p)] = 0.0;

        // Update eigenvectors
        for i in 0..n {
            let vip = v[(i, p)];
            let viq = v[(i, q)];
            v[(i, p)] = cos_t * vip + sin_t * viq;
            v[(i, q)] = -sin_t * vip + cos_t * viq;
        }
    }

    if !converged {
        return Err(Error::NumericalInstability(format!(
            "Jacobi eigen-decomposition did not converge in {} rotations",
            max_iter
        )));
    }

    let eigenvalues: Vec<f64> = (0..n).map(|i| a[(i, i)]).collect();
    Ok((eigenvalues, v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use bakau_core::GeoTransform;

    fn make_band(rows: usize, cols: usize, f: impl Fn(usize, usize) -> f64) -> Raster<f64> {
        let mut r = Raster::new(rows, cols);
        r.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        for row in 0..rows {
            for col in 0..cols {
                r.set(row, col, f(row, col)).unwrap();
            }
        }
        r
    }

    fn three_bands() -> RasterStack {
        RasterStack::from_bands([
            ("a", make_band(10, 10, |r, c| (r * 10 + c) as f64)),
            ("b", make_band(10, 10, |r, c| ((r * 7 + c * 3) % 11) as f64)),
            ("c", make_band(10, 10, |r, c| (r as f64).sin() + c as f64 * 0.5)),
        ])
        .unwrap()
    }

    fn variance(values: impl Iterator<Item = f64>) -> f64 {
        let v: Vec<f64> = values.filter(|x| !x.is_nan()).collect();
        let mean = v.iter().sum::<f64>() / v.len() as f64;
        v.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (v.len() - 1) as f64
    }

    #[test]
    fn test_pca_two_correlated_bands() {
        let stack = RasterStack::from_bands([
            ("a", make_band(10, 10, |r, c| (r * 10 + c) as f64)),
            ("b", make_band(10, 10, |r, c| 2.0 * (r * 10 + c) as f64)),
        ])
        .unwrap();
        let params = PcaParams { n_components: 2, ..Default::default() };
        let result = pca(&stack, &params).unwrap();

        // Perfectly correlated: the second eigenvalue is zero
        assert!(result.variance_explained[0] > 0.999);
        assert_eq!(result.eigenvalues[1], 0.0);
        let pc2 = result.components.band("pc2").unwrap();
        assert!(pc2.data().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_drop_policy_omits_degenerate() {
        let stack = RasterStack::from_bands([
            ("a", make_band(6, 6, |r, c| (r * 6 + c) as f64)),
            ("b", make_band(6, 6, |r, c| 3.0 - (r * 6 + c) as f64)),
        ])
        .unwrap();
        let params = PcaParams { n_components: 2, degenerate: DegeneratePolicy::Drop, ..Default::default() };
        let result = pca(&stack, &params).unwrap();
        assert_eq!(result.components.band_names(), vec!["pc1"]);
    }

    #[test]
    fn test_components_have_unit_variance() {
        let params = PcaParams { n_components: 3, ..Default::default() };
        let result = pca(&three_bands(), &params).unwrap();
        for name in ["pc1", "pc2", "pc3"] {
            let var = variance(result.components.band(name).unwrap().data().iter().copied());
            assert_relative_eq!(var, 1.0, epsilon = 1e-6);
        }
        assert!(result.eigenvalues.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_round_trip_with_all_components() {
        let stack = three_bands();
        let params = PcaParams { n_components: 3, ..Default::default() };
        let result = pca(&stack, &params).unwrap();
        let back = result.reconstruct(&result.components).unwrap();

        assert_eq!(back.band_names(), stack.band_names());
        for name in ["a", "b", "c"] {
            let orig = stack.band(name).unwrap();
            let rec = back.band(name).unwrap();
            for (x, y) in orig.data().iter().zip(rec.data().iter()) {
                assert_relative_eq!(x, y, epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn test_sign_is_deterministic() {
        let params = PcaParams { n_components: 2, ..Default::default() };
        let r = pca(&three_bands(), &params).unwrap();
        for row in r.eigenvectors.rows() {
            let pivot = row.iter().fold(0.0_f64, |m, v| if v.abs() > m.abs() { *v } else { m });
            assert!(pivot > 0.0);
        }
    }

    #[test]
    fn test_nodata_pixels_propagate() {
        let mut a = make_band(4, 4, |r, c| (r * 4 + c) as f64);
        a.set(1, 1, f64::NAN).unwrap();
        let stack = RasterStack::from_bands([("a", a), ("b", make_band(4, 4, |r, _| r as f64))]).unwrap();
        let result = pca(&stack, &PcaParams::default()).unwrap();
        let pc1 = result.components.band("pc1").unwrap();
        assert!(pc1.get(1, 1).unwrap().is_nan());
        assert!(!pc1.get(0, 0).unwrap().is_nan());
        assert_eq!(result.info.pixels_used, 15);
    }

    #[test]
    fn test_k_out_of_range() {
        let err = pca(&three_bands(), &PcaParams { n_components: 4, ..Default::default() }).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "pca.n_components", .. }));
        let err = pca(&three_bands(), &PcaParams { n_components: 0, ..Default::default() }).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "pca.n_components", .. }));
    }

    #[test]
    fn test_constant_bands_are_unstable() {
        let stack = RasterStack::from_bands([("a", make_band(3, 3, |_, _| 1.0))]).unwrap();
        assert!(matches!(pca(&stack, &PcaParams::default()), Err(Error::NumericalInstability(_))));
    }
}
