//! Gray-Level Co-occurrence Matrix (GLCM) texture features
//!
//! Computes Haralick texture measures from the co-occurrences inside each
//! pixel's `w x w` window. Input levels are small integers (see
//! [`quantize_gray`](super::quantize_gray)), so each window's matrix is kept
//! sparse: the symmetric pair list is sorted and run-length counted.

use crate::maybe_rayon::*;
use bakau_core::raster::{Raster, RasterStack};
use bakau_core::{Error, Result};
use ndarray::Array2;

/// Texture measures emitted by [`glcm_features`], in band order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlcmFeature {
    /// Correlation, linear dependency of gray levels
    Correlation,
    /// Entropy (natural log), randomness of the co-occurrences
    Entropy,
    /// Inverse Difference Moment, `sum p / (1 + (i - j)^2)`
    InverseDifferenceMoment,
    /// Sum average, `sum (i + j) p`
    SumAverage,
}

impl GlcmFeature {
    pub const ALL: [GlcmFeature; 4] = [
        GlcmFeature::Correlation,
        GlcmFeature::Entropy,
        GlcmFeature::InverseDifferenceMoment,
        GlcmFeature::SumAverage,
    ];

    /// Output band name
    pub fn band_name(&self) -> &'static str {
        match self {
            GlcmFeature::Correlation => "gray_corr",
            GlcmFeature::Entropy => "gray_ent",
            GlcmFeature::InverseDifferenceMoment => "gray_idm",
            GlcmFeature::SumAverage => "gray_savg",
        }
    }
}

/// Co-occurrence offsets: 0°, 45°, 90°, 135°
const OFFSETS: [(isize, isize); 4] = [(0, 1), (1, 1), (1, 0), (1, -1)];

/// Compute GLCM texture bands from a quantized gray-level raster.
///
/// For each pixel the window is clipped to the raster. If any pixel of the
/// clipped window is no-data, all four outputs are `NaN`. Each feature is
/// computed per offset and averaged over the offsets that produced at least
/// one pair.
///
/// # Arguments
/// * `levels` - Quantized gray levels
/// * `window` - Window side, odd and >= 3
pub fn glcm_features(levels: &Raster<u8>, window: usize) -> Result<RasterStack> {
    if window < 3 || window % 2 == 0 {
        return Err(Error::invalid_param("texture.window", window, "must be an odd integer >= 3"));
    }

    let (rows, cols) = levels.shape();
    let half = (window / 2) as isize;
    let nodata = levels.nodata();
    let n_features = GlcmFeature::ALL.len();

    let output_data: Vec<[f64; 4]> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![[f64::NAN; 4]; cols];
            let mut pairs: Vec<(u8, u8)> = Vec::with_capacity(2 * window * window);

            for (col, out) in row_data.iter_mut().enumerate() {
                let r0 = (row as isize - half).max(0) as usize;
                let r1 = ((row as isize + half) as usize).min(rows - 1);
                let c0 = (col as isize - half).max(0) as usize;
                let c1 = ((col as isize + half) as usize).min(cols - 1);

                let has_nodata = (r0..=r1).any(|r| {
                    (c0..=c1).any(|c| {
                        let v = unsafe { levels.get_unchecked(r, c) };
                        nodata == Some(v)
                    })
                });
                if has_nodata {
                    continue;
                }

                let mut sums = [0.0; 4];
                let mut used = 0usize;
                for &(dr, dc) in &OFFSETS {
                    pairs.clear();
                    for r in r0..=r1 {
                        for c in c0..=c1 {
                            let r2 = r as isize + dr;
                            let c2 = c as isize + dc;
                            if r2 < r0 as isize || r2 > r1 as isize || c2 < c0 as isize || c2 > c1 as isize {
                                continue;
                            }
                            let i = unsafe { levels.get_unchecked(r, c) };
                            let j = unsafe { levels.get_unchecked(r2 as usize, c2 as usize) };
                            pairs.push((i, j));
                            pairs.push((j, i));
                        }
                    }
                    if pairs.is_empty() {
                        continue;
                    }
                    let f = features_from_pairs(&mut pairs);
                    for k in 0..n_features {
                        sums[k] += f[k];
                    }
                    used += 1;
                }

                if used > 0 {
                    for k in 0..n_features {
                        out[k] = sums[k] / used as f64;
                    }
                }
            }

            row_data
        })
        .collect();

    let mut stack = RasterStack::new();
    for (k, feature) in GlcmFeature::ALL.iter().enumerate() {
        let data: Vec<f64> = output_data.iter().map(|px| px[k]).collect();
        let mut output = levels.with_same_meta::<f64>(rows, cols);
        output.set_nodata(Some(f64::NAN));
        *output.data_mut() = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;
        stack.push_band(feature.band_name(), output)?;
    }

    Ok(stack)
}

/// Correlation, entropy, IDM and sum average of one symmetric pair list.
///
/// `pairs` is sorted in place so equal cells form runs.
fn features_from_pairs(pairs: &mut [(u8, u8)]) -> [f64; 4] {
    let total = pairs.len() as f64;
    pairs.sort_unstable();

    // The matrix is symmetric, so row and column marginals coincide
    let mut mu = 0.0;
    let mut idm = 0.0;
    let mut savg = 0.0;
    for &(i, j) in pairs.iter() {
        let (fi, fj) = (i as f64, j as f64);
        mu += fi;
        idm += 1.0 / (1.0 + (fi - fj).powi(2));
        savg += fi + fj;
    }
    mu /= total;
    idm /= total;
    savg /= total;

    let mut var = 0.0;
    let mut cov = 0.0;
    for &(i, j) in pairs.iter() {
        let (di, dj) = (i as f64 - mu, j as f64 - mu);
        var += di * di;
        cov += di * dj;
    }
    let corr = if var < 1e-12 { 0.0 } else { cov / var };

    let mut entropy = 0.0;
    let mut start = 0;
    while start < pairs.len() {
        let mut end = start + 1;
        while end < pairs.len() && pairs[end] == pairs[start] {
            end += 1;
        }
        let p = (end - start) as f64 / total;
        entropy -= p * p.ln();
        start = end;
    }

    [corr, entropy, idm, savg]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use bakau_core::GeoTransform;

    fn levels(rows: usize, cols: usize, f: impl Fn(usize, usize) -> u8) -> Raster<u8> {
        let mut r = Raster::new(rows, cols);
        r.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        r.set_nodata(Some(u8::MAX));
        for row in 0..rows {
            for col in 0..cols {
                r.set(row, col, f(row, col)).unwrap();
            }
        }
        r
    }

    #[test]
    fn test_constant_window() {
        let out = glcm_features(&levels(5, 5, |_, _| 40), 3).unwrap();
        assert_relative_eq!(out.band("gray_corr").unwrap().get(2, 2).unwrap(), 0.0);
        assert_relative_eq!(out.band("gray_ent").unwrap().get(2, 2).unwrap(), 0.0);
        assert_relative_eq!(out.band("gray_idm").unwrap().get(2, 2).unwrap(), 1.0);
        assert_relative_eq!(out.band("gray_savg").unwrap().get(2, 2).unwrap(), 80.0);
    }

    #[test]
    fn test_vertical_stripes() {
        // Columns alternate 0 / 10: horizontal and diagonal neighbours always differ
        let out = glcm_features(&levels(5, 5, |_, c| if c % 2 == 0 { 0 } else { 10 }), 3).unwrap();
        let idm = out.band("gray_idm").unwrap().get(2, 2).unwrap();
        let corr = out.band("gray_corr").unwrap().get(2, 2).unwrap();
        // Vertical offset is perfectly homogeneous (idm 1), the others fully contrasting
        assert!(idm > 0.2 && idm < 0.3);
        // Vertical offset correlates +1, the other three -1
        assert_relative_eq!(corr, (1.0 - 3.0) / 4.0, epsilon = 1e-12);
        assert!(out.band("gray_ent").unwrap().get(2, 2).unwrap() > 0.0);
    }

    #[test]
    fn test_sum_average_is_twice_mean_level() {
        let out = glcm_features(&levels(3, 3, |r, c| (r * 3 + c) as u8), 3).unwrap();
        let savg = out.band("gray_savg").unwrap().get(1, 1).unwrap();
        assert!(savg > 0.0 && savg < 16.0);
    }

    #[test]
    fn test_nodata_in_window_propagates() {
        let out = glcm_features(&levels(5, 5, |r, c| if r == 0 && c == 0 { u8::MAX } else { 10 }), 3).unwrap();
        for name in ["gray_corr", "gray_ent", "gray_idm", "gray_savg"] {
            let b = out.band(name).unwrap();
            assert!(b.get(0, 0).unwrap().is_nan());
            assert!(b.get(1, 1).unwrap().is_nan());
            assert!(!b.get(2, 2).unwrap().is_nan());
        }
    }

    #[test]
    fn test_edge_windows_are_truncated() {
        let out = glcm_features(&levels(4, 4, |_, _| 7), 5).unwrap();
        assert_relative_eq!(out.band("gray_idm").unwrap().get(0, 0).unwrap(), 1.0);
    }

    #[test]
    fn test_invalid_window() {
        assert!(glcm_features(&levels(3, 3, |_, _| 0), 2).is_err());
    }
}
