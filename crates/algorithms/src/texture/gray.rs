//! Grayscale composite for texture analysis

use bakau_core::raster::{Raster, RasterStack};
use bakau_core::Result;
use serde::{Deserialize, Serialize};

/// Number of quantized gray levels (0..=100)
pub const GRAY_LEVELS: usize = 101;

/// Reflectance mapped to the top gray level; brighter values clip
pub const GRAY_DOMAIN_MAX: f64 = 0.30;

const NIR_WEIGHT: f64 = 0.30;
const RED_WEIGHT: f64 = 0.59;
const GREEN_WEIGHT: f64 = 0.11;

/// Band names of the spectral inputs used by texture and segmentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralBands {
    pub nir: String,
    pub red: String,
    pub green: String,
}

impl Default for SpectralBands {
    fn default() -> Self {
        Self {
            nir: "B8".into(),
            red: "B4".into(),
            green: "B3".into(),
        }
    }
}

impl SpectralBands {
    /// Names in NIR, red, green order
    pub fn names(&self) -> [&str; 3] {
        [&self.nir, &self.red, &self.green]
    }
}

/// Weighted composite `0.30 NIR + 0.59 Red + 0.11 Green`.
///
/// Any `NaN` input yields `NaN`.
pub fn grayscale(stack: &RasterStack, bands: &SpectralBands) -> Result<Raster<f64>> {
    let nir = stack.band(&bands.nir)?;
    let red = stack.band(&bands.red)?;
    let green = stack.band(&bands.green)?;

    let data: Vec<f64> = nir
        .data()
        .iter()
        .zip(red.data().iter())
        .zip(green.data().iter())
        .map(|((&n, &r), &g)| NIR_WEIGHT * n + RED_WEIGHT * r + GREEN_WEIGHT * g)
        .collect();

    nir.derive(data, Some(f64::NAN))
}

/// Quantize a grayscale band to integer levels `0..=100`.
///
/// Values are unit-scaled over `[0, 0.30]`, multiplied by 100, clipped and
/// truncated. No-data becomes `u8::MAX`.
pub fn quantize_gray(gray: &Raster<f64>) -> Raster<u8> {
    let top = (GRAY_LEVELS - 1) as f64;
    let data: Vec<u8> = gray
        .data()
        .iter()
        .map(|&v| {
            if v.is_nan() {
                u8::MAX
            } else {
                ((v / GRAY_DOMAIN_MAX) * top).clamp(0.0, top) as u8
            }
        })
        .collect();

    let mut out = gray.with_same_meta::<u8>(gray.rows(), gray.cols());
    out.set_nodata(Some(u8::MAX));
    for (dst, src) in out.data_mut().iter_mut().zip(data) {
        *dst = src;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use bakau_core::GeoTransform;

    fn band(values: Vec<f64>) -> Raster<f64> {
        let n = values.len();
        let mut r = Raster::from_vec(values, 1, n).unwrap();
        r.set_transform(GeoTransform::new(0.0, 1.0, 1.0, -1.0));
        r
    }

    #[test]
    fn test_grayscale_weights() {
        let stack = RasterStack::from_bands([
            ("B8", band(vec![1.0, 0.0, 0.0])),
            ("B4", band(vec![0.0, 1.0, 0.0])),
            ("B3", band(vec![0.0, 0.0, 1.0])),
        ])
        .unwrap();
        let g = grayscale(&stack, &SpectralBands::default()).unwrap();
        assert_relative_eq!(g.get(0, 0).unwrap(), 0.30);
        assert_relative_eq!(g.get(0, 1).unwrap(), 0.59);
        assert_relative_eq!(g.get(0, 2).unwrap(), 0.11);
    }

    #[test]
    fn test_quantize_clips_and_truncates() {
        let q = quantize_gray(&band(vec![-0.1, 0.0, 0.1499, 0.2, 0.30, 0.9, f64::NAN]));
        let levels: Vec<u8> = q.data().iter().copied().collect();
        assert_eq!(levels, vec![0, 0, 49, 66, 100, 100, u8::MAX]);
        assert_eq!(q.nodata(), Some(u8::MAX));
    }
}
