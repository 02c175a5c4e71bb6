//! Multi-band raster stack with named bands

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster};

/// A named `f64` band inside a [`RasterStack`].
#[derive(Debug, Clone)]
pub struct Band {
    pub name: String,
    pub raster: Raster<f64>,
}

/// Ordered sequence of named bands sharing one grid.
///
/// Every band has the same shape and geotransform; pixel no-data inside a
/// stack is always `NaN` (band sentinels are converted on insertion).
/// Adding bands either consumes the stack and returns a new one
/// ([`with_band`](Self::with_band), [`concat`](Self::concat)) or appends in
/// place ([`push_band`](Self::push_band)).
#[derive(Debug, Clone, Default)]
pub struct RasterStack {
    bands: Vec<Band>,
}

impl RasterStack {
    /// Create an empty stack
    pub fn new() -> Self {
        Self { bands: Vec::new() }
    }

    /// Build a stack from `(name, raster)` pairs.
    ///
    /// Fails with `SizeMismatch` when shapes differ and `InvalidParameter`
    /// on duplicate names or misaligned transforms.
    pub fn from_bands<S: Into<String>>(bands: impl IntoIterator<Item = (S, Raster<f64>)>) -> Result<Self> {
        let mut stack = Self::new();
        for (name, raster) in bands {
            stack.push_band(name, raster)?;
        }
        Ok(stack)
    }

    /// Append a band in place
    pub fn push_band(&mut self, name: impl Into<String>, mut raster: Raster<f64>) -> Result<()> {
        let name = name.into();

        if let Some(first) = self.bands.first() {
            let (er, ec) = first.raster.shape();
            let (ar, ac) = raster.shape();
            if (er, ec) != (ar, ac) {
                return Err(Error::SizeMismatch { er, ec, ar, ac });
            }
            if !first.raster.transform().approx_eq(raster.transform()) {
                return Err(Error::invalid_param(
                    "stack.band",
                    &name,
                    format!("geotransform differs from band '{}'", first.name),
                ));
            }
        }
        if self.contains(&name) {
            return Err(Error::invalid_param("stack.band", &name, "duplicate band name"));
        }

        if let Some(nd) = raster.nodata().filter(|nd| !nd.is_nan()) {
            raster.data_mut().mapv_inplace(|v| if (v - nd).abs() < f64::EPSILON * 100.0 { f64::NAN } else { v });
        }
        raster.set_nodata(Some(f64::NAN));

        self.bands.push(Band { name, raster });
        Ok(())
    }

    /// Functional update: return a new stack with one more band
    pub fn with_band(mut self, name: impl Into<String>, raster: Raster<f64>) -> Result<Self> {
        self.push_band(name, raster)?;
        Ok(self)
    }

    /// Append every band of `other`, keeping order
    pub fn concat(mut self, other: RasterStack) -> Result<Self> {
        for band in other.bands {
            self.push_band(band.name, band.raster)?;
        }
        Ok(self)
    }

    /// New stack holding the named bands, in the given order
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let mut out = Self::new();
        for name in names {
            out.push_band(name.as_ref(), self.band(name.as_ref())?.clone())?;
        }
        Ok(out)
    }

    /// Band by name, failing with `MissingBand`
    pub fn band(&self, name: &str) -> Result<&Raster<f64>> {
        self.bands
            .iter()
            .find(|b| b.name == name)
            .map(|b| &b.raster)
            .ok_or_else(|| Error::MissingBand {
                band: name.to_string(),
                available: self.band_names(),
            })
    }

    /// Position of a band by name, failing with `MissingBand`
    pub fn band_index(&self, name: &str) -> Result<usize> {
        self.bands
            .iter()
            .position(|b| b.name == name)
            .ok_or_else(|| Error::MissingBand {
                band: name.to_string(),
                available: self.band_names(),
            })
    }

    /// Whether a band with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.bands.iter().any(|b| b.name == name)
    }

    /// Band names in order
    pub fn band_names(&self) -> Vec<String> {
        self.bands.iter().map(|b| b.name.clone()).collect()
    }

    /// Bands in order
    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    /// Consume the stack into its bands
    pub fn into_bands(self) -> Vec<Band> {
        self.bands
    }

    /// Number of bands
    pub fn len(&self) -> usize {
        self.bands.len()
    }

    /// Whether the stack has no bands
    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Shared grid shape, `(0, 0)` for an empty stack
    pub fn shape(&self) -> (usize, usize) {
        self.bands.first().map_or((0, 0), |b| b.raster.shape())
    }

    /// Shared geotransform
    pub fn transform(&self) -> GeoTransform {
        self.bands.first().map_or_else(GeoTransform::default, |b| *b.raster.transform())
    }

    /// Shared CRS, taken from the first band
    pub fn crs(&self) -> Option<&CRS> {
        self.bands.first().and_then(|b| b.raster.crs())
    }

    /// First band, used as a metadata template for derived rasters
    pub fn template(&self) -> Result<&Raster<f64>> {
        self.bands
            .first()
            .map(|b| &b.raster)
            .ok_or_else(|| Error::EmptyFeatureSet("raster stack has no bands".into()))
    }

    /// Fill `out` with the band values at (row, col).
    ///
    /// Returns `false` if (row, col) lies outside the grid or any band is
    /// no-data there; `out` is then partial.
    pub fn pixel(&self, row: usize, col: usize, out: &mut Vec<f64>) -> bool {
        out.clear();
        let (rows, cols) = self.shape();
        if row >= rows || col >= cols {
            return false;
        }
        for band in &self.bands {
            let v = unsafe { band.raster.get_unchecked(row, col) };
            if v.is_nan() {
                return false;
            }
            out.push(v);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(rows: usize, cols: usize, v: f64) -> Raster<f64> {
        let mut r = Raster::filled(rows, cols, v);
        r.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        r
    }

    #[test]
    fn test_mismatched_shapes_fail() {
        let result = RasterStack::from_bands([("a", band(4, 4, 1.0)), ("b", band(4, 5, 1.0))]);
        assert!(matches!(result, Err(Error::SizeMismatch { .. })));
    }

    #[test]
    fn test_duplicate_name_fails() {
        let result = RasterStack::from_bands([("a", band(4, 4, 1.0)), ("a", band(4, 4, 2.0))]);
        assert!(matches!(result, Err(Error::InvalidParameter { .. })));
    }

    #[test]
    fn test_select_missing_band() {
        let stack = RasterStack::from_bands([("B8", band(3, 3, 0.2))]).unwrap();
        let err = stack.select(&["B8", "B4"]).unwrap_err();
        match err {
            Error::MissingBand { band, available } => {
                assert_eq!(band, "B4");
                assert_eq!(available, vec!["B8".to_string()]);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_select_reorders() {
        let stack = RasterStack::from_bands([("a", band(2, 2, 1.0)), ("b", band(2, 2, 2.0))]).unwrap();
        let sel = stack.select(&["b", "a"]).unwrap();
        assert_eq!(sel.band_names(), vec!["b", "a"]);
    }

    #[test]
    fn test_nodata_sentinel_becomes_nan() {
        let mut r = band(2, 2, 1.0);
        r.set(0, 0, -9999.0).unwrap();
        r.set_nodata(Some(-9999.0));
        let stack = RasterStack::new().with_band("x", r).unwrap();

        let mut px = Vec::new();
        assert!(!stack.pixel(0, 0, &mut px));
        assert!(stack.pixel(1, 1, &mut px));
        assert_eq!(px, vec![1.0]);
    }

    #[test]
    fn test_pixel_outside_grid() {
        let stack = RasterStack::from_bands([("a", band(2, 2, 1.0)), ("b", band(2, 2, 2.0))]).unwrap();
        let mut px = vec![9.0];
        assert!(!stack.pixel(5, 5, &mut px));
        assert!(px.is_empty());
        assert!(!stack.pixel(0, 2, &mut px));
        assert!(!stack.pixel(2, 0, &mut px));
        assert!(stack.pixel(1, 1, &mut px));
        assert_eq!(px, vec![1.0, 2.0]);
    }
}
