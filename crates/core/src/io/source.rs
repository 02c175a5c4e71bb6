//! Raster source and sink boundaries
//!
//! Acquisition (archive search, cloud masking, radiometric scaling) and
//! export live outside this crate. The pipeline only sees a [`RasterSource`]
//! that hands back comparable reflectance bands and a [`RasterSink`] that
//! persists results.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::io::native::{read_geotiff, write_geotiff, GeoTiffOptions};
use crate::raster::{Raster, RasterStack};
use geo_types::Polygon;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// Inclusive acquisition window as ISO-8601 dates (`YYYY-MM-DD`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

impl DateRange {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self { start: start.into(), end: end.into() }
    }

    /// Check both dates are `YYYY-MM-DD` and `start <= end`
    pub fn validate(&self) -> Result<()> {
        for date in [&self.start, &self.end] {
            if !is_iso_date(date) {
                return Err(Error::invalid_param("date_range", date, "expected YYYY-MM-DD"));
            }
        }
        if self.start > self.end {
            return Err(Error::invalid_param(
                "date_range",
                format!("{}/{}", self.start, self.end),
                "start date is after end date",
            ));
        }
        Ok(())
    }
}

fn is_iso_date(s: &str) -> bool {
    let parts: Vec<&str> = s.split('-').collect();
    let numeric = |p: &str, len: usize| p.len() == len && p.bytes().all(|b| b.is_ascii_digit());
    if parts.len() != 3 || !numeric(parts[0], 4) || !numeric(parts[1], 2) || !numeric(parts[2], 2) {
        return false;
    }
    let month: u32 = parts[1].parse().unwrap_or(0);
    let day: u32 = parts[2].parse().unwrap_or(0);
    (1..=12).contains(&month) && (1..=31).contains(&day)
}

/// What a source is asked to deliver.
///
/// The date range, region and cloud threshold are forwarded to the source
/// untouched; the core never masks clouds itself.
#[derive(Debug, Clone)]
pub struct SceneQuery {
    pub scene: String,
    pub bands: Vec<String>,
    pub date_range: Option<DateRange>,
    pub region: Option<Polygon<f64>>,
    pub max_cloud_percent: Option<f64>,
}

impl SceneQuery {
    pub fn new(scene: impl Into<String>, bands: &[String]) -> Self {
        Self {
            scene: scene.into(),
            bands: bands.to_vec(),
            date_range: None,
            region: None,
            max_cloud_percent: None,
        }
    }
}

/// Provides radiometrically comparable, cloud-masked band stacks
pub trait RasterSource {
    fn load(&self, query: &SceneQuery) -> Result<RasterStack>;
}

/// Persists derived or classified rasters
pub trait RasterSink {
    /// Write a single-band label raster
    fn write_labels(&self, name: &str, raster: &Raster<i32>, scale: f64, crs: Option<&CRS>) -> Result<()>;

    /// Write every band of a derived stack
    fn write_stack(&self, name: &str, stack: &RasterStack, scale: f64, crs: Option<&CRS>) -> Result<()>;
}

/// Reads `<root>/<scene>/<band>.tif`, one single-band GeoTIFF per band.
#[derive(Debug, Clone)]
pub struct GeoTiffDirectorySource {
    root: PathBuf,
}

impl GeoTiffDirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl RasterSource for GeoTiffDirectorySource {
    fn load(&self, query: &SceneQuery) -> Result<RasterStack> {
        let dir = self.root.join(&query.scene);
        let mut stack = RasterStack::new();

        for band in &query.bands {
            let path = dir.join(format!("{}.tif", band));
            if !path.exists() {
                return Err(Error::MissingBand {
                    band: band.clone(),
                    available: stack.band_names(),
                });
            }
            let raster: Raster<f64> = read_geotiff(&path)?;
            debug!(scene = %query.scene, band = %band, rows = raster.rows(), cols = raster.cols(), "loaded band");
            stack.push_band(band.clone(), raster)?;
        }

        Ok(stack)
    }
}

/// Writes `<dir>/<name>.tif`, or `<dir>/<name>_<band>.tif` per band of a stack.
#[derive(Debug, Clone)]
pub struct GeoTiffDirectorySink {
    dir: PathBuf,
}

impl GeoTiffDirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn check_scale<T: crate::raster::RasterElement>(raster: &Raster<T>, scale: f64) -> Result<()> {
        let cell = raster.cell_size();
        if (cell - scale).abs() > 1e-6 * scale.max(1.0) {
            return Err(Error::invalid_param(
                "sink.scale",
                scale,
                format!("raster cell size is {}; resample before export", cell),
            ));
        }
        Ok(())
    }
}

impl RasterSink for GeoTiffDirectorySink {
    fn write_labels(&self, name: &str, raster: &Raster<i32>, scale: f64, crs: Option<&CRS>) -> Result<()> {
        Self::check_scale(raster, scale)?;
        std::fs::create_dir_all(&self.dir)?;
        let options = GeoTiffOptions { crs: crs.cloned() };
        write_geotiff(raster, self.dir.join(format!("{}.tif", name)), Some(options))
    }

    fn write_stack(&self, name: &str, stack: &RasterStack, scale: f64, crs: Option<&CRS>) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        for band in stack.bands() {
            Self::check_scale(&band.raster, scale)?;
            let options = GeoTiffOptions { crs: crs.cloned() };
            write_geotiff(&band.raster, self.dir.join(format!("{}_{}.tif", name, band.name)), Some(options))?;
        }
        Ok(())
    }
}
