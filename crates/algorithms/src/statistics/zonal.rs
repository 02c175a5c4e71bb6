//! Zonal statistics
//!
//! Aggregates values per zone of an integer zone raster (e.g. segment ids).
//! Zone `0` is treated as no-data and never aggregated.

use crate::maybe_rayon::*;
use bakau_core::raster::{Raster, RasterStack};
use bakau_core::{Error, Result};
use ndarray::Array2;
use std::collections::HashMap;

/// Statistics of one zone for one band
#[derive(Debug, Clone, PartialEq)]
pub struct ZonalResult {
    pub zone_id: i32,
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Default)]
struct Accumulator {
    count: usize,
    sum: f64,
    sum_sq: f64,
    min: f64,
    max: f64,
}

impl Accumulator {
    fn push(&mut self, v: f64) {
        if self.count == 0 {
            self.min = v;
            self.max = v;
        } else {
            self.min = self.min.min(v);
            self.max = self.max.max(v);
        }
        self.count += 1;
        self.sum += v;
        self.sum_sq += v * v;
    }

    fn finish(&self, zone_id: i32) -> ZonalResult {
        let n = self.count as f64;
        let mean = self.sum / n;
        let var = (self.sum_sq / n - mean * mean).max(0.0);
        ZonalResult {
            zone_id,
            count: self.count,
            mean,
            std_dev: var.sqrt(),
            min: self.min,
            max: self.max,
        }
    }
}

fn check_grid(values: &Raster<f64>, zones: &Raster<i32>) -> Result<()> {
    let (rows_v, cols_v) = values.shape();
    let (rows_z, cols_z) = zones.shape();
    if rows_v != rows_z || cols_v != cols_z {
        return Err(Error::SizeMismatch {
            er: rows_v,
            ec: cols_v,
            ar: rows_z,
            ac: cols_z,
        });
    }
    if !values.transform().approx_eq(zones.transform()) {
        return Err(Error::invalid_param("zones", "geotransform", "zone raster is not aligned with the values"));
    }
    Ok(())
}

/// Compute statistics for every zone of `zones` over `values`.
///
/// No-data values (`NaN`) and zone 0 are skipped. Zones with no valid value
/// are absent from the result.
pub fn zonal_statistics(values: &Raster<f64>, zones: &Raster<i32>) -> Result<HashMap<i32, ZonalResult>> {
    check_grid(values, zones)?;
    let (rows, cols) = values.shape();

    let mut acc: HashMap<i32, Accumulator> = HashMap::new();
    for row in 0..rows {
        for col in 0..cols {
            let zone = unsafe { zones.get_unchecked(row, col) };
            let val = unsafe { values.get_unchecked(row, col) };
            if zone <= 0 || val.is_nan() {
                continue;
            }
            acc.entry(zone).or_default().push(val);
        }
    }

    Ok(acc.iter().map(|(&zone, a)| (zone, a.finish(zone))).collect())
}

/// Replace every pixel of each band by the mean of its zone.
///
/// Output bands are named `<band>_mean`. Pixels in zone 0, or in a zone with
/// no valid value for that band, are no-data.
pub fn zonal_mean_stack(stack: &RasterStack, zones: &Raster<i32>) -> Result<RasterStack> {
    let template = stack.template()?;
    check_grid(template, zones)?;
    let (rows, cols) = stack.shape();

    let means: Vec<(String, Raster<f64>)> = stack
        .bands()
        .par_iter()
        .map(|band| {
            let stats = zonal_statistics(&band.raster, zones)?;
            let data: Vec<f64> = zones
                .data()
                .iter()
                .map(|zone| stats.get(zone).map_or(f64::NAN, |z| z.mean))
                .collect();

            let mut output = band.raster.with_same_meta::<f64>(rows, cols);
            output.set_nodata(Some(f64::NAN));
            *output.data_mut() = Array2::from_shape_vec((rows, cols), data)
                .map_err(|e| Error::Other(e.to_string()))?;
            Ok((format!("{}_mean", band.name), output))
        })
        .collect::<Result<Vec<_>>>()?;

    RasterStack::from_bands(means)
}
