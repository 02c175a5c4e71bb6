//! Statistical reductions over raster data
//!
//! - **region**: Region-wide reducers (min/max, mean, centered covariance)
//!   with documented best-effort subsampling and deadlines
//! - **zonal**: Per-zone aggregation broadcast back to member pixels

pub mod region;
pub mod zonal;

pub use region::{
    centered_covariance, mean, min_max, BandMeans, Covariance, MinMax, ReduceParams, ReductionInfo, Region,
};
pub use zonal::{zonal_mean_stack, zonal_statistics, ZonalResult};
