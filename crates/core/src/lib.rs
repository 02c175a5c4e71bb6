//! # Bakau Core
//!
//! Core types, traits and I/O for the bakau land-cover classifier.
//!
//! This crate provides:
//! - `Raster<T>`: Generic georeferenced raster grid
//! - `RasterStack`: Ordered, named `f64` bands sharing one grid
//! - `GeoTransform` / `CRS`: Georeferencing
//! - `LabeledGeometry` / `LabelCollection`: Class-labeled vector samples
//! - `RasterSource` / `RasterSink`: Boundaries to the acquisition and export layers
//! - Native GeoTIFF and GeoJSON adapters for those boundaries

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod vector;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement, RasterStack};
pub use vector::{label_value, LabelCollection, LabeledGeometry, Properties};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Raster, RasterElement, RasterStack};
    pub use crate::vector::{LabelCollection, LabeledGeometry};
    pub use crate::Algorithm;
}

/// Core trait for the pipeline stages.
///
/// Stages are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
