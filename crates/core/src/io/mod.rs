//! Boundaries to the acquisition and export layers, plus native adapters

mod labels;
mod native;
mod source;

pub use labels::{parse_labels, read_labels};
pub use native::{
    read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer, GeoTiffOptions,
};
pub use source::{
    DateRange, GeoTiffDirectorySink, GeoTiffDirectorySource, RasterSink, RasterSource, SceneQuery,
};
