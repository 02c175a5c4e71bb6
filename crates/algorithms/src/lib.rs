//! # Bakau Algorithms
//!
//! Feature engineering and classification for multi-band land-cover rasters.
//!
//! ## Available Algorithm Categories
//!
//! - **statistics**: Region reducers (min/max, mean, covariance) and zonal statistics
//! - **texture**: Grayscale composite and GLCM texture bands
//! - **normalize**: Region min–max rescaling
//! - **classification**: PCA, random forest, confusion matrix
//! - **segmentation**: SNIC superpixels and cluster-mean aggregation
//! - **sampling**: Train/test split and labeled sample extraction
//! - **pipeline**: End-to-end configured run

pub(crate) mod maybe_rayon;

pub mod classification;
pub mod normalize;
pub mod pipeline;
pub mod sampling;
pub mod segmentation;
pub mod statistics;
pub mod texture;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classification::{
        pca, AccuracyKind, AccuracyReport, ClassifierModel, ConfusionMatrix, DegeneratePolicy,
        ForestParams, PcaParams, PcaReducer, PcaResult, RandomForest, CLASS_NODATA,
    };
    pub use crate::normalize::{min_max_normalize, FeatureNormalizer, NormalizeParams, Normalized};
    pub use crate::pipeline::{FeatureMode, Pipeline, PipelineConfig, PipelineOutput, SceneFeatures, Scenes};
    pub use crate::sampling::{extract_samples, sample_regions, split_geometries, Sample, SampleSet, Split};
    pub use crate::segmentation::{snic, Connectivity, Segmentation, Segmenter, SnicParams};
    pub use crate::statistics::{ReduceParams, Region};
    pub use crate::texture::{texture_features, GlcmFeature, SpectralBands, TextureExtractor, TextureParams};
    pub use bakau_core::prelude::*;
}
