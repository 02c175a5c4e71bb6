//! Dimensionality reduction, classification and accuracy assessment
//!
//! - **PCA**: Principal Component Analysis over a region (dimensionality reduction)
//! - **Random forest**: Bagged CART trees with random feature subsets
//! - **Confusion matrix**: Accuracy, producer's/consumer's accuracy, kappa, F1

mod confusion;
mod forest;
mod pca;
mod tree;

pub use confusion::{AccuracyKind, AccuracyReport, ConfusionMatrix};
pub use forest::{ClassifierModel, ForestParams, RandomForest, CLASS_NODATA};
pub use pca::{pca, DegeneratePolicy, PcaParams, PcaReducer, PcaResult};
