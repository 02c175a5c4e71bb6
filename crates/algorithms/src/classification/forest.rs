//! Random forest classifier
//!
//! An ensemble of CART trees, each grown on a bootstrap sample with a random
//! feature subset tried at every split. Prediction is a majority vote with
//! ties going to the smallest label.

use super::confusion::{AccuracyKind, AccuracyReport, ConfusionMatrix};
use super::tree::{argmax, Dataset, DecisionTree, TreeParams};
use crate::maybe_rayon::*;
use crate::sampling::SampleSet;
use bakau_core::raster::{Raster, RasterStack};
use bakau_core::{Error, Result};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Label written to pixels that could not be classified
pub const CLASS_NODATA: i32 = -1;

/// Parameters for random forest training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    /// Number of trees (default: 50)
    pub n_trees: usize,
    /// Features tried per split (default: floor(sqrt(P)), at least 1)
    pub max_features: Option<usize>,
    /// Maximum tree depth (default: unlimited)
    pub max_depth: Option<usize>,
    /// Minimum samples in each leaf (default: 1)
    pub min_samples_leaf: usize,
    /// Seed for bootstraps and feature subsets
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_features: None,
            max_depth: None,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

impl ForestParams {
    pub fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(Error::invalid_param("forest.n_trees", 0, "must be > 0"));
        }
        if self.max_features == Some(0) {
            return Err(Error::invalid_param("forest.max_features", 0, "must be > 0"));
        }
        if self.min_samples_leaf == 0 {
            return Err(Error::invalid_param("forest.min_samples_leaf", 0, "must be > 0"));
        }
        Ok(())
    }
}

/// Random forest trainer
#[derive(Debug, Clone, Default)]
pub struct RandomForest;

impl RandomForest {
    /// Train on the named feature bands of `samples`.
    ///
    /// Bands are looked up by name, so the sample set may carry extra
    /// columns. Fails with `MissingBand` for an unknown name and with
    /// `EmptyFeatureSet` when there is nothing to learn from.
    pub fn train(band_names: &[String], samples: &SampleSet, params: &ForestParams) -> Result<ClassifierModel> {
        params.validate()?;
        if band_names.is_empty() {
            return Err(Error::EmptyFeatureSet("no feature bands selected".into()));
        }
        if samples.is_empty() {
            return Err(Error::EmptyFeatureSet("no training samples".into()));
        }
        check_lengths(samples)?;
        let columns = resolve_columns(band_names, &samples.band_names)?;
        let n_features = columns.len();
        if let Some(m) = params.max_features.filter(|&m| m > n_features) {
            return Err(Error::invalid_param(
                "forest.max_features",
                m,
                format!("exceeds the {} feature bands", n_features),
            ));
        }

        let mut classes: Vec<i32> = samples.labels();
        classes.sort_unstable();
        classes.dedup();

        let data = Dataset {
            values: samples
                .samples
                .iter()
                .flat_map(|s| columns.iter().map(move |&c| s.features[c]))
                .collect(),
            targets: samples
                .samples
                .iter()
                .map(|s| classes.binary_search(&s.label).unwrap_or(0))
                .collect(),
            n_features,
            n_classes: classes.len(),
        };

        let tree_params = TreeParams {
            max_features: params
                .max_features
                .unwrap_or_else(|| ((n_features as f64).sqrt().floor() as usize).max(1)),
            max_depth: params.max_depth,
            min_samples_leaf: params.min_samples_leaf,
        };

        let n = samples.len();
        let trees: Vec<DecisionTree> = (0..params.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(tree_seed(params.seed, t));
                let mut rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                DecisionTree::fit(&data, &mut rows, &tree_params, &mut rng)
            })
            .collect();

        let max_depth = trees.iter().map(DecisionTree::depth).max().unwrap_or(0);
        debug!(
            n_trees = trees.len(),
            n_samples = n,
            n_features,
            max_features = tree_params.max_features,
            max_depth,
            ?classes,
            "random forest trained"
        );

        Ok(ClassifierModel {
            band_names: band_names.to_vec(),
            classes,
            trees,
            training: samples.clone(),
        })
    }
}

/// Independent stream per tree, derived from the forest seed
fn tree_seed(seed: u64, tree: usize) -> u64 {
    // SplitMix64 step
    let mut z = seed.wrapping_add((tree as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Every sample must carry one value per band of its set
fn check_lengths(samples: &SampleSet) -> Result<()> {
    let expected = samples.band_names.len();
    match samples.samples.iter().find(|s| s.features.len() != expected) {
        Some(s) => Err(Error::LengthMismatch {
            what: "sample feature vector",
            expected,
            actual: s.features.len(),
        }),
        None => Ok(()),
    }
}

fn resolve_columns(wanted: &[String], available: &[String]) -> Result<Vec<usize>> {
    wanted
        .iter()
        .map(|name| {
            available.iter().position(|a| a == name).ok_or_else(|| Error::MissingBand {
                band: name.clone(),
                available: available.to_vec(),
            })
        })
        .collect()
}

/// A trained, immutable random forest
#[derive(Debug, Clone)]
pub struct ClassifierModel {
    band_names: Vec<String>,
    classes: Vec<i32>,
    trees: Vec<DecisionTree>,
    training: SampleSet,
}

impl ClassifierModel {
    /// Feature bands, in the order `predict_vector` expects
    pub fn band_names(&self) -> &[String] {
        &self.band_names
    }

    /// Sorted class labels seen in training
    pub fn classes(&self) -> &[i32] {
        &self.classes
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Majority vote for one feature vector in `band_names` order.
    ///
    /// Fails with `LengthMismatch` unless there is one value per band.
    pub fn predict_vector(&self, features: &[f64]) -> Result<i32> {
        if features.len() != self.band_names.len() {
            return Err(Error::LengthMismatch {
                what: "feature vector",
                expected: self.band_names.len(),
                actual: features.len(),
            });
        }
        Ok(self.vote(features))
    }

    fn vote(&self, features: &[f64]) -> i32 {
        if features.iter().any(|v| v.is_nan()) {
            return CLASS_NODATA;
        }
        let mut votes = vec![0usize; self.classes.len()];
        for tree in &self.trees {
            votes[tree.predict(features)] += 1;
        }
        self.classes[argmax(&votes)]
    }

    /// Predicted label per sample, aligned with `samples.samples`
    pub fn predict_samples(&self, samples: &SampleSet) -> Result<Vec<i32>> {
        check_lengths(samples)?;
        let columns = resolve_columns(&self.band_names, &samples.band_names)?;
        Ok(samples
            .samples
            .par_iter()
            .map(|s| {
                let features: Vec<f64> = columns.iter().map(|&c| s.features[c]).collect();
                self.vote(&features)
            })
            .collect())
    }

    /// Classify every pixel of a feature stack.
    ///
    /// Bands are matched by name; pixels with no-data in any feature band get
    /// [`CLASS_NODATA`], which is also the raster's no-data value.
    pub fn predict_raster(&self, stack: &RasterStack) -> Result<Raster<i32>> {
        let features = stack.select(&self.band_names)?;
        let template = features.template()?;
        let (rows, cols) = features.shape();

        let output_data: Vec<i32> = (0..rows)
            .into_par_iter()
            .flat_map(|row| {
                let mut row_data = vec![CLASS_NODATA; cols];
                let mut pixel = Vec::with_capacity(features.len());
                for (col, out) in row_data.iter_mut().enumerate() {
                    if features.pixel(row, col, &mut pixel) {
                        *out = self.vote(&pixel);
                    }
                }
                row_data
            })
            .collect();

        let mut output = template.with_same_meta::<i32>(rows, cols);
        output.set_nodata(Some(CLASS_NODATA));
        *output.data_mut() = Array2::from_shape_vec((rows, cols), output_data)
            .map_err(|e| Error::Other(e.to_string()))?;
        Ok(output)
    }

    /// Resubstitution accuracy on the model's own training samples
    pub fn training_accuracy(&self) -> Result<AccuracyReport> {
        self.accuracy(&self.training, AccuracyKind::Training)
    }

    /// Accuracy over held-out samples
    pub fn test_accuracy(&self, samples: &SampleSet) -> Result<AccuracyReport> {
        self.accuracy(samples, AccuracyKind::Test)
    }

    fn accuracy(&self, samples: &SampleSet, kind: AccuracyKind) -> Result<AccuracyReport> {
        let predicted = self.predict_samples(samples)?;
        let truth = samples.labels();
        let mut classes = self.classes.clone();
        classes.extend(truth.iter().copied());
        let matrix = ConfusionMatrix::from_labels(&truth, &predicted, &classes)?;
        Ok(AccuracyReport::new(kind, matrix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::Sample;
    use bakau_core::GeoTransform;

    fn samples() -> SampleSet {
        // Two well-separated blobs in (x, y); z is noise
        let mut out = Vec::new();
        for i in 0..40 {
            let jitter = (i % 7) as f64 * 0.01;
            let (x, y, label) = if i % 2 == 0 { (0.1 + jitter, 0.2, 0) } else { (0.8 + jitter, 0.9, 1) };
            out.push(Sample { features: vec![x, y, ((i * 13) % 10) as f64 / 10.0], label, source: i });
        }
        SampleSet::new(vec!["x".into(), "y".into(), "z".into()], out)
    }

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_train_and_predict() {
        let params = ForestParams { n_trees: 10, ..Default::default() };
        let model = RandomForest::train(&names(&["x", "y"]), &samples(), &params).unwrap();
        assert_eq!(model.n_trees(), 10);
        assert_eq!(model.classes(), &[0, 1]);
        assert_eq!(model.predict_vector(&[0.1, 0.2]).unwrap(), 0);
        assert_eq!(model.predict_vector(&[0.85, 0.9]).unwrap(), 1);
        assert_eq!(model.predict_vector(&[f64::NAN, 0.9]).unwrap(), CLASS_NODATA);

        let report = model.training_accuracy().unwrap();
        assert_eq!(report.kind, AccuracyKind::Training);
        assert_eq!(report.accuracy(), 1.0);
    }

    #[test]
    fn test_deterministic_with_seed() {
        let params = ForestParams { n_trees: 8, seed: 9, ..Default::default() };
        let a = RandomForest::train(&names(&["x", "y", "z"]), &samples(), &params).unwrap();
        let b = RandomForest::train(&names(&["x", "y", "z"]), &samples(), &params).unwrap();
        assert_eq!(a.trees, b.trees);
        assert_eq!(a.predict_samples(&samples()).unwrap(), b.predict_samples(&samples()).unwrap());
    }

    #[test]
    fn test_predict_raster_by_band_name() {
        let params = ForestParams { n_trees: 5, ..Default::default() };
        let model = RandomForest::train(&names(&["x", "y"]), &samples(), &params).unwrap();

        let band = |values: Vec<f64>| {
            let mut r = Raster::from_vec(values, 1, 3).unwrap();
            r.set_transform(GeoTransform::new(0.0, 1.0, 1.0, -1.0));
            r
        };
        // Bands out of order plus an extra one
        let stack = RasterStack::from_bands([
            ("y", band(vec![0.2, 0.9, 0.9])),
            ("extra", band(vec![0.0, 0.0, 0.0])),
            ("x", band(vec![0.1, 0.8, f64::NAN])),
        ])
        .unwrap();
        let out = model.predict_raster(&stack).unwrap();
        assert_eq!(out.data().iter().copied().collect::<Vec<_>>(), vec![0, 1, CLASS_NODATA]);
        assert_eq!(out.nodata(), Some(CLASS_NODATA));

        let missing = RasterStack::from_bands([("x", band(vec![0.0; 3]))]).unwrap();
        assert!(matches!(model.predict_raster(&missing), Err(Error::MissingBand { .. })));
    }

    #[test]
    fn test_invalid_params() {
        let s = samples();
        let bad = ForestParams { n_trees: 0, ..Default::default() };
        assert!(matches!(
            RandomForest::train(&names(&["x"]), &s, &bad),
            Err(Error::InvalidParameter { name: "forest.n_trees", .. })
        ));
        let too_many = ForestParams { max_features: Some(3), ..Default::default() };
        assert!(RandomForest::train(&names(&["x", "y"]), &s, &too_many).is_err());
        assert!(matches!(
            RandomForest::train(&names(&["q"]), &s, &ForestParams::default()),
            Err(Error::MissingBand { .. })
        ));
        assert!(matches!(
            RandomForest::train(&names(&["x"]), &SampleSet::default(), &ForestParams::default()),
            Err(Error::EmptyFeatureSet(_))
        ));
    }

    #[test]
    fn test_short_feature_vector_is_rejected() {
        let params = ForestParams { n_trees: 3, ..Default::default() };
        let model = RandomForest::train(&names(&["x", "y"]), &samples(), &params).unwrap();
        assert!(matches!(
            model.predict_vector(&[1.0]),
            Err(Error::LengthMismatch { expected: 2, actual: 1, .. })
        ));
        assert!(model.predict_vector(&[0.1, 0.2, 0.3]).is_err());
    }

    #[test]
    fn test_ragged_samples_are_rejected() {
        let mut ragged = samples();
        ragged.samples[3].features.truncate(1);
        let params = ForestParams { n_trees: 3, ..Default::default() };
        assert!(matches!(
            RandomForest::train(&names(&["x", "y"]), &ragged, &params),
            Err(Error::LengthMismatch { expected: 3, actual: 1, .. })
        ));

        let model = RandomForest::train(&names(&["x", "y"]), &samples(), &params).unwrap();
        assert!(matches!(model.test_accuracy(&ragged), Err(Error::LengthMismatch { .. })));
    }

    #[test]
    fn test_tree_seeds_differ() {
        assert_ne!(tree_seed(42, 0), tree_seed(42, 1));
        assert_ne!(tree_seed(1, 0), tree_seed(2, 0));
    }
}
