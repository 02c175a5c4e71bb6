//! Confusion matrix and accuracy metrics
//!
//! Rows are true classes, columns predicted classes, both in ascending label
//! order. Training (resubstitution) and test accuracy are reported through
//! [`AccuracyReport`] so the two can never be confused.

use bakau_core::{Error, Result};
use ndarray::Array2;
use std::fmt;

/// K x K table of label agreement counts
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionMatrix {
    classes: Vec<i32>,
    counts: Array2<u64>,
}

impl ConfusionMatrix {
    /// Cross-tabulate true against predicted labels.
    ///
    /// `classes` is sorted and deduplicated. A label outside it fails with
    /// `InvalidParameter`; slices of different length fail with `SizeMismatch`.
    pub fn from_labels(truth: &[i32], predicted: &[i32], classes: &[i32]) -> Result<Self> {
        if truth.len() != predicted.len() {
            return Err(Error::SizeMismatch {
                er: truth.len(),
                ec: 1,
                ar: predicted.len(),
                ac: 1,
            });
        }
        let mut classes = classes.to_vec();
        classes.sort_unstable();
        classes.dedup();
        if classes.is_empty() {
            return Err(Error::invalid_param("confusion.classes", "[]", "at least one class is required"));
        }

        let index = |label: i32| {
            classes
                .binary_search(&label)
                .map_err(|_| Error::invalid_param("confusion.label", label, format!("not in class set {:?}", classes)))
        };

        let k = classes.len();
        let mut counts = Array2::<u64>::zeros((k, k));
        for (&t, &p) in truth.iter().zip(predicted) {
            counts[(index(t)?, index(p)?)] += 1;
        }

        Ok(Self { classes, counts })
    }

    /// Class labels in row/column order
    pub fn classes(&self) -> &[i32] {
        &self.classes
    }

    /// Raw counts, rows true, columns predicted
    pub fn counts(&self) -> &Array2<u64> {
        &self.counts
    }

    /// Count for a `(true, predicted)` label pair, 0 for unknown labels
    pub fn get(&self, truth: i32, predicted: i32) -> u64 {
        match (self.classes.binary_search(&truth), self.classes.binary_search(&predicted)) {
            (Ok(i), Ok(j)) => self.counts[(i, j)],
            _ => 0,
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.sum()
    }

    /// Samples per true class
    pub fn row_totals(&self) -> Vec<u64> {
        self.counts.rows().into_iter().map(|r| r.sum()).collect()
    }

    /// Samples per predicted class
    pub fn col_totals(&self) -> Vec<u64> {
        self.counts.columns().into_iter().map(|c| c.sum()).collect()
    }

    fn diagonal(&self) -> u64 {
        self.counts.diag().sum()
    }

    /// Sum of off-diagonal counts
    pub fn errors(&self) -> u64 {
        self.total() - self.diagonal()
    }

    /// Overall accuracy, diagonal over total (0 when empty)
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.diagonal() as f64 / total as f64
    }

    /// Producer's accuracy (recall) per class; `NaN` for a class with no true sample
    pub fn producers_accuracy(&self) -> Vec<f64> {
        self.row_totals()
            .iter()
            .enumerate()
            .map(|(i, &n)| if n == 0 { f64::NAN } else { self.counts[(i, i)] as f64 / n as f64 })
            .collect()
    }

    /// Consumer's accuracy (precision) per class; `NaN` for a never-predicted class
    pub fn consumers_accuracy(&self) -> Vec<f64> {
        self.col_totals()
            .iter()
            .enumerate()
            .map(|(j, &n)| if n == 0 { f64::NAN } else { self.counts[(j, j)] as f64 / n as f64 })
            .collect()
    }

    /// Cohen's kappa
    pub fn kappa(&self) -> f64 {
        let total = self.total() as f64;
        if total == 0.0 {
            return 0.0;
        }
        let observed = self.accuracy();
        let expected: f64 = self
            .row_totals()
            .iter()
            .zip(self.col_totals())
            .map(|(&r, c)| (r as f64 / total) * (c as f64 / total))
            .sum();
        if (1.0 - expected).abs() < 1e-12 {
            return if observed >= 1.0 { 1.0 } else { 0.0 };
        }
        (observed - expected) / (1.0 - expected)
    }

    /// F1 score per class, 0 where precision and recall are both 0 or undefined
    pub fn f_score(&self) -> Vec<f64> {
        self.producers_accuracy()
            .into_iter()
            .zip(self.consumers_accuracy())
            .map(|(r, p)| {
                let (r, p) = (if r.is_nan() { 0.0 } else { r }, if p.is_nan() { 0.0 } else { p });
                if r + p == 0.0 {
                    0.0
                } else {
                    2.0 * p * r / (p + r)
                }
            })
            .collect()
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>10}", "true\\pred")?;
        for c in &self.classes {
            write!(f, "{:>8}", c)?;
        }
        writeln!(f)?;
        for (i, c) in self.classes.iter().enumerate() {
            write!(f, "{:>10}", c)?;
            for j in 0..self.classes.len() {
                write!(f, "{:>8}", self.counts[(i, j)])?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Which samples an accuracy figure was computed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccuracyKind {
    /// Model evaluated on its own training samples (optimistic)
    Training,
    /// Model evaluated on held-out samples
    Test,
}

impl fmt::Display for AccuracyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccuracyKind::Training => write!(f, "Training"),
            AccuracyKind::Test => write!(f, "Test"),
        }
    }
}

/// Confusion matrix tagged with the sample set it describes
#[derive(Debug, Clone, PartialEq)]
pub struct AccuracyReport {
    pub kind: AccuracyKind,
    pub matrix: ConfusionMatrix,
}

impl AccuracyReport {
    pub fn new(kind: AccuracyKind, matrix: ConfusionMatrix) -> Self {
        Self { kind, matrix }
    }

    pub fn accuracy(&self) -> f64 {
        self.matrix.accuracy()
    }
}

impl fmt::Display for AccuracyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} accuracy: {:.4} (kappa {:.4}, n = {})",
            self.kind,
            self.matrix.accuracy(),
            self.matrix.kappa(),
            self.matrix.total()
        )?;
        write!(f, "{}", self.matrix)?;
        let fmt_vec = |v: Vec<f64>| v.iter().map(|x| format!("{:.3}", x)).collect::<Vec<_>>().join(" ");
        writeln!(f, "producers: {}", fmt_vec(self.matrix.producers_accuracy()))?;
        writeln!(f, "consumers: {}", fmt_vec(self.matrix.consumers_accuracy()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_perfect_classifier() {
        let truth = [0, 1, 1, 0, 1];
        let m = ConfusionMatrix::from_labels(&truth, &truth, &[0, 1]).unwrap();
        assert_eq!(m.errors(), 0);
        assert_relative_eq!(m.accuracy(), 1.0);
        assert_relative_eq!(m.kappa(), 1.0);
        assert_eq!(m.row_totals(), vec![2, 3]);
    }

    #[test]
    fn test_majority_classifier() {
        let truth = [1, 1, 1, 0];
        let m = ConfusionMatrix::from_labels(&truth, &[1, 1, 1, 1], &[0, 1]).unwrap();
        assert_relative_eq!(m.accuracy(), 0.75);
        assert_relative_eq!(m.kappa(), 0.0);
        assert!(m.consumers_accuracy()[0].is_nan());
        assert_relative_eq!(m.producers_accuracy()[1], 1.0);
        assert_relative_eq!(m.f_score()[0], 0.0);
    }

    #[test]
    fn test_metrics() {
        // rows true, cols predicted: [[3, 1], [2, 4]]
        let truth = [0, 0, 0, 0, 1, 1, 1, 1, 1, 1];
        let pred = [0, 0, 0, 1, 0, 0, 1, 1, 1, 1];
        let m = ConfusionMatrix::from_labels(&truth, &pred, &[1, 0]).unwrap();
        assert_eq!(m.classes(), &[0, 1]);
        assert_eq!(m.get(0, 1), 1);
        assert_eq!(m.get(1, 0), 2);
        assert_relative_eq!(m.accuracy(), 0.7);
        assert_relative_eq!(m.producers_accuracy()[0], 0.75);
        assert_relative_eq!(m.consumers_accuracy()[0], 0.6);
        // pe = 0.4 * 0.5 + 0.6 * 0.5 = 0.5
        assert_relative_eq!(m.kappa(), 0.4, epsilon = 1e-12);
        assert_relative_eq!(m.f_score()[0], 2.0 * 0.6 * 0.75 / 1.35, epsilon = 1e-12);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(ConfusionMatrix::from_labels(&[0, 1], &[0], &[0, 1]), Err(Error::SizeMismatch { .. })));
        assert!(matches!(
            ConfusionMatrix::from_labels(&[0, 2], &[0, 1], &[0, 1]),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_report_display() {
        let m = ConfusionMatrix::from_labels(&[0, 1], &[0, 1], &[0, 1]).unwrap();
        let text = AccuracyReport::new(AccuracyKind::Test, m).to_string();
        assert!(text.starts_with("Test accuracy: 1.0000"));
    }
}
