//! CART decision trees with Gini impurity
//!
//! Trees work on class indices (`0..n_classes`), not raw labels; the forest
//! owns the mapping back to labels.

use rand::rngs::StdRng;
use rand::seq::index::sample as sample_indices;

/// Row-major training matrix with class indices
#[derive(Debug, Clone)]
pub(crate) struct Dataset {
    pub values: Vec<f64>,
    pub targets: Vec<usize>,
    pub n_features: usize,
    pub n_classes: usize,
}

impl Dataset {
    #[inline]
    fn value(&self, row: usize, feature: usize) -> f64 {
        self.values[row * self.n_features + feature]
    }
}

/// Growth limits for one tree
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeParams {
    pub max_features: usize,
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        class: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A fitted classification tree
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DecisionTree {
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

/// Pending node: a slice of the row buffer and where to attach it
struct Task {
    start: usize,
    end: usize,
    depth: usize,
    parent: Option<(usize, Side)>,
}

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
}

impl DecisionTree {
    /// Grow a tree on the given rows of `data` (repeats allowed, e.g. a bootstrap).
    ///
    /// Nodes are laid out depth-first, left child before right, from an
    /// explicit work stack rather than recursion.
    pub fn fit(data: &Dataset, rows: &mut [usize], params: &TreeParams, rng: &mut StdRng) -> Self {
        let mut nodes = Vec::new();
        let mut pending = vec![Task { start: 0, end: rows.len(), depth: 0, parent: None }];

        while let Some(task) = pending.pop() {
            let index = nodes.len();
            if let Some((parent, side)) = task.parent {
                if let Node::Split { left, right, .. } = &mut nodes[parent] {
                    match side {
                        Side::Left => *left = index,
                        Side::Right => *right = index,
                    }
                }
            }

            let rows = &mut rows[task.start..task.end];
            let counts = class_counts(data, rows);
            let majority = argmax(&counts);
            nodes.push(Node::Leaf { class: majority });

            let n = rows.len();
            let pure = counts[majority] == n;
            let depth_reached = params.max_depth.is_some_and(|d| task.depth >= d);
            if pure || depth_reached || n < 2 * params.min_samples_leaf {
                continue;
            }

            let parent = gini(&counts, n);
            let Some(best) = best_split(data, rows, params, rng) else {
                continue;
            };
            if best.impurity >= parent - 1e-12 {
                continue;
            }

            let mid = task.start + partition(rows, |r| data.value(r, best.feature) <= best.threshold);
            nodes[index] = Node::Split {
                feature: best.feature,
                threshold: best.threshold,
                left: index,
                right: index,
            };
            let depth = task.depth + 1;
            pending.push(Task { start: mid, end: task.end, depth, parent: Some((index, Side::Right)) });
            pending.push(Task { start: task.start, end: mid, depth, parent: Some((index, Side::Left)) });
        }

        Self { nodes }
    }

    /// Class index for one feature vector of `n_features` values
    pub fn predict(&self, features: &[f64]) -> usize {
        let mut node = 0;
        loop {
            match &self.nodes[node] {
                Node::Leaf { class } => return *class,
                Node::Split { feature, threshold, left, right } => {
                    node = if features[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((i, depth)) = stack.pop() {
            match &self.nodes[i] {
                Node::Leaf { .. } => deepest = deepest.max(depth),
                Node::Split { left, right, .. } => {
                    stack.push((*left, depth + 1));
                    stack.push((*right, depth + 1));
                }
            }
        }
        deepest
    }
}

fn class_counts(data: &Dataset, rows: &[usize]) -> Vec<usize> {
    let mut counts = vec![0; data.n_classes];
    for &r in rows {
        counts[data.targets[r]] += 1;
    }
    counts
}

/// Index of the largest count; ties go to the smallest index
pub(crate) fn argmax(counts: &[usize]) -> usize {
    let mut best = 0;
    for (i, &c) in counts.iter().enumerate() {
        if c > counts[best] {
            best = i;
        }
    }
    best
}

fn gini(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>()
}

/// Lowest weighted child impurity over `max_features` random features.
///
/// Thresholds are midpoints between consecutive distinct sorted values.
fn best_split(data: &Dataset, rows: &[usize], params: &TreeParams, rng: &mut StdRng) -> Option<BestSplit> {
    let n = rows.len();
    let mtry = params.max_features.clamp(1, data.n_features);
    let mut best: Option<BestSplit> = None;
    let mut column: Vec<(f64, usize)> = Vec::with_capacity(n);

    for feature in sample_indices(rng, data.n_features, mtry).into_iter() {
        column.clear();
        column.extend(rows.iter().map(|&r| (data.value(r, feature), data.targets[r])));
        column.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut left = vec![0usize; data.n_classes];
        let mut right = vec![0usize; data.n_classes];
        for &(_, class) in &column {
            right[class] += 1;
        }

        for i in 0..n - 1 {
            let class = column[i].1;
            left[class] += 1;
            right[class] -= 1;

            let n_left = i + 1;
            let n_right = n - n_left;
            if column[i].0 == column[i + 1].0 || n_left < params.min_samples_leaf || n_right < params.min_samples_leaf {
                continue;
            }

            let impurity = (n_left as f64 * gini(&left, n_left) + n_right as f64 * gini(&right, n_right)) / n as f64;
            if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                best = Some(BestSplit {
                    feature,
                    threshold: 0.5 * (column[i].0 + column[i + 1].0),
                    impurity,
                });
            }
        }
    }

    best
}

/// Reorder `rows` so those matching `pred` come first; returns their count
fn partition<F: Fn(usize) -> bool>(rows: &mut [usize], pred: F) -> usize {
    let mut mid = 0;
    for i in 0..rows.len() {
        if pred(rows[i]) {
            rows.swap(i, mid);
            mid += 1;
        }
    }
    mid
}
