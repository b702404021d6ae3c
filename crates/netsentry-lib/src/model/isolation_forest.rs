//! Isolation forest outlier model
//!
//! Each tree isolates points by recursive random axis-aligned splits on a
//! random sub-sample. Outliers need fewer splits, so their average path
//! length is shorter. The decision threshold is the contamination
//! percentile of the training scores.

use super::{OutlierEstimator, OutlierModel};
use crate::error::{TrainingError, TrainingResult};
use crate::models::{FeaturePoint, FEATURE_DIMS};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

pub const DEFAULT_N_TREES: usize = 100;
pub const DEFAULT_MAX_SAMPLES: usize = 256;
pub const DEFAULT_CONTAMINATION: f64 = 0.05;
pub const DEFAULT_SEED: u64 = 42;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, PartialEq)]
pub struct IsolationForestParams {
    pub n_trees: usize,
    /// Upper bound on the per-tree sub-sample size
    pub max_samples: usize,
    /// Expected share of outliers in the training set
    pub contamination: f64,
    pub seed: u64,
}

impl Default for IsolationForestParams {
    fn default() -> Self {
        Self {
            n_trees: DEFAULT_N_TREES,
            max_samples: DEFAULT_MAX_SAMPLES,
            contamination: DEFAULT_CONTAMINATION,
            seed: DEFAULT_SEED,
        }
    }
}

/// Estimator producing [`IsolationForestModel`]s
#[derive(Debug, Clone, Default)]
pub struct IsolationForest {
    params: IsolationForestParams,
}

impl IsolationForest {
    pub fn new(params: IsolationForestParams) -> Self {
        Self { params }
    }

    pub fn with_contamination(mut self, contamination: f64) -> Self {
        self.params.contamination = contamination;
        self
    }

    pub fn params(&self) -> &IsolationForestParams {
        &self.params
    }

    /// Fit and return the concrete model type
    pub fn fit_forest(&self, rows: &[FeaturePoint]) -> TrainingResult<IsolationForestModel> {
        validate(rows, self.params.contamination)?;

        let sample_size = self.params.max_samples.clamp(1, rows.len());
        let max_depth = (sample_size.max(2) as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(self.params.seed);

        let trees = (0..self.params.n_trees.max(1))
            .map(|_| {
                let sample = index::sample(&mut rng, rows.len(), sample_size).into_vec();
                build_tree(rows, sample, 0, max_depth, &mut rng)
            })
            .collect();

        let mut model = IsolationForestModel {
            trees,
            sample_size,
            offset: 0.0,
        };

        let mut scores: Vec<f64> = rows.iter().map(|row| model.score_sample(row)).collect();
        model.offset = percentile(&mut scores, self.params.contamination);

        Ok(model)
    }
}

impl OutlierEstimator for IsolationForest {
    fn fit(&self, rows: &[FeaturePoint]) -> TrainingResult<Box<dyn OutlierModel>> {
        Ok(Box::new(self.fit_forest(rows)?))
    }

    fn name(&self) -> &str {
        "isolation_forest"
    }
}

fn validate(rows: &[FeaturePoint], contamination: f64) -> TrainingResult<()> {
    if !(contamination > 0.0 && contamination <= 0.5) {
        return Err(TrainingError::InvalidContamination(contamination));
    }
    let Some(first) = rows.first() else {
        return Err(TrainingError::EmptyTrainingSet);
    };
    if rows.iter().flatten().any(|v| !v.is_finite()) {
        return Err(TrainingError::NonFiniteFeatures);
    }
    if rows.iter().all(|row| row == first) {
        return Err(TrainingError::DegenerateFeatures { rows: rows.len() });
    }
    Ok(())
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

fn build_tree(
    rows: &[FeaturePoint],
    sample: Vec<usize>,
    depth: usize,
    max_depth: usize,
    rng: &mut StdRng,
) -> Node {
    if depth >= max_depth || sample.len() <= 1 {
        return Node::Leaf { size: sample.len() };
    }

    let mut candidates = Vec::with_capacity(FEATURE_DIMS);
    for feature in 0..FEATURE_DIMS {
        let (min, max) = sample
            .iter()
            .map(|&i| rows[i][feature])
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        if max > min {
            candidates.push((feature, min, max));
        }
    }

    // every point in this node is identical
    if candidates.is_empty() {
        return Node::Leaf { size: sample.len() };
    }

    let (feature, min, max) = candidates[rng.gen_range(0..candidates.len())];
    let threshold = rng.gen_range(min..max);
    let (left, right): (Vec<usize>, Vec<usize>) =
        sample.into_iter().partition(|&i| rows[i][feature] <= threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build_tree(rows, left, depth + 1, max_depth, rng)),
        right: Box::new(build_tree(rows, right, depth + 1, max_depth, rng)),
    }
}

/// Average path length of an unsuccessful search in a BST of `n` nodes
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolated percentile, `q` in [0, 1]
fn percentile(values: &mut [f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pos = q.clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    values[lo] + (values[hi] - values[lo]) * (pos - lo as f64)
}

/// Fitted forest
#[derive(Debug, Clone)]
pub struct IsolationForestModel {
    trees: Vec<Node>,
    sample_size: usize,
    offset: f64,
}

impl IsolationForestModel {
    /// Raw anomaly score in [-1, 0); lower is more anomalous
    pub fn score_sample(&self, point: &FeaturePoint) -> f64 {
        let mean_depth = self
            .trees
            .iter()
            .map(|tree| path_length(tree, point, 0))
            .sum::<f64>()
            / self.trees.len() as f64;

        let normalizer = average_path_length(self.sample_size);
        if normalizer <= 0.0 {
            return -0.5;
        }
        -(2f64.powf(-mean_depth / normalizer))
    }

    /// Threshold subtracted from raw scores
    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl OutlierModel for IsolationForestModel {
    fn decision(&self, point: &FeaturePoint) -> f64 {
        self.score_sample(point) - self.offset
    }
}

fn path_length(node: &Node, point: &FeaturePoint, depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if point[*feature] <= *threshold {
                path_length(left, point, depth + 1)
            } else {
                path_length(right, point, depth + 1)
            }
        }
    }
}
