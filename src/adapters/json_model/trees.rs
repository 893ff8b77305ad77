//! Tree ensembles: random forests and gradient boosting.

use serde::{Deserialize, Serialize};

use crate::ports::{ClassId, Classifier, InferenceError, ModelError};

/// Array-of-nodes tree layout. A node is a leaf when both children are -1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedTree {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    /// Per-node outputs: class weights (counts or fractions) for
    /// classification trees, a single value for regression trees
    pub value: Vec<Vec<f64>>,
}

const LEAF: i64 = -1;

#[derive(Debug, Clone)]
struct Split {
    left: usize,
    right: usize,
    feature: usize,
    threshold: f64,
}

/// A fitted decision tree.
#[derive(Debug, Clone)]
pub struct DecisionTree {
    splits: Vec<Option<Split>>,
    leaves: Vec<Vec<f64>>,
}

impl DecisionTree {
    /// Classification tree; leaf weights are normalized to distributions.
    ///
    /// # Errors
    /// Returns `ModelError::Invalid` on inconsistent node arrays or leaf
    /// weights that are negative or sum to zero.
    pub fn classification(
        tree: ExportedTree,
        n_classes: usize,
        n_features: usize,
    ) -> Result<Self, ModelError> {
        Self::build(tree, n_classes, n_features, |i, weights| {
            let total: f64 = weights.iter().sum();
            if !(total > 0.0) || weights.iter().any(|w| *w < 0.0 || !w.is_finite()) {
                return Err(ModelError::Invalid(format!(
                    "leaf {i} has invalid class weights"
                )));
            }
            Ok(weights.iter().map(|w| w / total).collect())
        })
    }

    /// Regression tree with one finite output per leaf.
    ///
    /// # Errors
    /// Returns `ModelError::Invalid` on inconsistent node arrays.
    pub fn regression(tree: ExportedTree, n_features: usize) -> Result<Self, ModelError> {
        Self::build(tree, 1, n_features, |i, value| {
            if !value[0].is_finite() {
                return Err(ModelError::Invalid(format!("leaf {i} value is not finite")));
            }
            Ok(value.to_vec())
        })
    }

    fn build(
        tree: ExportedTree,
        n_outputs: usize,
        n_features: usize,
        leaf: impl Fn(usize, &[f64]) -> Result<Vec<f64>, ModelError>,
    ) -> Result<Self, ModelError> {
        let n = tree.children_left.len();
        if n == 0 {
            return Err(ModelError::Invalid("tree has no nodes".into()));
        }
        if tree.children_right.len() != n
            || tree.feature.len() != n
            || tree.threshold.len() != n
            || tree.value.len() != n
        {
            return Err(ModelError::Invalid(
                "tree node arrays have different lengths".into(),
            ));
        }

        let mut splits = Vec::with_capacity(n);
        let mut leaves = Vec::with_capacity(n);
        for i in 0..n {
            let (left, right) = (tree.children_left[i], tree.children_right[i]);
            if left == LEAF && right == LEAF {
                if tree.value[i].len() != n_outputs {
                    return Err(ModelError::Invalid(format!(
                        "leaf {i} has {} outputs, expected {n_outputs}",
                        tree.value[i].len()
                    )));
                }
                splits.push(None);
                leaves.push(leaf(i, &tree.value[i])?);
                continue;
            }

            // Children strictly after the parent rules out cycles.
            let child_ok = |c: i64| c > i as i64 && (c as usize) < n;
            if !child_ok(left) || !child_ok(right) {
                return Err(ModelError::Invalid(format!(
                    "node {i} has out-of-order children ({left}, {right})"
                )));
            }
            let feature = tree.feature[i];
            if feature < 0 || feature as usize >= n_features {
                return Err(ModelError::Invalid(format!(
                    "node {i} splits on feature {feature} of {n_features}"
                )));
            }
            splits.push(Some(Split {
                left: left as usize,
                right: right as usize,
                feature: feature as usize,
                threshold: tree.threshold[i],
            }));
            leaves.push(Vec::new());
        }

        Ok(Self { splits, leaves })
    }

    /// Leaf output for one sample.
    #[must_use]
    pub fn leaf(&self, features: &[f64]) -> &[f64] {
        let mut index = 0;
        while let Some(split) = &self.splits[index] {
            // Split thresholds were fitted on single-precision inputs.
            let x = f64::from(features[split.feature] as f32);
            index = if x <= split.threshold {
                split.left
            } else {
                split.right
            };
        }
        &self.leaves[index]
    }
}

pub(crate) fn check_classes(classes: &[ClassId]) -> Result<(), ModelError> {
    if classes.is_empty() {
        return Err(ModelError::Invalid("classifier declares no classes".into()));
    }
    let unique: std::collections::BTreeSet<_> = classes.iter().collect();
    if unique.len() != classes.len() {
        return Err(ModelError::Invalid(format!(
            "classifier declares duplicate classes {classes:?}"
        )));
    }
    Ok(())
}

pub(crate) fn check_width(features: &[f64], expected: usize) -> Result<(), InferenceError> {
    if features.len() != expected {
        return Err(InferenceError::FeatureCount {
            expected,
            got: features.len(),
        });
    }
    Ok(())
}

/// Bagged trees; class probabilities are the mean of the leaf distributions.
#[derive(Debug, Clone)]
pub struct RandomForest {
    classes: Vec<ClassId>,
    trees: Vec<DecisionTree>,
    n_features: usize,
}

impl RandomForest {
    /// # Errors
    /// Returns `ModelError::Invalid` if there are no trees or a tree is invalid.
    pub fn new(
        classes: Vec<ClassId>,
        trees: Vec<ExportedTree>,
        n_features: usize,
    ) -> Result<Self, ModelError> {
        check_classes(&classes)?;
        if trees.is_empty() {
            return Err(ModelError::Invalid("forest has no trees".into()));
        }
        let trees = trees
            .into_iter()
            .map(|t| DecisionTree::classification(t, classes.len(), n_features))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            classes,
            trees,
            n_features,
        })
    }
}

impl Classifier for RandomForest {
    fn classes(&self) -> &[ClassId] {
        &self.classes
    }

    fn predict_distribution(&self, features: &[f64]) -> Result<Vec<f64>, InferenceError> {
        check_width(features, self.n_features)?;
        let mut proba = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            for (acc, p) in proba.iter_mut().zip(tree.leaf(features)) {
                *acc += p;
            }
        }
        let n = self.trees.len() as f64;
        Ok(proba.into_iter().map(|p| p / n).collect())
    }
}

/// Additive regression trees on the log-odds scale.
///
/// Multiclass models keep one score per class and one tree per class in
/// each stage; binary models keep a single score for the second class.
#[derive(Debug, Clone)]
pub struct GradientBoosting {
    classes: Vec<ClassId>,
    learning_rate: f64,
    init: Vec<f64>,
    stages: Vec<Vec<DecisionTree>>,
    n_features: usize,
}

impl GradientBoosting {
    /// # Errors
    /// Returns `ModelError::Invalid` if stage widths do not match the score
    /// count or a tree is invalid.
    pub fn new(
        classes: Vec<ClassId>,
        learning_rate: f64,
        init: Vec<f64>,
        stages: Vec<Vec<ExportedTree>>,
        n_features: usize,
    ) -> Result<Self, ModelError> {
        check_classes(&classes)?;
        let n_scores = if classes.len() == 2 { 1 } else { classes.len() };
        if init.len() != n_scores {
            return Err(ModelError::Invalid(format!(
                "boosting init has {} scores, expected {n_scores}",
                init.len()
            )));
        }
        if !learning_rate.is_finite() || init.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::Invalid(
                "boosting parameters must be finite".into(),
            ));
        }
        let stages = stages
            .into_iter()
            .map(|stage| {
                if stage.len() != n_scores {
                    return Err(ModelError::Invalid(format!(
                        "boosting stage has {} trees, expected {n_scores}",
                        stage.len()
                    )));
                }
                stage
                    .into_iter()
                    .map(|t| DecisionTree::regression(t, n_features))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            classes,
            learning_rate,
            init,
            stages,
            n_features,
        })
    }
}

impl Classifier for GradientBoosting {
    fn classes(&self) -> &[ClassId] {
        &self.classes
    }

    fn decision_scores(&self, features: &[f64]) -> Result<Vec<f64>, InferenceError> {
        check_width(features, self.n_features)?;
        let mut scores = self.init.clone();
        for stage in &self.stages {
            for (score, tree) in scores.iter_mut().zip(stage) {
                *score += self.learning_rate * tree.leaf(features)[0];
            }
        }
        Ok(scores)
    }

    fn predict_distribution(&self, features: &[f64]) -> Result<Vec<f64>, InferenceError> {
        let scores = self.decision_scores(features)?;
        Ok(scores_to_distribution(&scores))
    }
}

/// Sigmoid for a single binary score, softmax otherwise.
pub(crate) fn scores_to_distribution(scores: &[f64]) -> Vec<f64> {
    if let [score] = scores {
        let p = 1.0 / (1.0 + (-score).exp());
        return vec![1.0 - p, p];
    }
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}
