//! Classifier families supported by the exchange format.
//!
//! - `linear`: multinomial logistic regression (softmax), or binary logistic
//!   regression when a single coefficient row is exported for two classes
//! - `forest`: decision trees whose leaf class distributions are averaged
//! - `boosting`: gradient-boosted regression trees on the log-odds scale
//! - `calibrated`: isotonic calibration over a nested classifier
//! - `voting`: weighted soft voting over nested classifiers

use serde::{Deserialize, Serialize};

use super::trees::{check_classes, check_width, scores_to_distribution, ExportedTree};
use super::trees::{GradientBoosting, RandomForest};
use crate::ports::{ClassId, Classifier, InferenceError, ModelError};

/// Classifier parameters as exported by the training pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExportedClassifier {
    Linear {
        classes: Vec<ClassId>,
        coefficients: Vec<Vec<f64>>,
        intercepts: Vec<f64>,
    },
    Forest {
        classes: Vec<ClassId>,
        trees: Vec<ExportedTree>,
    },
    Boosting {
        classes: Vec<ClassId>,
        learning_rate: f64,
        init: Vec<f64>,
        /// One tree per score column in every stage
        stages: Vec<Vec<ExportedTree>>,
    },
    Calibrated {
        base: Box<ExportedClassifier>,
        #[serde(default)]
        response: CalibrationInput,
        calibrators: Vec<ExportedIsotonic>,
    },
    Voting {
        #[serde(default)]
        weights: Vec<f64>,
        estimators: Vec<ExportedClassifier>,
    },
}

/// Which base output the calibrators were fitted on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationInput {
    #[default]
    Probability,
    Decision,
}

/// Piecewise-linear isotonic fit, clipped to its end points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedIsotonic {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl ExportedClassifier {
    /// Validate parameters and build a runnable classifier.
    ///
    /// # Errors
    /// Returns `ModelError::Invalid` if shapes are inconsistent.
    pub fn build(self, n_features: usize) -> Result<Box<dyn Classifier>, ModelError> {
        let classifier: Box<dyn Classifier> = match self {
            Self::Linear {
                classes,
                coefficients,
                intercepts,
            } => Box::new(LinearModel::new(
                classes,
                coefficients,
                intercepts,
                n_features,
            )?),
            Self::Forest { classes, trees } => {
                Box::new(RandomForest::new(classes, trees, n_features)?)
            }
            Self::Boosting {
                classes,
                learning_rate,
                init,
                stages,
            } => Box::new(GradientBoosting::new(
                classes,
                learning_rate,
                init,
                stages,
                n_features,
            )?),
            Self::Calibrated {
                base,
                response,
                calibrators,
            } => {
                let calibrators = calibrators
                    .into_iter()
                    .map(Isotonic::new)
                    .collect::<Result<Vec<_>, _>>()?;
                Box::new(IsotonicCalibrated::new(
                    base.build(n_features)?,
                    response,
                    calibrators,
                )?)
            }
            Self::Voting {
                weights,
                estimators,
            } => {
                let estimators = estimators
                    .into_iter()
                    .map(|e| e.build(n_features))
                    .collect::<Result<Vec<_>, _>>()?;
                Box::new(SoftVoting::new(weights, estimators)?)
            }
        };
        Ok(classifier)
    }
}

/// Logistic regression over standardized features.
#[derive(Debug, Clone)]
pub struct LinearModel {
    classes: Vec<ClassId>,
    coefficients: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
    n_features: usize,
}

impl LinearModel {
    /// # Errors
    /// Returns `ModelError::Invalid` if the weight matrix does not match the
    /// classes or the feature count.
    pub fn new(
        classes: Vec<ClassId>,
        coefficients: Vec<Vec<f64>>,
        intercepts: Vec<f64>,
        n_features: usize,
    ) -> Result<Self, ModelError> {
        check_classes(&classes)?;
        let binary = classes.len() == 2 && coefficients.len() == 1;
        if !binary && coefficients.len() != classes.len() {
            return Err(ModelError::Invalid(format!(
                "linear model has {} coefficient rows for {} classes",
                coefficients.len(),
                classes.len()
            )));
        }
        if intercepts.len() != coefficients.len() {
            return Err(ModelError::Invalid(format!(
                "linear model has {} intercepts for {} coefficient rows",
                intercepts.len(),
                coefficients.len()
            )));
        }
        if let Some(row) = coefficients.iter().find(|row| row.len() != n_features) {
            return Err(ModelError::Invalid(format!(
                "linear coefficient row has {} weights for {} features",
                row.len(),
                n_features
            )));
        }

        Ok(Self {
            classes,
            coefficients,
            intercepts,
            n_features,
        })
    }
}

impl Classifier for LinearModel {
    fn classes(&self) -> &[ClassId] {
        &self.classes
    }

    fn decision_scores(&self, features: &[f64]) -> Result<Vec<f64>, InferenceError> {
        check_width(features, self.n_features)?;
        Ok(self
            .coefficients
            .iter()
            .zip(&self.intercepts)
            .map(|(row, b)| row.iter().zip(features).map(|(w, x)| w * x).sum::<f64>() + b)
            .collect())
    }

    fn predict_distribution(&self, features: &[f64]) -> Result<Vec<f64>, InferenceError> {
        let scores = self.decision_scores(features)?;
        Ok(scores_to_distribution(&scores))
    }
}

#[derive(Debug, Clone)]
struct Isotonic {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl Isotonic {
    fn new(exported: ExportedIsotonic) -> Result<Self, ModelError> {
        let ExportedIsotonic { x, y } = exported;
        if x.is_empty() || x.len() != y.len() {
            return Err(ModelError::Invalid(format!(
                "isotonic calibrator has {} thresholds and {} values",
                x.len(),
                y.len()
            )));
        }
        if x.iter().chain(&y).any(|v| !v.is_finite()) {
            return Err(ModelError::Invalid(
                "isotonic calibrator values must be finite".into(),
            ));
        }
        if x.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ModelError::Invalid(
                "isotonic thresholds must be strictly increasing".into(),
            ));
        }
        Ok(Self { x, y })
    }

    fn apply(&self, value: f64) -> f64 {
        let n = self.x.len();
        let value = value.clamp(self.x[0], self.x[n - 1]);
        // Last threshold not above the value.
        let j = self.x.partition_point(|&t| t <= value).saturating_sub(1);
        if j + 1 >= n || self.x[j] == value {
            return self.y[j];
        }
        let slope = (self.y[j + 1] - self.y[j]) / (self.x[j + 1] - self.x[j]);
        slope * (value - self.x[j]) + self.y[j]
    }
}

/// Base classifier whose per-class outputs are remapped by isotonic fits
/// and renormalized.
pub struct IsotonicCalibrated {
    base: Box<dyn Classifier>,
    response: CalibrationInput,
    calibrators: Vec<Isotonic>,
}

impl IsotonicCalibrated {
    fn new(
        base: Box<dyn Classifier>,
        response: CalibrationInput,
        calibrators: Vec<Isotonic>,
    ) -> Result<Self, ModelError> {
        let n_classes = base.classes().len();
        let expected = if n_classes == 2 { 1 } else { n_classes };
        if calibrators.len() != expected {
            return Err(ModelError::Invalid(format!(
                "calibrated model has {} calibrators for {n_classes} classes",
                calibrators.len()
            )));
        }
        Ok(Self {
            base,
            response,
            calibrators,
        })
    }
}

impl Classifier for IsotonicCalibrated {
    fn classes(&self) -> &[ClassId] {
        self.base.classes()
    }

    fn predict_distribution(&self, features: &[f64]) -> Result<Vec<f64>, InferenceError> {
        let raw = match self.response {
            CalibrationInput::Probability => self.base.predict_distribution(features)?,
            CalibrationInput::Decision => self.base.decision_scores(features)?,
        };

        if let [calibrator] = self.calibrators.as_slice() {
            // Binary: calibrate the second class only.
            let input = match (self.response, raw.as_slice()) {
                (CalibrationInput::Probability, [_, p1]) => *p1,
                (CalibrationInput::Decision, [score]) => *score,
                _ => {
                    return Err(InferenceError::Malformed(format!(
                        "binary calibration received {} base outputs",
                        raw.len()
                    )))
                }
            };
            let p1 = calibrator.apply(input);
            return Ok(vec![1.0 - p1, p1]);
        }

        if raw.len() != self.calibrators.len() {
            return Err(InferenceError::Malformed(format!(
                "calibration received {} base outputs for {} classes",
                raw.len(),
                self.calibrators.len()
            )));
        }
        let proba: Vec<f64> = raw
            .iter()
            .zip(&self.calibrators)
            .map(|(v, c)| c.apply(*v))
            .collect();
        let total: f64 = proba.iter().sum();
        if total == 0.0 {
            let n = proba.len() as f64;
            return Ok(vec![1.0 / n; proba.len()]);
        }
        Ok(proba
            .into_iter()
            .map(|p| p / total)
            .map(|p| if p > 1.0 && p <= 1.0 + 1e-5 { 1.0 } else { p })
            .collect())
    }
}

/// Weighted average of member probability distributions.
pub struct SoftVoting {
    classes: Vec<ClassId>,
    weights: Vec<f64>,
    estimators: Vec<Box<dyn Classifier>>,
}

impl SoftVoting {
    /// Empty `weights` means equal weighting.
    ///
    /// # Errors
    /// Returns `ModelError::Invalid` if members disagree on classes or the
    /// weights are unusable.
    pub fn new(
        weights: Vec<f64>,
        estimators: Vec<Box<dyn Classifier>>,
    ) -> Result<Self, ModelError> {
        let first = estimators
            .first()
            .ok_or_else(|| ModelError::Invalid("voting ensemble has no members".into()))?;
        let classes = first.classes().to_vec();
        if estimators.iter().any(|e| e.classes() != classes.as_slice()) {
            return Err(ModelError::Invalid(
                "voting members disagree on classes".into(),
            ));
        }

        let weights = if weights.is_empty() {
            vec![1.0; estimators.len()]
        } else {
            weights
        };
        if weights.len() != estimators.len() {
            return Err(ModelError::Invalid(format!(
                "voting ensemble has {} weights for {} members",
                weights.len(),
                estimators.len()
            )));
        }
        let total: f64 = weights.iter().sum();
        if !(total > 0.0) || weights.iter().any(|w| *w < 0.0 || !w.is_finite()) {
            return Err(ModelError::Invalid("voting weights are invalid".into()));
        }

        Ok(Self {
            classes,
            weights,
            estimators,
        })
    }
}

impl Classifier for SoftVoting {
    fn classes(&self) -> &[ClassId] {
        &self.classes
    }

    fn predict_distribution(&self, features: &[f64]) -> Result<Vec<f64>, InferenceError> {
        let mut proba = vec![0.0; self.classes.len()];
        for (estimator, weight) in self.estimators.iter().zip(&self.weights) {
            let member = estimator.predict_distribution(features)?;
            if member.len() != proba.len() {
                return Err(InferenceError::Malformed(format!(
                    "voting member returned {} probabilities for {} classes",
                    member.len(),
                    proba.len()
                )));
            }
            for (acc, p) in proba.iter_mut().zip(member) {
                *acc += p * weight;
            }
        }
        let total: f64 = self.weights.iter().sum();
        Ok(proba.into_iter().map(|p| p / total).collect())
    }
}
