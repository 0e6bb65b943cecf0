//! Regression models deserialized from exported artifacts
//!
//! Supports the two model families exported by the training pipeline:
//! ordinary linear regression and random forests of binary regression trees.

use crate::error::{ArtifactError, PredictError};
use serde::{Deserialize, Serialize};

/// A pre-trained regression model
///
/// The serde tag doubles as the model label returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RegressionModel {
    LinearRegression {
        coefficients: Vec<f64>,
        intercept: f64,
    },
    RandomForestRegressor {
        trees: Vec<DecisionTree>,
    },
}

impl RegressionModel {
    /// Model class name, e.g. `RandomForestRegressor`
    pub fn name(&self) -> &'static str {
        match self {
            RegressionModel::LinearRegression { .. } => "LinearRegression",
            RegressionModel::RandomForestRegressor { .. } => "RandomForestRegressor",
        }
    }

    /// Number of input features, when the model declares it
    pub fn n_features(&self) -> Option<usize> {
        match self {
            RegressionModel::LinearRegression { coefficients, .. } => Some(coefficients.len()),
            RegressionModel::RandomForestRegressor { .. } => None,
        }
    }

    /// Check structural consistency of the model against the input width
    pub fn validate(&self, n_inputs: usize) -> Result<(), ArtifactError> {
        match self {
            RegressionModel::LinearRegression { coefficients, .. } => {
                if coefficients.len() != n_inputs {
                    return Err(ArtifactError::Shape(format!(
                        "linear model has {} coefficients, expected {}",
                        coefficients.len(),
                        n_inputs
                    )));
                }
                Ok(())
            }
            RegressionModel::RandomForestRegressor { trees } => {
                if trees.is_empty() {
                    return Err(ArtifactError::Shape("random forest has no trees".into()));
                }
                for (i, tree) in trees.iter().enumerate() {
                    tree.validate(n_inputs)
                        .map_err(|e| ArtifactError::Shape(format!("tree {}: {}", i, e)))?;
                }
                Ok(())
            }
        }
    }

    /// Predict a single scaled output from a scaled input row
    pub fn predict(&self, x: &[f64]) -> Result<f64, PredictError> {
        match self {
            RegressionModel::LinearRegression {
                coefficients,
                intercept,
            } => {
                if x.len() != coefficients.len() {
                    return Err(PredictError::InferenceFailure(format!(
                        "expected {} features, got {}",
                        coefficients.len(),
                        x.len()
                    )));
                }
                Ok(intercept
                    + coefficients
                        .iter()
                        .zip(x)
                        .map(|(c, v)| c * v)
                        .sum::<f64>())
            }
            RegressionModel::RandomForestRegressor { trees } => {
                if trees.is_empty() {
                    return Err(PredictError::InferenceFailure("empty forest".into()));
                }
                let mut total = 0.0;
                for tree in trees {
                    total += tree.predict(x)?;
                }
                Ok(total / trees.len() as f64)
            }
        }
    }
}

/// Binary regression tree stored as a flat node array rooted at index 0
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    /// `x[feature] <= threshold` goes left
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

impl DecisionTree {
    fn validate(&self, n_inputs: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("no nodes".into());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                if *feature >= n_inputs {
                    return Err(format!("node {} splits on feature {}", i, feature));
                }
                // Children always come after their parent, which rules out cycles
                if *left <= i || *right <= i || *left >= self.nodes.len() || *right >= self.nodes.len() {
                    return Err(format!("node {} has invalid children", i));
                }
            }
        }
        Ok(())
    }

    pub fn predict(&self, x: &[f64]) -> Result<f64, PredictError> {
        let mut index = 0;
        for _ in 0..self.nodes.len() {
            match self.nodes.get(index) {
                Some(TreeNode::Leaf { value }) => return Ok(*value),
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = x.get(*feature).ok_or_else(|| {
                        PredictError::InferenceFailure(format!("missing feature {}", feature))
                    })?;
                    index = if *value <= *threshold { *left } else { *right };
                }
                None => {
                    return Err(PredictError::InferenceFailure(format!(
                        "tree node {} out of range",
                        index
                    )))
                }
            }
        }
        Err(PredictError::InferenceFailure("tree traversal did not reach a leaf".into()))
    }
}
