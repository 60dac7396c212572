//! Base classifier variants.
//!
//! Each variant evaluates a trained model of one fixed kind against a
//! scaled feature vector and returns a class-probability pair. The tagged
//! enum replaces runtime model dispatch: the set of supported kinds is
//! closed and every kind shares the same `predict_proba` contract.

use serde::{Deserialize, Serialize};

/// One trained base classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BaseClassifier {
    Logistic(LogisticModel),
    RandomForest(ForestModel),
    GradientBoosted(BoostedModel),
    Svm(SvmModel),
}

impl BaseClassifier {
    /// (P(normal), P(stressed)) for a scaled feature vector
    pub fn predict_proba(&self, features: &[f32]) -> (f64, f64) {
        let p_stressed = match self {
            Self::Logistic(m) => m.prob_stressed(features),
            Self::RandomForest(m) => m.prob_stressed(features),
            Self::GradientBoosted(m) => m.prob_stressed(features),
            Self::Svm(m) => m.prob_stressed(features),
        };
        let p_stressed = p_stressed.clamp(0.0, 1.0);
        (1.0 - p_stressed, p_stressed)
    }

    /// Check the model's internal shapes against the feature dimension
    pub fn validate(&self, dim: usize) -> Result<(), String> {
        match self {
            Self::Logistic(m) => m.validate(dim),
            Self::RandomForest(m) => m.validate(dim),
            Self::GradientBoosted(m) => m.validate(dim),
            Self::Svm(m) => m.validate(dim),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Logistic(_) => "logistic",
            Self::RandomForest(_) => "random_forest",
            Self::GradientBoosted(_) => "gradient_boosted",
            Self::Svm(_) => "svm",
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn dot(weights: &[f32], features: &[f32]) -> f64 {
    weights
        .iter()
        .zip(features.iter())
        .map(|(w, x)| *w as f64 * *x as f64)
        .sum()
}

/// Logistic regression: sigmoid over a linear score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    pub weights: Vec<f32>,
    pub bias: f32,
}

impl LogisticModel {
    fn prob_stressed(&self, features: &[f32]) -> f64 {
        sigmoid(dot(&self.weights, features) + self.bias as f64)
    }

    fn validate(&self, dim: usize) -> Result<(), String> {
        if self.weights.len() != dim {
            return Err(format!(
                "logistic weights have {} entries, expected {}",
                self.weights.len(),
                dim
            ));
        }
        Ok(())
    }
}

/// Flattened decision tree; `nodes[0]` is the root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
    /// Class fraction for forest trees, raw margin for boosted trees
    Leaf { value: f32 },
}

impl Tree {
    /// Walk to a leaf. Bounded by the node count, so a malformed tree
    /// terminates at 0.0 instead of looping.
    pub fn predict(&self, features: &[f32]) -> f32 {
        let mut idx = 0usize;
        for _ in 0..self.nodes.len() {
            match self.nodes.get(idx) {
                Some(TreeNode::Leaf { value }) => return *value,
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let x = features.get(*feature).copied().unwrap_or(0.0);
                    idx = if x <= *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
        0.0
    }

    fn validate(&self, dim: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for node in &self.nodes {
            if let TreeNode::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                if *feature >= dim {
                    return Err(format!("split on feature {} out of range {}", feature, dim));
                }
                if *left >= self.nodes.len() || *right >= self.nodes.len() {
                    return Err("tree child index out of range".to_string());
                }
            }
        }
        Ok(())
    }
}

/// Random forest: averaged leaf class fractions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestModel {
    pub trees: Vec<Tree>,
}

impl ForestModel {
    fn prob_stressed(&self, features: &[f32]) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        let sum: f64 = self
            .trees
            .iter()
            .map(|t| t.predict(features) as f64)
            .sum();
        sum / self.trees.len() as f64
    }

    fn validate(&self, dim: usize) -> Result<(), String> {
        if self.trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        for tree in &self.trees {
            tree.validate(dim)?;
        }
        Ok(())
    }
}

/// Gradient-boosted trees: sigmoid over an additive margin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostedModel {
    pub bias: f32,
    pub learning_rate: f32,
    pub trees: Vec<Tree>,
}

impl BoostedModel {
    fn prob_stressed(&self, features: &[f32]) -> f64 {
        let margin: f64 = self.bias as f64
            + self.learning_rate as f64
                * self
                    .trees
                    .iter()
                    .map(|t| t.predict(features) as f64)
                    .sum::<f64>();
        sigmoid(margin)
    }

    fn validate(&self, dim: usize) -> Result<(), String> {
        if self.trees.is_empty() {
            return Err("boosted model has no trees".to_string());
        }
        for tree in &self.trees {
            tree.validate(dim)?;
        }
        Ok(())
    }
}

/// RBF-kernel SVM with Platt-calibrated probabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvmModel {
    pub gamma: f32,
    pub support_vectors: Vec<Vec<f32>>,
    pub dual_coefs: Vec<f32>,
    pub intercept: f32,
    /// Platt scaling: P(stressed) = sigmoid(-(a * decision + b))
    pub platt_a: f32,
    pub platt_b: f32,
}

impl SvmModel {
    fn decision(&self, features: &[f32]) -> f64 {
        self.support_vectors
            .iter()
            .zip(self.dual_coefs.iter())
            .map(|(sv, coef)| {
                let dist_sq: f64 = sv
                    .iter()
                    .zip(features.iter())
                    .map(|(a, b)| {
                        let d = *a as f64 - *b as f64;
                        d * d
                    })
                    .sum();
                *coef as f64 * (-(self.gamma as f64) * dist_sq).exp()
            })
            .sum::<f64>()
            + self.intercept as f64
    }

    fn prob_stressed(&self, features: &[f32]) -> f64 {
        let f = self.decision(features);
        sigmoid(-(self.platt_a as f64 * f + self.platt_b as f64))
    }

    fn validate(&self, dim: usize) -> Result<(), String> {
        if self.support_vectors.is_empty() {
            return Err("svm has no support vectors".to_string());
        }
        if self.support_vectors.len() != self.dual_coefs.len() {
            return Err("svm dual coefficient count mismatch".to_string());
        }
        for sv in &self.support_vectors {
            if sv.len() != dim {
                return Err(format!(
                    "support vector has {} entries, expected {}",
                    sv.len(),
                    dim
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump(feature: usize, threshold: f32, low: f32, high: f32) -> Tree {
        Tree {
            nodes: vec![
                TreeNode::Split {
                    feature,
                    threshold,
                    left: 1,
                    right: 2,
                },
                TreeNode::Leaf { value: low },
                TreeNode::Leaf { value: high },
            ],
        }
    }

    #[test]
    fn test_logistic_zero_weights_is_neutral() {
        let model = BaseClassifier::Logistic(LogisticModel {
            weights: vec![0.0; 4],
            bias: 0.0,
        });
        let (p_normal, p_stressed) = model.predict_proba(&[1.0, -1.0, 2.0, 0.5]);
        assert!((p_stressed - 0.5).abs() < 1e-12);
        assert!((p_normal + p_stressed - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_logistic_bias_shifts_probability() {
        let model = BaseClassifier::Logistic(LogisticModel {
            weights: vec![0.0; 2],
            bias: 2.0,
        });
        let (_, p_stressed) = model.predict_proba(&[0.0, 0.0]);
        assert!(p_stressed > 0.85);
    }

    #[test]
    fn test_tree_routing() {
        let tree = stump(0, 0.0, 0.1, 0.9);
        assert_eq!(tree.predict(&[-1.0]), 0.1);
        assert_eq!(tree.predict(&[1.0]), 0.9);
        // Boundary goes left
        assert_eq!(tree.predict(&[0.0]), 0.1);
    }

    #[test]
    fn test_forest_averages_trees() {
        let model = BaseClassifier::RandomForest(ForestModel {
            trees: vec![stump(0, 0.0, 0.0, 1.0), stump(0, 0.0, 0.0, 0.5)],
        });
        let (_, p_stressed) = model.predict_proba(&[1.0]);
        assert!((p_stressed - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_boosted_margin_through_sigmoid() {
        let model = BaseClassifier::GradientBoosted(BoostedModel {
            bias: 0.0,
            learning_rate: 1.0,
            trees: vec![stump(0, 0.0, -2.0, 2.0)],
        });
        let (_, high) = model.predict_proba(&[1.0]);
        let (_, low) = model.predict_proba(&[-1.0]);
        assert!(high > 0.8);
        assert!(low < 0.2);
    }

    #[test]
    fn test_svm_probability_bounds() {
        let model = BaseClassifier::Svm(SvmModel {
            gamma: 0.5,
            support_vectors: vec![vec![1.0, 0.0], vec![-1.0, 0.0]],
            dual_coefs: vec![1.0, -1.0],
            intercept: 0.0,
            platt_a: -1.0,
            platt_b: 0.0,
        });
        for x in [[2.0, 0.0], [0.0, 0.0], [-2.0, 1.0]] {
            let (p_normal, p_stressed) = model.predict_proba(&x);
            assert!((0.0..=1.0).contains(&p_stressed));
            assert!((p_normal + p_stressed - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_malformed_tree_terminates() {
        // Split points at itself; traversal must bail out
        let tree = Tree {
            nodes: vec![TreeNode::Split {
                feature: 0,
                threshold: 0.0,
                left: 0,
                right: 0,
            }],
        };
        assert_eq!(tree.predict(&[1.0]), 0.0);
    }

    #[test]
    fn test_validate_catches_bad_shapes() {
        let model = BaseClassifier::Logistic(LogisticModel {
            weights: vec![0.0; 3],
            bias: 0.0,
        });
        assert!(model.validate(3).is_ok());
        assert!(model.validate(4).is_err());
    }
}
