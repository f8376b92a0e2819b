//! Pre-trained classifier artifacts.
//!
//! Models are trained offline and exported as JSON. A forest is a list of
//! CART trees in flat array form, one entry per node:
//!
//! ```json
//! {
//!   "classes": ["DAP", "Urea"],
//!   "trees": [{
//!     "children_left":  [1, -1, -1],
//!     "children_right": [2, -1, -1],
//!     "feature":        [5, -2, -2],
//!     "threshold":      [30.0, -2.0, -2.0],
//!     "value":          [[4, 4], [0, 4], [4, 0]]
//!   }]
//! }
//! ```
//!
//! A node is a leaf when `children_left` is negative. Inner nodes send a
//! sample left when `x[feature] <= threshold`. `value` holds the per-class
//! sample counts (or fractions) seen at each node.
//!
//! The fertilizer artifact bundles its forest with the fitted label encoders
//! for the categorical columns and the fertilizer composition table.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{error, info};

use crate::error::{AdvisorError, Result};

// ---

#[derive(Debug, Clone, Deserialize)]
pub struct DecisionTree {
    // ---
    children_left: Vec<i64>,
    children_right: Vec<i64>,
    feature: Vec<i64>,
    threshold: Vec<f64>,
    value: Vec<Vec<f64>>,
}

impl DecisionTree {
    // ---
    /// Walk the tree for `x` and return the class distribution at the leaf.
    fn leaf_distribution(&self, x: &[f64]) -> Result<&[f64]> {
        // ---
        let nodes = self.children_left.len();
        let mut node = 0usize;

        // A well-formed tree reaches a leaf in fewer steps than it has nodes.
        for _ in 0..=nodes {
            let left = *self.children_left.get(node).ok_or_else(|| malformed(node))?;
            if left < 0 {
                return self
                    .value
                    .get(node)
                    .map(Vec::as_slice)
                    .ok_or_else(|| malformed(node));
            }

            let feature = *self.feature.get(node).ok_or_else(|| malformed(node))?;
            let threshold = *self.threshold.get(node).ok_or_else(|| malformed(node))?;
            let sample = usize::try_from(feature)
                .ok()
                .and_then(|f| x.get(f))
                .ok_or_else(|| {
                    AdvisorError::Internal(format!(
                        "model references feature {feature} but only {} were supplied",
                        x.len()
                    ))
                })?;

            let next = if *sample <= threshold {
                left
            } else {
                *self.children_right.get(node).ok_or_else(|| malformed(node))?
            };
            node = usize::try_from(next).map_err(|_| malformed(node))?;
        }

        Err(AdvisorError::Internal("model tree contains a cycle".to_string()))
    }
}

fn malformed(node: usize) -> AdvisorError {
    AdvisorError::Internal(format!("malformed model tree at node {node}"))
}

/// Averaging ensemble of decision trees.
#[derive(Debug, Clone, Deserialize)]
pub struct RandomForest {
    pub classes: Vec<String>,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    // ---
    /// Mean of the trees' normalized leaf distributions, one entry per class.
    pub fn predict_proba(&self, x: &[f64]) -> Result<Vec<f64>> {
        // ---
        if self.trees.is_empty() || self.classes.is_empty() {
            return Err(AdvisorError::Internal("model has no trees".to_string()));
        }

        let mut proba = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            let leaf = tree.leaf_distribution(x)?;
            if leaf.len() != proba.len() {
                return Err(AdvisorError::Internal(format!(
                    "leaf has {} classes, model declares {}",
                    leaf.len(),
                    proba.len()
                )));
            }
            let total: f64 = leaf.iter().sum();
            if total > 0.0 {
                for (p, v) in proba.iter_mut().zip(leaf) {
                    *p += v / total;
                }
            }
        }

        let n_trees = self.trees.len() as f64;
        proba.iter_mut().for_each(|p| *p /= n_trees);
        Ok(proba)
    }

    /// Most probable class label; the lowest class index wins ties.
    pub fn predict(&self, x: &[f64]) -> Result<&str> {
        // ---
        let proba = self.predict_proba(x)?;
        let mut best = 0;
        for (i, p) in proba.iter().enumerate() {
            if *p > proba[best] {
                best = i;
            }
        }
        Ok(&self.classes[best])
    }
}

/// Fitted mapping from a categorical value to its integer code.
#[derive(Debug, Clone, Deserialize)]
pub struct LabelEncoder {
    pub classes: Vec<String>,
}

impl LabelEncoder {
    pub fn transform(&self, value: &str) -> Option<usize> {
        self.classes.iter().position(|c| c == value)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FertilizerDetail {
    pub name: String,
    pub composition: String,
}

/// Everything the fertilizer recommender needs from its training run.
#[derive(Debug, Clone, Deserialize)]
pub struct FertilizerBundle {
    // ---
    pub model: RandomForest,
    pub label_encoders: HashMap<String, LabelEncoder>,
    #[serde(default)]
    pub fertilizer_details: Vec<FertilizerDetail>,
}

/// Classifier artifacts loaded at startup.
///
/// A slot is `None` when its artifact could not be loaded; operations that
/// need it fail with [`AdvisorError::ModelUnavailable`].
#[derive(Debug, Clone, Default)]
pub struct ModelArtifacts {
    pub crop_model: Option<RandomForest>,
    pub fertilizer: Option<FertilizerBundle>,
}

impl ModelArtifacts {
    // ---
    /// Load both artifacts, logging and skipping any that fail.
    pub fn load(crop_model_path: impl AsRef<Path>, fertilizer_path: impl AsRef<Path>) -> Self {
        // ---
        let crop_model = match read_json::<RandomForest>(crop_model_path.as_ref()) {
            Ok(model) => {
                info!(
                    "Crop recommendation model loaded ({} classes)",
                    model.classes.len()
                );
                Some(model)
            }
            Err(e) => {
                error!("Error loading crop model: {:#}", e);
                None
            }
        };

        let fertilizer = match read_json::<FertilizerBundle>(fertilizer_path.as_ref()) {
            Ok(bundle) => {
                info!(
                    "Fertilizer recommendation model loaded ({} fertilizers, {} encoders)",
                    bundle.model.classes.len(),
                    bundle.label_encoders.len()
                );
                Some(bundle)
            }
            Err(e) => {
                error!("Error loading fertilizer model: {:#}", e);
                None
            }
        };

        Self {
            crop_model,
            fertilizer,
        }
    }

    pub fn crop_model(&self) -> Result<&RandomForest> {
        self.crop_model
            .as_ref()
            .ok_or(AdvisorError::ModelUnavailable("Crop"))
    }

    pub fn fertilizer(&self) -> Result<&FertilizerBundle> {
        self.fertilizer
            .as_ref()
            .ok_or(AdvisorError::ModelUnavailable("Fertilizer recommendation"))
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    // ---
    use anyhow::Context;

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read '{}'", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse '{}'", path.display()))
}
