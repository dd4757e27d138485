use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_WEIGHT_DETERMINISTIC, DEFAULT_WEIGHT_LLM, DEFAULT_WEIGHT_SEMANTIC};

/// Coefficients of the final score.
///
/// [`FusionWeights::fuse`] only uses the signals that are present and rescales
/// their weights to sum to 1, so a run without semantic similarity is not
/// penalized for the missing term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub semantic: f32,
    pub deterministic: f32,
    pub llm: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            semantic: DEFAULT_WEIGHT_SEMANTIC,
            deterministic: DEFAULT_WEIGHT_DETERMINISTIC,
            llm: DEFAULT_WEIGHT_LLM,
        }
    }
}

impl FusionWeights {
    /// `deterministic` must already be normalized to `[0, 1]`.
    pub fn fuse(&self, semantic: Option<f32>, deterministic: f32, llm: Option<f32>) -> f32 {
        let mut weighted = self.deterministic * deterministic;
        let mut total = self.deterministic;

        if let Some(similarity) = semantic {
            weighted += self.semantic * similarity;
            total += self.semantic;
        }
        if let Some(score) = llm {
            weighted += self.llm * score;
            total += self.llm;
        }

        if total <= 0.0 { 0.0 } else { weighted / total }
    }
}
