use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Defaults for two-stage segment search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    /// Stage-1 candidate count (top-K in the cheap recall space).
    #[serde(default = "default_recall_count")]
    pub recall_count: usize,

    /// Final result count after reranking.
    #[serde(default = "default_final_count")]
    pub final_count: usize,

    /// Minimum recall-space cosine similarity for a candidate to survive
    /// stage 1.
    #[serde(default = "default_recall_threshold")]
    pub recall_threshold: f32,

    /// Weight of the rerank-space similarity in the combined score.
    /// `rerank_score = (1 - w) * recall + w * rerank`.
    #[serde(default = "default_rerank_weight")]
    pub rerank_weight: f32,
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.final_count == 0 || self.recall_count == 0 {
            return Err(ConfigError::Validation(
                "search.recall_count and search.final_count must be positive".into(),
            ));
        }
        if self.final_count > self.recall_count {
            return Err(ConfigError::Validation(
                "search.final_count cannot exceed search.recall_count".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.rerank_weight) {
            return Err(ConfigError::Validation(
                "search.rerank_weight must be in [0, 1]".into(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.recall_threshold) {
            return Err(ConfigError::Validation(
                "search.recall_threshold must be a valid cosine similarity".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            recall_count: default_recall_count(),
            final_count: default_final_count(),
            recall_threshold: default_recall_threshold(),
            rerank_weight: default_rerank_weight(),
        }
    }
}

fn default_recall_count() -> usize {
    30
}

fn default_final_count() -> usize {
    10
}

fn default_recall_threshold() -> f32 {
    0.6
}

fn default_rerank_weight() -> f32 {
    0.7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_count_must_not_exceed_recall_count() {
        let config = SearchConfig {
            recall_count: 5,
            final_count: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
