use querygraph_core::{PipelineConfig, Strategy};
use querygraph_nlp::ComplexityScore;
use tracing::warn;

/// Upper score bounds for the first three strategies; anything at or above
/// `hybrid_parallel_below` goes direct-external.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyThresholds {
    pub template_first_below: f32,
    pub progressive_below: f32,
    pub hybrid_parallel_below: f32,
}

impl Default for StrategyThresholds {
    fn default() -> Self {
        Self {
            template_first_below: 0.3,
            progressive_below: 0.6,
            hybrid_parallel_below: 0.8,
        }
    }
}

impl From<&PipelineConfig> for StrategyThresholds {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            template_first_below: config.template_first_below,
            progressive_below: config.progressive_below,
            hybrid_parallel_below: config.hybrid_parallel_below,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StrategySelector {
    thresholds: StrategyThresholds,
}

impl StrategySelector {
    pub fn new(thresholds: StrategyThresholds) -> Self {
        Self { thresholds }
    }

    /// A valid override is returned unchanged regardless of the score.
    /// An unrecognised override is logged and ignored.
    pub fn select(&self, complexity: &ComplexityScore, override_name: Option<&str>) -> Strategy {
        if let Some(name) = override_name {
            match name.parse::<Strategy>() {
                Ok(forced) => return forced,
                Err(e) => warn!(strategy = name, error = %e, "Ignoring strategy override"),
            }
        }
        self.for_score(complexity.score)
    }

    pub fn for_score(&self, score: f32) -> Strategy {
        let t = &self.thresholds;
        if score < t.template_first_below {
            Strategy::TemplateFirst
        } else if score < t.progressive_below {
            Strategy::Progressive
        } else if score < t.hybrid_parallel_below {
            Strategy::HybridParallel
        } else {
            Strategy::DirectExternal
        }
    }
}
