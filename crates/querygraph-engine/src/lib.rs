// ABOUTME: Query orchestration engine for natural-language graph questions
// ABOUTME: Selects a strategy, runs the staged fallback pipeline, caches results and tracks metrics

pub mod orchestrator;
mod pipeline;
pub mod stages;
pub mod strategy;

pub use orchestrator::{MatchedTemplate, QueryAnalysis, QueryOrchestrator, QueryOrchestratorBuilder};
pub use stages::{StageFailure, StageFailureKind};
pub use strategy::{StrategySelector, StrategyThresholds};

/// Log target for pipeline progress lines
pub const PIPELINE_LOG_TARGET: &str = "querygraph::pipeline";
