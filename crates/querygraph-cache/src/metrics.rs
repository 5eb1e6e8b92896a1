// ABOUTME: Per-stage success, latency and error counters for the query pipeline
// ABOUTME: Process-lifetime state owned by the orchestrator; snapshots derive the rates

use querygraph_core::Stage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counters for one executable stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageCounters {
    pub attempts_succeeded: u64,
    pub cumulative_latency_ms: u64,
    pub errors: u64,
}

impl StageCounters {
    pub fn average_latency_ms(&self) -> f64 {
        if self.attempts_succeeded == 0 {
            0.0
        } else {
            self.cumulative_latency_ms as f64 / self.attempts_succeeded as f64
        }
    }
}

/// Aggregated pipeline metrics
#[derive(Debug, Clone, Default)]
pub struct PipelineMetrics {
    total_queries: u64,
    total_successes: u64,
    cache_hits: u64,
    total_latency_ms: u64,
    /// Indexed by stage number - 1
    stages: [StageCounters; 4],
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters_mut(&mut self, stage: Stage) -> Option<&mut StageCounters> {
        match stage {
            Stage::Failed => None,
            other => self.stages.get_mut(usize::from(other.number()) - 1),
        }
    }

    pub fn stage(&self, stage: Stage) -> StageCounters {
        match stage {
            Stage::Failed => StageCounters::default(),
            other => self.stages[usize::from(other.number()) - 1],
        }
    }

    /// A query answered from the cache: a success, but not attributed to any stage
    pub fn record_cache_hit(&mut self, latency_ms: u64) {
        self.total_queries += 1;
        self.total_successes += 1;
        self.cache_hits += 1;
        self.total_latency_ms += latency_ms;
    }

    /// A query that ran the pipeline. `stage` is the resolving stage, or
    /// `Stage::Failed`; `stage_errors` lists stages whose execution failed.
    pub fn record_query(&mut self, stage: Stage, latency_ms: u64, stage_errors: &[Stage]) {
        self.total_queries += 1;
        self.total_latency_ms += latency_ms;

        if let Some(counters) = self.counters_mut(stage) {
            counters.attempts_succeeded += 1;
            counters.cumulative_latency_ms += latency_ms;
            self.total_successes += 1;
        }

        for failed in stage_errors {
            if let Some(counters) = self.counters_mut(*failed) {
                counters.errors += 1;
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let ratio = |num: u64, den: u64| {
            if den == 0 {
                0.0
            } else {
                num as f64 / den as f64
            }
        };

        let mut success_by_stage = BTreeMap::new();
        let mut average_latency_by_stage = BTreeMap::new();
        let mut error_counts_by_stage = BTreeMap::new();
        for stage in Stage::ORDERED {
            let counters = self.stage(stage);
            success_by_stage.insert(stage.number(), counters.attempts_succeeded);
            average_latency_by_stage.insert(stage.number(), counters.average_latency_ms());
            error_counts_by_stage.insert(stage.number(), counters.errors);
        }

        MetricsSnapshot {
            total_queries: self.total_queries,
            total_successes: self.total_successes,
            cache_hits: self.cache_hits,
            success_by_stage,
            average_latency_by_stage,
            error_counts_by_stage,
            success_rate: ratio(self.total_successes, self.total_queries),
            avg_response_time_ms: ratio(self.total_latency_ms, self.total_queries),
            cache_hit_rate: ratio(self.cache_hits, self.total_queries),
        }
    }
}

/// Point-in-time view of the pipeline metrics, keyed by stage number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_queries: u64,
    pub total_successes: u64,
    pub cache_hits: u64,
    pub success_by_stage: BTreeMap<u8, u64>,
    pub average_latency_by_stage: BTreeMap<u8, f64>,
    pub error_counts_by_stage: BTreeMap<u8, u64>,
    pub success_rate: f64,
    pub avg_response_time_ms: f64,
    pub cache_hit_rate: f64,
}
