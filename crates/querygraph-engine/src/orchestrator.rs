// ABOUTME: Explicitly constructed query orchestrator owning the result cache and metrics
// ABOUTME: Entry point for processing questions; runs each query as a detached task

use crate::stages::StageRunner;
use crate::strategy::StrategySelector;
use crate::PIPELINE_LOG_TARGET;
use parking_lot::Mutex;
use querygraph_ai::{DirectTranslator, SchemaQaChain};
use querygraph_cache::{CacheStats, MetricsSnapshot, PipelineMetrics, ResultCache};
use querygraph_core::{
    GraphExecutor, ProcessOptions, QueryGraphConfig, QueryResult, QuestionValidator, Result,
    Stage, Strategy, ValidationError,
};
use querygraph_nlp::{ComplexityAnalyzer, ComplexityScore, NlpResult, PatternTemplateEngine};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn, Instrument};
use uuid::Uuid;

/// Template rule that would handle a question
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedTemplate {
    pub rule: &'static str,
    pub domain: &'static str,
    pub description: &'static str,
}

/// Everything the orchestrator decides about a question before running it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryAnalysis {
    pub query: String,
    pub complexity: ComplexityScore,
    pub strategy: Strategy,
    pub nlp: NlpResult,
    pub matched_template: Option<MatchedTemplate>,
    pub suggestions: Vec<String>,
}

pub struct QueryOrchestratorBuilder {
    graph: Arc<dyn GraphExecutor>,
    translator: Option<Arc<dyn DirectTranslator>>,
    schema_qa: Option<Arc<dyn SchemaQaChain>>,
    templates: Option<PatternTemplateEngine>,
    config: QueryGraphConfig,
}

impl QueryOrchestratorBuilder {
    pub fn translator(mut self, translator: Arc<dyn DirectTranslator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn schema_qa(mut self, chain: Arc<dyn SchemaQaChain>) -> Self {
        self.schema_qa = Some(chain);
        self
    }

    /// Replace the built-in template catalogue
    pub fn templates(mut self, templates: PatternTemplateEngine) -> Self {
        self.templates = Some(templates);
        self
    }

    pub fn config(mut self, config: QueryGraphConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cache_capacity(mut self, max_entries: usize) -> Self {
        self.config.cache.max_entries = max_entries;
        self
    }

    pub fn build(self) -> Result<QueryOrchestrator> {
        let templates = match self.templates {
            Some(templates) => templates,
            None => PatternTemplateEngine::new(self.graph.clone())?,
        };
        let stages = StageRunner::new(
            self.graph,
            templates,
            self.translator,
            self.schema_qa,
            &self.config.pipeline,
        );
        info!(
            target: PIPELINE_LOG_TARGET,
            translator = stages.has_translator(),
            schema_qa = stages.has_schema_qa(),
            cache_entries = self.config.cache.max_entries,
            "Query orchestrator ready"
        );

        Ok(QueryOrchestrator {
            inner: Arc::new(OrchestratorInner {
                analyzer: ComplexityAnalyzer::new(),
                selector: StrategySelector::new((&self.config.pipeline).into()),
                stages,
                cache_enabled: self.config.cache.enabled,
                cache: Mutex::new(ResultCache::new(self.config.cache.max_entries)),
                metrics: Mutex::new(PipelineMetrics::new()),
            }),
        })
    }
}

/// Cheap to clone; clones share the cache and metrics
#[derive(Clone)]
pub struct QueryOrchestrator {
    inner: Arc<OrchestratorInner>,
}

struct OrchestratorInner {
    analyzer: ComplexityAnalyzer,
    selector: StrategySelector,
    stages: StageRunner,
    cache_enabled: bool,
    // lock order: cache before metrics
    cache: Mutex<ResultCache<QueryResult>>,
    metrics: Mutex<PipelineMetrics>,
}

impl QueryOrchestrator {
    pub fn builder(graph: Arc<dyn GraphExecutor>) -> QueryOrchestratorBuilder {
        QueryOrchestratorBuilder {
            graph,
            translator: None,
            schema_qa: None,
            templates: None,
            config: QueryGraphConfig::default(),
        }
    }

    /// Answer a question. Always returns a result; failures are reported in it.
    ///
    /// The pipeline runs as a detached task, so dropping this future does not
    /// stop in-flight stages and a successful result still reaches the cache.
    #[instrument(skip(self, text, options), fields(query_id = %Uuid::new_v4(), query_len = text.len()))]
    pub async fn process_query(&self, text: &str, options: ProcessOptions) -> QueryResult {
        let started = Instant::now();
        let query = text.trim().to_string();

        if let Err(e) = QuestionValidator::validate(&query) {
            warn!(target: PIPELINE_LOG_TARGET, error = %e, "Question rejected");
            let mut result =
                QueryResult::failure(&query, e.to_string(), vec![rejection_hint(&e).to_string()]);
            result.processing_time_ms = elapsed_ms(started);
            self.inner
                .metrics
                .lock()
                .record_query(Stage::Failed, result.processing_time_ms, &[]);
            return result;
        }

        let inner = Arc::clone(&self.inner);
        let task_query = query.clone();
        let handle = tokio::spawn(
            async move { inner.run(&task_query, &options, started).await }.in_current_span(),
        );

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                error!(target: PIPELINE_LOG_TARGET, error = %e, "Query task did not complete");
                let mut result =
                    QueryResult::failure(&query, format!("query task failed: {}", e), Vec::new());
                result.processing_time_ms = elapsed_ms(started);
                self.inner
                    .metrics
                    .lock()
                    .record_query(Stage::Failed, result.processing_time_ms, &[]);
                result
            }
        }
    }

    /// Score, strategy, NLP extraction and matching template, without executing anything
    pub fn analyze(&self, text: &str) -> QueryAnalysis {
        let inner = &self.inner;
        let complexity = inner.analyzer.analyze(text);
        let strategy = inner.selector.select(&complexity, None);
        let nlp = inner.stages.nlp.process(text);
        let suggestions = inner.stages.nlp.suggestions(&nlp);
        let matched_template = inner
            .stages
            .templates
            .matching_rule(text)
            .map(|rule| MatchedTemplate {
                rule: rule.name,
                domain: rule.domain,
                description: rule.description,
            });

        QueryAnalysis {
            query: text.to_string(),
            complexity,
            strategy,
            nlp,
            matched_template,
            suggestions,
        }
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.lock().snapshot()
    }

    pub fn clear_cache(&self) {
        self.inner.cache.lock().clear();
        info!(target: PIPELINE_LOG_TARGET, "Result cache cleared");
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.lock().stats()
    }

    pub fn template_descriptions(&self) -> Vec<&'static str> {
        self.inner.stages.templates.descriptions()
    }
}

impl OrchestratorInner {
    async fn run(&self, query: &str, options: &ProcessOptions, started: Instant) -> QueryResult {
        let key = self.cache_key(query, options);
        if let Some(hit) = key.as_deref().and_then(|key| self.lookup(key, started)) {
            return hit;
        }

        let complexity = self.analyzer.analyze(query);
        let strategy = self
            .selector
            .select(&complexity, options.force_strategy.as_deref());
        log_query_start(strategy, &complexity);

        let run = self.stages.run(query, options, strategy).await;
        let mut result = run
            .result
            .meta("strategy", strategy.as_str())
            .meta("complexity", complexity.score);
        result.processing_time_ms = elapsed_ms(started);

        self.complete(key, &result, &run.stage_errors);
        log_query_finish(strategy, &result);
        result
    }

    fn cache_key(&self, query: &str, options: &ProcessOptions) -> Option<String> {
        if !self.cache_enabled || options.skip_cache {
            return None;
        }
        match ResultCache::<QueryResult>::key(query, options) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(target: PIPELINE_LOG_TARGET, error = %e, "Cache key unavailable");
                None
            }
        }
    }

    fn lookup(&self, key: &str, started: Instant) -> Option<QueryResult> {
        let mut cache = self.cache.lock();
        let mut hit = cache.get(key)?;
        hit.from_cache = true;
        hit.processing_time_ms = elapsed_ms(started);
        self.metrics.lock().record_cache_hit(hit.processing_time_ms);
        debug!(target: PIPELINE_LOG_TARGET, stage = hit.stage.number(), "Cache hit");
        Some(hit)
    }

    /// Cache insertion and metrics update for one completed query, under both locks
    fn complete(&self, key: Option<String>, result: &QueryResult, stage_errors: &[Stage]) {
        let mut cache = self.cache.lock();
        let mut metrics = self.metrics.lock();

        if let Some(key) = key.filter(|_| result.success) {
            if let Some(evicted) = cache.insert(key, result.clone()) {
                debug!(target: PIPELINE_LOG_TARGET, "Evicted cached result: {}", evicted);
            }
        }
        metrics.record_query(result.stage, result.processing_time_ms, stage_errors);
    }
}

fn rejection_hint(error: &ValidationError) -> &'static str {
    match error {
        ValidationError::RequiredField { .. } => "Ask a non-empty question in plain text",
        ValidationError::InvalidLength { .. } => {
            "Shorten the question to its essentials, e.g. \"ingredients for Flammkuchen\""
        }
        ValidationError::InvalidCharacters { .. } => {
            "Remove control characters and ask the question in plain text"
        }
        ValidationError::WriteClause { .. } => "Ask a read-only question in plain text",
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn log_query_start(strategy: Strategy, complexity: &ComplexityScore) {
    info!(
        target: PIPELINE_LOG_TARGET,
        strategy = %strategy,
        complexity = complexity.score,
        "Query started"
    );
    debug!(
        target: PIPELINE_LOG_TARGET,
        strategy = %strategy,
        "Complexity indicators: {:?}",
        complexity.indicators
    );
}

fn log_query_finish(strategy: Strategy, result: &QueryResult) {
    info!(
        target: PIPELINE_LOG_TARGET,
        strategy = %strategy,
        stage = result.stage.number(),
        success = result.success,
        elapsed_ms = result.processing_time_ms,
        "Query completed"
    );
    debug!(
        target: PIPELINE_LOG_TARGET,
        strategy = %strategy,
        "Query output: {}",
        serde_json::to_string(result).unwrap_or_default()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use querygraph_core::{Params, Record, MAX_QUESTION_LENGTH};

    struct EmptyGraph;

    #[async_trait]
    impl GraphExecutor for EmptyGraph {
        async fn execute_query(&self, _query: &str, _parameters: &Params) -> Result<Vec<Record>> {
            Ok(Vec::new())
        }
    }

    fn orchestrator() -> QueryOrchestrator {
        QueryOrchestrator::builder(Arc::new(EmptyGraph)).build().unwrap()
    }

    #[tokio::test]
    async fn test_blank_question_is_a_failure_result() {
        let orchestrator = orchestrator();
        let result = orchestrator
            .process_query("   ", ProcessOptions::default())
            .await;
        assert!(!result.success);
        assert_eq!(result.stage, Stage::Failed);
        assert!(!result.suggestions.is_empty());
        assert_eq!(orchestrator.get_metrics().total_queries, 1);
    }

    #[tokio::test]
    async fn test_rejections_carry_a_matching_hint() {
        let orchestrator = orchestrator();

        let too_long = "ü".repeat(MAX_QUESTION_LENGTH + 1);
        let result = orchestrator
            .process_query(&too_long, ProcessOptions::default())
            .await;
        assert!(result
            .error
            .as_deref()
            .is_some_and(|e| e.contains(&format!("got {}", MAX_QUESTION_LENGTH + 1))));
        assert!(result.suggestions[0].starts_with("Shorten"));

        let bell = orchestrator
            .process_query("bad\u{0007}bell", ProcessOptions::default())
            .await;
        assert!(bell.suggestions[0].contains("control characters"));
        assert_eq!(orchestrator.get_metrics().total_queries, 2);
    }

    #[tokio::test]
    async fn test_skip_cache_neither_reads_nor_writes() {
        let orchestrator = orchestrator();
        let options = ProcessOptions {
            skip_cache: true,
            ..Default::default()
        };
        orchestrator
            .process_query("which nodes do you have?", options.clone())
            .await;
        let second = orchestrator
            .process_query("which nodes do you have?", options)
            .await;
        assert!(!second.from_cache);
        assert_eq!(orchestrator.cache_stats().entries, 0);
    }

    #[tokio::test]
    async fn test_disabled_cache() {
        let mut config = QueryGraphConfig::default();
        config.cache.enabled = false;
        let orchestrator = QueryOrchestrator::builder(Arc::new(EmptyGraph))
            .config(config)
            .build()
            .unwrap();
        orchestrator
            .process_query("which nodes do you have?", ProcessOptions::default())
            .await;
        assert_eq!(orchestrator.cache_stats().entries, 0);
    }

    #[test]
    fn test_analyze_does_not_execute() {
        let analysis = orchestrator().analyze("ingredients for Flammkuchen");
        assert_eq!(analysis.strategy, Strategy::TemplateFirst);
        let template = analysis.matched_template.unwrap();
        assert_eq!(template.rule, "ingredients_for");
        assert_eq!(template.domain, "recipes");
        assert_eq!(analysis.nlp.intent.intent.as_str(), "find_ingredients");
    }

    #[test]
    fn test_analyze_unknown_question() {
        let analysis = orchestrator().analyze("zzz qqq");
        assert!(analysis.matched_template.is_none());
        assert!(!analysis.suggestions.is_empty());
    }
}
