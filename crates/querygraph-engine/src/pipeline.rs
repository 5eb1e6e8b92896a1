// ABOUTME: Runs the stage sequence for a selected strategy
// ABOUTME: First success wins; exhaustion yields a failure result with suggestions

use crate::stages::{StageFailure, StageOutcome, StageRunner};
use crate::PIPELINE_LOG_TARGET;
use querygraph_core::{ProcessOptions, QueryResult, Stage, Strategy};
use tracing::{debug, info, warn};

const DIRECT_EXTERNAL_ORDER: [Stage; 4] = [
    Stage::SchemaQa,
    Stage::Template,
    Stage::NlpSynthesized,
    Stage::DirectTranslate,
];

const EXHAUSTED: &str = "no stage could answer the question";

/// Result of one pipeline run plus the stages whose execution failed
#[derive(Debug)]
pub(crate) struct PipelineRun {
    pub result: QueryResult,
    pub stage_errors: Vec<Stage>,
}

#[derive(Debug, Default)]
struct Attempts {
    stage_errors: Vec<Stage>,
    last_error: Option<String>,
}

impl Attempts {
    fn record(&mut self, failure: StageFailure) {
        if failure.is_execution() {
            warn!(
                target: PIPELINE_LOG_TARGET,
                stage = failure.stage.number(),
                error = %failure.message,
                "Stage execution failed"
            );
            self.stage_errors.push(failure.stage);
        } else {
            debug!(
                target: PIPELINE_LOG_TARGET,
                stage = failure.stage.number(),
                kind = ?failure.kind,
                "Stage did not answer: {}",
                failure.message
            );
        }
        if failure.is_meaningful() {
            self.last_error = Some(failure.message);
        }
    }

    fn take(&mut self, outcome: StageOutcome) -> Option<QueryResult> {
        match outcome {
            Ok(result) => Some(result),
            Err(failure) => {
                self.record(failure);
                None
            }
        }
    }
}

impl StageRunner {
    pub(crate) async fn run(
        &self,
        query: &str,
        options: &ProcessOptions,
        strategy: Strategy,
    ) -> PipelineRun {
        let mut attempts = Attempts::default();

        // template-first already starts at stage 1, so its fall-through is the progressive order
        let answered = match strategy {
            Strategy::TemplateFirst | Strategy::Progressive => {
                self.sequential(&Stage::ORDERED, query, options, &mut attempts)
                    .await
            }
            Strategy::DirectExternal => {
                self.sequential(&DIRECT_EXTERNAL_ORDER, query, options, &mut attempts)
                    .await
            }
            Strategy::HybridParallel => self.hybrid(query, options, &mut attempts).await,
        };

        let result = match answered {
            Some(result) => {
                info!(
                    target: PIPELINE_LOG_TARGET,
                    strategy = %strategy,
                    stage = result.stage.number(),
                    rows = result.row_count(),
                    "Stage answered query"
                );
                result
            }
            None => self.exhausted(query, attempts.last_error.take()),
        };

        PipelineRun {
            result,
            stage_errors: attempts.stage_errors,
        }
    }

    async fn sequential(
        &self,
        order: &[Stage],
        query: &str,
        options: &ProcessOptions,
        attempts: &mut Attempts,
    ) -> Option<QueryResult> {
        for &stage in order {
            if let Some(result) = attempts.take(self.attempt(stage, query, options).await) {
                return Some(result);
            }
        }
        None
    }

    /// Template, NLP extraction and translate-then-execute start together and
    /// all settle before the priority rule template > synthesized > translated
    /// is applied. Schema QA runs only if none of them answered.
    async fn hybrid(
        &self,
        query: &str,
        options: &ProcessOptions,
        attempts: &mut Attempts,
    ) -> Option<QueryResult> {
        let (template, extracted, translated) = tokio::join!(
            self.attempt(Stage::Template, query, options),
            self.extract(query, options),
            self.attempt(Stage::DirectTranslate, query, options),
        );
        debug!(
            target: PIPELINE_LOG_TARGET,
            template = template.is_ok(),
            extraction = extracted.is_ok(),
            translate = translated.is_ok(),
            "Hybrid branches settled"
        );

        let template = attempts.take(template);
        let translated = attempts.take(translated);
        if template.is_some() {
            return template;
        }

        let synthesized = match extracted {
            Ok(nlp) => self.attempt_synthesis(query, &nlp).await,
            Err(failure) => Err(failure),
        };
        if let Some(result) = attempts.take(synthesized) {
            return Some(result);
        }
        if translated.is_some() {
            return translated;
        }

        attempts.take(self.attempt(Stage::SchemaQa, query, options).await)
    }

    fn exhausted(&self, query: &str, last_error: Option<String>) -> QueryResult {
        let nlp = self.nlp.process(query);
        let mut suggestions: Vec<String> = self
            .templates
            .descriptions()
            .into_iter()
            .map(str::to_string)
            .collect();
        for hint in self.nlp.suggestions(&nlp) {
            if !suggestions.contains(&hint) {
                suggestions.push(hint);
            }
        }

        info!(
            target: PIPELINE_LOG_TARGET,
            intent = %nlp.intent.intent,
            "All stages exhausted"
        );
        QueryResult::failure(
            query,
            last_error.unwrap_or_else(|| EXHAUSTED.to_string()),
            suggestions,
        )
        .meta("intent", nlp.intent.intent.as_str())
        .meta("nlpConfidence", nlp.confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use querygraph_ai::{DirectTranslator, QaOptions, QaResponse, SchemaQaChain, Translation};
    use querygraph_core::{
        GraphExecutor, Params, PipelineConfig, QueryGraphError, Record, Result,
    };
    use querygraph_nlp::PatternTemplateEngine;
    use std::sync::Arc;

    /// Empty graph that remembers every statement it ran
    #[derive(Default)]
    struct LoggingGraph {
        executed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GraphExecutor for LoggingGraph {
        async fn execute_query(&self, query: &str, _parameters: &Params) -> Result<Vec<Record>> {
            self.executed.lock().push(query.to_string());
            Ok(Vec::new())
        }
    }

    struct CountingQa {
        calls: Mutex<u32>,
        succeed: bool,
    }

    #[async_trait]
    impl SchemaQaChain for CountingQa {
        async fn ask(&self, _question: &str, _options: &QaOptions) -> QaResponse {
            *self.calls.lock() += 1;
            if self.succeed {
                QaResponse::answered("forty-two", "MATCH (n) RETURN count(n)")
            } else {
                QaResponse::failed("chain gave up", None)
            }
        }
    }

    struct StaticTranslator;

    #[async_trait]
    impl DirectTranslator for StaticTranslator {
        async fn translate(&self, _question: &str) -> Result<Translation> {
            Ok(Translation {
                translated_query: "MATCH (n:Recipe) RETURN n.name AS name".to_string(),
                query_kind: "cypher".to_string(),
                explanation: "recipes".to_string(),
            })
        }
    }

    struct BrokenTranslator;

    #[async_trait]
    impl DirectTranslator for BrokenTranslator {
        async fn translate(&self, _question: &str) -> Result<Translation> {
            Err(QueryGraphError::Translation("model offline".to_string()))
        }
    }

    fn runner(
        graph: Arc<LoggingGraph>,
        translator: Option<Arc<dyn DirectTranslator>>,
        schema_qa: Option<Arc<dyn SchemaQaChain>>,
    ) -> StageRunner {
        let templates = PatternTemplateEngine::new(graph.clone()).unwrap();
        StageRunner::new(
            graph,
            templates,
            translator,
            schema_qa,
            &PipelineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_direct_external_asks_schema_qa_first() {
        let graph = Arc::new(LoggingGraph::default());
        let qa = Arc::new(CountingQa {
            calls: Mutex::new(0),
            succeed: true,
        });
        let runner = runner(graph.clone(), None, Some(qa.clone()));

        let run = runner
            .run(
                "ingredients for Flammkuchen",
                &ProcessOptions::default(),
                Strategy::DirectExternal,
            )
            .await;
        assert_eq!(run.result.stage, Stage::SchemaQa);
        assert_eq!(*qa.calls.lock(), 1);
        assert!(graph.executed.lock().is_empty());
    }

    #[tokio::test]
    async fn test_direct_external_falls_back_to_template() {
        let graph = Arc::new(LoggingGraph::default());
        let qa = Arc::new(CountingQa {
            calls: Mutex::new(0),
            succeed: false,
        });
        let runner = runner(graph, None, Some(qa.clone()));

        let run = runner
            .run(
                "ingredients for Flammkuchen",
                &ProcessOptions::default(),
                Strategy::DirectExternal,
            )
            .await;
        assert_eq!(run.result.stage, Stage::Template);
        assert_eq!(run.stage_errors, vec![Stage::SchemaQa]);
        assert_eq!(*qa.calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_result_carries_last_meaningful_error() {
        let graph = Arc::new(LoggingGraph::default());
        let runner = runner(graph, Some(Arc::new(BrokenTranslator)), None);

        let run = runner
            .run("zzz qqq", &ProcessOptions::default(), Strategy::Progressive)
            .await;
        assert!(!run.result.success);
        assert_eq!(run.result.stage, Stage::Failed);
        assert!(run.result.is_consistent());
        // stage 4 is unavailable, so the translator's error is the last meaningful one
        assert!(run.result.error.as_deref().unwrap().contains("model offline"));
        assert_eq!(run.stage_errors, vec![Stage::DirectTranslate]);
        assert!(run
            .result
            .suggestions
            .iter()
            .any(|s| s.contains("ingredients for Flammkuchen")));
    }

    #[tokio::test]
    async fn test_hybrid_prefers_template_over_translation() {
        let graph = Arc::new(LoggingGraph::default());
        let runner = runner(graph.clone(), Some(Arc::new(StaticTranslator)), None);

        let run = runner
            .run(
                "ingredients for Flammkuchen",
                &ProcessOptions::default(),
                Strategy::HybridParallel,
            )
            .await;
        assert_eq!(run.result.stage, Stage::Template);
        // the translate branch still ran to completion before the priority rule applied
        assert!(graph
            .executed
            .lock()
            .iter()
            .any(|q| q.contains("n:Recipe")));
    }

    #[tokio::test]
    async fn test_hybrid_without_any_branch_falls_back_to_schema_qa() {
        let graph = Arc::new(LoggingGraph::default());
        let qa = Arc::new(CountingQa {
            calls: Mutex::new(0),
            succeed: true,
        });
        let runner = runner(graph, None, Some(qa.clone()));

        let run = runner
            .run("zzz qqq", &ProcessOptions::default(), Strategy::HybridParallel)
            .await;
        assert_eq!(run.result.stage, Stage::SchemaQa);
        assert_eq!(run.result.answer.as_deref(), Some("forty-two"));
        assert!(run.stage_errors.is_empty());
    }
}
