// ABOUTME: The four pipeline stages behind one attempt interface
// ABOUTME: Each attempt yields a QueryResult or a classified StageFailure; panics are caught at the boundary

use crate::PIPELINE_LOG_TARGET;
use futures::FutureExt;
use querygraph_ai::{DirectTranslator, QaOptions, SchemaQaChain};
use querygraph_core::{
    GraphExecutor, Params, PipelineConfig, ProcessOptions, QueryResult, ReadOnlyQueryValidator,
    Stage,
};
use querygraph_nlp::{
    NlpProcessor, NlpResult, PatternTemplateEngine, QuerySynthesizer, SynthesisOutcome,
};
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

/// Why a stage did not produce a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageFailureKind {
    /// No rule or dispatch entry applied
    NoMatch,
    /// A graph or adapter call failed, or the stage panicked
    Execution,
    /// NLP confidence did not clear the configured minimum
    LowConfidence,
    /// Disabled by the caller or no collaborator configured
    Unavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageFailure {
    pub stage: Stage,
    pub kind: StageFailureKind,
    pub message: String,
}

impl StageFailure {
    pub fn new(stage: Stage, kind: StageFailureKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
        }
    }

    /// Counted against the stage's error counter
    pub fn is_execution(&self) -> bool {
        self.kind == StageFailureKind::Execution
    }

    /// Worth reporting to the caller if every stage fails
    pub fn is_meaningful(&self) -> bool {
        self.kind != StageFailureKind::Unavailable
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {} {:?}: {}", self.stage.number(), self.kind, self.message)
    }
}

pub type StageOutcome = std::result::Result<QueryResult, StageFailure>;

/// Owns the stage collaborators and runs one stage at a time
pub(crate) struct StageRunner {
    pub(crate) nlp: NlpProcessor,
    pub(crate) templates: PatternTemplateEngine,
    synthesizer: QuerySynthesizer,
    graph: Arc<dyn GraphExecutor>,
    translator: Option<Arc<dyn DirectTranslator>>,
    schema_qa: Option<Arc<dyn SchemaQaChain>>,
    min_nlp_confidence: f32,
    default_max_retries: u32,
}

impl StageRunner {
    pub(crate) fn new(
        graph: Arc<dyn GraphExecutor>,
        templates: PatternTemplateEngine,
        translator: Option<Arc<dyn DirectTranslator>>,
        schema_qa: Option<Arc<dyn SchemaQaChain>>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            nlp: NlpProcessor::new(),
            templates,
            synthesizer: QuerySynthesizer::new(graph.clone()),
            graph,
            translator,
            schema_qa,
            min_nlp_confidence: config.min_nlp_confidence,
            default_max_retries: config.default_max_retries,
        }
    }

    pub(crate) fn has_translator(&self) -> bool {
        self.translator.is_some()
    }

    pub(crate) fn has_schema_qa(&self) -> bool {
        self.schema_qa.is_some()
    }

    /// A missing collaborator is treated the same as the caller skipping the stage
    pub(crate) fn unavailable(&self, stage: Stage, options: &ProcessOptions) -> Option<StageFailure> {
        let reason = if options.skips(stage) {
            "disabled for this query"
        } else if stage == Stage::DirectTranslate && self.translator.is_none() {
            "no direct translator configured"
        } else if stage == Stage::SchemaQa && self.schema_qa.is_none() {
            "no schema QA chain configured"
        } else {
            return None;
        };
        Some(StageFailure::new(stage, StageFailureKind::Unavailable, reason))
    }

    /// Run one stage end to end
    pub(crate) async fn attempt(
        &self,
        stage: Stage,
        query: &str,
        options: &ProcessOptions,
    ) -> StageOutcome {
        if let Some(failure) = self.unavailable(stage, options) {
            return Err(failure);
        }

        guarded(stage, async {
            match stage {
                Stage::Template => self.run_template(query).await,
                Stage::NlpSynthesized => {
                    let nlp = self.nlp.process(query);
                    self.run_synthesis(query, &nlp).await
                }
                Stage::DirectTranslate => self.run_direct_translate(query).await,
                Stage::SchemaQa => self.run_schema_qa(query, options).await,
                Stage::Failed => Err(StageFailure::new(
                    stage,
                    StageFailureKind::Unavailable,
                    "not an executable stage",
                )),
            }
        })
        .await
    }

    /// NLP extraction on its own, without synthesis
    pub(crate) async fn extract(
        &self,
        query: &str,
        options: &ProcessOptions,
    ) -> std::result::Result<NlpResult, StageFailure> {
        if let Some(failure) = self.unavailable(Stage::NlpSynthesized, options) {
            return Err(failure);
        }
        AssertUnwindSafe(async { self.nlp.process(query) })
            .catch_unwind()
            .await
            .map_err(|panic| panicked(Stage::NlpSynthesized, &*panic))
    }

    /// Synthesis and execution over an already extracted NLP result
    pub(crate) async fn attempt_synthesis(&self, query: &str, nlp: &NlpResult) -> StageOutcome {
        guarded(Stage::NlpSynthesized, self.run_synthesis(query, nlp)).await
    }

    async fn run_template(&self, query: &str) -> StageOutcome {
        match self.templates.process(query).await {
            Ok(matched) => Ok(QueryResult::with_rows(Stage::Template, query, matched.rows)
                .translated(matched.template)
                .confidence(1.0)
                .meta("rule", matched.rule)
                .meta("domain", matched.domain)
                .meta("parameters", Value::Object(matched.parameters))
                .meta("matchedDescription", matched.matched_description)),
            Err(miss) => Err(match miss.last_error {
                Some(error) => StageFailure::new(
                    Stage::Template,
                    StageFailureKind::Execution,
                    format!("template query failed: {}", error),
                ),
                None => StageFailure::new(Stage::Template, StageFailureKind::NoMatch, miss.error),
            }),
        }
    }

    async fn run_synthesis(&self, query: &str, nlp: &NlpResult) -> StageOutcome {
        if nlp.confidence < self.min_nlp_confidence {
            return Err(StageFailure::new(
                Stage::NlpSynthesized,
                StageFailureKind::LowConfidence,
                format!(
                    "NLP confidence {:.2} is below the minimum of {:.2}",
                    nlp.confidence, self.min_nlp_confidence
                ),
            ));
        }

        match self.synthesizer.execute(nlp).await {
            SynthesisOutcome::Executed {
                query: synthesized,
                rows,
            } => Ok(
                QueryResult::with_rows(Stage::NlpSynthesized, query, rows)
                    .translated(synthesized.query)
                    .confidence(nlp.confidence)
                    .meta("intent", synthesized.intent.as_str())
                    .meta("parameters", Value::Object(synthesized.parameters)),
            ),
            SynthesisOutcome::NotSynthesized { reason } => Err(StageFailure::new(
                Stage::NlpSynthesized,
                StageFailureKind::NoMatch,
                reason,
            )),
            SynthesisOutcome::Failed {
                query: synthesized,
                error,
            } => Err(StageFailure::new(
                Stage::NlpSynthesized,
                StageFailureKind::Execution,
                format!(
                    "synthesized {} query failed: {}",
                    synthesized.intent, error
                ),
            )),
        }
    }

    async fn run_direct_translate(&self, query: &str) -> StageOutcome {
        let stage = Stage::DirectTranslate;
        let Some(translator) = &self.translator else {
            return Err(StageFailure::new(
                stage,
                StageFailureKind::Unavailable,
                "no direct translator configured",
            ));
        };

        let translation = translator
            .translate(query)
            .await
            .map_err(|e| StageFailure::new(stage, StageFailureKind::Execution, e.to_string()))?;
        debug!(
            target: PIPELINE_LOG_TARGET,
            translator = translator.name(),
            "Translated query: {}",
            translation.translated_query
        );

        ReadOnlyQueryValidator::validate(&translation.translated_query).map_err(|e| {
            StageFailure::new(
                stage,
                StageFailureKind::Execution,
                format!("translated query rejected: {}", e),
            )
        })?;

        let rows = self
            .graph
            .execute_query(&translation.translated_query, &Params::new())
            .await
            .map_err(|e| StageFailure::new(stage, StageFailureKind::Execution, e.to_string()))?;

        Ok(QueryResult::with_rows(stage, query, rows)
            .translated(translation.translated_query)
            .meta("queryKind", translation.query_kind)
            .meta("explanation", translation.explanation)
            .meta("translator", translator.name()))
    }

    async fn run_schema_qa(&self, query: &str, options: &ProcessOptions) -> StageOutcome {
        let stage = Stage::SchemaQa;
        let Some(chain) = &self.schema_qa else {
            return Err(StageFailure::new(
                stage,
                StageFailureKind::Unavailable,
                "no schema QA chain configured",
            ));
        };

        let qa_options = QaOptions {
            domain: self
                .templates
                .matching_rule(query)
                .map(|rule| rule.domain.to_string()),
            max_retries: Some(options.max_retries.unwrap_or(self.default_max_retries)),
        };
        let response = chain.ask(query, &qa_options).await;

        match (response.success, response.answer) {
            (true, Some(answer)) => {
                let mut result =
                    QueryResult::with_answer(stage, query, answer).meta("chain", chain.name());
                if let Some(translated) = response.translated_query {
                    result = result.translated(translated);
                }
                Ok(result)
            }
            _ => Err(StageFailure::new(
                stage,
                StageFailureKind::Execution,
                response
                    .error
                    .unwrap_or_else(|| "schema QA returned no answer".to_string()),
            )),
        }
    }
}

/// Run a stage future, turning a panic into an execution failure of that stage
async fn guarded<F>(stage: Stage, attempt: F) -> StageOutcome
where
    F: Future<Output = StageOutcome>,
{
    match AssertUnwindSafe(attempt).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => Err(panicked(stage, &*panic)),
    }
}

fn panicked(stage: Stage, payload: &(dyn Any + Send)) -> StageFailure {
    let detail = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic");
    warn!(
        target: PIPELINE_LOG_TARGET,
        stage = stage.number(),
        "Stage panicked: {}",
        detail
    );
    StageFailure::new(
        stage,
        StageFailureKind::Execution,
        format!("stage panicked: {}", detail),
    )
}
