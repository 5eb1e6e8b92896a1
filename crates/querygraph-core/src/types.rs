use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// A single row returned by the graph database
pub type Record = Map<String, Value>;

/// Named query parameters
pub type Params = Map<String, Value>;

/// Pipeline stage that produced an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Stage {
    /// Every enabled stage was attempted and none succeeded
    Failed,
    /// Pattern template engine
    Template,
    /// Heuristic NLP extraction + query synthesis
    NlpSynthesized,
    /// Direct translator followed by execution
    DirectTranslate,
    /// Schema-aware question answering chain
    SchemaQa,
}

impl Stage {
    /// The four executable stages in progressive order
    pub const ORDERED: [Stage; 4] = [
        Stage::Template,
        Stage::NlpSynthesized,
        Stage::DirectTranslate,
        Stage::SchemaQa,
    ];

    pub fn number(&self) -> u8 {
        match self {
            Stage::Failed => 0,
            Stage::Template => 1,
            Stage::NlpSynthesized => 2,
            Stage::DirectTranslate => 3,
            Stage::SchemaQa => 4,
        }
    }

    /// Method label carried on results produced by this stage
    pub fn method(&self) -> &'static str {
        match self {
            Stage::Failed => "none",
            Stage::Template => "template",
            Stage::NlpSynthesized => "nlp_synthesized",
            Stage::DirectTranslate => "direct_translate",
            Stage::SchemaQa => "schema_qa",
        }
    }
}

impl From<Stage> for u8 {
    fn from(stage: Stage) -> Self {
        stage.number()
    }
}

impl TryFrom<u8> for Stage {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Stage::Failed),
            1 => Ok(Stage::Template),
            2 => Ok(Stage::NlpSynthesized),
            3 => Ok(Stage::DirectTranslate),
            4 => Ok(Stage::SchemaQa),
            other => Err(format!("stage out of range: {}", other)),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.number(), self.method())
    }
}

/// Execution strategy for a single query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Stage 1 first, remaining stages on failure
    TemplateFirst,
    /// Stages 1 through 4 in order
    Progressive,
    /// Stage 1, NLP extraction and direct translation concurrently
    HybridParallel,
    /// Stage 4 first, stages 1 through 3 on failure
    DirectExternal,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::TemplateFirst => "template-first",
            Strategy::Progressive => "progressive",
            Strategy::HybridParallel => "hybrid-parallel",
            Strategy::DirectExternal => "direct-external",
        }
    }


    pub fn all() -> Vec<Self> {
        vec![
            Strategy::TemplateFirst,
            Strategy::Progressive,
            Strategy::HybridParallel,
            Strategy::DirectExternal,
        ]
    }
}

/// Parses the external strategy name
impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "template-first" => Ok(Strategy::TemplateFirst),
            "progressive" => Ok(Strategy::Progressive),
            "hybrid-parallel" => Ok(Strategy::HybridParallel),
            "direct-external" => Ok(Strategy::DirectExternal),
            other => Err(format!("unknown strategy '{}'", other)),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied switches for a single `process_query` call
///
/// Field order is significant: the serialized form is part of the cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOptions {
    #[serde(default)]
    pub skip_cache: bool,
    #[serde(default)]
    pub skip_templates: bool,
    #[serde(default, rename = "skipNLP")]
    pub skip_nlp: bool,
    #[serde(default)]
    pub skip_direct_translate: bool,
    #[serde(default, rename = "skipSchemaQA")]
    pub skip_schema_qa: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl ProcessOptions {
    /// Options that only allow the local stages (templates and NLP)
    pub fn local_only() -> Self {
        Self {
            skip_direct_translate: true,
            skip_schema_qa: true,
            ..Default::default()
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.force_strategy = Some(strategy.as_str().to_string());
        self
    }

    /// Whether the caller disabled the given stage
    pub fn skips(&self, stage: Stage) -> bool {
        match stage {
            Stage::Failed => true,
            Stage::Template => self.skip_templates,
            Stage::NlpSynthesized => self.skip_nlp,
            Stage::DirectTranslate => self.skip_direct_translate,
            Stage::SchemaQa => self.skip_schema_qa,
        }
    }
}

/// Outcome of a `process_query` call, suitable for direct display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub success: bool,
    pub stage: Stage,
    pub method: String,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Record>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    pub processing_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub from_cache: bool,
    pub produced_at: DateTime<Utc>,
}

impl QueryResult {
    fn base(stage: Stage, query: &str) -> Self {
        Self {
            success: false,
            stage,
            method: stage.method().to_string(),
            query: query.to_string(),
            translated_query: None,
            rows: None,
            answer: None,
            error: None,
            suggestions: Vec::new(),
            processing_time_ms: 0,
            confidence: None,
            metadata: None,
            from_cache: false,
            produced_at: Utc::now(),
        }
    }

    /// Successful outcome carrying graph rows
    pub fn with_rows(stage: Stage, query: &str, rows: Vec<Record>) -> Self {
        let mut result = Self::base(stage, query);
        result.success = true;
        result.rows = Some(rows);
        result
    }

    /// Successful outcome carrying a natural-language answer
    pub fn with_answer(stage: Stage, query: &str, answer: String) -> Self {
        let mut result = Self::base(stage, query);
        result.success = true;
        result.answer = Some(answer);
        result
    }

    /// Total failure: stage 0 with an error and suggestions
    pub fn failure(query: &str, error: impl Into<String>, suggestions: Vec<String>) -> Self {
        let mut result = Self::base(Stage::Failed, query);
        result.error = Some(error.into());
        result.suggestions = suggestions;
        result
    }

    pub fn translated(mut self, translated_query: impl Into<String>) -> Self {
        self.translated_query = Some(translated_query.into());
        self
    }

    pub fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    /// Insert a metadata entry, creating the map on first use
    pub fn meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value.into());
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.as_ref().map_or(0, |rows| rows.len())
    }

    /// Checks the success/payload invariant
    pub fn is_consistent(&self) -> bool {
        if self.success {
            self.error.is_none() && (self.rows.is_some() != self.answer.is_some())
        } else {
            self.error.is_some()
        }
    }
}
