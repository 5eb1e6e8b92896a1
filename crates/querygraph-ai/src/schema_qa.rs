// ABOUTME: Schema-aware graph question answering chain
// ABOUTME: Reads the live schema, generates and runs Cypher, then phrases an answer; retries with linear backoff

use crate::cypher_extract::extract_cypher;
use crate::llm_provider::{GenerationConfig, LLMProvider, Message};
use async_trait::async_trait;
use querygraph_core::{
    GraphExecutor, Params, QueryGraphError, Record, ReadOnlyQueryValidator, Result,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl QaResponse {
    pub fn answered(answer: impl Into<String>, translated_query: impl Into<String>) -> Self {
        Self {
            success: true,
            answer: Some(answer.into()),
            translated_query: Some(translated_query.into()),
            error: None,
            suggestion: None,
        }
    }

    pub fn failed(error: impl Into<String>, suggestion: Option<String>) -> Self {
        Self {
            success: false,
            answer: None,
            translated_query: None,
            error: Some(error.into()),
            suggestion,
        }
    }
}

/// Black-box question answering over the graph. Retries are internal.
#[async_trait]
pub trait SchemaQaChain: Send + Sync {
    async fn ask(&self, question: &str, options: &QaOptions) -> QaResponse;

    fn name(&self) -> &str {
        "schema-qa"
    }
}

const NODE_SCHEMA_QUERY: &str =
    "MATCH (n) RETURN DISTINCT n.type AS type, labels(n) AS labels LIMIT 50";
const RELATIONSHIP_SCHEMA_QUERY: &str =
    "MATCH ()-[r]->() RETURN DISTINCT type(r) AS relationship LIMIT 50";

/// Rows shown to the model when phrasing the answer
const ANSWER_ROW_LIMIT: usize = 50;

const CYPHER_INSTRUCTIONS: &str = "You write a single read-only Cypher query that answers the \
user's question over the graph described below. Nodes carry `name` and `type` properties. \
Use only the node types and relationship types listed. Reply with the query in a ```cypher \
code block and nothing else.";

const ANSWER_INSTRUCTIONS: &str = "You answer the user's question in one or two plain sentences \
using only the query results provided. If the results are empty, say that nothing was found.";

const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_MAX_RETRIES: u32 = 2;

pub struct LlmSchemaQaChain {
    provider: Arc<dyn LLMProvider>,
    graph: Arc<dyn GraphExecutor>,
    generation: GenerationConfig,
    retry_delay: Duration,
    default_max_retries: u32,
}

impl LlmSchemaQaChain {
    pub fn new(provider: Arc<dyn LLMProvider>, graph: Arc<dyn GraphExecutor>) -> Self {
        Self {
            provider,
            graph,
            generation: GenerationConfig::default(),
            retry_delay: DEFAULT_RETRY_DELAY,
            default_max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_generation_config(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    /// Backoff step; attempt `n` waits `n * delay`
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    async fn fetch_schema(&self) -> Result<String> {
        let nodes = self
            .graph
            .execute_query(NODE_SCHEMA_QUERY, &Params::new())
            .await?;
        let relationships = self
            .graph
            .execute_query(RELATIONSHIP_SCHEMA_QUERY, &Params::new())
            .await?;
        Ok(describe_schema(&nodes, &relationships))
    }

    async fn attempt(&self, question: &str, options: &QaOptions) -> Result<(String, String)> {
        let schema = self.fetch_schema().await?;
        let mut system = format!("{}\n\nSchema:\n{}", CYPHER_INSTRUCTIONS, schema);
        if let Some(domain) = &options.domain {
            system.push_str(&format!("\n\nThe question concerns the '{}' domain.", domain));
        }

        let generated = self
            .provider
            .generate_chat(&[Message::system(system), Message::user(question)], &self.generation)
            .await
            .map_err(|e| QueryGraphError::SchemaQa(format!("{:#}", e)))?;
        let cypher = extract_cypher(&generated.content).ok_or_else(|| {
            QueryGraphError::SchemaQa("no Cypher statement in model output".to_string())
        })?;
        ReadOnlyQueryValidator::validate(&cypher)
            .map_err(|e| QueryGraphError::RejectedQuery(e.to_string()))?;
        debug!(cypher = %cypher, "Schema QA generated query");

        let rows = self.graph.execute_query(&cypher, &Params::new()).await?;
        let shown = &rows[..rows.len().min(ANSWER_ROW_LIMIT)];
        let answer_prompt = format!(
            "Question: {}\n\nQuery results ({} rows):\n{}",
            question,
            rows.len(),
            serde_json::to_string_pretty(shown)?
        );

        let answer = self
            .provider
            .generate_chat(
                &[Message::system(ANSWER_INSTRUCTIONS), Message::user(answer_prompt)],
                &self.generation,
            )
            .await
            .map_err(|e| QueryGraphError::SchemaQa(format!("{:#}", e)))?;

        Ok((answer.content.trim().to_string(), cypher))
    }
}

#[async_trait]
impl SchemaQaChain for LlmSchemaQaChain {
    async fn ask(&self, question: &str, options: &QaOptions) -> QaResponse {
        let max_retries = options.max_retries.unwrap_or(self.default_max_retries);
        let mut last_error = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay * attempt).await;
            }

            match self.attempt(question, options).await {
                Ok((answer, cypher)) => {
                    info!(attempt = attempt + 1, "Schema QA answered");
                    return QaResponse::answered(answer, cypher);
                }
                Err(e @ QueryGraphError::RejectedQuery(_)) => {
                    warn!(error = %e, "Schema QA produced a write query");
                    return QaResponse::failed(
                        e.to_string(),
                        Some("Ask a question that only reads from the graph".to_string()),
                    );
                }
                Err(e) => {
                    if attempt < max_retries {
                        warn!(
                            "Schema QA attempt {}/{} failed: {}, retrying...",
                            attempt + 1,
                            max_retries + 1,
                            e
                        );
                    }
                    last_error = Some(e);
                }
            }
        }

        let error = last_error.map_or_else(|| "schema QA failed".to_string(), |e| e.to_string());
        QaResponse::failed(
            error,
            Some("Mention node types or relationship names that exist in the graph".to_string()),
        )
    }

    fn name(&self) -> &str {
        self.provider.provider_name()
    }
}

fn describe_schema(nodes: &[Record], relationships: &[Record]) -> String {
    let render = |records: &[Record]| -> String {
        let mut values: Vec<String> = records
            .iter()
            .flat_map(|record| record.values())
            .flat_map(|value| match value {
                serde_json::Value::Array(items) => items.clone(),
                other => vec![other.clone()],
            })
            .filter_map(|value| value.as_str().map(str::to_string))
            .collect();
        values.sort();
        values.dedup();
        if values.is_empty() {
            "(none)".to_string()
        } else {
            values.join(", ")
        }
    };

    format!(
        "Node types and labels: {}\nRelationship types: {}",
        render(nodes),
        render(relationships)
    )
}
