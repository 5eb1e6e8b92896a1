// ABOUTME: Direct natural-language to Cypher translation contract
// ABOUTME: LLM-backed implementation that prompts once and extracts the statement

use crate::cypher_extract::extract_cypher;
use crate::llm_provider::{GenerationConfig, LLMProvider, Message};
use async_trait::async_trait;
use querygraph_core::{QueryGraphError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Output of a direct translation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Translation {
    pub translated_query: String,
    pub query_kind: String,
    pub explanation: String,
}

/// Black-box translator from a question to a graph query string
#[async_trait]
pub trait DirectTranslator: Send + Sync {
    async fn translate(&self, question: &str) -> Result<Translation>;

    fn name(&self) -> &str {
        "direct-translator"
    }
}

const TRANSLATOR_INSTRUCTIONS: &str = "You translate questions about a property graph into a \
single read-only Cypher query. Nodes carry `name` and `type` properties. Never write to the \
graph. Answer with the query in a ```cypher code block followed by one sentence explaining it.";

pub struct LlmDirectTranslator {
    provider: Arc<dyn LLMProvider>,
    generation: GenerationConfig,
    schema_hint: Option<String>,
}

impl LlmDirectTranslator {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            generation: GenerationConfig::default(),
            schema_hint: None,
        }
    }

    pub fn with_generation_config(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    /// Static schema description appended to the instructions
    pub fn with_schema_hint(mut self, hint: impl Into<String>) -> Self {
        self.schema_hint = Some(hint.into());
        self
    }

    fn messages(&self, question: &str) -> Vec<Message> {
        let system = match &self.schema_hint {
            Some(hint) => format!("{}\n\nSchema:\n{}", TRANSLATOR_INSTRUCTIONS, hint),
            None => TRANSLATOR_INSTRUCTIONS.to_string(),
        };
        vec![Message::system(system), Message::user(question)]
    }
}

#[async_trait]
impl DirectTranslator for LlmDirectTranslator {
    async fn translate(&self, question: &str) -> Result<Translation> {
        let response = self
            .provider
            .generate_chat(&self.messages(question), &self.generation)
            .await
            .map_err(|e| QueryGraphError::Translation(format!("{:#}", e)))?;
        debug!(provider = self.provider.provider_name(), content = %response.content, "Translator output");

        let translated_query = extract_cypher(&response.content).ok_or_else(|| {
            QueryGraphError::Translation("no Cypher statement in model output".to_string())
        })?;

        let explanation = explanation_from(&response.content)
            .unwrap_or_else(|| format!("Translated by {}", self.provider.model_name()));

        Ok(Translation {
            translated_query,
            query_kind: "cypher".to_string(),
            explanation,
        })
    }

    fn name(&self) -> &str {
        self.provider.provider_name()
    }
}

/// Prose following a fenced block, if any
fn explanation_from(content: &str) -> Option<String> {
    let after = content.rsplit("```").next()?.trim();
    if after.is_empty() || !content.contains("```") {
        None
    } else {
        Some(after.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedLlm;
    use crate::MessageRole;

    #[tokio::test]
    async fn test_translation_from_fenced_reply() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(
            "```cypher\nMATCH (n) WHERE n.type = 'recipe' RETURN n.name\n```\nLists recipe names.",
        )]));
        let translator = LlmDirectTranslator::new(llm.clone()).with_schema_hint("(:Recipe)-[:CONTAINS]->(:Ingredient)");

        let translation = translator.translate("which recipes exist?").await.unwrap();
        assert_eq!(
            translation.translated_query,
            "MATCH (n) WHERE n.type = 'recipe' RETURN n.name"
        );
        assert_eq!(translation.query_kind, "cypher");
        assert_eq!(translation.explanation, "Lists recipe names.");

        let prompts = llm.prompts.lock();
        assert_eq!(prompts[0][0].role, MessageRole::System);
        assert!(prompts[0][0].content.contains("CONTAINS"));
        assert_eq!(prompts[0][1].content, "which recipes exist?");
    }

    #[tokio::test]
    async fn test_provider_failure_maps_to_translation_error() {
        let translator = LlmDirectTranslator::new(Arc::new(ScriptedLlm::new(vec![Err("503")])));
        let err = translator.translate("anything").await.unwrap_err();
        assert!(matches!(err, QueryGraphError::Translation(ref m) if m.contains("503")));
    }

    #[tokio::test]
    async fn test_reply_without_query_is_an_error() {
        let translator =
            LlmDirectTranslator::new(Arc::new(ScriptedLlm::new(vec![Ok("I am not sure.")])));
        assert!(translator.translate("anything").await.is_err());
    }
}
