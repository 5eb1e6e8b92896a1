// ABOUTME: External translator adapters for the query pipeline
// ABOUTME: LLM provider abstraction, OpenAI-compatible client, direct translation and schema QA

pub mod cypher_extract;
pub mod llm_provider;
#[cfg(feature = "openai-compatible")]
pub mod openai_compatible_provider;
pub mod schema_qa;
pub mod translator;

#[cfg(test)]
pub(crate) mod test_support;

pub use cypher_extract::extract_cypher;
pub use llm_provider::*;
#[cfg(feature = "openai-compatible")]
pub use openai_compatible_provider::{OpenAICompatibleConfig, OpenAICompatibleProvider};
pub use schema_qa::{LlmSchemaQaChain, QaOptions, QaResponse, SchemaQaChain};
pub use translator::{DirectTranslator, LlmDirectTranslator, Translation};
