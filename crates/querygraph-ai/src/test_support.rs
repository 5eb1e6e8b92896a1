use crate::llm_provider::{GenerationConfig, LLMProvider, LLMResponse, LLMResult, Message};
use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;
use querygraph_core::{GraphExecutor, Params, QueryGraphError, Record, Result};
use serde_json::Value;
use std::collections::VecDeque;

/// LLM that replays canned replies in order; `Err` entries simulate outages
pub(crate) struct ScriptedLlm {
    replies: Mutex<VecDeque<std::result::Result<String, String>>>,
    pub prompts: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<std::result::Result<&str, &str>>) -> Self {
        Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LLMProvider for ScriptedLlm {
    async fn generate_chat(
        &self,
        messages: &[Message],
        _config: &GenerationConfig,
    ) -> LLMResult<LLMResponse> {
        self.prompts.lock().push(messages.to_vec());
        match self.replies.lock().pop_front() {
            Some(Ok(content)) => Ok(LLMResponse {
                content,
                total_tokens: None,
                finish_reason: Some("stop".to_string()),
                model: "scripted".to_string(),
            }),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted reply left")),
        }
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Graph that answers schema probes and records executed statements
pub(crate) struct RecordingGraph {
    rows: Vec<Record>,
    fail_on: Option<&'static str>,
    pub executed: Mutex<Vec<String>>,
}

impl RecordingGraph {
    pub fn new(rows: Vec<Value>) -> Self {
        Self {
            rows: rows
                .into_iter()
                .filter_map(|v| v.as_object().cloned())
                .collect(),
            fail_on: None,
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, needle: &'static str) -> Self {
        self.fail_on = Some(needle);
        self
    }
}

#[async_trait]
impl GraphExecutor for RecordingGraph {
    async fn execute_query(&self, query: &str, _parameters: &Params) -> Result<Vec<Record>> {
        self.executed.lock().push(query.to_string());
        if self.fail_on.is_some_and(|needle| query.contains(needle)) {
            return Err(QueryGraphError::Database("unavailable".to_string()));
        }
        Ok(self.rows.clone())
    }
}
