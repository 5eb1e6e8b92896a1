use async_trait::async_trait;
use parking_lot::Mutex;
use querygraph_core::{GraphExecutor, Params, QueryGraphError, Record, Result};
use serde_json::Value;

/// In-memory graph that answers by query substring
pub(crate) struct ScriptedGraph {
    responses: Vec<(&'static str, std::result::Result<Vec<Record>, String>)>,
    pub calls: Mutex<Vec<(String, Params)>>,
}

impl ScriptedGraph {
    pub fn new() -> Self {
        Self {
            responses: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn rows(mut self, needle: &'static str, rows: Vec<Value>) -> Self {
        let rows = rows
            .into_iter()
            .filter_map(|v| v.as_object().cloned())
            .collect();
        self.responses.push((needle, Ok(rows)));
        self
    }

    pub fn fails(mut self, needle: &'static str, message: &str) -> Self {
        self.responses.push((needle, Err(message.to_string())));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl GraphExecutor for ScriptedGraph {
    async fn execute_query(&self, query: &str, parameters: &Params) -> Result<Vec<Record>> {
        self.calls
            .lock()
            .push((query.to_string(), parameters.clone()));
        match self
            .responses
            .iter()
            .find(|(needle, _)| query.contains(needle))
        {
            Some((_, Ok(rows))) => Ok(rows.clone()),
            Some((_, Err(message))) => Err(QueryGraphError::Database(message.clone())),
            None => Ok(Vec::new()),
        }
    }
}
