#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use querygraph_ai::{DirectTranslator, QaOptions, QaResponse, SchemaQaChain, Translation};
use querygraph_core::{GraphExecutor, Params, QueryGraphError, Record, Result};
use serde_json::{json, Value};
use std::time::Duration;

/// In-process graph answering by statement substring; unmatched statements return no rows
#[derive(Default)]
pub struct FixtureGraph {
    responses: Vec<(&'static str, std::result::Result<Vec<Record>, String>)>,
    delay: Option<Duration>,
    delayed: Vec<(&'static str, Duration)>,
    pub executed: Mutex<Vec<String>>,
}

impl FixtureGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, needle: &'static str, rows: Vec<Value>) -> Self {
        let rows = rows
            .into_iter()
            .filter_map(|v| v.as_object().cloned())
            .collect();
        self.responses.push((needle, Ok(rows)));
        self
    }

    pub fn failing(mut self, needle: &'static str, message: &str) -> Self {
        self.responses.push((needle, Err(message.to_string())));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Slow down only statements containing `needle`
    pub fn delayed(mut self, needle: &'static str, delay: Duration) -> Self {
        self.delayed.push((needle, delay));
        self
    }

    pub fn executed_count(&self) -> usize {
        self.executed.lock().len()
    }
}

#[async_trait]
impl GraphExecutor for FixtureGraph {
    async fn execute_query(&self, query: &str, _parameters: &Params) -> Result<Vec<Record>> {
        let delay = self.delay.or_else(|| {
            self.delayed
                .iter()
                .find(|(needle, _)| query.contains(needle))
                .map(|(_, delay)| *delay)
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.executed.lock().push(query.to_string());
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

    fn name(&self) -> &str {
        "fixture"
    }
}

/// "Flammkuchen" connected to three ingredient nodes
pub fn flammkuchen_graph() -> FixtureGraph {
    FixtureGraph::new().on(
        "MATCH (n)-[r]-(i)",
        vec![
            json!({"ingredient": "Crème fraîche", "relation": "CONTAINS"}),
            json!({"ingredient": "Speck", "relation": "CONTAINS"}),
            json!({"ingredient": "Zwiebeln", "relation": "CONTAINS"}),
        ],
    )
}

/// Translator that always returns the same statement
pub struct FixedTranslator {
    pub statement: &'static str,
    pub calls: Mutex<u32>,
}

impl FixedTranslator {
    pub fn new(statement: &'static str) -> Self {
        Self {
            statement,
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl DirectTranslator for FixedTranslator {
    async fn translate(&self, _question: &str) -> Result<Translation> {
        *self.calls.lock() += 1;
        Ok(Translation {
            translated_query: self.statement.to_string(),
            query_kind: "cypher".to_string(),
            explanation: "fixed".to_string(),
        })
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

pub struct PanickingTranslator;

#[async_trait]
impl DirectTranslator for PanickingTranslator {
    async fn translate(&self, _question: &str) -> Result<Translation> {
        panic!("translator blew up")
    }
}

/// QA chain with a scripted answer or error
pub struct ScriptedQa {
    answer: std::result::Result<&'static str, &'static str>,
    pub questions: Mutex<Vec<(String, QaOptions)>>,
}

impl ScriptedQa {
    pub fn answering(answer: &'static str) -> Self {
        Self {
            answer: Ok(answer),
            questions: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: &'static str) -> Self {
        Self {
            answer: Err(error),
            questions: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SchemaQaChain for ScriptedQa {
    async fn ask(&self, question: &str, options: &QaOptions) -> QaResponse {
        self.questions
            .lock()
            .push((question.to_string(), options.clone()));
        match self.answer {
            Ok(answer) => QaResponse::answered(answer, "MATCH (n) RETURN count(n)"),
            Err(error) => QaResponse::failed(error, Some("rephrase".to_string())),
        }
    }
}
