// ABOUTME: GraphExecutor over the Neo4j HTTP transactional commit endpoint
// ABOUTME: Converts column/row result frames into name-keyed records

use async_trait::async_trait;
use querygraph_core::{GraphConfig, GraphExecutor, Params, QueryGraphError, Record, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Neo4jHttpConfig {
    /// Server root, e.g. "http://localhost:7474"
    pub url: String,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl From<&GraphConfig> for Neo4jHttpConfig {
    fn from(graph: &GraphConfig) -> Self {
        Self {
            url: graph.url.trim_end_matches('/').to_string(),
            database: graph.database.clone(),
            user: graph.user.clone(),
            password: graph.password.clone(),
            timeout: Duration::from_secs(graph.timeout_secs),
        }
    }
}

impl Neo4jHttpConfig {
    pub fn commit_url(&self) -> String {
        format!("{}/db/{}/tx/commit", self.url, self.database)
    }
}

pub struct Neo4jHttpExecutor {
    config: Neo4jHttpConfig,
    client: Client,
}

impl Neo4jHttpExecutor {
    pub fn new(config: Neo4jHttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| QueryGraphError::Database(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    pub fn from_config(graph: &GraphConfig) -> Result<Self> {
        Self::new(graph.into())
    }
}

#[async_trait]
impl GraphExecutor for Neo4jHttpExecutor {
    async fn execute_query(&self, query: &str, parameters: &Params) -> Result<Vec<Record>> {
        let start = Instant::now();
        let body = CommitRequest {
            statements: vec![Statement {
                statement: query,
                parameters,
            }],
        };

        let mut request = self.client.post(self.config.commit_url()).json(&body);
        if let Some(password) = &self.config.password {
            request = request.basic_auth(&self.config.user, Some(password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| QueryGraphError::Database(format!("Neo4j request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| QueryGraphError::Database(format!("Neo4j response unreadable: {}", e)))?;

        if !status.is_success() {
            return Err(QueryGraphError::Database(format!(
                "Neo4j returned {}: {}",
                status, text
            )));
        }

        let records = parse_commit_response(&text)?;
        debug!(
            rows = records.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Neo4j query executed"
        );
        Ok(records)
    }

    fn name(&self) -> &str {
        "neo4j-http"
    }
}

#[derive(Serialize)]
struct CommitRequest<'a> {
    statements: Vec<Statement<'a>>,
}

#[derive(Serialize)]
struct Statement<'a> {
    statement: &'a str,
    parameters: &'a Params,
}

#[derive(Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<Neo4jError>,
}

#[derive(Deserialize)]
struct StatementResult {
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<DataRow>,
}

#[derive(Deserialize)]
struct DataRow {
    row: Vec<Value>,
}

#[derive(Deserialize)]
struct Neo4jError {
    code: String,
    message: String,
}

/// Turn a `tx/commit` response body into records keyed by column name
pub fn parse_commit_response(body: &str) -> Result<Vec<Record>> {
    let response: CommitResponse = serde_json::from_str(body)?;

    if let Some(error) = response.errors.first() {
        return Err(QueryGraphError::Database(format!(
            "{}: {}",
            error.code, error.message
        )));
    }

    let Some(result) = response.results.into_iter().next() else {
        return Ok(Vec::new());
    };

    Ok(result
        .data
        .into_iter()
        .map(|data| result.columns.iter().cloned().zip(data.row).collect())
        .collect())
}
