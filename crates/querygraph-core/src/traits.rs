use crate::{Params, Record, Result};
use async_trait::async_trait;

/// Narrow contract to the graph database.
///
/// Implementations own connection details; the orchestrator only ever issues
/// parameterized read queries and treats any error as a failure of the stage
/// that issued it.
#[async_trait]
pub trait GraphExecutor: Send + Sync {
    async fn execute_query(&self, query: &str, parameters: &Params) -> Result<Vec<Record>>;

    /// Name used in logs
    fn name(&self) -> &str {
        "graph"
    }
}
