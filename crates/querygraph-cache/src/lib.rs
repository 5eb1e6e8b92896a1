pub mod cache;
pub mod metrics;
pub mod result_cache;

pub use cache::*;
pub use metrics::*;
pub use result_cache::*;

// Re-export common types for convenience
pub use querygraph_core::{QueryGraphError, QueryResult, Result, Stage};
