pub mod neo4j_http;

pub use neo4j_http::{Neo4jHttpConfig, Neo4jHttpExecutor};
