use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryGraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Rejected query: {0}")]
    RejectedQuery(String),

    #[error("Translation error: {0}")]
    Translation(String),

    #[error("Schema QA error: {0}")]
    SchemaQa(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

pub type Result<T> = std::result::Result<T, QueryGraphError>;
