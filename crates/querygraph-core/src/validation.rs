use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

/// Longest natural-language question accepted by the pipeline
pub const MAX_QUESTION_LENGTH: usize = 1000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Required field '{field}' is missing")]
    RequiredField { field: String },

    #[error("Invalid length for field '{field}': expected {min}-{max} characters, got {actual}")]
    InvalidLength {
        field: String,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("Invalid characters in field '{field}': {reason}")]
    InvalidCharacters { field: String, reason: String },

    #[error("Write clause '{clause}' is not allowed in generated queries")]
    WriteClause { clause: String },
}

lazy_static! {
    static ref STRING_LITERAL: Regex =
        Regex::new(r#"'(?:[^'\\]|\\.)*'|"(?:[^"\\]|\\.)*""#).unwrap();
    static ref WRITE_CLAUSE: Regex = Regex::new(
        r"(?i)\b(CREATE|MERGE|DELETE|DETACH|SET|REMOVE|DROP|FOREACH|LOAD\s+CSV|CALL\s+dbms\.|CALL\s+apoc\.(?:create|merge|refactor|periodic))\b"
    )
    .unwrap();
}

/// Validation of incoming questions
pub struct QuestionValidator;

impl QuestionValidator {
    pub fn validate(question: &str) -> Result<(), ValidationError> {
        let trimmed = question.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::RequiredField {
                field: "query".to_string(),
            });
        }

        let length = trimmed.chars().count();
        if length > MAX_QUESTION_LENGTH {
            return Err(ValidationError::InvalidLength {
                field: "query".to_string(),
                min: 1,
                max: MAX_QUESTION_LENGTH,
                actual: length,
            });
        }

        if trimmed
            .chars()
            .any(|c| c.is_control() && c != '\t' && c != '\n' && c != '\r')
        {
            return Err(ValidationError::InvalidCharacters {
                field: "query".to_string(),
                reason: "Contains control characters".to_string(),
            });
        }

        Ok(())
    }
}

/// Guard for query text produced outside the engine (LLM translators).
/// Only read queries may reach the graph database.
pub struct ReadOnlyQueryValidator;

impl ReadOnlyQueryValidator {
    pub fn validate(query: &str) -> Result<(), ValidationError> {
        if query.trim().is_empty() {
            return Err(ValidationError::RequiredField {
                field: "translated_query".to_string(),
            });
        }

        // Literals may legitimately contain words like "set" or "create"
        let without_literals = STRING_LITERAL.replace_all(query, "''");
        if let Some(found) = WRITE_CLAUSE.find(&without_literals) {
            return Err(ValidationError::WriteClause {
                clause: found.as_str().to_uppercase(),
            });
        }

        Ok(())
    }
}
