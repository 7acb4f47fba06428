//! Subject naming and matching.
//!
//! Subjects are dot-separated tokens. Patterns may use `*` for exactly one
//! token and `>` (last position only) for one or more trailing tokens.

use crate::shared::SharedError;

/// Builds the per-document request/response subjects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subjects {
    prefix: String,
}

impl Subjects {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Client to coordinator channel for one document
    pub fn requests(&self, document_id: &str) -> String {
        format!("{}.{}.requests", self.prefix, document_id)
    }

    /// Coordinator to clients channel for one document
    pub fn responses(&self, document_id: &str) -> String {
        format!("{}.{}.responses", self.prefix, document_id)
    }

    /// Wildcard over every document's request channel
    pub fn all_requests(&self) -> String {
        format!("{}.*.requests", self.prefix)
    }

    /// Document IDs become a subject token, so they must be a single plain token
    pub fn validate_document_id(document_id: &str) -> Result<(), SharedError> {
        if document_id.is_empty() {
            return Err(SharedError::validation("documentId", "must not be empty"));
        }
        if document_id.contains(['.', '*', '>']) || document_id.chars().any(char::is_whitespace) {
            return Err(SharedError::validation(
                "documentId",
                format!("'{}' is not a valid subject token", document_id),
            ));
        }
        Ok(())
    }
}

/// Check that a subscription pattern is well-formed
pub fn validate_pattern(pattern: &str) -> Result<(), SharedError> {
    let tokens: Vec<&str> = pattern.split('.').collect();
    for (i, token) in tokens.iter().enumerate() {
        if token.is_empty() {
            return Err(SharedError::validation("subject", format!("empty token in '{}'", pattern)));
        }
        if *token == ">" && i != tokens.len() - 1 {
            return Err(SharedError::validation(
                "subject",
                format!("'>' must be the last token in '{}'", pattern),
            ));
        }
    }
    Ok(())
}

/// Check that a concrete subject (publish target) has no wildcards
pub fn validate_subject(subject: &str) -> Result<(), SharedError> {
    validate_pattern(subject)?;
    if subject.split('.').any(|token| token == "*" || token == ">") {
        return Err(SharedError::validation(
            "subject",
            format!("cannot publish to wildcard subject '{}'", subject),
        ));
    }
    Ok(())
}

/// Does `subject` match `pattern`?
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut subject_tokens = subject.split('.');
    for pattern_token in pattern.split('.') {
        match pattern_token {
            ">" => return subject_tokens.next().is_some(),
            "*" => {
                if subject_tokens.next().is_none() {
                    return false;
                }
            }
            literal => {
                if subject_tokens.next() != Some(literal) {
                    return false;
                }
            }
        }
    }
    subject_tokens.next().is_none()
}
