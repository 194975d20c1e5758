use crate::document::{Document, Reviewer};
use crate::error::{DocboardError, Result};

pub const HEADER_MIN_LEN: usize = 3;

/// Result of validating a document against its field constraints
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<FieldError>,
}

/// A constraint violation on a single form field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&FieldError> {
        self.errors.iter().find(|e| e.field == name)
    }

    fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    /// Turn the collected errors into a single `Validation` error.
    pub fn into_result(self) -> Result<()> {
        if self.is_ok() {
            return Ok(());
        }
        let lines: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        Err(DocboardError::Validation(lines.join("; ")))
    }
}

/// Check a document's fields before it is sent anywhere.
///
/// `reviewers` is the known reviewer set. When it is `None` the reference
/// check is skipped and left to the backend's foreign key.
pub fn validate_document(doc: &Document, reviewers: Option<&[Reviewer]>) -> ValidationResult {
    let mut result = ValidationResult::default();

    if doc.header.trim().is_empty() {
        result.push("header", "Header is required");
    } else if doc.header.chars().count() < HEADER_MIN_LEN {
        result.push(
            "header",
            format!("Header must be at least {HEADER_MIN_LEN} characters"),
        );
    }

    if doc.target < 0 {
        result.push("target", "Target must be zero or greater");
    }
    if doc.limit < 0 {
        result.push("limit", "Limit must be zero or greater");
    }

    if let (Some(reviewer), Some(known)) = (&doc.reviewer, reviewers) {
        if !known.iter().any(|r| r.id == reviewer.id) {
            result.push(
                "reviewer",
                format!("Reviewer '{}' does not exist", reviewer.id),
            );
        }
    }

    result
}
