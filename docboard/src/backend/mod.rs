// Backend seam: wire shapes and the trait every backend implements

pub mod rest;
pub mod sqlite;

pub use rest::RestBackend;
pub use sqlite::SqliteBackend;

use crate::document::{Document, DocumentStatus, DocumentType, Reviewer};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Wire-level access to the `documents` and `reviewers` tables.
///
/// Implementations report failures as `Query` (reads) or `Mutation` (writes)
/// carrying the backend's own message.
#[async_trait]
pub trait Backend: Send + Sync {
    /// All documents, newest first, each joined to at most one reviewer.
    async fn select_documents(&self) -> Result<Vec<DocumentRow>>;

    async fn select_reviewers(&self) -> Result<Vec<Reviewer>>;

    /// Insert a row and return what the backend stored.
    async fn insert_document(&self, record: &DocumentRecord) -> Result<Vec<DocumentRow>>;

    /// Replace the mutable fields of the row matching `id`. Returns the
    /// updated rows, empty when nothing matched.
    async fn update_document(&self, id: &str, record: &DocumentRecord)
        -> Result<Vec<DocumentRow>>;

    async fn delete_document(&self, id: &str) -> Result<()>;
}

/// A document as the backend returns it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRow {
    pub id: String,
    pub header: String,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub status: DocumentStatus,
    pub target: i64,
    pub limit_value: i64,
    #[serde(default)]
    pub reviewer: ReviewerJoin,
}

/// The reviewer relationship as a join returns it: null, a single row, or a
/// list holding zero or one row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReviewerJoin {
    #[default]
    Missing,
    One(Reviewer),
    Many(Vec<Reviewer>),
}

impl ReviewerJoin {
    pub fn into_reviewer(self) -> Option<Reviewer> {
        match self {
            ReviewerJoin::Missing => None,
            ReviewerJoin::One(r) => Some(r),
            ReviewerJoin::Many(list) => list.into_iter().next(),
        }
    }
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Document {
            id: row.id,
            header: row.header,
            doc_type: row.doc_type,
            status: row.status,
            target: row.target,
            limit: row.limit_value,
            reviewer: row.reviewer.into_reviewer(),
        }
    }
}

/// The writable columns of a document row.
///
/// `reviewer_id` is always serialized so that clearing a reviewer sends an
/// explicit null. `user_id` is only present on insert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRecord {
    pub header: String,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub status: DocumentStatus,
    pub target: i64,
    pub limit_value: i64,
    pub reviewer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl DocumentRecord {
    pub fn from_document(doc: &Document) -> Self {
        DocumentRecord {
            header: doc.header.clone(),
            doc_type: doc.doc_type,
            status: doc.status,
            target: doc.target,
            limit_value: doc.limit,
            reviewer_id: doc.reviewer_id().map(str::to_string),
            user_id: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}
