use crate::document::Document;
use serde::{Deserialize, Serialize};

/// Column layout of the document table, parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<ColumnDefinition>,
}

/// Definition of a single table column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Field read from each row. Display-only columns (row selection) have none.
    #[serde(default)]
    pub accessor: Option<Accessor>,
    #[serde(default)]
    pub sort: Option<SortComparator>,
    #[serde(default)]
    pub filter: Option<FilterKind>,
    #[serde(default = "default_true")]
    pub hideable: bool,
    /// Whether the column is part of the compact layout
    #[serde(default)]
    pub compact: bool,
}

fn default_true() -> bool {
    true
}

impl ColumnDefinition {
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }

    pub fn is_sortable(&self) -> bool {
        self.sort.is_some() && self.accessor.is_some()
    }

    pub fn is_filterable(&self) -> bool {
        self.filter.is_some() && self.accessor.is_some()
    }
}

/// Document field a column reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accessor {
    Header,
    Type,
    Status,
    Target,
    Limit,
    Reviewer,
}

impl Accessor {
    /// The displayed cell value for a row.
    pub fn value(&self, doc: &Document) -> CellValue {
        match self {
            Accessor::Header => CellValue::Text(doc.header.clone()),
            Accessor::Type => CellValue::Text(doc.doc_type.label().to_string()),
            Accessor::Status => CellValue::Text(doc.status.label().to_string()),
            Accessor::Target => CellValue::Number(doc.target),
            Accessor::Limit => CellValue::Number(doc.limit),
            Accessor::Reviewer => match &doc.reviewer {
                Some(r) => CellValue::Text(r.name.clone()),
                None => CellValue::Empty,
            },
        }
    }

    /// The value filters and facets key on. Reviewers key on id, not name.
    pub fn filter_key(&self, doc: &Document) -> Option<String> {
        match self {
            Accessor::Reviewer => doc.reviewer.as_ref().map(|r| r.id.clone()),
            other => other.value(doc).as_key(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Accessor::Target | Accessor::Limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortComparator {
    /// Case-insensitive, ties broken case-sensitively
    Text,
    Numeric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// Case-insensitive substring match
    Contains,
    /// Exact match against a set of values
    OneOf,
    /// Reviewer id contained in a set; rows without a reviewer never match
    ReviewerIn,
}

/// A single cell of a table row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(i64),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn as_key(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(s) => Some(s.clone()),
            CellValue::Number(n) => Some(n.to_string()),
        }
    }
}
