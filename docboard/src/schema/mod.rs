mod parser;
mod types;

pub use parser::{default_schema, parse_schema, parse_schema_str, DEFAULT_SCHEMA_YAML};
pub use types::{Accessor, CellValue, ColumnDefinition, FilterKind, SortComparator, TableSchema};

use crate::error::{DocboardError, Result};
use std::collections::HashSet;

impl TableSchema {
    pub fn column(&self, id: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.id == id)
    }

    /// Look up a column, failing with a schema error when it is not declared.
    pub fn require_column(&self, id: &str) -> Result<&ColumnDefinition> {
        self.column(id)
            .ok_or_else(|| DocboardError::Schema(format!("Column '{id}' not found in schema")))
    }

    /// The subset of columns shown in compact layout, in schema order.
    pub fn compact(&self) -> TableSchema {
        TableSchema {
            columns: self.columns.iter().filter(|c| c.compact).cloned().collect(),
        }
    }

    /// Check that the declared columns are internally consistent.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let mut errors = Vec::new();

        for column in &self.columns {
            if !seen.insert(column.id.as_str()) {
                errors.push(format!("duplicate column id '{}'", column.id));
            }

            match (column.accessor, column.sort) {
                (None, Some(_)) => {
                    errors.push(format!("column '{}' sorts but has no accessor", column.id))
                }
                (Some(acc), Some(SortComparator::Numeric)) if !acc.is_numeric() => errors.push(
                    format!("column '{}' uses a numeric sort on a text field", column.id),
                ),
                (Some(acc), Some(SortComparator::Text)) if acc.is_numeric() => errors.push(
                    format!("column '{}' uses a text sort on a numeric field", column.id),
                ),
                _ => {}
            }

            match (column.accessor, column.filter) {
                (None, Some(_)) => {
                    errors.push(format!("column '{}' filters but has no accessor", column.id))
                }
                (Some(acc), Some(FilterKind::ReviewerIn)) if acc != Accessor::Reviewer => {
                    errors.push(format!(
                        "column '{}' uses reviewer_in without the reviewer accessor",
                        column.id
                    ))
                }
                (Some(acc), Some(FilterKind::Contains)) if acc.is_numeric() => errors.push(
                    format!("column '{}' uses contains on a numeric field", column.id),
                ),
                _ => {}
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(DocboardError::Schema(errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::tests::{document, reviewer};

    #[test]
    fn test_default_schema_columns() {
        let schema = default_schema().unwrap();
        let ids: Vec<&str> = schema.columns.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["select", "header", "type", "status", "target", "limit", "reviewer"]
        );
        assert!(!schema.column("select").unwrap().hideable);
        assert!(!schema.column("header").unwrap().hideable);
        assert!(schema.column("type").unwrap().hideable);
    }

    #[test]
    fn test_compact_subset() {
        let compact = default_schema().unwrap().compact();
        let ids: Vec<&str> = compact.columns.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["header", "type", "status", "target", "limit", "reviewer"]);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = parse_schema_str(
            "columns:\n  - { id: a, accessor: header }\n  - { id: a, accessor: type }\n",
        );
        assert!(matches!(result, Err(DocboardError::Schema(_))));
    }

    #[test]
    fn test_filter_without_accessor_rejected() {
        let result = parse_schema_str("columns:\n  - { id: x, filter: one_of }\n");
        assert!(result.unwrap_err().to_string().contains("no accessor"));
    }

    #[test]
    fn test_reviewer_in_requires_reviewer_accessor() {
        let result =
            parse_schema_str("columns:\n  - { id: x, accessor: status, filter: reviewer_in }\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_numeric_sort_on_text_rejected() {
        let result =
            parse_schema_str("columns:\n  - { id: x, accessor: header, sort: numeric }\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_accessor_values() {
        let doc = document("d1", |d| {
            d.target = 7;
            d.reviewer = Some(reviewer("r1", "Ana"));
        });
        assert_eq!(Accessor::Target.value(&doc), CellValue::Number(7));
        assert_eq!(Accessor::Reviewer.value(&doc), CellValue::Text("Ana".into()));
        assert_eq!(Accessor::Reviewer.filter_key(&doc), Some("r1".into()));
        assert_eq!(Accessor::Status.filter_key(&doc), Some("Not Started".into()));

        let bare = document("d2", |_| {});
        assert!(Accessor::Reviewer.value(&bare).is_empty());
        assert_eq!(Accessor::Reviewer.filter_key(&bare), None);
    }
}
