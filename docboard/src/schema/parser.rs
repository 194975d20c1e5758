use crate::error::Result;
use super::types::TableSchema;
use std::path::Path;

/// Built-in document table layout
pub const DEFAULT_SCHEMA_YAML: &str = r#"
columns:
  - id: select
    hideable: false
  - id: header
    label: Header
    accessor: header
    sort: text
    filter: contains
    hideable: false
    compact: true
  - id: type
    label: Type
    accessor: type
    filter: one_of
    compact: true
  - id: status
    label: Status
    accessor: status
    filter: one_of
    compact: true
  - id: target
    label: Target
    accessor: target
    sort: numeric
    compact: true
  - id: limit
    label: Limit
    accessor: limit
    sort: numeric
    compact: true
  - id: reviewer
    label: Reviewer
    accessor: reviewer
    filter: reviewer_in
    compact: true
"#;

/// Parse a table schema file into a validated TableSchema
pub fn parse_schema(path: &Path) -> Result<TableSchema> {
    let content = std::fs::read_to_string(path)?;
    parse_schema_str(&content)
}

/// Parse a table schema YAML string into a validated TableSchema
pub fn parse_schema_str(content: &str) -> Result<TableSchema> {
    let schema: TableSchema = serde_yaml::from_str(content)?;
    schema.validate()?;
    Ok(schema)
}

/// The built-in document table layout
pub fn default_schema() -> Result<TableSchema> {
    parse_schema_str(DEFAULT_SCHEMA_YAML)
}
