use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocboardError {
    /// A read against the backend failed. Carries the backend message verbatim.
    #[error("{0}")]
    Query(String),

    /// A write against the backend failed. Carries the backend message verbatim.
    #[error("{0}")]
    Mutation(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl DocboardError {
    /// Re-tag any error as a failed read, keeping its message.
    pub fn into_query(self) -> Self {
        match self {
            DocboardError::Query(_) => self,
            other => DocboardError::Query(other.to_string()),
        }
    }

    /// Re-tag any error as a failed write, keeping its message.
    pub fn into_mutation(self) -> Self {
        match self {
            DocboardError::Mutation(_) | DocboardError::Validation(_) => self,
            other => DocboardError::Mutation(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DocboardError>;
