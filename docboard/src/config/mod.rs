//! Runtime configuration.
//!
//! Loaded from an optional YAML file, then overridden by `DOCBOARD_*`
//! environment variables, then validated.

use crate::activity::{HttpActivitySource, DEFAULT_SEED};
use crate::backend::{Backend, RestBackend, SqliteBackend};
use crate::error::{DocboardError, Result};
use crate::schema::{default_schema, parse_schema, TableSchema};
use crate::view::{DEFAULT_PAGE_SIZE, PAGE_SIZE_OPTIONS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_DATABASE: &str = "docboard.db";
pub const DEFAULT_ACTIVITY_URL: &str = "https://fakerapi.it/api/v2/custom";
pub const DEFAULT_ACTIVITY_DAYS: usize = 90;

pub const ENV_BACKEND: &str = "DOCBOARD_BACKEND";
pub const ENV_DATABASE: &str = "DOCBOARD_DATABASE";
pub const ENV_REST_URL: &str = "DOCBOARD_REST_URL";
pub const ENV_API_KEY: &str = "DOCBOARD_API_KEY";
pub const ENV_ACTIVITY_URL: &str = "DOCBOARD_ACTIVITY_URL";
pub const ENV_ACTIVITY_DAYS: &str = "DOCBOARD_ACTIVITY_DAYS";
pub const ENV_PAGE_SIZE: &str = "DOCBOARD_PAGE_SIZE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub activity: ActivityConfig,
    pub page_size: usize,
    /// Column schema file; the built-in layout is used when unset
    pub schema: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend: BackendConfig::default(),
            activity: ActivityConfig::default(),
            page_size: DEFAULT_PAGE_SIZE,
            schema: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    Sqlite {
        path: PathBuf,
    },
    Rest {
        url: String,
        api_key: String,
        #[serde(default)]
        access_token: Option<String>,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Sqlite {
            path: PathBuf::from(DEFAULT_DATABASE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    pub url: String,
    pub seed: u64,
    pub days: usize,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        ActivityConfig {
            url: DEFAULT_ACTIVITY_URL.to_string(),
            seed: DEFAULT_SEED,
            days: DEFAULT_ACTIVITY_DAYS,
        }
    }
}

impl Config {
    /// Load from `path` (or defaults when `None`), apply the process
    /// environment and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    DocboardError::Config(format!(
                        "failed to read config at {}: {e}",
                        path.display()
                    ))
                })?;
                Self::parse_unchecked(&contents)?
            }
            None => {
                log::debug!("no config file given, using defaults");
                Config::default()
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a YAML document, without environment overrides.
    pub fn parse(contents: &str) -> Result<Self> {
        let config = Self::parse_unchecked(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn parse_unchecked(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(contents)
            .map_err(|e| DocboardError::Config(format!("failed to parse config: {e}")))
    }

    /// Override fields from environment variables read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(kind) = lookup(ENV_BACKEND) {
            let is_rest = matches!(self.backend, BackendConfig::Rest { .. });
            match (kind.as_str(), is_rest) {
                ("sqlite", false) | ("rest", true) => {}
                ("sqlite", true) => self.backend = BackendConfig::default(),
                ("rest", false) => {
                    self.backend = BackendConfig::Rest {
                        url: String::new(),
                        api_key: String::new(),
                        access_token: None,
                    }
                }
                (other, _) => {
                    return Err(DocboardError::Config(format!(
                        "{ENV_BACKEND} must be 'sqlite' or 'rest', got '{other}'"
                    )))
                }
            }
        }

        match &mut self.backend {
            BackendConfig::Sqlite { path } => {
                if let Some(value) = lookup(ENV_DATABASE) {
                    *path = PathBuf::from(value);
                }
            }
            BackendConfig::Rest { url, api_key, .. } => {
                if let Some(value) = lookup(ENV_REST_URL) {
                    *url = value;
                }
                if let Some(value) = lookup(ENV_API_KEY) {
                    *api_key = value;
                }
            }
        }

        if let Some(value) = lookup(ENV_ACTIVITY_URL) {
            self.activity.url = value;
        }
        if let Some(value) = lookup(ENV_ACTIVITY_DAYS) {
            self.activity.days = parse_number(ENV_ACTIVITY_DAYS, &value)?;
        }
        if let Some(value) = lookup(ENV_PAGE_SIZE) {
            self.page_size = parse_number(ENV_PAGE_SIZE, &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if !PAGE_SIZE_OPTIONS.contains(&self.page_size) {
            errors.push(format!(
                "page_size must be one of {PAGE_SIZE_OPTIONS:?}, got {}",
                self.page_size
            ));
        }
        if self.activity.days == 0 {
            errors.push("activity.days must be at least 1".to_string());
        }
        match &self.backend {
            BackendConfig::Rest { url, .. } if url.trim().is_empty() => {
                errors.push("backend.url is required for the rest backend".to_string())
            }
            BackendConfig::Sqlite { path } if path.as_os_str().is_empty() => {
                errors.push("backend.path is required for the sqlite backend".to_string())
            }
            _ => {}
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(DocboardError::Config(errors.join("; ")))
        }
    }

    /// Open the configured backend.
    pub fn open_backend(&self) -> Result<Arc<dyn Backend>> {
        match &self.backend {
            BackendConfig::Sqlite { path } => {
                log::info!("Opening SQLite backend at {}", path.display());
                Ok(Arc::new(SqliteBackend::open(path)?))
            }
            BackendConfig::Rest {
                url,
                api_key,
                access_token,
            } => {
                log::info!("Using REST backend at {url}");
                let mut backend = RestBackend::new(url, api_key)?;
                if let Some(token) = access_token {
                    backend = backend.with_access_token(token.clone());
                }
                Ok(Arc::new(backend))
            }
        }
    }

    pub fn activity_source(&self) -> Result<HttpActivitySource> {
        HttpActivitySource::new(&self.activity.url, self.activity.seed)
    }

    /// The configured column schema, or the built-in one.
    pub fn table_schema(&self) -> Result<TableSchema> {
        match &self.schema {
            Some(path) => parse_schema(path),
            None => default_schema(),
        }
    }
}

fn parse_number(key: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| DocboardError::Config(format!("{key} must be a number, got '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(
            config.backend,
            BackendConfig::Sqlite {
                path: PathBuf::from("docboard.db")
            }
        );
        assert_eq!(config.activity.days, 90);
        assert_eq!(config.page_size, 10);
    }

    #[test]
    fn test_parse_rest_backend() {
        let yaml = r#"
backend:
  kind: rest
  url: https://project.example.co
  api_key: anon
page_size: 20
activity:
  days: 30
"#;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(
            config.backend,
            BackendConfig::Rest {
                url: "https://project.example.co".into(),
                api_key: "anon".into(),
                access_token: None,
            }
        );
        assert_eq!(config.page_size, 20);
        assert_eq!(config.activity.days, 30);
        assert_eq!(config.activity.seed, DEFAULT_SEED);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let err = Config::parse("page_size: 15\n").unwrap_err();
        assert!(matches!(err, DocboardError::Config(_)));

        let err = Config::parse("backend:\n  kind: rest\n  url: ''\n  api_key: k\n").unwrap_err();
        assert!(err.to_string().contains("backend.url"));

        let err = Config::parse("backend: [not, a, map]\n").unwrap_err();
        assert!(matches!(err, DocboardError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                (ENV_BACKEND, "rest"),
                (ENV_REST_URL, "https://api.example.co"),
                (ENV_API_KEY, "secret"),
                (ENV_DATABASE, "ignored.db"),
                (ENV_ACTIVITY_DAYS, "7"),
                (ENV_PAGE_SIZE, "50"),
            ]))
            .unwrap();
        config.validate().unwrap();

        assert_eq!(
            config.backend,
            BackendConfig::Rest {
                url: "https://api.example.co".into(),
                api_key: "secret".into(),
                access_token: None,
            }
        );
        assert_eq!(config.activity.days, 7);
        assert_eq!(config.page_size, 50);
    }

    #[test]
    fn test_env_database_path() {
        let mut config = Config::default();
        config.apply_env(env(&[(ENV_DATABASE, "/tmp/board.db")])).unwrap();
        assert_eq!(
            config.backend,
            BackendConfig::Sqlite {
                path: PathBuf::from("/tmp/board.db")
            }
        );
    }

    #[test]
    fn test_bad_env_values() {
        let mut config = Config::default();
        assert!(config.apply_env(env(&[(ENV_BACKEND, "mongo")])).is_err());
        assert!(config.apply_env(env(&[(ENV_PAGE_SIZE, "ten")])).is_err());
    }

    #[test]
    fn test_load_file_and_open_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("board.db");
        let path = dir.path().join("docboard.yaml");
        std::fs::write(
            &path,
            format!("backend:\n  kind: sqlite\n  path: {}\n", db.display()),
        )
        .unwrap();

        let config = Config::parse(&std::fs::read_to_string(&path).unwrap()).unwrap();
        config.open_backend().unwrap();
        assert!(db.exists());
        assert_eq!(config.table_schema().unwrap().columns.len(), 7);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/docboard.yaml"))).unwrap_err();
        assert!(matches!(err, DocboardError::Config(_)));
    }
}
