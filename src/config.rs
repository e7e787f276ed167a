//! Configuration loaded from `octoqueue.toml`.
//!
//! The [`QueueConfig`] struct holds every tunable. Values missing from the
//! file fall back to sensible defaults. The environment variables
//! `GH_TOKEN`, `GITHUB_REPO` and `GITHUB_API_URL` take precedence over the
//! file.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::codec::StateLabels;
use crate::store::RetryConfig;

pub const DEFAULT_CONFIG_FILE: &str = "octoqueue.toml";

/// Top-level configuration loaded from `octoqueue.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Repository holding the queue, as `owner/name`.
    #[serde(default)]
    pub repo: String,

    /// GitHub token.
    #[serde(default)]
    pub token: String,

    /// Base URL of the GitHub REST API.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Timeout applied to every single remote call, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Issues requested per listing page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// JSON Schema document installed at start-up.
    #[serde(default)]
    pub schema_path: Option<PathBuf>,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub labels: StateLabels,
}

// Default base URL: the public GitHub API.
fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

// Default request timeout: 30s.
fn default_request_timeout_secs() -> u64 {
    30
}

// Default page size: 50 issues.
fn default_page_size() -> u32 {
    50
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            repo: String::new(),
            token: String::new(),
            api_url: default_api_url(),
            request_timeout_secs: default_request_timeout_secs(),
            page_size: default_page_size(),
            schema_path: None,
            retry: RetryConfig::default(),
            labels: StateLabels::default(),
        }
    }
}

impl QueueConfig {
    /// Load `octoqueue.toml` from the current directory, or defaults if it
    /// does not exist, then apply the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<QueueConfig>(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        if let Err(reason) = config.labels.validate() {
            bail!("invalid [labels] in {}: {reason}", path.display());
        }
        Ok(config)
    }

    /// Override file values with non-empty variables from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(token) = non_empty("GH_TOKEN") {
            self.token = token;
        }
        if let Some(repo) = non_empty("GITHUB_REPO") {
            self.repo = repo;
        }
        if let Some(url) = non_empty("GITHUB_API_URL") {
            self.api_url = url;
        }
    }

    /// Split `repo` into owner and name.
    pub fn owner_and_name(&self) -> Result<(&str, &str)> {
        match self.repo.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok((owner, name))
            }
            _ if self.repo.is_empty() => {
                bail!("repository not configured: set `repo` or GITHUB_REPO")
            }
            _ => bail!("repository must be `owner/name`, got `{}`", self.repo),
        }
    }

    /// Read the start-up schema, if one is configured.
    pub fn load_schema(&self) -> Result<Option<serde_json::Value>> {
        let Some(path) = &self.schema_path else {
            return Ok(None);
        };
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read schema {}", path.display()))?;
        let schema = serde_json::from_str(&contents)
            .with_context(|| format!("schema {} is not valid JSON", path.display()))?;
        Ok(Some(schema))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_config_values() {
        let config = QueueConfig::default();
        assert_eq!(config.api_url, "https://api.github.com");
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.page_size, 50);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.labels.queued, "queued");
        assert!(config.token.is_empty());
        assert!(config.schema_path.is_none());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            repo = "ping13/jobs"
            request_timeout_secs = 5

            [retry]
            max_attempts = 8

            [labels]
            queued = "pending"
        "#;
        let config: QueueConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.repo, "ping13/jobs");
        assert_eq!(config.request_timeout_secs, 5);
        assert_eq!(config.retry.max_attempts, 8);
        assert_eq!(config.retry.base_delay_ms, 500);
        assert_eq!(config.labels.queued, "pending");
        assert_eq!(config.labels.processing, "processing");
        assert_eq!(config.api_url, "https://api.github.com");
    }

    #[test]
    fn environment_overrides_file() {
        let mut config = QueueConfig {
            repo: "file/repo".into(),
            token: "file-token".into(),
            ..QueueConfig::default()
        };
        let env: HashMap<&str, &str> = [("GH_TOKEN", "env-token"), ("GITHUB_REPO", "")]
            .into_iter()
            .collect();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.token, "env-token");
        // Empty variables do not override.
        assert_eq!(config.repo, "file/repo");
        assert_eq!(config.api_url, "https://api.github.com");
    }

    #[test]
    fn owner_and_name_parsing() {
        let mut config = QueueConfig::default();
        assert!(config.owner_and_name().is_err());

        config.repo = "ping13/octoqueue_test".into();
        assert_eq!(
            config.owner_and_name().unwrap(),
            ("ping13", "octoqueue_test")
        );

        for bad in ["noslash", "/name", "owner/", "a/b/c"] {
            config.repo = bad.into();
            assert!(config.owner_and_name().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn load_rejects_shared_state_labels() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("octoqueue.toml");
        std::fs::write(&config_path, "[labels]\nprocessing = \"queued\"\n").unwrap();

        let err = QueueConfig::load_from(&config_path).unwrap_err();
        assert!(err.to_string().contains("share the label `queued`"), "{err}");
    }

    #[test]
    fn load_from_file_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let schema_path = dir.path().join("schema.json");
        std::fs::write(&schema_path, r#"{"type": "object"}"#).unwrap();

        let config_path = dir.path().join("octoqueue.toml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "repo = \"o/r\"").unwrap();
        writeln!(file, "schema_path = {:?}", schema_path.display().to_string()).unwrap();
        drop(file);

        let config = QueueConfig::load_from(&config_path).unwrap();
        assert_eq!(
            config.load_schema().unwrap(),
            Some(serde_json::json!({"type": "object"}))
        );
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = QueueConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.page_size, 50);
        assert_eq!(config.load_schema().unwrap(), None);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("octoqueue.toml");
        std::fs::write(&path, "retry = 3").unwrap();
        assert!(QueueConfig::load_from(&path).is_err());
    }
}
