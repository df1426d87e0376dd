//! Session configuration and backend selection.
//!
//! | Variable | Meaning |
//! |---|---|
//! | `DAYLOG_URL` | Base URL of a `daylog serve` API, e.g. `http://host:17020/api/v1` |
//! | `DAYLOG_OWNER` | Owner identity on the remote store |
//! | `DAYLOG_API_KEY` | Bearer token for the remote store |
//! | `DAYLOG_DATA_DIR` | Directory of the local store |
//! | `DAYLOG_AUTOSAVE_MS` | Quiet period before day edits are written |
//!
//! A session talks to the remote store only when both a URL and an owner are
//! set; otherwise it uses the local store.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::draft::DEFAULT_AUTOSAVE_DELAY;
use crate::repository::{LocalRepository, RemoteRepository, Repository, RepositoryError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value: {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("Owner may only contain letters, digits, '-' and '_': {0:?}")]
    InvalidOwner(String),

    #[error("Could not determine a data directory; set DAYLOG_DATA_DIR")]
    NoDataDir,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub remote_url: Option<String>,
    pub owner: Option<String>,
    pub api_key: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub autosave_delay: Option<Duration>,
}

/// Where a session keeps its data. Chosen once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Local {
        dir: PathBuf,
    },
    Remote {
        url: String,
        owner: String,
        api_key: Option<String>,
    },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let autosave_delay = match get("DAYLOG_AUTOSAVE_MS") {
            Some(raw) => Some(Duration::from_millis(raw.parse().map_err(|_| {
                ConfigError::InvalidValue {
                    var: "DAYLOG_AUTOSAVE_MS",
                    value: raw.clone(),
                }
            })?)),
            None => None,
        };

        Ok(Self {
            remote_url: get("DAYLOG_URL"),
            owner: get("DAYLOG_OWNER"),
            api_key: get("DAYLOG_API_KEY"),
            data_dir: get("DAYLOG_DATA_DIR").map(PathBuf::from),
            autosave_delay,
        })
    }

    pub fn autosave_delay(&self) -> Duration {
        self.autosave_delay.unwrap_or(DEFAULT_AUTOSAVE_DELAY)
    }

    pub fn backend(&self) -> Result<Backend, ConfigError> {
        match (&self.remote_url, &self.owner) {
            (Some(url), Some(owner)) => {
                if !is_valid_owner(owner) {
                    return Err(ConfigError::InvalidOwner(owner.clone()));
                }
                Ok(Backend::Remote {
                    url: url.clone(),
                    owner: owner.clone(),
                    api_key: self.api_key.clone(),
                })
            }
            (url, owner) => {
                if url.is_some() != owner.is_some() {
                    tracing::warn!("Remote store needs both a URL and an owner; using local data");
                }
                let dir = match &self.data_dir {
                    Some(dir) => dir.clone(),
                    None => default_data_dir()?,
                };
                Ok(Backend::Local { dir })
            }
        }
    }
}

impl Backend {
    pub async fn connect(self) -> Result<Arc<dyn Repository>, RepositoryError> {
        match self {
            Backend::Local { dir } => {
                let repo = LocalRepository::open(&dir).await?;
                Ok(Arc::new(repo))
            }
            Backend::Remote { url, owner, api_key } => {
                tracing::debug!("Using remote store {} as {}", url, owner);
                Ok(Arc::new(RemoteRepository::new(url, owner, api_key)))
            }
        }
    }
}

pub fn default_data_dir() -> Result<PathBuf, ConfigError> {
    directories::ProjectDirs::from("", "", "daylog")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(ConfigError::NoDataDir)
}

pub fn is_valid_owner(owner: &str) -> bool {
    !owner.is_empty()
        && owner.len() <= 64
        && owner
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn remote_needs_url_and_owner() {
        let cfg = config(&[
            ("DAYLOG_URL", "http://example.test/api/v1"),
            ("DAYLOG_OWNER", "sam"),
            ("DAYLOG_API_KEY", "k"),
        ])
        .unwrap();
        assert_eq!(
            cfg.backend().unwrap(),
            Backend::Remote {
                url: "http://example.test/api/v1".to_string(),
                owner: "sam".to_string(),
                api_key: Some("k".to_string()),
            }
        );

        let cfg = config(&[
            ("DAYLOG_URL", "http://example.test/api/v1"),
            ("DAYLOG_DATA_DIR", "/tmp/daylog"),
        ])
        .unwrap();
        assert_eq!(
            cfg.backend().unwrap(),
            Backend::Local {
                dir: PathBuf::from("/tmp/daylog")
            }
        );
    }

    #[test]
    fn blank_values_are_unset() {
        let cfg = config(&[("DAYLOG_OWNER", "  "), ("DAYLOG_AUTOSAVE_MS", "")]).unwrap();
        assert!(cfg.owner.is_none());
        assert_eq!(cfg.autosave_delay(), DEFAULT_AUTOSAVE_DELAY);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            config(&[("DAYLOG_AUTOSAVE_MS", "soon")]),
            Err(ConfigError::InvalidValue { .. })
        ));

        let cfg = config(&[("DAYLOG_URL", "http://x"), ("DAYLOG_OWNER", "../etc")]).unwrap();
        assert!(matches!(cfg.backend(), Err(ConfigError::InvalidOwner(_))));
    }

    #[test]
    fn autosave_delay_is_configurable() {
        let cfg = config(&[("DAYLOG_AUTOSAVE_MS", "250")]).unwrap();
        assert_eq!(cfg.autosave_delay(), Duration::from_millis(250));
    }
}
