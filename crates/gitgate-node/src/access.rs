//! Repository access list.
//!
//! Loaded once at startup and shared read-only between requests.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Repositories the proxy lets through.
///
/// A repository is admitted if its owner, its name or its `owner/name`
/// slug appears in the matching list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessList {
    /// Owners whose every repository is admitted.
    pub owners: Vec<String>,
    /// Repository names admitted under any owner.
    pub names: Vec<String>,
    /// Exact `owner/name` pairs.
    pub slugs: Vec<String>,
}

impl AccessList {
    /// Loads the access list from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let list: Self = serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::info!(
            ?path,
            owners = list.owners.len(),
            names = list.names.len(),
            slugs = list.slugs.len(),
            "Loaded access list"
        );

        Ok(list)
    }

    /// Checks whether a repository may be proxied.
    pub fn is_allowed(&self, repo: &RepoPath) -> bool {
        self.owners.iter().any(|o| *o == repo.owner)
            || self.names.iter().any(|n| *n == repo.name)
            || self.slugs.iter().any(|s| *s == repo.slug)
    }
}

/// Owner and name taken from a proxied request path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoPath {
    /// First path segment after the prefix.
    pub owner: String,
    /// Second segment, without a trailing `.git`.
    pub name: String,
    /// `owner/name`.
    pub slug: String,
}

impl RepoPath {
    /// Extracts the repository from `{prefix}{owner}/{name}[.git]/...`.
    ///
    /// Returns `None` if `path` is outside `prefix`. Paths with fewer than
    /// two segments yield empty fields.
    pub fn parse(path: &str, prefix: &str) -> Option<Self> {
        let rest = path.strip_prefix(prefix)?;
        let mut parts = rest.split('/');

        match (parts.next(), parts.next()) {
            (Some(owner), Some(name)) => {
                let name = name.strip_suffix(".git").unwrap_or(name);
                Some(Self {
                    owner: owner.to_string(),
                    name: name.to_string(),
                    slug: format!("{}/{}", owner, name),
                })
            }
            _ => Some(Self::default()),
        }
    }
}
