//! Registry configuration.
//!
//! Selects which backend to run and where its data lives. The host loads the
//! config once at startup; a malformed file is fatal there, never silently
//! defaulted.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed config file {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Which storage backend the registry runs on.
///
/// Selected once at startup; the two are never mixed at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-memory cache persisted to a JSON document.
    #[default]
    File,
    /// Relational store, one row per container.
    Sql,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileBackendConfig {
    /// Path of the registry document.
    #[serde(default = "default_document_path")]
    pub path: PathBuf,
}

impl Default for FileBackendConfig {
    fn default() -> Self {
        Self {
            path: default_document_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the SQLite database file.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub backend: BackendKind,

    #[serde(default)]
    pub file: FileBackendConfig,

    #[serde(default)]
    pub database: DatabaseConfig,
}

impl RegistryConfig {
    /// Load the configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn default_document_path() -> PathBuf {
    PathBuf::from("containers.json")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("containers.db")
}
