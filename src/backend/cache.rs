//! File-persisted in-memory cache backend.
//!
//! This backend keeps the whole registry in a concurrent map loaded from one
//! JSON document at construction. Every operation runs against the live map
//! without awaiting anything; the document is written back once, by the host,
//! through [`CacheBackend::persist`] at shutdown or reload. No I/O happens
//! per call.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::backend::{ContainerBackend, ContainerPredicate};
use crate::container::{OwnerId, RemoteContainer};
use crate::view::RegistryView;

/// Errors raised while loading or persisting the registry document.
///
/// Loading failures are construction-fatal: there is no valid empty-state
/// fallback distinct from an explicit empty document.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The document exists but could not be read.
    #[error("Failed to read registry document {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The document is not a valid registry serialization.
    #[error("Malformed registry document {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The document could not be written back.
    #[error("Failed to persist registry document {path}: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The in-memory state could not be serialized.
    #[error("Failed to serialize registry document: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Persisted shape: owner identifier → list of container records.
type RegistryDocument = HashMap<Uuid, Vec<RemoteContainer>>;

/// In-memory authoritative registry backed by a JSON document.
///
/// # Thread Safety
///
/// The backing map is a `DashMap`, so registrations, removals and live-view
/// reads are safe under concurrent access without an outer lock.
pub struct CacheBackend {
    map: Arc<DashMap<OwnerId, HashSet<RemoteContainer>>>,
}

impl CacheBackend {
    /// Load the registry from the document at `path`.
    ///
    /// A missing file is the explicit empty document; a present but malformed
    /// file is a hard error.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let map = DashMap::new();

        match std::fs::read(path) {
            Ok(contents) => {
                let document: RegistryDocument =
                    serde_json::from_slice(&contents).map_err(|source| CacheError::Malformed {
                        path: path.to_path_buf(),
                        source,
                    })?;

                for (owner, containers) in document {
                    map.insert(OwnerId(owner), containers.into_iter().collect());
                }
            }
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                debug!("No registry document at {}, starting empty", path.display());
            }
            Err(source) => {
                return Err(CacheError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }

        Ok(Self { map: Arc::new(map) })
    }

    /// Start from an empty registry without touching the file system.
    pub fn empty() -> Self {
        Self {
            map: Arc::new(DashMap::new()),
        }
    }

    /// Write the current registry state to the document at `path`.
    ///
    /// The write goes through a temporary file in the target directory and a
    /// rename, so a crash mid-write never leaves a torn document behind.
    pub fn persist(&self, path: &Path) -> Result<(), CacheError> {
        let mut document = RegistryDocument::new();
        for entry in self.map.iter() {
            document.insert(entry.key().0, entry.value().iter().cloned().collect());
        }

        let json = serde_json::to_vec_pretty(&document).map_err(CacheError::Serialize)?;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let persist_err = |source: std::io::Error| CacheError::Persist {
            path: path.to_path_buf(),
            source,
        };

        let mut temp = NamedTempFile::new_in(dir).map_err(persist_err)?;
        temp.write_all(&json).map_err(persist_err)?;
        temp.flush().map_err(persist_err)?;
        temp.persist(path).map_err(|e| CacheError::Persist {
            path: path.to_path_buf(),
            source: e.error,
        })?;

        debug!("Persisted registry document to {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl ContainerBackend for CacheBackend {
    async fn has_any_container(&self, owner: OwnerId) -> bool {
        // An empty entry and no entry are observably the same
        self.map.get(&owner).is_some_and(|set| !set.is_empty())
    }

    async fn containers_of(&self, owner: OwnerId) -> HashSet<RemoteContainer> {
        self.map
            .get(&owner)
            .map(|set| set.value().clone())
            .unwrap_or_default()
    }

    async fn is_owner(&self, owner: OwnerId, container: &RemoteContainer) -> bool {
        self.map
            .get(&owner)
            .is_some_and(|set| set.contains(container))
    }

    async fn all_containers(&self) -> RegistryView {
        RegistryView::live(Arc::clone(&self.map))
    }

    async fn register(&self, owner: OwnerId, container: RemoteContainer) -> bool {
        self.map.entry(owner).or_default().insert(container)
    }

    async fn unregister(&self, owner: OwnerId, predicate: &ContainerPredicate<'_>) -> bool {
        let Some(mut set) = self.map.get_mut(&owner) else {
            return false;
        };

        let before = set.len();
        set.retain(|container| !predicate(container));
        set.len() != before
    }
}
