//! Storage backend contract for the container registry.
//!
//! This module defines the [`ContainerBackend`] trait that both persistence
//! strategies implement: the file-persisted in-memory cache
//! ([`cache::CacheBackend`]) and the relational store ([`sql::SqlBackend`]).
//! The backend is selected once at startup from configuration and never mixed
//! at runtime.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::{BackendKind, RegistryConfig};
use crate::container::{OwnerId, RemoteContainer};
use crate::error::RegistryResult;
use crate::resolve::{ResolverLocator, WorldResolver};
use crate::view::RegistryView;

pub mod cache;
pub mod sql;

/// Predicate over containers, used by [`ContainerBackend::unregister`].
///
/// Carries its own lifetime so callers may pass closures that borrow local
/// state, not just `'static` ones.
pub type ContainerPredicate<'a> = dyn Fn(&RemoteContainer) -> bool + Send + Sync + 'a;

/// Trait that abstracts registry storage operations.
///
/// Implementations may complete operations synchronously (the cache backend
/// never awaits) or on a worker distinct from the caller (the SQL backend);
/// callers must treat every operation as potentially asynchronous and never
/// branch on which occurred.
///
/// # Failure Policy
///
/// Operations never surface ordinary storage failures. A failed query or
/// connection degrades to the neutral result (`false`, empty set, empty view)
/// and is logged by the implementation, so a failed mutation is
/// indistinguishable from "no matching record".
///
/// # Thread Safety
///
/// All implementations must be shareable between tasks, enforced by the
/// `Send + Sync` bounds.
#[async_trait]
pub trait ContainerBackend: Send + Sync {
    /// Whether `owner` currently owns at least one container.
    ///
    /// An owner whose set has been drained to empty and an owner never
    /// registered both answer `false`.
    async fn has_any_container(&self, owner: OwnerId) -> bool;

    /// All containers of `owner`; empty set if none.
    ///
    /// The returned set is a copy: later backend mutation does not reach it.
    async fn containers_of(&self, owner: OwnerId) -> HashSet<RemoteContainer>;

    /// Whether `container` (compared by location identity) is in `owner`'s set.
    async fn is_owner(&self, owner: OwnerId, container: &RemoteContainer) -> bool;

    /// A read-only handle over the full registry.
    ///
    /// The cache backend returns a live window; the SQL backend returns a
    /// snapshot built from one query. See [`RegistryView`].
    async fn all_containers(&self) -> RegistryView;

    /// Register `container` for `owner`.
    ///
    /// Returns `true` if newly added, `false` without mutation if an equal
    /// container (same location) already exists for that owner. Idempotent,
    /// not an error.
    async fn register(&self, owner: OwnerId, container: RemoteContainer) -> bool;

    /// Remove every container of `owner` matching `predicate`.
    ///
    /// Returns `true` iff at least one container was removed.
    async fn unregister(&self, owner: OwnerId, predicate: &ContainerPredicate<'_>) -> bool;
}

/// The backend chosen at startup.
///
/// Keeps the concrete type reachable so the host can drive lifecycle concerns
/// the trait contract does not cover, such as persisting the cache document
/// at shutdown.
pub enum SelectedBackend {
    Cache(Arc<cache::CacheBackend>),
    Sql(Arc<sql::SqlBackend>),
}

impl SelectedBackend {
    /// The selected backend as the uniform trait object.
    pub fn as_backend(&self) -> Arc<dyn ContainerBackend> {
        match self {
            SelectedBackend::Cache(backend) => Arc::clone(backend) as Arc<dyn ContainerBackend>,
            SelectedBackend::Sql(backend) => Arc::clone(backend) as Arc<dyn ContainerBackend>,
        }
    }
}

/// Build the backend named by `config`.
///
/// Construction errors are fatal: a malformed cache document or an
/// unavailable data source aborts startup rather than degrading.
pub fn from_config(
    config: &RegistryConfig,
    worlds: Arc<dyn WorldResolver>,
    locator: Arc<dyn ResolverLocator>,
) -> RegistryResult<SelectedBackend> {
    match config.backend {
        BackendKind::File => {
            let backend = cache::CacheBackend::load(&config.file.path)?;
            Ok(SelectedBackend::Cache(Arc::new(backend)))
        }
        BackendKind::Sql => {
            let provider = Arc::new(sql::SqliteFile::new(&config.database.path));
            let backend = sql::SqlBackend::connect(provider, worlds, locator)?;
            Ok(SelectedBackend::Sql(Arc::new(backend)))
        }
    }
}
