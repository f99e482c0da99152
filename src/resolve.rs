//! Collaborator seams for resolving stored identifiers.
//!
//! The SQL backend stores raw UUIDs and resolves them against the host's
//! services at read time. Rows whose owner or world no longer resolves are a
//! *referential gap*, not an error: they are skipped with a log entry and
//! never deleted.

use std::sync::Arc;
use uuid::Uuid;

use crate::container::{OwnerId, WorldId};

/// Resolves a stored world identifier against the currently loaded worlds.
pub trait WorldResolver: Send + Sync {
    /// Returns the world for `id`, or `None` if no such world is loaded.
    fn resolve_world(&self, id: Uuid) -> Option<WorldId>;
}

/// Resolves a stored owner identifier against the host's identity service.
pub trait OwnerResolver: Send + Sync {
    /// Returns the owner for `id`, or `None` if the identity is unknown.
    fn resolve_owner(&self, id: Uuid) -> Option<OwnerId>;
}

/// Locates the host's [`OwnerResolver`].
///
/// The identity service may not exist yet when the backend is constructed, so
/// the backend binds it lazily on first use. Returning `None` means the
/// service is still unavailable.
pub trait ResolverLocator: Send + Sync {
    fn owner_resolver(&self) -> Option<Arc<dyn OwnerResolver>>;
}

/// Resolver that accepts every identifier unchanged.
///
/// Suitable for hosts without world or identity lifecycles, where a stored
/// UUID is always considered live.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughResolver;

impl WorldResolver for PassthroughResolver {
    fn resolve_world(&self, id: Uuid) -> Option<WorldId> {
        Some(WorldId(id))
    }
}

impl OwnerResolver for PassthroughResolver {
    fn resolve_owner(&self, id: Uuid) -> Option<OwnerId> {
        Some(OwnerId(id))
    }
}

impl ResolverLocator for PassthroughResolver {
    fn owner_resolver(&self) -> Option<Arc<dyn OwnerResolver>> {
        Some(Arc::new(PassthroughResolver))
    }
}
