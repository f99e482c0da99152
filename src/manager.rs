//! Facade over the active storage backend.
//!
//! [`ContainerManager`] is what the rest of the host calls. It adds no
//! business logic of its own beyond composing backend futures: owner-scoped
//! queries short-circuit on [`ContainerBackend::has_any_container`] before
//! paying for a bulk fetch, which must stay semantically transparent.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::backend::ContainerBackend;
use crate::container::{ContainerLocation, OwnerId, RemoteContainer};
use crate::view::RegistryView;

/// Facade that callers use to work with the container registry.
///
/// Every operation delegates to the active backend. The backend can be
/// replaced wholesale on a host reload through [`ContainerManager::reinitialize`];
/// there is no other mutable state here.
pub struct ContainerManager {
    backend: RwLock<Arc<dyn ContainerBackend>>,
}

impl ContainerManager {
    pub fn new(backend: Arc<dyn ContainerBackend>) -> Self {
        Self {
            backend: RwLock::new(backend),
        }
    }

    async fn backend(&self) -> Arc<dyn ContainerBackend> {
        Arc::clone(&*self.backend.read().await)
    }

    /// Atomically replace the active backend.
    ///
    /// Used on host reload: operations issued before the swap complete
    /// against the old backend, operations issued after run against the new
    /// one.
    pub async fn reinitialize(&self, backend: Arc<dyn ContainerBackend>) {
        *self.backend.write().await = backend;
        info!("Container registry backend replaced");
    }

    /// Register `container` for `owner`.
    ///
    /// Does not check permissions or funds; that is the caller's concern.
    /// Returns `false` if an equal container is already registered.
    pub async fn register_container(&self, owner: OwnerId, container: RemoteContainer) -> bool {
        self.backend().await.register(owner, container).await
    }

    /// Remove every container of `owner` matching `predicate`; `true` iff at
    /// least one was removed.
    pub async fn unregister_containers<F>(&self, owner: OwnerId, predicate: F) -> bool
    where
        F: Fn(&RemoteContainer) -> bool + Send + Sync,
    {
        self.backend().await.unregister(owner, &predicate).await
    }

    /// Remove exactly the containers equal to `container` (location identity).
    pub async fn unregister_container(&self, owner: OwnerId, container: &RemoteContainer) -> bool {
        self.unregister_containers(owner, |candidate| candidate == container)
            .await
    }

    /// First container of `owner` matching `predicate`, if any.
    pub async fn find_container<F>(&self, owner: OwnerId, predicate: F) -> Option<RemoteContainer>
    where
        F: Fn(&RemoteContainer) -> bool + Send + Sync,
    {
        let backend = self.backend().await;
        if !backend.has_any_container(owner).await {
            return None;
        }
        backend
            .containers_of(owner)
            .await
            .into_iter()
            .find(|container| predicate(container))
    }

    /// First container of `owner` with exactly the name `name`.
    pub async fn find_container_by_name(
        &self,
        owner: OwnerId,
        name: &str,
    ) -> Option<RemoteContainer> {
        self.find_container(owner, |container| container.name() == Some(name))
            .await
    }

    /// The container of `owner` at `location`, if registered.
    pub async fn find_container_at(
        &self,
        owner: OwnerId,
        location: ContainerLocation,
    ) -> Option<RemoteContainer> {
        self.find_container(owner, |container| container.location() == location)
            .await
    }

    /// All containers of `owner` matching `predicate`.
    ///
    /// The returned set is a copy; changes to it do not reach the registry.
    pub async fn containers_matching<F>(
        &self,
        owner: OwnerId,
        predicate: F,
    ) -> HashSet<RemoteContainer>
    where
        F: Fn(&RemoteContainer) -> bool + Send + Sync,
    {
        let backend = self.backend().await;
        if !backend.has_any_container(owner).await {
            return HashSet::new();
        }
        backend
            .containers_of(owner)
            .await
            .into_iter()
            .filter(|container| predicate(container))
            .collect()
    }

    /// All containers of `owner`.
    pub async fn containers_of(&self, owner: OwnerId) -> HashSet<RemoteContainer> {
        let backend = self.backend().await;
        if !backend.has_any_container(owner).await {
            return HashSet::new();
        }
        backend.containers_of(owner).await
    }

    /// Whether `owner` owns `container` (location identity).
    pub async fn is_owner(&self, owner: OwnerId, container: &RemoteContainer) -> bool {
        self.backend().await.is_owner(owner, container).await
    }

    /// A read-only view of the full registry.
    pub async fn all_containers(&self) -> RegistryView {
        self.backend().await.all_containers().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::cache::CacheBackend;
    use crate::container::WorldId;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn manager() -> ContainerManager {
        ContainerManager::new(Arc::new(CacheBackend::empty()))
    }

    fn owner(n: u128) -> OwnerId {
        OwnerId(Uuid::from_u128(n))
    }

    fn location(x: i32) -> ContainerLocation {
        ContainerLocation::new(WorldId(Uuid::from_u128(5)), x, 64, 10)
    }

    #[tokio::test]
    async fn test_find_container_by_name() {
        let manager = manager();
        let owner = owner(1);
        manager
            .register_container(owner, RemoteContainer::named("vault", location(1)))
            .await;
        manager
            .register_container(owner, RemoteContainer::named("stash", location(2)))
            .await;

        let found = manager.find_container_by_name(owner, "stash").await.unwrap();
        assert_eq!(found.location(), location(2));

        assert!(manager.find_container_by_name(owner, "Stash").await.is_none());
        assert!(manager.find_container_by_name(owner, "other").await.is_none());
    }

    #[tokio::test]
    async fn test_find_container_at_location() {
        let manager = manager();
        let owner = owner(1);
        manager
            .register_container(owner, RemoteContainer::new(location(1)))
            .await;

        assert!(manager.find_container_at(owner, location(1)).await.is_some());
        assert!(manager.find_container_at(owner, location(2)).await.is_none());
    }

    #[tokio::test]
    async fn test_queries_on_unknown_owner_are_empty() {
        let manager = manager();
        let owner = owner(9);

        assert!(manager.containers_of(owner).await.is_empty());
        assert!(manager.containers_matching(owner, |_| true).await.is_empty());
        assert!(manager.find_container(owner, |_| true).await.is_none());
    }

    #[tokio::test]
    async fn test_unregister_specific_container() {
        let manager = manager();
        let owner = owner(1);
        manager
            .register_container(owner, RemoteContainer::new(location(1)))
            .await;
        manager
            .register_container(owner, RemoteContainer::new(location(2)))
            .await;

        // Equality is by location, so the name on the probe does not matter
        let probe = RemoteContainer::named("anything", location(1));
        assert!(manager.unregister_container(owner, &probe).await);
        assert!(!manager.unregister_container(owner, &probe).await);

        assert_eq!(manager.containers_of(owner).await.len(), 1);
    }

    #[tokio::test]
    async fn test_containers_matching_filters() {
        let manager = manager();
        let owner = owner(1);
        for x in [1, 2, 3, 4] {
            manager
                .register_container(owner, RemoteContainer::new(location(x)))
                .await;
        }

        let even = manager
            .containers_matching(owner, |c| c.location().x % 2 == 0)
            .await;
        assert_eq!(even.len(), 2);
    }

    #[tokio::test]
    async fn test_reinitialize_swaps_backend() {
        let manager = manager();
        let owner = owner(1);
        manager
            .register_container(owner, RemoteContainer::new(location(1)))
            .await;

        manager.reinitialize(Arc::new(CacheBackend::empty())).await;

        // The old backend's state is gone from the facade's point of view
        assert!(manager.containers_of(owner).await.is_empty());
        assert!(
            manager
                .register_container(owner, RemoteContainer::new(location(1)))
                .await
        );
    }
}
