//! Read-only view over the full owner → containers registry.
//!
//! The cache backend hands out a *live* window onto its backing map: reads
//! observe mutations made after the view was created, but nothing can be
//! mutated through the view because it simply exposes no mutating API. The
//! SQL backend hands out an owned snapshot built from one query; both wear
//! the same type so callers never branch on the active backend.

use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::container::{OwnerId, RemoteContainer};

type LiveMap = DashMap<OwnerId, HashSet<RemoteContainer>>;

enum ViewInner {
    /// Shares the cache backend's backing map; reads see its current state.
    Live(Arc<LiveMap>),
    /// Owned copy built by one SQL query; never changes after construction.
    Snapshot(HashMap<OwnerId, HashSet<RemoteContainer>>),
}

/// A read-only handle over the registry's owner → container-set mapping.
///
/// # Concurrency
///
/// A live view is safe to hold across concurrent backend mutation: each read
/// locks only the shards it touches. Values returned by accessors are copies
/// taken at read time, so holders cannot alias the backing sets.
pub struct RegistryView {
    inner: ViewInner,
}

impl RegistryView {
    /// Wrap a live backing map without copying it.
    pub(crate) fn live(map: Arc<LiveMap>) -> Self {
        Self {
            inner: ViewInner::Live(map),
        }
    }

    /// Wrap an owned snapshot.
    pub(crate) fn snapshot(map: HashMap<OwnerId, HashSet<RemoteContainer>>) -> Self {
        Self {
            inner: ViewInner::Snapshot(map),
        }
    }

    /// Number of owner entries currently visible.
    pub fn len(&self) -> usize {
        match &self.inner {
            ViewInner::Live(map) => map.len(),
            ViewInner::Snapshot(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `owner` currently has an entry (possibly an empty one).
    pub fn contains_owner(&self, owner: OwnerId) -> bool {
        match &self.inner {
            ViewInner::Live(map) => map.contains_key(&owner),
            ViewInner::Snapshot(map) => map.contains_key(&owner),
        }
    }

    /// The containers of `owner` as seen at the time of this call.
    pub fn get(&self, owner: OwnerId) -> Option<HashSet<RemoteContainer>> {
        match &self.inner {
            ViewInner::Live(map) => map.get(&owner).map(|entry| entry.value().clone()),
            ViewInner::Snapshot(map) => map.get(&owner).cloned(),
        }
    }

    /// Whether `container` (by location identity) is in `owner`'s set.
    pub fn contains(&self, owner: OwnerId, container: &RemoteContainer) -> bool {
        match &self.inner {
            ViewInner::Live(map) => map
                .get(&owner)
                .is_some_and(|entry| entry.contains(container)),
            ViewInner::Snapshot(map) => map.get(&owner).is_some_and(|set| set.contains(container)),
        }
    }

    /// All owners with an entry at the time of this call.
    pub fn owners(&self) -> Vec<OwnerId> {
        match &self.inner {
            ViewInner::Live(map) => map.iter().map(|entry| *entry.key()).collect(),
            ViewInner::Snapshot(map) => map.keys().copied().collect(),
        }
    }

    /// Visit every `(owner, containers)` entry.
    pub fn for_each(&self, mut visit: impl FnMut(OwnerId, &HashSet<RemoteContainer>)) {
        match &self.inner {
            ViewInner::Live(map) => {
                for entry in map.iter() {
                    visit(*entry.key(), entry.value());
                }
            }
            ViewInner::Snapshot(map) => {
                for (owner, set) in map {
                    visit(*owner, set);
                }
            }
        }
    }

    /// Copy the whole mapping into an owned map.
    pub fn to_map(&self) -> HashMap<OwnerId, HashSet<RemoteContainer>> {
        let mut out = HashMap::new();
        self.for_each(|owner, set| {
            out.insert(owner, set.clone());
        });
        out
    }
}
