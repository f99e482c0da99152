//! Value types for the container registry.
//!
//! A [`RemoteContainer`] identifies a container by its world location, with an
//! optional user-defined display name. The name is cosmetic: equality and
//! hashing are defined solely by the location, so two containers at the same
//! location are the same entity no matter how they were labelled.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Stable identifier of a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldId(pub Uuid);

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Stable identifier of an owning identity.
///
/// Opaque to the registry: equality is by identifier, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub Uuid);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A block position inside a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerLocation {
    /// World the container lives in
    pub world: WorldId,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ContainerLocation {
    pub fn new(world: WorldId, x: i32, y: i32, z: i32) -> Self {
        Self { world, x, y, z }
    }
}

impl fmt::Display for ContainerLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}) in {}", self.x, self.y, self.z, self.world)
    }
}

/// An immutable reference to a container at a world location.
///
/// # Identity
///
/// Equality and hashing consider `location` only. The optional `name` is
/// excluded, so a registry set can never hold two containers at the same
/// location for one owner, regardless of their names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteContainer {
    /// User-defined display name, omitted from the persisted record when absent
    #[serde(skip_serializing_if = "Option::is_none", default)]
    name: Option<String>,

    /// Location of the container
    location: ContainerLocation,
}

impl RemoteContainer {
    /// Create an anonymous container at `location`.
    pub fn new(location: ContainerLocation) -> Self {
        Self {
            name: None,
            location,
        }
    }

    /// Create a named container at `location`.
    pub fn named(name: impl Into<String>, location: ContainerLocation) -> Self {
        Self {
            name: Some(name.into()),
            location,
        }
    }

    /// The user-defined name, if one was given.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The location identifying this container.
    pub fn location(&self) -> ContainerLocation {
        self.location
    }
}

impl PartialEq for RemoteContainer {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location
    }
}

impl Eq for RemoteContainer {}

impl Hash for RemoteContainer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.location.hash(state);
    }
}
