//! # Remote Containers: an owner → container registry with pluggable storage
//!
//! This crate keeps track of which owner (an opaque UUID identity) controls
//! which "remote container" records, where a container is identified by its
//! world location and may carry a cosmetic display name.
//!
//! ## Architecture
//!
//! - Value types ([`container`]): [`container::RemoteContainer`] compares and
//!   hashes by location only.
//! - Storage contract ([`backend`]): one async trait,
//!   [`backend::ContainerBackend`], with two independent implementations:
//!   - [`backend::cache::CacheBackend`] — in-memory map loaded from a JSON
//!     document, operations complete without I/O;
//!   - [`backend::sql::SqlBackend`] — one connection per operation on the
//!     blocking worker pool, rows reconciled against the host's world and
//!     identity resolvers ([`resolve`]).
//! - Read-only view ([`view`]): [`view::RegistryView`] is a live window over
//!   the cache's map, or a snapshot for the SQL backend; callers cannot
//!   mutate registry state through it.
//! - Facade ([`manager`]): [`manager::ContainerManager`] delegates to the
//!   active backend and composes futures, nothing more.
//! - Configuration ([`config`]): selects the backend once at startup.
//!
//! ## Failure policy
//!
//! Construction fails hard (malformed document, unreachable data source).
//! Running operations never reject: a storage failure is logged and degrades
//! to `false` / empty, so callers always get a well-defined answer.

pub mod backend;
pub mod config;
pub mod container;
pub mod error;
pub mod manager;
pub mod resolve;
pub mod view;

pub use backend::{ContainerBackend, SelectedBackend};
pub use container::{ContainerLocation, OwnerId, RemoteContainer, WorldId};
pub use error::{Error, RegistryResult};
pub use manager::ContainerManager;
pub use view::RegistryView;

#[cfg(test)]
mod tests {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    #[ctor::ctor]
    fn init_tests() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    }
}
