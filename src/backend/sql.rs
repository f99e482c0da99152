//! Relational backend over SQLite.
//!
//! Stateless between calls: every operation opens its own connection through
//! a [`ConnectionProvider`], runs its statements on the blocking worker pool
//! (`tokio::task::spawn_blocking`), and resolves once the round trip
//! completes. Rows are reconciled against the host's world and owner
//! resolvers at read time; rows whose references no longer resolve are
//! skipped and logged, never surfaced as errors and never deleted.

use async_trait::async_trait;
use rusqlite::{Connection, params};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tokio::task;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::backend::{ContainerBackend, ContainerPredicate};
use crate::container::{ContainerLocation, OwnerId, RemoteContainer};
use crate::resolve::{OwnerResolver, ResolverLocator, WorldResolver};
use crate::view::RegistryView;

const CREATE_CONTAINERS_TABLE: &str = "\
CREATE TABLE IF NOT EXISTS containers (
    id    INTEGER PRIMARY KEY AUTOINCREMENT,
    owner TEXT    NOT NULL,
    world TEXT    NOT NULL,
    name  TEXT,
    x     INTEGER NOT NULL,
    y     INTEGER NOT NULL,
    z     INTEGER NOT NULL
)";

const SELECT_ALL: &str = "SELECT id, owner, world, name, x, y, z FROM containers";

const SELECT_BY_OWNER: &str =
    "SELECT id, owner, world, name, x, y, z FROM containers WHERE owner = ?1";

const SELECT_AT_LOCATION: &str = "SELECT id FROM containers \
     WHERE owner = ?1 AND world = ?2 AND x = ?3 AND y = ?4 AND z = ?5";

const INSERT_CONTAINER: &str =
    "INSERT INTO containers (owner, world, name, x, y, z) VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

const DELETE_AT_LOCATION: &str =
    "DELETE FROM containers WHERE owner = ?1 AND world = ?2 AND x = ?3 AND y = ?4 AND z = ?5";

/// Errors that can occur inside the SQL backend.
///
/// Only construction propagates these to the caller; running operations
/// convert them to the neutral result after logging.
#[derive(Debug, Error)]
pub enum SqlError {
    #[error("SQL error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The host's identity service was requested before it became available.
    #[error("Owner identity service is not available yet")]
    ResolverUnavailable,

    /// The blocking worker task was cancelled or panicked.
    #[error("Worker task failed: {0}")]
    Task(String),
}

/// Opens database connections for the backend.
///
/// One connection is opened per operation and released when the operation's
/// worker closure returns, on every exit path.
pub trait ConnectionProvider: Send + Sync {
    fn connection(&self) -> Result<Connection, SqlError>;
}

/// Provider backed by a SQLite database file.
pub struct SqliteFile {
    path: PathBuf,
}

impl SqliteFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConnectionProvider for SqliteFile {
    fn connection(&self) -> Result<Connection, SqlError> {
        Ok(Connection::open(&self.path)?)
    }
}

/// Registry backend persisted in a relational table, one row per container.
///
/// # Scheduling
///
/// Database work runs on the blocking pool, so completion is never
/// synchronous with the caller and two independently issued operations carry
/// no ordering guarantee relative to each other.
pub struct SqlBackend {
    provider: Arc<dyn ConnectionProvider>,
    worlds: Arc<dyn WorldResolver>,
    locator: Arc<dyn ResolverLocator>,
    // Bound lazily on first query; the identity service may not exist yet
    // when the backend is constructed.
    owners: OnceLock<Arc<dyn OwnerResolver>>,
}

impl SqlBackend {
    /// Connect to the data source and ensure the container table exists.
    ///
    /// An unreachable data source or a failing schema statement aborts
    /// startup. The owner resolver is not bound here; see
    /// [`ResolverLocator`].
    pub fn connect(
        provider: Arc<dyn ConnectionProvider>,
        worlds: Arc<dyn WorldResolver>,
        locator: Arc<dyn ResolverLocator>,
    ) -> Result<Self, SqlError> {
        let conn = provider.connection()?;
        conn.execute_batch(CREATE_CONTAINERS_TABLE)?;

        Ok(Self {
            provider,
            worlds,
            locator,
            owners: OnceLock::new(),
        })
    }

    fn owner_resolver(&self) -> Result<Arc<dyn OwnerResolver>, SqlError> {
        if let Some(resolver) = self.owners.get() {
            return Ok(Arc::clone(resolver));
        }

        let resolver = self
            .locator
            .owner_resolver()
            .ok_or(SqlError::ResolverUnavailable)?;
        // A concurrent first use may have bound it already; either Arc is
        // the same service.
        let _ = self.owners.set(Arc::clone(&resolver));
        Ok(resolver)
    }

    /// Bulk query routine shared by the read operations.
    ///
    /// Fetches every row (optionally filtered by owner), resolves world and
    /// owner references, and builds a fresh map. Unresolvable rows are
    /// skipped with a log line naming the row id and the missing reference.
    async fn query(
        &self,
        owner: Option<OwnerId>,
    ) -> Result<HashMap<OwnerId, HashSet<RemoteContainer>>, SqlError> {
        let owners = self.owner_resolver()?;
        let worlds = Arc::clone(&self.worlds);
        let provider = Arc::clone(&self.provider);

        let rows_by_owner = move || -> Result<HashMap<OwnerId, HashSet<RemoteContainer>>, SqlError> {
            let conn = provider.connection()?;
            let mut stmt = match owner {
                Some(_) => conn.prepare(SELECT_BY_OWNER)?,
                None => conn.prepare(SELECT_ALL)?,
            };
            let mut rows = match owner {
                Some(owner) => stmt.query(params![owner.to_string()])?,
                None => stmt.query([])?,
            };

            let mut map: HashMap<OwnerId, HashSet<RemoteContainer>> = HashMap::new();

            while let Some(row) = rows.next()? {
                let id: i64 = row.get("id")?;
                let owner_raw: String = row.get("owner")?;
                let world_raw: String = row.get("world")?;
                let name: Option<String> = row.get("name")?;
                let x: i32 = row.get("x")?;
                let y: i32 = row.get("y")?;
                let z: i32 = row.get("z")?;

                let Ok(owner_uuid) = Uuid::parse_str(&owner_raw) else {
                    warn!("Row {id} has malformed owner '{owner_raw}', skipping");
                    continue;
                };
                let Ok(world_uuid) = Uuid::parse_str(&world_raw) else {
                    warn!("Row {id} has malformed world '{world_raw}', skipping");
                    continue;
                };

                let Some(world) = worlds.resolve_world(world_uuid) else {
                    info!("Cannot find world with uuid '{world_uuid}', skipping row {id}");
                    continue;
                };
                let Some(resolved_owner) = owners.resolve_owner(owner_uuid) else {
                    info!("Cannot find owner with uuid '{owner_uuid}', skipping row {id}");
                    continue;
                };

                let location = ContainerLocation::new(world, x, y, z);
                let container = match name {
                    Some(name) => RemoteContainer::named(name, location),
                    None => RemoteContainer::new(location),
                };

                map.entry(resolved_owner).or_default().insert(container);
            }

            Ok(map)
        };

        task::spawn_blocking(rows_by_owner)
            .await
            .map_err(|e| SqlError::Task(e.to_string()))?
    }
}

#[async_trait]
impl ContainerBackend for SqlBackend {
    #[tracing::instrument(skip(self), level = "debug")]
    async fn has_any_container(&self, owner: OwnerId) -> bool {
        let provider = Arc::clone(&self.provider);

        let result = task::spawn_blocking(move || -> Result<bool, SqlError> {
            let conn = provider.connection()?;
            let mut stmt = conn.prepare(SELECT_BY_OWNER)?;
            Ok(stmt.exists(params![owner.to_string()])?)
        })
        .await
        .map_err(|e| SqlError::Task(e.to_string()))
        .and_then(|inner| inner);

        match result {
            Ok(any) => any,
            Err(e) => {
                error!("has_any_container failed for owner {owner}: {e}");
                false
            }
        }
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn containers_of(&self, owner: OwnerId) -> HashSet<RemoteContainer> {
        match self.query(Some(owner)).await {
            Ok(mut map) => map.remove(&owner).unwrap_or_default(),
            Err(e) => {
                error!("containers_of failed for owner {owner}: {e}");
                HashSet::new()
            }
        }
    }

    #[tracing::instrument(skip(self, container), level = "debug")]
    async fn is_owner(&self, owner: OwnerId, container: &RemoteContainer) -> bool {
        match self.query(Some(owner)).await {
            Ok(map) => map.get(&owner).is_some_and(|set| set.contains(container)),
            Err(e) => {
                error!("is_owner failed for owner {owner}: {e}");
                false
            }
        }
    }

    #[tracing::instrument(skip(self), level = "debug")]
    async fn all_containers(&self) -> RegistryView {
        match self.query(None).await {
            Ok(map) => RegistryView::snapshot(map),
            Err(e) => {
                error!("all_containers failed: {e}");
                RegistryView::snapshot(HashMap::new())
            }
        }
    }

    #[tracing::instrument(skip(self, container), level = "debug")]
    async fn register(&self, owner: OwnerId, container: RemoteContainer) -> bool {
        let provider = Arc::clone(&self.provider);

        let result = task::spawn_blocking(move || -> Result<bool, SqlError> {
            let conn = provider.connection()?;
            let location = container.location();
            let world = location.world.to_string();

            // Existence check and insert are two independently parameterized
            // statements; the row must not be duplicated.
            let mut exists_stmt = conn.prepare(SELECT_AT_LOCATION)?;
            let exists = exists_stmt.exists(params![
                owner.to_string(),
                world,
                location.x,
                location.y,
                location.z
            ])?;
            if exists {
                return Ok(false);
            }

            let affected = conn.execute(
                INSERT_CONTAINER,
                params![
                    owner.to_string(),
                    world,
                    container.name(),
                    location.x,
                    location.y,
                    location.z
                ],
            )?;
            Ok(affected > 0)
        })
        .await
        .map_err(|e| SqlError::Task(e.to_string()))
        .and_then(|inner| inner);

        match result {
            Ok(registered) => registered,
            Err(e) => {
                error!("register failed for owner {owner}: {e}");
                false
            }
        }
    }

    #[tracing::instrument(skip(self, predicate), level = "debug")]
    async fn unregister(&self, owner: OwnerId, predicate: &ContainerPredicate<'_>) -> bool {
        let matches: Vec<RemoteContainer> = self
            .containers_of(owner)
            .await
            .into_iter()
            .filter(|container| predicate(container))
            .collect();

        if matches.is_empty() {
            return false;
        }

        let provider = Arc::clone(&self.provider);

        let result = task::spawn_blocking(move || -> Result<bool, SqlError> {
            let mut conn = provider.connection()?;
            // All matching deletes commit together or not at all.
            let tx = conn.transaction()?;
            let mut any = false;
            {
                let mut stmt = tx.prepare(DELETE_AT_LOCATION)?;
                for container in &matches {
                    let location = container.location();
                    let affected = stmt.execute(params![
                        owner.to_string(),
                        location.world.to_string(),
                        location.x,
                        location.y,
                        location.z
                    ])?;
                    any |= affected > 0;
                }
            }
            tx.commit()?;
            Ok(any)
        })
        .await
        .map_err(|e| SqlError::Task(e.to_string()))
        .and_then(|inner| inner);

        match result {
            Ok(any) => any,
            Err(e) => {
                error!("unregister failed for owner {owner}: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::WorldId;
    use crate::resolve::PassthroughResolver;
    use pretty_assertions::assert_eq;
    use rusqlite::OpenFlags;
    use std::sync::Mutex;

    /// Shared-cache in-memory database: every connection opened through the
    /// provider sees the same data while the keepalive connection is alive.
    struct SharedMemory {
        uri: String,
        _keepalive: Mutex<Connection>,
    }

    impl SharedMemory {
        fn new() -> Self {
            let uri = format!(
                "file:{}?mode=memory&cache=shared",
                Uuid::new_v4().simple()
            );
            let keepalive = Connection::open_with_flags(&uri, Self::flags()).unwrap();
            Self {
                uri,
                _keepalive: Mutex::new(keepalive),
            }
        }

        fn flags() -> OpenFlags {
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
        }
    }

    impl ConnectionProvider for SharedMemory {
        fn connection(&self) -> Result<Connection, SqlError> {
            Ok(Connection::open_with_flags(&self.uri, Self::flags())?)
        }
    }

    /// Resolver that only knows a fixed set of worlds.
    struct KnownWorlds(HashSet<Uuid>);

    impl WorldResolver for KnownWorlds {
        fn resolve_world(&self, id: Uuid) -> Option<WorldId> {
            self.0.contains(&id).then_some(WorldId(id))
        }
    }

    /// Locator whose identity service never becomes available.
    struct UnavailableLocator;

    impl ResolverLocator for UnavailableLocator {
        fn owner_resolver(&self) -> Option<Arc<dyn OwnerResolver>> {
            None
        }
    }

    fn backend() -> (SqlBackend, Arc<SharedMemory>) {
        let provider = Arc::new(SharedMemory::new());
        let backend = SqlBackend::connect(
            Arc::clone(&provider) as Arc<dyn ConnectionProvider>,
            Arc::new(PassthroughResolver),
            Arc::new(PassthroughResolver),
        )
        .unwrap();
        (backend, provider)
    }

    fn owner(n: u128) -> OwnerId {
        OwnerId(Uuid::from_u128(n))
    }

    fn container_in(world: WorldId, x: i32) -> RemoteContainer {
        RemoteContainer::new(ContainerLocation::new(world, x, 64, 0))
    }

    fn container(x: i32) -> RemoteContainer {
        container_in(WorldId(Uuid::from_u128(0xA0)), x)
    }

    #[tokio::test]
    async fn test_register_and_query() {
        let (backend, _provider) = backend();
        let owner = owner(1);

        assert!(!backend.has_any_container(owner).await);
        assert!(backend.register(owner, container(1)).await);
        assert!(backend.has_any_container(owner).await);

        let set = backend.containers_of(owner).await;
        assert_eq!(set, HashSet::from([container(1)]));
        assert!(backend.is_owner(owner, &container(1)).await);
        assert!(!backend.is_owner(owner, &container(2)).await);
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let (backend, _provider) = backend();
        let owner = owner(1);

        assert!(backend.register(owner, container(1)).await);
        assert!(!backend.register(owner, container(1)).await);

        // Same location, different name: still a duplicate row
        let renamed = RemoteContainer::named("vault", container(1).location());
        assert!(!backend.register(owner, renamed).await);

        assert_eq!(backend.containers_of(owner).await.len(), 1);
    }

    #[tokio::test]
    async fn test_name_round_trips_through_nullable_column() {
        let (backend, _provider) = backend();
        let owner = owner(1);

        backend
            .register(owner, RemoteContainer::named("vault", container(1).location()))
            .await;
        backend.register(owner, container(2)).await;

        let set = backend.containers_of(owner).await;
        let by_x = |x: i32| {
            set.iter()
                .find(|c| c.location().x == x)
                .cloned()
                .unwrap()
        };
        assert_eq!(by_x(1).name(), Some("vault"));
        assert_eq!(by_x(2).name(), None);
    }

    #[tokio::test]
    async fn test_per_owner_uniqueness_only() {
        let (backend, _provider) = backend();

        // The same location may be registered by two different owners
        assert!(backend.register(owner(1), container(1)).await);
        assert!(backend.register(owner(2), container(1)).await);

        let view = backend.all_containers().await;
        assert!(view.contains(owner(1), &container(1)));
        assert!(view.contains(owner(2), &container(1)));
    }

    #[tokio::test]
    async fn test_unregister_by_predicate() {
        let (backend, _provider) = backend();
        let owner = owner(1);
        for x in [1, 2, 3] {
            backend.register(owner, container(x)).await;
        }

        assert!(
            backend
                .unregister(owner, &|c| c.location().x != 2)
                .await
        );
        assert_eq!(
            backend.containers_of(owner).await,
            HashSet::from([container(2)])
        );

        // No match: false, nothing touched
        assert!(!backend.unregister(owner, &|c| c.location().x == 9).await);
        assert_eq!(backend.containers_of(owner).await.len(), 1);
    }

    #[tokio::test]
    async fn test_unregister_rolls_back_on_mid_batch_failure() {
        let (backend, provider) = backend();
        let owner = owner(1);
        backend.register(owner, container(1)).await;
        backend.register(owner, container(3)).await;

        // Deleting the x = 3 row aborts the statement mid-transaction.
        provider
            .connection()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER fail_delete BEFORE DELETE ON containers \
                 WHEN OLD.x = 3 \
                 BEGIN SELECT RAISE(ABORT, 'simulated delete failure'); END",
            )
            .unwrap();

        assert!(!backend.unregister(owner, &|_| true).await);

        // All-or-nothing: neither row was removed
        assert_eq!(backend.containers_of(owner).await.len(), 2);
    }

    #[tokio::test]
    async fn test_unresolvable_world_rows_are_skipped() {
        let live_world = WorldId(Uuid::from_u128(100));
        let gone_world = WorldId(Uuid::from_u128(200));

        let provider = Arc::new(SharedMemory::new());
        let backend = SqlBackend::connect(
            Arc::clone(&provider) as Arc<dyn ConnectionProvider>,
            Arc::new(KnownWorlds(HashSet::from([live_world.0]))),
            Arc::new(PassthroughResolver),
        )
        .unwrap();

        let owner = owner(1);
        backend.register(owner, container_in(live_world, 1)).await;
        backend.register(owner, container_in(gone_world, 2)).await;

        // The row whose world no longer resolves is excluded, not an error
        let set = backend.containers_of(owner).await;
        assert_eq!(set, HashSet::from([container_in(live_world, 1)]));
        assert!(!backend.is_owner(owner, &container_in(gone_world, 2)).await);

        // The row itself is left alone in the table
        let count: i64 = provider
            .connection()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM containers", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_unavailable_identity_service_degrades_reads() {
        let provider = Arc::new(SharedMemory::new());
        let backend = SqlBackend::connect(
            Arc::clone(&provider) as Arc<dyn ConnectionProvider>,
            Arc::new(PassthroughResolver),
            Arc::new(UnavailableLocator),
        )
        .unwrap();

        let owner = owner(1);
        // Mutations and the existence query do not need the identity service
        assert!(backend.register(owner, container(1)).await);
        assert!(backend.has_any_container(owner).await);

        // Reads that reconcile owners resolve neutrally instead of rejecting
        assert!(backend.containers_of(owner).await.is_empty());
        assert!(backend.all_containers().await.is_empty());
    }
}
