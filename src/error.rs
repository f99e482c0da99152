use thiserror::Error;

use crate::backend::cache::CacheError;
use crate::backend::sql::SqlError;
use crate::config::ConfigError;

/// Top-level error for registry construction.
///
/// Only startup paths surface errors: a malformed persisted document, an
/// unavailable data source, a broken configuration file. Once a backend is
/// running, its operations degrade to neutral results instead of failing
/// (see the failure policy on [`crate::backend::ContainerBackend`]).
#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Cache backend error: {0}")]
    Cache(#[from] CacheError),
    #[error("SQL backend error: {0}")]
    Sql(#[from] SqlError),
}

pub type RegistryResult<T> = Result<T, Error>;
