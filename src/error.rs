//! Error taxonomy shared by readers, the store and the pipeline

use std::path::PathBuf;

use thiserror::Error;

use crate::ingest::Entity;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("source file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("failed to write batch {batch} into {table}: {source}")]
    Write {
        table: &'static str,
        batch: usize,
        #[source]
        source: sqlx::Error,
    },

    #[error("store unreachable: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("failed to apply schema change on {table}: {source}")]
    Schema {
        table: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("diagnostic query failed: {0}")]
    Query(#[source] sqlx::Error),

    #[error("entity dependencies form a cycle involving {0}")]
    DependencyCycle(Entity),

    #[error("loading {entity} failed: {source}")]
    Stage {
        entity: Entity,
        #[source]
        source: Box<LoadError>,
    },
}

impl LoadError {
    pub(crate) fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        LoadError::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Wrap a store failure with `context`, unless the connection itself
    /// failed: an unreachable store is reported as `Connection` whichever
    /// step ran into it.
    pub(crate) fn store(source: sqlx::Error, context: impl FnOnce(sqlx::Error) -> LoadError) -> Self {
        match source {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => LoadError::Connection(source),
            other => context(other),
        }
    }

    /// The entity whose load failed, when the error came out of `ingest_all`
    pub fn failed_stage(&self) -> Option<Entity> {
        match self {
            LoadError::Stage { entity, .. } => Some(*entity),
            _ => None,
        }
    }
}

pub type Result<T, E = LoadError> = std::result::Result<T, E>;
