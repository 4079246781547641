use thiserror::Error;

use crate::types::{GroupKey, Scope};

/// Failures raised by an [`EdgeStore`](crate::store::EdgeStore) adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("schema evolution failed for {group}: {message}")]
    Schema { group: GroupKey, message: String },

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("query failed: {0}")]
    Query(#[from] anyhow::Error),
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Unavailable(e.to_string())
            }
            other => Self::Query(anyhow::Error::new(other)),
        }
    }
}

/// A scope that could not be completed. Fatal for that scope only.
#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("reading edges for {scope}: {source}")]
    Read { scope: Scope, source: StoreError },

    #[error("preparing annotation columns for {group}: {source}")]
    Schema { group: GroupKey, source: StoreError },

    #[error("writing annotations for {scope}: {source}")]
    Write { scope: Scope, source: StoreError },
}

/// Aborts a whole run: nothing can be enumerated.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("listing groups: {0}")]
    ListGroups(#[source] StoreError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
