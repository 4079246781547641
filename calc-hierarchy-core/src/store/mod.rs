//! Edge Store Adapter port.
//!
//! The orchestrator reads edges and persists annotations exclusively through
//! this trait, so the leveling core never touches connection lifecycle.
//! `MemoryEdgeStore` backs tests and dry runs; `PgEdgeStore` (feature
//! `postgres`) is the production adapter.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::{AnnotatedRow, CalculationEdge, GroupKey, Scope, WriteOutcome};

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryEdgeStore;
#[cfg(feature = "postgres")]
pub use postgres::PgEdgeStore;

#[async_trait]
pub trait EdgeStore: Send + Sync {
    // ── Enumeration ──

    async fn list_groups(&self) -> StoreResult<Vec<GroupKey>>;
    async fn list_years(&self, group: &GroupKey) -> StoreResult<Vec<i32>>;
    async fn list_categories(&self, group: &GroupKey, year: i32) -> StoreResult<Vec<String>>;

    // ── Scope I/O ──

    /// All edges of one scope. An empty result means "skip this scope".
    async fn read_edges(&self, scope: &Scope) -> StoreResult<Vec<CalculationEdge>>;

    /// Add the `level` / lineage columns if absent. Idempotent; must complete
    /// before any `write_annotations` for the same group.
    async fn ensure_annotation_columns(&self, group: &GroupKey) -> StoreResult<()>;

    /// Overwrite annotations on the rows matching each row's natural key.
    /// Rows that no longer exist or conflict are counted as skipped.
    async fn write_annotations(
        &self,
        group: &GroupKey,
        rows: &[AnnotatedRow],
    ) -> StoreResult<WriteOutcome>;
}
