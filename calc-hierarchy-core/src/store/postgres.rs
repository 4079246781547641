//! PostgreSQL edge store.
//!
//! One table per reporting entity (`cal_<cik>` by default) with columns
//! `year, linkrole, concept, sub_concept, weight`. Annotations are written to
//! `level INTEGER` and `root_concept TEXT[]`.
//!
//! NOTE: Table names are interpolated into SQL, so every name is validated by
//! [`quote_table`] first. All queries are runtime-checked (`sqlx::query`, not
//! `sqlx::query!`) because group tables are created at runtime.

use async_trait::async_trait;
use regex::Regex;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use super::EdgeStore;
use crate::error::{StoreError, StoreResult};
use crate::normalize::category_from_role_uri;
use crate::types::{AnnotatedRow, CalculationEdge, GroupKey, Scope, WriteOutcome};

pub const DEFAULT_TABLE_PREFIX: &str = "cal_";

static IDENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("identifier regex is valid")
});

/// Validate a table name and return it double-quoted.
pub fn quote_table(name: &str) -> StoreResult<String> {
    if IDENT_RE.is_match(name) {
        Ok(format!("\"{}\"", name))
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

/// Index name for a group table, kept within the 63-byte identifier limit.
fn scope_index_name(group: &GroupKey) -> String {
    let stem: String = group.as_str().chars().take(52).collect();
    format!("{stem}_scope_idx")
}

/// Postgres-backed edge store. The pool is injected; every call acquires a
/// connection from it and returns it when done.
pub struct PgEdgeStore {
    pool: PgPool,
    table_prefix: String,
    /// Per-table schema evolution guard: at most one `ALTER TABLE` in flight
    /// per table, and none after the first success.
    schema_ready: Mutex<HashMap<GroupKey, Arc<OnceCell<()>>>>,
}

impl PgEdgeStore {
    pub fn new(pool: PgPool) -> Self {
        Self::with_table_prefix(pool, DEFAULT_TABLE_PREFIX)
    }

    pub fn with_table_prefix(pool: PgPool, table_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            table_prefix: table_prefix.into(),
            schema_ready: Mutex::new(HashMap::new()),
        }
    }

    /// Create the group table and its scope/natural-key index if they do not
    /// exist.
    pub async fn create_group_table(&self, group: &GroupKey) -> StoreResult<()> {
        let table = quote_table(group.as_str())?;
        let index = quote_table(&scope_index_name(group))?;
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id BIGSERIAL PRIMARY KEY,
                year INTEGER NOT NULL,
                linkrole VARCHAR(255) NOT NULL,
                concept VARCHAR(255) NOT NULL,
                sub_concept VARCHAR(255) NOT NULL,
                weight DOUBLE PRECISION
            )
            "#
        ))
        .execute(&self.pool)
        .await?;

        // read_edges and every annotation UPDATE filter on these columns.
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {index} \
             ON {table} (year, linkrole, concept, sub_concept)"
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Populate a group table with converter output. Link-role URIs are
    /// stored as their final path segment. Returns rows inserted.
    pub async fn insert_edges(
        &self,
        group: &GroupKey,
        edges: &[CalculationEdge],
    ) -> StoreResult<u64> {
        let table = quote_table(group.as_str())?;
        let sql = format!(
            "INSERT INTO {table} (year, linkrole, concept, sub_concept, weight) \
             VALUES ($1, $2, $3, $4, $5)"
        );

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;
        for edge in edges {
            let result = sqlx::query(&sql)
                .bind(edge.year)
                .bind(category_from_role_uri(&edge.category))
                .bind(&edge.concept)
                .bind(&edge.sub_concept)
                .bind(edge.weight)
                .execute(&mut *tx)
                .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;

        info!(group = %group, inserted, "edges inserted");
        Ok(inserted)
    }

    async fn schema_cell(&self, group: &GroupKey) -> Arc<OnceCell<()>> {
        let mut cells = self.schema_ready.lock().await;
        cells.entry(group.clone()).or_default().clone()
    }
}

#[async_trait]
impl EdgeStore for PgEdgeStore {
    async fn list_groups(&self) -> StoreResult<Vec<GroupKey>> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = current_schema()
              AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(names
            .into_iter()
            .filter(|name| name.starts_with(&self.table_prefix))
            .filter(|name| {
                let valid = IDENT_RE.is_match(name);
                if !valid {
                    warn!(table = %name, "skipping table with unsupported name");
                }
                valid
            })
            .map(GroupKey)
            .collect())
    }

    async fn list_years(&self, group: &GroupKey) -> StoreResult<Vec<i32>> {
        let table = quote_table(group.as_str())?;
        let years = sqlx::query_scalar::<_, i32>(&format!(
            "SELECT DISTINCT year FROM {table} ORDER BY year"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(years)
    }

    async fn list_categories(&self, group: &GroupKey, year: i32) -> StoreResult<Vec<String>> {
        let table = quote_table(group.as_str())?;
        let categories = sqlx::query_scalar::<_, String>(&format!(
            "SELECT DISTINCT linkrole FROM {table} WHERE year = $1 ORDER BY linkrole"
        ))
        .bind(year)
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    async fn read_edges(&self, scope: &Scope) -> StoreResult<Vec<CalculationEdge>> {
        let table = quote_table(scope.group.as_str())?;
        let rows = sqlx::query_as::<_, (String, String, Option<f64>)>(&format!(
            r#"
            SELECT concept, sub_concept, weight
            FROM {table}
            WHERE year = $1 AND linkrole = $2
            ORDER BY id
            "#
        ))
        .bind(scope.year)
        .bind(&scope.category)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(concept, sub_concept, weight)| {
                CalculationEdge::new(scope, concept, sub_concept, weight)
            })
            .collect())
    }

    async fn ensure_annotation_columns(&self, group: &GroupKey) -> StoreResult<()> {
        let table = quote_table(group.as_str())?;
        let cell = self.schema_cell(group).await;
        cell.get_or_try_init(|| async {
            debug!(group = %group, "adding annotation columns");
            sqlx::query(&format!(
                "ALTER TABLE {table} \
                 ADD COLUMN IF NOT EXISTS level INTEGER, \
                 ADD COLUMN IF NOT EXISTS root_concept TEXT[]"
            ))
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Schema {
                group: group.clone(),
                message: e.to_string(),
            })
        })
        .await?;
        Ok(())
    }

    async fn write_annotations(
        &self,
        group: &GroupKey,
        rows: &[AnnotatedRow],
    ) -> StoreResult<WriteOutcome> {
        let table = quote_table(group.as_str())?;
        let sql = format!(
            r#"
            UPDATE {table}
            SET level = $1, root_concept = $2
            WHERE concept = $3 AND sub_concept = $4 AND linkrole = $5 AND year = $6
            "#
        );

        let mut tx = self.pool.begin().await?;
        let mut outcome = WriteOutcome::default();
        for row in rows {
            let level = row.level.and_then(|l| i32::try_from(l).ok());
            let result = sqlx::query(&sql)
                .bind(level)
                .bind(&row.ancestor_path.0)
                .bind(&row.concept)
                .bind(&row.sub_concept)
                .bind(&row.category)
                .bind(row.year)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                debug!(
                    group = %group,
                    concept = %row.concept,
                    sub_concept = %row.sub_concept,
                    "no matching row, skipped"
                );
                outcome.skipped += 1;
            } else {
                outcome.written += 1;
            }
        }
        tx.commit().await?;
        Ok(outcome)
    }
}
