//! In-memory edge store.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::EdgeStore;
use crate::error::{StoreError, StoreResult};
use crate::types::{AnnotatedRow, AncestorPath, CalculationEdge, GroupKey, Scope, WriteOutcome};

/// A stored edge plus its annotation columns.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub edge: CalculationEdge,
    pub level: Option<u32>,
    pub ancestor_path: Option<AncestorPath>,
}

#[derive(Debug, Default)]
struct Tables {
    rows: BTreeMap<GroupKey, Vec<StoredRow>>,
    annotated: HashSet<GroupKey>,
}

/// Edge store kept in process memory. Groups keep insertion order of rows,
/// and enumeration is sorted so runs are reproducible.
#[derive(Debug, Clone, Default)]
pub struct MemoryEdgeStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryEdgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append edges; each lands in its own group table.
    pub async fn insert_edges(&self, edges: impl IntoIterator<Item = CalculationEdge>) {
        let mut tables = self.tables.write().await;
        for edge in edges {
            tables
                .rows
                .entry(edge.group_key.clone())
                .or_default()
                .push(StoredRow {
                    edge,
                    level: None,
                    ancestor_path: None,
                });
        }
    }

    /// Snapshot of a group's rows, annotations included.
    pub async fn rows(&self, group: &GroupKey) -> Vec<StoredRow> {
        let tables = self.tables.read().await;
        tables.rows.get(group).cloned().unwrap_or_default()
    }

    /// Whether `ensure_annotation_columns` has run for the group.
    pub async fn has_annotation_columns(&self, group: &GroupKey) -> bool {
        self.tables.read().await.annotated.contains(group)
    }
}

#[async_trait]
impl EdgeStore for MemoryEdgeStore {
    async fn list_groups(&self) -> StoreResult<Vec<GroupKey>> {
        Ok(self.tables.read().await.rows.keys().cloned().collect())
    }

    async fn list_years(&self, group: &GroupKey) -> StoreResult<Vec<i32>> {
        let tables = self.tables.read().await;
        let years: BTreeSet<i32> = tables
            .rows
            .get(group)
            .into_iter()
            .flatten()
            .map(|r| r.edge.year)
            .collect();
        Ok(years.into_iter().collect())
    }

    async fn list_categories(&self, group: &GroupKey, year: i32) -> StoreResult<Vec<String>> {
        let tables = self.tables.read().await;
        let categories: BTreeSet<String> = tables
            .rows
            .get(group)
            .into_iter()
            .flatten()
            .filter(|r| r.edge.year == year)
            .map(|r| r.edge.category.clone())
            .collect();
        Ok(categories.into_iter().collect())
    }

    async fn read_edges(&self, scope: &Scope) -> StoreResult<Vec<CalculationEdge>> {
        let tables = self.tables.read().await;
        Ok(tables
            .rows
            .get(&scope.group)
            .into_iter()
            .flatten()
            .filter(|r| r.edge.year == scope.year && r.edge.category == scope.category)
            .map(|r| r.edge.clone())
            .collect())
    }

    async fn ensure_annotation_columns(&self, group: &GroupKey) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.rows.contains_key(group) {
            return Err(StoreError::Schema {
                group: group.clone(),
                message: "no such table".to_string(),
            });
        }
        tables.annotated.insert(group.clone());
        Ok(())
    }

    async fn write_annotations(
        &self,
        group: &GroupKey,
        rows: &[AnnotatedRow],
    ) -> StoreResult<WriteOutcome> {
        let mut tables = self.tables.write().await;
        if !tables.annotated.contains(group) {
            return Err(StoreError::Schema {
                group: group.clone(),
                message: "annotation columns missing".to_string(),
            });
        }
        let stored = tables
            .rows
            .get_mut(group)
            .ok_or_else(|| StoreError::Unavailable(format!("table {} vanished", group)))?;

        let mut outcome = WriteOutcome::default();
        for row in rows {
            let mut matched = false;
            for target in stored.iter_mut().filter(|s| {
                s.edge.concept == row.concept
                    && s.edge.sub_concept == row.sub_concept
                    && s.edge.category == row.category
                    && s.edge.year == row.year
            }) {
                target.level = row.level;
                target.ancestor_path = Some(row.ancestor_path.clone());
                matched = true;
            }
            if matched {
                outcome.written += 1;
            } else {
                outcome.skipped += 1;
            }
        }
        Ok(outcome)
    }
}
