//! Scope Enumerator / Orchestrator
//!
//! Walks every group, every year of the group and every category of the year,
//! then levels each non-empty scope and writes the annotations back. Scopes
//! are independent, so they are dispatched concurrently up to
//! `max_concurrency`. A failing scope is logged and recorded; the run carries
//! on with the rest.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, error, info, warn};

use crate::annotate::ScopeAnnotator;
use crate::config::RunnerConfig;
use crate::error::{RunError, ScopeError, StoreError};
use crate::store::EdgeStore;
use crate::types::{GroupKey, Scope, WriteOutcome};

/// What happened to one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeOutcome {
    /// No edges: nothing read, nothing written.
    Skipped,
    Annotated { rows: usize, write: WriteOutcome },
}

#[derive(Debug, Clone, Serialize)]
pub struct RunFailure {
    /// `group/year/category`, or just the group when enumeration failed.
    pub target: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub groups: usize,
    pub scopes_annotated: usize,
    pub scopes_skipped: usize,
    pub rows_written: usize,
    pub rows_skipped: usize,
    pub failures: Vec<RunFailure>,
}

impl RunReport {
    fn new(groups: usize) -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            groups,
            scopes_annotated: 0,
            scopes_skipped: 0,
            rows_written: 0,
            rows_skipped: 0,
            failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, scope: &Scope, result: Result<ScopeOutcome, ScopeError>) {
        match result {
            Ok(ScopeOutcome::Skipped) => self.scopes_skipped += 1,
            Ok(ScopeOutcome::Annotated { write, .. }) => {
                self.scopes_annotated += 1;
                self.rows_written += write.written;
                self.rows_skipped += write.skipped;
            }
            Err(e) => {
                error!(scope = %scope, error = %e, "scope failed");
                self.failures.push(RunFailure {
                    target: scope.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }
}

/// Serializes schema evolution per group: the first scope of a group to need
/// a write adds the columns, concurrent scopes of that group wait for it.
#[derive(Default)]
struct SchemaGate {
    cells: Mutex<HashMap<GroupKey, Arc<OnceCell<()>>>>,
}

impl SchemaGate {
    async fn ensure(&self, store: &dyn EdgeStore, group: &GroupKey) -> Result<(), StoreError> {
        let cell = {
            let mut cells = self.cells.lock().await;
            cells.entry(group.clone()).or_default().clone()
        };
        cell.get_or_try_init(|| store.ensure_annotation_columns(group))
            .await
            .map(|_| ())
    }
}

/// Drives the level/lineage pipeline over an [`EdgeStore`].
pub struct HierarchyRunner {
    store: Arc<dyn EdgeStore>,
    annotator: ScopeAnnotator,
    max_concurrency: usize,
    groups: Vec<GroupKey>,
}

impl HierarchyRunner {
    pub fn new(store: Arc<dyn EdgeStore>, annotator: ScopeAnnotator) -> Self {
        Self {
            store,
            annotator,
            max_concurrency: 1,
            groups: Vec::new(),
        }
    }

    pub fn from_config(store: Arc<dyn EdgeStore>, config: &RunnerConfig) -> Self {
        Self {
            store,
            annotator: config.annotator(),
            max_concurrency: config.max_concurrency.max(1),
            groups: config.groups.clone(),
        }
    }

    pub fn with_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Process every group in the store, or only the configured ones.
    pub async fn run_all(&self) -> Result<RunReport, RunError> {
        let groups = if self.groups.is_empty() {
            self.store.list_groups().await.map_err(RunError::ListGroups)?
        } else {
            self.groups.clone()
        };
        Ok(self.run_groups(&groups).await)
    }

    /// Process the given groups only.
    pub async fn run_groups(&self, groups: &[GroupKey]) -> RunReport {
        let mut report = RunReport::new(groups.len());
        info!(
            groups = groups.len(),
            concurrency = self.max_concurrency,
            policy = ?self.annotator.policy(),
            "hierarchy run started"
        );

        let mut scopes = Vec::new();
        for group in groups {
            scopes.extend(self.enumerate_group(group, &mut report).await);
        }

        let gate = SchemaGate::default();
        let results: Vec<(Scope, Result<ScopeOutcome, ScopeError>)> = stream::iter(scopes)
            .map(|scope| {
                let gate = &gate;
                async move {
                    let result = self.run_scope(&scope, gate).await;
                    (scope, result)
                }
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        for (scope, result) in results {
            report.record(&scope, result);
        }
        report.finished_at = Utc::now();

        info!(
            annotated = report.scopes_annotated,
            skipped = report.scopes_skipped,
            failed = report.failures.len(),
            rows_written = report.rows_written,
            rows_skipped = report.rows_skipped,
            "hierarchy run finished"
        );
        report
    }

    /// Level and persist one scope on its own.
    pub async fn process_scope(&self, scope: &Scope) -> Result<ScopeOutcome, ScopeError> {
        self.run_scope(scope, &SchemaGate::default()).await
    }

    async fn enumerate_group(&self, group: &GroupKey, report: &mut RunReport) -> Vec<Scope> {
        info!(group = %group, "processing group");
        let years = match self.store.list_years(group).await {
            Ok(years) => years,
            Err(e) => {
                warn!(group = %group, error = %e, "listing years failed");
                report.failures.push(RunFailure {
                    target: group.to_string(),
                    error: e.to_string(),
                });
                return Vec::new();
            }
        };

        let mut scopes = Vec::new();
        for year in years {
            debug!(group = %group, year, "processing year");
            match self.store.list_categories(group, year).await {
                Ok(categories) => scopes.extend(
                    categories
                        .into_iter()
                        .map(|category| Scope::new(group.clone(), year, category)),
                ),
                Err(e) => {
                    warn!(group = %group, year, error = %e, "listing categories failed");
                    report.failures.push(RunFailure {
                        target: format!("{}/{}", group, year),
                        error: e.to_string(),
                    });
                }
            }
        }
        scopes
    }

    async fn run_scope(
        &self,
        scope: &Scope,
        gate: &SchemaGate,
    ) -> Result<ScopeOutcome, ScopeError> {
        debug!(scope = %scope, "processing category");
        let edges = self
            .store
            .read_edges(scope)
            .await
            .map_err(|source| ScopeError::Read {
                scope: scope.clone(),
                source,
            })?;
        if edges.is_empty() {
            debug!(scope = %scope, "no edges, skipping");
            return Ok(ScopeOutcome::Skipped);
        }

        let rows = self.annotator.annotate(&edges);

        gate.ensure(self.store.as_ref(), &scope.group)
            .await
            .map_err(|source| ScopeError::Schema {
                group: scope.group.clone(),
                source,
            })?;

        let write = self
            .store
            .write_annotations(&scope.group, &rows)
            .await
            .map_err(|source| ScopeError::Write {
                scope: scope.clone(),
                source,
            })?;
        if write.skipped > 0 {
            warn!(scope = %scope, skipped = write.skipped, "some rows were not updated");
        }

        Ok(ScopeOutcome::Annotated {
            rows: rows.len(),
            write,
        })
    }
}
