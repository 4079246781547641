//! End-to-end runs of the orchestrator against in-memory and failing stores.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use calc_hierarchy_core::error::StoreResult;
use calc_hierarchy_core::store::memory::StoredRow;
use calc_hierarchy_core::{
    AnnotatedRow, CalculationEdge, EdgeStore, GroupKey, HierarchyRunner, LevelPolicy,
    MemoryEdgeStore, RunnerConfig, Scope, ScopeAnnotator, StoreError, WriteOutcome,
};

fn edge(scope: &Scope, concept: &str, sub: &str) -> CalculationEdge {
    CalculationEdge::new(scope, concept, sub, Some(1.0))
}

async fn seeded_store() -> MemoryEdgeStore {
    let store = MemoryEdgeStore::new();
    let balance = Scope::new("cal_320193", 2023, "BalanceSheet");
    let income = Scope::new("cal_320193", 2023, "IncomeStatement");
    let older = Scope::new("cal_320193", 2022, "BalanceSheet");
    let other = Scope::new("cal_789019", 2023, "BalanceSheet");
    store
        .insert_edges([
            edge(&balance, "A", "B"),
            edge(&balance, "A", "C"),
            edge(&balance, "B", "D"),
            edge(&balance, "C", "D"),
            edge(&income, "(+1) Revenue", "ProductSales"),
            edge(&income, "NetIncome", "(+1) Revenue"),
            edge(&older, "Assets", "Cash"),
            edge(&other, "X", "X"),
        ])
        .await;
    store
}

fn find<'a>(rows: &'a [StoredRow], year: i32, category: &str, sub: &str) -> &'a StoredRow {
    rows.iter()
        .find(|r| r.edge.year == year && r.edge.category == category && r.edge.sub_concept == sub)
        .expect("row present")
}

#[tokio::test]
async fn run_all_annotates_every_scope() {
    let store = seeded_store().await;
    let runner = HierarchyRunner::new(Arc::new(store.clone()), ScopeAnnotator::default())
        .with_concurrency(4);

    let report = runner.run_all().await.unwrap();
    assert!(report.is_clean(), "failures: {:?}", report.failures);
    assert_eq!(report.groups, 2);
    assert_eq!(report.scopes_annotated, 4);
    assert_eq!(report.rows_written, 8);
    assert_eq!(report.rows_skipped, 0);

    let rows = store.rows(&GroupKey::new("cal_320193")).await;
    let d = find(&rows, 2023, "BalanceSheet", "D");
    assert_eq!(d.level, Some(2));
    let lineage = &d.ancestor_path.as_ref().unwrap().0;
    assert_eq!(lineage.first().map(String::as_str), Some("A"));
    assert_eq!(lineage.last().map(String::as_str), Some("D"));
    assert_eq!(lineage.len(), 4);

    let sales = find(&rows, 2023, "IncomeStatement", "ProductSales");
    assert_eq!(sales.level, Some(2));
    assert_eq!(
        sales.ancestor_path.as_ref().unwrap().0,
        vec!["NetIncome", "Revenue", "ProductSales"]
    );

    let cash = find(&rows, 2022, "BalanceSheet", "Cash");
    assert_eq!(cash.level, Some(1));

    // Self-loop: persisted without a level.
    let other = store.rows(&GroupKey::new("cal_789019")).await;
    assert_eq!(other[0].level, None);
    assert_eq!(other[0].ancestor_path.as_ref().unwrap().0, vec!["X"]);
}

#[tokio::test]
async fn rerun_is_idempotent() {
    let store = seeded_store().await;
    let runner = HierarchyRunner::new(Arc::new(store.clone()), ScopeAnnotator::default());

    runner.run_all().await.unwrap();
    let first = store.rows(&GroupKey::new("cal_320193")).await;
    runner.run_all().await.unwrap();
    let second = store.rows(&GroupKey::new("cal_320193")).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn sequential_and_concurrent_runs_agree() {
    let sequential = seeded_store().await;
    let concurrent = seeded_store().await;

    HierarchyRunner::new(Arc::new(sequential.clone()), ScopeAnnotator::default())
        .run_all()
        .await
        .unwrap();
    HierarchyRunner::new(Arc::new(concurrent.clone()), ScopeAnnotator::default())
        .with_concurrency(8)
        .run_all()
        .await
        .unwrap();

    for group in ["cal_320193", "cal_789019"] {
        let g = GroupKey::new(group);
        assert_eq!(sequential.rows(&g).await, concurrent.rows(&g).await);
    }
}

#[tokio::test]
async fn configured_groups_restrict_the_run() {
    let store = seeded_store().await;
    let config = RunnerConfig {
        groups: vec![GroupKey::new("cal_789019")],
        level_policy: LevelPolicy::MinimumDepth,
        ..RunnerConfig::default()
    };
    let report = HierarchyRunner::from_config(Arc::new(store.clone()), &config)
        .run_all()
        .await
        .unwrap();
    assert_eq!(report.groups, 1);
    assert_eq!(report.scopes_annotated, 1);

    let untouched = store.rows(&GroupKey::new("cal_320193")).await;
    assert!(untouched.iter().all(|r| r.ancestor_path.is_none()));
}

/// Store double with injectable failures, delegating to a memory store.
struct FlakyStore {
    inner: MemoryEdgeStore,
    fail_read: HashSet<String>,
    fail_schema: HashSet<String>,
    fail_years: HashSet<String>,
    schema_calls: AtomicUsize,
    writes: AtomicUsize,
}

impl FlakyStore {
    fn new(inner: MemoryEdgeStore) -> Self {
        Self {
            inner,
            fail_read: HashSet::new(),
            fail_schema: HashSet::new(),
            fail_years: HashSet::new(),
            schema_calls: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EdgeStore for FlakyStore {
    async fn list_groups(&self) -> StoreResult<Vec<GroupKey>> {
        self.inner.list_groups().await
    }

    async fn list_years(&self, group: &GroupKey) -> StoreResult<Vec<i32>> {
        if self.fail_years.contains(group.as_str()) {
            return Err(StoreError::Unavailable("years".into()));
        }
        self.inner.list_years(group).await
    }

    async fn list_categories(&self, group: &GroupKey, year: i32) -> StoreResult<Vec<String>> {
        self.inner.list_categories(group, year).await
    }

    async fn read_edges(&self, scope: &Scope) -> StoreResult<Vec<CalculationEdge>> {
        if self.fail_read.contains(&scope.to_string()) {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        self.inner.read_edges(scope).await
    }

    async fn ensure_annotation_columns(&self, group: &GroupKey) -> StoreResult<()> {
        self.schema_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_schema.contains(group.as_str()) {
            return Err(StoreError::Schema {
                group: group.clone(),
                message: "permission denied".into(),
            });
        }
        self.inner.ensure_annotation_columns(group).await
    }

    async fn write_annotations(
        &self,
        group: &GroupKey,
        rows: &[AnnotatedRow],
    ) -> StoreResult<WriteOutcome> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write_annotations(group, rows).await
    }
}

#[tokio::test]
async fn failing_scope_does_not_abort_the_run() {
    let mut flaky = FlakyStore::new(seeded_store().await);
    flaky.fail_read.insert("cal_320193/2023/BalanceSheet".into());
    let flaky = Arc::new(flaky);

    let report = HierarchyRunner::new(flaky.clone(), ScopeAnnotator::default())
        .run_all()
        .await
        .unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].target, "cal_320193/2023/BalanceSheet");
    assert_eq!(report.scopes_annotated, 3);
}

#[tokio::test]
async fn schema_failure_is_fatal_only_for_that_group() {
    let mut flaky = FlakyStore::new(seeded_store().await);
    flaky.fail_schema.insert("cal_320193".into());
    let flaky = Arc::new(flaky);

    let report = HierarchyRunner::new(flaky.clone(), ScopeAnnotator::default())
        .run_all()
        .await
        .unwrap();
    assert_eq!(report.failures.len(), 3);
    assert!(report.failures.iter().all(|f| f.target.starts_with("cal_320193")));
    assert_eq!(report.scopes_annotated, 1);
    // No write reached the store for the broken group.
    assert_eq!(flaky.writes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn schema_evolution_runs_once_per_group() {
    let flaky = Arc::new(FlakyStore::new(seeded_store().await));
    HierarchyRunner::new(flaky.clone(), ScopeAnnotator::default())
        .with_concurrency(8)
        .run_all()
        .await
        .unwrap();
    assert_eq!(flaky.schema_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn year_listing_failure_is_recorded() {
    let mut flaky = FlakyStore::new(seeded_store().await);
    flaky.fail_years.insert("cal_789019".into());
    let report = HierarchyRunner::new(Arc::new(flaky), ScopeAnnotator::default())
        .run_all()
        .await
        .unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].target, "cal_789019");
    assert_eq!(report.scopes_annotated, 3);
}
