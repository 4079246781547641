//! calc-hierarchy-core — reconstructs calculation hierarchies from flat
//! `concept → sub_concept` rows and annotates every row with the depth and
//! ancestor lineage of its sub-concept.
//!
//! Pipeline per `(group, year, category)` scope:
//! `EdgeStore::read_edges` → [`normalize`] → [`graph::HierarchyGraph`] →
//! [`leveling::LeveledHierarchy`] → `EdgeStore::write_annotations`.
//! [`orchestrator::HierarchyRunner`] enumerates the scopes.

pub mod annotate;
pub mod config;
pub mod error;
pub mod graph;
pub mod leveling;
pub mod normalize;
pub mod orchestrator;
pub mod store;
pub mod types;

pub use annotate::ScopeAnnotator;
pub use config::RunnerConfig;
pub use error::{RunError, ScopeError, StoreError};
pub use graph::HierarchyGraph;
pub use leveling::{LevelPolicy, LeveledHierarchy};
pub use normalize::{normalize_concept, ConceptNormalizer};
pub use orchestrator::{HierarchyRunner, RunReport, ScopeOutcome};
pub use store::{EdgeStore, MemoryEdgeStore};
pub use types::*;
