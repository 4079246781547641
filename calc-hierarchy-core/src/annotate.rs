//! Per-scope pipeline: normalize → build → level → annotate rows.

use tracing::debug;

use crate::graph::HierarchyGraph;
use crate::leveling::{LevelPolicy, LeveledHierarchy};
use crate::normalize::{split_weight_marker, ConceptNormalizer};
use crate::types::{AnnotatedRow, CalculationEdge};

/// Turns one scope's edge batch into annotated rows.
#[derive(Debug, Clone, Default)]
pub struct ScopeAnnotator {
    normalizer: ConceptNormalizer,
    policy: LevelPolicy,
}

impl ScopeAnnotator {
    pub fn new(normalizer: ConceptNormalizer, policy: LevelPolicy) -> Self {
        Self { normalizer, policy }
    }

    pub fn policy(&self) -> LevelPolicy {
        self.policy
    }

    /// Build the scope graph over normalized labels. A missing weight falls
    /// back to the marker embedded in the raw `sub_concept` label.
    pub fn build_graph(&self, edges: &[CalculationEdge]) -> HierarchyGraph {
        let mut graph = HierarchyGraph::new();
        for edge in edges {
            let weight = edge
                .weight
                .or_else(|| split_weight_marker(&edge.sub_concept).0);
            graph.add_edge(
                &self.normalizer.normalize(&edge.concept),
                &self.normalizer.normalize(&edge.sub_concept),
                weight,
            );
        }
        graph
    }

    /// One row per input edge, in input order. Rows keep their stored labels
    /// as the natural key; the level and lineage are those of the normalized
    /// `sub_concept`. An empty batch yields no rows.
    pub fn annotate(&self, edges: &[CalculationEdge]) -> Vec<AnnotatedRow> {
        if edges.is_empty() {
            return Vec::new();
        }

        let graph = self.build_graph(edges);
        let leveled = LeveledHierarchy::compute(&graph, self.policy);
        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            roots = graph.roots().len(),
            leveled = leveled.leveled_count(),
            "scope hierarchy leveled"
        );

        edges
            .iter()
            .map(|edge| {
                let sub = self.normalizer.normalize(&edge.sub_concept);
                AnnotatedRow {
                    concept: edge.concept.clone(),
                    sub_concept: edge.sub_concept.clone(),
                    category: edge.category.clone(),
                    year: edge.year,
                    level: leveled.level_of(&sub),
                    ancestor_path: leveled.lineage_of(&sub),
                }
            })
            .collect()
    }
}
