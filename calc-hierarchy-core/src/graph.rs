//! Hierarchy Builder: a directed concept graph for one scope.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;

/// Directed `concept → sub_concept` graph over normalized labels.
///
/// Nodes keep first-seen order, which fixes root iteration order and the
/// tie-break used when ordering ancestors. One edge is kept per ordered pair:
/// a repeated pair overwrites the stored weight (last write wins).
#[derive(Debug, Clone, Default)]
pub struct HierarchyGraph {
    graph: DiGraph<String, Option<f64>>,
    index: HashMap<String, NodeIndex>,
}

impl HierarchyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(concept, sub_concept, weight)` triples in input order.
    pub fn from_edges<I, S>(edges: I) -> Self
    where
        I: IntoIterator<Item = (S, S, Option<f64>)>,
        S: AsRef<str>,
    {
        let mut hierarchy = Self::new();
        for (concept, sub_concept, weight) in edges {
            hierarchy.add_edge(concept.as_ref(), sub_concept.as_ref(), weight);
        }
        hierarchy
    }

    /// Insert (or overwrite) the edge `concept → sub_concept`.
    pub fn add_edge(&mut self, concept: &str, sub_concept: &str, weight: Option<f64>) {
        let from = self.intern(concept);
        let to = self.intern(sub_concept);
        self.graph.update_edge(from, to, weight);
    }

    fn intern(&mut self, label: &str) -> NodeIndex {
        if let Some(idx) = self.index.get(label) {
            return *idx;
        }
        let idx = self.graph.add_node(label.to_string());
        self.index.insert(label.to_string(), idx);
        idx
    }

    /// Nodes with no incoming edge, in insertion order. A self-loop counts as
    /// an incoming edge.
    pub fn roots(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&n| {
                self.graph
                    .neighbors_directed(n, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .collect()
    }

    pub fn node(&self, label: &str) -> Option<NodeIndex> {
        self.index.get(label).copied()
    }

    pub fn label(&self, node: NodeIndex) -> &str {
        &self.graph[node]
    }

    /// Weight stored for `concept → sub_concept`. Outer `None` means no edge.
    pub fn weight(&self, concept: &str, sub_concept: &str) -> Option<Option<f64>> {
        let from = self.node(concept)?;
        let to = self.node(sub_concept)?;
        self.graph
            .find_edge(from, to)
            .map(|e| self.graph[e])
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub(crate) fn inner(&self) -> &DiGraph<String, Option<f64>> {
        &self.graph
    }
}
