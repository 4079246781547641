//! Leveling Engine: breadth-first depth and transitive ancestor lineage for
//! every node of a [`HierarchyGraph`].
//!
//! Pure computation. Cyclic or disconnected input never fails: traversal is
//! bounded by visited-node bookkeeping, and nodes no root can reach are left
//! without a level.

use petgraph::algo::tarjan_scc;
use petgraph::graph::NodeIndex;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::graph::HierarchyGraph;
use crate::types::AncestorPath;

/// How a node reachable from several roots at different depths is leveled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelPolicy {
    /// Roots are traversed in insertion order and each traversal overwrites
    /// earlier assignments: the last root to reach a node decides its depth.
    #[default]
    LastRootWins,
    /// Smallest depth across all roots.
    MinimumDepth,
}

impl std::str::FromStr for LevelPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "last_root_wins" => Ok(Self::LastRootWins),
            "minimum_depth" | "min" => Ok(Self::MinimumDepth),
            other => Err(format!("Unknown level policy: {}", other)),
        }
    }
}

/// Levels and ancestor sets for one hierarchy, indexed by node.
#[derive(Debug)]
pub struct LeveledHierarchy<'g> {
    graph: &'g HierarchyGraph,
    levels: Vec<Option<u32>>,
    /// Ordered ancestors excluding the node itself.
    ancestors: Vec<Vec<NodeIndex>>,
}

impl<'g> LeveledHierarchy<'g> {
    pub fn compute(graph: &'g HierarchyGraph, policy: LevelPolicy) -> Self {
        let levels = compute_levels(graph, policy);
        let ancestors = compute_ancestors(graph, &levels);
        Self {
            graph,
            levels,
            ancestors,
        }
    }

    pub fn level(&self, node: NodeIndex) -> Option<u32> {
        self.levels.get(node.index()).copied().flatten()
    }

    pub fn level_of(&self, label: &str) -> Option<u32> {
        self.graph.node(label).and_then(|n| self.level(n))
    }

    pub fn ancestors(&self, node: NodeIndex) -> &[NodeIndex] {
        self.ancestors
            .get(node.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Root-most-first lineage ending in `node`.
    pub fn lineage(&self, node: NodeIndex) -> AncestorPath {
        let mut path: Vec<String> = self
            .ancestors(node)
            .iter()
            .map(|&a| self.graph.label(a).to_string())
            .collect();
        path.push(self.graph.label(node).to_string());
        AncestorPath(path)
    }

    /// Lineage for a label. A label absent from the graph yields `[label]`.
    pub fn lineage_of(&self, label: &str) -> AncestorPath {
        match self.graph.node(label) {
            Some(n) => self.lineage(n),
            None => AncestorPath(vec![label.to_string()]),
        }
    }

    /// Number of nodes that received a level.
    pub fn leveled_count(&self) -> usize {
        self.levels.iter().filter(|l| l.is_some()).count()
    }
}

/// Breadth-first layering from every root in insertion order.
fn compute_levels(hierarchy: &HierarchyGraph, policy: LevelPolicy) -> Vec<Option<u32>> {
    let graph = hierarchy.inner();
    let mut levels: Vec<Option<u32>> = vec![None; graph.node_count()];

    for root in hierarchy.roots() {
        let mut visited = vec![false; graph.node_count()];
        visited[root.index()] = true;
        let mut layer = vec![root];
        let mut depth: u32 = 0;

        while !layer.is_empty() {
            let mut next = Vec::new();
            for &node in &layer {
                let slot = &mut levels[node.index()];
                *slot = match (policy, *slot) {
                    (LevelPolicy::MinimumDepth, Some(existing)) => Some(existing.min(depth)),
                    _ => Some(depth),
                };
                for succ in graph.neighbors_directed(node, Direction::Outgoing) {
                    if !visited[succ.index()] {
                        visited[succ.index()] = true;
                        next.push(succ);
                    }
                }
            }
            layer = next;
            depth += 1;
        }
    }

    levels
}

/// Transitive predecessor sets, memoized per strongly connected component.
///
/// `tarjan_scc` yields components in reverse topological order, so walking it
/// backwards sees every predecessor component before its successors. Members
/// of a cyclic component are ancestors of one another. A node is never its
/// own ancestor.
fn compute_ancestors(hierarchy: &HierarchyGraph, levels: &[Option<u32>]) -> Vec<Vec<NodeIndex>> {
    let graph = hierarchy.inner();
    let components = tarjan_scc(graph);

    let mut component_of = vec![0usize; graph.node_count()];
    for (c, members) in components.iter().enumerate() {
        for &m in members {
            component_of[m.index()] = c;
        }
    }

    let mut reach: Vec<BTreeSet<NodeIndex>> = vec![BTreeSet::new(); components.len()];
    for c in (0..components.len()).rev() {
        let members = &components[c];
        let mut set = BTreeSet::new();
        for &m in members {
            for pred in graph.neighbors_directed(m, Direction::Incoming) {
                let pc = component_of[pred.index()];
                if pc != c {
                    set.insert(pred);
                    set.extend(reach[pc].iter().copied());
                }
            }
        }
        let cyclic = members.len() > 1 || graph.find_edge(members[0], members[0]).is_some();
        if cyclic {
            set.extend(members.iter().copied());
        }
        reach[c] = set;
    }

    graph
        .node_indices()
        .map(|node| {
            // BTreeSet order is insertion order; the stable sort keeps it as
            // the tie-break. Level-less ancestors sort last.
            let mut ordered: Vec<NodeIndex> = reach[component_of[node.index()]]
                .iter()
                .copied()
                .filter(|&a| a != node)
                .collect();
            ordered.sort_by_key(|a| {
                let level = levels[a.index()];
                (level.is_none(), level)
            });
            ordered
        })
        .collect()
}
