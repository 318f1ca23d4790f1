//! Field-level lineage tracking.
//!
//! Records which fields each formula field references directly, and answers
//! transitive questions over that relation.
//!
//! ```text
//!   price ──┐
//!           ├──► revenue ──► margin
//!   qty ────┘                  ▲
//!   cost ──────────────────────┘
//! ```
//!
//! Edges point from the referenced field to the referencing one, so
//! "downstream" means "depends on me". The direct-reference map is the
//! persisted state; a petgraph view is built on demand for cycle analysis
//! and evaluation ordering.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLineage {
    /// field id -> ids of the fields it references.
    references: BTreeMap<String, BTreeSet<String>>,
}

impl FieldLineage {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Replace the direct references of `field_id`.
    pub fn set_direct_references(&mut self, field_id: &str, refs: BTreeSet<String>) {
        if refs.is_empty() {
            self.references.remove(field_id);
        } else {
            self.references.insert(field_id.to_string(), refs);
        }
    }

    pub fn clear_direct_references(&mut self, field_id: &str) {
        self.references.remove(field_id);
    }

    /// Move every mention of `old_id` to `new_id`.
    pub fn rename_field(&mut self, old_id: &str, new_id: &str) {
        if let Some(refs) = self.references.remove(old_id) {
            self.references.insert(new_id.to_string(), refs);
        }
        for refs in self.references.values_mut() {
            if refs.remove(old_id) {
                refs.insert(new_id.to_string());
            }
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn direct_references(&self, field_id: &str) -> BTreeSet<String> {
        self.references.get(field_id).cloned().unwrap_or_default()
    }

    /// Fields that reference `field_id` directly.
    pub fn direct_dependents(&self, field_id: &str) -> BTreeSet<String> {
        self.references
            .iter()
            .filter(|(_, refs)| refs.contains(field_id))
            .map(|(dependent, _)| dependent.clone())
            .collect()
    }

    /// Everything `field_id` depends on, directly or indirectly.
    pub fn all_upstream(&self, field_id: &str) -> BTreeSet<String> {
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(field_id.to_string());

        while let Some(current) = queue.pop_front() {
            if let Some(refs) = self.references.get(&current) {
                for referenced in refs {
                    if visited.insert(referenced.clone()) {
                        queue.push_back(referenced.clone());
                    }
                }
            }
        }

        visited
    }

    /// Everything that depends on `field_id`, directly or indirectly.
    pub fn all_downstream(&self, field_id: &str) -> BTreeSet<String> {
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(field_id.to_string());

        while let Some(current) = queue.pop_front() {
            for dependent in self.direct_dependents(&current) {
                if visited.insert(dependent.clone()) {
                    queue.push_back(dependent);
                }
            }
        }

        visited
    }

    /// Whether giving `field_id` the references `refs` would close a loop.
    pub fn would_create_cycle(&self, field_id: &str, refs: &BTreeSet<String>) -> bool {
        refs.iter().any(|referenced| {
            referenced == field_id || self.all_upstream(referenced).contains(field_id)
        })
    }

    // =========================================================================
    // Graph analysis
    // =========================================================================

    fn build_graph(&self) -> (DiGraph<String, ()>, HashMap<String, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut node_index: HashMap<String, NodeIndex> = HashMap::new();

        let mut node = |graph: &mut DiGraph<String, ()>, id: &str| -> NodeIndex {
            *node_index
                .entry(id.to_string())
                .or_insert_with(|| graph.add_node(id.to_string()))
        };

        for (dependent, refs) in &self.references {
            let to = node(&mut graph, dependent);
            for referenced in refs {
                let from = node(&mut graph, referenced);
                graph.add_edge(from, to, ());
            }
        }

        (graph, node_index)
    }

    /// Strongly connected components that form reference loops.
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        let (graph, _) = self.build_graph();

        tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| {
                // A single node is only a cycle if it has a self-loop
                scc.len() > 1 || graph.edges_connecting(scc[0], scc[0]).next().is_some()
            })
            .map(|scc| {
                let mut ids: Vec<String> = scc
                    .into_iter()
                    .filter_map(|idx| graph.node_weight(idx).cloned())
                    .collect();
                ids.sort();
                ids
            })
            .collect()
    }

    /// Tracked fields ordered so that references come before their dependents.
    ///
    /// Returns the id of a field on a cycle if no such order exists.
    pub fn evaluation_order(&self) -> Result<Vec<String>, String> {
        let (graph, _) = self.build_graph();
        toposort(&graph, None)
            .map(|order| {
                order
                    .into_iter()
                    .filter_map(|idx| graph.node_weight(idx).cloned())
                    .collect()
            })
            .map_err(|cycle| {
                graph
                    .node_weight(cycle.node_id())
                    .cloned()
                    .unwrap_or_default()
            })
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}
