//! Foreign-key adjacency between tables
//!
//! Nodes are table names, edges are directed `from_table -> to_table` arcs,
//! one per foreign key. Expansion ignores direction.

use crate::corpus::Corpus;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Default)]
pub struct RelationGraph {
    graph: DiGraph<String, ()>,
    nodes: HashMap<String, NodeIndex>,
}

/// Graph size summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub tables: usize,
    pub relations: usize,
}

impl RelationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a corpus' tables and foreign keys
    pub fn from_corpus(corpus: &Corpus) -> Self {
        let mut graph = Self::new();
        for table in corpus.tables() {
            graph.add_table(table);
        }
        for (from, to) in corpus.relations() {
            graph.add_relation(from, to);
        }
        graph
    }

    /// Insert a table node; existing tables are left alone
    pub fn add_table(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.nodes.insert(name.to_string(), idx);
        idx
    }

    /// Add a `from -> to` edge, creating either node if needed
    ///
    /// Parallel edges are kept; they do not change expansion.
    pub fn add_relation(&mut self, from: &str, to: &str) {
        let from = self.add_table(from);
        let to = self.add_table(to);
        self.graph.add_edge(from, to, ());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Tables one edge away from any of `names`, in either direction
    ///
    /// A self-loop does not make a table its own neighbor. A table that is
    /// itself in `names` is still returned when another input table links to
    /// it. Unknown names contribute nothing.
    pub fn one_hop_neighbors<'a, I>(&self, names: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut neighbors = BTreeSet::new();

        for name in names {
            let Some(&idx) = self.nodes.get(name) else {
                continue;
            };

            for direction in [Direction::Outgoing, Direction::Incoming] {
                for neighbor in self.graph.neighbors_directed(idx, direction) {
                    if neighbor != idx {
                        neighbors.insert(self.graph[neighbor].clone());
                    }
                }
            }
        }

        neighbors
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            tables: self.graph.node_count(),
            relations: self.graph.edge_count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}
