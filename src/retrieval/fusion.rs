//! Weighted additive score fusion

use crate::corpus::DocumentKind;
use crate::graph::RelationGraph;
use ahash::AHashMap;
use std::collections::HashMap;

/// Per-query `document id -> fused score` accumulator
///
/// Scores from every channel are added, never averaged or maxed. Graph
/// expansion runs at most once per map.
#[derive(Debug, Default)]
pub struct ScoreMap {
    scores: AHashMap<String, f32>,
    expanded: bool,
}

impl ScoreMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// `score[id] += delta`, starting from zero for unseen ids
    pub fn accumulate(&mut self, id: &str, delta: f32) {
        match self.scores.get_mut(id) {
            Some(score) => *score += delta,
            None => {
                self.scores.insert(id.to_string(), delta);
            }
        }
    }

    /// Add one channel's `(id, score)` hits scaled by `weight`
    pub fn merge_weighted(&mut self, hits: &[(String, f32)], weight: f32) {
        for (id, score) in hits {
            self.accumulate(id, weight * score);
        }
    }

    /// Add `bonus` to the table document of every one-hop neighbor of the
    /// tables currently scored
    ///
    /// Seeds are the scored ids whose `kinds` entry is a table document.
    /// Returns the number of neighbors boosted; a second call on the same
    /// map boosts nothing.
    pub fn expand_with_graph(
        &mut self,
        graph: &RelationGraph,
        kinds: &HashMap<String, DocumentKind>,
        bonus: f32,
    ) -> usize {
        if self.expanded {
            return 0;
        }
        self.expanded = true;

        let seeds = self
            .scores
            .keys()
            .filter_map(|id| kinds.get(id).and_then(DocumentKind::as_table));
        let neighbors = graph.one_hop_neighbors(seeds);

        for table in &neighbors {
            self.accumulate(&DocumentKind::table_document_id(table), bonus);
        }

        neighbors.len()
    }

    pub fn get(&self, id: &str) -> Option<f32> {
        self.scores.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Best `k` entries, score descending, ties by id ascending
    pub fn top_k(&self, k: usize) -> Vec<(String, f32)> {
        let mut ranked: Vec<(String, f32)> = self
            .scores
            .iter()
            .map(|(id, score)| (id.clone(), *score))
            .collect();

        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(k);
        ranked
    }
}
