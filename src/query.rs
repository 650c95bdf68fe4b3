//! Read paths over the persisted graph: filtered node/relationship retrieval
//! with a visualization cap, batched relationship fan-out, and aggregate
//! statistics.

use crate::error::Result;
use crate::store::GraphStore;
use crate::types::{
    ComplexityStats, GraphQuery, GraphQueryResult, GraphStats, Node, RelationKind, Relationship,
};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Node cap applied by [`QueryEngine::query_graph`] (visualization budget).
pub const NODE_LIMIT: usize = 1000;
/// Relationship fetches are chunked to this many node ids per store request
/// to bound query argument size.
pub const RELATIONSHIP_BATCH_IDS: usize = 50;

/// Serves all read paths against a [`GraphStore`].
pub struct QueryEngine {
    store: Arc<dyn GraphStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        QueryEngine { store }
    }

    /// Filtered node/relationship retrieval, capped at [`NODE_LIMIT`] nodes.
    /// Only relationships with both endpoints in the selected set are kept.
    pub fn query_graph(&self, query: &GraphQuery) -> Result<GraphQueryResult> {
        let nodes = self.store.nodes_for_repository(
            query.repository_id,
            query.node_kinds.as_deref(),
            query.language_filter.as_deref(),
            Some(NODE_LIMIT),
        )?;

        let node_ids: Vec<Uuid> = nodes.iter().map(|n| n.id).collect();
        let kinds = if query.relationship_kinds.is_empty() {
            None
        } else {
            Some(query.relationship_kinds.as_slice())
        };
        let mut relationships = self.relationships_for(&node_ids, kinds)?;

        let id_set: HashSet<Uuid> = node_ids.iter().copied().collect();
        relationships.retain(|r| {
            id_set.contains(&r.source_node_id) && id_set.contains(&r.target_node_id)
        });

        let (nodes, relationships) = self.apply_path_filtering(
            nodes,
            relationships,
            query.start_node_id,
            query.end_node_id,
            query.max_depth,
        );

        debug!(
            nodes = nodes.len(),
            relationships = relationships.len(),
            repository = %query.repository_id,
            "Graph query complete"
        );

        Ok(GraphQueryResult {
            total_nodes: nodes.len(),
            total_relationships: relationships.len(),
            query_parameters: json!({
                "repository_id": query.repository_id,
                "max_depth": query.max_depth,
                "node_kinds": query.node_kinds,
                "relationship_kinds": query.relationship_kinds,
                "language_filter": query.language_filter,
                "include_properties": query.include_properties,
            }),
            nodes,
            relationships,
        })
    }

    /// Uncapped node + relationship fetch for a repository (analysis input).
    pub fn fetch_graph(&self, repository_id: Uuid) -> Result<(Vec<Node>, Vec<Relationship>)> {
        let nodes = self.store.nodes_for_repository(repository_id, None, None, None)?;
        let node_ids: Vec<Uuid> = nodes.iter().map(|n| n.id).collect();
        let mut relationships = self.relationships_for(&node_ids, None)?;
        let id_set: HashSet<Uuid> = node_ids.iter().copied().collect();
        relationships.retain(|r| {
            id_set.contains(&r.source_node_id) && id_set.contains(&r.target_node_id)
        });
        Ok((nodes, relationships))
    }

    /// Same batched fetch without the node cap; returns aggregate statistics.
    pub fn graph_statistics(&self, repository_id: Uuid) -> Result<GraphStats> {
        let (nodes, relationships) = self.fetch_graph(repository_id)?;
        Ok(compute_statistics(&nodes, &relationships))
    }

    /// Batched relationship fan-out with dedup by relationship id. Batches
    /// overlap on edges whose endpoints fall in different chunks, so each id
    /// may come back more than once.
    fn relationships_for(
        &self,
        node_ids: &[Uuid],
        kinds: Option<&[RelationKind]>,
    ) -> Result<Vec<Relationship>> {
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut relationships = Vec::new();
        for chunk in node_ids.chunks(RELATIONSHIP_BATCH_IDS) {
            for relationship in self.store.relationships_touching(chunk, kinds)? {
                if seen.insert(relationship.id) {
                    relationships.push(relationship);
                }
            }
        }
        Ok(relationships)
    }

    /// Path filtering for `start_node_id`/`end_node_id` is currently a
    /// pass-through; the bounded-traversal semantics are not pinned down yet.
    fn apply_path_filtering(
        &self,
        nodes: Vec<Node>,
        relationships: Vec<Relationship>,
        _start_node_id: Option<Uuid>,
        _end_node_id: Option<Uuid>,
        _max_depth: u32,
    ) -> (Vec<Node>, Vec<Relationship>) {
        (nodes, relationships)
    }
}

/// Aggregate statistics over one repository's rows.
pub fn compute_statistics(nodes: &[Node], relationships: &[Relationship]) -> GraphStats {
    let mut nodes_by_kind: BTreeMap<String, usize> = BTreeMap::new();
    let mut languages: BTreeMap<String, usize> = BTreeMap::new();
    let mut files: HashSet<&str> = HashSet::new();
    let mut complexity_scores: Vec<u8> = Vec::new();

    for node in nodes {
        *nodes_by_kind.entry(node.node_kind.label().to_string()).or_default() += 1;
        if !node.language.is_empty() {
            *languages.entry(node.language.clone()).or_default() += 1;
        }
        files.insert(node.file_path.as_str());
        if let Some(score) = node.complexity_score {
            complexity_scores.push(score);
        }
    }

    let mut relationships_by_kind: BTreeMap<String, usize> = BTreeMap::new();
    let mut cross_file = 0;
    for relationship in relationships {
        *relationships_by_kind
            .entry(relationship.relation_kind.label().to_string())
            .or_default() += 1;
        if relationship.context.get("cross_file").and_then(|v| v.as_bool()).unwrap_or(false) {
            cross_file += 1;
        }
    }

    let complexity_stats = if complexity_scores.is_empty() {
        None
    } else {
        let mut sorted = complexity_scores.clone();
        sorted.sort_unstable();
        let sum: u64 = sorted.iter().map(|&s| s as u64).sum();
        Some(ComplexityStats {
            average: sum as f64 / sorted.len() as f64,
            min: sorted[0] as f64,
            max: sorted[sorted.len() - 1] as f64,
            median: sorted[sorted.len() / 2] as f64,
        })
    };

    GraphStats {
        total_nodes: nodes.len(),
        total_relationships: relationships.len(),
        nodes_by_kind,
        relationships_by_kind,
        languages,
        complexity_stats,
        files_analyzed: files.len(),
        cross_file_relationships: cross_file,
    }
}
