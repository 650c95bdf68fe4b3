//! Derived graph analyses: dependency cycles and coupling, complexity
//! distribution, hotspot scoring, and an architecture overview with a
//! modularity score. All analyses run against persisted rows and are cached
//! as [`Analysis`] records.

use crate::error::{KgError, Result};
use crate::query::{compute_statistics, QueryEngine};
use crate::store::GraphStore;
use crate::types::{Analysis, AnalysisKind, Node, NodeKind, RelationKind, Relationship};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Fan-in or fan-out above this marks a node as highly coupled.
const COUPLING_THRESHOLD: usize = 5;
/// Minimum score for the hotspot list.
const HOTSPOT_THRESHOLD: i64 = 10;
/// Hotspot list length.
const HOTSPOT_LIMIT: usize = 20;
/// Nodes scoring above this are reported as high-complexity.
const HIGH_COMPLEXITY: u8 = 7;

// ---------------------------------------------------------------------------
// Dependency tree
// ---------------------------------------------------------------------------

/// Adjacency over `depends_on`/`imports`/`uses` edges, cycle detection, and
/// fan-in/fan-out coupling over `calls`/`uses`.
pub fn dependency_tree(nodes: &[Node], relationships: &[Relationship]) -> Value {
    let mut graph: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for rel in relationships {
        if matches!(
            rel.relation_kind,
            RelationKind::DependsOn | RelationKind::Imports | RelationKind::Uses
        ) {
            graph
                .entry(rel.source_node_id.to_string())
                .or_default()
                .insert(rel.target_node_id.to_string());
        }
    }

    let cycles = detect_cycles(&graph);

    let mut fan_in: BTreeMap<String, usize> = BTreeMap::new();
    let mut fan_out: BTreeMap<String, usize> = BTreeMap::new();
    for rel in relationships {
        if matches!(rel.relation_kind, RelationKind::Calls | RelationKind::Uses) {
            *fan_out.entry(rel.source_node_id.to_string()).or_default() += 1;
            *fan_in.entry(rel.target_node_id.to_string()).or_default() += 1;
        }
    }
    let mut highly_coupled: BTreeSet<String> = BTreeSet::new();
    for (id, count) in fan_in.iter().chain(fan_out.iter()) {
        if *count > COUPLING_THRESHOLD {
            highly_coupled.insert(id.clone());
        }
    }

    let mut scored: Vec<&Node> = nodes.iter().filter(|n| n.complexity_score.is_some()).collect();
    scored.sort_by(|a, b| b.complexity_score.cmp(&a.complexity_score));
    let complexity_hotspots: Vec<Value> = scored
        .iter()
        .take(10)
        .map(|n| {
            json!({
                "name": n.name,
                "file_path": n.file_path,
                "complexity": n.complexity_score,
                "type": n.node_kind.label(),
            })
        })
        .collect();

    json!({
        "dependency_graph": graph
            .iter()
            .map(|(k, v)| (k.clone(), v.iter().cloned().collect::<Vec<_>>()))
            .collect::<BTreeMap<_, _>>(),
        "circular_dependencies": cycles,
        "coupling_metrics": {
            "fan_in": fan_in,
            "fan_out": fan_out,
            "highly_coupled": highly_coupled,
        },
        "complexity_hotspots": complexity_hotspots,
    })
}

/// DFS with a recursion stack. Re-entering a node already on the stack emits
/// the slice of the current path from that node, closed by the node itself.
/// Duplicates across pattern orders are allowed; no canonicalization.
fn detect_cycles(graph: &BTreeMap<String, BTreeSet<String>>) -> Vec<Vec<String>> {
    fn dfs(
        node: &str,
        path: Vec<String>,
        graph: &BTreeMap<String, BTreeSet<String>>,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        if rec_stack.contains(node) {
            let start = path.iter().position(|p| p == node).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].to_vec();
            cycle.push(node.to_string());
            cycles.push(cycle);
            return;
        }
        if visited.contains(node) {
            return;
        }
        visited.insert(node.to_string());
        rec_stack.insert(node.to_string());
        let mut path = path;
        path.push(node.to_string());

        if let Some(neighbors) = graph.get(node) {
            for neighbor in neighbors {
                dfs(neighbor, path.clone(), graph, visited, rec_stack, cycles);
            }
        }

        rec_stack.remove(node);
    }

    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut cycles = Vec::new();
    for node in graph.keys() {
        if !visited.contains(node.as_str()) {
            dfs(node, Vec::new(), graph, &mut visited, &mut rec_stack, &mut cycles);
        }
    }
    cycles
}

// ---------------------------------------------------------------------------
// Complexity
// ---------------------------------------------------------------------------

/// Bucketize complexity scores: low ≤ 3, medium 4–6, high ≥ 7.
pub fn complexity_analysis(nodes: &[Node]) -> Value {
    let mut low = 0;
    let mut medium = 0;
    let mut high = 0;
    let mut sum: u64 = 0;
    let mut count: u64 = 0;

    for node in nodes {
        if let Some(score) = node.complexity_score {
            match score {
                0..=3 => low += 1,
                4..=6 => medium += 1,
                _ => high += 1,
            }
            sum += score as u64;
            count += 1;
        }
    }

    let high_complexity_nodes: Vec<Value> = nodes
        .iter()
        .filter(|n| n.complexity_score.is_some_and(|s| s > HIGH_COMPLEXITY))
        .map(|n| {
            json!({
                "name": n.name,
                "file_path": n.file_path,
                "complexity": n.complexity_score,
            })
        })
        .collect();

    json!({
        "complexity_distribution": { "low": low, "medium": medium, "high": high },
        "average_complexity": if count > 0 { sum as f64 / count as f64 } else { 0.0 },
        "high_complexity_nodes": high_complexity_nodes,
    })
}

// ---------------------------------------------------------------------------
// Hotspots
// ---------------------------------------------------------------------------

/// Score every node as `2·incoming + outgoing + 3·complexity`; report those
/// above the threshold, highest first, capped at twenty.
pub fn hotspots(nodes: &[Node], relationships: &[Relationship]) -> Value {
    struct Metrics<'a> {
        node: &'a Node,
        incoming: i64,
        outgoing: i64,
    }

    let mut metrics: BTreeMap<Uuid, Metrics> = nodes
        .iter()
        .map(|n| (n.id, Metrics { node: n, incoming: 0, outgoing: 0 }))
        .collect();

    for rel in relationships {
        if let Some(m) = metrics.get_mut(&rel.source_node_id) {
            m.outgoing += 1;
        }
        if let Some(m) = metrics.get_mut(&rel.target_node_id) {
            m.incoming += 1;
        }
    }

    let mut scored: Vec<(i64, &Metrics)> = metrics
        .values()
        .map(|m| {
            let complexity = m.node.complexity_score.unwrap_or(1) as i64;
            (2 * m.incoming + m.outgoing + 3 * complexity, m)
        })
        .filter(|(score, _)| *score > HOTSPOT_THRESHOLD)
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    let hotspots: Vec<Value> = scored
        .iter()
        .take(HOTSPOT_LIMIT)
        .map(|(score, m)| {
            json!({
                "name": m.node.name,
                "file_path": m.node.file_path,
                "node_kind": m.node.node_kind.label(),
                "incoming_refs": m.incoming,
                "outgoing_refs": m.outgoing,
                "complexity": m.node.complexity_score.unwrap_or(1),
                "hotspot_score": score,
            })
        })
        .collect();

    json!({ "hotspots": hotspots })
}

// ---------------------------------------------------------------------------
// Architecture
// ---------------------------------------------------------------------------

/// `internal / (internal + external)` where internal means both endpoints
/// share a file path. Defaults to 1.0 on empty edge sets.
pub fn modularity_score(nodes: &[Node], relationships: &[Relationship]) -> f64 {
    if relationships.is_empty() {
        return 1.0;
    }
    let file_of: BTreeMap<Uuid, &str> =
        nodes.iter().map(|n| (n.id, n.file_path.as_str())).collect();

    let mut internal = 0u64;
    let mut external = 0u64;
    for rel in relationships {
        if let (Some(src), Some(dst)) =
            (file_of.get(&rel.source_node_id), file_of.get(&rel.target_node_id))
        {
            if src == dst {
                internal += 1;
            } else {
                external += 1;
            }
        }
    }

    let total = internal + external;
    if total == 0 {
        return 1.0;
    }
    internal as f64 / total as f64
}

/// Aggregated statistics, a directory-level map, and the modularity score.
pub fn architecture_overview(nodes: &[Node], relationships: &[Relationship]) -> Value {
    let stats = compute_statistics(nodes, relationships);

    let mut file_structure: BTreeMap<String, (usize, BTreeSet<String>)> = BTreeMap::new();
    for node in nodes.iter().filter(|n| n.node_kind == NodeKind::File) {
        let dir = node
            .file_path
            .rsplit_once('/')
            .map(|(d, _)| d.to_string())
            .unwrap_or_else(|| ".".to_string());
        let entry = file_structure.entry(dir).or_default();
        entry.0 += 1;
        if !node.language.is_empty() {
            entry.1.insert(node.language.clone());
        }
    }
    let file_structure: BTreeMap<String, Value> = file_structure
        .into_iter()
        .map(|(dir, (files, langs))| {
            (dir, json!({ "files": files, "languages": langs.into_iter().collect::<Vec<_>>() }))
        })
        .collect();

    json!({
        "overview": stats,
        "file_structure": file_structure,
        "cross_file_coupling": stats.cross_file_relationships,
        "modularity_score": modularity_score(nodes, relationships),
    })
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run one analysis against the persisted graph and cache the result row.
pub fn run_analysis(
    store: Arc<dyn GraphStore>,
    repository_id: Uuid,
    kind: AnalysisKind,
    parameters: Value,
) -> Result<Analysis> {
    if store.get_repository(repository_id)?.is_none() {
        return Err(KgError::Input(format!("repository {repository_id} not found")));
    }

    let start = Instant::now();
    let engine = QueryEngine::new(store.clone());
    let (nodes, relationships) = engine.fetch_graph(repository_id)?;

    let results = match kind {
        AnalysisKind::DependencyTree => dependency_tree(&nodes, &relationships),
        AnalysisKind::ComplexityAnalysis => complexity_analysis(&nodes),
        AnalysisKind::Hotspots => hotspots(&nodes, &relationships),
        AnalysisKind::ArchitectureOverview => architecture_overview(&nodes, &relationships),
    };

    let analysis = Analysis {
        id: Uuid::new_v4(),
        repository_id,
        analysis_kind: kind,
        parameters,
        results,
        execution_time_ms: start.elapsed().as_millis() as i64,
        created_at: Utc::now(),
    };
    store.insert_analysis(&analysis)?;

    info!(
        repository = %repository_id,
        kind = kind.label(),
        time_ms = analysis.execution_time_ms,
        "Analysis complete"
    );
    Ok(analysis)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(name: &str, file: &str, complexity: Option<u8>) -> Node {
        Node {
            id: Uuid::new_v4(),
            repository_id: Uuid::nil(),
            node_kind: NodeKind::Function,
            name: name.to_string(),
            fully_qualified_name: format!("{file}::{name}"),
            file_path: file.to_string(),
            line_start: Some(1),
            line_end: Some(2),
            column_start: None,
            column_end: None,
            language: "python".to_string(),
            properties: json!({}),
            source_code: None,
            docstring: None,
            complexity_score: complexity,
            is_public: true,
            is_exported: false,
        }
    }

    fn edge(src: &Node, dst: &Node, kind: RelationKind) -> Relationship {
        Relationship::new(src.id, dst.id, kind, 0.7, json!({}))
    }

    #[test]
    fn test_dag_has_no_cycles() {
        let a = node("a", "a.py", None);
        let b = node("b", "b.py", None);
        let c = node("c", "c.py", None);
        let rels = vec![
            edge(&a, &b, RelationKind::Imports),
            edge(&b, &c, RelationKind::Imports),
            edge(&a, &c, RelationKind::Uses),
        ];
        let result = dependency_tree(&[a, b, c], &rels);
        assert!(
            result["circular_dependencies"].as_array().unwrap().is_empty(),
            "DAG must yield no cycles: {result}"
        );
    }

    #[test]
    fn test_cycle_detected_with_matching_vertex_set() {
        let a = node("A", "a.py", None);
        let b = node("B", "b.py", None);
        let c = node("C", "c.py", None);
        let rels = vec![
            edge(&a, &b, RelationKind::DependsOn),
            edge(&b, &c, RelationKind::DependsOn),
            edge(&c, &a, RelationKind::DependsOn),
        ];
        let expected: HashSet<String> =
            [a.id, b.id, c.id].iter().map(|u| u.to_string()).collect();
        let result = dependency_tree(&[a, b, c], &rels);
        let cycles = result["circular_dependencies"].as_array().unwrap();
        assert!(!cycles.is_empty(), "expected at least one cycle");
        let found = cycles.iter().any(|cycle| {
            let set: HashSet<String> = cycle
                .as_array()
                .unwrap()
                .iter()
                .map(|v| v.as_str().unwrap().to_string())
                .collect();
            set == expected
        });
        assert!(found, "no reported cycle covers the inserted vertex set: {cycles:?}");
    }

    #[test]
    fn test_highly_coupled_threshold() {
        let hub = node("hub", "hub.py", None);
        let others: Vec<Node> = (0..6).map(|i| node(&format!("n{i}"), "x.py", None)).collect();
        let rels: Vec<Relationship> =
            others.iter().map(|n| edge(n, &hub, RelationKind::Calls)).collect();
        let mut all = vec![hub.clone()];
        all.extend(others);
        let result = dependency_tree(&all, &rels);
        let coupled = result["coupling_metrics"]["highly_coupled"].as_array().unwrap();
        assert!(
            coupled.iter().any(|v| v.as_str().unwrap() == hub.id.to_string()),
            "fan-in 6 must flag the hub"
        );
    }

    #[test]
    fn test_complexity_buckets() {
        let nodes = vec![
            node("low", "a.py", Some(2)),
            node("mid", "a.py", Some(5)),
            node("high", "a.py", Some(9)),
            node("unscored", "a.py", None),
        ];
        let result = complexity_analysis(&nodes);
        assert_eq!(result["complexity_distribution"]["low"], json!(1));
        assert_eq!(result["complexity_distribution"]["medium"], json!(1));
        assert_eq!(result["complexity_distribution"]["high"], json!(1));
        let avg = result["average_complexity"].as_f64().unwrap();
        assert!((avg - 16.0 / 3.0).abs() < 1e-9);
        let high = result["high_complexity_nodes"].as_array().unwrap();
        assert_eq!(high.len(), 1);
        assert_eq!(high[0]["name"], json!("high"));
    }

    #[test]
    fn test_hotspot_scoring_formula() {
        let x = node("X", "x.py", Some(8));
        let mut nodes = vec![x.clone()];
        let mut rels = Vec::new();
        for i in 0..10 {
            let caller = node(&format!("in{i}"), "y.py", None);
            rels.push(edge(&caller, &x, RelationKind::Calls));
            nodes.push(caller);
        }
        for i in 0..2 {
            let callee = node(&format!("out{i}"), "z.py", None);
            rels.push(edge(&x, &callee, RelationKind::Calls));
            nodes.push(callee);
        }

        let result = hotspots(&nodes, &rels);
        let list = result["hotspots"].as_array().unwrap();
        assert!(list.len() <= 20);
        let entry = list
            .iter()
            .find(|h| h["name"] == json!("X"))
            .expect("X must appear in the hotspot list");
        assert_eq!(entry["hotspot_score"], json!(2 * 10 + 2 + 3 * 8));
        assert_eq!(entry["incoming_refs"], json!(10));
        assert_eq!(entry["outgoing_refs"], json!(2));
    }

    #[test]
    fn test_modularity_bounds() {
        let a = node("a", "same.py", None);
        let b = node("b", "same.py", None);
        let c = node("c", "other.py", None);

        assert_eq!(modularity_score(&[a.clone(), b.clone()], &[]), 1.0);

        let internal = edge(&a, &b, RelationKind::Calls);
        let external = edge(&a, &c, RelationKind::Calls);
        let nodes = [a, b, c];
        let score = modularity_score(&nodes, &[internal.clone(), external]);
        assert!((0.0..=1.0).contains(&score));
        assert!((score - 0.5).abs() < 1e-9);

        let all_internal = modularity_score(&nodes, &[internal]);
        assert_eq!(all_internal, 1.0);
    }

    #[test]
    fn test_architecture_directory_map() {
        let mut f1 = node("app.py", "src/app.py", None);
        f1.node_kind = NodeKind::File;
        let mut f2 = node("util.py", "src/util.py", None);
        f2.node_kind = NodeKind::File;
        let mut f3 = node("main.go", "main.go", None);
        f3.node_kind = NodeKind::File;
        f3.language = "go".to_string();

        let result = architecture_overview(&[f1, f2, f3], &[]);
        assert_eq!(result["file_structure"]["src"]["files"], json!(2));
        assert_eq!(result["file_structure"]["."]["files"], json!(1));
        assert_eq!(result["file_structure"]["."]["languages"], json!(["go"]));
        assert_eq!(result["modularity_score"], json!(1.0));
    }
}
