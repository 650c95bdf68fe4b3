//! End-to-end pipeline tests: parse fixture trees through the full
//! orchestrator against an in-memory store, then check the persisted graph.

use chrono::Utc;
use codegraph::analyzer;
use codegraph::ingest::IngestService;
use codegraph::progress::{ProgressEvent, ProgressHub};
use codegraph::query::{QueryEngine, NODE_LIMIT};
use codegraph::store::{GraphStore, SqliteStore};
use codegraph::types::{
    GraphQuery, Node, NodeKind, ParseRequest, ParsingStatus, RelationKind, Relationship,
    Repository, Source, SourceKind,
};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (rel, content) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }
}

fn make_service() -> (Arc<IngestService>, Arc<dyn GraphStore>, Arc<ProgressHub>) {
    let store: Arc<dyn GraphStore> = Arc::new(SqliteStore::in_memory().unwrap());
    let hub = Arc::new(ProgressHub::new());
    let service = Arc::new(IngestService::new(Arc::clone(&store), Arc::clone(&hub)));
    (service, store, hub)
}

fn local_request(name: &str, root: &Path) -> ParseRequest {
    serde_json::from_value(json!({
        "name": name,
        "local_path": root.to_string_lossy(),
    }))
    .unwrap()
}

/// Seed a bare source + repository for tests that bypass the orchestrator.
fn seed_repository(store: &dyn GraphStore) -> Uuid {
    let source = Source {
        id: Uuid::new_v4(),
        source_kind: SourceKind::ProjectRepository,
        external_source_id: None,
        external_project_id: None,
        name: "seeded".to_string(),
        repository_url: None,
        branch_name: "main".to_string(),
        local_path: Some("/tmp/seeded".to_string()),
        parsing_status: ParsingStatus::Completed,
        parsing_started_at: None,
        parsing_completed_at: None,
        parsing_error: None,
        total_files_found: 0,
        total_files_parsed: 0,
        total_nodes_created: 0,
        total_relationships_created: 0,
        detected_languages: vec![],
        metadata: json!({}),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    store.insert_source(&source).unwrap();
    let repository = Repository {
        id: Uuid::new_v4(),
        source_id: source.id,
        name: "seeded".to_string(),
        repository_url: None,
        branch_name: "main".to_string(),
        commit_hash: None,
        primary_language: None,
        all_languages: vec![],
        directory_structure: json!({}),
        total_files: 0,
        parsed_files: 0,
        skipped_files: 0,
        error_files: 0,
        parsing_duration_seconds: None,
        avg_parse_time_per_file_ms: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    store.insert_repository(&repository).unwrap();
    repository.id
}

fn synthetic_node(repo: Uuid, name: &str, file: &str, complexity: Option<u8>) -> Node {
    Node {
        id: Uuid::new_v4(),
        repository_id: repo,
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

// ---------------------------------------------------------------------------
// Scenario: Python mini-repo
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_python_mini_repo_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(
        dir.path(),
        &[
            ("a.py", "class Foo:\n    def bar(self): pass\n"),
            ("b.py", "from a import Foo\nclass Baz(Foo):\n    pass\n"),
        ],
    );

    let (service, store, _) = make_service();
    let result = service.parse_repository(local_request("mini", dir.path())).await;
    assert!(result.success, "parse failed: {:?}", result.error);

    let source = store.get_source(result.source_id.unwrap()).unwrap().unwrap();
    assert_eq!(source.parsing_status, ParsingStatus::Completed);
    assert!(source.total_nodes_created >= 6);

    let repository_id = result.repository_id.unwrap();
    let repository = store.get_repository(repository_id).unwrap().unwrap();
    assert_eq!(repository.total_files, 2);
    assert_eq!(repository.primary_language.as_deref(), Some("python"));

    let engine = QueryEngine::new(Arc::clone(&store));
    let (nodes, relationships) = engine.fetch_graph(repository_id).unwrap();

    let by_kind = |kind: NodeKind| nodes.iter().filter(|n| n.node_kind == kind).count();
    assert_eq!(by_kind(NodeKind::File), 2, "one file node per processed file");
    assert_eq!(by_kind(NodeKind::Class), 2);
    assert_eq!(by_kind(NodeKind::Function), 1);
    assert_eq!(by_kind(NodeKind::Import), 1);

    let find = |kind: NodeKind, name: &str| {
        nodes
            .iter()
            .find(|n| n.node_kind == kind && n.name == name)
            .unwrap_or_else(|| panic!("missing {kind:?} {name}"))
    };
    let file_a = find(NodeKind::File, "a.py");
    let file_b = find(NodeKind::File, "b.py");
    let foo = find(NodeKind::Class, "Foo");
    let baz = find(NodeKind::Class, "Baz");
    let bar = find(NodeKind::Function, "bar");
    let import_a = find(NodeKind::Import, "a");

    let has_edge = |src: Uuid, dst: Uuid, kind: RelationKind, confidence: f64| {
        relationships.iter().any(|r| {
            r.source_node_id == src
                && r.target_node_id == dst
                && r.relation_kind == kind
                && (r.confidence_score - confidence).abs() < 1e-9
        })
    };

    assert!(has_edge(file_a.id, foo.id, RelationKind::Contains, 1.0), "a.py contains Foo");
    assert!(has_edge(foo.id, bar.id, RelationKind::Contains, 1.0), "Foo contains bar");
    assert!(has_edge(file_b.id, baz.id, RelationKind::Contains, 1.0), "b.py contains Baz");
    assert!(has_edge(file_b.id, import_a.id, RelationKind::Imports, 1.0), "b.py imports a");
    assert!(has_edge(baz.id, foo.id, RelationKind::Inherits, 0.9), "Baz inherits Foo");
    assert!(
        has_edge(import_a.id, file_a.id, RelationKind::Imports, 0.7),
        "cross-file import(a) -> a.py"
    );

    // Invariants: one contains in-edge per non-file node, endpoints in-repo,
    // complexity within bounds
    let node_ids: HashSet<Uuid> = nodes.iter().map(|n| n.id).collect();
    for relationship in &relationships {
        assert!(node_ids.contains(&relationship.source_node_id));
        assert!(node_ids.contains(&relationship.target_node_id));
        assert!((0.0..=1.0).contains(&relationship.confidence_score));
    }
    for node in nodes.iter().filter(|n| n.node_kind != NodeKind::File) {
        let contains_in = relationships
            .iter()
            .filter(|r| r.relation_kind == RelationKind::Contains && r.target_node_id == node.id)
            .count();
        assert_eq!(contains_in, 1, "{} must have exactly one contains in-edge", node.name);
    }
    for node in &nodes {
        if let Some(score) = node.complexity_score {
            assert!((1..=10).contains(&score), "{} complexity {score} out of range", node.name);
        }
    }
}

// ---------------------------------------------------------------------------
// Scenario: cancellation mid-parse
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancellation_between_files() {
    let dir = tempfile::tempdir().unwrap();
    let body = "def handler(value):\n    if value:\n        return value\n    return None\n";
    let files: Vec<(String, String)> = (0..1000)
        .map(|i| (format!("pkg/mod_{i:04}.py"), body.to_string()))
        .collect();
    let refs: Vec<(&str, &str)> =
        files.iter().map(|(p, c)| (p.as_str(), c.as_str())).collect();
    write_tree(dir.path(), &refs);

    let (service, store, hub) = make_service();
    let mut request = local_request("big", dir.path());
    request.enable_cross_file_refs = false;

    let parsing_id = service.start_parse(request).unwrap();
    let mut rx = hub.subscribe(parsing_id);

    // Wait for the first update, then cancel
    loop {
        match tokio::time::timeout(Duration::from_secs(30), rx.recv()).await {
            Ok(Ok(ProgressEvent::Update { .. })) => break,
            Ok(Ok(event)) => {
                assert!(!event.is_terminal(), "parse finished before an update arrived");
            }
            Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(e)) => panic!("event channel closed early: {e}"),
            Err(_) => panic!("no progress update within 30s"),
        }
    }
    assert!(service.cancel_parse(parsing_id), "task must be active");

    // Drain to the terminal event
    let terminal = loop {
        match tokio::time::timeout(Duration::from_secs(30), rx.recv()).await {
            Ok(Ok(event)) if event.is_terminal() => break event,
            Ok(Ok(_)) => continue,
            Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(e)) => panic!("channel closed without terminal event: {e}"),
            Err(_) => panic!("no terminal event within 30s"),
        }
    };
    assert!(
        matches!(terminal, ProgressEvent::Cancel {}),
        "terminal event must be cancel, got {terminal:?}"
    );

    // Source row ends failed with the distinguished message
    let source = store.get_source(parsing_id).unwrap().unwrap();
    assert_eq!(source.parsing_status, ParsingStatus::Failed);
    assert_eq!(source.parsing_error.as_deref(), Some("Parsing was cancelled by user"));

    // Nothing follows the terminal event
    match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
        Ok(Err(_)) | Err(_) => {}
        Ok(Ok(event)) => panic!("unexpected event after terminal: {event:?}"),
    }
}

// ---------------------------------------------------------------------------
// Scenario: query cap
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_query_cap_on_large_repository() {
    let (_, store, _) = make_service();
    let repo = seed_repository(&*store);

    let nodes: Vec<Node> = (0..3000)
        .map(|i| synthetic_node(repo, &format!("fn_{i}"), &format!("f{}.py", i % 40), None))
        .collect();
    for chunk in nodes.chunks(500) {
        store.insert_nodes(chunk).unwrap();
    }

    let relationships: Vec<Relationship> = (0..20_000)
        .map(|i| {
            let src = &nodes[(i * 7919) % nodes.len()];
            let dst = &nodes[(i * 104_729 + 1) % nodes.len()];
            Relationship::new(src.id, dst.id, RelationKind::Uses, 0.6, json!({}))
        })
        .collect();
    for chunk in relationships.chunks(2000) {
        store.insert_relationships(chunk).unwrap();
    }

    let engine = QueryEngine::new(Arc::clone(&store));
    let result = engine
        .query_graph(&GraphQuery {
            repository_id: repo,
            start_node_id: None,
            end_node_id: None,
            relationship_kinds: vec![],
            max_depth: 3,
            node_kinds: None,
            language_filter: None,
            include_properties: false,
        })
        .unwrap();

    assert!(result.total_nodes <= NODE_LIMIT, "cap exceeded: {}", result.total_nodes);
    let ids: HashSet<Uuid> = result.nodes.iter().map(|n| n.id).collect();
    for relationship in &result.relationships {
        assert!(ids.contains(&relationship.source_node_id));
        assert!(ids.contains(&relationship.target_node_id));
    }
    let mut seen = HashSet::new();
    for relationship in &result.relationships {
        assert!(seen.insert(relationship.id), "duplicate relationship in result");
    }
}

// ---------------------------------------------------------------------------
// Scenario: cycle detection through the analyzer
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_dependency_cycle_analysis() {
    let (_, store, _) = make_service();
    let repo = seed_repository(&*store);

    let a = synthetic_node(repo, "A", "a.py", None);
    let b = synthetic_node(repo, "B", "b.py", None);
    let c = synthetic_node(repo, "C", "c.py", None);
    store.insert_nodes(&[a.clone(), b.clone(), c.clone()]).unwrap();
    store
        .insert_relationships(&[
            Relationship::new(a.id, b.id, RelationKind::DependsOn, 1.0, json!({})),
            Relationship::new(b.id, c.id, RelationKind::DependsOn, 1.0, json!({})),
            Relationship::new(c.id, a.id, RelationKind::DependsOn, 1.0, json!({})),
        ])
        .unwrap();

    let analysis = analyzer::run_analysis(
        Arc::clone(&store),
        repo,
        codegraph::types::AnalysisKind::DependencyTree,
        json!({}),
    )
    .unwrap();

    let cycles = analysis.results["circular_dependencies"].as_array().unwrap();
    assert!(!cycles.is_empty(), "inserted cycle must be detected");
    let expected: HashSet<String> =
        [a.id, b.id, c.id].iter().map(|u| u.to_string()).collect();
    let found = cycles.iter().any(|cycle| {
        let set: HashSet<String> = cycle
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        set == expected
    });
    assert!(found, "no cycle with the inserted vertex set: {cycles:?}");
}

// ---------------------------------------------------------------------------
// Scenario: hotspot scoring through the analyzer
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_hotspot_analysis_scores_and_ranks() {
    let (_, store, _) = make_service();
    let repo = seed_repository(&*store);

    let hot = synthetic_node(repo, "X", "x.py", Some(8));
    let mut nodes = vec![hot.clone()];
    let mut relationships = Vec::new();
    for i in 0..10 {
        let caller = synthetic_node(repo, &format!("in_{i}"), "callers.py", None);
        relationships.push(Relationship::new(
            caller.id,
            hot.id,
            RelationKind::Calls,
            0.8,
            json!({}),
        ));
        nodes.push(caller);
    }
    for i in 0..2 {
        let callee = synthetic_node(repo, &format!("out_{i}"), "callees.py", None);
        relationships.push(Relationship::new(
            hot.id,
            callee.id,
            RelationKind::Calls,
            0.8,
            json!({}),
        ));
        nodes.push(callee);
    }
    store.insert_nodes(&nodes).unwrap();
    store.insert_relationships(&relationships).unwrap();

    let analysis = analyzer::run_analysis(
        Arc::clone(&store),
        repo,
        codegraph::types::AnalysisKind::Hotspots,
        json!({}),
    )
    .unwrap();

    let hotspots = analysis.results["hotspots"].as_array().unwrap();
    assert!(hotspots.len() <= 20);
    let entry = hotspots
        .iter()
        .find(|h| h["name"] == json!("X"))
        .expect("X must rank as a hotspot");
    assert_eq!(entry["hotspot_score"], json!(46), "2*10 + 2 + 3*8");
}

// ---------------------------------------------------------------------------
// Scenario: architecture analysis on a parsed tree
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_architecture_analysis_after_parse() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(
        dir.path(),
        &[
            ("src/app.py", "from util import helper\n\ndef run():\n    return helper()\n"),
            ("src/util.py", "def helper():\n    return 1\n"),
        ],
    );

    let (service, store, _) = make_service();
    let result = service.parse_repository(local_request("arch", dir.path())).await;
    assert!(result.success, "{:?}", result.error);
    let repository_id = result.repository_id.unwrap();

    let analysis = analyzer::run_analysis(
        Arc::clone(&store),
        repository_id,
        codegraph::types::AnalysisKind::ArchitectureOverview,
        json!({}),
    )
    .unwrap();

    let modularity = analysis.results["modularity_score"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&modularity), "modularity {modularity} out of range");
    assert_eq!(analysis.results["file_structure"]["src"]["files"], json!(2));

    // The statistics in the terminal event and here come from the store
    let stats = result.statistics.unwrap();
    assert_eq!(stats["streaming_storage"], json!(true));
    let stored_nodes = stats["stored_nodes"].as_i64().unwrap();
    assert_eq!(stored_nodes, store.count_nodes(repository_id).unwrap());
}

// ---------------------------------------------------------------------------
// Scenario: filter rejection during a real parse
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_filtered_files_never_reach_the_graph() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(
        dir.path(),
        &[
            ("src/main/app.py", "def main():\n    pass\n"),
            ("node_modules/x/index.js", "module.exports = 1;\n"),
            ("tests/test_app.py", "def test_main():\n    pass\n"),
            ("config.yaml", "key: value\n"),
        ],
    );

    let (service, store, _) = make_service();
    let result = service.parse_repository(local_request("filtered", dir.path())).await;
    assert!(result.success, "{:?}", result.error);

    let engine = QueryEngine::new(Arc::clone(&store));
    let (nodes, _) = engine.fetch_graph(result.repository_id.unwrap()).unwrap();
    let paths: HashMap<&str, usize> =
        nodes.iter().fold(HashMap::new(), |mut acc, n| {
            *acc.entry(n.file_path.as_str()).or_default() += 1;
            acc
        });

    assert!(paths.contains_key("src/main/app.py"));
    assert!(!paths.keys().any(|p| p.contains("node_modules")), "dependency dirs are excluded");
    assert!(!paths.keys().any(|p| p.contains("test_app")), "python test files are excluded");
    assert!(!paths.keys().any(|p| p.ends_with(".yaml")), "config extensions are excluded");
}
