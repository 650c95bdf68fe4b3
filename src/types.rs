use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Kind enums
// ---------------------------------------------------------------------------

/// Where a parse job's content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    CrawledContent,
    ProjectRepository,
    UploadedFile,
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::CrawledContent => "crawled_content",
            SourceKind::ProjectRepository => "project_repository",
            SourceKind::UploadedFile => "uploaded_file",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "crawled_content" => Some(SourceKind::CrawledContent),
            "project_repository" => Some(SourceKind::ProjectRepository),
            "uploaded_file" => Some(SourceKind::UploadedFile),
            _ => None,
        }
    }
}

/// Lifecycle of a parse job: `pending → processing → (completed | failed)`.
/// Cancellation is a terminal `failed` with a distinguished error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Disabled,
}

impl ParsingStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ParsingStatus::Pending => "pending",
            ParsingStatus::Processing => "processing",
            ParsingStatus::Completed => "completed",
            ParsingStatus::Failed => "failed",
            ParsingStatus::Disabled => "disabled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ParsingStatus::Pending),
            "processing" => Some(ParsingStatus::Processing),
            "completed" => Some(ParsingStatus::Completed),
            "failed" => Some(ParsingStatus::Failed),
            "disabled" => Some(ParsingStatus::Disabled),
            _ => None,
        }
    }
}

/// The kind of a code entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Class,
    Function,
    Method,
    Variable,
    Import,
    Interface,
    Enum,
    Module,
    Namespace,
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Class => "class",
            NodeKind::Function => "function",
            NodeKind::Method => "method",
            NodeKind::Variable => "variable",
            NodeKind::Import => "import",
            NodeKind::Interface => "interface",
            NodeKind::Enum => "enum",
            NodeKind::Module => "module",
            NodeKind::Namespace => "namespace",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(NodeKind::File),
            "class" => Some(NodeKind::Class),
            "function" => Some(NodeKind::Function),
            "method" => Some(NodeKind::Method),
            "variable" => Some(NodeKind::Variable),
            "import" => Some(NodeKind::Import),
            "interface" => Some(NodeKind::Interface),
            "enum" => Some(NodeKind::Enum),
            "module" => Some(NodeKind::Module),
            "namespace" => Some(NodeKind::Namespace),
            _ => None,
        }
    }
}

/// The kind of a directed edge between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Calls,
    Inherits,
    Imports,
    Uses,
    Defines,
    Contains,
    DependsOn,
    Implements,
    Extends,
}

impl RelationKind {
    pub fn label(&self) -> &'static str {
        match self {
            RelationKind::Calls => "calls",
            RelationKind::Inherits => "inherits",
            RelationKind::Imports => "imports",
            RelationKind::Uses => "uses",
            RelationKind::Defines => "defines",
            RelationKind::Contains => "contains",
            RelationKind::DependsOn => "depends_on",
            RelationKind::Implements => "implements",
            RelationKind::Extends => "extends",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "calls" => Some(RelationKind::Calls),
            "inherits" => Some(RelationKind::Inherits),
            "imports" => Some(RelationKind::Imports),
            "uses" => Some(RelationKind::Uses),
            "defines" => Some(RelationKind::Defines),
            "contains" => Some(RelationKind::Contains),
            "depends_on" => Some(RelationKind::DependsOn),
            "implements" => Some(RelationKind::Implements),
            "extends" => Some(RelationKind::Extends),
            _ => None,
        }
    }
}

/// Supported graph analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    DependencyTree,
    ComplexityAnalysis,
    Hotspots,
    ArchitectureOverview,
}

impl AnalysisKind {
    pub fn label(&self) -> &'static str {
        match self {
            AnalysisKind::DependencyTree => "dependency_tree",
            AnalysisKind::ComplexityAnalysis => "complexity_analysis",
            AnalysisKind::Hotspots => "hotspots",
            AnalysisKind::ArchitectureOverview => "architecture_overview",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "dependency_tree" => Some(AnalysisKind::DependencyTree),
            "complexity_analysis" => Some(AnalysisKind::ComplexityAnalysis),
            "hotspots" => Some(AnalysisKind::Hotspots),
            "architecture_overview" => Some(AnalysisKind::ArchitectureOverview),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted rows
// ---------------------------------------------------------------------------

/// Top-level handle for a parse job.
///
/// At least one of `external_source_id`, `external_project_id`, `local_path`
/// must be set; the orchestrator substitutes the remote URL into `local_path`
/// when nothing else is available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub source_kind: SourceKind,
    pub external_source_id: Option<String>,
    pub external_project_id: Option<Uuid>,
    pub name: String,
    pub repository_url: Option<String>,
    pub branch_name: String,
    pub local_path: Option<String>,
    pub parsing_status: ParsingStatus,
    pub parsing_started_at: Option<DateTime<Utc>>,
    pub parsing_completed_at: Option<DateTime<Utc>>,
    pub parsing_error: Option<String>,
    pub total_files_found: i64,
    pub total_files_parsed: i64,
    pub total_nodes_created: i64,
    pub total_relationships_created: i64,
    pub detected_languages: Vec<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A parsed snapshot, bound 1:1 to a [`Source`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: Uuid,
    pub source_id: Uuid,
    pub name: String,
    pub repository_url: Option<String>,
    pub branch_name: String,
    pub commit_hash: Option<String>,
    pub primary_language: Option<String>,
    pub all_languages: Vec<String>,
    pub directory_structure: Value,
    pub total_files: i64,
    pub parsed_files: i64,
    pub skipped_files: i64,
    pub error_files: i64,
    pub parsing_duration_seconds: Option<i64>,
    pub avg_parse_time_per_file_ms: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A code entity in the graph. Kind-specific metadata goes in `properties`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: Uuid,
    pub repository_id: Uuid,
    pub node_kind: NodeKind,
    pub name: String,
    /// `<file_path>::<local_name>` for non-file nodes, the path itself for files.
    pub fully_qualified_name: String,
    pub file_path: String,
    pub line_start: Option<u32>,
    pub line_end: Option<u32>,
    pub column_start: Option<u32>,
    pub column_end: Option<u32>,
    pub language: String,
    pub properties: Value,
    pub source_code: Option<String>,
    pub docstring: Option<String>,
    /// 1–10 when complexity scoring is enabled for the language.
    pub complexity_score: Option<u8>,
    pub is_public: bool,
    pub is_exported: bool,
}

/// A directed, typed edge between two nodes, annotated with the implementer's
/// confidence in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: Uuid,
    pub source_node_id: Uuid,
    pub target_node_id: Uuid,
    pub relation_kind: RelationKind,
    pub confidence_score: f64,
    pub call_count: Option<i64>,
    pub is_direct: bool,
    pub context: Value,
}

impl Relationship {
    /// Edge with empty context and no call count, direct by default.
    pub fn new(
        source: Uuid,
        target: Uuid,
        kind: RelationKind,
        confidence: f64,
        context: Value,
    ) -> Self {
        Relationship {
            id: Uuid::new_v4(),
            source_node_id: source,
            target_node_id: target,
            relation_kind: kind,
            confidence_score: confidence,
            call_count: None,
            is_direct: true,
            context,
        }
    }
}

/// Cached analysis result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub id: Uuid,
    pub repository_id: Uuid,
    pub analysis_kind: AnalysisKind,
    pub parameters: Value,
    pub results: Value,
    pub execution_time_ms: i64,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

fn default_source_kind() -> SourceKind {
    SourceKind::ProjectRepository
}
fn default_branch() -> String {
    "main".to_string()
}
fn default_max_file_size_kb() -> u64 {
    500
}
fn default_parse_timeout_seconds() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_max_depth() -> u32 {
    3
}

/// Request to parse a repository into a knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseRequest {
    #[serde(default = "default_source_kind")]
    pub source_kind: SourceKind,
    pub name: String,
    #[serde(default)]
    pub repository_url: Option<String>,
    #[serde(default)]
    pub local_path: Option<String>,
    #[serde(default = "default_branch")]
    pub branch_name: String,
    #[serde(default)]
    pub external_source_id: Option<String>,
    #[serde(default)]
    pub external_project_id: Option<Uuid>,
    /// Language allow-list; `None` parses every supported language.
    #[serde(default)]
    pub languages: Option<Vec<String>>,
    #[serde(default = "default_max_file_size_kb")]
    pub max_file_size_kb: u64,
    #[serde(default = "default_parse_timeout_seconds")]
    pub parse_timeout_seconds: u64,
    #[serde(default = "default_true")]
    pub enable_cross_file_refs: bool,
}

/// Outcome of a full repository parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseResult {
    pub success: bool,
    pub source_id: Option<Uuid>,
    pub repository_id: Option<Uuid>,
    pub message: String,
    pub statistics: Option<Value>,
    pub error: Option<String>,
}

/// Outcome of parsing a single file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileParseResult {
    pub file_path: String,
    pub language: String,
    pub success: bool,
    pub nodes_extracted: usize,
    pub relationships_extracted: usize,
    pub parse_time_ms: u64,
    pub error: Option<String>,
}

/// Graph traversal query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphQuery {
    pub repository_id: Uuid,
    #[serde(default)]
    pub start_node_id: Option<Uuid>,
    #[serde(default)]
    pub end_node_id: Option<Uuid>,
    #[serde(default)]
    pub relationship_kinds: Vec<RelationKind>,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default)]
    pub node_kinds: Option<Vec<NodeKind>>,
    #[serde(default)]
    pub language_filter: Option<String>,
    #[serde(default)]
    pub include_properties: bool,
}

/// Result envelope for [`GraphQuery`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphQueryResult {
    pub nodes: Vec<Node>,
    pub relationships: Vec<Relationship>,
    pub total_nodes: usize,
    pub total_relationships: usize,
    pub query_parameters: Value,
}

/// Complexity summary over a repository's scored nodes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComplexityStats {
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
}

/// Aggregate statistics for a repository's graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_relationships: usize,
    pub nodes_by_kind: BTreeMap<String, usize>,
    pub relationships_by_kind: BTreeMap<String, usize>,
    pub languages: BTreeMap<String, usize>,
    pub complexity_stats: Option<ComplexityStats>,
    pub files_analyzed: usize,
    pub cross_file_relationships: usize,
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// One per-file error record, bounded to the last 10 in progress events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileError {
    pub file_path: String,
    pub error: String,
}

/// Snapshot of a running parse, carried by progress events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsingProgress {
    pub source_id: Uuid,
    pub status: ParsingStatus,
    pub total_files: usize,
    pub processed_files: usize,
    pub current_file: Option<String>,
    pub nodes_created: usize,
    pub relationships_created: usize,
    pub errors: Vec<FileError>,
    pub start_time: DateTime<Utc>,
    pub estimated_completion: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Filter statistics
// ---------------------------------------------------------------------------

/// Filtering outcome summary, reported alongside parse statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterStatistics {
    pub total_files_found: usize,
    pub files_included_for_parsing: usize,
    pub files_excluded_from_parsing: usize,
    pub inclusion_rate_percent: f64,
    pub exclusion_rate_percent: f64,
    pub max_file_size_kb: u64,
    pub excluded_extensions_count: usize,
    pub excluded_patterns_count: usize,
    pub excluded_directories_count: usize,
}
