//! Persistence behind a narrow row-insertion and table-query interface.
//!
//! The core only ever talks to [`GraphStore`]; the bundled SQLite
//! implementation keeps the whole pipeline self-contained, while the trait
//! keeps the store swappable for a remote client.

use crate::error::{KgError, Result};
use crate::types::{
    Analysis, Node, NodeKind, ParsingStatus, RelationKind, Relationship, Repository, Source,
    SourceKind,
};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

/// Default chunk size for bulk inserts.
pub const BULK_BATCH_SIZE: usize = 50;
/// Smaller chunk size used by the streaming per-file path.
pub const STREAM_BATCH_SIZE: usize = 25;

// ---------------------------------------------------------------------------
// GraphStore trait
// ---------------------------------------------------------------------------

/// Narrow store interface consumed by the orchestrator, query engine and
/// analyzer. Implementations must be independently thread-safe.
pub trait GraphStore: Send + Sync {
    fn insert_source(&self, source: &Source) -> Result<()>;
    fn get_source(&self, id: Uuid) -> Result<Option<Source>>;
    /// Update lifecycle status; `processing` stamps the started-at time,
    /// terminal states stamp completed-at. Totals update the running counters.
    fn update_source_status(
        &self,
        id: Uuid,
        status: ParsingStatus,
        error: Option<&str>,
        totals: Option<(i64, i64)>,
    ) -> Result<()>;

    fn insert_repository(&self, repository: &Repository) -> Result<()>;
    fn get_repository(&self, id: Uuid) -> Result<Option<Repository>>;
    fn list_repositories(&self) -> Result<Vec<Repository>>;
    /// Delete a repository; nodes, relationships and analyses cascade.
    fn delete_repository(&self, id: Uuid) -> Result<bool>;
    fn update_repository_statistics(
        &self,
        id: Uuid,
        total_files: i64,
        parsed_files: i64,
        error_files: i64,
        parsing_duration_seconds: i64,
        avg_parse_time_per_file_ms: f64,
    ) -> Result<()>;

    /// Insert one batch of nodes; all-or-nothing per call.
    fn insert_nodes(&self, nodes: &[Node]) -> Result<usize>;
    /// Insert one batch of relationships; all-or-nothing per call.
    fn insert_relationships(&self, relationships: &[Relationship]) -> Result<usize>;

    fn nodes_for_repository(
        &self,
        repository_id: Uuid,
        kinds: Option<&[NodeKind]>,
        language: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Node>>;
    /// All relationships touching any of `node_ids` (as source or target),
    /// optionally restricted by kind. Callers chunk the id list.
    fn relationships_touching(
        &self,
        node_ids: &[Uuid],
        kinds: Option<&[RelationKind]>,
    ) -> Result<Vec<Relationship>>;
    fn count_nodes(&self, repository_id: Uuid) -> Result<i64>;
    fn count_relationships(&self, repository_id: Uuid) -> Result<i64>;

    fn insert_analysis(&self, analysis: &Analysis) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Batched sink
// ---------------------------------------------------------------------------

/// Insert nodes in chunks. Each batch is attempted independently; a failed
/// batch is logged and skipped so one bad row cannot abort a parse job.
/// Returns the number of rows actually accepted.
pub fn store_nodes_batched(store: &dyn GraphStore, nodes: &[Node], batch_size: usize) -> usize {
    let mut accepted = 0;
    for chunk in nodes.chunks(batch_size.max(1)) {
        match store.insert_nodes(chunk) {
            Ok(n) => accepted += n,
            Err(e) => warn!(batch = chunk.len(), error = %e, "Node batch skipped"),
        }
    }
    accepted
}

/// Relationship counterpart of [`store_nodes_batched`].
pub fn store_relationships_batched(
    store: &dyn GraphStore,
    relationships: &[Relationship],
    batch_size: usize,
) -> usize {
    let mut accepted = 0;
    for chunk in relationships.chunks(batch_size.max(1)) {
        match store.insert_relationships(chunk) {
            Ok(n) => accepted += n,
            Err(e) => warn!(batch = chunk.len(), error = %e, "Relationship batch skipped"),
        }
    }
    accepted
}

// ---------------------------------------------------------------------------
// SQLite implementation
// ---------------------------------------------------------------------------

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kg_sources (
    id TEXT PRIMARY KEY,
    source_kind TEXT NOT NULL,
    external_source_id TEXT,
    external_project_id TEXT,
    name TEXT NOT NULL,
    repository_url TEXT,
    branch_name TEXT NOT NULL DEFAULT 'main',
    local_path TEXT,
    parsing_status TEXT NOT NULL DEFAULT 'pending',
    parsing_started_at TEXT,
    parsing_completed_at TEXT,
    parsing_error TEXT,
    total_files_found INTEGER NOT NULL DEFAULT 0,
    total_files_parsed INTEGER NOT NULL DEFAULT 0,
    total_nodes_created INTEGER NOT NULL DEFAULT 0,
    total_relationships_created INTEGER NOT NULL DEFAULT 0,
    detected_languages TEXT NOT NULL DEFAULT '[]',
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK (external_source_id IS NOT NULL
        OR external_project_id IS NOT NULL
        OR local_path IS NOT NULL)
);

CREATE TABLE IF NOT EXISTS kg_repositories (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES kg_sources(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    repository_url TEXT,
    branch_name TEXT NOT NULL DEFAULT 'main',
    commit_hash TEXT,
    primary_language TEXT,
    all_languages TEXT NOT NULL DEFAULT '[]',
    directory_structure TEXT NOT NULL DEFAULT '{}',
    total_files INTEGER NOT NULL DEFAULT 0,
    parsed_files INTEGER NOT NULL DEFAULT 0,
    skipped_files INTEGER NOT NULL DEFAULT 0,
    error_files INTEGER NOT NULL DEFAULT 0,
    parsing_duration_seconds INTEGER,
    avg_parse_time_per_file_ms REAL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS kg_nodes (
    id TEXT PRIMARY KEY,
    repository_id TEXT NOT NULL REFERENCES kg_repositories(id) ON DELETE CASCADE,
    node_kind TEXT NOT NULL,
    name TEXT NOT NULL,
    fully_qualified_name TEXT NOT NULL,
    file_path TEXT NOT NULL,
    line_start INTEGER,
    line_end INTEGER,
    column_start INTEGER,
    column_end INTEGER,
    language TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}',
    source_code TEXT,
    docstring TEXT,
    complexity_score INTEGER,
    is_public INTEGER NOT NULL DEFAULT 1,
    is_exported INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS kg_relationships (
    id TEXT PRIMARY KEY,
    source_node_id TEXT NOT NULL REFERENCES kg_nodes(id) ON DELETE CASCADE,
    target_node_id TEXT NOT NULL REFERENCES kg_nodes(id) ON DELETE CASCADE,
    relation_kind TEXT NOT NULL,
    confidence_score REAL NOT NULL DEFAULT 1.0,
    call_count INTEGER,
    is_direct INTEGER NOT NULL DEFAULT 1,
    context TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS kg_analyses (
    id TEXT PRIMARY KEY,
    repository_id TEXT NOT NULL REFERENCES kg_repositories(id) ON DELETE CASCADE,
    analysis_kind TEXT NOT NULL,
    parameters TEXT NOT NULL DEFAULT '{}',
    results TEXT NOT NULL,
    execution_time_ms INTEGER,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_kg_nodes_repository ON kg_nodes(repository_id);
CREATE INDEX IF NOT EXISTS idx_kg_nodes_repo_kind ON kg_nodes(repository_id, node_kind);
CREATE INDEX IF NOT EXISTS idx_kg_relationships_source ON kg_relationships(source_node_id);
CREATE INDEX IF NOT EXISTS idx_kg_relationships_target ON kg_relationships(target_node_id);
";

const NODE_COLUMNS: &str = "id, repository_id, node_kind, name, fully_qualified_name, file_path, \
     line_start, line_end, column_start, column_end, language, properties, source_code, \
     docstring, complexity_score, is_public, is_exported";

const RELATIONSHIP_COLUMNS: &str =
    "id, source_node_id, target_node_id, relation_kind, confidence_score, call_count, \
     is_direct, context";

const REPOSITORY_COLUMNS: &str = "id, source_id, name, repository_url, branch_name, commit_hash, \
     primary_language, all_languages, directory_structure, total_files, parsed_files, \
     skipped_files, error_files, parsing_duration_seconds, avg_parse_time_per_file_ms, \
     created_at, updated_at";

/// SQLite-backed [`GraphStore`]. The connection sits behind a `Mutex`, making
/// the store `Send + Sync` as the concurrency model requires.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        Ok(SqliteStore { conn: Mutex::new(conn) })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(SqliteStore { conn: Mutex::new(conn) })
    }

    fn init(conn: &Connection) -> Result<()> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| KgError::Store("connection lock poisoned".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Row conversion helpers
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct BadColumn(String);

impl std::fmt::Display for BadColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bad column value: {}", self.0)
    }
}

impl std::error::Error for BadColumn {}

fn conversion_err(what: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(BadColumn(what.to_string())))
}

fn col_uuid(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s).map_err(|_| conversion_err("uuid"))
}

fn col_opt_uuid(row: &Row, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        Some(s) => Uuid::parse_str(&s).map(Some).map_err(|_| conversion_err("uuid")),
        None => Ok(None),
    }
}

fn col_json(row: &Row, idx: usize) -> rusqlite::Result<Value> {
    let s: Option<String> = row.get(idx)?;
    Ok(s.and_then(|s| serde_json::from_str(&s).ok()).unwrap_or(Value::Null))
}

fn col_string_list(row: &Row, idx: usize) -> rusqlite::Result<Vec<String>> {
    let s: Option<String> = row.get(idx)?;
    Ok(s.and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default())
}

fn col_timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| conversion_err("timestamp"))
}

fn col_opt_timestamp(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        Some(s) => DateTime::parse_from_rfc3339(&s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|_| conversion_err("timestamp")),
        None => Ok(None),
    }
}

fn node_from_row(row: &Row) -> rusqlite::Result<Node> {
    let kind: String = row.get(2)?;
    Ok(Node {
        id: col_uuid(row, 0)?,
        repository_id: col_uuid(row, 1)?,
        node_kind: NodeKind::parse(&kind).ok_or_else(|| conversion_err("node_kind"))?,
        name: row.get(3)?,
        fully_qualified_name: row.get(4)?,
        file_path: row.get(5)?,
        line_start: row.get(6)?,
        line_end: row.get(7)?,
        column_start: row.get(8)?,
        column_end: row.get(9)?,
        language: row.get(10)?,
        properties: col_json(row, 11)?,
        source_code: row.get(12)?,
        docstring: row.get(13)?,
        complexity_score: row.get(14)?,
        is_public: row.get(15)?,
        is_exported: row.get(16)?,
    })
}

fn relationship_from_row(row: &Row) -> rusqlite::Result<Relationship> {
    let kind: String = row.get(3)?;
    Ok(Relationship {
        id: col_uuid(row, 0)?,
        source_node_id: col_uuid(row, 1)?,
        target_node_id: col_uuid(row, 2)?,
        relation_kind: RelationKind::parse(&kind).ok_or_else(|| conversion_err("relation_kind"))?,
        confidence_score: row.get(4)?,
        call_count: row.get(5)?,
        is_direct: row.get(6)?,
        context: col_json(row, 7)?,
    })
}

fn repository_from_row(row: &Row) -> rusqlite::Result<Repository> {
    Ok(Repository {
        id: col_uuid(row, 0)?,
        source_id: col_uuid(row, 1)?,
        name: row.get(2)?,
        repository_url: row.get(3)?,
        branch_name: row.get(4)?,
        commit_hash: row.get(5)?,
        primary_language: row.get(6)?,
        all_languages: col_string_list(row, 7)?,
        directory_structure: col_json(row, 8)?,
        total_files: row.get(9)?,
        parsed_files: row.get(10)?,
        skipped_files: row.get(11)?,
        error_files: row.get(12)?,
        parsing_duration_seconds: row.get(13)?,
        avg_parse_time_per_file_ms: row.get(14)?,
        created_at: col_timestamp(row, 15)?,
        updated_at: col_timestamp(row, 16)?,
    })
}

fn source_from_row(row: &Row) -> rusqlite::Result<Source> {
    let kind: String = row.get(1)?;
    let status: String = row.get(8)?;
    Ok(Source {
        id: col_uuid(row, 0)?,
        source_kind: SourceKind::parse(&kind).ok_or_else(|| conversion_err("source_kind"))?,
        external_source_id: row.get(2)?,
        external_project_id: col_opt_uuid(row, 3)?,
        name: row.get(4)?,
        repository_url: row.get(5)?,
        branch_name: row.get(6)?,
        local_path: row.get(7)?,
        parsing_status: ParsingStatus::parse(&status)
            .ok_or_else(|| conversion_err("parsing_status"))?,
        parsing_started_at: col_opt_timestamp(row, 9)?,
        parsing_completed_at: col_opt_timestamp(row, 10)?,
        parsing_error: row.get(11)?,
        total_files_found: row.get(12)?,
        total_files_parsed: row.get(13)?,
        total_nodes_created: row.get(14)?,
        total_relationships_created: row.get(15)?,
        detected_languages: col_string_list(row, 16)?,
        metadata: col_json(row, 17)?,
        created_at: col_timestamp(row, 18)?,
        updated_at: col_timestamp(row, 19)?,
    })
}

const SOURCE_COLUMNS: &str = "id, source_kind, external_source_id, external_project_id, name, \
     repository_url, branch_name, local_path, parsing_status, parsing_started_at, \
     parsing_completed_at, parsing_error, total_files_found, total_files_parsed, \
     total_nodes_created, total_relationships_created, detected_languages, metadata, \
     created_at, updated_at";

// ---------------------------------------------------------------------------
// GraphStore impl
// ---------------------------------------------------------------------------

impl GraphStore for SqliteStore {
    fn insert_source(&self, source: &Source) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO kg_sources ({SOURCE_COLUMNS}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)"),
            params![
                source.id.to_string(),
                source.source_kind.label(),
                source.external_source_id,
                source.external_project_id.map(|u| u.to_string()),
                source.name,
                source.repository_url,
                source.branch_name,
                source.local_path,
                source.parsing_status.label(),
                source.parsing_started_at.map(|t| t.to_rfc3339()),
                source.parsing_completed_at.map(|t| t.to_rfc3339()),
                source.parsing_error,
                source.total_files_found,
                source.total_files_parsed,
                source.total_nodes_created,
                source.total_relationships_created,
                serde_json::to_string(&source.detected_languages)?,
                source.metadata.to_string(),
                source.created_at.to_rfc3339(),
                source.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_source(&self, id: Uuid) -> Result<Option<Source>> {
        let conn = self.conn()?;
        let source = conn
            .query_row(
                &format!("SELECT {SOURCE_COLUMNS} FROM kg_sources WHERE id = ?1"),
                params![id.to_string()],
                source_from_row,
            )
            .optional()?;
        Ok(source)
    }

    fn update_source_status(
        &self,
        id: Uuid,
        status: ParsingStatus,
        error: Option<&str>,
        totals: Option<(i64, i64)>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn()?;
        conn.execute(
            "UPDATE kg_sources SET parsing_status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), status.label(), now],
        )?;
        match status {
            ParsingStatus::Processing => {
                conn.execute(
                    "UPDATE kg_sources SET parsing_started_at = ?2 WHERE id = ?1",
                    params![id.to_string(), now],
                )?;
            }
            ParsingStatus::Completed | ParsingStatus::Failed => {
                conn.execute(
                    "UPDATE kg_sources SET parsing_completed_at = ?2 WHERE id = ?1",
                    params![id.to_string(), now],
                )?;
            }
            _ => {}
        }
        if let Some(error) = error {
            conn.execute(
                "UPDATE kg_sources SET parsing_error = ?2 WHERE id = ?1",
                params![id.to_string(), error],
            )?;
        }
        if let Some((nodes, relationships)) = totals {
            conn.execute(
                "UPDATE kg_sources SET total_nodes_created = ?2, total_relationships_created = ?3 \
                 WHERE id = ?1",
                params![id.to_string(), nodes, relationships],
            )?;
        }
        Ok(())
    }

    fn insert_repository(&self, repository: &Repository) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!("INSERT INTO kg_repositories ({REPOSITORY_COLUMNS}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"),
            params![
                repository.id.to_string(),
                repository.source_id.to_string(),
                repository.name,
                repository.repository_url,
                repository.branch_name,
                repository.commit_hash,
                repository.primary_language,
                serde_json::to_string(&repository.all_languages)?,
                repository.directory_structure.to_string(),
                repository.total_files,
                repository.parsed_files,
                repository.skipped_files,
                repository.error_files,
                repository.parsing_duration_seconds,
                repository.avg_parse_time_per_file_ms,
                repository.created_at.to_rfc3339(),
                repository.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_repository(&self, id: Uuid) -> Result<Option<Repository>> {
        let conn = self.conn()?;
        let repository = conn
            .query_row(
                &format!("SELECT {REPOSITORY_COLUMNS} FROM kg_repositories WHERE id = ?1"),
                params![id.to_string()],
                repository_from_row,
            )
            .optional()?;
        Ok(repository)
    }

    fn list_repositories(&self) -> Result<Vec<Repository>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REPOSITORY_COLUMNS} FROM kg_repositories ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map([], repository_from_row)?;
        let mut repositories = Vec::new();
        for row in rows {
            repositories.push(row?);
        }
        Ok(repositories)
    }

    fn delete_repository(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn()?;
        let affected = conn
            .execute("DELETE FROM kg_repositories WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }

    fn update_repository_statistics(
        &self,
        id: Uuid,
        total_files: i64,
        parsed_files: i64,
        error_files: i64,
        parsing_duration_seconds: i64,
        avg_parse_time_per_file_ms: f64,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE kg_repositories SET total_files = ?2, parsed_files = ?3, error_files = ?4, \
             parsing_duration_seconds = ?5, avg_parse_time_per_file_ms = ?6, updated_at = ?7 \
             WHERE id = ?1",
            params![
                id.to_string(),
                total_files,
                parsed_files,
                error_files,
                parsing_duration_seconds,
                avg_parse_time_per_file_ms,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn insert_nodes(&self, nodes: &[Node]) -> Result<usize> {
        if nodes.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(KgError::from)?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO kg_nodes ({NODE_COLUMNS}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
            ))?;
            for node in nodes {
                stmt.execute(params![
                    node.id.to_string(),
                    node.repository_id.to_string(),
                    node.node_kind.label(),
                    node.name,
                    node.fully_qualified_name,
                    node.file_path,
                    node.line_start,
                    node.line_end,
                    node.column_start,
                    node.column_end,
                    node.language,
                    node.properties.to_string(),
                    node.source_code,
                    node.docstring,
                    node.complexity_score,
                    node.is_public,
                    node.is_exported,
                ])?;
            }
        }
        tx.commit()?;
        Ok(nodes.len())
    }

    fn insert_relationships(&self, relationships: &[Relationship]) -> Result<usize> {
        if relationships.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(KgError::from)?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO kg_relationships ({RELATIONSHIP_COLUMNS}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ))?;
            for relationship in relationships {
                stmt.execute(params![
                    relationship.id.to_string(),
                    relationship.source_node_id.to_string(),
                    relationship.target_node_id.to_string(),
                    relationship.relation_kind.label(),
                    relationship.confidence_score,
                    relationship.call_count,
                    relationship.is_direct,
                    relationship.context.to_string(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(relationships.len())
    }

    fn nodes_for_repository(
        &self,
        repository_id: Uuid,
        kinds: Option<&[NodeKind]>,
        language: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Node>> {
        let mut sql = format!("SELECT {NODE_COLUMNS} FROM kg_nodes WHERE repository_id = ?");
        let mut args: Vec<String> = vec![repository_id.to_string()];

        if let Some(kinds) = kinds.filter(|k| !k.is_empty()) {
            let placeholders = vec!["?"; kinds.len()].join(", ");
            sql.push_str(&format!(" AND node_kind IN ({placeholders})"));
            args.extend(kinds.iter().map(|k| k.label().to_string()));
        }
        if let Some(language) = language {
            sql.push_str(" AND language = ?");
            args.push(language.to_string());
        }
        sql.push_str(" ORDER BY file_path, line_start");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), node_from_row)?;
        let mut nodes = Vec::new();
        for row in rows {
            nodes.push(row?);
        }
        Ok(nodes)
    }

    fn relationships_touching(
        &self,
        node_ids: &[Uuid],
        kinds: Option<&[RelationKind]>,
    ) -> Result<Vec<Relationship>> {
        if node_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; node_ids.len()].join(", ");
        let mut sql = format!(
            "SELECT {RELATIONSHIP_COLUMNS} FROM kg_relationships \
             WHERE (source_node_id IN ({placeholders}) OR target_node_id IN ({placeholders}))"
        );
        let ids: Vec<String> = node_ids.iter().map(|u| u.to_string()).collect();
        let mut args: Vec<String> = ids.clone();
        args.extend(ids);

        if let Some(kinds) = kinds.filter(|k| !k.is_empty()) {
            let kind_placeholders = vec!["?"; kinds.len()].join(", ");
            sql.push_str(&format!(" AND relation_kind IN ({kind_placeholders})"));
            args.extend(kinds.iter().map(|k| k.label().to_string()));
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), relationship_from_row)?;
        let mut relationships = Vec::new();
        for row in rows {
            relationships.push(row?);
        }
        Ok(relationships)
    }

    fn count_nodes(&self, repository_id: Uuid) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM kg_nodes WHERE repository_id = ?1",
            params![repository_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn count_relationships(&self, repository_id: Uuid) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM kg_relationships r \
             JOIN kg_nodes n ON r.source_node_id = n.id WHERE n.repository_id = ?1",
            params![repository_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn insert_analysis(&self, analysis: &Analysis) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO kg_analyses (id, repository_id, analysis_kind, parameters, results, \
             execution_time_ms, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                analysis.id.to_string(),
                analysis.repository_id.to_string(),
                analysis.analysis_kind.label(),
                analysis.parameters.to_string(),
                analysis.results.to_string(),
                analysis.execution_time_ms,
                analysis.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnalysisKind;
    use serde_json::json;

    fn sample_source() -> Source {
        Source {
            id: Uuid::new_v4(),
            source_kind: SourceKind::ProjectRepository,
            external_source_id: None,
            external_project_id: None,
            name: "demo".to_string(),
            repository_url: None,
            branch_name: "main".to_string(),
            local_path: Some("/tmp/demo".to_string()),
            parsing_status: ParsingStatus::Pending,
            parsing_started_at: None,
            parsing_completed_at: None,
            parsing_error: None,
            total_files_found: 0,
            total_files_parsed: 0,
            total_nodes_created: 0,
            total_relationships_created: 0,
            detected_languages: vec!["python".to_string()],
            metadata: json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sample_repository(source_id: Uuid) -> Repository {
        Repository {
            id: Uuid::new_v4(),
            source_id,
            name: "demo".to_string(),
            repository_url: None,
            branch_name: "main".to_string(),
            commit_hash: None,
            primary_language: Some("python".to_string()),
            all_languages: vec!["python".to_string()],
            directory_structure: json!({}),
            total_files: 0,
            parsed_files: 0,
            skipped_files: 0,
            error_files: 0,
            parsing_duration_seconds: None,
            avg_parse_time_per_file_ms: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sample_node(repository_id: Uuid, name: &str, kind: NodeKind) -> Node {
        Node {
            id: Uuid::new_v4(),
            repository_id,
            node_kind: kind,
            name: name.to_string(),
            fully_qualified_name: format!("a.py::{name}"),
            file_path: "a.py".to_string(),
            line_start: Some(1),
            line_end: Some(3),
            column_start: None,
            column_end: None,
            language: "python".to_string(),
            properties: json!({"visibility": "public"}),
            source_code: Some("class A:\n    pass".to_string()),
            docstring: Some("A sample".to_string()),
            complexity_score: Some(2),
            is_public: true,
            is_exported: false,
        }
    }

    fn seeded_store() -> (SqliteStore, Uuid) {
        let store = SqliteStore::in_memory().unwrap();
        let source = sample_source();
        store.insert_source(&source).unwrap();
        let repository = sample_repository(source.id);
        store.insert_repository(&repository).unwrap();
        (store, repository.id)
    }

    #[test]
    fn test_source_round_trip_and_status() {
        let store = SqliteStore::in_memory().unwrap();
        let source = sample_source();
        store.insert_source(&source).unwrap();

        let loaded = store.get_source(source.id).unwrap().unwrap();
        assert_eq!(loaded.name, "demo");
        assert_eq!(loaded.parsing_status, ParsingStatus::Pending);
        assert_eq!(loaded.detected_languages, vec!["python"]);

        store
            .update_source_status(source.id, ParsingStatus::Failed, Some("boom"), Some((5, 7)))
            .unwrap();
        let failed = store.get_source(source.id).unwrap().unwrap();
        assert_eq!(failed.parsing_status, ParsingStatus::Failed);
        assert_eq!(failed.parsing_error.as_deref(), Some("boom"));
        assert_eq!(failed.total_nodes_created, 5);
        assert_eq!(failed.total_relationships_created, 7);
        assert!(failed.parsing_completed_at.is_some());
    }

    #[test]
    fn test_source_constraint_requires_anchor() {
        let store = SqliteStore::in_memory().unwrap();
        let mut source = sample_source();
        source.local_path = None;
        assert!(store.insert_source(&source).is_err(), "source without anchor must be rejected");
    }

    #[test]
    fn test_node_round_trip() {
        let (store, repo) = seeded_store();
        let node = sample_node(repo, "A", NodeKind::Class);
        assert_eq!(store.insert_nodes(std::slice::from_ref(&node)).unwrap(), 1);

        let nodes = store.nodes_for_repository(repo, None, None, None).unwrap();
        assert_eq!(nodes.len(), 1);
        let loaded = &nodes[0];
        assert_eq!(loaded.node_kind, NodeKind::Class);
        assert_eq!(loaded.properties["visibility"], json!("public"));
        assert_eq!(loaded.docstring.as_deref(), Some("A sample"));
        assert_eq!(loaded.complexity_score, Some(2));
    }

    #[test]
    fn test_node_filters_and_limit() {
        let (store, repo) = seeded_store();
        let nodes = vec![
            sample_node(repo, "a.py", NodeKind::File),
            sample_node(repo, "A", NodeKind::Class),
            sample_node(repo, "b", NodeKind::Function),
        ];
        store.insert_nodes(&nodes).unwrap();

        let classes = store
            .nodes_for_repository(repo, Some(&[NodeKind::Class]), None, None)
            .unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].name, "A");

        let capped = store.nodes_for_repository(repo, None, None, Some(2)).unwrap();
        assert_eq!(capped.len(), 2);

        let none = store.nodes_for_repository(repo, None, Some("go"), None).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_relationships_touching_and_kind_filter() {
        let (store, repo) = seeded_store();
        let a = sample_node(repo, "a", NodeKind::Function);
        let b = sample_node(repo, "b", NodeKind::Function);
        store.insert_nodes(&[a.clone(), b.clone()]).unwrap();

        let call = Relationship::new(a.id, b.id, RelationKind::Calls, 0.8, json!({"line": 2}));
        let uses = Relationship::new(b.id, a.id, RelationKind::Uses, 0.6, json!({}));
        store.insert_relationships(&[call.clone(), uses]).unwrap();

        let all = store.relationships_touching(&[a.id], None).unwrap();
        assert_eq!(all.len(), 2);

        let calls_only = store
            .relationships_touching(&[a.id, b.id], Some(&[RelationKind::Calls]))
            .unwrap();
        assert_eq!(calls_only.len(), 1);
        assert_eq!(calls_only[0].id, call.id);
        assert_eq!(calls_only[0].context["line"], json!(2));
    }

    #[test]
    fn test_batched_insert_skips_failed_batches() {
        let (store, repo) = seeded_store();
        let a = sample_node(repo, "a", NodeKind::Function);
        let b = sample_node(repo, "b", NodeKind::Function);
        store.insert_nodes(&[a.clone(), b.clone()]).unwrap();

        let good = Relationship::new(a.id, b.id, RelationKind::Calls, 0.8, json!({}));
        // Dangling endpoint: this batch must fail and be skipped
        let bad = Relationship::new(a.id, Uuid::new_v4(), RelationKind::Calls, 0.8, json!({}));
        let accepted = store_relationships_batched(&store, &[good, bad], 1);
        assert_eq!(accepted, 1, "only the valid batch is accepted");
        assert_eq!(store.count_relationships(repo).unwrap(), 1);
    }

    #[test]
    fn test_delete_repository_cascades() {
        let (store, repo) = seeded_store();
        let a = sample_node(repo, "a", NodeKind::Function);
        let b = sample_node(repo, "b", NodeKind::Function);
        store.insert_nodes(&[a.clone(), b.clone()]).unwrap();
        store
            .insert_relationships(&[Relationship::new(
                a.id,
                b.id,
                RelationKind::Calls,
                0.8,
                json!({}),
            )])
            .unwrap();
        store
            .insert_analysis(&Analysis {
                id: Uuid::new_v4(),
                repository_id: repo,
                analysis_kind: AnalysisKind::Hotspots,
                parameters: json!({}),
                results: json!({"hotspots": []}),
                execution_time_ms: 1,
                created_at: Utc::now(),
            })
            .unwrap();

        assert_eq!(store.count_nodes(repo).unwrap(), 2);
        assert!(store.delete_repository(repo).unwrap());
        assert_eq!(store.count_nodes(repo).unwrap(), 0);
        assert!(store.relationships_touching(&[a.id, b.id], None).unwrap().is_empty());
        assert!(store.get_repository(repo).unwrap().is_none());
        assert!(!store.delete_repository(repo).unwrap(), "second delete finds nothing");
    }
}
