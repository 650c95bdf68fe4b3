//! Ingestion orchestrator: resolves a repository (cloning if remote), walks
//! and filters it, drives the per-file parser with streaming persistence,
//! runs the cross-file graph passes, and reports progress throughout.
//!
//! Each parse job runs as one cooperative task, registered by source id in a
//! process-wide registry so it can be cancelled externally.

use crate::builder::GraphBuilder;
use crate::cancel::{CancelToken, ParseProbe};
use crate::error::{KgError, Result};
use crate::filter::FileFilter;
use crate::languages;
use crate::parser;
use crate::progress::{ProgressEvent, ProgressHub};
use crate::store::{self, GraphStore, BULK_BATCH_SIZE, STREAM_BATCH_SIZE};
use crate::types::{
    FileError, FilterStatistics, Node, ParseRequest, ParseResult, ParsingProgress, ParsingStatus,
    Repository, Source,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ignore::WalkBuilder;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Hard timeout on the clone subprocess.
pub const CLONE_TIMEOUT_SECS: u64 = 300;
/// Coarse estimate returned from the start-parse call.
pub const ESTIMATED_DURATION: &str = "3-10 minutes";

const PROGRESS_FILE_INTERVAL: usize = 5;
const MAX_PROGRESS_ERRORS: usize = 10;

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Outcome summary of the walk + filter phase.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryStats {
    pub total_files_found: usize,
    pub smart_filtered: usize,
    pub language_filtered: usize,
    pub unreadable: usize,
    pub filter_statistics: FilterStatistics,
}

enum Discovered {
    Included(String, String),
    SmartFiltered,
    LanguageFiltered,
    Unreadable,
}

/// Walk the tree, apply the file filter with size checks, and read each
/// accepted file as UTF-8 with replacement. Results come back keyed by
/// repo-relative path, sorted, so persisted rows follow the walk order.
fn discover_files(
    root: &Path,
    request: &ParseRequest,
) -> Result<(BTreeMap<String, String>, DiscoveryStats)> {
    let mut filter = FileFilter::new();
    filter.set_max_file_size(request.max_file_size_kb);

    // Full walk; exclusion is the filter's job, not the walker's
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in WalkBuilder::new(root)
        .hidden(false)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .follow_links(false)
        .build()
    {
        let Ok(entry) = entry else { continue };
        if entry.file_type().is_some_and(|t| t.is_file()) {
            paths.push(entry.into_path());
        }
    }
    let total_files_found = paths.len();

    let allow: Option<Vec<String>> =
        request.languages.as_ref().map(|ls| ls.iter().map(|l| l.to_lowercase()).collect());

    // Stat and read in parallel; the BTreeMap restores deterministic order
    let outcomes: Vec<Discovered> = paths
        .par_iter()
        .map(|abs| {
            let rel = abs
                .strip_prefix(root)
                .unwrap_or(abs)
                .to_string_lossy()
                .replace('\\', "/");
            let size = std::fs::metadata(abs).ok().map(|m| m.len());
            if !filter.should_parse(&rel, size) {
                return Discovered::SmartFiltered;
            }
            let Some(config) = languages::detect_language(&rel) else {
                return Discovered::LanguageFiltered;
            };
            if let Some(allow) = &allow {
                if !allow.iter().any(|l| l == config.language) {
                    return Discovered::LanguageFiltered;
                }
            }
            match std::fs::read(abs) {
                Ok(bytes) => {
                    Discovered::Included(rel, String::from_utf8_lossy(&bytes).into_owned())
                }
                Err(_) => Discovered::Unreadable,
            }
        })
        .collect();

    let mut file_contents = BTreeMap::new();
    let mut smart_filtered = 0;
    let mut language_filtered = 0;
    let mut unreadable = 0;
    for outcome in outcomes {
        match outcome {
            Discovered::Included(rel, text) => {
                file_contents.insert(rel, text);
            }
            Discovered::SmartFiltered => smart_filtered += 1,
            Discovered::LanguageFiltered => language_filtered += 1,
            Discovered::Unreadable => unreadable += 1,
        }
    }

    let filter_statistics = filter.filtering_statistics(total_files_found, file_contents.len());
    info!(
        total = total_files_found,
        included = file_contents.len(),
        smart_filtered,
        language_filtered,
        unreadable,
        "File discovery complete"
    );

    Ok((
        file_contents,
        DiscoveryStats {
            total_files_found,
            smart_filtered,
            language_filtered,
            unreadable,
            filter_statistics,
        },
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn commit_hash_of(repo_root: &Path) -> Option<String> {
    let repo = git2::Repository::discover(repo_root).ok()?;
    let head = repo.head().ok()?;
    let commit = head.peel_to_commit().ok()?;
    Some(commit.id().to_string())
}

fn directory_structure_of(file_contents: &BTreeMap<String, String>) -> Value {
    let mut dirs: BTreeMap<String, usize> = BTreeMap::new();
    for path in file_contents.keys() {
        let dir = path.rsplit_once('/').map(|(d, _)| d.to_string()).unwrap_or_else(|| ".".into());
        *dirs.entry(dir).or_default() += 1;
    }
    json!(dirs)
}

fn last_errors(errors: &[FileError]) -> Vec<FileError> {
    let skip = errors.len().saturating_sub(MAX_PROGRESS_ERRORS);
    errors[skip..].to_vec()
}

#[allow(clippy::too_many_arguments)]
fn snapshot(
    source_id: Uuid,
    status: ParsingStatus,
    total_files: usize,
    processed_files: usize,
    current_file: Option<String>,
    nodes_created: usize,
    relationships_created: usize,
    errors: &[FileError],
    start_time: DateTime<Utc>,
) -> ParsingProgress {
    ParsingProgress {
        source_id,
        status,
        total_files,
        processed_files,
        current_file,
        nodes_created,
        relationships_created,
        errors: last_errors(errors),
        start_time,
        estimated_completion: None,
    }
}

struct CompletedParse {
    repository_id: Uuid,
    message: String,
    statistics: Value,
}

// ---------------------------------------------------------------------------
// IngestService
// ---------------------------------------------------------------------------

/// Drives parse jobs end-to-end. Shared across the HTTP surface via `Arc`.
pub struct IngestService {
    store: Arc<dyn GraphStore>,
    builder: GraphBuilder,
    progress: Arc<ProgressHub>,
    active_tasks: DashMap<Uuid, CancelToken>,
}

impl IngestService {
    pub fn new(store: Arc<dyn GraphStore>, progress: Arc<ProgressHub>) -> Self {
        IngestService { store, builder: GraphBuilder::new(), progress, active_tasks: DashMap::new() }
    }

    pub fn store(&self) -> Arc<dyn GraphStore> {
        Arc::clone(&self.store)
    }

    pub fn progress_hub(&self) -> Arc<ProgressHub> {
        Arc::clone(&self.progress)
    }

    pub fn active_parse_count(&self) -> usize {
        self.active_tasks.len()
    }

    /// Mark a running parse for cancellation. Returns whether a task was
    /// active under this source id.
    pub fn cancel_parse(&self, source_id: Uuid) -> bool {
        match self.active_tasks.get(&source_id) {
            Some(token) => {
                token.cancel();
                info!(source = %source_id, "Parse marked for cancellation");
                true
            }
            None => false,
        }
    }

    /// Create the source row and run the job on a background task, returning
    /// the parsing id immediately.
    pub fn start_parse(self: &Arc<Self>, request: ParseRequest) -> Result<Uuid> {
        let source = self.create_source(&request)?;
        let source_id = source.id;
        let service = Arc::clone(self);
        tokio::spawn(async move {
            service.run(source, request).await;
        });
        Ok(source_id)
    }

    /// Run a parse to completion on the current task.
    pub async fn parse_repository(self: &Arc<Self>, request: ParseRequest) -> ParseResult {
        match self.create_source(&request) {
            Ok(source) => self.run(source, request).await,
            Err(e) => ParseResult {
                success: false,
                source_id: None,
                repository_id: None,
                message: "Failed to create source record".to_string(),
                statistics: None,
                error: Some(e.to_string()),
            },
        }
    }

    fn create_source(&self, request: &ParseRequest) -> Result<Source> {
        if request.local_path.is_none() && request.repository_url.is_none() {
            return Err(KgError::Input(
                "either local_path or repository_url must be specified".to_string(),
            ));
        }
        // Anchor constraint: the remote URL stands in as local_path when no
        // other anchor column is set.
        let local_path = request.local_path.clone().or_else(|| {
            if request.external_source_id.is_none() && request.external_project_id.is_none() {
                request.repository_url.clone()
            } else {
                None
            }
        });

        let now = Utc::now();
        let source = Source {
            id: Uuid::new_v4(),
            source_kind: request.source_kind,
            external_source_id: request.external_source_id.clone(),
            external_project_id: request.external_project_id,
            name: request.name.clone(),
            repository_url: request.repository_url.clone(),
            branch_name: request.branch_name.clone(),
            local_path,
            parsing_status: ParsingStatus::Pending,
            parsing_started_at: None,
            parsing_completed_at: None,
            parsing_error: None,
            total_files_found: 0,
            total_files_parsed: 0,
            total_nodes_created: 0,
            total_relationships_created: 0,
            detected_languages: Vec::new(),
            metadata: json!({}),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_source(&source)?;
        info!(source = %source.id, name = request.name.as_str(), "Created source record");
        Ok(source)
    }

    /// Outer job wrapper: owns task registration, terminal status updates and
    /// the terminal progress event for every exit path.
    async fn run(&self, source: Source, request: ParseRequest) -> ParseResult {
        let source_id = source.id;
        let token = CancelToken::new();
        self.active_tasks.insert(source_id, token.clone());

        self.progress.emit(
            source_id,
            ProgressEvent::Start {
                name: request.name.clone(),
                repository_url: request.repository_url.clone(),
                local_path: request.local_path.clone(),
                estimated_duration: ESTIMATED_DURATION.to_string(),
            },
        );

        let outcome = self.run_inner(&source, &request, &token).await;
        self.active_tasks.remove(&source_id);

        let result = match outcome {
            Ok(done) => ParseResult {
                success: true,
                source_id: Some(source_id),
                repository_id: Some(done.repository_id),
                message: done.message,
                statistics: Some(done.statistics),
                error: None,
            },
            Err(KgError::Cancelled) => {
                let message = KgError::Cancelled.to_string();
                info!(source = %source_id, "Repository parsing cancelled");
                if let Err(e) = self.store.update_source_status(
                    source_id,
                    ParsingStatus::Failed,
                    Some(&message),
                    None,
                ) {
                    error!(source = %source_id, error = %e, "Failed to record cancellation");
                }
                self.progress.emit(source_id, ProgressEvent::Cancel {});
                ParseResult {
                    success: false,
                    source_id: Some(source_id),
                    repository_id: None,
                    message: "Repository parsing was cancelled".to_string(),
                    statistics: None,
                    error: Some(message),
                }
            }
            Err(e) => {
                let message = format!("Repository parsing failed: {e}");
                error!(source = %source_id, error = %e, "Repository parsing failed");
                if let Err(update_err) = self.store.update_source_status(
                    source_id,
                    ParsingStatus::Failed,
                    Some(&message),
                    None,
                ) {
                    error!(source = %source_id, error = %update_err, "Failed to record failure");
                }
                self.progress
                    .emit(source_id, ProgressEvent::Error { error_message: message.clone() });
                ParseResult {
                    success: false,
                    source_id: Some(source_id),
                    repository_id: None,
                    message: "Repository parsing failed".to_string(),
                    statistics: None,
                    error: Some(message),
                }
            }
        };
        self.progress.close(source_id);
        result
    }

    async fn run_inner(
        &self,
        source: &Source,
        request: &ParseRequest,
        token: &CancelToken,
    ) -> Result<CompletedParse> {
        let started = Instant::now();
        let start_time = Utc::now();

        self.store.update_source_status(source.id, ParsingStatus::Processing, None, None)?;
        self.progress.emit(
            source.id,
            ProgressEvent::Update {
                progress: snapshot(
                    source.id,
                    ParsingStatus::Processing,
                    0,
                    0,
                    None,
                    0,
                    0,
                    &[],
                    start_time,
                ),
            },
        );

        // Resolve the repository path; a clone lives in a TempDir whose Drop
        // removes it on every exit path, including cancellation.
        let mut _clone_dir: Option<TempDir> = None;
        let repo_root: PathBuf = match &request.local_path {
            Some(local) => PathBuf::from(local),
            None => {
                let url = request
                    .repository_url
                    .as_ref()
                    .ok_or_else(|| KgError::Input("no repository path or URL".to_string()))?;
                let dir =
                    self.clone_repository(url, &request.branch_name, source.id, start_time).await?;
                let path = dir.path().to_path_buf();
                _clone_dir = Some(dir);
                path
            }
        };
        if !repo_root.exists() {
            return Err(KgError::Input(format!(
                "repository path not found: {}",
                repo_root.display()
            )));
        }

        let (file_contents, discovery) = discover_files(&repo_root, request)?;
        if file_contents.is_empty() {
            return Err(KgError::Input("no parseable files found in repository".to_string()));
        }

        let repository = self.create_repository(source, request, &repo_root, &file_contents)?;

        // Streaming parse-and-store loop: each file's rows are persisted
        // immediately, so the full graph never sits in memory as rows
        let total_files = file_contents.len();
        let mut processed_files = 0usize;
        let mut nodes_created = 0usize;
        let mut relationships_created = 0usize;
        let mut failed: Vec<FileError> = Vec::new();
        let mut all_nodes: Vec<Node> = Vec::new();
        let parse_budget = Duration::from_secs(request.parse_timeout_seconds);

        for (file_path, content) in &file_contents {
            token.probe()?;
            let probe = ParseProbe::new(token.clone(), Some(parse_budget));

            match parser::parse_file(file_path, content, repository.id, &probe) {
                Err(KgError::Cancelled) => return Err(KgError::Cancelled),
                Err(e) => {
                    failed.push(FileError { file_path: file_path.clone(), error: e.to_string() });
                }
                Ok((nodes, relationships, file_result)) => {
                    if file_result.success {
                        let accepted_nodes =
                            store::store_nodes_batched(&*self.store, &nodes, STREAM_BATCH_SIZE);
                        let accepted_rels = store::store_relationships_batched(
                            &*self.store,
                            &relationships,
                            STREAM_BATCH_SIZE,
                        );
                        if accepted_nodes == 0 && !nodes.is_empty() {
                            failed.push(FileError {
                                file_path: file_path.clone(),
                                error: "Storage failed".to_string(),
                            });
                        } else {
                            nodes_created += accepted_nodes;
                            relationships_created += accepted_rels;
                            // In-memory node index feeding the cross-file pass
                            all_nodes.extend(nodes);
                        }
                    } else {
                        failed.push(FileError {
                            file_path: file_path.clone(),
                            error: file_result
                                .error
                                .unwrap_or_else(|| "parse failed".to_string()),
                        });
                    }
                }
            }

            processed_files += 1;
            if processed_files % PROGRESS_FILE_INTERVAL == 0 || processed_files == total_files {
                self.progress.emit(
                    source.id,
                    ProgressEvent::Update {
                        progress: snapshot(
                            source.id,
                            ParsingStatus::Processing,
                            total_files,
                            processed_files,
                            Some(file_path.clone()),
                            nodes_created,
                            relationships_created,
                            &failed,
                            start_time,
                        ),
                    },
                );
            }
        }

        // Cross-file passes over the in-memory node index. Failures other
        // than cancellation are logged and swallowed; the job completes
        // without those edges.
        if request.enable_cross_file_refs {
            let probe = ParseProbe::unbounded(token.clone());
            match self.builder.reference_relationships(&all_nodes, &file_contents, &probe) {
                Ok(edges) => {
                    let accepted =
                        store::store_relationships_batched(&*self.store, &edges, BULK_BATCH_SIZE);
                    relationships_created += accepted;
                    info!(source = %source.id, edges = accepted, "Cross-file pass stored");
                }
                Err(KgError::Cancelled) => return Err(KgError::Cancelled),
                Err(e) => warn!(source = %source.id, error = %e, "Cross-file pass skipped"),
            }
        }

        // Aggregates and terminal status
        let parsed_files = processed_files.saturating_sub(failed.len());
        let duration_seconds = started.elapsed().as_secs() as i64;
        let avg_parse_time_ms = if total_files > 0 {
            started.elapsed().as_millis() as f64 / total_files as f64
        } else {
            0.0
        };
        self.store.update_repository_statistics(
            repository.id,
            total_files as i64,
            parsed_files as i64,
            failed.len() as i64,
            duration_seconds,
            avg_parse_time_ms,
        )?;
        self.store.update_source_status(
            source.id,
            ParsingStatus::Completed,
            None,
            Some((nodes_created as i64, relationships_created as i64)),
        )?;

        // Real row counts queried back, so skipped batches are visible
        let stored_nodes = self.store.count_nodes(repository.id).unwrap_or(nodes_created as i64);
        let stored_relationships = self
            .store
            .count_relationships(repository.id)
            .unwrap_or(relationships_created as i64);

        let success_rate = if total_files > 0 {
            (parsed_files as f64 / total_files as f64 * 10_000.0).round() / 100.0
        } else {
            0.0
        };
        let statistics = json!({
            "total_files": total_files,
            "parsed_files": parsed_files,
            "failed_files": failed.len(),
            "success_rate_percent": success_rate,
            "total_nodes": nodes_created,
            "total_relationships": relationships_created,
            "stored_nodes": stored_nodes,
            "stored_relationships": stored_relationships,
            "parsing_duration_seconds": duration_seconds,
            "avg_parse_time_ms": (avg_parse_time_ms * 100.0).round() / 100.0,
            "languages_detected": repository.all_languages,
            "filtering": discovery,
            "streaming_storage": true,
        });

        self.progress.emit(
            source.id,
            ProgressEvent::Complete {
                progress: snapshot(
                    source.id,
                    ParsingStatus::Completed,
                    total_files,
                    processed_files,
                    None,
                    nodes_created,
                    relationships_created,
                    &failed,
                    start_time,
                ),
                repository_id: repository.id,
                statistics: statistics.clone(),
            },
        );

        let message = format!(
            "Successfully parsed repository with streaming storage: {nodes_created} nodes, \
             {relationships_created} relationships. Success rate: {success_rate:.1}% \
             ({parsed_files}/{total_files} files)"
        );
        info!(
            source = %source.id,
            repository = %repository.id,
            nodes = nodes_created,
            relationships = relationships_created,
            duration_s = duration_seconds,
            "Repository parsing completed"
        );

        Ok(CompletedParse { repository_id: repository.id, message, statistics })
    }

    fn create_repository(
        &self,
        source: &Source,
        request: &ParseRequest,
        repo_root: &Path,
        file_contents: &BTreeMap<String, String>,
    ) -> Result<Repository> {
        let mut languages_detected: BTreeSet<&'static str> = BTreeSet::new();
        for path in file_contents.keys() {
            if let Some(config) = languages::detect_language(path) {
                languages_detected.insert(config.language);
            }
        }
        let all_languages: Vec<String> =
            languages_detected.iter().map(|l| l.to_string()).collect();
        let primary_language = all_languages.first().cloned();

        let now = Utc::now();
        let repository = Repository {
            id: Uuid::new_v4(),
            source_id: source.id,
            name: request.name.clone(),
            repository_url: request.repository_url.clone(),
            branch_name: request.branch_name.clone(),
            commit_hash: commit_hash_of(repo_root),
            primary_language,
            all_languages,
            directory_structure: directory_structure_of(file_contents),
            total_files: file_contents.len() as i64,
            parsed_files: 0,
            skipped_files: 0,
            error_files: 0,
            parsing_duration_seconds: None,
            avg_parse_time_per_file_ms: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_repository(&repository)?;
        info!(repository = %repository.id, files = file_contents.len(), "Created repository record");
        Ok(repository)
    }

    /// Shallow-clone a remote repository into a temp dir with a hard timeout.
    async fn clone_repository(
        &self,
        url: &str,
        branch: &str,
        source_id: Uuid,
        start_time: DateTime<Utc>,
    ) -> Result<TempDir> {
        let temp = tempfile::Builder::new().prefix("codegraph-clone-").tempdir()?;
        info!(url, branch, dir = %temp.path().display(), "Cloning repository");

        self.progress.emit(
            source_id,
            ProgressEvent::Update {
                progress: snapshot(
                    source_id,
                    ParsingStatus::Processing,
                    0,
                    0,
                    Some(format!("Cloning {url}")),
                    0,
                    0,
                    &[],
                    start_time,
                ),
            },
        );

        let mut command = Command::new("git");
        command
            .args(["clone", "--depth", "1", "--branch", branch, url])
            .arg(temp.path())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let output =
            match tokio::time::timeout(Duration::from_secs(CLONE_TIMEOUT_SECS), command.output())
                .await
            {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => return Err(KgError::Clone(format!("failed to run git: {e}"))),
                Err(_) => {
                    return Err(KgError::Timeout(format!(
                        "git clone timed out after {CLONE_TIMEOUT_SECS} s for {url}"
                    )))
                }
            };
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(KgError::Clone(format!("git clone failed: {}", stderr.trim())));
        }
        if std::fs::read_dir(temp.path())?.next().is_none() {
            return Err(KgError::Clone("cloned repository is empty".to_string()));
        }
        Ok(temp)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
