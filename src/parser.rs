//! Per-file entity extraction: turns one source file into Nodes plus the
//! intra-file `contains`/`imports` edges.
//!
//! Three strategies, selected by the language registry: object-oriented
//! (class/function/import scanning with indent- or brace-bounded bodies),
//! procedural (keyword-prefixed functions with brace-bounded bodies), and
//! basic (file node only, plus top-level keys for structured config).

use crate::builder;
use crate::cancel::ParseProbe;
use crate::error::{KgError, Result};
use crate::languages::{self, LanguageConfig, LanguageGroup};
use crate::types::{FileParseResult, Node, NodeKind, RelationKind, Relationship};
use regex::Regex;
use serde_json::json;
use std::sync::OnceLock;
use std::time::Instant;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Extraction ceilings
// ---------------------------------------------------------------------------

/// Hard ceiling on captured class bodies (lines).
pub const MAX_CLASS_LINES: usize = 100;
/// Hard ceiling on captured function bodies (lines).
pub const MAX_FUNCTION_LINES: usize = 50;
/// File nodes store at most this many characters of file text.
pub const MAX_FILE_EXCERPT_CHARS: usize = 2000;
/// Basic (config) file nodes store at most this many characters.
pub const MAX_BASIC_EXCERPT_CHARS: usize = 1000;

const PROBE_LINE_INTERVAL: usize = 100;

// ---------------------------------------------------------------------------
// Compiled patterns (shared, compiled once)
// ---------------------------------------------------------------------------

struct ParserPatterns {
    brace_type: Regex,
    js_function: Regex,
    py_import: Regex,
    js_import: Regex,
    js_require: Regex,
    java_import: Regex,
    cs_using: Regex,
    c_function: Regex,
    go_function: Regex,
}

fn patterns() -> &'static ParserPatterns {
    static PATTERNS: OnceLock<ParserPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| ParserPatterns {
        brace_type: Regex::new(
            r"^((?:export\s+|default\s+|public\s+|private\s+|protected\s+|internal\s+|abstract\s+|final\s+|sealed\s+|static\s+|partial\s+)*)(class|interface|enum)\s+([A-Za-z_$][\w$]*)",
        )
        .unwrap(),
        js_function: Regex::new(
            r"^((?:export\s+|default\s+)*)(?:async\s+)?function\b\s*\*?\s*([A-Za-z_$][\w$]*)?",
        )
        .unwrap(),
        py_import: Regex::new(r"^(?:from\s+([\w.]+)\s+import|import\s+([\w.]+))").unwrap(),
        js_import: Regex::new(r#"^import\s+(?:.*?\s+from\s+)?['"]([^'"]+)['"]"#).unwrap(),
        js_require: Regex::new(r#"require\s*\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap(),
        java_import: Regex::new(r"^import\s+(?:static\s+)?([\w.]+(?:\.\*)?)\s*;").unwrap(),
        cs_using: Regex::new(r"^using\s+(?:static\s+)?([\w.]+)\s*;").unwrap(),
        c_function: Regex::new(r"^(static\s+)?(int|void|char|float|double)\s+\**([A-Za-z_]\w*)\s*\(")
            .unwrap(),
        go_function: Regex::new(r"^func\s+(?:\([^)]*\)\s*)?([A-Za-z_]\w*)\s*\(").unwrap(),
    })
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Parse one file into nodes and intra-file edges.
///
/// Failures inside extraction are captured into a failed [`FileParseResult`]
/// with an empty node list; cancellation propagates as [`KgError::Cancelled`].
pub fn parse_file(
    file_path: &str,
    content: &str,
    repository_id: Uuid,
    probe: &ParseProbe,
) -> Result<(Vec<Node>, Vec<Relationship>, FileParseResult)> {
    let start = Instant::now();
    probe.check()?;

    let Some(config) = languages::detect_language(file_path) else {
        return Ok((
            Vec::new(),
            Vec::new(),
            FileParseResult {
                file_path: file_path.to_string(),
                language: "unknown".to_string(),
                success: false,
                nodes_extracted: 0,
                relationships_extracted: 0,
                parse_time_ms: start.elapsed().as_millis() as u64,
                error: Some("Unsupported file type".to_string()),
            },
        ));
    };

    let extraction = match config.group {
        LanguageGroup::ObjectOriented => {
            parse_object_oriented(content, file_path, config, repository_id, probe)
        }
        LanguageGroup::Procedural => {
            parse_procedural(content, file_path, config, repository_id, probe)
        }
        LanguageGroup::Basic => parse_basic(content, file_path, config, repository_id, probe),
    };

    match extraction {
        Ok((nodes, relationships)) => {
            #[cfg(feature = "treesitter")]
            let nodes = {
                let mut nodes = nodes;
                crate::ast::refine_spans(&mut nodes, content, config.grammar);
                nodes
            };
            let result = FileParseResult {
                file_path: file_path.to_string(),
                language: config.language.to_string(),
                success: true,
                nodes_extracted: nodes.len(),
                relationships_extracted: relationships.len(),
                parse_time_ms: start.elapsed().as_millis() as u64,
                error: None,
            };
            Ok((nodes, relationships, result))
        }
        Err(KgError::Cancelled) => Err(KgError::Cancelled),
        Err(e) => Ok((
            Vec::new(),
            Vec::new(),
            FileParseResult {
                file_path: file_path.to_string(),
                language: config.language.to_string(),
                success: false,
                nodes_extracted: 0,
                relationships_extracted: 0,
                parse_time_ms: start.elapsed().as_millis() as u64,
                error: Some(e.to_string()),
            },
        )),
    }
}

// ---------------------------------------------------------------------------
// Complexity scoring
// ---------------------------------------------------------------------------

/// Score code complexity on a 1–10 scale by counting control-flow keywords
/// in the whitespace-tokenised, lowercased body.
pub fn complexity_score(content: &str, config: &LanguageConfig) -> u8 {
    if !config.complexity_enabled || config.complexity_keywords.is_empty() {
        return 1;
    }
    let lower = content.to_lowercase();
    let mut count: usize = 1;
    for word in lower.split_whitespace() {
        if config.complexity_keywords.iter().any(|k| *k == word) {
            count += 1;
        }
    }
    (count / 5 + 1).clamp(1, 10) as u8
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn truncate_chars(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    s.chars().take(max).collect()
}

fn file_name_of(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn brace_delta(line: &str) -> i32 {
    line.matches('{').count() as i32 - line.matches('}').count() as i32
}

fn make_file_node(
    file_path: &str,
    content: &str,
    config: &LanguageConfig,
    repository_id: Uuid,
    excerpt_cap: usize,
    properties: serde_json::Value,
    complexity: Option<u8>,
) -> Node {
    Node {
        id: Uuid::new_v4(),
        repository_id,
        node_kind: NodeKind::File,
        name: file_name_of(file_path).to_string(),
        fully_qualified_name: file_path.to_string(),
        file_path: file_path.to_string(),
        line_start: None,
        line_end: None,
        column_start: None,
        column_end: None,
        language: config.language.to_string(),
        properties,
        source_code: Some(truncate_chars(content, excerpt_cap)),
        docstring: None,
        complexity_score: complexity,
        is_public: true,
        is_exported: false,
    }
}

fn make_import_node(
    name: &str,
    line: usize,
    raw_line: &str,
    file_path: &str,
    config: &LanguageConfig,
    repository_id: Uuid,
    import_type: &str,
) -> Node {
    Node {
        id: Uuid::new_v4(),
        repository_id,
        node_kind: NodeKind::Import,
        name: name.to_string(),
        fully_qualified_name: format!("{file_path}::{name}"),
        file_path: file_path.to_string(),
        line_start: Some(line as u32),
        line_end: Some(line as u32),
        column_start: None,
        column_end: None,
        language: config.language.to_string(),
        properties: json!({ "import_type": import_type }),
        source_code: Some(raw_line.to_string()),
        docstring: None,
        complexity_score: None,
        is_public: true,
        is_exported: false,
    }
}

/// A captured construct body: the (possibly truncated) excerpt, the true
/// 1-based end line with trailing blanks trimmed, and whether the ceiling hit.
struct Block {
    text: String,
    end_line: usize,
    #[allow(dead_code)]
    truncated: bool,
}

/// Accumulate an indent-delimited body (Python). Blank lines never terminate
/// the block; scanning continues past the excerpt ceiling so `end_line` is
/// the construct's real extent.
fn capture_indent_block(lines: &[&str], header_idx: usize, max_lines: usize, marker: &str) -> Block {
    let header = lines[header_idx];
    let indent = indent_of(header);
    let mut captured: Vec<String> = vec![header.to_string()];
    let mut end_idx = header_idx;
    let mut truncated = false;

    let mut j = header_idx + 1;
    while j < lines.len() {
        let current = lines[j];
        if !current.trim().is_empty() && indent_of(current) <= indent {
            break;
        }
        if !current.trim().is_empty() {
            end_idx = j;
        }
        if !truncated {
            captured.push(current.to_string());
            if captured.len() > max_lines {
                captured.push(marker.to_string());
                truncated = true;
            }
        }
        j += 1;
    }

    Block { text: captured.join("\n"), end_line: end_idx + 1, truncated }
}

/// Accumulate a brace-delimited body. The header's own brace delta seeds the
/// depth; a header without an opening brace yields a single-line span.
fn capture_brace_block(lines: &[&str], header_idx: usize, max_lines: usize, marker: &str) -> Block {
    let header = lines[header_idx];
    let mut depth = brace_delta(header);
    let mut captured: Vec<String> = vec![header.to_string()];
    let mut end_idx = header_idx;
    let mut truncated = false;

    let mut j = header_idx + 1;
    while j < lines.len() && depth > 0 {
        let current = lines[j];
        depth += brace_delta(current);
        if !current.trim().is_empty() {
            end_idx = j;
        }
        if !truncated {
            captured.push(current.to_string());
            if captured.len() > max_lines {
                captured.push(marker.to_string());
                truncated = true;
            }
        }
        j += 1;
    }

    Block { text: captured.join("\n"), end_line: end_idx + 1, truncated }
}

/// Capture a triple-quoted docstring opening on the first non-blank,
/// non-comment line after the header (Python convention).
fn extract_docstring(lines: &[&str], header_idx: usize) -> Option<String> {
    let mut j = header_idx + 1;
    while j < lines.len() && j < header_idx + 10 {
        let next = lines[j].trim();
        if next.starts_with("\"\"\"") || next.starts_with("'''") {
            let quote = if next.starts_with("\"\"\"") { "\"\"\"" } else { "'''" };
            if next.matches(quote).count() >= 2 {
                return Some(next.replace(quote, "").trim().to_string());
            }
            let mut doc_lines = vec![next.replace(quote, "")];
            let mut k = j + 1;
            while k < lines.len() {
                let doc_line = lines[k].trim();
                if doc_line.contains(quote) {
                    doc_lines.push(doc_line.replace(quote, ""));
                    break;
                }
                doc_lines.push(doc_line.to_string());
                k += 1;
            }
            return Some(doc_lines.join("\n").trim().to_string());
        }
        if !next.is_empty() && !next.starts_with('#') {
            return None;
        }
        j += 1;
    }
    None
}

/// Attach exactly one `contains` edge per non-file node: from its smallest
/// enclosing construct, or from the file node when nothing encloses it.
fn attach_containment(file_node: &Node, members: &[Node]) -> Vec<Relationship> {
    let refs: Vec<&Node> = members.iter().collect();
    builder::containment_for_file(file_node, &refs)
}

// ---------------------------------------------------------------------------
// Object-oriented languages (Python, JS, TS, Java, C#)
// ---------------------------------------------------------------------------

fn parse_object_oriented(
    content: &str,
    file_path: &str,
    config: &'static LanguageConfig,
    repository_id: Uuid,
    probe: &ParseProbe,
) -> Result<(Vec<Node>, Vec<Relationship>)> {
    probe.check()?;

    let file_node = make_file_node(
        file_path,
        content,
        config,
        repository_id,
        MAX_FILE_EXCERPT_CHARS,
        json!({ "lines": content.lines().count() }),
        None,
    );

    let lines: Vec<&str> = content.split('\n').collect();
    let python = config.language == "python";
    let marker = if python { "    # ... (truncated)" } else { "    // ... (truncated)" };

    let mut members: Vec<Node> = Vec::new();
    let mut relationships: Vec<Relationship> = Vec::new();

    for i in 0..lines.len() {
        if i % PROBE_LINE_INTERVAL == 0 {
            probe.check()?;
        }
        let raw = lines[i];
        let line = raw.trim();

        // Class (and interface/enum where the registry permits them)
        if python && line.starts_with("class ") && line.contains(':') {
            let name = line[6..]
                .split(['(', ':'])
                .next()
                .unwrap_or("")
                .trim()
                .to_string();
            if name.is_empty() {
                continue;
            }
            let block = capture_indent_block(&lines, i, MAX_CLASS_LINES, marker);
            let docstring = extract_docstring(&lines, i);
            let complexity = complexity_score(&block.text, config);
            let is_public = !name.starts_with('_');
            members.push(Node {
                id: Uuid::new_v4(),
                repository_id,
                node_kind: NodeKind::Class,
                name: name.clone(),
                fully_qualified_name: format!("{file_path}::{name}"),
                file_path: file_path.to_string(),
                line_start: Some((i + 1) as u32),
                line_end: Some(block.end_line as u32),
                column_start: None,
                column_end: None,
                language: config.language.to_string(),
                properties: json!({ "visibility": if is_public { "public" } else { "private" } }),
                source_code: Some(block.text),
                docstring,
                complexity_score: Some(complexity),
                is_public,
                is_exported: is_public,
            });
        } else if !python && patterns().brace_type.is_match(line) {
            let caps = patterns().brace_type.captures(line).unwrap();
            let modifiers = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let keyword = &caps[2];
            let name = caps[3].to_string();
            let kind = match keyword {
                "interface" if config.node_kinds.contains(&NodeKind::Interface) => {
                    NodeKind::Interface
                }
                "enum" if config.node_kinds.contains(&NodeKind::Enum) => NodeKind::Enum,
                "interface" | "enum" => continue,
                _ => NodeKind::Class,
            };
            let block = capture_brace_block(&lines, i, MAX_CLASS_LINES, marker);
            let complexity = complexity_score(&block.text, config);
            let is_public = !modifiers.contains("private") && !modifiers.contains("protected");
            members.push(Node {
                id: Uuid::new_v4(),
                repository_id,
                node_kind: kind,
                name: name.clone(),
                fully_qualified_name: format!("{file_path}::{name}"),
                file_path: file_path.to_string(),
                line_start: Some((i + 1) as u32),
                line_end: Some(block.end_line as u32),
                column_start: None,
                column_end: None,
                language: config.language.to_string(),
                properties: json!({ "visibility": if is_public { "public" } else { "private" } }),
                source_code: Some(block.text),
                docstring: None,
                complexity_score: Some(complexity),
                is_public,
                is_exported: modifiers.contains("export") || modifiers.contains("public"),
            });
        }
        // Function
        else if python && line.starts_with("def ") {
            let name = line[4..].split('(').next().unwrap_or("").trim().to_string();
            if name.is_empty() {
                continue;
            }
            let block = capture_indent_block(&lines, i, MAX_FUNCTION_LINES, marker);
            let docstring = extract_docstring(&lines, i);
            let complexity = complexity_score(&block.text, config);
            let is_public = !name.starts_with('_');
            let parameters = if line.contains('(') { line.matches(',').count() + 1 } else { 0 };
            members.push(Node {
                id: Uuid::new_v4(),
                repository_id,
                node_kind: NodeKind::Function,
                name: name.clone(),
                fully_qualified_name: format!("{file_path}::{name}"),
                file_path: file_path.to_string(),
                line_start: Some((i + 1) as u32),
                line_end: Some(block.end_line as u32),
                column_start: None,
                column_end: None,
                language: config.language.to_string(),
                properties: json!({
                    "parameters": parameters,
                    "is_method": indent_of(raw) > 0,
                }),
                source_code: Some(block.text),
                docstring,
                complexity_score: Some(complexity),
                is_public,
                is_exported: is_public,
            });
        } else if !python && line.contains("function") && patterns().js_function.is_match(line) {
            let caps = patterns().js_function.captures(line).unwrap();
            let modifiers = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let name = caps
                .get(2)
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "anonymous".to_string());
            let block = capture_brace_block(&lines, i, MAX_FUNCTION_LINES, marker);
            let complexity = complexity_score(&block.text, config);
            let parameters = if line.contains('(') { line.matches(',').count() + 1 } else { 0 };
            members.push(Node {
                id: Uuid::new_v4(),
                repository_id,
                node_kind: NodeKind::Function,
                name: name.clone(),
                fully_qualified_name: format!("{file_path}::{name}"),
                file_path: file_path.to_string(),
                line_start: Some((i + 1) as u32),
                line_end: Some(block.end_line as u32),
                column_start: None,
                column_end: None,
                language: config.language.to_string(),
                properties: json!({ "parameters": parameters, "is_method": false }),
                source_code: Some(block.text),
                docstring: None,
                complexity_score: Some(complexity),
                is_public: true,
                is_exported: modifiers.contains("export"),
            });
        }
        // Imports
        else if let Some((name, import_type)) = oo_import_name(line, config) {
            members.push(make_import_node(
                &name,
                i + 1,
                raw,
                file_path,
                config,
                repository_id,
                import_type,
            ));
            let import_node = members.last().unwrap();
            relationships.push(Relationship::new(
                file_node.id,
                import_node.id,
                RelationKind::Imports,
                1.0,
                json!({}),
            ));
        }
    }

    relationships.extend(attach_containment(&file_node, &members));

    let mut nodes = Vec::with_capacity(members.len() + 1);
    nodes.push(file_node);
    nodes.append(&mut members);
    Ok((nodes, relationships))
}

fn oo_import_name(line: &str, config: &LanguageConfig) -> Option<(String, &'static str)> {
    let p = patterns();
    match config.language {
        "python" => {
            let caps = p.py_import.captures(line)?;
            let name = caps.get(1).or_else(|| caps.get(2))?.as_str().to_string();
            Some((name, "module"))
        }
        "javascript" | "typescript" => {
            if let Some(caps) = p.js_import.captures(line) {
                return Some((caps[1].to_string(), "module"));
            }
            let caps = p.js_require.captures(line)?;
            Some((caps[1].to_string(), "module"))
        }
        "java" => {
            let caps = p.java_import.captures(line)?;
            Some((caps[1].to_string(), "module"))
        }
        "csharp" => {
            let caps = p.cs_using.captures(line)?;
            Some((caps[1].to_string(), "module"))
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Procedural languages (C, Go, Rust)
// ---------------------------------------------------------------------------

fn parse_procedural(
    content: &str,
    file_path: &str,
    config: &'static LanguageConfig,
    repository_id: Uuid,
    probe: &ParseProbe,
) -> Result<(Vec<Node>, Vec<Relationship>)> {
    probe.check()?;

    let file_node = make_file_node(
        file_path,
        content,
        config,
        repository_id,
        MAX_FILE_EXCERPT_CHARS,
        json!({ "lines": content.lines().count() }),
        None,
    );

    let lines: Vec<&str> = content.split('\n').collect();
    let marker = "    // ... (truncated)";

    let mut members: Vec<Node> = Vec::new();
    let mut relationships: Vec<Relationship> = Vec::new();

    for i in 0..lines.len() {
        if i % PROBE_LINE_INTERVAL == 0 {
            probe.check()?;
        }
        let raw = lines[i];
        let line = raw.trim();

        let function = match config.language {
            "c" => patterns().c_function.captures(line).map(|caps| {
                let is_static = caps.get(1).is_some();
                let return_type = caps[2].to_string();
                let name = caps[3].to_string();
                let properties = json!({ "return_type": return_type, "is_static": is_static });
                (name, !is_static, !is_static, properties)
            }),
            "go" if line.starts_with("func ") => {
                patterns().go_function.captures(line).map(|caps| {
                    let name = caps[1].to_string();
                    // Go export rule: capitalized identifiers are public
                    let exported = name.chars().next().is_some_and(|c| c.is_uppercase());
                    let properties =
                        json!({ "visibility": if exported { "public" } else { "private" } });
                    (name, exported, exported, properties)
                })
            }
            "rust" if line.starts_with("fn ") || line.starts_with("pub fn ") => {
                let is_public = line.starts_with("pub fn ");
                let rest = if is_public { &line[7..] } else { &line[3..] };
                let name = rest.split(['(', '<']).next().unwrap_or("").trim().to_string();
                if name.is_empty() {
                    None
                } else {
                    let properties =
                        json!({ "visibility": if is_public { "public" } else { "private" } });
                    Some((name, is_public, is_public, properties))
                }
            }
            _ => None,
        };

        if let Some((name, is_public, is_exported, properties)) = function {
            let block = capture_brace_block(&lines, i, MAX_FUNCTION_LINES, marker);
            let complexity = complexity_score(&block.text, config);
            members.push(Node {
                id: Uuid::new_v4(),
                repository_id,
                node_kind: NodeKind::Function,
                name: name.clone(),
                fully_qualified_name: format!("{file_path}::{name}"),
                file_path: file_path.to_string(),
                line_start: Some((i + 1) as u32),
                line_end: Some(block.end_line as u32),
                column_start: None,
                column_end: None,
                language: config.language.to_string(),
                properties,
                source_code: Some(block.text),
                docstring: None,
                complexity_score: Some(complexity),
                is_public,
                is_exported,
            });
            continue;
        }

        if let Some((name, import_type)) = procedural_import_name(line, config) {
            members.push(make_import_node(
                &name,
                i + 1,
                raw,
                file_path,
                config,
                repository_id,
                import_type,
            ));
            let import_node = members.last().unwrap();
            relationships.push(Relationship::new(
                file_node.id,
                import_node.id,
                RelationKind::Imports,
                1.0,
                json!({}),
            ));
        }
    }

    relationships.extend(attach_containment(&file_node, &members));

    let mut nodes = Vec::with_capacity(members.len() + 1);
    nodes.push(file_node);
    nodes.append(&mut members);
    Ok((nodes, relationships))
}

fn procedural_import_name(line: &str, config: &LanguageConfig) -> Option<(String, &'static str)> {
    match config.language {
        "c" if line.starts_with("#include") => {
            let target = line.split_whitespace().nth(1)?;
            let system = target.starts_with('<');
            let name = target.replace(['<', '>', '"'], "");
            Some((name, if system { "system" } else { "local" }))
        }
        "go" if line.starts_with("import ") => {
            let target = line.split_whitespace().nth(1)?;
            Some((target.replace('"', ""), "module"))
        }
        "rust" if line.starts_with("use ") => {
            let target = line.split_whitespace().nth(1)?;
            Some((target.trim_end_matches(';').to_string(), "module"))
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Basic languages (config and everything else)
// ---------------------------------------------------------------------------

fn parse_basic(
    content: &str,
    file_path: &str,
    config: &'static LanguageConfig,
    repository_id: Uuid,
    probe: &ParseProbe,
) -> Result<(Vec<Node>, Vec<Relationship>)> {
    probe.check()?;

    let is_config = matches!(config.language, "json" | "yaml" | "toml" | "ini");
    let file_node = make_file_node(
        file_path,
        content,
        config,
        repository_id,
        MAX_BASIC_EXCERPT_CHARS,
        json!({
            "lines": content.lines().count(),
            "size_bytes": content.len(),
            "file_type": if is_config { "configuration" } else { "other" },
        }),
        Some(1),
    );

    let mut members: Vec<Node> = Vec::new();
    let mut relationships: Vec<Relationship> = Vec::new();

    let structured = matches!(config.language, "json" | "yaml" | "toml");
    let ini = config.language == "ini";

    for (i, raw) in content.split('\n').enumerate() {
        if i % 50 == 0 {
            probe.check()?;
        }
        let line = raw.trim();

        if structured {
            // Top-level keys only: `key:` or `"key":` without leading indent
            if line.contains(':')
                && !line.starts_with('#')
                && !line.starts_with("//")
                && indent_of(raw) == 0
            {
                let key = line.split(':').next().unwrap_or("").trim().replace(['"', '\''], "");
                if key.is_empty() {
                    continue;
                }
                members.push(Node {
                    id: Uuid::new_v4(),
                    repository_id,
                    node_kind: NodeKind::Variable,
                    name: key.clone(),
                    fully_qualified_name: format!("{file_path}::{key}"),
                    file_path: file_path.to_string(),
                    line_start: Some((i + 1) as u32),
                    line_end: Some((i + 1) as u32),
                    column_start: None,
                    column_end: None,
                    language: config.language.to_string(),
                    properties: json!({ "config_type": "key", "section": "root" }),
                    source_code: Some(line.to_string()),
                    docstring: None,
                    complexity_score: None,
                    is_public: true,
                    is_exported: false,
                });
            }
        } else if ini && line.starts_with('[') && line.ends_with(']') {
            let section = line[1..line.len() - 1].to_string();
            if section.is_empty() {
                continue;
            }
            members.push(Node {
                id: Uuid::new_v4(),
                repository_id,
                node_kind: NodeKind::Variable,
                name: section.clone(),
                fully_qualified_name: format!("{file_path}::{section}"),
                file_path: file_path.to_string(),
                line_start: Some((i + 1) as u32),
                line_end: Some((i + 1) as u32),
                column_start: None,
                column_end: None,
                language: config.language.to_string(),
                properties: json!({ "config_type": "section" }),
                source_code: Some(line.to_string()),
                docstring: None,
                complexity_score: None,
                is_public: true,
                is_exported: false,
            });
        }
    }

    relationships.extend(attach_containment(&file_node, &members));

    let mut nodes = Vec::with_capacity(members.len() + 1);
    nodes.push(file_node);
    nodes.append(&mut members);
    Ok((nodes, relationships))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
