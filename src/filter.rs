//! Layered deny/allow policy deciding which files enter the parse pipeline:
//! excluded extensions, filename globs, directory segments, a size ceiling,
//! and language-specific prioritization (currently Python).

use crate::languages;
use crate::types::FilterStatistics;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::Path;

// ---------------------------------------------------------------------------
// Default rule sets
// ---------------------------------------------------------------------------

const DEFAULT_MAX_FILE_SIZE_KB: u64 = 500;

fn default_excluded_extensions() -> HashSet<String> {
    [
        // Configuration
        ".yaml", ".yml", ".json", ".toml", ".ini", ".cfg", ".conf",
        // Documentation
        ".md", ".txt", ".rst", ".adoc", ".tex",
        // Lock and dependency files
        ".lock", ".frozen", "package-lock.json", "yarn.lock", "composer.lock",
        "gemfile.lock", "cargo.lock",
        // Binary and media
        ".png", ".jpg", ".jpeg", ".gif", ".bmp", ".svg", ".ico", ".pdf", ".doc", ".docx",
        ".xls", ".xlsx", ".ppt", ".pptx", ".zip", ".tar", ".gz", ".bz2", ".rar", ".7z",
        ".exe", ".bin", ".so", ".dll", ".dylib",
        // IDE and editor leftovers
        ".swp", ".swo", ".tmp", ".bak", ".backup", ".orig",
        // OS leftovers
        ".ds_store", "thumbs.db", "desktop.ini",
        // Logs
        ".log", ".logs",
        // Databases
        ".db", ".sqlite", ".sqlite3",
        // Certificates and keys
        ".pem", ".key", ".crt", ".cer", ".p12", ".pfx",
        // Environment and secrets
        ".env", ".env.local", ".env.production", ".env.development",
        // Minified bundles
        ".min.js", ".min.css", ".bundle.js", ".bundle.css",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_excluded_patterns() -> Vec<String> {
    [
        // Package manager files
        "package-lock.json", "yarn.lock", "composer.lock", "Gemfile.lock", "Pipfile.lock",
        "poetry.lock", "Cargo.lock", "go.sum", "requirements*.txt", "setup.py", "setup.cfg",
        "pyproject.toml",
        // Build descriptors
        "Makefile", "makefile", "CMakeLists.txt", "Dockerfile*", "docker-compose*.yml",
        "docker-compose*.yaml", ".gitignore", ".gitattributes", ".gitmodules", ".eslintrc*",
        ".prettierrc*", ".editorconfig", ".babelrc*", "tsconfig*.json", "webpack*.js",
        "rollup*.js", "vite*.js",
        // CI files
        ".travis.yml", ".circleci*", "appveyor.yml", "azure-pipelines.yml",
        ".github/workflows/*", ".gitlab-ci.yml", "Jenkinsfile",
        // IDE configuration
        ".vscode/*", ".idea/*", "*.sublime-*", ".vs/*",
        // License and legal families
        "LICENSE*", "COPYING*", "COPYRIGHT*", "NOTICE*", "DISCLAIMER*", "TERMS*", "PRIVACY*",
        // Documentation families
        "README*", "CHANGELOG*", "HISTORY*", "AUTHORS*", "CONTRIBUTORS*", "INSTALL*",
        "USAGE*", "TUTORIAL*", "GUIDE*", "FAQ*",
        // Generated files
        "*.generated.*", "*.gen.*", "*_pb2.py", "*_pb2_grpc.py",
        // Test data and fixtures
        "*.fixture.*", "*.mock.*", "test_data/*", "fixtures/*",
        // Minified files
        "*.min.*", "*.bundle.*", "*.chunk.*",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_excluded_directories() -> HashSet<String> {
    [
        // Dependency caches
        "node_modules", "__pycache__", ".pytest_cache", ".tox", "venv", ".venv", "env",
        ".env", "virtualenv", "site-packages", "vendor", "third_party",
        // Build outputs
        "build", "dist", "out", "output", "target", "bin", "obj", ".next", ".nuxt",
        "public", "static", "assets",
        // IDE directories
        ".vscode", ".idea", ".vs", ".sublime-text", ".atom",
        // Version control
        ".git", ".svn", ".hg", ".bzr",
        // Cache and temp
        ".cache", "cache", ".tmp", "tmp", "temp",
        // Documentation builds
        "_build", "site", "_site",
        // Test data (data, not code)
        "test_data", "testdata", "fixtures", "samples",
        // Generated code
        "generated", "gen", "auto", "autogen",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

// ---------------------------------------------------------------------------
// Priority tiers
// ---------------------------------------------------------------------------

/// Tier assigned to accepted files for languages with prioritization rules.
/// `Low` files (tests, examples, demos) are rejected by [`FileFilter::should_parse`];
/// the tier is exposed so a budget-based policy can re-admit them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Medium,
    Normal,
    Low,
}

const HIGH_PRIORITY_DIRS: &[&str] = &["src", "lib", "app", "core", "main"];
const TEST_DIRS: &[&str] = &["tests", "testing", "examples", "example", "demo", "demos"];

// ---------------------------------------------------------------------------
// FileFilter
// ---------------------------------------------------------------------------

/// Decides per path whether a file is eligible for parsing.
pub struct FileFilter {
    excluded_extensions: HashSet<String>,
    excluded_patterns: Vec<String>,
    excluded_directories: HashSet<String>,
    /// Globs without a path separator, matched against the filename.
    name_globs: GlobSet,
    /// Globs containing a path separator, matched against the full path.
    path_globs: GlobSet,
    max_file_size_kb: u64,
}

impl Default for FileFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl FileFilter {
    pub fn new() -> Self {
        let patterns = default_excluded_patterns();
        let (name_globs, path_globs) = compile_globs(&patterns);
        FileFilter {
            excluded_extensions: default_excluded_extensions(),
            excluded_patterns: patterns,
            excluded_directories: default_excluded_directories(),
            name_globs,
            path_globs,
            max_file_size_kb: DEFAULT_MAX_FILE_SIZE_KB,
        }
    }

    /// Override the size ceiling (KB).
    pub fn set_max_file_size(&mut self, max_size_kb: u64) {
        self.max_file_size_kb = max_size_kb;
    }

    pub fn max_file_size_kb(&self) -> u64 {
        self.max_file_size_kb
    }

    pub fn add_excluded_extension(&mut self, extension: &str) {
        let ext = if extension.starts_with('.') {
            extension.to_lowercase()
        } else {
            format!(".{}", extension.to_lowercase())
        };
        self.excluded_extensions.insert(ext);
    }

    pub fn add_excluded_pattern(&mut self, pattern: &str) {
        self.excluded_patterns.push(pattern.to_string());
        let (name_globs, path_globs) = compile_globs(&self.excluded_patterns);
        self.name_globs = name_globs;
        self.path_globs = path_globs;
    }

    pub fn add_excluded_directory(&mut self, directory: &str) {
        self.excluded_directories.insert(directory.to_lowercase());
    }

    /// Decide whether `path` should be parsed. `size_bytes`, when known, is
    /// checked against the size ceiling first.
    pub fn should_parse(&self, path: &str, size_bytes: Option<u64>) -> bool {
        if let Some(size) = size_bytes {
            if size > self.max_file_size_kb * 1024 {
                return false;
            }
        }

        if self.in_excluded_directory(path) {
            return false;
        }

        let file_name = file_name_of(path);
        let name_lower = file_name.to_lowercase();
        if self.excluded_extensions.iter().any(|ext| name_lower.ends_with(ext.as_str())) {
            return false;
        }

        if self.name_globs.is_match(Path::new(file_name)) || self.path_globs.is_match(Path::new(path))
        {
            return false;
        }

        // Language-specific prioritization: Python test files are dropped in
        // favor of main source under bounded budgets.
        if languages::detect_language(path).is_some_and(|c| c.language == "python")
            && self.python_priority(path) == Priority::Low
        {
            return false;
        }

        true
    }

    /// Priority tier for a Python file that passed the deny lists.
    pub fn python_priority(&self, path: &str) -> Priority {
        let parts: Vec<&str> = path
            .split(['/', '\\'])
            .filter(|p| !p.is_empty())
            .collect();
        let file_name = parts.last().copied().unwrap_or(path).to_lowercase();

        let is_test_file = file_name.contains("test")
            || file_name.contains("conftest")
            || parts.iter().any(|p| {
                let lower = p.to_lowercase();
                lower.contains("test") || TEST_DIRS.iter().any(|d| *d == lower)
            });
        if is_test_file {
            return Priority::Low;
        }

        let has_high_priority_dir = parts[..parts.len().saturating_sub(1)]
            .iter()
            .any(|p| {
                let lower = p.to_lowercase();
                HIGH_PRIORITY_DIRS.iter().any(|d| *d == lower)
            });
        if has_high_priority_dir {
            return Priority::High;
        }

        let is_root_level = parts.len() <= 2;
        if is_root_level && !file_name.starts_with('_') {
            return Priority::Medium;
        }

        Priority::Normal
    }

    /// File extensions to include when restricting a parse to `language`.
    pub fn language_inclusions(&self, language: &str) -> &'static [&'static str] {
        match language.to_lowercase().as_str() {
            "python" => &[".py", ".pyx", ".pyi", ".pyw"],
            "javascript" => &[".js", ".jsx", ".mjs", ".cjs"],
            "typescript" => &[".ts", ".tsx", ".d.ts"],
            "java" => &[".java", ".groovy", ".scala", ".kt", ".kts"],
            "csharp" => &[".cs", ".vb", ".fs", ".fsx"],
            "cpp" => &[".cpp", ".cxx", ".cc", ".c", ".h", ".hpp", ".hxx"],
            "c" => &[".c", ".h"],
            "go" => &[".go"],
            "rust" => &[".rs"],
            "php" => &[".php", ".phtml"],
            "ruby" => &[".rb", ".rbw", ".rake", ".gemspec"],
            "swift" => &[".swift"],
            "kotlin" => &[".kt", ".kts"],
            "shell" | "bash" => &[".sh", ".bash", ".zsh", ".fish"],
            _ => &[],
        }
    }

    /// Summary counters for progress reporting.
    pub fn filtering_statistics(&self, total_files: usize, included_files: usize) -> FilterStatistics {
        let excluded_files = total_files.saturating_sub(included_files);
        let rate = |n: usize| {
            if total_files == 0 {
                0.0
            } else {
                (n as f64 / total_files as f64 * 10_000.0).round() / 100.0
            }
        };
        FilterStatistics {
            total_files_found: total_files,
            files_included_for_parsing: included_files,
            files_excluded_from_parsing: excluded_files,
            inclusion_rate_percent: rate(included_files),
            exclusion_rate_percent: rate(excluded_files),
            max_file_size_kb: self.max_file_size_kb,
            excluded_extensions_count: self.excluded_extensions.len(),
            excluded_patterns_count: self.excluded_patterns.len(),
            excluded_directories_count: self.excluded_directories.len(),
        }
    }

    fn in_excluded_directory(&self, path: &str) -> bool {
        // The final component is the filename; only directory segments count.
        let parts: Vec<&str> = path.split(['/', '\\']).filter(|p| !p.is_empty()).collect();
        for part in &parts[..parts.len().saturating_sub(1)] {
            let lower = part.to_lowercase();
            if self.excluded_directories.contains(&lower) {
                return true;
            }
            if let Some(stripped) = lower.strip_prefix('.') {
                if self.excluded_directories.contains(stripped) {
                    return true;
                }
            }
        }
        false
    }
}

fn file_name_of(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn compile_globs(patterns: &[String]) -> (GlobSet, GlobSet) {
    let mut name_builder = GlobSetBuilder::new();
    let mut path_builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = match GlobBuilder::new(pattern).case_insensitive(true).build() {
            Ok(g) => g,
            Err(_) => continue,
        };
        if pattern.contains('/') {
            path_builder.add(glob);
        } else {
            name_builder.add(glob);
        }
    }
    (
        name_builder.build().unwrap_or_else(|_| GlobSet::empty()),
        path_builder.build().unwrap_or_else(|_| GlobSet::empty()),
    )
}
