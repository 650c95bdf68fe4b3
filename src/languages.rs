//! Language registry: maps file extensions to language descriptors and holds
//! the per-language parsing configuration (grammar id, permitted node kinds,
//! complexity keyword sets).

use crate::types::NodeKind;
use serde::Serialize;

/// Parsing strategy for a language family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageGroup {
    /// Class/function/import extraction with indent- or brace-bounded bodies.
    ObjectOriented,
    /// Keyword-prefixed function extraction with brace-bounded bodies.
    Procedural,
    /// File node only, plus top-level keys for structured config.
    Basic,
}

/// Descriptor for one supported language.
#[derive(Debug, Clone, Serialize)]
pub struct LanguageConfig {
    pub language: &'static str,
    pub extensions: &'static [&'static str],
    /// Grammar identifier for the optional AST backend.
    pub grammar: &'static str,
    pub node_kinds: &'static [NodeKind],
    pub complexity_enabled: bool,
    #[serde(skip)]
    pub group: LanguageGroup,
    /// Control-flow keywords counted by the complexity score.
    #[serde(skip)]
    pub complexity_keywords: &'static [&'static str],
}

const PY_KEYWORDS: &[&str] = &["if", "elif", "else", "for", "while", "try", "except", "with"];
const C_FAMILY_KEYWORDS: &[&str] =
    &["if", "else", "for", "while", "switch", "case", "try", "catch"];
const GO_KEYWORDS: &[&str] = &["if", "else", "for", "switch", "case", "select"];
const RUST_KEYWORDS: &[&str] = &["if", "else", "for", "while", "loop", "match"];

use LanguageGroup::{Basic, ObjectOriented, Procedural};
use NodeKind::{Class, Enum, File, Function, Import, Interface, Method, Module, Namespace, Variable};

static LANGUAGES: &[LanguageConfig] = &[
    LanguageConfig {
        language: "python",
        extensions: &[".py", ".pyi"],
        grammar: "python",
        node_kinds: &[File, Class, Function, Method, Variable, Import],
        complexity_enabled: true,
        group: ObjectOriented,
        complexity_keywords: PY_KEYWORDS,
    },
    LanguageConfig {
        language: "javascript",
        extensions: &[".js", ".jsx", ".mjs", ".cjs"],
        grammar: "javascript",
        node_kinds: &[File, Class, Function, Method, Variable, Import],
        complexity_enabled: true,
        group: ObjectOriented,
        complexity_keywords: C_FAMILY_KEYWORDS,
    },
    LanguageConfig {
        language: "typescript",
        extensions: &[".ts", ".tsx"],
        grammar: "typescript",
        node_kinds: &[File, Class, Function, Method, Variable, Import, Interface],
        complexity_enabled: true,
        group: ObjectOriented,
        complexity_keywords: C_FAMILY_KEYWORDS,
    },
    LanguageConfig {
        language: "java",
        extensions: &[".java"],
        grammar: "java",
        node_kinds: &[File, Class, Method, Variable, Import, Interface, Enum],
        complexity_enabled: true,
        group: ObjectOriented,
        complexity_keywords: C_FAMILY_KEYWORDS,
    },
    LanguageConfig {
        language: "csharp",
        extensions: &[".cs"],
        grammar: "c_sharp",
        node_kinds: &[File, Class, Method, Variable, Import, Interface, Namespace],
        complexity_enabled: true,
        group: ObjectOriented,
        complexity_keywords: C_FAMILY_KEYWORDS,
    },
    LanguageConfig {
        language: "c",
        extensions: &[".c", ".h"],
        grammar: "c",
        node_kinds: &[File, Function, Variable, Import],
        complexity_enabled: true,
        group: Procedural,
        complexity_keywords: C_FAMILY_KEYWORDS,
    },
    LanguageConfig {
        language: "cpp",
        extensions: &[".cpp", ".cxx", ".cc", ".hpp", ".hxx"],
        grammar: "cpp",
        node_kinds: &[File, Class, Function, Method, Variable, Namespace],
        complexity_enabled: true,
        group: Basic,
        complexity_keywords: C_FAMILY_KEYWORDS,
    },
    LanguageConfig {
        language: "go",
        extensions: &[".go"],
        grammar: "go",
        node_kinds: &[File, Function, Method, Variable, Import],
        complexity_enabled: true,
        group: Procedural,
        complexity_keywords: GO_KEYWORDS,
    },
    LanguageConfig {
        language: "rust",
        extensions: &[".rs"],
        grammar: "rust",
        node_kinds: &[File, Function, Method, Variable, Enum, Module, Import],
        complexity_enabled: true,
        group: Procedural,
        complexity_keywords: RUST_KEYWORDS,
    },
    LanguageConfig {
        language: "php",
        extensions: &[".php"],
        grammar: "php",
        node_kinds: &[File, Class, Function, Method, Variable],
        complexity_enabled: true,
        group: Basic,
        complexity_keywords: C_FAMILY_KEYWORDS,
    },
    LanguageConfig {
        language: "ruby",
        extensions: &[".rb"],
        grammar: "ruby",
        node_kinds: &[File, Class, Method, Variable, Module],
        complexity_enabled: true,
        group: Basic,
        complexity_keywords: &[],
    },
    LanguageConfig {
        language: "swift",
        extensions: &[".swift"],
        grammar: "swift",
        node_kinds: &[File, Class, Function, Method, Variable, Import],
        complexity_enabled: true,
        group: Basic,
        complexity_keywords: &[],
    },
    LanguageConfig {
        language: "kotlin",
        extensions: &[".kt", ".kts"],
        grammar: "kotlin",
        node_kinds: &[File, Class, Function, Method, Variable, Import],
        complexity_enabled: true,
        group: Basic,
        complexity_keywords: &[],
    },
    LanguageConfig {
        language: "scala",
        extensions: &[".scala"],
        grammar: "scala",
        node_kinds: &[File, Class, Function, Method, Variable, Import],
        complexity_enabled: true,
        group: Basic,
        complexity_keywords: &[],
    },
    LanguageConfig {
        language: "haskell",
        extensions: &[".hs"],
        grammar: "haskell",
        node_kinds: &[File, Function, Variable, Module, Import],
        complexity_enabled: true,
        group: Basic,
        complexity_keywords: &[],
    },
    LanguageConfig {
        language: "lua",
        extensions: &[".lua"],
        grammar: "lua",
        node_kinds: &[File, Function, Variable],
        complexity_enabled: true,
        group: Basic,
        complexity_keywords: &[],
    },
    LanguageConfig {
        language: "perl",
        extensions: &[".pl", ".pm"],
        grammar: "perl",
        node_kinds: &[File, Function, Variable],
        complexity_enabled: true,
        group: Basic,
        complexity_keywords: &[],
    },
    LanguageConfig {
        language: "r",
        extensions: &[".r"],
        grammar: "r",
        node_kinds: &[File, Function, Variable],
        complexity_enabled: true,
        group: Basic,
        complexity_keywords: &[],
    },
    LanguageConfig {
        language: "bash",
        extensions: &[".sh", ".bash"],
        grammar: "bash",
        node_kinds: &[File, Function, Variable],
        complexity_enabled: false,
        group: Basic,
        complexity_keywords: &[],
    },
    LanguageConfig {
        language: "yaml",
        extensions: &[".yml", ".yaml"],
        grammar: "yaml",
        node_kinds: &[File, Variable],
        complexity_enabled: false,
        group: Basic,
        complexity_keywords: &[],
    },
    LanguageConfig {
        language: "json",
        extensions: &[".json"],
        grammar: "json",
        node_kinds: &[File, Variable],
        complexity_enabled: false,
        group: Basic,
        complexity_keywords: &[],
    },
    LanguageConfig {
        language: "toml",
        extensions: &[".toml"],
        grammar: "toml",
        node_kinds: &[File, Variable],
        complexity_enabled: false,
        group: Basic,
        complexity_keywords: &[],
    },
    LanguageConfig {
        language: "ini",
        extensions: &[".ini", ".cfg"],
        grammar: "ini",
        node_kinds: &[File, Variable],
        complexity_enabled: false,
        group: Basic,
        complexity_keywords: &[],
    },
];

/// All registered language descriptors.
pub fn all() -> &'static [LanguageConfig] {
    LANGUAGES
}

/// Look up a descriptor by language name (case-insensitive).
pub fn by_name(name: &str) -> Option<&'static LanguageConfig> {
    let lower = name.to_lowercase();
    LANGUAGES.iter().find(|c| c.language == lower)
}

/// Detect a language from a file path by lower-cased suffix lookup.
pub fn detect_language(path: &str) -> Option<&'static LanguageConfig> {
    let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let ext = file_name.rsplit_once('.').map(|(_, e)| format!(".{}", e.to_lowercase()))?;
    LANGUAGES.iter().find(|c| c.extensions.iter().any(|e| *e == ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_twenty_languages() {
        assert!(all().len() >= 20, "registry has {} languages", all().len());
    }

    #[test]
    fn test_detect_by_extension() {
        assert_eq!(detect_language("src/app.py").unwrap().language, "python");
        assert_eq!(detect_language("lib/mod.rs").unwrap().language, "rust");
        assert_eq!(detect_language("web/index.TSX").unwrap().language, "typescript");
        assert_eq!(detect_language("Main.java").unwrap().language, "java");
        assert_eq!(detect_language("config.yaml").unwrap().language, "yaml");
        assert!(detect_language("README").is_none());
        assert!(detect_language("notes.xyz").is_none());
    }

    #[test]
    fn test_groups_route_parsing_strategy() {
        assert_eq!(by_name("python").unwrap().group, LanguageGroup::ObjectOriented);
        assert_eq!(by_name("csharp").unwrap().group, LanguageGroup::ObjectOriented);
        assert_eq!(by_name("go").unwrap().group, LanguageGroup::Procedural);
        assert_eq!(by_name("rust").unwrap().group, LanguageGroup::Procedural);
        assert_eq!(by_name("yaml").unwrap().group, LanguageGroup::Basic);
    }

    #[test]
    fn test_complexity_flags() {
        assert!(by_name("python").unwrap().complexity_enabled);
        assert!(!by_name("yaml").unwrap().complexity_enabled);
        assert!(!by_name("bash").unwrap().complexity_enabled);
        assert_eq!(by_name("rust").unwrap().complexity_keywords.len(), 6);
    }
}
