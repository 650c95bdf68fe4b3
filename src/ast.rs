//! tree-sitter span refinement for pattern-extracted nodes.
//!
//! The registry carries a grammar id per language; when the matching grammar
//! is compiled in, declaration boundaries from the real AST replace the
//! line spans the pattern scanner derived, and column spans are filled in.
//! Feature-gated behind `treesitter` to keep the default binary lean.

use crate::types::{Node, NodeKind};
use tracing::debug;
use tree_sitter::{Language, Node as TsNode, Parser};

/// Map a registry grammar id to a compiled tree-sitter language.
fn language_for_grammar(grammar: &str) -> Option<Language> {
    match grammar {
        "rust" => Some(tree_sitter_rust::LANGUAGE.into()),
        "typescript" => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        "javascript" => Some(tree_sitter_javascript::LANGUAGE.into()),
        "python" => Some(tree_sitter_python::LANGUAGE.into()),
        "go" => Some(tree_sitter_go::LANGUAGE.into()),
        "c" => Some(tree_sitter_c::LANGUAGE.into()),
        "cpp" => Some(tree_sitter_cpp::LANGUAGE.into()),
        "java" => Some(tree_sitter_java::LANGUAGE.into()),
        _ => None,
    }
}

/// A declaration found in the AST with exact boundaries.
struct Declaration {
    name: String,
    start_line: u32,
    end_line: u32,
    start_column: u32,
    end_column: u32,
}

fn is_declaration(kind: &str) -> bool {
    matches!(
        kind,
        "function_item"
            | "struct_item"
            | "enum_item"
            | "trait_item"
            | "impl_item"
            | "function_declaration"
            | "function_definition"
            | "method_definition"
            | "method_declaration"
            | "class_declaration"
            | "class_definition"
            | "class_specifier"
            | "interface_declaration"
            | "enum_declaration"
            | "enum_specifier"
            | "struct_specifier"
    )
}

fn declaration_name(node: &TsNode, source: &[u8]) -> Option<String> {
    for field in ["name", "type"] {
        if let Some(name_node) = node.child_by_field_name(field) {
            if let Ok(text) = name_node.utf8_text(source) {
                let name = text.trim();
                if !name.is_empty() {
                    return Some(name.to_string());
                }
            }
        }
    }

    // C-style declarators: the identifier hides inside the declarator chain
    if let Some(decl) = node.child_by_field_name("declarator") {
        if let Some(inner) = decl.child_by_field_name("declarator") {
            if let Ok(text) = inner.utf8_text(source) {
                return Some(text.trim().to_string());
            }
        }
        if let Ok(text) = decl.utf8_text(source) {
            let s = text.trim();
            if let Some(paren) = s.find('(') {
                return Some(s[..paren].trim().to_string());
            }
            return Some(s.to_string());
        }
    }

    None
}

fn collect_declarations(node: &TsNode, source: &[u8], out: &mut Vec<Declaration>) {
    if is_declaration(node.kind()) {
        if let Some(name) = declaration_name(node, source) {
            out.push(Declaration {
                name,
                start_line: node.start_position().row as u32 + 1,
                end_line: node.end_position().row as u32 + 1,
                start_column: node.start_position().column as u32,
                end_column: node.end_position().column as u32,
            });
        }
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_declarations(&child, source, out);
    }
}

/// Replace pattern-derived spans with exact AST boundaries where a
/// declaration with the same name starts within one line of the node.
/// A missing or unparseable grammar leaves the nodes untouched.
pub fn refine_spans(nodes: &mut [Node], content: &str, grammar: &str) {
    let Some(language) = language_for_grammar(grammar) else {
        return;
    };
    let mut parser = Parser::new();
    if parser.set_language(&language).is_err() {
        return;
    }
    let Some(tree) = parser.parse(content, None) else {
        return;
    };

    let source = content.as_bytes();
    let mut declarations = Vec::new();
    collect_declarations(&tree.root_node(), source, &mut declarations);
    if declarations.is_empty() {
        return;
    }

    let mut refined = 0usize;
    for node in nodes.iter_mut() {
        if matches!(node.node_kind, NodeKind::File | NodeKind::Import | NodeKind::Variable) {
            continue;
        }
        let Some(start) = node.line_start else { continue };
        let matched = declarations.iter().find(|d| {
            d.name == node.name && d.start_line.abs_diff(start) <= 1
        });
        if let Some(decl) = matched {
            node.line_start = Some(decl.start_line);
            node.line_end = Some(decl.end_line);
            node.column_start = Some(decl.start_column);
            node.column_end = Some(decl.end_column);
            refined += 1;
        }
    }

    debug!(grammar, declarations = declarations.len(), refined, "Span refinement applied");
}
