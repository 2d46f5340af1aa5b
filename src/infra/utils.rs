//! Filepath: src/infra/utils.rs
//! Utility helpers organized by small, focused structs.
//! All functions are associated fns to keep call sites
//! ergonomic, testable, and discoverable.

// Tree-sitter types for node helpers
use tree_sitter::Node;

/// Common Tree-sitter node helpers
pub struct TsNodeUtils;

impl TsNodeUtils
{
    /// Extract text of a child field if present
    pub fn field_text<'a>(
        node: Node,
        field: &str,
        bytes: &'a [u8],
    ) -> Option<&'a str>
    {
        // Locate the child by field name
        let child = node.child_by_field_name(field)?;

        // Convert to utf8 text
        child
            .utf8_text(bytes)
            .ok()
    }

    /// Node text, or "" when the range is not valid UTF-8
    pub fn text<'a>(
        node: Node,
        bytes: &'a [u8],
    ) -> &'a str
    {
        node.utf8_text(bytes)
            .unwrap_or("")
    }

    /// Named children, skipping comments (extras)
    pub fn code_children<'a>(node: Node<'a>) -> Vec<Node<'a>>
    {
        let mut cursor = node.walk();

        node.named_children(&mut cursor)
            .filter(|c| c.kind() != "comment")
            .collect()
    }

    /// Named children attached to `field`, skipping comments
    pub fn field_children<'a>(
        node: Node<'a>,
        field: &str,
    ) -> Vec<Node<'a>>
    {
        let mut cursor = node.walk();

        node.children_by_field_name(field, &mut cursor)
            .filter(|c| c.is_named() && c.kind() != "comment")
            .collect()
    }

    /// Strip quotes from an interpreted or raw Go string literal
    pub fn unquote(literal: &str) -> &str
    {
        literal
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .or_else(|| {
                literal
                    .strip_prefix('`')
                    .and_then(|s| s.strip_suffix('`'))
            })
            .unwrap_or(literal)
    }

    /// Human-readable description of a Go syntax node, for diagnostics
    pub fn describe(node: Node) -> String
    {
        // Known kinds read better in Go's own vocabulary
        let known = match node.kind()
        {
            "source_file" => Some("source file"),
            "function_declaration" => Some("function declaration"),
            "method_declaration" => Some("method declaration"),
            "func_literal" => Some("function literal"),
            "parameter_list" => Some("parameter list"),
            "parameter_declaration" => Some("parameter"),
            "call_expression" => Some("function call"),
            "argument_list" => Some("argument list"),
            "identifier" | "field_identifier" | "type_identifier" | "package_identifier" =>
            {
                Some("identifier")
            }
            "block" => Some("block"),
            _ => None,
        };

        // Fall back to the grammar kind with spaces
        known
            .map(str::to_owned)
            .unwrap_or_else(|| {
                node.kind()
                    .replace('_', " ")
            })
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use tree_sitter::Parser;

    fn parse(src: &str) -> tree_sitter::Tree
    {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_go::LANGUAGE.into())
            .expect("go grammar");
        parser
            .parse(src, None)
            .expect("parse")
    }

    #[test]
    fn reads_fields_and_comment_free_children()
    {
        let src = "package p\n\nfunc f(a int, /* c */ b string) { g(a) }\n";
        let tree = parse(src);
        let bytes = src.as_bytes();

        let func = TsNodeUtils::code_children(tree.root_node())
            .into_iter()
            .find(|n| n.kind() == "function_declaration")
            .unwrap();
        assert_eq!(TsNodeUtils::field_text(func, "name", bytes), Some("f"));

        let params = func
            .child_by_field_name("parameters")
            .unwrap();
        let kinds: Vec<_> = TsNodeUtils::code_children(params)
            .iter()
            .map(|n| n.kind())
            .collect();
        assert_eq!(kinds, vec!["parameter_declaration", "parameter_declaration"]);
        assert_eq!(TsNodeUtils::describe(params), "parameter list");
    }

    #[test]
    fn unquotes_both_literal_forms()
    {
        assert_eq!(TsNodeUtils::unquote("\"example.com/m/util\""), "example.com/m/util");
        assert_eq!(TsNodeUtils::unquote("`raw`"), "raw");
        assert_eq!(TsNodeUtils::unquote("bare"), "bare");
    }
}
