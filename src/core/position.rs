//! Position resolution: `file:#start[,#end]` → syntax address.
//!
//! A [`SourceAddress`] is a view into the loaded [`Program`]: the innermost
//! named node enclosing a byte range, plus its ancestors up to the file
//! root. It borrows the trees and never owns nodes.

use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;
use tree_sitter::Node;

use crate::core::error::{RefactorError, RefactorResult};
use crate::infra::utils::TsNodeUtils;
use crate::parsers::go_parser::{FileId, Program};

/// Deduplication key: a byte offset within one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PositionKey {
    pub file: FileId,
    pub offset: usize,
}

#[derive(Debug, Clone)]
pub struct SourceAddress<'p> {
    pub start: usize,
    pub end: usize,
    /// Matched node first, file root last; never empty
    pub path: Vec<Node<'p>>,
    /// The range is exactly the extent of `path[0]`
    pub exact: bool,
    pub file: FileId,
}

impl<'p> SourceAddress<'p> {
    /// Two addresses are the same point iff their starts coincide.
    pub fn key(&self) -> PositionKey {
        PositionKey {
            file: self.file,
            offset: self.start,
        }
    }

    /// Key for a call expression: the offset of its opening paren. Chained
    /// calls (`b.With(1).Run()`) share a start offset but never a paren.
    /// Anything else keys by its start.
    pub fn call_key(&self) -> PositionKey {
        let paren = self
            .node()
            .filter(|n| n.kind() == "call_expression")
            .and_then(|n| n.child_by_field_name("arguments"))
            .map_or(self.start, |args| args.start_byte());
        PositionKey {
            file: self.file,
            offset: paren,
        }
    }

    /// The matched (innermost) node.
    pub fn node(&self) -> Option<Node<'p>> {
        self.path.first().copied()
    }

    /// `path:line:col` of the start offset.
    pub fn location(&self, program: &Program) -> String {
        program.file(self.file).location(self.start)
    }

    /// Address of a node whose ancestors are already known.
    /// `ancestors` runs from the node's parent up to the file root.
    pub fn of_node(file: FileId, node: Node<'p>, ancestors: &[Node<'p>]) -> Self {
        let mut path = Vec::with_capacity(ancestors.len() + 1);
        path.push(node);
        path.extend_from_slice(ancestors);
        Self {
            start: node.start_byte(),
            end: node.end_byte(),
            path,
            exact: true,
            file,
        }
    }
}

/// Parsed `-pos` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosDescriptor {
    pub file: PathBuf,
    pub start: usize,
    pub end: usize,
}

impl FromStr for PosDescriptor {
    type Err = RefactorError;

    /// Accepts `file:#123` and `file:#123,#456`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RefactorError::InvalidPosition(s.to_string());

        let (file, offsets) = s.rsplit_once(':').ok_or_else(invalid)?;
        if file.is_empty() {
            return Err(invalid());
        }

        let parse_offset = |t: &str| -> Result<usize, RefactorError> {
            t.trim()
                .strip_prefix('#')
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(invalid)
        };

        let (start, end) = match offsets.split_once(',') {
            Some((a, b)) => (parse_offset(a)?, parse_offset(b)?),
            None => {
                let off = parse_offset(offsets)?;
                (off, off)
            }
        };

        if end < start {
            return Err(invalid());
        }

        Ok(Self {
            file: PathBuf::from(file),
            start,
            end,
        })
    }
}

/// Resolve a descriptor against the loaded program.
pub fn resolve<'p>(
    program: &'p Program,
    desc: &PosDescriptor,
    need_exact: bool,
) -> RefactorResult<SourceAddress<'p>> {
    let file = program
        .find_file(&desc.file)
        .ok_or_else(|| RefactorError::FileNotLoaded(desc.file.clone()))?;
    resolve_range(program, file, desc.start, desc.end, need_exact)
}

/// Resolve a `-pos`-style string.
pub fn resolve_str<'p>(program: &'p Program, pos: &str, need_exact: bool) -> RefactorResult<SourceAddress<'p>> {
    resolve(program, &pos.parse()?, need_exact)
}

/// Resolve a byte range within an already-identified file.
pub fn resolve_range<'p>(
    program: &'p Program,
    file: FileId,
    start: usize,
    end: usize,
    need_exact: bool,
) -> RefactorResult<SourceAddress<'p>> {
    let sf = program.file(file);

    if start > end || end > sf.source.len() {
        return Err(RefactorError::NoSyntaxAtPosition {
            file: sf.path.clone(),
            start,
            end,
        });
    }

    // Descend from the root, always into the named child enclosing the range
    let mut path = vec![sf.root()];
    let mut node = sf.root();
    while let Some(child) = TsNodeUtils::code_children(node)
        .into_iter()
        .find(|c| encloses(*c, start, end))
    {
        path.push(child);
        node = child;
    }
    path.reverse();

    let exact = node.start_byte() == start && node.end_byte() == end;
    if need_exact && !exact {
        return Err(RefactorError::AmbiguousSelection {
            description: TsNodeUtils::describe(node),
        });
    }

    Ok(SourceAddress {
        start,
        end,
        path,
        exact,
        file,
    })
}

/// A node encloses a range when the range lies within its extent. A point
/// sitting exactly at a node's end belongs to whatever follows it.
fn encloses(node: Node, start: usize, end: usize) -> bool {
    let (s, e) = (node.start_byte(), node.end_byte());
    s <= start && end <= e && (start < e || s == e)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: &str = "package main\n\nfunc main() {\n\tx(42, \"life\")\n}\n\nfunc x(v int, s string) {\n}\n";

    fn program() -> Program {
        Program::from_sources([("main.go", SRC)]).expect("parse")
    }

    #[test]
    fn parses_descriptors() {
        let d: PosDescriptor = "a/b.go:#12".parse().unwrap();
        assert_eq!(d, PosDescriptor { file: "a/b.go".into(), start: 12, end: 12 });

        let d: PosDescriptor = "b.go:#3,#9".parse().unwrap();
        assert_eq!((d.start, d.end), (3, 9));

        for bad in ["b.go", "b.go:12", ":#1", "b.go:#9,#3", "b.go:#x"] {
            assert!(
                matches!(bad.parse::<PosDescriptor>(), Err(RefactorError::InvalidPosition(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn point_at_paren_resolves_to_parameter_list() {
        let prog = program();
        let at = SRC.find("(v int").unwrap();

        let addr = resolve_str(&prog, &format!("main.go:#{at}"), false).unwrap();

        let node = addr.node().unwrap();
        assert_eq!(node.kind(), "parameter_list");
        assert_eq!(addr.path[1].kind(), "function_declaration");
        assert_eq!(addr.path.last().unwrap().kind(), "source_file");
        assert!(!addr.exact);
    }

    #[test]
    fn full_extent_is_exact() {
        let prog = program();
        let start = SRC.find("x(42").unwrap();
        let end = start + "x(42, \"life\")".len();

        let addr = resolve_range(&prog, FileId(0), start, end, true).unwrap();

        assert!(addr.exact);
        assert_eq!(addr.node().unwrap().kind(), "call_expression");
        assert_eq!(addr.key(), PositionKey { file: FileId(0), offset: start });
        assert_eq!(addr.call_key(), PositionKey { file: FileId(0), offset: start + 1 });
    }

    #[test]
    fn chained_calls_have_distinct_call_keys() {
        let src = "package main\n\nfunc main() {\n\tb.With(1).Run()\n}\n";
        let prog = Program::from_sources([("main.go", src)]).unwrap();
        let start = src.find("b.With").unwrap();
        let inner_end = start + "b.With(1)".len();
        let outer_end = start + "b.With(1).Run()".len();

        let inner = resolve_range(&prog, FileId(0), start, inner_end, true).unwrap();
        let outer = resolve_range(&prog, FileId(0), start, outer_end, true).unwrap();

        assert_eq!(inner.key(), outer.key());
        assert_ne!(inner.call_key(), outer.call_key());
        assert_eq!(inner.call_key().offset, src.find("(1)").unwrap());
        assert_eq!(outer.call_key().offset, src.find("()\n}").unwrap());
    }

    #[test]
    fn inexact_selection_is_rejected_when_exact_is_required() {
        let prog = program();
        let start = SRC.find("x(42").unwrap();

        let err = resolve_range(&prog, FileId(0), start + 1, start + 3, true).unwrap_err();

        assert!(matches!(err, RefactorError::AmbiguousSelection { .. }));
    }

    #[test]
    fn out_of_file_and_unknown_files_fail() {
        let prog = program();

        let err = resolve_str(&prog, "main.go:#100000", false).unwrap_err();
        assert!(matches!(err, RefactorError::NoSyntaxAtPosition { .. }));

        let err = resolve_str(&prog, "other.go:#1", false).unwrap_err();
        assert!(matches!(err, RefactorError::FileNotLoaded(_)));
    }
}
