//! Signature and call-site edits.
//!
//! Trees from the loader are immutable, so "mutating the forest" means
//! recording insertions against the original byte offsets of the shared
//! program. Call edges were computed on those same offsets, which keeps
//! them valid while edits pile up. [`PendingEdits::render`] splices the
//! insertions back into the text; formatting elsewhere is untouched.

use indexmap::IndexMap;
use tracing::debug;
use tree_sitter::Node;

use crate::core::callgraph::method_expression_type;
use crate::core::error::{RefactorError, RefactorResult};
use crate::core::position::SourceAddress;
use crate::infra::utils::TsNodeUtils;
use crate::parsers::go_parser::{FileId, Program};

/// What an insertion adds, kept for idempotence checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inserted {
    Parameter { name: String, ty: String },
    Argument { name: String },
}

#[derive(Debug, Clone)]
pub struct Insertion {
    /// Byte offset in the original text: just past the opening paren, or
    /// just past the receiver of a method expression
    pub offset: usize,
    pub inserted: Inserted,
    pub text: String,
}

/// Result of a single edit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    AlreadyPresent,
}

/// Insertions recorded against the program, per file.
#[derive(Debug, Default)]
pub struct PendingEdits {
    by_file: IndexMap<FileId, Vec<Insertion>>,
}

impl PendingEdits {
    pub fn is_empty(&self) -> bool {
        self.by_file.values().all(Vec::is_empty)
    }

    pub fn insertions(&self, file: FileId) -> &[Insertion] {
        self.by_file.get(&file).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The element that will end up first at `offset`, if any was inserted.
    fn leading(&self, file: FileId, offset: usize) -> Option<&Inserted> {
        self.insertions(file)
            .iter()
            .rev()
            .find(|i| i.offset == offset)
            .map(|i| &i.inserted)
    }

    fn has_any_at(&self, file: FileId, offset: usize) -> bool {
        self.leading(file, offset).is_some()
    }

    fn push(&mut self, file: FileId, insertion: Insertion) {
        self.by_file.entry(file).or_default().push(insertion);
    }

    /// Source text of `file` with every pending insertion applied.
    pub fn render(&self, program: &Program, file: FileId) -> String {
        let source = &program.file(file).source;
        let mut pending: Vec<(usize, &Insertion)> = self.insertions(file).iter().enumerate().collect();

        // Ascending offsets; at one offset the latest insertion goes first
        pending.sort_by(|(ia, a), (ib, b)| a.offset.cmp(&b.offset).then(ib.cmp(ia)));

        let extra: usize = pending.iter().map(|(_, i)| i.text.len()).sum();
        let mut out = String::with_capacity(source.len() + extra);
        let mut cursor = 0;
        for (_, ins) in pending {
            out.push_str(&source[cursor..ins.offset]);
            out.push_str(&ins.text);
            cursor = ins.offset;
        }
        out.push_str(&source[cursor..]);
        out
    }
}

/// Applies edits at resolved addresses, accumulating them in [`PendingEdits`].
pub struct Mutator<'p> {
    program: &'p Program,
    edits: PendingEdits,
}

impl<'p> Mutator<'p> {
    pub fn new(program: &'p Program) -> Self {
        Self {
            program,
            edits: PendingEdits::default(),
        }
    }

    pub fn edits(&self) -> &PendingEdits {
        &self.edits
    }

    pub fn into_edits(self) -> PendingEdits {
        self.edits
    }

    /// Prepend `name ty` to the parameter list at `address`.
    pub fn add_parameter(
        &mut self,
        address: &SourceAddress<'p>,
        name: &str,
        ty: &str,
        skip_if_present: bool,
    ) -> RefactorResult<EditOutcome> {
        let list = self.expect_kind(address, "parameter_list", "parameter list")?;
        let bytes = self.program.file(address.file).bytes();
        let offset = list.start_byte() + 1;
        let declared = TsNodeUtils::code_children(list);

        if skip_if_present {
            let present = match self.edits.leading(address.file, offset) {
                Some(Inserted::Parameter { name: n, ty: t }) => n == name && same_type(t, ty),
                Some(Inserted::Argument { .. }) => false,
                None => declared
                    .first()
                    .and_then(|p| first_parameter(*p, bytes))
                    .is_some_and(|(n, t)| n == name && same_type(t, ty)),
            };
            if present {
                debug!(at = %address.location(self.program), "parameter already present");
                return Ok(EditOutcome::AlreadyPresent);
            }
        }

        let empty = declared.is_empty() && !self.edits.has_any_at(address.file, offset);
        let text = element_text(&format!("{name} {ty}"), list, declared.first().copied(), empty, bytes);
        self.edits.push(
            address.file,
            Insertion {
                offset,
                inserted: Inserted::Parameter {
                    name: name.to_string(),
                    ty: ty.to_string(),
                },
                text,
            },
        );
        Ok(EditOutcome::Applied)
    }

    /// Prepend the identifier `name` to the arguments of the call at `address`.
    /// In a method expression (`T.M(recv, ..)`) it goes right after the receiver.
    pub fn add_argument(
        &mut self,
        address: &SourceAddress<'p>,
        name: &str,
        skip_if_present: bool,
    ) -> RefactorResult<EditOutcome> {
        let call = self.expect_kind(address, "call_expression", "function call")?;
        let args = call
            .child_by_field_name("arguments")
            .ok_or_else(|| self.wrong_kind(address, "function call", call))?;
        let file = self.program.file(address.file);
        let bytes = file.bytes();
        let given = TsNodeUtils::code_children(args);

        let receiver = call
            .child_by_field_name("function")
            .and_then(|f| method_expression_type(self.program, file, f, bytes))
            .and_then(|_| given.first().copied());
        if let Some(receiver) = receiver {
            return Ok(self.add_after_receiver(address, receiver, given.get(1).copied(), name, skip_if_present));
        }

        let offset = args.start_byte() + 1;
        if skip_if_present {
            let present = match self.edits.leading(address.file, offset) {
                Some(Inserted::Argument { name: n }) => n == name,
                Some(Inserted::Parameter { .. }) => false,
                None => given
                    .first()
                    .is_some_and(|a| a.kind() == "identifier" && TsNodeUtils::text(*a, bytes) == name),
            };
            if present {
                debug!(at = %address.location(self.program), "argument already present");
                return Ok(EditOutcome::AlreadyPresent);
            }
        }

        let empty = given.is_empty() && !self.edits.has_any_at(address.file, offset);
        let text = element_text(name, args, given.first().copied(), empty, bytes);
        self.edits.push(
            address.file,
            Insertion {
                offset,
                inserted: Inserted::Argument { name: name.to_string() },
                text,
            },
        );
        Ok(EditOutcome::Applied)
    }

    fn add_after_receiver(
        &mut self,
        address: &SourceAddress<'p>,
        receiver: Node<'p>,
        next: Option<Node<'p>>,
        name: &str,
        skip_if_present: bool,
    ) -> EditOutcome {
        let bytes = self.program.file(address.file).bytes();
        let offset = receiver.end_byte();

        if skip_if_present {
            let present = match self.edits.leading(address.file, offset) {
                Some(Inserted::Argument { name: n }) => n == name,
                Some(Inserted::Parameter { .. }) => false,
                None => next.is_some_and(|a| a.kind() == "identifier" && TsNodeUtils::text(a, bytes) == name),
            };
            if present {
                debug!(at = %address.location(self.program), "argument already present");
                return EditOutcome::AlreadyPresent;
            }
        }

        self.edits.push(
            address.file,
            Insertion {
                offset,
                inserted: Inserted::Argument { name: name.to_string() },
                text: format!(", {name}"),
            },
        );
        EditOutcome::Applied
    }

    fn expect_kind(
        &self,
        address: &SourceAddress<'p>,
        kind: &str,
        expected: &'static str,
    ) -> RefactorResult<Node<'p>> {
        match address.node() {
            Some(node) if node.kind() == kind => Ok(node),
            Some(node) => Err(self.wrong_kind(address, expected, node)),
            None => Err(RefactorError::WrongNodeKind {
                expected,
                found: "empty node path".to_string(),
                location: address.location(self.program),
            }),
        }
    }

    fn wrong_kind(&self, address: &SourceAddress<'p>, expected: &'static str, node: Node) -> RefactorError {
        RefactorError::WrongNodeKind {
            expected,
            found: TsNodeUtils::describe(node),
            location: address.location(self.program),
        }
    }
}

/// First name and type of a parameter declaration. Unnamed parameters
/// (`func(int)`) have no name and never match.
fn first_parameter<'a>(decl: Node, bytes: &'a [u8]) -> Option<(&'a str, &'a str)> {
    if !matches!(decl.kind(), "parameter_declaration" | "variadic_parameter_declaration") {
        return None;
    }
    let name = TsNodeUtils::field_children(decl, "name").into_iter().next()?;
    let ty = decl.child_by_field_name("type")?;
    let ty_text = TsNodeUtils::text(ty, bytes);
    Some((TsNodeUtils::text(name, bytes), ty_text))
}

fn same_type(a: &str, b: &str) -> bool {
    a.split_whitespace().eq(b.split_whitespace())
}

/// Text for a new leading element. Lists laid out one element per line
/// get the new element on its own line, at the same indentation.
fn element_text(item: &str, list: Node, first: Option<Node>, empty: bool, bytes: &[u8]) -> String {
    if empty {
        return item.to_string();
    }

    if let Some(first) = first
        && first.start_position().row > list.start_position().row
    {
        let line_start = bytes[..first.start_byte()]
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |p| p + 1);
        let indent = String::from_utf8_lossy(&bytes[line_start..first.start_byte()]);
        return format!("\n{indent}{item},");
    }

    format!("{item}, ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::position::resolve_range;
    use crate::parsers::go_parser::Program;

    fn program(src: &str) -> Program {
        Program::from_sources([("main.go", src)]).expect("parse")
    }

    fn params_at<'p>(prog: &'p Program, needle: &str) -> SourceAddress<'p> {
        let src = &prog.file(FileId(0)).source;
        let at = src.find(needle).expect("needle") + needle.find('(').expect("paren");
        resolve_range(prog, FileId(0), at, at, false).unwrap()
    }

    fn call_at<'p>(prog: &'p Program, needle: &str) -> SourceAddress<'p> {
        let src = &prog.file(FileId(0)).source;
        let at = src.find(needle).expect("needle");
        resolve_range(prog, FileId(0), at, at + needle.len(), false).unwrap()
    }

    #[test]
    fn prepends_parameter_and_argument() {
        let src = "package main\n\nfunc main() {\n\tx(42, \"life\")\n}\n\nfunc x(v int, s string) {}\n";
        let prog = program(src);
        let mut m = Mutator::new(&prog);

        assert_eq!(m.add_parameter(&params_at(&prog, "x(v int"), "foo", "int", true).unwrap(), EditOutcome::Applied);
        assert_eq!(m.add_parameter(&params_at(&prog, "main()"), "foo", "int", true).unwrap(), EditOutcome::Applied);
        assert_eq!(m.add_argument(&call_at(&prog, "x(42, \"life\")"), "foo", true).unwrap(), EditOutcome::Applied);

        let out = m.edits().render(&prog, FileId(0));
        assert_eq!(
            out,
            "package main\n\nfunc main(foo int) {\n\tx(foo, 42, \"life\")\n}\n\nfunc x(foo int, v int, s string) {}\n"
        );
    }

    #[test]
    fn existing_first_parameter_and_argument_are_kept_single() {
        let src = "package main\n\nfunc alreadyPresent(foo int) {\n\tx(foo, \"foobar\")\n}\n\nfunc x(foo int, s string) {}\n";
        let prog = program(src);
        let mut m = Mutator::new(&prog);

        let params = params_at(&prog, "alreadyPresent(foo");
        let call = call_at(&prog, "x(foo, \"foobar\")");
        assert_eq!(m.add_parameter(&params, "foo", "int", true).unwrap(), EditOutcome::AlreadyPresent);
        assert_eq!(m.add_argument(&call, "foo", true).unwrap(), EditOutcome::AlreadyPresent);
        assert!(m.edits().is_empty());

        // Same name, different type is a different parameter
        assert_eq!(m.add_parameter(&params, "foo", "string", true).unwrap(), EditOutcome::Applied);
    }

    #[test]
    fn repeated_requests_in_one_run_do_not_duplicate() {
        let src = "package main\n\nfunc f() {}\n";
        let prog = program(src);
        let mut m = Mutator::new(&prog);
        let params = params_at(&prog, "f()");

        assert_eq!(m.add_parameter(&params, "ctx", "context.Context", true).unwrap(), EditOutcome::Applied);
        assert_eq!(m.add_parameter(&params, "ctx", "context.Context", true).unwrap(), EditOutcome::AlreadyPresent);
        assert_eq!(m.edits().render(&prog, FileId(0)), "package main\n\nfunc f(ctx context.Context) {}\n");

        // Without the check, a second copy is prepended
        m.add_parameter(&params, "ctx", "context.Context", false).unwrap();
        assert_eq!(
            m.edits().render(&prog, FileId(0)),
            "package main\n\nfunc f(ctx context.Context, ctx context.Context) {}\n"
        );
    }

    #[test]
    fn multiline_lists_keep_one_element_per_line() {
        let src = "package main\n\nfunc f(\n\ta int,\n\tb int,\n) {}\n";
        let prog = program(src);
        let mut m = Mutator::new(&prog);

        m.add_parameter(&params_at(&prog, "f(\n"), "foo", "int", true).unwrap();

        assert_eq!(
            m.edits().render(&prog, FileId(0)),
            "package main\n\nfunc f(\n\tfoo int,\n\ta int,\n\tb int,\n) {}\n"
        );
    }

    #[test]
    fn method_expressions_keep_the_receiver_first() {
        let src = "package main\n\ntype T struct{}\n\nfunc (t T) M(n int) {}\n\nfunc main() {\n\tvar t T\n\tT.M(t, 1)\n\t(*T).M(&t, 2)\n}\n";
        let prog = program(src);
        let mut m = Mutator::new(&prog);

        m.add_argument(&call_at(&prog, "T.M(t, 1)"), "foo", true).unwrap();
        m.add_argument(&call_at(&prog, "(*T).M(&t, 2)"), "foo", true).unwrap();
        let again = m.add_argument(&call_at(&prog, "T.M(t, 1)"), "foo", true).unwrap();

        assert_eq!(again, EditOutcome::AlreadyPresent);
        let out = m.edits().render(&prog, FileId(0));
        assert!(out.contains("\tT.M(t, foo, 1)\n"), "{out}");
        assert!(out.contains("\t(*T).M(&t, foo, 2)\n"), "{out}");
    }

    #[test]
    fn wrong_node_kind_is_reported() {
        let src = "package main\n\nfunc f() {\n\tg()\n}\n\nfunc g() {}\n";
        let prog = program(src);
        let mut m = Mutator::new(&prog);

        let call = call_at(&prog, "g()");
        let err = m.add_parameter(&call, "foo", "int", true).unwrap_err();
        assert!(matches!(err, RefactorError::WrongNodeKind { expected: "parameter list", .. }));

        let params = params_at(&prog, "g()");
        let err = m.add_argument(&params, "foo", true).unwrap_err();
        assert!(matches!(err, RefactorError::WrongNodeKind { expected: "function call", .. }));
        assert!(m.edits().is_empty());
    }
}
