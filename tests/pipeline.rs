//! Library-level tests for the resolve → plan → apply → render pipeline

use argthread::core::position::resolve_range;
use argthread::core::refactor::{EditRequest, apply, plan, touched_files};
use argthread::parsers::{FileId, Program};
use proptest::prelude::*;

const SRC: &str = r#"package main

import "strings"

type server struct{ name string }

func (s *server) handle(path string) string {
	return strings.ToUpper(s.name) + render(path)
}

func render(path string) string {
	return wrap(path, 0)
}

func wrap(body string, depth int) string {
	if depth > 2 {
		return body
	}
	return wrap("<"+body+">", depth+1)
}

func main() {
	s := &server{name: "demo"}
	println(s.handle("/"))
}
"#;

fn run_once(src: &str) -> String
{
    let program = Program::from_sources([("main.go", src)]).expect("parse");
    let at = src.find("func wrap(").unwrap() + "func wrap".len();
    let request = EditRequest::parse("ctx context.Context", &format!("main.go:#{at}"), true).unwrap();

    let frontier = plan(&program, &request).expect("plan");
    let edits = apply(&program, &frontier, &request).expect("apply");

    assert_eq!(touched_files(&frontier), vec![FileId(0)]);
    edits.render(&program, FileId(0))
}

#[test]
fn threads_through_recursion_and_methods()
{
    let out = run_once(SRC);

    assert!(out.contains("func wrap(ctx context.Context, body string, depth int) string {"));
    assert!(out.contains("\treturn wrap(ctx, \"<\"+body+\">\", depth+1)"));
    assert!(out.contains("func render(ctx context.Context, path string) string {"));
    assert!(out.contains("\treturn wrap(ctx, path, 0)"));
    assert!(out.contains("func (s *server) handle(ctx context.Context, path string) string {"));
    assert!(out.contains("strings.ToUpper(s.name) + render(ctx, path)"));
    assert!(out.contains("\tprintln(s.handle(ctx, \"/\"))"));
    assert!(out.contains("func main(ctx context.Context) {"));
    // Calls into packages outside the program are untouched
    assert!(out.contains("strings.ToUpper(s.name)"));
}

#[test]
fn rerunning_on_the_output_is_a_fixed_point()
{
    let once = run_once(SRC);
    let twice = run_once(&once);
    assert_eq!(once, twice);
}

proptest! {
    /// Every node on a resolved path encloses the selection, and each
    /// node lies within the next one up.
    #[test]
    fn resolved_paths_enclose_the_selection(a in 0usize..=SRC.len(), b in 0usize..=SRC.len())
    {
        let (start, end) = if a <= b { (a, b) } else { (b, a) };
        let program = Program::from_sources([("main.go", SRC)]).unwrap();

        let addr = resolve_range(&program, FileId(0), start, end, false).unwrap();

        prop_assert_eq!(addr.path.last().unwrap().kind(), "source_file");
        for node in &addr.path[..addr.path.len() - 1]
        {
            prop_assert!(node.start_byte() <= start && end <= node.end_byte());
        }
        for pair in addr.path.windows(2)
        {
            prop_assert!(pair[1].start_byte() <= pair[0].start_byte());
            prop_assert!(pair[0].end_byte() <= pair[1].end_byte());
        }
        prop_assert_eq!(
            addr.exact,
            addr.path[0].start_byte() == start && addr.path[0].end_byte() == end
        );
    }
}
