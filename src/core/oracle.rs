//! Call-graph oracle: "who calls the function at this address?"
//!
//! The propagation engine only sees [`CallGraphOracle`]. The production
//! implementation, [`AnalysisHandle`], owns the analysis scope and builds
//! the static call graph on first use.

use std::cell::OnceCell;

use tracing::{debug, info, instrument};

use crate::core::callgraph::{AnalysisScope, CallGraph, FunctionKind, FunctionRef};
use crate::core::error::{RefactorError, RefactorResult};
use crate::core::position::{SourceAddress, resolve_range};
use crate::parsers::go_parser::Program;

/// Where the caller's code lives, as far as signature propagation cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerKind
{
    /// Inside a function or method declaration (possibly in a nested literal)
    Function,
    /// Package-level variable initializer
    PackageInit,
    /// Function literal outside any declaration
    DetachedLiteral,
}

impl CallerKind
{
    pub fn of(kind: &FunctionKind) -> Self
    {
        match kind
        {
            FunctionKind::PackageInit { .. } => Self::PackageInit,
            FunctionKind::Literal {
                within_declaration: false,
                ..
            } => Self::DetachedLiteral,
            _ => Self::Function,
        }
    }
}

/// One call of `callee` from `caller`, located at `call_site`.
#[derive(Debug, Clone)]
pub struct CallEdge<'p>
{
    pub caller: FunctionRef,
    pub caller_kind: CallerKind,
    pub callee: FunctionRef,
    /// Exact address of the whole call expression
    pub call_site: SourceAddress<'p>,
}

pub trait CallGraphOracle<'p>
{
    /// Incoming call edges of the function enclosing `function`, ordered by call-site position.
    fn incoming_edges(
        &self,
        function: &SourceAddress<'p>,
    ) -> RefactorResult<Vec<CallEdge<'p>>>;
}

/// Analysis scope plus a lazily built call graph.
pub struct AnalysisHandle<'p>
{
    program: &'p Program,
    scope: AnalysisScope,
    graph: OnceCell<CallGraph<'p>>,
}

impl<'p> AnalysisHandle<'p>
{
    /// `main` packages are roots; every other initial package contributes its tests.
    #[instrument(skip_all)]
    pub fn build_scope(program: &'p Program) -> RefactorResult<Self>
    {
        let scope = AnalysisScope::collect(program);
        if !scope.has_roots()
        {
            return Err(RefactorError::NoAnalysisRoot);
        }

        info!(
            mains = scope
                .mains
                .len(),
            test_packages = scope
                .test_packages
                .len(),
            test_functions = scope.test_functions,
            "analysis scope ready"
        );

        Ok(Self {
            program,
            scope,
            graph: OnceCell::new(),
        })
    }

    /// The call graph, built on first access and cached for the handle's lifetime.
    pub fn graph(&self) -> &CallGraph<'p>
    {
        self.graph
            .get_or_init(|| CallGraph::build(self.program, &self.scope))
    }
}

impl<'p> CallGraphOracle<'p> for AnalysisHandle<'p>
{
    fn incoming_edges(
        &self,
        function: &SourceAddress<'p>,
    ) -> RefactorResult<Vec<CallEdge<'p>>>
    {
        let graph = self.graph();

        let syntax = function
            .path
            .iter()
            .find(|n| {
                matches!(
                    n.kind(),
                    "function_declaration" | "method_declaration" | "func_literal"
                )
            })
            .ok_or_else(|| {
                RefactorError::Analysis(format!(
                    "{}: this position is not inside a function",
                    function.location(self.program)
                ))
            })?;

        let callee = graph
            .function_for(function.file, *syntax)
            .ok_or_else(|| {
                RefactorError::Analysis(format!(
                    "{}: no function built for this location",
                    function.location(self.program)
                ))
            })?;

        let mut edges = Vec::new();
        for (caller, site) in graph.callers_of(callee)
        {
            let call_site = resolve_range(
                self.program,
                site.file,
                site.node
                    .start_byte(),
                site.node
                    .end_byte(),
                true,
            )?;
            edges.push(CallEdge {
                caller,
                caller_kind: CallerKind::of(graph.kind(caller)),
                callee,
                call_site,
            });
        }
        edges.sort_by_key(|e| e.call_site.call_key());

        debug!(
            function = %graph.describe(callee, self.program),
            callers = edges.len(),
            "incoming edges"
        );
        Ok(edges)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::core::position::resolve_str;

    #[test]
    fn libraries_without_tests_have_no_root()
    {
        let program = Program::from_sources([("lib/lib.go", "package lib\n\nfunc F() {}\n")]).unwrap();

        assert!(matches!(
            AnalysisHandle::build_scope(&program),
            Err(RefactorError::NoAnalysisRoot)
        ));
    }

    #[test]
    fn edges_are_ordered_and_exact()
    {
        let src = "package main\n\nfunc main() {\n\tx()\n\tx()\n}\n\nfunc x() {}\n";
        let program = Program::from_sources([("main.go", src)]).unwrap();
        let handle = AnalysisHandle::build_scope(&program).unwrap();

        let at = src.find("func x").unwrap();
        let x = resolve_str(&program, &format!("main.go:#{at}"), false).unwrap();
        let edges = handle
            .incoming_edges(&x)
            .unwrap();

        let starts: Vec<usize> = edges
            .iter()
            .map(|e| e.call_site.start)
            .collect();
        let first = src.find("x()").unwrap();
        assert_eq!(starts, vec![first, first + 5]);
        assert!(
            edges
                .iter()
                .all(|e| e.call_site.exact && e.caller_kind == CallerKind::Function)
        );
    }

    #[test]
    fn top_level_positions_are_not_inside_a_function()
    {
        let src = "package main\n\nvar v = 1\n\nfunc main() {}\n";
        let program = Program::from_sources([("main.go", src)]).unwrap();
        let handle = AnalysisHandle::build_scope(&program).unwrap();

        let at = src.find("var").unwrap();
        let addr = resolve_str(&program, &format!("main.go:#{at}"), false).unwrap();
        let err = handle
            .incoming_edges(&addr)
            .unwrap_err();

        assert!(err.to_string().ends_with("this position is not inside a function"), "{err}");
    }
}
