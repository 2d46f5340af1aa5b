//! Static whole-program call graph over the loaded Go syntax.
//!
//! Nodes are functions (declarations, methods, literals) plus a few
//! synthetic entry points; edges carry the call expression when there is
//! one. Bookkeeping edges (root wiring, `init` calls, literal containment,
//! function values) have no call site and only feed reachability.
//!
//! Resolution is syntactic. Calls whose receiver comes from a package
//! outside the program (an import that was not loaded, a value of one of
//! its types, or a local bound to one of its results) have no callee here.
//! A method call on a local receiver whose type cannot be inferred links to
//! every method of that name in the program.

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, EdgeRef};
use tracing::{debug, instrument};
use tree_sitter::Node;

use crate::infra::utils::TsNodeUtils;
use crate::parsers::go_parser::{FileId, PackageId, Program, SourceFile};

pub type FunctionRef = NodeIndex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionKind
{
    /// Synthetic entry; calls every `main`, every package initializer and `TestMain`
    Root,
    /// Synthetic test driver; calls every test entry point
    TestMain,
    /// Package-level variable initialization and `init` functions
    PackageInit
    {
        package: PackageId,
    },
    Declared
    {
        package: PackageId,
        file: FileId,
        name: String,
    },
    Method
    {
        package: PackageId,
        file: FileId,
        receiver: String,
        name: String,
    },
    Literal
    {
        package: PackageId,
        file: FileId,
        /// Lexically inside a function or method declaration
        within_declaration: bool,
    },
}

#[derive(Debug, Clone)]
pub struct FunctionNode<'p>
{
    pub kind: FunctionKind,
    /// Declaration or literal node; `None` for synthetic functions
    pub syntax: Option<Node<'p>>,
}

/// The call expression behind an edge.
#[derive(Debug, Clone, Copy)]
pub struct CallSite<'p>
{
    pub file: FileId,
    pub node: Node<'p>,
}

/// Which initially loaded packages seed the graph.
#[derive(Debug, Clone, Default)]
pub struct AnalysisScope
{
    /// `package main` with a `func main()`
    pub mains: Vec<PackageId>,
    /// Every other initial package; contributes its test entry points
    pub test_packages: Vec<PackageId>,
    pub test_functions: usize,
}

impl AnalysisScope
{
    pub fn collect(program: &Program) -> Self
    {
        let mut scope = Self::default();

        for package in program
            .packages()
            .iter()
            .filter(|p| p.initial)
        {
            let files: Vec<&SourceFile> = package
                .files
                .iter()
                .map(|f| program.file(*f))
                .collect();

            let has_main = package.name == "main"
                && files
                    .iter()
                    .any(|f| top_level_functions(f).any(|n| n == "main"));

            if has_main
            {
                scope
                    .mains
                    .push(package.id);
                continue;
            }

            scope.test_functions += files
                .iter()
                .filter(|f| f.is_test)
                .flat_map(|f| top_level_functions(*f))
                .filter(|n| is_test_entry(n))
                .count();
            scope
                .test_packages
                .push(package.id);
        }

        scope
    }

    pub fn has_roots(&self) -> bool
    {
        !self
            .mains
            .is_empty()
            || self.test_functions > 0
    }
}

/// Names of top-level `func` declarations (not methods).
fn top_level_functions(file: &SourceFile) -> impl Iterator<Item = &str>
{
    let bytes = file.bytes();
    TsNodeUtils::code_children(file.root())
        .into_iter()
        .filter(|n| n.kind() == "function_declaration")
        .filter_map(move |n| TsNodeUtils::field_text(n, "name", bytes))
}

/// `TestXxx`, `BenchmarkXxx`, `FuzzXxx`, `ExampleXxx` (the suffix must not
/// start with a lowercase letter).
pub fn is_test_entry(name: &str) -> bool
{
    ["Test", "Benchmark", "Fuzz", "Example"]
        .iter()
        .filter_map(|prefix| name.strip_prefix(prefix))
        .any(|rest| {
            !rest
                .chars()
                .next()
                .is_some_and(char::is_lowercase)
        })
}

pub struct CallGraph<'p>
{
    graph: DiGraph<FunctionNode<'p>, Option<CallSite<'p>>>,
    root: FunctionRef,
    test_main: FunctionRef,
    by_syntax: HashMap<(FileId, usize), FunctionRef>,
    reachable: HashSet<FunctionRef>,
}

impl<'p> CallGraph<'p>
{
    #[instrument(skip_all)]
    pub fn build(
        program: &'p Program,
        scope: &AnalysisScope,
    ) -> Self
    {
        let mut builder = Builder::new(program);
        builder.declare(scope);

        let items = builder.scan_items();
        for item in &items
        {
            builder.connect(item);
        }

        let graph = builder.finish();
        debug!(
            functions = graph
                .graph
                .node_count(),
            edges = graph
                .graph
                .edge_count(),
            reachable = graph
                .reachable
                .len(),
            "call graph built"
        );
        graph
    }

    /// Function whose declaration or literal node is `node`.
    pub fn function_for(
        &self,
        file: FileId,
        node: Node,
    ) -> Option<FunctionRef>
    {
        if !matches!(node.kind(), "function_declaration" | "method_declaration" | "func_literal")
        {
            return None;
        }
        self.by_syntax
            .get(&(file, node.start_byte()))
            .copied()
    }

    pub fn functions(&self) -> impl Iterator<Item = FunctionRef> + '_
    {
        self.graph
            .node_indices()
    }

    pub fn kind(
        &self,
        f: FunctionRef,
    ) -> &FunctionKind
    {
        &self.graph[f].kind
    }

    pub fn is_synthetic(
        &self,
        f: FunctionRef,
    ) -> bool
    {
        f == self.root || f == self.test_main
    }

    pub fn is_reachable(
        &self,
        f: FunctionRef,
    ) -> bool
    {
        self.reachable
            .contains(&f)
    }

    /// Reachable, non-synthetic callers of `f` that call it through syntax.
    pub fn callers_of(
        &self,
        f: FunctionRef,
    ) -> Vec<(FunctionRef, CallSite<'p>)>
    {
        self.graph
            .edges_directed(f, Direction::Incoming)
            .filter(|e| self.is_reachable(e.source()) && !self.is_synthetic(e.source()))
            .filter_map(|e| (*e.weight()).map(|site| (e.source(), site)))
            .collect()
    }

    /// Short human-readable name for logs.
    pub fn describe(
        &self,
        f: FunctionRef,
        program: &Program,
    ) -> String
    {
        match self.kind(f)
        {
            FunctionKind::Root => "<root>".to_string(),
            FunctionKind::TestMain => "<testmain>".to_string(),
            FunctionKind::PackageInit { package } => format!("{}.init", program.package(*package).name),
            FunctionKind::Declared { package, name, .. } => format!("{}.{name}", program.package(*package).name),
            FunctionKind::Method { receiver, name, .. } => format!("{receiver}.{name}"),
            FunctionKind::Literal { file, .. } =>
            {
                let at = self.graph[f]
                    .syntax
                    .map_or(0, |n| n.start_byte());
                format!("func literal at {}", program.file(*file).location(at))
            }
        }
    }
}

/// What a local or package-level name is known to hold.
#[derive(Debug, Clone, Copy)]
enum Binding<'p>
{
    Literal(FunctionRef),
    /// Named type of the value, possibly package-qualified (`pkg.T`)
    Type(&'p str),
    /// Value produced by a package outside the program
    Foreign,
    Opaque,
}

/// Where a named type lives, as far as method lookup is concerned.
#[derive(Debug, Clone, Copy)]
enum TypeTarget<'p>
{
    Loaded(PackageId, &'p str),
    /// Declared in an imported package that is not part of the program
    Foreign,
    /// Qualified by a name that is not an import
    Unknown,
}

/// One top-level declaration and the names bound inside it.
/// Bindings are flow-insensitive: a name means the same thing
/// everywhere in the declaration.
struct ItemScope<'p>
{
    file: &'p SourceFile,
    item: Node<'p>,
    owner: FunctionRef,
    within_declaration: bool,
    bindings: HashMap<&'p str, Binding<'p>>,
    literals: HashMap<usize, FunctionRef>,
}

struct Builder<'p>
{
    program: &'p Program,
    graph: DiGraph<FunctionNode<'p>, Option<CallSite<'p>>>,
    root: FunctionRef,
    test_main: FunctionRef,
    package_inits: Vec<FunctionRef>,
    funcs: HashMap<(PackageId, &'p str), FunctionRef>,
    methods: HashMap<(PackageId, &'p str, &'p str), FunctionRef>,
    methods_by_name: HashMap<&'p str, Vec<FunctionRef>>,
    package_bindings: HashMap<(PackageId, &'p str), Binding<'p>>,
    by_syntax: HashMap<(FileId, usize), FunctionRef>,
}

impl<'p> Builder<'p>
{
    fn new(program: &'p Program) -> Self
    {
        let mut graph = DiGraph::new();
        let root = graph.add_node(FunctionNode {
            kind: FunctionKind::Root,
            syntax: None,
        });
        let test_main = graph.add_node(FunctionNode {
            kind: FunctionKind::TestMain,
            syntax: None,
        });
        graph.add_edge(root, test_main, None);

        Self {
            program,
            graph,
            root,
            test_main,
            package_inits: Vec::new(),
            funcs: HashMap::new(),
            methods: HashMap::new(),
            methods_by_name: HashMap::new(),
            package_bindings: HashMap::new(),
            by_syntax: HashMap::new(),
        }
    }

    fn add_function(
        &mut self,
        kind: FunctionKind,
        file: FileId,
        syntax: Node<'p>,
    ) -> FunctionRef
    {
        let f = self
            .graph
            .add_node(FunctionNode {
                kind,
                syntax: Some(syntax),
            });
        self.by_syntax
            .insert((file, syntax.start_byte()), f);
        f
    }

    /// Nodes for every package initializer, declaration and method, plus root wiring.
    fn declare(
        &mut self,
        scope: &AnalysisScope,
    )
    {
        let program = self.program;

        for package in program.packages()
        {
            let init = self
                .graph
                .add_node(FunctionNode {
                    kind: FunctionKind::PackageInit {
                        package: package.id,
                    },
                    syntax: None,
                });
            self.graph
                .add_edge(self.root, init, None);
            self.package_inits
                .push(init);
        }

        for file in program.files()
        {
            let package = file.package;
            let bytes = file.bytes();

            for item in TsNodeUtils::code_children(file.root())
            {
                match item.kind()
                {
                    "function_declaration" =>
                    {
                        let Some(name) = TsNodeUtils::field_text(item, "name", bytes)
                        else
                        {
                            continue;
                        };
                        let kind = FunctionKind::Declared {
                            package,
                            file: file.id,
                            name: name.to_string(),
                        };
                        let f = self.add_function(kind, file.id, item);

                        // Multiple `init`s per package are legal and never callable by name
                        if name == "init"
                        {
                            self.graph
                                .add_edge(self.package_inits[package.0], f, None);
                        }
                        else
                        {
                            self.funcs
                                .insert((package, name), f);
                        }

                        if name == "main" && scope.mains.contains(&package)
                        {
                            self.graph
                                .add_edge(self.root, f, None);
                        }
                        if file.is_test && is_test_entry(name) && scope.test_packages.contains(&package)
                        {
                            self.graph
                                .add_edge(self.test_main, f, None);
                        }
                    }
                    "method_declaration" =>
                    {
                        let Some(name) = TsNodeUtils::field_text(item, "name", bytes)
                        else
                        {
                            continue;
                        };
                        let receiver = receiver_type(item, bytes).unwrap_or("");
                        let kind = FunctionKind::Method {
                            package,
                            file: file.id,
                            receiver: receiver.to_string(),
                            name: name.to_string(),
                        };
                        let f = self.add_function(kind, file.id, item);
                        self.methods
                            .insert((package, receiver, name), f);
                        self.methods_by_name
                            .entry(name)
                            .or_default()
                            .push(f);
                    }
                    _ =>
                    {}
                }
            }
        }
    }

    /// Literal nodes and name bindings for every top-level item that can contain calls.
    fn scan_items(&mut self) -> Vec<ItemScope<'p>>
    {
        let program = self.program;
        let mut items = Vec::new();

        for file in program.files()
        {
            for item in TsNodeUtils::code_children(file.root())
            {
                let (owner, within_declaration) = match item.kind()
                {
                    "function_declaration" | "method_declaration" =>
                    {
                        match self
                            .by_syntax
                            .get(&(file.id, item.start_byte()))
                        {
                            Some(f) => (*f, true),
                            None => continue,
                        }
                    }
                    // Calls in package-level initializers run as part of package init
                    "var_declaration" | "const_declaration" => (self.package_inits[file.package.0], false),
                    _ => continue,
                };

                let mut scope = ItemScope {
                    file,
                    item,
                    owner,
                    within_declaration,
                    bindings: HashMap::new(),
                    literals: HashMap::new(),
                };
                self.collect_literals(&mut scope);
                self.collect_bindings(&mut scope);

                if !within_declaration
                {
                    self.export_package_bindings(&scope);
                }
                items.push(scope);
            }
        }

        items
    }

    fn collect_literals(
        &mut self,
        scope: &mut ItemScope<'p>,
    )
    {
        let mut stack = vec![scope.item];
        while let Some(node) = stack.pop()
        {
            if node.kind() == "func_literal"
            {
                let kind = FunctionKind::Literal {
                    package: scope
                        .file
                        .package,
                    file: scope.file.id,
                    within_declaration: scope.within_declaration,
                };
                let lit = self.add_function(kind, scope.file.id, node);
                scope
                    .literals
                    .insert(node.start_byte(), lit);
            }
            stack.extend(TsNodeUtils::code_children(node));
        }
    }

    fn collect_bindings(
        &self,
        scope: &mut ItemScope<'p>,
    )
    {
        let file: &'p SourceFile = scope.file;
        let bytes = file.bytes();
        let mut stack = vec![scope.item];

        while let Some(node) = stack.pop()
        {
            match node.kind()
            {
                "parameter_declaration" | "variadic_parameter_declaration" =>
                {
                    let ty = node
                        .child_by_field_name("type")
                        .and_then(|t| named_type(t, bytes));
                    for name in TsNodeUtils::field_children(node, "name")
                    {
                        let value = ty.map_or(Binding::Opaque, Binding::Type);
                        bind(&mut scope.bindings, TsNodeUtils::text(name, bytes), value);
                    }
                }
                "short_var_declaration" | "assignment_statement" =>
                {
                    let side = |field: &str| {
                        node.child_by_field_name(field)
                            .map(TsNodeUtils::code_children)
                            .unwrap_or_default()
                    };
                    let (left, right) = (side("left"), side("right"));

                    for (i, target) in left
                        .iter()
                        .enumerate()
                    {
                        if target.kind() != "identifier"
                        {
                            continue;
                        }
                        let value = match right.as_slice()
                        {
                            _ if left.len() == right.len() => self.value_binding(scope, right[i], bytes),
                            // f, err := os.Open(..)
                            [call] if self.is_foreign(scope, *call) => Binding::Foreign,
                            _ => Binding::Opaque,
                        };
                        // Plain assignments only matter when they bind a literal
                        if node.kind() == "assignment_statement" && !matches!(value, Binding::Literal(_))
                        {
                            continue;
                        }
                        bind(&mut scope.bindings, TsNodeUtils::text(*target, bytes), value);
                    }
                }
                "var_spec" | "const_spec" =>
                {
                    let names = TsNodeUtils::field_children(node, "name");
                    let declared = node
                        .child_by_field_name("type")
                        .and_then(|t| named_type(t, bytes));
                    let values = node
                        .child_by_field_name("value")
                        .map(TsNodeUtils::code_children)
                        .unwrap_or_default();

                    for (i, name) in names
                        .iter()
                        .enumerate()
                    {
                        let assigned = match values.as_slice()
                        {
                            _ if values.len() == names.len() => self.value_binding(scope, values[i], bytes),
                            [call] if self.is_foreign(scope, *call) => Binding::Foreign,
                            _ => Binding::Opaque,
                        };
                        let value = match (assigned, declared)
                        {
                            (Binding::Literal(l), _) => Binding::Literal(l),
                            (_, Some(t)) => Binding::Type(t),
                            (other, None) => other,
                        };
                        bind(&mut scope.bindings, TsNodeUtils::text(*name, bytes), value);
                    }
                }
                "range_clause" =>
                {
                    if let Some(left) = node.child_by_field_name("left")
                    {
                        for target in TsNodeUtils::code_children(left)
                        {
                            bind(&mut scope.bindings, TsNodeUtils::text(target, bytes), Binding::Opaque);
                        }
                    }
                }
                _ =>
                {}
            }
            stack.extend(TsNodeUtils::code_children(node));
        }
    }

    /// Names declared directly by a package-level `var`/`const` are visible package-wide.
    fn export_package_bindings(
        &mut self,
        scope: &ItemScope<'p>,
    )
    {
        let file: &'p SourceFile = scope.file;
        let bytes = file.bytes();
        let mut specs = TsNodeUtils::code_children(scope.item);
        while let Some(spec) = specs.pop()
        {
            match spec.kind()
            {
                "var_spec_list" | "const_spec_list" => specs.extend(TsNodeUtils::code_children(spec)),
                "var_spec" | "const_spec" =>
                {
                    for name in TsNodeUtils::field_children(spec, "name")
                    {
                        let name = TsNodeUtils::text(name, bytes);
                        if let Some(b) = scope
                            .bindings
                            .get(name)
                        {
                            self.package_bindings
                                .insert((scope.file.package, name), *b);
                        }
                    }
                }
                _ =>
                {}
            }
        }
    }

    /// Add every edge originating in one top-level item.
    fn connect(
        &mut self,
        scope: &ItemScope<'p>,
    )
    {
        let mut stack = vec![(scope.item, scope.owner)];

        while let Some((node, current)) = stack.pop()
        {
            match node.kind()
            {
                "func_literal" =>
                {
                    if let Some(&lit) = scope
                        .literals
                        .get(&node.start_byte())
                    {
                        self.graph
                            .add_edge(current, lit, None);
                        stack.extend(
                            TsNodeUtils::code_children(node)
                                .into_iter()
                                .map(|c| (c, lit)),
                        );
                        continue;
                    }
                }
                "call_expression" =>
                {
                    let site = CallSite {
                        file: scope.file.id,
                        node,
                    };
                    for callee in self.resolve_call(scope, node)
                    {
                        self.graph
                            .add_edge(current, callee, Some(site));
                    }

                    // The callee name itself is not a function value
                    let function = node.child_by_field_name("function");
                    for child in TsNodeUtils::code_children(node)
                    {
                        if Some(child) == function
                        {
                            match child.kind()
                            {
                                "identifier" => continue,
                                "selector_expression" =>
                                {
                                    if let Some(operand) = child.child_by_field_name("operand")
                                    {
                                        stack.push((operand, current));
                                    }
                                    continue;
                                }
                                _ =>
                                {}
                            }
                        }
                        stack.push((child, current));
                    }
                    continue;
                }
                "identifier" =>
                {
                    if let Some(f) = self.value_reference(scope, node)
                    {
                        self.graph
                            .add_edge(current, f, None);
                    }
                    continue;
                }
                "selector_expression" =>
                {
                    if let Some(f) = self.qualified_reference(scope, node)
                    {
                        self.graph
                            .add_edge(current, f, None);
                    }
                }
                "function_declaration" | "method_declaration" =>
                {
                    let name = node.child_by_field_name("name");
                    stack.extend(
                        TsNodeUtils::code_children(node)
                            .into_iter()
                            .filter(|c| Some(*c) != name)
                            .map(|c| (c, current)),
                    );
                    continue;
                }
                _ =>
                {}
            }

            stack.extend(
                TsNodeUtils::code_children(node)
                    .into_iter()
                    .map(|c| (c, current)),
            );
        }
    }

    fn lookup(
        &self,
        scope: &ItemScope<'p>,
        name: &str,
    ) -> Option<Binding<'p>>
    {
        scope
            .bindings
            .get(name)
            .or_else(|| {
                self.package_bindings
                    .get(&(scope.file.package, name))
            })
            .copied()
    }

    /// Package-level function `name`, or a package variable bound to a literal.
    fn package_function(
        &self,
        package: PackageId,
        name: &str,
    ) -> Option<FunctionRef>
    {
        self.funcs
            .get(&(package, name))
            .copied()
            .or_else(|| match self
                .package_bindings
                .get(&(package, name))
            {
                Some(Binding::Literal(l)) => Some(*l),
                _ => None,
            })
    }

    fn resolve_call(
        &self,
        scope: &ItemScope<'p>,
        call: Node<'p>,
    ) -> Vec<FunctionRef>
    {
        let bytes = scope
            .file
            .bytes();
        let Some(mut function) = call.child_by_field_name("function")
        else
        {
            return Vec::new();
        };
        while function.kind() == "parenthesized_expression"
        {
            match TsNodeUtils::code_children(function).first()
            {
                Some(inner) => function = *inner,
                None => return Vec::new(),
            }
        }

        match function.kind()
        {
            "identifier" =>
            {
                let name = TsNodeUtils::text(function, bytes);
                match scope
                    .bindings
                    .get(name)
                {
                    Some(Binding::Literal(l)) => vec![*l],
                    Some(_) => Vec::new(),
                    None => self
                        .package_function(scope.file.package, name)
                        .into_iter()
                        .collect(),
                }
            }
            "selector_expression" => self.resolve_selector(scope, function),
            "func_literal" => scope
                .literals
                .get(&function.start_byte())
                .copied()
                .into_iter()
                .collect(),
            _ => Vec::new(),
        }
    }

    fn resolve_selector(
        &self,
        scope: &ItemScope<'p>,
        selector: Node<'p>,
    ) -> Vec<FunctionRef>
    {
        let bytes = scope
            .file
            .bytes();
        let (Some(operand), Some(field)) = (
            selector.child_by_field_name("operand"),
            selector.child_by_field_name("field"),
        )
        else
        {
            return Vec::new();
        };
        let method = TsNodeUtils::text(field, bytes);

        // T.M(recv, ..) and (*T).M(recv, ..)
        if let Some((package, ty)) = method_expression_type(self.program, scope.file, selector, bytes)
            && self
                .lookup(scope, ty)
                .is_none()
        {
            return match self
                .methods
                .get(&(package, ty, method))
            {
                Some(m) => vec![*m],
                None => self.methods_named(method),
            };
        }

        if operand.kind() == "identifier"
        {
            let receiver = TsNodeUtils::text(operand, bytes);
            match self.lookup(scope, receiver)
            {
                None => match imported_package(self.program, scope.file, receiver)
                {
                    Some(Some(package)) =>
                    {
                        return self
                            .package_function(package, method)
                            .into_iter()
                            .collect();
                    }
                    // fmt.Printf and friends
                    Some(None) => return Vec::new(),
                    None =>
                    {}
                },
                Some(Binding::Type(ty)) => match self.resolve_type(scope.file, ty)
                {
                    TypeTarget::Loaded(package, name) =>
                    {
                        if let Some(m) = self
                            .methods
                            .get(&(package, name, method))
                        {
                            return vec![*m];
                        }
                    }
                    TypeTarget::Foreign => return Vec::new(),
                    TypeTarget::Unknown =>
                    {}
                },
                Some(Binding::Foreign) => return Vec::new(),
                Some(_) =>
                {}
            }
        }
        else if self.is_foreign(scope, operand)
        {
            return Vec::new();
        }

        // Untyped local, interface or promoted method: every method of that name
        self.methods_named(method)
    }

    fn methods_named(
        &self,
        method: &str,
    ) -> Vec<FunctionRef>
    {
        self.methods_by_name
            .get(method)
            .cloned()
            .unwrap_or_default()
    }

    /// `expr` evaluates to something owned by a package outside the program:
    /// `os.Stdout`, `os.Open(..)`, `strings.Builder{}`, or a local bound to one.
    fn is_foreign(
        &self,
        scope: &ItemScope<'p>,
        expr: Node<'p>,
    ) -> bool
    {
        let bytes = scope
            .file
            .bytes();
        match expr.kind()
        {
            "identifier" =>
            {
                let name = TsNodeUtils::text(expr, bytes);
                match self.lookup(scope, name)
                {
                    Some(Binding::Foreign) => true,
                    Some(Binding::Type(ty)) => matches!(self.resolve_type(scope.file, ty), TypeTarget::Foreign),
                    Some(_) => false,
                    None => matches!(imported_package(self.program, scope.file, name), Some(None)),
                }
            }
            "selector_expression" => expr
                .child_by_field_name("operand")
                .is_some_and(|operand| self.is_foreign(scope, operand)),
            "call_expression" => expr
                .child_by_field_name("function")
                .is_some_and(|function| self.is_foreign(scope, function)),
            "parenthesized_expression" | "unary_expression" => TsNodeUtils::code_children(expr)
                .last()
                .is_some_and(|inner| self.is_foreign(scope, *inner)),
            "composite_literal" => expr
                .child_by_field_name("type")
                .and_then(|t| named_type(t, bytes))
                .is_some_and(|ty| matches!(self.resolve_type(scope.file, ty), TypeTarget::Foreign)),
            _ => false,
        }
    }

    /// What an initializer expression tells us about the bound value.
    fn value_binding(
        &self,
        scope: &ItemScope<'p>,
        expr: Node<'p>,
        bytes: &'p [u8],
    ) -> Binding<'p>
    {
        let known = match expr.kind()
        {
            "func_literal" => scope
                .literals
                .get(&expr.start_byte())
                .copied()
                .map(Binding::Literal),
            "composite_literal" => expr
                .child_by_field_name("type")
                .and_then(|t| named_type(t, bytes))
                .map(Binding::Type),
            "unary_expression" if TsNodeUtils::field_text(expr, "operator", bytes) == Some("&") =>
            {
                expr.child_by_field_name("operand")
                    .map(|operand| self.value_binding(scope, operand, bytes))
            }
            "parenthesized_expression" => TsNodeUtils::code_children(expr)
                .first()
                .map(|inner| self.value_binding(scope, *inner, bytes)),
            "call_expression" if TsNodeUtils::field_text(expr, "function", bytes) == Some("new") => expr
                .child_by_field_name("arguments")
                .and_then(|args| {
                    TsNodeUtils::code_children(args)
                        .first()
                        .copied()
                })
                .and_then(|ty| match ty.kind()
                {
                    "identifier" => Some(TsNodeUtils::text(ty, bytes)),
                    _ => named_type(ty, bytes),
                })
                .map(Binding::Type),
            "call_expression" | "selector_expression" if self.is_foreign(scope, expr) => Some(Binding::Foreign),
            _ => None,
        };
        known.unwrap_or(Binding::Opaque)
    }

    fn value_reference(
        &self,
        scope: &ItemScope<'p>,
        ident: Node<'p>,
    ) -> Option<FunctionRef>
    {
        let name = TsNodeUtils::text(
            ident,
            scope
                .file
                .bytes(),
        );
        if scope
            .bindings
            .contains_key(name)
        {
            return None;
        }
        self.funcs
            .get(&(scope.file.package, name))
            .copied()
    }

    fn qualified_reference(
        &self,
        scope: &ItemScope<'p>,
        selector: Node<'p>,
    ) -> Option<FunctionRef>
    {
        let bytes = scope
            .file
            .bytes();
        let operand = selector.child_by_field_name("operand")?;
        let field = selector.child_by_field_name("field")?;
        if operand.kind() != "identifier"
        {
            return None;
        }
        let alias = TsNodeUtils::text(operand, bytes);
        if self
            .lookup(scope, alias)
            .is_some()
        {
            return None;
        }
        let package = imported_package(self.program, scope.file, alias).flatten()?;
        self.funcs
            .get(&(package, TsNodeUtils::text(field, bytes)))
            .copied()
    }

    /// Split `pkg.T` through the imports; a bare `T` is local to the file's package.
    fn resolve_type(
        &self,
        file: &SourceFile,
        ty: &'p str,
    ) -> TypeTarget<'p>
    {
        match ty.split_once('.')
        {
            Some((alias, name)) => match imported_package(self.program, file, alias)
            {
                Some(Some(package)) => TypeTarget::Loaded(package, name),
                Some(None) => TypeTarget::Foreign,
                None => TypeTarget::Unknown,
            },
            None => TypeTarget::Loaded(file.package, ty),
        }
    }

    fn finish(self) -> CallGraph<'p>
    {
        let mut reachable = HashSet::new();
        let mut bfs = Bfs::new(&self.graph, self.root);
        while let Some(f) = bfs.next(&self.graph)
        {
            reachable.insert(f);
        }

        CallGraph {
            graph: self.graph,
            root: self.root,
            test_main: self.test_main,
            by_syntax: self.by_syntax,
            reachable,
        }
    }
}

/// Record a binding; literal and type knowledge is never overwritten by less.
fn bind<'p>(
    bindings: &mut HashMap<&'p str, Binding<'p>>,
    name: &'p str,
    value: Binding<'p>,
)
{
    if name == "_"
    {
        return;
    }
    let keep = match (bindings.get(name), value)
    {
        (Some(Binding::Literal(_)), Binding::Literal(_)) => false,
        (Some(Binding::Literal(_)), _) => true,
        (Some(Binding::Type(_) | Binding::Foreign), Binding::Opaque) => true,
        _ => false,
    };
    if !keep
    {
        bindings.insert(name, value);
    }
}

/// What `alias` names in `file`'s imports: `Some(Some(p))` for a loaded
/// package, `Some(None)` for an import outside the program and `None` when
/// no import goes by that name.
pub fn imported_package(
    program: &Program,
    file: &SourceFile,
    alias: &str,
) -> Option<Option<PackageId>>
{
    file.imports
        .iter()
        .find_map(|spec| {
            let loaded = program.package_by_import_path(&spec.path);
            let matches = match spec
                .name
                .as_deref()
            {
                Some("_" | ".") => false,
                Some(name) => name == alias,
                None => match loaded
                {
                    Some(package) =>
                    {
                        program
                            .package(package)
                            .name
                            == alias
                    }
                    None => default_import_name(&spec.path) == alias,
                },
            };
            matches.then_some(loaded)
        })
}

/// Conventional name of an unaliased import: the last path element, minus a
/// major-version suffix (`/v2`, `.v3`) and a `go-` prefix.
fn default_import_name(path: &str) -> &str
{
    let mut parts = path.rsplit('/');
    let mut last = parts
        .next()
        .unwrap_or(path);
    if is_major_version(last)
        && let Some(prev) = parts.next()
    {
        last = prev;
    }
    let last = match last.rsplit_once('.')
    {
        Some((head, v)) if is_major_version(v) => head,
        _ => last,
    };
    last.strip_prefix("go-")
        .unwrap_or(last)
}

fn is_major_version(s: &str) -> bool
{
    s.strip_prefix('v')
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// The type `T` of a method expression `T.M(recv, ..)`, `(*T).M(recv, ..)`
/// or `pkg.T.M(recv, ..)`, when `T` is declared in the program.
pub fn method_expression_type<'a>(
    program: &Program,
    file: &SourceFile,
    function: Node<'a>,
    bytes: &'a [u8],
) -> Option<(PackageId, &'a str)>
{
    if function.kind() != "selector_expression"
    {
        return None;
    }
    let mut operand = function.child_by_field_name("operand")?;
    loop
    {
        match operand.kind()
        {
            "parenthesized_expression" | "parenthesized_type" | "pointer_type" =>
            {
                operand = TsNodeUtils::code_children(operand)
                    .into_iter()
                    .next()?;
            }
            "unary_expression" if TsNodeUtils::field_text(operand, "operator", bytes) == Some("*") =>
            {
                operand = operand.child_by_field_name("operand")?;
            }
            _ => break,
        }
    }

    let (package, name) = match operand.kind()
    {
        "identifier" | "type_identifier" => (file.package, TsNodeUtils::text(operand, bytes)),
        "selector_expression" | "qualified_type" =>
        {
            let (alias, field) = match operand.kind()
            {
                "selector_expression" => (
                    operand.child_by_field_name("operand")?,
                    operand.child_by_field_name("field")?,
                ),
                _ => (
                    operand.child_by_field_name("package")?,
                    operand.child_by_field_name("name")?,
                ),
            };
            let package = imported_package(program, file, TsNodeUtils::text(alias, bytes)).flatten()?;
            (package, TsNodeUtils::text(field, bytes))
        }
        _ => return None,
    };

    program
        .package(package)
        .types
        .contains(name)
        .then_some((package, name))
}

/// `T`, `*T`, `pkg.T`, `T[X]` → the named type's text.
fn named_type<'p>(
    node: Node<'p>,
    bytes: &'p [u8],
) -> Option<&'p str>
{
    match node.kind()
    {
        "type_identifier" | "qualified_type" => Some(TsNodeUtils::text(node, bytes)),
        "pointer_type" | "parenthesized_type" => TsNodeUtils::code_children(node)
            .first()
            .and_then(|inner| named_type(*inner, bytes)),
        "generic_type" => node
            .child_by_field_name("type")
            .and_then(|inner| named_type(inner, bytes)),
        _ => None,
    }
}

fn receiver_type<'p>(
    method: Node<'p>,
    bytes: &'p [u8],
) -> Option<&'p str>
{
    let receiver = method.child_by_field_name("receiver")?;
    let first = TsNodeUtils::code_children(receiver)
        .into_iter()
        .next()?;
    named_type(first.child_by_field_name("type")?, bytes)
}
