//! Filepath: src/parsers/go_parser.rs
//! Go program loader: expands load targets, parses every file with
//! tree-sitter-go and groups files into packages.
//!
//! The loaded `Program` is the syntax forest every other stage indexes
//! into. Trees are immutable; edits are recorded separately against
//! byte offsets of the original text (see `core::mutate`).

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, instrument};
use tree_sitter::{Language, Node, Parser, Tree};

use crate::core::error::RefactorError;
use crate::infra::io::read_file_smart;
use crate::infra::line_index::{LineCol, NewlineIndex};
use crate::infra::utils::TsNodeUtils;
use crate::infra::walk::FileWalker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FileId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PackageId(pub usize);

/// One `import` line: optional local name plus the unquoted path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    pub name: Option<String>,
    pub path: String,
}

pub struct SourceFile {
    pub id: FileId,
    /// Path as the user (or walker) named it; used for output
    pub path: PathBuf,
    /// Canonical path; used to match `-pos` file names
    pub canonical: PathBuf,
    pub package: PackageId,
    pub source: String,
    pub tree: Tree,
    pub lines: NewlineIndex,
    pub imports: Vec<ImportSpec>,
    pub is_test: bool,
}

impl SourceFile {
    pub fn bytes(&self) -> &[u8] {
        self.source.as_bytes()
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn line_col(&self, offset: usize) -> LineCol {
        self.lines.line_col(offset)
    }

    /// `path:line:col` for diagnostics
    pub fn location(&self, offset: usize) -> String {
        format!("{}:{}", self.path.display(), self.line_col(offset))
    }
}

pub struct Package {
    pub id: PackageId,
    pub name: String,
    pub import_path: String,
    /// Names of package-level type declarations
    pub types: HashSet<String>,
    pub files: Vec<FileId>,
    /// Named on the command line (as opposed to pulled in as a dependency)
    pub initial: bool,
}

/// Loader knobs, usually taken from `infra::config::Config`.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub ignore_patterns: Vec<String>,
    pub include_tests: bool,
    pub load_dependencies: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            ignore_patterns: Vec::new(),
            include_tests: true,
            load_dependencies: true,
        }
    }
}

/// The parsed, package-grouped program.
pub struct Program {
    files: Vec<SourceFile>,
    packages: Vec<Package>,
}

/// Thin wrapper so the grammar is set up in one place.
#[derive(Clone)]
pub struct GoParser {
    language: Language,
}

impl GoParser {
    pub fn new() -> Self {
        Self {
            language: tree_sitter_go::LANGUAGE.into(),
        }
    }

    /// Parse one file; any ERROR/MISSING node is reported with its location.
    pub fn parse(&self, path: &Path, source: &str) -> Result<Tree, RefactorError> {
        // Parsers are cheap and not Sync, so each call gets its own
        let mut parser = Parser::new();
        parser
            .set_language(&self.language)
            .map_err(|e| RefactorError::Analysis(format!("go grammar unavailable: {e}")))?;

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| RefactorError::Analysis(format!("failed to parse {}", path.display())))?;

        if let Some(bad) = first_error(tree.root_node()) {
            let at = NewlineIndex::build(source.as_bytes()).line_col(bad.start_byte());
            return Err(RefactorError::Analysis(format!(
                "syntax errors in {}:{}",
                path.display(),
                at
            )));
        }

        Ok(tree)
    }
}

impl Default for GoParser {
    fn default() -> Self {
        Self::new()
    }
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

/// A file after parsing, before package assembly.
struct ParsedFile {
    path: PathBuf,
    canonical: PathBuf,
    source: String,
    tree: Tree,
    package_name: String,
    imports: Vec<ImportSpec>,
    is_test: bool,
    initial: bool,
}

impl ParsedFile {
    fn parse(parser: &GoParser, path: PathBuf, source: String, initial: bool) -> Result<Self> {
        let tree = parser.parse(&path, &source)?;
        let root = tree.root_node();
        let bytes = source.as_bytes();

        let package_name = TsNodeUtils::code_children(root)
            .into_iter()
            .find(|n| n.kind() == "package_clause")
            .and_then(|clause| TsNodeUtils::code_children(clause).into_iter().next())
            .map(|ident| TsNodeUtils::text(ident, bytes).to_string())
            .with_context(|| format!("{} has no package clause", path.display()))?;

        let imports = collect_imports(root, bytes);
        let canonical = dunce::canonicalize(&path).unwrap_or_else(|_| path.clone());
        let is_test = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with("_test.go"));

        Ok(Self {
            path,
            canonical,
            source,
            tree,
            package_name,
            imports,
            is_test,
            initial,
        })
    }
}

fn collect_imports(root: Node, bytes: &[u8]) -> Vec<ImportSpec> {
    let mut out = Vec::new();
    for decl in TsNodeUtils::code_children(root) {
        if decl.kind() != "import_declaration" {
            continue;
        }
        let mut pending = TsNodeUtils::code_children(decl);
        while let Some(node) = pending.pop() {
            match node.kind() {
                "import_spec_list" => pending.extend(TsNodeUtils::code_children(node)),
                "import_spec" => {
                    let Some(path) = TsNodeUtils::field_text(node, "path", bytes) else {
                        continue;
                    };
                    out.push(ImportSpec {
                        name: TsNodeUtils::field_text(node, "name", bytes).map(str::to_owned),
                        path: TsNodeUtils::unquote(path).to_owned(),
                    });
                }
                _ => {}
            }
        }
    }
    out
}

fn collect_types(root: Node, bytes: &[u8], out: &mut HashSet<String>) {
    for decl in TsNodeUtils::code_children(root) {
        if decl.kind() != "type_declaration" {
            continue;
        }
        for spec in TsNodeUtils::code_children(decl) {
            if let Some(name) = TsNodeUtils::field_text(spec, "name", bytes) {
                out.insert(name.to_owned());
            }
        }
    }
}

/// `module` line of the nearest go.mod at or above `start`.
fn find_module(start: &Path) -> Option<(PathBuf, String)> {
    let mut dir = dunce::canonicalize(start).ok()?;
    if dir.is_file() {
        dir.pop();
    }
    loop {
        let gomod = dir.join("go.mod");
        if let Ok(text) = std::fs::read_to_string(&gomod) {
            let module = text.lines().find_map(|l| {
                l.trim()
                    .strip_prefix("module")
                    .map(|rest| TsNodeUtils::unquote(rest.trim()).to_string())
            })?;
            return Some((dir, module));
        }
        if !dir.pop() {
            return None;
        }
    }
}

fn slash_path(p: &Path) -> String {
    p.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

impl Program {
    /// Load Go packages named by `targets` (directories, `dir/...` patterns
    /// or single files). An empty target list means the current directory.
    #[instrument(skip(opts))]
    pub fn load(targets: &[String], opts: &LoadOptions) -> Result<Self> {
        let targets: Vec<String> = if targets.is_empty() {
            vec![".".to_string()]
        } else {
            targets.to_vec()
        };

        let walker = FileWalker::new(&opts.ignore_patterns)?.with_tests(opts.include_tests);
        let mut initial_files: Vec<PathBuf> = Vec::new();

        for target in &targets {
            if let Some(root) = target.strip_suffix("...") {
                let root = root.trim_end_matches('/');
                let root = if root.is_empty() { "." } else { root };
                let walker = FileWalker::new(&opts.ignore_patterns)?
                    .with_tests(opts.include_tests)
                    .with_recursive(true);
                initial_files.extend(walker.go_files(root));
                continue;
            }

            let path = Path::new(target);
            if path.is_dir() {
                initial_files.extend(walker.go_files(path));
            } else if path.is_file() {
                initial_files.push(path.to_path_buf());
            } else {
                bail!("cannot find package {target:?}");
            }
        }

        if initial_files.is_empty() {
            bail!("no Go files in {}", targets.join(" "));
        }

        let parser = GoParser::new();
        let mut parsed = read_and_parse(&parser, initial_files, true)?;

        // Module-relative import paths, if the program lives in a module
        let first = targets[0].trim_end_matches("...");
        let module = find_module(Path::new(if first.is_empty() { "." } else { first }));
        let base = match &module {
            Some((root, _)) => root.clone(),
            None => dunce::canonicalize(".").context("failed to resolve working directory")?,
        };

        if opts.load_dependencies
            && let Some((mod_root, mod_path)) = &module
        {
            let deps = load_module_dependencies(&parser, &parsed, mod_root, mod_path, &opts.ignore_patterns)?;
            parsed.extend(deps);
        }

        Ok(Self::assemble(parsed, &base, module.as_ref().map(|(_, m)| m.as_str())))
    }

    /// Build a program from in-memory sources. Every file is treated as
    /// initial; import paths are the slash-separated directories.
    pub fn from_sources<I, P, S>(sources: I) -> Result<Self>
    where
        I: IntoIterator<Item = (P, S)>,
        P: Into<PathBuf>,
        S: Into<String>,
    {
        let parser = GoParser::new();
        let parsed = sources
            .into_iter()
            .map(|(p, s)| ParsedFile::parse(&parser, p.into(), s.into(), true))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::assemble(parsed, Path::new(""), None))
    }

    fn assemble(parsed: Vec<ParsedFile>, base: &Path, module: Option<&str>) -> Self {
        // Group by (directory, package clause); BTreeMap keeps ids deterministic
        let mut groups: BTreeMap<(PathBuf, String), Vec<ParsedFile>> = BTreeMap::new();
        for pf in parsed {
            let dir = pf
                .canonical
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();
            groups
                .entry((dir, pf.package_name.clone()))
                .or_default()
                .push(pf);
        }

        let mut files = Vec::new();
        let mut packages = Vec::new();

        for ((dir, name), mut members) in groups {
            members.sort_by(|a, b| a.path.cmp(&b.path));

            let id = PackageId(packages.len());
            let rel = dir.strip_prefix(base).unwrap_or(&dir);
            let rel = slash_path(rel);
            let mut import_path = match (module, rel.is_empty()) {
                (Some(m), true) => m.to_string(),
                (Some(m), false) => format!("{m}/{rel}"),
                (None, true) => ".".to_string(),
                (None, false) => rel,
            };
            // External test packages (`package foo_test`) get their own path
            if name.ends_with("_test") && members.iter().all(|f| f.is_test) {
                import_path.push_str("_test");
            }

            let initial = members.iter().any(|f| f.initial);
            let mut types = HashSet::new();
            for pf in &members {
                collect_types(pf.tree.root_node(), pf.source.as_bytes(), &mut types);
            }
            let mut ids = Vec::with_capacity(members.len());
            for pf in members {
                let fid = FileId(files.len());
                ids.push(fid);
                files.push(SourceFile {
                    id: fid,
                    lines: NewlineIndex::build(pf.source.as_bytes()),
                    path: pf.path,
                    canonical: pf.canonical,
                    package: id,
                    source: pf.source,
                    tree: pf.tree,
                    imports: pf.imports,
                    is_test: pf.is_test,
                });
            }

            debug!(package = %import_path, files = ids.len(), "loaded package");
            packages.push(Package {
                id,
                name,
                import_path,
                types,
                files: ids,
                initial,
            });
        }

        Self { files, packages }
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn file(&self, id: FileId) -> &SourceFile {
        &self.files[id.0]
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    pub fn package(&self, id: PackageId) -> &Package {
        &self.packages[id.0]
    }

    /// Find a loaded file by the path as given, then by canonical path.
    pub fn find_file(&self, path: &Path) -> Option<FileId> {
        if let Some(f) = self.files.iter().find(|f| f.path == path) {
            return Some(f.id);
        }
        let canonical = dunce::canonicalize(path).ok()?;
        self.files
            .iter()
            .find(|f| f.canonical == canonical)
            .map(|f| f.id)
    }

    /// Package for an import path. Falls back to a suffix match on the
    /// directory so GOPATH-style layouts without go.mod still resolve.
    pub fn package_by_import_path(&self, path: &str) -> Option<PackageId> {
        let libraries = || self.packages.iter().filter(|p| !p.import_path.ends_with("_test"));

        libraries()
            .find(|p| p.import_path == path)
            .or_else(|| {
                libraries().find(|p| {
                    p.import_path != "."
                        && (path.ends_with(&format!("/{}", p.import_path))
                            || p.import_path.ends_with(&format!("/{path}")))
                })
            })
            .map(|p| p.id)
    }
}

fn read_and_parse(parser: &GoParser, paths: Vec<PathBuf>, initial: bool) -> Result<Vec<ParsedFile>> {
    // Dedup while keeping order (a file may be named twice)
    let mut seen = HashSet::new();
    let paths: Vec<PathBuf> = paths
        .into_iter()
        .filter(|p| seen.insert(dunce::canonicalize(p).unwrap_or_else(|_| p.clone())))
        .collect();

    paths
        .into_par_iter()
        .map(|path| {
            let source = read_file_smart(&path)?.into_string()?;
            ParsedFile::parse(parser, path, source, initial)
        })
        .collect()
}

/// Pull in module-local packages imported (transitively) by `parsed`.
fn load_module_dependencies(
    parser: &GoParser,
    parsed: &[ParsedFile],
    mod_root: &Path,
    mod_path: &str,
    ignore_patterns: &[String],
) -> Result<Vec<ParsedFile>> {
    let mut loaded_dirs: HashSet<PathBuf> = parsed
        .iter()
        .filter_map(|f| f.canonical.parent().map(Path::to_path_buf))
        .collect();
    let mut queue: VecDeque<String> = parsed
        .iter()
        .flat_map(|f| f.imports.iter().map(|i| i.path.clone()))
        .collect();

    // Dependencies are compiled without their tests
    let walker = FileWalker::new(ignore_patterns)?.with_tests(false);
    let mut out = Vec::new();

    while let Some(import) = queue.pop_front() {
        let rel = if import == mod_path {
            ""
        } else if let Some(rest) = import.strip_prefix(&format!("{mod_path}/")) {
            rest
        } else {
            continue;
        };

        let dir = mod_root.join(rel);
        let canonical = dunce::canonicalize(&dir).unwrap_or(dir.clone());
        if !dir.is_dir() || !loaded_dirs.insert(canonical) {
            continue;
        }

        debug!(%import, "loading dependency");
        let files = read_and_parse(parser, walker.go_files(&dir), false)?;
        queue.extend(files.iter().flat_map(|f| f.imports.iter().map(|i| i.path.clone())));
        out.extend(files);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_files_into_packages() -> Result<()> {
        let program = Program::from_sources([
            ("app/main.go", "package main\n\nfunc main() {}\n"),
            ("app/util.go", "package main\n\nfunc util() {}\n"),
            (
                "app/lib/lib.go",
                "package lib\n\nimport (\n\t\"fmt\"\n\tu \"example.com/app/util\"\n)\n\ntype (\n\tA struct{}\n\tB = A\n)\n",
            ),
        ])?;

        assert_eq!(program.packages().len(), 2);
        let main = program
            .packages()
            .iter()
            .find(|p| p.name == "main")
            .unwrap();
        assert_eq!(main.files.len(), 2);
        assert_eq!(main.import_path, "app");
        assert!(main.types.is_empty());

        let lib_file = program.find_file(Path::new("app/lib/lib.go")).unwrap();
        let lib = program.package(program.file(lib_file).package);
        assert!(lib.types.contains("A") && lib.types.contains("B"));
        let imports = &program.file(lib_file).imports;
        assert_eq!(imports.len(), 2);
        assert!(imports.contains(&ImportSpec { name: None, path: "fmt".into() }));
        assert!(imports.contains(&ImportSpec {
            name: Some("u".into()),
            path: "example.com/app/util".into()
        }));
        Ok(())
    }

    #[test]
    fn syntax_errors_are_fatal_with_location() {
        let err = Program::from_sources([("bad.go", "package p\n\nfunc f( {\n")])
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default();
        assert!(err.starts_with("syntax errors in bad.go:"), "{err}");
    }

    #[test]
    fn loads_module_and_dependencies_from_disk() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let root = dir.path();
        std::fs::write(root.join("go.mod"), "module example.com/m\n\ngo 1.22\n")?;
        std::fs::create_dir_all(root.join("cmd/app"))?;
        std::fs::create_dir_all(root.join("util"))?;
        std::fs::write(
            root.join("cmd/app/main.go"),
            "package main\n\nimport \"example.com/m/util\"\n\nfunc main() { util.Do() }\n",
        )?;
        std::fs::write(root.join("util/util.go"), "package util\n\nfunc Do() {}\n")?;
        std::fs::write(root.join("util/util_test.go"), "package util\n")?;

        let target = root.join("cmd/app").to_string_lossy().into_owned();
        let program = Program::load(&[target], &LoadOptions::default())?;

        let paths: Vec<&str> = program
            .packages()
            .iter()
            .map(|p| p.import_path.as_str())
            .collect();
        assert!(paths.contains(&"example.com/m/cmd/app"));
        assert!(paths.contains(&"example.com/m/util"));

        let util = program.package_by_import_path("example.com/m/util").unwrap();
        assert!(!program.package(util).initial);
        // Dependency tests are not loaded
        assert_eq!(program.package(util).files.len(), 1);
        Ok(())
    }
}
