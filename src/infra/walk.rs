//! Filepath: src/infra/walk.rs
//! Gitignore-aware discovery of Go source files.
//! - Respects .gitignore, .git/info/exclude, and global gitignore
//! - Extra ignore globs (early prune + late filter)
//! - Go package conventions for `dir/...` patterns: directories named
//!   `testdata`, or starting with `.` or `_`, are never packages
//! - Optional `_test.go` inclusion
//! - Deterministic ordering for stable tests/CI
//!
//! Backed by ripgrep's `ignore` crate and `globset`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::{DirEntry, WalkBuilder};

/// Walker that yields `.go` files below (or directly inside) a root.
pub struct FileWalker
{
    /// Compiled set of additional ignore patterns
    ignore_patterns: GlobSet,

    /// Yield `_test.go` files as well; default true
    include_tests: bool,

    /// Descend into subdirectories (`dir/...`); default false
    recursive: bool,
}

impl FileWalker
{
    /// Build a walker with additional ignore patterns (e.g., "vendor/**",
    /// "**/*_gen.go"). Patterns match on paths relative to the walk root.
    pub fn new(additional_ignores: &[String]) -> Result<Self>
    {
        let mut builder = GlobSetBuilder::new();

        for pattern in additional_ignores
        {
            builder.add(Glob::new(pattern)?);
        }

        Ok(Self { ignore_patterns: builder.build()?, include_tests: true, recursive: false })
    }

    /// Include or exclude `_test.go` files.
    pub fn with_tests(
        mut self,
        include_tests: bool,
    ) -> Self
    {
        self.include_tests = include_tests;
        self
    }

    /// Walk the whole subtree instead of a single directory.
    pub fn with_recursive(
        mut self,
        recursive: bool,
    ) -> Self
    {
        self.recursive = recursive;
        self
    }

    /// Internal: construct a configured WalkBuilder for `root`.
    fn build_walk(
        &self,
        root: &Path,
    ) -> WalkBuilder
    {
        let mut b = WalkBuilder::new(root);

        // Dot directories are never Go packages
        b.hidden(true);

        // Respect .ignore/.gitignore/.git/info/exclude and global gitignore
        b.git_ignore(true);
        b.git_global(true);
        b.git_exclude(true);

        // Depth 1 = the files directly inside `root`
        b.max_depth(if self.recursive { None } else { Some(1) });

        let extra = self
            .ignore_patterns
            .clone();
        let root_owned = root.to_path_buf();
        b.filter_entry(move |ent: &DirEntry| {
            let is_dir = ent
                .file_type()
                .map(|ft| ft.is_dir())
                .unwrap_or(false);

            if !is_dir || ent.depth() == 0
            {
                return true;
            }

            let rel = ent
                .path()
                .strip_prefix(&root_owned)
                .unwrap_or(ent.path());
            if extra.is_match(rel)
            {
                return false;
            }

            // `go build ./...` skips these
            let name = ent
                .file_name()
                .to_string_lossy();
            !(name == "testdata" || name.starts_with('_'))
        });

        b
    }

    /// Collect `.go` files under `root`, sorted for determinism.
    pub fn go_files<P: AsRef<Path>>(
        &self,
        root: P,
    ) -> Vec<PathBuf>
    {
        let root_path = root.as_ref();
        let walker = self
            .build_walk(root_path)
            .build();

        let mut out: Vec<PathBuf> = walker
            // Unreadable entries are skipped; the loader reports missing targets
            .filter_map(|res| res.ok())
            .filter(|entry| {
                entry
                    .file_type()
                    .is_some_and(|ft| ft.is_file())
            })
            .map(|entry| entry.into_path())
            // `./util/util.go` reads as `util/util.go`
            .map(|p| match p.strip_prefix(".")
            {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => p,
            })
            .filter(|abs| self.is_go_source(abs))
            .filter(|abs| {
                let rel = abs
                    .strip_prefix(root_path)
                    .unwrap_or(abs);
                !self
                    .ignore_patterns
                    .is_match(rel)
            })
            .collect();

        out.sort();

        out
    }

    /// True for `.go` files, honoring the test-file policy.
    pub fn is_go_source(
        &self,
        path: &Path,
    ) -> bool
    {
        let Some(name) = path
            .file_name()
            .and_then(|n| n.to_str())
        else
        {
            return false;
        };

        if !name.ends_with(".go") || name.starts_with('.') || name.starts_with('_')
        {
            return false;
        }

        self.include_tests || !name.ends_with("_test.go")
    }
}
