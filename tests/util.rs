//! Shared test utilities for integration tests
//!
//! Go fixture trees on disk plus a preconfigured binary command.

#![allow(dead_code)]

use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use assert_fs::prelude::*;

/// Write `files` (relative path, contents) into a fresh temp directory.
pub fn go_fixture(files: &[(&str, &str)]) -> assert_fs::TempDir
{
    let tmp = assert_fs::TempDir::new().expect("tempdir");

    for (path, contents) in files
    {
        tmp.child(path)
            .write_str(contents)
            .expect("write fixture");
    }

    tmp
}

/// Copy a checked-in fixture directory (under tests/fixtures) into a temp dir.
pub fn copy_fixture(name: &str) -> assert_fs::TempDir
{
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    let src = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);

    tmp.copy_from(&src, &["**/*"])
        .expect("copy fixture");

    tmp
}

/// Byte offset of the first `needle` in the file, plus `delta`.
pub fn offset_of(
    dir: &Path,
    file: &str,
    needle: &str,
    delta: usize,
) -> usize
{
    let text = std::fs::read_to_string(dir.join(file)).expect("read fixture file");
    text.find(needle)
        .unwrap_or_else(|| panic!("{needle:?} not in {file}"))
        + delta
}

/// The binary, run inside `dir` with logging pinned to warnings.
pub fn add_argument(dir: &Path) -> Command
{
    let mut cmd = Command::cargo_bin("add-argument").expect("add-argument binary");
    cmd.current_dir(dir)
        .env("ARGTHREAD_LOG", "warn")
        .env_remove("ARGTHREAD_SKIP_EXISTS")
        .env_remove("ARGTHREAD_PACKAGE_REGEXP");
    cmd
}
