use anyhow::{Context, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const MMAP_THRESHOLD: u64 = 1024 * 1024; // 1 MiB

pub enum FileContent {
    Mapped(Mmap),
    Buffered(String),
}

impl FileContent {
    /// Owned copy of the text, as the syntax forest keeps sources for its lifetime.
    pub fn into_string(self) -> Result<String> {
        match self {
            FileContent::Mapped(mmap) => Ok(std::str::from_utf8(&mmap)
                .context("source file is not valid UTF-8")?
                .to_owned()),
            FileContent::Buffered(s) => Ok(s),
        }
    }
}

pub fn read_file_smart<P: AsRef<Path>>(path: P) -> Result<FileContent> {
    let path = path.as_ref();
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("failed to read metadata for {}", path.display()))?;

    if metadata.len() > MMAP_THRESHOLD {
        let file =
            File::open(path).with_context(|| format!("failed to open file {}", path.display()))?;

        // Safety: read-only mapping; the file is not modified while the loader holds it
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("failed to memory-map {}", path.display()))?;

        Ok(FileContent::Mapped(mmap))
    } else {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read file {}", path.display()))?;

        Ok(FileContent::Buffered(content))
    }
}

/// Replace every `(path, contents)` pair via sibling temp files and renames.
/// All files are staged before the first rename, so a failure while staging
/// leaves every source untouched.
pub fn write_all_atomic(files: &[(PathBuf, String)]) -> Result<()> {
    let staged = files
        .iter()
        .map(|(path, contents)| stage(path, contents))
        .collect::<Result<Vec<_>>>()?;

    for ((path, _), tmp) in files.iter().zip(staged) {
        tmp.persist(path)
            .with_context(|| format!("failed to replace {}", path.display()))?;
    }
    Ok(())
}

fn stage(path: &Path, contents: &str) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    tmp.write_all(contents.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;

    // Keep the original file mode
    if let Ok(meta) = std::fs::metadata(path) {
        tmp.as_file()
            .set_permissions(meta.permissions())
            .with_context(|| format!("failed to copy permissions of {}", path.display()))?;
    }
    Ok(tmp)
}
