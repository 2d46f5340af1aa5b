//! Newline index for reporting byte offsets as `file:line:col`.
//!
//! - Single memchr pass over the bytes to record '\n' positions.
//! - 1-based line and column numbers, matching compiler diagnostics.
//! - Columns count bytes, the way `go vet` and `gopls` report them.
//! - Offsets sitting on a '\n' belong to the line that '\n' terminates.

use serde::Serialize;

/// A 1-based line/column pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineCol {
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for LineCol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone)]
pub struct NewlineIndex {
    /// Byte positions of every '\n' in the buffer.
    nl_positions: Vec<usize>,
    /// Total byte length of the buffer.
    len: usize,
}

impl NewlineIndex {
    /// Build an index recording positions of '\n'.
    pub fn build(bytes: &[u8]) -> Self {
        let nl_positions = memchr::memchr_iter(b'\n', bytes).collect();

        Self {
            nl_positions,
            len: bytes.len(),
        }
    }

    /// Line and column of a byte offset. Offsets past the end clamp to EOF.
    pub fn line_col(&self, byte: usize) -> LineCol {
        let byte = byte.min(self.len);

        // Number of '\n' strictly before `byte`.
        let before = self.nl_positions.partition_point(|&nl| nl < byte);
        let line_start = if before == 0 {
            0
        } else {
            self.nl_positions[before - 1] + 1
        };

        LineCol {
            line: before + 1,
            column: byte - line_start + 1,
        }
    }
}
