//! Error taxonomy for the refactoring pipeline.
//!
//! Everything except [`RefactorError::WrongNodeKind`] is fatal to a run.
//! `WrongNodeKind` is a contract violation on a single target; the
//! pipeline logs it and moves on to the next target.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RefactorError
{
    /// Malformed `-arg` value
    #[error("invalid -arg {0:?}: want \"<name> <type>\"")]
    InvalidArgument(String),

    /// Malformed `-pos` value
    #[error("invalid source position -pos={0:?}")]
    InvalidPosition(String),

    #[error("file {} is not part of the loaded program", .0.display())]
    FileNotLoaded(PathBuf),

    #[error("no syntax at {}:#{start},#{end}", .file.display())]
    NoSyntaxAtPosition
    {
        file: PathBuf,
        start: usize,
        end: usize,
    },

    #[error("ambiguous selection within {description}")]
    AmbiguousSelection
    {
        description: String,
    },

    #[error("analysis scope has no main and no tests")]
    NoAnalysisRoot,

    /// Front-end or call-graph failure; carries the engine's message verbatim
    #[error("{0}")]
    Analysis(String),

    #[error("no enclosing function for call at {location}")]
    NoEnclosingFunction
    {
        location: String,
    },

    #[error("pos must be in a {expected}, got {found} instead at {location}")]
    WrongNodeKind
    {
        expected: &'static str,
        found: String,
        location: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type RefactorResult<T> = Result<T, RefactorError>;

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn messages_read_as_single_lines()
    {
        let e = RefactorError::NoSyntaxAtPosition {
            file: PathBuf::from("main.go"),
            start: 10,
            end: 12,
        };
        assert_eq!(e.to_string(), "no syntax at main.go:#10,#12");

        let e = RefactorError::WrongNodeKind {
            expected: "parameter list",
            found: "block".into(),
            location: "main.go:3:1".into(),
        };
        assert_eq!(e.to_string(), "pos must be in a parameter list, got block instead at main.go:3:1");
        assert_eq!(
            RefactorError::NoAnalysisRoot.to_string(),
            "analysis scope has no main and no tests"
        );
    }
}
