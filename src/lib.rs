//! **argthread** - Thread a new argument through a Go function and all of its transitive callers
//!
//! Tree-sitter front end, static call graph, worklist propagation up the graph,
//! and formatting-preserving edits spliced into the original text.

/// Command-line interface with clap integration
pub mod cli;

/// Core refactoring pipeline - resolve, analyze, propagate, mutate
pub mod core {
    /// Error taxonomy shared by every stage
    pub mod error;
    pub use error::{RefactorError, RefactorResult};

    /// `file:#offset` → syntax address
    pub mod position;
    pub use position::{PosDescriptor, PositionKey, SourceAddress};

    /// Static call graph over the loaded syntax (petgraph)
    pub mod callgraph;

    /// Incoming-edge queries behind the `CallGraphOracle` trait
    pub mod oracle;
    pub use oracle::{AnalysisHandle, CallEdge, CallGraphOracle};

    /// Worklist walk up the call graph
    pub mod propagate;
    pub use propagate::{Frontier, propagate, propagate_into};

    /// Parameter/argument insertion and rendering
    pub mod mutate;
    pub use mutate::{Mutator, PendingEdits};

    /// Group touched addresses by file
    pub mod collect;

    /// End-to-end pipeline and CLI entry point
    pub mod refactor;
    pub use refactor::{EditRequest, run};
}

/// Language processing - Go program loading with tree-sitter
pub mod parsers {
    /// Go package loader (targets, go.mod, dependencies, parallel parsing)
    pub mod go_parser;
    pub use go_parser::{FileId, GoParser, LoadOptions, PackageId, Program};
}

/// Infrastructure - Configuration, I/O, and utilities (lean architecture)
pub mod infra {
    /// Layered configuration (files + ARGTHREAD_* environment)
    pub mod config;
    pub use config::{Config, load_config};

    /// Memory-mapped file I/O for large files (>1MB threshold) and atomic writes
    pub mod io;
    pub use io::{FileContent, read_file_smart, write_all_atomic};

    /// Byte offset → line:column for diagnostics
    pub mod line_index;
    pub use line_index::NewlineIndex;

    /// Gitignore-aware discovery of Go sources
    pub mod walk;
    pub use walk::FileWalker;

    /// Utility functions and helpers for common operations
    pub mod utils;
}

// Strategic re-exports for clean CLI interface
pub use cli::{AddArgumentArgs, AppContext, Cli};
pub use infra::{Config, load_config};
pub use parsers::Program;

/// Install the stderr log subscriber. `ARGTHREAD_LOG` (EnvFilter syntax)
/// wins over the verbosity flag.
pub fn init_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let fallback = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env("ARGTHREAD_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));

    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
