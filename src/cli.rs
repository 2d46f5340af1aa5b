use clap::{ArgAction, Args, Parser};
use std::ffi::OsString;
use std::path::PathBuf;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub dry_run: bool,  // global --dry-run
}

#[derive(Debug, Parser)]
#[command(name = "add-argument")]
#[command(
    about = "Add a parameter to a Go function and thread it through every transitive caller"
)]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub args: AddArgumentArgs,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Print the planned edits as JSON without changing anything
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// More logging on stderr (-v: info, -vv: debug); ARGTHREAD_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Args)]
pub struct AddArgumentArgs {
    /// New parameter as "<name> <type>", e.g. "ctx context.Context"
    #[arg(long, value_name = "NAME TYPE")]
    pub arg: String,

    /// Target function: <file>:#<offset> or <file>:#<start>,#<end>
    #[arg(long, value_name = "POS")]
    pub pos: String,

    /// Write results to the source files instead of stdout
    #[arg(short = 'w', long = "write")]
    pub write: bool,

    /// Leave a first parameter/argument alone if it is already the one being added [default: true]
    #[arg(
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub skip_exists: Option<bool>,

    /// Only files whose path matches are written or printed [default: .*]
    #[arg(long, value_name = "REGEXP")]
    pub package_regexp: Option<String>,

    /// Print a unified diff per file instead of the whole content
    #[arg(long, conflicts_with = "write")]
    pub diff: bool,

    /// Explicit configuration file (defaults to ./argthread.toml and friends)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Packages to load: a directory, a `dir/...` pattern, or a .go file
    #[arg(default_value = ".")]
    pub targets: Vec<String>,
}

/// Long flags that Go tooling habitually spells with a single dash.
const GO_STYLE_FLAGS: &[&str] = &[
    "arg",
    "pos",
    "write",
    "skip-exists",
    "package-regexp",
    "diff",
    "config",
    "quiet",
    "no-color",
    "dry-run",
    "verbose",
    "help",
    "version",
];

/// Rewrite `-arg=..`/`-pos ..`-style flags to their `--` form so clap accepts
/// the flag syntax of the Go toolchain. Everything after a bare `--` is left alone.
pub fn normalize_go_flags<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut out = Vec::new();
    let mut passthrough = false;

    for arg in args.into_iter().map(Into::into) {
        if passthrough {
            out.push(arg);
            continue;
        }

        let rewritten = arg.to_str().and_then(|s| {
            if s == "--" {
                return None;
            }
            let rest = s.strip_prefix('-').filter(|r| !r.starts_with('-'))?;
            let name = rest.split('=').next().unwrap_or(rest);
            GO_STYLE_FLAGS
                .contains(&name)
                .then(|| OsString::from(format!("-{s}")))
        });

        if arg == "--" {
            passthrough = true;
        }
        out.push(rewritten.unwrap_or(arg));
    }

    out
}

/// A clap usage error as one line, without the `error:` prefix, the usage
/// block or the trailing punctuation. `main` wraps it as `Error: <line>.`
pub fn usage_error_line(err: &clap::Error) -> String {
    let rendered = err.render().to_string();
    let line = rendered
        .lines()
        .map(str::trim)
        .take_while(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    line.strip_prefix("error: ")
        .unwrap_or(&line)
        .trim_end_matches(['.', ':'])
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Cli {
        Cli::parse_from(normalize_go_flags(argv.iter().copied()))
    }

    #[test]
    fn go_style_flags_are_accepted() {
        // Given
        let argv = [
            "add-argument",
            "-arg=foo int",
            "-pos",
            "main.go:#60",
            "-w",
            "-skip-exists=false",
            "-package-regexp=^cmd/",
            "./cmd/...",
        ];

        // When
        let cli = parse(&argv);

        // Then
        assert_eq!(cli.args.arg, "foo int");
        assert_eq!(cli.args.pos, "main.go:#60");
        assert!(cli.args.write);
        assert_eq!(cli.args.skip_exists, Some(false));
        assert_eq!(cli.args.package_regexp.as_deref(), Some("^cmd/"));
        assert_eq!(cli.args.targets, vec!["./cmd/..."]);
    }

    #[test]
    fn defaults_and_bare_bool_flag() {
        let cli = parse(&["add-argument", "--arg", "foo int", "--pos", "a.go:#1"]);
        assert_eq!(cli.args.targets, vec!["."]);
        assert_eq!(cli.args.skip_exists, None);
        assert!(!cli.args.write);

        let cli = parse(&["add-argument", "-arg=foo int", "-pos=a.go:#1", "-skip-exists", "-vv"]);
        assert_eq!(cli.args.skip_exists, Some(true));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn usage_errors_collapse_to_one_line() {
        // Given
        let argv = normalize_go_flags(["add-argument", "-pos=a.go:#1"]);

        // When
        let err = Cli::try_parse_from(argv).unwrap_err();
        let line = usage_error_line(&err);

        // Then
        assert!(line.starts_with("the following required arguments were not provided"), "{line}");
        assert!(line.contains("--arg"), "{line}");
        assert!(!line.contains('\n') && !line.ends_with('.'), "{line}");
    }

    #[test]
    fn unknown_single_dash_words_are_untouched() {
        let argv = normalize_go_flags(["add-argument", "-v", "-x", "--", "-arg"]);
        let argv: Vec<&str> = argv.iter().filter_map(|a| a.to_str()).collect();
        assert_eq!(argv, ["add-argument", "-v", "-x", "--", "-arg"]);
    }
}
