//! The `add-argument` pipeline: load → resolve → plan → mutate → collect → emit.

use std::io::{self, IsTerminal, Write};
use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use regex::Regex;
use similar::TextDiff;
use tracing::{debug, info, instrument, warn};

use crate::cli::{AddArgumentArgs, AppContext};
use crate::core::collect::group_by_file;
use crate::core::error::{RefactorError, RefactorResult};
use crate::core::mutate::{EditOutcome, Mutator, PendingEdits};
use crate::core::oracle::AnalysisHandle;
use crate::core::position::{SourceAddress, resolve_str};
use crate::core::propagate::{Frontier, propagate};
use crate::infra::config::load_config;
use crate::infra::io::write_all_atomic;
use crate::parsers::go_parser::{FileId, LoadOptions, Program};

/// One run's worth of input, fixed after parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRequest
{
    pub parameter_name: String,
    pub parameter_type: String,
    pub start_position: String,
    pub skip_if_present: bool,
}

impl EditRequest
{
    /// `arg` is split at its first space into name and type.
    pub fn parse(
        arg: &str,
        pos: &str,
        skip_if_present: bool,
    ) -> RefactorResult<Self>
    {
        let invalid = || RefactorError::InvalidArgument(arg.to_string());

        let (name, ty) = arg
            .trim()
            .split_once(' ')
            .ok_or_else(invalid)?;
        let (name, ty) = (name.trim(), ty.trim());
        if name.is_empty() || ty.is_empty()
        {
            return Err(invalid());
        }

        Ok(Self {
            parameter_name: name.to_string(),
            parameter_type: ty.to_string(),
            start_position: pos.to_string(),
            skip_if_present,
        })
    }
}

/// Turn the user's position into the parameter list of the enclosing
/// function or method declaration.
pub fn normalize_start<'p>(
    program: &Program,
    address: &SourceAddress<'p>,
) -> RefactorResult<SourceAddress<'p>>
{
    let path = &address.path;
    for (i, node) in path
        .iter()
        .enumerate()
    {
        if !matches!(node.kind(), "function_declaration" | "method_declaration")
        {
            continue;
        }
        if let Some(params) = node.child_by_field_name("parameters")
        {
            return Ok(SourceAddress::of_node(address.file, params, &path[i..]));
        }
    }

    Err(RefactorError::Analysis(format!(
        "{}: this position is not inside a function",
        address.location(program)
    )))
}

/// Resolve the start position and compute every signature and call site to edit.
#[instrument(skip_all, fields(pos = %request.start_position))]
pub fn plan<'p>(
    program: &'p Program,
    request: &EditRequest,
) -> RefactorResult<Frontier<'p>>
{
    let selected = resolve_str(program, &request.start_position, false)?;
    let start = normalize_start(program, &selected)?;
    debug!(start = %start.location(program), "target signature");

    let handle = AnalysisHandle::build_scope(program)?;
    let frontier = propagate(program, &handle, start)?;

    for signature in frontier
        .signature_targets
        .values()
    {
        info!(at = %signature.location(program), "caller");
    }
    for site in frontier
        .call_site_targets
        .values()
    {
        info!(at = %site.location(program), "call site");
    }

    Ok(frontier)
}

/// Record the parameter and argument insertions for a planned frontier.
/// Targets of the wrong kind are logged and skipped.
pub fn apply(
    program: &Program,
    frontier: &Frontier,
    request: &EditRequest,
) -> RefactorResult<PendingEdits>
{
    let mut mutator = Mutator::new(program);
    let (name, ty, skip) = (
        request
            .parameter_name
            .as_str(),
        request
            .parameter_type
            .as_str(),
        request.skip_if_present,
    );

    for signature in frontier
        .signature_targets
        .values()
    {
        let outcome = mutator.add_parameter(signature, name, ty, skip);
        tolerate_wrong_kind(outcome)?;
    }
    for site in frontier
        .call_site_targets
        .values()
    {
        let outcome = mutator.add_argument(site, name, skip);
        tolerate_wrong_kind(outcome)?;
    }

    Ok(mutator.into_edits())
}

fn tolerate_wrong_kind(outcome: RefactorResult<EditOutcome>) -> RefactorResult<()>
{
    match outcome
    {
        Ok(_) => Ok(()),
        Err(e @ RefactorError::WrongNodeKind { .. }) =>
        {
            warn!("{e}; skipping");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Files touched by the frontier, in first-touch order.
pub fn touched_files(frontier: &Frontier) -> Vec<FileId>
{
    group_by_file(
        frontier
            .signature_targets
            .values()
            .chain(
                frontier
                    .call_site_targets
                    .values(),
            ),
    )
    .into_iter()
    .collect()
}

/// CLI entry point.
pub fn run(
    args: AddArgumentArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config = load_config(args.config.as_deref())?;

    let skip = args
        .skip_exists
        .unwrap_or(config.skip_exists);
    let package_regexp = args
        .package_regexp
        .unwrap_or(config.package_regexp);
    let filter = Regex::new(&package_regexp).with_context(|| format!("invalid -package-regexp {package_regexp:?}"))?;

    let request = EditRequest::parse(&args.arg, &args.pos, skip)?;

    let options = LoadOptions {
        ignore_patterns: config.ignore_patterns,
        include_tests: config.include_tests,
        load_dependencies: config.load_dependencies,
    };
    let program = Program::load(&args.targets, &options)?;

    let frontier = plan(&program, &request)?;

    if ctx.dry_run
    {
        let json = serde_json::to_string_pretty(&frontier.plan(&program))?;
        println!("{json}");
        return Ok(());
    }

    let edits = apply(&program, &frontier, &request)?;

    let color = !ctx.no_color && io::stdout().is_terminal();
    let mut out = io::stdout().lock();
    let mut pending = Vec::new();

    for file in touched_files(&frontier)
    {
        let source = program.file(file);
        let shown = source
            .path
            .display()
            .to_string();

        if !filter.is_match(&shown)
        {
            warn!("skipping {shown}: does not match -package-regexp {package_regexp:?}");
            continue;
        }

        let rendered = edits.render(&program, file);

        if args.write
        {
            if rendered == source.source
            {
                debug!(file = %shown, "unchanged");
                continue;
            }
            pending.push((source.path.clone(), rendered));
        }
        else if args.diff
        {
            print_diff(&mut out, &source.path, &source.source, &rendered, color)?;
        }
        else
        {
            let header = format!("// {shown}");
            if color
            {
                writeln!(out, "{}", header.cyan())?;
            }
            else
            {
                writeln!(out, "{header}")?;
            }
            write!(out, "{rendered}")?;
        }
    }

    if !pending.is_empty()
    {
        write_all_atomic(&pending).context("no files were written")?;
        for (path, _) in &pending
        {
            info!(file = %path.display(), "written");
        }
    }
    let written = pending.len();

    if args.write && !ctx.quiet
    {
        if color
        {
            writeln!(out, "{} Updated {written} file(s)", "✓".green())?;
        }
        else
        {
            writeln!(out, "✓ Updated {written} file(s)")?;
        }
    }

    Ok(())
}

/// Unified diff in the style of `gofmt -d`.
fn print_diff(
    out: &mut impl Write,
    path: &Path,
    before: &str,
    after: &str,
    color: bool,
) -> Result<()>
{
    if before == after
    {
        return Ok(());
    }

    let shown = path
        .display()
        .to_string();
    let diff = TextDiff::from_lines(before, after);
    let text = diff
        .unified_diff()
        .context_radius(3)
        .header(&format!("{shown}.orig"), &shown)
        .to_string();

    for line in text.lines()
    {
        match line
            .chars()
            .next()
        {
            Some('+') if color && !line.starts_with("+++") => writeln!(out, "{}", line.green())?,
            Some('-') if color && !line.starts_with("---") => writeln!(out, "{}", line.red())?,
            Some('@') if color => writeln!(out, "{}", line.cyan())?,
            _ => writeln!(out, "{line}")?,
        }
    }
    Ok(())
}
