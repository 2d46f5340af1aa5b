//! Transitive propagation: walk up the call graph from the target
//! function, collecting every signature and call site that must change.
//!
//! The walk uses an explicit worklist and a visited set keyed by position,
//! so cycles (direct or mutual recursion) terminate and each function is
//! expanded exactly once.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, instrument, trace};

use crate::core::error::{RefactorError, RefactorResult};
use crate::core::oracle::{CallEdge, CallGraphOracle, CallerKind};
use crate::core::position::{PositionKey, SourceAddress};
use crate::parsers::go_parser::Program;

/// Everything the mutator will touch, deduplicated by position.
#[derive(Debug, Default)]
pub struct Frontier<'p>
{
    pub signature_targets: IndexMap<PositionKey, SourceAddress<'p>>,
    pub call_site_targets: IndexMap<PositionKey, SourceAddress<'p>>,
}

impl<'p> Frontier<'p>
{
    /// A frontier holding only the starting signature.
    pub fn seeded(start: SourceAddress<'p>) -> Self
    {
        let mut frontier = Self::default();
        frontier.add_signature(start);
        frontier
    }

    /// Record a parameter list; returns false if it was already present.
    pub fn add_signature(
        &mut self,
        address: SourceAddress<'p>,
    ) -> bool
    {
        let key = address.key();
        insert_new(&mut self.signature_targets, key, address)
    }

    /// Record a call expression, keyed by its opening paren; returns false
    /// if it was already present.
    pub fn add_call_site(
        &mut self,
        address: SourceAddress<'p>,
    ) -> bool
    {
        let key = address.call_key();
        insert_new(&mut self.call_site_targets, key, address)
    }

    /// Serializable view for `--dry-run`.
    pub fn plan(
        &self,
        program: &Program,
    ) -> Plan
    {
        let entries = |targets: &IndexMap<PositionKey, SourceAddress<'p>>| -> Vec<PlannedEdit> {
            targets
                .values()
                .map(|a| PlannedEdit::new(program, a))
                .collect()
        };

        Plan {
            signatures: entries(&self.signature_targets),
            call_sites: entries(&self.call_site_targets),
        }
    }
}

fn insert_new<'p>(
    targets: &mut IndexMap<PositionKey, SourceAddress<'p>>,
    key: PositionKey,
    address: SourceAddress<'p>,
) -> bool
{
    if targets.contains_key(&key)
    {
        return false;
    }
    targets.insert(key, address);
    true
}

#[derive(Debug, Serialize)]
pub struct Plan
{
    pub signatures: Vec<PlannedEdit>,
    pub call_sites: Vec<PlannedEdit>,
}

#[derive(Debug, Serialize)]
pub struct PlannedEdit
{
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl PlannedEdit
{
    fn new(
        program: &Program,
        address: &SourceAddress,
    ) -> Self
    {
        let file = program.file(address.file);
        let at = file.line_col(address.start);
        Self {
            file: file
                .path
                .display()
                .to_string(),
            line: at.line,
            column: at.column,
            offset: address.start,
        }
    }
}

/// Seed a frontier with `start` and propagate from it.
pub fn propagate<'p, O>(
    program: &'p Program,
    oracle: &O,
    start: SourceAddress<'p>,
) -> RefactorResult<Frontier<'p>>
where
    O: CallGraphOracle<'p> + ?Sized,
{
    let mut frontier = Frontier::seeded(start.clone());
    propagate_into(program, oracle, start, &mut frontier)?;
    Ok(frontier)
}

/// Add the callers and call sites reachable upwards from `start` to `frontier`.
/// `start` itself is not added.
#[instrument(skip_all, fields(start = %start.location(program)))]
pub fn propagate_into<'p, O>(
    program: &'p Program,
    oracle: &O,
    start: SourceAddress<'p>,
    frontier: &mut Frontier<'p>,
) -> RefactorResult<()>
where
    O: CallGraphOracle<'p> + ?Sized,
{
    let mut visited: HashSet<PositionKey> = HashSet::new();
    let mut worklist = vec![start];

    while let Some(function) = worklist.pop()
    {
        if !visited.insert(function.key())
        {
            continue;
        }

        for edge in oracle.incoming_edges(&function)?
        {
            let signature = find_enclosing_signature(program, &edge)?;
            trace!(
                call = %edge.call_site.location(program),
                caller = ?edge.caller_kind,
                "call edge"
            );

            frontier.add_call_site(edge.call_site);
            if let Some(signature) = signature
            {
                frontier.add_signature(signature.clone());
                worklist.push(signature);
            }
        }
    }

    debug!(
        functions = visited.len(),
        signatures = frontier
            .signature_targets
            .len(),
        call_sites = frontier
            .call_site_targets
            .len(),
        "propagation finished"
    );
    Ok(())
}

/// Parameter list of the declaration the call sits in.
///
/// Package-level initializers and free-standing literals have no signature
/// to extend; their call sites are edited but the walk stops there.
/// Literals inside a declaration are looked through: the declaration's own
/// signature is the one extended.
pub fn find_enclosing_signature<'p>(
    program: &Program,
    edge: &CallEdge<'p>,
) -> RefactorResult<Option<SourceAddress<'p>>>
{
    if edge.caller_kind != CallerKind::Function
    {
        return Ok(None);
    }

    let path = &edge
        .call_site
        .path;
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
            return Ok(Some(SourceAddress::of_node(edge.call_site.file, params, &path[i..])));
        }
    }

    Err(RefactorError::NoEnclosingFunction {
        location: edge
            .call_site
            .location(program),
    })
}
