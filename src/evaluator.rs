//! The phased evaluator: discovers every `(( ... ))` opcall in a tree,
//! groups them by [`Phase`](crate::operators::Phase), and runs each
//! phase to completion (strictly before the next phase starts) by
//! repeatedly picking a ready opcall, running it, and applying its
//! response — failing the phase with `Deadlock` if a full pass makes no
//! progress while opcalls remain.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::analyzer::{self, Opcall};
use crate::error::{EngineError, Result};
use crate::operators::{EvalContext, OperatorRegistry, Phase, Response};
use crate::tree::{Cursor, Value};

/// What the evaluator needs from its host beyond the operator-facing
/// [`EvalContext`]: tree access for opcall discovery and readiness
/// checks, and the ability to enter an opcall's scope and apply its
/// response to the tree.
pub trait EvaluatorContext: EvalContext {
    fn tree(&self) -> &Value;

    /// Sets the cursor/target/operator name an operator's `run` will see
    /// via `current_cursor`/`target` while it executes.
    fn begin_opcall(&mut self, cursor: Cursor, op: &str, target: Option<String>);

    /// Writes an opcall's response into the tree at `cursor`.
    fn apply_response(&mut self, cursor: &Cursor, response: Response) -> Result<()>;

    /// True iff the value currently at `cursor` is still an unevaluated
    /// `(( ... ))` marker.
    fn is_opcall_cursor(&self, cursor: &Cursor) -> bool {
        match cursor.resolve(self.tree()) {
            Some(Value::Str(s)) => opcall_body(s).is_some(),
            _ => false,
        }
    }

    /// Observes one operator run for metrics. A no-op unless the host
    /// wires up a recorder.
    fn record_metrics(&self, _op: &str, _duration: Duration, _failed: bool) {}
}

/// True iff `s` (trimmed) is entirely an unevaluated `(( ... ))` marker.
pub fn is_opcall_marker(s: &str) -> bool {
    opcall_body(s).is_some()
}

/// Returns the text between `((` and `))` if `s` (trimmed) is entirely an
/// opcall marker.
fn opcall_body(s: &str) -> Option<&str> {
    let t = s.trim();
    if t.len() >= 4 && t.starts_with("((") && t.ends_with("))") {
        Some(t[2..t.len() - 2].trim())
    } else {
        None
    }
}

fn collect_opcalls(
    value: &Value,
    cursor: Cursor,
    registry: &OperatorRegistry,
    out: &mut Vec<Opcall>,
) -> Result<()> {
    match value {
        Value::Str(s) => {
            if let Some(body) = opcall_body(s) {
                let parsed = crate::parser::parse_body(body, &|name| registry.contains(name))?;
                out.push(Opcall {
                    cursor,
                    op: parsed.op,
                    target: parsed.target,
                    args: parsed.args,
                });
            }
        }
        Value::List(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_opcalls(item, cursor.push_index(i), registry, out)?;
            }
        }
        Value::Map(map) => {
            for (k, v) in map.iter() {
                collect_opcalls(v, cursor.push_key(k), registry, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Runs every phase, in order, to completion against `ctx`'s tree.
pub fn run<C>(ctx: &mut C, registry: &OperatorRegistry) -> Result<()>
where
    C: EvaluatorContext,
{
    let snapshot = ctx.tree().clone();
    let mut opcalls = Vec::new();
    collect_opcalls(&snapshot, Cursor::root(), registry, &mut opcalls)?;
    debug!(total = opcalls.len(), "discovered opcalls");

    for phase in [Phase::Param, Phase::Merge, Phase::Eval] {
        let phase_opcalls: Vec<Opcall> = opcalls
            .iter()
            .filter(|o| {
                registry
                    .get(&o.op)
                    .map(|op| op.phase() == phase)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        if phase_opcalls.is_empty() {
            continue;
        }
        debug!(phase = ?phase, count = phase_opcalls.len(), "starting evaluation phase");
        let graph = analyzer::Graph::build(&phase_opcalls, &snapshot, registry, ctx)?;
        run_phase(ctx, registry, &graph, phase_opcalls)?;
    }
    Ok(())
}

fn run_phase<C>(
    ctx: &mut C,
    registry: &OperatorRegistry,
    graph: &analyzer::Graph,
    mut pending: Vec<Opcall>,
) -> Result<()>
where
    C: EvaluatorContext,
{
    while !pending.is_empty() {
        let mut next_round = Vec::new();
        let mut ran_any = false;

        for opcall in pending.drain(..) {
            let deps = graph
                .dependencies_of(&opcall.cursor)
                .cloned()
                .unwrap_or_default();
            let ready = deps.iter().all(|dep| !ctx.is_opcall_cursor(dep));
            if !ready {
                next_round.push(opcall);
                continue;
            }

            ctx.begin_opcall(opcall.cursor.clone(), &opcall.op, opcall.target.clone());
            let op = registry
                .get(&opcall.op)
                .ok_or_else(|| EngineError::UnknownOperator(opcall.op.clone()))?;
            let started = Instant::now();
            let outcome = op.run(ctx, &opcall.args);
            match outcome {
                Ok(response) => {
                    ctx.record_metrics(&opcall.op, started.elapsed(), false);
                    ctx.apply_response(&opcall.cursor, response)?;
                    ran_any = true;
                }
                Err(EngineError::NotReady) => {
                    next_round.push(opcall);
                }
                Err(err) => {
                    ctx.record_metrics(&opcall.op, started.elapsed(), true);
                    return Err(err);
                }
            }
        }

        if !ran_any {
            warn!(remaining = next_round.len(), "phase made no progress");
            return Err(EngineError::Deadlock(next_round.len()));
        }
        pending = next_round;
    }
    Ok(())
}
