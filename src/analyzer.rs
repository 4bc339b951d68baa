//! Dependency analysis: for every opcall found in a tree, walks its
//! argument AST to build the set of cursors it depends on, then checks
//! the resulting graph for self-loops and cycles before the evaluator
//! ever runs a phase.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use crate::ast::Expr;
use crate::error::{EngineError, Result};
use crate::operators::OperatorRegistry;
use crate::tree::{Cursor, Value};

/// One discovered opcall: where it lives, which operator it names, its
/// argument list, and (once computed) the cursors it depends on.
#[derive(Debug, Clone)]
pub struct Opcall {
    pub cursor: Cursor,
    pub op: String,
    pub target: Option<String>,
    pub args: Vec<Expr>,
}

/// Walks `expr`, collecting every `Reference` cursor it mentions,
/// canonicalized against `tree`, and recursing into nested opcalls'
/// own argument lists (their `auto_dependencies` are added by the caller,
/// which has the registry in scope).
fn collect_references(expr: &Expr, tree: &Value, out: &mut HashSet<Cursor>) {
    match expr {
        Expr::Reference(cursor) => {
            out.insert(cursor.canonical(tree));
        }
        Expr::OperatorCall { args, .. } => {
            for arg in args {
                collect_references(arg, tree, out);
            }
        }
        Expr::LogicalOr { left, right }
        | Expr::VaultChoice { left, right }
        | Expr::List { left, right } => {
            collect_references(left, tree, out);
            collect_references(right, tree, out);
        }
        Expr::VaultGroup(inner) => collect_references(inner, tree, out),
        Expr::Literal(_) | Expr::EnvVar(_) => {}
    }
}

/// Computes the dependency set for a single opcall: every `Reference` in
/// its arguments, plus the operator's own `auto_dependencies`.
///
/// `ev` is used only to satisfy `auto_dependencies`'s signature — most
/// operators ignore it and return a constant set derived from `args`.
pub fn dependencies_of(
    opcall: &Opcall,
    tree: &Value,
    registry: &OperatorRegistry,
    ev: &dyn crate::operators::EvalContext,
) -> Result<HashSet<Cursor>> {
    let mut out = HashSet::new();
    for arg in &opcall.args {
        collect_references(arg, tree, &mut out);
    }
    let op = registry
        .get(&opcall.op)
        .ok_or_else(|| EngineError::UnknownOperator(opcall.op.clone()))?;
    for cursor in op.auto_dependencies(ev, &opcall.args) {
        out.insert(cursor.canonical(tree));
    }
    Ok(out)
}

/// A dependency graph over a fixed set of opcalls: edges point from a
/// dependency cursor to the opcalls that depend on it.
pub struct Graph {
    pub deps: HashMap<Cursor, HashSet<Cursor>>,
}

impl Graph {
    pub fn build(
        opcalls: &[Opcall],
        tree: &Value,
        registry: &OperatorRegistry,
        ev: &dyn crate::operators::EvalContext,
    ) -> Result<Self> {
        let mut deps = HashMap::new();
        for opcall in opcalls {
            let set = dependencies_of(opcall, tree, registry, ev)?;
            if let Some(looped) = set.iter().find(|dep| dep.under(&opcall.cursor)) {
                return Err(EngineError::CycleDetected(vec![
                    opcall.cursor.clone(),
                    looped.clone(),
                ]));
            }
            trace!(cursor = %opcall.cursor, deps = set.len(), "computed opcall dependencies");
            deps.insert(opcall.cursor.clone(), set);
        }
        let graph = Graph { deps };
        graph.check_cycles()?;
        Ok(graph)
    }

    /// Depth-first cycle detection over the dependency edges. Reports the
    /// cycle's cursors in traversal order when one is found.
    fn check_cycles(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }
        let mut marks: HashMap<&Cursor, Mark> = HashMap::new();
        let mut stack: Vec<Cursor> = Vec::new();

        fn visit<'a>(
            node: &'a Cursor,
            deps: &'a HashMap<Cursor, HashSet<Cursor>>,
            marks: &mut HashMap<&'a Cursor, Mark>,
            stack: &mut Vec<Cursor>,
        ) -> Result<()> {
            match marks.get(node) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    let start = stack.iter().position(|c| c == node).unwrap_or(0);
                    let mut cycle: Vec<Cursor> = stack[start..].to_vec();
                    cycle.push(node.clone());
                    return Err(EngineError::CycleDetected(cycle));
                }
                None => {}
            }
            marks.insert(node, Mark::Visiting);
            stack.push(node.clone());
            if let Some(children) = deps.get(node) {
                for child in children {
                    visit(child, deps, marks, stack)?;
                }
            }
            stack.pop();
            marks.insert(node, Mark::Done);
            Ok(())
        }

        for node in self.deps.keys() {
            visit(node, &self.deps, &mut marks, &mut stack)?;
        }
        debug!(opcalls = self.deps.len(), "dependency graph acyclic");
        Ok(())
    }

    pub fn dependencies_of(&self, cursor: &Cursor) -> Option<&HashSet<Cursor>> {
        self.deps.get(cursor)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn opcall(path: &str, op: &str, args: Vec<Expr>) -> Opcall {
        Opcall {
            cursor: Cursor::parse(path),
            op: op.to_string(),
            target: None,
            args,
        }
    }

    #[test]
    fn collects_plain_references() {
        let tree = Value::Map(crate::tree::Map::new());
        let mut out = HashSet::new();
        collect_references(&Expr::Reference(Cursor::parse("a.b")), &tree, &mut out);
        assert!(out.contains(&Cursor::parse("a.b")));
    }

    #[test]
    fn collects_references_through_nested_opcalls() {
        let tree = Value::Map(crate::tree::Map::new());
        let mut out = HashSet::new();
        let nested = Expr::operator_call("grab", vec![Expr::Reference(Cursor::parse("x.y"))]);
        collect_references(&nested, &tree, &mut out);
        assert!(out.contains(&Cursor::parse("x.y")));
    }

    struct DummyCtx;

    impl crate::operators::EvalContext for DummyCtx {
        fn resolve(&self, cursor: &Cursor) -> Result<Value> {
            Err(EngineError::NotFound(cursor.clone()))
        }
        fn eval_expr(&mut self, _expr: &Expr) -> Result<Value> {
            unimplemented!()
        }
        fn current_cursor(&self) -> &Cursor {
            unimplemented!()
        }
        fn target(&self) -> Option<&str> {
            None
        }
        fn vault(&mut self) -> Result<std::sync::Arc<dyn crate::clients::VaultClient>> {
            unimplemented!()
        }
        fn aws_param(&mut self) -> Result<std::sync::Arc<dyn crate::clients::AwsParamClient>> {
            unimplemented!()
        }
        fn aws_secret(&mut self) -> Result<std::sync::Arc<dyn crate::clients::AwsSecretClient>> {
            unimplemented!()
        }
        fn nats(&mut self) -> Result<std::sync::Arc<dyn crate::clients::NatsClient>> {
            unimplemented!()
        }
        fn skip_vault(&self) -> bool {
            false
        }
        fn skip_aws(&self) -> bool {
            false
        }
        fn skip_nats(&self) -> bool {
            false
        }
        fn cache_or_fetch(
            &mut self,
            _key: &str,
            _fetch: &mut dyn FnMut(&mut dyn crate::operators::EvalContext) -> Result<Value>,
        ) -> Result<Value> {
            unimplemented!()
        }
    }

    #[test]
    fn self_loop_is_rejected_before_cycle_check() {
        let tree = Value::Map(crate::tree::Map::new());
        let registry = OperatorRegistry::with_builtins();
        let opcalls = vec![opcall(
            "a",
            "grab",
            vec![Expr::Reference(Cursor::parse("a"))],
        )];
        let err = Graph::build(&opcalls, &tree, &registry, &DummyCtx).unwrap_err();
        assert!(matches!(err, EngineError::CycleDetected(_)));
    }

    #[test]
    fn cycle_between_two_opcalls_is_detected() {
        let tree = Value::Map(crate::tree::Map::new());
        let registry = OperatorRegistry::with_builtins();
        let opcalls = vec![
            opcall("a", "grab", vec![Expr::Reference(Cursor::parse("b"))]),
            opcall("b", "grab", vec![Expr::Reference(Cursor::parse("a"))]),
        ];
        let err = Graph::build(&opcalls, &tree, &registry, &DummyCtx).unwrap_err();
        assert!(matches!(err, EngineError::CycleDetected(_)));
    }
}
