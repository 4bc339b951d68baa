//! The operator trait, the kind of response an operator produces, and the
//! process-wide registry that dispatches an opcall's name to its
//! implementation.

pub mod aws;
pub mod core;
pub mod nats;
pub mod vault;

use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::Expr;
use crate::error::Result;
use crate::tree::{Cursor, Value};

/// Which evaluation phase an operator belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Param,
    Merge,
    Eval,
}

/// What an operator's `Run` does to the document tree at its own cursor.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Replace the opcall's own value with `value`.
    Replace(Value),
    /// Splice `value` (always a map) into the parent map, replacing the
    /// opcall's own key.
    Inject(Value),
    /// Leave the tree untouched (used by merge-control opcalls that act
    /// only through side effects on the evaluator's bookkeeping).
    Keep,
}

/// Everything an operator's `Dependencies`/`Run` needs from the engine
/// around it: reading the tree, recursively evaluating nested expressions,
/// and reaching the external-store plumbing.
pub trait EvalContext {
    /// Looks up the current value at `cursor`. `Err(NotReady)` if the
    /// cursor is still an unresolved opcall; `Err(NotFound)` if absent.
    fn resolve(&self, cursor: &Cursor) -> Result<Value>;

    /// Evaluates an arbitrary expression node to a value, recursing into
    /// nested operator calls through the registry.
    fn eval_expr(&mut self, expr: &Expr) -> Result<Value>;

    /// The cursor the opcall currently being run/analyzed is located at.
    fn current_cursor(&self) -> &Cursor;

    /// The `@target` suffix on the opcall currently being run, if any.
    fn target(&self) -> Option<&str>;

    fn vault(&mut self) -> Result<Arc<dyn crate::clients::VaultClient>>;
    fn aws_param(&mut self) -> Result<Arc<dyn crate::clients::AwsParamClient>>;
    fn aws_secret(&mut self) -> Result<Arc<dyn crate::clients::AwsSecretClient>>;
    fn nats(&mut self) -> Result<Arc<dyn crate::clients::NatsClient>>;

    fn skip_vault(&self) -> bool;
    fn skip_aws(&self) -> bool;
    fn skip_nats(&self) -> bool;

    /// Gets a cached value, or runs `fetch` on miss and caches the result
    /// under the TTL configured for `target`.
    fn cache_or_fetch(
        &mut self,
        key: &str,
        fetch: &mut dyn FnMut(&mut dyn EvalContext) -> Result<Value>,
    ) -> Result<Value>;
}

pub trait Operator: Send + Sync {
    fn setup(&self) -> Result<()> {
        Ok(())
    }

    fn phase(&self) -> Phase {
        Phase::Eval
    }

    /// Cursors this opcall depends on, beyond what the generic AST walk in
    /// `analyzer` already collects from `Reference` nodes and nested
    /// `OperatorCall`s (the `auto` set — e.g. `grab` depends on the path it
    /// grabs, `inject` on every map it merges).
    fn auto_dependencies(&self, _ev: &dyn EvalContext, _args: &[Expr]) -> Vec<Cursor> {
        Vec::new()
    }

    fn run(&self, ev: &mut dyn EvalContext, args: &[Expr]) -> Result<Response>;
}

/// A process-wide name -> Operator map, built once at startup.
pub struct OperatorRegistry {
    operators: HashMap<String, Arc<dyn Operator>>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        OperatorRegistry {
            operators: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: &str, op: Arc<dyn Operator>) -> Result<()> {
        op.setup()?;
        self.operators.insert(name.to_string(), op);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operators.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Operator>> {
        self.operators.get(name)
    }

    pub fn with_builtins() -> Self {
        let mut registry = OperatorRegistry::new();
        core::register_all(&mut registry).expect("built-in operator setup never fails");
        vault::register_all(&mut registry).expect("built-in operator setup never fails");
        aws::register_all(&mut registry).expect("built-in operator setup never fails");
        nats::register_all(&mut registry).expect("built-in operator setup never fails");
        registry
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builtins_cover_the_operator_grammar() {
        let registry = OperatorRegistry::with_builtins();
        for name in [
            "grab", "concat", "calc", "inject", "keys", "ternary", "join", "null", "stringify",
            "empty", "param", "static_ips", "vault", "vault-try", "awsparam", "awssecret", "nats",
        ] {
            assert!(registry.contains(name), "missing builtin operator `{}`", name);
        }
    }
}
