//! The `vault` / `vault-try` operator: resolves an argument expression
//! built from the vault sub-operator grammar into an ordered list of
//! candidate `secret:subkey` paths, tries each against the target-scoped
//! client and cache, and falls back to a default expression if every
//! candidate comes up not-found.

use crate::ast::Expr;
use crate::error::{EngineError, Result};
use crate::token::Lit;
use crate::tree::Value;

use super::{EvalContext, Operator, OperatorRegistry, Response};

pub fn register_all(registry: &mut OperatorRegistry) -> Result<()> {
    let op = std::sync::Arc::new(Vault);
    registry.register("vault", op.clone())?;
    registry.register("vault-try", op)?;
    Ok(())
}

struct Vault;

const SKIPPED: &str = "REDACTED";

impl Operator for Vault {
    fn run(&self, ev: &mut dyn EvalContext, args: &[Expr]) -> Result<Response> {
        if ev.skip_vault() {
            return Ok(Response::Replace(Value::Str(SKIPPED.to_string())));
        }

        let arg = args
            .first()
            .ok_or_else(|| EngineError::ParseError("vault requires one argument".to_string()))?;

        let (primary, default) = match arg {
            Expr::LogicalOr { left, right } => (left.as_ref(), Some(right.as_ref())),
            other => (other, None),
        };

        let mut candidates = Vec::new();
        for built in path_candidates(primary, ev)? {
            for piece in built.split(';') {
                let piece = piece.trim();
                if !piece.is_empty() {
                    candidates.push(piece.to_string());
                }
            }
        }
        if candidates.is_empty() {
            return Err(EngineError::TypeMismatch(
                "vault resolved to no candidate path".to_string(),
            ));
        }

        let mut last_err = None;
        for candidate in &candidates {
            match try_path(ev, candidate) {
                Ok(value) => return Ok(Response::Replace(value)),
                Err(err) if err.is_vault_secret_not_found() => last_err = Some(err),
                Err(err) => return Err(err),
            }
        }

        if let Some(default_expr) = default {
            let value = ev.eval_expr(default_expr)?;
            return Ok(Response::Replace(value));
        }
        Err(last_err.unwrap_or_else(|| EngineError::VaultSecretNotFound(candidates.join(", "))))
    }
}

fn try_path(ev: &mut dyn EvalContext, path: &str) -> Result<Value> {
    let (secret_path, subkey) = path
        .rsplit_once(':')
        .ok_or_else(|| EngineError::ConfigMalformed(format!("`{}` has no `:subkey`", path)))?;
    let target = ev.target().unwrap_or("").to_string();
    let cache_key = format!("{}@vault:{}", target, secret_path);
    let secret_path = secret_path.to_string();
    let subkey = subkey.to_string();

    let mut fetch = move |ev: &mut dyn EvalContext| -> Result<Value> {
        let client = ev.vault()?;
        let fields = client.read_secret(&secret_path)?;
        Ok(Value::Map(fields))
    };
    let fields = ev.cache_or_fetch(&cache_key, &mut fetch)?;
    let map = fields
        .as_map()
        .ok_or_else(|| EngineError::TypeMismatch("cached vault secret is not a map".to_string()))?;
    match map.get(&subkey) {
        Some(Value::Str(s)) => Ok(Value::Str(s.clone())),
        Some(other) => Err(EngineError::TypeMismatch(format!(
            "vault subkey `{}` is not a string scalar ({})",
            subkey,
            other.type_name()
        ))),
        None => Err(EngineError::VaultSecretNotFound(path.to_string())),
    }
}

/// Expands the vault sub-operator AST into the ordered set of candidate
/// path strings it denotes: `List` cross-products its two sides, `Choice`
/// concatenates (tries left's candidates before right's), `Group` passes
/// through, and every other node stringifies to a single candidate.
fn path_candidates(expr: &Expr, ev: &mut dyn EvalContext) -> Result<Vec<String>> {
    match expr {
        Expr::List { left, right } => {
            let lefts = path_candidates(left, ev)?;
            let rights = path_candidates(right, ev)?;
            let mut out = Vec::with_capacity(lefts.len() * rights.len());
            for l in &lefts {
                for r in &rights {
                    out.push(format!("{}{}", l, r));
                }
            }
            Ok(out)
        }
        Expr::VaultChoice { left, right } => {
            let mut out = path_candidates(left, ev)?;
            out.extend(path_candidates(right, ev)?);
            Ok(out)
        }
        Expr::VaultGroup(inner) => path_candidates(inner, ev),
        Expr::Literal(Lit::String(s)) => Ok(vec![s.clone()]),
        other => {
            let value = ev.eval_expr(other)?;
            let rendered = value.stringify_scalar().ok_or_else(|| {
                EngineError::TypeMismatch(format!(
                    "vault path component did not stringify ({})",
                    value.type_name()
                ))
            })?;
            Ok(vec![rendered])
        }
    }
}
