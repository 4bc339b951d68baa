//! The document-local core operators: `grab`, `concat`, `calc`, `inject`,
//! `keys`, `param`, `ternary`, `join`, `null`, `stringify`, `empty`,
//! `static_ips`. None of these touch an external store.

use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::ast::Expr;
use crate::error::{EngineError, Result};
use crate::tree::{Cursor, Map, Value};

use super::{EvalContext, Operator, OperatorRegistry, Phase, Response};

pub fn register_all(registry: &mut OperatorRegistry) -> Result<()> {
    registry.register("grab", std::sync::Arc::new(Grab))?;
    registry.register("concat", std::sync::Arc::new(Concat))?;
    registry.register("calc", std::sync::Arc::new(Calc))?;
    registry.register("inject", std::sync::Arc::new(Inject))?;
    registry.register("keys", std::sync::Arc::new(Keys))?;
    registry.register("param", std::sync::Arc::new(Param))?;
    registry.register("ternary", std::sync::Arc::new(Ternary))?;
    registry.register("join", std::sync::Arc::new(Join))?;
    registry.register("null", std::sync::Arc::new(NullOp))?;
    registry.register("stringify", std::sync::Arc::new(Stringify))?;
    registry.register("empty", std::sync::Arc::new(Empty))?;
    registry.register("static_ips", std::sync::Arc::new(StaticIps))?;
    Ok(())
}

fn ref_cursor(arg: &Expr) -> Option<&Cursor> {
    match arg {
        Expr::Reference(c) => Some(c),
        _ => None,
    }
}

struct Grab;

impl Operator for Grab {
    fn auto_dependencies(&self, _ev: &dyn EvalContext, args: &[Expr]) -> Vec<Cursor> {
        args.first().and_then(ref_cursor).cloned().into_iter().collect()
    }

    fn run(&self, ev: &mut dyn EvalContext, args: &[Expr]) -> Result<Response> {
        let arg = args
            .first()
            .ok_or_else(|| EngineError::ParseError("grab requires one argument".to_string()))?;
        let value = ev.eval_expr(arg)?;
        Ok(Response::Replace(value))
    }
}

struct Concat;

impl Operator for Concat {
    fn run(&self, ev: &mut dyn EvalContext, args: &[Expr]) -> Result<Response> {
        let mut out = String::new();
        for arg in args {
            let value = ev.eval_expr(arg)?;
            let piece = value.stringify_scalar().ok_or_else(|| {
                EngineError::TypeMismatch(format!("cannot stringify {} in concat", value.type_name()))
            })?;
            out.push_str(&piece);
        }
        Ok(Response::Replace(Value::Str(out)))
    }
}

struct Calc;

impl Operator for Calc {
    fn run(&self, ev: &mut dyn EvalContext, args: &[Expr]) -> Result<Response> {
        let arg = args
            .first()
            .ok_or_else(|| EngineError::ParseError("calc requires one argument".to_string()))?;
        // A bare `(( a + b ))` body parses as a synthetic `calc` call whose
        // single argument is already a fully structured arithmetic/boolean
        // expression tree; `eval_expr` resolves that straight to a value, no
        // text formula involved. Only an explicit `(( calc "a + b" ))` call
        // produces a string here.
        let formula = match ev.eval_expr(arg)? {
            Value::Str(s) => s,
            already_computed => return Ok(Response::Replace(already_computed)),
        };

        // `calc::eval` wants a plain `Fn(&str) -> Result<f64>`, but
        // resolving a reference needs `&mut dyn EvalContext` (a nested
        // opcall dependency may still be pending). Resolve every
        // identifier up front instead, then hand `calc::eval` a closure
        // over the pre-resolved map.
        let resolved = resolve_calc_identifiers(ev, &formula)?;
        let result = crate::calc::eval(&formula, &|name| {
            resolved
                .get(name)
                .copied()
                .ok_or_else(|| EngineError::NotFound(Cursor::parse(name)))
        })?;

        if result.fract() == 0.0 && result.is_finite() && result.abs() < i64::MAX as f64 {
            Ok(Response::Replace(Value::Int(result as i64)))
        } else {
            Ok(Response::Replace(Value::Float(result)))
        }
    }
}

/// Scans `formula` for dotted-identifier tokens and resolves each through
/// `ev`, failing `TypeMismatch`/`NullReference` exactly as the numeric
/// coercion in `calc::eval` would once it reached that identifier.
fn resolve_calc_identifiers(
    ev: &mut dyn EvalContext,
    formula: &str,
) -> Result<std::collections::HashMap<String, f64>> {
    let mut out = std::collections::HashMap::new();
    let mut chars = formula.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while matches!(chars.peek(), Some(c) if c.is_alphanumeric() || *c == '_' || *c == '.') {
                ident.push(chars.next().unwrap());
            }
            const FUNCS: &[&str] = &["min", "max", "mod", "pow", "sqrt", "floor", "ceil"];
            if FUNCS.contains(&ident.as_str()) {
                continue;
            }
            if out.contains_key(&ident) {
                continue;
            }
            let value = ev.eval_expr(&Expr::Reference(Cursor::parse(&ident)))?;
            let as_f64 = match value {
                Value::Int(i) => i as f64,
                Value::Float(f) => f,
                Value::Null => return Err(EngineError::NullReference(Cursor::parse(&ident))),
                other => {
                    return Err(EngineError::TypeMismatch(format!(
                        "calc reference `{}` is not numeric ({})",
                        ident,
                        other.type_name()
                    )))
                }
            };
            out.insert(ident, as_f64);
        } else {
            chars.next();
        }
    }
    Ok(out)
}

struct Inject;

impl Operator for Inject {
    fn phase(&self) -> Phase {
        Phase::Merge
    }

    fn auto_dependencies(&self, _ev: &dyn EvalContext, args: &[Expr]) -> Vec<Cursor> {
        args.iter().filter_map(ref_cursor).cloned().collect()
    }

    fn run(&self, ev: &mut dyn EvalContext, args: &[Expr]) -> Result<Response> {
        let mut merged = Map::new();
        for arg in args {
            let value = ev.eval_expr(arg)?;
            match value {
                Value::Map(m) => merged.merge_from(&m),
                other => {
                    return Err(EngineError::TypeMismatch(format!(
                        "inject requires map arguments, got {}",
                        other.type_name()
                    )))
                }
            }
        }
        Ok(Response::Inject(Value::Map(merged)))
    }
}

struct Keys;

impl Operator for Keys {
    fn auto_dependencies(&self, _ev: &dyn EvalContext, args: &[Expr]) -> Vec<Cursor> {
        args.first().and_then(ref_cursor).cloned().into_iter().collect()
    }

    fn run(&self, ev: &mut dyn EvalContext, args: &[Expr]) -> Result<Response> {
        let arg = args
            .first()
            .ok_or_else(|| EngineError::ParseError("keys requires one argument".to_string()))?;
        let value = ev.eval_expr(arg)?;
        let map = value
            .as_map()
            .ok_or_else(|| EngineError::TypeMismatch(format!("keys requires a map, got {}", value.type_name())))?;
        let keys = map.sorted_keys().into_iter().map(Value::Str).collect();
        Ok(Response::Replace(Value::List(keys)))
    }
}

struct Param;

impl Operator for Param {
    fn phase(&self) -> Phase {
        Phase::Param
    }

    fn run(&self, ev: &mut dyn EvalContext, args: &[Expr]) -> Result<Response> {
        let message = match args.first() {
            Some(arg) => ev
                .eval_expr(arg)?
                .stringify_scalar()
                .unwrap_or_default(),
            None => String::new(),
        };
        Err(EngineError::ParamUnset(message))
    }
}

struct Ternary;

impl Operator for Ternary {
    fn run(&self, ev: &mut dyn EvalContext, args: &[Expr]) -> Result<Response> {
        if args.len() != 3 {
            return Err(EngineError::ParseError(
                "ternary requires exactly 3 arguments".to_string(),
            ));
        }
        let cond = ev.eval_expr(&args[0])?;
        let branch = if cond.is_truthy() { &args[1] } else { &args[2] };
        let value = ev.eval_expr(branch)?;
        Ok(Response::Replace(value))
    }
}

struct Join;

impl Operator for Join {
    fn run(&self, ev: &mut dyn EvalContext, args: &[Expr]) -> Result<Response> {
        if args.len() != 2 {
            return Err(EngineError::ParseError(
                "join requires exactly 2 arguments (sep, list)".to_string(),
            ));
        }
        let sep = ev
            .eval_expr(&args[0])?
            .stringify_scalar()
            .ok_or_else(|| EngineError::TypeMismatch("join separator must stringify".to_string()))?;
        let list_value = ev.eval_expr(&args[1])?;
        let list = list_value
            .as_list()
            .ok_or_else(|| EngineError::TypeMismatch(format!("join requires a list, got {}", list_value.type_name())))?;
        let mut pieces = Vec::with_capacity(list.len());
        for item in list {
            let piece = item.stringify_scalar().ok_or_else(|| {
                EngineError::TypeMismatch(format!("join cannot stringify {} element", item.type_name()))
            })?;
            pieces.push(piece);
        }
        Ok(Response::Replace(Value::Str(pieces.join(&sep))))
    }
}

struct NullOp;

impl Operator for NullOp {
    fn run(&self, _ev: &mut dyn EvalContext, _args: &[Expr]) -> Result<Response> {
        Ok(Response::Replace(Value::Null))
    }
}

struct Stringify;

impl Operator for Stringify {
    fn auto_dependencies(&self, _ev: &dyn EvalContext, args: &[Expr]) -> Vec<Cursor> {
        args.first().and_then(ref_cursor).cloned().into_iter().collect()
    }

    fn run(&self, ev: &mut dyn EvalContext, args: &[Expr]) -> Result<Response> {
        let arg = args
            .first()
            .ok_or_else(|| EngineError::ParseError("stringify requires one argument".to_string()))?;
        let value = ev.eval_expr(arg)?;
        let cursor = ref_cursor(arg).cloned().unwrap_or_default();
        if matches!(value, Value::Null) {
            return Err(EngineError::NullReference(cursor));
        }
        let rendered = value
            .stringify_scalar()
            .unwrap_or_else(|| stringify_flow(&value));
        Ok(Response::Replace(Value::Str(rendered)))
    }
}

fn stringify_flow(value: &Value) -> String {
    match value {
        Value::List(items) => {
            let inner: Vec<String> = items.iter().map(stringify_flow_scalar).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Map(map) => {
            let inner: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, stringify_flow_scalar(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
        other => stringify_flow_scalar(other),
    }
}

fn stringify_flow_scalar(value: &Value) -> String {
    value.stringify_scalar().unwrap_or_else(|| stringify_flow(value))
}

struct Empty;

impl Operator for Empty {
    fn auto_dependencies(&self, _ev: &dyn EvalContext, args: &[Expr]) -> Vec<Cursor> {
        args.first().and_then(ref_cursor).cloned().into_iter().collect()
    }

    fn run(&self, ev: &mut dyn EvalContext, args: &[Expr]) -> Result<Response> {
        let arg = args
            .first()
            .ok_or_else(|| EngineError::ParseError("empty requires one argument".to_string()))?;
        let value = ev.eval_expr(arg)?;
        Ok(Response::Replace(Value::Bool(!value.is_truthy())))
    }
}

struct StaticIps;

impl Operator for StaticIps {
    fn run(&self, ev: &mut dyn EvalContext, args: &[Expr]) -> Result<Response> {
        let mut current_cidr: Option<(Ipv4Addr, u32)> = None;
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            match ev.eval_expr(arg)? {
                Value::Str(s) => {
                    current_cidr = Some(parse_cidr(&s)?);
                }
                Value::Int(offset) => {
                    let (base, prefix) = current_cidr.ok_or_else(|| {
                        EngineError::TypeMismatch(
                            "static_ips offset must be preceded by a CIDR range".to_string(),
                        )
                    })?;
                    out.push(Value::Str(offset_ip(base, prefix, offset)?.to_string()));
                }
                other => {
                    return Err(EngineError::TypeMismatch(format!(
                        "static_ips arguments must be CIDR strings or integer offsets, got {}",
                        other.type_name()
                    )))
                }
            }
        }
        Ok(Response::Replace(Value::List(out)))
    }
}

fn parse_cidr(s: &str) -> Result<(Ipv4Addr, u32)> {
    let (addr, prefix) = s
        .split_once('/')
        .ok_or_else(|| EngineError::ConfigMalformed(format!("`{}` is not a CIDR range", s)))?;
    let addr = Ipv4Addr::from_str(addr)
        .map_err(|_| EngineError::ConfigMalformed(format!("`{}` is not a valid IPv4 address", addr)))?;
    let prefix: u32 = prefix
        .parse()
        .map_err(|_| EngineError::ConfigMalformed(format!("`{}` is not a valid prefix length", prefix)))?;
    if prefix > 32 {
        return Err(EngineError::ConfigMalformed(format!("`{}` prefix out of range", s)));
    }
    Ok((addr, prefix))
}

fn offset_ip(base: Ipv4Addr, prefix: u32, offset: i64) -> Result<Ipv4Addr> {
    let host_bits = 32 - prefix;
    let max_hosts = 1u64 << host_bits;
    if offset < 0 || offset as u64 >= max_hosts {
        return Err(EngineError::ConfigMalformed(format!(
            "offset {} exceeds the /{} range",
            offset, prefix
        )));
    }
    let base_u32 = u32::from(base);
    Ok(Ipv4Addr::from(base_u32 + offset as u32))
}
