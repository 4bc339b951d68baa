//! Type-aware arithmetic, comparison, and boolean operators.
//!
//! Handlers are selected by the pair of dynamic types of the two operands
//! using a priority table (numeric=100, string=80, list=60, map=40,
//! boolean=20); the highest-priority handler that declares support for the
//! pair wins. Rather than a dynamic registry of handler objects (there are
//! only ever two operand types, both known at the call site), dispatch is
//! a direct match expressed in priority order, which is equivalent and
//! avoids an unnecessary layer of indirection.

pub mod boolean;
pub mod list;
pub mod map;
pub mod numeric;
pub mod string;

use crate::error::{EngineError, Result};
use crate::tree::Value;

/// Priority used when more than one handler could plausibly apply; kept
/// for documentation and for `dominant_kind`, used by the string handler
/// to decide whether a mixed numeric/string pair is string concatenation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Kind {
    Boolean = 20,
    Map = 40,
    List = 60,
    String = 80,
    Numeric = 100,
}

fn kind_of(v: &Value) -> Kind {
    match v {
        Value::Bool(_) | Value::Null => Kind::Boolean,
        Value::Map(_) => Kind::Map,
        Value::List(_) => Kind::List,
        Value::Str(_) => Kind::String,
        Value::Int(_) | Value::Float(_) => Kind::Numeric,
    }
}

fn dominant_kind(a: &Value, b: &Value) -> Kind {
    std::cmp::max(kind_of(a), kind_of(b))
}

pub fn add(a: &Value, b: &Value) -> Result<Value> {
    match dominant_kind(a, b) {
        Kind::Numeric => numeric::add(a, b),
        Kind::String => string::add(a, b),
        _ => Err(EngineError::TypeMismatch(format!(
            "cannot add {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

pub fn subtract(a: &Value, b: &Value) -> Result<Value> {
    numeric::subtract(a, b)
}

pub fn multiply(a: &Value, b: &Value) -> Result<Value> {
    match dominant_kind(a, b) {
        Kind::String => string::multiply(a, b),
        _ => numeric::multiply(a, b),
    }
}

pub fn divide(a: &Value, b: &Value) -> Result<Value> {
    numeric::divide(a, b)
}

pub fn modulo(a: &Value, b: &Value) -> Result<Value> {
    numeric::modulo(a, b)
}

pub fn equal(a: &Value, b: &Value) -> Result<bool> {
    match dominant_kind(a, b) {
        Kind::Numeric => Ok(numeric::equal(a, b)?),
        Kind::List => Ok(list::equal(a, b)),
        Kind::Map => Ok(map::equal(a, b)),
        _ => Ok(a == b),
    }
}

pub fn not_equal(a: &Value, b: &Value) -> Result<bool> {
    Ok(!equal(a, b)?)
}

pub fn less(a: &Value, b: &Value) -> Result<bool> {
    numeric::less(a, b)
}

pub fn greater(a: &Value, b: &Value) -> Result<bool> {
    numeric::greater(a, b)
}

pub fn less_or_equal(a: &Value, b: &Value) -> Result<bool> {
    Ok(less(a, b)? || equal(a, b)?)
}

pub fn greater_or_equal(a: &Value, b: &Value) -> Result<bool> {
    Ok(greater(a, b)? || equal(a, b)?)
}

/// True for the symbolic operator names the classic expression grammar
/// parses directly into `Expr::OperatorCall` (arithmetic, comparison, and
/// boolean), as opposed to the named, registry-dispatched operators like
/// `grab` or `vault`.
pub fn is_symbolic_operator(op: &str) -> bool {
    matches!(
        op,
        "+" | "-" | "*" | "/" | "%" | "==" | "!=" | "<" | "<=" | ">" | ">=" | "&&" | "||" | "!"
    )
}

/// Applies a binary symbolic operator. Panics (via `unreachable!`) if `op`
/// is not one of the binary names in [`is_symbolic_operator`]; callers are
/// expected to have already excluded unary `!`.
pub fn apply_binary(op: &str, a: &Value, b: &Value) -> Result<Value> {
    match op {
        "+" => add(a, b),
        "-" => subtract(a, b),
        "*" => multiply(a, b),
        "/" => divide(a, b),
        "%" => modulo(a, b),
        "==" => equal(a, b).map(Value::Bool),
        "!=" => not_equal(a, b).map(Value::Bool),
        "<" => less(a, b).map(Value::Bool),
        "<=" => less_or_equal(a, b).map(Value::Bool),
        ">" => greater(a, b).map(Value::Bool),
        ">=" => greater_or_equal(a, b).map(Value::Bool),
        "&&" => Ok(boolean::and(a, b)),
        "||" => Ok(boolean::or(a, b)),
        other => unreachable!("`{}` is not a binary symbolic operator", other),
    }
}

/// Applies the one unary symbolic operator, logical negation.
pub fn apply_unary(op: &str, a: &Value) -> Value {
    match op {
        "!" => boolean::not(a),
        other => unreachable!("`{}` is not a unary symbolic operator", other),
    }
}
