//! Numeric handler contracts.

use crate::error::{EngineError, Result};
use crate::tree::Value;

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Int(i) => Some(*i),
        _ => None,
    }
}

fn require_numeric(a: &Value, b: &Value) -> Result<()> {
    if as_f64(a).is_some() && as_f64(b).is_some() {
        Ok(())
    } else {
        Err(EngineError::TypeMismatch(format!(
            "expected numeric operands, got {} and {}",
            a.type_name(),
            b.type_name()
        )))
    }
}

/// Add: if either operand is float64, result is float64; else int64 with
/// overflow check — on int64 overflow, silently promote to float64 sum (no
/// error).
pub fn add(a: &Value, b: &Value) -> Result<Value> {
    require_numeric(a, b)?;
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => match x.checked_add(*y) {
            Some(sum) => Ok(Value::Int(sum)),
            None => Ok(Value::Float(*x as f64 + *y as f64)),
        },
        _ => Ok(Value::Float(as_f64(a).unwrap() + as_f64(b).unwrap())),
    }
}

/// Subtract: int64 with overflow — on overflow, fail with `Overflow`.
pub fn subtract(a: &Value, b: &Value) -> Result<Value> {
    require_numeric(a, b)?;
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => {
            x.checked_sub(*y).map(Value::Int).ok_or(EngineError::Overflow)
        }
        _ => Ok(Value::Float(as_f64(a).unwrap() - as_f64(b).unwrap())),
    }
}

/// Multiply: int64 with overflow — on overflow, fail with `Overflow`.
/// Multiplication by zero yields int64(0).
pub fn multiply(a: &Value, b: &Value) -> Result<Value> {
    require_numeric(a, b)?;
    match (a, b) {
        (Value::Int(0), Value::Int(_)) | (Value::Int(_), Value::Int(0)) => Ok(Value::Int(0)),
        (Value::Int(x), Value::Int(y)) => {
            x.checked_mul(*y).map(Value::Int).ok_or(EngineError::Overflow)
        }
        _ => Ok(Value::Float(as_f64(a).unwrap() * as_f64(b).unwrap())),
    }
}

/// Divide: always returns float64; division by zero fails with
/// `DivisionByZero`.
pub fn divide(a: &Value, b: &Value) -> Result<Value> {
    require_numeric(a, b)?;
    let divisor = as_f64(b).unwrap();
    if divisor == 0.0 {
        return Err(EngineError::DivisionByZero);
    }
    Ok(Value::Float(as_f64(a).unwrap() / divisor))
}

/// Modulo: integer operation; floats are accepted only if they represent
/// whole numbers in int64 range, else fail `NotAnInteger`; modulo by zero
/// fails.
pub fn modulo(a: &Value, b: &Value) -> Result<Value> {
    require_numeric(a, b)?;
    let x = to_integer(a)?;
    let y = to_integer(b)?;
    if y == 0 {
        return Err(EngineError::DivisionByZero);
    }
    Ok(Value::Int(x % y))
}

fn to_integer(v: &Value) -> Result<i64> {
    match v {
        Value::Int(i) => Ok(*i),
        Value::Float(f) if f.fract() == 0.0 && f.is_finite() && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 => {
            Ok(*f as i64)
        }
        Value::Float(_) => Err(EngineError::NotAnInteger),
        other => Err(EngineError::TypeMismatch(format!(
            "expected numeric operand, got {}",
            other.type_name()
        ))),
    }
}

/// Equal/Less/Greater compare by promoting both to float64 — this loses
/// precision for large int64 values; kept deliberately, see DESIGN.md
/// Open Questions.
pub fn equal(a: &Value, b: &Value) -> Result<bool> {
    require_numeric(a, b)?;
    Ok(as_f64(a).unwrap() == as_f64(b).unwrap())
}

pub fn less(a: &Value, b: &Value) -> Result<bool> {
    require_numeric(a, b)?;
    Ok(as_f64(a).unwrap() < as_f64(b).unwrap())
}

pub fn greater(a: &Value, b: &Value) -> Result<bool> {
    require_numeric(a, b)?;
    Ok(as_f64(a).unwrap() > as_f64(b).unwrap())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn add_promotes_on_overflow() {
        let result = add(&Value::Int(i64::MAX), &Value::Int(1)).unwrap();
        assert_eq!(result, Value::Float(i64::MAX as f64 + 1.0));
    }

    #[test]
    fn subtract_overflow_fails() {
        let err = subtract(&Value::Int(i64::MIN), &Value::Int(1)).unwrap_err();
        assert_eq!(err, EngineError::Overflow);
    }

    #[test]
    fn multiply_by_zero_is_int_zero() {
        assert_eq!(multiply(&Value::Int(5), &Value::Int(0)).unwrap(), Value::Int(0));
    }

    #[test]
    fn divide_by_zero_fails() {
        let err = divide(&Value::Int(1), &Value::Int(0)).unwrap_err();
        assert_eq!(err, EngineError::DivisionByZero);
        let err = divide(&Value::Int(1), &Value::Float(-0.0)).unwrap_err();
        assert_eq!(err, EngineError::DivisionByZero);
    }

    #[test]
    fn modulo_preserves_sign_of_dividend() {
        assert_eq!(modulo(&Value::Int(-7), &Value::Int(3)).unwrap(), Value::Int(-1));
    }

    #[test]
    fn modulo_on_non_integral_float_fails() {
        let err = modulo(&Value::Float(1.5), &Value::Int(2)).unwrap_err();
        assert_eq!(err, EngineError::NotAnInteger);
    }
}
