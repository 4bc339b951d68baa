//! String handler: concatenation and repetition.

use crate::error::{EngineError, Result};
use crate::tree::Value;

/// `Add` = concatenation (numeric operand stringified by the canonical
/// decimal form from `Value::stringify_scalar`).
pub fn add(a: &Value, b: &Value) -> Result<Value> {
    let left = a.stringify_scalar().ok_or_else(|| {
        EngineError::TypeMismatch(format!("cannot stringify {} for concatenation", a.type_name()))
    })?;
    let right = b.stringify_scalar().ok_or_else(|| {
        EngineError::TypeMismatch(format!("cannot stringify {} for concatenation", b.type_name()))
    })?;
    Ok(Value::Str(left + &right))
}

/// `Multiply(string, integer)` or `Multiply(integer, string)` = repetition;
/// fails `RepetitionTooLarge` if the integer factor exceeds 10000.
pub fn multiply(a: &Value, b: &Value) -> Result<Value> {
    let (s, n) = match (a, b) {
        (Value::Str(s), Value::Int(n)) => (s, *n),
        (Value::Int(n), Value::Str(s)) => (s, *n),
        _ => {
            return Err(EngineError::TypeMismatch(
                "string multiplication requires a string and an integer".to_string(),
            ))
        }
    };
    if n < 0 {
        return Err(EngineError::TypeMismatch(
            "string repetition factor must not be negative".to_string(),
        ));
    }
    if n > 10_000 {
        return Err(EngineError::RepetitionTooLarge);
    }
    Ok(Value::Str(s.repeat(n as usize)))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn concatenation_stringifies_numbers_canonically() {
        let result = add(&Value::Str("n=".to_string()), &Value::Int(42)).unwrap();
        assert_eq!(result, Value::Str("n=42".to_string()));
    }

    #[test]
    fn repetition_at_limit_is_allowed() {
        let result = multiply(&Value::Str("x".to_string()), &Value::Int(10_000)).unwrap();
        assert_eq!(result.as_str().unwrap().len(), 10_000);
    }

    #[test]
    fn repetition_past_limit_fails() {
        let err = multiply(&Value::Str("x".to_string()), &Value::Int(10_001)).unwrap_err();
        assert_eq!(err, EngineError::RepetitionTooLarge);
    }
}
