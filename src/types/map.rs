//! Map handler: structural equality is the only operation defined on
//! map operands (priority 40); arithmetic on maps is a `TypeMismatch`
//! handled by the dispatcher in `types::mod`.

use crate::tree::Value;

pub fn equal(a: &Value, b: &Value) -> bool {
    a == b
}
