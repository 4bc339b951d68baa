//! List handler: structural equality is the only operation defined on
//! list operands (priority 60); arithmetic on lists is a `TypeMismatch`
//! handled by the dispatcher in `types::mod`.

use crate::tree::Value;

pub fn equal(a: &Value, b: &Value) -> bool {
    a == b
}
