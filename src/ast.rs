//! The expression AST: the tagged tree produced by both parsers and
//! consumed by the evaluator.

use crate::token::Lit;
use crate::tree::Cursor;

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Lit),
    Reference(Cursor),
    EnvVar(String),
    OperatorCall { op: String, target: Option<String>, args: Vec<Expr> },
    /// Classic default-fallback `||`. This variant appears only at the
    /// top level of an opcall's argument list, never nested inside
    /// another `Expr` — enforced by the parser, not by this type.
    LogicalOr { left: Box<Expr>, right: Box<Expr> },
    /// Vault sub-operator `|`-choice: try `left`, catch any error, try
    /// `right`.
    VaultChoice { left: Box<Expr>, right: Box<Expr> },
    /// Vault sub-operator `(...)` grouping.
    VaultGroup(Box<Expr>),
    /// Implicit space concatenation inside a vault sub-expression.
    List { left: Box<Expr>, right: Box<Expr> },
}

impl Expr {
    pub fn operator_call(op: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::OperatorCall {
            op: op.into(),
            target: None,
            args,
        }
    }
}
