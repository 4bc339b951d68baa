//! The error taxonomy for the expression core.
//!
//! Every fallible operation in this crate returns `Result<T, EngineError>`.
//! Callers that need to distinguish recoverable conditions (vault
//! fallback, retry) match on the specific variant rather than on
//! rendered text.

use thiserror::Error;

use crate::tree::Cursor;

/// The error taxonomy for the expression core.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("parse error: {0}")]
    ParseError(String),

    #[error("unknown operator `{0}`")]
    UnknownOperator(String),

    #[error("not found: {0}")]
    NotFound(Cursor),

    #[error("dependency cycle detected among cursors: {}", format_cursors(.0))]
    CycleDetected(Vec<Cursor>),

    #[error("deadlock: no opcall is ready but {0} remain")]
    Deadlock(usize),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("integer overflow")]
    Overflow,

    #[error("division by zero")]
    DivisionByZero,

    #[error("operand is not an integer")]
    NotAnInteger,

    #[error("string repetition factor too large (max 10000)")]
    RepetitionTooLarge,

    #[error("null reference at {0}")]
    NullReference(Cursor),

    #[error("vault not configured for target `{0}`")]
    VaultNotConfigured(String),

    #[error("vault secret not found: {0}")]
    VaultSecretNotFound(String),

    #[error("external fetch failed: {0}")]
    ExternalFetchFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("malformed configuration: {0}")]
    ConfigMalformed(String),

    #[error("operation attempted after shutdown")]
    ShutDown,

    #[error("parameter unset: {0}")]
    ParamUnset(String),

    /// Not a user-facing failure: signals to the evaluator that an opcall's
    /// dependency could not be statically declared and is still pending.
    /// The evaluator defers the opcall and retries later in the same phase.
    #[error("not ready")]
    NotReady,

    #[error("writing cursor {0} twice in one evaluation cycle")]
    DoubleWrite(Cursor),
}

impl EngineError {
    /// True for the single vault error kind that `||` fallback may recover
    /// from: a missing secret, and only that.
    pub fn is_vault_secret_not_found(&self) -> bool {
        matches!(self, EngineError::VaultSecretNotFound(_))
    }

    pub fn external_fetch_failed(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        EngineError::ExternalFetchFailed(Box::new(err))
    }
}

fn format_cursors(cursors: &[Cursor]) -> String {
    cursors
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        // Used by tests to assert on error *kind*, not message text.
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// A result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
