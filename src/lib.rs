//! A YAML-merge templating engine's expression core: the `(( ... ))`
//! opcall grammar, a phased dependency-ordered evaluator, the built-in
//! operator set, and the Vault/AWS/NATS external-store integrations.
//!
//! Reading/writing the document to YAML bytes and the recursive map-merge
//! primitive that produces the tree this crate evaluates both live
//! upstream of this crate; see [`tree`] for the value model this crate
//! consumes and produces.

pub mod analyzer;
pub mod ast;
pub mod cache;
pub mod calc;
pub mod clients;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod lexer;
pub mod metrics;
pub mod operators;
pub mod parser;
pub mod pool;
pub mod retry;
pub mod token;
pub mod tree;
pub mod types;

pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, Result};
pub use tree::{Cursor, Map, Value};
