//! Trait boundaries for the external stores (Vault, AWS Parameter Store /
//! Secrets Manager, NATS JetStream). Production clients live behind these
//! traits so the evaluator and operators never depend on a concrete SDK;
//! `fake` provides in-memory implementations used by the test suite.

pub mod fake;

use crate::error::Result;
use crate::tree::Map;

/// Reads a secret at `path`, returning its fields as a map of string
/// scalars (the vault operator extracts one field by name afterward).
pub trait VaultClient: Send + Sync {
    fn read_secret(&self, path: &str) -> Result<Map>;
}

pub trait AwsParamClient: Send + Sync {
    fn get_parameter(&self, path: &str) -> Result<String>;
}

pub trait AwsSecretClient: Send + Sync {
    fn get_secret(&self, name: &str, stage: Option<&str>, version: Option<&str>) -> Result<String>;
}

/// A NATS object's content, with the `Content-Type` header (if any) needed
/// to decide how to decode its bytes.
pub struct NatsObject {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

pub trait NatsClient: Send + Sync {
    fn kv_get(&self, store: &str, key: &str) -> Result<Vec<u8>>;
    fn object_get(&self, bucket: &str, object: &str) -> Result<NatsObject>;
}
