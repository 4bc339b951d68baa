//! The `nats` operator: resolves a single argument to `kv:bucket/key` or
//! `obj:bucket/object`, fetches through the target-scoped client, and
//! decodes the bytes according to the KV single/multi-line heuristic or
//! the object's `Content-Type` header.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::ast::Expr;
use crate::error::{EngineError, Result};
use crate::tree::Value;

use super::{EvalContext, Operator, OperatorRegistry, Response};

pub fn register_all(registry: &mut OperatorRegistry) -> Result<()> {
    registry.register("nats", std::sync::Arc::new(Nats))?;
    Ok(())
}

const SKIPPED: &str = "REDACTED";

enum Path {
    Kv { store: String, key: String },
    Object { bucket: String, object: String },
}

fn parse_path(raw: &str) -> Result<Path> {
    let (kind, rest) = raw
        .split_once(':')
        .ok_or_else(|| EngineError::ConfigMalformed(format!("`{}` has no kv:/obj: prefix", raw)))?;
    let (left, right) = rest
        .split_once('/')
        .ok_or_else(|| EngineError::ConfigMalformed(format!("`{}` has no bucket/key separator", raw)))?;
    match kind {
        "kv" => Ok(Path::Kv {
            store: left.to_string(),
            key: right.to_string(),
        }),
        "obj" => Ok(Path::Object {
            bucket: left.to_string(),
            object: right.to_string(),
        }),
        other => Err(EngineError::ConfigMalformed(format!(
            "unknown nats path kind `{}`",
            other
        ))),
    }
}

/// A single-line value is kept as a raw string (preserves JSON-as-string,
/// URLs with colons); a multi-line value is parsed as YAML.
fn decode_kv(bytes: &[u8]) -> Result<Value> {
    let text = String::from_utf8(bytes.to_vec())
        .map_err(|e| EngineError::ConfigMalformed(format!("nats kv value is not UTF-8: {}", e)))?;
    if text.contains('\n') {
        serde_yaml::from_str(&text)
            .map_err(|e| EngineError::ConfigMalformed(format!("nats kv value is not valid YAML: {}", e)))
    } else {
        Ok(Value::Str(text))
    }
}

fn decode_object(bytes: &[u8], content_type: Option<&str>, object_name: &str) -> Result<Value> {
    let ct = content_type.unwrap_or("").to_ascii_lowercase();
    if ct.starts_with("text/yaml") || ct.starts_with("application/yaml") || ct.starts_with("application/x-yaml") {
        let text = String::from_utf8(bytes.to_vec())
            .map_err(|e| EngineError::ConfigMalformed(format!("nats object is not UTF-8: {}", e)))?;
        return serde_yaml::from_str(&text)
            .map_err(|e| EngineError::ConfigMalformed(format!("nats object is not valid YAML: {}", e)));
    }
    if ct.starts_with("application/json") {
        let text = String::from_utf8(bytes.to_vec())
            .map_err(|e| EngineError::ConfigMalformed(format!("nats object is not UTF-8: {}", e)))?;
        return serde_yaml::from_str(&text)
            .map_err(|e| EngineError::ConfigMalformed(format!("nats object is not valid JSON: {}", e)));
    }
    if ct.starts_with("text/plain") || ct.is_empty() {
        if ct.is_empty() && (object_name.ends_with(".yaml") || object_name.ends_with(".yml")) {
            let text = String::from_utf8(bytes.to_vec())
                .map_err(|e| EngineError::ConfigMalformed(format!("nats object is not UTF-8: {}", e)))?;
            return serde_yaml::from_str(&text)
                .map_err(|e| EngineError::ConfigMalformed(format!("nats object is not valid YAML: {}", e)));
        }
        let text = String::from_utf8(bytes.to_vec())
            .map_err(|e| EngineError::ConfigMalformed(format!("nats object is not UTF-8: {}", e)))?;
        return Ok(Value::Str(text));
    }
    Ok(Value::Str(STANDARD.encode(bytes)))
}

struct Nats;

impl Operator for Nats {
    fn run(&self, ev: &mut dyn EvalContext, args: &[Expr]) -> Result<Response> {
        if ev.skip_nats() {
            return Ok(Response::Replace(Value::Str(SKIPPED.to_string())));
        }
        let arg = args
            .first()
            .ok_or_else(|| EngineError::ParseError("nats requires one argument".to_string()))?;
        let raw = ev.eval_expr(arg)?;
        let raw = raw
            .stringify_scalar()
            .ok_or_else(|| EngineError::TypeMismatch("nats argument must stringify".to_string()))?;
        let path = parse_path(&raw)?;

        let target = ev.target().unwrap_or("").to_string();
        let cache_key = format!("{}@nats:{}", target, raw);

        let value = match path {
            Path::Kv { store, key } => {
                let mut fetch = move |ev: &mut dyn EvalContext| -> Result<Value> {
                    let client = ev.nats()?;
                    let bytes = client.kv_get(&store, &key)?;
                    decode_kv(&bytes)
                };
                ev.cache_or_fetch(&cache_key, &mut fetch)?
            }
            Path::Object { bucket, object } => {
                let mut fetch = move |ev: &mut dyn EvalContext| -> Result<Value> {
                    let client = ev.nats()?;
                    let obj = client.object_get(&bucket, &object)?;
                    decode_object(&obj.bytes, obj.content_type.as_deref(), &object)
                };
                ev.cache_or_fetch(&cache_key, &mut fetch)?
            }
        };
        Ok(Response::Replace(value))
    }
}
