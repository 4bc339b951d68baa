//! The `awsparam` / `awssecret` operators: resolve a single argument to a
//! string, parse it as `path?stage=...&version=...&key=...`, and fetch
//! the named parameter or secret through the target-scoped client.

use crate::ast::Expr;
use crate::error::{EngineError, Result};
use crate::tree::Value;

use super::{EvalContext, Operator, OperatorRegistry, Response};

pub fn register_all(registry: &mut OperatorRegistry) -> Result<()> {
    registry.register("awsparam", std::sync::Arc::new(AwsParam))?;
    registry.register("awssecret", std::sync::Arc::new(AwsSecret))?;
    Ok(())
}

const SKIPPED: &str = "<skipped for op[key]>";

struct ParsedArg {
    path: String,
    stage: Option<String>,
    version: Option<String>,
    key: Option<String>,
}

fn parse_arg(ev: &mut dyn EvalContext, args: &[Expr], op_name: &str) -> Result<ParsedArg> {
    let arg = args
        .first()
        .ok_or_else(|| EngineError::ParseError(format!("{} requires one argument", op_name)))?;
    let raw = ev.eval_expr(arg)?;
    let raw = raw.stringify_scalar().ok_or_else(|| {
        EngineError::TypeMismatch(format!("{} argument must stringify", op_name))
    })?;

    let (path, query) = raw.split_once('?').unwrap_or((raw.as_str(), ""));
    let mut stage = None;
    let mut version = None;
    let mut key = None;
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (k, v) = pair
            .split_once('=')
            .ok_or_else(|| EngineError::ConfigMalformed(format!("malformed query parameter `{}`", pair)))?;
        match k {
            "stage" => stage = Some(v.to_string()),
            "version" => version = Some(v.to_string()),
            "key" => key = Some(v.to_string()),
            other => {
                return Err(EngineError::ConfigMalformed(format!(
                    "unknown query parameter `{}`",
                    other
                )))
            }
        }
    }
    Ok(ParsedArg {
        path: path.to_string(),
        stage,
        version,
        key,
    })
}

struct AwsParam;

impl Operator for AwsParam {
    fn run(&self, ev: &mut dyn EvalContext, args: &[Expr]) -> Result<Response> {
        if ev.skip_aws() {
            return Ok(Response::Replace(Value::Str(SKIPPED.to_string())));
        }
        let parsed = parse_arg(ev, args, "awsparam")?;
        let target = ev.target().unwrap_or("").to_string();
        let cache_key = format!("{}@param:{}", target, parsed.path);
        let path = parsed.path.clone();
        let mut fetch = move |ev: &mut dyn EvalContext| -> Result<Value> {
            let client = ev.aws_param()?;
            let value = client.get_parameter(&path)?;
            Ok(Value::Str(value))
        };
        let value = ev.cache_or_fetch(&cache_key, &mut fetch)?;
        Ok(Response::Replace(value))
    }
}

struct AwsSecret;

impl Operator for AwsSecret {
    fn run(&self, ev: &mut dyn EvalContext, args: &[Expr]) -> Result<Response> {
        if ev.skip_aws() {
            return Ok(Response::Replace(Value::Str(SKIPPED.to_string())));
        }
        let parsed = parse_arg(ev, args, "awssecret")?;
        let target = ev.target().unwrap_or("").to_string();
        let cache_key = format!(
            "{}@secret:{}?{}:{}",
            target,
            parsed.path,
            parsed.stage.as_deref().unwrap_or(""),
            parsed.version.as_deref().unwrap_or("")
        );
        let path = parsed.path.clone();
        let stage = parsed.stage.clone();
        let version = parsed.version.clone();
        let mut fetch = move |ev: &mut dyn EvalContext| -> Result<Value> {
            let client = ev.aws_secret()?;
            let raw = client.get_secret(&path, stage.as_deref(), version.as_deref())?;
            Ok(Value::Str(raw))
        };
        let raw = ev.cache_or_fetch(&cache_key, &mut fetch)?;
        let raw = raw
            .as_str()
            .ok_or_else(|| EngineError::TypeMismatch("cached aws secret is not a string".to_string()))?
            .to_string();

        match parsed.key {
            None => Ok(Response::Replace(Value::Str(raw))),
            Some(key) => {
                let parsed_yaml: Value = serde_yaml::from_str(&raw).map_err(|e| {
                    EngineError::ConfigMalformed(format!("secret value is not valid YAML: {}", e))
                })?;
                let map = parsed_yaml
                    .as_map()
                    .ok_or_else(|| EngineError::TypeMismatch("secret value is not a map".to_string()))?;
                let value = map
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| EngineError::NotFound(crate::tree::Cursor::parse(&key)))?;
                Ok(Response::Replace(value))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clients::fake::{FakeAwsParam, FakeAwsSecret, FakeNats, FakeVault};
    use crate::token::Lit;
    use crate::tree::Cursor;
    use std::sync::Arc;

    struct Ctx {
        param: Arc<FakeAwsParam>,
        secret: Arc<FakeAwsSecret>,
        skip: bool,
        cache: std::collections::HashMap<String, Value>,
    }

    impl EvalContext for Ctx {
        fn resolve(&self, cursor: &Cursor) -> Result<Value> {
            Err(EngineError::NotFound(cursor.clone()))
        }

        fn eval_expr(&mut self, expr: &Expr) -> Result<Value> {
            match expr {
                Expr::Literal(lit) => Ok(lit.clone().into_value()),
                other => panic!("unsupported in test: {:?}", other),
            }
        }

        fn current_cursor(&self) -> &Cursor {
            unimplemented!()
        }

        fn target(&self) -> Option<&str> {
            None
        }

        fn vault(&mut self) -> Result<Arc<dyn crate::clients::VaultClient>> {
            Ok(Arc::new(FakeVault::new()))
        }

        fn aws_param(&mut self) -> Result<Arc<dyn crate::clients::AwsParamClient>> {
            Ok(self.param.clone())
        }

        fn aws_secret(&mut self) -> Result<Arc<dyn crate::clients::AwsSecretClient>> {
            Ok(self.secret.clone())
        }

        fn nats(&mut self) -> Result<Arc<dyn crate::clients::NatsClient>> {
            Ok(Arc::new(FakeNats::new()))
        }

        fn skip_vault(&self) -> bool {
            false
        }

        fn skip_aws(&self) -> bool {
            self.skip
        }

        fn skip_nats(&self) -> bool {
            false
        }

        fn cache_or_fetch(
            &mut self,
            key: &str,
            fetch: &mut dyn FnMut(&mut dyn EvalContext) -> Result<Value>,
        ) -> Result<Value> {
            if let Some(v) = self.cache.get(key) {
                return Ok(v.clone());
            }
            let value = fetch(self)?;
            self.cache.insert(key.to_string(), value.clone());
            Ok(value)
        }
    }

    fn ctx() -> Ctx {
        Ctx {
            param: Arc::new(FakeAwsParam::new().with_param("/app/db/host", "db.internal")),
            secret: Arc::new(FakeAwsSecret::new().with_secret("app/db", "user: admin\npassword: hunter2\n")),
            skip: false,
            cache: std::collections::HashMap::new(),
        }
    }

    #[test]
    fn awsparam_fetches_plain_value() {
        let mut c = ctx();
        let args = vec![Expr::Literal(Lit::String("/app/db/host".to_string()))];
        match AwsParam.run(&mut c, &args).unwrap() {
            Response::Replace(Value::Str(s)) => assert_eq!(s, "db.internal"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn awssecret_extracts_yaml_key() {
        let mut c = ctx();
        let args = vec![Expr::Literal(Lit::String("app/db?key=password".to_string()))];
        match AwsSecret.run(&mut c, &args).unwrap() {
            Response::Replace(Value::Str(s)) => assert_eq!(s, "hunter2"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn skip_aws_short_circuits() {
        let mut c = ctx();
        c.skip = true;
        let args = vec![Expr::Literal(Lit::String("/app/db/host".to_string()))];
        match AwsParam.run(&mut c, &args).unwrap() {
            Response::Replace(Value::Str(s)) => assert_eq!(s, SKIPPED.to_string()),
            other => panic!("unexpected {:?}", other),
        }
    }
}
