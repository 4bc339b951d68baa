//! The `Engine`: the process-wide object that owns the operator registry,
//! the external-store pools/cache/metrics, and target configuration, and
//! drives one document's evaluation at a time through [`evaluator::run`].
//!
//! Production client wiring (the concrete Vault/AWS/NATS SDKs) is
//! deliberately not this crate's concern — callers hand the builder a
//! factory closure per store; an `Engine` built with no factories at all
//! still evaluates documents that never touch an external store, and
//! fails every external call with `ExternalFetchFailed` otherwise.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::ast::Expr;
use crate::cache::TtlCache;
use crate::clients::{AwsParamClient, AwsSecretClient, NatsClient, NatsObject, VaultClient};
use crate::config::{self, AwsConfig, EnvReader, NatsConfig, ProcessEnv, VaultConfig};
use crate::error::{EngineError, Result};
use crate::metrics::{OperatorMetrics, Recorder};
use crate::operators::{EvalContext, OperatorRegistry, Response};
use crate::pool::Pool;
use crate::retry::{self, Clock, Policy, RealClock};
use crate::tree::{Cursor, Map, Value};

type VaultFactory = dyn Fn(&VaultConfig) -> Arc<dyn VaultClient> + Send + Sync;
type AwsParamFactory = dyn Fn(&AwsConfig) -> Arc<dyn AwsParamClient> + Send + Sync;
type AwsSecretFactory = dyn Fn(&AwsConfig) -> Arc<dyn AwsSecretClient> + Send + Sync;
type NatsFactory = dyn Fn(&NatsConfig) -> Arc<dyn NatsClient> + Send + Sync;

/// A client that never has anything configured, used when the host hasn't
/// supplied a factory for a store no document ends up needing.
struct UnconfiguredVault;
impl VaultClient for UnconfiguredVault {
    fn read_secret(&self, _path: &str) -> Result<Map> {
        Err(EngineError::external_fetch_failed(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "no vault client factory configured on this engine",
        )))
    }
}

struct UnconfiguredAwsParam;
impl AwsParamClient for UnconfiguredAwsParam {
    fn get_parameter(&self, _path: &str) -> Result<String> {
        Err(EngineError::external_fetch_failed(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "no aws parameter-store client factory configured on this engine",
        )))
    }
}

struct UnconfiguredAwsSecret;
impl AwsSecretClient for UnconfiguredAwsSecret {
    fn get_secret(&self, _name: &str, _stage: Option<&str>, _version: Option<&str>) -> Result<String> {
        Err(EngineError::external_fetch_failed(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "no aws secrets-manager client factory configured on this engine",
        )))
    }
}

struct UnconfiguredNats;
impl NatsClient for UnconfiguredNats {
    fn kv_get(&self, _store: &str, _key: &str) -> Result<Vec<u8>> {
        Err(EngineError::external_fetch_failed(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "no nats client factory configured on this engine",
        )))
    }

    fn object_get(&self, _bucket: &str, _object: &str) -> Result<NatsObject> {
        Err(EngineError::external_fetch_failed(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "no nats client factory configured on this engine",
        )))
    }
}

/// Builds an [`Engine`]. Every setting has a production-sane default;
/// callers only override what they need.
pub struct EngineBuilder {
    env: Box<dyn EnvReader>,
    retry_policy: Policy,
    clock: Box<dyn Clock>,
    cache_ttl: Duration,
    pool_max_idle: Duration,
    vault_factory: Box<VaultFactory>,
    aws_param_factory: Box<AwsParamFactory>,
    aws_secret_factory: Box<AwsSecretFactory>,
    nats_factory: Box<NatsFactory>,
    skip_vault: bool,
    skip_aws: bool,
    skip_nats: bool,
}

impl EngineBuilder {
    pub fn new() -> Self {
        EngineBuilder {
            env: Box::new(ProcessEnv),
            retry_policy: Policy::default(),
            clock: Box::new(RealClock),
            cache_ttl: Duration::from_secs(60),
            pool_max_idle: crate::pool::DEFAULT_MAX_IDLE_TIME,
            vault_factory: Box::new(|_| Arc::new(UnconfiguredVault)),
            aws_param_factory: Box::new(|_| Arc::new(UnconfiguredAwsParam)),
            aws_secret_factory: Box::new(|_| Arc::new(UnconfiguredAwsSecret)),
            nats_factory: Box::new(|_| Arc::new(UnconfiguredNats)),
            skip_vault: false,
            skip_aws: false,
            skip_nats: false,
        }
    }

    pub fn with_env(mut self, env: impl EnvReader + 'static) -> Self {
        self.env = Box::new(env);
        self
    }

    pub fn with_retry_policy(mut self, policy: Policy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_pool_max_idle(mut self, max_idle: Duration) -> Self {
        self.pool_max_idle = max_idle;
        self
    }

    pub fn with_vault_client_factory(
        mut self,
        factory: impl Fn(&VaultConfig) -> Arc<dyn VaultClient> + Send + Sync + 'static,
    ) -> Self {
        self.vault_factory = Box::new(factory);
        self
    }

    pub fn with_aws_param_client_factory(
        mut self,
        factory: impl Fn(&AwsConfig) -> Arc<dyn AwsParamClient> + Send + Sync + 'static,
    ) -> Self {
        self.aws_param_factory = Box::new(factory);
        self
    }

    pub fn with_aws_secret_client_factory(
        mut self,
        factory: impl Fn(&AwsConfig) -> Arc<dyn AwsSecretClient> + Send + Sync + 'static,
    ) -> Self {
        self.aws_secret_factory = Box::new(factory);
        self
    }

    pub fn with_nats_client_factory(
        mut self,
        factory: impl Fn(&NatsConfig) -> Arc<dyn NatsClient> + Send + Sync + 'static,
    ) -> Self {
        self.nats_factory = Box::new(factory);
        self
    }

    pub fn skip_vault(mut self, skip: bool) -> Self {
        self.skip_vault = skip;
        self
    }

    pub fn skip_aws(mut self, skip: bool) -> Self {
        self.skip_aws = skip;
        self
    }

    pub fn skip_nats(mut self, skip: bool) -> Self {
        self.skip_nats = skip;
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            registry: OperatorRegistry::with_builtins(),
            cache: TtlCache::new(self.cache_ttl),
            metrics: Recorder::new(),
            env: self.env,
            retry_policy: self.retry_policy,
            clock: self.clock,
            vault_pool: Pool::new(self.pool_max_idle),
            aws_param_pool: Pool::new(self.pool_max_idle),
            aws_secret_pool: Pool::new(self.pool_max_idle),
            nats_pool: Pool::new(self.pool_max_idle),
            vault_factory: self.vault_factory,
            aws_param_factory: self.aws_param_factory,
            aws_secret_factory: self.aws_secret_factory,
            nats_factory: self.nats_factory,
            skip_vault: AtomicBool::new(self.skip_vault),
            skip_aws: AtomicBool::new(self.skip_aws),
            skip_nats: AtomicBool::new(self.skip_nats),
            shut_down: AtomicBool::new(false),
        }
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide engine: one operator registry, one set of pools and
/// caches, shared by every document evaluated through it.
pub struct Engine {
    registry: OperatorRegistry,
    cache: TtlCache,
    metrics: Recorder,
    env: Box<dyn EnvReader>,
    retry_policy: Policy,
    clock: Box<dyn Clock>,
    vault_pool: Pool<Arc<dyn VaultClient>>,
    aws_param_pool: Pool<Arc<dyn AwsParamClient>>,
    aws_secret_pool: Pool<Arc<dyn AwsSecretClient>>,
    nats_pool: Pool<Arc<dyn NatsClient>>,
    vault_factory: Box<VaultFactory>,
    aws_param_factory: Box<AwsParamFactory>,
    aws_secret_factory: Box<AwsSecretFactory>,
    nats_factory: Box<NatsFactory>,
    skip_vault: AtomicBool,
    skip_aws: AtomicBool,
    skip_nats: AtomicBool,
    shut_down: AtomicBool,
}

impl Engine {
    pub fn new() -> Self {
        EngineBuilder::new().build()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn registry(&self) -> &OperatorRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> std::collections::HashMap<String, OperatorMetrics> {
        self.metrics.snapshot()
    }

    pub fn set_skip_vault(&self, skip: bool) {
        self.skip_vault.store(skip, Ordering::SeqCst);
    }

    pub fn set_skip_aws(&self, skip: bool) {
        self.skip_aws.store(skip, Ordering::SeqCst);
    }

    pub fn set_skip_nats(&self, skip: bool) {
        self.skip_nats.store(skip, Ordering::SeqCst);
    }

    /// Drops expired cache entries and idle pooled connections. Intended
    /// to be driven by a periodic background task at the default one
    /// minute interval shared by the cache and the pools.
    pub fn sweep(&self) {
        self.cache.sweep();
        self.vault_pool.sweep();
        self.aws_param_pool.sweep();
        self.aws_secret_pool.sweep();
        self.nats_pool.sweep();
    }

    /// Stops accepting new external calls, closes every pooled connection,
    /// and clears all caches. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("engine shutting down: closing pools and clearing caches");
        self.vault_pool.clear();
        self.aws_param_pool.clear();
        self.aws_secret_pool.clear();
        self.nats_pool.clear();
        self.cache.clear();
    }

    /// Evaluates `tree` to completion (all three phases) and returns the
    /// fully-resolved document.
    pub fn evaluate(&self, tree: Value) -> Result<Value> {
        let mut session = Session {
            engine: self,
            tree,
            current: Cursor::root(),
            target: None,
        };
        crate::evaluator::run(&mut session, &self.registry)?;
        Ok(session.tree)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// One in-progress evaluation: the engine's shared, concurrent-safe
/// plumbing plus the per-evaluation mutable tree and current-opcall
/// bookkeeping the evaluator needs.
struct Session<'e> {
    engine: &'e Engine,
    tree: Value,
    current: Cursor,
    target: Option<String>,
}

impl Session<'_> {
    fn checked(&self) -> Result<()> {
        if self.engine.shut_down.load(Ordering::SeqCst) {
            return Err(EngineError::ShutDown);
        }
        Ok(())
    }
}

impl EvalContext for Session<'_> {
    fn resolve(&self, cursor: &Cursor) -> Result<Value> {
        match cursor.resolve(&self.tree) {
            Some(Value::Str(s)) if crate::evaluator::is_opcall_marker(s) => Err(EngineError::NotReady),
            Some(value) => Ok(value.clone()),
            None => Err(EngineError::NotFound(cursor.clone())),
        }
    }

    fn eval_expr(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(lit) => Ok(lit.clone().into_value()),
            Expr::Reference(cursor) => self.resolve(cursor),
            Expr::EnvVar(name) => Ok(Value::Str(self.engine.env.get(name).unwrap_or_default())),
            Expr::OperatorCall { op, args, .. } if op == "!" => {
                let arg = args
                    .first()
                    .ok_or_else(|| EngineError::ParseError("`!` requires one operand".to_string()))?;
                let value = self.eval_expr(arg)?;
                Ok(crate::types::apply_unary("!", &value))
            }
            Expr::OperatorCall { op, args, .. } if op == "&&" || op == "||" => {
                if args.len() != 2 {
                    return Err(EngineError::ParseError(format!(
                        "`{}` requires two operands",
                        op
                    )));
                }
                let left = self.eval_expr(&args[0])?;
                // Short-circuit: the second operand is only evaluated when its
                // value could actually change the result, so e.g. a vault
                // lookup behind `false && ...` never runs.
                if op == "&&" && !left.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                if op == "||" && left.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                let right = self.eval_expr(&args[1])?;
                crate::types::apply_binary(op, &left, &right)
            }
            Expr::OperatorCall { op, args, .. } if crate::types::is_symbolic_operator(op) => {
                if args.len() != 2 {
                    return Err(EngineError::ParseError(format!(
                        "`{}` requires two operands",
                        op
                    )));
                }
                let left = self.eval_expr(&args[0])?;
                let right = self.eval_expr(&args[1])?;
                crate::types::apply_binary(op, &left, &right)
            }
            Expr::OperatorCall { op, target, args } => {
                let operator = self
                    .engine
                    .registry
                    .get(op)
                    .ok_or_else(|| EngineError::UnknownOperator(op.clone()))?
                    .clone();
                let saved_target = self.target.clone();
                self.target = target.clone().or(saved_target.clone());
                let response = operator.run(self, args);
                self.target = saved_target;
                match response? {
                    Response::Replace(value) => Ok(value),
                    Response::Inject(_) | Response::Keep => Err(EngineError::TypeMismatch(format!(
                        "`{}` cannot be used in argument position (it splices or defers rather than producing a value)",
                        op
                    ))),
                }
            }
            Expr::LogicalOr { left, right } => match self.eval_expr(left) {
                Ok(Value::Null) => self.eval_expr(right),
                Ok(value) => Ok(value),
                Err(EngineError::NotReady) => Err(EngineError::NotReady),
                Err(_) => self.eval_expr(right),
            },
            Expr::List { left, right } => {
                let l = self.eval_expr(left)?.stringify_scalar().unwrap_or_default();
                let r = self.eval_expr(right)?.stringify_scalar().unwrap_or_default();
                Ok(Value::Str(format!("{}{}", l, r)))
            }
            Expr::VaultChoice { .. } | Expr::VaultGroup(_) => Err(EngineError::TypeMismatch(
                "vault sub-operator syntax used outside a vault argument".to_string(),
            )),
        }
    }

    fn current_cursor(&self) -> &Cursor {
        &self.current
    }

    fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    fn vault(&mut self) -> Result<Arc<dyn VaultClient>> {
        self.checked()?;
        let target = self.target.clone();
        let cfg = config::resolve_vault(target.as_deref(), None, self.engine.env.as_ref())?;
        let key = format!("vault@{}", target.as_deref().unwrap_or(""));
        Ok(self.engine.vault_pool.checkout(&key, || (self.engine.vault_factory)(&cfg)))
    }

    fn aws_param(&mut self) -> Result<Arc<dyn AwsParamClient>> {
        self.checked()?;
        let target = self.target.clone();
        let cfg = config::resolve_aws(target.as_deref(), None, self.engine.env.as_ref());
        let key = format!("awsparam@{}", target.as_deref().unwrap_or(""));
        Ok(self
            .engine
            .aws_param_pool
            .checkout(&key, || (self.engine.aws_param_factory)(&cfg)))
    }

    fn aws_secret(&mut self) -> Result<Arc<dyn AwsSecretClient>> {
        self.checked()?;
        let target = self.target.clone();
        let cfg = config::resolve_aws(target.as_deref(), None, self.engine.env.as_ref());
        let key = format!("awssecret@{}", target.as_deref().unwrap_or(""));
        Ok(self
            .engine
            .aws_secret_pool
            .checkout(&key, || (self.engine.aws_secret_factory)(&cfg)))
    }

    fn nats(&mut self) -> Result<Arc<dyn NatsClient>> {
        self.checked()?;
        let target = self.target.clone();
        let cfg = config::resolve_nats(target.as_deref(), None, self.engine.env.as_ref());
        let key = format!("nats@{}", target.as_deref().unwrap_or(""));
        Ok(self.engine.nats_pool.checkout(&key, || (self.engine.nats_factory)(&cfg)))
    }

    fn skip_vault(&self) -> bool {
        self.engine.skip_vault.load(Ordering::SeqCst)
    }

    fn skip_aws(&self) -> bool {
        self.engine.skip_aws.load(Ordering::SeqCst)
    }

    fn skip_nats(&self) -> bool {
        self.engine.skip_nats.load(Ordering::SeqCst)
    }

    fn cache_or_fetch(
        &mut self,
        key: &str,
        fetch: &mut dyn FnMut(&mut dyn EvalContext) -> Result<Value>,
    ) -> Result<Value> {
        self.checked()?;
        if let Some(value) = self.engine.cache.get(key) {
            return Ok(value);
        }
        let value = retry::retry(&self.engine.retry_policy, self.engine.clock.as_ref(), || fetch(self))?;
        self.engine.cache.insert(key.to_string(), value.clone());
        Ok(value)
    }
}

impl crate::evaluator::EvaluatorContext for Session<'_> {
    fn tree(&self) -> &Value {
        &self.tree
    }

    fn begin_opcall(&mut self, cursor: Cursor, _op: &str, target: Option<String>) {
        self.current = cursor;
        self.target = target;
    }

    fn apply_response(&mut self, cursor: &Cursor, response: Response) -> Result<()> {
        match response {
            Response::Replace(value) => {
                cursor.write(&mut self.tree, value);
                Ok(())
            }
            Response::Inject(value) => {
                let parent = cursor
                    .parent()
                    .ok_or_else(|| EngineError::TypeMismatch("inject at document root".to_string()))?;
                let map = value
                    .as_map()
                    .ok_or_else(|| EngineError::TypeMismatch("inject value is not a map".to_string()))?
                    .clone();
                let key = match cursor.last() {
                    Some(crate::tree::Segment::Key(k)) => k.clone(),
                    _ => {
                        return Err(EngineError::TypeMismatch(
                            "inject must be a map value".to_string(),
                        ))
                    }
                };
                if let Some(Value::Map(parent_map)) = parent.resolve_mut(&mut self.tree) {
                    parent_map.remove(&key);
                    parent_map.merge_from(&map);
                } else {
                    warn!(%cursor, "inject's parent is not a map, dropping splice");
                }
                Ok(())
            }
            Response::Keep => Ok(()),
        }
    }

    fn record_metrics(&self, op: &str, duration: Duration, failed: bool) {
        self.engine.metrics.record_run(op, duration, failed);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clients::fake::FakeVault;
    use crate::config::FakeEnv;

    fn map(pairs: Vec<(&str, Value)>) -> Value {
        let mut m = Map::new();
        for (k, v) in pairs {
            m.insert(k, v);
        }
        Value::Map(m)
    }

    #[test]
    fn evaluates_a_document_with_no_external_calls() {
        let engine = Engine::new();
        let tree = map(vec![
            ("a", Value::Int(1)),
            ("b", Value::Str("(( grab a ))".to_string())),
        ]);
        let result = engine.evaluate(tree).unwrap();
        assert_eq!(Cursor::parse("b").resolve(&result), Some(&Value::Int(1)));
    }

    #[test]
    fn arithmetic_precedence_matches_ordinary_math() {
        let engine = Engine::new();
        let tree = map(vec![
            ("base", Value::Int(10)),
            ("multiplier", Value::Int(5)),
            ("addend", Value::Int(7)),
            ("a", Value::Str("(( (base * multiplier) + addend ))".to_string())),
            ("b", Value::Str("(( base + (multiplier * 2) ))".to_string())),
            ("c", Value::Str("(( (base / 2) + (multiplier * 3) ))".to_string())),
        ]);
        let result = engine.evaluate(tree).unwrap();
        assert_eq!(Cursor::parse("a").resolve(&result), Some(&Value::Int(57)));
        assert_eq!(Cursor::parse("b").resolve(&result), Some(&Value::Int(20)));
        assert_eq!(Cursor::parse("c").resolve(&result), Some(&Value::Float(20.0)));
    }

    #[test]
    fn deeply_nested_arithmetic_evaluates_inside_out() {
        let engine = Engine::new();
        let tree = map(vec![
            ("a", Value::Str("(( ((((1 + 1) + 1) + 1) + 1) + 1 ))".to_string())),
            ("b", Value::Str("(( ((10 + 5) * 2) - ((20 / 4) % 3) ))".to_string())),
        ]);
        let result = engine.evaluate(tree).unwrap();
        assert_eq!(Cursor::parse("a").resolve(&result), Some(&Value::Int(6)));
        assert_eq!(Cursor::parse("b").resolve(&result), Some(&Value::Int(28)));
    }

    #[test]
    fn arithmetic_opcalls_resolve_in_dependency_order() {
        let engine = Engine::new();
        let meta = map(vec![("base", Value::Int(100)), ("factor", Value::Int(2)), ("offset", Value::Int(50))]);
        let tree = map(vec![
            ("meta", meta),
            ("scaled", Value::Str("(( meta.base * meta.factor ))".to_string())),
            ("adjusted", Value::Str("(( scaled + meta.offset ))".to_string())),
            ("final", Value::Str("(( adjusted / 10 ))".to_string())),
        ]);
        let result = engine.evaluate(tree).unwrap();
        assert_eq!(Cursor::parse("scaled").resolve(&result), Some(&Value::Int(200)));
        assert_eq!(Cursor::parse("adjusted").resolve(&result), Some(&Value::Int(250)));
        assert_eq!(Cursor::parse("final").resolve(&result), Some(&Value::Float(25.0)));
    }

    #[test]
    fn skip_vault_short_circuits_without_a_configured_client() {
        let engine = Engine::builder().with_env(FakeEnv::new()).build();
        engine.set_skip_vault(true);
        let tree = map(vec![("secret", Value::Str("(( vault \"secret/db:pw\" ))".to_string()))]);
        let result = engine.evaluate(tree).unwrap();
        assert_eq!(
            Cursor::parse("secret").resolve(&result),
            Some(&Value::Str("REDACTED".to_string()))
        );
    }

    #[test]
    fn unconfigured_vault_fails_not_configured() {
        let engine = Engine::builder().with_env(FakeEnv::new()).build();
        let tree = map(vec![("secret", Value::Str("(( vault \"secret/db:pw\" ))".to_string()))]);
        let err = engine.evaluate(tree).unwrap_err();
        assert!(matches!(err, EngineError::VaultNotConfigured(_)));
    }

    #[test]
    fn and_short_circuits_without_evaluating_the_right_operand() {
        let engine = Engine::builder().with_env(FakeEnv::new()).build();
        let tree = map(vec![(
            "a",
            Value::Str("(( false && vault \"secret/db:pw\" ))".to_string()),
        )]);
        let result = engine.evaluate(tree).unwrap();
        assert_eq!(Cursor::parse("a").resolve(&result), Some(&Value::Bool(false)));
    }

    #[test]
    fn or_short_circuits_without_evaluating_the_right_operand() {
        let engine = Engine::builder().with_env(FakeEnv::new()).build();
        let tree = map(vec![(
            "a",
            Value::Str("(( true || vault \"secret/db:pw\" ))".to_string()),
        )]);
        let result = engine.evaluate(tree).unwrap();
        assert_eq!(Cursor::parse("a").resolve(&result), Some(&Value::Bool(true)));
    }

    #[test]
    fn and_still_evaluates_the_right_operand_when_needed() {
        let engine = Engine::builder().with_env(FakeEnv::new()).build();
        let tree = map(vec![("a", Value::Str("(( true && vault \"secret/db:pw\" ))".to_string()))]);
        let err = engine.evaluate(tree).unwrap_err();
        assert!(matches!(err, EngineError::VaultNotConfigured(_)));
    }

    #[test]
    fn a_wired_vault_factory_resolves_through_the_pool_and_cache() {
        let mut secret = Map::new();
        secret.insert("pw", Value::Str("hunter2".to_string()));
        let env = FakeEnv::new()
            .with_var("VAULT_ADDR", "https://vault.example.com")
            .with_var("VAULT_TOKEN", "s.abc123");
        let secret_for_factory = secret.clone();
        let engine = Engine::builder()
            .with_env(env)
            .with_vault_client_factory(move |_cfg| {
                Arc::new(FakeVault::new().with_secret("secret/db", secret_for_factory.clone()))
            })
            .build();
        let tree = map(vec![("pw", Value::Str("(( vault \"secret/db:pw\" ))".to_string()))]);
        let result = engine.evaluate(tree).unwrap();
        assert_eq!(
            Cursor::parse("pw").resolve(&result),
            Some(&Value::Str("hunter2".to_string()))
        );
        assert_eq!(engine.metrics().get("vault").unwrap().count, 1);
    }

    #[test]
    fn logical_or_falls_back_on_missing_reference() {
        let engine = Engine::new();
        let tree = map(vec![(
            "name",
            Value::Str("(( grab missing || \"fallback\" ))".to_string()),
        )]);
        let result = engine.evaluate(tree).unwrap();
        assert_eq!(
            Cursor::parse("name").resolve(&result),
            Some(&Value::Str("fallback".to_string()))
        );
    }

    #[test]
    fn shutdown_fails_subsequent_external_calls() {
        let engine = Engine::new();
        engine.shutdown();
        let tree = map(vec![("secret", Value::Str("(( vault \"secret/db:pw\" ))".to_string()))]);
        let err = engine.evaluate(tree).unwrap_err();
        assert!(matches!(err, EngineError::ShutDown));
    }
}
