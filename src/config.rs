//! Target-scoped configuration resolution for the external-store clients.
//!
//! A pure-reader `Env(name) -> string` model: real process
//! environment access is one trivial [`EnvReader`] implementation
//! ([`ProcessEnv`]), never threaded directly through the resolution
//! functions, so tests can substitute a [`FakeEnv`] without touching the
//! real environment.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{EngineError, Result};

/// A pure reader over named environment variables and a small set of
/// well-known dotfiles under `$HOME` (the vault token fallback files).
pub trait EnvReader: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn read_home_file(&self, filename: &str) -> Option<String>;
}

/// Reads the real process environment and `$HOME`.
pub struct ProcessEnv;

impl EnvReader for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn read_home_file(&self, filename: &str) -> Option<String> {
        let home = std::env::var_os("HOME")?;
        let contents = std::fs::read_to_string(Path::new(&home).join(filename)).ok()?;
        Some(contents.trim().to_string())
    }
}

/// An in-memory reader for tests.
#[derive(Default)]
pub struct FakeEnv {
    vars: HashMap<String, String>,
    files: HashMap<String, String>,
}

impl FakeEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_home_file(mut self, filename: &str, contents: &str) -> Self {
        self.files.insert(filename.to_string(), contents.to_string());
        self
    }
}

impl EnvReader for FakeEnv {
    fn get(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    fn read_home_file(&self, filename: &str) -> Option<String> {
        self.files.get(filename).cloned()
    }
}

fn scoped(prefix: &str, target: Option<&str>, suffix: &str) -> String {
    match target {
        Some(t) => format!("{}_{}_{}", prefix, t.to_uppercase(), suffix),
        None => format!("{}_{}", prefix, suffix),
    }
}

/// Vault client configuration for one target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VaultConfig {
    pub addr: String,
    pub token: String,
    pub namespace: Option<String>,
    pub skip_verify: bool,
}

/// Resolves vault configuration for `target`: explicit overrides win, then
/// `VAULT_<TARGET>_{ADDR,TOKEN,NAMESPACE,SKIP_VERIFY}`, then — for the
/// default target only — `VAULT_ADDR`/`VAULT_TOKEN`/`VAULT_NAMESPACE` or a
/// `$HOME/.svtoken`/`$HOME/.vault-token` token file. Fails
/// `VaultNotConfigured` if no source yields both an address and a token.
pub fn resolve_vault(
    target: Option<&str>,
    explicit: Option<&VaultConfig>,
    env: &dyn EnvReader,
) -> Result<VaultConfig> {
    if let Some(cfg) = explicit {
        return Ok(cfg.clone());
    }

    let addr = env.get(&scoped("VAULT", target, "ADDR"));
    let mut token = env.get(&scoped("VAULT", target, "TOKEN"));
    let namespace = env.get(&scoped("VAULT", target, "NAMESPACE"));
    let skip_verify = env
        .get(&scoped("VAULT", target, "SKIP_VERIFY"))
        .map(|v| is_truthy_flag(&v))
        .unwrap_or(false);

    if target.is_none() && token.is_none() {
        token = env
            .read_home_file(".svtoken")
            .or_else(|| env.read_home_file(".vault-token"));
    }

    match (addr, token) {
        (Some(addr), Some(token)) => Ok(VaultConfig {
            addr,
            token,
            namespace,
            skip_verify,
        }),
        _ => Err(EngineError::VaultNotConfigured(
            target.unwrap_or("default").to_string(),
        )),
    }
}

fn is_truthy_flag(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

/// AWS client configuration for one target. Every field is optional: a
/// missing value defers to whatever default credential/region chain the
/// concrete client (out of this crate's scope) supplies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AwsConfig {
    pub region: Option<String>,
    pub profile: Option<String>,
    pub role: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub endpoint: Option<String>,
    pub max_retries: Option<u32>,
    pub cache_ttl_seconds: Option<u64>,
    pub assume_role_duration_seconds: Option<u64>,
    pub external_id: Option<String>,
    pub session_name: Option<String>,
    pub mfa_serial: Option<String>,
    pub audit_logging: bool,
}

pub fn resolve_aws(target: Option<&str>, explicit: Option<&AwsConfig>, env: &dyn EnvReader) -> AwsConfig {
    if let Some(cfg) = explicit {
        return cfg.clone();
    }
    AwsConfig {
        region: env.get(&scoped("AWS", target, "REGION")),
        profile: env.get(&scoped("AWS", target, "PROFILE")),
        role: env.get(&scoped("AWS", target, "ROLE")),
        access_key_id: env.get(&scoped("AWS", target, "ACCESS_KEY_ID")),
        secret_access_key: env.get(&scoped("AWS", target, "SECRET_ACCESS_KEY")),
        session_token: env.get(&scoped("AWS", target, "SESSION_TOKEN")),
        endpoint: env.get(&scoped("AWS", target, "ENDPOINT")),
        max_retries: env
            .get(&scoped("AWS", target, "MAX_RETRIES"))
            .and_then(|v| v.parse().ok()),
        cache_ttl_seconds: env
            .get(&scoped("AWS", target, "CACHE_TTL"))
            .and_then(|v| v.parse().ok()),
        assume_role_duration_seconds: env
            .get(&scoped("AWS", target, "ASSUME_ROLE_DURATION"))
            .and_then(|v| v.parse().ok()),
        external_id: env.get(&scoped("AWS", target, "EXTERNAL_ID")),
        session_name: env.get(&scoped("AWS", target, "SESSION_NAME")),
        mfa_serial: env.get(&scoped("AWS", target, "MFA_SERIAL")),
        audit_logging: env
            .get(&scoped("AWS", target, "AUDIT_LOGGING"))
            .map(|v| is_truthy_flag(&v))
            .unwrap_or(false),
    }
}

/// NATS client configuration for one target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NatsConfig {
    pub url: Option<String>,
}

pub fn resolve_nats(target: Option<&str>, explicit: Option<&NatsConfig>, env: &dyn EnvReader) -> NatsConfig {
    if let Some(cfg) = explicit {
        return cfg.clone();
    }
    NatsConfig {
        url: env.get(&scoped("NATS", target, "URL")),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_target_uses_unsuffixed_names() {
        let env = FakeEnv::new()
            .with_var("VAULT_ADDR", "https://vault.example.com")
            .with_var("VAULT_TOKEN", "s.abc123");
        let cfg = resolve_vault(None, None, &env).unwrap();
        assert_eq!(cfg.addr, "https://vault.example.com");
        assert_eq!(cfg.token, "s.abc123");
    }

    #[test]
    fn named_target_uses_scoped_names() {
        let env = FakeEnv::new()
            .with_var("VAULT_STAGING_ADDR", "https://staging-vault.example.com")
            .with_var("VAULT_STAGING_TOKEN", "s.xyz");
        let cfg = resolve_vault(Some("staging"), None, &env).unwrap();
        assert_eq!(cfg.addr, "https://staging-vault.example.com");
    }

    #[test]
    fn default_target_falls_back_to_token_file() {
        let env = FakeEnv::new()
            .with_var("VAULT_ADDR", "https://vault.example.com")
            .with_home_file(".vault-token", "s.filetoken\n");
        let cfg = resolve_vault(None, None, &env).unwrap();
        assert_eq!(cfg.token, "s.filetoken");
    }

    #[test]
    fn missing_token_fails_not_configured() {
        let env = FakeEnv::new().with_var("VAULT_ADDR", "https://vault.example.com");
        let err = resolve_vault(None, None, &env).unwrap_err();
        assert!(matches!(err, EngineError::VaultNotConfigured(_)));
    }

    #[test]
    fn explicit_config_bypasses_environment() {
        let env = FakeEnv::new();
        let explicit = VaultConfig {
            addr: "https://explicit.example.com".to_string(),
            token: "explicit-token".to_string(),
            namespace: None,
            skip_verify: false,
        };
        let cfg = resolve_vault(None, Some(&explicit), &env).unwrap();
        assert_eq!(cfg.addr, "https://explicit.example.com");
    }

    #[test]
    fn aws_config_has_no_hard_requirement() {
        let env = FakeEnv::new().with_var("AWS_REGION", "us-east-1");
        let cfg = resolve_aws(None, None, &env);
        assert_eq!(cfg.region.as_deref(), Some("us-east-1"));
        assert_eq!(cfg.role, None);
    }

    #[test]
    fn nats_config_scoped_by_target() {
        let env = FakeEnv::new().with_var("NATS_PROD_URL", "nats://prod:4222");
        let cfg = resolve_nats(Some("prod"), None, &env);
        assert_eq!(cfg.url.as_deref(), Some("nats://prod:4222"));
    }
}
