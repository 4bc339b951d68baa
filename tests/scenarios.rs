//! End-to-end coverage of the evaluator through the public `Engine` API:
//! vault fallback and sub-operator selection, and NATS KV decoding.

use merge_engine::tree::{Map, Value};
use merge_engine::Engine;

use merge_engine::clients::fake::{FakeNats, FakeVault};

fn map(pairs: Vec<(&str, Value)>) -> Value {
    let mut m = Map::new();
    for (k, v) in pairs {
        m.insert(k, v);
    }
    Value::Map(m)
}

#[test]
fn vault_falls_back_to_default_when_the_secret_is_missing() {
    let engine = Engine::builder()
        .with_env(
            merge_engine::config::FakeEnv::new()
                .with_var("VAULT_ADDR", "https://vault.example.com")
                .with_var("VAULT_TOKEN", "s.abc123"),
        )
        .with_vault_client_factory(|_| std::sync::Arc::new(FakeVault::new()))
        .build();
    let tree = map(vec![(
        "key",
        Value::Str("(( vault \"secret/missing:x\" || \"fallback\" ))".to_string()),
    )]);
    let result = engine.evaluate(tree).unwrap();
    assert_eq!(
        merge_engine::Cursor::parse("key").resolve(&result),
        Some(&Value::Str("fallback".to_string()))
    );
}

#[test]
fn skip_vault_redacts_instead_of_falling_back() {
    let engine = Engine::builder()
        .with_env(
            merge_engine::config::FakeEnv::new()
                .with_var("VAULT_ADDR", "https://vault.example.com")
                .with_var("VAULT_TOKEN", "s.abc123"),
        )
        .with_vault_client_factory(|_| std::sync::Arc::new(FakeVault::new()))
        .build();
    engine.set_skip_vault(true);
    let tree = map(vec![(
        "key",
        Value::Str("(( vault \"secret/missing:x\" || \"fallback\" ))".to_string()),
    )]);
    let result = engine.evaluate(tree).unwrap();
    assert_eq!(
        merge_engine::Cursor::parse("key").resolve(&result),
        Some(&Value::Str("REDACTED".to_string()))
    );
}

#[test]
fn vault_sub_operator_choice_tries_candidates_in_order() {
    let mut fields = Map::new();
    fields.insert("password", Value::Str("s3cr3t".to_string()));
    let engine = Engine::builder()
        .with_env(
            merge_engine::config::FakeEnv::new()
                .with_var("VAULT_ADDR", "https://vault.example.com")
                .with_var("VAULT_TOKEN", "s.abc123"),
        )
        .with_vault_client_factory(move |_| {
            std::sync::Arc::new(FakeVault::new().with_secret("secret/db", fields.clone()))
        })
        .build();
    let tree = map(vec![(
        "key",
        Value::Str("(( vault \"secret/db:\" (\"password\" | \"pass\") ))".to_string()),
    )]);
    let result = engine.evaluate(tree).unwrap();
    assert_eq!(
        merge_engine::Cursor::parse("key").resolve(&result),
        Some(&Value::Str("s3cr3t".to_string()))
    );
}

#[test]
fn vault_sub_operator_choice_falls_through_to_the_second_candidate() {
    let mut fields = Map::new();
    fields.insert("pass", Value::Str("s3cr3t".to_string()));
    let engine = Engine::builder()
        .with_env(
            merge_engine::config::FakeEnv::new()
                .with_var("VAULT_ADDR", "https://vault.example.com")
                .with_var("VAULT_TOKEN", "s.abc123"),
        )
        .with_vault_client_factory(move |_| {
            std::sync::Arc::new(FakeVault::new().with_secret("secret/db", fields.clone()))
        })
        .build();
    let tree = map(vec![(
        "key",
        Value::Str("(( vault \"secret/db:\" (\"password\" | \"pass\") ))".to_string()),
    )]);
    let result = engine.evaluate(tree).unwrap();
    assert_eq!(
        merge_engine::Cursor::parse("key").resolve(&result),
        Some(&Value::Str("s3cr3t".to_string()))
    );
}

#[test]
fn vault_try_treats_multiple_colon_bearing_args_as_independent_candidates() {
    let mut fields = Map::new();
    fields.insert("y", Value::Str("s3cr3t".to_string()));
    let engine = Engine::builder()
        .with_env(
            merge_engine::config::FakeEnv::new()
                .with_var("VAULT_ADDR", "https://vault.example.com")
                .with_var("VAULT_TOKEN", "s.abc123"),
        )
        .with_vault_client_factory(move |_| {
            std::sync::Arc::new(FakeVault::new().with_secret("secret/b", fields.clone()))
        })
        .build();
    let tree = map(vec![(
        "key",
        Value::Str("(( vault-try \"secret/a:x\" \"secret/b:y\" ))".to_string()),
    )]);
    let result = engine.evaluate(tree).unwrap();
    assert_eq!(
        merge_engine::Cursor::parse("key").resolve(&result),
        Some(&Value::Str("s3cr3t".to_string()))
    );
}

#[test]
fn nats_kv_decodes_single_line_as_string_and_multi_line_as_yaml() {
    let engine = Engine::builder()
        .with_env(merge_engine::config::FakeEnv::new())
        .with_nats_client_factory(|_| {
            std::sync::Arc::new(
                FakeNats::new()
                    .with_kv("config", "host", b"redis.example.com")
                    .with_kv("config", "block", b"a: 1\nb: 2"),
            )
        })
        .build();
    let tree = map(vec![
        ("host", Value::Str("(( nats \"kv:config/host\" ))".to_string())),
        ("block", Value::Str("(( nats \"kv:config/block\" ))".to_string())),
    ]);
    let result = engine.evaluate(tree).unwrap();
    assert_eq!(
        merge_engine::Cursor::parse("host").resolve(&result),
        Some(&Value::Str("redis.example.com".to_string()))
    );
    let mut expected = Map::new();
    expected.insert("a", Value::Int(1));
    expected.insert("b", Value::Int(2));
    assert_eq!(
        merge_engine::Cursor::parse("block").resolve(&result),
        Some(&Value::Map(expected))
    );
}
