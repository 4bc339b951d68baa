//! In-memory client fakes for tests: each wraps a `parking_lot::Mutex`-free
//! plain map since tests construct and drop them within a single thread.

use std::collections::HashMap;

use crate::error::{EngineError, Result};
use crate::tree::Map;

use super::{AwsParamClient, AwsSecretClient, NatsClient, NatsObject, VaultClient};

#[derive(Default)]
pub struct FakeVault {
    secrets: HashMap<String, Map>,
}

impl FakeVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, path: &str, fields: Map) -> Self {
        self.secrets.insert(path.to_string(), fields);
        self
    }
}

impl VaultClient for FakeVault {
    fn read_secret(&self, path: &str) -> Result<Map> {
        self.secrets
            .get(path)
            .cloned()
            .ok_or_else(|| EngineError::VaultSecretNotFound(path.to_string()))
    }
}

#[derive(Default)]
pub struct FakeAwsParam {
    params: HashMap<String, String>,
}

impl FakeAwsParam {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_param(mut self, path: &str, value: &str) -> Self {
        self.params.insert(path.to_string(), value.to_string());
        self
    }
}

impl AwsParamClient for FakeAwsParam {
    fn get_parameter(&self, path: &str) -> Result<String> {
        self.params
            .get(path)
            .cloned()
            .ok_or_else(|| EngineError::ExternalFetchFailed(Box::new(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such parameter `{}`", path),
            ))))
    }
}

#[derive(Default)]
pub struct FakeAwsSecret {
    secrets: HashMap<String, String>,
}

impl FakeAwsSecret {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, name: &str, value: &str) -> Self {
        self.secrets.insert(name.to_string(), value.to_string());
        self
    }
}

impl AwsSecretClient for FakeAwsSecret {
    fn get_secret(&self, name: &str, _stage: Option<&str>, _version: Option<&str>) -> Result<String> {
        self.secrets
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::ExternalFetchFailed(Box::new(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such secret `{}`", name),
            ))))
    }
}

#[derive(Default)]
pub struct FakeNats {
    kv: HashMap<(String, String), Vec<u8>>,
    objects: HashMap<(String, String), NatsObject>,
}

impl FakeNats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kv(mut self, store: &str, key: &str, value: &[u8]) -> Self {
        self.kv.insert((store.to_string(), key.to_string()), value.to_vec());
        self
    }

    pub fn with_object(mut self, bucket: &str, object: &str, bytes: &[u8], content_type: Option<&str>) -> Self {
        self.objects.insert(
            (bucket.to_string(), object.to_string()),
            NatsObject {
                bytes: bytes.to_vec(),
                content_type: content_type.map(str::to_string),
            },
        );
        self
    }
}

impl NatsClient for FakeNats {
    fn kv_get(&self, store: &str, key: &str) -> Result<Vec<u8>> {
        self.kv
            .get(&(store.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| EngineError::ExternalFetchFailed(Box::new(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such kv entry `{}/{}`", store, key),
            ))))
    }

    fn object_get(&self, bucket: &str, object: &str) -> Result<NatsObject> {
        self.objects
            .get(&(bucket.to_string(), object.to_string()))
            .map(|o| NatsObject {
                bytes: o.bytes.clone(),
                content_type: o.content_type.clone(),
            })
            .ok_or_else(|| EngineError::ExternalFetchFailed(Box::new(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such object `{}/{}`", bucket, object),
            ))))
    }
}
