//! In-memory storage backend.

use apiary_core::error::{ApiaryError, Result};
use apiary_core::traits::Storage;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Scope → key → value map behind a mutex. The default backend.
#[derive(Default)]
pub struct MemoryStorage {
    scopes: Mutex<HashMap<String, Map<String, Value>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn create(&self, scope: &str, key: &str, value: Value) -> Result<Value> {
        let mut scopes = self.scopes.lock().await;
        scopes
            .entry(scope.to_string())
            .or_default()
            .insert(key.to_string(), value.clone());
        Ok(value)
    }

    async fn read(&self, scope: &str, key: Option<&str>) -> Result<Value> {
        let scopes = self.scopes.lock().await;
        let entries = scopes
            .get(scope)
            .ok_or_else(|| ApiaryError::Storage(format!("no data for scope {scope}")))?;

        match key {
            Some(k) => entries
                .get(k)
                .cloned()
                .ok_or_else(|| ApiaryError::Storage(format!("no value for {scope}/{k}"))),
            None => Ok(Value::Object(entries.clone())),
        }
    }

    async fn delete(&self, scope: &str, key: Option<&str>) -> Result<()> {
        let mut scopes = self.scopes.lock().await;
        match key {
            Some(k) => {
                if let Some(entries) = scopes.get_mut(scope) {
                    entries.remove(k);
                }
            }
            None => {
                scopes.remove(scope);
            }
        }
        Ok(())
    }
}
