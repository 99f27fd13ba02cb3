//! In-memory (single node) implementation of the durable store for local
//! development and tests.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use gantry_store::{CreateOutcome, Store, Store1};
use tokio::sync::Mutex;

/// In-memory key-value store.
///
/// Scoped stores share the same underlying map, so a scope created at call
/// time sees values written through an equal scope earlier.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    map: Arc<Mutex<HashMap<String, Bytes>>>,
    prefix: Option<String>,
}

impl MemoryStore {
    /// Creates a new `MemoryStore`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: Arc::new(Mutex::new(HashMap::new())),
            prefix: None,
        }
    }

    fn get_key<K: Into<String>>(&self, key: K) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, key.into()),
            None => key.into(),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Error = Error;

    async fn create_if_absent<K: Into<String> + Send>(
        &self,
        key: K,
        value: Bytes,
    ) -> Result<CreateOutcome, Self::Error> {
        let mut map = self.map.lock().await;
        let key = self.get_key(key);
        if map.contains_key(&key) {
            Ok(CreateOutcome::AlreadyExists)
        } else {
            map.insert(key, value);
            Ok(CreateOutcome::Created)
        }
    }

    async fn delete<K: Into<String> + Send>(&self, key: K) -> Result<(), Self::Error> {
        self.map.lock().await.remove(&self.get_key(key));
        Ok(())
    }

    async fn get<K: Into<String> + Send>(&self, key: K) -> Result<Option<Bytes>, Self::Error> {
        let map = self.map.lock().await;
        Ok(map.get(&self.get_key(key)).cloned())
    }

    async fn list<P: Into<String> + Send>(&self, prefix: P) -> Result<Vec<String>, Self::Error> {
        let full_prefix = self.get_key(prefix);
        let scope_len = self.prefix.as_ref().map_or(0, |prefix| prefix.len() + 1);
        let map = self.map.lock().await;
        Ok(map
            .keys()
            .filter(|key| key.starts_with(&full_prefix))
            .map(|key| key[scope_len..].to_string())
            .collect())
    }

    async fn set<K: Into<String> + Send>(&self, key: K, value: Bytes) -> Result<(), Self::Error> {
        self.map.lock().await.insert(self.get_key(key), value);
        Ok(())
    }
}

impl Store1 for MemoryStore {
    type Error = Error;
    type Scoped = Self;

    fn scope<S: Into<String> + Send>(&self, scope: S) -> Self::Scoped {
        let new_scope = match &self.prefix {
            Some(existing_scope) => format!("{}:{}", existing_scope, scope.into()),
            None => scope.into(),
        };
        Self {
            map: Arc::clone(&self.map),
            prefix: Some(new_scope),
        }
    }
}
