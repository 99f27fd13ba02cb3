//! Abstract interface for the durable key-value store backing request,
//! lock, and service state.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::error::Error;
use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;

/// Marker trait for `Store` errors.
pub trait StoreError: Debug + Error + Send + Sync + 'static {}

/// Outcome of a conditional create.
///
/// An existing key is a normal result, never an error; callers decide whether
/// it is benign (request admission races) or a conflict.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The key was absent and the value has been written.
    Created,

    /// The key already existed; nothing was written.
    AlreadyExists,
}

/// A trait representing a durable key-value store with asynchronous
/// operations and create-if-absent semantics.
///
/// Implementations are expected to reflect the latest durable value on every
/// read; callers never cache values across calls.
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    /// The error type for store operations.
    type Error: StoreError;

    /// Writes `value` under `key` only if the key is currently absent.
    async fn create_if_absent<K: Into<String> + Send>(
        &self,
        key: K,
        value: Bytes,
    ) -> Result<CreateOutcome, Self::Error>;

    /// Deletes a key. Succeeds even if the key is absent.
    async fn delete<K: Into<String> + Send>(&self, key: K) -> Result<(), Self::Error>;

    /// Retrieves the value associated with a key.
    async fn get<K: Into<String> + Send>(&self, key: K) -> Result<Option<Bytes>, Self::Error>;

    /// Retrieves all keys beginning with `prefix`, in arbitrary order,
    /// relative to this store's scope.
    async fn list<P: Into<String> + Send>(&self, prefix: P) -> Result<Vec<String>, Self::Error>;

    /// Stores a key-value pair unconditionally.
    async fn set<K: Into<String> + Send>(&self, key: K, value: Bytes) -> Result<(), Self::Error>;
}

/// A trait representing a scoped key-value store.
///
/// Scoping namespaces all keys under a prefix, so independent record families
/// can share one physical store.
pub trait Store1: Clone + Send + Sync + 'static {
    /// The error type for store operations.
    type Error: StoreError;

    /// The scoped store type.
    type Scoped: Store<Error = Self::Error>;

    /// Adds a scope and makes the store usable under it.
    fn scope<S: Into<String> + Send>(&self, scope: S) -> Self::Scoped;
}
