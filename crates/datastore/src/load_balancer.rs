use std::collections::BTreeSet;

use gantry_models::Group;
use gantry_store::Store;

use crate::{Error, decode, decode_path_component, encode, encode_path_component};

const GROUP_PREFIX: &str = "group/";
const BASE_PATH_PREFIX: &str = "base-path/";
const LAST_REQUEST_PREFIX: &str = "last-request/";

/// Durable registry of load-balancer groups, the path-ownership table, and
/// each group's last-applied request pointer.
///
/// The path table maps `(group, path)` to an owning service id and is the
/// record behind mutual exclusion over route namespaces. Ownership writes
/// here are unconditional; callers are responsible for checking conflicts
/// first and for only clearing entries they have verified.
#[derive(Clone, Debug)]
pub struct LoadBalancerDatastore<S: Store> {
    store: S,
}

impl<S: Store> LoadBalancerDatastore<S> {
    /// Creates a datastore over the given store.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Registers or replaces a group.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails or the record cannot be encoded.
    pub async fn save_group(&self, group: &Group) -> Result<(), Error<S::Error>> {
        self.store
            .set(format!("{GROUP_PREFIX}{}", group.name), encode(group)?)
            .await
            .map_err(Error::Store)
    }

    /// Retrieves a group by name.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails or the record is corrupt.
    pub async fn get_group(&self, name: &str) -> Result<Option<Group>, Error<S::Error>> {
        let key = format!("{GROUP_PREFIX}{name}");
        match self.store.get(key.as_str()).await.map_err(Error::Store)? {
            Some(bytes) => Ok(Some(decode(&key, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Names of all registered groups.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    pub async fn get_group_names(&self) -> Result<BTreeSet<String>, Error<S::Error>> {
        Ok(self
            .store
            .list(GROUP_PREFIX)
            .await
            .map_err(Error::Store)?
            .into_iter()
            .map(|key| key[GROUP_PREFIX.len()..].to_string())
            .collect())
    }

    /// The service currently owning `path` within `group`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails or the record is corrupt.
    pub async fn get_base_path_owner(
        &self,
        group: &str,
        path: &str,
    ) -> Result<Option<String>, Error<S::Error>> {
        let key = base_path_key(group, path);
        match self.store.get(key.as_str()).await.map_err(Error::Store)? {
            Some(bytes) => Ok(Some(decode(&key, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Unconditionally records `service_id` as the owner of `path` within
    /// `group`.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails or the record cannot be encoded.
    pub async fn set_base_path_owner(
        &self,
        group: &str,
        path: &str,
        service_id: &str,
    ) -> Result<(), Error<S::Error>> {
        self.store
            .set(base_path_key(group, path), encode(&service_id)?)
            .await
            .map_err(Error::Store)
    }

    /// Removes an ownership entry regardless of current owner. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    pub async fn clear_base_path(&self, group: &str, path: &str) -> Result<(), Error<S::Error>> {
        self.store
            .delete(base_path_key(group, path))
            .await
            .map_err(Error::Store)
    }

    /// All paths currently owned within a group.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    pub async fn get_base_paths(&self, group: &str) -> Result<Vec<String>, Error<S::Error>> {
        let prefix = format!("{BASE_PATH_PREFIX}{group}/");
        Ok(self
            .store
            .list(prefix.as_str())
            .await
            .map_err(Error::Store)?
            .into_iter()
            .map(|key| decode_path_component(&key[prefix.len()..]))
            .collect())
    }

    /// Records `request_id` as the last request applied to `group`, letting
    /// downstream agents detect staleness.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails or the record cannot be encoded.
    pub async fn set_last_request_id(
        &self,
        group: &str,
        request_id: &str,
    ) -> Result<(), Error<S::Error>> {
        self.store
            .set(format!("{LAST_REQUEST_PREFIX}{group}"), encode(&request_id)?)
            .await
            .map_err(Error::Store)
    }

    /// The last request applied to a group, if any.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails or the record is corrupt.
    pub async fn get_last_request_id(
        &self,
        group: &str,
    ) -> Result<Option<String>, Error<S::Error>> {
        let key = format!("{LAST_REQUEST_PREFIX}{group}");
        match self.store.get(key.as_str()).await.map_err(Error::Store)? {
            Some(bytes) => Ok(Some(decode(&key, &bytes)?)),
            None => Ok(None),
        }
    }
}

fn base_path_key(group: &str, path: &str) -> String {
    format!("{BASE_PATH_PREFIX}{group}/{}", encode_path_component(path))
}
