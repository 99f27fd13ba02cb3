use gantry_models::{Request, Service, ServiceState, UpstreamInfo};
use gantry_store::Store;

use crate::{Error, decode, encode};

const SERVICE_PREFIX: &str = "service/";
const UPSTREAMS_PREFIX: &str = "upstreams/";
const STATE_VERSION_KEY: &str = "state-version";

/// Authoritative service state: the committed service records, their
/// upstream sets, and the global state version consumed by agents.
#[derive(Clone, Debug)]
pub struct StateDatastore<S: Store> {
    store: S,
}

impl<S: Store> StateDatastore<S> {
    /// Creates a datastore over the given store.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Retrieves the authoritative record for a service.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails or the record is corrupt.
    pub async fn get_service(&self, service_id: &str) -> Result<Option<Service>, Error<S::Error>> {
        let key = format!("{SERVICE_PREFIX}{service_id}");
        match self.store.get(key.as_str()).await.map_err(Error::Store)? {
            Some(bytes) => Ok(Some(decode(&key, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Writes the request's service record and applies its upstream changes.
    ///
    /// A non-empty replacement set wins wholesale; otherwise removals are
    /// applied before additions, matching on the upstream endpoint. Mutual
    /// exclusion of the two forms is validated at admission, not here.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails or a record cannot be encoded.
    pub async fn update_service(&self, request: &Request) -> Result<(), Error<S::Error>> {
        let service_id = &request.service.service_id;
        self.store
            .set(
                format!("{SERVICE_PREFIX}{service_id}"),
                encode(&request.service)?,
            )
            .await
            .map_err(Error::Store)?;

        let mut upstreams = self.get_upstreams(service_id).await?;
        if request.replace_upstreams.is_empty() {
            upstreams.retain(|existing| {
                !request
                    .remove_upstreams
                    .iter()
                    .any(|removed| removed.upstream == existing.upstream)
            });
            for added in &request.add_upstreams {
                upstreams.retain(|existing| existing.upstream != added.upstream);
                let mut added = added.clone();
                added.request_id.get_or_insert(request.request_id.clone());
                upstreams.push(added);
            }
        } else {
            upstreams = request.replace_upstreams.clone();
            for upstream in &mut upstreams {
                upstream.request_id.get_or_insert(request.request_id.clone());
            }
        }

        self.store
            .set(format!("{UPSTREAMS_PREFIX}{service_id}"), encode(&upstreams)?)
            .await
            .map_err(Error::Store)
    }

    /// Deletes a service's record and its upstream set.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    pub async fn remove_service(&self, service_id: &str) -> Result<(), Error<S::Error>> {
        self.store
            .delete(format!("{SERVICE_PREFIX}{service_id}"))
            .await
            .map_err(Error::Store)?;
        self.store
            .delete(format!("{UPSTREAMS_PREFIX}{service_id}"))
            .await
            .map_err(Error::Store)
    }

    /// The current upstream set for a service. Empty when the service is
    /// unknown.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails or the record is corrupt.
    pub async fn get_upstreams(
        &self,
        service_id: &str,
    ) -> Result<Vec<UpstreamInfo>, Error<S::Error>> {
        let key = format!("{UPSTREAMS_PREFIX}{service_id}");
        match self.store.get(key.as_str()).await.map_err(Error::Store)? {
            Some(bytes) => decode(&key, &bytes),
            None => Ok(Vec::new()),
        }
    }

    /// Every committed service joined with its upstream set.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails or a record is corrupt.
    pub async fn get_global_state(&self) -> Result<Vec<ServiceState>, Error<S::Error>> {
        let mut services = Vec::new();
        for key in self
            .store
            .list(SERVICE_PREFIX)
            .await
            .map_err(Error::Store)?
        {
            let service_id = key[SERVICE_PREFIX.len()..].to_string();
            if let Some(service) = self.get_service(&service_id).await? {
                let upstreams = self.get_upstreams(&service_id).await?;
                services.push(ServiceState { service, upstreams });
            }
        }
        Ok(services)
    }

    /// Bumps the global state version.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    pub async fn increment_state_version(&self) -> Result<u64, Error<S::Error>> {
        let next = self.get_state_version().await?.unwrap_or(0) + 1;
        self.store
            .set(STATE_VERSION_KEY, encode(&next)?)
            .await
            .map_err(Error::Store)?;
        Ok(next)
    }

    /// The current global state version, absent until the first bump.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails or the record is corrupt.
    pub async fn get_state_version(&self) -> Result<Option<u64>, Error<S::Error>> {
        match self
            .store
            .get(STATE_VERSION_KEY)
            .await
            .map_err(Error::Store)?
        {
            Some(bytes) => Ok(Some(decode(STATE_VERSION_KEY, &bytes)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use gantry_store_memory::MemoryStore;

    use super::*;

    fn request(request_id: &str, service_id: &str) -> Request {
        Request {
            request_id: request_id.to_string(),
            service: Service {
                service_id: service_id.to_string(),
                owners: vec![],
                base_path: "/base".to_string(),
                additional_paths: vec![],
                load_balancer_groups: BTreeSet::new(),
                options: BTreeMap::new(),
                template_name: None,
                domains: BTreeSet::new(),
                edge_cache_domains: BTreeSet::new(),
                preserve_own_mapping: false,
            },
            action: None,
            add_upstreams: vec![],
            remove_upstreams: vec![],
            replace_upstreams: vec![],
            no_reload: false,
            no_validate: false,
            no_duplicate_upstreams: false,
        }
    }

    #[tokio::test]
    async fn test_update_service_merges_upstreams() {
        let datastore = StateDatastore::new(MemoryStore::new());

        let mut first = request("r1", "svc");
        first.add_upstreams = vec![
            UpstreamInfo::new("10.0.0.1:80"),
            UpstreamInfo::new("10.0.0.2:80"),
        ];
        datastore.update_service(&first).await.unwrap();

        let mut second = request("r2", "svc");
        second.add_upstreams = vec![UpstreamInfo::new("10.0.0.3:80")];
        second.remove_upstreams = vec![UpstreamInfo::new("10.0.0.1:80")];
        datastore.update_service(&second).await.unwrap();

        let upstreams: Vec<String> = datastore
            .get_upstreams("svc")
            .await
            .unwrap()
            .into_iter()
            .map(|info| info.upstream)
            .collect();
        assert_eq!(upstreams, vec!["10.0.0.2:80", "10.0.0.3:80"]);
    }

    #[tokio::test]
    async fn test_update_service_replaces_upstreams_wholesale() {
        let datastore = StateDatastore::new(MemoryStore::new());

        let mut first = request("r1", "svc");
        first.add_upstreams = vec![UpstreamInfo::new("10.0.0.1:80")];
        datastore.update_service(&first).await.unwrap();

        let mut second = request("r2", "svc");
        second.replace_upstreams = vec![UpstreamInfo::new("10.0.0.9:80")];
        datastore.update_service(&second).await.unwrap();

        let upstreams = datastore.get_upstreams("svc").await.unwrap();
        assert_eq!(upstreams.len(), 1);
        assert_eq!(upstreams[0].upstream, "10.0.0.9:80");
        assert_eq!(upstreams[0].request_id.as_deref(), Some("r2"));
    }

    #[tokio::test]
    async fn test_remove_service_clears_record_and_upstreams() {
        let datastore = StateDatastore::new(MemoryStore::new());

        let mut req = request("r1", "svc");
        req.add_upstreams = vec![UpstreamInfo::new("10.0.0.1:80")];
        datastore.update_service(&req).await.unwrap();

        datastore.remove_service("svc").await.unwrap();

        assert_eq!(datastore.get_service("svc").await.unwrap(), None);
        assert!(datastore.get_upstreams("svc").await.unwrap().is_empty());
        assert!(datastore.get_global_state().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_state_version_increments() {
        let datastore = StateDatastore::new(MemoryStore::new());

        assert_eq!(datastore.get_state_version().await.unwrap(), None);
        assert_eq!(datastore.increment_state_version().await.unwrap(), 1);
        assert_eq!(datastore.increment_state_version().await.unwrap(), 2);
        assert_eq!(datastore.get_state_version().await.unwrap(), Some(2));
    }
}
