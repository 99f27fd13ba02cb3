use chrono::{DateTime, Utc};
use gantry_models::Response;
use gantry_store::Store;
use serde::{Deserialize, Serialize};

use crate::{Error, decode, encode};

/// Default per-service retention when none is configured.
pub const DEFAULT_MAX_HISTORY_PER_SERVICE: usize = 100;

#[derive(Debug, Deserialize, Serialize)]
struct HistoricalResponse {
    response: Response,
    recorded_at: DateTime<Utc>,
}

/// Bounded per-service history of completed responses.
///
/// Owns its retention policy: each service keeps at most a configured number
/// of responses, oldest evicted first.
#[derive(Clone, Debug)]
pub struct ResponseHistoryDatastore<S: Store> {
    store: S,
    max_per_service: usize,
}

impl<S: Store> ResponseHistoryDatastore<S> {
    /// Creates a datastore retaining at most `max_per_service` responses per
    /// service.
    pub const fn new(store: S, max_per_service: usize) -> Self {
        Self {
            store,
            max_per_service,
        }
    }

    /// Records a terminal response for a service, evicting the oldest
    /// entries beyond the retention cap.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails or a record cannot be encoded.
    pub async fn add_response(
        &self,
        service_id: &str,
        request_id: &str,
        response: Response,
    ) -> Result<(), Error<S::Error>> {
        let mut response = response;
        response.historical = true;
        let entry = HistoricalResponse {
            response,
            recorded_at: Utc::now(),
        };
        self.store
            .set(history_key(service_id, request_id), encode(&entry)?)
            .await
            .map_err(Error::Store)?;

        self.evict_beyond_cap(service_id).await
    }

    async fn evict_beyond_cap(&self, service_id: &str) -> Result<(), Error<S::Error>> {
        let mut entries = self.load_entries(service_id).await?;
        if entries.len() <= self.max_per_service {
            return Ok(());
        }
        entries.sort_by_key(|entry| entry.recorded_at);
        let excess = entries.len() - self.max_per_service;
        for entry in entries.into_iter().take(excess) {
            self.store
                .delete(history_key(service_id, &entry.response.request_id))
                .await
                .map_err(Error::Store)?;
        }
        Ok(())
    }

    /// Retrieves a historical response.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails or the record is corrupt.
    pub async fn get_response(
        &self,
        service_id: &str,
        request_id: &str,
    ) -> Result<Option<Response>, Error<S::Error>> {
        let key = history_key(service_id, request_id);
        match self.store.get(key.as_str()).await.map_err(Error::Store)? {
            Some(bytes) => {
                let entry: HistoricalResponse = decode(&key, &bytes)?;
                Ok(Some(entry.response))
            }
            None => Ok(None),
        }
    }

    /// Up to `limit` historical responses for a service, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails or a record is corrupt.
    pub async fn get_responses_for_service(
        &self,
        service_id: &str,
        limit: usize,
    ) -> Result<Vec<Response>, Error<S::Error>> {
        let mut entries = self.load_entries(service_id).await?;
        entries.sort_by_key(|entry| std::cmp::Reverse(entry.recorded_at));
        Ok(entries
            .into_iter()
            .take(limit)
            .map(|entry| entry.response)
            .collect())
    }

    /// Resolves the service a historical request belonged to.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    pub async fn get_service_id_for_request_id(
        &self,
        request_id: &str,
    ) -> Result<Option<String>, Error<S::Error>> {
        let suffix = format!("/{request_id}");
        Ok(self
            .store
            .list("")
            .await
            .map_err(Error::Store)?
            .into_iter()
            .find(|key| key.ends_with(&suffix))
            .and_then(|key| key.rsplit_once('/').map(|(service, _)| service.to_string())))
    }

    async fn load_entries(
        &self,
        service_id: &str,
    ) -> Result<Vec<HistoricalResponse>, Error<S::Error>> {
        let prefix = format!("{service_id}/");
        let mut entries = Vec::new();
        for key in self
            .store
            .list(prefix.as_str())
            .await
            .map_err(Error::Store)?
        {
            if let Some(bytes) = self.store.get(key.as_str()).await.map_err(Error::Store)? {
                entries.push(decode::<HistoricalResponse, _>(&key, &bytes)?);
            }
        }
        Ok(entries)
    }
}

fn history_key(service_id: &str, request_id: &str) -> String {
    format!("{service_id}/{request_id}")
}

#[cfg(test)]
mod tests {
    use gantry_models::RequestState;
    use gantry_store_memory::MemoryStore;

    use super::*;

    fn response(request_id: &str) -> Response {
        Response {
            request_id: request_id.to_string(),
            state: RequestState::Success,
            message: None,
            agent_responses: vec![],
            request: None,
            success: true,
            historical: false,
        }
    }

    #[tokio::test]
    async fn test_add_and_get_marks_historical() {
        let history = ResponseHistoryDatastore::new(MemoryStore::new(), 10);

        history
            .add_response("svc", "r1", response("r1"))
            .await
            .unwrap();

        let stored = history.get_response("svc", "r1").await.unwrap().unwrap();
        assert!(stored.historical);
        assert_eq!(stored.request_id, "r1");
    }

    #[tokio::test]
    async fn test_retention_evicts_oldest_first() {
        let history = ResponseHistoryDatastore::new(MemoryStore::new(), 2);

        for id in ["r1", "r2", "r3"] {
            history.add_response("svc", id, response(id)).await.unwrap();
        }

        assert_eq!(history.get_response("svc", "r1").await.unwrap(), None);
        assert!(history.get_response("svc", "r2").await.unwrap().is_some());
        assert!(history.get_response("svc", "r3").await.unwrap().is_some());

        let newest_first = history.get_responses_for_service("svc", 10).await.unwrap();
        assert_eq!(newest_first.len(), 2);
        assert_eq!(newest_first[0].request_id, "r3");
    }

    #[tokio::test]
    async fn test_reverse_lookup_by_request_id() {
        let history = ResponseHistoryDatastore::new(MemoryStore::new(), 10);

        history
            .add_response("svc-a", "r1", response("r1"))
            .await
            .unwrap();
        history
            .add_response("svc-b", "r2", response("r2"))
            .await
            .unwrap();

        assert_eq!(
            history.get_service_id_for_request_id("r2").await.unwrap(),
            Some("svc-b".to_string())
        );
        assert_eq!(
            history.get_service_id_for_request_id("missing").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_listing_is_limited() {
        let history = ResponseHistoryDatastore::new(MemoryStore::new(), 10);

        for id in ["r1", "r2", "r3"] {
            history.add_response("svc", id, response(id)).await.unwrap();
        }

        let limited = history.get_responses_for_service("svc", 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }
}
