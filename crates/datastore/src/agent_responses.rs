use gantry_models::AgentResponse;
use gantry_store::{Store, Store1};

use crate::{Error, decode, encode, encode_path_component};

/// Most recent acknowledgement from each agent, scoped per request.
///
/// Agent dispatch (outside this crate) records acknowledgements here; the
/// response ledger joins them into read-time projections.
#[derive(Clone, Debug)]
pub struct AgentResponseDatastore<S: Store1> {
    store: S,
}

impl<S: Store1> AgentResponseDatastore<S> {
    /// Creates a datastore over the given store.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Records an agent's latest acknowledgement for a request, replacing
    /// any earlier one from the same agent.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails or the record cannot be encoded.
    pub async fn set_last_response(
        &self,
        request_id: &str,
        agent_url: &str,
        response: &AgentResponse,
    ) -> Result<(), Error<S::Error>> {
        self.store
            .scope(request_id)
            .set(encode_path_component(agent_url), encode(response)?)
            .await
            .map_err(Error::Store)
    }

    /// The latest acknowledgement from every agent for a request, ordered by
    /// agent url.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails or a record is corrupt.
    pub async fn get_last_responses(
        &self,
        request_id: &str,
    ) -> Result<Vec<AgentResponse>, Error<S::Error>> {
        let scoped = self.store.scope(request_id);
        let mut responses = Vec::new();
        for key in scoped.list("").await.map_err(Error::Store)? {
            if let Some(bytes) = scoped.get(key.as_str()).await.map_err(Error::Store)? {
                responses.push(decode::<AgentResponse, _>(&key, &bytes)?);
            }
        }
        responses.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(responses)
    }

    /// Drops all recorded acknowledgements for a request.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    pub async fn clear_responses(&self, request_id: &str) -> Result<(), Error<S::Error>> {
        let scoped = self.store.scope(request_id);
        for key in scoped.list("").await.map_err(Error::Store)? {
            scoped.delete(key).await.map_err(Error::Store)?;
        }
        Ok(())
    }
}
