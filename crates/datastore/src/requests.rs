use gantry_models::{InternalRequestState, QueuedRequestId, Request};
use gantry_store::{CreateOutcome, Store};

use crate::{Error, decode, encode};

const REQUEST_PREFIX: &str = "request/";
const STATE_PREFIX: &str = "state/";
const MESSAGE_PREFIX: &str = "message/";
const QUEUE_PREFIX: &str = "queue/";

/// Outcome of persisting a request into the durable queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The request record, its state, and its queue marker were created.
    Queued(QueuedRequestId),

    /// The request record already existed. A concurrent identical submission
    /// won the race; the stored records are authoritative.
    AlreadyQueued,
}

/// Durable bookkeeping for requests: the request record itself, its state
/// machine position, its diagnostic message, and its pending-queue marker.
#[derive(Clone, Debug)]
pub struct RequestDatastore<S: Store> {
    store: S,
}

impl<S: Store> RequestDatastore<S> {
    /// Creates a datastore over the given store.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Admits a request: creates the request record (create-if-absent), the
    /// initial state, and the queue marker.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails or a record cannot be encoded.
    pub async fn enqueue_request(
        &self,
        request: &Request,
        state: InternalRequestState,
    ) -> Result<EnqueueOutcome, Error<S::Error>> {
        let index = self
            .get_queued_request_ids()
            .await?
            .iter()
            .map(|queued| queued.index + 1)
            .max()
            .unwrap_or(0);
        let queued = QueuedRequestId {
            service_id: request.service.service_id.clone(),
            request_id: request.request_id.clone(),
            index,
        };

        let outcome = self
            .store
            .create_if_absent(
                format!("{REQUEST_PREFIX}{}", request.request_id),
                encode(request)?,
            )
            .await
            .map_err(Error::Store)?;
        if outcome == CreateOutcome::AlreadyExists {
            return Ok(EnqueueOutcome::AlreadyQueued);
        }

        self.set_request_state(&request.request_id, state).await?;
        self.store
            .create_if_absent(
                format!("{QUEUE_PREFIX}{}", request.request_id),
                encode(&queued)?,
            )
            .await
            .map_err(Error::Store)?;

        Ok(EnqueueOutcome::Queued(queued))
    }

    /// Retrieves a request by id.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails or the record is corrupt.
    pub async fn get_request(&self, request_id: &str) -> Result<Option<Request>, Error<S::Error>> {
        let key = format!("{REQUEST_PREFIX}{request_id}");
        match self.store.get(key.as_str()).await.map_err(Error::Store)? {
            Some(bytes) => Ok(Some(decode(&key, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Ids of every live request.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    pub async fn get_all_request_ids(&self) -> Result<Vec<String>, Error<S::Error>> {
        Ok(self
            .store
            .list(REQUEST_PREFIX)
            .await
            .map_err(Error::Store)?
            .into_iter()
            .map(|key| key[REQUEST_PREFIX.len()..].to_string())
            .collect())
    }

    /// Replaces a live request record.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails or the record cannot be encoded.
    pub async fn update_request(&self, request: &Request) -> Result<(), Error<S::Error>> {
        self.store
            .set(
                format!("{REQUEST_PREFIX}{}", request.request_id),
                encode(request)?,
            )
            .await
            .map_err(Error::Store)
    }

    /// Current state machine position of a request.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails or the record is corrupt.
    pub async fn get_request_state(
        &self,
        request_id: &str,
    ) -> Result<Option<InternalRequestState>, Error<S::Error>> {
        let key = format!("{STATE_PREFIX}{request_id}");
        match self.store.get(key.as_str()).await.map_err(Error::Store)? {
            Some(bytes) => Ok(Some(decode(&key, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Moves a request to a new state.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails or the record cannot be encoded.
    pub async fn set_request_state(
        &self,
        request_id: &str,
        state: InternalRequestState,
    ) -> Result<(), Error<S::Error>> {
        self.store
            .set(format!("{STATE_PREFIX}{request_id}"), encode(&state)?)
            .await
            .map_err(Error::Store)
    }

    /// Diagnostic message accompanying a request's current state.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails or the record is corrupt.
    pub async fn get_request_message(
        &self,
        request_id: &str,
    ) -> Result<Option<String>, Error<S::Error>> {
        let key = format!("{MESSAGE_PREFIX}{request_id}");
        match self.store.get(key.as_str()).await.map_err(Error::Store)? {
            Some(bytes) => Ok(Some(decode(&key, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Sets the diagnostic message for a request.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails or the record cannot be encoded.
    pub async fn set_request_message(
        &self,
        request_id: &str,
        message: &str,
    ) -> Result<(), Error<S::Error>> {
        self.store
            .set(format!("{MESSAGE_PREFIX}{request_id}"), encode(&message)?)
            .await
            .map_err(Error::Store)
    }

    /// Pending queue markers in admission order.
    ///
    /// Two requests admitted concurrently can mint the same index; ties are
    /// broken by request id so the order stays stable across reads.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails or a record is corrupt.
    pub async fn get_queued_request_ids(&self) -> Result<Vec<QueuedRequestId>, Error<S::Error>> {
        let mut queued = Vec::new();
        for key in self
            .store
            .list(QUEUE_PREFIX)
            .await
            .map_err(Error::Store)?
        {
            if let Some(bytes) = self.store.get(key.as_str()).await.map_err(Error::Store)? {
                queued.push(decode::<QueuedRequestId, _>(&key, &bytes)?);
            }
        }
        queued.sort_by(|a, b| {
            a.index
                .cmp(&b.index)
                .then_with(|| a.request_id.cmp(&b.request_id))
        });
        Ok(queued)
    }

    /// Removes a queue marker once the worker has dequeued the request.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    pub async fn remove_queued_request(
        &self,
        queued: &QueuedRequestId,
    ) -> Result<(), Error<S::Error>> {
        self.store
            .delete(format!("{QUEUE_PREFIX}{}", queued.request_id))
            .await
            .map_err(Error::Store)
    }

    /// Deletes every record for a request: the request itself, its state,
    /// its message, and its queue marker.
    ///
    /// # Errors
    ///
    /// Returns an error when the store fails.
    pub async fn delete_request(&self, request_id: &str) -> Result<(), Error<S::Error>> {
        for prefix in [REQUEST_PREFIX, STATE_PREFIX, MESSAGE_PREFIX, QUEUE_PREFIX] {
            self.store
                .delete(format!("{prefix}{request_id}"))
                .await
                .map_err(Error::Store)?;
        }
        Ok(())
    }
}
