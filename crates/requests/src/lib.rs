//! Request lifecycle management for the load-balancer configuration control
//! plane: admission with idempotency and validation, the response ledger,
//! path-lock bookkeeping, and the commit engine that applies accepted
//! requests to authoritative state.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod commit;
mod error;
mod listener;
mod locks;

pub use error::Error;
pub use listener::{EnqueueingListener, ServiceEventListener};

use std::collections::BTreeSet;
use std::sync::Arc;

use gantry_datastore::{
    AgentResponseDatastore, EnqueueOutcome, LoadBalancerDatastore, RequestDatastore,
    ResponseHistoryDatastore, StateDatastore,
};
use gantry_models::{
    InternalRequestState, QueuedRequestId, Request, RequestAction, RequestState, Response, Service,
};
use gantry_store::{Store, Store1};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Tuning knobs for the request manager.
#[derive(Clone, Debug)]
pub struct RequestManagerConfig {
    /// Maximum historical responses returned per service listing.
    pub max_responses_to_fetch: usize,

    /// Maximum historical responses retained per service.
    pub max_history_per_service: usize,
}

impl Default for RequestManagerConfig {
    fn default() -> Self {
        Self {
            max_responses_to_fetch: 10,
            max_history_per_service: gantry_datastore::DEFAULT_MAX_HISTORY_PER_SERVICE,
        }
    }
}

/// Coordinates the lifecycle of configuration change requests.
///
/// Admission validates and durably queues requests; the ledger methods
/// project live and historical responses; the lock methods guard the path
/// namespace; committing applies an accepted request to authoritative state.
#[derive(Clone)]
pub struct RequestManager<S, A>
where
    S: Store,
    A: Store1<Error = S::Error>,
{
    requests: RequestDatastore<S>,
    load_balancers: LoadBalancerDatastore<S>,
    state: StateDatastore<S>,
    agent_responses: AgentResponseDatastore<A>,
    history: ResponseHistoryDatastore<S>,
    config: RequestManagerConfig,
    commit_lock: Arc<Mutex<()>>,
}

impl<S, A> RequestManager<S, A>
where
    S: Store,
    A: Store1<Error = S::Error>,
{
    /// Creates a request manager over the given stores.
    ///
    /// Each store carries one record family; callers typically pass scopes of
    /// a single physical store.
    pub fn new(
        request_store: S,
        load_balancer_store: S,
        state_store: S,
        agent_response_store: A,
        history_store: S,
        config: RequestManagerConfig,
    ) -> Self {
        let history = ResponseHistoryDatastore::new(history_store, config.max_history_per_service);
        Self {
            requests: RequestDatastore::new(request_store),
            load_balancers: LoadBalancerDatastore::new(load_balancer_store),
            state: StateDatastore::new(state_store),
            agent_responses: AgentResponseDatastore::new(agent_response_store),
            history,
            config,
            commit_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Admits a request: checks idempotency, validates, and durably queues
    /// it, returning the current response for the request.
    ///
    /// Re-submitting a request identical to one already admitted returns the
    /// existing response unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RequestConflict`] when a different request already
    /// holds the id, a validation error when the request is malformed, or a
    /// datastore error when persistence fails.
    pub async fn enqueue_request(&self, request: &Request) -> Result<Response, Error<S::Error>> {
        if let Some(existing) = self
            .get_response_for_service(&request.service.service_id, &request.request_id)
            .await?
        {
            let stored = self.requests.get_request(&request.request_id).await?;
            if stored.as_ref().is_some_and(|stored| stored != request) {
                return Err(Error::RequestConflict {
                    request_id: request.request_id.clone(),
                    existing: Box::new(existing),
                });
            }
            debug!(request_id = %request.request_id, "identical request already admitted");
            return Ok(existing);
        }

        if request.no_duplicate_upstreams {
            self.validate_no_duplicate_upstreams(request).await?;
        }
        if request.no_reload && request.action == Some(RequestAction::Reload) {
            return Err(Error::InvalidRequestAction(
                "no_reload cannot be combined with the Reload action".to_string(),
            ));
        }
        if !request.replace_upstreams.is_empty()
            && (!request.add_upstreams.is_empty() || !request.remove_upstreams.is_empty())
        {
            return Err(Error::InvalidUpstreams(
                "when replace_upstreams is set, add_upstreams and remove_upstreams must be empty"
                    .to_string(),
            ));
        }
        if request.action == Some(RequestAction::Revert) {
            return Err(Error::InvalidRequestAction(
                "the Revert action is reserved for internal compensating requests; \
                 use Update, Delete, Reload, or no action"
                    .to_string(),
            ));
        }

        match self
            .requests
            .enqueue_request(request, InternalRequestState::Pending)
            .await?
        {
            EnqueueOutcome::Queued(queued) => {
                info!(request_id = %request.request_id, service_id = %request.service.service_id, "request queued");
                self.requests
                    .set_request_message(&request.request_id, &format!("Queued as {queued}"))
                    .await?;
            }
            EnqueueOutcome::AlreadyQueued => {
                warn!(request_id = %request.request_id, "request record already existed, returning current contents");
            }
        }

        match self
            .get_response_for_service(&request.service.service_id, &request.request_id)
            .await?
        {
            Some(response) => Ok(response),
            // The records were just written; synthesize rather than fail the
            // admission if a concurrent worker already retired them.
            None => Ok(Response {
                request_id: request.request_id.clone(),
                state: RequestState::Waiting,
                message: None,
                agent_responses: vec![],
                request: Some(request.clone()),
                success: false,
                historical: false,
            }),
        }
    }

    async fn validate_no_duplicate_upstreams(
        &self,
        request: &Request,
    ) -> Result<(), Error<S::Error>> {
        let mut claimed = BTreeSet::new();
        for state in self.state.get_global_state().await? {
            if state.service.service_id == request.service.service_id {
                continue;
            }
            claimed.extend(state.upstreams.into_iter().map(|info| info.upstream));
        }
        let duplicates: Vec<&str> = request
            .add_upstreams
            .iter()
            .map(|info| info.upstream.as_str())
            .filter(|upstream| claimed.contains(*upstream))
            .collect();
        if duplicates.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidUpstreams(format!(
                "upstreams already claimed by another service: {}",
                duplicates.join(", ")
            )))
        }
    }

    /// Requests cancellation.
    ///
    /// Only requests that have not started reverting and are not terminal are
    /// moved to the cancellation path; for any other state this is a no-op
    /// that reports the state the request is in. `None` means the request id
    /// is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error when the datastore fails.
    pub async fn cancel_request(
        &self,
        request_id: &str,
    ) -> Result<Option<InternalRequestState>, Error<S::Error>> {
        let Some(state) = self.requests.get_request_state(request_id).await? else {
            return Ok(None);
        };
        if state.is_cancelable() {
            let next = InternalRequestState::CancelledSendRevertRequests;
            self.requests.set_request_state(request_id, next).await?;
            info!(request_id, "cancellation accepted");
            Ok(Some(next))
        } else {
            debug!(request_id, %state, "request is not in a cancelable state, ignoring");
            Ok(Some(state))
        }
    }

    /// The current response for a request: projected from live bookkeeping
    /// when the request is active, served from history otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error when the datastore fails.
    pub async fn get_response(
        &self,
        request_id: &str,
    ) -> Result<Option<Response>, Error<S::Error>> {
        if let Some(response) = self.response_from_active(request_id).await? {
            return Ok(Some(response));
        }
        let Some(service_id) = self.history.get_service_id_for_request_id(request_id).await? else {
            return Ok(None);
        };
        Ok(self.history.get_response(&service_id, request_id).await?)
    }

    /// Like [`Self::get_response`], for callers that already know the target
    /// service.
    ///
    /// # Errors
    ///
    /// Returns an error when the datastore fails.
    pub async fn get_response_for_service(
        &self,
        service_id: &str,
        request_id: &str,
    ) -> Result<Option<Response>, Error<S::Error>> {
        if let Some(response) = self.response_from_active(request_id).await? {
            return Ok(Some(response));
        }
        Ok(self.history.get_response(service_id, request_id).await?)
    }

    /// Responses for every live request targeting a service, followed by up
    /// to the configured number of historical ones, newest first. A request
    /// that is both live and in history appears once, as live.
    ///
    /// # Errors
    ///
    /// Returns an error when the datastore fails.
    pub async fn get_responses_for_service(
        &self,
        service_id: &str,
    ) -> Result<Vec<Response>, Error<S::Error>> {
        let mut responses = Vec::new();
        let mut live_ids = BTreeSet::new();
        for request_id in self.requests.get_all_request_ids().await? {
            let Some(request) = self.requests.get_request(&request_id).await? else {
                continue;
            };
            if request.service.service_id != service_id {
                continue;
            }
            if let Some(response) = self.response_from_active(&request_id).await? {
                live_ids.insert(request_id);
                responses.push(response);
            }
        }
        for historical in self
            .history
            .get_responses_for_service(service_id, self.config.max_responses_to_fetch)
            .await?
        {
            if !live_ids.contains(&historical.request_id) {
                responses.push(historical);
            }
        }
        Ok(responses)
    }

    async fn response_from_active(
        &self,
        request_id: &str,
    ) -> Result<Option<Response>, Error<S::Error>> {
        let Some(state) = self.requests.get_request_state(request_id).await? else {
            return Ok(None);
        };
        let Some(request) = self.requests.get_request(request_id).await? else {
            return Ok(None);
        };
        let message = self.requests.get_request_message(request_id).await?;
        let agent_responses = self.agent_responses.get_last_responses(request_id).await?;
        Ok(Some(Response {
            request_id: request_id.to_string(),
            state: state.public_state(),
            message,
            agent_responses,
            request: Some(request),
            success: state.is_success(),
            historical: false,
        }))
    }

    /// Records the request's final response in the bounded history ledger.
    ///
    /// # Errors
    ///
    /// Returns an error when the datastore fails.
    pub async fn save_response_to_history(
        &self,
        request: &Request,
        state: InternalRequestState,
    ) -> Result<(), Error<S::Error>> {
        let response = Response {
            request_id: request.request_id.clone(),
            state: state.public_state(),
            message: self.requests.get_request_message(&request.request_id).await?,
            agent_responses: self
                .agent_responses
                .get_last_responses(&request.request_id)
                .await?,
            request: Some(request.clone()),
            success: state.is_success(),
            historical: false,
        };
        Ok(self
            .history
            .add_response(&request.service.service_id, &request.request_id, response)
            .await?)
    }

    /// Retires a finished request: snapshots its response into history, then
    /// removes its live records and agent acknowledgements.
    ///
    /// # Errors
    ///
    /// Returns an error when the datastore fails.
    pub async fn retire_request(
        &self,
        request: &Request,
        state: InternalRequestState,
    ) -> Result<(), Error<S::Error>> {
        self.save_response_to_history(request, state).await?;
        self.agent_responses
            .clear_responses(&request.request_id)
            .await?;
        Ok(self.requests.delete_request(&request.request_id).await?)
    }

    /// Retrieves a live request by id.
    ///
    /// # Errors
    ///
    /// Returns an error when the datastore fails.
    pub async fn get_request(
        &self,
        request_id: &str,
    ) -> Result<Option<Request>, Error<S::Error>> {
        Ok(self.requests.get_request(request_id).await?)
    }

    /// Current state machine position of a request.
    ///
    /// # Errors
    ///
    /// Returns an error when the datastore fails.
    pub async fn get_request_state(
        &self,
        request_id: &str,
    ) -> Result<Option<InternalRequestState>, Error<S::Error>> {
        Ok(self.requests.get_request_state(request_id).await?)
    }

    /// Moves a request to a new state.
    ///
    /// # Errors
    ///
    /// Returns an error when the datastore fails.
    pub async fn set_request_state(
        &self,
        request_id: &str,
        state: InternalRequestState,
    ) -> Result<(), Error<S::Error>> {
        Ok(self.requests.set_request_state(request_id, state).await?)
    }

    /// Sets the diagnostic message for a request.
    ///
    /// # Errors
    ///
    /// Returns an error when the datastore fails.
    pub async fn set_request_message(
        &self,
        request_id: &str,
        message: &str,
    ) -> Result<(), Error<S::Error>> {
        Ok(self
            .requests
            .set_request_message(request_id, message)
            .await?)
    }

    /// Replaces a live request record, used when rewriting a request into
    /// its compensating form.
    ///
    /// # Errors
    ///
    /// Returns an error when the datastore fails.
    pub async fn update_request(&self, request: &Request) -> Result<(), Error<S::Error>> {
        Ok(self.requests.update_request(request).await?)
    }

    /// Removes a request's live records without recording history.
    ///
    /// # Errors
    ///
    /// Returns an error when the datastore fails.
    pub async fn delete_request(&self, request_id: &str) -> Result<(), Error<S::Error>> {
        Ok(self.requests.delete_request(request_id).await?)
    }

    /// Pending queue markers in admission order, for the worker to drain.
    ///
    /// # Errors
    ///
    /// Returns an error when the datastore fails.
    pub async fn get_queued_request_ids(
        &self,
    ) -> Result<Vec<QueuedRequestId>, Error<S::Error>> {
        Ok(self.requests.get_queued_request_ids().await?)
    }

    /// Removes a queue marker once the worker has picked up the request.
    ///
    /// # Errors
    ///
    /// Returns an error when the datastore fails.
    pub async fn remove_queued_request(
        &self,
        queued: &QueuedRequestId,
    ) -> Result<(), Error<S::Error>> {
        Ok(self.requests.remove_queued_request(queued).await?)
    }

    /// The authoritative record for a service, if one has been committed.
    ///
    /// # Errors
    ///
    /// Returns an error when the datastore fails.
    pub async fn get_service(
        &self,
        service_id: &str,
    ) -> Result<Option<Service>, Error<S::Error>> {
        Ok(self.state.get_service(service_id).await?)
    }
}
