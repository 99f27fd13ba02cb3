use std::collections::BTreeSet;

use gantry_models::Response;
use gantry_store::StoreError;
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error<SE: StoreError> {
    /// A different request already exists under the same request id. The
    /// current response for the existing request is attached so callers can
    /// report what is actually in flight.
    #[error("request {request_id} is already active with different parameters")]
    RequestConflict {
        /// The contested request id.
        request_id: String,
        /// The response for the request currently holding the id.
        existing: Box<Response>,
    },

    /// The requested action is not accepted at admission.
    #[error("{0}")]
    InvalidRequestAction(String),

    /// The request's upstream changes are not accepted at admission.
    #[error("{0}")]
    InvalidUpstreams(String),

    /// The request targets load-balancer groups that are not registered.
    #[error("unknown load balancer groups: {0:?}")]
    MissingLoadBalancerGroups(BTreeSet<String>),

    /// A datastore operation failed.
    #[error(transparent)]
    Datastore(#[from] gantry_datastore::Error<SE>),
}
