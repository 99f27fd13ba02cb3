//! Typed datastores layered over the durable store, one per concern:
//! requests and the pending queue, load-balancer groups and the
//! path-ownership table, authoritative service state, per-agent
//! acknowledgements, and the bounded response history.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod agent_responses;
mod error;
mod history;
mod load_balancer;
mod requests;
mod state;

pub use agent_responses::AgentResponseDatastore;
pub use error::Error;
pub use history::{DEFAULT_MAX_HISTORY_PER_SERVICE, ResponseHistoryDatastore};
pub use load_balancer::LoadBalancerDatastore;
pub use requests::{EnqueueOutcome, RequestDatastore};
pub use state::StateDatastore;

use bytes::Bytes;
use gantry_store::StoreError;
use serde::Serialize;
use serde::de::DeserializeOwned;

fn encode<T: Serialize, SE: StoreError>(value: &T) -> Result<Bytes, Error<SE>> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(Error::Serialize)
}

fn decode<T: DeserializeOwned, SE: StoreError>(key: &str, bytes: &Bytes) -> Result<T, Error<SE>> {
    serde_json::from_slice(bytes).map_err(|source| Error::Deserialize {
        key: key.to_string(),
        source,
    })
}

/// Paths contain `/`, which many coordination backends treat as a node
/// separator, so they are flattened before use in a key.
fn encode_path_component(path: &str) -> String {
    path.replace('/', "|")
}

fn decode_path_component(encoded: &str) -> String {
    encoded.replace('|', "/")
}
