use serde::{Deserialize, Serialize};

use crate::{Request, RequestState};

/// A load-balancer agent's most recent acknowledgement for a request.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct AgentResponse {
    /// The agent's request endpoint.
    pub url: String,

    /// Delivery attempt counter.
    pub attempt: u32,

    /// HTTP status returned by the agent, when one was received.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    /// Response body returned by the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Local error while contacting the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

impl AgentResponse {
    /// Whether the agent acknowledged successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exception.is_none() && self.status_code.is_some_and(|code| (200..300).contains(&code))
    }
}

/// Read-only projection of a request at a point in time.
///
/// Synthesized at read time from live request bookkeeping, or served from the
/// bounded history ledger once the request is no longer live.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Response {
    /// The request this response describes.
    pub request_id: String,

    /// Externally-visible status.
    pub state: RequestState,

    /// Human-readable progress or diagnostic message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Most recent per-agent acknowledgements.
    #[serde(default)]
    pub agent_responses: Vec<AgentResponse>,

    /// The originating request, when still retained.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Request>,

    /// Whether the request reached its sole success state.
    pub success: bool,

    /// Whether this response was served from history rather than a live
    /// request.
    #[serde(default)]
    pub historical: bool,
}
