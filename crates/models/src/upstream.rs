use serde::{Deserialize, Serialize};

/// A concrete backend endpoint serving a service.
///
/// An upstream belongs to exactly one service at a time across the whole
/// system; the no-duplicate-upstreams validation enforces this at admission.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct UpstreamInfo {
    /// The endpoint, in host:port form.
    pub upstream: String,

    /// The request that introduced this upstream, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Placement metadata used by agents for rack-aware balancing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rack_id: Option<String>,
}

impl UpstreamInfo {
    /// Creates an upstream with no provenance metadata.
    #[must_use]
    pub fn new(upstream: impl Into<String>) -> Self {
        Self {
            upstream: upstream.into(),
            request_id: None,
            rack_id: None,
        }
    }
}
