use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Service, UpstreamInfo};

/// What a request asks the control plane to do.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum RequestAction {
    /// Write or replace the service's routing configuration. The default
    /// when a request carries no action.
    Update,

    /// Remove the service's routing configuration.
    Delete,

    /// Ask agents to reload their configuration without state changes.
    Reload,

    /// Compensating update issued internally while cancelling or failing a
    /// request. Rejected when supplied by a client.
    Revert,
}

/// A declarative change request for a service's routing configuration.
///
/// `request_id` is client-supplied and doubles as the idempotency key.
/// Equality covers every field; re-submitting an identical request is a safe
/// retry, while an unequal request under the same id is a conflict.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Request {
    /// Unique, client-supplied request identifier.
    pub request_id: String,

    /// The target service, possibly new or updated.
    pub service: Service,

    /// Requested action; absent means [`RequestAction::Update`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<RequestAction>,

    /// Upstreams to add to the service.
    #[serde(default)]
    pub add_upstreams: Vec<UpstreamInfo>,

    /// Upstreams to remove from the service.
    #[serde(default)]
    pub remove_upstreams: Vec<UpstreamInfo>,

    /// Full replacement upstream set. Must be empty when add or remove
    /// upstreams are present.
    #[serde(default)]
    pub replace_upstreams: Vec<UpstreamInfo>,

    /// Skip the post-apply reload on agents.
    #[serde(default)]
    pub no_reload: bool,

    /// Skip template validation on agents.
    #[serde(default)]
    pub no_validate: bool,

    /// Reject the request when an added upstream is already claimed by
    /// another service.
    #[serde(default)]
    pub no_duplicate_upstreams: bool,
}

impl Request {
    /// The action to apply, defaulting to [`RequestAction::Update`].
    #[must_use]
    pub fn effective_action(&self) -> RequestAction {
        self.action.unwrap_or(RequestAction::Update)
    }
}

/// Durable marker of a pending request awaiting processing.
///
/// Created together with the request record on admission and removed once
/// the worker dequeues the request. `index` preserves admission order.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct QueuedRequestId {
    /// The target service id.
    pub service_id: String,

    /// The queued request id.
    pub request_id: String,

    /// Monotonic admission index used for FIFO dequeueing.
    pub index: u64,
}

impl fmt::Display for QueuedRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{:010}",
            self.service_id, self.request_id, self.index
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_action_defaults_to_update() {
        let request = Request {
            request_id: "r1".to_string(),
            service: Service {
                service_id: "svc".to_string(),
                owners: vec![],
                base_path: "/".to_string(),
                additional_paths: vec![],
                load_balancer_groups: std::collections::BTreeSet::new(),
                options: std::collections::BTreeMap::new(),
                template_name: None,
                domains: std::collections::BTreeSet::new(),
                edge_cache_domains: std::collections::BTreeSet::new(),
                preserve_own_mapping: false,
            },
            action: None,
            add_upstreams: vec![],
            remove_upstreams: vec![],
            replace_upstreams: vec![],
            no_reload: false,
            no_validate: false,
            no_duplicate_upstreams: false,
        };

        assert_eq!(request.effective_action(), RequestAction::Update);
    }

    #[test]
    fn test_queued_request_id_display() {
        let queued = QueuedRequestId {
            service_id: "svc".to_string(),
            request_id: "r1".to_string(),
            index: 7,
        };

        assert_eq!(queued.to_string(), "svc|r1|0000000007");
    }
}
