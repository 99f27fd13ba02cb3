use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::UpstreamInfo;

/// A logical service's declared routing configuration.
///
/// Identity is `service_id`; at most one live service per id exists in
/// authoritative state. Equality covers every field and drives the
/// admission-time idempotency check.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Service {
    /// Unique service identifier.
    pub service_id: String,

    /// Contacts responsible for the service, in declaration order.
    #[serde(default)]
    pub owners: Vec<String>,

    /// Primary route prefix. Absolute (`/foo`) or relative to a group's
    /// default domain.
    pub base_path: String,

    /// Further route prefixes claimed by the service, in declaration order.
    #[serde(default)]
    pub additional_paths: Vec<String>,

    /// Load-balancer groups the service belongs to.
    #[serde(default)]
    pub load_balancer_groups: BTreeSet<String>,

    /// Renderer options, opaque to the control plane.
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,

    /// Named configuration template to render with, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,

    /// Domains the service's paths are served under. When empty, paths are
    /// claimed bare.
    #[serde(default)]
    pub domains: BTreeSet<String>,

    /// Domains fronted by an edge cache.
    #[serde(default)]
    pub edge_cache_domains: BTreeSet<String>,

    /// When the service declares domains, also keep the bare path mapping.
    #[serde(default)]
    pub preserve_own_mapping: bool,
}

impl Service {
    /// All route keys this service claims: each additional path followed by
    /// the base path, qualified by the service's declared domains.
    ///
    /// A domain-qualified key does not start with `/`; the path-lock layer
    /// additionally checks such keys under the bare path when the domain is
    /// the group's default.
    #[must_use]
    pub fn all_paths(&self) -> Vec<String> {
        let mut all = Vec::new();
        for path in self
            .additional_paths
            .iter()
            .chain(std::iter::once(&self.base_path))
        {
            self.qualify_path(path, &mut all);
        }
        all
    }

    fn qualify_path(&self, path: &str, out: &mut Vec<String>) {
        if self.domains.is_empty() {
            out.push(path.to_owned());
            return;
        }
        if self.preserve_own_mapping {
            out.push(path.to_owned());
        }
        for domain in &self.domains {
            out.push(format!("{domain}{path}"));
        }
    }
}

/// A service record joined with its current upstream set, as read from
/// authoritative state.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ServiceState {
    /// The authoritative service record.
    pub service: Service,

    /// The service's current upstreams.
    pub upstreams: Vec<UpstreamInfo>,
}
