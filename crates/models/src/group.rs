use serde::{Deserialize, Serialize};

/// A named cluster of load-balancer instances sharing configuration and an
/// optional default domain.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Group {
    /// The unique group name.
    pub name: String,

    /// Domain implied for services in this group that do not carry one of
    /// their own. Relative paths beginning with this domain are also tracked
    /// under the bare path key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_domain: Option<String>,
}

impl Group {
    /// Creates a group without a default domain.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_domain: None,
        }
    }

    /// Creates a group with a default domain.
    #[must_use]
    pub fn with_default_domain(name: impl Into<String>, default_domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_domain: Some(default_domain.into()),
        }
    }
}
