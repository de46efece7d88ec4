//! Kind-independent resource types.
//!
//! These are the values threaded through every tick: the server-assigned
//! identity, the coarse condition, and the per-tick reconcile result.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Server-assigned reference to a remote object.
///
/// Absent until the first successful create and never reassigned afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wraps a raw identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the identifier as a positive integer, as numeric APIs expect.
    #[must_use]
    pub fn as_numeric(&self) -> Option<i64> {
        self.0.parse::<i64>().ok().filter(|id| *id >= 1)
    }

    /// Returns true if the identifier is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Identity {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

/// Coarse, kind-independent status shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    /// The remote object is being provisioned.
    Creating,
    /// The remote object is ready for use.
    Available,
    /// The remote object exists but is not serving.
    Unavailable,
    /// The remote object is being removed.
    Deleting,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Creating => "Creating",
            Self::Available => "Available",
            Self::Unavailable => "Unavailable",
            Self::Deleting => "Deleting",
        };
        write!(f, "{s}")
    }
}

/// Managed resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Compute instance.
    Droplet,
    /// Managed database cluster.
    Database,
    /// Load balancer.
    LoadBalancer,
    /// Managed Kubernetes cluster.
    KubernetesCluster,
    /// Account-wide container registry.
    ContainerRegistry,
    /// Object-storage bucket.
    Space,
}

impl ResourceKind {
    /// Returns the kind as it appears in manifests.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Droplet => "droplet",
            Self::Database => "database",
            Self::LoadBalancer => "load_balancer",
            Self::KubernetesCluster => "kubernetes_cluster",
            Self::ContainerRegistry => "container_registry",
            Self::Space => "space",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The last mutating call issued for a resource in the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LastOperation {
    /// A create request was accepted.
    Create,
    /// An update request was accepted.
    Update,
    /// A delete request was accepted.
    Delete,
}

impl fmt::Display for LastOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

/// Connection material published for a resource, keyed by secret name.
pub type ConnectionDetails = BTreeMap<String, String>;

/// Outcome flags of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileResult {
    /// Whether the remote object exists.
    pub exists: bool,
    /// Whether the remote object matches the desired spec.
    pub up_to_date: bool,
    /// Why the remote object is not up to date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_reason: Option<String>,
    /// Whether the caller must persist the spec or identity before the next tick.
    pub needs_persist: bool,
}
