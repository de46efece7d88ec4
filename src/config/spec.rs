//! Manifest types.
//!
//! This module defines the structs that map to `reefline.yaml`. A manifest
//! declares a project, provider settings, where state is kept, and the list
//! of resources with their desired specs.

use serde::{Deserialize, Serialize};

use crate::adapter::{
    ClusterSpec, DatabaseSpec, DropletSpec, LoadBalancerSpec, RegistrySpec, SpaceSpec,
};
use crate::cloud::{DEFAULT_API_URL, DEFAULT_TIMEOUT_SECS};
use crate::resource::ResourceKind;

/// The root of a `reefline.yaml` manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    /// Project-level configuration.
    pub project: ProjectConfig,
    /// API endpoints and timeouts.
    #[serde(default)]
    pub provider: ProviderConfig,
    /// State storage configuration.
    #[serde(default)]
    pub state: StateConfig,
    /// Declared resources.
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

/// Project-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Project name, used to label state.
    pub name: String,
}

/// Provider endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Base URL of the REST API.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Fixed object-storage endpoint; regional endpoints are used when unset.
    #[serde(default)]
    pub spaces_endpoint: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout_secs: default_timeout_secs(),
            spaces_endpoint: None,
        }
    }
}

/// Local state storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    /// Directory holding state, lock and connection files.
    #[serde(default = "default_state_path")]
    pub path: String,
    /// Seconds after which a lock is considered stale.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
            lock_ttl_secs: default_lock_ttl_secs(),
        }
    }
}

/// One declared resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceConfig {
    /// Logical name, unique within the manifest.
    pub name: String,
    /// Name of the remote object, when it differs from `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_name: Option<String>,
    /// Write connection details to the state directory.
    #[serde(default)]
    pub publish_connection: bool,
    /// Desired spec, tagged by kind.
    pub spec: ResourceSpec,
}

/// Desired spec of any supported kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceSpec {
    /// Compute instance.
    Droplet(DropletSpec),
    /// Managed database cluster.
    Database(DatabaseSpec),
    /// Load balancer.
    LoadBalancer(LoadBalancerSpec),
    /// Managed Kubernetes cluster.
    KubernetesCluster(ClusterSpec),
    /// Container registry.
    ContainerRegistry(RegistrySpec),
    /// Object-storage bucket.
    Space(SpaceSpec),
}

impl ResourceSpec {
    /// Returns the kind of this spec.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Droplet(_) => ResourceKind::Droplet,
            Self::Database(_) => ResourceKind::Database,
            Self::LoadBalancer(_) => ResourceKind::LoadBalancer,
            Self::KubernetesCluster(_) => ResourceKind::KubernetesCluster,
            Self::ContainerRegistry(_) => ResourceKind::ContainerRegistry,
            Self::Space(_) => ResourceKind::Space,
        }
    }

    /// Returns the region the resource lives in, if the kind has one.
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        match self {
            Self::Droplet(s) => Some(&s.region),
            Self::Database(s) => Some(&s.region),
            Self::LoadBalancer(s) => Some(&s.region),
            Self::KubernetesCluster(s) => Some(&s.region),
            Self::ContainerRegistry(s) => s.region.as_deref(),
            Self::Space(s) => Some(&s.region),
        }
    }
}

impl Manifest {
    /// Looks up a resource by logical name.
    #[must_use]
    pub fn resource(&self, name: &str) -> Option<&ResourceConfig> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Returns true if any resource has the given kind.
    #[must_use]
    pub fn declares(&self, kind: ResourceKind) -> bool {
        self.resources.iter().any(|r| r.spec.kind() == kind)
    }

    /// Returns the logical names in declaration order.
    #[must_use]
    pub fn resource_names(&self) -> Vec<&str> {
        self.resources.iter().map(|r| r.name.as_str()).collect()
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_state_path() -> String {
    String::from(".reefline")
}

const fn default_lock_ttl_secs() -> u64 {
    3600
}
