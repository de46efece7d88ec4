//! Managed Kubernetes cluster adapter.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::cloud::{
    KubernetesCluster, KubernetesClusterCreateRequest, MaintenancePolicy, NodePoolCreateRequest,
    Taint,
};
use crate::resource::{Identity, LateInitializer, ResourceKind};

use super::ResourceAdapter;

/// Maintenance window day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaintenanceDay {
    /// Any day of the week.
    #[default]
    Any,
    /// Monday.
    Monday,
    /// Tuesday.
    Tuesday,
    /// Wednesday.
    Wednesday,
    /// Thursday.
    Thursday,
    /// Friday.
    Friday,
    /// Saturday.
    Saturday,
    /// Sunday.
    Sunday,
}

impl MaintenanceDay {
    /// Parses a day name; anything unrecognized means any day.
    #[must_use]
    pub fn from_param(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "monday" => Self::Monday,
            "tuesday" => Self::Tuesday,
            "wednesday" => Self::Wednesday,
            "thursday" => Self::Thursday,
            "friday" => Self::Friday,
            "saturday" => Self::Saturday,
            "sunday" => Self::Sunday,
            _ => Self::Any,
        }
    }

    /// Returns the day as the API spells it.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Monday => "monday",
            Self::Tuesday => "tuesday",
            Self::Wednesday => "wednesday",
            Self::Thursday => "thursday",
            Self::Friday => "friday",
            Self::Saturday => "saturday",
            Self::Sunday => "sunday",
        }
    }
}

/// Lifecycle state reported by the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterState {
    /// Serving.
    Running,
    /// Being created.
    Provisioning,
    /// Serving with reduced capacity.
    Degraded,
    /// Failed, or reported a state this client does not know.
    Error,
    /// Removed.
    Deleted,
    /// Upgrading to a new version.
    Upgrading,
    /// Being removed.
    Deleting,
}

impl ClusterState {
    /// Parses a state string; unknown values map to [`ClusterState::Error`].
    #[must_use]
    pub fn from_remote(value: &str) -> Self {
        match value {
            "running" => Self::Running,
            "provisioning" => Self::Provisioning,
            "degraded" => Self::Degraded,
            "deleted" => Self::Deleted,
            "upgrading" => Self::Upgrading,
            "deleting" => Self::Deleting,
            _ => Self::Error,
        }
    }

    /// Returns the state as the API spells it.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Provisioning => "provisioning",
            Self::Degraded => "degraded",
            Self::Error => "error",
            Self::Deleted => "deleted",
            Self::Upgrading => "upgrading",
            Self::Deleting => "deleting",
        }
    }
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Desired node pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePoolSpec {
    /// Size slug of the nodes.
    pub size: String,
    /// Pool name.
    pub name: String,
    /// Node count.
    pub count: u32,
    /// Tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Kubernetes labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Kubernetes taints.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub taints: Vec<Taint>,
    /// Enable autoscaling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_scale: Option<bool>,
    /// Autoscaling lower bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_nodes: Option<u32>,
    /// Autoscaling upper bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_nodes: Option<u32>,
}

/// Desired maintenance window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenancePolicySpec {
    /// Start time, `HH:MM`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    /// Day name; unrecognized values mean any day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<String>,
}

/// Desired configuration of a Kubernetes cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Region slug.
    pub region: String,
    /// Kubernetes version slug; a minor version selects its latest patch.
    pub version: String,
    /// VPC id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_uuid: Option<String>,
    /// Tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Worker node pools.
    pub node_pools: Vec<NodePoolSpec>,
    /// Maintenance window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_policy: Option<MaintenancePolicySpec>,
    /// Automatic patch upgrades.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_upgrade: Option<bool>,
    /// Surge upgrades.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surge_upgrade: Option<bool>,
    /// Highly available control plane.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highly_available: Option<bool>,
}

/// Observed node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedNode {
    /// Node id.
    pub id: String,
    /// Node name.
    pub name: String,
    /// Node state.
    pub state: String,
    /// Backing droplet id.
    pub droplet_id: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
}

/// Observed node pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedNodePool {
    /// Pool id.
    pub id: String,
    /// Pool name.
    pub name: String,
    /// Size slug.
    pub size: String,
    /// Node count.
    pub count: u32,
    /// Autoscaling enabled.
    pub auto_scale: bool,
    /// Autoscaling lower bound.
    pub min_nodes: u32,
    /// Autoscaling upper bound.
    pub max_nodes: u32,
    /// Tags.
    pub tags: Vec<String>,
    /// Kubernetes labels.
    pub labels: BTreeMap<String, String>,
    /// Kubernetes taints.
    pub taints: Vec<Taint>,
    /// Nodes.
    pub nodes: Vec<ObservedNode>,
}

/// Observed state of a Kubernetes cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterObservation {
    /// Cluster id.
    pub id: String,
    /// Cluster name.
    pub name: String,
    /// Region slug.
    pub region: String,
    /// Version slug.
    pub version: String,
    /// Pod network CIDR.
    pub cluster_subnet: String,
    /// Service network CIDR.
    pub service_subnet: String,
    /// VPC id.
    pub vpc_uuid: String,
    /// Control plane IPv4.
    pub ipv4: String,
    /// API server endpoint.
    pub endpoint: String,
    /// Tags.
    pub tags: Vec<String>,
    /// Node pools.
    pub node_pools: Vec<ObservedNodePool>,
    /// Maintenance day.
    pub maintenance_day: MaintenanceDay,
    /// Maintenance start time.
    pub maintenance_start_time: String,
    /// Maintenance window duration.
    pub maintenance_duration: String,
    /// Automatic patch upgrades.
    pub auto_upgrade: bool,
    /// Surge upgrades.
    pub surge_upgrade: bool,
    /// Highly available control plane.
    pub highly_available: bool,
    /// Registry integration.
    pub registry_enabled: bool,
    /// Lifecycle state.
    pub state: ClusterState,
    /// State message.
    pub status_message: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
}

/// Adapter for managed Kubernetes clusters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClusterAdapter;

fn node_pool_request(pool: &NodePoolSpec) -> NodePoolCreateRequest {
    NodePoolCreateRequest {
        size: pool.size.clone(),
        name: pool.name.clone(),
        count: pool.count,
        tags: pool.tags.clone(),
        labels: pool.labels.clone(),
        taints: pool.taints.clone(),
        auto_scale: pool.auto_scale.unwrap_or(false),
        min_nodes: pool.min_nodes.unwrap_or(0),
        max_nodes: pool.max_nodes.unwrap_or(0),
    }
}

impl ResourceAdapter for ClusterAdapter {
    type Spec = ClusterSpec;
    type Remote = KubernetesCluster;
    type Observation = ClusterObservation;
    type CreateRequest = KubernetesClusterCreateRequest;
    type UpdateRequest = ();

    const KIND: ResourceKind = ResourceKind::KubernetesCluster;

    fn build_create_request(&self, name: &str, spec: &ClusterSpec) -> KubernetesClusterCreateRequest {
        KubernetesClusterCreateRequest {
            name: name.to_string(),
            region: spec.region.clone(),
            version: spec.version.clone(),
            vpc_uuid: spec.vpc_uuid.clone(),
            tags: spec.tags.clone(),
            node_pools: spec.node_pools.iter().map(node_pool_request).collect(),
            maintenance_policy: spec.maintenance_policy.as_ref().map(|p| MaintenancePolicy {
                start_time: p.start_time.clone().unwrap_or_default(),
                duration: String::new(),
                day: MaintenanceDay::from_param(p.day.as_deref().unwrap_or_default())
                    .as_str()
                    .to_string(),
            }),
            auto_upgrade: spec.auto_upgrade.unwrap_or(false),
            surge_upgrade: spec.surge_upgrade.unwrap_or(false),
            ha: spec.highly_available.unwrap_or(false),
        }
    }

    fn identity(&self, remote: &KubernetesCluster) -> Identity {
        Identity::new(remote.id.clone())
    }

    fn to_observation(&self, remote: &KubernetesCluster) -> ClusterObservation {
        let policy = remote.maintenance_policy.clone().unwrap_or_default();
        ClusterObservation {
            id: remote.id.clone(),
            name: remote.name.clone(),
            region: remote.region.clone(),
            version: remote.version.clone(),
            cluster_subnet: remote.cluster_subnet.clone(),
            service_subnet: remote.service_subnet.clone(),
            vpc_uuid: remote.vpc_uuid.clone(),
            ipv4: remote.ipv4.clone(),
            endpoint: remote.endpoint.clone(),
            tags: remote.tags.clone(),
            node_pools: remote
                .node_pools
                .iter()
                .map(|p| ObservedNodePool {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    size: p.size.clone(),
                    count: p.count,
                    auto_scale: p.auto_scale,
                    min_nodes: p.min_nodes,
                    max_nodes: p.max_nodes,
                    tags: p.tags.clone(),
                    labels: p.labels.clone(),
                    taints: p.taints.clone(),
                    nodes: p
                        .nodes
                        .iter()
                        .map(|n| ObservedNode {
                            id: n.id.clone(),
                            name: n.name.clone(),
                            state: n.status.state.clone(),
                            droplet_id: n.droplet_id.clone(),
                            created_at: n.created_at.clone(),
                            updated_at: n.updated_at.clone(),
                        })
                        .collect(),
                })
                .collect(),
            maintenance_day: MaintenanceDay::from_param(&policy.day),
            maintenance_start_time: policy.start_time,
            maintenance_duration: policy.duration,
            auto_upgrade: remote.auto_upgrade,
            surge_upgrade: remote.surge_upgrade,
            highly_available: remote.ha,
            registry_enabled: remote.registry_enabled,
            state: ClusterState::from_remote(&remote.status.state),
            status_message: remote.status.message.clone(),
            created_at: remote.created_at.clone(),
            updated_at: remote.updated_at.clone(),
        }
    }

    fn late_init(&self, spec: &mut ClusterSpec, remote: &KubernetesCluster) -> bool {
        let mut li = LateInitializer::new();
        li.string("vpc_uuid", &mut spec.vpc_uuid, &remote.vpc_uuid);
        li.list("tags", &mut spec.tags, &remote.tags);
        li.flag("auto_upgrade", &mut spec.auto_upgrade, remote.auto_upgrade);
        li.flag("surge_upgrade", &mut spec.surge_upgrade, remote.surge_upgrade);
        li.flag("highly_available", &mut spec.highly_available, remote.ha);
        li.changed()
    }

    fn remote_status<'a>(&self, observation: &'a ClusterObservation) -> Option<&'a str> {
        Some(observation.state.as_str())
    }
}
