//! DigitalOcean API wire types.
//!
//! Request bodies and response objects exactly as the REST API encodes them.
//! Response types default every field so partial payloads still decode.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Shared
// ============================================================================

/// A region reference embedded in responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRef {
    /// Region slug, e.g. `nyc1`.
    #[serde(default)]
    pub slug: String,
    /// Human readable region name.
    #[serde(default)]
    pub name: String,
}

// ============================================================================
// Droplets
// ============================================================================

/// Image reference for droplet creation: a numeric id or a slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ImageRef {
    /// Numeric image id (snapshots, custom images).
    Id(i64),
    /// Public image slug.
    Slug(String),
}

impl ImageRef {
    /// Interprets a user value as an id when it parses as an integer.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        value
            .parse::<i64>()
            .map_or_else(|_| Self::Slug(value.to_string()), Self::Id)
    }

    /// Returns the numeric id, if any.
    #[must_use]
    pub const fn id(&self) -> Option<i64> {
        match self {
            Self::Id(id) => Some(*id),
            Self::Slug(_) => None,
        }
    }

    /// Returns the slug, or an empty string for numeric references.
    #[must_use]
    pub fn slug(&self) -> &str {
        match self {
            Self::Id(_) => "",
            Self::Slug(slug) => slug,
        }
    }
}

/// SSH key reference for droplet creation: a numeric id or a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SshKeyRef {
    /// Numeric key id.
    Id(i64),
    /// Key fingerprint.
    Fingerprint(String),
}

impl SshKeyRef {
    /// Interprets a user value as an id when it parses as an integer.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        value
            .parse::<i64>()
            .map_or_else(|_| Self::Fingerprint(value.to_string()), Self::Id)
    }
}

/// Body of `POST /v2/droplets`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DropletCreateRequest {
    /// Droplet name.
    pub name: String,
    /// Region slug.
    pub region: String,
    /// Size slug.
    pub size: String,
    /// Image to boot from.
    pub image: ImageRef,
    /// SSH keys to embed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<SshKeyRef>,
    /// Enable backups.
    pub backups: bool,
    /// Enable IPv6.
    pub ipv6: bool,
    /// Enable private networking.
    pub private_networking: bool,
    /// Enable the monitoring agent.
    pub monitoring: bool,
    /// Volume ids to attach.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    /// Tags to apply.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// VPC to place the droplet in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_uuid: Option<String>,
    /// Install the droplet agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub with_droplet_agent: Option<bool>,
    /// Cloud-init user data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
}

/// Image information embedded in a droplet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropletImage {
    /// Image id.
    #[serde(default)]
    pub id: i64,
    /// Image slug, empty for private images.
    #[serde(default)]
    pub slug: Option<String>,
    /// Image name.
    #[serde(default)]
    pub name: String,
}

/// A droplet as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Droplet {
    /// Droplet id.
    #[serde(default)]
    pub id: i64,
    /// Droplet name.
    #[serde(default)]
    pub name: String,
    /// Memory in MiB.
    #[serde(default)]
    pub memory: u64,
    /// Number of vCPUs.
    #[serde(default)]
    pub vcpus: u32,
    /// Disk size in GiB.
    #[serde(default)]
    pub disk: u64,
    /// Status: `new`, `active`, `off` or `archive`.
    #[serde(default)]
    pub status: String,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: String,
    /// Enabled features.
    #[serde(default)]
    pub features: Vec<String>,
    /// Boot image.
    #[serde(default)]
    pub image: DropletImage,
    /// Size slug.
    #[serde(default)]
    pub size_slug: String,
    /// Region.
    #[serde(default)]
    pub region: RegionRef,
    /// Attached volume ids.
    #[serde(default)]
    pub volume_ids: Vec<String>,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// VPC id.
    #[serde(default)]
    pub vpc_uuid: String,
}

// ============================================================================
// Databases
// ============================================================================

/// Body of `POST /v2/databases`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseCreateRequest {
    /// Cluster name.
    pub name: String,
    /// Engine slug (`pg`, `mysql`, `redis`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    /// Engine version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Size slug of each node.
    pub size: String,
    /// Region slug.
    pub region: String,
    /// Number of nodes.
    pub num_nodes: u32,
    /// VPC to place the cluster in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_network_uuid: Option<String>,
    /// Tags to apply.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Connection parameters of a database endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConnection {
    /// Full connection URI.
    #[serde(default)]
    pub uri: String,
    /// Default database name.
    #[serde(default)]
    pub database: String,
    /// Host name.
    #[serde(default)]
    pub host: String,
    /// Port.
    #[serde(default)]
    pub port: u16,
    /// User name.
    #[serde(default)]
    pub user: String,
    /// Password.
    #[serde(default)]
    pub password: String,
    /// Whether TLS is required.
    #[serde(default)]
    pub ssl: bool,
}

/// MySQL specific user settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseMySqlSettings {
    /// Authentication plugin.
    #[serde(default)]
    pub auth_plugin: String,
}

/// A database user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseUser {
    /// User name.
    #[serde(default)]
    pub name: String,
    /// Role (`primary` or `normal`).
    #[serde(default)]
    pub role: String,
    /// Password.
    #[serde(default)]
    pub password: String,
    /// MySQL settings, when applicable.
    #[serde(default)]
    pub mysql_settings: Option<DatabaseMySqlSettings>,
}

/// Maintenance window of a database cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseMaintenanceWindow {
    /// Day of the week.
    #[serde(default)]
    pub day: String,
    /// Start hour, `HH:MM:SS`.
    #[serde(default)]
    pub hour: String,
    /// Whether maintenance is pending.
    #[serde(default)]
    pub pending: bool,
    /// Pending maintenance items.
    #[serde(default)]
    pub description: Vec<String>,
}

/// A database cluster as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Database {
    /// Cluster id.
    #[serde(default)]
    pub id: String,
    /// Cluster name.
    #[serde(default)]
    pub name: String,
    /// Engine slug.
    #[serde(default)]
    pub engine: String,
    /// Engine version.
    #[serde(default)]
    pub version: String,
    /// Public connection parameters.
    #[serde(default)]
    pub connection: Option<DatabaseConnection>,
    /// Private network connection parameters.
    #[serde(default)]
    pub private_connection: Option<DatabaseConnection>,
    /// Users.
    #[serde(default)]
    pub users: Vec<DatabaseUser>,
    /// Database names.
    #[serde(default)]
    pub db_names: Vec<String>,
    /// Number of nodes.
    #[serde(default)]
    pub num_nodes: u32,
    /// Region slug.
    #[serde(default)]
    pub region: String,
    /// Status: `creating`, `online`, `resizing`, `migrating` or `forking`.
    #[serde(default)]
    pub status: String,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: String,
    /// Maintenance window.
    #[serde(default)]
    pub maintenance_window: Option<DatabaseMaintenanceWindow>,
    /// Size slug.
    #[serde(default)]
    pub size: String,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// VPC id.
    #[serde(default)]
    pub private_network_uuid: String,
}

/// CA certificate of a database cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseCa {
    /// Base64 encoded PEM certificate.
    #[serde(default)]
    pub certificate: String,
}

// ============================================================================
// Load balancers
// ============================================================================

/// A forwarding rule of a load balancer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingRule {
    /// Protocol on the public side.
    pub entry_protocol: String,
    /// Port on the public side.
    pub entry_port: u16,
    /// Protocol towards the targets.
    pub target_protocol: String,
    /// Port on the targets.
    pub target_port: u16,
}

/// Health check of a load balancer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Protocol used for probes.
    pub protocol: String,
    /// Port probed on the targets.
    pub port: u16,
    /// Seconds between probes.
    pub check_interval_seconds: u32,
    /// Seconds before a probe times out.
    pub response_timeout_seconds: u32,
    /// Failed probes before a target is removed.
    pub unhealthy_threshold: u32,
    /// Passed probes before a target is added back.
    pub healthy_threshold: u32,
}

/// Body of `POST /v2/load_balancers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadBalancerRequest {
    /// Load balancer name.
    pub name: String,
    /// Region slug.
    pub region: String,
    /// Balancing algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    /// Forwarding rules.
    pub forwarding_rules: Vec<ForwardingRule>,
    /// Health check.
    pub health_check: HealthCheck,
    /// Tags to apply.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// VPC to place the load balancer in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_uuid: Option<String>,
}

/// A load balancer as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancer {
    /// Load balancer id.
    #[serde(default)]
    pub id: String,
    /// Name.
    #[serde(default)]
    pub name: String,
    /// Public IP address.
    #[serde(default)]
    pub ip: String,
    /// Balancing algorithm.
    #[serde(default)]
    pub algorithm: String,
    /// Status: `new`, `active` or `errored`.
    #[serde(default)]
    pub status: String,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: String,
    /// Forwarding rules.
    #[serde(default)]
    pub forwarding_rules: Vec<ForwardingRule>,
    /// Health check.
    #[serde(default)]
    pub health_check: Option<HealthCheck>,
    /// Region.
    #[serde(default)]
    pub region: RegionRef,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// VPC id.
    #[serde(default)]
    pub vpc_uuid: String,
}

// ============================================================================
// Kubernetes
// ============================================================================

/// A node taint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taint {
    /// Taint key.
    pub key: String,
    /// Taint value.
    #[serde(default)]
    pub value: String,
    /// Taint effect (`NoSchedule`, `PreferNoSchedule`, `NoExecute`).
    pub effect: String,
}

/// A node pool in a cluster create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodePoolCreateRequest {
    /// Size slug of the nodes.
    pub size: String,
    /// Pool name.
    pub name: String,
    /// Node count.
    pub count: u32,
    /// Tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Kubernetes labels.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Kubernetes taints.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub taints: Vec<Taint>,
    /// Enable autoscaling.
    pub auto_scale: bool,
    /// Autoscaling lower bound.
    pub min_nodes: u32,
    /// Autoscaling upper bound.
    pub max_nodes: u32,
}

/// Maintenance policy of a cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenancePolicy {
    /// Start time, `HH:MM`.
    #[serde(default)]
    pub start_time: String,
    /// Window duration, read only.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub duration: String,
    /// Day of the week or `any`.
    #[serde(default)]
    pub day: String,
}

/// Body of `POST /v2/kubernetes/clusters`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KubernetesClusterCreateRequest {
    /// Cluster name.
    pub name: String,
    /// Region slug.
    pub region: String,
    /// Kubernetes version slug.
    pub version: String,
    /// VPC to place the cluster in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_uuid: Option<String>,
    /// Tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Node pools.
    pub node_pools: Vec<NodePoolCreateRequest>,
    /// Maintenance policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance_policy: Option<MaintenancePolicy>,
    /// Enable automatic patch upgrades.
    pub auto_upgrade: bool,
    /// Enable surge upgrades.
    pub surge_upgrade: bool,
    /// Enable the highly available control plane.
    pub ha: bool,
}

/// Status of a cluster or node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesStatus {
    /// State string.
    #[serde(default)]
    pub state: String,
    /// Human readable message.
    #[serde(default)]
    pub message: String,
}

/// A node of a node pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesNode {
    /// Node id.
    #[serde(default)]
    pub id: String,
    /// Node name.
    #[serde(default)]
    pub name: String,
    /// Node status.
    #[serde(default)]
    pub status: KubernetesStatus,
    /// Backing droplet id.
    #[serde(default)]
    pub droplet_id: String,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: String,
    /// Last update timestamp.
    #[serde(default)]
    pub updated_at: String,
}

/// A node pool as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesNodePool {
    /// Pool id.
    #[serde(default)]
    pub id: String,
    /// Pool name.
    #[serde(default)]
    pub name: String,
    /// Size slug.
    #[serde(default)]
    pub size: String,
    /// Node count.
    #[serde(default)]
    pub count: u32,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Kubernetes labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Kubernetes taints.
    #[serde(default)]
    pub taints: Vec<Taint>,
    /// Autoscaling enabled.
    #[serde(default)]
    pub auto_scale: bool,
    /// Autoscaling lower bound.
    #[serde(default)]
    pub min_nodes: u32,
    /// Autoscaling upper bound.
    #[serde(default)]
    pub max_nodes: u32,
    /// Nodes.
    #[serde(default)]
    pub nodes: Vec<KubernetesNode>,
}

/// A cluster as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesCluster {
    /// Cluster id.
    #[serde(default)]
    pub id: String,
    /// Cluster name.
    #[serde(default)]
    pub name: String,
    /// Region slug.
    #[serde(default)]
    pub region: String,
    /// Kubernetes version slug.
    #[serde(default)]
    pub version: String,
    /// Pod network CIDR.
    #[serde(default)]
    pub cluster_subnet: String,
    /// Service network CIDR.
    #[serde(default)]
    pub service_subnet: String,
    /// VPC id.
    #[serde(default)]
    pub vpc_uuid: String,
    /// Public IPv4 of the control plane.
    #[serde(default)]
    pub ipv4: String,
    /// API server endpoint.
    #[serde(default)]
    pub endpoint: String,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Node pools.
    #[serde(default)]
    pub node_pools: Vec<KubernetesNodePool>,
    /// Maintenance policy.
    #[serde(default)]
    pub maintenance_policy: Option<MaintenancePolicy>,
    /// Automatic patch upgrades enabled.
    #[serde(default)]
    pub auto_upgrade: bool,
    /// Cluster status.
    #[serde(default)]
    pub status: KubernetesStatus,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: String,
    /// Last update timestamp.
    #[serde(default)]
    pub updated_at: String,
    /// Surge upgrades enabled.
    #[serde(default)]
    pub surge_upgrade: bool,
    /// Highly available control plane.
    #[serde(default)]
    pub ha: bool,
    /// Registry integration enabled.
    #[serde(default)]
    pub registry_enabled: bool,
}

// ============================================================================
// Container registry
// ============================================================================

/// Body of `POST /v2/registry`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryCreateRequest {
    /// Registry name.
    pub name: String,
    /// Subscription tier slug.
    pub subscription_tier_slug: String,
    /// Region slug.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// Body of `POST /v2/registry/subscription`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrySubscriptionUpdateRequest {
    /// Target tier slug.
    pub tier_slug: String,
}

/// The account's registry as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    /// Registry name.
    #[serde(default)]
    pub name: String,
    /// Bytes stored.
    #[serde(default)]
    pub storage_usage_bytes: u64,
    /// When the storage usage was measured.
    #[serde(default)]
    pub storage_usage_bytes_updated_at: String,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: String,
    /// Region slug.
    #[serde(default)]
    pub region: String,
}

/// A registry subscription tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionTier {
    /// Tier name.
    #[serde(default)]
    pub name: String,
    /// Tier slug.
    #[serde(default)]
    pub slug: String,
    /// Repositories included.
    #[serde(default)]
    pub included_repositories: u64,
    /// Storage included.
    #[serde(default)]
    pub included_storage_bytes: u64,
    /// Whether storage above the allowance is billed.
    #[serde(default)]
    pub allow_storage_overage: bool,
    /// Bandwidth included.
    #[serde(default)]
    pub included_bandwidth_bytes: u64,
    /// Monthly price in cents.
    #[serde(default)]
    pub monthly_price_in_cents: u64,
}

/// The account's registry subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Current tier.
    #[serde(default)]
    pub tier: SubscriptionTier,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: String,
    /// Last update timestamp.
    #[serde(default)]
    pub updated_at: String,
}

/// A registry together with its subscription.
///
/// The subscription is absent right after creation because the create
/// endpoint does not return it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryWithSubscription {
    /// The registry.
    pub registry: Registry,
    /// Its subscription.
    pub subscription: Option<Subscription>,
}

// ============================================================================
// Response envelopes
// ============================================================================

/// `{"droplet": ...}`
#[derive(Debug, Deserialize)]
pub(crate) struct DropletEnvelope {
    pub droplet: Droplet,
}

/// `{"database": ...}`
#[derive(Debug, Deserialize)]
pub(crate) struct DatabaseEnvelope {
    pub database: Database,
}

/// `{"ca": ...}`
#[derive(Debug, Deserialize)]
pub(crate) struct DatabaseCaEnvelope {
    pub ca: DatabaseCa,
}

/// `{"load_balancer": ...}`
#[derive(Debug, Deserialize)]
pub(crate) struct LoadBalancerEnvelope {
    pub load_balancer: LoadBalancer,
}

/// `{"kubernetes_cluster": ...}`
#[derive(Debug, Deserialize)]
pub(crate) struct KubernetesClusterEnvelope {
    pub kubernetes_cluster: KubernetesCluster,
}

/// `{"registry": ...}`
#[derive(Debug, Deserialize)]
pub(crate) struct RegistryEnvelope {
    pub registry: Registry,
}

/// `{"subscription": ...}`
#[derive(Debug, Deserialize)]
pub(crate) struct SubscriptionEnvelope {
    pub subscription: Subscription,
}

/// Error body returned by the API.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub message: String,
}
