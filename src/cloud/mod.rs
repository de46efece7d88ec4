//! External clients for the cloud APIs.
//!
//! This module provides:
//! - The `ExternalClient` contract the engine calls through
//! - A reqwest-based client for the DigitalOcean REST API
//! - An S3 client for Spaces buckets
//! - The wire types of the REST API

mod client;
mod resources;
mod spaces;
mod types;

pub use client::{DEFAULT_API_URL, DEFAULT_TIMEOUT_SECS, DigitalOceanClient};
pub use spaces::{SPACES_SIGNING_REGION, SpacesClient, spaces_endpoint};
pub use types::{
    Database, DatabaseCa, DatabaseConnection, DatabaseCreateRequest, DatabaseMaintenanceWindow,
    DatabaseMySqlSettings, DatabaseUser, Droplet, DropletCreateRequest, DropletImage,
    ForwardingRule, HealthCheck, ImageRef, KubernetesCluster, KubernetesClusterCreateRequest,
    KubernetesNode, KubernetesNodePool, KubernetesStatus, LoadBalancer, LoadBalancerRequest,
    MaintenancePolicy, NodePoolCreateRequest, RegionRef, Registry, RegistryCreateRequest,
    RegistrySubscriptionUpdateRequest, RegistryWithSubscription, SshKeyRef, Subscription,
    SubscriptionTier, Taint,
};

use async_trait::async_trait;

use crate::adapter::{
    ClusterAdapter, DatabaseAdapter, DropletAdapter, LoadBalancerAdapter, RegistryAdapter,
    ResourceAdapter, SpaceAdapter,
};
use crate::error::{CloudError, CloudResult};
use crate::resource::{ConnectionDetails, Identity};

/// Network access for one resource kind.
///
/// The spec is passed alongside the identity for kinds whose endpoint
/// depends on it, such as the region of a bucket.
#[async_trait]
pub trait ExternalClient<A: ResourceAdapter>: Send + Sync {
    /// Fetches the remote object.
    async fn get(&self, identity: &Identity, spec: &A::Spec) -> CloudResult<A::Remote>;

    /// Creates the remote object.
    async fn create(&self, request: &A::CreateRequest) -> CloudResult<A::Remote>;

    /// Updates the remote object in place.
    async fn update(&self, _identity: &Identity, _request: &A::UpdateRequest) -> CloudResult<()> {
        Err(CloudError::Unsupported {
            operation: format!("update {}", A::KIND),
        })
    }

    /// Deletes the remote object.
    async fn delete(&self, identity: &Identity, spec: &A::Spec) -> CloudResult<()>;

    /// Fetches connection material that is not part of the remote object.
    /// Only called when the resource publishes connection details.
    async fn connection_extras(&self, _remote: &A::Remote) -> CloudResult<ConnectionDetails> {
        Ok(ConnectionDetails::new())
    }
}

/// One client per resource kind.
pub trait ClientSet: Send + Sync {
    /// Droplet client.
    type Droplets: ExternalClient<DropletAdapter>;
    /// Database client.
    type Databases: ExternalClient<DatabaseAdapter>;
    /// Load balancer client.
    type LoadBalancers: ExternalClient<LoadBalancerAdapter>;
    /// Kubernetes cluster client.
    type Clusters: ExternalClient<ClusterAdapter>;
    /// Container registry client.
    type Registry: ExternalClient<RegistryAdapter>;
    /// Bucket client.
    type Spaces: ExternalClient<SpaceAdapter>;

    /// Returns the droplet client.
    fn droplets(&self) -> &Self::Droplets;
    /// Returns the database client.
    fn databases(&self) -> &Self::Databases;
    /// Returns the load balancer client.
    fn load_balancers(&self) -> &Self::LoadBalancers;
    /// Returns the Kubernetes cluster client.
    fn clusters(&self) -> &Self::Clusters;
    /// Returns the container registry client.
    fn registry(&self) -> &Self::Registry;
    /// Returns the bucket client.
    fn spaces(&self) -> &Self::Spaces;
}

/// Production client set.
#[derive(Debug, Clone)]
pub struct CloudClients {
    api: DigitalOceanClient,
    spaces: SpacesClient,
}

impl CloudClients {
    /// Groups a REST client and a Spaces client.
    #[must_use]
    pub const fn new(api: DigitalOceanClient, spaces: SpacesClient) -> Self {
        Self { api, spaces }
    }
}

impl ClientSet for CloudClients {
    type Droplets = DigitalOceanClient;
    type Databases = DigitalOceanClient;
    type LoadBalancers = DigitalOceanClient;
    type Clusters = DigitalOceanClient;
    type Registry = DigitalOceanClient;
    type Spaces = SpacesClient;

    fn droplets(&self) -> &DigitalOceanClient {
        &self.api
    }

    fn databases(&self) -> &DigitalOceanClient {
        &self.api
    }

    fn load_balancers(&self) -> &DigitalOceanClient {
        &self.api
    }

    fn clusters(&self) -> &DigitalOceanClient {
        &self.api
    }

    fn registry(&self) -> &DigitalOceanClient {
        &self.api
    }

    fn spaces(&self) -> &SpacesClient {
        &self.spaces
    }
}
