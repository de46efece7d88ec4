//! `ExternalClient` implementations backed by the REST API.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::adapter::{
    ClusterAdapter, ClusterSpec, DatabaseAdapter, DatabaseSpec, DropletAdapter, DropletSpec,
    LoadBalancerAdapter, LoadBalancerSpec, RegistryAdapter, RegistrySpec,
};
use crate::error::{CloudError, CloudResult};
use crate::resource::{ConnectionDetails, Identity};

use super::ExternalClient;
use super::client::DigitalOceanClient;
use super::types::{
    Database, DatabaseCaEnvelope, DatabaseCreateRequest, DatabaseEnvelope, Droplet,
    DropletCreateRequest, DropletEnvelope, KubernetesCluster, KubernetesClusterCreateRequest,
    KubernetesClusterEnvelope, LoadBalancer, LoadBalancerEnvelope, LoadBalancerRequest,
    RegistryCreateRequest, RegistryEnvelope, RegistrySubscriptionUpdateRequest,
    RegistryWithSubscription, SubscriptionEnvelope,
};

/// Connection key under which the database CA certificate is published.
const CA_CERTIFICATE_KEY: &str = "ca-certificate";

/// Connection key under which the cluster kubeconfig is published.
const KUBECONFIG_KEY: &str = "kubeconfig";

fn droplet_id(identity: &Identity) -> CloudResult<i64> {
    identity
        .as_numeric()
        .ok_or_else(|| CloudError::invalid_id("dropletID"))
}

fn non_empty<'a>(identity: &'a Identity, argument: &str) -> CloudResult<&'a str> {
    if identity.is_empty() {
        Err(CloudError::invalid_id(argument))
    } else {
        Ok(identity.as_str())
    }
}

#[async_trait]
impl ExternalClient<DropletAdapter> for DigitalOceanClient {
    async fn get(&self, identity: &Identity, _spec: &DropletSpec) -> CloudResult<Droplet> {
        let id = droplet_id(identity)?;
        let envelope: DropletEnvelope = self.get_json(&format!("/v2/droplets/{id}")).await?;
        Ok(envelope.droplet)
    }

    async fn create(&self, request: &DropletCreateRequest) -> CloudResult<Droplet> {
        debug!("Creating droplet {}", request.name);
        let envelope: DropletEnvelope = self.post_json("/v2/droplets", request).await?;
        Ok(envelope.droplet)
    }

    async fn delete(&self, identity: &Identity, _spec: &DropletSpec) -> CloudResult<()> {
        let id = droplet_id(identity)?;
        self.delete_path(&format!("/v2/droplets/{id}")).await
    }
}

#[async_trait]
impl ExternalClient<DatabaseAdapter> for DigitalOceanClient {
    async fn get(&self, identity: &Identity, _spec: &DatabaseSpec) -> CloudResult<Database> {
        let id = non_empty(identity, "databaseID")?;
        let envelope: DatabaseEnvelope = self.get_json(&format!("/v2/databases/{id}")).await?;
        Ok(envelope.database)
    }

    async fn create(&self, request: &DatabaseCreateRequest) -> CloudResult<Database> {
        debug!("Creating database cluster {}", request.name);
        let envelope: DatabaseEnvelope = self.post_json("/v2/databases", request).await?;
        Ok(envelope.database)
    }

    async fn delete(&self, identity: &Identity, _spec: &DatabaseSpec) -> CloudResult<()> {
        let id = non_empty(identity, "databaseID")?;
        self.delete_path(&format!("/v2/databases/{id}")).await
    }

    async fn connection_extras(&self, remote: &Database) -> CloudResult<ConnectionDetails> {
        let mut details = ConnectionDetails::new();
        if !DatabaseAdapter::requires_ca(remote) {
            return Ok(details);
        }

        match self
            .get_json::<DatabaseCaEnvelope>(&format!("/v2/databases/{}/ca", remote.id))
            .await
        {
            Ok(envelope) if !envelope.ca.certificate.is_empty() => {
                details.insert(CA_CERTIFICATE_KEY.to_string(), envelope.ca.certificate);
            }
            Ok(_) => {}
            Err(e) => warn!("Could not fetch CA certificate for database {}: {e}", remote.id),
        }
        Ok(details)
    }
}

#[async_trait]
impl ExternalClient<LoadBalancerAdapter> for DigitalOceanClient {
    async fn get(&self, identity: &Identity, _spec: &LoadBalancerSpec) -> CloudResult<LoadBalancer> {
        let id = non_empty(identity, "lbID")?;
        let envelope: LoadBalancerEnvelope =
            self.get_json(&format!("/v2/load_balancers/{id}")).await?;
        Ok(envelope.load_balancer)
    }

    async fn create(&self, request: &LoadBalancerRequest) -> CloudResult<LoadBalancer> {
        debug!("Creating load balancer {}", request.name);
        let envelope: LoadBalancerEnvelope = self.post_json("/v2/load_balancers", request).await?;
        Ok(envelope.load_balancer)
    }

    async fn delete(&self, identity: &Identity, _spec: &LoadBalancerSpec) -> CloudResult<()> {
        let id = non_empty(identity, "lbID")?;
        self.delete_path(&format!("/v2/load_balancers/{id}")).await
    }
}

#[async_trait]
impl ExternalClient<ClusterAdapter> for DigitalOceanClient {
    async fn get(&self, identity: &Identity, _spec: &ClusterSpec) -> CloudResult<KubernetesCluster> {
        let id = non_empty(identity, "clusterID")?;
        let envelope: KubernetesClusterEnvelope =
            self.get_json(&format!("/v2/kubernetes/clusters/{id}")).await?;
        Ok(envelope.kubernetes_cluster)
    }

    async fn create(&self, request: &KubernetesClusterCreateRequest) -> CloudResult<KubernetesCluster> {
        debug!("Creating Kubernetes cluster {}", request.name);
        let envelope: KubernetesClusterEnvelope =
            self.post_json("/v2/kubernetes/clusters", request).await?;
        Ok(envelope.kubernetes_cluster)
    }

    async fn delete(&self, identity: &Identity, _spec: &ClusterSpec) -> CloudResult<()> {
        let id = non_empty(identity, "clusterID")?;
        self.delete_path(&format!("/v2/kubernetes/clusters/{id}")).await
    }

    async fn connection_extras(&self, remote: &KubernetesCluster) -> CloudResult<ConnectionDetails> {
        let kubeconfig = self
            .get_text(&format!("/v2/kubernetes/clusters/{}/kubeconfig", remote.id))
            .await?;
        Ok(ConnectionDetails::from([(KUBECONFIG_KEY.to_string(), kubeconfig)]))
    }
}

#[async_trait]
impl ExternalClient<RegistryAdapter> for DigitalOceanClient {
    /// The registry is account-wide, so the identity only gates the lookup.
    async fn get(
        &self,
        identity: &Identity,
        _spec: &RegistrySpec,
    ) -> CloudResult<RegistryWithSubscription> {
        non_empty(identity, "registryName")?;
        let registry: RegistryEnvelope = self.get_json("/v2/registry").await?;
        let subscription: SubscriptionEnvelope = self.get_json("/v2/registry/subscription").await?;
        Ok(RegistryWithSubscription {
            registry: registry.registry,
            subscription: Some(subscription.subscription),
        })
    }

    async fn create(&self, request: &RegistryCreateRequest) -> CloudResult<RegistryWithSubscription> {
        debug!("Creating container registry {}", request.name);
        let envelope: RegistryEnvelope = self.post_json("/v2/registry", request).await?;
        Ok(RegistryWithSubscription {
            registry: envelope.registry,
            subscription: None,
        })
    }

    async fn update(
        &self,
        _identity: &Identity,
        request: &RegistrySubscriptionUpdateRequest,
    ) -> CloudResult<()> {
        debug!("Updating registry subscription to {}", request.tier_slug);
        let _: SubscriptionEnvelope = self.post_json("/v2/registry/subscription", request).await?;
        Ok(())
    }

    async fn delete(&self, _identity: &Identity, _spec: &RegistrySpec) -> CloudResult<()> {
        self.delete_path("/v2/registry").await
    }
}
