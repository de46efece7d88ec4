//! Compute droplet adapter.

use serde::{Deserialize, Serialize};

use crate::cloud::{Droplet, DropletCreateRequest, ImageRef, SshKeyRef};
use crate::resource::{Identity, LateInitializer, ResourceKind};

use super::ResourceAdapter;

/// Desired configuration of a droplet. Every field is immutable after create.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropletSpec {
    /// Region slug.
    pub region: String,
    /// Size slug.
    pub size: String,
    /// Image slug or numeric image id.
    pub image: String,
    /// SSH key fingerprints or numeric key ids.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<String>,
    /// Enable backups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backups: Option<bool>,
    /// Enable IPv6.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<bool>,
    /// Enable private networking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_networking: Option<bool>,
    /// Enable the monitoring agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring: Option<bool>,
    /// Install the droplet agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_droplet_agent: Option<bool>,
    /// Volume ids to attach.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    /// Tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// VPC id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_uuid: Option<String>,
    /// Cloud-init user data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
}

/// Observed state of a droplet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropletObservation {
    /// Droplet id.
    pub id: i64,
    /// Droplet name.
    pub name: String,
    /// Remote status.
    pub status: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Region slug.
    pub region: String,
    /// Size slug.
    pub size: String,
    /// Memory in MiB.
    pub memory: u64,
    /// Number of vCPUs.
    pub vcpus: u32,
    /// Disk in GiB.
    pub disk: u64,
}

/// Adapter for compute droplets.
#[derive(Debug, Clone, Copy, Default)]
pub struct DropletAdapter;

impl ResourceAdapter for DropletAdapter {
    type Spec = DropletSpec;
    type Remote = Droplet;
    type Observation = DropletObservation;
    type CreateRequest = DropletCreateRequest;
    type UpdateRequest = ();

    const KIND: ResourceKind = ResourceKind::Droplet;

    fn build_create_request(&self, name: &str, spec: &DropletSpec) -> DropletCreateRequest {
        DropletCreateRequest {
            name: name.to_string(),
            region: spec.region.clone(),
            size: spec.size.clone(),
            image: ImageRef::parse(&spec.image),
            ssh_keys: spec.ssh_keys.iter().map(|k| SshKeyRef::parse(k)).collect(),
            backups: spec.backups.unwrap_or(false),
            ipv6: spec.ipv6.unwrap_or(false),
            private_networking: spec.private_networking.unwrap_or(false),
            monitoring: spec.monitoring.unwrap_or(false),
            volumes: spec
                .volumes
                .iter()
                .filter(|v| !v.is_empty())
                .cloned()
                .collect(),
            tags: spec.tags.clone(),
            vpc_uuid: spec.vpc_uuid.clone(),
            with_droplet_agent: spec.with_droplet_agent,
            user_data: spec.user_data.clone(),
        }
    }

    fn identity(&self, remote: &Droplet) -> Identity {
        Identity::from(remote.id)
    }

    fn to_observation(&self, remote: &Droplet) -> DropletObservation {
        DropletObservation {
            id: remote.id,
            name: remote.name.clone(),
            status: remote.status.clone(),
            created_at: remote.created_at.clone(),
            region: remote.region.slug.clone(),
            size: remote.size_slug.clone(),
            memory: remote.memory,
            vcpus: remote.vcpus,
            disk: remote.disk,
        }
    }

    fn late_init(&self, spec: &mut DropletSpec, remote: &Droplet) -> bool {
        let mut li = LateInitializer::new();
        li.list("volumes", &mut spec.volumes, &remote.volume_ids);
        li.list("tags", &mut spec.tags, &remote.tags);
        li.string("vpc_uuid", &mut spec.vpc_uuid, &remote.vpc_uuid);
        li.changed()
    }

    fn remote_status<'a>(&self, observation: &'a DropletObservation) -> Option<&'a str> {
        Some(&observation.status)
    }
}
