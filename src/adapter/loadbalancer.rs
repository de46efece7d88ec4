//! Load balancer adapter.
//!
//! Every load balancer forwards TCP on a single port and probes its targets
//! over TCP on that same port.

use serde::{Deserialize, Serialize};

use crate::cloud::{ForwardingRule, HealthCheck, LoadBalancer, LoadBalancerRequest};
use crate::resource::{Identity, LateInitializer, ResourceKind};

use super::ResourceAdapter;

/// Port used for forwarding and health checks when none is given.
pub const DEFAULT_PORT: u16 = 80;

const DEFAULT_CHECK_INTERVAL_SECS: u32 = 10;
const DEFAULT_RESPONSE_TIMEOUT_SECS: u32 = 5;
const DEFAULT_UNHEALTHY_THRESHOLD: u32 = 3;
const DEFAULT_HEALTHY_THRESHOLD: u32 = 5;

/// Health check settings; unset values fall back to the API defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckSpec {
    /// Seconds between probes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
    /// Seconds before a probe times out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    /// Failed probes before a target is removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unhealthy_threshold: Option<u32>,
    /// Passed probes before a target is added back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthy_threshold: Option<u32>,
}

/// Desired configuration of a load balancer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerSpec {
    /// Region slug.
    pub region: String,
    /// Balancing algorithm (`round_robin` or `least_connections`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    /// Entry and target port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Health check settings.
    #[serde(default)]
    pub health_check: HealthCheckSpec,
    /// Tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// VPC id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_uuid: Option<String>,
}

/// Observed state of a load balancer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerObservation {
    /// Load balancer id.
    pub id: String,
    /// Public IP address.
    pub ip: String,
    /// Remote status.
    pub status: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Balancing algorithm in use.
    pub algorithm: String,
}

/// Adapter for load balancers.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadBalancerAdapter;

impl ResourceAdapter for LoadBalancerAdapter {
    type Spec = LoadBalancerSpec;
    type Remote = LoadBalancer;
    type Observation = LoadBalancerObservation;
    type CreateRequest = LoadBalancerRequest;
    type UpdateRequest = ();

    const KIND: ResourceKind = ResourceKind::LoadBalancer;

    fn build_create_request(&self, name: &str, spec: &LoadBalancerSpec) -> LoadBalancerRequest {
        let port = spec.port.filter(|p| *p != 0).unwrap_or(DEFAULT_PORT);
        let hc = &spec.health_check;

        LoadBalancerRequest {
            name: name.to_string(),
            region: spec.region.clone(),
            algorithm: spec.algorithm.clone().filter(|a| !a.is_empty()),
            forwarding_rules: vec![ForwardingRule {
                entry_protocol: String::from("tcp"),
                entry_port: port,
                target_protocol: String::from("tcp"),
                target_port: port,
            }],
            health_check: HealthCheck {
                protocol: String::from("tcp"),
                port,
                check_interval_seconds: hc.interval.unwrap_or(DEFAULT_CHECK_INTERVAL_SECS),
                response_timeout_seconds: hc.timeout.unwrap_or(DEFAULT_RESPONSE_TIMEOUT_SECS),
                unhealthy_threshold: hc
                    .unhealthy_threshold
                    .unwrap_or(DEFAULT_UNHEALTHY_THRESHOLD),
                healthy_threshold: hc.healthy_threshold.unwrap_or(DEFAULT_HEALTHY_THRESHOLD),
            },
            tags: spec.tags.clone(),
            vpc_uuid: spec.vpc_uuid.clone(),
        }
    }

    fn identity(&self, remote: &LoadBalancer) -> Identity {
        Identity::new(remote.id.clone())
    }

    fn to_observation(&self, remote: &LoadBalancer) -> LoadBalancerObservation {
        LoadBalancerObservation {
            id: remote.id.clone(),
            ip: remote.ip.clone(),
            status: remote.status.clone(),
            created_at: remote.created_at.clone(),
            algorithm: remote.algorithm.clone(),
        }
    }

    fn late_init(&self, spec: &mut LoadBalancerSpec, remote: &LoadBalancer) -> bool {
        let mut li = LateInitializer::new();
        li.list("tags", &mut spec.tags, &remote.tags);
        li.string("vpc_uuid", &mut spec.vpc_uuid, &remote.vpc_uuid);
        li.changed()
    }

    fn remote_status<'a>(&self, observation: &'a LoadBalancerObservation) -> Option<&'a str> {
        Some(&observation.status)
    }
}
