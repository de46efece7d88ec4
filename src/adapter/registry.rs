//! Container registry adapter.
//!
//! The registry is account-wide and the only kind that can be updated in
//! place: its subscription tier follows the spec.

use serde::{Deserialize, Serialize};

use crate::cloud::{
    RegistryCreateRequest, RegistrySubscriptionUpdateRequest, RegistryWithSubscription,
    SubscriptionTier,
};
use crate::resource::{Identity, LateInitializer, ResourceKind};

use super::{DriftCheck, ResourceAdapter};

/// Drift reason reported when the subscription tier differs.
pub const SUBSCRIPTION_DRIFT: &str = "subscription is not up to date";

/// Desired configuration of the container registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySpec {
    /// Subscription tier slug (`starter`, `basic`, `professional`).
    pub subscription_tier: String,
    /// Region slug.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// Observed state of the container registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryObservation {
    /// Registry name.
    pub name: String,
    /// Region slug.
    pub region: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Bytes stored.
    pub storage_usage_bytes: u64,
    /// When the storage usage was measured.
    pub storage_usage_bytes_updated_at: String,
    /// Subscription tier, absent until the subscription has been read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_tier: Option<SubscriptionTier>,
    /// Subscription creation timestamp.
    #[serde(default)]
    pub subscription_created_at: String,
    /// Subscription update timestamp.
    #[serde(default)]
    pub subscription_updated_at: String,
}

/// Adapter for the container registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryAdapter;

impl ResourceAdapter for RegistryAdapter {
    type Spec = RegistrySpec;
    type Remote = RegistryWithSubscription;
    type Observation = RegistryObservation;
    type CreateRequest = RegistryCreateRequest;
    type UpdateRequest = RegistrySubscriptionUpdateRequest;

    const KIND: ResourceKind = ResourceKind::ContainerRegistry;

    fn build_create_request(&self, name: &str, spec: &RegistrySpec) -> RegistryCreateRequest {
        RegistryCreateRequest {
            name: name.to_string(),
            subscription_tier_slug: spec.subscription_tier.clone(),
            region: spec.region.clone(),
        }
    }

    fn build_update_request(&self, spec: &RegistrySpec) -> Option<RegistrySubscriptionUpdateRequest> {
        Some(RegistrySubscriptionUpdateRequest {
            tier_slug: spec.subscription_tier.clone(),
        })
    }

    fn identity(&self, remote: &RegistryWithSubscription) -> Identity {
        Identity::new(remote.registry.name.clone())
    }

    fn to_observation(&self, remote: &RegistryWithSubscription) -> RegistryObservation {
        let registry = &remote.registry;
        let subscription = remote.subscription.as_ref();
        RegistryObservation {
            name: registry.name.clone(),
            region: registry.region.clone(),
            created_at: registry.created_at.clone(),
            storage_usage_bytes: registry.storage_usage_bytes,
            storage_usage_bytes_updated_at: registry.storage_usage_bytes_updated_at.clone(),
            subscription_tier: subscription.map(|s| s.tier.clone()),
            subscription_created_at: subscription.map(|s| s.created_at.clone()).unwrap_or_default(),
            subscription_updated_at: subscription.map(|s| s.updated_at.clone()).unwrap_or_default(),
        }
    }

    fn late_init(&self, spec: &mut RegistrySpec, remote: &RegistryWithSubscription) -> bool {
        let mut li = LateInitializer::new();
        li.string("region", &mut spec.region, &remote.registry.region);
        li.changed()
    }

    fn is_up_to_date(&self, spec: &RegistrySpec, observation: &RegistryObservation) -> DriftCheck {
        let observed = observation
            .subscription_tier
            .as_ref()
            .map_or("", |t| t.slug.as_str());
        if observed == spec.subscription_tier {
            DriftCheck::UpToDate
        } else {
            DriftCheck::Drifted(String::from(SUBSCRIPTION_DRIFT))
        }
    }

    fn remote_status<'a>(&self, _observation: &'a RegistryObservation) -> Option<&'a str> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{Registry, Subscription};

    fn remote(tier: &str) -> RegistryWithSubscription {
        RegistryWithSubscription {
            registry: Registry {
                name: String::from("acme"),
                region: String::from("fra1"),
                ..Registry::default()
            },
            subscription: Some(Subscription {
                tier: SubscriptionTier {
                    name: tier.to_uppercase(),
                    slug: tier.to_string(),
                    ..SubscriptionTier::default()
                },
                ..Subscription::default()
            }),
        }
    }

    #[test]
    fn test_tier_drift() {
        let spec = RegistrySpec {
            subscription_tier: String::from("starter"),
            region: None,
        };
        let observation = RegistryAdapter.to_observation(&remote("basic"));
        let check = RegistryAdapter.is_up_to_date(&spec, &observation);
        assert!(!check.is_up_to_date());
        assert_eq!(check.reason(), Some(SUBSCRIPTION_DRIFT));

        let same = RegistryAdapter.to_observation(&remote("starter"));
        assert_eq!(RegistryAdapter.is_up_to_date(&spec, &same), DriftCheck::UpToDate);
    }

    #[test]
    fn test_update_carries_only_tier() {
        let spec = RegistrySpec {
            subscription_tier: String::from("professional"),
            region: Some(String::from("sfo3")),
        };
        let request = RegistryAdapter
            .build_update_request(&spec)
            .expect("registry is mutable");
        assert_eq!(request.tier_slug, "professional");
        let body = serde_json::to_value(&request).expect("encode");
        assert_eq!(body, serde_json::json!({ "tier_slug": "professional" }));
    }

    #[test]
    fn test_identity_and_late_init() {
        let remote = remote("basic");
        assert_eq!(RegistryAdapter.identity(&remote).as_str(), "acme");

        let mut spec = RegistrySpec {
            subscription_tier: String::from("basic"),
            region: None,
        };
        assert!(RegistryAdapter.late_init(&mut spec, &remote));
        assert_eq!(spec.region.as_deref(), Some("fra1"));
    }

    #[test]
    fn test_missing_subscription_is_drift() {
        let mut remote = remote("basic");
        remote.subscription = None;
        let spec = RegistrySpec {
            subscription_tier: String::from("basic"),
            region: None,
        };
        let observation = RegistryAdapter.to_observation(&remote);
        assert!(!RegistryAdapter.is_up_to_date(&spec, &observation).is_up_to_date());
    }
}
