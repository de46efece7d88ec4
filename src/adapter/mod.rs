//! Per-kind resource adapters.
//!
//! An adapter is pure translation: desired spec to create/update requests,
//! remote objects to observations, and the kind's late-init and drift
//! policy. Adapters never perform I/O and never swallow errors.

mod cluster;
mod database;
mod droplet;
mod loadbalancer;
mod registry;
mod space;

pub use cluster::{
    ClusterAdapter, ClusterObservation, ClusterSpec, ClusterState, MaintenanceDay,
    MaintenancePolicySpec, NodePoolSpec, ObservedNode, ObservedNodePool,
};
pub use database::{
    DatabaseAdapter, DatabaseObservation, DatabaseSpec, ObservedConnection, ObservedUser,
};
pub use droplet::{DropletAdapter, DropletObservation, DropletSpec};
pub use loadbalancer::{
    DEFAULT_PORT, HealthCheckSpec, LoadBalancerAdapter, LoadBalancerObservation, LoadBalancerSpec,
};
pub use registry::{RegistryAdapter, RegistryObservation, RegistrySpec, SUBSCRIPTION_DRIFT};
pub use space::{
    ObjectOwnership, SpaceAdapter, SpaceBucket, SpaceCreateRequest, SpaceObservation, SpaceSpec,
};

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

use crate::resource::{ConnectionDetails, Identity, ResourceKind};

/// Result of comparing a desired spec with an observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriftCheck {
    /// No mutating call is needed.
    UpToDate,
    /// An update is needed, with the reason shown to users.
    Drifted(String),
}

impl DriftCheck {
    /// Returns true if no update is needed.
    #[must_use]
    pub const fn is_up_to_date(&self) -> bool {
        matches!(self, Self::UpToDate)
    }

    /// Returns the drift reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::UpToDate => None,
            Self::Drifted(reason) => Some(reason),
        }
    }
}

/// Translation contract implemented once per resource kind.
pub trait ResourceAdapter: Clone + Debug + Default + Send + Sync + 'static {
    /// User-declared configuration.
    type Spec: Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync;
    /// Object as returned by the external client.
    type Remote: Clone + Debug + Send + Sync;
    /// Snapshot persisted after each observe.
    type Observation: Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync;
    /// Body of a create call.
    type CreateRequest: Clone + Debug + Send + Sync;
    /// Body of an update call.
    type UpdateRequest: Clone + Debug + Send + Sync;

    /// Kind handled by this adapter.
    const KIND: ResourceKind;

    /// Builds the create request for a resource named `name`.
    fn build_create_request(&self, name: &str, spec: &Self::Spec) -> Self::CreateRequest;

    /// Builds the update request, or `None` when the kind is immutable.
    fn build_update_request(&self, _spec: &Self::Spec) -> Option<Self::UpdateRequest> {
        None
    }

    /// Extracts the server-assigned identity.
    fn identity(&self, remote: &Self::Remote) -> Identity;

    /// Converts a remote object into its persisted snapshot.
    fn to_observation(&self, remote: &Self::Remote) -> Self::Observation;

    /// Fills unset spec fields from the remote object.
    ///
    /// Returns true if the spec changed.
    fn late_init(&self, spec: &mut Self::Spec, remote: &Self::Remote) -> bool;

    /// Compares the desired spec with the observation.
    fn is_up_to_date(&self, _spec: &Self::Spec, _observation: &Self::Observation) -> DriftCheck {
        DriftCheck::UpToDate
    }

    /// Returns the remote status string, for kinds that report one.
    fn remote_status<'a>(&self, observation: &'a Self::Observation) -> Option<&'a str>;

    /// Derives connection material from the remote object.
    fn connection_details(&self, _remote: &Self::Remote) -> ConnectionDetails {
        ConnectionDetails::new()
    }
}
