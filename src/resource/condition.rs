//! Mapping from remote status strings to [`Condition`].

use super::types::{Condition, LastOperation, ResourceKind};

/// Derives the user-visible condition of a resource.
///
/// A mutating call issued in the current tick wins over the status read
/// before it. Kinds without a status field are available once observed.
/// Unrecognized status strings map to [`Condition::Unavailable`].
#[must_use]
pub fn derive_condition(
    kind: ResourceKind,
    status: Option<&str>,
    last_operation: Option<LastOperation>,
) -> Condition {
    match last_operation {
        Some(LastOperation::Create) => return Condition::Creating,
        Some(LastOperation::Delete) => return Condition::Deleting,
        Some(LastOperation::Update) | None => {}
    }

    let Some(status) = status else {
        return Condition::Available;
    };

    match kind {
        ResourceKind::Droplet | ResourceKind::LoadBalancer => match status {
            "new" => Condition::Creating,
            "active" => Condition::Available,
            _ => Condition::Unavailable,
        },
        ResourceKind::Database => match status {
            "creating" => Condition::Creating,
            "online" => Condition::Available,
            _ => Condition::Unavailable,
        },
        ResourceKind::KubernetesCluster => match status {
            "provisioning" => Condition::Creating,
            "running" | "degraded" => Condition::Available,
            "deleting" | "deleted" => Condition::Deleting,
            _ => Condition::Unavailable,
        },
        ResourceKind::ContainerRegistry | ResourceKind::Space => Condition::Available,
    }
}
