//! Spec fingerprints for change detection.
//!
//! The driver stores a hash of each resource's declared spec so that edits
//! to the manifest can be reported even for kinds that never update.

use sha2::{Digest, Sha256};

use super::spec::{Manifest, ResourceConfig, ResourceSpec};

/// Hasher for manifest fingerprints.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Hashes a resource spec.
    ///
    /// Specs are hashed through their JSON form, whose field order is fixed
    /// and whose maps are ordered.
    #[must_use]
    pub fn hash_spec(&self, spec: &ResourceSpec) -> String {
        let bytes = serde_json::to_vec(spec).unwrap_or_default();
        hex::encode(Sha256::digest(bytes))
    }

    /// Hashes a declared resource, including naming and publishing options.
    #[must_use]
    pub fn hash_resource(&self, resource: &ResourceConfig) -> String {
        let mut hasher = Sha256::new();
        hasher.update(resource.name.as_bytes());
        hasher.update([0u8]);
        if let Some(external) = &resource.external_name {
            hasher.update(external.as_bytes());
        }
        hasher.update([0u8, u8::from(resource.publish_connection)]);
        hasher.update(self.hash_spec(&resource.spec).as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Hashes the whole manifest, independent of resource order.
    #[must_use]
    pub fn hash_manifest(&self, manifest: &Manifest) -> String {
        let mut hashes: Vec<String> = manifest
            .resources
            .iter()
            .map(|r| self.hash_resource(r))
            .collect();
        hashes.sort_unstable();

        let mut hasher = Sha256::new();
        hasher.update(manifest.project.name.as_bytes());
        for hash in hashes {
            hasher.update(hash.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }
}
