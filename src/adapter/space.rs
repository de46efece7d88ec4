//! Object-storage bucket ("space") adapter.

use serde::{Deserialize, Serialize};

use crate::resource::{Identity, ResourceKind};

use super::ResourceAdapter;

/// Object ownership setting of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectOwnership {
    /// Objects uploaded with the bucket-owner-full-control ACL belong to the bucket owner.
    BucketOwnerPreferred,
    /// The uploading account owns the object.
    ObjectWriter,
    /// ACLs are disabled and the bucket owner owns every object.
    BucketOwnerEnforced,
}

impl ObjectOwnership {
    /// Returns the value as the S3 API spells it.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BucketOwnerPreferred => "BucketOwnerPreferred",
            Self::ObjectWriter => "ObjectWriter",
            Self::BucketOwnerEnforced => "BucketOwnerEnforced",
        }
    }
}

/// Desired configuration of a bucket. Nothing can change after create.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceSpec {
    /// Region slug; selects the regional endpoint.
    pub region: String,
    /// Bucket name, when it differs from the resource name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<String>,
    /// Canned ACL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<String>,
    /// Grantee with read, write, read ACP and write ACP permissions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_full_control: Option<String>,
    /// Grantee allowed to list objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_read: Option<String>,
    /// Grantee allowed to read the bucket ACL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_read_acp: Option<String>,
    /// Grantee allowed to create objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_write: Option<String>,
    /// Grantee allowed to write the bucket ACL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_write_acp: Option<String>,
    /// Enable object lock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_lock_enabled_for_bucket: Option<bool>,
    /// Object ownership.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_ownership: Option<ObjectOwnership>,
}

/// Parameters of a create-bucket call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceCreateRequest {
    /// Bucket name.
    pub bucket: String,
    /// Region slug.
    pub region: String,
    /// Canned ACL.
    pub acl: Option<String>,
    /// Full control grantee.
    pub grant_full_control: Option<String>,
    /// Read grantee.
    pub grant_read: Option<String>,
    /// Read ACP grantee.
    pub grant_read_acp: Option<String>,
    /// Write grantee.
    pub grant_write: Option<String>,
    /// Write ACP grantee.
    pub grant_write_acp: Option<String>,
    /// Object lock.
    pub object_lock_enabled_for_bucket: Option<bool>,
    /// Object ownership.
    pub object_ownership: Option<ObjectOwnership>,
}

/// A bucket as listed by the object store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpaceBucket {
    /// Bucket name.
    pub name: String,
    /// Creation date, RFC 3339.
    pub creation_date: Option<String>,
}

/// Observed state of a bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceObservation {
    /// Bucket name.
    pub name: String,
    /// Creation date, RFC 3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
}

/// Adapter for object-storage buckets.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpaceAdapter;

impl ResourceAdapter for SpaceAdapter {
    type Spec = SpaceSpec;
    type Remote = SpaceBucket;
    type Observation = SpaceObservation;
    type CreateRequest = SpaceCreateRequest;
    type UpdateRequest = ();

    const KIND: ResourceKind = ResourceKind::Space;

    fn build_create_request(&self, name: &str, spec: &SpaceSpec) -> SpaceCreateRequest {
        let bucket = spec
            .bucket_name
            .clone()
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| name.to_string());
        SpaceCreateRequest {
            bucket,
            region: spec.region.clone(),
            acl: spec.acl.clone(),
            grant_full_control: spec.grant_full_control.clone(),
            grant_read: spec.grant_read.clone(),
            grant_read_acp: spec.grant_read_acp.clone(),
            grant_write: spec.grant_write.clone(),
            grant_write_acp: spec.grant_write_acp.clone(),
            object_lock_enabled_for_bucket: spec.object_lock_enabled_for_bucket,
            object_ownership: spec.object_ownership,
        }
    }

    fn identity(&self, remote: &SpaceBucket) -> Identity {
        Identity::new(remote.name.clone())
    }

    fn to_observation(&self, remote: &SpaceBucket) -> SpaceObservation {
        SpaceObservation {
            name: remote.name.clone(),
            creation_date: remote.creation_date.clone(),
        }
    }

    fn late_init(&self, _spec: &mut SpaceSpec, _remote: &SpaceBucket) -> bool {
        false
    }

    fn remote_status<'a>(&self, _observation: &'a SpaceObservation) -> Option<&'a str> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_name_defaults_to_resource_name() {
        let spec = SpaceSpec {
            region: String::from("ams3"),
            ..SpaceSpec::default()
        };
        let request = SpaceAdapter.build_create_request("assets", &spec);
        assert_eq!(request.bucket, "assets");
        assert_eq!(request.region, "ams3");

        let named = SpaceSpec {
            bucket_name: Some(String::from("acme-assets")),
            ..spec
        };
        assert_eq!(SpaceAdapter.build_create_request("assets", &named).bucket, "acme-assets");
    }

    #[test]
    fn test_ownership_from_yaml() {
        let spec: SpaceSpec = serde_yaml::from_str(
            "region: nyc3\nacl: private\nobject_ownership: BucketOwnerEnforced\n",
        )
        .expect("parse");
        assert_eq!(spec.object_ownership, Some(ObjectOwnership::BucketOwnerEnforced));
        assert_eq!(
            spec.object_ownership.map(|o| o.as_str()),
            Some("BucketOwnerEnforced")
        );
    }
}
