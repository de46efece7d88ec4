//! Spaces (S3-compatible object storage) client.
//!
//! Spaces endpoints are regional, so a fresh S3 client is configured and
//! authenticated for every call from the bucket's region.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::types::{Bucket, BucketCannedAcl, ObjectOwnership as S3ObjectOwnership};
use std::fmt;
use tracing::debug;

use crate::adapter::{SpaceAdapter, SpaceBucket, SpaceCreateRequest, SpaceSpec};
use crate::error::{CloudError, CloudResult};
use crate::resource::Identity;

use super::ExternalClient;

/// Region used to sign requests; Spaces routes by endpoint, not by signing region.
pub const SPACES_SIGNING_REGION: &str = "us-east-1";

/// Returns the regional Spaces endpoint.
#[must_use]
pub fn spaces_endpoint(region: &str) -> String {
    format!("https://{region}.digitaloceanspaces.com")
}

/// Client for Spaces buckets.
#[derive(Clone, Default)]
pub struct SpacesClient {
    credentials: Option<(String, String)>,
    endpoint_override: Option<String>,
}

impl fmt::Debug for SpacesClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpacesClient")
            .field("configured", &self.credentials.is_some())
            .field("endpoint_override", &self.endpoint_override)
            .finish()
    }
}

impl SpacesClient {
    /// Creates a client with a static access key pair.
    #[must_use]
    pub fn new(access_key_id: &str, secret_access_key: &str) -> Self {
        Self {
            credentials: Some((access_key_id.to_string(), secret_access_key.to_string())),
            endpoint_override: None,
        }
    }

    /// Creates a client that fails every call; used when no space is declared.
    #[must_use]
    pub const fn unconfigured() -> Self {
        Self {
            credentials: None,
            endpoint_override: None,
        }
    }

    /// Sends every call to a fixed endpoint instead of the regional one.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint_override = Some(endpoint.into());
        self
    }

    /// Returns true if credentials were supplied.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    async fn client_for(&self, region: &str) -> CloudResult<Client> {
        let Some((access_key_id, secret_access_key)) = &self.credentials else {
            return Err(CloudError::AuthenticationFailed {
                message: String::from("Spaces credentials are not configured"),
            });
        };

        let endpoint = self
            .endpoint_override
            .clone()
            .unwrap_or_else(|| spaces_endpoint(region));
        debug!("Configuring Spaces client for {endpoint}");

        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(SPACES_SIGNING_REGION))
            .endpoint_url(endpoint)
            .credentials_provider(Credentials::new(
                access_key_id.clone(),
                secret_access_key.clone(),
                None,
                None,
                "reefline",
            ))
            .load()
            .await;

        Ok(Client::new(&config))
    }
}

fn storage_error<E>(operation: &str, err: &SdkError<E, HttpResponse>) -> CloudError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let message = format!("{operation}: {}", DisplayErrorContext(err));
    if err.code() == Some("NoSuchBucket") {
        return CloudError::api(404, message);
    }
    match err.raw_response() {
        Some(response) => CloudError::api(response.status().as_u16(), message),
        None => match err {
            SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => CloudError::network(message),
            _ => CloudError::InvalidResponse { message },
        },
    }
}

fn find_bucket(name: &str, buckets: &[Bucket]) -> Option<SpaceBucket> {
    buckets
        .iter()
        .find(|b| b.name() == Some(name))
        .map(|b| SpaceBucket {
            name: name.to_string(),
            creation_date: b
                .creation_date()
                .and_then(|d| chrono::DateTime::from_timestamp(d.secs(), 0))
                .map(|d| d.to_rfc3339()),
        })
}

fn bucket_name(identity: &Identity) -> CloudResult<&str> {
    if identity.is_empty() {
        Err(CloudError::invalid_id("bucketName"))
    } else {
        Ok(identity.as_str())
    }
}

#[async_trait]
impl ExternalClient<SpaceAdapter> for SpacesClient {
    /// There is no get-by-name: every bucket is listed and scanned.
    async fn get(&self, identity: &Identity, spec: &SpaceSpec) -> CloudResult<SpaceBucket> {
        let name = bucket_name(identity)?;
        let client = self.client_for(&spec.region).await?;
        let output = client
            .list_buckets()
            .send()
            .await
            .map_err(|e| storage_error("listing of Spaces buckets failed", &e))?;

        find_bucket(name, output.buckets())
            .ok_or_else(|| CloudError::api(404, format!("bucket {name} not found")))
    }

    async fn create(&self, request: &SpaceCreateRequest) -> CloudResult<SpaceBucket> {
        let client = self.client_for(&request.region).await?;
        client
            .create_bucket()
            .bucket(&request.bucket)
            .set_acl(request.acl.as_deref().map(BucketCannedAcl::from))
            .set_grant_full_control(request.grant_full_control.clone())
            .set_grant_read(request.grant_read.clone())
            .set_grant_read_acp(request.grant_read_acp.clone())
            .set_grant_write(request.grant_write.clone())
            .set_grant_write_acp(request.grant_write_acp.clone())
            .set_object_lock_enabled_for_bucket(request.object_lock_enabled_for_bucket)
            .set_object_ownership(
                request
                    .object_ownership
                    .map(|o| S3ObjectOwnership::from(o.as_str())),
            )
            .send()
            .await
            .map_err(|e| storage_error("creation of Spaces bucket failed", &e))?;

        Ok(SpaceBucket {
            name: request.bucket.clone(),
            creation_date: None,
        })
    }

    async fn delete(&self, identity: &Identity, spec: &SpaceSpec) -> CloudResult<()> {
        let name = bucket_name(identity)?;
        let client = self.client_for(&spec.region).await?;
        client
            .delete_bucket()
            .bucket(name)
            .send()
            .await
            .map_err(|e| storage_error("deletion of Spaces bucket failed", &e))?;
        Ok(())
    }
}
