//! Manifest validation.
//!
//! Validation runs before any network call so that malformed resources are
//! reported together instead of failing one tick at a time.

use crate::error::{ConfigError, ReeflineError, Result};
use std::collections::HashSet;
use tracing::debug;

use crate::adapter::{ClusterSpec, DatabaseSpec, DropletSpec, LoadBalancerSpec, RegistrySpec, SpaceSpec};

use super::spec::{Manifest, ResourceConfig, ResourceSpec};

/// Registry subscription tiers accepted by the API.
const SUBSCRIPTION_TIERS: &[&str] = &["starter", "basic", "professional"];

/// Canned ACLs supported by the object store.
const BUCKET_ACLS: &[&str] = &["private", "public-read"];

/// Validator for manifests.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ValidationResult {
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    fn require(&mut self, field: String, value: &str) {
        if value.trim().is_empty() {
            self.error(field, "is required");
        }
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Collects every error and warning in a manifest.
    #[must_use]
    pub fn check(&self, manifest: &Manifest) -> ValidationResult {
        let mut result = ValidationResult::default();

        if manifest.project.name.is_empty() {
            result.error("project.name", "Project name cannot be empty");
        } else if !is_valid_name(&manifest.project.name) {
            result.error(
                "project.name",
                format!(
                    "Project name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    manifest.project.name
                ),
            );
        }

        let api_url = &manifest.provider.api_url;
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            result.error("provider.api_url", format!("'{api_url}' is not an http(s) URL"));
        }
        if manifest.provider.timeout_secs == 0 {
            result.error("provider.timeout_secs", "Timeout must be at least 1 second");
        }
        if manifest.state.path.trim().is_empty() {
            result.error("state.path", "State path cannot be empty");
        }
        if manifest.state.lock_ttl_secs == 0 {
            result.error("state.lock_ttl_secs", "Lock TTL must be at least 1 second");
        }

        if manifest.resources.is_empty() {
            result
                .warnings
                .push(String::from("No resources defined in manifest"));
        }

        let mut registries = 0usize;
        for (i, resource) in manifest.resources.iter().enumerate() {
            let prefix = format!("resources[{i}]");
            Self::validate_resource(&prefix, resource, &mut result);
            if matches!(resource.spec, ResourceSpec::ContainerRegistry(_)) {
                registries += 1;
            }
        }
        if registries > 1 {
            result.error(
                "resources",
                "Only one container_registry can be declared; the registry is account-wide",
            );
        }

        result
    }

    /// Validates a manifest.
    ///
    /// # Errors
    ///
    /// Returns an error for a duplicated resource name, or the first
    /// validation error found.
    pub fn validate(&self, manifest: &Manifest) -> Result<ValidationResult> {
        let mut seen = HashSet::new();
        for resource in &manifest.resources {
            if !seen.insert(resource.name.as_str()) {
                return Err(ReeflineError::Config(ConfigError::DuplicateName {
                    name: resource.name.clone(),
                }));
            }
        }

        let result = self.check(manifest);
        match result.errors.first() {
            None => {
                debug!("Manifest validation passed");
                Ok(result)
            }
            Some(first) => Err(ReeflineError::Config(ConfigError::ValidationError {
                message: first.message.clone(),
                field: Some(first.field.clone()),
            })),
        }
    }

    fn validate_resource(prefix: &str, resource: &ResourceConfig, result: &mut ValidationResult) {
        if !is_valid_name(&resource.name) {
            result.error(
                format!("{prefix}.name"),
                format!(
                    "Resource name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    resource.name
                ),
            );
        }
        if resource.external_name.as_deref().is_some_and(str::is_empty) {
            result.error(format!("{prefix}.external_name"), "cannot be empty when set");
        }

        let spec = format!("{prefix}.spec");
        match &resource.spec {
            ResourceSpec::Droplet(s) => Self::validate_droplet(&spec, s, result),
            ResourceSpec::Database(s) => Self::validate_database(&spec, s, result),
            ResourceSpec::LoadBalancer(s) => Self::validate_load_balancer(&spec, s, result),
            ResourceSpec::KubernetesCluster(s) => Self::validate_cluster(&spec, s, result),
            ResourceSpec::ContainerRegistry(s) => Self::validate_registry(&spec, s, result),
            ResourceSpec::Space(s) => {
                let bucket = s.bucket_name.as_deref().unwrap_or(&resource.name);
                Self::validate_space(&spec, bucket, s, result);
            }
        }

        let publishes = matches!(
            resource.spec,
            ResourceSpec::Database(_) | ResourceSpec::KubernetesCluster(_)
        );
        if resource.publish_connection && !publishes {
            result.warnings.push(format!(
                "{prefix}: {} resources have no connection details to publish",
                resource.spec.kind()
            ));
        }
    }

    fn validate_droplet(prefix: &str, spec: &DropletSpec, result: &mut ValidationResult) {
        result.require(format!("{prefix}.region"), &spec.region);
        result.require(format!("{prefix}.size"), &spec.size);
        result.require(format!("{prefix}.image"), &spec.image);
        if spec.volumes.iter().any(String::is_empty) {
            result
                .warnings
                .push(format!("{prefix}.volumes: empty entries are ignored"));
        }
        if spec.ssh_keys.iter().any(String::is_empty) {
            result.error(format!("{prefix}.ssh_keys"), "entries cannot be empty");
        }
    }

    fn validate_database(prefix: &str, spec: &DatabaseSpec, result: &mut ValidationResult) {
        result.require(format!("{prefix}.region"), &spec.region);
        result.require(format!("{prefix}.size"), &spec.size);
        if spec.num_nodes == 0 {
            result.error(format!("{prefix}.num_nodes"), "must be at least 1");
        }
        if spec.engine.is_none() {
            result.warnings.push(format!(
                "{prefix}.engine: not set, the provider default will be recorded after create"
            ));
        }
    }

    fn validate_load_balancer(prefix: &str, spec: &LoadBalancerSpec, result: &mut ValidationResult) {
        result.require(format!("{prefix}.region"), &spec.region);
        if spec.port == Some(0) {
            result.error(format!("{prefix}.port"), "must be between 1 and 65535");
        }
        let hc = &spec.health_check;
        for (field, value) in [
            ("interval", hc.interval),
            ("timeout", hc.timeout),
            ("unhealthy_threshold", hc.unhealthy_threshold),
            ("healthy_threshold", hc.healthy_threshold),
        ] {
            if value == Some(0) {
                result.error(format!("{prefix}.health_check.{field}"), "must be at least 1");
            }
        }
    }

    fn validate_cluster(prefix: &str, spec: &ClusterSpec, result: &mut ValidationResult) {
        result.require(format!("{prefix}.region"), &spec.region);
        result.require(format!("{prefix}.version"), &spec.version);
        if spec.node_pools.is_empty() {
            result.error(format!("{prefix}.node_pools"), "at least one node pool is required");
        }

        let mut names = HashSet::new();
        for (i, pool) in spec.node_pools.iter().enumerate() {
            let field = format!("{prefix}.node_pools[{i}]");
            result.require(format!("{field}.name"), &pool.name);
            result.require(format!("{field}.size"), &pool.size);
            if !pool.name.is_empty() && !names.insert(pool.name.as_str()) {
                result.error(format!("{field}.name"), format!("duplicate node pool '{}'", pool.name));
            }
            if pool.count == 0 && pool.auto_scale != Some(true) {
                result.error(format!("{field}.count"), "must be at least 1 without auto_scale");
            }
            if let (Some(min), Some(max)) = (pool.min_nodes, pool.max_nodes) {
                if min > max {
                    result.error(format!("{field}.min_nodes"), "cannot exceed max_nodes");
                }
            }
        }
    }

    fn validate_registry(prefix: &str, spec: &RegistrySpec, result: &mut ValidationResult) {
        if !SUBSCRIPTION_TIERS.contains(&spec.subscription_tier.as_str()) {
            result.error(
                format!("{prefix}.subscription_tier"),
                format!(
                    "'{}' is not one of {}",
                    spec.subscription_tier,
                    SUBSCRIPTION_TIERS.join(", ")
                ),
            );
        }
    }

    fn validate_space(prefix: &str, bucket: &str, spec: &SpaceSpec, result: &mut ValidationResult) {
        result.require(format!("{prefix}.region"), &spec.region);
        if !is_valid_bucket_name(bucket) {
            result.error(
                format!("{prefix}.bucket_name"),
                format!("'{bucket}' is not a valid bucket name"),
            );
        }
        if let Some(acl) = &spec.acl {
            if !BUCKET_ACLS.contains(&acl.as_str()) {
                result
                    .warnings
                    .push(format!("{prefix}.acl: '{acl}' may not be supported by Spaces"));
            }
        }
    }
}

/// Validates that a name follows the naming convention.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    first.is_ascii_lowercase()
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.ends_with('-')
        && !name.contains("--")
}

/// Bucket names are 3 to 63 characters of lowercase letters, digits, dots
/// and hyphens, starting and ending with a letter or digit.
fn is_valid_bucket_name(name: &str) -> bool {
    let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());

    (3..=63).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
        && edge_ok(name.chars().next())
        && edge_ok(name.chars().last())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    fn parse(yaml: &str) -> Manifest {
        ConfigParser::new().parse_yaml(yaml, None).expect("parse")
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("web"));
        assert!(is_valid_name("db-primary-2"));
    }

    #[test]
    fn test_invalid_name() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Web"));
        assert!(!is_valid_name("1web"));
        assert!(!is_valid_name("web_1"));
        assert!(!is_valid_name("web-"));
        assert!(!is_valid_name("web--1"));
    }

    #[test]
    fn test_bucket_names() {
        assert!(is_valid_bucket_name("acme-assets.v2"));
        assert!(!is_valid_bucket_name("ab"));
        assert!(!is_valid_bucket_name("-assets"));
        assert!(!is_valid_bucket_name("Assets"));
    }

    #[test]
    fn test_valid_manifest_with_warnings() {
        let manifest = parse(
            r"
project:
  name: shop
resources:
  - name: web
    publish_connection: true
    spec:
      kind: droplet
      region: nyc1
      size: s-1vcpu-1gb
      image: ubuntu-20-04-x64
      volumes: ['']
",
        );
        let result = ConfigValidator::new().validate(&manifest).expect("valid");
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 2);
    }

    #[test]
    fn test_collects_every_error() {
        let manifest = parse(
            r"
project:
  name: shop
resources:
  - name: k8s
    spec:
      kind: kubernetes_cluster
      region: ''
      version: 1.29.1-do.0
      node_pools: []
  - name: registry
    spec:
      kind: container_registry
      subscription_tier: gold
",
        );
        let result = ConfigValidator::new().check(&manifest);
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "resources[0].spec.region",
                "resources[0].spec.node_pools",
                "resources[1].spec.subscription_tier",
            ]
        );
        assert!(ConfigValidator::new().validate(&manifest).is_err());
    }

    #[test]
    fn test_duplicate_names() {
        let manifest = parse(
            r"
project:
  name: shop
resources:
  - name: assets
    spec: { kind: space, region: ams3 }
  - name: assets
    spec: { kind: space, region: fra1 }
",
        );
        let err = ConfigValidator::new().validate(&manifest).expect_err("duplicate");
        assert!(matches!(
            err,
            ReeflineError::Config(ConfigError::DuplicateName { ref name }) if name == "assets"
        ));
    }

    #[test]
    fn test_single_registry() {
        let manifest = parse(
            r"
project:
  name: shop
resources:
  - name: one
    spec: { kind: container_registry, subscription_tier: basic }
  - name: two
    spec: { kind: container_registry, subscription_tier: basic }
",
        );
        let result = ConfigValidator::new().check(&manifest);
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.errors[0].field, "resources");
    }
}
