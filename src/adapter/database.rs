//! Managed database cluster adapter.

use serde::{Deserialize, Serialize};

use crate::cloud::{Database, DatabaseConnection, DatabaseCreateRequest};
use crate::resource::{ConnectionDetails, Identity, LateInitializer, ResourceKind};

use super::ResourceAdapter;

/// Desired configuration of a database cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSpec {
    /// Engine slug (`pg`, `mysql`, `redis`, `mongodb`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    /// Engine version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Number of nodes.
    pub num_nodes: u32,
    /// Size slug of each node.
    pub size: String,
    /// Region slug.
    pub region: String,
    /// VPC to place the cluster in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_network_uuid: Option<String>,
    /// Tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Connection endpoint without its password.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedConnection {
    /// Connection URI with the password removed.
    pub uri: String,
    /// Default database.
    pub database: String,
    /// Host name.
    pub host: String,
    /// Port.
    pub port: u16,
    /// User name.
    pub user: String,
    /// Whether TLS is required.
    pub ssl: bool,
}

/// A database user without its password.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedUser {
    /// User name.
    pub name: String,
    /// Role.
    pub role: String,
    /// MySQL authentication plugin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mysql_auth_plugin: Option<String>,
}

/// Observed state of a database cluster.
///
/// Secrets stay out of the observation; they are only published through
/// connection details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseObservation {
    /// Cluster id.
    pub id: String,
    /// Cluster name.
    pub name: String,
    /// Engine slug.
    pub engine: String,
    /// Engine version.
    pub version: String,
    /// Remote status.
    pub status: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Number of nodes.
    pub num_nodes: u32,
    /// Size slug.
    pub size: String,
    /// Region slug.
    pub region: String,
    /// Database names.
    pub db_names: Vec<String>,
    /// Users.
    pub users: Vec<ObservedUser>,
    /// Public endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<ObservedConnection>,
    /// Private endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_connection: Option<ObservedConnection>,
    /// Maintenance day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_day: Option<String>,
    /// Maintenance start hour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_hour: Option<String>,
    /// Whether maintenance is pending.
    #[serde(default)]
    pub maintenance_pending: bool,
    /// Pending maintenance items.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub maintenance_description: Vec<String>,
}

/// Adapter for managed database clusters.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatabaseAdapter;

impl DatabaseAdapter {
    /// Returns true if any endpoint requires TLS, meaning the CA is worth fetching.
    #[must_use]
    pub fn requires_ca(remote: &Database) -> bool {
        [&remote.connection, &remote.private_connection]
            .into_iter()
            .flatten()
            .any(|c| c.ssl)
    }
}

fn observe_connection(connection: &DatabaseConnection) -> ObservedConnection {
    let uri = if connection.password.is_empty() {
        connection.uri.clone()
    } else {
        connection.uri.replace(&connection.password, "REDACTED")
    };
    ObservedConnection {
        uri,
        database: connection.database.clone(),
        host: connection.host.clone(),
        port: connection.port,
        user: connection.user.clone(),
        ssl: connection.ssl,
    }
}

fn publish_connection(details: &mut ConnectionDetails, prefix: &str, c: &DatabaseConnection) {
    let entries = [
        ("endpoint", c.uri.clone()),
        ("host", c.host.clone()),
        ("port", c.port.to_string()),
        ("username", c.user.clone()),
        ("password", c.password.clone()),
        ("database", c.database.clone()),
    ];
    for (key, value) in entries {
        if !value.is_empty() {
            details.insert(format!("{prefix}-{key}"), value);
        }
    }
}

impl ResourceAdapter for DatabaseAdapter {
    type Spec = DatabaseSpec;
    type Remote = Database;
    type Observation = DatabaseObservation;
    type CreateRequest = DatabaseCreateRequest;
    type UpdateRequest = ();

    const KIND: ResourceKind = ResourceKind::Database;

    fn build_create_request(&self, name: &str, spec: &DatabaseSpec) -> DatabaseCreateRequest {
        DatabaseCreateRequest {
            name: name.to_string(),
            engine: spec.engine.clone(),
            version: spec.version.clone(),
            size: spec.size.clone(),
            region: spec.region.clone(),
            num_nodes: spec.num_nodes,
            private_network_uuid: spec.private_network_uuid.clone(),
            tags: spec.tags.clone(),
        }
    }

    fn identity(&self, remote: &Database) -> Identity {
        Identity::new(remote.id.clone())
    }

    fn to_observation(&self, remote: &Database) -> DatabaseObservation {
        let window = remote.maintenance_window.as_ref();
        DatabaseObservation {
            id: remote.id.clone(),
            name: remote.name.clone(),
            engine: remote.engine.clone(),
            version: remote.version.clone(),
            status: remote.status.clone(),
            created_at: remote.created_at.clone(),
            num_nodes: remote.num_nodes,
            size: remote.size.clone(),
            region: remote.region.clone(),
            db_names: remote.db_names.clone(),
            users: remote
                .users
                .iter()
                .map(|u| ObservedUser {
                    name: u.name.clone(),
                    role: u.role.clone(),
                    mysql_auth_plugin: u
                        .mysql_settings
                        .as_ref()
                        .map(|s| s.auth_plugin.clone())
                        .filter(|p| !p.is_empty()),
                })
                .collect(),
            connection: remote.connection.as_ref().map(observe_connection),
            private_connection: remote.private_connection.as_ref().map(observe_connection),
            maintenance_day: window.map(|w| w.day.clone()),
            maintenance_hour: window.map(|w| w.hour.clone()),
            maintenance_pending: window.is_some_and(|w| w.pending),
            maintenance_description: window.map(|w| w.description.clone()).unwrap_or_default(),
        }
    }

    fn late_init(&self, spec: &mut DatabaseSpec, remote: &Database) -> bool {
        let mut li = LateInitializer::new();
        li.string("engine", &mut spec.engine, &remote.engine);
        li.string("version", &mut spec.version, &remote.version);
        li.string(
            "private_network_uuid",
            &mut spec.private_network_uuid,
            &remote.private_network_uuid,
        );
        li.list("tags", &mut spec.tags, &remote.tags);
        li.changed()
    }

    fn remote_status<'a>(&self, observation: &'a DatabaseObservation) -> Option<&'a str> {
        Some(&observation.status)
    }

    fn connection_details(&self, remote: &Database) -> ConnectionDetails {
        let mut details = ConnectionDetails::new();
        if let Some(c) = &remote.connection {
            publish_connection(&mut details, "public", c);
        }
        if let Some(c) = &remote.private_connection {
            publish_connection(&mut details, "private", c);
        }
        details
    }
}
