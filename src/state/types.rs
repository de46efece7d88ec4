//! Persisted state types.
//!
//! One record per declared resource holds everything the engine needs on
//! the next tick: the spec as last reconciled, the identity and the last
//! observation.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::ResourceSpec;
use crate::resource::{Condition, Identity, LastOperation, ResourceKind};

/// Current version of the state format.
pub const STATE_VERSION: &str = "1";

/// Number of history entries kept.
const MAX_HISTORY: usize = 100;

/// The complete state of a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderState {
    /// State format version.
    pub version: String,
    /// Project name.
    pub project: String,
    /// Records keyed by logical resource name.
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceRecord>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Recent mutating operations, oldest first.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// State of one resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Logical resource name.
    pub name: String,
    /// Desired spec as of the last tick, late-initialized fields included.
    pub spec: ResourceSpec,
    /// Hash of the declared spec the record was last reconciled against.
    pub spec_hash: String,
    /// Server-assigned identity, once created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    /// Last observation, in the kind's own shape.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<serde_json::Value>,
    /// Last derived condition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    /// Why the resource was last reported out of date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_reason: Option<String>,
    /// Keys of the published connection details.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connection_keys: Vec<String>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

/// A mutating operation issued against a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the operation ran.
    pub timestamp: DateTime<Utc>,
    /// Operation type.
    pub operation: LastOperation,
    /// Logical resource name.
    pub resource: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Identity the operation applied to or produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error message, when it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProviderState {
    /// Creates an empty state.
    #[must_use]
    pub fn new(project: &str) -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            project: project.to_string(),
            resources: BTreeMap::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Gets a record by name.
    #[must_use]
    pub fn record(&self, name: &str) -> Option<&ResourceRecord> {
        self.resources.get(name)
    }

    /// Adds or replaces a record.
    pub fn set_record(&mut self, record: ResourceRecord) {
        self.resources.insert(record.name.clone(), record);
        self.last_updated = Utc::now();
    }

    /// Removes a record by name.
    pub fn remove_record(&mut self, name: &str) -> Option<ResourceRecord> {
        let removed = self.resources.remove(name);
        if removed.is_some() {
            self.last_updated = Utc::now();
        }
        removed
    }

    /// Appends a history entry, dropping the oldest past the limit.
    pub fn add_history(&mut self, entry: HistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }

    /// Returns all record names in order.
    #[must_use]
    pub fn resource_names(&self) -> Vec<&str> {
        self.resources.keys().map(String::as_str).collect()
    }
}

impl ResourceRecord {
    /// Creates a record for a resource that has not been created yet.
    #[must_use]
    pub fn new(name: &str, spec: ResourceSpec, spec_hash: &str) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            spec,
            spec_hash: spec_hash.to_string(),
            identity: None,
            observation: None,
            condition: None,
            diff_reason: None,
            connection_keys: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the kind of the recorded spec.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.spec.kind()
    }

    /// Decodes the stored observation into the kind's type.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored JSON does not match the type.
    pub fn observation_as<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.observation
            .clone()
            .map(serde_json::from_value)
            .transpose()
    }

    /// Marks the record as updated now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl HistoryEntry {
    /// Creates a successful entry.
    #[must_use]
    pub fn new(
        operation: LastOperation,
        resource: &str,
        kind: ResourceKind,
        identity: Option<Identity>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            resource: resource.to_string(),
            kind,
            identity,
            success: true,
            error: None,
        }
    }

    /// Creates a failed entry.
    #[must_use]
    pub fn failed(
        operation: LastOperation,
        resource: &str,
        kind: ResourceKind,
        identity: Option<Identity>,
        error: &str,
    ) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Self::new(operation, resource, kind, identity)
        }
    }
}
