//! Reconciler for converging declared resources.
//!
//! A pass walks the manifest once: for every declared resource it builds a
//! tick request from the manifest entry and its state record, runs the
//! engine for the resource's kind, and writes the outcome back to state.
//! Records that are no longer declared are deleted.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::adapter::{
    ClusterAdapter, ClusterSpec, DatabaseAdapter, DatabaseSpec, DropletAdapter, DropletSpec,
    LoadBalancerAdapter, LoadBalancerSpec, RegistryAdapter, RegistrySpec, ResourceAdapter,
    SpaceAdapter, SpaceSpec,
};
use crate::cloud::{ClientSet, ExternalClient};
use crate::config::{ConfigHasher, Manifest, ResourceSpec};
use crate::engine::{Engine, NOT_FOUND_REASON, TickAction, TickRequest};
use crate::error::{Operation, ReconcileError, ReeflineError, Result, StateError};
use crate::resource::{
    Condition, ConnectionDetails, Identity, LastOperation, ReconcileResult, ResourceKind,
};
use crate::state::{HistoryEntry, ProviderState, ResourceRecord, StateStore, generate_holder_id};

/// Delay between attempts when the error suggests none.
const DEFAULT_RETRY_DELAY_SECS: u64 = 2;

/// Reason reported for records that are no longer declared.
const UNDECLARED_REASON: &str = "no longer declared";

/// Reason reported for resources without an identity.
const NOT_CREATED_REASON: &str = "not created yet";

/// Maps a manifest spec onto the spec type of one adapter.
trait ManifestKind: ResourceAdapter {
    fn narrow(spec: &ResourceSpec) -> Option<&Self::Spec>;
    fn widen(spec: Self::Spec) -> ResourceSpec;
}

macro_rules! manifest_kind {
    ($adapter:ty, $variant:ident, $spec:ty) => {
        impl ManifestKind for $adapter {
            fn narrow(spec: &ResourceSpec) -> Option<&$spec> {
                match spec {
                    ResourceSpec::$variant(s) => Some(s),
                    _ => None,
                }
            }

            fn widen(spec: $spec) -> ResourceSpec {
                ResourceSpec::$variant(spec)
            }
        }
    };
}

manifest_kind!(DropletAdapter, Droplet, DropletSpec);
manifest_kind!(DatabaseAdapter, Database, DatabaseSpec);
manifest_kind!(LoadBalancerAdapter, LoadBalancer, LoadBalancerSpec);
manifest_kind!(ClusterAdapter, KubernetesCluster, ClusterSpec);
manifest_kind!(RegistryAdapter, ContainerRegistry, RegistrySpec);
manifest_kind!(SpaceAdapter, Space, SpaceSpec);

/// Calls a generic method with the adapter and client of `$kind`.
macro_rules! with_kind {
    ($self:ident, $kind:expr, $method:ident($($arg:expr),* $(,)?)) => {
        match $kind {
            ResourceKind::Droplet => {
                $self.$method::<DropletAdapter, _>($self.clients.droplets(), $($arg),*).await
            }
            ResourceKind::Database => {
                $self.$method::<DatabaseAdapter, _>($self.clients.databases(), $($arg),*).await
            }
            ResourceKind::LoadBalancer => {
                $self
                    .$method::<LoadBalancerAdapter, _>($self.clients.load_balancers(), $($arg),*)
                    .await
            }
            ResourceKind::KubernetesCluster => {
                $self.$method::<ClusterAdapter, _>($self.clients.clusters(), $($arg),*).await
            }
            ResourceKind::ContainerRegistry => {
                $self.$method::<RegistryAdapter, _>($self.clients.registry(), $($arg),*).await
            }
            ResourceKind::Space => {
                $self.$method::<SpaceAdapter, _>($self.clients.spaces(), $($arg),*).await
            }
        }
    };
}

/// Reconciler for one manifest.
pub struct Reconciler<'a, S: StateStore, C: ClientSet> {
    /// Manifest being converged.
    manifest: &'a Manifest,
    /// State store.
    state_store: &'a S,
    /// One client per kind.
    clients: &'a C,
    /// Spec hasher.
    hasher: ConfigHasher,
    /// Maximum attempts per tick.
    max_attempts: u32,
    /// Fixed delay between attempts, overriding the error's suggestion.
    retry_delay: Option<Duration>,
}

/// Result of a reconciliation pass.
#[derive(Debug, Default, Serialize)]
pub struct ReconciliationResult {
    /// Whether every resource reconciled without error.
    pub success: bool,
    /// Number of resources created.
    pub created: usize,
    /// Number of resources updated.
    pub updated: usize,
    /// Number of resources deleted.
    pub deleted: usize,
    /// Number of resources left unchanged.
    pub unchanged: usize,
    /// Errors encountered, one per failed resource.
    pub errors: Vec<String>,
    /// State after the pass.
    #[serde(skip)]
    pub final_state: Option<ProviderState>,
}

/// What a pass would do to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlannedAction {
    /// Nothing to do.
    None,
    /// The remote object would be created.
    Create,
    /// The remote object would be updated.
    Update,
    /// The remote object would be deleted.
    Delete,
}

impl fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

/// Observed drift of one resource.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceDrift {
    /// Logical resource name.
    pub name: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Action the next pass would take.
    pub action: PlannedAction,
    /// Whether the remote object exists.
    pub exists: bool,
    /// Whether the remote object matches the desired spec.
    pub up_to_date: bool,
    /// Why the resource is not up to date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Current condition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

impl ResourceDrift {
    /// Returns true if the resource needs attention.
    #[must_use]
    pub fn has_drift(&self) -> bool {
        self.action != PlannedAction::None || !self.up_to_date
    }
}

/// Report of drift detection.
#[derive(Debug, Default, Serialize)]
pub struct DriftReport {
    /// Whether drift was detected.
    pub has_drift: bool,
    /// Per-resource findings, declared resources first.
    pub resources: Vec<ResourceDrift>,
    /// Number of declared resources.
    pub total_resources: usize,
    /// Number of remote objects found.
    pub observed_count: usize,
    /// Resources that could not be observed.
    pub errors: Vec<String>,
}

impl DriftReport {
    /// Returns true if the state is converged (no drift).
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        !self.has_drift
    }

    /// Returns the resources that need attention.
    pub fn drifted(&self) -> impl Iterator<Item = &ResourceDrift> {
        self.resources.iter().filter(|r| r.has_drift())
    }
}

/// One resource to tick in a pass.
#[derive(Debug, Clone)]
struct Job {
    name: String,
    external_name: Option<String>,
    spec: ResourceSpec,
    /// Hash of the declared spec; `None` for records being removed.
    declared_hash: Option<String>,
    publish: bool,
    deleting: bool,
}

/// Kind-erased outcome of a tick.
struct Applied {
    result: ReconcileResult,
    spec: ResourceSpec,
    identity: Option<Identity>,
    observation: Option<serde_json::Value>,
    condition: Option<Condition>,
    connection: ConnectionDetails,
    action: TickAction,
}

impl<'a, S: StateStore, C: ClientSet> Reconciler<'a, S, C> {
    /// Creates a new reconciler.
    #[must_use]
    pub const fn new(manifest: &'a Manifest, state_store: &'a S, clients: &'a C) -> Self {
        Self {
            manifest,
            state_store,
            clients,
            hasher: ConfigHasher::new(),
            max_attempts: 3,
            retry_delay: None,
        }
    }

    /// Sets the maximum attempts per tick.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Uses a fixed delay between attempts.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Converges every declared resource and removes undeclared ones.
    ///
    /// Failures are per resource: a failing resource keeps its record and
    /// the pass continues with the next one.
    ///
    /// # Errors
    ///
    /// Returns an error if the state lock cannot be taken or the state
    /// cannot be loaded.
    pub async fn reconcile(&self, cancel: &CancellationToken) -> Result<ReconciliationResult> {
        info!("Starting reconciliation for {}", self.manifest.project.name);
        debug!(
            "Manifest hash {}",
            self.hasher.short_hash(&self.hasher.hash_manifest(self.manifest))
        );
        self.locked_pass(false, cancel).await
    }

    /// Deletes every resource recorded in state.
    ///
    /// # Errors
    ///
    /// Returns an error if the state lock cannot be taken or the state
    /// cannot be loaded.
    pub async fn destroy(&self, cancel: &CancellationToken) -> Result<ReconciliationResult> {
        info!("Destroying resources of {}", self.manifest.project.name);
        self.locked_pass(true, cancel).await
    }

    /// Observes every resource without issuing mutating calls.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be loaded.
    pub async fn check_drift(&self, cancel: &CancellationToken) -> Result<DriftReport> {
        info!("Checking for drift in {}", self.manifest.project.name);

        let state = self.load_state().await?;
        let mut report = DriftReport {
            total_resources: self.manifest.resources.len(),
            ..DriftReport::default()
        };

        for job in self.jobs(&state, false) {
            let record = state.record(&job.name);
            let inspected = match self.check_kind(&job, record) {
                Ok(()) => {
                    let spec = record.map_or(&job.spec, |r| Self::tick_spec(&job, r));
                    with_kind!(self, job.spec.kind(), inspect(&job, spec, record, cancel))
                }
                Err(err) => Err(err),
            };
            match inspected {
                Ok(drift) => {
                    if drift.exists {
                        report.observed_count += 1;
                    }
                    report.resources.push(drift);
                }
                Err(err) => {
                    warn!("Cannot observe '{}': {err}", job.name);
                    report.errors.push(format!("{}: {err}", job.name));
                }
            }
        }

        report.has_drift = report.resources.iter().any(ResourceDrift::has_drift);
        Ok(report)
    }

    async fn locked_pass(
        &self,
        destroy: bool,
        cancel: &CancellationToken,
    ) -> Result<ReconciliationResult> {
        let lock = self.state_store.acquire_lock(&generate_holder_id()).await?;
        debug!("Acquired state lock {}", lock.lock_id);

        let result = self.pass(destroy, cancel).await;

        if let Err(e) = self.state_store.release_lock(&lock.lock_id).await {
            warn!("Failed to release state lock: {e}");
        }
        result
    }

    async fn pass(&self, destroy: bool, cancel: &CancellationToken) -> Result<ReconciliationResult> {
        let mut state = self.load_state().await?;
        let mut result = ReconciliationResult::default();

        for job in self.jobs(&state, destroy) {
            match self.reconcile_resource(&mut state, &job, cancel).await {
                Ok(action) => match action {
                    TickAction::Created => result.created += 1,
                    TickAction::Updated => result.updated += 1,
                    TickAction::Deleted | TickAction::Gone => result.deleted += 1,
                    TickAction::None => result.unchanged += 1,
                },
                Err(err) => {
                    error!("Failed to reconcile '{}': {err}", job.name);
                    if let Some(operation) = failed_operation(&err) {
                        let identity = state.record(&job.name).and_then(|r| r.identity.clone());
                        state.add_history(HistoryEntry::failed(
                            operation,
                            &job.name,
                            job.spec.kind(),
                            identity,
                            &err.to_string(),
                        ));
                    }
                    result.errors.push(format!("{}: {err}", job.name));
                    if cancel.is_cancelled() {
                        warn!("Reconciliation cancelled");
                        break;
                    }
                }
            }
        }

        if let Err(e) = self.state_store.save(&state).await {
            error!("Failed to save state: {e}");
            result.errors.push(format!("Failed to save state: {e}"));
        }

        info!(
            "Reconciliation finished: {} created, {} updated, {} deleted, {} unchanged, {} failed",
            result.created,
            result.updated,
            result.deleted,
            result.unchanged,
            result.errors.len()
        );

        result.success = result.errors.is_empty();
        result.final_state = Some(state);
        Ok(result)
    }

    async fn load_state(&self) -> Result<ProviderState> {
        Ok(self
            .state_store
            .load()
            .await?
            .unwrap_or_else(|| ProviderState::new(&self.manifest.project.name)))
    }

    /// Lists the resources of a pass: declared ones first, then records
    /// without a manifest entry. A destroy pass removes every record.
    fn jobs(&self, state: &ProviderState, destroy: bool) -> Vec<Job> {
        let removal = |record: &ResourceRecord| Job {
            name: record.name.clone(),
            external_name: None,
            spec: record.spec.clone(),
            declared_hash: None,
            publish: false,
            deleting: true,
        };

        if destroy {
            return state.resources.values().map(removal).collect();
        }

        let mut jobs: Vec<Job> = self
            .manifest
            .resources
            .iter()
            .map(|resource| Job {
                name: resource.name.clone(),
                external_name: resource.external_name.clone(),
                spec: resource.spec.clone(),
                declared_hash: Some(self.hasher.hash_spec(&resource.spec)),
                publish: resource.publish_connection,
                deleting: false,
            })
            .collect();

        jobs.extend(
            state
                .resources
                .values()
                .filter(|record| self.manifest.resource(&record.name).is_none())
                .map(removal),
        );
        jobs
    }

    fn check_kind(&self, job: &Job, record: Option<&ResourceRecord>) -> Result<()> {
        match record {
            Some(record) if record.kind() != job.spec.kind() => Err(ReconcileError::KindChanged {
                name: job.name.clone(),
                recorded: record.kind(),
                declared: job.spec.kind(),
            }
            .into()),
            _ => Ok(()),
        }
    }

    /// Picks the spec to tick with. The recorded spec carries
    /// late-initialized fields and wins while the declaration is unchanged.
    fn tick_spec<'r>(job: &'r Job, record: &'r ResourceRecord) -> &'r ResourceSpec {
        match &job.declared_hash {
            Some(hash) if *hash != record.spec_hash => {
                debug!("Declared spec of '{}' changed", job.name);
                &job.spec
            }
            _ => &record.spec,
        }
    }

    async fn reconcile_resource(
        &self,
        state: &mut ProviderState,
        job: &Job,
        cancel: &CancellationToken,
    ) -> Result<TickAction> {
        let record = state.record(&job.name).cloned();
        self.check_kind(job, record.as_ref())?;

        let spec = record.as_ref().map_or(&job.spec, |r| Self::tick_spec(job, r));
        let applied = with_kind!(self, job.spec.kind(), tick(job, spec, record.as_ref(), cancel))?;
        let kind = job.spec.kind();

        if applied.action.is_removed() {
            state.remove_record(&job.name);
            self.state_store.delete_connection_details(&job.name).await?;
            if applied.action == TickAction::Deleted {
                state.add_history(HistoryEntry::new(
                    LastOperation::Delete,
                    &job.name,
                    kind,
                    applied.identity,
                ));
            } else {
                info!("'{}' no longer exists, forgetting it", job.name);
            }
            self.state_store.save(state).await?;
            return Ok(applied.action);
        }

        let hash = job.declared_hash.as_deref().unwrap_or_default();
        let mut record =
            record.unwrap_or_else(|| ResourceRecord::new(&job.name, applied.spec.clone(), hash));
        if job.declared_hash.is_some() {
            record.spec_hash = hash.to_string();
        }
        record.spec = applied.spec;
        record.identity.clone_from(&applied.identity);
        record.observation = applied.observation;
        record.condition = applied.condition;
        record.diff_reason = applied.result.diff_reason;

        record.touch();
        state.set_record(record.clone());

        let operation = match applied.action {
            TickAction::Created => Some(LastOperation::Create),
            TickAction::Updated => Some(LastOperation::Update),
            _ => None,
        };
        if let Some(operation) = operation {
            state.add_history(HistoryEntry::new(operation, &job.name, kind, applied.identity));
        }

        // The identity must be on disk before anything else can fail.
        if applied.result.needs_persist || applied.action != TickAction::None {
            self.state_store.save(state).await?;
        }

        if job.publish && !applied.connection.is_empty() {
            self.state_store
                .save_connection_details(&job.name, &applied.connection)
                .await?;
            let keys: Vec<String> = applied.connection.keys().cloned().collect();
            if keys != record.connection_keys {
                record.connection_keys = keys;
                state.set_record(record);
                self.state_store.save(state).await?;
            }
        }
        Ok(applied.action)
    }

    async fn tick<A, K>(
        &self,
        client: &K,
        job: &Job,
        spec: &ResourceSpec,
        record: Option<&ResourceRecord>,
        cancel: &CancellationToken,
    ) -> Result<Applied>
    where
        A: ManifestKind,
        K: ExternalClient<A>,
    {
        let request = TickRequest::<A> {
            name: job.name.clone(),
            external_name: job.external_name.clone(),
            spec: narrow::<A>(spec)?.clone(),
            identity: record.and_then(|r| r.identity.clone()),
            observation: stored_observation::<A>(&job.name, record)?,
            condition: record.and_then(|r| r.condition),
            deleting: job.deleting,
            publish_connection: job.publish,
        };

        let engine = Engine::<A, K>::new(client);
        let mut attempt = 1;
        let outcome = loop {
            match engine.reconcile(request.clone(), cancel).await {
                Ok(outcome) => break outcome,
                Err(err) => {
                    let err = ReeflineError::from(err);
                    if attempt >= self.max_attempts || !should_retry(&err) {
                        return Err(err);
                    }
                    let delay = self.retry_delay.unwrap_or_else(|| {
                        Duration::from_secs(err.retry_delay_secs().unwrap_or(DEFAULT_RETRY_DELAY_SECS))
                    });
                    warn!(
                        "Tick of '{}' failed (attempt {attempt}/{}), retrying in {}s: {err}",
                        job.name,
                        self.max_attempts,
                        delay.as_secs()
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(err),
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        };

        let observation = outcome
            .observation
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StateError::serialization(e.to_string()))?;

        Ok(Applied {
            result: outcome.result,
            spec: A::widen(outcome.spec),
            identity: outcome.identity,
            observation,
            condition: outcome.condition,
            connection: outcome.connection,
            action: outcome.action,
        })
    }

    async fn inspect<A, K>(
        &self,
        client: &K,
        job: &Job,
        spec: &ResourceSpec,
        record: Option<&ResourceRecord>,
        cancel: &CancellationToken,
    ) -> Result<ResourceDrift>
    where
        A: ManifestKind,
        K: ExternalClient<A>,
    {
        let spec = narrow::<A>(spec)?;
        // Decoded only to surface a corrupt record before the next pass trips on it.
        stored_observation::<A>(&job.name, record)?;
        let identity = record.and_then(|r| r.identity.clone());

        let engine = Engine::<A, K>::new(client);
        let observed = engine.observe(spec, identity.as_ref(), false, cancel).await?;

        let mut drift = ResourceDrift {
            name: job.name.clone(),
            kind: A::KIND,
            action: PlannedAction::None,
            exists: observed.exists,
            up_to_date: observed.drift.is_up_to_date(),
            reason: observed.drift.reason().map(str::to_string),
            condition: observed.condition.or_else(|| record.and_then(|r| r.condition)),
        };

        if job.deleting {
            drift.action = PlannedAction::Delete;
            drift.reason = Some(UNDECLARED_REASON.to_string());
        } else if identity.is_none() {
            drift.action = PlannedAction::Create;
            drift.up_to_date = false;
            drift.reason = Some(NOT_CREATED_REASON.to_string());
        } else if !observed.exists {
            drift.up_to_date = false;
            drift.reason = Some(NOT_FOUND_REASON.to_string());
            drift.condition = Some(Condition::Unavailable);
        } else if !drift.up_to_date && engine.adapter().build_update_request(&observed.spec).is_some()
        {
            drift.action = PlannedAction::Update;
        }

        Ok(drift)
    }
}

fn narrow<A: ManifestKind>(spec: &ResourceSpec) -> Result<&A::Spec> {
    A::narrow(spec).ok_or_else(|| {
        ReeflineError::internal(format!("expected a {} spec, got {}", A::KIND, spec.kind()))
    })
}

fn stored_observation<A: ResourceAdapter>(
    name: &str,
    record: Option<&ResourceRecord>,
) -> Result<Option<A::Observation>> {
    let Some(record) = record else {
        return Ok(None);
    };
    record.observation_as::<A::Observation>().map_err(|e| {
        ReconcileError::CorruptObservation {
            name: name.to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

/// Retryable errors are retried, except a failed create: the request may
/// have been applied even though no identity came back.
fn should_retry(err: &ReeflineError) -> bool {
    let create_failed = matches!(
        err,
        ReeflineError::Reconcile(ReconcileError::Operation {
            operation: Operation::Create,
            ..
        })
    );
    err.is_retryable() && !create_failed
}

const fn failed_operation(err: &ReeflineError) -> Option<LastOperation> {
    match err {
        ReeflineError::Reconcile(ReconcileError::Operation { operation, .. }) => match operation {
            Operation::Create => Some(LastOperation::Create),
            Operation::Update => Some(LastOperation::Update),
            Operation::Delete => Some(LastOperation::Delete),
            Operation::Observe | Operation::ConnectionDetails => None,
        },
        _ => None,
    }
}

impl fmt::Display for DriftReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_drift {
            writeln!(f, "Drift detected:")?;
            for resource in self.drifted() {
                write!(f, "  - {} ({}): {}", resource.name, resource.kind, resource.action)?;
                if let Some(reason) = &resource.reason {
                    write!(f, ", {reason}")?;
                }
                writeln!(f)?;
            }
        } else {
            writeln!(f, "No drift detected - state is converged")?;
        }
        for error in &self.errors {
            writeln!(f, "  ! {error}")?;
        }
        Ok(())
    }
}

impl fmt::Display for ReconciliationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.success { "successful" } else { "failed" };
        writeln!(f, "Reconciliation {status}:")?;
        writeln!(f, "  Created: {}", self.created)?;
        writeln!(f, "  Updated: {}", self.updated)?;
        writeln!(f, "  Deleted: {}", self.deleted)?;
        writeln!(f, "  Unchanged: {}", self.unchanged)?;

        if !self.errors.is_empty() {
            writeln!(f, "  Errors:")?;
            for error in &self.errors {
                writeln!(f, "    - {error}")?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{
        Database, DatabaseConnection, DatabaseCreateRequest, Droplet, Registry,
        RegistryWithSubscription, Subscription, SubscriptionTier,
    };
    use crate::config::{ProjectConfig, ProviderConfig, ResourceConfig, StateConfig};
    use crate::error::{CloudError, StateError};
    use crate::state::{LocalStateStore, LockInfo, MockStateStore};
    use crate::testing::{FakeClient, TestClients};
    use tempfile::TempDir;

    fn manifest(resources: Vec<ResourceConfig>) -> Manifest {
        Manifest {
            project: ProjectConfig {
                name: String::from("shop"),
            },
            provider: ProviderConfig::default(),
            state: StateConfig::default(),
            resources,
        }
    }

    fn droplet_spec() -> ResourceSpec {
        ResourceSpec::Droplet(DropletSpec {
            region: String::from("nyc1"),
            size: String::from("s-1vcpu-1gb"),
            image: String::from("ubuntu-20-04-x64"),
            ..DropletSpec::default()
        })
    }

    fn registry_spec(tier: &str) -> ResourceSpec {
        ResourceSpec::ContainerRegistry(RegistrySpec {
            subscription_tier: tier.to_string(),
            region: Some(String::from("fra1")),
        })
    }

    fn declare(name: &str, spec: ResourceSpec) -> ResourceConfig {
        ResourceConfig {
            name: name.to_string(),
            external_name: None,
            publish_connection: false,
            spec,
        }
    }

    fn record(name: &str, spec: ResourceSpec, identity: &str) -> ResourceRecord {
        let hash = ConfigHasher::new().hash_spec(&spec);
        let mut record = ResourceRecord::new(name, spec, &hash);
        record.identity = Some(Identity::new(identity));
        record.condition = Some(Condition::Available);
        record
    }

    fn active_droplet() -> Droplet {
        Droplet {
            id: 123,
            name: String::from("web"),
            status: String::from("active"),
            ..Droplet::default()
        }
    }

    fn registry_remote(tier: &str) -> RegistryWithSubscription {
        RegistryWithSubscription {
            registry: Registry {
                name: String::from("acme"),
                region: String::from("fra1"),
                ..Registry::default()
            },
            subscription: Some(Subscription {
                tier: SubscriptionTier {
                    slug: tier.to_string(),
                    ..SubscriptionTier::default()
                },
                ..Subscription::default()
            }),
        }
    }

    async fn seeded_store(dir: &TempDir, records: Vec<ResourceRecord>) -> LocalStateStore {
        let store = LocalStateStore::with_base_dir(dir.path());
        let mut state = ProviderState::new("shop");
        for record in records {
            state.set_record(record);
        }
        store.save(&state).await.expect("seed state");
        store
    }

    async fn load(store: &LocalStateStore) -> ProviderState {
        store.load().await.expect("load").expect("state exists")
    }

    #[tokio::test]
    async fn test_creates_then_converges() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalStateStore::with_base_dir(dir.path());
        let clients = TestClients::new();
        let manifest = manifest(vec![declare("web", droplet_spec())]);
        let reconciler = Reconciler::new(&manifest, &store, &clients);
        let cancel = CancellationToken::new();

        let first = tokio_test::assert_ok!(reconciler.reconcile(&cancel).await);
        assert!(first.success);
        assert_eq!(first.created, 1);

        let state = load(&store).await;
        let record = state.record("web").expect("record");
        assert_eq!(record.identity, Some(Identity::new("123")));
        assert_eq!(record.condition, Some(Condition::Creating));
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.history[0].operation, LastOperation::Create);

        clients.droplets.set_remote(Some(active_droplet()));
        let second = tokio_test::assert_ok!(reconciler.reconcile(&cancel).await);
        assert_eq!(second.created, 0);
        assert_eq!(second.unchanged, 1);
        assert_eq!(clients.droplets.created().len(), 1);

        let state = load(&store).await;
        let record = state.record("web").expect("record");
        assert_eq!(record.condition, Some(Condition::Available));
        assert!(!store.is_locked().await.expect("lock state"));
    }

    #[tokio::test]
    async fn test_external_name_is_used_for_create() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalStateStore::with_base_dir(dir.path());
        let clients = TestClients::new();
        let mut web = declare("web", droplet_spec());
        web.external_name = Some(String::from("web-prod-1"));
        let manifest = manifest(vec![web]);

        Reconciler::new(&manifest, &store, &clients)
            .reconcile(&CancellationToken::new())
            .await
            .expect("pass");

        assert_eq!(clients.droplets.created()[0].name, "web-prod-1");
    }

    #[tokio::test]
    async fn test_drifted_registry_is_updated() {
        let dir = TempDir::new().expect("tempdir");
        let store =
            seeded_store(&dir, vec![record("registry", registry_spec("basic"), "acme")]).await;
        let clients = TestClients::new();
        clients.registry.set_remote(Some(registry_remote("starter")));
        let manifest = manifest(vec![declare("registry", registry_spec("basic"))]);

        let result = Reconciler::new(&manifest, &store, &clients)
            .reconcile(&CancellationToken::new())
            .await
            .expect("pass");

        assert_eq!(result.updated, 1);
        let updates = clients.registry.updated();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, Identity::new("acme"));
        assert_eq!(updates[0].1.tier_slug, "basic");

        let state = load(&store).await;
        let last = state.history.last().expect("history");
        assert_eq!(last.operation, LastOperation::Update);
        assert!(last.success);
    }

    #[tokio::test]
    async fn test_changed_declaration_replaces_recorded_spec() {
        let dir = TempDir::new().expect("tempdir");
        let store =
            seeded_store(&dir, vec![record("registry", registry_spec("basic"), "acme")]).await;
        let clients = TestClients::new();
        clients.registry.set_remote(Some(registry_remote("basic")));
        let manifest = manifest(vec![declare("registry", registry_spec("professional"))]);

        let result = Reconciler::new(&manifest, &store, &clients)
            .reconcile(&CancellationToken::new())
            .await
            .expect("pass");

        assert_eq!(result.updated, 1);
        assert_eq!(clients.registry.updated()[0].1.tier_slug, "professional");
        let state = load(&store).await;
        let record = state.record("registry").expect("record");
        assert_eq!(record.spec, registry_spec("professional"));
        assert_eq!(
            record.spec_hash,
            ConfigHasher::new().hash_spec(&registry_spec("professional"))
        );
    }

    #[tokio::test]
    async fn test_undeclared_record_is_deleted() {
        let dir = TempDir::new().expect("tempdir");
        let store = seeded_store(&dir, vec![record("old", droplet_spec(), "123")]).await;
        let details = ConnectionDetails::from([(String::from("host"), String::from("10.0.0.1"))]);
        store
            .save_connection_details("old", &details)
            .await
            .expect("publish");
        let clients = TestClients::new();
        clients.droplets.set_remote(Some(active_droplet()));
        let manifest = manifest(vec![]);

        let result = Reconciler::new(&manifest, &store, &clients)
            .reconcile(&CancellationToken::new())
            .await
            .expect("pass");

        assert_eq!(result.deleted, 1);
        assert_eq!(clients.droplets.delete_calls(), 1);
        assert!(clients.droplets.remote().is_none());
        assert!(!store.connection_path("old").exists());

        let state = load(&store).await;
        assert!(state.record("old").is_none());
        assert_eq!(
            state.history.last().map(|h| h.operation),
            Some(LastOperation::Delete)
        );
    }

    #[tokio::test]
    async fn test_kind_change_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let store = seeded_store(&dir, vec![record("web", registry_spec("basic"), "acme")]).await;
        let clients = TestClients::new();
        let manifest = manifest(vec![declare("web", droplet_spec())]);

        let result = Reconciler::new(&manifest, &store, &clients)
            .reconcile(&CancellationToken::new())
            .await
            .expect("pass");

        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("changed kind"));
        assert!(clients.droplets.created().is_empty());

        let state = load(&store).await;
        let record = state.record("web").expect("record kept");
        assert_eq!(record.kind(), ResourceKind::ContainerRegistry);
    }

    #[tokio::test]
    async fn test_transient_observe_error_is_retried() {
        let dir = TempDir::new().expect("tempdir");
        let store = seeded_store(&dir, vec![record("web", droplet_spec(), "123")]).await;
        let clients = TestClients::new();
        clients.droplets.set_remote(Some(active_droplet()));
        clients.droplets.fail_get(CloudError::api(503, "unavailable"));
        let manifest = manifest(vec![declare("web", droplet_spec())]);

        let result = Reconciler::new(&manifest, &store, &clients)
            .with_retry_delay(Duration::ZERO)
            .reconcile(&CancellationToken::new())
            .await
            .expect("pass");

        assert!(result.success);
        assert_eq!(result.unchanged, 1);
        assert_eq!(clients.droplets.get_calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_create_is_not_retried() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalStateStore::with_base_dir(dir.path());
        let clients = TestClients::new();
        clients.droplets.fail_create(CloudError::network("connection reset"));
        let manifest = manifest(vec![declare("web", droplet_spec())]);

        let result = Reconciler::new(&manifest, &store, &clients)
            .with_retry_delay(Duration::ZERO)
            .reconcile(&CancellationToken::new())
            .await
            .expect("pass");

        assert_eq!(result.errors.len(), 1);
        assert!(clients.droplets.created().is_empty());

        let state = load(&store).await;
        assert!(state.record("web").is_none());
        let last = state.history.last().expect("history");
        assert_eq!(last.operation, LastOperation::Create);
        assert!(!last.success);
    }

    #[tokio::test]
    async fn test_permanent_error_keeps_record() {
        let dir = TempDir::new().expect("tempdir");
        let store =
            seeded_store(&dir, vec![record("registry", registry_spec("basic"), "acme")]).await;
        let clients = TestClients::new();
        clients.registry.set_remote(Some(registry_remote("starter")));
        clients.registry.fail_update(CloudError::api(422, "invalid tier"));
        let manifest = manifest(vec![declare("registry", registry_spec("basic"))]);

        let result = Reconciler::new(&manifest, &store, &clients)
            .reconcile(&CancellationToken::new())
            .await
            .expect("pass");

        assert!(!result.success);
        assert!(result.errors[0].contains("invalid tier"));

        let state = load(&store).await;
        let record = state.record("registry").expect("record");
        assert_eq!(record.condition, Some(Condition::Available));
        assert_eq!(record.diff_reason, None);
        assert!(record.observation.is_none());
        let last = state.history.last().expect("history");
        assert_eq!(last.operation, LastOperation::Update);
        assert!(!last.success);
    }

    #[tokio::test]
    async fn test_corrupt_observation_is_reported() {
        let dir = TempDir::new().expect("tempdir");
        let mut web = record("web", droplet_spec(), "123");
        web.observation = Some(serde_json::json!({ "unexpected": true }));
        let store = seeded_store(&dir, vec![web]).await;
        let clients = TestClients::new();
        let manifest = manifest(vec![declare("web", droplet_spec())]);

        let result = Reconciler::new(&manifest, &store, &clients)
            .reconcile(&CancellationToken::new())
            .await
            .expect("pass");

        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("unreadable"));
        assert_eq!(clients.droplets.get_calls(), 0);
    }

    #[tokio::test]
    async fn test_published_connection_details_are_written() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalStateStore::with_base_dir(dir.path());
        let mut clients = TestClients::new();
        clients.databases = clients.databases.with_extras(ConnectionDetails::from([(
            String::from("ca_certificate"),
            String::from("-----BEGIN CERTIFICATE-----"),
        )]));
        let mut db = declare(
            "db",
            ResourceSpec::Database(DatabaseSpec {
                engine: Some(String::from("pg")),
                num_nodes: 1,
                size: String::from("db-s-1vcpu-1gb"),
                region: String::from("nyc1"),
                ..DatabaseSpec::default()
            }),
        );
        db.publish_connection = true;
        let manifest = manifest(vec![db]);
        let reconciler = Reconciler::new(&manifest, &store, &clients);
        let cancel = CancellationToken::new();

        reconciler.reconcile(&cancel).await.expect("create pass");
        assert!(!store.connection_path("db").exists());

        reconciler.reconcile(&cancel).await.expect("observe pass");
        assert!(store.connection_path("db").exists());
        let state = load(&store).await;
        let record = state.record("db").expect("record");
        assert!(record.connection_keys.contains(&String::from("ca_certificate")));
    }

    #[tokio::test]
    async fn test_identity_survives_failed_connection_write() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalStateStore::with_base_dir(dir.path());
        std::fs::write(dir.path().join("connections"), "not a directory").expect("block dir");

        let mut clients = TestClients::new();
        clients.databases = FakeClient::new(|r: &DatabaseCreateRequest| Database {
            id: String::from("db-1"),
            name: r.name.clone(),
            engine: String::from("pg"),
            status: String::from("creating"),
            connection: Some(DatabaseConnection {
                host: String::from("db.example.com"),
                port: 25060,
                user: String::from("doadmin"),
                ..DatabaseConnection::default()
            }),
            ..Database::default()
        });
        let mut db = declare(
            "db",
            ResourceSpec::Database(DatabaseSpec {
                engine: Some(String::from("pg")),
                num_nodes: 1,
                size: String::from("db-s-1vcpu-1gb"),
                region: String::from("nyc1"),
                ..DatabaseSpec::default()
            }),
        );
        db.publish_connection = true;
        let manifest = manifest(vec![db]);
        let reconciler = Reconciler::new(&manifest, &store, &clients);
        let cancel = CancellationToken::new();

        let first = reconciler.reconcile(&cancel).await.expect("first pass");
        assert!(!first.success);
        let state = load(&store).await;
        let record = state.record("db").expect("record kept");
        assert_eq!(record.identity, Some(Identity::new("db-1")));
        assert!(record.connection_keys.is_empty());

        reconciler.reconcile(&cancel).await.expect("second pass");
        assert_eq!(clients.databases.created().len(), 1);
    }

    #[tokio::test]
    async fn test_destroy_removes_everything() {
        let dir = TempDir::new().expect("tempdir");
        let store = seeded_store(
            &dir,
            vec![
                record("web", droplet_spec(), "123"),
                record("registry", registry_spec("basic"), "acme"),
            ],
        )
        .await;
        let clients = TestClients::new();
        clients.droplets.set_remote(Some(active_droplet()));
        let manifest = manifest(vec![
            declare("web", droplet_spec()),
            declare("registry", registry_spec("basic")),
        ]);

        let result = Reconciler::new(&manifest, &store, &clients)
            .destroy(&CancellationToken::new())
            .await
            .expect("destroy");

        assert!(result.success);
        assert_eq!(result.deleted, 2);
        assert_eq!(clients.droplets.delete_calls(), 1);
        assert!(load(&store).await.resources.is_empty());
    }

    #[tokio::test]
    async fn test_check_drift_plans_without_mutating() {
        let dir = TempDir::new().expect("tempdir");
        let store = seeded_store(
            &dir,
            vec![
                record("registry", registry_spec("basic"), "acme"),
                record("old", droplet_spec(), "99"),
            ],
        )
        .await;
        let clients = TestClients::new();
        clients.registry.set_remote(Some(registry_remote("starter")));
        let manifest = manifest(vec![
            declare("web", droplet_spec()),
            declare("registry", registry_spec("basic")),
        ]);

        let report = Reconciler::new(&manifest, &store, &clients)
            .check_drift(&CancellationToken::new())
            .await
            .expect("drift");

        assert!(report.has_drift);
        assert_eq!(report.total_resources, 2);
        assert_eq!(report.observed_count, 1);
        let actions: Vec<(&str, PlannedAction)> = report
            .resources
            .iter()
            .map(|r| (r.name.as_str(), r.action))
            .collect();
        assert_eq!(
            actions,
            vec![
                ("web", PlannedAction::Create),
                ("registry", PlannedAction::Update),
                ("old", PlannedAction::Delete),
            ]
        );
        assert!(clients.droplets.created().is_empty());
        assert!(clients.registry.updated().is_empty());
        assert_eq!(clients.droplets.delete_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_remote_is_reported_not_recreated() {
        let dir = TempDir::new().expect("tempdir");
        let store = seeded_store(&dir, vec![record("web", droplet_spec(), "123")]).await;
        let clients = TestClients::new();
        let manifest = manifest(vec![declare("web", droplet_spec())]);

        let result = Reconciler::new(&manifest, &store, &clients)
            .reconcile(&CancellationToken::new())
            .await
            .expect("pass");

        assert_eq!(result.unchanged, 1);
        assert!(clients.droplets.created().is_empty());
        let state = load(&store).await;
        let record = state.record("web").expect("record");
        assert_eq!(record.condition, Some(Condition::Unavailable));
        assert_eq!(record.diff_reason.as_deref(), Some(NOT_FOUND_REASON));
    }

    #[tokio::test]
    async fn test_create_is_persisted_immediately() {
        let mut store = MockStateStore::new();
        store
            .expect_acquire_lock()
            .times(1)
            .returning(|holder| Ok(LockInfo::new(holder, 60)));
        store.expect_load().times(1).returning(|| Ok(None));
        // Once after the create, once at the end of the pass.
        store.expect_save().times(2).returning(|_| Ok(()));
        store.expect_release_lock().times(1).returning(|_| Ok(()));
        let clients = TestClients::new();
        let manifest = manifest(vec![declare("web", droplet_spec())]);

        let result = Reconciler::new(&manifest, &store, &clients)
            .reconcile(&CancellationToken::new())
            .await
            .expect("pass");

        assert_eq!(result.created, 1);
    }

    #[tokio::test]
    async fn test_held_lock_aborts_pass() {
        let mut store = MockStateStore::new();
        store.expect_acquire_lock().times(1).returning(|_| {
            Err(StateError::LockedByOther {
                holder: String::from("ci-runner"),
                since: String::from("2024-01-01T00:00:00Z"),
            }
            .into())
        });
        store.expect_load().never();
        let clients = TestClients::new();
        let manifest = manifest(vec![declare("web", droplet_spec())]);

        let result = Reconciler::new(&manifest, &store, &clients)
            .reconcile(&CancellationToken::new())
            .await;

        tokio_test::assert_err!(result);
        assert!(clients.droplets.created().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_pass_stops_and_unlocks() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalStateStore::with_base_dir(dir.path());
        let clients = TestClients::new();
        let manifest = manifest(vec![
            declare("web", droplet_spec()),
            declare("registry", registry_spec("basic")),
        ]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = Reconciler::new(&manifest, &store, &clients)
            .reconcile(&cancel)
            .await
            .expect("pass");

        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("cancelled"));
        assert!(clients.droplets.created().is_empty());
        assert!(!store.is_locked().await.expect("lock state"));
    }
}
