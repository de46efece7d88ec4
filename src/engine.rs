//! Reconciliation engine.
//!
//! One engine instance drives one resource kind through an [`ExternalClient`].
//! A tick observes the remote object, late-initializes the desired spec,
//! checks for drift, issues at most one mutating call and derives the
//! condition. The engine keeps no state between ticks: identity, spec and
//! observation are passed in and handed back explicitly.

use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::{DriftCheck, ResourceAdapter};
use crate::cloud::ExternalClient;
use crate::error::{CloudResult, Operation, ReconcileError};
use crate::resource::{
    Condition, ConnectionDetails, Identity, LastOperation, ReconcileResult, derive_condition,
    ignore_not_found,
};

/// Diff reason reported when a held identity no longer resolves.
pub const NOT_FOUND_REASON: &str = "external resource not found";

/// Result type of engine operations.
pub type EngineResult<T> = std::result::Result<T, ReconcileError>;

/// Outcome of an observe call.
#[derive(Debug, Clone)]
pub struct Observed<A: ResourceAdapter> {
    /// Whether the remote object exists.
    pub exists: bool,
    /// Fresh snapshot, when the object exists.
    pub observation: Option<A::Observation>,
    /// Drift between the late-initialized spec and the snapshot.
    pub drift: DriftCheck,
    /// Desired spec after late-initialization.
    pub spec: A::Spec,
    /// Whether late-initialization changed the spec.
    pub spec_changed: bool,
    /// Condition derived from the remote status.
    pub condition: Option<Condition>,
    /// Connection material, when requested and the object exists.
    pub connection: ConnectionDetails,
}

/// Outcome of a successful create.
#[derive(Debug, Clone)]
pub struct Created<A: ResourceAdapter> {
    /// Identity assigned by the server. Must be persisted before the next tick.
    pub identity: Identity,
    /// Snapshot of the object as returned by the create call.
    pub observation: A::Observation,
    /// Always [`Condition::Creating`].
    pub condition: Condition,
    /// Connection material derivable from the create response.
    pub connection: ConnectionDetails,
}

/// Input of one tick.
#[derive(Debug, Clone)]
pub struct TickRequest<A: ResourceAdapter> {
    /// Logical resource name.
    pub name: String,
    /// Name to create the remote object under, when it differs.
    pub external_name: Option<String>,
    /// Desired spec as last persisted.
    pub spec: A::Spec,
    /// Identity, once assigned.
    pub identity: Option<Identity>,
    /// Last persisted observation.
    pub observation: Option<A::Observation>,
    /// Last persisted condition.
    pub condition: Option<Condition>,
    /// Whether the resource should be removed.
    pub deleting: bool,
    /// Whether connection details should be gathered.
    pub publish_connection: bool,
}

impl<A: ResourceAdapter> TickRequest<A> {
    /// Creates a request for a resource that has never been reconciled.
    #[must_use]
    pub fn new(name: impl Into<String>, spec: A::Spec) -> Self {
        Self {
            name: name.into(),
            external_name: None,
            spec,
            identity: None,
            observation: None,
            condition: None,
            deleting: false,
            publish_connection: false,
        }
    }
}

/// The mutating call issued by a tick, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// No call was needed.
    None,
    /// The remote object was created.
    Created,
    /// The remote object was updated.
    Updated,
    /// A delete was accepted.
    Deleted,
    /// The resource is being deleted and no remote object is left.
    Gone,
}

impl TickAction {
    /// Returns true once the caller can forget the resource.
    #[must_use]
    pub const fn is_removed(&self) -> bool {
        matches!(self, Self::Deleted | Self::Gone)
    }
}

/// Output of one tick.
#[derive(Debug, Clone)]
pub struct TickOutcome<A: ResourceAdapter> {
    /// Flags reported to the caller.
    pub result: ReconcileResult,
    /// Desired spec after late-initialization.
    pub spec: A::Spec,
    /// Identity after the tick.
    pub identity: Option<Identity>,
    /// Latest snapshot.
    pub observation: Option<A::Observation>,
    /// Condition after the tick.
    pub condition: Option<Condition>,
    /// Connection material gathered during the tick.
    pub connection: ConnectionDetails,
    /// Mutating call issued.
    pub action: TickAction,
}

/// Reconciliation engine for one resource kind.
pub struct Engine<'a, A: ResourceAdapter, C: ExternalClient<A>> {
    adapter: A,
    client: &'a C,
}

impl<'a, A: ResourceAdapter, C: ExternalClient<A>> Engine<'a, A, C> {
    /// Creates an engine that borrows the given client.
    #[must_use]
    pub fn new(client: &'a C) -> Self {
        Self {
            adapter: A::default(),
            client,
        }
    }

    /// Returns the adapter.
    #[must_use]
    pub const fn adapter(&self) -> &A {
        &self.adapter
    }

    async fn race<T, F>(
        operation: Operation,
        cancel: &CancellationToken,
        call: F,
    ) -> EngineResult<CloudResult<T>>
    where
        F: Future<Output = CloudResult<T>>,
    {
        if cancel.is_cancelled() {
            return Err(Self::cancelled(operation));
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Self::cancelled(operation)),
            result = call => Ok(result),
        }
    }

    const fn cancelled(operation: Operation) -> ReconcileError {
        ReconcileError::Cancelled {
            kind: A::KIND,
            operation,
        }
    }

    /// Fetches the remote object and late-initializes the spec.
    ///
    /// Without an identity nothing is fetched. A not-found answer is
    /// reported as `exists = false`.
    ///
    /// # Errors
    ///
    /// Returns an error if a fetch fails for any other reason, or if the
    /// token is cancelled.
    pub async fn observe(
        &self,
        spec: &A::Spec,
        identity: Option<&Identity>,
        publish: bool,
        cancel: &CancellationToken,
    ) -> EngineResult<Observed<A>> {
        let absent = || Observed {
            exists: false,
            observation: None,
            drift: DriftCheck::UpToDate,
            spec: spec.clone(),
            spec_changed: false,
            condition: None,
            connection: ConnectionDetails::new(),
        };

        let Some(identity) = identity else {
            debug!("No identity for {}, skipping observe", A::KIND);
            return Ok(absent());
        };

        let fetched = Self::race(Operation::Observe, cancel, self.client.get(identity, spec)).await?;
        let Some(remote) = ignore_not_found(fetched)
            .map_err(|e| ReconcileError::operation(A::KIND, Operation::Observe, e))?
        else {
            debug!("{} {identity} not found", A::KIND);
            return Ok(absent());
        };

        let mut spec = spec.clone();
        let spec_changed = self.adapter.late_init(&mut spec, &remote);
        if spec_changed {
            debug!("Late-initialized {} {identity}", A::KIND);
        }

        let observation = self.adapter.to_observation(&remote);
        let drift = self.adapter.is_up_to_date(&spec, &observation);
        let condition = derive_condition(A::KIND, self.adapter.remote_status(&observation), None);

        let mut connection = ConnectionDetails::new();
        if publish {
            connection = self.adapter.connection_details(&remote);
            let extras = Self::race(
                Operation::ConnectionDetails,
                cancel,
                self.client.connection_extras(&remote),
            )
            .await?
            .map_err(|e| ReconcileError::operation(A::KIND, Operation::ConnectionDetails, e))?;
            connection.extend(extras);
        }

        Ok(Observed {
            exists: true,
            observation: Some(observation),
            drift,
            spec,
            spec_changed,
            condition: Some(condition),
            connection,
        })
    }

    /// Creates the remote object.
    ///
    /// The object is named `external_name` when set, else `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if an identity is already held, if no name is
    /// available, or if the create call fails or is cancelled.
    pub async fn apply(
        &self,
        name: &str,
        external_name: Option<&str>,
        spec: &A::Spec,
        identity: Option<&Identity>,
        cancel: &CancellationToken,
    ) -> EngineResult<Created<A>> {
        if let Some(identity) = identity {
            return Err(ReconcileError::IdentityAlreadyAssigned {
                kind: A::KIND,
                identity: identity.to_string(),
            });
        }

        let remote_name = external_name.filter(|n| !n.is_empty()).unwrap_or(name);
        if remote_name.is_empty() {
            return Err(ReconcileError::NameRequired { kind: A::KIND });
        }

        let request = self.adapter.build_create_request(remote_name, spec);
        debug!("Create request for {} {remote_name}: {request:?}", A::KIND);

        let remote = Self::race(Operation::Create, cancel, self.client.create(&request))
            .await?
            .map_err(|e| ReconcileError::operation(A::KIND, Operation::Create, e))?;

        let identity = self.adapter.identity(&remote);
        info!("Created {} {remote_name} ({identity})", A::KIND);

        let observation = self.adapter.to_observation(&remote);
        Ok(Created {
            identity,
            condition: derive_condition(
                A::KIND,
                self.adapter.remote_status(&observation),
                Some(LastOperation::Create),
            ),
            connection: self.adapter.connection_details(&remote),
            observation,
        })
    }

    /// Updates the remote object in place.
    ///
    /// Returns true if an update request was sent. Immutable kinds and
    /// resources without an identity are a successful no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the update call fails or is cancelled.
    pub async fn update(
        &self,
        identity: Option<&Identity>,
        spec: &A::Spec,
        cancel: &CancellationToken,
    ) -> EngineResult<bool> {
        let Some(identity) = identity else {
            return Ok(false);
        };
        let Some(request) = self.adapter.build_update_request(spec) else {
            debug!("{} is immutable, nothing to update", A::KIND);
            return Ok(false);
        };

        Self::race(Operation::Update, cancel, self.client.update(identity, &request))
            .await?
            .map_err(|e| ReconcileError::operation(A::KIND, Operation::Update, e))?;

        info!("Updated {} {identity}", A::KIND);
        Ok(true)
    }

    /// Deletes the remote object.
    ///
    /// Returns true if the delete was accepted. A not-found answer and a
    /// missing identity are a successful no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete call fails or is cancelled.
    pub async fn remove(
        &self,
        identity: Option<&Identity>,
        spec: &A::Spec,
        cancel: &CancellationToken,
    ) -> EngineResult<bool> {
        let Some(identity) = identity else {
            return Ok(false);
        };

        let deleted = Self::race(Operation::Delete, cancel, self.client.delete(identity, spec)).await?;
        let accepted = ignore_not_found(deleted)
            .map_err(|e| ReconcileError::operation(A::KIND, Operation::Delete, e))?
            .is_some();

        if accepted {
            info!("Deleted {} {identity}", A::KIND);
        } else {
            debug!("{} {identity} already gone", A::KIND);
        }
        Ok(accepted)
    }

    /// Runs one tick.
    ///
    /// # Errors
    ///
    /// Returns the first failing step. State from before the tick remains
    /// valid in that case; an already dispatched call is not rolled back.
    pub async fn reconcile(
        &self,
        request: TickRequest<A>,
        cancel: &CancellationToken,
    ) -> EngineResult<TickOutcome<A>> {
        let TickRequest {
            name,
            external_name,
            spec,
            identity,
            observation,
            condition,
            deleting,
            publish_connection,
        } = request;

        let observed = self
            .observe(&spec, identity.as_ref(), publish_connection && !deleting, cancel)
            .await?;

        let mut outcome = TickOutcome {
            result: ReconcileResult {
                exists: observed.exists,
                up_to_date: observed.drift.is_up_to_date(),
                diff_reason: observed.drift.reason().map(str::to_string),
                needs_persist: observed.spec_changed,
            },
            spec: observed.spec,
            identity,
            observation: observed.observation.or(observation),
            condition: observed.condition.or(condition),
            connection: observed.connection,
            action: TickAction::None,
        };

        if deleting {
            if !observed.exists {
                outcome.action = TickAction::Gone;
                return Ok(outcome);
            }
            if observed.condition == Some(Condition::Deleting) {
                debug!("{} {name} is already being deleted", A::KIND);
                return Ok(outcome);
            }
            let accepted = self.remove(outcome.identity.as_ref(), &outcome.spec, cancel).await?;
            outcome.action = if accepted { TickAction::Deleted } else { TickAction::Gone };
            outcome.condition = Some(derive_condition(A::KIND, None, Some(LastOperation::Delete)));
            return Ok(outcome);
        }

        if outcome.identity.is_none() {
            let created = self
                .apply(&name, external_name.as_deref(), &outcome.spec, None, cancel)
                .await?;
            outcome.result.exists = true;
            outcome.result.up_to_date = true;
            outcome.result.diff_reason = None;
            outcome.result.needs_persist = true;
            outcome.identity = Some(created.identity);
            outcome.observation = Some(created.observation);
            outcome.condition = Some(created.condition);
            if publish_connection {
                outcome.connection = created.connection;
            }
            outcome.action = TickAction::Created;
            return Ok(outcome);
        }

        if !observed.exists {
            warn!(
                "{} {name} has identity {} but no remote object",
                A::KIND,
                outcome.identity.as_ref().map_or("", Identity::as_str)
            );
            outcome.result.up_to_date = false;
            outcome.result.diff_reason = Some(NOT_FOUND_REASON.to_string());
            outcome.condition = Some(Condition::Unavailable);
            return Ok(outcome);
        }

        if !outcome.result.up_to_date {
            debug!(
                "{} {name} drifted: {}",
                A::KIND,
                outcome.result.diff_reason.as_deref().unwrap_or_default()
            );
            if self.update(outcome.identity.as_ref(), &outcome.spec, cancel).await? {
                outcome.action = TickAction::Updated;
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{
        ClusterAdapter, ClusterSpec, DatabaseAdapter, DatabaseSpec, DropletAdapter,
        DropletObservation, DropletSpec, LoadBalancerAdapter, LoadBalancerSpec, RegistryAdapter,
        RegistrySpec, SUBSCRIPTION_DRIFT, SpaceAdapter, SpaceSpec,
    };
    use crate::cloud::{
        Database, DatabaseConnection, Droplet, ImageRef, KubernetesCluster, KubernetesStatus,
        LoadBalancer, Registry, RegistryWithSubscription, Subscription, SubscriptionTier,
    };
    use crate::error::CloudError;
    use crate::resource::ResourceKind;
    use crate::testing::TestClients;
    use std::time::Duration;

    fn droplet_spec() -> DropletSpec {
        DropletSpec {
            region: String::from("nyc1"),
            size: String::from("s-1vcpu-1gb"),
            image: String::from("ubuntu-20-04-x64"),
            ..DropletSpec::default()
        }
    }

    fn active_droplet() -> Droplet {
        Droplet {
            id: 123,
            name: String::from("web"),
            status: String::from("active"),
            ..Droplet::default()
        }
    }

    fn registry(tier: &str) -> RegistryWithSubscription {
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

    #[tokio::test]
    async fn test_first_tick_creates_droplet() {
        let clients = TestClients::new();
        let engine: Engine<'_, DropletAdapter, _> = Engine::new(&clients.droplets);
        let cancel = CancellationToken::new();

        let observed = engine
            .observe(&droplet_spec(), None, false, &cancel)
            .await
            .expect("observe");
        assert!(!observed.exists);
        assert_eq!(clients.droplets.get_calls(), 0);

        let outcome = engine
            .reconcile(TickRequest::new("web", droplet_spec()), &cancel)
            .await
            .expect("tick");

        assert_eq!(outcome.action, TickAction::Created);
        assert_eq!(outcome.identity, Some(Identity::new("123")));
        assert_eq!(outcome.condition, Some(Condition::Creating));
        assert!(outcome.result.needs_persist);

        let created = clients.droplets.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].image, ImageRef::Slug(String::from("ubuntu-20-04-x64")));
        assert_eq!(created[0].image.id(), None);
    }

    #[tokio::test]
    async fn test_second_tick_reports_available() {
        let clients = TestClients::new();
        clients.droplets.set_remote(Some(active_droplet()));
        let engine: Engine<'_, DropletAdapter, _> = Engine::new(&clients.droplets);

        let mut request = TickRequest::new("web", droplet_spec());
        request.identity = Some(Identity::new("123"));
        request.condition = Some(Condition::Creating);

        let outcome = engine
            .reconcile(request, &CancellationToken::new())
            .await
            .expect("tick");

        assert_eq!(outcome.action, TickAction::None);
        assert_eq!(outcome.condition, Some(Condition::Available));
        assert!(outcome.result.exists);
        assert!(outcome.result.up_to_date);
        assert!(!outcome.result.needs_persist);
        assert!(clients.droplets.created().is_empty());
    }

    #[tokio::test]
    async fn test_late_init_requests_persist() {
        let clients = TestClients::new();
        clients.droplets.set_remote(Some(Droplet {
            tags: vec![String::from("web")],
            vpc_uuid: String::from("vpc-1"),
            ..active_droplet()
        }));
        let engine: Engine<'_, DropletAdapter, _> = Engine::new(&clients.droplets);

        let mut spec = droplet_spec();
        spec.tags = vec![String::from("mine")];
        let observed = engine
            .observe(&spec, Some(&Identity::new("123")), false, &CancellationToken::new())
            .await
            .expect("observe");

        assert!(observed.spec_changed);
        assert_eq!(observed.spec.tags, vec![String::from("mine")]);
        assert_eq!(observed.spec.vpc_uuid.as_deref(), Some("vpc-1"));
    }

    #[tokio::test]
    async fn test_apply_rejects_held_identity_and_empty_name() {
        let clients = TestClients::new();
        let engine: Engine<'_, DropletAdapter, _> = Engine::new(&clients.droplets);
        let cancel = CancellationToken::new();

        let held = engine
            .apply("web", None, &droplet_spec(), Some(&Identity::new("123")), &cancel)
            .await
            .expect_err("identity held");
        assert!(matches!(held, ReconcileError::IdentityAlreadyAssigned { .. }));

        let unnamed = engine
            .apply("", Some(""), &droplet_spec(), None, &cancel)
            .await
            .expect_err("no name");
        assert!(matches!(unnamed, ReconcileError::NameRequired { .. }));
        assert!(clients.droplets.created().is_empty());
    }

    #[tokio::test]
    async fn test_external_name_wins() {
        let clients = TestClients::new();
        let engine: Engine<'_, DropletAdapter, _> = Engine::new(&clients.droplets);
        engine
            .apply("web", Some("web-prod-1"), &droplet_spec(), None, &CancellationToken::new())
            .await
            .expect("create");
        assert_eq!(clients.droplets.created()[0].name, "web-prod-1");
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let clients = TestClients::new();
        clients.droplets.set_remote(Some(active_droplet()));
        let engine: Engine<'_, DropletAdapter, _> = Engine::new(&clients.droplets);
        let cancel = CancellationToken::new();
        let id = Identity::new("123");

        assert!(engine.remove(Some(&id), &droplet_spec(), &cancel).await.expect("first"));
        assert!(!engine.remove(Some(&id), &droplet_spec(), &cancel).await.expect("second"));
        assert!(!engine.remove(None, &droplet_spec(), &cancel).await.expect("no identity"));
        assert_eq!(clients.droplets.delete_calls(), 2);
    }

    #[tokio::test]
    async fn test_remove_treats_missing_identity_error_as_gone() {
        let clients = TestClients::new();
        clients.droplets.set_remote(Some(active_droplet()));
        clients.droplets.fail_delete(CloudError::invalid_id("dropletID"));
        let engine: Engine<'_, DropletAdapter, _> = Engine::new(&clients.droplets);

        let accepted = engine
            .remove(Some(&Identity::new("0")), &droplet_spec(), &CancellationToken::new())
            .await
            .expect("ignorable");
        assert!(!accepted);
    }

    #[tokio::test]
    async fn test_delete_tick() {
        let clients = TestClients::new();
        clients.droplets.set_remote(Some(active_droplet()));
        let engine: Engine<'_, DropletAdapter, _> = Engine::new(&clients.droplets);
        let cancel = CancellationToken::new();

        let mut request = TickRequest::new("web", droplet_spec());
        request.identity = Some(Identity::new("123"));
        request.deleting = true;

        let outcome = engine.reconcile(request.clone(), &cancel).await.expect("delete");
        assert_eq!(outcome.action, TickAction::Deleted);
        assert_eq!(outcome.condition, Some(Condition::Deleting));

        let again = engine.reconcile(request, &cancel).await.expect("gone");
        assert_eq!(again.action, TickAction::Gone);
        assert!(again.action.is_removed());
    }

    #[tokio::test]
    async fn test_missing_remote_is_not_recreated() {
        let clients = TestClients::new();
        let engine: Engine<'_, DropletAdapter, _> = Engine::new(&clients.droplets);

        let mut request = TickRequest::new("web", droplet_spec());
        request.identity = Some(Identity::new("123"));
        request.observation = Some(DropletObservation::default());

        let outcome = engine
            .reconcile(request, &CancellationToken::new())
            .await
            .expect("tick");

        assert_eq!(outcome.action, TickAction::None);
        assert!(!outcome.result.exists);
        assert_eq!(outcome.result.diff_reason.as_deref(), Some(NOT_FOUND_REASON));
        assert_eq!(outcome.condition, Some(Condition::Unavailable));
        assert_eq!(outcome.identity, Some(Identity::new("123")));
        assert!(outcome.observation.is_some());
        assert!(clients.droplets.created().is_empty());
    }

    #[tokio::test]
    async fn test_observe_error_is_wrapped() {
        let clients = TestClients::new();
        clients.droplets.set_remote(Some(active_droplet()));
        clients.droplets.fail_get(CloudError::api(500, "boom"));
        let engine: Engine<'_, DropletAdapter, _> = Engine::new(&clients.droplets);

        let err = engine
            .observe(&droplet_spec(), Some(&Identity::new("123")), false, &CancellationToken::new())
            .await
            .expect_err("server error");

        match err {
            ReconcileError::Operation {
                kind,
                operation,
                source,
            } => {
                assert_eq!(kind, ResourceKind::Droplet);
                assert_eq!(operation, Operation::Observe);
                assert_eq!(source.status(), Some(500));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_immutable_update_is_noop() {
        let clients = TestClients::new();
        let cancel = CancellationToken::new();
        let id = Identity::new("lb-1");

        let lb: Engine<'_, LoadBalancerAdapter, _> = Engine::new(&clients.load_balancers);
        assert!(!lb.update(Some(&id), &LoadBalancerSpec::default(), &cancel).await.expect("lb"));

        let space: Engine<'_, SpaceAdapter, _> = Engine::new(&clients.spaces);
        assert!(!space.update(Some(&id), &SpaceSpec::default(), &cancel).await.expect("space"));

        let droplet: Engine<'_, DropletAdapter, _> = Engine::new(&clients.droplets);
        assert!(!droplet.update(Some(&id), &droplet_spec(), &cancel).await.expect("droplet"));

        let database: Engine<'_, DatabaseAdapter, _> = Engine::new(&clients.databases);
        assert!(
            !database
                .update(Some(&id), &DatabaseSpec::default(), &cancel)
                .await
                .expect("database")
        );

        let cluster: Engine<'_, ClusterAdapter, _> = Engine::new(&clients.clusters);
        assert!(!cluster.update(Some(&id), &ClusterSpec::default(), &cancel).await.expect("cluster"));

        assert!(clients.load_balancers.updated().is_empty());
        assert!(clients.spaces.updated().is_empty());
        assert!(clients.droplets.updated().is_empty());
        assert!(clients.databases.updated().is_empty());
        assert!(clients.clusters.updated().is_empty());
    }

    #[tokio::test]
    async fn test_delete_skips_cluster_already_deleting() {
        let clients = TestClients::new();
        clients.clusters.set_remote(Some(KubernetesCluster {
            id: String::from("k8s-1"),
            name: String::from("prod"),
            status: KubernetesStatus {
                state: String::from("deleting"),
                message: String::new(),
            },
            ..KubernetesCluster::default()
        }));
        let engine: Engine<'_, ClusterAdapter, _> = Engine::new(&clients.clusters);

        let mut request = TickRequest::new("prod", ClusterSpec::default());
        request.identity = Some(Identity::new("k8s-1"));
        request.deleting = true;

        let outcome = engine
            .reconcile(request, &CancellationToken::new())
            .await
            .expect("tick");
        assert_eq!(outcome.action, TickAction::None);
        assert_eq!(outcome.condition, Some(Condition::Deleting));
        assert_eq!(clients.clusters.delete_calls(), 0);
    }

    #[tokio::test]
    async fn test_registry_tier_drift_updates_subscription() {
        let clients = TestClients::new();
        clients.registry.set_remote(Some(registry("basic")));
        let engine: Engine<'_, RegistryAdapter, _> = Engine::new(&clients.registry);

        let mut request = TickRequest::new(
            "acme",
            RegistrySpec {
                subscription_tier: String::from("starter"),
                region: None,
            },
        );
        request.identity = Some(Identity::new("acme"));

        let outcome = engine
            .reconcile(request, &CancellationToken::new())
            .await
            .expect("tick");

        assert!(!outcome.result.up_to_date);
        assert_eq!(outcome.result.diff_reason.as_deref(), Some(SUBSCRIPTION_DRIFT));
        assert_eq!(outcome.action, TickAction::Updated);
        assert_eq!(outcome.spec.region.as_deref(), Some("fra1"));
        assert!(outcome.result.needs_persist);

        let updates = clients.registry.updated();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].1.tier_slug, "starter");
    }

    #[tokio::test]
    async fn test_connection_details_merge_extras() {
        let extras = [(String::from("ca-certificate"), String::from("PEM"))]
            .into_iter()
            .collect();
        let mut clients = TestClients::new();
        clients.databases = clients.databases.with_extras(extras).with_remote(Database {
            id: String::from("db-1"),
            status: String::from("online"),
            connection: Some(DatabaseConnection {
                host: String::from("db.example.com"),
                port: 25060,
                user: String::from("doadmin"),
                password: String::from("secret"),
                ssl: true,
                ..DatabaseConnection::default()
            }),
            ..Database::default()
        });
        let engine: Engine<'_, DatabaseAdapter, _> = Engine::new(&clients.databases);

        let observed = engine
            .observe(
                &Default::default(),
                Some(&Identity::new("db-1")),
                true,
                &CancellationToken::new(),
            )
            .await
            .expect("observe");

        assert_eq!(observed.condition, Some(Condition::Available));
        assert_eq!(observed.connection.get("public-host").map(String::as_str), Some("db.example.com"));
        assert_eq!(observed.connection.get("ca-certificate").map(String::as_str), Some("PEM"));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_pending_fetch() {
        let mut clients = TestClients::new();
        clients.load_balancers = clients.load_balancers.hanging().with_remote(LoadBalancer::default());
        let engine: Engine<'_, LoadBalancerAdapter, _> = Engine::new(&clients.load_balancers);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let err = engine
            .observe(&LoadBalancerSpec::default(), Some(&Identity::new("lb-1")), false, &cancel)
            .await
            .expect_err("cancelled");
        assert!(matches!(
            err,
            ReconcileError::Cancelled {
                operation: Operation::Observe,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_create() {
        let clients = TestClients::new();
        let engine: Engine<'_, DropletAdapter, _> = Engine::new(&clients.droplets);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = engine
            .reconcile(TickRequest::new("web", droplet_spec()), &cancel)
            .await
            .expect_err("cancelled");
        assert!(matches!(err, ReconcileError::Cancelled { .. }));
        assert!(clients.droplets.created().is_empty());
    }
}
