//! In-memory fakes for engine and driver tests.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::adapter::{
    ClusterAdapter, DatabaseAdapter, DropletAdapter, LoadBalancerAdapter, RegistryAdapter,
    ResourceAdapter, SpaceAdapter, SpaceBucket, SpaceCreateRequest,
};
use crate::cloud::{
    ClientSet, Database, DatabaseCreateRequest, Droplet, DropletCreateRequest, ExternalClient,
    KubernetesCluster, KubernetesClusterCreateRequest, KubernetesStatus, LoadBalancer,
    LoadBalancerRequest, RegionRef, Registry, RegistryCreateRequest, RegistryWithSubscription,
};
use crate::error::{CloudError, CloudResult};
use crate::resource::{ConnectionDetails, Identity};

type Responder<A> =
    Box<dyn Fn(&<A as ResourceAdapter>::CreateRequest) -> <A as ResourceAdapter>::Remote + Send + Sync>;

/// A single remote object held in memory.
///
/// Scripted errors fire once, on the next call of that operation.
pub struct FakeClient<A: ResourceAdapter> {
    remote: Mutex<Option<A::Remote>>,
    respond: Responder<A>,
    get_error: Mutex<Option<CloudError>>,
    create_error: Mutex<Option<CloudError>>,
    update_error: Mutex<Option<CloudError>>,
    delete_error: Mutex<Option<CloudError>>,
    hang_on_get: bool,
    extras: ConnectionDetails,
    created: Mutex<Vec<A::CreateRequest>>,
    updated: Mutex<Vec<(Identity, A::UpdateRequest)>>,
    gets: AtomicUsize,
    deletes: AtomicUsize,
}

impl<A: ResourceAdapter> FakeClient<A> {
    /// Creates an empty fake; `respond` turns a create request into the remote object.
    pub fn new(respond: impl Fn(&A::CreateRequest) -> A::Remote + Send + Sync + 'static) -> Self {
        Self {
            remote: Mutex::new(None),
            respond: Box::new(respond),
            get_error: Mutex::new(None),
            create_error: Mutex::new(None),
            update_error: Mutex::new(None),
            delete_error: Mutex::new(None),
            hang_on_get: false,
            extras: ConnectionDetails::new(),
            created: Mutex::new(Vec::new()),
            updated: Mutex::new(Vec::new()),
            gets: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn with_remote(self, remote: A::Remote) -> Self {
        self.set_remote(Some(remote));
        self
    }

    pub fn with_extras(mut self, extras: ConnectionDetails) -> Self {
        self.extras = extras;
        self
    }

    /// Makes every get wait forever.
    pub fn hanging(mut self) -> Self {
        self.hang_on_get = true;
        self
    }

    pub fn fail_get(&self, error: CloudError) {
        *self.get_error.lock().expect("lock") = Some(error);
    }

    pub fn fail_create(&self, error: CloudError) {
        *self.create_error.lock().expect("lock") = Some(error);
    }

    pub fn fail_update(&self, error: CloudError) {
        *self.update_error.lock().expect("lock") = Some(error);
    }

    pub fn fail_delete(&self, error: CloudError) {
        *self.delete_error.lock().expect("lock") = Some(error);
    }

    pub fn set_remote(&self, remote: Option<A::Remote>) {
        *self.remote.lock().expect("lock") = remote;
    }

    pub fn remote(&self) -> Option<A::Remote> {
        self.remote.lock().expect("lock").clone()
    }

    pub fn created(&self) -> Vec<A::CreateRequest> {
        self.created.lock().expect("lock").clone()
    }

    pub fn updated(&self) -> Vec<(Identity, A::UpdateRequest)> {
        self.updated.lock().expect("lock").clone()
    }

    pub fn get_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    fn take(slot: &Mutex<Option<CloudError>>) -> CloudResult<()> {
        slot.lock().expect("lock").take().map_or(Ok(()), Err)
    }
}

fn not_found() -> CloudError {
    CloudError::api(404, "The resource you were accessing could not be found.")
}

#[async_trait]
impl<A: ResourceAdapter> ExternalClient<A> for FakeClient<A> {
    async fn get(&self, _identity: &Identity, _spec: &A::Spec) -> CloudResult<A::Remote> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.hang_on_get {
            std::future::pending::<()>().await;
        }
        Self::take(&self.get_error)?;
        self.remote().ok_or_else(not_found)
    }

    async fn create(&self, request: &A::CreateRequest) -> CloudResult<A::Remote> {
        Self::take(&self.create_error)?;
        let remote = (self.respond)(request);
        self.created.lock().expect("lock").push(request.clone());
        self.set_remote(Some(remote.clone()));
        Ok(remote)
    }

    async fn update(&self, identity: &Identity, request: &A::UpdateRequest) -> CloudResult<()> {
        Self::take(&self.update_error)?;
        self.updated
            .lock()
            .expect("lock")
            .push((identity.clone(), request.clone()));
        Ok(())
    }

    async fn delete(&self, _identity: &Identity, _spec: &A::Spec) -> CloudResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Self::take(&self.delete_error)?;
        match self.remote.lock().expect("lock").take() {
            Some(_) => Ok(()),
            None => Err(not_found()),
        }
    }

    async fn connection_extras(&self, _remote: &A::Remote) -> CloudResult<ConnectionDetails> {
        Ok(self.extras.clone())
    }
}

/// One fake per kind; creates answer with a freshly provisioned object.
pub struct TestClients {
    pub droplets: FakeClient<DropletAdapter>,
    pub databases: FakeClient<DatabaseAdapter>,
    pub load_balancers: FakeClient<LoadBalancerAdapter>,
    pub clusters: FakeClient<ClusterAdapter>,
    pub registry: FakeClient<RegistryAdapter>,
    pub spaces: FakeClient<SpaceAdapter>,
}

impl TestClients {
    pub fn new() -> Self {
        Self {
            droplets: FakeClient::new(|r: &DropletCreateRequest| Droplet {
                id: 123,
                name: r.name.clone(),
                status: String::from("new"),
                region: RegionRef {
                    slug: r.region.clone(),
                    name: String::new(),
                },
                ..Droplet::default()
            }),
            databases: FakeClient::new(|r: &DatabaseCreateRequest| Database {
                id: String::from("db-1"),
                name: r.name.clone(),
                engine: r.engine.clone().unwrap_or_else(|| String::from("pg")),
                status: String::from("creating"),
                ..Database::default()
            }),
            load_balancers: FakeClient::new(|r: &LoadBalancerRequest| LoadBalancer {
                id: String::from("lb-1"),
                name: r.name.clone(),
                status: String::from("new"),
                ..LoadBalancer::default()
            }),
            clusters: FakeClient::new(|r: &KubernetesClusterCreateRequest| KubernetesCluster {
                id: String::from("k8s-1"),
                name: r.name.clone(),
                status: KubernetesStatus {
                    state: String::from("provisioning"),
                    message: String::new(),
                },
                ..KubernetesCluster::default()
            }),
            registry: FakeClient::new(|r: &RegistryCreateRequest| RegistryWithSubscription {
                registry: Registry {
                    name: r.name.clone(),
                    region: r.region.clone().unwrap_or_default(),
                    ..Registry::default()
                },
                subscription: None,
            }),
            spaces: FakeClient::new(|r: &SpaceCreateRequest| SpaceBucket {
                name: r.bucket.clone(),
                creation_date: None,
            }),
        }
    }
}

impl ClientSet for TestClients {
    type Droplets = FakeClient<DropletAdapter>;
    type Databases = FakeClient<DatabaseAdapter>;
    type LoadBalancers = FakeClient<LoadBalancerAdapter>;
    type Clusters = FakeClient<ClusterAdapter>;
    type Registry = FakeClient<RegistryAdapter>;
    type Spaces = FakeClient<SpaceAdapter>;

    fn droplets(&self) -> &Self::Droplets {
        &self.droplets
    }

    fn databases(&self) -> &Self::Databases {
        &self.databases
    }

    fn load_balancers(&self) -> &Self::LoadBalancers {
        &self.load_balancers
    }

    fn clusters(&self) -> &Self::Clusters {
        &self.clusters
    }

    fn registry(&self) -> &Self::Registry {
        &self.registry
    }

    fn spaces(&self) -> &Self::Spaces {
        &self.spaces
    }
}
