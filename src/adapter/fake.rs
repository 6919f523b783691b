//! In-memory backend used by the pipeline tests
//!
//! Behaves like the API server where the pipeline can observe it: versions
//! are assigned from one counter shared by all kinds, no-op writes keep the
//! stored version, and writes carrying a stale version are rejected with a
//! conflict. Every adapter call is appended to a shared log so tests can
//! check which steps ran and in what order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use kube::Resource;

use super::{Adapters, ResourceAdapter};
use crate::openshift::{OAuthClient, Route};
use crate::sync::ResourceKind;
use crate::Error;

/// Adapter operation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Op {
    Get,
    Create,
    Update,
}

/// One recorded adapter call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Call {
    pub resource: ResourceKind,
    pub op: Op,
}

impl Call {
    pub fn new(resource: ResourceKind, op: Op) -> Self {
        Self { resource, op }
    }
}

/// Ordered record of calls across all adapters of one backend
pub(crate) type CallLog = Arc<Mutex<Vec<Call>>>;

/// Failure injected into an adapter
#[derive(Clone, Debug)]
pub(crate) enum Failure {
    Backend(String),
    Conflict,
}

pub(crate) struct FakeAdapter<K> {
    kind: ResourceKind,
    objects: Mutex<BTreeMap<String, K>>,
    log: CallLog,
    versions: Arc<AtomicU64>,
    failure: Mutex<Option<(Op, Failure)>>,
}

impl<K> FakeAdapter<K>
where
    K: Resource + Clone + PartialEq + Send + Sync + 'static,
{
    fn new(kind: ResourceKind, log: CallLog, versions: Arc<AtomicU64>) -> Self {
        Self {
            kind,
            objects: Mutex::new(BTreeMap::new()),
            log,
            versions,
            failure: Mutex::new(None),
        }
    }

    fn next_version(&self) -> String {
        (self.versions.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn record(&self, op: Op) -> Result<(), Error> {
        self.log.lock().unwrap().push(Call::new(self.kind, op));
        match self.failure.lock().unwrap().as_ref() {
            Some((failing, Failure::Backend(msg))) if *failing == op => {
                Err(Error::backend(self.kind, msg.clone()))
            }
            Some((failing, Failure::Conflict)) if *failing == op => Err(Error::conflict(
                self.kind,
                "the object has been modified; please apply your changes to the latest version",
            )),
            _ => Ok(()),
        }
    }

    /// Store an object as if someone else had created it; not logged
    pub fn insert(&self, mut obj: K) {
        obj.meta_mut().resource_version = Some(self.next_version());
        let name = obj.meta().name.clone().unwrap_or_default();
        self.objects.lock().unwrap().insert(name, obj);
    }

    /// Current stored copy
    pub fn stored(&self, name: &str) -> Option<K> {
        self.objects.lock().unwrap().get(name).cloned()
    }

    /// Change a stored object out-of-band, bumping its version
    pub fn modify(&self, name: &str, f: impl FnOnce(&mut K)) {
        let version = self.next_version();
        let mut objects = self.objects.lock().unwrap();
        let obj = objects
            .get_mut(name)
            .unwrap_or_else(|| panic!("{} {} not stored", self.kind, name));
        f(obj);
        obj.meta_mut().resource_version = Some(version);
    }

    /// Make every subsequent call of `op` fail
    pub fn fail_on(&self, op: Op, failure: Failure) {
        *self.failure.lock().unwrap() = Some((op, failure));
    }

    /// Stop injecting failures
    pub fn heal(&self) {
        *self.failure.lock().unwrap() = None;
    }
}

fn without_version<K: Resource + Clone>(obj: &K) -> K {
    let mut obj = obj.clone();
    obj.meta_mut().resource_version = None;
    obj
}

#[async_trait]
impl<K> ResourceAdapter<K> for FakeAdapter<K>
where
    K: Resource + Clone + PartialEq + Send + Sync + 'static,
{
    async fn get(&self, name: &str) -> Result<Option<K>, Error> {
        self.record(Op::Get)?;
        Ok(self.stored(name))
    }

    async fn create(&self, obj: &K) -> Result<(K, bool), Error> {
        self.record(Op::Create)?;
        let name = obj.meta().name.clone().unwrap_or_default();

        if let Some(existing) = self.stored(&name) {
            return Ok((existing, false));
        }

        let mut created = obj.clone();
        created.meta_mut().resource_version = Some(self.next_version());
        self.objects
            .lock()
            .unwrap()
            .insert(name, created.clone());
        Ok((created, true))
    }

    async fn update(&self, obj: &K) -> Result<(K, bool), Error> {
        self.record(Op::Update)?;
        let name = obj.meta().name.clone().unwrap_or_default();

        let stored = self
            .stored(&name)
            .ok_or_else(|| Error::backend(self.kind, format!("{} not found", name)))?;

        if let Some(submitted) = &obj.meta().resource_version {
            if stored.meta().resource_version.as_ref() != Some(submitted) {
                return Err(Error::conflict(self.kind, "stale resourceVersion"));
            }
        }

        if without_version(obj) == without_version(&stored) {
            return Ok((stored, false));
        }

        let mut updated = obj.clone();
        updated.meta_mut().resource_version = Some(self.next_version());
        self.objects
            .lock()
            .unwrap()
            .insert(name, updated.clone());
        Ok((updated, true))
    }
}

/// A full set of fake adapters sharing one call log and version counter
pub(crate) struct FakeBackend {
    pub log: CallLog,
    pub routes: Arc<FakeAdapter<Route>>,
    pub services: Arc<FakeAdapter<Service>>,
    pub config_maps: Arc<FakeAdapter<ConfigMap>>,
    pub secrets: Arc<FakeAdapter<Secret>>,
    pub oauth_clients: Arc<FakeAdapter<OAuthClient>>,
    pub deployments: Arc<FakeAdapter<Deployment>>,
}

impl FakeBackend {
    /// Empty store
    pub fn new() -> Self {
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));
        let versions = Arc::new(AtomicU64::new(0));

        Self {
            routes: Arc::new(FakeAdapter::new(
                ResourceKind::Route,
                log.clone(),
                versions.clone(),
            )),
            services: Arc::new(FakeAdapter::new(
                ResourceKind::Service,
                log.clone(),
                versions.clone(),
            )),
            config_maps: Arc::new(FakeAdapter::new(
                ResourceKind::ConfigMap,
                log.clone(),
                versions.clone(),
            )),
            secrets: Arc::new(FakeAdapter::new(
                ResourceKind::Secret,
                log.clone(),
                versions.clone(),
            )),
            oauth_clients: Arc::new(FakeAdapter::new(
                ResourceKind::OAuthClient,
                log.clone(),
                versions.clone(),
            )),
            deployments: Arc::new(FakeAdapter::new(
                ResourceKind::Deployment,
                log.clone(),
                versions,
            )),
            log,
        }
    }

    /// Adapter set for a pipeline under test
    pub fn adapters(&self) -> Adapters {
        Adapters {
            routes: self.routes.clone(),
            services: self.services.clone(),
            config_maps: self.config_maps.clone(),
            secrets: self.secrets.clone(),
            oauth_clients: self.oauth_clients.clone(),
            deployments: self.deployments.clone(),
        }
    }

    /// Every call recorded so far
    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().clone()
    }

    /// Create and update calls recorded so far
    pub fn writes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.op != Op::Get)
            .collect()
    }

    /// Resource kinds touched, in first-touch order
    pub fn touched(&self) -> Vec<ResourceKind> {
        let mut kinds = Vec::new();
        for call in self.calls() {
            if !kinds.contains(&call.resource) {
                kinds.push(call.resource);
            }
        }
        kinds
    }

    /// Forget recorded calls
    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }
}
