//! Backend capabilities the reconciliation pipeline is built on
//!
//! The pipeline never talks to the API server directly. Each managed resource
//! kind is reached through a [`ResourceAdapter`], and fresh credentials come
//! from a [`SecretGenerator`]. Production wiring uses [`KubeAdapter`] and
//! [`OsSecretGenerator`]; tests substitute in-memory fakes.

mod kube_api;
mod secret;

#[cfg(test)]
pub(crate) mod fake;

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use kube::{Api, Client};

use crate::openshift::{OAuthClient, Route};
use crate::sync::ResourceKind;
use crate::Error;

pub use kube_api::KubeAdapter;
pub use secret::{OsSecretGenerator, SecretGenerator, SECRET_BYTES};

#[cfg(test)]
pub(crate) use secret::MockSecretGenerator;

/// Get/create/update capability for one resource kind
///
/// Every method is a single request/response against the backend. Writes
/// must be idempotent: re-submitting identical content reports
/// `changed = false`. Writes that lose an optimistic-concurrency race fail
/// with [`Error::Conflict`].
#[async_trait]
pub trait ResourceAdapter<K>: Send + Sync
where
    K: Send + Sync + 'static,
{
    /// Fetch the named object; `Ok(None)` when it does not exist
    async fn get(&self, name: &str) -> Result<Option<K>, Error>;

    /// Create the object, returning what the backend stored and whether this
    /// call created it
    async fn create(&self, obj: &K) -> Result<(K, bool), Error>;

    /// Write the object back, returning what the backend stored and whether
    /// anything changed
    async fn update(&self, obj: &K) -> Result<(K, bool), Error>;
}

/// One adapter per managed resource kind
///
/// Handed to the pipeline at construction; the pipeline holds no other
/// handle on the backend.
#[derive(Clone)]
pub struct Adapters {
    /// Network endpoint
    pub routes: Arc<dyn ResourceAdapter<Route>>,
    /// Traffic endpoint
    pub services: Arc<dyn ResourceAdapter<Service>>,
    /// Config artifact
    pub config_maps: Arc<dyn ResourceAdapter<ConfigMap>>,
    /// Credential
    pub secrets: Arc<dyn ResourceAdapter<Secret>>,
    /// Identity-provider registration
    pub oauth_clients: Arc<dyn ResourceAdapter<OAuthClient>>,
    /// Workload deployment
    pub deployments: Arc<dyn ResourceAdapter<Deployment>>,
}

impl Adapters {
    /// Kubernetes-backed adapters for the operand namespace
    pub fn kube(client: Client, namespace: &str) -> Self {
        Self {
            routes: Arc::new(KubeAdapter::new(
                Api::namespaced(client.clone(), namespace),
                ResourceKind::Route,
            )),
            services: Arc::new(KubeAdapter::new(
                Api::namespaced(client.clone(), namespace),
                ResourceKind::Service,
            )),
            config_maps: Arc::new(KubeAdapter::new(
                Api::namespaced(client.clone(), namespace),
                ResourceKind::ConfigMap,
            )),
            secrets: Arc::new(KubeAdapter::new(
                Api::namespaced(client.clone(), namespace),
                ResourceKind::Secret,
            )),
            oauth_clients: Arc::new(KubeAdapter::new(
                Api::all(client.clone()),
                ResourceKind::OAuthClient,
            )),
            deployments: Arc::new(KubeAdapter::new(
                Api::namespaced(client, namespace),
                ResourceKind::Deployment,
            )),
        }
    }
}
