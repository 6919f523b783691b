//! [`ResourceAdapter`] backed by a `kube::Api`

use std::fmt::Debug;

use async_trait::async_trait;
use kube::api::{Api, PostParams};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::ResourceAdapter;
use crate::sync::ResourceKind;
use crate::Error;

/// Adapter performing plain create/replace calls through the Kubernetes API
///
/// Updates go through `replace`, so the submitted `resourceVersion` acts as
/// the optimistic-concurrency token. The API server does not bump the
/// version for a no-op write, which is how `changed` is detected.
pub struct KubeAdapter<K> {
    api: Api<K>,
    kind: ResourceKind,
}

impl<K> KubeAdapter<K> {
    /// Wrap an already scoped API handle
    pub fn new(api: Api<K>, kind: ResourceKind) -> Self {
        Self { api, kind }
    }

    /// Map a kube error onto the pipeline's taxonomy
    fn classify(&self, err: kube::Error) -> Error {
        match err {
            kube::Error::Api(ae) if ae.code == 409 => Error::conflict(self.kind, ae.message),
            other => Error::backend(self.kind, other.to_string()),
        }
    }
}

fn object_name<K: Resource>(obj: &K, kind: ResourceKind) -> Result<&str, Error> {
    obj.meta()
        .name
        .as_deref()
        .ok_or_else(|| Error::validation(format!("{} object has no name", kind)))
}

#[async_trait]
impl<K> ResourceAdapter<K> for KubeAdapter<K>
where
    K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Serialize + Send + Sync + 'static,
{
    async fn get(&self, name: &str) -> Result<Option<K>, Error> {
        self.api.get_opt(name).await.map_err(|e| self.classify(e))
    }

    async fn create(&self, obj: &K) -> Result<(K, bool), Error> {
        let name = object_name(obj, self.kind)?;

        match self.api.create(&PostParams::default(), obj).await {
            Ok(created) => Ok((created, true)),
            Err(kube::Error::Api(ae)) if ae.code == 409 && ae.reason == "AlreadyExists" => {
                // Another pass created it first; report the stored object as not created by us
                debug!(resource = %self.kind, name = %name, "create raced with another writer");
                let existing = self.api.get(name).await.map_err(|e| self.classify(e))?;
                Ok((existing, false))
            }
            Err(e) => Err(self.classify(e)),
        }
    }

    async fn update(&self, obj: &K) -> Result<(K, bool), Error> {
        let name = object_name(obj, self.kind)?;
        let submitted = obj.meta().resource_version.clone();

        let stored = self
            .api
            .replace(name, &PostParams::default(), obj)
            .await
            .map_err(|e| self.classify(e))?;

        let changed = submitted.is_none() || stored.meta().resource_version != submitted;
        Ok((stored, changed))
    }
}
