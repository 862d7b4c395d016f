//! [`VersionedStore`] backed by the Kubernetes API server

use std::fmt::Debug;
use std::marker::PhantomData;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Verb;
use crate::lifecycle::{LifecycleClient, VersionedStore};
use crate::{Error, Result};

/// Namespaced store for one resource kind over a kube [`Client`].
///
/// `replace` sends the object's `metadata.resourceVersion` with the PUT, so the
/// API server performs the version comparison and answers 409 on mismatch.
pub struct KubeStore<R> {
    client: Client,
    _kind: PhantomData<fn() -> R>,
}

impl<R> KubeStore<R> {
    /// Create a store using `client`
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

impl<R> KubeStore<R>
where
    R: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    fn api(&self, namespace: &str) -> Api<R> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn classify(source: kube::Error, verb: Verb, namespace: &str, name: &str) -> Error {
        Error::from_kube(source, verb, &R::kind(&()), namespace, name)
    }
}

#[async_trait]
impl<R> VersionedStore<R> for KubeStore<R>
where
    R: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<R> {
        self.api(namespace)
            .get(name)
            .await
            .map_err(|e| Self::classify(e, Verb::Get, namespace, name))
    }

    async fn create(&self, namespace: &str, obj: &R) -> Result<R> {
        let name = obj.meta().name.clone().unwrap_or_default();
        self.api(namespace)
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| Self::classify(e, Verb::Create, namespace, &name))
    }

    async fn replace(&self, namespace: &str, name: &str, obj: &R) -> Result<R> {
        self.api(namespace)
            .replace(name, &PostParams::default(), obj)
            .await
            .map_err(|e| Self::classify(e, Verb::Replace, namespace, name))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.api(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| Self::classify(e, Verb::Delete, namespace, name))
    }
}

impl<R> LifecycleClient<R>
where
    R: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    /// Create a client talking to the API server through `client`
    pub fn kube(client: Client) -> Self {
        LifecycleClient::new(KubeStore::<R>::new(client))
    }
}
