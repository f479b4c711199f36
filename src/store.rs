//! Persistence seam for namespaced Kubernetes objects
//!
//! Controllers talk to the API server only through [`ResourceApi`], so the
//! reconciliation logic can be exercised against an in-memory store in tests
//! while production uses [`KubeResourceApi`].

use std::fmt::Debug;
use std::marker::PhantomData;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::from_kube;
use crate::Error;

/// Marker bound for namespaced objects the controllers read and write
pub trait NamespacedObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> NamespacedObject for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Kind name of a statically-typed resource
pub fn kind_of<K: Resource<DynamicType = ()>>() -> String {
    K::kind(&()).into_owned()
}

/// CRUD operations on one kind of namespaced object
///
/// Writes carry the object's `resourceVersion`; a stale version yields
/// [`Error::Conflict`]. Missing objects yield [`Error::NotFound`] except
/// where noted.
#[async_trait]
pub trait ResourceApi<K>: Send + Sync
where
    K: Send + Sync + 'static,
{
    /// Fetch an object, `None` if it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, Error>;

    /// Create an object; an existing object with the same name is a conflict
    async fn create(&self, namespace: &str, object: &K) -> Result<K, Error>;

    /// Replace an object's spec and metadata
    async fn replace(&self, namespace: &str, name: &str, object: &K) -> Result<K, Error>;

    /// Replace an object's status subresource
    async fn replace_status(&self, namespace: &str, name: &str, object: &K) -> Result<K, Error>;

    /// Delete an object; deleting a missing object succeeds
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error>;
}

/// [`ResourceApi`] backed by the Kubernetes API server
pub struct KubeResourceApi<K> {
    client: Client,
    field_manager: String,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeResourceApi<K> {
    /// Create an api handle writing with the given field manager
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
            _kind: PhantomData,
        }
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            dry_run: false,
            field_manager: Some(self.field_manager.clone()),
        }
    }
}

#[async_trait]
impl<K: NamespacedObject> ResourceApi<K> for KubeResourceApi<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, Error> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| from_kube(e, &kind_of::<K>(), namespace, name))
    }

    async fn create(&self, namespace: &str, object: &K) -> Result<K, Error> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let name = object.meta().name.clone().unwrap_or_default();
        api.create(&self.post_params(), object)
            .await
            .map_err(|e| from_kube(e, &kind_of::<K>(), namespace, &name))
    }

    async fn replace(&self, namespace: &str, name: &str, object: &K) -> Result<K, Error> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.replace(name, &self.post_params(), object)
            .await
            .map_err(|e| from_kube(e, &kind_of::<K>(), namespace, name))
    }

    async fn replace_status(&self, namespace: &str, name: &str, object: &K) -> Result<K, Error> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let body = serde_json::to_vec(object).map_err(|e| Error::serialization(e.to_string()))?;
        api.replace_status(name, &self.post_params(), body)
            .await
            .map_err(|e| from_kube(e, &kind_of::<K>(), namespace, name))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => {
                debug!(kind = %kind_of::<K>(), namespace, name, "object already absent");
                Ok(())
            }
            Err(e) => Err(from_kube(e, &kind_of::<K>(), namespace, name)),
        }
    }
}
