//! Resource synchronizer
//!
//! Idempotent create-or-update of a concrete object. The caller supplies a
//! mutation callback that renders the fields it owns onto the object; the
//! synchronizer supplies the fetch / mutate / compare / write envelope and
//! absorbs optimistic-concurrency conflicts.
//!
//! A pass writes nothing when the mutated object equals the stored one, so
//! repeating a sync with the same template yields [`OperationResult::Unchanged`].
//! Every object written carries the [`MANAGED_BY_LABEL_KEY`] label, which is
//! what the controllers watch concrete objects by.

use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{debug, instrument};

use crate::retry::{retry_with_backoff, RetryConfig};
use crate::store::{kind_of, NamespacedObject, ResourceApi};
use crate::{Error, FIELD_MANAGER, MANAGED_BY_LABEL_KEY};

/// What a create-or-update pass did to the concrete object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationResult {
    /// The object did not exist and was created
    Created,
    /// The object existed and was rewritten
    Updated,
    /// The object already matched the template
    Unchanged,
}

impl std::fmt::Display for OperationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Create or update `namespace/name`, rendering it with `mutate`
///
/// Conflicting concurrent writes restart the cycle from a fresh read, up to
/// [`RetryConfig::conflict`] attempts. An object deleted between the read and
/// the write counts as a conflict, so the retry recreates it. An error from
/// `mutate` aborts the pass before anything is written.
#[instrument(skip(api, mutate), fields(kind = %kind_of::<K>()))]
pub async fn create_or_update<K, F>(
    api: &dyn ResourceApi<K>,
    namespace: &str,
    name: &str,
    mutate: F,
) -> Result<OperationResult, Error>
where
    K: NamespacedObject + Default + PartialEq,
    F: Fn(&mut K) -> Result<(), Error> + Send + Sync,
{
    let mutate = &mutate;
    retry_with_backoff(
        &RetryConfig::conflict(),
        "create_or_update",
        Error::is_conflict,
        || async move { sync_once(api, namespace, name, mutate).await },
    )
    .await
}

async fn sync_once<K, F>(
    api: &dyn ResourceApi<K>,
    namespace: &str,
    name: &str,
    mutate: &F,
) -> Result<OperationResult, Error>
where
    K: NamespacedObject + Default + PartialEq,
    F: Fn(&mut K) -> Result<(), Error> + Send + Sync,
{
    match api.get(namespace, name).await? {
        None => {
            let mut object = K::default();
            *object.meta_mut() = ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            };
            mutate(&mut object)?;
            pin_ownership(&mut object, namespace, name);
            api.create(namespace, &object).await?;
            debug!(namespace, name, "concrete object created");
            Ok(OperationResult::Created)
        }
        Some(existing) => {
            let mut object = existing.clone();
            mutate(&mut object)?;
            pin_ownership(&mut object, namespace, name);
            if object == existing {
                debug!(namespace, name, "concrete object unchanged");
                return Ok(OperationResult::Unchanged);
            }
            match api.replace(namespace, name, &object).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    return Err(Error::conflict(format!(
                        "{} {}/{} deleted during update",
                        kind_of::<K>(),
                        namespace,
                        name
                    )));
                }
                Err(e) => return Err(e),
            }
            debug!(namespace, name, "concrete object updated");
            Ok(OperationResult::Updated)
        }
    }
}

/// Mutation callbacks may not move the object to another identity or drop
/// the managed-by label
fn pin_ownership<K: NamespacedObject>(object: &mut K, namespace: &str, name: &str) {
    let meta = object.meta_mut();
    meta.name = Some(name.to_string());
    meta.namespace = Some(namespace.to_string());
    meta.labels
        .get_or_insert_with(Default::default)
        .insert(MANAGED_BY_LABEL_KEY.to_string(), FIELD_MANAGER.to_string());
}

/// Reusable synchronizer bound to one concrete kind
pub struct Synchronizer<K> {
    api: Arc<dyn ResourceApi<K>>,
}

impl<K> Synchronizer<K>
where
    K: NamespacedObject + Default + PartialEq,
{
    /// Synchronizer writing through `api`
    pub fn new(api: Arc<dyn ResourceApi<K>>) -> Self {
        Self { api }
    }

    /// See [`create_or_update`]
    pub async fn synchronize<F>(
        &self,
        namespace: &str,
        name: &str,
        mutate: F,
    ) -> Result<OperationResult, Error>
    where
        F: Fn(&mut K) -> Result<(), Error> + Send + Sync,
    {
        create_or_update(self.api.as_ref(), namespace, name, mutate).await
    }

    /// Delete the concrete object, tolerating its absence
    pub async fn remove(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.api.delete(namespace, name).await
    }
}
