//! Finalizer lifecycle
//!
//! A template resource carries its synchronization finalizer from the first
//! successful sync until its concrete object has been deleted:
//!
//! ```text
//! NoFinalizer --(first successful sync)--> Finalized
//! Finalized   --(deletion requested)-----> Removing
//! Removing    --(concrete object gone)---> Gone
//! Finalized   --(no longer placed)-------> NoFinalizer (pruned, template kept)
//! ```
//!
//! The token is only removed after the concrete delete succeeds, so the API
//! server cannot drop the template while an artifact it owns still exists.

use kube::ResourceExt;
use tracing::{debug, info};

use crate::store::{kind_of, NamespacedObject, ResourceApi};
use crate::sync::Synchronizer;
use crate::Error;

/// Where a template resource stands in its finalizer lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinalizerState {
    /// Never synced successfully (or pruned)
    NoFinalizer,
    /// Synced and protected by the finalizer
    Finalized,
    /// Deletion requested, finalizer still present
    Removing,
    /// Deletion requested and finalizer released
    Gone,
}

impl FinalizerState {
    /// Classify `resource` with respect to `token`
    pub fn of<R: NamespacedObject>(resource: &R, token: &str) -> Self {
        let deleting = resource.meta().deletion_timestamp.is_some();
        match (deleting, has_finalizer(resource, token)) {
            (false, false) => Self::NoFinalizer,
            (false, true) => Self::Finalized,
            (true, true) => Self::Removing,
            (true, false) => Self::Gone,
        }
    }
}

/// True if `resource` carries `token`
pub fn has_finalizer<R: NamespacedObject>(resource: &R, token: &str) -> bool {
    resource.finalizers().iter().any(|f| f == token)
}

/// Add `token` to `resource` unless it is already there
///
/// Returns whether a write happened. On success `resource` is replaced by the
/// stored copy so later writes in the same pass carry the new resourceVersion.
pub async fn add_finalizer_if_absent<R: NamespacedObject>(
    resource: &mut R,
    token: &str,
    api: &dyn ResourceApi<R>,
) -> Result<bool, Error> {
    if has_finalizer(resource, token) {
        return Ok(false);
    }

    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();

    let mut updated = resource.clone();
    updated.finalizers_mut().push(token.to_string());
    *resource = api.replace(&namespace, &name, &updated).await?;

    debug!(kind = %kind_of::<R>(), namespace = %namespace, name = %name, finalizer = token, "finalizer added");
    Ok(true)
}

/// Remove `token` from `resource` if present
///
/// Returns whether a write happened.
pub async fn remove_finalizer<R: NamespacedObject>(
    resource: &mut R,
    token: &str,
    api: &dyn ResourceApi<R>,
) -> Result<bool, Error> {
    if !has_finalizer(resource, token) {
        return Ok(false);
    }

    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();

    let mut updated = resource.clone();
    updated.finalizers_mut().retain(|f| f != token);
    *resource = api.replace(&namespace, &name, &updated).await?;

    debug!(kind = %kind_of::<R>(), namespace = %namespace, name = %name, finalizer = token, "finalizer removed");
    Ok(true)
}

/// Delete the concrete object mirrored from `resource`, then release `token`
///
/// The concrete object shares the template's namespace and name. A missing
/// concrete object counts as deleted. If the delete fails the finalizer is
/// kept and the error returned, so the next pass tries again.
pub async fn delete_associated_resource<R, C>(
    resource: &mut R,
    token: &str,
    concretes: &Synchronizer<C>,
    template_api: &dyn ResourceApi<R>,
) -> Result<(), Error>
where
    R: NamespacedObject,
    C: NamespacedObject + Default + PartialEq,
{
    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();

    concretes.remove(&namespace, &name).await?;

    if remove_finalizer(resource, token, template_api).await? {
        info!(
            kind = %kind_of::<R>(),
            namespace = %namespace,
            name = %name,
            "associated resource deleted and finalizer released"
        );
    }
    Ok(())
}
