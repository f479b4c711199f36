//! Controllers for multi-cluster template resources
//!
//! Every multi-cluster kind is reconciled by the same generic [`reconcile`]
//! function. A kind plugs in by implementing [`MultiClusterResource`], which
//! names its concrete object type, its finalizer token and how the template
//! renders onto the concrete object.
//!
//! One pass:
//!
//! 1. Refetch the template; if it is gone there is nothing to do.
//! 2. If deletion was requested ([`FinalizerState::Removing`] or
//!    [`FinalizerState::Gone`]), delete the concrete object and release the
//!    finalizer.
//! 3. Recompute the effective state.
//! 4. If this cluster is not in the placement, persist the state if it
//!    changed and prune the concrete object.
//! 5. Otherwise create or update the concrete object, add the finalizer on
//!    success, and record the outcome with [`update_status`].
//!
//! A failed synchronization, or a failed finalizer write, is returned as an
//! error after the status is recorded, so [`error_policy`] requeues it with
//! jitter.

mod config_map;
mod secret;

use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use crate::crd::{MultiClusterResourceStatus, Placement};
use crate::finalizer::{add_finalizer_if_absent, delete_associated_resource, FinalizerState};
use crate::identity::{ClusterIdentity, RegistrationSecretIdentity, REGISTRATION_SECRET_NAME};
use crate::placement::is_placed_in_this_cluster;
use crate::propagation::{update_status, StatusSender};
use crate::retry::RequeueBackoff;
use crate::status::{condition_from_result, set_effective_state_if_changed};
use crate::store::{kind_of, KubeResourceApi, NamespacedObject, ResourceApi};
use crate::sync::Synchronizer;
use crate::{Error, FIELD_MANAGER, LATTICE_SYSTEM_NAMESPACE};

/// A template resource that materializes one concrete object per cluster
pub trait MultiClusterResource: NamespacedObject {
    /// Native object written on each placed cluster
    type Concrete: NamespacedObject + Default + PartialEq;

    /// Finalizer token guarding the concrete object
    const FINALIZER: &'static str;

    /// Clusters the template is placed on
    fn placement(&self) -> &Placement;

    /// Current status, if any was ever written
    fn mc_status(&self) -> Option<&MultiClusterResourceStatus>;

    /// Status for modification, initialized to the default if absent
    fn mc_status_mut(&mut self) -> &mut MultiClusterResourceStatus;

    /// Render the template's fields onto `concrete`
    ///
    /// Must either succeed completely or return an error without relying
    /// on partial writes; fields the template does not own are left alone.
    fn mutate_concrete(&self, concrete: &mut Self::Concrete) -> Result<(), Error>;
}

/// Controller context shared by all passes of one kind
pub struct Context<R: MultiClusterResource> {
    /// Template resources
    pub templates: Arc<dyn ResourceApi<R>>,
    /// Writes concrete objects
    pub concretes: Synchronizer<R::Concrete>,
    /// Name of the cluster this controller runs in
    pub identity: Arc<dyn ClusterIdentity>,
    /// Forwarding channel towards the aggregator
    pub status_sender: StatusSender,
    /// Jittered requeue delays for failed passes
    pub backoff: Arc<RequeueBackoff>,
}

impl<R: MultiClusterResource> Context<R> {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder<R> {
        ContextBuilder::new(client)
    }

    /// Create a context from explicit collaborators
    ///
    /// Status forwarding is disabled and the requeue jitter is seeded, so
    /// delays are reproducible.
    pub fn for_testing(
        templates: Arc<dyn ResourceApi<R>>,
        concretes: Arc<dyn ResourceApi<R::Concrete>>,
        identity: Arc<dyn ClusterIdentity>,
    ) -> Self {
        Self {
            templates,
            concretes: Synchronizer::new(concretes),
            identity,
            status_sender: StatusSender::disabled(),
            backoff: Arc::new(RequeueBackoff::seeded(
                crate::retry::DEFAULT_REQUEUE_MIN..crate::retry::DEFAULT_REQUEUE_MAX,
                0,
            )),
        }
    }

    /// Replace the status sender
    #[cfg(test)]
    pub(crate) fn with_status_sender(mut self, sender: StatusSender) -> Self {
        self.status_sender = sender;
        self
    }
}

/// Builder for [`Context`]
pub struct ContextBuilder<R: MultiClusterResource> {
    client: Client,
    field_manager: String,
    templates: Option<Arc<dyn ResourceApi<R>>>,
    concretes: Option<Arc<dyn ResourceApi<R::Concrete>>>,
    identity: Option<Arc<dyn ClusterIdentity>>,
    status_sender: StatusSender,
    backoff: Option<Arc<RequeueBackoff>>,
}

impl<R: MultiClusterResource> ContextBuilder<R> {
    fn new(client: Client) -> Self {
        Self {
            client,
            field_manager: FIELD_MANAGER.to_string(),
            templates: None,
            concretes: None,
            identity: None,
            status_sender: StatusSender::disabled(),
            backoff: None,
        }
    }

    /// Field manager recorded on every write
    pub fn field_manager(mut self, field_manager: impl Into<String>) -> Self {
        self.field_manager = field_manager.into();
        self
    }

    /// Override the template api (primarily for testing)
    pub fn templates(mut self, templates: Arc<dyn ResourceApi<R>>) -> Self {
        self.templates = Some(templates);
        self
    }

    /// Override the concrete object api (primarily for testing)
    pub fn concretes(mut self, concretes: Arc<dyn ResourceApi<R::Concrete>>) -> Self {
        self.concretes = Some(concretes);
        self
    }

    /// Set the cluster identity provider
    pub fn identity(mut self, identity: Arc<dyn ClusterIdentity>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Forward status updates through `sender`
    pub fn status_sender(mut self, sender: StatusSender) -> Self {
        self.status_sender = sender;
        self
    }

    /// Set the requeue backoff
    pub fn backoff(mut self, backoff: Arc<RequeueBackoff>) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context<R> {
        let client = self.client;
        let field_manager = self.field_manager;

        let identity = self.identity.unwrap_or_else(|| {
            let secrets: Arc<dyn ResourceApi<Secret>> =
                Arc::new(KubeResourceApi::new(client.clone(), field_manager.clone()));
            Arc::new(RegistrationSecretIdentity::new(
                secrets,
                LATTICE_SYSTEM_NAMESPACE,
                REGISTRATION_SECRET_NAME,
            ))
        });

        Context {
            templates: self.templates.unwrap_or_else(|| {
                Arc::new(KubeResourceApi::new(client.clone(), field_manager.clone()))
            }),
            concretes: Synchronizer::new(
                self.concretes
                    .unwrap_or_else(|| Arc::new(KubeResourceApi::new(client, field_manager))),
            ),
            identity,
            status_sender: self.status_sender,
            backoff: self.backoff.unwrap_or_default(),
        }
    }
}

/// Reconcile one template resource
#[instrument(
    skip(resource, ctx),
    fields(
        kind = %kind_of::<R>(),
        resource = %resource.name_any(),
        namespace = %resource.namespace().unwrap_or_default(),
    )
)]
pub async fn reconcile<R: MultiClusterResource>(
    resource: Arc<R>,
    ctx: Arc<Context<R>>,
) -> Result<Action, Error> {
    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();
    debug!("reconciling");

    let Some(mut current) = ctx.templates.get(&namespace, &name).await? else {
        info!("resource no longer exists, nothing to reconcile");
        return Ok(Action::await_change());
    };

    match reconcile_current(&mut current, &ctx).await {
        Err(e) if template_gone::<R>(&e) => {
            info!("resource deleted during reconciliation");
            Ok(Action::await_change())
        }
        other => other,
    }
}

async fn reconcile_current<R: MultiClusterResource>(
    resource: &mut R,
    ctx: &Context<R>,
) -> Result<Action, Error> {
    match FinalizerState::of(resource, R::FINALIZER) {
        FinalizerState::Removing | FinalizerState::Gone => {
            info!("deletion requested, removing associated resource");
            delete_associated_resource(
                resource,
                R::FINALIZER,
                &ctx.concretes,
                ctx.templates.as_ref(),
            )
            .await?;
            return Ok(Action::await_change());
        }
        FinalizerState::NoFinalizer | FinalizerState::Finalized => {}
    }

    let cluster_name = ctx.identity.cluster_name().await?;
    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();
    let persisted = resource.mc_status().cloned().unwrap_or_default();
    let placement = resource.placement().clone();

    let old_state = set_effective_state_if_changed(&placement, resource.mc_status_mut());

    if !is_placed_in_this_cluster(&placement, &cluster_name) {
        let new_state = resource.mc_status().map(|s| s.state).unwrap_or_default();
        if new_state != old_state {
            info!(cluster = %cluster_name, from = %old_state, to = %new_state, "effective state changed");
            *resource = ctx
                .templates
                .replace_status(&namespace, &name, resource)
                .await?;
        }
        debug!(cluster = %cluster_name, "not placed on this cluster, pruning");
        delete_associated_resource(
            resource,
            R::FINALIZER,
            &ctx.concretes,
            ctx.templates.as_ref(),
        )
        .await?;
        return Ok(Action::await_change());
    }

    let result = {
        let template: &R = resource;
        ctx.concretes
            .synchronize(&namespace, &name, |concrete| {
                template.mutate_concrete(concrete)
            })
            .await
    };

    match &result {
        Ok(op) => info!(cluster = %cluster_name, operation = %op, "synchronized"),
        Err(e) => warn!(cluster = %cluster_name, error = %e, "synchronization failed"),
    }

    // A failed finalizer write is recorded like a failed sync
    let result = match result {
        Ok(op) => match add_finalizer_if_absent(resource, R::FINALIZER, ctx.templates.as_ref()).await
        {
            Ok(_) => Ok(op),
            Err(e) => {
                warn!(cluster = %cluster_name, error = %e, "adding finalizer failed");
                Err(e)
            }
        },
        Err(e) => Err(e),
    };

    let condition = condition_from_result(&result, &kind_of::<R::Concrete>());
    let action = update_status(
        resource,
        &persisted,
        condition,
        &cluster_name,
        &ctx.status_sender,
        ctx.templates.as_ref(),
    )
    .await?;

    result?;
    Ok(action)
}

/// True if `error` says the template itself has disappeared
fn template_gone<R: MultiClusterResource>(error: &Error) -> bool {
    matches!(error, Error::NotFound { kind, .. } if *kind == kind_of::<R>())
}

/// Requeue a failed pass after a jittered delay
pub fn error_policy<R: MultiClusterResource>(
    resource: Arc<R>,
    error: &Error,
    ctx: Arc<Context<R>>,
) -> Action {
    let delay = ctx.backoff.random_requeue_delay();
    error!(
        ?error,
        kind = %kind_of::<R>(),
        resource = %resource.name_any(),
        namespace = %resource.namespace().unwrap_or_default(),
        delay_ms = delay.as_millis() as u64,
        "reconciliation failed"
    );
    Action::requeue(delay)
}
