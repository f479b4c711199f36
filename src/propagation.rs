//! Status propagation channel
//!
//! Reconcilers on a leaf cluster record the outcome of each pass on the
//! template resource and hand a [`StatusUpdateMessage`] to the forwarding
//! agent through a bounded queue. Sending never waits: a full, closed or
//! unconfigured channel drops the message with a log line, and the
//! reconciliation result is unaffected.

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::controller::MultiClusterResource;
use crate::crd::{ClusterLevelStatus, Condition, MultiClusterResourceStatus};
use crate::status::set_effective_state_if_changed;
use crate::store::{kind_of, ResourceApi};
use crate::Error;

/// Default capacity of the status channel
pub const DEFAULT_STATUS_CHANNEL_CAPACITY: usize = 1024;

/// One cluster's outcome for one template resource
#[derive(Clone, Debug, PartialEq)]
pub struct StatusUpdateMessage {
    /// Kind of the template resource, used by the agent to pick a sink
    pub resource_kind: String,
    /// Namespace of the template resource
    pub namespace: String,
    /// Name of the template resource
    pub name: String,
    /// Cluster that produced the outcome
    pub cluster_name: String,
    /// Condition recorded for this pass
    pub new_condition: Condition,
    /// Cluster-level entry derived from the condition
    pub new_cluster_status: ClusterLevelStatus,
}

/// Producer half of the status channel
///
/// Cheap to clone; one per controller. A disabled sender belongs to a
/// cluster that does not report to an aggregator.
#[derive(Clone, Debug)]
pub struct StatusSender {
    tx: Option<mpsc::Sender<StatusUpdateMessage>>,
}

/// Consumer half of the status channel
#[derive(Debug)]
pub struct StatusReceiver {
    rx: mpsc::Receiver<StatusUpdateMessage>,
}

/// Create a bounded status channel
pub fn status_channel(capacity: usize) -> (StatusSender, StatusReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (StatusSender { tx: Some(tx) }, StatusReceiver { rx })
}

impl StatusSender {
    /// Sender that drops every message
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// True if a consumer was configured
    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Enqueue `msg` without waiting
    ///
    /// Returns whether the message was queued.
    pub fn send(&self, msg: StatusUpdateMessage) -> bool {
        let Some(tx) = &self.tx else {
            debug!(
                resource = %msg.name,
                namespace = %msg.namespace,
                "no status channel configured, not forwarding"
            );
            return false;
        };

        match tx.try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                warn!(
                    kind = %msg.resource_kind,
                    resource = %msg.name,
                    namespace = %msg.namespace,
                    cluster = %msg.cluster_name,
                    "status channel full, dropping status update"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(msg)) => {
                warn!(
                    kind = %msg.resource_kind,
                    resource = %msg.name,
                    namespace = %msg.namespace,
                    cluster = %msg.cluster_name,
                    "status channel closed, dropping status update"
                );
                false
            }
        }
    }
}

impl StatusReceiver {
    /// Wait for the next message; `None` once every sender is gone
    pub async fn recv(&mut self) -> Option<StatusUpdateMessage> {
        self.rx.recv().await
    }

    /// Take a message if one is queued
    #[cfg(test)]
    pub(crate) fn try_recv(&mut self) -> Option<StatusUpdateMessage> {
        self.rx.try_recv().ok()
    }
}

/// Record the outcome of a pass on `resource` and forward it
///
/// Appends `new_condition` (deduplicated), upserts this cluster's entry and
/// recomputes the effective state. The status is written only if it differs
/// from `persisted`, the status as it was fetched at the start of the pass;
/// on a write `resource` is replaced by the stored copy. A message is queued
/// for the agent only after a write, and only if a consumer is configured.
pub async fn update_status<R: MultiClusterResource>(
    resource: &mut R,
    persisted: &MultiClusterResourceStatus,
    new_condition: Condition,
    cluster_name: &str,
    sender: &StatusSender,
    api: &dyn ResourceApi<R>,
) -> Result<Action, Error> {
    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();
    let placement = resource.placement().clone();
    let entry = ClusterLevelStatus::from_condition(&new_condition);

    {
        let status = resource.mc_status_mut();
        status.append_condition(new_condition.clone());
        status.set_cluster_status(cluster_name, entry.clone());
        set_effective_state_if_changed(&placement, status);
    }

    if resource.mc_status() == Some(persisted) {
        debug!(resource = %name, namespace = %namespace, "status unchanged, skipping update");
        return Ok(Action::await_change());
    }

    *resource = api.replace_status(&namespace, &name, resource).await?;
    debug!(
        resource = %name,
        namespace = %namespace,
        cluster = %cluster_name,
        state = %entry.state,
        "status updated"
    );

    if sender.is_enabled() {
        sender.send(StatusUpdateMessage {
            resource_kind: kind_of::<R>(),
            namespace,
            name,
            cluster_name: cluster_name.to_string(),
            new_condition,
            new_cluster_status: entry,
        });
    }

    Ok(Action::await_change())
}
