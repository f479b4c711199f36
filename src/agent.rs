//! Status forwarding agent
//!
//! The single consumer of the status channel. Each [`StatusUpdateMessage`] is
//! dispatched by resource kind to a [`StatusSink`], which applies it to the
//! aggregator's copy of the template resource. Delivery is at-most-once:
//! messages for unknown kinds, and messages a sink fails to apply, are logged
//! and dropped.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

#[cfg(test)]
use mockall::automock;

use crate::controller::MultiClusterResource;
use crate::propagation::{StatusReceiver, StatusUpdateMessage};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::status::apply_cluster_status;
use crate::store::{kind_of, ResourceApi};
use crate::Error;

/// Destination for status updates of one resource kind
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Apply `msg`; returns whether the stored status changed
    async fn apply(&self, msg: &StatusUpdateMessage) -> Result<bool, Error>;
}

/// Sink writing into the aggregator's copy of a template resource
pub struct UpstreamStatusSink<R> {
    api: Arc<dyn ResourceApi<R>>,
}

impl<R: MultiClusterResource> UpstreamStatusSink<R> {
    /// Sink writing through `api`, usually backed by the upstream client
    pub fn new(api: Arc<dyn ResourceApi<R>>) -> Self {
        Self { api }
    }

    async fn apply_once(&self, msg: &StatusUpdateMessage) -> Result<bool, Error> {
        let Some(mut resource) = self.api.get(&msg.namespace, &msg.name).await? else {
            debug!(
                kind = %msg.resource_kind,
                resource = %msg.name,
                namespace = %msg.namespace,
                "template no longer exists upstream, dropping status update"
            );
            return Ok(false);
        };

        let placement = resource.placement().clone();
        let changed = apply_cluster_status(
            resource.mc_status_mut(),
            &placement,
            &msg.cluster_name,
            msg.new_condition.clone(),
            msg.new_cluster_status.clone(),
        );
        if !changed {
            return Ok(false);
        }

        match self
            .api
            .replace_status(&msg.namespace, &msg.name, &resource)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl<R: MultiClusterResource> StatusSink for UpstreamStatusSink<R> {
    async fn apply(&self, msg: &StatusUpdateMessage) -> Result<bool, Error> {
        retry_with_backoff(
            &RetryConfig::conflict(),
            "apply_cluster_status",
            Error::is_conflict,
            || self.apply_once(msg),
        )
        .await
    }
}

/// Drains the status channel into per-kind sinks
pub struct StatusForwarder {
    receiver: StatusReceiver,
    sinks: HashMap<String, Arc<dyn StatusSink>>,
}

impl StatusForwarder {
    /// Forwarder with no sinks registered
    pub fn new(receiver: StatusReceiver) -> Self {
        Self {
            receiver,
            sinks: HashMap::new(),
        }
    }

    /// Route messages for `kind` to `sink`
    pub fn with_sink(mut self, kind: impl Into<String>, sink: Arc<dyn StatusSink>) -> Self {
        self.sinks.insert(kind.into(), sink);
        self
    }

    /// Route messages for `R` to an [`UpstreamStatusSink`] over `api`
    pub fn with_upstream<R: MultiClusterResource>(self, api: Arc<dyn ResourceApi<R>>) -> Self {
        self.with_sink(kind_of::<R>(), Arc::new(UpstreamStatusSink::new(api)))
    }

    /// Apply one message, returning whether it was delivered
    pub async fn dispatch(&self, msg: &StatusUpdateMessage) -> bool {
        let Some(sink) = self.sinks.get(&msg.resource_kind) else {
            warn!(
                kind = %msg.resource_kind,
                resource = %msg.name,
                "no status sink for kind, dropping status update"
            );
            return false;
        };

        match sink.apply(msg).await {
            Ok(changed) => {
                debug!(
                    kind = %msg.resource_kind,
                    resource = %msg.name,
                    namespace = %msg.namespace,
                    cluster = %msg.cluster_name,
                    changed,
                    "status update applied upstream"
                );
                true
            }
            Err(e) => {
                error!(
                    error = %e,
                    kind = %msg.resource_kind,
                    resource = %msg.name,
                    namespace = %msg.namespace,
                    cluster = %msg.cluster_name,
                    "failed to apply status update upstream"
                );
                false
            }
        }
    }

    /// Forward messages until the channel closes or `shutdown` fires
    pub async fn run_until(mut self, mut shutdown: oneshot::Receiver<()>) {
        info!(kinds = self.sinks.len(), "status forwarder started");
        loop {
            tokio::select! {
                msg = self.receiver.recv() => match msg {
                    Some(msg) => {
                        self.dispatch(&msg).await;
                    }
                    None => {
                        info!("status channel closed, forwarder stopping");
                        break;
                    }
                },
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{
        ClusterLevelStatus, Condition, ConditionStatus, ConditionType, ConfigMapTemplate,
        MultiClusterConfigMap, MultiClusterConfigMapSpec, Placement, ResourceState,
    };
    use crate::propagation::status_channel;
    use crate::store::fake::{FakeApi, Op};

    fn report(cluster: &str, type_: ConditionType, message: &str) -> StatusUpdateMessage {
        let condition = Condition::new(type_, ConditionStatus::True, message);
        StatusUpdateMessage {
            resource_kind: "MultiClusterConfigMap".to_string(),
            namespace: "team-a".to_string(),
            name: "app".to_string(),
            cluster_name: cluster.to_string(),
            new_cluster_status: ClusterLevelStatus::from_condition(&condition),
            new_condition: condition,
        }
    }

    fn upstream_copy() -> MultiClusterConfigMap {
        let mut mc = MultiClusterConfigMap::new(
            "app",
            MultiClusterConfigMapSpec {
                template: ConfigMapTemplate::default(),
                placement: Placement::for_clusters(["west", "east"]),
            },
        );
        mc.metadata.namespace = Some("team-a".to_string());
        mc
    }

    /// Story: the aggregator's copy goes Ready once every placed leaf reports
    #[tokio::test]
    async fn story_upstream_aggregates_leaf_reports() {
        let api = Arc::new(FakeApi::new());
        api.insert(upstream_copy());
        let sink: UpstreamStatusSink<MultiClusterConfigMap> = UpstreamStatusSink::new(api.clone());

        let west = report("west", ConditionType::DeployComplete, "ConfigMap created");
        assert!(sink.apply(&west).await.unwrap());
        let status = api.peek("team-a", "app").unwrap().status.unwrap();
        assert_eq!(status.state, ResourceState::Pending);

        let east = report("east", ConditionType::DeployComplete, "ConfigMap created");
        assert!(sink.apply(&east).await.unwrap());
        let status = api.peek("team-a", "app").unwrap().status.unwrap();
        assert_eq!(status.state, ResourceState::Ready);
        assert_eq!(status.clusters.len(), 2);

        // a duplicate report is absorbed without a write
        assert!(!sink.apply(&east).await.unwrap());
        assert_eq!(api.calls(Op::ReplaceStatus), 2);
    }

    #[tokio::test]
    async fn test_one_failing_leaf_fails_aggregate() {
        let api = Arc::new(FakeApi::new());
        api.insert(upstream_copy());
        let sink: UpstreamStatusSink<MultiClusterConfigMap> = UpstreamStatusSink::new(api.clone());

        sink.apply(&report("west", ConditionType::DeployComplete, "ConfigMap created"))
            .await
            .unwrap();
        sink.apply(&report("east", ConditionType::DeployFailed, "quota exceeded"))
            .await
            .unwrap();

        let status = api.peek("team-a", "app").unwrap().status.unwrap();
        assert_eq!(status.state, ResourceState::Failed);
    }

    #[tokio::test]
    async fn test_conflicting_upstream_write_is_retried() {
        let api = Arc::new(FakeApi::new());
        api.insert(upstream_copy());
        api.fail_next(Op::ReplaceStatus, Error::conflict("stale"));
        let sink: UpstreamStatusSink<MultiClusterConfigMap> = UpstreamStatusSink::new(api.clone());

        let applied = sink
            .apply(&report("west", ConditionType::DeployComplete, "ConfigMap created"))
            .await
            .unwrap();

        assert!(applied);
        assert_eq!(api.calls(Op::Get), 2);
    }

    #[tokio::test]
    async fn test_missing_upstream_template_is_dropped() {
        let api: Arc<FakeApi<MultiClusterConfigMap>> = Arc::new(FakeApi::new());
        let sink = UpstreamStatusSink::new(api.clone());
        let applied = sink
            .apply(&report("west", ConditionType::DeployComplete, "ConfigMap created"))
            .await
            .unwrap();
        assert!(!applied);
        assert_eq!(api.calls(Op::ReplaceStatus), 0);
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_kind() {
        let (_tx, rx) = status_channel(1);
        let mut sink = MockStatusSink::new();
        sink.expect_apply()
            .withf(|msg| msg.cluster_name == "west")
            .times(1)
            .returning(|_| Ok(true));

        let forwarder = StatusForwarder::new(rx).with_sink("MultiClusterConfigMap", Arc::new(sink));
        assert!(
            forwarder
                .dispatch(&report("west", ConditionType::DeployComplete, "ok"))
                .await
        );
    }

    #[tokio::test]
    async fn test_unknown_kind_is_dropped() {
        let (_tx, rx) = status_channel(1);
        let forwarder = StatusForwarder::new(rx);
        let mut msg = report("west", ConditionType::DeployComplete, "ok");
        msg.resource_kind = "MultiClusterWidget".to_string();
        assert!(!forwarder.dispatch(&msg).await);
    }

    #[tokio::test]
    async fn test_sink_error_is_not_fatal() {
        let (_tx, rx) = status_channel(1);
        let mut sink = MockStatusSink::new();
        sink.expect_apply()
            .returning(|_| Err(Error::config("upstream unreachable")));

        let forwarder = StatusForwarder::new(rx).with_sink("MultiClusterConfigMap", Arc::new(sink));
        assert!(
            !forwarder
                .dispatch(&report("west", ConditionType::DeployComplete, "ok"))
                .await
        );
    }

    /// Story: the forwarder drains queued messages and stops when senders go away
    #[tokio::test]
    async fn story_forwarder_drains_channel_then_stops() {
        let (tx, rx) = status_channel(8);
        let mut sink = MockStatusSink::new();
        sink.expect_apply().times(3).returning(|_| Ok(true));

        for cluster in ["west", "east", "north"] {
            assert!(tx.send(report(cluster, ConditionType::DeployComplete, "ok")));
        }
        drop(tx);

        let (_shutdown_tx, shutdown_rx) = oneshot::channel();
        StatusForwarder::new(rx)
            .with_sink("MultiClusterConfigMap", Arc::new(sink))
            .run_until(shutdown_rx)
            .await;
    }

    #[tokio::test]
    async fn test_run_until_stops_on_shutdown() {
        let (_tx, rx) = status_channel(8);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(StatusForwarder::new(rx).run_until(shutdown_rx));

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("forwarder should stop")
            .unwrap();
    }
}
