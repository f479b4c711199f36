//! Lattice Fleet - multi-cluster template resource controller

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::controller::Error as ControllerError;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt, ResourceExt};
use tokio::sync::oneshot;

use lattice_fleet::agent::StatusForwarder;
use lattice_fleet::config::ControllerConfig;
use lattice_fleet::controller::{error_policy, reconcile, Context, MultiClusterResource};
use lattice_fleet::crd::{MultiClusterConfigMap, MultiClusterSecret};
use lattice_fleet::identity::{
    ClusterIdentity, RegistrationSecretIdentity, StaticClusterIdentity, REGISTRATION_SECRET_NAME,
};
use lattice_fleet::propagation::{status_channel, StatusSender, DEFAULT_STATUS_CHANNEL_CAPACITY};
use lattice_fleet::retry::RequeueBackoff;
use lattice_fleet::store::{kind_of, KubeResourceApi, ResourceApi};
use lattice_fleet::{
    telemetry, FIELD_MANAGER, LATTICE_SYSTEM_NAMESPACE, MANAGED_BY_LABEL_SELECTOR,
};

/// Lattice Fleet - keeps multi-cluster templates materialized on every placed cluster
#[derive(Parser, Debug)]
#[command(name = "lattice-fleet", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    controller: ControllerArgs,
}

/// Controller arguments
#[derive(Parser, Debug)]
struct ControllerArgs {
    /// Name of this cluster; read from the registration secret when unset
    #[arg(long, env = "LATTICE_CLUSTER_NAME")]
    cluster_name: Option<String>,

    /// Namespace of the cluster registration secret
    #[arg(long, env = "LATTICE_REGISTRATION_NAMESPACE", default_value = LATTICE_SYSTEM_NAMESPACE)]
    registration_namespace: String,

    /// Name of the cluster registration secret
    #[arg(long, env = "LATTICE_REGISTRATION_SECRET", default_value = REGISTRATION_SECRET_NAME)]
    registration_secret: String,

    /// Kubeconfig of the aggregator cluster; status is not forwarded when unset
    #[arg(long, env = "LATTICE_UPSTREAM_KUBECONFIG")]
    upstream_kubeconfig: Option<PathBuf>,

    /// Capacity of the status channel towards the aggregator
    #[arg(long, default_value_t = DEFAULT_STATUS_CHANNEL_CAPACITY)]
    status_channel_capacity: usize,

    /// Lower bound of the requeue jitter window in milliseconds
    #[arg(long, default_value_t = 2000)]
    requeue_min_ms: u64,

    /// Upper bound of the requeue jitter window in milliseconds
    #[arg(long, default_value_t = 6000)]
    requeue_max_ms: u64,

    /// Field manager recorded on writes
    #[arg(long, default_value = FIELD_MANAGER)]
    field_manager: String,

    /// Do not install the CRDs on startup
    #[arg(long)]
    skip_crd_install: bool,
}

impl ControllerArgs {
    fn to_config(&self) -> ControllerConfig {
        ControllerConfig {
            cluster_name: self.cluster_name.clone(),
            registration_namespace: self.registration_namespace.clone(),
            registration_secret: self.registration_secret.clone(),
            status_channel_capacity: self.status_channel_capacity,
            requeue_min: Duration::from_millis(self.requeue_min_ms),
            requeue_max: Duration::from_millis(self.requeue_max_ms),
            upstream_kubeconfig: self.upstream_kubeconfig.clone(),
            field_manager: self.field_manager.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();

    let cli = Cli::parse();

    if cli.crd {
        let config_maps = serde_yaml::to_string(&MultiClusterConfigMap::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        let secrets = serde_yaml::to_string(&MultiClusterSecret::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{config_maps}---\n{secrets}");
        return Ok(());
    }

    run_controller(cli.controller).await
}

/// Ensure the fleet CRDs are installed
///
/// Uses server-side apply so the CRD versions always match the binary.
async fn ensure_crds_installed(client: &Client, field_manager: &str) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(field_manager).force();

    for crd in [MultiClusterConfigMap::crd(), MultiClusterSecret::crd()] {
        let name = crd.name_any();
        tracing::info!(crd = %name, "Installing CRD");
        crds.patch(&name, &params, &Patch::Apply(&crd))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to install CRD {}: {}", name, e))?;
    }

    Ok(())
}

/// Run the fleet controllers until a shutdown signal arrives
async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    let config = args.to_config();
    config.validate()?;

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if !args.skip_crd_install {
        ensure_crds_installed(&client, &config.field_manager).await?;
    }

    let identity: Arc<dyn ClusterIdentity> = match &config.cluster_name {
        Some(name) => Arc::new(StaticClusterIdentity::new(name.clone())),
        None => {
            let secrets: Arc<dyn ResourceApi<Secret>> = Arc::new(KubeResourceApi::new(
                client.clone(),
                config.field_manager.clone(),
            ));
            Arc::new(RegistrationSecretIdentity::new(
                secrets,
                config.registration_namespace.clone(),
                config.registration_secret.clone(),
            ))
        }
    };
    let cluster_name = identity.cluster_name().await?;
    tracing::info!(cluster = %cluster_name, "Resolved local cluster identity");

    let backoff = Arc::new(RequeueBackoff::new(config.requeue_window()));

    // The forwarder only runs when an aggregator is configured
    let (sender, forwarder) = match config.upstream_client().await? {
        Some(upstream) => {
            let (tx, rx) = status_channel(config.status_channel_capacity);
            let forwarder = StatusForwarder::new(rx)
                .with_upstream::<MultiClusterConfigMap>(Arc::new(KubeResourceApi::new(
                    upstream.clone(),
                    config.field_manager.clone(),
                )))
                .with_upstream::<MultiClusterSecret>(Arc::new(KubeResourceApi::new(
                    upstream,
                    config.field_manager.clone(),
                )));
            (tx, Some(forwarder))
        }
        None => {
            tracing::info!("No upstream cluster configured, status forwarding disabled");
            (StatusSender::disabled(), None)
        }
    };

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let forwarder_handle = forwarder.map(|f| tokio::spawn(f.run_until(shutdown_rx)));

    let config_map_ctx = Arc::new(
        Context::<MultiClusterConfigMap>::builder(client.clone())
            .field_manager(config.field_manager.clone())
            .identity(identity.clone())
            .status_sender(sender.clone())
            .backoff(backoff.clone())
            .build(),
    );
    let secret_ctx = Arc::new(
        Context::<MultiClusterSecret>::builder(client.clone())
            .field_manager(config.field_manager.clone())
            .identity(identity)
            .status_sender(sender)
            .backoff(backoff)
            .build(),
    );

    tracing::info!("Starting Lattice Fleet controllers...");
    tracing::info!("  - MultiClusterConfigMap controller");
    tracing::info!("  - MultiClusterSecret controller");

    tokio::select! {
        _ = run_kind(client.clone(), config_map_ctx) => {
            tracing::info!("MultiClusterConfigMap controller completed");
        }
        _ = run_kind(client, secret_ctx) => {
            tracing::info!("MultiClusterSecret controller completed");
        }
    }

    let _ = shutdown_tx.send(());
    if let Some(handle) = forwarder_handle {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Status forwarder task failed");
        }
    }

    tracing::info!("Lattice Fleet controller shutting down");
    Ok(())
}

/// Run the controller for one template kind
///
/// Changes to a concrete object the controllers wrote requeue the template
/// with the same namespace and name, so drift is repaired. Unlabelled
/// ConfigMaps and Secrets are never watched.
async fn run_kind<R: MultiClusterResource>(client: Client, ctx: Arc<Context<R>>) {
    let templates: Api<R> = Api::all(client.clone());
    let concretes: Api<R::Concrete> = Api::all(client);
    let kind = kind_of::<R>();

    Controller::new(templates, WatcherConfig::default())
        .watches(
            concretes,
            WatcherConfig::default().labels(MANAGED_BY_LABEL_SELECTOR),
            |obj| {
                obj.namespace()
                    .map(|ns| ObjectRef::<R>::new(&obj.name_any()).within(&ns))
            },
        )
        .shutdown_on_signal()
        .run(reconcile::<R>, error_policy::<R>, ctx)
        .for_each(|result| {
            let kind = kind.clone();
            async move {
                match result {
                    Ok(action) => {
                        tracing::debug!(%kind, ?action, "Reconciliation completed");
                    }
                    // A labelled object can briefly outlive its template
                    Err(ControllerError::ObjectNotFound(obj)) => {
                        tracing::debug!(%kind, object = %obj, "Template no longer exists");
                    }
                    Err(e) => {
                        tracing::error!(%kind, error = ?e, "Reconciliation error");
                    }
                }
            }
        })
        .await;
}
