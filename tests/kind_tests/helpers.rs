//! Test helpers for integration tests
//!
//! Provides utilities for managing the kind cluster and fleet resources.

use std::process::Command;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, Config, CustomResourceExt, ResourceExt};
use tokio::sync::OnceCell;
use tokio::time::sleep;

use lattice_fleet::controller::{reconcile, Context, MultiClusterResource};
use lattice_fleet::crd::{MultiClusterConfigMap, MultiClusterSecret};
use lattice_fleet::identity::StaticClusterIdentity;

/// Name of the kind cluster used for integration tests
pub const TEST_CLUSTER_NAME: &str = "lattice-fleet-test";

/// Global lock to ensure cluster is created only once
static CLUSTER_INIT: OnceLock<Result<(), String>> = OnceLock::new();

/// Track if CRDs have been installed (async-safe)
static CRDS_INSTALLED: OnceCell<Result<(), String>> = OnceCell::const_new();

/// Check if a kind cluster with the given name exists
pub fn kind_cluster_exists(name: &str) -> bool {
    let output = Command::new("kind")
        .args(["get", "clusters"])
        .output()
        .expect("failed to run kind");

    let clusters = String::from_utf8_lossy(&output.stdout);
    clusters.lines().any(|line| line.trim() == name)
}

/// Create a kind cluster for testing
pub fn create_kind_cluster(name: &str) -> Result<(), String> {
    if kind_cluster_exists(name) {
        println!("Kind cluster '{name}' already exists, reusing it");
        return Ok(());
    }

    println!("Creating kind cluster '{name}'...");
    let output = Command::new("kind")
        .args(["create", "cluster", "--name", name, "--wait", "60s"])
        .output()
        .map_err(|e| format!("failed to run kind: {e}"))?;

    if !output.status.success() {
        return Err(format!(
            "failed to create kind cluster: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }

    println!("Kind cluster '{name}' created successfully");
    Ok(())
}

/// Apply both fleet CRDs with server-side apply
pub async fn install_crds(client: &Client) -> Result<(), kube::Error> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply("lattice-fleet-tests").force();

    for crd in [MultiClusterConfigMap::crd(), MultiClusterSecret::crd()] {
        let name = crd.name_any();
        println!("Installing CRD {name}...");
        crds.patch(&name, &params, &Patch::Apply(&crd)).await?;
    }

    // Wait for the CRDs to be established
    sleep(Duration::from_secs(2)).await;
    Ok(())
}

/// Create a Kubernetes client connected to the test cluster
pub async fn create_test_client() -> Result<Client, String> {
    // Use the kind cluster context directly without modifying kubeconfig
    let context_name = format!("kind-{TEST_CLUSTER_NAME}");

    let config = Config::from_kubeconfig(&kube::config::KubeConfigOptions {
        context: Some(context_name),
        ..Default::default()
    })
    .await
    .map_err(|e| format!("failed to load kubeconfig: {e}"))?;

    Client::try_from(config).map_err(|e| format!("failed to create client: {e}"))
}

/// Ensure the test cluster is ready (thread-safe, cluster created once)
///
/// Returns a fresh Client for each call - clients should not be shared across test threads.
pub async fn ensure_test_cluster() -> Result<Client, String> {
    let cluster_result = CLUSTER_INIT.get_or_init(|| create_kind_cluster(TEST_CLUSTER_NAME));
    cluster_result.clone()?;

    let client = create_test_client().await?;

    let crd_result = CRDS_INSTALLED
        .get_or_init(|| async {
            let client = create_test_client().await?;
            install_crds(&client)
                .await
                .map_err(|e| format!("failed to install CRDs: {e}"))
        })
        .await;
    crd_result.clone()?;

    Ok(client)
}

/// Create a namespace for one test, replacing any leftover from an earlier run
pub async fn fresh_namespace(client: &Client, name: &str) {
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let _ = namespaces.delete(name, &DeleteParams::default()).await;
    for _ in 0..60 {
        match namespaces.get_opt(name).await {
            Ok(None) => break,
            _ => sleep(Duration::from_secs(1)).await,
        }
    }

    let namespace = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    namespaces
        .create(&PostParams::default(), &namespace)
        .await
        .expect("failed to create namespace");
}

/// Controller context for a fleet member called `cluster`
pub fn member_context<R: MultiClusterResource>(client: &Client, cluster: &str) -> Arc<Context<R>> {
    Arc::new(
        Context::builder(client.clone())
            .identity(Arc::new(StaticClusterIdentity::new(cluster)))
            .build(),
    )
}

/// Run one reconciliation pass for `namespace/name` as it is currently stored
pub async fn reconcile_once<R: MultiClusterResource>(
    client: &Client,
    ctx: &Arc<Context<R>>,
    namespace: &str,
    name: &str,
) -> Result<(), lattice_fleet::Error> {
    let api: Api<R> = Api::namespaced(client.clone(), namespace);
    let current = api.get(name).await?;
    reconcile(Arc::new(current), ctx.clone()).await.map(|_| ())
}
