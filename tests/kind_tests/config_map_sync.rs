//! Integration tests for MultiClusterConfigMap synchronization
//!
//! These tests tell the story of a fleet operator distributing application
//! configuration to member clusters. The kind cluster plays one member at a
//! time by reconciling under different cluster names.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, PostParams};
use kube::ResourceExt;

use lattice_fleet::controller::MultiClusterResource;
use lattice_fleet::{FIELD_MANAGER, MANAGED_BY_LABEL_KEY};
use lattice_fleet::crd::{
    ConfigMapTemplate, ConditionType, MultiClusterConfigMap, MultiClusterConfigMapSpec, Placement,
    ResourceState,
};

use super::helpers::{ensure_test_cluster, fresh_namespace, member_context, reconcile_once};

// =============================================================================
// Test Fixtures
// =============================================================================

fn app_config(namespace: &str, placement: &[&str], data: &[(&str, &str)]) -> MultiClusterConfigMap {
    MultiClusterConfigMap {
        metadata: ObjectMeta {
            name: Some("app-config".to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: MultiClusterConfigMapSpec {
            template: ConfigMapTemplate {
                data: Some(
                    data.iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<BTreeMap<_, _>>(),
                ),
                ..Default::default()
            },
            placement: Placement::for_clusters(placement.iter().copied()),
        },
        status: None,
    }
}

// =============================================================================
// Materialization Stories
// =============================================================================

/// Story: configuration placed on this cluster shows up as a ConfigMap
///
/// Expected behavior:
/// - A ConfigMap with the same namespace and name is created
/// - The template takes the synchronization finalizer
/// - The status reports Ready for this cluster
/// - A second pass leaves the ConfigMap untouched
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_placed_config_is_materialized() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let ns = "fleet-materialize";
    fresh_namespace(&client, ns).await;

    let templates: Api<MultiClusterConfigMap> = Api::namespaced(client.clone(), ns);
    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), ns);
    templates
        .create(&PostParams::default(), &app_config(ns, &["west"], &[("color", "blue")]))
        .await
        .expect("failed to create template");

    let ctx = member_context::<MultiClusterConfigMap>(&client, "west");
    reconcile_once(&client, &ctx, ns, "app-config")
        .await
        .expect("first pass failed");

    let cm = config_maps.get("app-config").await.expect("ConfigMap missing");
    assert_eq!(cm.labels()[MANAGED_BY_LABEL_KEY], FIELD_MANAGER);
    assert_eq!(cm.data.unwrap()["color"], "blue");
    let first_version = cm.metadata.resource_version;

    let template = templates.get("app-config").await.unwrap();
    assert!(template
        .finalizers()
        .iter()
        .any(|f| f == MultiClusterConfigMap::FINALIZER));
    let status = template.status.expect("status not written");
    assert_eq!(status.state, ResourceState::Ready);
    assert_eq!(status.conditions[0].type_, ConditionType::DeployComplete);

    reconcile_once(&client, &ctx, ns, "app-config")
        .await
        .expect("second pass failed");
    let cm = config_maps.get("app-config").await.unwrap();
    assert_eq!(cm.metadata.resource_version, first_version);
}

/// Story: a cluster outside the placement prunes what it had
///
/// The template was placed on east and later moved to west only. East must
/// remove its ConfigMap and release the finalizer, while the template stays.
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_moved_placement_prunes_config() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let ns = "fleet-prune";
    fresh_namespace(&client, ns).await;

    let templates: Api<MultiClusterConfigMap> = Api::namespaced(client.clone(), ns);
    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), ns);
    templates
        .create(&PostParams::default(), &app_config(ns, &["east"], &[("color", "blue")]))
        .await
        .expect("failed to create template");

    let east = member_context::<MultiClusterConfigMap>(&client, "east");
    reconcile_once(&client, &east, ns, "app-config")
        .await
        .expect("east pass failed");
    assert!(config_maps.get_opt("app-config").await.unwrap().is_some());

    // Move the placement to west
    let mut moved = templates.get("app-config").await.unwrap();
    moved.spec.placement = Placement::for_clusters(["west"]);
    templates
        .replace("app-config", &PostParams::default(), &moved)
        .await
        .expect("failed to move placement");

    reconcile_once(&client, &east, ns, "app-config")
        .await
        .expect("prune pass failed");

    assert!(config_maps.get_opt("app-config").await.unwrap().is_none());
    let template = templates.get("app-config").await.unwrap();
    assert!(template.finalizers().is_empty());
}

/// Story: deleting the template removes the ConfigMap first
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_deleted_template_cleans_up() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let ns = "fleet-delete";
    fresh_namespace(&client, ns).await;

    let templates: Api<MultiClusterConfigMap> = Api::namespaced(client.clone(), ns);
    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), ns);
    templates
        .create(&PostParams::default(), &app_config(ns, &["west"], &[("color", "blue")]))
        .await
        .expect("failed to create template");

    let ctx = member_context::<MultiClusterConfigMap>(&client, "west");
    reconcile_once(&client, &ctx, ns, "app-config")
        .await
        .expect("first pass failed");

    templates
        .delete("app-config", &DeleteParams::default())
        .await
        .expect("failed to delete template");
    // The finalizer holds the template until the controller has cleaned up
    assert!(templates.get_opt("app-config").await.unwrap().is_some());

    reconcile_once(&client, &ctx, ns, "app-config")
        .await
        .expect("deletion pass failed");

    assert!(config_maps.get_opt("app-config").await.unwrap().is_none());
    assert!(templates.get_opt("app-config").await.unwrap().is_none());
}

/// Story: an invalid template is reported as Failed and nothing is written
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_invalid_template_is_reported() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let ns = "fleet-invalid";
    fresh_namespace(&client, ns).await;

    let templates: Api<MultiClusterConfigMap> = Api::namespaced(client.clone(), ns);
    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), ns);
    templates
        .create(
            &PostParams::default(),
            &app_config(ns, &["west"], &[("not a valid key", "x")]),
        )
        .await
        .expect("failed to create template");

    let ctx = member_context::<MultiClusterConfigMap>(&client, "west");
    let result = reconcile_once(&client, &ctx, ns, "app-config").await;
    assert!(result.is_err());

    assert!(config_maps.get_opt("app-config").await.unwrap().is_none());
    let template = templates.get("app-config").await.unwrap();
    assert!(template.finalizers().is_empty());
    assert_eq!(template.status.unwrap().state, ResourceState::Failed);
}
