//! MultiClusterConfigMap Custom Resource Definition
//!
//! A MultiClusterConfigMap carries a ConfigMap template and the set of clusters
//! it should be materialized on. Each placed cluster writes a ConfigMap with the
//! same namespace and name as the MultiClusterConfigMap.

use std::collections::BTreeMap;

use k8s_openapi::ByteString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{EmbeddedObjectMeta, MultiClusterResourceStatus, Placement};

/// Specification for a MultiClusterConfigMap
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "lattice.dev",
    version = "v1alpha1",
    kind = "MultiClusterConfigMap",
    plural = "multiclusterconfigmaps",
    shortname = "mccm",
    status = "MultiClusterResourceStatus",
    namespaced,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MultiClusterConfigMapSpec {
    /// ConfigMap contents to materialize
    pub template: ConfigMapTemplate,

    /// Clusters the ConfigMap is placed on
    pub placement: Placement,
}

/// ConfigMap template embedded in a MultiClusterConfigMap
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapTemplate {
    /// Labels and annotations for the ConfigMap
    #[serde(default)]
    pub metadata: EmbeddedObjectMeta,

    /// UTF-8 data entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, String>>,

    /// Binary data entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<BTreeMap<String, String>>")]
    pub binary_data: Option<BTreeMap<String, ByteString>>,

    /// Whether the ConfigMap is immutable once written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immutable: Option<bool>,
}
