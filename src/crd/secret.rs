//! MultiClusterSecret Custom Resource Definition

use std::collections::BTreeMap;

use k8s_openapi::ByteString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{EmbeddedObjectMeta, MultiClusterResourceStatus, Placement};

/// Specification for a MultiClusterSecret
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "lattice.dev",
    version = "v1alpha1",
    kind = "MultiClusterSecret",
    plural = "multiclustersecrets",
    shortname = "mcsecret",
    status = "MultiClusterResourceStatus",
    namespaced,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MultiClusterSecretSpec {
    /// Secret contents to materialize
    pub template: SecretTemplate,

    /// Clusters the Secret is placed on
    pub placement: Placement,
}

/// Secret template embedded in a MultiClusterSecret
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretTemplate {
    /// Labels and annotations for the Secret
    #[serde(default)]
    pub metadata: EmbeddedObjectMeta,

    /// Secret type (defaults to Opaque on the API server)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    /// Base64-encoded data entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<BTreeMap<String, String>>")]
    pub data: Option<BTreeMap<String, ByteString>>,

    /// Plain-text data entries, merged over `data` when materialized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_data: Option<BTreeMap<String, String>>,

    /// Whether the Secret is immutable once written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immutable: Option<bool>,
}
