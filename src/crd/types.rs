//! Supporting types shared by all multi-cluster resource CRDs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to a cluster in a placement
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ClusterRef {
    /// Cluster name as registered with the fleet
    pub name: String,
}

/// Clusters a template resource is materialized on
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct Placement {
    /// Target clusters, in the order they were declared
    #[serde(default)]
    pub clusters: Vec<ClusterRef>,
}

impl Placement {
    /// Build a placement targeting the given cluster names
    pub fn for_clusters<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            clusters: names
                .into_iter()
                .map(|name| ClusterRef { name: name.into() })
                .collect(),
        }
    }

    /// Iterate over the target cluster names
    pub fn cluster_names(&self) -> impl Iterator<Item = &str> {
        self.clusters.iter().map(|c| c.name.as_str())
    }

    /// True if no cluster is targeted
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

/// Metadata carried by a template for the concrete object
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct EmbeddedObjectMeta {
    /// Labels to set on the concrete object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    /// Annotations to set on the concrete object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

/// Aggregate state of a multi-cluster resource
///
/// Ordered by severity: `Ready < Pending < Failed`.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash,
)]
pub enum ResourceState {
    /// Not yet materialized everywhere it is placed
    #[default]
    Pending,
    /// Materialized successfully on every placed cluster
    Ready,
    /// Materialization failed on at least one placed cluster
    Failed,
}

impl ResourceState {
    /// Severity rank used when combining per-cluster states (worst wins)
    pub fn severity(self) -> u8 {
        match self {
            Self::Ready => 0,
            Self::Pending => 1,
            Self::Failed => 2,
        }
    }
}

impl std::fmt::Display for ResourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Ready => write!(f, "Ready"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kind of deployment outcome a condition reports
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionType {
    /// The concrete object was written (or already matched)
    DeployComplete,
    /// Materialization has not finished yet
    DeployPending,
    /// Materialization failed
    DeployFailed,
}

impl ConditionType {
    /// Cluster-level state implied by a condition of this type
    pub fn implied_state(self) -> ResourceState {
        match self {
            Self::DeployComplete => ResourceState::Ready,
            Self::DeployPending => ResourceState::Pending,
            Self::DeployFailed => ResourceState::Failed,
        }
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: ConditionType,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(type_: ConditionType, status: ConditionStatus, message: impl Into<String>) -> Self {
        Self {
            type_,
            status,
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    /// True if both conditions report the same outcome, ignoring timestamps
    pub fn same_outcome(&self, other: &Condition) -> bool {
        self.type_ == other.type_ && self.status == other.status && self.message == other.message
    }
}

/// Outcome reported by a single cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterLevelStatus {
    /// State of the concrete object on that cluster
    pub state: ResourceState,

    /// Message of the condition that produced this state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// When the cluster last reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<DateTime<Utc>>,
}

/// Status shared by every multi-cluster resource kind
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MultiClusterResourceStatus {
    /// Aggregate state over all placed clusters
    #[serde(default)]
    pub state: ResourceState,

    /// Deployment conditions, newest last
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Per-cluster outcomes keyed by cluster name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub clusters: BTreeMap<String, ClusterLevelStatus>,
}
