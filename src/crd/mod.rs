//! Custom Resource Definitions for multi-cluster resources
//!
//! Every multi-cluster kind pairs a template for a native object with a
//! placement and shares [`MultiClusterResourceStatus`].

mod config_map;
mod secret;
mod types;

pub use config_map::{ConfigMapTemplate, MultiClusterConfigMap, MultiClusterConfigMapSpec};
pub use secret::{MultiClusterSecret, MultiClusterSecretSpec, SecretTemplate};
pub use types::{
    ClusterLevelStatus, ClusterRef, Condition, ConditionStatus, ConditionType,
    EmbeddedObjectMeta, MultiClusterResourceStatus, Placement, ResourceState,
};
