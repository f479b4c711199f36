//! Lattice Fleet - multi-cluster template resource synchronization
//!
//! A template resource (for example a `MultiClusterConfigMap`) names the
//! clusters it is placed on. A controller runs in every cluster of the fleet
//! and, for each template placed on its own cluster, keeps a concrete native
//! object (a `ConfigMap`) in sync with the template. Clusters that are not in
//! the placement prune any leftover concrete object.
//!
//! Each cluster records its outcome on the template's status and forwards it
//! to an aggregator, which combines the per-cluster outcomes into one
//! effective state.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions and shared status types
//! - [`controller`] - Generic reconciler and per-kind adapters
//! - [`placement`] - Placement resolution
//! - [`sync`] - Idempotent create-or-update of concrete objects
//! - [`finalizer`] - Finalizer lifecycle
//! - [`status`] - Effective state and condition bookkeeping
//! - [`propagation`] - Status channel towards the aggregator
//! - [`agent`] - Consumer of the status channel
//! - [`identity`] - Local cluster name
//! - [`retry`] - Requeue jitter and conflict retry
//! - [`store`] - Persistence seam over the Kubernetes API
//! - [`config`] - Controller configuration
//! - [`telemetry`] - Tracing setup
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod agent;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod finalizer;
pub mod identity;
pub mod placement;
pub mod propagation;
pub mod retry;
pub mod status;
pub mod store;
pub mod sync;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace holding cluster-wide fleet objects such as the registration secret
pub const LATTICE_SYSTEM_NAMESPACE: &str = "lattice-system";

/// Field manager recorded on every write made by the controllers
pub const FIELD_MANAGER: &str = "lattice-fleet";

/// Label stamped on every concrete object the controllers write
pub const MANAGED_BY_LABEL_KEY: &str = "app.kubernetes.io/managed-by";

/// Label selector matching concrete objects written by the controllers
pub const MANAGED_BY_LABEL_SELECTOR: &str = "app.kubernetes.io/managed-by=lattice-fleet";
