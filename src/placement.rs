//! Placement resolution
//!
//! Decides whether the local cluster is a target of a multi-cluster resource.
//! Every other step of a reconciliation pass is gated on this answer.

use crate::crd::Placement;

/// Returns true if `local_cluster` is one of the placement's target clusters
///
/// An empty placement (or an empty local cluster name) is never placed.
pub fn is_placed_in_this_cluster(placement: &Placement, local_cluster: &str) -> bool {
    if local_cluster.is_empty() {
        return false;
    }
    placement.cluster_names().any(|name| name == local_cluster)
}
