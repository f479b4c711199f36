//! Effective state and condition bookkeeping
//!
//! The effective state of a template resource is the worst state reported by
//! any cluster it is placed on. A placed cluster that has not reported yet
//! counts as `Pending`.

use chrono::Utc;

use crate::crd::{
    ClusterLevelStatus, Condition, ConditionStatus, ConditionType, MultiClusterResourceStatus,
    Placement, ResourceState,
};
use crate::sync::OperationResult;
use crate::Error;

/// Conditions kept on a status; older ones are dropped first
pub const MAX_CONDITIONS: usize = 10;

/// Combine per-cluster states over `placement`
///
/// `Failed` dominates `Pending`, which dominates `Ready`. Entries for
/// clusters outside the placement are ignored and an empty placement is
/// `Pending`.
pub fn compute_effective_state(
    placement: &Placement,
    status: &MultiClusterResourceStatus,
) -> ResourceState {
    if placement.is_empty() {
        return ResourceState::Pending;
    }

    placement
        .cluster_names()
        .map(|name| {
            status
                .clusters
                .get(name)
                .map(|entry| entry.state)
                .unwrap_or(ResourceState::Pending)
        })
        .max_by_key(|state| state.severity())
        .unwrap_or(ResourceState::Pending)
}

/// Recompute `status.state`, returning the state it had before
///
/// Callers compare the returned value with `status.state` to decide whether
/// the status needs to be persisted.
pub fn set_effective_state_if_changed(
    placement: &Placement,
    status: &mut MultiClusterResourceStatus,
) -> ResourceState {
    let previous = status.state;
    status.state = compute_effective_state(placement, status);
    previous
}

/// Condition describing the outcome of a synchronization pass
pub fn condition_from_result(result: &Result<OperationResult, Error>, kind: &str) -> Condition {
    match result {
        Ok(op) => Condition::new(
            ConditionType::DeployComplete,
            ConditionStatus::True,
            format!("{} {}", kind, op),
        ),
        Err(e) => Condition::new(
            ConditionType::DeployFailed,
            ConditionStatus::True,
            e.to_string(),
        ),
    }
}

impl ClusterLevelStatus {
    /// Cluster entry implied by `condition`, stamped with its transition time
    pub fn from_condition(condition: &Condition) -> Self {
        Self {
            state: condition.type_.implied_state(),
            message: Some(condition.message.clone()),
            last_update_time: Some(condition.last_transition_time),
        }
    }
}

impl MultiClusterResourceStatus {
    /// Append `condition` unless it repeats the latest condition of its type
    ///
    /// Returns whether the condition was appended. At most
    /// [`MAX_CONDITIONS`] are kept.
    pub fn append_condition(&mut self, condition: Condition) -> bool {
        let latest = self
            .conditions
            .iter()
            .rev()
            .find(|c| c.type_ == condition.type_);
        if latest.is_some_and(|c| c.same_outcome(&condition)) {
            return false;
        }
        self.conditions.push(condition);
        if self.conditions.len() > MAX_CONDITIONS {
            let excess = self.conditions.len() - MAX_CONDITIONS;
            self.conditions.drain(..excess);
        }
        true
    }

    /// Upsert the entry for `cluster`
    ///
    /// Returns false, leaving the stored timestamp alone, when state and
    /// message are unchanged.
    pub fn set_cluster_status(&mut self, cluster: &str, entry: ClusterLevelStatus) -> bool {
        if let Some(existing) = self.clusters.get(cluster) {
            if existing.state == entry.state && existing.message == entry.message {
                return false;
            }
        }
        self.clusters.insert(cluster.to_string(), entry);
        true
    }
}

/// Fold one cluster's report into `status`
///
/// Upserts the cluster entry, appends the condition (deduplicated) and
/// recomputes the effective state. Returns whether anything changed.
pub fn apply_cluster_status(
    status: &mut MultiClusterResourceStatus,
    placement: &Placement,
    cluster: &str,
    condition: Condition,
    entry: ClusterLevelStatus,
) -> bool {
    let entry_changed = status.set_cluster_status(cluster, entry);
    let condition_added = status.append_condition(condition);
    let previous = set_effective_state_if_changed(placement, status);
    entry_changed || condition_added || previous != status.state
}

/// Entry for this cluster recording "now" as its report time
pub fn cluster_status_now(state: ResourceState, message: impl Into<String>) -> ClusterLevelStatus {
    ClusterLevelStatus {
        state,
        message: Some(message.into()),
        last_update_time: Some(Utc::now()),
    }
}
