//! Integration tests for Lattice Fleet
//!
//! These tests require a Kubernetes cluster (kind) to run and tell the story
//! of how a fleet operator distributes configuration to member clusters.
//!
//! # Test Organization
//!
//! - `config_map_sync`: Stories about MultiClusterConfigMaps being
//!   materialized, updated, pruned and deleted on a member cluster
//!
//! - `secret_sync`: Stories about MultiClusterSecrets, including stringData
//!
//! Each test drives reconciliation passes directly against the kind cluster,
//! playing the role of one named member of the fleet.
//!
//! # Running These Tests
//!
//! ```bash
//! cargo test --test kind -- --ignored
//! ```

mod config_map_sync;
mod helpers;
mod secret_sync;
