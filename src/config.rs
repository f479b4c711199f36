//! Controller configuration
//!
//! The binary parses its flags into a [`ControllerConfig`], which is
//! validated once before any controller starts.

use std::ops::Range;
use std::path::PathBuf;
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use tracing::info;

use crate::identity::REGISTRATION_SECRET_NAME;
use crate::propagation::DEFAULT_STATUS_CHANNEL_CAPACITY;
use crate::retry::{DEFAULT_REQUEUE_MAX, DEFAULT_REQUEUE_MIN};
use crate::{Error, FIELD_MANAGER, LATTICE_SYSTEM_NAMESPACE};

/// Settings shared by the fleet controllers
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerConfig {
    /// Fixed cluster name; when unset the registration secret is consulted
    pub cluster_name: Option<String>,
    /// Namespace of the registration secret
    pub registration_namespace: String,
    /// Name of the registration secret
    pub registration_secret: String,
    /// Capacity of the status channel towards the aggregator
    pub status_channel_capacity: usize,
    /// Lower bound of the requeue jitter window
    pub requeue_min: Duration,
    /// Upper bound (exclusive) of the requeue jitter window
    pub requeue_max: Duration,
    /// Kubeconfig of the aggregator; when unset no status is forwarded
    pub upstream_kubeconfig: Option<PathBuf>,
    /// Field manager recorded on writes
    pub field_manager: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cluster_name: None,
            registration_namespace: LATTICE_SYSTEM_NAMESPACE.to_string(),
            registration_secret: REGISTRATION_SECRET_NAME.to_string(),
            status_channel_capacity: DEFAULT_STATUS_CHANNEL_CAPACITY,
            requeue_min: DEFAULT_REQUEUE_MIN,
            requeue_max: DEFAULT_REQUEUE_MAX,
            upstream_kubeconfig: None,
            field_manager: FIELD_MANAGER.to_string(),
        }
    }
}

impl ControllerConfig {
    /// Check the configuration for values the controllers cannot run with
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(name) = &self.cluster_name {
            if name.trim().is_empty() {
                return Err(Error::config("cluster name must not be blank"));
            }
        }
        if self.registration_namespace.is_empty() || self.registration_secret.is_empty() {
            return Err(Error::config(
                "registration secret namespace and name must be set",
            ));
        }
        if self.status_channel_capacity == 0 {
            return Err(Error::config("status channel capacity must be positive"));
        }
        if self.requeue_min.is_zero() {
            return Err(Error::config("minimum requeue delay must be positive"));
        }
        if self.requeue_max <= self.requeue_min {
            return Err(Error::config(format!(
                "requeue window {:?}..{:?} is empty",
                self.requeue_min, self.requeue_max
            )));
        }
        if self.field_manager.is_empty() {
            return Err(Error::config("field manager must be set"));
        }
        Ok(())
    }

    /// The requeue jitter window
    pub fn requeue_window(&self) -> Range<Duration> {
        self.requeue_min..self.requeue_max
    }

    /// Client for the aggregator, if one is configured
    pub async fn upstream_client(&self) -> Result<Option<Client>, Error> {
        let Some(path) = &self.upstream_kubeconfig else {
            return Ok(None);
        };

        let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
            Error::config(format!("failed to read upstream kubeconfig {:?}: {}", path, e))
        })?;
        let config =
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::config(format!("invalid upstream kubeconfig: {}", e)))?;
        info!(cluster_url = %config.cluster_url, "connecting to upstream cluster");

        Client::try_from(config).map(Some).map_err(Error::from)
    }
}
