//! Local cluster identity
//!
//! Outgoing conditions and status messages are labelled with the name this
//! cluster was registered under. Registration writes the name into a secret;
//! a cluster that was never registered is the aggregator's own member and
//! answers to [`LOCAL_CLUSTER_NAME`].

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::store::ResourceApi;
use crate::Error;

/// Name used by a cluster that has no registration secret
pub const LOCAL_CLUSTER_NAME: &str = "local";

/// Default name of the registration secret
pub const REGISTRATION_SECRET_NAME: &str = "lattice-cluster-registration";

/// Key in the registration secret holding the managed cluster name
pub const MANAGED_CLUSTER_NAME_KEY: &str = "managed-cluster-name";

/// Source of the local cluster's name
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterIdentity: Send + Sync {
    /// Name of the cluster this controller runs in
    async fn cluster_name(&self) -> Result<String, Error>;
}

/// Identity fixed by configuration
#[derive(Clone, Debug)]
pub struct StaticClusterIdentity {
    name: String,
}

impl StaticClusterIdentity {
    /// Identity that always answers `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl ClusterIdentity for StaticClusterIdentity {
    async fn cluster_name(&self) -> Result<String, Error> {
        Ok(self.name.clone())
    }
}

/// Identity read from the cluster registration secret on every call
///
/// Reading on each pass picks up a registration that happens while the
/// controller is running.
pub struct RegistrationSecretIdentity {
    secrets: Arc<dyn ResourceApi<Secret>>,
    namespace: String,
    name: String,
}

impl RegistrationSecretIdentity {
    /// Identity backed by the secret `namespace/name`
    pub fn new(
        secrets: Arc<dyn ResourceApi<Secret>>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            secrets,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

#[async_trait]
impl ClusterIdentity for RegistrationSecretIdentity {
    async fn cluster_name(&self) -> Result<String, Error> {
        let secret = self.secrets.get(&self.namespace, &self.name).await?;

        let registered = secret
            .as_ref()
            .and_then(|s| s.data.as_ref())
            .and_then(|d| d.get(MANAGED_CLUSTER_NAME_KEY))
            .map(|v| String::from_utf8_lossy(&v.0).trim().to_string())
            .filter(|name| !name.is_empty());

        match registered {
            Some(name) => Ok(name),
            None => {
                debug!(
                    secret = %format!("{}/{}", self.namespace, self.name),
                    "no cluster registration found, using local cluster name"
                );
                Ok(LOCAL_CLUSTER_NAME.to_string())
            }
        }
    }
}
