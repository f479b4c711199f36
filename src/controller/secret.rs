//! MultiClusterSecret → Secret

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;

use super::config_map::{non_empty, validate_key};
use super::MultiClusterResource;
use crate::crd::{MultiClusterResourceStatus, MultiClusterSecret, Placement};
use crate::Error;

/// Type the API server assigns to a Secret written without one
const DEFAULT_SECRET_TYPE: &str = "Opaque";

impl MultiClusterResource for MultiClusterSecret {
    type Concrete = Secret;

    const FINALIZER: &'static str = "multiclustersecret.lattice.dev";

    fn placement(&self) -> &Placement {
        &self.spec.placement
    }

    fn mc_status(&self) -> Option<&MultiClusterResourceStatus> {
        self.status.as_ref()
    }

    fn mc_status_mut(&mut self) -> &mut MultiClusterResourceStatus {
        self.status.get_or_insert_with(Default::default)
    }

    fn mutate_concrete(&self, secret: &mut Secret) -> Result<(), Error> {
        let template = &self.spec.template;

        // stringData is write-only on the API server and lands in data;
        // folding it here keeps the stored object comparable
        let mut data: BTreeMap<String, ByteString> = template.data.clone().unwrap_or_default();
        if let Some(string_data) = &template.string_data {
            for (key, value) in string_data {
                data.insert(key.clone(), ByteString(value.as_bytes().to_vec()));
            }
        }
        for key in data.keys() {
            validate_key(key)?;
        }

        secret.data = if data.is_empty() { None } else { Some(data) };
        secret.string_data = None;
        secret.type_ = Some(
            template
                .type_
                .clone()
                .unwrap_or_else(|| DEFAULT_SECRET_TYPE.to_string()),
        );
        secret.immutable = template.immutable;
        secret.metadata.labels = non_empty(&template.metadata.labels);
        secret.metadata.annotations = non_empty(&template.metadata.annotations);
        Ok(())
    }
}
