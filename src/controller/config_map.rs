//! MultiClusterConfigMap → ConfigMap

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;

use super::MultiClusterResource;
use crate::crd::{MultiClusterConfigMap, MultiClusterResourceStatus, Placement};
use crate::Error;

impl MultiClusterResource for MultiClusterConfigMap {
    type Concrete = ConfigMap;

    const FINALIZER: &'static str = "multiclusterconfigmap.lattice.dev";

    fn placement(&self) -> &Placement {
        &self.spec.placement
    }

    fn mc_status(&self) -> Option<&MultiClusterResourceStatus> {
        self.status.as_ref()
    }

    fn mc_status_mut(&mut self) -> &mut MultiClusterResourceStatus {
        self.status.get_or_insert_with(Default::default)
    }

    fn mutate_concrete(&self, config_map: &mut ConfigMap) -> Result<(), Error> {
        let template = &self.spec.template;

        let data_keys = template.data.iter().flat_map(|d| d.keys());
        let binary_keys = template.binary_data.iter().flat_map(|d| d.keys());
        for key in data_keys.clone().chain(binary_keys) {
            validate_key(key)?;
        }
        if let Some(binary) = &template.binary_data {
            if let Some(dup) = data_keys.into_iter().find(|k| binary.contains_key(*k)) {
                return Err(Error::mutation(format!(
                    "key {:?} is present in both data and binaryData",
                    dup
                )));
            }
        }

        config_map.data = non_empty(&template.data);
        config_map.binary_data = non_empty(&template.binary_data);
        config_map.immutable = template.immutable;
        config_map.metadata.labels = non_empty(&template.metadata.labels);
        config_map.metadata.annotations = non_empty(&template.metadata.annotations);
        Ok(())
    }
}

/// The API server drops empty maps, so `{}` is stored as absent
pub(super) fn non_empty<V: Clone>(
    map: &Option<BTreeMap<String, V>>,
) -> Option<BTreeMap<String, V>> {
    map.as_ref().filter(|m| !m.is_empty()).cloned()
}

/// Keys of ConfigMaps and Secrets: alphanumerics, `-`, `_` and `.`, at most
/// 253 characters, not `.` or `..`
pub(super) fn validate_key(key: &str) -> Result<(), Error> {
    let valid_chars = key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if key.is_empty() || key.len() > 253 || !valid_chars || key == "." || key == ".." {
        return Err(Error::mutation(format!("{:?} is not a valid config key", key)));
    }
    Ok(())
}
