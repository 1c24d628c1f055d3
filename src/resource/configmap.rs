use super::handle::{Existence, HandleError, ResourceHandle};
use super::validation;
#[cfg_attr(test, mockall_double::double)]
use crate::k8s::client::SyncK8sClient;
use crate::k8s::error::K8sError;
use kube::api::TypeMeta;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

pub fn configmap_type_meta() -> TypeMeta {
    TypeMeta {
        api_version: "v1".to_string(),
        kind: "ConfigMap".to_string(),
    }
}

/// Handle for a `v1/ConfigMap`.
pub struct ConfigMapHandle {
    inner: ResourceHandle,
}

impl ConfigMapHandle {
    pub fn new(client: Arc<SyncK8sClient>, name: &str, namespace: &str) -> Self {
        Self {
            inner: ResourceHandle::new(client, configmap_type_meta(), name, namespace, json!({})),
        }
    }

    /// Sets the `data` payload. An empty map is rejected.
    pub fn with_data(mut self, data: BTreeMap<String, String>) -> Self {
        let precondition = validation::non_empty_map("data", &data);
        self.inner = self.inner.with_validated(precondition, |definition| {
            definition.data["data"] = json!(data);
        });
        self
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.inner = self.inner.with_labels(labels);
        self
    }

    pub fn create(&mut self) -> Result<(), HandleError> {
        self.inner.create()
    }

    pub fn update(&mut self, force: bool) -> Result<(), HandleError> {
        self.inner.update(force)
    }

    pub fn delete(&mut self) -> Result<(), HandleError> {
        self.inner.delete()
    }

    pub fn refresh(&mut self) -> Existence {
        self.inner.refresh()
    }

    pub fn exists(&mut self) -> Result<bool, K8sError> {
        self.inner.exists()
    }

    pub fn handle(&self) -> &ResourceHandle {
        &self.inner
    }
}
