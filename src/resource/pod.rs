use super::handle::{Existence, HandleError, ResourceHandle};
use super::validation;
#[cfg_attr(test, mockall_double::double)]
use crate::k8s::client::SyncK8sClient;
use crate::k8s::error::K8sError;
use crate::wait::resources::ConvergenceError;
use crate::wait::{PollError, WaitConfig};
use kube::api::TypeMeta;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

pub fn pod_type_meta() -> TypeMeta {
    TypeMeta {
        api_version: "v1".to_string(),
        kind: "Pod".to_string(),
    }
}

/// Handle for a single-container `v1/Pod`, as used by suites to run one-shot
/// workloads on the cluster and wait for the outcome.
pub struct PodHandle {
    inner: ResourceHandle,
}

impl PodHandle {
    pub fn new(client: Arc<SyncK8sClient>, name: &str, namespace: &str, image: &str) -> Self {
        let data = json!({
            "spec": {
                "containers": [{
                    "name": "main",
                    "image": image,
                }],
                "restartPolicy": "Never",
            }
        });

        Self {
            inner: ResourceHandle::new(client, pod_type_meta(), name, namespace, data)
                .require(validation::non_empty_str("image", image)),
        }
    }

    /// Overrides the container command. An empty command is rejected.
    pub fn with_command(mut self, command: Vec<String>) -> Self {
        let precondition = validation::non_empty_list("command", &command);
        self.inner = self.inner.with_validated(precondition, |definition| {
            definition.data["spec"]["containers"][0]["command"] = json!(command);
        });
        self
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.inner = self.inner.with_labels(labels);
        self
    }

    /// Schedules the pod onto nodes matching the given labels.
    pub fn with_node_selector(mut self, node_selector: BTreeMap<String, String>) -> Self {
        let precondition = validation::non_empty_map("nodeSelector", &node_selector);
        self.inner = self.inner.with_validated(precondition, |definition| {
            definition.data["spec"]["nodeSelector"] = json!(node_selector);
        });
        self
    }

    pub fn create(&mut self) -> Result<(), HandleError> {
        self.inner.create()
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

    pub fn wait_until_running(
        &mut self,
        config: &WaitConfig,
    ) -> Result<(), PollError<ConvergenceError>> {
        self.inner.wait_until_phase("Running", config)
    }

    pub fn wait_until_succeeded(
        &mut self,
        config: &WaitConfig,
    ) -> Result<(), PollError<ConvergenceError>> {
        self.inner.wait_until_phase("Succeeded", config)
    }

    pub fn wait_until_gone(
        &mut self,
        config: &WaitConfig,
    ) -> Result<(), PollError<ConvergenceError>> {
        self.inner.wait_until_gone(config)
    }

    pub fn handle(&self) -> &ResourceHandle {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::client::MockSyncK8sClient;
    use serde_json::json;

    #[test]
    fn definition_holds_a_single_container() {
        let pod = PodHandle::new(
            Arc::new(MockSyncK8sClient::new()),
            "kmm-probe",
            "kmm-tests",
            "registry.local/kmm-probe:latest",
        );

        assert!(pod.handle().validation_error().is_none());
        let containers = &pod.handle().definition().data["spec"]["containers"];
        assert_eq!(containers.as_array().unwrap().len(), 1);
        assert_eq!(
            containers[0]["image"],
            json!("registry.local/kmm-probe:latest")
        );
    }

    #[test]
    fn empty_image_closes_the_gate() {
        let pod = PodHandle::new(Arc::new(MockSyncK8sClient::new()), "kmm-probe", "kmm-tests", "");

        assert_eq!(
            pod.handle().validation_error().unwrap().to_string(),
            "'image' cannot be empty"
        );
    }

    #[test]
    fn empty_command_closes_the_gate_and_keeps_the_definition() {
        let pod = PodHandle::new(
            Arc::new(MockSyncK8sClient::new()),
            "kmm-probe",
            "kmm-tests",
            "registry.local/kmm-probe:latest",
        )
        .with_command(vec![]);

        assert_eq!(
            pod.handle().validation_error().unwrap().to_string(),
            "'command' cannot be empty"
        );
        assert!(pod.handle().definition().data["spec"]["containers"][0]["command"].is_null());
    }

    #[test]
    fn command_and_node_selector_land_in_the_spec() {
        let pod = PodHandle::new(
            Arc::new(MockSyncK8sClient::new()),
            "kmm-probe",
            "kmm-tests",
            "registry.local/kmm-probe:latest",
        )
        .with_command(vec!["sleep".to_string(), "infinity".to_string()])
        .with_node_selector(std::collections::BTreeMap::from([(
            "kubernetes.io/arch".to_string(),
            "amd64".to_string(),
        )]));

        let spec = &pod.handle().definition().data["spec"];
        assert_eq!(spec["containers"][0]["command"][0], json!("sleep"));
        assert_eq!(spec["nodeSelector"]["kubernetes.io/arch"], json!("amd64"));
    }
}
