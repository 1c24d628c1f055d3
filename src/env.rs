//! Disposable cluster namespaces for suites.

#[cfg_attr(test, mockall_double::double)]
use crate::k8s::client::SyncK8sClient;
use crate::k8s::error::K8sError;
use std::sync::Arc;
use tracing::{info, warn};

const TEST_NAMESPACE_PREFIX: &str = "testkit-";

/// A running cluster plus the namespaces generated for the current suite.
/// Generated namespaces are removed when the value is dropped, so resources are
/// cleaned up even if the test panics.
pub struct TestEnv {
    client: Arc<SyncK8sClient>,
    generated_namespaces: Vec<String>,
}

impl TestEnv {
    pub fn new(client: Arc<SyncK8sClient>) -> Self {
        Self {
            client,
            generated_namespaces: Vec::new(),
        }
    }

    pub fn client(&self) -> Arc<SyncK8sClient> {
        self.client.clone()
    }

    /// Creates a uniquely named namespace that lives until this env is dropped.
    pub fn test_namespace(&mut self) -> Result<String, K8sError> {
        let namespace = self.client.create_test_namespace(TEST_NAMESPACE_PREFIX)?;
        info!("created test namespace `{namespace}`");
        self.generated_namespaces.push(namespace.clone());
        Ok(namespace)
    }
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        for namespace in self.generated_namespaces.drain(..) {
            if let Err(err) = self.client.delete_namespace(&namespace) {
                warn!("failed to remove test namespace `{namespace}`: {err}");
            }
        }
    }
}
