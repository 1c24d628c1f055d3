use kube::config::KubeconfigError;
use kube::core::gvk::ParseGroupVersionError;

#[derive(thiserror::Error, Debug)]
pub enum K8sError {
    #[error("the kube client returned an error: `{0}`")]
    Generic(#[from] kube::Error),

    #[error("it is not possible to read kubeconfig: `{0}`")]
    UnableToSetupClientKubeconfig(#[from] KubeconfigError),

    #[error("missing metadata.name for kind: `{0}`")]
    MissingName(String),

    #[error("missing metadata.namespace for kind: `{0}`")]
    MissingNamespace(String),

    #[error("missing type metadata for object: `{0}`")]
    MissingTypeMeta(String),

    #[error("invalid group version: `{0}`")]
    ParseGroupVersion(#[from] ParseGroupVersionError),

    #[error("could not parse dynamic object as `{1}`: `{0}`")]
    ParseDynamic(String, String),

    #[error("error serializing/deserializing yaml: `{0}`")]
    SerdeYaml(#[from] serde_yaml::Error),

    #[error("the tokio runtime could not be started: `{0}`")]
    Runtime(#[from] std::io::Error),
}

impl K8sError {
    /// True only for a definite NotFound from the API server. Permission,
    /// connectivity and server failures are a different outcome and must not be
    /// folded into "absent".
    pub fn is_not_found(&self) -> bool {
        matches!(self, K8sError::Generic(kube::Error::Api(response)) if response.code == 404)
    }
}
