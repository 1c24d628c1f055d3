use super::error::K8sError;
use super::utils::{get_name, get_namespace, get_type_meta};
use duration_str::deserialize_duration;
use either::Either;
use k8s_openapi::api::core::v1::{Namespace, Node};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::client::Status;
use kube::{
    Api, Client, Config,
    api::{DeleteParams, ListParams, PostParams},
    config::KubeConfigOptions,
    core::{ApiResource, DynamicObject, GroupVersion, TypeMeta},
};
use serde::Deserialize;
use std::fmt::{Debug, Formatter};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::debug;

/// Same as the upstream kube-rs default client timeout (read/write). This timeout is used
/// internally by the stream that handles the request/responses to the API, but the API call
/// doesn't have a timeout itself.
const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(295);

fn default_client_timeout() -> Duration {
    DEFAULT_CLIENT_TIMEOUT
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ClientConfig {
    /// The maximum duration the client will wait for a response from the API server before
    /// timing out.
    #[serde(
        default = "default_client_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub client_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_timeout: DEFAULT_CLIENT_TIMEOUT,
        }
    }
}

/// Provides a _sync_ facade over [AsyncK8sClient].
///
/// Each method calls `runtime.block_on(self.async_client.future)`, so every operation is a
/// single blocking network call on the caller's thread. This keeps lifecycle code
/// synchronous while the actual k8s requests go through [kube].
pub struct SyncK8sClient {
    async_client: AsyncK8sClient,
    runtime: Arc<Runtime>,
}

impl Debug for SyncK8sClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncK8sClient")
            .field("async_client", &"AsyncK8sClient implementation")
            .field("runtime", &self.runtime)
            .finish()
    }
}

#[cfg_attr(test, mockall::automock)]
impl SyncK8sClient {
    pub fn try_new(runtime: Arc<Runtime>, config: &ClientConfig) -> Result<Self, K8sError> {
        Ok(Self {
            async_client: runtime.block_on(AsyncK8sClient::try_new(config))?,
            runtime,
        })
    }

    /// Builds a multi-thread runtime and a client on top of it.
    pub fn try_default(config: &ClientConfig) -> Result<Self, K8sError> {
        let runtime = Arc::new(
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?,
        );
        Self::try_new(runtime, config)
    }

    pub fn get_dynamic_object(
        &self,
        tm: &TypeMeta,
        name: &str,
        namespace: &str,
    ) -> Result<Option<DynamicObject>, K8sError> {
        self.runtime
            .block_on(self.async_client.get_dynamic_object(tm, name, namespace))
    }

    pub fn create_dynamic_object(&self, obj: &DynamicObject) -> Result<DynamicObject, K8sError> {
        self.runtime
            .block_on(self.async_client.create_dynamic_object(obj))
    }

    pub fn replace_dynamic_object(&self, obj: &DynamicObject) -> Result<DynamicObject, K8sError> {
        self.runtime
            .block_on(self.async_client.replace_dynamic_object(obj))
    }

    pub fn delete_dynamic_object(
        &self,
        tm: &TypeMeta,
        name: &str,
        namespace: &str,
    ) -> Result<Either<DynamicObject, Status>, K8sError> {
        self.runtime
            .block_on(self.async_client.delete_dynamic_object(tm, name, namespace))
    }

    pub fn list_dynamic_objects(
        &self,
        tm: &TypeMeta,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>, K8sError> {
        self.runtime.block_on(
            self.async_client
                .list_dynamic_objects(tm, namespace, label_selector),
        )
    }

    pub fn list_nodes(&self, label_selector: &str) -> Result<Vec<Node>, K8sError> {
        self.runtime
            .block_on(self.async_client.list_nodes(label_selector))
    }

    pub fn create_test_namespace(&self, prefix: &str) -> Result<String, K8sError> {
        self.runtime
            .block_on(self.async_client.create_test_namespace(prefix))
    }

    pub fn delete_namespace(&self, name: &str) -> Result<(), K8sError> {
        self.runtime
            .block_on(self.async_client.delete_namespace(name))
    }
}

pub struct AsyncK8sClient {
    client: Client,
}

impl AsyncK8sClient {
    /// Constructs a new Kubernetes client.
    ///
    /// If loading from the inCluster config fails we fall back to kube-config.
    /// This will respect the `$KUBECONFIG` envvar, but otherwise default to `~/.kube/config`.
    /// Not leveraging infer() to check inClusterConfig first.
    pub async fn try_new(client_config: &ClientConfig) -> Result<Self, K8sError> {
        debug!("trying inClusterConfig for k8s client");

        let mut config = match Config::incluster() {
            Ok(c) => c,
            Err(e) => {
                debug!("inClusterConfig {}, trying kubeconfig for k8s client", e);
                let c = KubeConfigOptions::default();
                Config::from_kubeconfig(&c).await?
            }
        };
        config.read_timeout = Some(client_config.client_timeout);
        config.write_timeout = Some(client_config.client_timeout);

        let client = Client::try_from(config)?;

        debug!("k8s client initialization succeeded");
        Ok(Self { client })
    }

    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn dynamic_api(&self, tm: &TypeMeta, namespace: &str) -> Result<Api<DynamicObject>, K8sError> {
        let gvk = GroupVersion::from_str(&tm.api_version)?.with_kind(&tm.kind);
        let ar = ApiResource::from_gvk(&gvk);
        Ok(Api::namespaced_with(self.client.clone(), namespace, &ar))
    }

    /// Fetches one object by identity. A definite NotFound is `Ok(None)`; any other
    /// failure surfaces as an error.
    pub async fn get_dynamic_object(
        &self,
        tm: &TypeMeta,
        name: &str,
        namespace: &str,
    ) -> Result<Option<DynamicObject>, K8sError> {
        let api = self.dynamic_api(tm, namespace)?;
        Ok(api.get_opt(name).await?)
    }

    pub async fn create_dynamic_object(
        &self,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, K8sError> {
        let tm = get_type_meta(obj)?;
        let namespace = get_namespace(obj)?;
        debug!("creating {}/{}", tm.kind, get_name(obj)?);

        let api = self.dynamic_api(&tm, &namespace)?;
        Ok(api.create(&PostParams::default(), obj).await?)
    }

    pub async fn replace_dynamic_object(
        &self,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, K8sError> {
        let tm = get_type_meta(obj)?;
        let namespace = get_namespace(obj)?;
        let name = get_name(obj)?;
        debug!("replacing {}/{}", tm.kind, name);

        let api = self.dynamic_api(&tm, &namespace)?;
        Ok(api.replace(&name, &PostParams::default(), obj).await?)
    }

    pub async fn delete_dynamic_object(
        &self,
        tm: &TypeMeta,
        name: &str,
        namespace: &str,
    ) -> Result<Either<DynamicObject, Status>, K8sError> {
        debug!("deleting {}/{}", tm.kind, name);

        let api = self.dynamic_api(tm, namespace)?;
        Ok(api.delete(name, &DeleteParams::default()).await?)
    }

    pub async fn list_dynamic_objects(
        &self,
        tm: &TypeMeta,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>, K8sError> {
        let api = self.dynamic_api(tm, namespace)?;
        Ok(api.list(&list_params(label_selector)).await?.items)
    }

    pub async fn list_nodes(&self, label_selector: &str) -> Result<Vec<Node>, K8sError> {
        let api: Api<Node> = Api::all(self.client.clone());
        Ok(api.list(&list_params(label_selector)).await?.items)
    }

    /// Creates a namespace with a generated name, returning it.
    pub async fn create_test_namespace(&self, prefix: &str) -> Result<String, K8sError> {
        let api: Api<Namespace> = Api::all(self.client.clone());

        let namespace = Namespace {
            metadata: ObjectMeta {
                generate_name: Some(prefix.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let created = api.create(&PostParams::default(), &namespace).await?;

        created
            .metadata
            .name
            .ok_or_else(|| K8sError::MissingName("Namespace".to_string()))
    }

    pub async fn delete_namespace(&self, name: &str) -> Result<(), K8sError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }
}

fn list_params(label_selector: &str) -> ListParams {
    ListParams {
        label_selector: (!label_selector.is_empty()).then(|| label_selector.to_string()),
        ..Default::default()
    }
}
