use super::validation::{self, ValidationError};
#[cfg_attr(test, mockall_double::double)]
use crate::k8s::client::SyncK8sClient;
use crate::k8s::error::K8sError;
use crate::k8s::labels::Labels;
use crate::k8s::utils::{get_name, get_namespace, get_type_meta};
use crate::wait::resources::ConvergenceError;
use crate::wait::{self, PollError, WaitConfig};
use kube::core::{DynamicObject, ObjectMeta, TypeMeta};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Three-valued outcome of probing the remote store for a handle's identity.
///
/// A definite NotFound is the only thing reported as [Existence::Absent]; any other
/// failure surfaces as [Existence::Unknown] so each caller decides the policy instead
/// of having "error means it exists" baked into the probe.
#[derive(Debug)]
pub enum Existence {
    Exists,
    Absent,
    Unknown(K8sError),
}

#[derive(thiserror::Error, Debug)]
pub enum HandleError {
    #[error("invalid resource definition: {0}")]
    Validation(#[from] ValidationError),

    #[error("{kind} `{namespace}/{name}` does not exist")]
    DoesNotExist {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error(transparent)]
    K8s(#[from] K8sError),

    /// The force-update fallback deleted the resource but could not recreate it,
    /// leaving the cluster without it. Distinguished from an ordinary update
    /// failure so callers can detect the intermediate state and recover.
    #[error("resource was deleted but could not be recreated: {source}")]
    RecreateFailed {
        #[source]
        source: Box<HandleError>,
    },
}

/// Declarative handle for one named, namespaced resource.
///
/// The definition holds the desired state and only changes through `with_*` calls;
/// the object caches whatever the cluster last returned for the same identity and
/// follows every lifecycle call. The identity is fixed at construction time.
///
/// Configuration calls chain fluently. The first precondition failure is recorded
/// and every later call becomes a no-op, so a whole chain can be written without
/// per-call error checking and the failure surfaces on `create`/`update`.
pub struct ResourceHandle {
    client: Arc<SyncK8sClient>,
    definition: DynamicObject,
    object: Option<DynamicObject>,
    validation_error: Option<ValidationError>,
}

impl ResourceHandle {
    pub fn new(
        client: Arc<SyncK8sClient>,
        types: TypeMeta,
        name: &str,
        namespace: &str,
        data: Value,
    ) -> Self {
        let definition = DynamicObject {
            types: Some(types),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(Labels::default().get()),
                ..Default::default()
            },
            data,
        };

        Self {
            client,
            definition,
            object: None,
            validation_error: None,
        }
        .require(validation::non_empty_str("name", name))
        .require(validation::non_empty_str("namespace", namespace))
    }

    /// Builds a handle from a full manifest. The manifest must carry
    /// `apiVersion`/`kind` and a namespaced identity.
    pub fn from_yaml(client: Arc<SyncK8sClient>, manifest: &str) -> Result<Self, K8sError> {
        let mut definition: DynamicObject = serde_yaml::from_str(manifest)?;
        get_type_meta(&definition)?;
        let name = get_name(&definition)?;
        let namespace = get_namespace(&definition)?;

        definition
            .metadata
            .labels
            .get_or_insert_with(Default::default)
            .extend(Labels::default().get());

        let handle = Self {
            client,
            definition,
            object: None,
            validation_error: None,
        }
        .require(validation::non_empty_str("name", &name))
        .require(validation::non_empty_str("namespace", &namespace));

        Ok(handle)
    }

    pub fn name(&self) -> &str {
        self.definition.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.definition
            .metadata
            .namespace
            .as_deref()
            .unwrap_or_default()
    }

    pub fn kind(&self) -> &str {
        self.definition
            .types
            .as_ref()
            .map(|tm| tm.kind.as_str())
            .unwrap_or_default()
    }

    /// The desired state, as configured locally.
    pub fn definition(&self) -> &DynamicObject {
        &self.definition
    }

    /// The last state the cluster returned for this identity, if any.
    pub fn object(&self) -> Option<&DynamicObject> {
        self.object.as_ref()
    }

    pub fn validation_error(&self) -> Option<&ValidationError> {
        self.validation_error.as_ref()
    }

    /// Records the first validation failure. Later failures never overwrite it.
    /// Returns whether the definition may be mutated by the current call.
    fn check(&mut self, result: Result<(), ValidationError>) -> bool {
        match result {
            Ok(()) => self.validation_error.is_none(),
            Err(err) => {
                if self.validation_error.is_none() {
                    self.validation_error = Some(err);
                }
                false
            }
        }
    }

    /// Pushes a precondition through the validation gate without touching the
    /// definition. Used by kind-specific wrappers.
    pub fn require(mut self, precondition: Result<(), ValidationError>) -> Self {
        self.check(precondition);
        self
    }

    /// Runs `apply` against the definition only when `precondition` passes the
    /// validation gate. Used by kind-specific wrappers for their own fields.
    pub fn with_validated(
        mut self,
        precondition: Result<(), ValidationError>,
        apply: impl FnOnce(&mut DynamicObject),
    ) -> Self {
        if self.check(precondition) {
            apply(&mut self.definition);
        }
        self
    }

    /// Merges labels into the definition. An empty set is rejected.
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        if self.check(validation::non_empty_map("labels", &labels)) {
            self.definition
                .metadata
                .labels
                .get_or_insert_with(Default::default)
                .extend(labels);
        }
        self
    }

    /// Merges annotations into the definition. An empty set is rejected.
    pub fn with_annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        if self.check(validation::non_empty_map("annotations", &annotations)) {
            self.definition
                .metadata
                .annotations
                .get_or_insert_with(Default::default)
                .extend(annotations);
        }
        self
    }

    /// Replaces a top-level field of the definition payload (e.g. `spec`, `data`).
    /// A null value is rejected.
    pub fn with_field(mut self, field: &str, value: Value) -> Self {
        let precondition = if value.is_null() {
            Err(ValidationError::new(format!("'{field}' cannot be empty")))
        } else {
            Ok(())
        };
        if self.check(precondition) {
            self.definition.data[field] = value;
        }
        self
    }

    fn gate(&self) -> Result<(), HandleError> {
        match &self.validation_error {
            Some(err) => Err(HandleError::Validation(err.clone())),
            None => Ok(()),
        }
    }

    /// Fetches the current remote state and stores it as the observed object.
    /// The cache follows what the store last returned: a definite NotFound clears
    /// it, and so does an unclassified failure.
    pub fn refresh(&mut self) -> Existence {
        let types = match get_type_meta(&self.definition) {
            Ok(tm) => tm,
            Err(err) => return Existence::Unknown(err),
        };

        match self
            .client
            .get_dynamic_object(&types, self.name(), self.namespace())
        {
            Ok(Some(object)) => {
                self.object = Some(object);
                Existence::Exists
            }
            Ok(None) => {
                self.object = None;
                Existence::Absent
            }
            Err(err) => {
                self.object = None;
                Existence::Unknown(err)
            }
        }
    }

    /// Explicit existence query: NotFound is `Ok(false)`; any other remote failure
    /// is handed back to the caller instead of being folded into "exists".
    pub fn exists(&mut self) -> Result<bool, K8sError> {
        match self.refresh() {
            Existence::Exists => Ok(true),
            Existence::Absent => Ok(false),
            Existence::Unknown(err) => Err(err),
        }
    }

    /// Creates the resource remotely unless it is already there. Re-running
    /// `create` against an existing resource is not an error: the observed object
    /// is refreshed and the definition is left unapplied.
    pub fn create(&mut self) -> Result<(), HandleError> {
        self.gate()?;

        match self.refresh() {
            Existence::Exists => {
                debug!(
                    "{} `{}/{}` already exists",
                    self.kind(),
                    self.namespace(),
                    self.name()
                );
                Ok(())
            }
            Existence::Absent => {
                let created = self.client.create_dynamic_object(&self.definition)?;
                self.object = Some(created);
                Ok(())
            }
            Existence::Unknown(err) => Err(err.into()),
        }
    }

    /// Applies the definition on top of the observed object and replaces it
    /// remotely. With `force`, a failed replace falls back to delete+recreate.
    pub fn update(&mut self, force: bool) -> Result<(), HandleError> {
        self.gate()?;

        match self.refresh() {
            Existence::Exists => {}
            Existence::Absent => {
                return Err(HandleError::DoesNotExist {
                    kind: self.kind().to_string(),
                    namespace: self.namespace().to_string(),
                    name: self.name().to_string(),
                });
            }
            Existence::Unknown(err) => return Err(err.into()),
        }

        // Carry the definition onto the observed identity so the API accepts the
        // replace against the current revision.
        let mut desired = self.definition.clone();
        if let Some(current) = &self.object {
            desired.metadata.resource_version = current.metadata.resource_version.clone();
            desired.metadata.uid = current.metadata.uid.clone();
        }

        match self.client.replace_dynamic_object(&desired) {
            Ok(replaced) => {
                self.object = Some(replaced);
                Ok(())
            }
            Err(err) if force => {
                debug!(
                    "in-place update of {} `{}/{}` failed ({err}), replacing",
                    self.kind(),
                    self.namespace(),
                    self.name()
                );
                self.replace_on_conflict()
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Destructive two-step replace: delete, then create from the same definition.
    /// Not atomic; between the steps the resource is absent from the cluster. A
    /// delete failure aborts without attempting the create.
    fn replace_on_conflict(&mut self) -> Result<(), HandleError> {
        self.delete()?;
        self.create().map_err(|err| HandleError::RecreateFailed {
            source: Box::new(err),
        })
    }

    /// Deletes the resource remotely. Deleting something that is already gone is
    /// a no-op.
    pub fn delete(&mut self) -> Result<(), HandleError> {
        match self.refresh() {
            Existence::Absent => Ok(()),
            Existence::Unknown(err) => Err(err.into()),
            Existence::Exists => {
                let types = get_type_meta(&self.definition)?;
                self.client
                    .delete_dynamic_object(&types, self.name(), self.namespace())?;
                self.object = None;
                Ok(())
            }
        }
    }

    /// Blocks until the remote object reports `.status.phase` equal to `phase`.
    pub fn wait_until_phase(
        &mut self,
        phase: &str,
        config: &WaitConfig,
    ) -> Result<(), PollError<ConvergenceError>> {
        wait::resources::wait_for_phase(self, phase, config)
    }

    /// Blocks until the remote object is gone.
    pub fn wait_until_gone(
        &mut self,
        config: &WaitConfig,
    ) -> Result<(), PollError<ConvergenceError>> {
        wait::resources::wait_for_absence(self, config)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::k8s::client::MockSyncK8sClient;
    use crate::k8s::labels::{MANAGED_BY_KEY, MANAGED_BY_VAL};
    use assert_matches::assert_matches;
    use either::Either;
    use kube::core::ErrorResponse;
    use mockall::Sequence;
    use serde_json::json;

    pub(crate) fn foo_type_meta() -> TypeMeta {
        TypeMeta {
            api_version: "testkit.io/v1".to_string(),
            kind: "Foo".to_string(),
        }
    }

    pub(crate) fn remote_foo(name: &str, namespace: &str, resource_version: &str) -> DynamicObject {
        DynamicObject {
            types: Some(foo_type_meta()),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                resource_version: Some(resource_version.to_string()),
                uid: Some("remote-uid".to_string()),
                ..Default::default()
            },
            data: json!({"spec": {"data": "remote"}}),
        }
    }

    pub(crate) fn api_error(code: u16, reason: &str) -> K8sError {
        K8sError::Generic(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{reason} error"),
            reason: reason.to_string(),
            code,
        }))
    }

    fn test_handle(client: MockSyncK8sClient) -> ResourceHandle {
        ResourceHandle::new(
            Arc::new(client),
            foo_type_meta(),
            "test-foo",
            "default",
            json!({"spec": {"data": "local"}}),
        )
    }

    #[test]
    fn new_with_empty_name_sets_sticky_validation_error() {
        // A mock with no expectations panics on any call: constructing and then
        // creating must not reach the cluster.
        let mut handle = ResourceHandle::new(
            Arc::new(MockSyncK8sClient::new()),
            foo_type_meta(),
            "",
            "default",
            json!({}),
        );

        assert_eq!(
            handle.validation_error().unwrap().to_string(),
            "'name' cannot be empty"
        );
        assert_matches!(
            handle.create().unwrap_err(),
            HandleError::Validation(err) => assert_eq!(err.to_string(), "'name' cannot be empty")
        );
        assert_matches!(handle.update(true).unwrap_err(), HandleError::Validation(_));
    }

    #[test]
    fn first_validation_failure_wins_and_blocks_later_mutation() {
        let handle = test_handle(MockSyncK8sClient::new())
            .with_labels(BTreeMap::new())
            .with_field("spec", json!({"data": "changed"}))
            .with_annotations(BTreeMap::new());

        assert_eq!(
            handle.validation_error().unwrap().to_string(),
            "'labels' cannot be empty"
        );
        // The definition kept the state it had when the gate closed.
        assert_eq!(handle.definition().data["spec"]["data"], json!("local"));
        assert!(handle.definition().metadata.annotations.is_none());
    }

    #[test]
    fn definitions_are_stamped_with_managed_by_labels() {
        let handle = test_handle(MockSyncK8sClient::new());

        let labels = handle.definition().metadata.labels.clone().unwrap();
        assert_eq!(labels.get(MANAGED_BY_KEY).unwrap(), MANAGED_BY_VAL);
    }

    #[test]
    fn with_labels_merges_on_top_of_the_stamp() {
        let handle = test_handle(MockSyncK8sClient::new())
            .with_labels(BTreeMap::from([("app".to_string(), "frr".to_string())]));

        let labels = handle.definition().metadata.labels.clone().unwrap();
        assert_eq!(labels.get("app").unwrap(), "frr");
        assert_eq!(labels.get(MANAGED_BY_KEY).unwrap(), MANAGED_BY_VAL);
    }

    #[test]
    fn create_posts_definition_when_absent() {
        let mut client = MockSyncK8sClient::new();
        client
            .expect_get_dynamic_object()
            .once()
            .returning(|_, _, _| Ok(None));
        client
            .expect_create_dynamic_object()
            .once()
            .withf(|obj| obj.metadata.name.as_deref() == Some("test-foo"))
            .returning(|_| Ok(remote_foo("test-foo", "default", "1")));

        let mut handle = test_handle(client);
        handle.create().unwrap();

        assert_eq!(
            handle.object().unwrap().metadata.resource_version.as_deref(),
            Some("1")
        );
    }

    #[test]
    fn create_is_idempotent_when_already_present() {
        let mut client = MockSyncK8sClient::new();
        client
            .expect_get_dynamic_object()
            .times(2)
            .returning(|_, _, _| Ok(Some(remote_foo("test-foo", "default", "7"))));
        // No create expectation: reaching the API with a POST would panic.

        let mut handle = test_handle(client);
        handle.create().unwrap();
        handle.create().unwrap();

        // The observed object is whatever the probe last fetched.
        assert_eq!(handle.object().unwrap().data["spec"]["data"], json!("remote"));
    }

    #[test]
    fn create_fails_closed_on_unclassified_probe_errors() {
        let mut client = MockSyncK8sClient::new();
        client
            .expect_get_dynamic_object()
            .once()
            .returning(|_, _, _| Err(api_error(403, "Forbidden")));

        let mut handle = test_handle(client);

        assert_matches!(handle.create().unwrap_err(), HandleError::K8s(err) => {
            assert!(!err.is_not_found());
        });
        assert!(handle.object().is_none());
    }

    #[test]
    fn delete_of_absent_resource_is_a_no_op() {
        let mut client = MockSyncK8sClient::new();
        client
            .expect_get_dynamic_object()
            .once()
            .returning(|_, _, _| Ok(None));

        let mut handle = test_handle(client);
        handle.delete().unwrap();
        assert!(handle.object().is_none());
    }

    #[test]
    fn delete_clears_the_observed_object() {
        let mut client = MockSyncK8sClient::new();
        client
            .expect_get_dynamic_object()
            .once()
            .returning(|_, _, _| Ok(Some(remote_foo("test-foo", "default", "7"))));
        client
            .expect_delete_dynamic_object()
            .once()
            .withf(|_, name, namespace| name == "test-foo" && namespace == "default")
            .returning(|_, name, namespace| Ok(Either::Left(remote_foo(name, namespace, "7"))));

        let mut handle = test_handle(client);
        handle.delete().unwrap();
        assert!(handle.object().is_none());
    }

    #[test]
    fn update_requires_remote_existence() {
        let mut client = MockSyncK8sClient::new();
        client
            .expect_get_dynamic_object()
            .once()
            .returning(|_, _, _| Ok(None));

        let mut handle = test_handle(client);

        assert_matches!(
            handle.update(false).unwrap_err(),
            HandleError::DoesNotExist { kind, namespace, name } => {
                assert_eq!(kind, "Foo");
                assert_eq!(namespace, "default");
                assert_eq!(name, "test-foo");
            }
        );
    }

    #[test]
    fn update_carries_definition_onto_observed_revision() {
        let mut client = MockSyncK8sClient::new();
        client
            .expect_get_dynamic_object()
            .once()
            .returning(|_, _, _| Ok(Some(remote_foo("test-foo", "default", "42"))));
        client
            .expect_replace_dynamic_object()
            .once()
            .withf(|obj| {
                obj.metadata.resource_version.as_deref() == Some("42")
                    && obj.data["spec"]["data"] == json!("local")
            })
            .returning(|_| Ok(remote_foo("test-foo", "default", "43")));

        let mut handle = test_handle(client);
        handle.update(false).unwrap();

        assert_eq!(
            handle.object().unwrap().metadata.resource_version.as_deref(),
            Some("43")
        );
    }

    #[test]
    fn update_without_force_propagates_the_failure() {
        let mut client = MockSyncK8sClient::new();
        client
            .expect_get_dynamic_object()
            .once()
            .returning(|_, _, _| Ok(Some(remote_foo("test-foo", "default", "42"))));
        client
            .expect_replace_dynamic_object()
            .once()
            .returning(|_| Err(api_error(409, "Conflict")));

        let mut handle = test_handle(client);
        assert_matches!(handle.update(false).unwrap_err(), HandleError::K8s(_));
    }

    #[test]
    fn forced_update_falls_back_to_exactly_one_delete_then_one_create() {
        let mut client = MockSyncK8sClient::new();
        let mut seq = Sequence::new();

        // update: probe finds the resource, replace fails.
        client
            .expect_get_dynamic_object()
            .once()
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(Some(remote_foo("test-foo", "default", "42"))));
        client
            .expect_replace_dynamic_object()
            .once()
            .in_sequence(&mut seq)
            .returning(|_| Err(api_error(409, "Conflict")));
        // fallback delete: probe, then exactly one delete.
        client
            .expect_get_dynamic_object()
            .once()
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(Some(remote_foo("test-foo", "default", "42"))));
        client
            .expect_delete_dynamic_object()
            .once()
            .in_sequence(&mut seq)
            .returning(|_, name, namespace| Ok(Either::Left(remote_foo(name, namespace, "42"))));
        // fallback create: probe reports the gap, then exactly one create.
        client
            .expect_get_dynamic_object()
            .once()
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(None));
        client
            .expect_create_dynamic_object()
            .once()
            .in_sequence(&mut seq)
            .returning(|_| Ok(remote_foo("test-foo", "default", "50")));

        let mut handle = test_handle(client);
        handle.update(true).unwrap();

        assert_eq!(
            handle.object().unwrap().metadata.resource_version.as_deref(),
            Some("50")
        );
    }

    #[test]
    fn forced_update_reports_the_recreate_gap() {
        let mut client = MockSyncK8sClient::new();
        let mut seq = Sequence::new();

        client
            .expect_get_dynamic_object()
            .once()
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(Some(remote_foo("test-foo", "default", "42"))));
        client
            .expect_replace_dynamic_object()
            .once()
            .in_sequence(&mut seq)
            .returning(|_| Err(api_error(409, "Conflict")));
        client
            .expect_get_dynamic_object()
            .once()
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(Some(remote_foo("test-foo", "default", "42"))));
        client
            .expect_delete_dynamic_object()
            .once()
            .in_sequence(&mut seq)
            .returning(|_, name, namespace| Ok(Either::Left(remote_foo(name, namespace, "42"))));
        client
            .expect_get_dynamic_object()
            .once()
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(None));
        client
            .expect_create_dynamic_object()
            .once()
            .in_sequence(&mut seq)
            .returning(|_| Err(api_error(500, "InternalError")));

        let mut handle = test_handle(client);

        assert_matches!(
            handle.update(true).unwrap_err(),
            HandleError::RecreateFailed { source } => {
                assert_matches!(*source, HandleError::K8s(_));
            }
        );
        // The deleted-but-not-recreated state is visible to the caller.
        assert!(handle.object().is_none());
    }

    #[test]
    fn exists_reports_remote_errors_instead_of_guessing() {
        let mut client = MockSyncK8sClient::new();
        client
            .expect_get_dynamic_object()
            .once()
            .returning(|_, _, _| Ok(Some(remote_foo("test-foo", "default", "1"))));
        client
            .expect_get_dynamic_object()
            .once()
            .returning(|_, _, _| Ok(None));
        client
            .expect_get_dynamic_object()
            .once()
            .returning(|_, _, _| Err(api_error(500, "InternalError")));

        let mut handle = test_handle(client);
        assert!(handle.exists().unwrap());
        assert!(!handle.exists().unwrap());
        assert!(handle.exists().is_err());
    }

    #[test]
    fn from_yaml_builds_the_definition_and_stamps_labels() {
        let manifest = r#"
apiVersion: testkit.io/v1
kind: Foo
metadata:
  name: manifest-foo
  namespace: metallb-tests
  labels:
    app: frr
spec:
  data: from-manifest
"#;
        let handle =
            ResourceHandle::from_yaml(Arc::new(MockSyncK8sClient::new()), manifest).unwrap();

        assert_eq!(handle.name(), "manifest-foo");
        assert_eq!(handle.namespace(), "metallb-tests");
        assert!(handle.validation_error().is_none());
        let labels = handle.definition().metadata.labels.clone().unwrap();
        assert_eq!(labels.get("app").unwrap(), "frr");
        assert_eq!(labels.get(MANAGED_BY_KEY).unwrap(), MANAGED_BY_VAL);
        assert_eq!(handle.definition().data["spec"]["data"], json!("from-manifest"));
    }

    #[test]
    fn from_yaml_without_identity_is_rejected() {
        let manifest = r#"
apiVersion: testkit.io/v1
kind: Foo
metadata:
  name: no-namespace
"#;
        assert_matches!(
            ResourceHandle::from_yaml(Arc::new(MockSyncK8sClient::new()), manifest).unwrap_err(),
            K8sError::MissingNamespace(_)
        );
    }
}
