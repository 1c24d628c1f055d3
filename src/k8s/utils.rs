use super::error::K8sError;
use kube::api::TypeMeta;
use kube::core::DynamicObject;

fn kind_of(obj: &DynamicObject) -> String {
    obj.types
        .as_ref()
        .map(|tm| tm.kind.clone())
        .unwrap_or_default()
}

/// Returns the `metadata.name` of a dynamic object, failing when absent.
pub fn get_name(obj: &DynamicObject) -> Result<String, K8sError> {
    obj.metadata
        .name
        .clone()
        .ok_or_else(|| K8sError::MissingName(kind_of(obj)))
}

/// Returns the `metadata.namespace` of a dynamic object, failing when absent.
pub fn get_namespace(obj: &DynamicObject) -> Result<String, K8sError> {
    obj.metadata
        .namespace
        .clone()
        .ok_or_else(|| K8sError::MissingNamespace(kind_of(obj)))
}

/// Returns the type metadata of a dynamic object, failing when absent.
pub fn get_type_meta(obj: &DynamicObject) -> Result<TypeMeta, K8sError> {
    obj.types
        .clone()
        .ok_or_else(|| K8sError::MissingTypeMeta(obj.metadata.name.clone().unwrap_or_default()))
}

/// Reads `.status.phase` from the raw object payload, if present.
pub fn get_phase(obj: &DynamicObject) -> Option<String> {
    obj.data
        .get("status")?
        .get("phase")?
        .as_str()
        .map(str::to_string)
}
