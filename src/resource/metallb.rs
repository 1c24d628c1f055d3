//! Handles for the MetalLB custom resources exercised by the load-balancer
//! suites.

use super::handle::{Existence, HandleError, ResourceHandle};
use super::validation;
#[cfg_attr(test, mockall_double::double)]
use crate::k8s::client::SyncK8sClient;
use crate::k8s::error::K8sError;
use kube::api::TypeMeta;
use serde_json::json;
use std::sync::Arc;

pub fn address_pool_type_meta() -> TypeMeta {
    TypeMeta {
        api_version: "metallb.io/v1beta1".to_string(),
        kind: "IPAddressPool".to_string(),
    }
}

pub fn bgp_advertisement_type_meta() -> TypeMeta {
    TypeMeta {
        api_version: "metallb.io/v1beta1".to_string(),
        kind: "BGPAdvertisement".to_string(),
    }
}

/// Handle for a `metallb.io/v1beta1 IPAddressPool`.
pub struct AddressPoolHandle {
    inner: ResourceHandle,
}

impl AddressPoolHandle {
    pub fn new(client: Arc<SyncK8sClient>, name: &str, namespace: &str) -> Self {
        Self {
            inner: ResourceHandle::new(
                client,
                address_pool_type_meta(),
                name,
                namespace,
                json!({"spec": {}}),
            ),
        }
    }

    /// Sets the address ranges the pool hands out. An empty list is rejected.
    pub fn with_addresses(mut self, addresses: Vec<String>) -> Self {
        let precondition = validation::non_empty_list("addresses", &addresses);
        self.inner = self.inner.with_validated(precondition, |definition| {
            definition.data["spec"]["addresses"] = json!(addresses);
        });
        self
    }

    pub fn with_auto_assign(mut self, auto_assign: bool) -> Self {
        self.inner = self.inner.with_validated(Ok(()), |definition| {
            definition.data["spec"]["autoAssign"] = json!(auto_assign);
        });
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

/// Handle for a `metallb.io/v1beta1 BGPAdvertisement`.
pub struct BgpAdvertisementHandle {
    inner: ResourceHandle,
}

impl BgpAdvertisementHandle {
    pub fn new(client: Arc<SyncK8sClient>, name: &str, namespace: &str) -> Self {
        Self {
            inner: ResourceHandle::new(
                client,
                bgp_advertisement_type_meta(),
                name,
                namespace,
                json!({"spec": {}}),
            ),
        }
    }

    /// Restricts the advertisement to the given pools. An empty list is rejected.
    pub fn with_ip_address_pools(mut self, pools: Vec<String>) -> Self {
        let precondition = validation::non_empty_list("ipAddressPools", &pools);
        self.inner = self.inner.with_validated(precondition, |definition| {
            definition.data["spec"]["ipAddressPools"] = json!(pools);
        });
        self
    }

    /// Sets the prefix aggregation length. Valid values are `[0, 32]`.
    pub fn with_aggregation_length(mut self, length: i64) -> Self {
        let precondition = validation::in_range("aggregationLength", length, 0, 32);
        self.inner = self.inner.with_validated(precondition, |definition| {
            definition.data["spec"]["aggregationLength"] = json!(length);
        });
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

    pub fn exists(&mut self) -> Result<bool, K8sError> {
        self.inner.exists()
    }

    pub fn handle(&self) -> &ResourceHandle {
        &self.inner
    }
}
