//! ClusterStore trait for mocking
//!
//! This trait abstracts cluster API access to enable mocking in unit
//! tests. The concrete `KubeStore` implements it against the live API
//! server; tests use the in-memory mock.

use std::collections::BTreeMap;

use crds::PodSet;
use k8s_openapi::api::core::v1::Pod;

use crate::error::StoreError;

/// Trait for the cluster API operations the reconcile loop uses.
///
/// This is deliberately the whole API surface of the controller: get
/// and status-update for `PodSet`, list/create/delete for `Pod`.
/// All async methods must be `Send` to work with Tokio's
/// work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterStore: Send + Sync {
    /// Fetch a PodSet by namespace and name.
    async fn get_pod_set(&self, namespace: &str, name: &str) -> Result<PodSet, StoreError>;

    /// Write a PodSet's status through the status subresource.
    ///
    /// The write is conditioned on the object's resource version, so a
    /// concurrent modification surfaces as [`StoreError::Conflict`].
    async fn update_pod_set_status(&self, pod_set: &PodSet) -> Result<PodSet, StoreError>;

    /// List pods in a namespace matching every label in `labels`.
    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>, StoreError>;

    /// Create a pod, honoring `metadata.generateName` by assigning a
    /// unique name suffix.
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, StoreError>;

    /// Delete a pod by name. Returns [`StoreError::NotFound`] if it is
    /// already gone.
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
}
