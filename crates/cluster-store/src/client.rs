//! Kubernetes-backed store implementation.
//!
//! Thin mapping from the [`ClusterStore`] trait onto `kube::Api`
//! calls. Every method is a single blocking round trip; retries,
//! backoff and cancellation are the caller's concern.

use std::collections::BTreeMap;

use crds::PodSet;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;
use tracing::debug;

use crate::error::StoreError;
use crate::store_trait::ClusterStore;

/// Cluster store backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    /// Creates a store from an existing Kubernetes client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn pod_sets(&self, namespace: &str) -> Api<PodSet> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Maps a raw kube error into the store taxonomy: 404 becomes
/// `NotFound`, 409 becomes `Conflict`, everything else passes through.
fn map_kube_error(kind: &str, name: &str, err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => StoreError::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(ae) if ae.code == 409 => {
            StoreError::Conflict(format!("{kind} {name}: {}", ae.message))
        }
        other => StoreError::Kube(other),
    }
}

/// Joins a label map into a Kubernetes label selector string.
fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait::async_trait]
impl ClusterStore for KubeStore {
    async fn get_pod_set(&self, namespace: &str, name: &str) -> Result<PodSet, StoreError> {
        self.pod_sets(namespace)
            .get(name)
            .await
            .map_err(|e| map_kube_error("PodSet", name, e))
    }

    async fn update_pod_set_status(&self, pod_set: &PodSet) -> Result<PodSet, StoreError> {
        let name = pod_set
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| StoreError::NotFound {
                kind: "PodSet".to_string(),
                name: "<unnamed>".to_string(),
            })?;
        let namespace = pod_set.metadata.namespace.as_deref().unwrap_or("default");

        debug!("Updating PodSet {}/{} status", namespace, name);
        let data = serde_json::to_vec(pod_set)?;
        self.pod_sets(namespace)
            .replace_status(name, &PostParams::default(), data)
            .await
            .map_err(|e| map_kube_error("PodSet", name, e))
    }

    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>, StoreError> {
        let lp = ListParams::default().labels(&label_selector(labels));
        let list = self
            .pods(namespace)
            .list(&lp)
            .await
            .map_err(StoreError::Kube)?;
        Ok(list.items)
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, StoreError> {
        self.pods(namespace)
            .create(&PostParams::default(), pod)
            .await
            .map_err(StoreError::Kube)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.pods(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| map_kube_error("Pod", name, e))
    }
}
