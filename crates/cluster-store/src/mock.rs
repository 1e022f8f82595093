//! Mock cluster store for unit testing
//!
//! In-memory implementation of [`ClusterStore`] so reconcile logic can
//! be tested without an API server. The mock also plays the platform's
//! part where the controller depends on it: `generateName` is resolved
//! with a deterministic counter suffix, and newly created pods are
//! given phase `Pending` as the scheduler would.
//!
//! Failure injection covers the error paths the reconcile algorithm
//! must handle: per-pod delete failures and a one-shot status-update
//! failure (NotFound / Conflict / Unavailable).

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crds::PodSet;
use k8s_openapi::api::core::v1::Pod;

use crate::error::StoreError;
use crate::store_trait::ClusterStore;

/// Kind of error to inject into a mock store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Object reported as missing (HTTP 404)
    NotFound,
    /// Optimistic-concurrency conflict (HTTP 409)
    Conflict,
    /// Transient availability failure
    Unavailable,
}

impl MockFailure {
    fn into_error(self, kind: &str, name: &str) -> StoreError {
        match self {
            MockFailure::NotFound => StoreError::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            MockFailure::Conflict => StoreError::Conflict(format!("{kind} {name}: injected")),
            MockFailure::Unavailable => {
                StoreError::Unavailable(format!("{kind} {name}: injected"))
            }
        }
    }
}

#[derive(Default)]
struct MockState {
    pod_sets: HashMap<(String, String), PodSet>,
    // Insertion order doubles as listing order
    pods: Vec<Pod>,
    pod_seq: u64,
    creates: u64,
    delete_attempts: u64,
    status_updates: u64,
    delete_failures: HashMap<String, MockFailure>,
    next_status_update_failure: Option<MockFailure>,
}

/// Mock cluster store backed by in-memory maps.
#[derive(Clone, Default)]
pub struct MockClusterStore {
    state: Arc<Mutex<MockState>>,
}

impl std::fmt::Debug for MockClusterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockClusterStore").finish_non_exhaustive()
    }
}

fn pod_namespace(pod: &Pod) -> &str {
    pod.metadata.namespace.as_deref().unwrap_or("default")
}

fn pod_name(pod: &Pod) -> &str {
    pod.metadata.name.as_deref().unwrap_or("")
}

fn labels_match(pod: &Pod, wanted: &BTreeMap<String, String>) -> bool {
    let Some(labels) = pod.metadata.labels.as_ref() else {
        return wanted.is_empty();
    };
    wanted
        .iter()
        .all(|(k, v)| labels.get(k).is_some_and(|have| have == v))
}

impl MockClusterStore {
    /// Creates an empty mock store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a PodSet (for test setup).
    pub fn add_pod_set(&self, pod_set: PodSet) {
        let key = (
            pod_set
                .metadata
                .namespace
                .clone()
                .unwrap_or_else(|| "default".to_string()),
            pod_set.metadata.name.clone().unwrap_or_default(),
        );
        self.lock().pod_sets.insert(key, pod_set);
    }

    /// Seed a pod (for test setup). Appended in listing order.
    pub fn add_pod(&self, pod: Pod) {
        self.lock().pods.push(pod);
    }

    /// Current copy of a stored PodSet.
    #[must_use]
    pub fn pod_set(&self, namespace: &str, name: &str) -> Option<PodSet> {
        self.lock()
            .pod_sets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// All pods currently stored in a namespace, in listing order.
    #[must_use]
    pub fn pods_in(&self, namespace: &str) -> Vec<Pod> {
        self.lock()
            .pods
            .iter()
            .filter(|p| pod_namespace(p) == namespace)
            .cloned()
            .collect()
    }

    /// Number of pods created through the store.
    #[must_use]
    pub fn creates(&self) -> u64 {
        self.lock().creates
    }

    /// Number of delete calls made, successful or not.
    #[must_use]
    pub fn delete_attempts(&self) -> u64 {
        self.lock().delete_attempts
    }

    /// Number of status writes accepted by the store.
    #[must_use]
    pub fn status_updates(&self) -> u64 {
        self.lock().status_updates
    }

    /// Make deleting the named pod fail with the given error.
    ///
    /// A `NotFound` injection also removes the pod, modeling another
    /// actor deleting it between the list and the delete call.
    pub fn fail_delete(&self, pod_name: &str, failure: MockFailure) {
        self.lock()
            .delete_failures
            .insert(pod_name.to_string(), failure);
    }

    /// Make the next status update fail with the given error.
    pub fn fail_next_status_update(&self, failure: MockFailure) {
        self.lock().next_status_update_failure = Some(failure);
    }

    /// Clear all injected failures.
    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.delete_failures.clear();
        state.next_status_update_failure = None;
    }
}

#[async_trait::async_trait]
impl ClusterStore for MockClusterStore {
    async fn get_pod_set(&self, namespace: &str, name: &str) -> Result<PodSet, StoreError> {
        self.lock()
            .pod_sets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "PodSet".to_string(),
                name: name.to_string(),
            })
    }

    async fn update_pod_set_status(&self, pod_set: &PodSet) -> Result<PodSet, StoreError> {
        let name = pod_set.metadata.name.clone().unwrap_or_default();
        let namespace = pod_set
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());

        let mut state = self.lock();
        if let Some(failure) = state.next_status_update_failure.take() {
            return Err(failure.into_error("PodSet", &name));
        }

        let key = (namespace, name.clone());
        let stored = state
            .pod_sets
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound {
                kind: "PodSet".to_string(),
                name,
            })?;
        stored.status = pod_set.status.clone();
        let updated = stored.clone();
        state.status_updates += 1;
        Ok(updated)
    }

    async fn list_pods(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>, StoreError> {
        Ok(self
            .lock()
            .pods
            .iter()
            .filter(|p| pod_namespace(p) == namespace && labels_match(p, labels))
            .cloned()
            .collect())
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, StoreError> {
        let mut state = self.lock();
        let mut stored = pod.clone();
        stored.metadata.namespace = Some(namespace.to_string());

        if stored.metadata.name.is_none() {
            let prefix = stored.metadata.generate_name.clone().unwrap_or_default();
            state.pod_seq += 1;
            stored.metadata.name = Some(format!("{prefix}{:05}", state.pod_seq));
        }

        let name = pod_name(&stored).to_string();
        if state
            .pods
            .iter()
            .any(|p| pod_namespace(p) == namespace && pod_name(p) == name)
        {
            return Err(StoreError::Conflict(format!("Pod {name}: already exists")));
        }

        // The platform side: a freshly created pod starts out Pending
        let status = stored.status.get_or_insert_default();
        if status.phase.is_none() {
            status.phase = Some("Pending".to_string());
        }

        state.pods.push(stored.clone());
        state.creates += 1;
        Ok(stored)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.delete_attempts += 1;

        if let Some(failure) = state.delete_failures.get(name).copied() {
            if failure == MockFailure::NotFound {
                state
                    .pods
                    .retain(|p| !(pod_namespace(p) == namespace && pod_name(p) == name));
            }
            return Err(failure.into_error("Pod", name));
        }

        let before = state.pods.len();
        state
            .pods
            .retain(|p| !(pod_namespace(p) == namespace && pod_name(p) == name));
        if state.pods.len() == before {
            return Err(StoreError::NotFound {
                kind: "Pod".to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn generate_name_pod(prefix: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                generate_name: Some(prefix.to_string()),
                labels: Some(PodSet::pod_labels("web")),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_resolves_generate_name_uniquely() {
        let store = MockClusterStore::new();
        let first = store
            .create_pod("default", &generate_name_pod("web-pod-"))
            .await
            .expect("create first pod");
        let second = store
            .create_pod("default", &generate_name_pod("web-pod-"))
            .await
            .expect("create second pod");

        let first_name = first.metadata.name.expect("first pod name");
        let second_name = second.metadata.name.expect("second pod name");
        assert!(first_name.starts_with("web-pod-"));
        assert_ne!(first_name, second_name);
    }

    #[tokio::test]
    async fn test_created_pods_start_pending() {
        let store = MockClusterStore::new();
        let pod = store
            .create_pod("default", &generate_name_pod("web-pod-"))
            .await
            .expect("create pod");
        let phase = pod.status.and_then(|s| s.phase);
        assert_eq!(phase.as_deref(), Some("Pending"));
    }

    #[tokio::test]
    async fn test_list_preserves_insertion_order() {
        let store = MockClusterStore::new();
        for prefix in ["a-", "b-", "c-"] {
            store
                .create_pod("default", &generate_name_pod(prefix))
                .await
                .expect("create pod");
        }
        let listed = store
            .list_pods("default", &PodSet::pod_labels("web"))
            .await
            .expect("list pods");
        let names: Vec<_> = listed
            .iter()
            .map(|p| pod_name(p).chars().next().expect("non-empty name"))
            .collect();
        assert_eq!(names, vec!['a', 'b', 'c']);
    }

    #[tokio::test]
    async fn test_delete_missing_pod_is_not_found() {
        let store = MockClusterStore::new();
        let err = store
            .delete_pod("default", "ghost")
            .await
            .expect_err("delete of missing pod");
        assert!(err.is_not_found());
        assert_eq!(store.delete_attempts(), 1);
    }
}
