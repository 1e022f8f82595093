//! Test utilities for unit testing the reconciler
//!
//! Helpers for building fixture PodSets and pods in the shapes the
//! API server would return them.

use std::sync::Arc;

use cluster_store::MockClusterStore;
use crds::{PodSet, PodSetSpec, PodSetStatus};
use k8s_openapi::api::core::v1::{Pod, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference, Time};

use crate::queue::ObjectKey;
use crate::reconciler::Reconciler;

/// A PodSet as the API server would hand it out: named, namespaced,
/// with a uid so owner references can be formed.
pub fn test_pod_set(name: &str, namespace: &str, replicas: i32) -> PodSet {
    let mut pod_set = PodSet::new(name, PodSetSpec { replicas });
    pod_set.metadata.namespace = Some(namespace.to_string());
    pod_set.metadata.uid = Some(format!("uid-{name}"));
    pod_set
}

/// A pod belonging to `pod_set`, carrying the correlation labels and a
/// controller owner reference, in the given phase.
pub fn test_pod(pod_set: &PodSet, name: &str, phase: &str) -> Pod {
    let owner_name = pod_set.metadata.name.clone().unwrap_or_default();
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: pod_set.metadata.namespace.clone(),
            labels: Some(PodSet::pod_labels(&owner_name)),
            owner_references: Some(vec![OwnerReference {
                api_version: "app.example.com/v1alpha1".to_string(),
                kind: "PodSet".to_string(),
                name: owner_name,
                uid: pod_set.metadata.uid.clone().unwrap_or_default(),
                controller: Some(true),
                block_owner_deletion: Some(true),
            }]),
            ..Default::default()
        },
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Marks a pod as being torn down by the platform.
pub fn deleting(mut pod: Pod) -> Pod {
    pod.metadata.deletion_timestamp = Some(Time(k8s_openapi::chrono::Utc::now()));
    pod
}

/// Sets a stored status on a PodSet fixture.
pub fn with_status(mut pod_set: PodSet, pod_names: &[&str]) -> PodSet {
    pod_set.status = Some(PodSetStatus {
        pod_names: pod_names.iter().map(ToString::to_string).collect(),
    });
    pod_set
}

/// Reconciler wired to a mock store.
pub fn reconciler_with(store: &MockClusterStore) -> Reconciler {
    Reconciler::new(Arc::new(store.clone()))
}

/// Reconcile key for a fixture PodSet.
pub fn key_for(pod_set: &PodSet) -> ObjectKey {
    ObjectKey::new(
        pod_set.metadata.namespace.clone().unwrap_or_default(),
        pod_set.metadata.name.clone().unwrap_or_default(),
    )
}
