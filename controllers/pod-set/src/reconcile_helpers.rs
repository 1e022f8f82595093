//! Shared helpers for the reconcile algorithm.
//!
//! Pure functions over API objects: the live-pod filter, the status
//! snapshot, and the pod template used when scaling up. Keeping these
//! free of store access makes them directly unit-testable.

use crds::{PodSet, PodSetStatus};
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;

use crate::error::ControllerError;

/// Pod phases that count toward the available set.
const LIVE_PHASES: [&str; 2] = ["Pending", "Running"];

/// True for pods that count toward the available set: not marked for
/// deletion and in phase `Pending` or `Running`.
pub fn is_live(pod: &Pod) -> bool {
    if pod.metadata.deletion_timestamp.is_some() {
        return false;
    }
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .is_some_and(|phase| LIVE_PHASES.contains(&phase))
}

/// Status snapshot for a PodSet: the names of the available pods, in
/// the order the store listed them. No extra sort is applied, so the
/// ordering is whatever the listing returned.
pub fn compute_status(available: &[Pod]) -> PodSetStatus {
    PodSetStatus {
        pod_names: available
            .iter()
            .filter_map(|p| p.metadata.name.clone())
            .collect(),
    }
}

/// Builds the pod created when a PodSet scales up.
///
/// The pod gets a `generateName` of `<name>-pod-` (the API server
/// assigns the unique suffix), the PodSet's correlation labels, and a
/// controller owner reference so the platform's garbage collector
/// cascades deletion. The container itself is a fixed placeholder
/// until the PodSet spec grows a template field.
///
/// Fails without side effects if the PodSet lacks the metadata (name,
/// uid) needed to form the owner reference.
pub fn pod_for_pod_set(pod_set: &PodSet) -> Result<Pod, ControllerError> {
    let name = pod_set
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| ControllerError::MissingMetadata("PodSet has no name".to_string()))?;
    let namespace = pod_set.metadata.namespace.as_deref().unwrap_or("default");

    let owner_ref = pod_set.controller_owner_ref(&()).ok_or_else(|| {
        ControllerError::MissingMetadata(format!(
            "PodSet {namespace}/{name} has no uid; cannot set owner reference"
        ))
    })?;

    Ok(Pod {
        metadata: ObjectMeta {
            generate_name: Some(format!("{name}-pod-")),
            namespace: Some(namespace.to_string()),
            labels: Some(PodSet::pod_labels(name)),
            owner_references: Some(vec![owner_ref]),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "busybox".to_string(),
                image: Some("busybox".to_string()),
                command: Some(vec!["sleep".to_string(), "3600".to_string()]),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    })
}
