//! PodSet CRD
//!
//! Declares a target number of replicas for a set of identically
//! labeled pods managed by the pod-set controller.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Label carrying the owning PodSet's name on every managed pod.
pub const APP_LABEL: &str = "app";

/// Fixed version label stamped on every managed pod.
///
/// Together with `app=<PodSet name>` this is the sole correlation
/// mechanism between a PodSet and its pods. Changing the value breaks
/// discovery of already-running pods.
pub const VERSION_LABEL: &str = "version";

/// Value of the [`VERSION_LABEL`] label.
pub const VERSION_LABEL_VALUE: &str = "v0.1";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "app.example.com",
    version = "v1alpha1",
    kind = "PodSet",
    namespaced,
    status = "PodSetStatus",
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.replicas"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PodSetSpec {
    /// Desired number of live pods for this PodSet
    #[schemars(range(min = 0))]
    pub replicas: i32,
}

/// Observed state of a PodSet.
///
/// Recomputed from scratch on every reconcile; `pod_names` is a
/// snapshot of the live pods in the order the API server listed them,
/// not a stable ordering contract.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PodSetStatus {
    /// Names of live (non-deleting, Pending/Running) pods
    #[serde(default)]
    pub pod_names: Vec<String>,
}

impl PodSet {
    /// Label selector identifying the pods belonging to a PodSet with
    /// the given name.
    pub fn pod_labels(name: &str) -> std::collections::BTreeMap<String, String> {
        std::collections::BTreeMap::from([
            (APP_LABEL.to_string(), name.to_string()),
            (VERSION_LABEL.to_string(), VERSION_LABEL_VALUE.to_string()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_camel_case() {
        let status = PodSetStatus {
            pod_names: vec!["a-pod-00001".to_string()],
        };
        let json = serde_json::to_value(&status).expect("serialize status");
        assert_eq!(json["podNames"][0], "a-pod-00001");
    }

    #[test]
    fn test_status_equality_is_order_sensitive() {
        let a = PodSetStatus {
            pod_names: vec!["p1".to_string(), "p2".to_string()],
        };
        let b = PodSetStatus {
            pod_names: vec!["p2".to_string(), "p1".to_string()],
        };
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_empty_status_deserializes() {
        let status: PodSetStatus = serde_json::from_str("{}").expect("deserialize empty status");
        assert!(status.pod_names.is_empty());
    }

    #[test]
    fn test_pod_labels_contract() {
        let labels = PodSet::pod_labels("web");
        assert_eq!(labels.get("app").map(String::as_str), Some("web"));
        assert_eq!(labels.get("version").map(String::as_str), Some("v0.1"));
        assert_eq!(labels.len(), 2);
    }
}
