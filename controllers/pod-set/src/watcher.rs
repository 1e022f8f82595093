//! Kubernetes resource watchers.
//!
//! Two watch streams feed the work queue: PodSet changes enqueue the
//! object's own key, and changes to managed pods are routed back to
//! the owning PodSet's key via the controller owner reference. The
//! second stream is what makes externally terminated pods show up as
//! prompt scale events instead of waiting for a resync.

use std::sync::Arc;

use crds::{PodSet, VERSION_LABEL, VERSION_LABEL_VALUE};
use futures::TryStreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Resource};
use kube_runtime::watcher;
use tracing::{debug, info, warn};

use crate::error::ControllerError;
use crate::queue::{ObjectKey, WorkQueue};

/// Key of the PodSet controlling a pod, if any.
///
/// Only a controller owner reference of kind `PodSet` counts; pods
/// with no controller or a different controller are ignored.
pub fn pod_set_owner_key(pod: &Pod) -> Option<ObjectKey> {
    let owner = pod
        .metadata
        .owner_references
        .as_ref()?
        .iter()
        .find(|r| r.controller == Some(true) && r.kind == PodSet::kind(&()))?;
    let namespace = pod.metadata.namespace.as_deref().unwrap_or("default");
    Some(ObjectKey::new(namespace, owner.name.clone()))
}

/// Watches Kubernetes resources for changes.
pub struct Watcher {
    queue: Arc<WorkQueue>,
    pod_set_api: Api<PodSet>,
    pod_api: Api<Pod>,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher").finish_non_exhaustive()
    }
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(queue: Arc<WorkQueue>, pod_set_api: Api<PodSet>, pod_api: Api<Pod>) -> Self {
        Self {
            queue,
            pod_set_api,
            pod_api,
        }
    }

    fn enqueue_pod_set(&self, pod_set: &PodSet) {
        let Some(name) = pod_set.metadata.name.as_deref() else {
            warn!("Ignoring PodSet event without a name");
            return;
        };
        let namespace = pod_set.metadata.namespace.as_deref().unwrap_or("default");
        self.queue.add(ObjectKey::new(namespace, name));
    }

    /// Starts watching PodSet resources.
    pub async fn watch_pod_sets(&self) -> Result<(), ControllerError> {
        info!("Starting PodSet watcher");

        let mut stream = Box::pin(watcher(
            self.pod_set_api.clone(),
            watcher::Config::default(),
        ));

        while let Some(event) = stream
            .try_next()
            .await
            .map_err(|e| ControllerError::Watch(format!("PodSet watch stream error: {e}")))?
        {
            match event {
                watcher::Event::Apply(pod_set) => {
                    debug!(
                        "PodSet applied: {}",
                        pod_set.metadata.name.as_deref().unwrap_or("<unknown>")
                    );
                    self.enqueue_pod_set(&pod_set);
                }
                watcher::Event::Delete(pod_set) => {
                    // Still enqueued: the reconcile observes NotFound
                    // and completes; owner references handle cleanup
                    debug!(
                        "PodSet deleted: {}",
                        pod_set.metadata.name.as_deref().unwrap_or("<unknown>")
                    );
                    self.enqueue_pod_set(&pod_set);
                }
                watcher::Event::InitApply(pod_set) => {
                    debug!(
                        "PodSet init apply: {}",
                        pod_set.metadata.name.as_deref().unwrap_or("<unknown>")
                    );
                    self.enqueue_pod_set(&pod_set);
                }
                watcher::Event::Init => {
                    debug!("PodSet watcher initialized");
                }
                watcher::Event::InitDone => {
                    info!("PodSet watcher initialization complete");
                }
            }
        }

        Ok(())
    }

    /// Starts watching managed pods, routing events to their owner.
    pub async fn watch_pods(&self) -> Result<(), ControllerError> {
        info!("Starting pod watcher");

        let config =
            watcher::Config::default().labels(&format!("{VERSION_LABEL}={VERSION_LABEL_VALUE}"));
        let mut stream = Box::pin(watcher(self.pod_api.clone(), config));

        while let Some(event) = stream
            .try_next()
            .await
            .map_err(|e| ControllerError::Watch(format!("Pod watch stream error: {e}")))?
        {
            match event {
                watcher::Event::Apply(pod) | watcher::Event::Delete(pod) => {
                    if let Some(key) = pod_set_owner_key(&pod) {
                        debug!(
                            "Pod event for {} routed to PodSet {}",
                            pod.metadata.name.as_deref().unwrap_or("<unknown>"),
                            key
                        );
                        self.queue.add(key);
                    }
                }
                watcher::Event::InitApply(pod) => {
                    if let Some(key) = pod_set_owner_key(&pod) {
                        self.queue.add(key);
                    }
                }
                watcher::Event::Init => {
                    debug!("Pod watcher initialized");
                }
                watcher::Event::InitDone => {
                    info!("Pod watcher initialization complete");
                }
            }
        }

        Ok(())
    }
}
