//! Reconciliation logic for the PodSet CRD.
//!
//! One reconcile is a single convergence step: fetch the PodSet, list
//! the pods it owns, snapshot the status, then create or delete pods
//! until the live count matches `spec.replicas`. The loop keeps no
//! state of its own; everything is re-derived from the store each
//! cycle, and retry/backoff belongs to the dispatcher, not here.

use std::sync::Arc;

use cluster_store::ClusterStore;
use crds::PodSet;
use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, error, info};

use crate::error::ControllerError;
use crate::queue::ObjectKey;
use crate::reconcile_helpers::{compute_status, is_live, pod_for_pod_set};

/// What the dispatcher should do after a reconcile cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Converged for now; wait for the next watch event
    Done,
    /// Another cycle is needed right away
    Requeue,
}

/// Reconciles PodSet resources against the cluster store.
pub struct Reconciler {
    store: Arc<dyn ClusterStore>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a new reconciler over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn ClusterStore>) -> Self {
        Self { store }
    }

    /// Performs one convergence step for the PodSet identified by `key`.
    ///
    /// Idempotent: with no intervening cluster change, a second call
    /// performs no writes. Errors are returned as-is; the dispatcher
    /// applies its backoff policy.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome, ControllerError> {
        let pod_set = match self.store.get_pod_set(&key.namespace, &key.name).await {
            Ok(pod_set) => pod_set,
            Err(e) if e.is_not_found() => {
                // Owner references cascade pod deletion; nothing to do here
                debug!("PodSet {} no longer exists, skipping", key);
                return Ok(ReconcileOutcome::Done);
            }
            Err(e) => return Err(e.into()),
        };

        info!("Reconciling PodSet {}", key);

        let pods = self
            .store
            .list_pods(&key.namespace, &PodSet::pod_labels(&key.name))
            .await?;
        let available: Vec<Pod> = pods.into_iter().filter(is_live).collect();

        // Status is a snapshot of the available set, written only when
        // it actually changed. A failure here aborts the cycle before
        // any scale decision is made.
        let status = compute_status(&available);
        if pod_set.status.as_ref() != Some(&status) {
            let mut updated = pod_set.clone();
            updated.status = Some(status);
            self.store.update_pod_set_status(&updated).await?;
        }

        // Counts come from the freshly filtered list, not from the
        // status we just wrote.
        let desired = usize::try_from(pod_set.spec.replicas).unwrap_or(0);
        if available.len() > desired {
            self.scale_down(key, &available, available.len() - desired)
                .await
        } else if available.len() < desired {
            self.scale_up(key, &pod_set, available.len(), desired).await
        } else {
            debug!(
                "PodSet {} converged at {} replica(s)",
                key,
                available.len()
            );
            Ok(ReconcileOutcome::Done)
        }
    }

    /// Deletes `excess` pods from the available set.
    ///
    /// The selection is an arbitrary prefix of the listing; which pods
    /// go is deliberately not a contract. Every selected pod is
    /// attempted even after a failure, so a partial scale-down resumes
    /// on the next cycle; the first error encountered is returned.
    async fn scale_down(
        &self,
        key: &ObjectKey,
        available: &[Pod],
        excess: usize,
    ) -> Result<ReconcileOutcome, ControllerError> {
        info!(
            "Scaling down PodSet {}: {} available, {} required",
            key,
            available.len(),
            available.len() - excess
        );

        let mut first_error: Option<ControllerError> = None;
        for pod in &available[..excess] {
            let Some(name) = pod.metadata.name.as_deref() else {
                continue;
            };
            match self.store.delete_pod(&key.namespace, name).await {
                Ok(()) => debug!("Deleted pod {}/{}", key.namespace, name),
                Err(e) if e.is_not_found() => {
                    // Another actor already removed it
                    debug!("Pod {}/{} already gone", key.namespace, name);
                }
                Err(e) => {
                    error!("Failed to delete pod {}/{}: {}", key.namespace, name, e);
                    if first_error.is_none() {
                        first_error = Some(e.into());
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(ReconcileOutcome::Requeue),
        }
    }

    /// Creates exactly one new pod.
    ///
    /// Deliberately not the whole deficit: one create per cycle
    /// throttles burst creation, and the resulting watch event brings
    /// the key straight back for the next step.
    async fn scale_up(
        &self,
        key: &ObjectKey,
        pod_set: &PodSet,
        available: usize,
        desired: usize,
    ) -> Result<ReconcileOutcome, ControllerError> {
        info!(
            "Scaling up PodSet {}: {} available, {} required",
            key, available, desired
        );

        // Owner reference must be in place before the create; if it
        // cannot be formed, abort without creating anything.
        let pod = pod_for_pod_set(pod_set)?;
        let created = self.store.create_pod(&key.namespace, &pod).await?;
        info!(
            "Created pod {}/{} for PodSet {}",
            key.namespace,
            created.metadata.name.as_deref().unwrap_or("<pending>"),
            key
        );
        Ok(ReconcileOutcome::Requeue)
    }
}
