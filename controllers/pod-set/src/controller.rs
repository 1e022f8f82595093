//! Main controller implementation.
//!
//! This module wires the pieces together: the kube-backed store, the
//! reconciler, the work queue, the two watch streams and the worker
//! pool. Workers pull keys off the queue one at a time; the queue's
//! in-flight exclusion keeps every PodSet's reconciles strictly
//! sequential while distinct PodSets reconcile concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use cluster_store::{KubeStore, StoreError};
use crds::PodSet;
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::backoff::FibonacciBackoff;
use crate::error::ControllerError;
use crate::queue::{ObjectKey, WorkQueue};
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crate::watcher::Watcher;

type BackoffMap = Arc<Mutex<HashMap<ObjectKey, FibonacciBackoff>>>;

/// Main controller for PodSet management.
pub struct Controller {
    pod_set_watcher: JoinHandle<Result<(), ControllerError>>,
    pod_watcher: JoinHandle<Result<(), ControllerError>>,
    workers: Vec<JoinHandle<()>>,
    queue: Arc<WorkQueue>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller").finish_non_exhaustive()
    }
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(
        namespace: Option<String>,
        worker_count: usize,
    ) -> Result<Self, ControllerError> {
        info!("Initializing PodSet Controller");

        // Create Kubernetes client
        let kube_client = Client::try_default()
            .await
            .map_err(|e| ControllerError::Store(StoreError::Kube(e)))?;

        // Create API clients
        let ns = namespace.as_deref().unwrap_or("default");
        let pod_set_api: Api<PodSet> = Api::namespaced(kube_client.clone(), ns);
        let pod_api: Api<Pod> = Api::namespaced(kube_client.clone(), ns);

        // Create reconciler over the kube-backed store
        let store = Arc::new(KubeStore::new(kube_client));
        let reconciler = Arc::new(Reconciler::new(store));

        // Create the work queue and the watchers feeding it
        let queue = Arc::new(WorkQueue::new());
        let watcher_instance = Arc::new(Watcher::new(
            Arc::clone(&queue),
            pod_set_api,
            pod_api,
        ));

        // Start watchers in background tasks
        let pod_set_watcher = {
            let watcher = Arc::clone(&watcher_instance);
            tokio::spawn(async move { watcher.watch_pod_sets().await })
        };
        let pod_watcher = {
            let watcher = watcher_instance;
            tokio::spawn(async move { watcher.watch_pods().await })
        };

        // Start the worker pool
        let backoffs: BackoffMap = Arc::new(Mutex::new(HashMap::new()));
        let workers = (0..worker_count.max(1))
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    Arc::clone(&queue),
                    Arc::clone(&reconciler),
                    Arc::clone(&backoffs),
                ))
            })
            .collect();

        Ok(Self {
            pod_set_watcher,
            pod_watcher,
            workers,
            queue,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("PodSet Controller running");

        // Wait for either watcher to exit (they should run forever)
        // or a shutdown signal
        let result = tokio::select! {
            result = &mut self.pod_set_watcher => {
                result
                    .map_err(|e| ControllerError::Watch(format!("PodSet watcher panicked: {e}")))
                    .and_then(|inner| inner)
            }
            result = &mut self.pod_watcher => {
                result
                    .map_err(|e| ControllerError::Watch(format!("Pod watcher panicked: {e}")))
                    .and_then(|inner| inner)
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                Ok(())
            }
        };

        self.queue.shut_down();
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!("Worker task failed to stop cleanly: {e}");
            }
        }
        result
    }
}

/// One worker: pull keys, reconcile, decide what happens next.
///
/// Success resets the key's backoff; a requeue outcome re-adds the key
/// immediately; an error schedules a retry after the key's next
/// Fibonacci backoff delay.
async fn worker_loop(
    id: usize,
    queue: Arc<WorkQueue>,
    reconciler: Arc<Reconciler>,
    backoffs: BackoffMap,
) {
    debug!("Worker {id} started");
    while let Some(key) = queue.get().await {
        let result = reconciler.reconcile(&key).await;
        queue.done(&key);
        match result {
            Ok(ReconcileOutcome::Done) => {
                reset_backoff(&backoffs, &key);
            }
            Ok(ReconcileOutcome::Requeue) => {
                reset_backoff(&backoffs, &key);
                queue.add(key);
            }
            Err(e) => {
                let delay = next_backoff(&backoffs, &key);
                error!("Reconcile of PodSet {key} failed: {e}; retrying in {delay:?}");
                let queue = Arc::clone(&queue);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    queue.add(key);
                });
            }
        }
    }
    debug!("Worker {id} exiting");
}

fn reset_backoff(backoffs: &BackoffMap, key: &ObjectKey) {
    backoffs
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(key);
}

fn next_backoff(backoffs: &BackoffMap, key: &ObjectKey) -> std::time::Duration {
    backoffs
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .entry(key.clone())
        .or_default()
        .next_backoff()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{key_for, test_pod_set};
    use cluster_store::{MockClusterStore, MockFailure};
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    fn spawn_pool(
        store: &MockClusterStore,
        queue: &Arc<WorkQueue>,
        worker_count: usize,
    ) -> Vec<JoinHandle<()>> {
        let reconciler = Arc::new(Reconciler::new(Arc::new(store.clone())));
        let backoffs: BackoffMap = Arc::new(Mutex::new(HashMap::new()));
        (0..worker_count)
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    Arc::clone(queue),
                    Arc::clone(&reconciler),
                    Arc::clone(&backoffs),
                ))
            })
            .collect()
    }

    async fn wait_for_pods(store: &MockClusterStore, namespace: &str, count: usize) {
        for _ in 0..300 {
            if store.pods_in(namespace).len() == count {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {count} pods, found {}",
            store.pods_in(namespace).len()
        );
    }

    async fn stop_pool(queue: &Arc<WorkQueue>, workers: Vec<JoinHandle<()>>) {
        queue.shut_down();
        for worker in workers {
            timeout(Duration::from_secs(1), worker)
                .await
                .expect("worker stops after shutdown")
                .expect("worker task");
        }
    }

    #[tokio::test]
    async fn test_worker_pool_converges_pod_set() {
        let store = MockClusterStore::new();
        let pod_set = test_pod_set("web", "default", 3);
        let key = key_for(&pod_set);
        store.add_pod_set(pod_set);

        let queue = Arc::new(WorkQueue::new());
        let workers = spawn_pool(&store, &queue, 2);
        queue.add(key);

        wait_for_pods(&store, "default", 3).await;
        assert_eq!(store.creates(), 3);

        stop_pool(&queue, workers).await;
    }

    #[tokio::test]
    async fn test_worker_retries_after_error_with_backoff() {
        let store = MockClusterStore::new();
        let pod_set = test_pod_set("web", "default", 1);
        let key = key_for(&pod_set);
        store.add_pod_set(pod_set);
        // First status write fails; the retry a backoff later succeeds
        store.fail_next_status_update(MockFailure::Unavailable);

        let queue = Arc::new(WorkQueue::new());
        let workers = spawn_pool(&store, &queue, 1);
        queue.add(key);

        wait_for_pods(&store, "default", 1).await;

        stop_pool(&queue, workers).await;
    }
}
