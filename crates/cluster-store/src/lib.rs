//! Cluster API Store
//!
//! Typed access to the two resource kinds the PodSet controller
//! touches: the `PodSet` custom resource (get + status update) and the
//! pods it owns (list/create/delete). The [`ClusterStore`] trait is the
//! seam between the reconcile algorithm and the live cluster; the
//! concrete [`KubeStore`] talks to the Kubernetes API server, and the
//! `test-util` feature provides an in-memory [`MockClusterStore`] for
//! unit tests.
//!
//! # Example
//!
//! ```no_run
//! use cluster_store::{ClusterStore, KubeStore};
//! use crds::PodSet;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let store = KubeStore::new(client);
//!
//! let pod_set = store.get_pod_set("default", "web").await?;
//! let pods = store
//!     .list_pods("default", &PodSet::pod_labels("web"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::KubeStore;
pub use error::StoreError;
pub use store_trait::ClusterStore;
#[cfg(feature = "test-util")]
pub use mock::{MockClusterStore, MockFailure};
