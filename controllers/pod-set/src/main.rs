//! PodSet Controller
//!
//! Level-triggered controller that keeps the number of live pods of a
//! `PodSet` custom resource equal to its declared replica count.
//!
//! Each reconcile re-derives everything from the cluster: fetch the
//! PodSet, list the pods it owns by label, snapshot the status, then
//! create or delete pods until the counts match.

mod backoff;
mod controller;
mod error;
mod queue;
mod reconcile_helpers;
mod reconciler;
mod watcher;

#[cfg(test)]
mod test_utils;

use controller::Controller;
use crate::error::ControllerError;
use tracing::info;
use std::env;

const DEFAULT_WORKERS: usize = 2;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();

    info!("Starting PodSet Controller");

    // Load configuration from environment variables
    let namespace = env::var("WATCH_NAMESPACE").ok();
    let workers = match env::var("RECONCILE_WORKERS") {
        Ok(raw) => raw.parse::<usize>().map_err(|_| {
            ControllerError::InvalidConfig(
                "RECONCILE_WORKERS must be a positive integer".to_string(),
            )
        })?,
        Err(_) => DEFAULT_WORKERS,
    };

    info!("Configuration:");
    info!("  Namespace: {}", namespace.as_deref().unwrap_or("default"));
    info!("  Workers: {}", workers);

    // Initialize and run controller
    let controller = Controller::new(namespace, workers).await?;
    controller.run().await?;

    Ok(())
}
