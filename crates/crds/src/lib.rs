//! PodSet CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the PodSet operator.

pub mod pod_set;

pub use pod_set::*;
