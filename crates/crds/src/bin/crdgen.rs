//! Emits the PodSet CRD manifest as YAML on stdout.
//!
//! Usage: `cargo run --bin crdgen > deploy/crds/podset.yaml`

use crds::PodSet;
use kube::CustomResourceExt;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    print!("{}", serde_yaml::to_string(&PodSet::crd())?);
    Ok(())
}
