//! Reconciliation logic for Ingress resources
//!
//! The controller follows the Kubernetes pattern: observe the Ingress,
//! project its desired derived state, and converge the cluster towards it,
//! one Ingress key at a time.

mod ingress;

pub use ingress::{error_policy, reconcile, Context, KubeObjectStore, ObjectStore};
