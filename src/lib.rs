//! ingress-gateway-api - Ingress to Gateway API translation controller
//!
//! Watches `networking.k8s.io/v1` Ingress resources carrying nginx-style
//! annotations and projects each of them onto the Gateway API resource graph
//! of a shared Envoy Gateway: HTTPRoutes for the routing rules, Envoy Gateway
//! traffic/security policies for the recognized annotations, BackendTLSPolicies
//! for HTTPS backends, and ReferenceGrants for cross-namespace backends.
//!
//! # Architecture
//!
//! The crate splits into a pure translation kernel and a level-triggered
//! control loop around it:
//!
//! - [`annotations`] - typed, optional views over the nginx annotation map
//! - [`projector`] - pure projection `Ingress -> DerivedSet`
//! - [`controller`] - reconciliation: converge, garbage-collect, finalize
//! - [`api`] - typed definitions of the emitted Gateway API / Envoy resources
//! - [`config`] - process configuration (flags with environment fallbacks)
//! - [`metrics`] - Prometheus reconcile metrics
//! - [`error`] - error types and Kubernetes API error classification

#![deny(missing_docs)]

pub mod annotations;
pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod metrics;
pub mod projector;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// System boundary constants
// =============================================================================

/// Finalizer placed on processed Ingresses so cross-namespace offspring can be
/// cleaned up before the API server garbage-collects the Ingress.
pub const FINALIZER: &str = "ingress-gateway-api.io/finalizer";

/// Provenance annotation carried by every derived resource; the value is
/// always `<ingressNamespace>/<ingressName>`.
pub const SOURCE_ANNOTATION: &str = "ingress-gateway-api.io/source";

/// Deprecated class annotation, read when `spec.ingressClassName` is unset.
pub const LEGACY_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";
