//! BackendTLSPolicy (gateway.networking.k8s.io/v1alpha3)

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::LocalPolicyTargetReference;

/// BackendTLSPolicy instructs the gateway to originate TLS towards a backend
/// Service. Emitted once per unique backend service when the
/// `backend-protocol: HTTPS` annotation is present.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1alpha3",
    kind = "BackendTLSPolicy",
    root = "BackendTlsPolicy",
    plural = "backendtlspolicies",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct BackendTlsPolicySpec {
    /// Services this policy attaches to
    pub target_refs: Vec<LocalPolicyTargetReference>,

    /// How the backend's serving certificate is validated
    pub validation: BackendTlsValidation,
}

/// Certificate validation settings for backend TLS.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackendTlsValidation {
    /// Use a well-known CA certificate set (`System`) instead of explicit refs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub well_known_ca_certificates: Option<String>,

    /// SNI / certificate hostname expected from the backend
    pub hostname: String,
}
