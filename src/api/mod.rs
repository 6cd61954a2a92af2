//! Typed definitions of the Kubernetes resources this controller emits and
//! observes.
//!
//! The derived kinds (HTTPRoute, ReferenceGrant, BackendTLSPolicy and the
//! Envoy Gateway policies) are cluster-provided CRDs; the structs here carry
//! the real upstream group/version/kind identifiers and only the fields this
//! controller reads or writes. Unknown fields returned by the API server are
//! ignored on deserialization.

mod backend_tls;
mod common;
mod envoy;
mod gateway;
mod grants;
mod httproute;

pub use backend_tls::{BackendTlsPolicy, BackendTlsPolicySpec, BackendTlsValidation};
pub use common::{BackendObjectReference, LocalPolicyTargetReference, ParentReference};
pub use envoy::{
    BackendConnection, BackendTrafficPolicy, BackendTrafficPolicySpec, ClientConnection,
    ClientTrafficPolicy, ClientTrafficPolicySpec, ConsistentHash, ConsistentHashType, Cookie,
    Cors, ExtAuth, Header, HttpExtAuthService, HttpTimeout, LoadBalancer, LoadBalancerType,
    QueryParam, SecurityPolicy, SecurityPolicySpec, Timeout,
};
pub use gateway::{Gateway, GatewaySpec, GatewayStatus, GatewayStatusAddress};
pub use grants::{ReferenceGrant, ReferenceGrantFrom, ReferenceGrantSpec, ReferenceGrantTo};
pub use httproute::{
    HttpBackendRef, HttpPathMatch, HttpPathModifier, HttpRequestRedirectFilter, HttpRoute,
    HttpRouteFilter, HttpRouteMatch, HttpRouteRule, HttpRouteSpec, HttpUrlRewriteFilter,
    PathMatchType, PathModifierType,
};

/// API group of the Gateway API resources.
pub const GATEWAY_API_GROUP: &str = "gateway.networking.k8s.io";

/// Address type carried by Gateway status addresses that resolve to hostnames.
pub const HOSTNAME_ADDRESS_TYPE: &str = "Hostname";

/// Well-known CA certificate set name for system trust.
pub const WELL_KNOWN_CA_SYSTEM: &str = "System";
