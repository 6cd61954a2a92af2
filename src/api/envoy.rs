//! Envoy Gateway policy extensions (gateway.envoyproxy.io/v1alpha1)
//!
//! Side-band configuration objects targeting either a derived HTTPRoute or
//! the shared Gateway by local reference.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{BackendObjectReference, LocalPolicyTargetReference};

/// BackendTrafficPolicy configures how the gateway talks to the backends of
/// the targeted HTTPRoute: timeouts, load-balancing and connection limits.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gateway.envoyproxy.io",
    version = "v1alpha1",
    kind = "BackendTrafficPolicy",
    root = "BackendTrafficPolicy",
    plural = "backendtrafficpolicies",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct BackendTrafficPolicySpec {
    /// The HTTPRoute this policy attaches to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_ref: Option<LocalPolicyTargetReference>,

    /// Timeout settings for backend connections
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Timeout>,

    /// Load-balancing policy across backend endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer: Option<LoadBalancer>,

    /// Backend connection settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<BackendConnection>,
}

/// Timeout settings.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Timeout {
    /// HTTP protocol timeouts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpTimeout>,
}

/// HTTP-level timeouts, expressed as Gateway API duration strings.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HttpTimeout {
    /// Total request timeout, e.g. `30s`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<String>,
}

/// Load-balancing policy.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancer {
    /// Which balancing algorithm to use
    #[serde(rename = "type")]
    pub lb_type: LoadBalancerType,

    /// Consistent-hash settings; required for the ConsistentHash type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consistent_hash: Option<ConsistentHash>,
}

/// Load-balancer algorithms.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum LoadBalancerType {
    /// Consistent hashing over a request property
    ConsistentHash,
    /// Pick the endpoint with the fewest outstanding requests
    LeastRequest,
    /// Pick a random endpoint
    Random,
    /// Rotate through endpoints
    RoundRobin,
}

/// Property a consistent-hash balancer hashes on.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConsistentHash {
    /// Which request property is hashed
    #[serde(rename = "type")]
    pub hash_type: ConsistentHashType,

    /// Cookie to hash on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<Cookie>,

    /// Headers to hash on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<Header>>,

    /// Query parameters to hash on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_params: Option<Vec<QueryParam>>,
}

/// Hashable request properties.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConsistentHashType {
    /// Hash on the client source IP
    SourceIP,
    /// Hash on a cookie value
    Cookie,
    /// Hash on header values
    Headers,
    /// Hash on query parameter values
    QueryParams,
}

/// A cookie used for consistent hashing.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    /// Cookie name
    pub name: String,
}

/// A header used for consistent hashing.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    /// Header name
    pub name: String,
}

/// A query parameter used for consistent hashing.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueryParam {
    /// Query parameter name
    pub name: String,
}

/// Backend connection settings.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackendConnection {
    /// Soft limit on the connection buffer size, e.g. `16Mi`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_limit: Option<Quantity>,
}

/// ClientTrafficPolicy configures how the gateway treats downstream client
/// connections. Emitted at most once per Ingress and targets the shared
/// Gateway.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gateway.envoyproxy.io",
    version = "v1alpha1",
    kind = "ClientTrafficPolicy",
    root = "ClientTrafficPolicy",
    plural = "clienttrafficpolicies",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ClientTrafficPolicySpec {
    /// The Gateway this policy attaches to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_ref: Option<LocalPolicyTargetReference>,

    /// Client connection settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<ClientConnection>,
}

/// Client connection settings.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientConnection {
    /// Soft limit on the connection buffer size, e.g. `8Ki`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_limit: Option<Quantity>,
}

/// SecurityPolicy configures request authentication and CORS for the targeted
/// HTTPRoute.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gateway.envoyproxy.io",
    version = "v1alpha1",
    kind = "SecurityPolicy",
    root = "SecurityPolicy",
    plural = "securitypolicies",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPolicySpec {
    /// The HTTPRoute this policy attaches to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_ref: Option<LocalPolicyTargetReference>,

    /// Cross-origin resource sharing settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cors: Option<Cors>,

    /// External authorization settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_auth: Option<ExtAuth>,
}

/// Cross-origin resource sharing configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Cors {
    /// Origins allowed to make requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_origins: Option<Vec<String>>,

    /// Methods allowed in requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_methods: Option<Vec<String>>,

    /// Headers allowed in requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_headers: Option<Vec<String>>,

    /// Headers exposed to the browser
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expose_headers: Option<Vec<String>>,

    /// How long preflight results may be cached, as a duration string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<String>,

    /// Whether credentialed requests are allowed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_credentials: Option<bool>,
}

/// External authorization configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExtAuth {
    /// HTTP authorization service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpExtAuthService>,
}

/// An HTTP external authorization service.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HttpExtAuthService {
    /// The service handling authorization checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_ref: Option<BackendObjectReference>,

    /// Path on the authorization service, when not `/`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Authorization response headers forwarded to the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers_to_backend: Option<Vec<String>>,
}
