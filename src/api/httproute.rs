//! HTTPRoute (gateway.networking.k8s.io/v1)

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{BackendObjectReference, ParentReference};

/// HTTPRoute provides a way to route HTTP requests, binding a parent Gateway
/// to an ordered list of match-filter-backend rules.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1",
    kind = "HTTPRoute",
    root = "HttpRoute",
    plural = "httproutes",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteSpec {
    /// Gateways this Route wants to be attached to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_refs: Option<Vec<ParentReference>>,

    /// Hostnames to match against the HTTP Host header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostnames: Option<Vec<String>>,

    /// Ordered list of rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<HttpRouteRule>>,
}

/// One match-filter-backend rule of an HTTPRoute.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteRule {
    /// Conditions for matching incoming requests; the rule matches if any
    /// single entry matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<Vec<HttpRouteMatch>>,

    /// Filters applied to requests matching this rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<HttpRouteFilter>>,

    /// Backends matching requests are forwarded to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_refs: Option<Vec<HttpBackendRef>>,
}

/// Match conditions of a rule. Only path matching is produced by the
/// translation; header and query matches have no Ingress equivalent.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteMatch {
    /// Path match condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<HttpPathMatch>,
}

/// HTTP request path matcher.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HttpPathMatch {
    /// How the path value should be interpreted
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub match_type: Option<PathMatchType>,

    /// Value to match against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Path match semantics.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum PathMatchType {
    /// Match the path exactly
    Exact,
    /// Match on a path element prefix split by `/`
    PathPrefix,
    /// Match on a regular expression
    RegularExpression,
}

/// Processing step applied during the request lifecycle.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(tag = "type")]
pub enum HttpRouteFilter {
    /// Respond to the request with an HTTP redirect
    #[serde(rename_all = "camelCase")]
    RequestRedirect {
        /// The redirect to respond with
        request_redirect: HttpRequestRedirectFilter,
    },

    /// Rewrite the request URL before forwarding it upstream
    #[serde(rename_all = "camelCase")]
    URLRewrite {
        /// The rewrite to apply
        url_rewrite: HttpUrlRewriteFilter,
    },
}

/// Filter responding to a matched request with an HTTP redirect.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestRedirectFilter {
    /// Scheme of the redirect Location, e.g. `https`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,

    /// Hostname of the redirect Location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Path modifier of the redirect Location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<HttpPathModifier>,

    /// Port of the redirect Location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,

    /// HTTP status code of the redirect response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<i32>,
}

/// Filter rewriting the request URL before it is forwarded.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HttpUrlRewriteFilter {
    /// Hostname to rewrite the Host header to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Path rewrite to apply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<HttpPathModifier>,
}

/// Path rewrite specification.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HttpPathModifier {
    /// Which rewrite strategy to use
    #[serde(rename = "type")]
    pub modifier_type: PathModifierType,

    /// Full replacement path; used with [`PathModifierType::ReplaceFullPath`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_full_path: Option<String>,

    /// Prefix replacement; used with [`PathModifierType::ReplacePrefixMatch`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_prefix_match: Option<String>,
}

/// Path rewrite strategies.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum PathModifierType {
    /// Replace the entire request path
    ReplaceFullPath,
    /// Replace the prefix matched by a PathPrefix match
    ReplacePrefixMatch,
}

/// Backend a matched request is forwarded to.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HttpBackendRef {
    /// The backend object reference
    #[serde(flatten)]
    pub backend_ref: BackendObjectReference,

    /// Proportion of traffic forwarded to this backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
}
