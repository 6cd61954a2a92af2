//! Typed views over nginx Ingress annotations
//!
//! [`AnnotationSet`] wraps the flat annotation map of an Ingress and provides
//! typed, optional getters plus the gating predicates the projector consumes.
//! The contract is best-effort: a malformed value is indistinguishable from an
//! absent one and the projection proceeds without it.

pub mod duration;

use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

/// Common prefix for nginx ingress annotations.
pub const PREFIX: &str = "nginx.ingress.kubernetes.io/";

/// Upstream read timeout.
pub const PROXY_READ_TIMEOUT: &str = "nginx.ingress.kubernetes.io/proxy-read-timeout";
/// Upstream send timeout.
pub const PROXY_SEND_TIMEOUT: &str = "nginx.ingress.kubernetes.io/proxy-send-timeout";
/// Client connection buffer size.
pub const PROXY_BUFFER_SIZE: &str = "nginx.ingress.kubernetes.io/proxy-buffer-size";
/// Maximum request body size.
pub const PROXY_BODY_SIZE: &str = "nginx.ingress.kubernetes.io/proxy-body-size";
/// Consistent-hash key for upstream load balancing.
pub const UPSTREAM_HASH_BY: &str = "nginx.ingress.kubernetes.io/upstream-hash-by";
/// Explicit CORS enable switch.
pub const CORS_ENABLED: &str = "nginx.ingress.kubernetes.io/enable-cors";
/// Allowed CORS origins (comma separated).
pub const CORS_ALLOW_ORIGIN: &str = "nginx.ingress.kubernetes.io/cors-allow-origin";
/// Allowed CORS methods (comma separated).
pub const CORS_ALLOW_METHODS: &str = "nginx.ingress.kubernetes.io/cors-allow-methods";
/// Allowed CORS request headers (comma separated).
pub const CORS_ALLOW_HEADERS: &str = "nginx.ingress.kubernetes.io/cors-allow-headers";
/// CORS headers exposed to the browser (comma separated).
pub const CORS_EXPOSE_HEADERS: &str = "nginx.ingress.kubernetes.io/cors-expose-headers";
/// CORS preflight cache lifetime.
pub const CORS_MAX_AGE: &str = "nginx.ingress.kubernetes.io/cors-max-age";
/// Whether credentialed CORS requests are allowed.
pub const CORS_ALLOW_CREDENTIALS: &str = "nginx.ingress.kubernetes.io/cors-allow-credentials";
/// External authorization endpoint URL.
pub const AUTH_URL: &str = "nginx.ingress.kubernetes.io/auth-url";
/// Sign-in redirect for unauthorized requests.
pub const AUTH_SIGNIN: &str = "nginx.ingress.kubernetes.io/auth-signin";
/// Authorization response headers passed to the backend (comma separated).
pub const AUTH_RESPONSE_HEADERS: &str = "nginx.ingress.kubernetes.io/auth-response-headers";
/// Path rewrite target.
pub const REWRITE_TARGET: &str = "nginx.ingress.kubernetes.io/rewrite-target";
/// Application root redirect for requests to `/`.
pub const APP_ROOT: &str = "nginx.ingress.kubernetes.io/app-root";
/// Redirect plain HTTP to HTTPS.
pub const SSL_REDIRECT: &str = "nginx.ingress.kubernetes.io/ssl-redirect";
/// Interpret paths as regular expressions.
pub const USE_REGEX: &str = "nginx.ingress.kubernetes.io/use-regex";
/// Protocol used towards the backend service.
pub const BACKEND_PROTOCOL: &str = "nginx.ingress.kubernetes.io/backend-protocol";

/// Typed access to the annotation map of an Ingress.
#[derive(Clone, Copy, Debug)]
pub struct AnnotationSet<'a> {
    annotations: Option<&'a BTreeMap<String, String>>,
}

impl<'a> AnnotationSet<'a> {
    /// Create a view over a raw annotation map.
    pub fn new(annotations: Option<&'a BTreeMap<String, String>>) -> Self {
        Self { annotations }
    }

    /// Create a view over an Ingress's annotations.
    pub fn from_ingress(ingress: &'a Ingress) -> Self {
        Self::new(ingress.metadata.annotations.as_ref())
    }

    /// Literal string value of an annotation.
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.annotations?.get(key).map(String::as_str)
    }

    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Annotation value as a Gateway API canonical duration string.
    pub fn get_duration(&self, key: &str) -> Option<String> {
        self.get_raw_duration(key).map(duration::format_gateway)
    }

    /// Annotation value as a parsed duration, for numeric comparison.
    pub fn get_raw_duration(&self, key: &str) -> Option<Duration> {
        duration::parse(self.get(key)?)
    }

    /// Annotation value as a Kubernetes quantity. nginx lower-case size
    /// suffixes (`4k`, `16m`, `2g`) are treated as binary and normalized to
    /// `Ki`/`Mi`/`Gi`.
    pub fn get_quantity(&self, key: &str) -> Option<Quantity> {
        let normalized = normalize_size(self.get(key)?);
        if !is_valid_quantity(&normalized) {
            return None;
        }
        Some(Quantity(normalized))
    }

    /// Annotation value as a boolean. Accepts the `strconv.ParseBool`
    /// spellings; anything else reads as absent.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
            "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
            _ => None,
        }
    }

    /// Annotation value as a comma-separated list, trimmed, empties dropped.
    pub fn get_list(&self, key: &str) -> Option<Vec<String>> {
        let values: Vec<String> = self
            .get(key)?
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect();
        if values.is_empty() {
            return None;
        }
        Some(values)
    }

    // Gating predicates. Each one decides whether a derived resource (or a
    // piece of one) exists in the projection.

    /// Any upstream timeout annotation is present.
    pub fn has_timeout(&self) -> bool {
        self.has(PROXY_READ_TIMEOUT) || self.has(PROXY_SEND_TIMEOUT)
    }

    /// The consistent-hash load balancing annotation is present.
    pub fn has_load_balancer(&self) -> bool {
        self.has(UPSTREAM_HASH_BY)
    }

    /// CORS is configured: the explicit enable switch parses true, or any
    /// CORS configuration key is present.
    pub fn has_cors(&self) -> bool {
        if self.get_bool(CORS_ENABLED) == Some(true) {
            return true;
        }
        [
            CORS_ALLOW_ORIGIN,
            CORS_ALLOW_METHODS,
            CORS_ALLOW_HEADERS,
            CORS_EXPOSE_HEADERS,
            CORS_MAX_AGE,
            CORS_ALLOW_CREDENTIALS,
        ]
        .iter()
        .any(|key| self.has(key))
    }

    /// External authorization is configured.
    pub fn has_ext_auth(&self) -> bool {
        self.has(AUTH_URL)
    }

    /// A rewrite target is configured.
    pub fn has_rewrite(&self) -> bool {
        self.has(REWRITE_TARGET)
    }

    /// An application root is configured.
    pub fn has_app_root(&self) -> bool {
        self.has(APP_ROOT)
    }

    /// HTTP-to-HTTPS redirection is enabled.
    pub fn has_ssl_redirect(&self) -> bool {
        self.get_bool(SSL_REDIRECT) == Some(true)
    }

    /// Regular-expression path interpretation is enabled.
    pub fn use_regex(&self) -> bool {
        self.get_bool(USE_REGEX) == Some(true)
    }

    /// The backend serves TLS. Case-sensitive: only the exact value `HTTPS`.
    pub fn has_backend_tls(&self) -> bool {
        self.get(BACKEND_PROTOCOL) == Some("HTTPS")
    }

    /// Any annotation gating a BackendTrafficPolicy is present.
    pub fn has_backend_traffic_policy(&self) -> bool {
        self.has_timeout() || self.has_load_balancer() || self.has(PROXY_BODY_SIZE)
    }

    /// Any annotation gating a ClientTrafficPolicy is present.
    pub fn has_client_traffic_policy(&self) -> bool {
        self.has(PROXY_BUFFER_SIZE)
    }

    /// Any annotation gating a SecurityPolicy is present.
    pub fn has_security_policy(&self) -> bool {
        self.has_cors() || self.has_ext_auth()
    }

    /// Any annotation producing an HTTPRoute filter is present.
    pub fn has_route_filters(&self) -> bool {
        self.has_rewrite() || self.has_app_root() || self.has_ssl_redirect()
    }
}

/// Convert an nginx size value to Kubernetes quantity notation. Lower-case
/// suffixes are binary in nginx; bare upper-case suffixes gain the `i`.
fn normalize_size(value: &str) -> String {
    let value = value.trim();
    match value.chars().last() {
        Some('k') => format!("{}Ki", &value[..value.len() - 1]),
        Some('m') => format!("{}Mi", &value[..value.len() - 1]),
        Some('g') => format!("{}Gi", &value[..value.len() - 1]),
        Some('K') | Some('M') | Some('G') => format!("{value}i"),
        _ => value.to_string(),
    }
}

/// Structural check that a normalized value parses as a Kubernetes quantity:
/// a decimal number followed by an optional known suffix.
fn is_valid_quantity(value: &str) -> bool {
    let digits_end = value
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(value.len());
    let (number, suffix) = value.split_at(digits_end);
    if number.is_empty() || number.parse::<f64>().is_err() {
        return false;
    }
    matches!(
        suffix,
        "" | "Ki" | "Mi" | "Gi" | "Ti" | "Pi" | "Ei" | "n" | "u" | "m" | "k" | "M" | "G" | "T"
            | "P" | "E"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn get_returns_literal_values_and_absence() {
        let map = annotations(&[(PROXY_READ_TIMEOUT, "30")]);
        let set = AnnotationSet::new(Some(&map));
        assert_eq!(set.get(PROXY_READ_TIMEOUT), Some("30"));
        assert_eq!(set.get(PROXY_SEND_TIMEOUT), None);

        let empty = AnnotationSet::new(None);
        assert_eq!(empty.get(PROXY_READ_TIMEOUT), None);
    }

    #[rstest]
    #[case("30", Some("30s"))]
    #[case("90", Some("1m30s"))]
    #[case("1m30s", Some("1m30s"))]
    #[case("0", Some("0s"))]
    #[case("invalid", None)]
    fn durations_reemit_canonically(#[case] value: &str, #[case] expected: Option<&str>) {
        let map = annotations(&[(PROXY_READ_TIMEOUT, value)]);
        let set = AnnotationSet::new(Some(&map));
        assert_eq!(set.get_duration(PROXY_READ_TIMEOUT).as_deref(), expected);
    }

    #[rstest]
    #[case("4k", Some("4Ki"))]
    #[case("16m", Some("16Mi"))]
    #[case("2g", Some("2Gi"))]
    #[case("4Ki", Some("4Ki"))]
    #[case("16M", Some("16Mi"))]
    #[case("4096", Some("4096"))]
    #[case("notasize", None)]
    #[case("4x", None)]
    fn quantities_accept_nginx_and_kubernetes_forms(
        #[case] value: &str,
        #[case] expected: Option<&str>,
    ) {
        let map = annotations(&[(PROXY_BODY_SIZE, value)]);
        let set = AnnotationSet::new(Some(&map));
        assert_eq!(
            set.get_quantity(PROXY_BODY_SIZE).map(|q| q.0),
            expected.map(str::to_string)
        );
    }

    #[rstest]
    #[case("true", Some(true))]
    #[case("True", Some(true))]
    #[case("1", Some(true))]
    #[case("false", Some(false))]
    #[case("0", Some(false))]
    #[case("yes", None)]
    #[case("", None)]
    fn bools_accept_the_parsebool_spellings(#[case] value: &str, #[case] expected: Option<bool>) {
        let map = annotations(&[(SSL_REDIRECT, value)]);
        let set = AnnotationSet::new(Some(&map));
        assert_eq!(set.get_bool(SSL_REDIRECT), expected);
    }

    #[test]
    fn lists_split_trim_and_drop_empties() {
        let map = annotations(&[(CORS_ALLOW_METHODS, "GET, POST ,PUT,,")]);
        let set = AnnotationSet::new(Some(&map));
        assert_eq!(
            set.get_list(CORS_ALLOW_METHODS),
            Some(vec!["GET".to_string(), "POST".to_string(), "PUT".to_string()])
        );

        let map = annotations(&[(CORS_ALLOW_METHODS, " ,, ")]);
        let set = AnnotationSet::new(Some(&map));
        assert_eq!(set.get_list(CORS_ALLOW_METHODS), None);
    }

    #[test]
    fn cors_presence_covers_enable_switch_and_config_keys() {
        let map = annotations(&[(CORS_ENABLED, "true")]);
        assert!(AnnotationSet::new(Some(&map)).has_cors());

        let map = annotations(&[(CORS_ALLOW_ORIGIN, "https://example.com")]);
        assert!(AnnotationSet::new(Some(&map)).has_cors());

        // An explicit "false" without config keys does not enable CORS.
        let map = annotations(&[(CORS_ENABLED, "false")]);
        assert!(!AnnotationSet::new(Some(&map)).has_cors());

        assert!(!AnnotationSet::new(None).has_cors());
    }

    #[rstest]
    #[case("HTTPS", true)]
    #[case("https", false)]
    #[case("HTTP", false)]
    #[case("GRPC", false)]
    fn backend_tls_requires_exact_https(#[case] value: &str, #[case] expected: bool) {
        let map = annotations(&[(BACKEND_PROTOCOL, value)]);
        assert_eq!(AnnotationSet::new(Some(&map)).has_backend_tls(), expected);
    }

    #[test]
    fn policy_predicates_gate_on_their_annotation_families() {
        let map = annotations(&[(PROXY_SEND_TIMEOUT, "10")]);
        let set = AnnotationSet::new(Some(&map));
        assert!(set.has_timeout());
        assert!(set.has_backend_traffic_policy());
        assert!(!set.has_client_traffic_policy());
        assert!(!set.has_security_policy());

        let map = annotations(&[(PROXY_BUFFER_SIZE, "8k")]);
        let set = AnnotationSet::new(Some(&map));
        assert!(set.has_client_traffic_policy());
        assert!(!set.has_backend_traffic_policy());

        let map = annotations(&[(AUTH_URL, "http://auth.default.svc.cluster.local")]);
        let set = AnnotationSet::new(Some(&map));
        assert!(set.has_ext_auth());
        assert!(set.has_security_policy());
    }

    #[test]
    fn ssl_redirect_requires_a_true_value() {
        let map = annotations(&[(SSL_REDIRECT, "true")]);
        assert!(AnnotationSet::new(Some(&map)).has_ssl_redirect());

        let map = annotations(&[(SSL_REDIRECT, "false")]);
        assert!(!AnnotationSet::new(Some(&map)).has_ssl_redirect());

        let map = annotations(&[(SSL_REDIRECT, "banana")]);
        let set = AnnotationSet::new(Some(&map));
        assert!(!set.has_ssl_redirect());
        // Malformed, so it also does not count as a route filter source.
        assert!(!set.has_route_filters());
    }
}
