//! Annotation-driven policy resources
//!
//! Builders for the side-band policy objects attached to derived HTTPRoutes
//! or to the shared Gateway. Each builder returns `None` when its gating
//! predicate is false so the projection stays total.

use k8s_openapi::api::networking::v1::Ingress;
use tracing::debug;
use url::Url;

use crate::annotations::{self, AnnotationSet};
use crate::api::{
    BackendConnection, BackendObjectReference, BackendTlsPolicy, BackendTlsPolicySpec,
    BackendTlsValidation, BackendTrafficPolicy, BackendTrafficPolicySpec, ClientConnection,
    ClientTrafficPolicy, ClientTrafficPolicySpec, ConsistentHash, ConsistentHashType, Cookie,
    Cors, ExtAuth, Header, HttpExtAuthService, HttpRoute, HttpTimeout, LoadBalancer,
    LoadBalancerType, LocalPolicyTargetReference, QueryParam, SecurityPolicy, SecurityPolicySpec,
    Timeout, GATEWAY_API_GROUP, WELL_KNOWN_CA_SYSTEM,
};

use super::{derived_metadata, duration_to_gateway_string};

fn route_target_ref(route_name: &str) -> LocalPolicyTargetReference {
    LocalPolicyTargetReference {
        group: GATEWAY_API_GROUP.to_string(),
        kind: "HTTPRoute".to_string(),
        name: route_name.to_string(),
        section_name: None,
    }
}

/// BackendTrafficPolicy for a route, gated on the timeout / hashing /
/// body-size annotations.
pub(crate) fn backend_traffic_policy(
    ingress: &Ingress,
    route_name: &str,
    annots: &AnnotationSet<'_>,
) -> Option<BackendTrafficPolicy> {
    if !annots.has_backend_traffic_policy() {
        return None;
    }

    let mut spec = BackendTrafficPolicySpec {
        target_ref: Some(route_target_ref(route_name)),
        ..Default::default()
    };

    if annots.has_timeout() {
        spec.timeout = Some(build_timeout(annots));
    }
    if annots.has_load_balancer() {
        spec.load_balancer = build_load_balancer(annots);
    }
    if let Some(body_size) = annots.get_quantity(annotations::PROXY_BODY_SIZE) {
        spec.connection = Some(BackendConnection {
            buffer_limit: Some(body_size),
        });
    }

    Some(BackendTrafficPolicy {
        metadata: derived_metadata(ingress, &format!("{route_name}-backend")),
        spec,
    })
}

/// Request timeout from the proxy timeouts: the larger of read and send wins.
fn build_timeout(annots: &AnnotationSet<'_>) -> Timeout {
    let read = annots.get_raw_duration(annotations::PROXY_READ_TIMEOUT);
    let send = annots.get_raw_duration(annotations::PROXY_SEND_TIMEOUT);

    let request_timeout = match (read, send) {
        (Some(r), Some(s)) => Some(r.max(s)),
        (timeout, None) | (None, timeout) => timeout,
    };

    Timeout {
        http: Some(HttpTimeout {
            request_timeout: request_timeout.map(duration_to_gateway_string),
        }),
    }
}

/// Consistent-hash load balancing from the upstream-hash-by annotation.
/// nginx variable references select the hash source; anything else is taken
/// as a literal header name.
fn build_load_balancer(annots: &AnnotationSet<'_>) -> Option<LoadBalancer> {
    let hash_by = annots.get(annotations::UPSTREAM_HASH_BY)?.trim();

    let consistent_hash = if hash_by == "$remote_addr" || hash_by == "$binary_remote_addr" {
        ConsistentHash {
            hash_type: ConsistentHashType::SourceIP,
            cookie: None,
            headers: None,
            query_params: None,
        }
    } else if let Some(cookie) = hash_by.strip_prefix("$cookie_") {
        ConsistentHash {
            hash_type: ConsistentHashType::Cookie,
            cookie: Some(Cookie {
                name: cookie.to_string(),
            }),
            headers: None,
            query_params: None,
        }
    } else if let Some(header) = hash_by.strip_prefix("$http_") {
        // nginx spells headers with underscores
        ConsistentHash {
            hash_type: ConsistentHashType::Headers,
            cookie: None,
            headers: Some(vec![Header {
                name: header.replace('_', "-"),
            }]),
            query_params: None,
        }
    } else if let Some(param) = hash_by.strip_prefix("$arg_") {
        ConsistentHash {
            hash_type: ConsistentHashType::QueryParams,
            cookie: None,
            headers: None,
            query_params: Some(vec![QueryParam {
                name: param.to_string(),
            }]),
        }
    } else {
        ConsistentHash {
            hash_type: ConsistentHashType::Headers,
            cookie: None,
            headers: Some(vec![Header {
                name: hash_by.to_string(),
            }]),
            query_params: None,
        }
    };

    Some(LoadBalancer {
        lb_type: LoadBalancerType::ConsistentHash,
        consistent_hash: Some(consistent_hash),
    })
}

/// ClientTrafficPolicy for the Ingress, gated on the client buffer
/// annotation. Targets the shared Gateway.
pub(crate) fn client_traffic_policy(
    ingress: &Ingress,
    gateway_name: &str,
    annots: &AnnotationSet<'_>,
) -> Option<ClientTrafficPolicy> {
    if !annots.has_client_traffic_policy() {
        return None;
    }

    let ingress_name = ingress.metadata.name.as_deref().unwrap_or_default();
    let mut spec = ClientTrafficPolicySpec {
        target_ref: Some(LocalPolicyTargetReference {
            group: GATEWAY_API_GROUP.to_string(),
            kind: "Gateway".to_string(),
            name: gateway_name.to_string(),
            section_name: None,
        }),
        connection: None,
    };

    if let Some(buffer_size) = annots.get_quantity(annotations::PROXY_BUFFER_SIZE) {
        spec.connection = Some(ClientConnection {
            buffer_limit: Some(buffer_size),
        });
    }

    Some(ClientTrafficPolicy {
        metadata: derived_metadata(ingress, &format!("{ingress_name}-client")),
        spec,
    })
}

/// SecurityPolicy for a route, gated on the CORS and external-auth
/// annotations.
pub(crate) fn security_policy(
    ingress: &Ingress,
    route_name: &str,
    annots: &AnnotationSet<'_>,
) -> Option<SecurityPolicy> {
    if !annots.has_security_policy() {
        return None;
    }

    let mut spec = SecurityPolicySpec {
        target_ref: Some(route_target_ref(route_name)),
        cors: None,
        ext_auth: None,
    };

    if annots.has_cors() {
        spec.cors = Some(build_cors(annots));
    }
    if annots.has_ext_auth() {
        spec.ext_auth = build_ext_auth(annots);
    }

    Some(SecurityPolicy {
        metadata: derived_metadata(ingress, &format!("{route_name}-security")),
        spec,
    })
}

fn build_cors(annots: &AnnotationSet<'_>) -> Cors {
    Cors {
        allow_origins: annots.get_list(annotations::CORS_ALLOW_ORIGIN),
        allow_methods: annots.get_list(annotations::CORS_ALLOW_METHODS),
        allow_headers: annots.get_list(annotations::CORS_ALLOW_HEADERS),
        expose_headers: annots.get_list(annotations::CORS_EXPOSE_HEADERS),
        max_age: annots.get_duration(annotations::CORS_MAX_AGE),
        allow_credentials: annots.get_bool(annotations::CORS_ALLOW_CREDENTIALS),
    }
}

/// External authorization from the auth-url annotation. Only in-cluster
/// service URLs (`http://service.namespace.svc...`) can be expressed as a
/// backend ref; anything else reads as absent.
fn build_ext_auth(annots: &AnnotationSet<'_>) -> Option<ExtAuth> {
    let auth_url = annots.get(annotations::AUTH_URL)?;

    let parsed = match Url::parse(auth_url) {
        Ok(url) => url,
        Err(e) => {
            debug!(url = auth_url, error = %e, "unparseable auth-url, skipping ExtAuth");
            return None;
        }
    };

    let host_parts: Vec<&str> = parsed.host_str()?.split('.').collect();
    if host_parts.len() < 2 {
        debug!(url = auth_url, "auth-url host is not a service address, skipping ExtAuth");
        return None;
    }

    let port = parsed
        .port()
        .map(i32::from)
        .unwrap_or(if parsed.scheme() == "https" { 443 } else { 80 });

    let backend_ref = BackendObjectReference {
        group: Some(String::new()),
        kind: Some("Service".to_string()),
        name: host_parts[0].to_string(),
        namespace: Some(host_parts[1].to_string()),
        port: Some(port),
    };

    let path = match parsed.path() {
        "" | "/" => None,
        path => Some(path.to_string()),
    };

    Some(ExtAuth {
        http: Some(HttpExtAuthService {
            backend_ref: Some(backend_ref),
            path,
            headers_to_backend: annots.get_list(annotations::AUTH_RESPONSE_HEADERS),
        }),
    })
}

/// BackendTLSPolicies for the unique backend services of the routes, in
/// first-appearance order, gated on `backend-protocol: HTTPS`.
pub(crate) fn backend_tls_policies(
    ingress: &Ingress,
    routes: &[HttpRoute],
    annots: &AnnotationSet<'_>,
) -> Vec<BackendTlsPolicy> {
    if !annots.has_backend_tls() {
        return Vec::new();
    }

    let ingress_name = ingress.metadata.name.as_deref().unwrap_or_default();
    let mut seen: Vec<String> = Vec::new();

    for route in routes {
        for rule in route.spec.rules.as_deref().unwrap_or_default() {
            for backend in rule.backend_refs.as_deref().unwrap_or_default() {
                let is_service = backend
                    .backend_ref
                    .kind
                    .as_deref()
                    .map(|k| k == "Service")
                    .unwrap_or(true);
                let name = &backend.backend_ref.name;
                if is_service && !seen.iter().any(|s| s == name) {
                    seen.push(name.clone());
                }
            }
        }
    }

    seen.into_iter()
        .map(|service| BackendTlsPolicy {
            metadata: derived_metadata(
                ingress,
                &format!("{ingress_name}-{service}-backend-tls"),
            ),
            spec: BackendTlsPolicySpec {
                target_refs: vec![LocalPolicyTargetReference {
                    group: String::new(),
                    kind: "Service".to_string(),
                    name: service.clone(),
                    section_name: None,
                }],
                validation: BackendTlsValidation {
                    well_known_ca_certificates: Some(WELL_KNOWN_CA_SYSTEM.to_string()),
                    hostname: service,
                },
            },
        })
        .collect()
}
