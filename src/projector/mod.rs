//! Projection of an Ingress onto the Gateway API resource graph
//!
//! [`Projector::project`] is a pure function of the Ingress and the port
//! resolver results: two runs over identical inputs produce identical output,
//! and reordering rules or annotation map iteration does not change any
//! derived name. The projector performs no writes; the reconciler owns all
//! cluster mutation.

mod filters;
mod policies;
pub mod resolver;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use k8s_openapi::api::networking::v1::{HTTPIngressPath, Ingress, IngressBackend};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use tracing::debug;

pub use resolver::{ClientPortResolver, NoopPortResolver, PortResolver};

pub(crate) use crate::annotations::duration::format_gateway as duration_to_gateway_string;

use crate::annotations::AnnotationSet;
use crate::api::{
    BackendObjectReference, BackendTlsPolicy, BackendTrafficPolicy, ClientTrafficPolicy,
    HttpBackendRef, HttpPathMatch, HttpRoute, HttpRouteMatch, HttpRouteRule, HttpRouteSpec,
    ParentReference, PathMatchType, ReferenceGrant, ReferenceGrantFrom, ReferenceGrantSpec,
    ReferenceGrantTo, SecurityPolicy, GATEWAY_API_GROUP,
};
use crate::config::Settings;
use crate::SOURCE_ANNOTATION;

/// The derived resource kinds a projection can emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DerivedKind {
    /// HTTPRoute
    Route,
    /// Envoy Gateway BackendTrafficPolicy
    BackendTraffic,
    /// Envoy Gateway ClientTrafficPolicy
    ClientTraffic,
    /// Envoy Gateway SecurityPolicy
    Security,
    /// Gateway API BackendTLSPolicy
    BackendTls,
    /// Gateway API ReferenceGrant
    Grant,
}

impl DerivedKind {
    /// Kubernetes kind name, for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            DerivedKind::Route => "HTTPRoute",
            DerivedKind::BackendTraffic => "BackendTrafficPolicy",
            DerivedKind::ClientTraffic => "ClientTrafficPolicy",
            DerivedKind::Security => "SecurityPolicy",
            DerivedKind::BackendTls => "BackendTLSPolicy",
            DerivedKind::Grant => "ReferenceGrant",
        }
    }

    /// The kinds that live in the Ingress's own namespace and are
    /// garbage-collected by provenance there.
    pub const NAMESPACED_KINDS: [DerivedKind; 5] = [
        DerivedKind::Route,
        DerivedKind::BackendTraffic,
        DerivedKind::ClientTraffic,
        DerivedKind::Security,
        DerivedKind::BackendTls,
    ];
}

impl std::fmt::Display for DerivedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A derived resource, tagged by kind. The converge and garbage-collection
/// machinery is written once over this sum type.
#[derive(Clone, Debug)]
pub enum Derived {
    /// HTTPRoute
    Route(HttpRoute),
    /// BackendTrafficPolicy
    BackendTraffic(BackendTrafficPolicy),
    /// ClientTrafficPolicy
    ClientTraffic(ClientTrafficPolicy),
    /// SecurityPolicy
    Security(SecurityPolicy),
    /// BackendTLSPolicy
    BackendTls(BackendTlsPolicy),
    /// ReferenceGrant
    Grant(ReferenceGrant),
}

impl Derived {
    /// The kind tag of this resource.
    pub fn kind(&self) -> DerivedKind {
        match self {
            Derived::Route(_) => DerivedKind::Route,
            Derived::BackendTraffic(_) => DerivedKind::BackendTraffic,
            Derived::ClientTraffic(_) => DerivedKind::ClientTraffic,
            Derived::Security(_) => DerivedKind::Security,
            Derived::BackendTls(_) => DerivedKind::BackendTls,
            Derived::Grant(_) => DerivedKind::Grant,
        }
    }

    /// Object metadata of the wrapped resource.
    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Derived::Route(r) => &r.metadata,
            Derived::BackendTraffic(p) => &p.metadata,
            Derived::ClientTraffic(p) => &p.metadata,
            Derived::Security(p) => &p.metadata,
            Derived::BackendTls(p) => &p.metadata,
            Derived::Grant(g) => &g.metadata,
        }
    }

    /// Object name; derived resources always carry one.
    pub fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }

    /// Object namespace.
    pub fn namespace(&self) -> &str {
        self.meta().namespace.as_deref().unwrap_or_default()
    }

    /// Value of the provenance annotation, if present.
    pub fn source(&self) -> Option<&str> {
        self.meta()
            .annotations
            .as_ref()?
            .get(SOURCE_ANNOTATION)
            .map(String::as_str)
    }

    /// Overwrite the desired state (spec, labels, annotations, owner
    /// references) of `self` with that of `desired`, leaving server-managed
    /// metadata untouched. Returns whether anything changed, so unchanged
    /// inputs produce no write.
    pub fn merge_from(&mut self, desired: &Derived) -> bool {
        fn merge<S: PartialEq + Clone>(
            live_meta: &mut ObjectMeta,
            live_spec: &mut S,
            desired_meta: &ObjectMeta,
            desired_spec: &S,
        ) -> bool {
            let mut changed = false;
            if *live_spec != *desired_spec {
                *live_spec = desired_spec.clone();
                changed = true;
            }
            if live_meta.labels != desired_meta.labels {
                live_meta.labels = desired_meta.labels.clone();
                changed = true;
            }
            if live_meta.annotations != desired_meta.annotations {
                live_meta.annotations = desired_meta.annotations.clone();
                changed = true;
            }
            if live_meta.owner_references != desired_meta.owner_references {
                live_meta.owner_references = desired_meta.owner_references.clone();
                changed = true;
            }
            changed
        }

        match (self, desired) {
            (Derived::Route(live), Derived::Route(want)) => {
                merge(&mut live.metadata, &mut live.spec, &want.metadata, &want.spec)
            }
            (Derived::BackendTraffic(live), Derived::BackendTraffic(want)) => {
                merge(&mut live.metadata, &mut live.spec, &want.metadata, &want.spec)
            }
            (Derived::ClientTraffic(live), Derived::ClientTraffic(want)) => {
                merge(&mut live.metadata, &mut live.spec, &want.metadata, &want.spec)
            }
            (Derived::Security(live), Derived::Security(want)) => {
                merge(&mut live.metadata, &mut live.spec, &want.metadata, &want.spec)
            }
            (Derived::BackendTls(live), Derived::BackendTls(want)) => {
                merge(&mut live.metadata, &mut live.spec, &want.metadata, &want.spec)
            }
            (Derived::Grant(live), Derived::Grant(want)) => {
                merge(&mut live.metadata, &mut live.spec, &want.metadata, &want.spec)
            }
            _ => false,
        }
    }
}

/// The complete set of resources derived from one Ingress.
#[derive(Clone, Debug, Default)]
pub struct DerivedSet {
    /// One route per distinct host (plus the default-backend route)
    pub routes: Vec<HttpRoute>,
    /// One per route, when backend-traffic annotations are present
    pub backend_traffic_policies: Vec<BackendTrafficPolicy>,
    /// At most one per Ingress, targeting the gateway
    pub client_traffic_policy: Option<ClientTrafficPolicy>,
    /// One per route, when CORS or external-auth annotations are present
    pub security_policies: Vec<SecurityPolicy>,
    /// One per unique backend service, when the backend serves TLS
    pub backend_tls_policies: Vec<BackendTlsPolicy>,
    /// One per foreign namespace referenced by any backend
    pub reference_grants: Vec<ReferenceGrant>,
}

impl DerivedSet {
    /// All same-namespace resources in converge order: routes first, then
    /// the policies referencing them.
    pub fn namespaced_resources(&self) -> Vec<Derived> {
        let mut out: Vec<Derived> = Vec::new();
        out.extend(self.routes.iter().cloned().map(Derived::Route));
        out.extend(
            self.backend_traffic_policies
                .iter()
                .cloned()
                .map(Derived::BackendTraffic),
        );
        out.extend(
            self.client_traffic_policy
                .iter()
                .cloned()
                .map(Derived::ClientTraffic),
        );
        out.extend(self.security_policies.iter().cloned().map(Derived::Security));
        out.extend(
            self.backend_tls_policies
                .iter()
                .cloned()
                .map(Derived::BackendTls),
        );
        out
    }

    /// Names of the projected resources of one same-namespace kind; the
    /// garbage collector deletes anything by this provenance not named here.
    pub fn names_of(&self, kind: DerivedKind) -> HashSet<String> {
        let names = |metas: Vec<&ObjectMeta>| {
            metas
                .into_iter()
                .filter_map(|m| m.name.clone())
                .collect::<HashSet<_>>()
        };
        match kind {
            DerivedKind::Route => names(self.routes.iter().map(|r| &r.metadata).collect()),
            DerivedKind::BackendTraffic => names(
                self.backend_traffic_policies
                    .iter()
                    .map(|p| &p.metadata)
                    .collect(),
            ),
            DerivedKind::ClientTraffic => names(
                self.client_traffic_policy
                    .iter()
                    .map(|p| &p.metadata)
                    .collect(),
            ),
            DerivedKind::Security => {
                names(self.security_policies.iter().map(|p| &p.metadata).collect())
            }
            DerivedKind::BackendTls => names(
                self.backend_tls_policies
                    .iter()
                    .map(|p| &p.metadata)
                    .collect(),
            ),
            DerivedKind::Grant => names(self.reference_grants.iter().map(|g| &g.metadata).collect()),
        }
    }

    /// `(namespace, name)` keys of the projected ReferenceGrants.
    pub fn grant_keys(&self) -> HashSet<(String, String)> {
        self.reference_grants
            .iter()
            .filter_map(|g| {
                Some((
                    g.metadata.namespace.clone()?,
                    g.metadata.name.clone()?,
                ))
            })
            .collect()
    }
}

/// Pure projection from an Ingress to its derived resources.
pub struct Projector {
    gateway_name: String,
    gateway_namespace: String,
    resolver: Arc<dyn PortResolver>,
}

impl Projector {
    /// Create a projector bound to the configured shared gateway.
    pub fn new(settings: &Settings, resolver: Arc<dyn PortResolver>) -> Self {
        Self {
            gateway_name: settings.gateway_name.clone(),
            gateway_namespace: settings.gateway_namespace.clone(),
            resolver,
        }
    }

    /// Project an Ingress onto its complete derived resource set.
    ///
    /// Must not be invoked concurrently for the same Ingress key; the
    /// reconciler's single-writer-per-key scheduling guarantees this.
    pub async fn project(&self, ingress: &Ingress) -> DerivedSet {
        let annots = AnnotationSet::from_ingress(ingress);
        let namespace = ingress.metadata.namespace.as_deref().unwrap_or_default();
        let ingress_name = ingress.metadata.name.as_deref().unwrap_or_default();
        let mut set = DerivedSet::default();

        // Group rule paths by host, preserving first-appearance order so the
        // output is stable under map-iteration reshuffles.
        let mut host_order: Vec<String> = Vec::new();
        let mut paths_by_host: BTreeMap<String, Vec<&HTTPIngressPath>> = BTreeMap::new();
        if let Some(spec) = &ingress.spec {
            for rule in spec.rules.iter().flatten() {
                let Some(http) = &rule.http else { continue };
                let host = rule.host.clone().unwrap_or_default();
                if !paths_by_host.contains_key(&host) {
                    host_order.push(host.clone());
                }
                paths_by_host
                    .entry(host)
                    .or_default()
                    .extend(http.paths.iter());
            }
        }

        for host in &host_order {
            let paths = &paths_by_host[host];
            let route = self
                .build_route(ingress, host, paths, &annots)
                .await;
            set.routes.push(route);
        }

        // Default backend: only when no rule produced a route.
        if set.routes.is_empty() {
            if let Some(default_backend) =
                ingress.spec.as_ref().and_then(|s| s.default_backend.as_ref())
            {
                let rule = HttpRouteRule {
                    backend_refs: Some(vec![
                        self.backend_ref(namespace, default_backend).await,
                    ]),
                    ..Default::default()
                };
                set.routes.push(HttpRoute {
                    metadata: derived_metadata(ingress, ingress_name),
                    spec: HttpRouteSpec {
                        parent_refs: Some(vec![self.parent_ref()]),
                        hostnames: None,
                        rules: Some(vec![rule]),
                    },
                });
            }
        }

        let route_names: Vec<String> = set
            .routes
            .iter()
            .filter_map(|r| r.metadata.name.clone())
            .collect();
        for route_name in &route_names {
            if let Some(policy) = policies::backend_traffic_policy(ingress, route_name, &annots) {
                set.backend_traffic_policies.push(policy);
            }
            if let Some(policy) = policies::security_policy(ingress, route_name, &annots) {
                set.security_policies.push(policy);
            }
        }

        set.client_traffic_policy =
            policies::client_traffic_policy(ingress, &self.gateway_name, &annots);
        set.backend_tls_policies = policies::backend_tls_policies(ingress, &set.routes, &annots);
        set.reference_grants = reference_grants_for_routes(ingress, &set.routes);

        set
    }

    async fn build_route(
        &self,
        ingress: &Ingress,
        host: &str,
        paths: &[&HTTPIngressPath],
        annots: &AnnotationSet<'_>,
    ) -> HttpRoute {
        let namespace = ingress.metadata.namespace.as_deref().unwrap_or_default();
        let ingress_name = ingress.metadata.name.as_deref().unwrap_or_default();

        let mut rules = Vec::with_capacity(paths.len());
        for path in paths {
            rules.push(self.build_rule(namespace, path, annots).await);
        }

        HttpRoute {
            metadata: derived_metadata(ingress, &route_name(ingress_name, host)),
            spec: HttpRouteSpec {
                parent_refs: Some(vec![self.parent_ref()]),
                hostnames: if host.is_empty() {
                    None
                } else {
                    Some(vec![host.to_string()])
                },
                rules: Some(rules),
            },
        }
    }

    async fn build_rule(
        &self,
        namespace: &str,
        path: &HTTPIngressPath,
        annots: &AnnotationSet<'_>,
    ) -> HttpRouteRule {
        let mut rule = HttpRouteRule::default();
        let original_path = path.path.as_deref().unwrap_or_default();

        if !original_path.is_empty() {
            rule.matches = Some(vec![HttpRouteMatch {
                path: Some(path_match(path, annots)),
            }]);
        }

        let redirecting = if annots.has_route_filters() {
            filters::apply_filters(&mut rule, annots, original_path)
        } else {
            false
        };

        if !redirecting {
            rule.backend_refs = Some(vec![self.backend_ref(namespace, &path.backend).await]);
        }

        rule
    }

    async fn backend_ref(&self, namespace: &str, backend: &IngressBackend) -> HttpBackendRef {
        if let Some(service) = &backend.service {
            let (port_name, port_number) = service
                .port
                .as_ref()
                .map(|p| (p.name.clone().unwrap_or_default(), p.number.unwrap_or(0)))
                .unwrap_or_default();

            let port = match self
                .resolver
                .resolve_port(namespace, &service.name, &port_name, port_number)
                .await
            {
                Ok(port) => Some(port),
                Err(error) => {
                    // The route will fail server-side validation, which beats
                    // silently dropping the backend.
                    debug!(
                        service = %service.name,
                        namespace,
                        %error,
                        "could not resolve backend port, emitting backend without one"
                    );
                    None
                }
            };

            return HttpBackendRef {
                backend_ref: BackendObjectReference {
                    group: Some(String::new()),
                    kind: Some("Service".to_string()),
                    name: service.name.clone(),
                    namespace: None,
                    port,
                },
                weight: None,
            };
        }

        if let Some(resource) = &backend.resource {
            return HttpBackendRef {
                backend_ref: BackendObjectReference {
                    group: Some(resource.api_group.clone().unwrap_or_default()),
                    kind: Some(resource.kind.clone()),
                    name: resource.name.clone(),
                    namespace: None,
                    port: None,
                },
                weight: None,
            };
        }

        HttpBackendRef::default()
    }

    fn parent_ref(&self) -> ParentReference {
        ParentReference {
            group: Some(GATEWAY_API_GROUP.to_string()),
            kind: Some("Gateway".to_string()),
            namespace: Some(self.gateway_namespace.clone()),
            name: self.gateway_name.clone(),
            section_name: None,
            port: None,
        }
    }
}

/// Path match for one Ingress path. Exact stays exact; Prefix and
/// ImplementationSpecific become PathPrefix, or RegularExpression when the
/// use-regex annotation is on.
fn path_match(path: &HTTPIngressPath, annots: &AnnotationSet<'_>) -> HttpPathMatch {
    let match_type = match path.path_type.as_str() {
        "Exact" => PathMatchType::Exact,
        _ if annots.use_regex() => PathMatchType::RegularExpression,
        _ => PathMatchType::PathPrefix,
    };
    HttpPathMatch {
        match_type: Some(match_type),
        value: path.path.clone(),
    }
}

/// Stable route name for a host: the Ingress name alone for the empty host,
/// otherwise the Ingress name plus the sanitized host.
pub fn route_name(ingress_name: &str, host: &str) -> String {
    if host.is_empty() {
        return ingress_name.to_string();
    }
    let sanitized = host.replace('.', "-").replace('*', "wildcard");
    format!("{ingress_name}-{sanitized}")
}

/// `<namespace>/<name>` provenance value of an Ingress.
pub fn source_value(ingress: &Ingress) -> String {
    format!(
        "{}/{}",
        ingress.metadata.namespace.as_deref().unwrap_or_default(),
        ingress.metadata.name.as_deref().unwrap_or_default()
    )
}

/// Metadata for a derived resource in the Ingress's own namespace: copied
/// labels, the provenance annotation and a controller owner reference.
pub(crate) fn derived_metadata(ingress: &Ingress, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: ingress.metadata.namespace.clone(),
        labels: ingress.metadata.labels.clone(),
        annotations: Some(BTreeMap::from([(
            SOURCE_ANNOTATION.to_string(),
            source_value(ingress),
        )])),
        owner_references: Some(vec![OwnerReference {
            api_version: "networking.k8s.io/v1".to_string(),
            kind: "Ingress".to_string(),
            name: ingress.metadata.name.clone().unwrap_or_default(),
            uid: ingress.metadata.uid.clone().unwrap_or_default(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }]),
        ..Default::default()
    }
}

/// ReferenceGrants for every foreign namespace referenced by a backend of
/// the given routes, in first-appearance order. Grants live in the foreign
/// namespace, so cross-namespace ownership is impossible: they carry only
/// the provenance annotation and rely on explicit cleanup.
pub fn reference_grants_for_routes(ingress: &Ingress, routes: &[HttpRoute]) -> Vec<ReferenceGrant> {
    let own_namespace = ingress.metadata.namespace.as_deref().unwrap_or_default();
    let ingress_name = ingress.metadata.name.as_deref().unwrap_or_default();

    let mut foreign: Vec<String> = Vec::new();
    for route in routes {
        for rule in route.spec.rules.as_deref().unwrap_or_default() {
            for backend in rule.backend_refs.as_deref().unwrap_or_default() {
                if let Some(ns) = backend.backend_ref.namespace.as_deref() {
                    if ns != own_namespace && !foreign.iter().any(|f| f == ns) {
                        foreign.push(ns.to_string());
                    }
                }
            }
        }
    }

    foreign
        .into_iter()
        .map(|ns| ReferenceGrant {
            metadata: ObjectMeta {
                name: Some(format!("ingress-{own_namespace}-{ingress_name}")),
                namespace: Some(ns),
                annotations: Some(BTreeMap::from([(
                    SOURCE_ANNOTATION.to_string(),
                    source_value(ingress),
                )])),
                labels: ingress.metadata.labels.clone(),
                ..Default::default()
            },
            spec: ReferenceGrantSpec {
                from: vec![ReferenceGrantFrom {
                    group: GATEWAY_API_GROUP.to_string(),
                    kind: "HTTPRoute".to_string(),
                    namespace: own_namespace.to_string(),
                }],
                to: vec![ReferenceGrantTo {
                    group: String::new(),
                    kind: "Service".to_string(),
                    name: None,
                }],
            },
        })
        .collect()
}
