//! Ingress reconciler
//!
//! Level-triggered control loop over one Ingress key at a time: filter by
//! class, manage the finalizer, project the desired derived state, converge
//! every derived resource, garbage-collect stale offspring by provenance and
//! reflect the gateway's address into the Ingress status.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::networking::v1::{Ingress, IngressLoadBalancerIngress};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use crate::api::{
    BackendTlsPolicy, BackendTrafficPolicy, ClientTrafficPolicy, Gateway, HttpRoute,
    ReferenceGrant, SecurityPolicy, HOSTNAME_ADDRESS_TYPE,
};
use crate::config::Settings;
use crate::metrics;
use crate::projector::{
    source_value, ClientPortResolver, Derived, DerivedKind, DerivedSet, Projector,
};
use crate::{Error, Result, FINALIZER, LEGACY_CLASS_ANNOTATION};

/// Requeue delay for optimistic-concurrency conflicts and finalizer churn.
const REQUEUE_SOON: Duration = Duration::from_secs(1);

/// Requeue delay for writes the API server rejects as invalid; nothing will
/// change until the Ingress spec does, so back far off.
const PERMANENT_RETRY_DELAY: Duration = Duration::from_secs(300);

/// Typed object store over the resources the reconciler reads and writes.
///
/// This is the only seam between the reconciler and the cluster, so tests
/// can drive the whole state machine against a mock.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read one derived resource by kind, namespace and name.
    async fn get_derived(
        &self,
        kind: DerivedKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Derived>>;

    /// Create a derived resource.
    async fn create_derived(&self, resource: &Derived) -> Result<()>;

    /// Replace a derived resource from a freshly-read live object.
    async fn update_derived(&self, resource: &Derived) -> Result<()>;

    /// Delete one derived resource by kind, namespace and name.
    async fn delete_derived(&self, kind: DerivedKind, namespace: &str, name: &str) -> Result<()>;

    /// List derived resources of one kind, in a namespace or across all.
    async fn list_derived<'a>(
        &self,
        kind: DerivedKind,
        namespace: Option<&'a str>,
    ) -> Result<Vec<Derived>>;

    /// Read the shared gateway.
    async fn get_gateway(&self, namespace: &str, name: &str) -> Result<Option<Gateway>>;

    /// Replace the finalizer list of an Ingress via a merge patch, leaving
    /// unrelated fields untouched.
    async fn patch_ingress_finalizers(
        &self,
        namespace: &str,
        name: &str,
        finalizers: &[String],
    ) -> Result<()>;

    /// Write the load-balancer address list through the status subresource.
    async fn update_ingress_status(
        &self,
        namespace: &str,
        name: &str,
        addresses: &[IngressLoadBalancerIngress],
    ) -> Result<()>;
}

/// [`ObjectStore`] backed by the cluster API.
pub struct KubeObjectStore {
    client: Client,
}

impl KubeObjectStore {
    /// Create a store using the given client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    async fn get_in<K>(&self, namespace: &str, name: &str) -> Result<Option<K>>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + std::fmt::Debug,
    {
        self.api::<K>(Some(namespace))
            .get_opt(name)
            .await
            .map_err(Error::Kube)
    }

    async fn create_in<K>(&self, resource: &K) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Serialize
            + std::fmt::Debug,
    {
        let namespace = resource
            .meta()
            .namespace
            .clone()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        self.api::<K>(Some(&namespace))
            .create(&PostParams::default(), resource)
            .await
            .map(|_| ())
            .map_err(Error::Kube)
    }

    async fn replace_in<K>(&self, resource: &K) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Serialize
            + std::fmt::Debug,
    {
        let namespace = resource
            .meta()
            .namespace
            .clone()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        let name = resource
            .meta()
            .name
            .clone()
            .ok_or(Error::MissingObjectKey(".metadata.name"))?;
        self.api::<K>(Some(&namespace))
            .replace(&name, &PostParams::default(), resource)
            .await
            .map(|_| ())
            .map_err(Error::Kube)
    }

    async fn delete_in<K>(&self, namespace: &str, name: &str) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + std::fmt::Debug,
    {
        self.api::<K>(Some(namespace))
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(Error::Kube)
    }

    async fn list_in<K>(&self, namespace: Option<&str>) -> Result<Vec<K>>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + std::fmt::Debug,
    {
        self.api::<K>(namespace)
            .list(&ListParams::default())
            .await
            .map(|list| list.items)
            .map_err(Error::Kube)
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get_derived(
        &self,
        kind: DerivedKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Derived>> {
        Ok(match kind {
            DerivedKind::Route => self
                .get_in::<HttpRoute>(namespace, name)
                .await?
                .map(Derived::Route),
            DerivedKind::BackendTraffic => self
                .get_in::<BackendTrafficPolicy>(namespace, name)
                .await?
                .map(Derived::BackendTraffic),
            DerivedKind::ClientTraffic => self
                .get_in::<ClientTrafficPolicy>(namespace, name)
                .await?
                .map(Derived::ClientTraffic),
            DerivedKind::Security => self
                .get_in::<SecurityPolicy>(namespace, name)
                .await?
                .map(Derived::Security),
            DerivedKind::BackendTls => self
                .get_in::<BackendTlsPolicy>(namespace, name)
                .await?
                .map(Derived::BackendTls),
            DerivedKind::Grant => self
                .get_in::<ReferenceGrant>(namespace, name)
                .await?
                .map(Derived::Grant),
        })
    }

    async fn create_derived(&self, resource: &Derived) -> Result<()> {
        match resource {
            Derived::Route(r) => self.create_in(r).await,
            Derived::BackendTraffic(p) => self.create_in(p).await,
            Derived::ClientTraffic(p) => self.create_in(p).await,
            Derived::Security(p) => self.create_in(p).await,
            Derived::BackendTls(p) => self.create_in(p).await,
            Derived::Grant(g) => self.create_in(g).await,
        }
    }

    async fn update_derived(&self, resource: &Derived) -> Result<()> {
        match resource {
            Derived::Route(r) => self.replace_in(r).await,
            Derived::BackendTraffic(p) => self.replace_in(p).await,
            Derived::ClientTraffic(p) => self.replace_in(p).await,
            Derived::Security(p) => self.replace_in(p).await,
            Derived::BackendTls(p) => self.replace_in(p).await,
            Derived::Grant(g) => self.replace_in(g).await,
        }
    }

    async fn delete_derived(&self, kind: DerivedKind, namespace: &str, name: &str) -> Result<()> {
        match kind {
            DerivedKind::Route => self.delete_in::<HttpRoute>(namespace, name).await,
            DerivedKind::BackendTraffic => {
                self.delete_in::<BackendTrafficPolicy>(namespace, name).await
            }
            DerivedKind::ClientTraffic => {
                self.delete_in::<ClientTrafficPolicy>(namespace, name).await
            }
            DerivedKind::Security => self.delete_in::<SecurityPolicy>(namespace, name).await,
            DerivedKind::BackendTls => self.delete_in::<BackendTlsPolicy>(namespace, name).await,
            DerivedKind::Grant => self.delete_in::<ReferenceGrant>(namespace, name).await,
        }
    }

    async fn list_derived<'a>(
        &self,
        kind: DerivedKind,
        namespace: Option<&'a str>,
    ) -> Result<Vec<Derived>> {
        Ok(match kind {
            DerivedKind::Route => self
                .list_in::<HttpRoute>(namespace)
                .await?
                .into_iter()
                .map(Derived::Route)
                .collect(),
            DerivedKind::BackendTraffic => self
                .list_in::<BackendTrafficPolicy>(namespace)
                .await?
                .into_iter()
                .map(Derived::BackendTraffic)
                .collect(),
            DerivedKind::ClientTraffic => self
                .list_in::<ClientTrafficPolicy>(namespace)
                .await?
                .into_iter()
                .map(Derived::ClientTraffic)
                .collect(),
            DerivedKind::Security => self
                .list_in::<SecurityPolicy>(namespace)
                .await?
                .into_iter()
                .map(Derived::Security)
                .collect(),
            DerivedKind::BackendTls => self
                .list_in::<BackendTlsPolicy>(namespace)
                .await?
                .into_iter()
                .map(Derived::BackendTls)
                .collect(),
            DerivedKind::Grant => self
                .list_in::<ReferenceGrant>(namespace)
                .await?
                .into_iter()
                .map(Derived::Grant)
                .collect(),
        })
    }

    async fn get_gateway(&self, namespace: &str, name: &str) -> Result<Option<Gateway>> {
        self.get_in::<Gateway>(namespace, name).await
    }

    async fn patch_ingress_finalizers(
        &self,
        namespace: &str,
        name: &str,
        finalizers: &[String],
    ) -> Result<()> {
        let api: Api<Ingress> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map(|_| ())
            .map_err(Error::Kube)
    }

    async fn update_ingress_status(
        &self,
        namespace: &str,
        name: &str,
        addresses: &[IngressLoadBalancerIngress],
    ) -> Result<()> {
        let api: Api<Ingress> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({
            "status": { "loadBalancer": { "ingress": addresses } }
        });
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map(|_| ())
            .map_err(Error::Kube)
    }
}

/// Controller context shared across reconciliation calls.
pub struct Context {
    /// Object store for all cluster reads and writes
    pub store: Arc<dyn ObjectStore>,
    /// The pure projection kernel
    pub projector: Projector,
    /// Process configuration
    pub settings: Settings,
}

impl Context {
    /// Create a context backed by the cluster API.
    pub fn new(client: Client, settings: Settings) -> Self {
        let resolver = Arc::new(ClientPortResolver::new(client.clone()));
        Self {
            store: Arc::new(KubeObjectStore::new(client)),
            projector: Projector::new(&settings, resolver),
            settings,
        }
    }

    /// Create a context with a custom store and projector, for tests.
    pub fn with_store(store: Arc<dyn ObjectStore>, projector: Projector, settings: Settings) -> Self {
        Self {
            store,
            projector,
            settings,
        }
    }
}

/// Reconcile one Ingress.
///
/// The runtime guarantees at most one invocation per key at a time; distinct
/// keys reconcile in parallel.
#[instrument(skip(ingress, ctx), fields(ingress = %ingress.name_any(), namespace = %ingress.namespace().unwrap_or_default()))]
pub async fn reconcile(ingress: Arc<Ingress>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = ingress
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let name = ingress.name_any();
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&[namespace.as_str()])
        .start_timer();

    if !should_process(&ingress, &ctx.settings.ingress_class) {
        debug!(
            class = %effective_class(&ingress),
            filter = %ctx.settings.ingress_class,
            "ingress class does not match filter, skipping"
        );
        metrics::RECONCILIATIONS_TOTAL
            .with_label_values(&["skipped"])
            .inc();
        return Ok(Action::await_change());
    }

    if ingress.meta().deletion_timestamp.is_some() {
        return handle_deletion(&ingress, &ctx, &namespace, &name).await;
    }

    if !ingress.finalizers().iter().any(|f| f == FINALIZER) {
        let mut finalizers = ingress.finalizers().to_vec();
        finalizers.push(FINALIZER.to_string());
        return match ctx
            .store
            .patch_ingress_finalizers(&namespace, &name, &finalizers)
            .await
        {
            Ok(()) => Ok(Action::requeue(REQUEUE_SOON)),
            Err(e) if e.is_conflict() => {
                debug!("conflict adding finalizer, will retry");
                Ok(Action::requeue(REQUEUE_SOON))
            }
            Err(e) => Err(e),
        };
    }

    let projection = ctx.projector.project(&ingress).await;

    // Routes converge before the policies that reference them; grants before
    // the status update.
    for desired in projection.namespaced_resources() {
        if let Err(e) = converge(ctx.store.as_ref(), &desired).await {
            if e.is_invalid() {
                warn!(
                    kind = %desired.kind(),
                    resource = desired.name(),
                    error = %e,
                    "derived resource rejected by the API server, backing off"
                );
                metrics::RECONCILIATIONS_TOTAL
                    .with_label_values(&["permanent_error"])
                    .inc();
                return Ok(Action::requeue(PERMANENT_RETRY_DELAY));
            }
            return Err(e);
        }
    }

    reconcile_reference_grants(ctx.store.as_ref(), &ingress, &projection).await?;
    garbage_collect(ctx.store.as_ref(), &ingress, &namespace, &projection).await?;

    // Best effort: an unreachable gateway or racing status writer never
    // fails the reconcile.
    if let Err(e) = reflect_gateway_address(&ctx, &ingress, &namespace, &name).await {
        if e.is_conflict() {
            debug!("conflict updating ingress status, will re-converge on the next event");
        } else {
            error!(error = %e, "failed to update ingress status");
        }
    }

    info!(
        routes = projection.routes.len(),
        backend_traffic_policies = projection.backend_traffic_policies.len(),
        security_policies = projection.security_policies.len(),
        backend_tls_policies = projection.backend_tls_policies.len(),
        reference_grants = projection.reference_grants.len(),
        has_client_traffic_policy = projection.client_traffic_policy.is_some(),
        "reconciled ingress"
    );
    metrics::RECONCILIATIONS_TOTAL
        .with_label_values(&["success"])
        .inc();
    Ok(Action::await_change())
}

/// Error policy for the controller: transient failures requeue with backoff.
pub fn error_policy(ingress: Arc<Ingress>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ingress = %ingress.name_any(),
        %error,
        "reconciliation failed"
    );
    metrics::RECONCILIATIONS_TOTAL
        .with_label_values(&["error"])
        .inc();
    Action::requeue(Duration::from_secs(5))
}

/// Whether the Ingress passes the configured class filter.
fn should_process(ingress: &Ingress, class_filter: &str) -> bool {
    if class_filter.is_empty() {
        return true;
    }
    effective_class(ingress) == class_filter
}

/// Effective class of an Ingress: `spec.ingressClassName` wins over the
/// legacy annotation; absent reads as empty.
fn effective_class(ingress: &Ingress) -> String {
    if let Some(class) = ingress
        .spec
        .as_ref()
        .and_then(|s| s.ingress_class_name.clone())
    {
        return class;
    }
    ingress
        .annotations()
        .get(LEGACY_CLASS_ANNOTATION)
        .cloned()
        .unwrap_or_default()
}

/// Create-or-update one derived resource. Reads the live object first and
/// only writes when the desired state differs.
async fn converge(store: &dyn ObjectStore, desired: &Derived) -> Result<()> {
    let kind = desired.kind();
    let namespace = desired.namespace().to_string();
    let name = desired.name().to_string();

    match store.get_derived(kind, &namespace, &name).await? {
        None => {
            store.create_derived(desired).await?;
            info!(%kind, resource = %name, "created derived resource");
        }
        Some(mut live) => {
            if live.merge_from(desired) {
                store.update_derived(&live).await?;
                info!(%kind, resource = %name, "updated derived resource");
            } else {
                debug!(%kind, resource = %name, "derived resource already converged");
            }
        }
    }
    Ok(())
}

/// Converge ReferenceGrants in their foreign namespaces and delete grants
/// whose namespace the projection no longer references. Grants carry no
/// owner reference, so this cleanup is the only thing keeping them bounded.
async fn reconcile_reference_grants(
    store: &dyn ObjectStore,
    ingress: &Ingress,
    projection: &DerivedSet,
) -> Result<()> {
    for grant in &projection.reference_grants {
        converge(store, &Derived::Grant(grant.clone())).await?;
    }

    let wanted = projection.grant_keys();
    let source = source_value(ingress);
    for live in store.list_derived(DerivedKind::Grant, None).await? {
        if live.source() != Some(source.as_str()) {
            continue;
        }
        let key = (live.namespace().to_string(), live.name().to_string());
        if !wanted.contains(&key) {
            delete_ignoring_missing(store, DerivedKind::Grant, &key.0, &key.1).await?;
            info!(namespace = %key.0, resource = %key.1, "deleted stale reference grant");
        }
    }
    Ok(())
}

/// Delete, by provenance, every same-namespace derived resource whose name
/// the current projection does not produce. This is what removes offspring
/// when an annotation flips off while the Ingress lives on.
async fn garbage_collect(
    store: &dyn ObjectStore,
    ingress: &Ingress,
    namespace: &str,
    projection: &DerivedSet,
) -> Result<()> {
    let source = source_value(ingress);
    for kind in DerivedKind::NAMESPACED_KINDS {
        let wanted = projection.names_of(kind);
        for live in store.list_derived(kind, Some(namespace)).await? {
            if live.source() != Some(source.as_str()) {
                continue;
            }
            if !wanted.contains(live.name()) {
                delete_ignoring_missing(store, kind, namespace, live.name()).await?;
                info!(%kind, resource = live.name(), "garbage-collected stale derived resource");
            }
        }
    }
    Ok(())
}

async fn delete_ignoring_missing(
    store: &dyn ObjectStore,
    kind: DerivedKind,
    namespace: &str,
    name: &str,
) -> Result<()> {
    match store.delete_derived(kind, namespace, name).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}

/// Finalizer-driven deletion: remove every derived resource carrying this
/// Ingress's provenance (including cross-namespace grants), then release the
/// finalizer.
async fn handle_deletion(
    ingress: &Ingress,
    ctx: &Context,
    namespace: &str,
    name: &str,
) -> Result<Action> {
    if !ingress.finalizers().iter().any(|f| f == FINALIZER) {
        return Ok(Action::await_change());
    }

    let source = source_value(ingress);
    for kind in DerivedKind::NAMESPACED_KINDS {
        for live in ctx.store.list_derived(kind, Some(namespace)).await? {
            if live.source() == Some(source.as_str()) {
                delete_ignoring_missing(ctx.store.as_ref(), kind, namespace, live.name()).await?;
                info!(%kind, resource = live.name(), "deleted derived resource");
            }
        }
    }

    for live in ctx.store.list_derived(DerivedKind::Grant, None).await? {
        if live.source() == Some(source.as_str()) {
            delete_ignoring_missing(
                ctx.store.as_ref(),
                DerivedKind::Grant,
                live.namespace(),
                live.name(),
            )
            .await?;
            info!(
                namespace = live.namespace(),
                resource = live.name(),
                "deleted reference grant"
            );
        }
    }

    let finalizers: Vec<String> = ingress
        .finalizers()
        .iter()
        .filter(|f| f.as_str() != FINALIZER)
        .cloned()
        .collect();
    match ctx
        .store
        .patch_ingress_finalizers(namespace, name, &finalizers)
        .await
    {
        Ok(()) => {
            info!("finalizer removed, cleanup complete");
            Ok(Action::await_change())
        }
        Err(e) if e.is_conflict() => {
            debug!("conflict removing finalizer, will retry");
            Ok(Action::requeue(REQUEUE_SOON))
        }
        Err(e) => Err(e),
    }
}

/// Translate the gateway's advertised addresses into the Ingress
/// load-balancer status and write it when it changed.
async fn reflect_gateway_address(
    ctx: &Context,
    ingress: &Ingress,
    namespace: &str,
    name: &str,
) -> Result<()> {
    let Some(gateway) = ctx
        .store
        .get_gateway(&ctx.settings.gateway_namespace, &ctx.settings.gateway_name)
        .await?
    else {
        debug!("gateway not found, skipping status update");
        return Ok(());
    };

    let addresses: Vec<IngressLoadBalancerIngress> = gateway
        .status
        .and_then(|s| s.addresses)
        .unwrap_or_default()
        .into_iter()
        .map(|addr| {
            if addr.address_type.as_deref() == Some(HOSTNAME_ADDRESS_TYPE) {
                IngressLoadBalancerIngress {
                    hostname: Some(addr.value),
                    ..Default::default()
                }
            } else {
                IngressLoadBalancerIngress {
                    ip: Some(addr.value),
                    ..Default::default()
                }
            }
        })
        .collect();

    let current = ingress
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_deref())
        .unwrap_or_default();

    if addresses_equal(current, &addresses) {
        return Ok(());
    }

    ctx.store
        .update_ingress_status(namespace, name, &addresses)
        .await
}

fn addresses_equal(a: &[IngressLoadBalancerIngress], b: &[IngressLoadBalancerIngress]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|(x, y)| x.ip == y.ip && x.hostname == y.hostname)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{GatewaySpec, GatewayStatus, GatewayStatusAddress, SecurityPolicy};
    use crate::projector::NoopPortResolver;
    use clap::Parser;
    use k8s_openapi::api::networking::v1::{
        HTTPIngressPath, HTTPIngressRuleValue, IngressBackend, IngressRule,
        IngressServiceBackend, IngressSpec, IngressStatus, IngressLoadBalancerStatus,
        ServiceBackendPort,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use std::collections::BTreeMap;

    fn settings() -> Settings {
        Settings::parse_from(["ingress-gateway-api"])
    }

    fn settings_with_class(class: &str) -> Settings {
        Settings::parse_from(["ingress-gateway-api", "--ingress-class", class])
    }

    fn test_context(store: MockObjectStore, settings: Settings) -> Arc<Context> {
        let projector = Projector::new(&settings, Arc::new(NoopPortResolver));
        Arc::new(Context::with_store(Arc::new(store), projector, settings))
    }

    /// One host (example.com), one prefix path backed by api-service:80.
    fn sample_ingress(finalized: bool) -> Ingress {
        Ingress {
            metadata: ObjectMeta {
                name: Some("test-ingress".to_string()),
                namespace: Some("default".to_string()),
                uid: Some("uid-1234".to_string()),
                finalizers: finalized.then(|| vec![FINALIZER.to_string()]),
                ..Default::default()
            },
            spec: Some(IngressSpec {
                rules: Some(vec![IngressRule {
                    host: Some("example.com".to_string()),
                    http: Some(HTTPIngressRuleValue {
                        paths: vec![HTTPIngressPath {
                            path: Some("/api".to_string()),
                            path_type: "Prefix".to_string(),
                            backend: IngressBackend {
                                service: Some(IngressServiceBackend {
                                    name: "api-service".to_string(),
                                    port: Some(ServiceBackendPort {
                                        number: Some(80),
                                        name: None,
                                    }),
                                }),
                                resource: None,
                            },
                        }],
                    }),
                }]),
                ..Default::default()
            }),
            status: None,
        }
    }

    fn api_error(code: u16, reason: &str) -> Error {
        Error::Kube(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: reason.to_string(),
            reason: reason.to_string(),
            code,
        }))
    }

    fn provenance() -> BTreeMap<String, String> {
        BTreeMap::from([(
            crate::SOURCE_ANNOTATION.to_string(),
            "default/test-ingress".to_string(),
        )])
    }

    // ===== Finalizer state machine =====

    /// Story: a newly observed Ingress first gets the finalizer, then the
    /// reconcile requeues to re-enter with the finalizer present.
    #[tokio::test]
    async fn story_new_ingress_gets_the_finalizer_first() {
        let mut store = MockObjectStore::new();
        store
            .expect_patch_ingress_finalizers()
            .withf(|ns, name, finalizers| {
                ns == "default"
                    && name == "test-ingress"
                    && finalizers.iter().any(|f| f == FINALIZER)
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let ctx = test_context(store, settings());
        let action = reconcile(Arc::new(sample_ingress(false)), ctx)
            .await
            .expect("reconcile should succeed");

        assert_eq!(action, Action::requeue(REQUEUE_SOON));
    }

    /// Story: a racing writer bumped the Ingress while we added the
    /// finalizer; the conflict turns into a prompt retry, not a failure.
    #[tokio::test]
    async fn story_finalizer_conflict_requeues_soon() {
        let mut store = MockObjectStore::new();
        store
            .expect_patch_ingress_finalizers()
            .returning(|_, _, _| Err(api_error(409, "Conflict")));

        let ctx = test_context(store, settings());
        let action = reconcile(Arc::new(sample_ingress(false)), ctx)
            .await
            .expect("conflict must not surface as an error");

        assert_eq!(action, Action::requeue(REQUEUE_SOON));
    }

    // ===== Class filtering =====

    /// Story: with a class filter configured, an Ingress of another class is
    /// left completely untouched.
    #[tokio::test]
    async fn story_non_matching_class_is_ignored() {
        let store = MockObjectStore::new();
        let ctx = test_context(store, settings_with_class("nginx"));

        let mut ingress = sample_ingress(false);
        ingress.spec.as_mut().unwrap().ingress_class_name = Some("other".to_string());

        let action = reconcile(Arc::new(ingress), ctx).await.unwrap();
        assert_eq!(action, Action::await_change());
    }

    /// Story: the legacy class annotation still counts when the spec field
    /// is absent, and the spec field wins when both are set.
    #[tokio::test]
    async fn story_legacy_class_annotation_is_honored() {
        // Annotation matches: processing starts (finalizer patch observed).
        let mut store = MockObjectStore::new();
        store
            .expect_patch_ingress_finalizers()
            .times(1)
            .returning(|_, _, _| Ok(()));
        let ctx = test_context(store, settings_with_class("nginx"));

        let mut ingress = sample_ingress(false);
        ingress.metadata.annotations = Some(BTreeMap::from([(
            LEGACY_CLASS_ANNOTATION.to_string(),
            "nginx".to_string(),
        )]));
        let action = reconcile(Arc::new(ingress), ctx).await.unwrap();
        assert_eq!(action, Action::requeue(REQUEUE_SOON));

        // Spec field takes precedence over the annotation.
        let store = MockObjectStore::new();
        let ctx = test_context(store, settings_with_class("nginx"));
        let mut ingress = sample_ingress(false);
        ingress.spec.as_mut().unwrap().ingress_class_name = Some("other".to_string());
        ingress.metadata.annotations = Some(BTreeMap::from([(
            LEGACY_CLASS_ANNOTATION.to_string(),
            "nginx".to_string(),
        )]));
        let action = reconcile(Arc::new(ingress), ctx).await.unwrap();
        assert_eq!(action, Action::await_change());
    }

    // ===== Convergence =====

    /// Story: with nothing live, one reconcile creates exactly the projected
    /// resources - here a single HTTPRoute - and nothing else.
    #[tokio::test]
    async fn story_converge_creates_the_projection() {
        let mut store = MockObjectStore::new();
        store.expect_get_derived().returning(|_, _, _| Ok(None));
        store
            .expect_create_derived()
            .withf(|resource| {
                matches!(resource, Derived::Route(_))
                    && resource.name() == "test-ingress-example-com"
                    && resource.namespace() == "default"
            })
            .times(1)
            .returning(|_| Ok(()));
        store.expect_list_derived().returning(|_, _| Ok(vec![]));
        store.expect_get_gateway().returning(|_, _| Ok(None));

        let ctx = test_context(store, settings());
        let action = reconcile(Arc::new(sample_ingress(true)), ctx).await.unwrap();

        assert_eq!(action, Action::await_change());
    }

    /// Story: a second reconcile with unchanged inputs performs no
    /// spec-changing writes at all (no create, no update, no delete).
    #[tokio::test]
    async fn story_unchanged_reconcile_writes_nothing() {
        let ingress = sample_ingress(true);
        let projector = Projector::new(&settings(), Arc::new(NoopPortResolver));
        let live_route = projector.project(&ingress).await.routes[0].clone();

        let mut store = MockObjectStore::new();
        store
            .expect_get_derived()
            .returning(move |_, _, _| Ok(Some(Derived::Route(live_route.clone()))));
        store.expect_list_derived().returning(|_, _| Ok(vec![]));
        store.expect_get_gateway().returning(|_, _| Ok(None));
        // No expect_create_derived / expect_update_derived / expect_delete_derived:
        // any write would panic the mock.

        let ctx = test_context(store, settings());
        let action = reconcile(Arc::new(ingress), ctx).await.unwrap();
        assert_eq!(action, Action::await_change());
    }

    /// Story: an annotation flipped off. The projection no longer contains
    /// the SecurityPolicy, so the garbage collector deletes the live one by
    /// provenance while the route is left alone.
    #[tokio::test]
    async fn story_annotation_flip_deletes_stale_policy() {
        let stale = SecurityPolicy {
            metadata: ObjectMeta {
                name: Some("test-ingress-example-com-security".to_string()),
                namespace: Some("default".to_string()),
                annotations: Some(provenance()),
                ..Default::default()
            },
            spec: Default::default(),
        };

        let mut store = MockObjectStore::new();
        store.expect_get_derived().returning(|_, _, _| Ok(None));
        store.expect_create_derived().returning(|_| Ok(()));
        store
            .expect_list_derived()
            .returning(move |kind, _| match kind {
                DerivedKind::Security => Ok(vec![Derived::Security(stale.clone())]),
                _ => Ok(vec![]),
            });
        store
            .expect_delete_derived()
            .withf(|kind, ns, name| {
                *kind == DerivedKind::Security
                    && ns == "default"
                    && name == "test-ingress-example-com-security"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        store.expect_get_gateway().returning(|_, _| Ok(None));

        let ctx = test_context(store, settings());
        let action = reconcile(Arc::new(sample_ingress(true)), ctx).await.unwrap();
        assert_eq!(action, Action::await_change());
    }

    /// Story: resources of the same kinds owned by a different Ingress are
    /// never touched by the garbage collector.
    #[tokio::test]
    async fn story_gc_leaves_foreign_provenance_alone() {
        let foreign = SecurityPolicy {
            metadata: ObjectMeta {
                name: Some("somebody-elses-policy".to_string()),
                namespace: Some("default".to_string()),
                annotations: Some(BTreeMap::from([(
                    crate::SOURCE_ANNOTATION.to_string(),
                    "default/other-ingress".to_string(),
                )])),
                ..Default::default()
            },
            spec: Default::default(),
        };

        let mut store = MockObjectStore::new();
        store.expect_get_derived().returning(|_, _, _| Ok(None));
        store.expect_create_derived().returning(|_| Ok(()));
        store
            .expect_list_derived()
            .returning(move |kind, _| match kind {
                DerivedKind::Security => Ok(vec![Derived::Security(foreign.clone())]),
                _ => Ok(vec![]),
            });
        store.expect_get_gateway().returning(|_, _| Ok(None));
        // No expect_delete_derived: deleting the foreign policy would panic.

        let ctx = test_context(store, settings());
        reconcile(Arc::new(sample_ingress(true)), ctx).await.unwrap();
    }

    // ===== Error handling =====

    /// Story: the API server rejects a structurally invalid derived resource.
    /// The reconcile backs off for five minutes instead of hammering the
    /// queue with a write that cannot succeed.
    #[tokio::test]
    async fn story_invalid_derived_resource_backs_off() {
        let mut store = MockObjectStore::new();
        store.expect_get_derived().returning(|_, _, _| Ok(None));
        store
            .expect_create_derived()
            .returning(|_| Err(api_error(422, "Invalid")));

        let ctx = test_context(store, settings());
        let action = reconcile(Arc::new(sample_ingress(true)), ctx).await.unwrap();
        assert_eq!(action, Action::requeue(PERMANENT_RETRY_DELAY));
    }

    /// Story: transport-level failures propagate so the runtime applies its
    /// exponential backoff.
    #[tokio::test]
    async fn story_transient_errors_propagate() {
        let mut store = MockObjectStore::new();
        store.expect_get_derived().returning(|_, _, _| Ok(None));
        store
            .expect_create_derived()
            .returning(|_| Err(api_error(500, "InternalError")));

        let ctx = test_context(store, settings());
        let result = reconcile(Arc::new(sample_ingress(true)), ctx).await;
        assert!(result.is_err());
    }

    // ===== Deletion =====

    fn deleting_ingress() -> Ingress {
        let mut ingress = sample_ingress(true);
        ingress.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        ingress
            .metadata
            .finalizers
            .as_mut()
            .unwrap()
            .push("unrelated.io/finalizer".to_string());
        ingress
    }

    /// Story: on deletion, every derived resource with this Ingress's
    /// provenance is removed - including the cross-namespace ReferenceGrant,
    /// which no owner reference protects - and only then is the finalizer
    /// released, preserving unrelated finalizers.
    #[tokio::test]
    async fn story_deletion_cleans_up_before_releasing_the_finalizer() {
        let live_route = HttpRoute {
            metadata: ObjectMeta {
                name: Some("test-ingress-example-com".to_string()),
                namespace: Some("default".to_string()),
                annotations: Some(provenance()),
                ..Default::default()
            },
            spec: Default::default(),
        };
        let live_grant = ReferenceGrant {
            metadata: ObjectMeta {
                name: Some("ingress-default-test-ingress".to_string()),
                namespace: Some("foreign".to_string()),
                annotations: Some(provenance()),
                ..Default::default()
            },
            spec: Default::default(),
        };

        let mut store = MockObjectStore::new();
        store
            .expect_list_derived()
            .returning(move |kind, namespace| match (kind, namespace) {
                (DerivedKind::Route, Some("default")) => {
                    Ok(vec![Derived::Route(live_route.clone())])
                }
                (DerivedKind::Grant, None) => Ok(vec![Derived::Grant(live_grant.clone())]),
                _ => Ok(vec![]),
            });
        store
            .expect_delete_derived()
            .withf(|kind, ns, name| {
                *kind == DerivedKind::Route && ns == "default" && name == "test-ingress-example-com"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        store
            .expect_delete_derived()
            .withf(|kind, ns, name| {
                *kind == DerivedKind::Grant
                    && ns == "foreign"
                    && name == "ingress-default-test-ingress"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        store
            .expect_patch_ingress_finalizers()
            .withf(|_, _, finalizers| finalizers == ["unrelated.io/finalizer".to_string()])
            .times(1)
            .returning(|_, _, _| Ok(()));

        let ctx = test_context(store, settings());
        let action = reconcile(Arc::new(deleting_ingress()), ctx).await.unwrap();
        assert_eq!(action, Action::await_change());
    }

    /// Story: a conflict while releasing the finalizer requeues soon; the
    /// cleanup already happened and is idempotent.
    #[tokio::test]
    async fn story_finalizer_release_conflict_requeues() {
        let mut store = MockObjectStore::new();
        store.expect_list_derived().returning(|_, _| Ok(vec![]));
        store
            .expect_patch_ingress_finalizers()
            .returning(|_, _, _| Err(api_error(409, "Conflict")));

        let ctx = test_context(store, settings());
        let action = reconcile(Arc::new(deleting_ingress()), ctx).await.unwrap();
        assert_eq!(action, Action::requeue(REQUEUE_SOON));
    }

    /// Story: an Ingress already past its finalizer (ours removed earlier)
    /// requires no work.
    #[tokio::test]
    async fn story_deletion_without_our_finalizer_is_a_noop() {
        let mut ingress = sample_ingress(false);
        ingress.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        ingress.metadata.finalizers = Some(vec!["unrelated.io/finalizer".to_string()]);

        let store = MockObjectStore::new();
        let ctx = test_context(store, settings());
        let action = reconcile(Arc::new(ingress), ctx).await.unwrap();
        assert_eq!(action, Action::await_change());
    }

    // ===== Status reflection =====

    fn gateway_with_addresses() -> Gateway {
        Gateway {
            metadata: ObjectMeta {
                name: Some("eg-gateway".to_string()),
                namespace: Some("envoy-gateway".to_string()),
                ..Default::default()
            },
            spec: GatewaySpec::default(),
            status: Some(GatewayStatus {
                addresses: Some(vec![
                    GatewayStatusAddress {
                        address_type: Some("IPAddress".to_string()),
                        value: "203.0.113.10".to_string(),
                    },
                    GatewayStatusAddress {
                        address_type: Some("Hostname".to_string()),
                        value: "lb.example.com".to_string(),
                    },
                ]),
            }),
        }
    }

    /// Story: the gateway's addresses land in the Ingress load-balancer
    /// status, hostnames in the hostname field and everything else as IPs.
    #[tokio::test]
    async fn story_gateway_addresses_reflect_into_status() {
        let mut store = MockObjectStore::new();
        store.expect_get_derived().returning(|_, _, _| Ok(None));
        store.expect_create_derived().returning(|_| Ok(()));
        store.expect_list_derived().returning(|_, _| Ok(vec![]));
        store
            .expect_get_gateway()
            .withf(|ns, name| ns == "envoy-gateway" && name == "eg-gateway")
            .returning(|_, _| Ok(Some(gateway_with_addresses())));
        store
            .expect_update_ingress_status()
            .withf(|ns, name, addresses| {
                ns == "default"
                    && name == "test-ingress"
                    && addresses.len() == 2
                    && addresses[0].ip.as_deref() == Some("203.0.113.10")
                    && addresses[0].hostname.is_none()
                    && addresses[1].hostname.as_deref() == Some("lb.example.com")
                    && addresses[1].ip.is_none()
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let ctx = test_context(store, settings());
        let action = reconcile(Arc::new(sample_ingress(true)), ctx).await.unwrap();
        assert_eq!(action, Action::await_change());
    }

    /// Story: when the Ingress status already matches the gateway, no status
    /// write happens.
    #[tokio::test]
    async fn story_unchanged_status_is_not_rewritten() {
        let mut store = MockObjectStore::new();
        store.expect_get_derived().returning(|_, _, _| Ok(None));
        store.expect_create_derived().returning(|_| Ok(()));
        store.expect_list_derived().returning(|_, _| Ok(vec![]));
        store
            .expect_get_gateway()
            .returning(|_, _| Ok(Some(gateway_with_addresses())));
        // No expect_update_ingress_status: a write would panic.

        let mut ingress = sample_ingress(true);
        ingress.status = Some(IngressStatus {
            load_balancer: Some(IngressLoadBalancerStatus {
                ingress: Some(vec![
                    IngressLoadBalancerIngress {
                        ip: Some("203.0.113.10".to_string()),
                        ..Default::default()
                    },
                    IngressLoadBalancerIngress {
                        hostname: Some("lb.example.com".to_string()),
                        ..Default::default()
                    },
                ]),
            }),
        });

        let ctx = test_context(store, settings());
        reconcile(Arc::new(ingress), ctx).await.unwrap();
    }

    /// Story: status-update failures never fail the reconcile.
    #[tokio::test]
    async fn story_status_failures_are_swallowed() {
        let mut store = MockObjectStore::new();
        store.expect_get_derived().returning(|_, _, _| Ok(None));
        store.expect_create_derived().returning(|_| Ok(()));
        store.expect_list_derived().returning(|_, _| Ok(vec![]));
        store
            .expect_get_gateway()
            .returning(|_, _| Ok(Some(gateway_with_addresses())));
        store
            .expect_update_ingress_status()
            .returning(|_, _, _| Err(api_error(500, "InternalError")));

        let ctx = test_context(store, settings());
        let action = reconcile(Arc::new(sample_ingress(true)), ctx).await.unwrap();
        assert_eq!(action, Action::await_change());
    }

    // ===== Cross-namespace grants =====

    /// Story: a stale grant in a namespace the projection no longer
    /// references is deleted while the Ingress still exists.
    #[tokio::test]
    async fn story_stale_grants_are_deleted_during_converge() {
        let stale_grant = ReferenceGrant {
            metadata: ObjectMeta {
                name: Some("ingress-default-test-ingress".to_string()),
                namespace: Some("no-longer-referenced".to_string()),
                annotations: Some(provenance()),
                ..Default::default()
            },
            spec: Default::default(),
        };

        let mut store = MockObjectStore::new();
        store.expect_get_derived().returning(|_, _, _| Ok(None));
        store.expect_create_derived().returning(|_| Ok(()));
        store
            .expect_list_derived()
            .returning(move |kind, namespace| match (kind, namespace) {
                (DerivedKind::Grant, None) => Ok(vec![Derived::Grant(stale_grant.clone())]),
                _ => Ok(vec![]),
            });
        store
            .expect_delete_derived()
            .withf(|kind, ns, name| {
                *kind == DerivedKind::Grant
                    && ns == "no-longer-referenced"
                    && name == "ingress-default-test-ingress"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        store.expect_get_gateway().returning(|_, _| Ok(None));

        let ctx = test_context(store, settings());
        reconcile(Arc::new(sample_ingress(true)), ctx).await.unwrap();
    }
}
