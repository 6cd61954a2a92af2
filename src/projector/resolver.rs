//! Service port resolution
//!
//! Ingress backends may name their service port instead of numbering it;
//! Gateway API backend refs are numeric only. The resolver is the single
//! impurity of the projection and is injected as a narrow capability so tests
//! can run the projector offline.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::{Api, Client};

#[cfg(test)]
use mockall::automock;

use crate::{Error, Result};

/// Resolves a service port (by name or number) to a numeric port.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PortResolver: Send + Sync {
    /// Resolve `(port_name, port_number)` for a service. A non-zero
    /// `port_number` is returned unchanged without I/O; otherwise the named
    /// port is looked up on the service.
    async fn resolve_port(
        &self,
        namespace: &str,
        service: &str,
        port_name: &str,
        port_number: i32,
    ) -> Result<i32>;
}

/// Resolver backed by the cluster API.
pub struct ClientPortResolver {
    client: Client,
}

impl ClientPortResolver {
    /// Create a resolver using the given client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PortResolver for ClientPortResolver {
    async fn resolve_port(
        &self,
        namespace: &str,
        service: &str,
        port_name: &str,
        port_number: i32,
    ) -> Result<i32> {
        if port_number != 0 {
            return Ok(port_number);
        }
        if port_name.is_empty() {
            return Err(Error::PortNotFound {
                namespace: namespace.to_string(),
                name: service.to_string(),
                port: String::new(),
            });
        }

        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let svc = services.get(service).await.map_err(Error::Kube)?;

        svc.spec
            .as_ref()
            .and_then(|spec| spec.ports.as_ref())
            .and_then(|ports| {
                ports
                    .iter()
                    .find(|p| p.name.as_deref() == Some(port_name))
                    .map(|p| p.port)
            })
            .ok_or_else(|| Error::PortNotFound {
                namespace: namespace.to_string(),
                name: service.to_string(),
                port: port_name.to_string(),
            })
    }
}

/// Resolver that performs no lookups. Numeric ports pass through; named
/// ports are unresolvable. Used in unit tests and wherever no client exists.
pub struct NoopPortResolver;

#[async_trait]
impl PortResolver for NoopPortResolver {
    async fn resolve_port(
        &self,
        namespace: &str,
        service: &str,
        port_name: &str,
        port_number: i32,
    ) -> Result<i32> {
        if port_number != 0 {
            return Ok(port_number);
        }
        Err(Error::PortNotFound {
            namespace: namespace.to_string(),
            name: service.to_string(),
            port: port_name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn numeric_ports_pass_through_without_io() {
        let resolver = NoopPortResolver;
        let port = resolver
            .resolve_port("default", "api-service", "", 8080)
            .await
            .unwrap();
        assert_eq!(port, 8080);
    }

    #[tokio::test]
    async fn named_ports_are_unresolvable_offline() {
        let resolver = NoopPortResolver;
        let err = resolver
            .resolve_port("default", "api-service", "http", 0)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("api-service"));
    }
}
