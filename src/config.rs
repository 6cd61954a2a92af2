//! Process configuration
//!
//! All options are available both as command line flags and as environment
//! variables, with the flag taking precedence.

use clap::Parser;

/// Controller configuration
#[derive(Parser, Debug, Clone)]
#[command(name = "ingress-gateway-api", version, about, long_about = None)]
pub struct Settings {
    /// Name of the shared Gateway resource derived HTTPRoutes bind to
    #[arg(long, env = "GATEWAY_NAME", default_value = "eg-gateway")]
    pub gateway_name: String,

    /// Namespace of the shared Gateway resource
    #[arg(long, env = "GATEWAY_NAMESPACE", default_value = "envoy-gateway")]
    pub gateway_namespace: String,

    /// Only process Ingresses whose effective class equals this value
    /// (empty = process all)
    #[arg(long, env = "INGRESS_CLASS", default_value = "")]
    pub ingress_class: String,

    /// The address the metrics endpoint binds to
    #[arg(long, default_value = ":8080")]
    pub metrics_addr: String,

    /// The address the health probe endpoint binds to
    #[arg(long, default_value = ":8081")]
    pub health_probe_addr: String,

    /// Enable leader election for the controller manager
    #[arg(long, default_value_t = false)]
    pub leader_elect: bool,
}

impl Settings {
    /// Bindable form of `metrics_addr` (a bare `:port` binds all interfaces).
    pub fn metrics_bind_addr(&self) -> String {
        normalize_bind_addr(&self.metrics_addr)
    }

    /// Bindable form of `health_probe_addr`.
    pub fn health_probe_bind_addr(&self) -> String {
        normalize_bind_addr(&self.health_probe_addr)
    }
}

fn normalize_bind_addr(addr: &str) -> String {
    if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    }
}
