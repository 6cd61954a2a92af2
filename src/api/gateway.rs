//! Gateway (gateway.networking.k8s.io/v1)
//!
//! Observed only: the controller reads the shared Gateway's advertised
//! addresses to reflect them into Ingress status. It never writes Gateways.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The shared L7 gateway all derived HTTPRoutes attach to.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1",
    kind = "Gateway",
    root = "Gateway",
    plural = "gateways",
    namespaced,
    status = "GatewayStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    /// Name of the GatewayClass this Gateway belongs to
    #[serde(default)]
    pub gateway_class_name: String,

    /// Listener configuration; opaque to this controller
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listeners: Vec<serde_json::Value>,
}

/// Observed state of a Gateway.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    /// Addresses the gateway is reachable at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addresses: Option<Vec<GatewayStatusAddress>>,
}

/// One advertised gateway address.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatusAddress {
    /// Address type, e.g. `IPAddress` or `Hostname`
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub address_type: Option<String>,

    /// The address value
    pub value: String,
}
