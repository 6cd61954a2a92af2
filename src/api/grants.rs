//! ReferenceGrant (gateway.networking.k8s.io/v1beta1)

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ReferenceGrant permits cross-namespace references. It is placed in the
/// *target* namespace and enumerates which (group, kind, namespace) sources
/// may reference which (group, kind) targets there.
///
/// The cluster garbage collector does not follow cross-namespace owner
/// references, so grants created by this controller carry only the provenance
/// annotation and are deleted explicitly during finalization.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "gateway.networking.k8s.io",
    version = "v1beta1",
    kind = "ReferenceGrant",
    root = "ReferenceGrant",
    plural = "referencegrants",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceGrantSpec {
    /// Trusted source kinds and namespaces
    pub from: Vec<ReferenceGrantFrom>,

    /// Target kinds the sources may reference in this namespace
    pub to: Vec<ReferenceGrantTo>,
}

/// A trusted source of cross-namespace references.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceGrantFrom {
    /// Group of the referencing resource
    pub group: String,

    /// Kind of the referencing resource
    pub kind: String,

    /// Namespace the references originate from
    pub namespace: String,
}

/// A permitted reference target.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceGrantTo {
    /// Group of the referenced resource; empty string is the core group
    pub group: String,

    /// Kind of the referenced resource
    pub kind: String,

    /// Restrict the grant to a single named object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}
