//! Custom resources describing desired Spanner state.

use std::collections::BTreeMap;

use kube::CustomResource;
use kube::CustomResourceExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Desired state of a Spanner instance.
///
/// The object name is the instance id; the object's labels are the desired
/// instance labels.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "instanceadmins.spanner.katsew.github.io",
    version = "v1alpha1",
    kind = "SpannerInstance",
    plural = "spannerinstances",
    shortname = "spi",
    namespaced,
    status = "SpannerInstanceStatus",
    derive = "PartialEq",
    derive = "Default",
    printcolumn = r#"{"name":"Config", "type":"string", "jsonPath":".spec.instanceConfig"}"#,
    printcolumn = r#"{"name":"Nodes", "type":"integer", "jsonPath":".spec.nodeCount"}"#,
    printcolumn = r#"{"name":"Available", "type":"integer", "jsonPath":".status.availableNodes"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SpannerInstanceSpec {
    pub display_name: String,
    /// Instance config id, e.g. `regional-us-central1`.
    pub instance_config: String,
    #[schemars(range(min = 1))]
    pub node_count: i32,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SpannerInstanceStatus {
    /// Node count reported by Spanner.
    #[serde(default)]
    pub available_nodes: i32,
    /// Labels on the instance after the last merge.
    #[serde(default)]
    pub instance_labels: BTreeMap<String, String>,
}

/// Desired state of a Spanner database. The object name is the database name.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "databaseadmins.spanner.katsew.github.io",
    version = "v1alpha1",
    kind = "SpannerDatabase",
    plural = "spannerdatabases",
    shortname = "spd",
    namespaced,
    status = "SpannerDatabaseStatus",
    derive = "PartialEq",
    derive = "Default",
    printcolumn = r#"{"name":"Instance", "type":"string", "jsonPath":".spec.instanceId"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SpannerDatabaseSpec {
    /// Name of the owning `SpannerInstance` (the Spanner instance id).
    pub instance_id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct SpannerDatabaseStatus {}

/// Both CustomResourceDefinitions as a multi-document YAML stream.
pub fn crds_yaml() -> Result<String, serde_yaml::Error> {
    let mut out = String::new();
    for crd in [SpannerInstance::crd(), SpannerDatabase::crd()] {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(&crd)?);
    }
    Ok(out)
}
