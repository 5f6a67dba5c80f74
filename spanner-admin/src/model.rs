//! Observed resources as reported by the admin API.
//!
//! Field names follow the API's JSON mapping so the same types are used for
//! REST payloads and for the mock's on-disk documents.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::naming;

/// Instance lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceState {
    #[default]
    StateUnspecified,
    Creating,
    Ready,
}

/// A Spanner instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    /// Full resource name (`projects/{p}/instances/{id}`).
    pub name: String,
    /// Instance config reference (`projects/{p}/instanceConfigs/{config}`).
    #[serde(default)]
    pub config: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub node_count: i32,
    #[serde(default)]
    pub state: InstanceState,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Instance {
    /// Instance id (last segment of the resource name).
    pub fn id(&self) -> &str {
        naming::resource_id(&self.name)
    }

    /// Config id (last segment of the config reference).
    pub fn config_id(&self) -> &str {
        naming::resource_id(&self.config)
    }
}

/// Database lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatabaseState {
    #[default]
    StateUnspecified,
    Creating,
    Ready,
    ReadyOptimizing,
}

/// A Spanner database. Only identity matters to the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    /// Full resource name (`projects/{p}/instances/{i}/databases/{name}`).
    pub name: String,
    #[serde(default)]
    pub state: DatabaseState,
}

impl Database {
    pub fn id(&self) -> &str {
        naming::resource_id(&self.name)
    }
}
