//! Work item keys.

use std::fmt;

use kube::{Resource, ResourceExt};

use crate::error::{Error, Result};

/// Identity of a desired-state object: `namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse `name` or `namespace/name`.
    pub fn parse(key: &str) -> Result<Self> {
        let (namespace, name) = match key.split_once('/') {
            Some((ns, name)) => (ns, name),
            None => ("", key),
        };
        if name.is_empty() || name.contains('/') {
            return Err(Error::MalformedKey(key.to_string()));
        }
        Ok(Self::new(namespace, name))
    }

    /// Key of a Kubernetes object.
    pub fn from_resource<K: Resource>(obj: &K) -> Self {
        Self::new(obj.namespace().unwrap_or_default(), obj.name_any())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}
