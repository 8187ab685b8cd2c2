//! Kind-tagged child resource descriptors.

use std::fmt;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

use crate::key::ObjectKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChildKind {
    DataBlob,
    Workload,
    Endpoint,
}

impl ChildKind {
    /// Order in which corrective actions are planned and applied.
    pub const ORDER: [ChildKind; 3] = [ChildKind::DataBlob, ChildKind::Workload, ChildKind::Endpoint];

    pub fn type_name(&self) -> &'static str {
        match self {
            ChildKind::DataBlob => "ConfigMap",
            ChildKind::Workload => "Deployment",
            ChildKind::Endpoint => "Service",
        }
    }
}

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Target or observed representation of one managed child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "object")]
pub enum ChildResource {
    ConfigMap(ConfigMap),
    Deployment(Deployment),
    Service(Service),
}

impl ChildResource {
    pub fn kind(&self) -> ChildKind {
        match self {
            ChildResource::ConfigMap(_) => ChildKind::DataBlob,
            ChildResource::Deployment(_) => ChildKind::Workload,
            ChildResource::Service(_) => ChildKind::Endpoint,
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            ChildResource::ConfigMap(o) => &o.metadata,
            ChildResource::Deployment(o) => &o.metadata,
            ChildResource::Service(o) => &o.metadata,
        }
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            ChildResource::ConfigMap(o) => &mut o.metadata,
            ChildResource::Deployment(o) => &mut o.metadata,
            ChildResource::Service(o) => &mut o.metadata,
        }
    }

    pub fn key(&self) -> ObjectKey {
        let meta = self.meta();
        ObjectKey::new(meta.namespace.clone().unwrap_or_default(), meta.name.clone().unwrap_or_default())
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.meta().resource_version.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_variant() {
        let cm = ChildResource::ConfigMap(ConfigMap {
            metadata: ObjectMeta { name: Some("a".into()), namespace: Some("ns".into()), ..Default::default() },
            ..Default::default()
        });
        assert_eq!(cm.kind(), ChildKind::DataBlob);
        assert_eq!(cm.key(), ObjectKey::new("ns", "a"));
        assert_eq!(cm.kind().to_string(), "ConfigMap");
    }
}
