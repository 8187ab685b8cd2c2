//! `JsonServer` custom resource: the desired-state record and its status sub-record.

use std::fmt;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::key::ObjectKey;

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "example.com",
    version = "v1",
    kind = "JsonServer",
    namespaced,
    status = "JsonServerStatus",
    shortname = "jsrv",
    scale = r#"{"specReplicasPath":".spec.replicas","statusReplicasPath":".status.replicas","labelSelectorPath":".status.selector"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".status.replicas"}"#,
    printcolumn = r#"{"name":"Message","type":"string","jsonPath":".status.message","priority":1}"#
)]
#[serde(rename_all = "camelCase")]
pub struct JsonServerSpec {
    /// Requested replica count. `None` means the caller does not care; defaulting happens at admission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    /// JSON document served by json-server. Must be well-formed JSON.
    pub json_config: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum SyncState {
    #[default]
    NotSynced,
    Synced,
    Error,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::NotSynced => "NotSynced",
            SyncState::Synced => "Synced",
            SyncState::Error => "Error",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Written exclusively by the reconciler, once per cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct JsonServerStatus {
    #[serde(default)]
    pub state: SyncState,
    #[serde(default)]
    pub message: String,
    /// Latest observed available replicas. `None` on a write keeps the stored value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    /// Label selector of the workload pods (scale subresource).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

impl JsonServer {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace().unwrap_or_default(), self.name_any())
    }

    pub fn requested_replicas(&self) -> Option<i32> {
        self.spec.replicas
    }

    /// Previously persisted observation, if any.
    pub fn observed_replicas(&self) -> Option<i32> {
        self.status.as_ref().and_then(|s| s.replicas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn spec_uses_camel_case_and_omits_null_replicas() {
        let spec = JsonServerSpec { replicas: None, json_config: "{}".into() };
        let v = serde_json::to_value(&spec).unwrap();
        assert_eq!(v, serde_json::json!({ "jsonConfig": "{}" }));
    }

    #[test]
    fn status_without_replicas_leaves_field_out() {
        let st = JsonServerStatus { state: SyncState::Synced, message: "ok".into(), replicas: None, selector: None };
        let v = serde_json::to_value(&st).unwrap();
        assert_eq!(v, serde_json::json!({ "state": "Synced", "message": "ok" }));
    }

    #[test]
    fn crd_declares_status_and_scale_subresources() {
        let crd = serde_json::to_value(JsonServer::crd()).unwrap();
        let version = &crd["spec"]["versions"][0];
        assert_eq!(crd["spec"]["group"], "example.com");
        assert_eq!(version["name"], "v1");
        assert!(version["subresources"]["status"].is_object());
        assert_eq!(version["subresources"]["scale"]["labelSelectorPath"], ".status.selector");
    }

    #[test]
    fn key_is_namespace_and_name() {
        let mut js = JsonServer::new("app-a", JsonServerSpec::default());
        js.metadata.namespace = Some("ns".into());
        assert_eq!(js.key().to_string(), "ns/app-a");
    }
}
