//! JsonServer operator kubehub: kube-rs backed resource store and event sink.

#![forbid(unsafe_code)]

pub mod mem;

use std::fmt::Debug;

use anyhow::{anyhow, Context, Result};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{Api, Patch, PatchParams, PostParams},
    discovery::{Discovery, Scope},
    runtime::events::{Event, EventType, Recorder, Reporter},
    Client, Resource,
};
use metrics::counter;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use jso_core::{
    ChildKind, ChildResource, JsonServer, JsonServerStatus, Notifier, ObjectKey, ResourceStore, Severity, StoreError,
};

pub async fn get_kube_client() -> Result<Client> {
    Client::try_default().await.context("building kube client from default config")
}

/// Fail early when the `JsonServer` kind is not served by the cluster.
pub async fn ensure_crd_served(client: Client) -> Result<()> {
    let discovery = Discovery::new(client).run().await.context("running API discovery")?;
    let (group, version, kind) = (JsonServer::group(&()), JsonServer::version(&()), JsonServer::kind(&()));
    for g in discovery.groups() {
        for (ar, caps) in g.recommended_resources() {
            if ar.group == group && ar.version == version && ar.kind == kind {
                if !matches!(caps.scope, Scope::Namespaced) {
                    return Err(anyhow!("{}/{}/{} is served cluster-scoped; expected namespaced", group, version, kind));
                }
                info!(gvk = %format!("{}/{}/{}", group, version, kind), "CRD served");
                return Ok(());
            }
        }
    }
    Err(anyhow!("{}/{}/{} not served; install it with `jsoctl crd | kubectl apply -f -`", group, version, kind))
}

fn map_kube_err(e: kube::Error) -> StoreError {
    match e {
        kube::Error::Api(ae) if ae.code == 404 => StoreError::NotFound(ae.message),
        kube::Error::Api(ae) if ae.code == 409 => StoreError::Conflict(ae.message),
        other => StoreError::Internal(other.to_string()),
    }
}

/// Store backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    manager: String,
}

impl KubeStore {
    pub fn new(client: Client, manager: impl Into<String>) -> Self {
        Self { client, manager: manager.into() }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params(&self) -> PostParams {
        PostParams { dry_run: false, field_manager: Some(self.manager.clone()) }
    }

    async fn get_typed<K>(&self, key: &ObjectKey) -> Result<Option<K>, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + DeserializeOwned + Debug,
    {
        counter!("store_requests_total", 1u64, "verb" => "get");
        self.api::<K>(&key.namespace).get_opt(&key.name).await.map_err(map_kube_err)
    }

    async fn create_typed<K>(&self, obj: &K) -> Result<(), StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug,
    {
        counter!("store_requests_total", 1u64, "verb" => "create");
        let ns = obj.meta().namespace.clone().unwrap_or_default();
        self.api::<K>(&ns).create(&self.post_params(), obj).await.map(|_| ()).map_err(map_kube_err)
    }

    async fn replace_typed<K>(&self, obj: &K) -> Result<(), StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug,
    {
        counter!("store_requests_total", 1u64, "verb" => "update");
        let ns = obj.meta().namespace.clone().unwrap_or_default();
        let name = obj.meta().name.clone().unwrap_or_default();
        self.api::<K>(&ns).replace(&name, &self.post_params(), obj).await.map(|_| ()).map_err(map_kube_err)
    }
}

#[async_trait::async_trait]
impl ResourceStore for KubeStore {
    async fn get_record(&self, key: &ObjectKey) -> Result<Option<JsonServer>, StoreError> {
        self.get_typed::<JsonServer>(key).await
    }

    async fn get_child(&self, kind: ChildKind, key: &ObjectKey) -> Result<Option<ChildResource>, StoreError> {
        Ok(match kind {
            ChildKind::DataBlob => self.get_typed::<ConfigMap>(key).await?.map(ChildResource::ConfigMap),
            ChildKind::Workload => self.get_typed::<Deployment>(key).await?.map(ChildResource::Deployment),
            ChildKind::Endpoint => self.get_typed::<Service>(key).await?.map(ChildResource::Service),
        })
    }

    async fn create(&self, child: &ChildResource) -> Result<(), StoreError> {
        match child {
            ChildResource::ConfigMap(o) => self.create_typed(o).await,
            ChildResource::Deployment(o) => self.create_typed(o).await,
            ChildResource::Service(o) => self.create_typed(o).await,
        }
    }

    async fn update(&self, child: &ChildResource) -> Result<(), StoreError> {
        match child {
            ChildResource::ConfigMap(o) => self.replace_typed(o).await,
            ChildResource::Deployment(o) => self.replace_typed(o).await,
            ChildResource::Service(o) => self.replace_typed(o).await,
        }
    }

    async fn update_status(&self, key: &ObjectKey, status: &JsonServerStatus) -> Result<(), StoreError> {
        counter!("store_requests_total", 1u64, "verb" => "update_status");
        let patch = serde_json::json!({ "status": status });
        let pp = PatchParams { field_manager: Some(self.manager.clone()), ..Default::default() };
        debug!(key = %key, state = %status.state, "patching status");
        self.api::<JsonServer>(&key.namespace)
            .patch_status(&key.name, &pp, &Patch::Merge(&patch))
            .await
            .map(|_| ())
            .map_err(map_kube_err)
    }
}

/// Event sink publishing `events.k8s.io` events against the record.
#[derive(Clone)]
pub struct KubeNotifier {
    client: Client,
    reporter: Reporter,
}

impl KubeNotifier {
    pub fn new(client: Client, manager: impl Into<String>) -> Self {
        let reporter = Reporter { controller: manager.into(), instance: std::env::var("HOSTNAME").ok() };
        Self { client, reporter }
    }
}

#[async_trait::async_trait]
impl Notifier for KubeNotifier {
    async fn emit(&self, subject: &JsonServer, severity: Severity, reason: &str, message: &str) {
        let recorder = Recorder::new(self.client.clone(), self.reporter.clone(), subject.object_ref(&()));
        let type_ = match severity {
            Severity::Normal => EventType::Normal,
            Severity::Warning => EventType::Warning,
        };
        // reasons look like `Create-ConfigMap`; the verb doubles as the event action
        let action = reason.split('-').next().unwrap_or(reason).to_string();
        let ev = Event { type_, reason: reason.to_string(), note: Some(message.to_string()), action, secondary: None };
        if let Err(e) = recorder.publish(ev).await {
            counter!("events_dropped_total", 1u64);
            warn!(error = %e, %reason, "event publish failed");
        }
    }
}
