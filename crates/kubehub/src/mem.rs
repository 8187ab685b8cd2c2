//! In-memory store and recording event sink for tests and offline rendering.
//!
//! Mirrors the API server behaviors the reconciler depends on: resourceVersion bumps on
//! every write, version-checked replaces, server-owned workload status, status merges
//! that keep `replicas` when a write leaves it out. Failures can be injected per kind.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use k8s_openapi::api::apps::v1::DeploymentStatus;
use tracing::debug;
use uuid::Uuid;

use jso_core::{
    ChildKind, ChildResource, JsonServer, JsonServerStatus, Notifier, ObjectKey, ResourceStore, Severity, StoreError,
};

#[derive(Default)]
struct Inner {
    next_rv: u64,
    records: BTreeMap<ObjectKey, JsonServer>,
    children: BTreeMap<(ChildKind, ObjectKey), ChildResource>,
    fail_record: Option<StoreError>,
    fail_get: HashMap<ChildKind, StoreError>,
    fail_write: HashMap<ChildKind, StoreError>,
    fail_status: Option<StoreError>,
    race_update: HashSet<ChildKind>,
    writes: Vec<String>,
    status_writes: usize,
}

impl Inner {
    fn bump(&mut self) -> String {
        self.next_rv += 1;
        self.next_rv.to_string()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // a panicking test thread must not hide the state from the assertions that follow
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Insert or replace a record, assigning uid and resourceVersion like the API server.
    pub fn put_record(&self, mut record: JsonServer) -> JsonServer {
        let mut g = self.lock();
        if record.metadata.uid.is_none() {
            record.metadata.uid = Some(Uuid::new_v4().to_string());
        }
        record.metadata.resource_version = Some(g.bump());
        g.records.insert(record.key(), record.clone());
        record
    }

    pub fn remove_record(&self, key: &ObjectKey) {
        self.lock().records.remove(key);
    }

    pub fn record(&self, key: &ObjectKey) -> Option<JsonServer> {
        self.lock().records.get(key).cloned()
    }

    pub fn child(&self, kind: ChildKind, key: &ObjectKey) -> Option<ChildResource> {
        self.lock().children.get(&(kind, key.clone())).cloned()
    }

    /// Simulate another actor writing a child directly.
    pub fn put_child(&self, mut child: ChildResource) {
        let mut g = self.lock();
        child.meta_mut().resource_version = Some(g.bump());
        g.children.insert((child.kind(), child.key()), child);
    }

    /// Set the workload's server-owned available replica count.
    pub fn set_available(&self, key: &ObjectKey, available: i32) -> bool {
        let mut g = self.lock();
        match g.children.get_mut(&(ChildKind::Workload, key.clone())) {
            Some(ChildResource::Deployment(d)) => {
                d.status.get_or_insert_with(DeploymentStatus::default).available_replicas = Some(available);
                true
            }
            _ => false,
        }
    }

    pub fn fail_record(&self, err: StoreError) {
        self.lock().fail_record = Some(err);
    }

    pub fn fail_get(&self, kind: ChildKind, err: StoreError) {
        self.lock().fail_get.insert(kind, err);
    }

    pub fn fail_write(&self, kind: ChildKind, err: StoreError) {
        self.lock().fail_write.insert(kind, err);
    }

    pub fn fail_status(&self, err: StoreError) {
        self.lock().fail_status = Some(err);
    }

    /// The next update of `kind` finds the live object already moved on, as if another
    /// writer landed between the caller's read and its replace.
    pub fn race_next_update(&self, kind: ChildKind) {
        self.lock().race_update.insert(kind);
    }

    pub fn clear_failures(&self) {
        let mut g = self.lock();
        g.race_update.clear();
        g.fail_record = None;
        g.fail_get.clear();
        g.fail_write.clear();
        g.fail_status = None;
    }

    /// Attempted child writes, in order, as `"<verb> <Kind> <ns/name>"`; failed attempts included.
    pub fn writes(&self) -> Vec<String> {
        self.lock().writes.clone()
    }

    pub fn status_writes(&self) -> usize {
        self.lock().status_writes
    }
}

#[async_trait::async_trait]
impl ResourceStore for MemoryStore {
    async fn get_record(&self, key: &ObjectKey) -> Result<Option<JsonServer>, StoreError> {
        let g = self.lock();
        if let Some(e) = &g.fail_record {
            return Err(e.clone());
        }
        Ok(g.records.get(key).cloned())
    }

    async fn get_child(&self, kind: ChildKind, key: &ObjectKey) -> Result<Option<ChildResource>, StoreError> {
        let g = self.lock();
        if let Some(e) = g.fail_get.get(&kind) {
            return Err(e.clone());
        }
        Ok(g.children.get(&(kind, key.clone())).cloned())
    }

    async fn create(&self, child: &ChildResource) -> Result<(), StoreError> {
        let mut g = self.lock();
        let (kind, key) = (child.kind(), child.key());
        g.writes.push(format!("create {} {}", kind, key));
        if let Some(e) = g.fail_write.get(&kind) {
            return Err(e.clone());
        }
        if g.children.contains_key(&(kind, key.clone())) {
            return Err(StoreError::Conflict(format!("{} {} already exists", kind, key)));
        }
        let mut obj = child.clone();
        obj.meta_mut().uid = Some(Uuid::new_v4().to_string());
        obj.meta_mut().resource_version = Some(g.bump());
        debug!(%kind, %key, "mem: created");
        g.children.insert((kind, key), obj);
        Ok(())
    }

    async fn update(&self, child: &ChildResource) -> Result<(), StoreError> {
        let mut g = self.lock();
        let (kind, key) = (child.kind(), child.key());
        g.writes.push(format!("update {} {}", kind, key));
        if let Some(e) = g.fail_write.get(&kind) {
            return Err(e.clone());
        }
        if g.race_update.remove(&kind) {
            let rv = g.bump();
            if let Some(live) = g.children.get_mut(&(kind, key.clone())) {
                live.meta_mut().resource_version = Some(rv);
            }
        }
        let rv = g.bump();
        let live = g
            .children
            .get_mut(&(kind, key.clone()))
            .ok_or_else(|| StoreError::NotFound(format!("{} {}", kind, key)))?;
        if let Some(want) = child.resource_version() {
            if live.resource_version() != Some(want) {
                return Err(StoreError::Conflict(format!(
                    "{} {}: resourceVersion {} is stale",
                    kind, key, want
                )));
            }
        }
        let mut obj = child.clone();
        obj.meta_mut().uid = live.meta().uid.clone();
        obj.meta_mut().resource_version = Some(rv);
        if let (ChildResource::Deployment(new), ChildResource::Deployment(old)) = (&mut obj, &*live) {
            new.status = old.status.clone();
        }
        *live = obj;
        debug!(%kind, %key, "mem: replaced");
        Ok(())
    }

    async fn update_status(&self, key: &ObjectKey, status: &JsonServerStatus) -> Result<(), StoreError> {
        let mut g = self.lock();
        g.status_writes += 1;
        if let Some(e) = &g.fail_status {
            return Err(e.clone());
        }
        let rv = g.bump();
        let record = g.records.get_mut(key).ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        let prev = record.status.take().unwrap_or_default();
        record.status = Some(JsonServerStatus { replicas: status.replicas.or(prev.replicas), ..status.clone() });
        record.metadata.resource_version = Some(rv);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub subject: ObjectKey,
    pub severity: Severity,
    pub reason: String,
    pub message: String,
}

impl RecordedEvent {
    /// `"<Severity> <reason> <message>"`, the shape of a recorder line.
    pub fn line(&self) -> String {
        format!("{} {} {}", self.severity, self.reason, self.message)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn emit(&self, subject: &JsonServer, severity: Severity, reason: &str, message: &str) {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).push(RecordedEvent {
            subject: subject.key(),
            severity,
            reason: reason.to_string(),
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use jso_core::{JsonServerSpec, SyncState};

    fn cm(rv: Option<&str>) -> ChildResource {
        ChildResource::ConfigMap(ConfigMap {
            metadata: ObjectMeta {
                name: Some("app-a".into()),
                namespace: Some("ns".into()),
                resource_version: rv.map(str::to_string),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn stale_replace_conflicts() {
        let store = MemoryStore::new();
        store.create(&cm(None)).await.unwrap();
        let rv = store.child(ChildKind::DataBlob, &ObjectKey::new("ns", "app-a")).unwrap().resource_version().map(str::to_string);
        store.update(&cm(rv.as_deref())).await.unwrap();
        let err = store.update(&cm(rv.as_deref())).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)), "err={}", err);
    }

    #[tokio::test]
    async fn raced_update_sees_a_newer_version() {
        let store = MemoryStore::new();
        store.create(&cm(None)).await.unwrap();
        let rv = store.child(ChildKind::DataBlob, &ObjectKey::new("ns", "app-a")).unwrap().resource_version().map(str::to_string);
        store.race_next_update(ChildKind::DataBlob);
        assert!(matches!(store.update(&cm(rv.as_deref())).await, Err(StoreError::Conflict(_))));
        let rv = store.child(ChildKind::DataBlob, &ObjectKey::new("ns", "app-a")).unwrap().resource_version().map(str::to_string);
        store.update(&cm(rv.as_deref())).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_create_conflicts_and_missing_update_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(store.update(&cm(None)).await, Err(StoreError::NotFound(_))));
        store.create(&cm(None)).await.unwrap();
        assert!(matches!(store.create(&cm(None)).await, Err(StoreError::Conflict(_))));
        assert_eq!(store.writes(), vec!["update ConfigMap ns/app-a", "create ConfigMap ns/app-a", "create ConfigMap ns/app-a"]);
    }

    #[tokio::test]
    async fn status_merge_keeps_replicas_when_absent() {
        let store = MemoryStore::new();
        let mut js = JsonServer::new("app-a", JsonServerSpec::default());
        js.metadata.namespace = Some("ns".into());
        let key = store.put_record(js).key();
        let first = JsonServerStatus { state: SyncState::Synced, message: "ok".into(), replicas: Some(2), selector: None };
        store.update_status(&key, &first).await.unwrap();
        let second = JsonServerStatus { state: SyncState::Error, message: "x".into(), replicas: None, selector: None };
        store.update_status(&key, &second).await.unwrap();
        let st = store.record(&key).unwrap().status.unwrap();
        assert_eq!(st.state, SyncState::Error);
        assert_eq!(st.replicas, Some(2));
    }
}
