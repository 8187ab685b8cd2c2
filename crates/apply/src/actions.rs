//! Fix actions: planning corrective Create/Update operations and applying them.

use std::fmt;
use std::time::Instant;

use metrics::{counter, histogram};
use smallvec::SmallVec;
use tracing::{debug, info};

use jso_core::{ChildKind, ChildResource, JsonServer, ObjectKey, ResourceStore, StoreError};

use crate::descriptors::DescriptorFactory;
use crate::diff::diff;
use crate::ownership::{set_controller_reference, OwnershipError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Create,
    Update,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verb::Create => f.write_str("Create"),
            Verb::Update => f.write_str("Update"),
        }
    }
}

/// One corrective operation. Lives for a single cycle; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct FixAction {
    pub verb: Verb,
    pub target: ChildResource,
    pub reason: String,
    pub parent: ObjectKey,
}

impl FixAction {
    pub fn create(parent: ObjectKey, target: ChildResource) -> Self {
        Self { verb: Verb::Create, target, reason: String::new(), parent }
    }

    pub fn update(parent: ObjectKey, target: ChildResource, reason: impl Into<String>) -> Self {
        Self { verb: Verb::Update, target, reason: reason.into(), parent }
    }

    pub fn kind(&self) -> ChildKind {
        self.target.kind()
    }

    /// Event reason: verb and kind, e.g. `Create-Service`.
    pub fn event_reason(&self) -> String {
        format!("{}-{}", self.verb, self.kind())
    }

    /// Human-readable description used in logs, events and status.
    pub fn description(&self) -> String {
        match self.verb {
            Verb::Create => format!("{} {} was missing", self.kind(), self.target.key()),
            Verb::Update => format!("{} {} was out of sync - {}", self.kind(), self.target.key(), self.reason),
        }
    }
}

impl fmt::Display for FixAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

/// Actions for one cycle (at most one per kind, in apply order) plus read failures.
#[derive(Debug, Default)]
pub struct Plan {
    pub actions: SmallVec<[FixAction; 3]>,
    pub errors: Vec<String>,
}

/// Compare every child kind against the store and produce the corrective actions.
///
/// Update targets carry the observed resourceVersion so the replace fails on a concurrent edit
/// instead of overwriting it.
pub async fn plan<S: ResourceStore + ?Sized>(store: &S, factory: &DescriptorFactory, record: &JsonServer) -> Plan {
    let parent = record.key();
    let mut out = Plan::default();
    for kind in ChildKind::ORDER {
        let mut target = factory.build(kind, record);
        match store.get_child(kind, &target.key()).await {
            Ok(None) => out.actions.push(FixAction::create(parent.clone(), target)),
            Ok(Some(observed)) => {
                let diffs = diff(&target, &observed);
                if diffs.is_empty() {
                    debug!(kind = %kind, key = %parent, "child in sync");
                    continue;
                }
                // live owners travel with the replace; a foreign controller is rejected in `apply`
                target.meta_mut().resource_version = observed.meta().resource_version.clone();
                target.meta_mut().owner_references = observed.meta().owner_references.clone();
                let reason = format!("differences: [{}]", diffs.join(", "));
                out.actions.push(FixAction::update(parent.clone(), target, reason));
            }
            Err(e) => out.errors.push(format!("cannot get {} {}: {}", kind, target.key(), e)),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("cannot set ControllerReference for {kind} owned by {owner}: {source}")]
    Ownership { kind: ChildKind, owner: ObjectKey, source: OwnershipError },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Apply one action: link ownership, then create or fully replace the child.
pub async fn apply<S: ResourceStore + ?Sized>(action: &FixAction, owner: &JsonServer, store: &S) -> Result<(), ActionError> {
    let t0 = Instant::now();
    let mut target = action.target.clone();
    set_controller_reference(owner, &mut target).map_err(|source| ActionError::Ownership {
        kind: action.kind(),
        owner: action.parent.clone(),
        source,
    })?;
    let res = match action.verb {
        Verb::Create => store.create(&target).await,
        Verb::Update => store.update(&target).await,
    };
    histogram!("fix_action_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
    match res {
        Ok(()) => {
            counter!("fix_actions_total", 1u64);
            info!(action = %action, "fix action applied");
            Ok(())
        }
        Err(e) => {
            counter!("fix_action_errors_total", 1u64);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jso_core::{Config, JsonServerSpec};
    use jso_kubehub::mem::MemoryStore;

    fn record(replicas: Option<i32>, cfg: &str) -> JsonServer {
        let mut js = JsonServer::new("app-a", JsonServerSpec { replicas, json_config: cfg.into() });
        js.metadata.namespace = Some("ns".into());
        js.metadata.uid = Some("0b0e5f36-6a53-4f43-a37c-9bd49c1e8c8f".into());
        js
    }

    fn factory() -> DescriptorFactory {
        DescriptorFactory::new(&Config::default())
    }

    #[test]
    fn descriptions_and_reasons() {
        let f = factory();
        let js = JsonServer::new("", JsonServerSpec::default());
        let create = FixAction::create(js.key(), f.build(ChildKind::Endpoint, &js));
        assert_eq!(create.event_reason(), "Create-Service");
        assert_eq!(create.description(), "Service / was missing");

        let js = record(Some(2), "{}");
        let update = FixAction::update(js.key(), f.build(ChildKind::Workload, &js), "differences: [replicas]");
        assert_eq!(update.event_reason(), "Update-Deployment");
        assert_eq!(update.description(), "Deployment ns/app-a was out of sync - differences: [replicas]");
    }

    #[tokio::test]
    async fn empty_store_plans_creates_in_fixed_order() {
        let store = MemoryStore::new();
        let p = plan(&store, &factory(), &record(Some(1), "{}")).await;
        assert!(p.errors.is_empty());
        let got: Vec<_> = p.actions.iter().map(|a| (a.verb, a.kind())).collect();
        assert_eq!(
            got,
            vec![(Verb::Create, ChildKind::DataBlob), (Verb::Create, ChildKind::Workload), (Verb::Create, ChildKind::Endpoint)]
        );
    }

    #[tokio::test]
    async fn drift_plans_versioned_update_with_reason() {
        let store = MemoryStore::new();
        let f = factory();
        let js = record(Some(1), r#"{"a":1}"#);
        for a in plan(&store, &f, &js).await.actions {
            apply(&a, &js, &store).await.unwrap();
        }
        let changed = record(Some(3), r#"{"a":2}"#);
        let p = plan(&store, &f, &changed).await;
        assert_eq!(p.actions.len(), 2);
        assert_eq!(p.actions[0].reason, "differences: [data field db.json changed]");
        assert_eq!(p.actions[1].reason, "differences: [replicas]");
        assert!(p.actions.iter().all(|a| a.verb == Verb::Update && a.target.resource_version().is_some()));
    }

    #[tokio::test]
    async fn apply_without_owner_uid_is_aborted() {
        let store = MemoryStore::new();
        let mut js = record(Some(1), "{}");
        js.metadata.uid = None;
        let action = FixAction::create(js.key(), factory().build(ChildKind::DataBlob, &js));
        let err = apply(&action, &js, &store).await.unwrap_err();
        assert!(err.to_string().starts_with("cannot set ControllerReference for ConfigMap owned by ns/app-a"), "err={}", err);
        assert!(store.get_child(ChildKind::DataBlob, &js.key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_of_foreign_controlled_child_is_refused() {
        let store = MemoryStore::new();
        let f = factory();
        let js = record(Some(1), "{}");
        for a in plan(&store, &f, &js).await.actions {
            apply(&a, &js, &store).await.unwrap();
        }
        let mut live = store.get_child(ChildKind::Workload, &js.key()).await.unwrap().unwrap();
        if let Some(refs) = live.meta_mut().owner_references.as_mut() {
            refs[0].uid = "someone-else".into();
            refs[0].name = "other".into();
        }
        store.put_child(live);

        let p = plan(&store, &f, &record(Some(4), "{}")).await;
        assert_eq!(p.actions.len(), 1);
        let err = apply(&p.actions[0], &js, &store).await.unwrap_err();
        assert!(matches!(err, ActionError::Ownership { source: OwnershipError::AlreadyOwned { .. }, .. }), "err={}", err);
        assert_eq!(store.writes().iter().filter(|w| w.starts_with("update")).count(), 0);
    }

    #[tokio::test]
    async fn read_errors_only_skip_their_kind() {
        let store = MemoryStore::new();
        store.fail_get(ChildKind::Workload, StoreError::Internal("boom".into()));
        let p = plan(&store, &factory(), &record(Some(1), "{}")).await;
        assert_eq!(p.actions.len(), 2);
        assert_eq!(p.errors, vec!["cannot get Deployment ns/app-a: internal: boom".to_string()]);
    }
}
