//! One reconcile cycle: Fetch, Validate, Diff, Execute, Observe, Status, Requeue decision.

use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tracing::{debug, error, info, instrument, warn};

use jso_apply::{apply, plan, selector_string, DescriptorFactory, FixAction};
use jso_core::{
    validate_config, ChildKind, ChildResource, Config, JsonServer, JsonServerStatus, Notifier, ObjectKey,
    ResourceStore, Severity, StoreError, ValidationError,
};

use crate::status::{next_status, StatusInputs};

/// When the next cycle for this key should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    /// Only external watch triggers.
    AwaitChange,
    After(Duration),
    /// Retry as soon as the runtime allows.
    Immediate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub requeue: Requeue,
    /// Status persisted this cycle; `None` when the record was gone.
    pub status: Option<JsonServerStatus>,
    /// Descriptions of the actions attempted, in apply order.
    pub actions: Vec<String>,
    pub critical_errors: Vec<String>,
}

impl Outcome {
    fn deleted() -> Self {
        Self { requeue: Requeue::AwaitChange, status: None, actions: Vec::new(), critical_errors: Vec::new() }
    }
}

/// The only failure a caller sees: the status write itself failed.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("cannot update status of {key}: {source}")]
    StatusWrite { key: ObjectKey, source: StoreError },
}

#[derive(Debug, Default)]
struct Cycle {
    critical_errors: Vec<String>,
    actions: Vec<String>,
}

pub struct Reconciler<S, N> {
    store: S,
    notifier: N,
    factory: DescriptorFactory,
    cfg: Config,
}

impl<S: ResourceStore, N: Notifier> Reconciler<S, N> {
    pub fn new(store: S, notifier: N, cfg: Config) -> Self {
        Self { factory: DescriptorFactory::new(&cfg), store, notifier, cfg }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Run one cycle for `key`. Status is persisted on every path past Fetch.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Outcome, ReconcileError> {
        let t0 = Instant::now();
        counter!("reconcile_total", 1u64);
        let mut cycle = Cycle::default();

        let record = match self.store.get_record(key).await {
            Ok(Some(r)) => Some(r),
            Ok(None) => {
                info!("resource deleted, sub resources will be removed by the garbage collector");
                return Ok(Outcome::deleted());
            }
            Err(e) if e.is_not_found() => {
                info!("resource deleted, sub resources will be removed by the garbage collector");
                return Ok(Outcome::deleted());
            }
            Err(e) => {
                warn!(error = %e, "cannot get resource");
                cycle.critical_errors.push(format!("cannot get resource {}: {}", key, e));
                None
            }
        };

        if let Some(record) = &record {
            if let Err(e) = self.converge(record, &mut cycle).await {
                cycle.critical_errors.push(e.to_string());
            }
        }

        let res = self.finish(key, record.as_ref(), cycle).await;
        histogram!("reconcile_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
        res
    }

    /// Validate, plan and execute. Action failures are collected; none aborts its siblings.
    async fn converge(&self, record: &JsonServer, cycle: &mut Cycle) -> Result<(), ValidationError> {
        validate_config(&record.spec.json_config)?;

        let planned = plan(&self.store, &self.factory, record).await;
        cycle.critical_errors.extend(planned.errors);
        for action in &planned.actions {
            let res = apply(action, record, &self.store).await;
            match &res {
                Ok(()) => info!(action = %action, "action scheduled"),
                Err(e) => {
                    error!(action = %action, error = %e, "action failed");
                    cycle.critical_errors.push(format!("internal - {}: {}", action, e));
                }
            }
            self.emit(record, action, res.as_ref().err().map(|e| e.to_string())).await;
            cycle.actions.push(action.description());
        }
        Ok(())
    }

    async fn emit(&self, record: &JsonServer, action: &FixAction, err: Option<String>) {
        let (severity, message) = match err {
            None => (Severity::Normal, action.description()),
            Some(e) => (Severity::Warning, format!("{} -> {}", action.description(), e)),
        };
        self.notifier.emit(record, severity, &action.event_reason(), &message).await;
    }

    /// Best-effort read of available workload replicas. Failures are logged, never escalated.
    async fn observe_replicas(&self, key: &ObjectKey) -> Option<i32> {
        match self.store.get_child(ChildKind::Workload, key).await {
            Ok(Some(ChildResource::Deployment(d))) => {
                Some(d.status.and_then(|s| s.available_replicas).unwrap_or(0))
            }
            Ok(_) => {
                debug!("workload not present; replicas unavailable");
                None
            }
            Err(e) => {
                warn!(error = %e, "cannot check running pods");
                None
            }
        }
    }

    async fn finish(&self, key: &ObjectKey, record: Option<&JsonServer>, cycle: Cycle) -> Result<Outcome, ReconcileError> {
        let observed = self.observe_replicas(key).await;
        let status = next_status(&StatusInputs {
            critical_errors: cycle.critical_errors.clone(),
            actions_executed: cycle.actions.len(),
            observed_replicas: observed,
            requested_replicas: record.and_then(|r| r.requested_replicas()),
            selector: record.map(selector_string),
        });
        if !cycle.critical_errors.is_empty() {
            counter!("reconcile_errors_total", 1u64);
        }

        info!(state = %status.state, message = %status.message, "updating status");
        match self.store.update_status(key, &status).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => debug!("resource gone before status write"),
            Err(source) => return Err(ReconcileError::StatusWrite { key: key.clone(), source }),
        }

        let requeue = if record.is_none() {
            Requeue::Immediate
        } else if !cycle.actions.is_empty() {
            Requeue::After(self.cfg.requeue_after_actions)
        } else if observed.is_some() {
            Requeue::After(self.cfg.requeue_drift)
        } else {
            Requeue::AwaitChange
        };
        Ok(Outcome { requeue, status: Some(status), actions: cycle.actions, critical_errors: cycle.critical_errors })
    }
}
