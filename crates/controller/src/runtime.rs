//! Controller runtime: watches `JsonServer` records and their children and drives the reconciler.

use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::{
    runtime::{controller::Action, watcher, Controller},
    Api, Client, Resource,
};
use tracing::{info, warn};

use jso_core::{Config, JsonServer};
use jso_kubehub::{ensure_crd_served, get_kube_client, KubeNotifier, KubeStore};

use crate::reconciler::{ReconcileError, Reconciler, Requeue};

pub struct Context {
    pub reconciler: Reconciler<KubeStore, KubeNotifier>,
    pub cfg: Config,
}

/// Map a cycle's requeue decision onto the runtime's scheduling primitive.
pub fn to_action(requeue: &Requeue, cfg: &Config) -> Action {
    match requeue {
        Requeue::AwaitChange => Action::await_change(),
        Requeue::After(d) => Action::requeue(*d),
        // never zero; bounded by the retry delay
        Requeue::Immediate => Action::requeue(cfg.retry_after),
    }
}

async fn reconcile(obj: Arc<JsonServer>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let outcome = ctx.reconciler.reconcile(&obj.key()).await?;
    Ok(to_action(&outcome.requeue, &ctx.cfg))
}

fn error_policy(obj: Arc<JsonServer>, err: &ReconcileError, ctx: Arc<Context>) -> Action {
    warn!(key = %obj.key(), error = %err, "reconcile failed; retrying");
    Action::requeue(ctx.cfg.retry_after)
}

fn scoped<K>(client: &Client, ns: Option<&str>) -> Api<K>
where
    K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    match ns {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Run the operator until a termination signal arrives.
pub async fn run(cfg: Config) -> Result<()> {
    let client = get_kube_client().await?;
    ensure_crd_served(client.clone()).await?;

    let ns = cfg.namespace.as_deref();
    let records: Api<JsonServer> = scoped(&client, ns);
    let ctx = Arc::new(Context {
        reconciler: Reconciler::new(
            KubeStore::new(client.clone(), cfg.manager.clone()),
            KubeNotifier::new(client.clone(), cfg.manager.clone()),
            cfg.clone(),
        ),
        cfg: cfg.clone(),
    });

    info!(namespace = ?ns, image = %cfg.image, "starting jsonserver controller");
    Controller::new(records, watcher::Config::default())
        .owns(scoped::<ConfigMap>(&client, ns), watcher::Config::default())
        .owns(scoped::<Deployment>(&client, ns), watcher::Config::default())
        .owns(scoped::<Service>(&client, ns), watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => tracing::debug!(object = %obj.name, "reconciled"),
                Err(e) => warn!(error = %e, "controller error"),
            }
        })
        .await;
    info!("controller stopped");
    Ok(())
}
