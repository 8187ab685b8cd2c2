//! Operator configuration. Read once at startup and passed down explicitly.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Container image run by the workload.
    pub image: String,
    /// Applied at admission when a record leaves `spec.replicas` unset.
    pub default_replicas: i32,
    /// Restrict the watch to one namespace; `None` watches all.
    pub namespace: Option<String>,
    /// Delay before re-checking convergence after corrective actions ran.
    pub requeue_after_actions: Duration,
    /// Delay for continued drift watching once replicas were observed.
    pub requeue_drift: Duration,
    /// Delay used for "retry immediately" outcomes, including failed status writes.
    pub retry_after: Duration,
    /// Field manager and event reporter name.
    pub manager: String,
    pub metrics_addr: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            image: "backplane/json-server".to_string(),
            default_replicas: 2,
            namespace: None,
            requeue_after_actions: Duration::from_secs(30),
            requeue_drift: Duration::from_secs(15),
            retry_after: Duration::from_secs(1),
            manager: "jsonserver-operator".to_string(),
            metrics_addr: None,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_secs)
}

impl Config {
    /// Defaults overridden by `JSO_*` environment variables. Unparsable values fall back to defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            image: std::env::var("JSO_IMAGE").ok().filter(|s| !s.is_empty()).unwrap_or(d.image),
            default_replicas: env_parse::<i32>("JSO_DEFAULT_REPLICAS").filter(|r| *r >= 0).unwrap_or(d.default_replicas),
            namespace: std::env::var("JSO_NAMESPACE").ok().filter(|s| !s.is_empty()),
            requeue_after_actions: env_secs("JSO_REQUEUE_ACTIONS_SECS").unwrap_or(d.requeue_after_actions),
            requeue_drift: env_secs("JSO_REQUEUE_DRIFT_SECS").unwrap_or(d.requeue_drift),
            retry_after: env_secs("JSO_RETRY_SECS").unwrap_or(d.retry_after),
            manager: std::env::var("JSO_MANAGER").ok().filter(|s| !s.is_empty()).unwrap_or(d.manager),
            metrics_addr: std::env::var("JSO_METRICS_ADDR").ok().filter(|s| !s.is_empty()),
        }
    }
}
