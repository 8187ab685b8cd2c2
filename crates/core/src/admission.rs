//! Admission-time defaulting and validation of `JsonServer` records.
//!
//! The HTTP webhook serving these checks lives outside this workspace; it calls
//! [`apply_defaults`] and [`validate`] and reuses [`crate::validate_config`] exactly
//! as the reconciler does.

use kube::ResourceExt;
use tracing::{debug, info};

use crate::config::Config;
use crate::crd::JsonServer;
use crate::validate::validate_config;

/// Record names must carry this prefix.
pub const REQUIRED_PREFIX: &str = "app-";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("validation issues: {}", .0.join("; "))]
pub struct AdmissionError(pub Vec<String>);

/// Mutating step: fill in `spec.replicas` when unset.
pub fn apply_defaults(record: &mut JsonServer, cfg: &Config) {
    debug!(name = %record.name_any(), "admission: default");
    if record.spec.replicas.is_none() {
        record.spec.replicas = Some(cfg.default_replicas);
    }
}

/// Validating step for create and update. Deletes are always admitted.
pub fn validate(record: &JsonServer) -> Result<(), AdmissionError> {
    let name = record.name_any();
    let mut issues = Vec::new();
    if record.spec.replicas.is_some_and(|r| r < 0) {
        issues.push("replicas must be greater than or equal to 0".to_string());
    }
    if !name.starts_with(REQUIRED_PREFIX) {
        issues.push(format!("resource name must start with '{}'", REQUIRED_PREFIX));
    }
    if let Err(e) = validate_config(&record.spec.json_config) {
        issues.push(e.to_string());
    }
    if issues.is_empty() {
        info!(%name, "admission: validation ok");
        Ok(())
    } else {
        info!(%name, issues = %issues.join(";"), "admission: validation issues");
        Err(AdmissionError(issues))
    }
}
