//! Seams to the external resource store and the event sink.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::child::{ChildKind, ChildResource};
use crate::crd::{JsonServer, JsonServerStatus};
use crate::error::StoreError;
use crate::key::ObjectKey;

/// Resource store consumed by the reconciler. Every call is a single atomic store operation.
#[async_trait::async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch the desired-state record. `Ok(None)` when it no longer exists.
    async fn get_record(&self, key: &ObjectKey) -> Result<Option<JsonServer>, StoreError>;

    /// Fetch the live child of `kind` with the given identity.
    async fn get_child(&self, kind: ChildKind, key: &ObjectKey) -> Result<Option<ChildResource>, StoreError>;

    async fn create(&self, child: &ChildResource) -> Result<(), StoreError>;

    /// Full-object replace. When the child carries a resourceVersion the write is version-checked
    /// and fails with [`StoreError::Conflict`] if the live object moved on.
    async fn update(&self, child: &ChildResource) -> Result<(), StoreError>;

    /// Persist the status sub-record. A status without `replicas` keeps the stored value.
    async fn update_status(&self, key: &ObjectKey, status: &JsonServerStatus) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Normal,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Normal => f.write_str("Normal"),
            Severity::Warning => f.write_str("Warning"),
        }
    }
}

/// Event sink. Fire-and-forget: implementations log their own delivery failures.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn emit(&self, subject: &JsonServer, severity: Severity, reason: &str, message: &str);
}
