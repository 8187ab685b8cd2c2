//! JsonServer operator core: resource types, store seams and shared validation.

#![forbid(unsafe_code)]

pub mod admission;
pub mod child;
pub mod config;
pub mod crd;
pub mod error;
pub mod key;
pub mod store;
pub mod validate;

pub use child::{ChildKind, ChildResource};
pub use config::Config;
pub use crd::{JsonServer, JsonServerSpec, JsonServerStatus, SyncState};
pub use error::{StoreError, ValidationError};
pub use key::ObjectKey;
pub use store::{Notifier, ResourceStore, Severity};
pub use validate::{fingerprint, validate_config};

pub mod prelude {
    pub use super::{
        ChildKind, ChildResource, Config, JsonServer, JsonServerSpec, JsonServerStatus, Notifier, ObjectKey,
        ResourceStore, Severity, StoreError, SyncState, ValidationError,
    };
}

/// Key under which the JSON document is stored in the data blob and mounted in the workload.
pub const CONFIG_FIELD: &str = "db.json";
/// Label carrying the content fingerprint of the data blob.
pub const FINGERPRINT_LABEL: &str = "config-fingerprint";
/// Identity label key; reserved, always set by the operator.
pub const IDENTITY_LABEL: &str = "app";
/// Port served by the workload and exposed by the endpoint.
pub const HTTP_PORT: i32 = 3000;
pub const HTTP_PORT_NAME: &str = "http";
pub const HTTP_PROTOCOL: &str = "TCP";
