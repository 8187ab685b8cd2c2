//! JsonServer operator controller: the reconcile cycle, its status state machine and the kube runtime loop.

#![forbid(unsafe_code)]

pub mod reconciler;
pub mod runtime;
pub mod status;

pub use reconciler::{Outcome, ReconcileError, Reconciler, Requeue};
pub use runtime::{run, to_action};
pub use status::{next_status, StatusInputs, MSG_SYNCED, MSG_UPDATING};
