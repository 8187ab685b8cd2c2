//! JsonServer operator apply: child descriptors, diffs and corrective fix actions.

#![forbid(unsafe_code)]

pub mod actions;
pub mod descriptors;
pub mod diff;
pub mod ownership;

pub use actions::{apply, plan, ActionError, FixAction, Plan, Verb};
pub use descriptors::{selector_string, workload_labels, DescriptorFactory};
pub use diff::diff;
pub use ownership::{set_controller_reference, OwnershipError};
