//! Controller ownership linkage from a record to its children.
//!
//! The store's garbage collector deletes children whose controller owner is gone, so
//! cascading deletes need nothing beyond this reference.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;

use jso_core::{ChildResource, JsonServer};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OwnershipError {
    #[error("owner {0} has no uid")]
    MissingUid(String),
    #[error("{child} is already controlled by {kind} {name}")]
    AlreadyOwned { child: String, kind: String, name: String },
}

/// Attach or refresh the controller reference on `child`. Other non-controller owner
/// references are preserved.
pub fn set_controller_reference(owner: &JsonServer, child: &mut ChildResource) -> Result<(), OwnershipError> {
    let owner_ref = controller_ref(owner)?;
    let child_desc = format!("{} {}", child.kind(), child.key());
    let refs = child.meta_mut().owner_references.get_or_insert_with(Vec::new);
    if let Some(existing) = refs.iter().find(|r| r.controller == Some(true) && r.uid != owner_ref.uid) {
        return Err(OwnershipError::AlreadyOwned {
            child: child_desc,
            kind: existing.kind.clone(),
            name: existing.name.clone(),
        });
    }
    refs.retain(|r| r.uid != owner_ref.uid);
    refs.push(owner_ref);
    Ok(())
}

fn controller_ref(owner: &JsonServer) -> Result<OwnerReference, OwnershipError> {
    let uid = owner.meta().uid.clone().ok_or_else(|| {
        OwnershipError::MissingUid(owner.meta().name.clone().unwrap_or_default())
    })?;
    Ok(OwnerReference {
        api_version: JsonServer::api_version(&()).to_string(),
        kind: JsonServer::kind(&()).to_string(),
        name: owner.meta().name.clone().unwrap_or_default(),
        uid,
        controller: Some(true),
        block_owner_deletion: Some(false),
    })
}
