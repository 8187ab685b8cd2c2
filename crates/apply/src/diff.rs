//! Differ: named discrepancies between a target descriptor and the live one.

use std::collections::BTreeMap;

use jso_core::ChildResource;

/// Ordered discrepancy names; empty means in sync.
///
/// Data blob: sizes must match and every desired key must be present with the same value;
/// keys only present in the live object are tolerated. Workload: only the replica count is
/// compared, and only when the target sets one. Endpoint: never compared.
pub fn diff(desired: &ChildResource, observed: &ChildResource) -> Vec<String> {
    match (desired, observed) {
        (ChildResource::ConfigMap(d), ChildResource::ConfigMap(o)) => diff_data(d.data.as_ref(), o.data.as_ref()),
        (ChildResource::Deployment(d), ChildResource::Deployment(o)) => {
            let want = d.spec.as_ref().and_then(|s| s.replicas);
            let have = o.spec.as_ref().and_then(|s| s.replicas);
            match want {
                Some(w) if have != Some(w) => vec!["replicas".to_string()],
                _ => Vec::new(),
            }
        }
        // Known gap: endpoints are treated as immutable once created.
        (ChildResource::Service(_), ChildResource::Service(_)) => Vec::new(),
        _ => vec!["kind".to_string()],
    }
}

fn diff_data(desired: Option<&BTreeMap<String, String>>, observed: Option<&BTreeMap<String, String>>) -> Vec<String> {
    let empty = BTreeMap::new();
    let desired = desired.unwrap_or(&empty);
    let observed = observed.unwrap_or(&empty);
    let mut out = Vec::new();
    if desired.len() != observed.len() {
        out.push("data field len".to_string());
    }
    for (key, want) in desired {
        match observed.get(key) {
            None => out.push(format!("missing field {}", key)),
            Some(have) if have != want => out.push(format!("data field {} changed", key)),
            Some(_) => {}
        }
    }
    out
}
