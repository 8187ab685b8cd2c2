//! Payload checks shared by admission and the control loop.

use serde::de::IgnoredAny;
use sha2::{Digest, Sha256};

use crate::error::ValidationError;

/// Hex characters kept from the digest; label values are capped at 63 characters.
const FINGERPRINT_LEN: usize = 32;

/// Well-formed JSON check. Admission and reconcile both call this, so they can never disagree.
pub fn validate_config(payload: &str) -> Result<(), ValidationError> {
    serde_json::from_str::<IgnoredAny>(payload)
        .map(|_| ())
        .map_err(|e| ValidationError(e.to_string()))
}

/// Content fingerprint used as the data blob label.
pub fn fingerprint(payload: &str) -> String {
    let digest = Sha256::digest(payload.as_bytes());
    let mut out = hex::encode(digest);
    out.truncate(FINGERPRINT_LEN);
    out
}
