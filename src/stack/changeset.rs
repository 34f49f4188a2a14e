//! Change set naming and evaluation helpers.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

use crate::config::StackParameter;

use super::api::{ChangeSet, ResourceChange, TemplateBody};

/// Prefix of every change set this crate creates.
pub const CHANGE_SET_PREFIX: &str = "cloudrig";

/// Number of hex digits of the digest kept in the name.
const NAME_HASH_LEN: usize = 12;

/// Reason fragments the control plane uses when a change set has nothing to do.
const NO_CHANGES_MARKERS: &[&str] = &[
    "didn't contain changes",
    "no updates are to be performed",
    "no changes",
];

/// Derives a change set name from the desired template and parameters.
///
/// The digest part is stable for one desired state; the timestamp suffix keeps
/// names unique across repeated deployments of that state.
#[must_use]
pub fn change_set_name(
    template: &TemplateBody,
    parameters: &[StackParameter],
    issued_at: DateTime<Utc>,
) -> String {
    let mut hasher = Sha256::new();

    match template {
        TemplateBody::Inline(body) => {
            hasher.update(b"inline:");
            hasher.update(body.as_bytes());
        }
        TemplateBody::Url(url) => {
            hasher.update(b"url:");
            hasher.update(url.as_bytes());
        }
    }

    for param in parameters {
        hasher.update(b"\0");
        hasher.update(param.key.as_bytes());
        hasher.update(b"=");
        hasher.update(param.value.as_bytes());
    }

    let digest = hex::encode(hasher.finalize());
    format!(
        "{CHANGE_SET_PREFIX}-{}-{}",
        &digest[..NAME_HASH_LEN],
        issued_at.format("%Y%m%d%H%M%S")
    )
}

/// Returns true if the change set was rejected only because nothing would change.
#[must_use]
pub fn is_no_changes(change_set: &ChangeSet) -> bool {
    change_set.status_reason.as_deref().is_some_and(|reason| {
        let reason = reason.to_ascii_lowercase();
        NO_CHANGES_MARKERS.iter().any(|m| reason.contains(m))
    })
}

/// Returns true while the control plane is still computing the change set.
#[must_use]
pub fn is_pending(change_set: &ChangeSet) -> bool {
    matches!(
        change_set.status.as_str(),
        "CREATE_PENDING" | "CREATE_IN_PROGRESS"
    )
}

/// Returns the proposed changes that replace a protected resource type.
#[must_use]
pub fn protected_replacements(
    changes: &[ResourceChange],
    protected: &BTreeSet<String>,
) -> Vec<ResourceChange> {
    changes
        .iter()
        .filter(|c| c.replacement_required && protected.contains(&c.resource_type))
        .cloned()
        .collect()
}
