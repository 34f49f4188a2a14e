//! Stack reconciliation for cloudrig.
//!
//! This module converges one named infrastructure stack to a desired
//! template and parameter set:
//! - Create when absent, update through an evaluated change set when present
//! - Refuse updates that would replace protected resource types
//! - Poll until a terminal state within a millisecond budget

mod api;
mod aws;
mod changeset;
mod reconciler;
mod request;
mod status;

pub use api::{
    ChangeSet, ChangeSetInput, CreateStackInput, ResourceChange, StackApi, StackEvent,
    StackOutput, StackSnapshot, TemplateBody,
};
#[cfg(test)]
pub use api::MockStackApi;
pub use aws::CloudFormationApi;
pub use changeset::{change_set_name, is_no_changes, protected_replacements, CHANGE_SET_PREFIX};
pub use reconciler::StackReconciler;
pub use request::{DeploymentAction, DeploymentOutcome, DeploymentRequest, TerminationProtectionAck};
pub use status::{classify, PollBudget, StatusClass};
