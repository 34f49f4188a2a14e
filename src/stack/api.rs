//! Stack control-plane seam.
//!
//! The reconciliation engine talks to the control plane only through
//! [`StackApi`]; the AWS implementation lives in `aws.rs`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{FailureAction, StackParameter};
use crate::error::Result;

/// Read-only projection of a stack, fetched on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackSnapshot {
    /// Stack name.
    pub name: String,
    /// Stack id (ARN), when reported.
    pub stack_id: Option<String>,
    /// Lifecycle status, e.g. `CREATE_IN_PROGRESS`.
    pub status: String,
    /// Reason attached to the status.
    pub status_reason: Option<String>,
    /// Parameters currently applied.
    pub parameters: Vec<StackParameter>,
    /// Stack outputs.
    pub outputs: Vec<StackOutput>,
    /// Whether termination protection is enabled.
    pub termination_protection: bool,
}

/// A single stack output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackOutput {
    /// Output key.
    pub key: String,
    /// Output value.
    pub value: String,
    /// Description from the template.
    pub description: Option<String>,
    /// Export name, if exported.
    pub export_name: Option<String>,
}

/// A proposed change to one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceChange {
    /// Logical resource id in the template.
    pub logical_id: String,
    /// Resource type, e.g. `AWS::RDS::DBInstance`.
    pub resource_type: String,
    /// `Add`, `Modify`, `Remove`, ...
    pub action: String,
    /// Whether applying the change replaces the physical resource.
    pub replacement_required: bool,
}

/// A change set as evaluated by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    /// Change set id.
    pub id: String,
    /// Creation status, e.g. `CREATE_COMPLETE` or `FAILED`.
    pub status: String,
    /// Execution status, e.g. `AVAILABLE`.
    pub execution_status: String,
    /// Reason attached to the status.
    pub status_reason: Option<String>,
    /// Proposed changes.
    pub changes: Vec<ResourceChange>,
}

/// One entry of a stack's event history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackEvent {
    /// When the event happened.
    pub timestamp: Option<DateTime<Utc>>,
    /// Logical resource id.
    pub logical_id: String,
    /// Resource type.
    pub resource_type: String,
    /// Resource status.
    pub status: String,
    /// Reason attached to the status.
    pub reason: Option<String>,
}

impl std::fmt::Display for StackEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ts) = self.timestamp {
            write!(f, "{} ", ts.format("%Y-%m-%d %H:%M:%S"))?;
        }
        write!(f, "{} {} {}", self.logical_id, self.resource_type, self.status)?;
        if let Some(reason) = &self.reason {
            write!(f, ": {reason}")?;
        }
        Ok(())
    }
}

/// Template body as sent to the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateBody {
    /// Template text read from disk.
    Inline(String),
    /// Template hosted at a URL.
    Url(String),
}

/// Input for a stack create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateStackInput {
    /// Stack name.
    pub stack_name: String,
    /// Template.
    pub template: TemplateBody,
    /// Parameters.
    pub parameters: Vec<StackParameter>,
    /// Acknowledged capabilities.
    pub capabilities: Vec<String>,
    /// Notification topic ARNs.
    pub notification_targets: Vec<String>,
    /// Behaviour on create failure.
    pub failure_action: FailureAction,
    /// Enable termination protection.
    pub termination_protection: bool,
    /// Idempotency token.
    pub client_request_token: String,
}

/// Input for a change set create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSetInput {
    /// Stack name.
    pub stack_name: String,
    /// Change set name.
    pub change_set_name: String,
    /// Template.
    pub template: TemplateBody,
    /// Parameters.
    pub parameters: Vec<StackParameter>,
    /// Acknowledged capabilities.
    pub capabilities: Vec<String>,
    /// Notification topic ARNs.
    pub notification_targets: Vec<String>,
    /// Idempotency token.
    pub client_token: String,
}

/// Stack operations of the control plane.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StackApi: Send + Sync {
    /// Reads a stack.
    ///
    /// Fails with `StackError::NotFound` when the stack does not exist.
    async fn describe_stack(&self, stack_name: &str) -> Result<StackSnapshot>;

    /// Submits a stack create and returns the stack id.
    async fn create_stack(&self, input: &CreateStackInput) -> Result<String>;

    /// Submits a change set create and returns the change set id.
    async fn create_change_set(&self, input: &ChangeSetInput) -> Result<String>;

    /// Reads a change set with all of its proposed changes.
    async fn describe_change_set(&self, stack_name: &str, change_set_id: &str) -> Result<ChangeSet>;

    /// Executes a change set.
    async fn execute_change_set(&self, stack_name: &str, change_set_id: &str) -> Result<()>;

    /// Discards a change set.
    async fn delete_change_set(&self, stack_name: &str, change_set_id: &str) -> Result<()>;

    /// Submits a stack delete.
    async fn delete_stack(&self, stack_name: &str, client_request_token: &str) -> Result<()>;

    /// Turns termination protection on or off.
    async fn update_termination_protection(&self, stack_name: &str, enable: bool) -> Result<()>;

    /// Reads the most recent stack events, newest first.
    async fn describe_stack_events(&self, stack_name: &str, limit: usize) -> Result<Vec<StackEvent>>;
}
