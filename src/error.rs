//! Error types for the cloudrig orchestration layer.
//!
//! This module provides the error hierarchy shared by both pipelines:
//! configuration, stack reconciliation, and object storage.

use std::path::PathBuf;
use thiserror::Error;

use crate::stack::{ResourceChange, StackEvent};

/// The main error type for cloudrig.
#[derive(Debug, Error)]
pub enum CloudrigError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Stack control-plane errors.
    #[error("Stack error: {0}")]
    Stack(#[from] StackError),

    /// Object storage errors.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration errors. Raised before any network call is made.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required argument was missing or empty.
    #[error("Missing required argument: {name}")]
    MissingArgument {
        /// Name of the missing argument.
        name: String,
    },

    /// The local template file does not exist.
    #[error("Template not found: {path}")]
    TemplateNotFound {
        /// Path that was checked.
        path: PathBuf,
    },

    /// Both or neither template sources were given.
    #[error("Exactly one of a template path or a template URL is required")]
    AmbiguousTemplateSource,

    /// A local file was not found.
    #[error("File not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// A configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Only one half of a static key pair was supplied.
    #[error("Incomplete credentials: {missing} is not set")]
    IncompleteCredentials {
        /// Name of the missing half.
        missing: String,
    },

    /// A value was present but invalid.
    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        /// Field that failed validation.
        field: String,
        /// Description of the problem.
        message: String,
    },
}

/// Stack reconciliation errors.
#[derive(Debug, Error)]
pub enum StackError {
    /// The control plane reported that the stack does not exist.
    #[error("Stack with id {stack} does not exist")]
    NotFound {
        /// Stack name or id.
        stack: String,
    },

    /// An update would replace a protected resource type.
    #[error(
        "Update of stack {stack} blocked: change set {change_set_id} replaces protected resources [{}]",
        describe_changes(.changes)
    )]
    ProtectionViolation {
        /// Stack name.
        stack: String,
        /// Id of the evaluated change set.
        change_set_id: String,
        /// The offending proposed changes.
        changes: Vec<ResourceChange>,
    },

    /// A terminal failure status was observed while polling.
    #[error("{stack} experienced a CloudFormation error (status {status})")]
    ConvergenceFailure {
        /// Stack name.
        stack: String,
        /// Terminal status that was observed.
        status: String,
        /// Most recent stack events, newest first.
        events: Vec<StackEvent>,
    },

    /// The poll budget ran out before a terminal state.
    #[error("Timeout waiting for CloudFormation stack: {stack} (budget {budget_ms} ms)")]
    Timeout {
        /// Stack name.
        stack: String,
        /// Budget that was granted, in milliseconds.
        budget_ms: u64,
    },

    /// The change set could not be created for a reason other than "no changes".
    #[error("Change set {change_set_id} for stack {stack} failed: {reason}")]
    ChangeSetFailed {
        /// Stack name.
        stack: String,
        /// Change set id.
        change_set_id: String,
        /// Status reason reported by the control plane.
        reason: String,
    },

    /// Any other control-plane failure.
    #[error("CloudFormation {operation} failed: {message}")]
    Api {
        /// Operation that failed.
        operation: String,
        /// Message from the control plane.
        message: String,
    },
}

/// Object storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Any control-plane failure.
    #[error("S3 {operation} failed: {message}")]
    Api {
        /// Operation that failed.
        operation: String,
        /// Message from the control plane.
        message: String,
    },

    /// The control plane returned a response that cannot be followed.
    #[error("Invalid response from S3: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },

    /// A delete-many call reported failures for some keys.
    #[error("Failed to delete {} of {attempted} objects in {bucket}: {}", .failures.len(), .failures.join("; "))]
    PartialDelete {
        /// Bucket name.
        bucket: String,
        /// Number of keys sent.
        attempted: usize,
        /// Per-key failure descriptions.
        failures: Vec<String>,
    },
}

/// Result type alias for cloudrig operations.
pub type Result<T> = std::result::Result<T, CloudrigError>;

fn describe_changes(changes: &[ResourceChange]) -> String {
    changes
        .iter()
        .map(|c| format!("{} ({})", c.logical_id, c.resource_type))
        .collect::<Vec<_>>()
        .join(", ")
}

impl CloudrigError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this is the control plane's "stack does not exist" answer.
    #[must_use]
    pub const fn is_stack_not_found(&self) -> bool {
        matches!(self, Self::Stack(StackError::NotFound { .. }))
    }
}

impl ConfigError {
    /// Creates a missing-argument error.
    #[must_use]
    pub fn missing(name: impl Into<String>) -> Self {
        Self::MissingArgument { name: name.into() }
    }

    /// Creates an invalid-value error for a specific field.
    #[must_use]
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl StackError {
    /// Creates a control-plane error for the given operation.
    #[must_use]
    pub fn api(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

impl StorageError {
    /// Creates a control-plane error for the given operation.
    #[must_use]
    pub fn api(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid-response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}

/// Fails with [`ConfigError::MissingArgument`] when `value` is empty or whitespace.
///
/// # Errors
///
/// Returns an error if the value is blank.
pub fn require(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::missing(name).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_detected() {
        let err: CloudrigError = StackError::NotFound {
            stack: String::from("s1"),
        }
        .into();
        assert!(err.is_stack_not_found());
        assert_eq!(
            err.to_string(),
            "Stack error: Stack with id s1 does not exist"
        );

        let other: CloudrigError = StackError::api("DescribeStacks", "throttled").into();
        assert!(!other.is_stack_not_found());
    }

    #[test]
    fn test_require_rejects_blank() {
        assert!(require("stack_name", "s1").is_ok());
        assert!(matches!(
            require("stack_name", "  "),
            Err(CloudrigError::Config(ConfigError::MissingArgument { .. }))
        ));
    }

    #[test]
    fn test_protection_violation_names_resources() {
        let err = StackError::ProtectionViolation {
            stack: String::from("s1"),
            change_set_id: String::from("cs-1"),
            changes: vec![ResourceChange {
                logical_id: String::from("Database"),
                resource_type: String::from("AWS::RDS::DBInstance"),
                action: String::from("Modify"),
                replacement_required: true,
            }],
        };
        let message = err.to_string();
        assert!(message.contains("Database (AWS::RDS::DBInstance)"));
        assert!(message.contains("cs-1"));
    }
}
