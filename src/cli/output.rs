//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::StackParameter;
use crate::error::{CloudrigError, StackError};
use crate::stack::{
    classify, DeploymentAction, DeploymentOutcome, StackOutput, StackSnapshot, StatusClass,
    TerminationProtectionAck,
};
use crate::storage::{BucketSummary, ObjectEntry, UploadReceipt};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

#[derive(Tabled)]
struct KeyValueRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct ObjectRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Size")]
    size: i64,
    #[tabled(rename = "Last Modified")]
    last_modified: String,
}

#[derive(Tabled)]
struct BucketRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Created")]
    created: String,
}

#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "Resource")]
    logical_id: String,
    #[tabled(rename = "Type")]
    resource_type: String,
    #[tabled(rename = "Action")]
    action: String,
}

#[derive(Serialize)]
struct ExistsJson<'a> {
    stack_name: &'a str,
    exists: bool,
}

#[derive(Serialize)]
struct CountJson<'a> {
    operation: &'a str,
    location: &'a str,
    count: usize,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    fn json<T: Serialize + ?Sized>(value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_default()
    }

    /// Formats a deploy or destroy outcome.
    #[must_use]
    pub fn format_outcome(&self, outcome: &DeploymentOutcome) -> String {
        match self.format {
            OutputFormat::Json => Self::json(outcome),
            OutputFormat::Text => {
                let mark = if outcome.complete {
                    "✓".green()
                } else {
                    "…".yellow()
                };
                let mut output = format!("{mark} {outcome}\n");
                if outcome.action == DeploymentAction::NoChanges {
                    output.push_str("   Stack already matches the template.\n");
                }
                if let Some(id) = &outcome.change_set_id {
                    let _ = writeln!(output, "   Change set: {id}");
                }
                output
            }
        }
    }

    /// Formats an existence check.
    #[must_use]
    pub fn format_exists(&self, stack_name: &str, exists: bool) -> String {
        match self.format {
            OutputFormat::Json => Self::json(&ExistsJson { stack_name, exists }),
            OutputFormat::Text => {
                if exists {
                    format!("{} Stack {stack_name} exists\n", "✓".green())
                } else {
                    format!("{} Stack {stack_name} does not exist\n", "✗".red())
                }
            }
        }
    }

    /// Formats a termination protection change.
    #[must_use]
    pub fn format_ack(&self, ack: &TerminationProtectionAck) -> String {
        match self.format {
            OutputFormat::Json => Self::json(ack),
            OutputFormat::Text => format!(
                "{} Termination protection {} for {}\n",
                "✓".green(),
                if ack.enabled { "enabled" } else { "disabled" },
                ack.stack_name
            ),
        }
    }

    /// Formats a stack snapshot.
    #[must_use]
    pub fn format_snapshot(&self, snapshot: &StackSnapshot) -> String {
        match self.format {
            OutputFormat::Json => Self::json(snapshot),
            OutputFormat::Text => {
                let status = match classify(&snapshot.status) {
                    StatusClass::Success => snapshot.status.green(),
                    StatusClass::Failure => snapshot.status.red(),
                    StatusClass::InProgress => snapshot.status.yellow(),
                };

                let mut output = format!("\n📦 Stack: {}\n\n", snapshot.name);
                let _ = writeln!(output, "   Status: {status}");
                if let Some(reason) = &snapshot.status_reason {
                    let _ = writeln!(output, "   Reason: {reason}");
                }
                if let Some(id) = &snapshot.stack_id {
                    let _ = writeln!(output, "   Id: {id}");
                }
                let _ = writeln!(
                    output,
                    "   Termination protection: {}",
                    snapshot.termination_protection
                );
                let _ = writeln!(
                    output,
                    "   Parameters: {}, Outputs: {}",
                    snapshot.parameters.len(),
                    snapshot.outputs.len()
                );
                output
            }
        }
    }

    /// Formats stack outputs.
    #[must_use]
    pub fn format_outputs(&self, outputs: &[StackOutput]) -> String {
        match self.format {
            OutputFormat::Json => Self::json(outputs),
            OutputFormat::Text => Self::key_value_table(
                outputs
                    .iter()
                    .map(|o| KeyValueRow {
                        key: o.key.clone(),
                        value: o.value.clone(),
                    })
                    .collect(),
                "No outputs.",
            ),
        }
    }

    /// Formats stack parameters.
    #[must_use]
    pub fn format_parameters(&self, parameters: &[StackParameter]) -> String {
        match self.format {
            OutputFormat::Json => Self::json(parameters),
            OutputFormat::Text => Self::key_value_table(
                parameters
                    .iter()
                    .map(|p| KeyValueRow {
                        key: p.key.clone(),
                        value: p.value.clone(),
                    })
                    .collect(),
                "No parameters.",
            ),
        }
    }

    fn key_value_table(rows: Vec<KeyValueRow>, empty: &str) -> String {
        if rows.is_empty() {
            return format!("   {empty}\n");
        }
        let mut output = Table::new(rows).to_string();
        output.push('\n');
        output
    }

    /// Formats a bucket listing.
    #[must_use]
    pub fn format_buckets(&self, buckets: &[BucketSummary]) -> String {
        match self.format {
            OutputFormat::Json => Self::json(buckets),
            OutputFormat::Text => {
                if buckets.is_empty() {
                    return String::from("   No buckets.\n");
                }
                let rows: Vec<BucketRow> = buckets
                    .iter()
                    .map(|b| BucketRow {
                        name: b.name.clone(),
                        created: b
                            .created
                            .map(|c| c.format("%Y-%m-%d %H:%M:%S").to_string())
                            .unwrap_or_default(),
                    })
                    .collect();
                let mut output = Table::new(rows).to_string();
                output.push('\n');
                output
            }
        }
    }

    /// Formats an object listing.
    #[must_use]
    pub fn format_objects(&self, objects: &[ObjectEntry]) -> String {
        match self.format {
            OutputFormat::Json => Self::json(objects),
            OutputFormat::Text => {
                if objects.is_empty() {
                    return String::from("   No objects.\n");
                }
                let total: i64 = objects.iter().map(|o| o.size).sum();
                let rows: Vec<ObjectRow> = objects
                    .iter()
                    .map(|o| ObjectRow {
                        key: o.key.clone(),
                        size: o.size,
                        last_modified: o
                            .last_modified
                            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                            .unwrap_or_default(),
                    })
                    .collect();
                let mut output = Table::new(rows).to_string();
                let _ = write!(output, "\n{} objects, {total} bytes\n", objects.len());
                output
            }
        }
    }

    /// Formats the result of a bulk operation.
    #[must_use]
    pub fn format_count(&self, operation: &str, location: &str, count: usize) -> String {
        match self.format {
            OutputFormat::Json => Self::json(&CountJson {
                operation,
                location,
                count,
            }),
            OutputFormat::Text => format!("{} {operation} {count} objects: {location}\n", "✓".green()),
        }
    }

    /// Formats upload receipts.
    #[must_use]
    pub fn format_uploads(&self, receipts: &[UploadReceipt]) -> String {
        match self.format {
            OutputFormat::Json => Self::json(receipts),
            OutputFormat::Text => {
                let mut output = String::new();
                for receipt in receipts {
                    let _ = writeln!(output, "{} {}", "✓".green(), receipt.location);
                }
                let _ = writeln!(output, "\nUploaded {} files", receipts.len());
                output
            }
        }
    }

    /// Formats a plain success message.
    #[must_use]
    pub fn format_message(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Json => Self::json(&serde_json::json!({ "message": message })),
            OutputFormat::Text => format!("{} {message}\n", "✓".green()),
        }
    }

    /// Formats an error, with details for protection and convergence failures.
    #[must_use]
    pub fn format_error(&self, error: &CloudrigError) -> String {
        if let OutputFormat::Json = self.format {
            return Self::json(&serde_json::json!({ "error": error.to_string() }));
        }

        let mut output = format!("{} {error}\n", "✗".red());
        match error {
            CloudrigError::Stack(StackError::ProtectionViolation { changes, .. }) => {
                let rows: Vec<ChangeRow> = changes
                    .iter()
                    .map(|c| ChangeRow {
                        logical_id: c.logical_id.clone(),
                        resource_type: c.resource_type.clone(),
                        action: c.action.clone(),
                    })
                    .collect();
                let _ = write!(output, "\n{} Blocked replacements:\n", "⚠".yellow());
                output.push_str(&Table::new(rows).to_string());
                output.push('\n');
            }
            CloudrigError::Stack(StackError::ConvergenceFailure { events, .. })
                if !events.is_empty() =>
            {
                output.push_str("\nRecent events:\n");
                for event in events {
                    let _ = writeln!(output, "   {event}");
                }
            }
            _ => {}
        }
        output
    }
}
