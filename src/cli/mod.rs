//! CLI module for cloudrig.
//!
//! This module provides the command-line interface for stack deployments
//! and object storage operations.

mod commands;
mod output;

pub use commands::{
    BulkArgs, Cli, Commands, DeployArgs, ObjectArgs, OutputFormat, S3Uri, TransferArgs,
};
pub use output::OutputFormatter;
