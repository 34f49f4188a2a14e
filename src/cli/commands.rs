//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::config::{BulkOptions, FailureAction, ObjectOptions, DEFAULT_THROTTLE};
use crate::storage::{ObjectKeyRef, PrefixRef};

/// Cloudrig - stack deployments and bulk object storage operations.
#[derive(Parser, Debug)]
#[command(name = "cloudrig")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the deployment file.
    #[arg(short, long, global = true, env = "CLOUDRIG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Region override.
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Named profile (takes precedence over access keys).
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// Environment file loaded before resolving credentials.
    #[arg(long, global = true, default_value = ".env")]
    pub env_file: PathBuf,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or update a stack.
    Deploy(DeployArgs),

    /// Delete a stack.
    Destroy {
        /// Stack name.
        stack: String,

        /// Return right after submitting the delete.
        #[arg(long)]
        no_wait: bool,

        /// Poll budget in milliseconds (polls forever when omitted).
        #[arg(long)]
        timeout_ms: Option<i64>,
    },

    /// Check whether a stack exists.
    Exists {
        /// Stack name.
        stack: String,
    },

    /// Show a stack's status.
    Status {
        /// Stack name.
        stack: String,
    },

    /// Turn termination protection on (or off with --disable).
    Protect {
        /// Stack name.
        stack: String,

        /// Disable instead of enable.
        #[arg(long)]
        disable: bool,
    },

    /// Show a stack's outputs.
    Outputs {
        /// Stack name.
        stack: String,
    },

    /// Show a stack's parameters.
    Params {
        /// Stack name.
        stack: String,
    },

    /// List buckets.
    Buckets,

    /// List objects under a prefix.
    Ls {
        /// Location, e.g. `s3://bucket/prefix/`.
        location: S3Uri,
    },

    /// Copy an object, or every object under a prefix with --recursive.
    Cp(TransferArgs),

    /// Move an object, or every object under a prefix with --recursive.
    Mv(TransferArgs),

    /// Delete an object, or every version under a prefix with --recursive.
    Rm {
        /// Target, e.g. `s3://bucket/key`.
        target: S3Uri,

        /// Delete every version under the prefix.
        #[arg(short, long)]
        recursive: bool,

        /// Version to delete (single object only).
        #[arg(long)]
        version_id: Option<String>,

        /// Bulk options.
        #[command(flatten)]
        bulk: BulkArgs,
    },

    /// Upload a file, or a whole directory with --recursive.
    Upload {
        /// Local file or directory.
        source: PathBuf,

        /// Destination key or prefix, e.g. `s3://bucket/site/`.
        destination: S3Uri,

        /// Upload every file under the directory.
        #[arg(short, long)]
        recursive: bool,

        /// Bulk options.
        #[command(flatten)]
        bulk: BulkArgs,

        /// Object attributes.
        #[command(flatten)]
        object: ObjectArgs,
    },

    /// Download one object.
    Download {
        /// Source, e.g. `s3://bucket/key`.
        source: S3Uri,

        /// Local file or directory.
        #[arg(default_value = ".")]
        destination: PathBuf,
    },
}

/// Arguments of `deploy`. Values given here override the deployment file.
#[derive(Args, Debug, Default)]
pub struct DeployArgs {
    /// Stack name.
    #[arg(long)]
    pub stack: Option<String>,

    /// Local template file.
    #[arg(long, conflicts_with = "template_url")]
    pub template: Option<PathBuf>,

    /// Hosted template URL.
    #[arg(long)]
    pub template_url: Option<String>,

    /// Stack parameter as KEY=VALUE (repeatable).
    #[arg(short, long = "param")]
    pub params: Vec<String>,

    /// Resource type whose replacement aborts an update (repeatable).
    #[arg(long)]
    pub protect: Vec<String>,

    /// Notification topic ARN (repeatable).
    #[arg(long)]
    pub notify: Vec<String>,

    /// Behaviour on create failure (rollback, delete, do_nothing).
    #[arg(long)]
    pub on_failure: Option<FailureAction>,

    /// Enable termination protection when creating.
    #[arg(long)]
    pub termination_protection: bool,

    /// Return right after submitting.
    #[arg(long)]
    pub no_wait: bool,

    /// Poll budget in milliseconds (polls forever when omitted).
    #[arg(long)]
    pub timeout_ms: Option<i64>,
}

impl DeployArgs {
    /// Returns true if the command line alone describes the deployment.
    #[must_use]
    pub const fn is_self_contained(&self) -> bool {
        self.stack.is_some() && (self.template.is_some() || self.template_url.is_some())
    }
}

/// Arguments of `cp` and `mv`.
#[derive(Args, Debug)]
pub struct TransferArgs {
    /// Source object or prefix.
    pub source: S3Uri,

    /// Destination object or prefix.
    pub destination: S3Uri,

    /// Transfer every object under the source prefix.
    #[arg(short, long)]
    pub recursive: bool,

    /// Bulk options.
    #[command(flatten)]
    pub bulk: BulkArgs,

    /// Object attributes.
    #[command(flatten)]
    pub object: ObjectArgs,
}

/// Options shared by prefix operations.
#[derive(Args, Debug, Default)]
pub struct BulkArgs {
    /// Key or path to skip (repeatable).
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Pause between per-object calls, in milliseconds.
    #[arg(long)]
    pub throttle_ms: Option<u64>,
}

impl BulkArgs {
    /// Converts into engine options.
    #[must_use]
    pub fn to_options(&self) -> BulkOptions {
        BulkOptions::default()
            .excluding(self.exclude.iter().cloned())
            .with_throttle(self.throttle_ms.map_or(DEFAULT_THROTTLE, Duration::from_millis))
    }
}

/// Object write attributes settable from the command line.
#[derive(Args, Debug, Default)]
pub struct ObjectArgs {
    /// Canned ACL.
    #[arg(long)]
    pub acl: Option<String>,

    /// Storage class.
    #[arg(long)]
    pub storage_class: Option<String>,

    /// Content type.
    #[arg(long)]
    pub content_type: Option<String>,

    /// Cache-Control header.
    #[arg(long)]
    pub cache_control: Option<String>,

    /// Server-side encryption algorithm.
    #[arg(long)]
    pub sse: Option<String>,

    /// KMS key id for SSE-KMS.
    #[arg(long)]
    pub sse_kms_key_id: Option<String>,
}

impl ObjectArgs {
    /// Converts into object options, keeping defaults for unset values.
    #[must_use]
    pub fn to_options(&self) -> ObjectOptions {
        let defaults = ObjectOptions::default();
        ObjectOptions {
            acl: self.acl.clone().unwrap_or(defaults.acl),
            storage_class: self.storage_class.clone().unwrap_or(defaults.storage_class),
            content_type: self.content_type.clone(),
            cache_control: self.cache_control.clone(),
            server_side_encryption: self.sse.clone(),
            sse_kms_key_id: self.sse_kms_key_id.clone(),
            ..defaults
        }
    }
}

/// An `s3://bucket/key` location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Uri {
    /// Bucket name.
    pub bucket: String,
    /// Key or prefix (may be empty).
    pub key: String,
}

impl S3Uri {
    /// The location as a single object reference.
    #[must_use]
    pub fn object(&self) -> ObjectKeyRef {
        ObjectKeyRef::new(&self.bucket, &self.key)
    }

    /// The location as a prefix.
    #[must_use]
    pub fn prefix(&self) -> PrefixRef {
        PrefixRef::new(&self.bucket, &self.key)
    }
}

impl FromStr for S3Uri {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("s3://")
            .ok_or_else(|| format!("expected s3://bucket/key, got '{s}'"))?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));

        if bucket.is_empty() {
            return Err(format!("missing bucket in '{s}'"));
        }

        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}
