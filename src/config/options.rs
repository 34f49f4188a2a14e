//! Option bags for both pipelines and the defaults applied to them.
//!
//! Callers hand in loose key/value lists and partially-filled option bags;
//! this module turns them into the shapes the reconciliation and bulk engines
//! consume.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Fixed interval between stack status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default pause between per-object calls in a bulk loop.
pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(100);

/// Capabilities sent with every create and change set.
pub const DEFAULT_CAPABILITIES: &[&str] = &["CAPABILITY_NAMED_IAM", "CAPABILITY_IAM"];

/// A single template parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackParameter {
    /// Parameter key.
    pub key: String,
    /// Parameter value.
    pub value: String,
}

impl StackParameter {
    /// Creates a new parameter.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Converts an ordered list of pairs into parameters, keeping order and duplicates.
#[must_use]
pub fn parameters_from_pairs<K, V, I>(pairs: I) -> Vec<StackParameter>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| StackParameter::new(k, v))
        .collect()
}

/// Converts a map into parameters sorted by key, for stable change set naming.
#[must_use]
pub fn parameters_from_map(map: &HashMap<String, String>) -> Vec<StackParameter> {
    let mut params: Vec<StackParameter> = map
        .iter()
        .map(|(k, v)| StackParameter::new(k.clone(), v.clone()))
        .collect();
    params.sort_by(|a, b| a.key.cmp(&b.key));
    params
}

/// Parses `KEY=VALUE` strings (as given on a command line) into parameters.
///
/// # Errors
///
/// Returns an error if an entry has no `=` or an empty key.
pub fn parse_parameter_pairs(raw: &[String]) -> Result<Vec<StackParameter>> {
    raw.iter()
        .map(|entry| {
            let (key, value) = entry.split_once('=').ok_or_else(|| {
                ConfigError::invalid("parameter", format!("expected KEY=VALUE, got '{entry}'"))
            })?;
            if key.trim().is_empty() {
                return Err(ConfigError::invalid("parameter", format!("empty key in '{entry}'")).into());
            }
            Ok(StackParameter::new(key.trim(), value))
        })
        .collect()
}

/// What the control plane does when a stack create fails.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailureAction {
    /// Roll back the created resources.
    #[default]
    Rollback,
    /// Delete the stack.
    Delete,
    /// Leave the stack as it is.
    DoNothing,
}

impl FailureAction {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rollback => "ROLLBACK",
            Self::Delete => "DELETE",
            Self::DoNothing => "DO_NOTHING",
        }
    }
}

impl std::str::FromStr for FailureAction {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "rollback" => Ok(Self::Rollback),
            "delete" => Ok(Self::Delete),
            "do_nothing" => Ok(Self::DoNothing),
            other => Err(ConfigError::invalid(
                "on_failure",
                format!("expected rollback, delete or do_nothing, got '{other}'"),
            )),
        }
    }
}

/// Options for a stack deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentOptions {
    /// Block until a terminal state is reached.
    pub wait_for_completion: bool,
    /// Resource types whose replacement aborts an update.
    pub protected_resource_types: BTreeSet<String>,
    /// Notification topic ARNs.
    pub notification_targets: Vec<String>,
    /// Behaviour when a create fails.
    pub failure_action: FailureAction,
    /// Enable termination protection when the stack is created.
    pub termination_protection_on_create: bool,
    /// Poll budget in milliseconds; `None` polls forever.
    pub timeout_ms: Option<i64>,
    /// IAM capabilities acknowledged on create and update.
    pub capabilities: Vec<String>,
}

impl Default for DeploymentOptions {
    fn default() -> Self {
        Self {
            wait_for_completion: true,
            protected_resource_types: BTreeSet::new(),
            notification_targets: Vec::new(),
            failure_action: FailureAction::Rollback,
            termination_protection_on_create: false,
            timeout_ms: None,
            capabilities: DEFAULT_CAPABILITIES.iter().map(|c| (*c).to_string()).collect(),
        }
    }
}

impl DeploymentOptions {
    /// Sets whether to wait for completion.
    #[must_use]
    pub const fn with_wait(mut self, wait: bool) -> Self {
        self.wait_for_completion = wait;
        self
    }

    /// Sets the poll budget in milliseconds.
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: Option<i64>) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Adds a protected resource type.
    #[must_use]
    pub fn protect(mut self, resource_type: impl Into<String>) -> Self {
        self.protected_resource_types.insert(resource_type.into());
        self
    }

    /// Sets the failure action.
    #[must_use]
    pub const fn with_failure_action(mut self, action: FailureAction) -> Self {
        self.failure_action = action;
        self
    }

    /// Enables termination protection on create.
    #[must_use]
    pub const fn with_termination_protection(mut self, enable: bool) -> Self {
        self.termination_protection_on_create = enable;
        self
    }
}

/// Options for a stack deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestroyOptions {
    /// Block until the stack is gone.
    pub wait_for_completion: bool,
    /// Poll budget in milliseconds; `None` polls forever.
    pub timeout_ms: Option<i64>,
}

impl Default for DestroyOptions {
    fn default() -> Self {
        Self {
            wait_for_completion: true,
            timeout_ms: None,
        }
    }
}

/// Where the template body comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateSource {
    /// A template file on the local filesystem.
    LocalPath(PathBuf),
    /// A template already hosted at a URL.
    RemoteUrl(String),
}

impl TemplateSource {
    /// Builds a template source from the two optional inputs, requiring exactly one.
    ///
    /// # Errors
    ///
    /// Returns an error if both or neither are given.
    pub fn from_parts(path: Option<PathBuf>, url: Option<String>) -> Result<Self> {
        match (path, url.filter(|u| !u.trim().is_empty())) {
            (Some(p), None) if !p.as_os_str().is_empty() => Ok(Self::LocalPath(p)),
            (None, Some(u)) => Ok(Self::RemoteUrl(u)),
            _ => Err(ConfigError::AmbiguousTemplateSource.into()),
        }
    }

    /// Short human label used in logs and change set hashing.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::LocalPath(p) => p.display().to_string(),
            Self::RemoteUrl(u) => u.clone(),
        }
    }
}

/// Options for bulk prefix operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkOptions {
    /// Keys (or local paths) to skip.
    pub exclude: BTreeSet<String>,
    /// Pause between per-object calls.
    pub throttle: Duration,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            exclude: BTreeSet::new(),
            throttle: DEFAULT_THROTTLE,
        }
    }
}

impl BulkOptions {
    /// Adds keys to the exclusion list.
    #[must_use]
    pub fn excluding<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Sets the throttle interval.
    #[must_use]
    pub const fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    /// Returns true if the key is excluded.
    #[must_use]
    pub fn is_excluded(&self, key: &str) -> bool {
        self.exclude.contains(key)
    }
}

/// Per-object write attributes for uploads and copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectOptions {
    /// Canned ACL.
    pub acl: String,
    /// Storage class.
    pub storage_class: String,
    /// `Cache-Control` header.
    pub cache_control: Option<String>,
    /// `Content-Disposition` header.
    pub content_disposition: Option<String>,
    /// `Content-Encoding` header.
    pub content_encoding: Option<String>,
    /// `Content-Language` header.
    pub content_language: Option<String>,
    /// `Content-Type` header.
    pub content_type: Option<String>,
    /// User metadata.
    pub metadata: Option<HashMap<String, String>>,
    /// Metadata directive for copies (`COPY` or `REPLACE`).
    pub metadata_directive: String,
    /// Server-side encryption algorithm.
    pub server_side_encryption: Option<String>,
    /// KMS key id for SSE-KMS.
    pub sse_kms_key_id: Option<String>,
    /// URL-encoded tag set.
    pub tagging: Option<String>,
    /// Website redirect target.
    pub website_redirect_location: Option<String>,
}

impl Default for ObjectOptions {
    fn default() -> Self {
        Self {
            acl: String::from("private"),
            storage_class: String::from("STANDARD"),
            cache_control: None,
            content_disposition: None,
            content_encoding: None,
            content_language: None,
            content_type: None,
            metadata: None,
            metadata_directive: String::from("COPY"),
            server_side_encryption: None,
            sse_kms_key_id: None,
            tagging: None,
            website_redirect_location: None,
        }
    }
}
