//! Deployment file parser.
//!
//! Loads a `cloudrig.deploy.yaml` file describing one stack deployment and
//! turns it into a [`DeploymentRequest`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ConfigError, Result};
use crate::stack::DeploymentRequest;

use super::options::{DeploymentOptions, FailureAction, StackParameter, TemplateSource};

/// Default deployment file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &[
    "cloudrig.deploy.yaml",
    "cloudrig.deploy.yml",
    "deploy.yaml",
    "deploy.yml",
];

/// On-disk shape of a deployment file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeployFile {
    /// Stack name.
    pub stack: String,
    /// Local template path, relative to the deployment file.
    #[serde(default)]
    pub template: Option<PathBuf>,
    /// Remote template URL.
    #[serde(default)]
    pub template_url: Option<String>,
    /// Template parameters, in order.
    #[serde(default)]
    pub parameters: Vec<StackParameter>,
    /// Deployment options.
    #[serde(default)]
    pub options: DeployFileOptions,
}

/// Options section of a deployment file. Missing fields take the normal defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct DeployFileOptions {
    /// Wait for completion.
    pub wait: Option<bool>,
    /// Poll budget in milliseconds.
    pub timeout_ms: Option<i64>,
    /// Resource types whose replacement aborts an update.
    pub protected_resource_types: BTreeSet<String>,
    /// Notification topic ARNs.
    pub notification_arns: Vec<String>,
    /// Behaviour on create failure.
    pub on_failure: Option<FailureAction>,
    /// Termination protection on create.
    pub termination_protection: Option<bool>,
}

impl DeployFileOptions {
    fn into_options(self) -> DeploymentOptions {
        let defaults = DeploymentOptions::default();
        DeploymentOptions {
            wait_for_completion: self.wait.unwrap_or(defaults.wait_for_completion),
            protected_resource_types: self.protected_resource_types,
            notification_targets: self.notification_arns,
            failure_action: self.on_failure.unwrap_or(defaults.failure_action),
            termination_protection_on_create: self
                .termination_protection
                .unwrap_or(defaults.termination_protection_on_create),
            timeout_ms: self.timeout_ms,
            capabilities: defaults.capabilities,
        }
    }
}

/// Parser for deployment files.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative template paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative template paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads a deployment request from a YAML file.
    ///
    /// Relative template paths are resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<DeploymentRequest> {
        let path = path.as_ref();
        info!("Loading deployment file: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ParseError {
            message: format!("Failed to read file: {e}"),
            location: Some(path.display().to_string()),
        })?;

        let base = self
            .base_path
            .clone()
            .or_else(|| path.parent().map(Path::to_path_buf));

        Self { base_path: base }.parse_yaml(&content, Some(path))
    }

    /// Parses a deployment request from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or the template source is ambiguous.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<DeploymentRequest> {
        debug!("Parsing deployment YAML");

        let file: DeployFile = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
            message: format!("YAML parse error: {e}"),
            location: source.map(|p| p.display().to_string()),
        })?;

        let template_path = file.template.map(|t| match &self.base_path {
            Some(base) if t.is_relative() => base.join(t),
            _ => t,
        });
        let template = TemplateSource::from_parts(template_path, file.template_url)?;

        debug!("Parsed deployment for stack: {}", file.stack);
        Ok(DeploymentRequest {
            stack_name: file.stack,
            template,
            parameters: file.parameters,
            options: file.options.into_options(),
        })
    }
}

/// Finds a deployment file in the start directory or its parents, then in the
/// user's config directory.
///
/// # Errors
///
/// Returns an error if no deployment file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        if let Some(found) = first_existing(&current) {
            return Ok(found);
        }
        if !current.pop() {
            break;
        }
    }

    if let Some(found) = dirs::config_dir()
        .map(|d| d.join("cloudrig"))
        .and_then(|d| first_existing(&d))
    {
        return Ok(found);
    }

    Err(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }
    .into())
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    DEFAULT_CONFIG_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
        .inspect(|p| info!("Found deployment file: {}", p.display()))
}
