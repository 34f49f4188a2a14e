//! Deployment requests and outcomes.

use serde::Serialize;
use tracing::debug;

use crate::config::{DeploymentOptions, StackParameter, TemplateSource};
use crate::error::{require, ConfigError, Result};

use super::api::TemplateBody;

/// One call's worth of desired stack state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRequest {
    /// Stack name, unique per account and region.
    pub stack_name: String,
    /// Where the template comes from.
    pub template: TemplateSource,
    /// Parameters in caller order.
    pub parameters: Vec<StackParameter>,
    /// Deployment options.
    pub options: DeploymentOptions,
}

impl DeploymentRequest {
    /// Creates a request with default options and no parameters.
    #[must_use]
    pub fn new(stack_name: impl Into<String>, template: TemplateSource) -> Self {
        Self {
            stack_name: stack_name.into(),
            template,
            parameters: Vec::new(),
            options: DeploymentOptions::default(),
        }
    }

    /// Sets the parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Vec<StackParameter>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets the options.
    #[must_use]
    pub fn with_options(mut self, options: DeploymentOptions) -> Self {
        self.options = options;
        self
    }

    /// Checks the request without touching the network.
    ///
    /// # Errors
    ///
    /// Returns an error if the stack name is empty, the local template is
    /// missing, or the template URL is empty.
    pub fn validate(&self) -> Result<()> {
        require("stack_name", &self.stack_name)?;
        match &self.template {
            TemplateSource::LocalPath(path) => {
                if !path.is_file() {
                    return Err(ConfigError::TemplateNotFound { path: path.clone() }.into());
                }
            }
            TemplateSource::RemoteUrl(url) => require("template_url", url)?,
        }
        Ok(())
    }

    /// Resolves the template source into the body sent to the control plane.
    ///
    /// # Errors
    ///
    /// Returns an error if the local template cannot be read.
    pub async fn resolve_template(&self) -> Result<TemplateBody> {
        match &self.template {
            TemplateSource::LocalPath(path) => {
                debug!("Reading template: {}", path.display());
                let body = tokio::fs::read_to_string(path).await?;
                Ok(TemplateBody::Inline(body))
            }
            TemplateSource::RemoteUrl(url) => Ok(TemplateBody::Url(url.clone())),
        }
    }
}

/// What a deployment call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentAction {
    /// A new stack was created.
    Created,
    /// A change set was executed against an existing stack.
    Updated,
    /// The stack already matched; nothing was executed.
    NoChanges,
    /// The stack was deleted.
    Deleted,
}

impl std::fmt::Display for DeploymentAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::NoChanges => write!(f, "no changes"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// Result of a deploy or destroy call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentOutcome {
    /// Stack name.
    pub stack_name: String,
    /// What was done.
    pub action: DeploymentAction,
    /// True once a terminal success was observed (or nothing had to change).
    pub complete: bool,
    /// Last observed status, when the call waited.
    pub final_status: Option<String>,
    /// Change set that was executed, for updates.
    pub change_set_id: Option<String>,
}

impl DeploymentOutcome {
    pub(crate) fn submitted(stack_name: &str, action: DeploymentAction) -> Self {
        Self {
            stack_name: stack_name.to_string(),
            action,
            complete: false,
            final_status: None,
            change_set_id: None,
        }
    }
}

impl std::fmt::Display for DeploymentOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.stack_name, self.action)?;
        if let Some(status) = &self.final_status {
            write!(f, " ({status})")?;
        } else if !self.complete {
            write!(f, " (submitted, not waited)")?;
        }
        Ok(())
    }
}

/// Acknowledgement of a termination protection change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TerminationProtectionAck {
    /// Stack name.
    pub stack_name: String,
    /// New setting.
    pub enabled: bool,
}
