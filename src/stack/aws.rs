//! `CloudFormation` implementation of [`StackApi`].

use async_trait::async_trait;
use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_cloudformation::primitives::DateTime as SdkDateTime;
use aws_sdk_cloudformation::types::{
    Capability, Change, ChangeSetType, OnFailure, Parameter, Replacement, Stack,
};
use aws_sdk_cloudformation::Client;
use aws_config::SdkConfig;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::StackParameter;
use crate::error::{CloudrigError, Result, StackError};

use super::api::{
    ChangeSet, ChangeSetInput, CreateStackInput, ResourceChange, StackApi, StackEvent,
    StackOutput, StackSnapshot, TemplateBody,
};

/// Stack control plane backed by the `CloudFormation` API.
#[derive(Debug, Clone)]
pub struct CloudFormationApi {
    /// SDK client.
    client: Client,
}

impl CloudFormationApi {
    /// Creates the API from a loaded SDK configuration.
    #[must_use]
    pub fn from_conf(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    /// Creates the API with an existing client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn text<'a>(value: impl Into<Option<&'a str>>) -> String {
    value.into().unwrap_or_default().to_string()
}

fn opt_text<'a>(value: impl Into<Option<&'a str>>) -> Option<String> {
    value.into().map(ToString::to_string)
}

fn as_opt<'a, T>(value: impl Into<Option<&'a T>>) -> Option<&'a T> {
    value.into()
}

fn flag(value: impl Into<Option<bool>>) -> bool {
    value.into().unwrap_or(false)
}

fn to_chrono(ts: &SdkDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts.secs(), ts.subsec_nanos())
}

fn sdk_parameters(parameters: &[StackParameter]) -> Vec<Parameter> {
    parameters
        .iter()
        .map(|p| {
            Parameter::builder()
                .parameter_key(&p.key)
                .parameter_value(&p.value)
                .build()
        })
        .collect()
}

fn sdk_capabilities(capabilities: &[String]) -> Vec<Capability> {
    capabilities.iter().map(|c| Capability::from(c.as_str())).collect()
}

fn api_error<E, R>(operation: &str, err: &SdkError<E, R>) -> CloudrigError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let message = err
        .as_service_error()
        .and_then(ProvideErrorMetadata::message)
        .map_or_else(|| DisplayErrorContext(err).to_string(), ToString::to_string);
    StackError::api(operation, message).into()
}

/// Maps a read error, recognizing the control plane's "does not exist" reply.
fn read_error<E, R>(operation: &str, stack: &str, err: &SdkError<E, R>) -> CloudrigError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let not_found = err
        .as_service_error()
        .and_then(ProvideErrorMetadata::message)
        .is_some_and(|m| m.contains("does not exist"));

    if not_found {
        StackError::NotFound {
            stack: stack.to_string(),
        }
        .into()
    } else {
        api_error(operation, err)
    }
}

fn snapshot_from(stack: &Stack) -> StackSnapshot {
    StackSnapshot {
        name: text(stack.stack_name()),
        stack_id: opt_text(stack.stack_id()),
        status: as_opt::<aws_sdk_cloudformation::types::StackStatus>(stack.stack_status())
            .map(|s| s.as_str().to_string())
            .unwrap_or_default(),
        status_reason: opt_text(stack.stack_status_reason()),
        parameters: stack
            .parameters()
            .iter()
            .map(|p| StackParameter::new(text(p.parameter_key()), text(p.parameter_value())))
            .collect(),
        outputs: stack
            .outputs()
            .iter()
            .map(|o| StackOutput {
                key: text(o.output_key()),
                value: text(o.output_value()),
                description: opt_text(o.description()),
                export_name: opt_text(o.export_name()),
            })
            .collect(),
        termination_protection: flag(stack.enable_termination_protection()),
    }
}

/// Flattens one proposed change. `Conditional` replacement counts as required.
fn change_from(change: &Change) -> Option<ResourceChange> {
    let rc = change.resource_change()?;
    let replacement_required = matches!(
        rc.replacement(),
        Some(Replacement::True | Replacement::Conditional)
    );

    Some(ResourceChange {
        logical_id: text(rc.logical_resource_id()),
        resource_type: text(rc.resource_type()),
        action: rc.action().map(|a| a.as_str().to_string()).unwrap_or_default(),
        replacement_required,
    })
}

#[async_trait]
impl StackApi for CloudFormationApi {
    async fn describe_stack(&self, stack_name: &str) -> Result<StackSnapshot> {
        let output = self
            .client
            .describe_stacks()
            .stack_name(stack_name)
            .send()
            .await
            .map_err(|e| read_error("DescribeStacks", stack_name, &e))?;

        output
            .stacks()
            .first()
            .map(snapshot_from)
            .ok_or_else(|| {
                StackError::NotFound {
                    stack: stack_name.to_string(),
                }
                .into()
            })
    }

    async fn create_stack(&self, input: &CreateStackInput) -> Result<String> {
        debug!("CreateStack {}", input.stack_name);

        let mut request = self
            .client
            .create_stack()
            .stack_name(&input.stack_name)
            .set_parameters(Some(sdk_parameters(&input.parameters)))
            .set_capabilities(Some(sdk_capabilities(&input.capabilities)))
            .set_notification_arns(Some(input.notification_targets.clone()))
            .on_failure(OnFailure::from(input.failure_action.as_str()))
            .enable_termination_protection(input.termination_protection)
            .client_request_token(&input.client_request_token);

        request = match &input.template {
            TemplateBody::Inline(body) => request.template_body(body),
            TemplateBody::Url(url) => request.template_url(url),
        };

        let output = request
            .send()
            .await
            .map_err(|e| api_error("CreateStack", &e))?;

        Ok(text(output.stack_id()))
    }

    async fn create_change_set(&self, input: &ChangeSetInput) -> Result<String> {
        debug!("CreateChangeSet {} on {}", input.change_set_name, input.stack_name);

        let mut request = self
            .client
            .create_change_set()
            .stack_name(&input.stack_name)
            .change_set_name(&input.change_set_name)
            .change_set_type(ChangeSetType::Update)
            .set_parameters(Some(sdk_parameters(&input.parameters)))
            .set_capabilities(Some(sdk_capabilities(&input.capabilities)))
            .set_notification_arns(Some(input.notification_targets.clone()))
            .client_token(&input.client_token);

        request = match &input.template {
            TemplateBody::Inline(body) => request.template_body(body),
            TemplateBody::Url(url) => request.template_url(url),
        };

        let output = request
            .send()
            .await
            .map_err(|e| api_error("CreateChangeSet", &e))?;

        Ok(text(output.id()))
    }

    async fn describe_change_set(&self, stack_name: &str, change_set_id: &str) -> Result<ChangeSet> {
        let mut next_token: Option<String> = None;
        let mut change_set: Option<ChangeSet> = None;

        loop {
            let output = self
                .client
                .describe_change_set()
                .stack_name(stack_name)
                .change_set_name(change_set_id)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| api_error("DescribeChangeSet", &e))?;

            let page_changes = output.changes().iter().filter_map(change_from);
            match change_set.as_mut() {
                Some(cs) => cs.changes.extend(page_changes),
                None => {
                    change_set = Some(ChangeSet {
                        id: opt_text(output.change_set_id())
                            .unwrap_or_else(|| change_set_id.to_string()),
                        status: output
                            .status()
                            .map(|s| s.as_str().to_string())
                            .unwrap_or_default(),
                        execution_status: output
                            .execution_status()
                            .map(|s| s.as_str().to_string())
                            .unwrap_or_default(),
                        status_reason: opt_text(output.status_reason()),
                        changes: page_changes.collect(),
                    });
                }
            }

            match output.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        change_set.ok_or_else(|| CloudrigError::internal("change set pagination yielded no page"))
    }

    async fn execute_change_set(&self, stack_name: &str, change_set_id: &str) -> Result<()> {
        self.client
            .execute_change_set()
            .stack_name(stack_name)
            .change_set_name(change_set_id)
            .send()
            .await
            .map_err(|e| api_error("ExecuteChangeSet", &e))?;
        Ok(())
    }

    async fn delete_change_set(&self, stack_name: &str, change_set_id: &str) -> Result<()> {
        self.client
            .delete_change_set()
            .stack_name(stack_name)
            .change_set_name(change_set_id)
            .send()
            .await
            .map_err(|e| api_error("DeleteChangeSet", &e))?;
        Ok(())
    }

    async fn delete_stack(&self, stack_name: &str, client_request_token: &str) -> Result<()> {
        self.client
            .delete_stack()
            .stack_name(stack_name)
            .client_request_token(client_request_token)
            .send()
            .await
            .map_err(|e| api_error("DeleteStack", &e))?;
        Ok(())
    }

    async fn update_termination_protection(&self, stack_name: &str, enable: bool) -> Result<()> {
        self.client
            .update_termination_protection()
            .stack_name(stack_name)
            .enable_termination_protection(enable)
            .send()
            .await
            .map_err(|e| api_error("UpdateTerminationProtection", &e))?;
        Ok(())
    }

    async fn describe_stack_events(&self, stack_name: &str, limit: usize) -> Result<Vec<StackEvent>> {
        let output = self
            .client
            .describe_stack_events()
            .stack_name(stack_name)
            .send()
            .await
            .map_err(|e| read_error("DescribeStackEvents", stack_name, &e))?;

        Ok(output
            .stack_events()
            .iter()
            .take(limit)
            .map(|e| StackEvent {
                timestamp: as_opt::<SdkDateTime>(e.timestamp()).and_then(to_chrono),
                logical_id: text(e.logical_resource_id()),
                resource_type: text(e.resource_type()),
                status: e
                    .resource_status()
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_default(),
                reason: opt_text(e.resource_status_reason()),
            })
            .collect())
    }
}
