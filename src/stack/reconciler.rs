//! Stack reconciliation engine.
//!
//! Converges one named stack to a desired template and parameter set:
//! decides create vs. update, evaluates a change set before any update,
//! refuses updates that would replace protected resources, and polls the
//! stack until it reaches a terminal state.

use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{DestroyOptions, StackParameter, DEFAULT_POLL_INTERVAL};
use crate::error::{require, CloudrigError, Result, StackError};

use super::api::{
    ChangeSet, ChangeSetInput, CreateStackInput, StackApi, StackOutput, StackSnapshot,
    TemplateBody,
};
use super::changeset::{change_set_name, is_no_changes, is_pending, protected_replacements};
use super::request::{
    DeploymentAction, DeploymentOutcome, DeploymentRequest, TerminationProtectionAck,
};
use super::status::{classify, PollBudget, StatusClass};

/// Number of stack events attached to a convergence failure.
const DEFAULT_EVENT_LIMIT: usize = 10;

/// Status reported when a deleted stack can no longer be read.
const DELETE_COMPLETE: &str = "DELETE_COMPLETE";

/// What a poll loop is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitTarget {
    /// Any status containing `COMPLETE`.
    Converged,
    /// The stack disappearing.
    Deleted,
}

/// Reconciliation engine for a single stack per call.
#[derive(Debug)]
pub struct StackReconciler<A: StackApi> {
    /// Control-plane client.
    api: A,
    /// Interval between status polls.
    poll_interval: Duration,
    /// Events fetched for failure diagnostics.
    event_limit: usize,
}

impl<A: StackApi> StackReconciler<A> {
    /// Creates a new reconciler.
    #[must_use]
    pub const fn new(api: A) -> Self {
        Self {
            api,
            poll_interval: DEFAULT_POLL_INTERVAL,
            event_limit: DEFAULT_EVENT_LIMIT,
        }
    }

    /// Sets the interval between status polls.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets how many events are attached to a convergence failure.
    #[must_use]
    pub const fn with_event_limit(mut self, limit: usize) -> Self {
        self.event_limit = limit;
        self
    }

    /// Gets the underlying control-plane client.
    #[must_use]
    pub const fn api(&self) -> &A {
        &self.api
    }

    /// Creates or updates a stack so it matches the request.
    ///
    /// An absent stack is created; a present stack is updated through a
    /// change set. With `wait_for_completion`, blocks until a terminal state
    /// or until the poll budget runs out.
    ///
    /// # Errors
    ///
    /// Returns a configuration error before any network call if the request
    /// is invalid, a protection violation if the update would replace a
    /// protected resource, a convergence failure on a failed or rolled-back
    /// stack, a timeout, or any control-plane error.
    pub async fn deploy(&self, request: &DeploymentRequest) -> Result<DeploymentOutcome> {
        request.validate()?;
        let stack = request.stack_name.as_str();
        let template = request.resolve_template().await?;
        let mut budget = PollBudget::from_ms(request.options.timeout_ms);

        let mut outcome = if self.exists(stack).await? {
            info!("Stack {stack} exists, evaluating change set");
            self.update_stack(request, template, &mut budget).await?
        } else {
            info!("Stack {stack} does not exist, creating");
            self.create_stack(request, template).await?
        };

        if outcome.action == DeploymentAction::NoChanges || !request.options.wait_for_completion {
            return Ok(outcome);
        }

        let status = self
            .wait_for(stack, &mut budget, WaitTarget::Converged)
            .await?;
        outcome.complete = true;
        outcome.final_status = Some(status);
        Ok(outcome)
    }

    /// Deletes a stack.
    ///
    /// When waiting, the stack becoming unreadable ("does not exist") is the
    /// success condition.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, the delete is rejected, the
    /// stack reaches a failed status, or the poll budget runs out.
    pub async fn destroy(&self, stack: &str, options: &DestroyOptions) -> Result<DeploymentOutcome> {
        require("stack_name", stack)?;

        let token = Uuid::new_v4().to_string();
        self.api.delete_stack(stack, &token).await?;
        info!("Delete submitted for {stack}");

        let mut outcome = DeploymentOutcome::submitted(stack, DeploymentAction::Deleted);
        if !options.wait_for_completion {
            return Ok(outcome);
        }

        let mut budget = PollBudget::from_ms(options.timeout_ms);
        let status = match self.wait_for(stack, &mut budget, WaitTarget::Deleted).await {
            Ok(status) => status,
            Err(err) if err.is_stack_not_found() => String::from(DELETE_COMPLETE),
            Err(err) => return Err(err),
        };

        info!("Successfully deleted {stack}");
        outcome.complete = true;
        outcome.final_status = Some(status);
        Ok(outcome)
    }

    /// Turns termination protection on or off.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or the control plane rejects the call.
    pub async fn change_termination_protection(
        &self,
        stack: &str,
        enable: bool,
    ) -> Result<TerminationProtectionAck> {
        require("stack_name", stack)?;
        self.api.update_termination_protection(stack, enable).await?;
        info!("Termination protection for {stack} set to {enable}");
        Ok(TerminationProtectionAck {
            stack_name: stack.to_string(),
            enabled: enable,
        })
    }

    /// Returns whether the stack exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or the read fails for any
    /// reason other than the stack being absent.
    pub async fn exists(&self, stack: &str) -> Result<bool> {
        require("stack_name", stack)?;
        match self.api.describe_stack(stack).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_stack_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Reads the latest snapshot of a stack.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or the read fails.
    pub async fn describe(&self, stack: &str) -> Result<StackSnapshot> {
        require("stack_name", stack)?;
        self.api.describe_stack(stack).await
    }

    /// Reads the stack's outputs.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or the read fails.
    pub async fn get_outputs(&self, stack: &str) -> Result<Vec<StackOutput>> {
        Ok(self.describe(stack).await?.outputs)
    }

    /// Reads the stack's applied parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or the read fails.
    pub async fn get_parameters(&self, stack: &str) -> Result<Vec<StackParameter>> {
        Ok(self.describe(stack).await?.parameters)
    }

    /// Polls a stack until it converges, fails, or the budget runs out.
    ///
    /// # Errors
    ///
    /// Returns a convergence failure, a timeout, or any read error.
    pub async fn wait_for_terminal(&self, stack: &str, budget: &mut PollBudget) -> Result<String> {
        self.wait_for(stack, budget, WaitTarget::Converged).await
    }

    async fn create_stack(
        &self,
        request: &DeploymentRequest,
        template: TemplateBody,
    ) -> Result<DeploymentOutcome> {
        let options = &request.options;
        let input = CreateStackInput {
            stack_name: request.stack_name.clone(),
            template,
            parameters: request.parameters.clone(),
            capabilities: options.capabilities.clone(),
            notification_targets: options.notification_targets.clone(),
            failure_action: options.failure_action,
            termination_protection: options.termination_protection_on_create,
            client_request_token: Uuid::new_v4().to_string(),
        };

        let stack_id = self.api.create_stack(&input).await?;
        info!("Create submitted for {}: {stack_id}", request.stack_name);

        Ok(DeploymentOutcome::submitted(
            &request.stack_name,
            DeploymentAction::Created,
        ))
    }

    async fn update_stack(
        &self,
        request: &DeploymentRequest,
        template: TemplateBody,
        budget: &mut PollBudget,
    ) -> Result<DeploymentOutcome> {
        let stack = request.stack_name.as_str();
        let options = &request.options;

        let input = ChangeSetInput {
            stack_name: stack.to_string(),
            change_set_name: change_set_name(&template, &request.parameters, Utc::now()),
            template,
            parameters: request.parameters.clone(),
            capabilities: options.capabilities.clone(),
            notification_targets: options.notification_targets.clone(),
            client_token: Uuid::new_v4().to_string(),
        };
        debug!("Creating change set {} for {stack}", input.change_set_name);

        let change_set_id = self.api.create_change_set(&input).await?;
        let change_set = match self.wait_for_change_set(stack, &change_set_id, budget).await {
            Ok(change_set) => change_set,
            Err(err) => {
                self.discard_change_set(stack, &change_set_id).await;
                return Err(err);
            }
        };

        if is_no_changes(&change_set) {
            info!("No updates are to be performed on {stack}");
            self.discard_change_set(stack, &change_set_id).await;
            return Ok(DeploymentOutcome {
                complete: true,
                ..DeploymentOutcome::submitted(stack, DeploymentAction::NoChanges)
            });
        }

        if change_set.status == "FAILED" {
            self.discard_change_set(stack, &change_set_id).await;
            return Err(StackError::ChangeSetFailed {
                stack: stack.to_string(),
                change_set_id,
                reason: change_set
                    .status_reason
                    .unwrap_or_else(|| String::from("no reason given")),
            }
            .into());
        }

        let offending =
            protected_replacements(&change_set.changes, &options.protected_resource_types);
        if !offending.is_empty() {
            warn!(
                "Change set {change_set_id} would replace {} protected resource(s) in {stack}, aborting",
                offending.len()
            );
            self.discard_change_set(stack, &change_set_id).await;
            return Err(StackError::ProtectionViolation {
                stack: stack.to_string(),
                change_set_id,
                changes: offending,
            }
            .into());
        }

        if change_set.execution_status != "AVAILABLE" {
            self.discard_change_set(stack, &change_set_id).await;
            return Err(StackError::ChangeSetFailed {
                stack: stack.to_string(),
                change_set_id,
                reason: format!("execution status is {}", change_set.execution_status),
            }
            .into());
        }

        info!(
            "Executing change set {change_set_id} on {stack} ({} changes)",
            change_set.changes.len()
        );
        self.api.execute_change_set(stack, &change_set_id).await?;

        Ok(DeploymentOutcome {
            change_set_id: Some(change_set_id),
            ..DeploymentOutcome::submitted(stack, DeploymentAction::Updated)
        })
    }

    async fn wait_for_change_set(
        &self,
        stack: &str,
        change_set_id: &str,
        budget: &mut PollBudget,
    ) -> Result<ChangeSet> {
        loop {
            if budget.is_exhausted() {
                return Err(self.timeout(stack, budget));
            }

            let change_set = self.api.describe_change_set(stack, change_set_id).await?;
            if !is_pending(&change_set) {
                return Ok(change_set);
            }

            debug!("Change set {change_set_id}: {}", change_set.status);
            tokio::time::sleep(self.poll_interval).await;
            budget.consume(self.poll_interval);
        }
    }

    async fn wait_for(
        &self,
        stack: &str,
        budget: &mut PollBudget,
        target: WaitTarget,
    ) -> Result<String> {
        loop {
            if budget.is_exhausted() {
                return Err(self.timeout(stack, budget));
            }

            let snapshot = self.api.describe_stack(stack).await?;
            info!("{stack}: {}", snapshot.status);

            match (classify(&snapshot.status), target) {
                (StatusClass::Failure, _) => {
                    return Err(self.convergence_failure(stack, snapshot.status).await);
                }
                (StatusClass::Success, WaitTarget::Converged) => return Ok(snapshot.status),
                (StatusClass::Success, WaitTarget::Deleted) if snapshot.status == DELETE_COMPLETE => {
                    return Ok(snapshot.status);
                }
                _ => {
                    tokio::time::sleep(self.poll_interval).await;
                    budget.consume(self.poll_interval);
                }
            }
        }
    }

    fn timeout(&self, stack: &str, budget: &PollBudget) -> CloudrigError {
        warn!("Timeout waiting for CloudFormation stack: {stack}");
        StackError::Timeout {
            stack: stack.to_string(),
            budget_ms: budget.granted_ms(),
        }
        .into()
    }

    async fn convergence_failure(&self, stack: &str, status: String) -> CloudrigError {
        let events = match self.api.describe_stack_events(stack, self.event_limit).await {
            Ok(events) => events,
            Err(err) => {
                warn!("Could not read events for {stack}: {err}");
                Vec::new()
            }
        };

        for event in &events {
            debug!("{stack} event: {event}");
        }

        StackError::ConvergenceFailure {
            stack: stack.to_string(),
            status,
            events,
        }
        .into()
    }

    async fn discard_change_set(&self, stack: &str, change_set_id: &str) {
        if let Err(err) = self.api.delete_change_set(stack, change_set_id).await {
            warn!("Failed to discard change set {change_set_id}: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeploymentOptions, TemplateSource};
    use crate::stack::api::{MockStackApi, ResourceChange, StackEvent};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Scripted control plane. `None` in the status script means "does not exist";
    /// the last entry repeats once the script runs out.
    #[derive(Default)]
    struct FakeStackApi {
        statuses: Mutex<VecDeque<Option<&'static str>>>,
        change_sets: Mutex<VecDeque<ChangeSet>>,
        calls: Mutex<Vec<String>>,
        fail_describe: bool,
    }

    impl FakeStackApi {
        fn with_statuses(statuses: &[Option<&'static str>]) -> Self {
            Self {
                statuses: Mutex::new(statuses.iter().copied().collect()),
                ..Default::default()
            }
        }

        fn with_change_sets(self, change_sets: Vec<ChangeSet>) -> Self {
            *self.change_sets.lock().expect("lock") = change_sets.into();
            self
        }

        fn record(&self, call: &str) {
            self.calls.lock().expect("lock").push(call.to_string());
        }

        fn count(&self, call: &str) -> usize {
            self.calls
                .lock()
                .expect("lock")
                .iter()
                .filter(|c| c.as_str() == call)
                .count()
        }
    }

    fn next<T: Clone>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
        let mut queue = queue.lock().expect("lock");
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    fn snapshot(name: &str, status: &str) -> StackSnapshot {
        StackSnapshot {
            name: name.to_string(),
            stack_id: Some(format!("arn:aws:cloudformation:us-east-1:1:stack/{name}/x")),
            status: status.to_string(),
            status_reason: None,
            parameters: vec![StackParameter::new("Env", "dev")],
            outputs: vec![StackOutput {
                key: String::from("Url"),
                value: String::from("https://example.com"),
                description: None,
                export_name: None,
            }],
            termination_protection: false,
        }
    }

    #[async_trait]
    impl StackApi for FakeStackApi {
        async fn describe_stack(&self, stack_name: &str) -> Result<StackSnapshot> {
            self.record("describe_stack");
            if self.fail_describe {
                return Err(StackError::api("DescribeStacks", "Rate exceeded").into());
            }
            match next(&self.statuses).flatten() {
                Some(status) => Ok(snapshot(stack_name, status)),
                None => Err(StackError::NotFound {
                    stack: stack_name.to_string(),
                }
                .into()),
            }
        }

        async fn create_stack(&self, _input: &CreateStackInput) -> Result<String> {
            self.record("create_stack");
            Ok(String::from("stack-id"))
        }

        async fn create_change_set(&self, input: &ChangeSetInput) -> Result<String> {
            self.record("create_change_set");
            Ok(format!("{}-id", input.change_set_name))
        }

        async fn describe_change_set(&self, _stack: &str, _id: &str) -> Result<ChangeSet> {
            self.record("describe_change_set");
            next(&self.change_sets).ok_or_else(|| CloudrigError::internal("no change set scripted"))
        }

        async fn execute_change_set(&self, _stack: &str, _id: &str) -> Result<()> {
            self.record("execute_change_set");
            Ok(())
        }

        async fn delete_change_set(&self, _stack: &str, _id: &str) -> Result<()> {
            self.record("delete_change_set");
            Ok(())
        }

        async fn delete_stack(&self, _stack: &str, _token: &str) -> Result<()> {
            self.record("delete_stack");
            Ok(())
        }

        async fn update_termination_protection(&self, _stack: &str, _enable: bool) -> Result<()> {
            self.record("update_termination_protection");
            Ok(())
        }

        async fn describe_stack_events(&self, stack: &str, _limit: usize) -> Result<Vec<StackEvent>> {
            self.record("describe_stack_events");
            Ok(vec![StackEvent {
                timestamp: None,
                logical_id: stack.to_string(),
                resource_type: String::from("AWS::CloudFormation::Stack"),
                status: String::from("UPDATE_ROLLBACK_IN_PROGRESS"),
                reason: Some(String::from("Resource creation cancelled")),
            }])
        }
    }

    fn change_set(status: &str, execution_status: &str, changes: Vec<ResourceChange>) -> ChangeSet {
        ChangeSet {
            id: String::from("cs-1"),
            status: status.to_string(),
            execution_status: execution_status.to_string(),
            status_reason: None,
            changes,
        }
    }

    fn db_replacement() -> ResourceChange {
        ResourceChange {
            logical_id: String::from("Database"),
            resource_type: String::from("AWS::RDS::DBInstance"),
            action: String::from("Modify"),
            replacement_required: true,
        }
    }

    fn request(dir: &TempDir, options: DeploymentOptions) -> DeploymentRequest {
        let path = dir.path().join("t.yaml");
        std::fs::write(&path, "Resources: {}\n").expect("write template");
        DeploymentRequest::new("s1", TemplateSource::LocalPath(path)).with_options(options)
    }

    #[tokio::test(start_paused = true)]
    async fn test_deploy_creates_absent_stack_and_waits() {
        let dir = TempDir::new().expect("temp dir");
        let api = FakeStackApi::with_statuses(&[
            None,
            Some("CREATE_IN_PROGRESS"),
            Some("CREATE_COMPLETE"),
        ]);
        let reconciler = StackReconciler::new(api);

        let outcome = reconciler
            .deploy(&request(&dir, DeploymentOptions::default()))
            .await
            .expect("deploy succeeds");

        assert_eq!(outcome.stack_name, "s1");
        assert!(outcome.complete);
        assert_eq!(outcome.action, DeploymentAction::Created);
        assert_eq!(outcome.final_status.as_deref(), Some("CREATE_COMPLETE"));

        let api = reconciler.api();
        assert_eq!(api.count("create_stack"), 1);
        assert_eq!(api.count("create_change_set"), 0);
        // one existence check plus exactly two status polls
        assert_eq!(api.count("describe_stack"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deploy_updates_present_stack_through_change_set() {
        let dir = TempDir::new().expect("temp dir");
        let api = FakeStackApi::with_statuses(&[
            Some("CREATE_COMPLETE"),
            Some("UPDATE_IN_PROGRESS"),
            Some("UPDATE_COMPLETE"),
        ])
        .with_change_sets(vec![
            change_set("CREATE_PENDING", "UNAVAILABLE", vec![]),
            change_set("CREATE_COMPLETE", "AVAILABLE", vec![db_replacement()]),
        ]);
        let reconciler = StackReconciler::new(api);

        let outcome = reconciler
            .deploy(&request(&dir, DeploymentOptions::default()))
            .await
            .expect("deploy succeeds");

        assert_eq!(outcome.action, DeploymentAction::Updated);
        assert!(outcome.complete);
        assert!(outcome.change_set_id.is_some());

        let api = reconciler.api();
        assert_eq!(api.count("create_stack"), 0);
        assert_eq!(api.count("create_change_set"), 1);
        assert_eq!(api.count("describe_change_set"), 2);
        assert_eq!(api.count("execute_change_set"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deploy_without_changes_is_a_noop_success() {
        let dir = TempDir::new().expect("temp dir");
        let mut no_changes = change_set("FAILED", "UNAVAILABLE", vec![]);
        no_changes.status_reason = Some(String::from(
            "The submitted information didn't contain changes. Submit different information to create a change set.",
        ));
        let api = FakeStackApi::with_statuses(&[Some("UPDATE_COMPLETE")])
            .with_change_sets(vec![no_changes]);
        let reconciler = StackReconciler::new(api);

        let outcome = reconciler
            .deploy(&request(&dir, DeploymentOptions::default()))
            .await
            .expect("no-op succeeds");

        assert_eq!(outcome.action, DeploymentAction::NoChanges);
        assert!(outcome.complete);

        let api = reconciler.api();
        assert_eq!(api.count("execute_change_set"), 0);
        assert_eq!(api.count("delete_change_set"), 1);
        assert_eq!(api.count("describe_stack"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_protected_replacement_blocks_update() {
        let dir = TempDir::new().expect("temp dir");
        let harmless = ResourceChange {
            logical_id: String::from("Bucket"),
            resource_type: String::from("AWS::S3::Bucket"),
            action: String::from("Modify"),
            replacement_required: true,
        };
        let evaluated = change_set(
            "CREATE_COMPLETE",
            "AVAILABLE",
            vec![db_replacement(), harmless],
        );

        let mut api = MockStackApi::new();
        api.expect_describe_stack()
            .times(1)
            .returning(|name| Ok(snapshot(name, "UPDATE_COMPLETE")));
        api.expect_create_change_set()
            .times(1)
            .returning(|_| Ok(String::from("cs-1")));
        api.expect_describe_change_set()
            .times(1)
            .returning(move |_, _| Ok(evaluated.clone()));
        api.expect_delete_change_set()
            .times(1)
            .returning(|_, _| Ok(()));
        api.expect_execute_change_set().never();
        api.expect_create_stack().never();

        let reconciler = StackReconciler::new(api);
        let options = DeploymentOptions::default().protect("AWS::RDS::DBInstance");
        let err = reconciler
            .deploy(&request(&dir, options))
            .await
            .expect_err("update must be blocked");

        match err {
            CloudrigError::Stack(StackError::ProtectionViolation {
                change_set_id,
                changes,
                ..
            }) => {
                assert_eq!(change_set_id, "cs-1");
                assert_eq!(changes, vec![db_replacement()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_change_set_is_reported() {
        let dir = TempDir::new().expect("temp dir");
        let mut failed = change_set("FAILED", "UNAVAILABLE", vec![]);
        failed.status_reason = Some(String::from("Template format error: unresolved resource"));
        let api = FakeStackApi::with_statuses(&[Some("UPDATE_COMPLETE")])
            .with_change_sets(vec![failed]);
        let reconciler = StackReconciler::new(api);

        let err = reconciler
            .deploy(&request(&dir, DeploymentOptions::default()))
            .await
            .expect_err("must fail");

        assert!(matches!(
            err,
            CloudrigError::Stack(StackError::ChangeSetFailed { .. })
        ));
        assert_eq!(reconciler.api().count("execute_change_set"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_set_is_discarded_when_evaluation_times_out() {
        let dir = TempDir::new().expect("temp dir");
        let api = FakeStackApi::with_statuses(&[Some("UPDATE_COMPLETE")])
            .with_change_sets(vec![change_set("CREATE_PENDING", "UNAVAILABLE", vec![])]);
        let reconciler = StackReconciler::new(api);

        let options = DeploymentOptions::default().with_timeout_ms(Some(7_000));
        let err = reconciler
            .deploy(&request(&dir, options))
            .await
            .expect_err("must time out");

        assert!(matches!(err, CloudrigError::Stack(StackError::Timeout { .. })));
        let api = reconciler.api();
        assert_eq!(api.count("create_change_set"), 1);
        assert_eq!(api.count("describe_change_set"), 2);
        assert_eq!(api.count("delete_change_set"), 1);
        assert_eq!(api.count("execute_change_set"), 0);
    }

    #[tokio::test]
    async fn test_change_set_is_discarded_when_evaluation_read_fails() {
        let dir = TempDir::new().expect("temp dir");
        let mut api = MockStackApi::new();
        api.expect_describe_stack()
            .times(1)
            .returning(|name| Ok(snapshot(name, "UPDATE_COMPLETE")));
        api.expect_create_change_set()
            .times(1)
            .returning(|_| Ok(String::from("cs-1")));
        api.expect_describe_change_set()
            .times(1)
            .returning(|_, _| Err(StackError::api("DescribeChangeSet", "Rate exceeded").into()));
        api.expect_delete_change_set()
            .withf(|_, id| id.to_string() == "cs-1")
            .times(1)
            .returning(|_, _| Ok(()));
        api.expect_execute_change_set().never();

        let reconciler = StackReconciler::new(api);
        let err = reconciler
            .deploy(&request(&dir, DeploymentOptions::default()))
            .await
            .expect_err("must propagate");

        assert!(matches!(err, CloudrigError::Stack(StackError::Api { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollback_is_a_convergence_failure_with_events() {
        let dir = TempDir::new().expect("temp dir");
        let api = FakeStackApi::with_statuses(&[
            None,
            Some("CREATE_IN_PROGRESS"),
            Some("ROLLBACK_IN_PROGRESS"),
        ]);
        let reconciler = StackReconciler::new(api);

        let err = reconciler
            .deploy(&request(&dir, DeploymentOptions::default()))
            .await
            .expect_err("must fail");

        match err {
            CloudrigError::Stack(StackError::ConvergenceFailure { stack, status, events }) => {
                assert_eq!(stack, "s1");
                assert_eq!(status, "ROLLBACK_IN_PROGRESS");
                assert_eq!(events.len(), 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_budget_times_out_without_polling() {
        let dir = TempDir::new().expect("temp dir");
        let api = FakeStackApi::with_statuses(&[None, Some("CREATE_IN_PROGRESS")]);
        let reconciler = StackReconciler::new(api);

        let options = DeploymentOptions::default().with_timeout_ms(Some(0));
        let err = reconciler
            .deploy(&request(&dir, options))
            .await
            .expect_err("must time out");

        assert!(matches!(err, CloudrigError::Stack(StackError::Timeout { .. })));
        // only the existence check, no status poll
        assert_eq!(reconciler.api().count("describe_stack"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_negative_budget_behaves_like_zero() {
        let reconciler = StackReconciler::new(FakeStackApi::with_statuses(&[Some(
            "CREATE_IN_PROGRESS",
        )]));
        let mut budget = PollBudget::from_ms(Some(-1));

        let err = reconciler
            .wait_for_terminal("s1", &mut budget)
            .await
            .expect_err("must time out");

        assert!(matches!(err, CloudrigError::Stack(StackError::Timeout { .. })));
        assert_eq!(reconciler.api().count("describe_stack"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_is_decremented_per_interval() {
        let reconciler = StackReconciler::new(FakeStackApi::with_statuses(&[Some(
            "CREATE_IN_PROGRESS",
        )]));
        let mut budget = PollBudget::from_ms(Some(12_000));

        let err = reconciler
            .wait_for_terminal("s1", &mut budget)
            .await
            .expect_err("must time out");

        assert!(matches!(
            err,
            CloudrigError::Stack(StackError::Timeout { budget_ms: 12_000, .. })
        ));
        // polls at 12000, 7000 and 2000 ms remaining
        assert_eq!(reconciler.api().count("describe_stack"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_budget_polls_until_terminal() {
        let mut script = vec![Some("UPDATE_IN_PROGRESS"); 200];
        script.push(Some("UPDATE_COMPLETE"));
        let reconciler = StackReconciler::new(FakeStackApi::with_statuses(&script));
        let mut budget = PollBudget::unbounded();

        let status = reconciler
            .wait_for_terminal("s1", &mut budget)
            .await
            .expect("eventually completes");

        assert_eq!(status, "UPDATE_COMPLETE");
        assert_eq!(reconciler.api().count("describe_stack"), 201);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_returns_after_submission() {
        let dir = TempDir::new().expect("temp dir");
        let reconciler = StackReconciler::new(FakeStackApi::with_statuses(&[None]));

        let options = DeploymentOptions::default().with_wait(false);
        let outcome = reconciler
            .deploy(&request(&dir, options))
            .await
            .expect("submitted");

        assert!(!outcome.complete);
        assert_eq!(outcome.final_status, None);
        assert_eq!(reconciler.api().count("describe_stack"), 1);
    }

    #[tokio::test]
    async fn test_existence_read_errors_propagate() {
        let dir = TempDir::new().expect("temp dir");
        let api = FakeStackApi {
            fail_describe: true,
            ..Default::default()
        };
        let reconciler = StackReconciler::new(api);

        let err = reconciler
            .deploy(&request(&dir, DeploymentOptions::default()))
            .await
            .expect_err("must propagate");

        assert!(matches!(err, CloudrigError::Stack(StackError::Api { .. })));
        assert_eq!(reconciler.api().count("create_stack"), 0);
    }

    #[tokio::test]
    async fn test_missing_template_fails_before_network() {
        let reconciler = StackReconciler::new(FakeStackApi::default());
        let request = DeploymentRequest::new(
            "s1",
            TemplateSource::LocalPath("/no/such/template.yaml".into()),
        );

        assert!(reconciler.deploy(&request).await.is_err());
        assert!(reconciler.api().calls.lock().expect("lock").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_succeeds_when_stack_disappears() {
        let reconciler = StackReconciler::new(FakeStackApi::with_statuses(&[
            Some("DELETE_IN_PROGRESS"),
            Some("DELETE_IN_PROGRESS"),
            None,
        ]));

        let outcome = reconciler
            .destroy("s1", &DestroyOptions::default())
            .await
            .expect("deleted");

        assert!(outcome.complete);
        assert_eq!(outcome.action, DeploymentAction::Deleted);
        assert_eq!(outcome.final_status.as_deref(), Some(DELETE_COMPLETE));
        assert_eq!(reconciler.api().count("delete_stack"), 1);
        assert_eq!(reconciler.api().count("describe_stack"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_reports_delete_failure() {
        let reconciler = StackReconciler::new(FakeStackApi::with_statuses(&[
            Some("DELETE_IN_PROGRESS"),
            Some("DELETE_FAILED"),
        ]));

        let err = reconciler
            .destroy("s1", &DestroyOptions::default())
            .await
            .expect_err("must fail");

        assert!(matches!(
            err,
            CloudrigError::Stack(StackError::ConvergenceFailure { .. })
        ));
    }

    #[tokio::test]
    async fn test_exists_treats_absence_as_false() {
        let reconciler = StackReconciler::new(FakeStackApi::with_statuses(&[None]));
        assert!(!reconciler.exists("s1").await.expect("exists"));

        let reconciler = StackReconciler::new(FakeStackApi::with_statuses(&[Some(
            "CREATE_COMPLETE",
        )]));
        assert!(reconciler.exists("s1").await.expect("exists"));

        let failing = StackReconciler::new(FakeStackApi {
            fail_describe: true,
            ..Default::default()
        });
        assert!(failing.exists("s1").await.is_err());
    }

    #[tokio::test]
    async fn test_termination_protection_requires_stack_name() {
        let reconciler = StackReconciler::new(FakeStackApi::default());
        assert!(reconciler.change_termination_protection("", true).await.is_err());

        let ack = reconciler
            .change_termination_protection("s1", true)
            .await
            .expect("ack");
        assert!(ack.enabled);
        assert_eq!(reconciler.api().count("update_termination_protection"), 1);
    }

    #[tokio::test]
    async fn test_outputs_and_parameters_projection() {
        let reconciler = StackReconciler::new(FakeStackApi::with_statuses(&[Some(
            "CREATE_COMPLETE",
        )]));

        let outputs = reconciler.get_outputs("s1").await.expect("outputs");
        assert_eq!(outputs[0].key, "Url");

        let parameters = reconciler.get_parameters("s1").await.expect("parameters");
        assert_eq!(parameters, vec![StackParameter::new("Env", "dev")]);
    }
}
