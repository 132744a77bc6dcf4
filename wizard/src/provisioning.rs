//! Provisioning workflow for declarative stacks.
//!
//! A submission moves the persisted workflow through
//! `NotStarted -> Submitted -> Polling -> Succeeded | Failed`, saving after
//! every transition so an interrupted poll can be resumed by the next run.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::core::names::role_template_url;
use crate::core::property::PropertyKey;
use crate::core::secrets::generate_random_key;
use crate::core::stack::{
    EXTERNAL_ID, ROLE_STACK_OUTPUTS, StackDescription, StatusClass, WORKFLOW_STARTER_ACCESS_KEY,
    classify_status, role_stack_outputs,
};
use crate::core::state::{ProvisioningWorkflowState, WorkflowPhase};
use crate::io::provider::{
    AwsCredentials, Provider, ProviderError, StackParameter, StackRequest, TemplateSource,
};
use crate::session::{Collaborators, Session};

pub const NAMED_IAM_CAPABILITY: &str = "CAPABILITY_NAMED_IAM";
pub const INCOMPLETE_OUTPUT_REASON: &str = "incomplete output";
pub const TARGET_MISSING_REASON: &str = "target missing";

const HELP_MESSAGE: &str = "Please contact support@cloudreactor.io for help.";

/// Shared flag that abandons a poll at its next tick.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    polling: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// True while a poll is running.
    pub fn is_polling(&self) -> bool {
        self.polling.load(Ordering::SeqCst)
    }

    /// Mark a poll as running until the guard drops. Clears an earlier
    /// cancellation so each poll starts live.
    pub fn begin_poll(&self) -> PollGuard {
        self.cancelled.store(false, Ordering::SeqCst);
        self.polling.store(true, Ordering::SeqCst);
        PollGuard(self.clone())
    }
}

#[must_use]
pub struct PollGuard(CancelToken);

impl Drop for PollGuard {
    fn drop(&mut self) {
        self.0.polling.store(false, Ordering::SeqCst);
    }
}

/// Waits between polls.
pub trait Ticker {
    /// Wait for `interval`; false when `cancel` fired first.
    fn wait(&self, interval: Duration, cancel: &CancelToken) -> bool;
}

/// Sleeps in short slices so cancellation is noticed promptly.
pub struct SleepTicker;

const SLEEP_SLICE: Duration = Duration::from_millis(200);

impl Ticker for SleepTicker {
    fn wait(&self, interval: Duration, cancel: &CancelToken) -> bool {
        let deadline = Instant::now() + interval;
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The provider accepted the request and is working on this stack id.
    Submitted(String),
    /// The update target already matches the request.
    Unchanged(String),
}

/// Create or update a stack. "No updates are to be performed" on an update is
/// a benign outcome, not an error.
pub fn submit(provider: &dyn Provider, request: &StackRequest) -> Result<SubmitOutcome, ProviderError> {
    match provider.submit_stack(request) {
        Ok(stack_id) => Ok(SubmitOutcome::Submitted(stack_id)),
        Err(err) if err.is_no_updates() => match &request.update_target {
            Some(target) => {
                info!(stack = %request.name, "stack already up to date");
                Ok(SubmitOutcome::Unchanged(target.clone()))
            }
            None => Err(err),
        },
        Err(err) => Err(err),
    }
}

/// A stack that is no longer in progress, or why waiting stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    Stack(StackDescription),
    Missing,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalResult {
    Succeeded(StackDescription),
    Failed {
        status: String,
        reason: Option<String>,
    },
    /// The stack was deleted out of band.
    Missing,
    Cancelled,
}

pub fn classify_settled(settled: Settled) -> TerminalResult {
    match settled {
        Settled::Stack(description) => match classify_status(&description.status) {
            StatusClass::Succeeded => TerminalResult::Succeeded(description),
            StatusClass::Failed | StatusClass::InProgress => TerminalResult::Failed {
                status: description.status,
                reason: description.status_reason,
            },
        },
        Settled::Missing => TerminalResult::Missing,
        Settled::Cancelled => TerminalResult::Cancelled,
    }
}

/// Describe `stack_id` until it leaves the in-progress statuses.
///
/// There is no overall timeout. Describe and connect failures are retried
/// after the same interval with a freshly connected client.
#[instrument(skip_all, fields(stack_id = %stack_id))]
pub fn wait_until_settled(
    deps: &mut Collaborators<'_>,
    credentials: &AwsCredentials,
    stack_id: &str,
) -> Settled {
    let _poll = deps.cancel.begin_poll();
    let mut provider: Option<Box<dyn Provider>> = None;
    loop {
        if deps.cancel.is_cancelled() {
            return Settled::Cancelled;
        }
        if provider.is_none() {
            match deps.providers.connect(credentials) {
                Ok(connected) => provider = Some(connected),
                Err(err) => warn!(err = %err, "provider connect failed, retrying"),
            }
        }
        if let Some(client) = provider.as_deref() {
            match client.describe_stack(stack_id) {
                Ok(None) => return Settled::Missing,
                Ok(Some(description)) => {
                    if classify_status(&description.status) != StatusClass::InProgress {
                        debug!(status = %description.status, "stack settled");
                        return Settled::Stack(description);
                    }
                    deps.console.say(&format!(
                        "CloudFormation stack installation is still in progress ({}). Waiting {} seconds before checking again ...",
                        description.status,
                        deps.poll_interval.as_secs()
                    ));
                }
                Err(err) => {
                    warn!(err = %err, "describe stack failed, re-creating client");
                    provider = None;
                }
            }
        }
        if !deps.ticker.wait(deps.poll_interval, &deps.cancel) {
            return Settled::Cancelled;
        }
    }
}

/// Request for the CloudReactor permissions stack.
///
/// Creation carries freshly generated shared secrets; an update keeps the
/// values already stored with the stack.
pub fn role_stack_request(
    name: &str,
    deployment: &str,
    update_target: Option<String>,
) -> StackRequest {
    let parameters = if update_target.is_some() {
        vec![
            StackParameter::use_previous(EXTERNAL_ID),
            StackParameter::use_previous(WORKFLOW_STARTER_ACCESS_KEY),
        ]
    } else {
        vec![
            StackParameter::value(EXTERNAL_ID, generate_random_key()),
            StackParameter::value(WORKFLOW_STARTER_ACCESS_KEY, generate_random_key()),
        ]
    };
    StackRequest {
        name: name.to_string(),
        template: TemplateSource::Url(role_template_url(deployment)),
        parameters,
        capabilities: vec![NAMED_IAM_CAPABILITY.to_string()],
        update_target,
    }
}

fn workflow_mut(session: &mut Session) -> &mut ProvisioningWorkflowState {
    session.state.workflow.get_or_insert_with(Default::default)
}

/// Bring the permissions stack to a verified success.
///
/// Returns true once the workflow is `Succeeded`. Every other outcome has
/// been reported to the operator and persisted.
pub fn provision_role_stack(session: &mut Session, deps: &mut Collaborators<'_>) -> Result<bool> {
    let Some(credentials) = session.credentials() else {
        deps.console
            .say("You must set your AWS credentials before installing a CloudFormation stack.\n");
        return Ok(false);
    };
    let Some(stack_name) = session.state.text(PropertyKey::StackName).map(str::to_string) else {
        deps.console
            .say("You must choose a CloudFormation stack name before installing the stack.\n");
        return Ok(false);
    };

    match session.state.workflow_phase() {
        WorkflowPhase::Succeeded => return Ok(true),
        WorkflowPhase::Submitted | WorkflowPhase::Polling => {
            return await_role_stack(session, deps, &credentials, &stack_name, false);
        }
        WorkflowPhase::NotStarted | WorkflowPhase::Failed => {}
    }

    let provider = match deps.providers.connect(&credentials) {
        Ok(provider) => provider,
        Err(err) => {
            deps.console.say(&format!(
                "Your AWS credentials could not be used ({err}). Please check them and try again.\n"
            ));
            return Ok(false);
        }
    };

    let update_target = session.state.stack_id_to_update.clone();
    let is_update = update_target.is_some();
    let request = role_stack_request(&stack_name, session.state.deployment_environment(), update_target);

    session.state.workflow = Some(ProvisioningWorkflowState::default());
    session.save()?;

    let outcome = match submit(provider.as_ref(), &request) {
        Ok(outcome) => outcome,
        Err(err) => return handle_submit_error(session, deps, provider.as_ref(), &stack_name, is_update, &err),
    };

    let (stack_id, unchanged) = match outcome {
        SubmitOutcome::Submitted(stack_id) => {
            deps.console.say(&format!(
                "Started CloudFormation role template installation for stack '{stack_name}', stack ID is {stack_id}."
            ));
            (stack_id, false)
        }
        SubmitOutcome::Unchanged(stack_id) => {
            deps.console.say(&format!(
                "No stack updates were necessary. Using existing stack name '{stack_name}'.\n"
            ));
            (stack_id, true)
        }
    };

    let workflow = workflow_mut(session);
    workflow.phase = WorkflowPhase::Submitted;
    workflow.submitted_at = Some(Utc::now());
    workflow.remote_stack_id = Some(stack_id.clone());
    if !is_update {
        session.state.stack_id_to_update = Some(stack_id.clone());
    }
    info!(stack = %stack_name, stack_id = %stack_id, unchanged, "role stack submitted");
    session.save()?;

    await_role_stack(session, deps, &credentials, &stack_name, unchanged)
}

fn handle_submit_error(
    session: &mut Session,
    deps: &mut Collaborators<'_>,
    provider: &dyn Provider,
    stack_name: &str,
    is_update: bool,
    err: &ProviderError,
) -> Result<bool> {
    warn!(err = %err, stack = %stack_name, "failed to install stack");
    deps.console.say(&format!("Failed to install stack: {err}"));

    if !is_update && err.is_already_exists() {
        let delete = deps.console.confirm("That stack already exists. Delete it?");
        if delete == Some(true) {
            delete_stack(deps, provider, stack_name);
        }
        session.state.stack_id_to_update = None;
    }

    // An update target survives other failures so a retry updates it again.
    session.state.workflow = None;
    session.save()?;
    Ok(false)
}

fn delete_stack(deps: &mut Collaborators<'_>, provider: &dyn Provider, stack_id_or_name: &str) -> bool {
    match provider.delete_stack(stack_id_or_name) {
        Ok(()) => {
            info!(stack = %stack_id_or_name, "stack scheduled for deletion");
            deps.console.say(&format!(
                "Stack '{stack_id_or_name}' was scheduled for deletion. It may take a few minutes before the stack is completely deleted.\n"
            ));
            true
        }
        Err(err) => {
            warn!(err = %err, stack = %stack_id_or_name, "can't delete stack");
            deps.console.say(&format!(
                "Can't delete CloudFormation stack '{stack_id_or_name}', error = {err}\nYou can use the AWS Console to delete the CloudFormation stack manually. You can still use this wizard to install another CloudFormation stack with a different name.\n"
            ));
            false
        }
    }
}

fn await_role_stack(
    session: &mut Session,
    deps: &mut Collaborators<'_>,
    credentials: &AwsCredentials,
    stack_name: &str,
    unchanged: bool,
) -> Result<bool> {
    let Some(stack_id) = session
        .state
        .workflow
        .as_ref()
        .and_then(|workflow| workflow.remote_stack_id.clone())
    else {
        warn!("in-flight workflow without a stack id, resetting");
        session.state.workflow = None;
        session.save()?;
        return Ok(false);
    };

    workflow_mut(session).phase = WorkflowPhase::Polling;
    session.save()?;

    let settled = wait_until_settled(deps, credentials, &stack_id);
    let result = match settled {
        Settled::Stack(description) if unchanged => TerminalResult::Succeeded(description),
        other => classify_settled(other),
    };

    match result {
        TerminalResult::Succeeded(description) => match role_stack_outputs(&description) {
            Ok(outputs) => {
                for key in outputs.keys() {
                    if !ROLE_STACK_OUTPUTS.contains(&key.as_str())
                        && key != EXTERNAL_ID
                        && key != WORKFLOW_STARTER_ACCESS_KEY
                    {
                        warn!(output = %key, "got unknown stack output");
                    }
                }
                let workflow = workflow_mut(session);
                workflow.phase = WorkflowPhase::Succeeded;
                workflow.finished_at = Some(Utc::now());
                workflow.provider_status = Some(description.status.clone());
                workflow.failure_reason = None;
                workflow.outputs = outputs;
                info!(stack = %stack_name, status = %description.status, "role stack succeeded");
                session.save()?;
                deps.console.say(
                    "The installation of the CloudFormation stack for CloudReactor permissions was successful.\n",
                );
                Ok(true)
            }
            Err(missing) => {
                warn!(missing = ?missing, "stack succeeded without required outputs");
                deps.console.say(&format!(
                    "Something was missing from the stack output ({}). {HELP_MESSAGE}\n",
                    missing.join(", ")
                ));
                fail_role_stack(
                    session,
                    deps,
                    &stack_id,
                    description.status,
                    INCOMPLETE_OUTPUT_REASON.to_string(),
                )
            }
        },
        TerminalResult::Failed { status, reason } => {
            let reason = reason.unwrap_or_else(|| "(Unknown)".to_string());
            fail_role_stack(session, deps, &stack_id, status, reason)
        }
        TerminalResult::Missing => {
            warn!(stack_id = %stack_id, "stack no longer exists");
            deps.console.say(&format!(
                "CloudFormation stack '{stack_name}' was deleted, please check your settings and try again.\n"
            ));
            session.clear(PropertyKey::StackName)?;
            session.state.workflow = None;
            session.save()?;
            debug!(reason = TARGET_MISSING_REASON, "workflow cleared");
            Ok(false)
        }
        TerminalResult::Cancelled => {
            deps.console.say(
                "Stopped waiting for the CloudFormation stack. Run the wizard again to resume checking on it.\n",
            );
            Ok(false)
        }
    }
}

fn fail_role_stack(
    session: &mut Session,
    deps: &mut Collaborators<'_>,
    stack_id: &str,
    status: String,
    reason: String,
) -> Result<bool> {
    deps.console.say(&format!(
        "The installation of the CloudFormation stack for CloudReactor permissions failed with status '{status}' and reason '{reason}'."
    ));
    let workflow = workflow_mut(session);
    workflow.phase = WorkflowPhase::Failed;
    workflow.finished_at = Some(Utc::now());
    workflow.provider_status = Some(status);
    workflow.failure_reason = Some(reason);
    workflow.outputs.clear();
    session.save()?;

    if deps
        .console
        .confirm("Do you want to delete the stack and try again?")
        != Some(true)
    {
        return Ok(false);
    }
    let deleted = match session.credentials().map(|credentials| deps.providers.connect(&credentials)) {
        Some(Ok(provider)) => delete_stack(deps, provider.as_ref(), stack_id),
        Some(Err(err)) => {
            deps.console
                .say(&format!("AWS authentication is not working, can't delete CloudFormation stack ({err}).\n"));
            false
        }
        None => false,
    };
    if deleted {
        session.state.workflow = None;
        session.state.stack_id_to_update = None;
        session.save()?;
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::provider::ParameterValue;

    #[test]
    fn create_request_generates_secrets() {
        let request = role_stack_request("CloudReactor", "production", None);
        assert_eq!(request.capabilities, vec![NAMED_IAM_CAPABILITY]);
        assert_eq!(
            request.template,
            TemplateSource::Url(role_template_url("production"))
        );
        for parameter in &request.parameters {
            match &parameter.value {
                ParameterValue::Value(value) => assert_eq!(value.len(), 32),
                ParameterValue::UsePrevious => panic!("create must send values"),
            }
        }
        assert_ne!(request.parameters[0].value, request.parameters[1].value);
    }

    #[test]
    fn update_request_never_resends_secrets() {
        let request = role_stack_request("CloudReactor", "staging", Some("arn:stack/1".to_string()));
        assert!(
            request
                .parameters
                .iter()
                .all(|parameter| parameter.value == ParameterValue::UsePrevious)
        );
        assert_eq!(request.update_target.as_deref(), Some("arn:stack/1"));
    }

    #[test]
    fn settled_stacks_classify_by_status() {
        let description = |status: &str| StackDescription {
            status: status.to_string(),
            status_reason: Some("reason".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            classify_settled(Settled::Stack(description("UPDATE_COMPLETE"))),
            TerminalResult::Succeeded(_)
        ));
        assert_eq!(
            classify_settled(Settled::Stack(description("ROLLBACK_COMPLETE"))),
            TerminalResult::Failed {
                status: "ROLLBACK_COMPLETE".to_string(),
                reason: Some("reason".to_string()),
            }
        );
        assert_eq!(classify_settled(Settled::Missing), TerminalResult::Missing);
    }

    #[test]
    fn sleep_ticker_stops_when_cancelled() {
        let cancel = CancelToken::default();
        cancel.cancel();
        let started = Instant::now();
        assert!(!SleepTicker.wait(Duration::from_secs(5), &cancel));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(SleepTicker.wait(Duration::from_millis(10), &CancelToken::default()));
    }

    #[test]
    fn poll_guard_tracks_the_running_poll() {
        let cancel = CancelToken::default();
        cancel.cancel();
        {
            let _poll = cancel.begin_poll();
            assert!(cancel.is_polling());
            assert!(!cancel.is_cancelled());
            cancel.clone().cancel();
            assert!(cancel.is_cancelled());
        }
        assert!(!cancel.is_polling());
    }
}
