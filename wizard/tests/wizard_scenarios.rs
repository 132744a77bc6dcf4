//! End-to-end wizard scenarios against scripted collaborators.
//!
//! Each test drives the public orchestration entry points the binary uses and
//! checks both the persisted session and the calls made to AWS and
//! CloudReactor.

use std::collections::VecDeque;

use wizard::controller;
use wizard::core::property::{PropertyKey, PropertyValue};
use wizard::core::state::{Mode, ProvisioningWorkflowState, WorkflowPhase};
use wizard::handlers::{Answer, ask};
use wizard::io::control_plane::Organization;
use wizard::io::provider::ProviderError;
use wizard::io::session_store::{LoadOutcome, SessionStore};
use wizard::provisioning::{INCOMPLETE_OUTPUT_REASON, provision_role_stack};
use wizard::session::Session;
use wizard::test_support::{
    ACCOUNT_ID, ControlPlaneScript, Harness, InstantTicker, ProviderScript, Reply,
    complete_role_stack, set_credentials, stack_id, stack_with_status, temp_session,
};

const CLUSTER: &str = "arn:aws:ecs:us-west-2:123456789012:cluster/tasks";

fn with_stack_name(session: &mut Session, name: &str) {
    session
        .update(PropertyKey::StackName, PropertyValue::text(name))
        .expect("stack name");
}

#[test]
fn fresh_session_runs_through_to_a_registered_environment() {
    let (temp, mut session) = temp_session("production");
    let id = stack_id("CloudReactor-test");
    let mut harness = Harness::new(vec![
        Reply::Choose("us-west-2"),
        Reply::Text("AKIAEXAMPLEKEY"),
        Reply::Text("secret-access-key"),
        Reply::Choose("cluster/tasks"),
        Reply::Choose("Skip subnets"),
        Reply::Choose("Skip security groups"),
        Reply::Text("CloudReactor-test"),
        Reply::Text("api-key"),
        Reply::Confirm(true),
        Reply::Text("staging"),
        Reply::Choose("Quit"),
    ])
    .with_provider(ProviderScript {
        clusters: vec![CLUSTER.to_string()],
        describe_results: VecDeque::from([Ok(Some(complete_role_stack(&id)))]),
        ..Default::default()
    })
    .with_control_plane(ControlPlaneScript {
        organizations: vec![Organization {
            id: 7,
            name: "Acme".to_string(),
        }],
        ..Default::default()
    });

    controller::run(&mut session, &mut harness.collaborators()).expect("run");

    assert_eq!(harness.console.remaining(), 0);
    assert_eq!(session.state.aws_account_id.as_deref(), Some(ACCOUNT_ID));
    assert_eq!(session.state.list(PropertyKey::Subnets), Some(&[][..]));
    assert_eq!(session.state.workflow_phase(), WorkflowPhase::Succeeded);
    assert_eq!(session.state.stack_id_to_update.as_deref(), Some(id.as_str()));
    let reference = session.state.remote_resource.clone().expect("run environment");
    assert_eq!(reference.name, "staging");
    assert!(session.state.api_key_validated);

    let providers = harness.providers.script();
    assert_eq!(providers.submitted.len(), 1);
    assert_eq!(providers.submitted[0].name, "CloudReactor-test");
    let control_plane = harness.control_plane.script();
    assert_eq!(control_plane.created.len(), 1);
    assert_eq!(control_plane.created[0]["created_by_group"]["id"], 7);
    assert!(harness.console.said("You can view your new Run Environment at"));

    let (restored, outcome) =
        SessionStore::new(temp.path().join("saved_settings.json")).load("production");
    assert_eq!(outcome, LoadOutcome::Restored);
    assert_eq!(restored.remote_resource, Some(reference));
    assert_eq!(restored.workflow_phase(), WorkflowPhase::Succeeded);
}

#[test]
fn changing_the_access_key_unsets_aws_scoped_answers() {
    let (_temp, mut session) = temp_session("production");
    set_credentials(&mut session);
    session
        .update(PropertyKey::ClusterArn, PropertyValue::text(CLUSTER))
        .expect("cluster");
    session
        .update(PropertyKey::Subnets, PropertyValue::List(vec!["subnet-1".to_string()]))
        .expect("subnets");
    with_stack_name(&mut session, "CloudReactor");
    session.state.workflow = Some(ProvisioningWorkflowState {
        phase: WorkflowPhase::Succeeded,
        ..Default::default()
    });
    session.state.aws_account_id = Some("000000000000".to_string());
    let mut harness = Harness::new(vec![Reply::Text("AKIANEWKEY")]);

    let answer = ask(PropertyKey::AwsAccessKey, &mut session, &mut harness.collaborators())
        .expect("access key");

    assert_eq!(answer, Answer::Set);
    assert_eq!(session.state.text(PropertyKey::AwsAccessKey), Some("AKIANEWKEY"));
    for key in [
        PropertyKey::ClusterArn,
        PropertyKey::Subnets,
        PropertyKey::SecurityGroups,
        PropertyKey::StackName,
    ] {
        assert!(session.state.get(key).is_none(), "{key} should be unset");
    }
    assert_eq!(session.state.workflow_phase(), WorkflowPhase::NotStarted);
    assert_eq!(session.state.aws_account_id.as_deref(), Some(ACCOUNT_ID));
    assert_eq!(session.state.text(PropertyKey::AwsRegion), Some("us-west-2"));
}

#[test]
fn existing_stack_name_conflict_can_be_left_in_place() {
    let (_temp, mut session) = temp_session("production");
    set_credentials(&mut session);
    with_stack_name(&mut session, "CloudReactor");
    let mut harness = Harness::new(vec![Reply::Confirm(false)]).with_provider(ProviderScript {
        submit_results: VecDeque::from([Err(ProviderError::provider(
            "AlreadyExistsException",
            "Stack [CloudReactor] already exists",
        ))]),
        ..Default::default()
    });

    let provisioned = provision_role_stack(&mut session, &mut harness.collaborators()).expect("provision");

    assert!(!provisioned);
    assert!(session.state.workflow.is_none());
    assert_eq!(session.state.workflow_phase(), WorkflowPhase::NotStarted);
    assert!(session.state.stack_id_to_update.is_none());
    assert_eq!(session.state.text(PropertyKey::StackName), Some("CloudReactor"));
    assert!(harness.providers.script().deleted.is_empty());
    assert!(harness.console.said("That stack already exists. Delete it?"));
}

#[test]
fn up_to_date_stack_update_counts_as_success() {
    let (_temp, mut session) = temp_session("production");
    set_credentials(&mut session);
    with_stack_name(&mut session, "CloudReactor");
    let target = stack_id("CloudReactor");
    session.state.stack_id_to_update = Some(target.clone());
    let mut settled = complete_role_stack(&target);
    settled.status = "UPDATE_COMPLETE".to_string();
    let mut harness = Harness::new(Vec::new()).with_provider(ProviderScript {
        submit_results: VecDeque::from([Err(ProviderError::provider(
            "ValidationError",
            "No updates are to be performed.",
        ))]),
        describe_results: VecDeque::from([Ok(Some(settled))]),
        ..Default::default()
    });

    let provisioned = provision_role_stack(&mut session, &mut harness.collaborators()).expect("provision");

    assert!(provisioned);
    assert_eq!(session.state.workflow_phase(), WorkflowPhase::Succeeded);
    let workflow = session.state.workflow.as_ref().expect("workflow");
    assert_eq!(workflow.remote_stack_id.as_deref(), Some(target.as_str()));
    assert!(harness.console.said("No stack updates were necessary"));
}

#[test]
fn failed_update_submission_keeps_the_update_target() {
    let (_temp, mut session) = temp_session("production");
    set_credentials(&mut session);
    with_stack_name(&mut session, "CloudReactor");
    let target = stack_id("CloudReactor");
    session.state.stack_id_to_update = Some(target.clone());
    let mut harness = Harness::new(Vec::new()).with_provider(ProviderScript {
        submit_results: VecDeque::from([Err(ProviderError::Transport("connection reset".to_string()))]),
        describe_results: VecDeque::from([Ok(Some(complete_role_stack(&target)))]),
        ..Default::default()
    });

    let first = provision_role_stack(&mut session, &mut harness.collaborators()).expect("provision");

    assert!(!first);
    assert_eq!(session.state.workflow_phase(), WorkflowPhase::NotStarted);
    assert_eq!(session.state.stack_id_to_update.as_deref(), Some(target.as_str()));
    assert!(harness.console.said("Failed to install stack: connection reset"));

    let second = provision_role_stack(&mut session, &mut harness.collaborators()).expect("provision");

    assert!(second);
    assert_eq!(session.state.workflow_phase(), WorkflowPhase::Succeeded);
    let script = harness.providers.script();
    assert_eq!(script.submitted.len(), 2);
    assert_eq!(script.submitted[1].update_target.as_deref(), Some(target.as_str()));
}

#[test]
fn describe_failure_reconnects_before_the_next_poll() {
    let (_temp, mut session) = temp_session("production");
    set_credentials(&mut session);
    with_stack_name(&mut session, "CloudReactor");
    let id = stack_id("CloudReactor");
    let mut harness = Harness::new(Vec::new()).with_provider(ProviderScript {
        describe_results: VecDeque::from([
            Err(ProviderError::Transport("read timed out".to_string())),
            Ok(Some(complete_role_stack(&id))),
        ]),
        ..Default::default()
    });

    let provisioned = provision_role_stack(&mut session, &mut harness.collaborators()).expect("provision");

    assert!(provisioned);
    assert_eq!(session.state.workflow_phase(), WorkflowPhase::Succeeded);
    let script = harness.providers.script();
    // One client for the submission, one per poll attempt.
    assert_eq!(script.connects, 3);
    assert_eq!(script.described, 2);
    assert_eq!(harness.ticker.ticks.get(), 1);
}

#[test]
fn resumed_poll_survives_a_failed_connect() {
    let (_temp, mut session) = temp_session("production");
    set_credentials(&mut session);
    with_stack_name(&mut session, "CloudReactor");
    let id = stack_id("CloudReactor");
    session.state.workflow = Some(ProvisioningWorkflowState {
        phase: WorkflowPhase::Polling,
        remote_stack_id: Some(id.clone()),
        ..Default::default()
    });
    let mut harness = Harness::new(Vec::new()).with_provider(ProviderScript {
        failing_connects: 1,
        describe_results: VecDeque::from([Ok(Some(complete_role_stack(&id)))]),
        ..Default::default()
    });

    let provisioned = provision_role_stack(&mut session, &mut harness.collaborators()).expect("provision");

    assert!(provisioned);
    assert_eq!(session.state.workflow_phase(), WorkflowPhase::Succeeded);
    let script = harness.providers.script();
    assert!(script.submitted.is_empty());
    assert_eq!(script.connects, 2);
    assert_eq!(script.described, 1);
    assert_eq!(harness.ticker.ticks.get(), 1);
}

#[test]
fn stack_deleted_while_polling_clears_the_stack_name() {
    let (_temp, mut session) = temp_session("production");
    set_credentials(&mut session);
    with_stack_name(&mut session, "CloudReactor");
    let mut harness = Harness::new(Vec::new()).with_provider(ProviderScript {
        describe_results: VecDeque::from([Ok(None)]),
        ..Default::default()
    });

    let provisioned = provision_role_stack(&mut session, &mut harness.collaborators()).expect("provision");

    assert!(!provisioned);
    assert!(session.state.workflow.is_none());
    assert_eq!(session.state.text(PropertyKey::StackName), None);
    assert_eq!(session.state.stack_id_to_update, None);
    assert!(harness.console.said("CloudFormation stack 'CloudReactor' was deleted"));
}

#[test]
fn stack_without_required_outputs_is_failed() {
    let (_temp, mut session) = temp_session("production");
    set_credentials(&mut session);
    with_stack_name(&mut session, "CloudReactor");
    let id = stack_id("CloudReactor");
    let mut harness = Harness::new(vec![Reply::Confirm(false)]).with_provider(ProviderScript {
        describe_results: VecDeque::from([Ok(Some(stack_with_status(&id, "CREATE_COMPLETE")))]),
        ..Default::default()
    });

    let provisioned = provision_role_stack(&mut session, &mut harness.collaborators()).expect("provision");

    assert!(!provisioned);
    let workflow = session.state.workflow.as_ref().expect("workflow");
    assert_eq!(workflow.phase, WorkflowPhase::Failed);
    assert_eq!(workflow.failure_reason.as_deref(), Some(INCOMPLETE_OUTPUT_REASON));
    assert!(workflow.outputs.is_empty());
    assert!(harness.console.said("Something was missing from the stack output"));
}

#[test]
fn cancelled_poll_stays_resumable() {
    let (temp, mut session) = temp_session("production");
    set_credentials(&mut session);
    with_stack_name(&mut session, "CloudReactor");
    let id = stack_id("CloudReactor");
    let mut harness = Harness::new(Vec::new())
        .with_provider(ProviderScript {
            describe_results: VecDeque::from([Ok(Some(stack_with_status(&id, "CREATE_IN_PROGRESS")))]),
            ..Default::default()
        })
        .with_ticker(InstantTicker::with_limit(2));

    let provisioned = provision_role_stack(&mut session, &mut harness.collaborators()).expect("provision");

    assert!(!provisioned);
    assert_eq!(session.state.workflow_phase(), WorkflowPhase::Polling);
    assert_eq!(harness.providers.script().described, 3);

    let (restored, _) = SessionStore::new(temp.path().join("saved_settings.json")).load("production");
    assert_eq!(restored.workflow_phase(), WorkflowPhase::Polling);
    assert_eq!(
        restored.workflow.and_then(|workflow| workflow.remote_stack_id),
        Some(id)
    );
}

#[test]
fn in_flight_workflow_is_resumed_on_startup() {
    let (_temp, mut session) = temp_session("production");
    set_credentials(&mut session);
    with_stack_name(&mut session, "CloudReactor");
    let id = stack_id("CloudReactor");
    session.state.workflow = Some(ProvisioningWorkflowState {
        phase: WorkflowPhase::Polling,
        remote_stack_id: Some(id.clone()),
        ..Default::default()
    });
    session.state.mode = Mode::Edit;
    let mut harness = Harness::new(vec![Reply::Choose("Quit")]).with_provider(ProviderScript {
        describe_results: VecDeque::from([Ok(Some(complete_role_stack(&id)))]),
        ..Default::default()
    });

    controller::run(&mut session, &mut harness.collaborators()).expect("run");

    assert_eq!(session.state.workflow_phase(), WorkflowPhase::Succeeded);
    assert!(harness.providers.script().submitted.is_empty());
    assert!(harness.console.said("Checking on the CloudFormation stack"));
}
