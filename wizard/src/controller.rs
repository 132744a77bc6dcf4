//! Interview / edit mode controller.
//!
//! Interview mode asks unset properties in registry order; edit mode offers
//! every property in a menu. Once all properties are set and the operator
//! confirms, the permissions stack is provisioned and the run environment
//! registered, after which the post-completion menu takes over.

use anyhow::Result;
use tracing::{debug, info};

use crate::core::display::property_choices;
use crate::core::names::run_environment_url;
use crate::core::property::PropertyKey;
use crate::core::state::Mode;
use crate::handlers::{Answer, ask};
use crate::provisioning::provision_role_stack;
use crate::reconcile::register_run_environment;
use crate::session::{Collaborators, Session};

const EXIT_MESSAGE: &str =
    "\nExiting for now. You can finish the setup process later by running this wizard again.\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    Quit,
}

/// Drive the session until the operator quits.
pub fn run(session: &mut Session, deps: &mut Collaborators<'_>) -> Result<()> {
    resume_in_flight(session, deps)?;

    let mut first_run = true;
    loop {
        if session.state.remote_resource.is_some() {
            match post_completion(session, deps)? {
                Step::Continue => continue,
                Step::Quit => return Ok(()),
            }
        }

        if session.state.mode == Mode::Interview {
            print_menu(session, deps);
            if !first_run {
                let proceed = deps
                    .console
                    .confirm("Continue step-by-step interview? (n switches to editing settings)");
                if proceed != Some(true) {
                    set_mode(session, Mode::Edit)?;
                }
            }
        }
        first_run = false;

        let step = match session.state.mode {
            Mode::Interview => interview(session, deps)?,
            Mode::Edit => edit(session, deps)?,
        };
        if step == Step::Quit {
            return Ok(());
        }
    }
}

/// Finish a stack submission that was still in flight when the last run ended.
fn resume_in_flight(session: &mut Session, deps: &mut Collaborators<'_>) -> Result<()> {
    if !session.state.workflow_phase().is_in_flight() {
        return Ok(());
    }
    info!(phase = ?session.state.workflow_phase(), "resuming in-flight stack submission");
    deps.console
        .say("Checking on the CloudFormation stack submitted during the last session ...\n");
    if provision_role_stack(session, deps)?
        && session.state.get(PropertyKey::ApiKey).is_some()
        && session.state.remote_resource.is_none()
    {
        register_run_environment(session, deps)?;
    }
    Ok(())
}

fn print_menu(session: &Session, deps: &mut Collaborators<'_>) {
    let choices = property_choices(session.registry().prompted(), &session.state);
    deps.console.say(&format!("{}\n", choices.join("\n")));
}

fn set_mode(session: &mut Session, mode: Mode) -> Result<()> {
    if session.state.mode != mode {
        info!(mode = ?mode, "switching mode");
        session.state.mode = mode;
        session.save()?;
    }
    Ok(())
}

fn interview(session: &mut Session, deps: &mut Collaborators<'_>) -> Result<Step> {
    while let Some(key) = session
        .registry()
        .next_unset(&session.state.properties)
        .map(|descriptor| descriptor.key)
    {
        debug!(key = %key, "interviewing");
        let answer = ask(key, session, deps)?;
        if answer == Answer::Cancelled || session.state.get(key).is_none() {
            set_mode(session, Mode::Edit)?;
            return Ok(Step::Continue);
        }
    }
    handle_all_settings_entered(session, deps)
}

fn edit(session: &mut Session, deps: &mut Collaborators<'_>) -> Result<Step> {
    let keys: Vec<PropertyKey> = session
        .registry()
        .prompted()
        .map(|descriptor| descriptor.key)
        .collect();
    let mut choices = property_choices(session.registry().prompted(), &session.state);
    let n = choices.len();
    choices.push(format!("{}. Back to interview", n + 1));
    choices.push(format!("{}. Quit", n + 2));

    let Some(index) = deps
        .console
        .select("Which setting do you want to edit?", &choices)
    else {
        deps.console.say(EXIT_MESSAGE);
        return Ok(Step::Quit);
    };

    match keys.get(index) {
        Some(&key) => {
            ask(key, session, deps)?;
            if session.registry().all_set(&session.state.properties) {
                return handle_all_settings_entered(session, deps);
            }
            Ok(Step::Continue)
        }
        None if index == n => {
            set_mode(session, Mode::Interview)?;
            Ok(Step::Continue)
        }
        None => Ok(Step::Quit),
    }
}

/// Confirm, then provision and register. A failure switches to edit mode so
/// the operator can fix whichever setting caused it.
fn handle_all_settings_entered(session: &mut Session, deps: &mut Collaborators<'_>) -> Result<Step> {
    let proceed = deps
        .console
        .confirm("All settings have been entered. Proceed with CloudReactor setup?");
    if proceed != Some(true) {
        return Ok(Step::Continue);
    }

    if !provision_role_stack(session, deps)? || !register_run_environment(session, deps)? {
        set_mode(session, Mode::Edit)?;
    }
    Ok(Step::Continue)
}

fn post_completion(session: &mut Session, deps: &mut Collaborators<'_>) -> Result<Step> {
    deps.console
        .say("Congratulations, you've completed all the steps to setup your AWS environment!\n");
    if let Some(reference) = &session.state.remote_resource {
        deps.console.say(&format!(
            "You can view your new Run Environment at {}",
            run_environment_url(session.state.deployment_environment(), &reference.id)
        ));
    }
    let has_defaults = [PropertyKey::Subnets, PropertyKey::SecurityGroups]
        .into_iter()
        .all(|key| session.state.list(key).is_some_and(|items| !items.is_empty()));
    if !has_defaults {
        deps.console
            .say("You may optionally add default subnets and security groups there.");
    }

    let choices = vec![
        "1. Create or update another Run Environment".to_string(),
        "2. Reset all settings and start over".to_string(),
        "3. Quit".to_string(),
    ];
    match deps
        .console
        .select("What would you like to do next?", &choices)
    {
        Some(0) => {
            for key in [
                PropertyKey::ClusterArn,
                PropertyKey::Subnets,
                PropertyKey::SecurityGroups,
            ] {
                session.clear(key)?;
            }
            session.state.network = None;
            session.state.remote_resource = None;
            session.state.mode = Mode::Interview;
            session.save()?;
            Ok(Step::Continue)
        }
        Some(1) => {
            session.reset()?;
            Ok(Step::Continue)
        }
        Some(_) => {
            deps.console.say(
                "To deploy a task managed and monitored by CloudReactor, please follow the instructions at https://docs.cloudreactor.io/\n\nWe hope you enjoy using CloudReactor!\n",
            );
            Ok(Step::Quit)
        }
        None => {
            deps.console.say(EXIT_MESSAGE);
            Ok(Step::Quit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::property::PropertyValue;
    use crate::core::state::{RemoteResourceRef, WorkflowPhase};
    use crate::test_support::{Harness, Reply, temp_session};

    #[test]
    fn cancelled_prompt_switches_to_edit_and_cancelled_menu_quits() {
        let (_temp, mut session) = temp_session("production");
        let mut harness = Harness::new(vec![Reply::Cancel, Reply::Cancel]);

        run(&mut session, &mut harness.collaborators()).expect("run");

        assert_eq!(session.state.mode, Mode::Edit);
        assert!(harness.console.said("Exiting for now"));
        assert!(harness.console.said("1. AWS region: (Not Set)"));
    }

    #[test]
    fn end_of_input_quits_gracefully() {
        let (_temp, mut session) = temp_session("production");
        let mut harness = Harness::new(Vec::new());
        run(&mut session, &mut harness.collaborators()).expect("run");
        assert!(harness.console.said("Exiting for now"));
    }

    #[test]
    fn edit_menu_back_to_interview_changes_only_the_mode() {
        let (_temp, mut session) = temp_session("production");
        session.state.mode = Mode::Edit;
        let before = session.state.properties.clone();
        let mut harness = Harness::new(vec![
            Reply::Choose("Back to interview"),
            Reply::Cancel,
            Reply::Choose("Quit"),
        ]);

        run(&mut session, &mut harness.collaborators()).expect("run");

        assert_eq!(session.state.properties, before);
        let last_menu = harness.console.menus.last().expect("menu");
        assert_eq!(last_menu.len(), 10);
        assert_eq!(last_menu[8], "9. Back to interview");
    }

    #[test]
    fn declining_to_proceed_changes_nothing() {
        let (_temp, mut session) = temp_session("production");
        for key in PropertyKey::ALL {
            session
                .state
                .properties
                .entry(key)
                .or_insert_with(|| PropertyValue::text("value"));
        }
        let before = session.state.clone();
        let mut harness = Harness::new(vec![Reply::Confirm(false)]);

        run(&mut session, &mut harness.collaborators()).expect("run");

        assert_eq!(session.state.properties, before.properties);
        assert!(session.state.workflow.is_none());
        assert!(harness.console.said("Proceed with CloudReactor setup?"));
    }

    #[test]
    fn another_run_environment_clears_the_cluster_selection() {
        let (_temp, mut session) = temp_session("production");
        session
            .update(PropertyKey::ClusterArn, PropertyValue::text("arn:cluster/a"))
            .expect("update");
        session
            .update(PropertyKey::Subnets, PropertyValue::List(vec!["subnet-1".to_string()]))
            .expect("update");
        session.state.remote_resource = Some(RemoteResourceRef {
            id: "u-1".to_string(),
            name: "staging".to_string(),
        });
        let mut harness = Harness::new(vec![Reply::Choose("another Run Environment")]);

        run(&mut session, &mut harness.collaborators()).expect("run");

        assert!(session.state.get(PropertyKey::ClusterArn).is_none());
        assert!(session.state.get(PropertyKey::Subnets).is_none());
        assert!(session.state.remote_resource.is_none());
        assert!(harness.console.said("https://dash.cloudreactor.io/run_environments/u-1"));
        assert!(harness.console.said("You may optionally add default subnets"));
    }

    #[test]
    fn reset_keeps_the_deployment_environment() {
        let (_temp, mut session) = temp_session("staging");
        session
            .update(PropertyKey::AwsRegion, PropertyValue::text("us-east-1"))
            .expect("update");
        session.state.remote_resource = Some(RemoteResourceRef {
            id: "u-1".to_string(),
            name: "staging".to_string(),
        });
        let mut harness = Harness::new(vec![Reply::Choose("Reset all settings")]);

        run(&mut session, &mut harness.collaborators()).expect("run");

        assert!(session.state.get(PropertyKey::AwsRegion).is_none());
        assert_eq!(session.state.deployment_environment(), "staging");
        assert_eq!(session.state.workflow_phase(), WorkflowPhase::NotStarted);
    }
}
