//! Per-property prompt handlers.
//!
//! [`ask`] dispatches on the closed [`PropertyKey`] set. A handler either
//! stores a value through the session or reports that the operator went back.

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::display::mask_secret;
use crate::core::names::{AWS_REGIONS, DEFAULT_AWS_REGION, default_role_stack_name, role_template_url};
use crate::core::property::{PropertyKey, PropertyValue};
use crate::resources::{ask_for_cluster, ask_for_security_groups, ask_for_subnets};
use crate::selector::{StackNamePrompt, ask_for_stack_name};
use crate::session::{Collaborators, Session};

const DEFAULT_SUFFIX: &str = " (Default)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Set,
    /// The operator went back without answering.
    Cancelled,
}

#[instrument(skip_all, fields(key = %key))]
pub fn ask(key: PropertyKey, session: &mut Session, deps: &mut Collaborators<'_>) -> Result<Answer> {
    match key {
        PropertyKey::DeploymentEnvironment => {
            deps.console.say(&format!(
                "The deployment environment is '{}'. Run the wizard with --environment to change it.\n",
                session.state.deployment_environment()
            ));
            Ok(Answer::Set)
        }
        PropertyKey::AwsRegion => ask_for_region(session, deps),
        PropertyKey::AwsAccessKey => ask_for_access_key(session, deps),
        PropertyKey::AwsSecretKey => ask_for_secret_key(session, deps),
        PropertyKey::ClusterArn => ask_for_cluster(session, deps),
        PropertyKey::Subnets => ask_for_subnets(session, deps),
        PropertyKey::SecurityGroups => ask_for_security_groups(session, deps),
        PropertyKey::StackName => ask_for_role_stack_name(session, deps),
        PropertyKey::ApiKey => ask_for_api_key(session, deps),
    }
}

fn default_region(session: &Session) -> String {
    session
        .state
        .text(PropertyKey::AwsRegion)
        .map(str::to_string)
        .or_else(|| std::env::var("AWS_REGION").ok().filter(|region| !region.is_empty()))
        .or_else(|| {
            std::env::var("AWS_DEFAULT_REGION")
                .ok()
                .filter(|region| !region.is_empty())
        })
        .unwrap_or_else(|| DEFAULT_AWS_REGION.to_string())
}

fn ask_for_region(session: &mut Session, deps: &mut Collaborators<'_>) -> Result<Answer> {
    let default = default_region(session);
    let mut regions = vec![default.clone()];
    regions.extend(
        AWS_REGIONS
            .iter()
            .filter(|region| **region != default)
            .map(|region| region.to_string()),
    );
    let mut choices = regions.clone();
    choices[0].push_str(DEFAULT_SUFFIX);

    let Some(index) = deps
        .console
        .select("Which AWS region will you run ECS tasks?", &choices)
    else {
        deps.console.say("Skipping AWS region for now.\n");
        return Ok(Answer::Cancelled);
    };
    let Some(region) = regions.into_iter().nth(index) else {
        return Ok(Answer::Cancelled);
    };

    deps.console.say(&format!("Using AWS region {region}.\n"));
    session.update(PropertyKey::AwsRegion, PropertyValue::text(region))?;
    Ok(Answer::Set)
}

const ACCESS_KEY_INTRO: &str = "
To allow this wizard to create AWS resources for you, it needs an AWS access key.
The access key needs to be associated with a user that has the following permissions:
- Upload CloudFormation stack
- Create IAM Roles
- List ECS clusters, VPCs, subnets, and security groups
- Create ECS clusters (if using the wizard to create an ECS cluster)
- Create VPCs, subnets, internet gateways, and security groups (if using the wizard to create a VPC)

The access key and secret key are not sent to CloudReactor.
";

fn ask_for_access_key(session: &mut Session, deps: &mut Collaborators<'_>) -> Result<Answer> {
    deps.console.say(ACCESS_KEY_INTRO);
    let old = session.state.text(PropertyKey::AwsAccessKey).map(str::to_string);
    let mut question = "What is the AWS access key do you want to use for this wizard?".to_string();
    if let Some(old) = &old {
        question.push_str(&format!(" [{old}]"));
    }
    let Some(answer) = deps.console.text(&question) else {
        return Ok(Answer::Cancelled);
    };
    set_credential(session, deps, PropertyKey::AwsAccessKey, answer, old)
}

fn ask_for_secret_key(session: &mut Session, deps: &mut Collaborators<'_>) -> Result<Answer> {
    let old = session.state.text(PropertyKey::AwsSecretKey).map(str::to_string);
    let mut question = "What is the AWS secret key corresponding to your AWS access key?".to_string();
    if let Some(old) = &old {
        question.push_str(&format!(" [{}]", mask_secret(old)));
    }
    let Some(answer) = deps.console.password(&question) else {
        return Ok(Answer::Cancelled);
    };
    set_credential(session, deps, PropertyKey::AwsSecretKey, answer, old)
}

/// An empty answer keeps the previous value; with none it cancels.
fn set_credential(
    session: &mut Session,
    deps: &mut Collaborators<'_>,
    key: PropertyKey,
    answer: String,
    old: Option<String>,
) -> Result<Answer> {
    let value = if answer.is_empty() { old } else { Some(answer) };
    let Some(value) = value else {
        return Ok(Answer::Cancelled);
    };
    session.update(key, PropertyValue::text(value))?;
    validate_aws_access(session, deps)?;
    Ok(Answer::Set)
}

/// Run the account identity check once both keys are set.
///
/// A failure keeps the keys but leaves them unvalidated.
pub fn validate_aws_access(session: &mut Session, deps: &mut Collaborators<'_>) -> Result<()> {
    if session.state.aws_account_id.is_some() {
        return Ok(());
    }
    let Some(credentials) = session.credentials() else {
        return Ok(());
    };
    let identity = deps
        .providers
        .connect(&credentials)
        .and_then(|provider| provider.check_identity());
    match identity {
        Ok(account_id) => {
            info!(account_id = %account_id, "validated AWS credentials");
            deps.console
                .say(&format!("Your AWS account ID is {account_id}.\n"));
            session.state.aws_account_id = Some(account_id);
            session.save()?;
        }
        Err(err) => {
            warn!(err = %err, "failed to get caller identity");
            deps.console.say(
                "Failed to fetch your AWS user info. Please check your AWS credentials and try again.\n",
            );
        }
    }
    Ok(())
}

fn ask_for_role_stack_name(session: &mut Session, deps: &mut Collaborators<'_>) -> Result<Answer> {
    let deployment = session.state.deployment_environment().to_string();
    deps.console.say(&format!(
        "To allow CloudReactor to run tasks on your behalf, you'll need to install an AWS CloudFormation stack that grants CloudReactor permissions to control tasks.\nTo see the resources that will be added, please see {}",
        role_template_url(&deployment)
    ));

    let Some(provider) = deps.provider(session, "installing a CloudFormation stack") else {
        return Ok(Answer::Cancelled);
    };
    let stacks = match provider.list_stacks() {
        Ok(stacks) => stacks,
        Err(err) => {
            warn!(err = %err, "can't list stacks");
            deps.console
                .say(&format!("Failed to list CloudFormation stacks: {err}\n"));
            return Ok(Answer::Cancelled);
        }
    };

    let installed = session
        .state
        .workflow
        .as_ref()
        .is_some_and(|workflow| workflow.remote_stack_id.is_some());
    let current = session.state.text(PropertyKey::StackName).map(str::to_string);
    let default_name = match &current {
        Some(name) if !installed => name.clone(),
        _ => default_role_stack_name(&deployment),
    };
    let prompt = StackNamePrompt {
        purpose: " to grant CloudReactor permissions to control tasks",
        default_name,
        previously_installed: current.as_deref().filter(|_| installed),
        intro: Some(
            "If you've never set up CloudReactor before, you should install a new CloudFormation stack.",
        ),
    };

    let Some(choice) = ask_for_stack_name(deps.console, &stacks, &prompt) else {
        deps.console.say("Skipping stack name for now.\n");
        return Ok(Answer::Cancelled);
    };
    if choice.reuse {
        deps.console
            .say(&format!("Using previously installed stack '{}'.\n", choice.name));
        return Ok(Answer::Set);
    }

    session.update(PropertyKey::StackName, PropertyValue::text(choice.name))?;
    session.state.stack_id_to_update = choice.update_target;
    session.state.workflow = None;
    session.save()?;
    Ok(Answer::Set)
}

fn ask_for_api_key(session: &mut Session, deps: &mut Collaborators<'_>) -> Result<Answer> {
    deps.console.say(
        "To enable monitoring and management for your Tasks and Workflows, please contact us at help@cloudreactor.io for a free CloudReactor account and obtain an API key.",
    );
    let old = session.state.text(PropertyKey::ApiKey).map(str::to_string);
    let mut question = "What is your CloudReactor API key?".to_string();
    if let Some(old) = &old {
        question.push_str(&format!(" [{}]", mask_secret(old)));
    }
    let Some(answer) = deps.console.text(&question) else {
        return Ok(Answer::Cancelled);
    };
    let Some(api_key) = (if answer.is_empty() { old } else { Some(answer) }) else {
        deps.console.say("Skipping CloudReactor API key for now.");
        return Ok(Answer::Cancelled);
    };

    session.update(PropertyKey::ApiKey, PropertyValue::text(api_key.clone()))?;
    validate_api_key(session, deps, &api_key)
}

fn validate_api_key(session: &mut Session, deps: &mut Collaborators<'_>, api_key: &str) -> Result<Answer> {
    let mut client = deps.control_plane.with_api_key(api_key);
    let listing = client
        .list_organizations()
        .and_then(|_| client.list_environments(None));

    match listing {
        Ok(page) => {
            if page.results.is_empty() {
                deps.console
                    .say("No current Run Environments found. Please create a new one.\n");
            } else {
                deps.console.say(&format!(
                    "There are currently {} Run Environments in your organization:",
                    page.results.len()
                ));
                for environment in &page.results {
                    deps.console.say(&format!("- {}", environment.name));
                }
            }
            deps.console.say("Your CloudReactor API key is valid.\n");
            session.state.api_key_validated = true;
            session.save()?;
            Ok(Answer::Set)
        }
        Err(err) if err.is_unauthorized() => {
            warn!(err = %err, "API key rejected");
            deps.console.say(&format!(
                "The CloudReactor API key '{}' is not valid. Please check that it is correct.\n",
                mask_secret(api_key)
            ));
            session.clear(PropertyKey::ApiKey)?;
            Ok(Answer::Cancelled)
        }
        Err(err) => {
            warn!(err = %err, "can't validate API key");
            deps.console.say(&format!(
                "Couldn't validate the CloudReactor API key now ({err}). It will be checked again later.\n"
            ));
            Ok(Answer::Set)
        }
    }
}
