//! Create-or-update of the run environment on the control plane, keyed by
//! display name.

use anyhow::Result;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::names::default_run_environment_name;
use crate::core::property::PropertyKey;
use crate::core::stack::{
    CLOUDREACTOR_ROLE_ARN, EXTERNAL_ID, TASK_EXECUTION_ROLE_ARN, WORKFLOW_STARTER_ACCESS_KEY,
    WORKFLOW_STARTER_ARN,
};
use crate::core::state::{ConfigurationState, RemoteResourceRef, WorkflowPhase};
use crate::io::control_plane::{ControlPlane, ControlPlaneError, Organization, RemoteEnvironment};
use crate::session::{Collaborators, Session};

const HELP_MESSAGE: &str = "Please contact support@cloudreactor.io for help.";
const CREATE_NEW_CHOICE: &str = "Create a new Run Environment";

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),
    #[error("the response did not contain a run environment identifier")]
    MissingIdentifier,
    #[error("can't encode run environment: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EcsCapability {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub default_launch_type: &'static str,
    pub supported_launch_types: Vec<&'static str>,
    pub default_cluster_arn: Option<String>,
    pub default_execution_role: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub default_subnets: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub default_security_groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupRef {
    pub id: i64,
}

/// Body of the run environment create and update calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunEnvironmentPayload {
    pub name: String,
    pub aws_account_id: Option<String>,
    pub aws_default_region: Option<String>,
    pub aws_assumed_role_external_id: Option<String>,
    pub aws_workflow_starter_access_key: Option<String>,
    pub aws_events_role_arn: Option<String>,
    pub aws_workflow_starter_lambda_arn: Option<String>,
    pub execution_method_capabilities: Vec<EcsCapability>,
    pub created_by_group: GroupRef,
}

impl RunEnvironmentPayload {
    pub fn from_state(state: &ConfigurationState, name: &str, organization_id: i64) -> Self {
        let output = |key: &str| state.workflow_output(key).map(str::to_string);
        let text = |key: PropertyKey| state.text(key).map(str::to_string);
        let list = |key: PropertyKey| state.list(key).map(<[String]>::to_vec).unwrap_or_default();

        Self {
            name: name.to_string(),
            aws_account_id: state.aws_account_id.clone(),
            aws_default_region: text(PropertyKey::AwsRegion),
            aws_assumed_role_external_id: output(EXTERNAL_ID),
            aws_workflow_starter_access_key: output(WORKFLOW_STARTER_ACCESS_KEY),
            aws_events_role_arn: output(CLOUDREACTOR_ROLE_ARN),
            aws_workflow_starter_lambda_arn: output(WORKFLOW_STARTER_ARN),
            execution_method_capabilities: vec![EcsCapability {
                kind: "AWS ECS",
                default_launch_type: "FARGATE",
                supported_launch_types: vec!["FARGATE"],
                default_cluster_arn: text(PropertyKey::ClusterArn),
                default_execution_role: output(TASK_EXECUTION_ROLE_ARN),
                default_subnets: list(PropertyKey::Subnets),
                default_security_groups: list(PropertyKey::SecurityGroups),
            }],
            created_by_group: GroupRef { id: organization_id },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub reference: RemoteResourceRef,
    pub created: bool,
}

/// First page of the organization's run environments.
///
/// A listing with more pages is logged; only the first is consulted.
pub fn list_existing(
    client: &mut dyn ControlPlane,
    organization_id: i64,
) -> Result<Vec<RemoteEnvironment>, ControlPlaneError> {
    let page = client.list_environments(Some(organization_id))?;
    if page.next.is_some() {
        warn!(organization_id, "run environment listing has more pages, only the first is used");
    }
    Ok(page.results)
}

/// Create `name`, or update the entry in `existing` with the same name by
/// its identifier.
#[instrument(skip_all, fields(name = %name))]
pub fn reconcile(
    client: &mut dyn ControlPlane,
    existing: &[RemoteEnvironment],
    name: &str,
    payload: &RunEnvironmentPayload,
) -> Result<Reconciled, ReconcileError> {
    let data = serde_json::to_value(payload)?;
    let (response, created) = match existing.iter().find(|environment| environment.name == name) {
        Some(environment) if !environment.uuid.is_empty() => {
            debug!(uuid = %environment.uuid, "updating run environment");
            (client.update_environment(&environment.uuid, &data)?, false)
        }
        _ => {
            debug!("creating run environment");
            (client.create_environment(&data)?, true)
        }
    };

    let id = response
        .get("uuid")
        .and_then(Value::as_str)
        .filter(|uuid| !uuid.is_empty())
        .ok_or(ReconcileError::MissingIdentifier)?;
    let saved_name = response
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(name);
    info!(uuid = %id, created, "run environment saved");
    Ok(Reconciled {
        reference: RemoteResourceRef {
            id: id.to_string(),
            name: saved_name.to_string(),
        },
        created,
    })
}

fn choose_organization(
    deps: &mut Collaborators<'_>,
    client: &mut dyn ControlPlane,
) -> Option<Organization> {
    let page = match client.list_organizations() {
        Ok(page) => page,
        Err(err) => {
            warn!(err = %err, "can't list organizations");
            deps.console
                .say(&format!("Failed to list your CloudReactor organizations: {err}\n"));
            return None;
        }
    };
    let mut organizations = page.results;
    match organizations.len() {
        0 => {
            let create = deps
                .console
                .confirm("No organizations found. Do you want to create one?");
            if create != Some(true) {
                return None;
            }
            let name = deps
                .console
                .text("What do you want to name your organization?")
                .filter(|name| !name.is_empty())?;
            match client.create_organization(&json!({ "name": name })) {
                Ok(organization) => Some(organization),
                Err(err) => {
                    warn!(err = %err, "can't create organization");
                    deps.console
                        .say(&format!("Failed to create the organization: {err}\n"));
                    None
                }
            }
        }
        1 => organizations.pop(),
        _ => {
            let names: Vec<String> = organizations
                .iter()
                .map(|organization| organization.name.clone())
                .collect();
            let index = deps
                .console
                .select("Which organization should own the Run Environment?", &names)?;
            organizations.into_iter().nth(index)
        }
    }
}

fn default_name(state: &ConfigurationState) -> String {
    state
        .remote_resource
        .as_ref()
        .map(|reference| reference.name.clone())
        .unwrap_or_else(|| default_run_environment_name(state.text(PropertyKey::ClusterArn)))
}

/// Create or update the run environment for a successfully provisioned
/// session. Returns true once the remote reference is stored.
pub fn register_run_environment(session: &mut Session, deps: &mut Collaborators<'_>) -> Result<bool> {
    let Some(api_key) = session.state.text(PropertyKey::ApiKey).map(str::to_string) else {
        deps.console
            .say("You must set your CloudReactor API key before creating a Run Environment.\n");
        return Ok(false);
    };
    if session.state.workflow_phase() != WorkflowPhase::Succeeded {
        deps.console
            .say("The CloudReactor permissions CloudFormation stack must be installed before creating a Run Environment.\n");
        return Ok(false);
    }

    deps.console.say(
        "The CloudReactor permissions CloudFormation stack has been uploaded successfully.\nThe final step is to create or update a Run Environment in CloudReactor with the corresponding settings.",
    );

    let mut client = deps.control_plane.with_api_key(&api_key);
    let Some(organization) = choose_organization(deps, client.as_mut()) else {
        return Ok(false);
    };

    let existing = match list_existing(client.as_mut(), organization.id) {
        Ok(existing) => existing,
        Err(err) => {
            warn!(err = %err, "can't list run environments");
            deps.console
                .say(&format!("Failed to list Run Environments: {err}\n"));
            return Ok(false);
        }
    };

    let mut name = None;
    if !existing.is_empty() {
        let mut choices: Vec<String> = existing
            .iter()
            .map(|environment| environment.name.clone())
            .collect();
        choices.push(CREATE_NEW_CHOICE.to_string());
        let Some(index) = deps
            .console
            .select("Which Run Environment do you want to update?", &choices)
        else {
            return Ok(false);
        };
        name = existing.get(index).map(|environment| environment.name.clone());
    }
    let name = match name {
        Some(name) => name,
        None => {
            let default = default_name(&session.state);
            let question = format!(
                "What do you want to name your Run Environment? Common names are \"staging\" or \"production\". [{default}]"
            );
            let Some(answer) = deps.console.text(&question) else {
                return Ok(false);
            };
            if answer.is_empty() { default } else { answer }
        }
    };

    let payload = RunEnvironmentPayload::from_state(&session.state, &name, organization.id);
    let updating = existing.iter().any(|environment| environment.name == name);
    if updating {
        deps.console.say(&format!("Updating Run Environment '{name}' ...\n"));
    } else {
        deps.console.say(&format!("Creating Run Environment '{name}'.\n"));
    }

    match reconcile(client.as_mut(), &existing, &name, &payload) {
        Ok(Reconciled { reference, created }) => {
            let action = if created { "created" } else { "updated" };
            deps.console.say(&format!(
                "The Run Environment '{}' was {action} successfully.\n",
                reference.name
            ));
            session.state.remote_resource = Some(reference);
            session.save()?;
            Ok(true)
        }
        Err(ReconcileError::MissingIdentifier) => {
            warn!("run environment response without identifier");
            deps.console.say(&format!(
                "The Run Environment creation/update response was invalid. {HELP_MESSAGE}\n"
            ));
            Ok(false)
        }
        Err(err) => {
            warn!(err = %err, "can't save run environment");
            deps.console.say(&format!(
                "An error occurred creating the Run Environment.\n{err}\n"
            ));
            Ok(false)
        }
    }
}
