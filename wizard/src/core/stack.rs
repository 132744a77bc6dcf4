//! Declarative stack statuses and the output contracts the wizard depends on.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const CLOUDREACTOR_ROLE_ARN: &str = "CloudreactorRoleARN";
pub const TASK_EXECUTION_ROLE_ARN: &str = "TaskExecutionRoleARN";
pub const WORKFLOW_STARTER_ARN: &str = "WorkflowStarterARN";
pub const EXTERNAL_ID: &str = "ExternalID";
pub const WORKFLOW_STARTER_ACCESS_KEY: &str = "WorkflowStarterAccessKey";

pub const VPC_OUTPUT: &str = "VPC";
pub const PRIVATE_SUBNETS_OUTPUT: &str = "SubnetsPrivate";
pub const DEFAULT_SECURITY_GROUP_OUTPUT: &str = "DefaultTaskSecurityGroup";

/// Outputs the permissions stack must report.
pub const ROLE_STACK_OUTPUTS: &[&str] = &[
    CLOUDREACTOR_ROLE_ARN,
    TASK_EXECUTION_ROLE_ARN,
    WORKFLOW_STARTER_ARN,
];
/// Generated parameters that must be readable from the permissions stack.
pub const ROLE_STACK_SECRET_PARAMETERS: &[&str] = &[EXTERNAL_ID, WORKFLOW_STARTER_ACCESS_KEY];

const SUCCESSFUL_STATUSES: &[&str] = &["CREATE_COMPLETE", "UPDATE_COMPLETE", "IMPORT_COMPLETE"];

/// Snapshot of a remote stack as returned by a describe call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StackDescription {
    pub stack_id: String,
    pub name: String,
    pub status: String,
    pub status_reason: Option<String>,
    pub outputs: BTreeMap<String, String>,
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    InProgress,
    Succeeded,
    Failed,
}

pub fn classify_status(status: &str) -> StatusClass {
    if status.ends_with("_IN_PROGRESS") {
        StatusClass::InProgress
    } else if SUCCESSFUL_STATUSES.contains(&status) {
        StatusClass::Succeeded
    } else {
        StatusClass::Failed
    }
}

/// Stacks in these states are gone and must not be offered for reuse.
pub fn is_deleted_status(status: &str) -> bool {
    matches!(status, "DELETE_COMPLETE" | "DELETE_FAILED")
}

fn present<'a>(map: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    map.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

/// Verify the permissions stack contract.
///
/// Returns every output and read-back parameter on success, or the names of
/// the required fields that were missing or empty.
pub fn role_stack_outputs(
    description: &StackDescription,
) -> Result<BTreeMap<String, String>, Vec<String>> {
    let missing: Vec<String> = ROLE_STACK_OUTPUTS
        .iter()
        .filter(|key| present(&description.outputs, key).is_none())
        .chain(
            ROLE_STACK_SECRET_PARAMETERS
                .iter()
                .filter(|key| present(&description.parameters, key).is_none()),
        )
        .map(|key| key.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(missing);
    }

    let mut collected = description.outputs.clone();
    for key in ROLE_STACK_SECRET_PARAMETERS {
        if let Some(value) = present(&description.parameters, key) {
            collected.insert(key.to_string(), value.to_string());
        }
    }
    Ok(collected)
}

/// Network created by the VPC stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkOutputs {
    pub vpc_id: String,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
}

pub fn network_outputs(description: &StackDescription) -> Result<NetworkOutputs, Vec<String>> {
    let vpc_id = present(&description.outputs, VPC_OUTPUT);
    let subnets: Vec<String> = present(&description.outputs, PRIVATE_SUBNETS_OUTPUT)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let security_group = present(&description.outputs, DEFAULT_SECURITY_GROUP_OUTPUT);

    let mut missing = Vec::new();
    if vpc_id.is_none() {
        missing.push(VPC_OUTPUT.to_string());
    }
    if subnets.is_empty() {
        missing.push(PRIVATE_SUBNETS_OUTPUT.to_string());
    }
    if security_group.is_none() {
        missing.push(DEFAULT_SECURITY_GROUP_OUTPUT.to_string());
    }
    match (vpc_id, security_group) {
        (Some(vpc_id), Some(security_group)) if missing.is_empty() => Ok(NetworkOutputs {
            vpc_id: vpc_id.to_string(),
            subnets,
            security_groups: vec![security_group.to_string()],
        }),
        _ => Err(missing),
    }
}
