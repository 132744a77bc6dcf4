//! Configuration state owned by a wizard session.
//!
//! This is a plain record: it holds no collaborator handles, so everything in
//! it is part of the persisted session.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::property::{PropertyKey, PropertyValue};

/// Whether unset properties are asked in order or chosen from a menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Interview,
    Edit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    #[default]
    NotStarted,
    Submitted,
    Polling,
    Succeeded,
    Failed,
}

impl WorkflowPhase {
    /// True while a submitted stack has not reached a terminal status.
    pub fn is_in_flight(self) -> bool {
        matches!(self, WorkflowPhase::Submitted | WorkflowPhase::Polling)
    }
}

/// Progress of the permissions stack submission.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProvisioningWorkflowState {
    pub phase: WorkflowPhase,
    pub submitted_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub remote_stack_id: Option<String>,
    /// Stack outputs and read-back parameters; only populated when succeeded.
    pub outputs: BTreeMap<String, String>,
    /// Provider status observed at the terminal transition.
    pub provider_status: Option<String>,
    pub failure_reason: Option<String>,
}

/// Identifier and display name of the registered run environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteResourceRef {
    pub id: String,
    pub name: String,
}

/// VPC backing the subnet and security group choices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSelection {
    pub vpc_id: String,
    pub created_by_wizard: bool,
}

/// The single mutable record of a session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigurationState {
    pub properties: BTreeMap<PropertyKey, PropertyValue>,
    pub mode: Mode,
    pub workflow: Option<ProvisioningWorkflowState>,
    pub remote_resource: Option<RemoteResourceRef>,
    pub aws_account_id: Option<String>,
    pub api_key_validated: bool,
    pub network: Option<NetworkSelection>,
    /// Existing stack id to update instead of creating a new stack.
    pub stack_id_to_update: Option<String>,
}

impl ConfigurationState {
    /// Fresh state for a deployment environment.
    pub fn new(deployment_environment: &str) -> Self {
        let mut state = Self::default();
        state.properties.insert(
            PropertyKey::DeploymentEnvironment,
            PropertyValue::text(deployment_environment),
        );
        state
    }

    pub fn get(&self, key: PropertyKey) -> Option<&PropertyValue> {
        self.properties.get(&key)
    }

    pub fn text(&self, key: PropertyKey) -> Option<&str> {
        self.get(key).and_then(PropertyValue::as_text)
    }

    pub fn list(&self, key: PropertyKey) -> Option<&[String]> {
        self.get(key).and_then(PropertyValue::as_list)
    }

    pub fn deployment_environment(&self) -> &str {
        self.text(PropertyKey::DeploymentEnvironment)
            .unwrap_or(crate::core::names::DEFAULT_DEPLOYMENT_ENVIRONMENT)
    }

    pub fn workflow_phase(&self) -> WorkflowPhase {
        self.workflow
            .as_ref()
            .map(|workflow| workflow.phase)
            .unwrap_or_default()
    }

    /// Workflow output or read-back parameter by key.
    pub fn workflow_output(&self, key: &str) -> Option<&str> {
        self.workflow
            .as_ref()
            .and_then(|workflow| workflow.outputs.get(key))
            .map(String::as_str)
    }
}
