//! Cloud provider collaborator.
//!
//! The [`Provider`] trait decouples the wizard from the concrete cloud client
//! (currently the `aws` CLI). Tests use scripted providers that return
//! predetermined listings and stack descriptions without spawning processes.

use thiserror::Error;

use crate::core::stack::StackDescription;

/// Credentials and region a provider client is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Unreachable provider, rejected credentials, or unreadable response.
    #[error("{0}")]
    Transport(String),
    /// The provider understood the request and refused it.
    #[error("{code}: {message}")]
    Provider { code: String, message: String },
}

impl ProviderError {
    pub fn provider(code: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError::Provider {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The stack already matches the submitted template and parameters.
    pub fn is_no_updates(&self) -> bool {
        matches!(self, ProviderError::Provider { message, .. }
            if message.contains("No updates are to be performed"))
    }

    /// A stack with the requested name already exists.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, ProviderError::Provider { code, message }
            if code.contains("AlreadyExists") || message.contains("already exists"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSummary {
    pub stack_id: String,
    pub name: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subnet {
    pub id: String,
    pub name: Option<String>,
    pub cidr_block: String,
    pub availability_zone: String,
}

impl Subnet {
    /// `id | name | cidr | zone`, omitting the name when untagged.
    pub fn choice_label(&self) -> String {
        let mut parts = vec![self.id.as_str()];
        if let Some(name) = self.name.as_deref() {
            parts.push(name);
        }
        parts.push(&self.cidr_block);
        parts.push(&self.availability_zone);
        parts.join(" | ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroup {
    pub id: String,
    pub name: String,
}

impl SecurityGroup {
    pub fn choice_label(&self) -> String {
        format!("{} ({})", self.id, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    Url(String),
    /// Inline template document.
    Body(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterValue {
    Value(String),
    /// Keep the value already stored with the remote stack.
    UsePrevious,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackParameter {
    pub key: String,
    pub value: ParameterValue,
}

impl StackParameter {
    pub fn value(key: &str, value: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            value: ParameterValue::Value(value.into()),
        }
    }

    pub fn use_previous(key: &str) -> Self {
        Self {
            key: key.to_string(),
            value: ParameterValue::UsePrevious,
        }
    }
}

/// A create (no `update_target`) or update of a declarative stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackRequest {
    pub name: String,
    pub template: TemplateSource,
    pub parameters: Vec<StackParameter>,
    pub capabilities: Vec<String>,
    pub update_target: Option<String>,
}

/// Abstraction over the cloud provider's infrastructure calls.
pub trait Provider {
    fn list_clusters(&self) -> Result<Vec<String>, ProviderError>;

    /// Create a cluster with Fargate capacity; returns its ARN.
    fn create_cluster(&self, name: &str) -> Result<String, ProviderError>;

    fn list_networks(&self) -> Result<Vec<Network>, ProviderError>;

    fn list_subnets(&self, network_id: &str) -> Result<Vec<Subnet>, ProviderError>;

    fn list_security_groups(&self, network_id: &str) -> Result<Vec<SecurityGroup>, ProviderError>;

    /// Live stacks (deleted ones excluded).
    fn list_stacks(&self) -> Result<Vec<StackSummary>, ProviderError>;

    /// Create or update a stack; returns the stack id.
    fn submit_stack(&self, request: &StackRequest) -> Result<String, ProviderError>;

    /// `None` when the stack no longer exists.
    fn describe_stack(&self, stack_id: &str) -> Result<Option<StackDescription>, ProviderError>;

    fn delete_stack(&self, stack_id: &str) -> Result<(), ProviderError>;

    /// Account id the credentials belong to.
    fn check_identity(&self) -> Result<String, ProviderError>;

    /// Submit a network stack from an already rendered template.
    fn create_network_stack(
        &self,
        name: &str,
        template_body: String,
        update_target: Option<String>,
    ) -> Result<String, ProviderError> {
        self.submit_stack(&StackRequest {
            name: name.to_string(),
            template: TemplateSource::Body(template_body),
            parameters: Vec::new(),
            capabilities: Vec::new(),
            update_target,
        })
    }
}

/// Builds provider clients. A fresh client is connected per operation group.
pub trait ProviderFactory {
    fn connect(&self, credentials: &AwsCredentials) -> Result<Box<dyn Provider>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_benign_and_conflict_errors() {
        let no_updates =
            ProviderError::provider("ValidationError", "No updates are to be performed.");
        assert!(no_updates.is_no_updates());
        assert!(!no_updates.is_already_exists());

        let exists =
            ProviderError::provider("AlreadyExistsException", "Stack [CloudReactor] already exists");
        assert!(exists.is_already_exists());

        let transport = ProviderError::Transport("No updates are to be performed".to_string());
        assert!(!transport.is_no_updates());
    }

    #[test]
    fn choice_labels() {
        let subnet = Subnet {
            id: "subnet-1".to_string(),
            name: None,
            cidr_block: "10.0.0.0/24".to_string(),
            availability_zone: "us-west-2a".to_string(),
        };
        assert_eq!(subnet.choice_label(), "subnet-1 | 10.0.0.0/24 | us-west-2a");
        let group = SecurityGroup {
            id: "sg-1".to_string(),
            name: "default".to_string(),
        };
        assert_eq!(group.choice_label(), "sg-1 (default)");
    }
}
