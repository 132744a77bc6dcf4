//! Property catalog: keys, values, and the dependency registry.
//!
//! The registry is built once at startup. Construction fails on duplicate
//! keys or ordinals, unregistered dependents, and dependency cycles, so the
//! invalidator can assume an acyclic graph at runtime.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of configuration properties, in interview order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKey {
    DeploymentEnvironment,
    AwsRegion,
    AwsAccessKey,
    AwsSecretKey,
    ClusterArn,
    Subnets,
    SecurityGroups,
    StackName,
    ApiKey,
}

impl PropertyKey {
    pub const ALL: [PropertyKey; 9] = [
        PropertyKey::DeploymentEnvironment,
        PropertyKey::AwsRegion,
        PropertyKey::AwsAccessKey,
        PropertyKey::AwsSecretKey,
        PropertyKey::ClusterArn,
        PropertyKey::Subnets,
        PropertyKey::SecurityGroups,
        PropertyKey::StackName,
        PropertyKey::ApiKey,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PropertyKey::DeploymentEnvironment => "deployment_environment",
            PropertyKey::AwsRegion => "aws_region",
            PropertyKey::AwsAccessKey => "aws_access_key",
            PropertyKey::AwsSecretKey => "aws_secret_key",
            PropertyKey::ClusterArn => "cluster_arn",
            PropertyKey::Subnets => "subnets",
            PropertyKey::SecurityGroups => "security_groups",
            PropertyKey::StackName => "stack_name",
            PropertyKey::ApiKey => "api_key",
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current value of a set property. Unset is represented by absence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Text(String),
    /// An empty list means the operator explicitly skipped the property.
    List(Vec<String>),
    Flag(bool),
    Timestamp(DateTime<Utc>),
}

impl PropertyValue {
    pub fn text(value: impl Into<String>) -> Self {
        PropertyValue::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            PropertyValue::List(items) => Some(items),
            _ => None,
        }
    }
}

/// Session state outside the property map that a property change can make stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedState {
    /// AWS account id returned by the identity check.
    AccountIdentity,
    /// VPC chosen or created for subnets and security groups.
    Network,
    /// Identifier of an existing remote stack to update instead of create.
    StackTarget,
    /// Provisioning workflow for the permissions stack.
    Workflow,
    /// Saved run environment reference on the control plane.
    RemoteResource,
    /// Whether the control plane accepted the API key.
    ApiKeyValidation,
}

/// Immutable registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub key: PropertyKey,
    pub ordinal: u32,
    pub label: &'static str,
    pub prompt: &'static str,
    pub secret: bool,
    /// False for properties supplied on the command line rather than asked.
    pub prompted: bool,
    /// Properties that become unset when this one changes.
    pub dependents: Vec<PropertyKey>,
    /// Derived state that is cleared when this one changes or is cleared.
    pub clears: Vec<DerivedState>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("property '{0}' is registered more than once")]
    DuplicateKey(PropertyKey),
    #[error("ordinal {0} is used by more than one property")]
    DuplicateOrdinal(u32),
    #[error("property '{owner}' depends on unregistered property '{dependent}'")]
    UnknownDependent {
        owner: PropertyKey,
        dependent: PropertyKey,
    },
    #[error("dependency cycle: {}", format_cycle(.0))]
    Cycle(Vec<PropertyKey>),
}

fn format_cycle(path: &[PropertyKey]) -> String {
    path.iter()
        .map(|key| key.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Ordered catalog of properties and their dependency edges.
#[derive(Debug, Clone)]
pub struct Registry {
    descriptors: Vec<PropertyDescriptor>,
}

impl Registry {
    /// Validate and order descriptors by ordinal.
    pub fn new(mut descriptors: Vec<PropertyDescriptor>) -> Result<Self, RegistryError> {
        let mut keys = BTreeSet::new();
        let mut ordinals = BTreeSet::new();
        for descriptor in &descriptors {
            if !keys.insert(descriptor.key) {
                return Err(RegistryError::DuplicateKey(descriptor.key));
            }
            if !ordinals.insert(descriptor.ordinal) {
                return Err(RegistryError::DuplicateOrdinal(descriptor.ordinal));
            }
        }
        for descriptor in &descriptors {
            if let Some(dependent) = descriptor.dependents.iter().find(|d| !keys.contains(d)) {
                return Err(RegistryError::UnknownDependent {
                    owner: descriptor.key,
                    dependent: *dependent,
                });
            }
        }
        descriptors.sort_by_key(|d| d.ordinal);
        let registry = Self { descriptors };
        registry.check_acyclic()?;
        Ok(registry)
    }

    /// The catalog the wizard runs with.
    pub fn standard() -> Result<Self, RegistryError> {
        use DerivedState::{
            AccountIdentity, ApiKeyValidation, Network, RemoteResource, StackTarget, Workflow,
        };
        use PropertyKey::{
            ApiKey, AwsAccessKey, AwsRegion, AwsSecretKey, ClusterArn, DeploymentEnvironment,
            SecurityGroups, StackName, Subnets,
        };

        let aws_scoped = vec![ClusterArn, Subnets, SecurityGroups, StackName];
        Self::new(vec![
            PropertyDescriptor {
                key: DeploymentEnvironment,
                ordinal: 0,
                label: "CloudReactor deployment environment",
                prompt: "Which CloudReactor deployment environment do you want to use?",
                secret: false,
                prompted: false,
                dependents: vec![StackName],
                clears: vec![RemoteResource],
            },
            PropertyDescriptor {
                key: AwsRegion,
                ordinal: 1,
                label: "AWS region",
                prompt: "Which AWS region will you run ECS tasks?",
                secret: false,
                prompted: true,
                dependents: aws_scoped.clone(),
                clears: vec![Network],
            },
            PropertyDescriptor {
                key: AwsAccessKey,
                ordinal: 2,
                label: "AWS access key",
                prompt: "What is the AWS access key do you want to use for this wizard?",
                secret: false,
                prompted: true,
                dependents: aws_scoped.clone(),
                clears: vec![AccountIdentity, Network],
            },
            PropertyDescriptor {
                key: AwsSecretKey,
                ordinal: 3,
                label: "AWS secret key",
                prompt: "What is the AWS secret key corresponding to your AWS access key?",
                secret: true,
                prompted: true,
                dependents: aws_scoped,
                clears: vec![AccountIdentity, Network],
            },
            PropertyDescriptor {
                key: ClusterArn,
                ordinal: 4,
                label: "AWS ECS Cluster",
                prompt: "Which ECS cluster do you want to use to run your tasks?",
                secret: false,
                prompted: true,
                dependents: Vec::new(),
                clears: vec![RemoteResource],
            },
            PropertyDescriptor {
                key: Subnets,
                ordinal: 5,
                label: "Subnet(s)",
                prompt: "How would you like to specify subnets?",
                secret: false,
                prompted: true,
                dependents: Vec::new(),
                clears: vec![RemoteResource],
            },
            PropertyDescriptor {
                key: SecurityGroups,
                ordinal: 6,
                label: "Security group(s)",
                prompt: "How would you like to specify security groups?",
                secret: false,
                prompted: true,
                dependents: Vec::new(),
                clears: vec![RemoteResource],
            },
            PropertyDescriptor {
                key: StackName,
                ordinal: 7,
                label: "CloudReactor permissions CloudFormation stack name",
                prompt: "What do you want to name the CloudFormation stack?",
                secret: false,
                prompted: true,
                dependents: Vec::new(),
                clears: vec![StackTarget, Workflow, RemoteResource],
            },
            PropertyDescriptor {
                key: ApiKey,
                ordinal: 8,
                label: "CloudReactor API key",
                prompt: "What is your CloudReactor API key?",
                secret: true,
                prompted: true,
                dependents: Vec::new(),
                clears: vec![ApiKeyValidation, RemoteResource],
            },
        ])
    }

    /// Descriptors in interview order.
    pub fn descriptors(&self) -> &[PropertyDescriptor] {
        &self.descriptors
    }

    /// Prompted descriptors in interview order.
    pub fn prompted(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.descriptors.iter().filter(|d| d.prompted)
    }

    pub fn get(&self, key: PropertyKey) -> Option<&PropertyDescriptor> {
        self.descriptors.iter().find(|d| d.key == key)
    }

    /// Lowest-ordinal prompted property that is unset in `properties`.
    pub fn next_unset<'a>(
        &'a self,
        properties: &BTreeMap<PropertyKey, PropertyValue>,
    ) -> Option<&'a PropertyDescriptor> {
        self.prompted().find(|d| !properties.contains_key(&d.key))
    }

    pub fn all_set(&self, properties: &BTreeMap<PropertyKey, PropertyValue>) -> bool {
        self.descriptors
            .iter()
            .all(|d| properties.contains_key(&d.key))
    }

    fn check_acyclic(&self) -> Result<(), RegistryError> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit(
            registry: &Registry,
            key: PropertyKey,
            marks: &mut BTreeMap<PropertyKey, Mark>,
            path: &mut Vec<PropertyKey>,
        ) -> Result<(), RegistryError> {
            match marks.get(&key) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    let start = path.iter().position(|k| *k == key).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(key);
                    return Err(RegistryError::Cycle(cycle));
                }
                None => {}
            }
            marks.insert(key, Mark::Visiting);
            path.push(key);
            if let Some(descriptor) = registry.get(key) {
                for dependent in &descriptor.dependents {
                    visit(registry, *dependent, marks, path)?;
                }
            }
            path.pop();
            marks.insert(key, Mark::Done);
            Ok(())
        }

        let mut marks = BTreeMap::new();
        for descriptor in &self.descriptors {
            visit(self, descriptor.key, &mut marks, &mut Vec::new())?;
        }
        Ok(())
    }
}
