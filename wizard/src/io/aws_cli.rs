//! Provider backed by the `aws` command line interface.

use std::collections::BTreeMap;
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::core::stack::{StackDescription, is_deleted_status};
use crate::io::config::AwsCliConfig;
use crate::io::process::{Limits, run_bounded};
use crate::io::provider::{
    AwsCredentials, Network, ParameterValue, Provider, ProviderError, ProviderFactory,
    SecurityGroup, StackRequest, StackSummary, Subnet, TemplateSource,
};

pub const MAX_LISTED_ITEMS: usize = 100;

static ERROR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"An error occurred \((\w+)\)(?: when calling the \w+ operation)?: ?(.*)").unwrap()
});

const AUTH_ERROR_CODES: &[&str] = &[
    "UnrecognizedClientException",
    "InvalidClientTokenId",
    "SignatureDoesNotMatch",
    "ExpiredToken",
    "ExpiredTokenException",
    "AuthFailure",
];

pub struct AwsCliProviderFactory {
    config: AwsCliConfig,
}

impl AwsCliProviderFactory {
    pub fn new(config: AwsCliConfig) -> Self {
        Self { config }
    }
}

impl ProviderFactory for AwsCliProviderFactory {
    fn connect(&self, credentials: &AwsCredentials) -> Result<Box<dyn Provider>, ProviderError> {
        debug!(region = %credentials.region, program = %self.config.program, "connecting aws cli provider");
        Ok(Box::new(AwsCliProvider {
            credentials: credentials.clone(),
            config: self.config.clone(),
        }))
    }
}

pub struct AwsCliProvider {
    credentials: AwsCredentials,
    config: AwsCliConfig,
}

impl AwsCliProvider {
    #[instrument(skip_all, fields(operation = %args.iter().take(2).cloned().collect::<Vec<_>>().join(" ")))]
    fn run_raw(&self, args: &[String]) -> Result<String, ProviderError> {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(args)
            .arg("--output")
            .arg("json")
            .env("AWS_ACCESS_KEY_ID", &self.credentials.access_key)
            .env("AWS_SECRET_ACCESS_KEY", &self.credentials.secret_key)
            .env("AWS_DEFAULT_REGION", &self.credentials.region)
            .env("AWS_PAGER", "")
            .env_remove("AWS_SESSION_TOKEN")
            .env_remove("AWS_PROFILE");

        let output = run_bounded(cmd, Limits::from(&self.config)).map_err(|err| ProviderError::Transport(format!("{err:#}")))?;

        if output.timed_out {
            return Err(ProviderError::Transport(format!(
                "{} timed out after {} seconds",
                self.config.program, self.config.timeout_secs
            )));
        }
        if !output.status.success() {
            let stderr = output.stderr_text();
            warn!(exit_code = ?output.status.code(), stderr = %stderr, "aws cli call failed");
            return Err(classify_failure(&stderr));
        }
        if output.stdout_dropped > 0 {
            return Err(ProviderError::Transport(
                "aws cli output exceeded the configured limit".to_string(),
            ));
        }
        Ok(output.stdout_text())
    }

    fn run<T: DeserializeOwned>(&self, args: &[String]) -> Result<T, ProviderError> {
        let stdout = self.run_raw(args)?;
        parse_json(&stdout)
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, ProviderError> {
    serde_json::from_str(raw)
        .map_err(|err| ProviderError::Transport(format!("unreadable aws cli output: {err}")))
}

/// Map CLI stderr to a provider logical error or a transport/auth error.
pub fn classify_failure(stderr: &str) -> ProviderError {
    let Some(captures) = ERROR_RE.captures(stderr) else {
        let message = if stderr.is_empty() {
            "aws cli failed without output".to_string()
        } else {
            stderr.to_string()
        };
        return ProviderError::Transport(message);
    };
    let code = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    let message = captures
        .get(2)
        .map(|m| m.as_str().trim())
        .unwrap_or_default();
    let sts_denied = code.starts_with("AccessDenied") && stderr.contains("GetCallerIdentity");
    if AUTH_ERROR_CODES.contains(&code) || sts_denied {
        ProviderError::Transport(format!("{code}: {message}"))
    } else {
        ProviderError::provider(code, message)
    }
}

fn warn_if_truncated(kind: &str, count: usize) {
    if count >= MAX_LISTED_ITEMS {
        warn!(kind, count, "listing truncated to the first page");
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Tag {
    key: String,
    value: String,
}

fn name_tag(tags: &[Tag]) -> Option<String> {
    tags.iter()
        .find(|tag| tag.key == "Name")
        .map(|tag| tag.value.clone())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListClustersResponse {
    #[serde(default)]
    cluster_arns: Vec<String>,
}

#[derive(Deserialize)]
struct CreateClusterResponse {
    cluster: CreatedCluster,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedCluster {
    cluster_arn: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeVpcsResponse {
    #[serde(default)]
    vpcs: Vec<Vpc>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Vpc {
    vpc_id: String,
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeSubnetsResponse {
    #[serde(default)]
    subnets: Vec<RawSubnet>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawSubnet {
    subnet_id: String,
    #[serde(default)]
    cidr_block: String,
    #[serde(default)]
    availability_zone: String,
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeSecurityGroupsResponse {
    #[serde(default)]
    security_groups: Vec<RawSecurityGroup>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawSecurityGroup {
    group_id: String,
    #[serde(default)]
    group_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListStacksResponse {
    #[serde(default)]
    stack_summaries: Vec<RawStackSummary>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawStackSummary {
    stack_id: String,
    stack_name: String,
    stack_status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SubmitStackResponse {
    stack_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStacksResponse {
    #[serde(default)]
    stacks: Vec<RawStack>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawStack {
    stack_id: String,
    stack_name: String,
    stack_status: String,
    stack_status_reason: Option<String>,
    #[serde(default)]
    outputs: Vec<RawOutput>,
    #[serde(default)]
    parameters: Vec<RawParameter>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawOutput {
    output_key: String,
    #[serde(default)]
    output_value: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawParameter {
    parameter_key: String,
    #[serde(default)]
    parameter_value: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CallerIdentity {
    account: String,
}

fn parse_stack_summaries(raw: &str) -> Result<Vec<StackSummary>, ProviderError> {
    let response: ListStacksResponse = parse_json(raw)?;
    Ok(response
        .stack_summaries
        .into_iter()
        .filter(|summary| !is_deleted_status(&summary.stack_status))
        .map(|summary| StackSummary {
            stack_id: summary.stack_id,
            name: summary.stack_name,
            status: summary.stack_status,
        })
        .collect())
}

fn parse_stack_description(raw: &str) -> Result<Option<StackDescription>, ProviderError> {
    let response: DescribeStacksResponse = parse_json(raw)?;
    let Some(stack) = response.stacks.into_iter().next() else {
        return Ok(None);
    };
    if stack.stack_status == "DELETE_COMPLETE" {
        return Ok(None);
    }
    Ok(Some(StackDescription {
        stack_id: stack.stack_id,
        name: stack.stack_name,
        status: stack.stack_status,
        status_reason: stack.stack_status_reason,
        outputs: stack
            .outputs
            .into_iter()
            .map(|output| (output.output_key, output.output_value))
            .collect::<BTreeMap<_, _>>(),
        parameters: stack
            .parameters
            .into_iter()
            .map(|parameter| (parameter.parameter_key, parameter.parameter_value))
            .collect::<BTreeMap<_, _>>(),
    }))
}

/// JSON argument for `--parameters`.
fn parameters_json(request: &StackRequest) -> String {
    let parameters: Vec<serde_json::Value> = request
        .parameters
        .iter()
        .map(|parameter| match &parameter.value {
            ParameterValue::Value(value) => json!({
                "ParameterKey": parameter.key,
                "ParameterValue": value,
                "UsePreviousValue": false,
            }),
            ParameterValue::UsePrevious => json!({
                "ParameterKey": parameter.key,
                "UsePreviousValue": true,
            }),
        })
        .collect();
    serde_json::Value::Array(parameters).to_string()
}

fn submit_args(request: &StackRequest) -> Vec<String> {
    let (operation, stack_name) = match &request.update_target {
        Some(target) => ("update-stack", target.as_str()),
        None => ("create-stack", request.name.as_str()),
    };
    let mut out = args(&["cloudformation", operation, "--stack-name", stack_name]);
    match &request.template {
        TemplateSource::Url(url) => {
            out.push("--template-url".to_string());
            out.push(url.clone());
        }
        TemplateSource::Body(body) => {
            out.push("--template-body".to_string());
            out.push(body.clone());
        }
    }
    if !request.parameters.is_empty() {
        out.push("--parameters".to_string());
        out.push(parameters_json(request));
    }
    if !request.capabilities.is_empty() {
        out.push("--capabilities".to_string());
        out.extend(request.capabilities.iter().cloned());
    }
    out
}

fn vpc_filter(network_id: &str) -> String {
    format!("Name=vpc-id,Values={network_id}")
}

impl Provider for AwsCliProvider {
    fn list_clusters(&self) -> Result<Vec<String>, ProviderError> {
        let response: ListClustersResponse = self.run(&args(&[
            "ecs",
            "list-clusters",
            "--max-items",
            "100",
        ]))?;
        warn_if_truncated("clusters", response.cluster_arns.len());
        Ok(response.cluster_arns)
    }

    fn create_cluster(&self, name: &str) -> Result<String, ProviderError> {
        let response: CreateClusterResponse = self.run(&args(&[
            "ecs",
            "create-cluster",
            "--cluster-name",
            name,
            "--capacity-providers",
            "FARGATE",
            "FARGATE_SPOT",
        ]))?;
        Ok(response.cluster.cluster_arn)
    }

    fn list_networks(&self) -> Result<Vec<Network>, ProviderError> {
        let response: DescribeVpcsResponse =
            self.run(&args(&["ec2", "describe-vpcs", "--max-items", "100"]))?;
        warn_if_truncated("vpcs", response.vpcs.len());
        Ok(response
            .vpcs
            .into_iter()
            .map(|vpc| Network {
                name: name_tag(&vpc.tags),
                id: vpc.vpc_id,
            })
            .collect())
    }

    fn list_subnets(&self, network_id: &str) -> Result<Vec<Subnet>, ProviderError> {
        let response: DescribeSubnetsResponse = self.run(&args(&[
            "ec2",
            "describe-subnets",
            "--filters",
            &vpc_filter(network_id),
            "--max-items",
            "100",
        ]))?;
        warn_if_truncated("subnets", response.subnets.len());
        Ok(response
            .subnets
            .into_iter()
            .map(|subnet| Subnet {
                name: name_tag(&subnet.tags),
                id: subnet.subnet_id,
                cidr_block: subnet.cidr_block,
                availability_zone: subnet.availability_zone,
            })
            .collect())
    }

    fn list_security_groups(&self, network_id: &str) -> Result<Vec<SecurityGroup>, ProviderError> {
        let response: DescribeSecurityGroupsResponse = self.run(&args(&[
            "ec2",
            "describe-security-groups",
            "--filters",
            &vpc_filter(network_id),
            "--max-items",
            "100",
        ]))?;
        warn_if_truncated("security groups", response.security_groups.len());
        Ok(response
            .security_groups
            .into_iter()
            .map(|group| SecurityGroup {
                id: group.group_id,
                name: group.group_name,
            })
            .collect())
    }

    fn list_stacks(&self) -> Result<Vec<StackSummary>, ProviderError> {
        let raw = self.run_raw(&args(&["cloudformation", "list-stacks"]))?;
        parse_stack_summaries(&raw)
    }

    fn submit_stack(&self, request: &StackRequest) -> Result<String, ProviderError> {
        debug!(
            name = %request.name,
            update = request.update_target.is_some(),
            parameters = request.parameters.len(),
            "submitting stack"
        );
        let response: SubmitStackResponse = self.run(&submit_args(request))?;
        Ok(response.stack_id)
    }

    fn describe_stack(&self, stack_id: &str) -> Result<Option<StackDescription>, ProviderError> {
        match self.run_raw(&args(&[
            "cloudformation",
            "describe-stacks",
            "--stack-name",
            stack_id,
        ])) {
            Ok(raw) => parse_stack_description(&raw),
            Err(ProviderError::Provider { message, .. }) if message.contains("does not exist") => {
                debug!(stack_id, "stack does not exist");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn delete_stack(&self, stack_id: &str) -> Result<(), ProviderError> {
        self.run_raw(&args(&[
            "cloudformation",
            "delete-stack",
            "--stack-name",
            stack_id,
        ]))?;
        Ok(())
    }

    fn check_identity(&self) -> Result<String, ProviderError> {
        let identity: CallerIdentity = self.run(&args(&["sts", "get-caller-identity"]))?;
        Ok(identity.account)
    }
}
