//! Name validation and names derived from the deployment environment.

use std::sync::LazyLock;

use regex::Regex;

pub const DEFAULT_DEPLOYMENT_ENVIRONMENT: &str = "production";
pub const DEFAULT_AWS_REGION: &str = "us-west-2";
pub const DEFAULT_RUN_ENVIRONMENT_NAME: &str = "staging";
pub const DEFAULT_VPC_STACK_NAME: &str = "ECS-VPC";

pub const AWS_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "us-gov-east-1",
    "us-gov-west-1",
    "ap-west-1",
    "ap-south-1",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "eu-central-1",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-north-1",
    "me-south-1",
    "sa-east-1",
    "ca-central-1",
    "cn-north-1",
    "cn-northwest-1",
];

static CLUSTER_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][-a-zA-Z0-9]{0,254}$").unwrap());
static STACK_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][-a-zA-Z0-9]{0,127}$").unwrap());
static NON_NAME_CHARS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z-]+").unwrap());

pub fn is_valid_cluster_name(name: &str) -> bool {
    CLUSTER_NAME_RE.is_match(name)
}

pub fn is_valid_stack_name(name: &str) -> bool {
    STACK_NAME_RE.is_match(name)
}

fn is_production(deployment: &str) -> bool {
    deployment == DEFAULT_DEPLOYMENT_ENVIRONMENT
}

/// `CloudReactor`, qualified by the deployment outside production.
pub fn default_role_stack_name(deployment: &str) -> String {
    if deployment.is_empty() || is_production(deployment) {
        "CloudReactor".to_string()
    } else {
        format!("CloudReactor-{deployment}")
    }
}

/// Run environment name derived from the last segment of a cluster ARN.
pub fn default_run_environment_name(cluster_arn: Option<&str>) -> String {
    let Some(arn) = cluster_arn else {
        return DEFAULT_RUN_ENVIRONMENT_NAME.to_string();
    };
    let last = arn.rsplit('/').next().unwrap_or(arn);
    let cleaned = NON_NAME_CHARS_RE.replace_all(last, "");
    if cleaned.is_empty() {
        DEFAULT_RUN_ENVIRONMENT_NAME.to_string()
    } else {
        cleaned.into_owned()
    }
}

pub fn role_template_url(deployment: &str) -> String {
    let (host_qualifier, file_qualifier) = if is_production(deployment) {
        (String::new(), String::new())
    } else {
        (format!("-{deployment}"), format!(".{deployment}"))
    };
    format!(
        "https://cloudreactor-customer-setup{host_qualifier}.s3-us-west-2.amazonaws.com/cloudreactor-aws-role-template{file_qualifier}.json"
    )
}

pub fn run_environment_url(deployment: &str, uuid: &str) -> String {
    let host_qualifier = if is_production(deployment) {
        String::new()
    } else {
        format!(".{deployment}")
    };
    format!(
        "https://dash{host_qualifier}.cloudreactor.io/run_environments/{}",
        urlencoding::encode(uuid)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_names_need_leading_letter_and_no_underscores() {
        assert!(is_valid_stack_name("CloudReactor-test"));
        assert!(is_valid_stack_name("a"));
        assert!(!is_valid_stack_name("1stack"));
        assert!(!is_valid_stack_name("Cloud_Reactor"));
        assert!(!is_valid_stack_name(""));
        assert!(!is_valid_stack_name(&format!("a{}", "b".repeat(128))));
        assert!(is_valid_stack_name(&format!("a{}", "b".repeat(127))));
    }

    #[test]
    fn cluster_names_allow_longer_names() {
        assert!(is_valid_cluster_name(&format!("c{}", "1".repeat(254))));
        assert!(!is_valid_cluster_name(&format!("c{}", "1".repeat(255))));
        assert!(!is_valid_cluster_name("my cluster"));
    }

    #[test]
    fn default_stack_name_is_a_valid_stack_name() {
        assert_eq!(default_role_stack_name("production"), "CloudReactor");
        assert_eq!(default_role_stack_name("test"), "CloudReactor-test");
        assert!(is_valid_stack_name(&default_role_stack_name("test")));
    }

    #[test]
    fn run_environment_name_comes_from_cluster_arn() {
        assert_eq!(
            default_run_environment_name(Some("arn:aws:ecs:us-west-2:123:cluster/staging-2")),
            "staging-"
        );
        assert_eq!(
            default_run_environment_name(Some("arn:aws:ecs:us-west-2:123:cluster/123")),
            DEFAULT_RUN_ENVIRONMENT_NAME
        );
        assert_eq!(default_run_environment_name(None), DEFAULT_RUN_ENVIRONMENT_NAME);
    }

    #[test]
    fn urls_are_qualified_outside_production() {
        assert_eq!(
            role_template_url("production"),
            "https://cloudreactor-customer-setup.s3-us-west-2.amazonaws.com/cloudreactor-aws-role-template.json"
        );
        assert_eq!(
            role_template_url("staging"),
            "https://cloudreactor-customer-setup-staging.s3-us-west-2.amazonaws.com/cloudreactor-aws-role-template.staging.json"
        );
        assert_eq!(
            run_environment_url("staging", "ab c"),
            "https://dash.staging.cloudreactor.io/run_environments/ab%20c"
        );
    }
}
