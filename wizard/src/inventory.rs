//! Read-only listing of organizations and their run environments.

use std::io::Write;

use anyhow::{Context, Result, anyhow};
use tracing::{info, warn};

use crate::io::control_plane::{ControlPlane, HttpControlPlane};

pub const USERNAME_ENV: &str = "CLOUDREACTOR_USERNAME";
pub const PASSWORD_ENV: &str = "CLOUDREACTOR_PASSWORD";

fn required_env(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("{name} must be set to list run environments"))
}

/// Password-authenticated client from `CLOUDREACTOR_USERNAME` and
/// `CLOUDREACTOR_PASSWORD`.
pub fn client_from_env(base_url: &str) -> Result<HttpControlPlane> {
    let username = required_env(USERNAME_ENV)?;
    let password = required_env(PASSWORD_ENV)?;
    Ok(HttpControlPlane::with_password(base_url, &username, &password))
}

/// Write every organization followed by its run environments.
pub fn list_environments(client: &mut dyn ControlPlane, out: &mut dyn Write) -> Result<()> {
    let organizations = client
        .list_organizations()
        .context("list organizations")?;
    info!(count = organizations.results.len(), "listed organizations");

    for organization in &organizations.results {
        writeln!(out, "{} (id {})", organization.name, organization.id).context("write listing")?;
        let page = client
            .list_environments(Some(organization.id))
            .with_context(|| format!("list run environments of {}", organization.name))?;
        if page.next.is_some() {
            warn!(organization = organization.id, "only the first page of run environments is listed");
        }
        if page.results.is_empty() {
            writeln!(out, "  (no run environments)").context("write listing")?;
        }
        for environment in &page.results {
            writeln!(out, "  - {} ({})", environment.name, environment.uuid).context("write listing")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::control_plane::{
        ControlPlaneError, ControlPlaneFactory, Organization, RemoteEnvironment,
    };
    use crate::test_support::{ControlPlaneScript, ScriptedControlPlaneFactory};

    #[test]
    fn lists_organizations_and_environments() {
        let factory = ScriptedControlPlaneFactory::new(ControlPlaneScript {
            organizations: vec![Organization {
                id: 7,
                name: "Acme".to_string(),
            }],
            environments: vec![RemoteEnvironment {
                uuid: "u-1".to_string(),
                name: "staging".to_string(),
            }],
            ..Default::default()
        });
        let mut client = factory.with_api_key("key");
        let mut out = Vec::new();

        list_environments(client.as_mut(), &mut out).expect("list");

        assert_eq!(String::from_utf8(out).expect("utf8"), "Acme (id 7)\n  - staging (u-1)\n");
    }

    #[test]
    fn control_plane_errors_propagate() {
        let factory = ScriptedControlPlaneFactory::new(ControlPlaneScript {
            failure: Some(ControlPlaneError::Rejected {
                status: 401,
                body: String::new(),
            }),
            ..Default::default()
        });
        let mut client = factory.with_api_key("key");
        let err = list_environments(client.as_mut(), &mut Vec::new()).unwrap_err();
        assert!(format!("{err:#}").contains("got response status 401"));
    }
}
