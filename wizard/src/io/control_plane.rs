//! CloudReactor control-plane collaborator.
//!
//! [`HttpControlPlane`] talks to the REST API with blocking `ureq` calls.
//! Non-2xx responses are returned as [`ControlPlaneError::Rejected`] with the
//! status and body kept verbatim for the operator.

use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use ureq::Agent;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlPlaneError {
    #[error("an error communicating with the CloudReactor server occurred: {0}")]
    Transport(String),
    #[error("{}", rejected_message(*.status, .body))]
    Rejected { status: u16, body: String },
    #[error("the CloudReactor server returned an invalid response: {0}")]
    Protocol(String),
}

fn rejected_message(status: u16, body: &str) -> String {
    if body.is_empty() {
        format!("got response status {status} from the server")
    } else {
        format!("got response status {status} and response body: {body} from the server")
    }
}

impl ControlPlaneError {
    /// The server answered and refused the credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ControlPlaneError::Rejected { status: 401 | 403, .. })
    }
}

/// One page of a list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Organization {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteEnvironment {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
}

pub trait ControlPlane {
    /// Exchange a username and password for an access token.
    fn authenticate(&mut self, username: &str, password: &str) -> Result<String, ControlPlaneError>;

    fn list_organizations(&mut self) -> Result<Page<Organization>, ControlPlaneError>;

    fn create_organization(&mut self, data: &Value) -> Result<Organization, ControlPlaneError>;

    /// Run environments, restricted to one organization when `organization_id` is set.
    fn list_environments(
        &mut self,
        organization_id: Option<i64>,
    ) -> Result<Page<RemoteEnvironment>, ControlPlaneError>;

    fn create_environment(&mut self, data: &Value) -> Result<Value, ControlPlaneError>;

    fn update_environment(&mut self, id: &str, data: &Value) -> Result<Value, ControlPlaneError>;
}

/// Builds API-key clients for the wizard session.
pub trait ControlPlaneFactory {
    fn with_api_key(&self, api_key: &str) -> Box<dyn ControlPlane>;
}

#[derive(Debug, Clone)]
enum Credentials {
    ApiKey(String),
    Password {
        username: String,
        password: String,
        access_token: Option<String>,
    },
}

pub struct HttpControlPlane {
    agent: Agent,
    base_url: String,
    credentials: Credentials,
}

fn new_agent() -> Agent {
    let config = Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(REQUEST_TIMEOUT))
        .build();
    Agent::new_with_config(config)
}

enum Method {
    Get,
    Post,
    Patch,
}

impl HttpControlPlane {
    pub fn with_api_key(base_url: &str, api_key: &str) -> Self {
        Self::new(base_url, Credentials::ApiKey(api_key.to_string()))
    }

    /// Client that authenticates lazily on the first request.
    pub fn with_password(base_url: &str, username: &str, password: &str) -> Self {
        Self::new(
            base_url,
            Credentials::Password {
                username: username.to_string(),
                password: password.to_string(),
                access_token: None,
            },
        )
    }

    fn new(base_url: &str, credentials: Credentials) -> Self {
        Self {
            agent: new_agent(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    fn authorization(&mut self) -> Result<String, ControlPlaneError> {
        let (username, password) = match &self.credentials {
            Credentials::ApiKey(key) => return Ok(format!("Token {key}")),
            Credentials::Password {
                access_token: Some(token),
                ..
            } => return Ok(format!("JWT {token}")),
            Credentials::Password {
                username, password, ..
            } => (username.clone(), password.clone()),
        };
        let token = self.authenticate(&username, &password)?;
        if let Credentials::Password { access_token, .. } = &mut self.credentials {
            *access_token = Some(token.clone());
        }
        Ok(format!("JWT {token}"))
    }

    #[instrument(skip_all, fields(path = %path))]
    fn send<T: DeserializeOwned>(
        &mut self,
        method: Method,
        path: &str,
        query: Option<(&str, String)>,
        data: Option<&Value>,
    ) -> Result<T, ControlPlaneError> {
        let authorization = self.authorization()?;
        let url = format!("{}/api/v1/{}", self.base_url, path);
        debug!(url = %url, "control plane request");

        let result = match method {
            Method::Get => {
                let mut request = self
                    .agent
                    .get(&url)
                    .header("Authorization", &authorization)
                    .header("Accept", "application/json");
                if let Some((key, value)) = &query {
                    request = request.query(*key, value);
                }
                request.call()
            }
            Method::Post => self
                .agent
                .post(&url)
                .header("Authorization", &authorization)
                .header("Accept", "application/json")
                .send_json(data.unwrap_or(&Value::Null)),
            Method::Patch => self
                .agent
                .patch(&url)
                .header("Authorization", &authorization)
                .header("Accept", "application/json")
                .send_json(data.unwrap_or(&Value::Null)),
        };
        read_response(result)
    }
}

fn read_response<T: DeserializeOwned>(
    result: Result<ureq::http::Response<ureq::Body>, ureq::Error>,
) -> Result<T, ControlPlaneError> {
    let response = result.map_err(|err| ControlPlaneError::Transport(err.to_string()))?;
    let status = response.status().as_u16();
    let body = response
        .into_body()
        .read_to_string()
        .map_err(|err| ControlPlaneError::Transport(err.to_string()))?;
    if !(200..300).contains(&status) {
        warn!(status, "control plane rejected request");
        return Err(ControlPlaneError::Rejected { status, body });
    }
    serde_json::from_str(&body).map_err(|err| ControlPlaneError::Protocol(err.to_string()))
}

#[derive(Deserialize)]
struct TokenResponse {
    access: String,
}

impl ControlPlane for HttpControlPlane {
    fn authenticate(&mut self, username: &str, password: &str) -> Result<String, ControlPlaneError> {
        debug!(username, "authenticating with control plane");
        let url = format!("{}/auth/jwt/create/", self.base_url);
        let result = self
            .agent
            .post(&url)
            .header("Accept", "application/json")
            .send_json(json!({ "username": username, "password": password }));
        let token: TokenResponse = read_response(result)?;
        Ok(token.access)
    }

    fn list_organizations(&mut self) -> Result<Page<Organization>, ControlPlaneError> {
        self.send(Method::Get, "groups/", None, None)
    }

    fn create_organization(&mut self, data: &Value) -> Result<Organization, ControlPlaneError> {
        self.send(Method::Post, "groups/", None, Some(data))
    }

    fn list_environments(
        &mut self,
        organization_id: Option<i64>,
    ) -> Result<Page<RemoteEnvironment>, ControlPlaneError> {
        let query = organization_id.map(|id| ("created_by_group__id", id.to_string()));
        self.send(Method::Get, "run_environments/", query, None)
    }

    fn create_environment(&mut self, data: &Value) -> Result<Value, ControlPlaneError> {
        self.send(Method::Post, "run_environments/", None, Some(data))
    }

    fn update_environment(&mut self, id: &str, data: &Value) -> Result<Value, ControlPlaneError> {
        let path = format!("run_environments/{id}/");
        self.send(Method::Patch, &path, None, Some(data))
    }
}

pub struct HttpControlPlaneFactory {
    base_url: String,
}

impl HttpControlPlaneFactory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl ControlPlaneFactory for HttpControlPlaneFactory {
    fn with_api_key(&self, api_key: &str) -> Box<dyn ControlPlane> {
        Box::new(HttpControlPlane::with_api_key(&self.base_url, api_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_tolerate_missing_fields() {
        let page: Page<RemoteEnvironment> =
            serde_json::from_str(r#"{"results": [{"uuid": "u1", "name": "staging"}]}"#)
                .expect("page");
        assert_eq!(page.next, None);
        assert_eq!(page.results[0].uuid, "u1");

        let page: Page<Organization> =
            serde_json::from_str(r#"{"count": 1, "next": "http://x/?page=2", "results": [{"id": 7}]}"#)
                .expect("page");
        assert_eq!(page.results[0].id, 7);
        assert!(page.next.is_some());
    }

    #[test]
    fn rejected_errors_keep_status_and_body() {
        let err = ControlPlaneError::Rejected {
            status: 400,
            body: r#"{"name": ["required"]}"#.to_string(),
        };
        assert_eq!(
            err.to_string(),
            r#"got response status 400 and response body: {"name": ["required"]} from the server"#
        );
        assert!(!err.is_unauthorized());
        let err = ControlPlaneError::Rejected {
            status: 401,
            body: String::new(),
        };
        assert_eq!(err.to_string(), "got response status 401 from the server");
        assert!(err.is_unauthorized());
    }

    #[test]
    fn unreachable_server_is_a_transport_error() {
        let mut client = HttpControlPlane::with_api_key("http://127.0.0.1:9", "key");
        let err = client.list_organizations().unwrap_err();
        assert!(matches!(err, ControlPlaneError::Transport(_)), "{err:?}");
    }
}
