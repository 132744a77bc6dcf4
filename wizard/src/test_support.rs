//! Scripted collaborators for unit and integration tests.

use std::cell::{Cell, Ref, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;

use crate::core::property::{PropertyKey, PropertyValue, Registry};
use crate::core::stack::{
    CLOUDREACTOR_ROLE_ARN, EXTERNAL_ID, StackDescription, TASK_EXECUTION_ROLE_ARN,
    WORKFLOW_STARTER_ACCESS_KEY, WORKFLOW_STARTER_ARN,
};
use crate::core::state::ConfigurationState;
use crate::io::console::Console;
use crate::io::control_plane::{
    ControlPlane, ControlPlaneError, ControlPlaneFactory, Organization, Page, RemoteEnvironment,
};
use crate::io::provider::{
    AwsCredentials, Network, Provider, ProviderError, ProviderFactory, SecurityGroup, StackRequest,
    StackSummary, Subnet,
};
use crate::io::session_store::SessionStore;
use crate::io::template::{NetworkTemplateParams, TemplateError, TemplateRenderer};
use crate::provisioning::{CancelToken, Ticker};
use crate::session::{Collaborators, Session};

pub const ACCOUNT_ID: &str = "123456789012";

/// One scripted operator answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Pick the first choice containing the text.
    Choose(&'static str),
    Index(usize),
    Text(&'static str),
    Confirm(bool),
    Cancel,
}

/// Console that answers from a script. An exhausted script behaves like end
/// of input.
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    replies: VecDeque<Reply>,
    pub transcript: Vec<String>,
    pub menus: Vec<Vec<String>>,
}

impl ScriptedConsole {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: replies.into(),
            ..Default::default()
        }
    }

    pub fn said(&self, needle: &str) -> bool {
        self.transcript.iter().any(|line| line.contains(needle))
    }

    pub fn remaining(&self) -> usize {
        self.replies.len()
    }

    fn next(&mut self, question: &str) -> Option<Reply> {
        self.transcript.push(question.to_string());
        self.replies.pop_front()
    }
}

impl Console for ScriptedConsole {
    fn say(&mut self, message: &str) {
        self.transcript.push(message.to_string());
    }

    fn select(&mut self, question: &str, choices: &[String]) -> Option<usize> {
        self.menus.push(choices.to_vec());
        match self.next(question)? {
            Reply::Choose(needle) => Some(
                choices
                    .iter()
                    .position(|choice| choice.contains(needle))
                    .unwrap_or_else(|| panic!("no choice matching {needle:?} in {choices:?}")),
            ),
            Reply::Index(index) => Some(index),
            Reply::Cancel => None,
            other => panic!("expected a selection for {question:?}, got {other:?}"),
        }
    }

    fn text(&mut self, question: &str) -> Option<String> {
        match self.next(question)? {
            Reply::Text(text) => Some(text.to_string()),
            Reply::Cancel => None,
            other => panic!("expected text for {question:?}, got {other:?}"),
        }
    }

    fn password(&mut self, question: &str) -> Option<String> {
        self.text(question)
    }

    fn confirm(&mut self, question: &str) -> Option<bool> {
        match self.next(question)? {
            Reply::Confirm(answer) => Some(answer),
            Reply::Cancel => None,
            other => panic!("expected a confirmation for {question:?}, got {other:?}"),
        }
    }
}

/// Canned provider responses plus a record of the calls made.
#[derive(Debug, Default)]
pub struct ProviderScript {
    pub clusters: Vec<String>,
    pub networks: Vec<Network>,
    pub subnets: Vec<Subnet>,
    pub security_groups: Vec<SecurityGroup>,
    pub stacks: Vec<StackSummary>,
    /// Consumed in order; an empty queue accepts the submission.
    pub submit_results: VecDeque<Result<String, ProviderError>>,
    /// Consumed in order; the last entry repeats.
    pub describe_results: VecDeque<Result<Option<StackDescription>, ProviderError>>,
    pub identity_error: Option<ProviderError>,
    pub cluster_error: Option<ProviderError>,
    /// Number of upcoming connects that fail.
    pub failing_connects: usize,

    pub connects: usize,
    pub submitted: Vec<StackRequest>,
    pub described: usize,
    pub deleted: Vec<String>,
    pub created_clusters: Vec<String>,
}

#[derive(Clone, Default)]
pub struct ScriptedProviderFactory {
    script: Rc<RefCell<ProviderScript>>,
}

impl ScriptedProviderFactory {
    pub fn new(script: ProviderScript) -> Self {
        Self {
            script: Rc::new(RefCell::new(script)),
        }
    }

    pub fn script(&self) -> Ref<'_, ProviderScript> {
        self.script.borrow()
    }
}

impl ProviderFactory for ScriptedProviderFactory {
    fn connect(&self, _credentials: &AwsCredentials) -> Result<Box<dyn Provider>, ProviderError> {
        let mut script = self.script.borrow_mut();
        script.connects += 1;
        if script.failing_connects > 0 {
            script.failing_connects -= 1;
            return Err(ProviderError::Transport("connection refused".to_string()));
        }
        Ok(Box::new(ScriptedProvider {
            script: Rc::clone(&self.script),
        }))
    }
}

pub struct ScriptedProvider {
    script: Rc<RefCell<ProviderScript>>,
}

impl Provider for ScriptedProvider {
    fn list_clusters(&self) -> Result<Vec<String>, ProviderError> {
        let script = self.script.borrow();
        match &script.cluster_error {
            Some(err) => Err(err.clone()),
            None => Ok(script.clusters.clone()),
        }
    }

    fn create_cluster(&self, name: &str) -> Result<String, ProviderError> {
        let mut script = self.script.borrow_mut();
        script.created_clusters.push(name.to_string());
        Ok(format!("arn:aws:ecs:us-west-2:{ACCOUNT_ID}:cluster/{name}"))
    }

    fn list_networks(&self) -> Result<Vec<Network>, ProviderError> {
        Ok(self.script.borrow().networks.clone())
    }

    fn list_subnets(&self, _network_id: &str) -> Result<Vec<Subnet>, ProviderError> {
        Ok(self.script.borrow().subnets.clone())
    }

    fn list_security_groups(&self, _network_id: &str) -> Result<Vec<SecurityGroup>, ProviderError> {
        Ok(self.script.borrow().security_groups.clone())
    }

    fn list_stacks(&self) -> Result<Vec<StackSummary>, ProviderError> {
        Ok(self.script.borrow().stacks.clone())
    }

    fn submit_stack(&self, request: &StackRequest) -> Result<String, ProviderError> {
        let mut script = self.script.borrow_mut();
        script.submitted.push(request.clone());
        script
            .submit_results
            .pop_front()
            .unwrap_or_else(|| Ok(stack_id(&request.name)))
    }

    fn describe_stack(&self, _stack_id: &str) -> Result<Option<StackDescription>, ProviderError> {
        let mut script = self.script.borrow_mut();
        script.described += 1;
        if script.describe_results.len() > 1 {
            script.describe_results.pop_front().unwrap_or(Ok(None))
        } else {
            script.describe_results.front().cloned().unwrap_or(Ok(None))
        }
    }

    fn delete_stack(&self, stack_id: &str) -> Result<(), ProviderError> {
        self.script.borrow_mut().deleted.push(stack_id.to_string());
        Ok(())
    }

    fn check_identity(&self) -> Result<String, ProviderError> {
        match &self.script.borrow().identity_error {
            Some(err) => Err(err.clone()),
            None => Ok(ACCOUNT_ID.to_string()),
        }
    }
}

pub fn stack_id(name: &str) -> String {
    format!("arn:aws:cloudformation:us-west-2:{ACCOUNT_ID}:stack/{name}/1")
}

/// Permissions stack that finished with every required output.
pub fn complete_role_stack(stack_id: &str) -> StackDescription {
    let outputs = [
        (CLOUDREACTOR_ROLE_ARN, "arn:aws:iam::123456789012:role/CloudreactorRole"),
        (TASK_EXECUTION_ROLE_ARN, "arn:aws:iam::123456789012:role/TaskExecutionRole"),
        (WORKFLOW_STARTER_ARN, "arn:aws:lambda:us-west-2:123456789012:function:starter"),
    ];
    let parameters = [
        (EXTERNAL_ID, "ExternalIdExternalIdExternalId12"),
        (WORKFLOW_STARTER_ACCESS_KEY, "StarterKeyStarterKeyStarterKey12"),
    ];
    StackDescription {
        stack_id: stack_id.to_string(),
        name: "CloudReactor".to_string(),
        status: "CREATE_COMPLETE".to_string(),
        status_reason: None,
        outputs: to_map(&outputs),
        parameters: to_map(&parameters),
    }
}

/// Stack description with only a status.
pub fn stack_with_status(stack_id: &str, status: &str) -> StackDescription {
    StackDescription {
        stack_id: stack_id.to_string(),
        name: "CloudReactor".to_string(),
        status: status.to_string(),
        ..Default::default()
    }
}

fn to_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Canned control-plane responses plus a record of the calls made.
#[derive(Debug, Default)]
pub struct ControlPlaneScript {
    pub organizations: Vec<Organization>,
    pub environments: Vec<RemoteEnvironment>,
    pub next_page: Option<String>,
    /// Fail every call with this error.
    pub failure: Option<ControlPlaneError>,
    /// Response to create/update instead of the echoed payload.
    pub environment_response: Option<Value>,

    pub api_keys: Vec<String>,
    pub listed_for: Vec<Option<i64>>,
    pub created_organizations: Vec<Value>,
    pub created: Vec<Value>,
    pub updated: Vec<(String, Value)>,
}

#[derive(Clone, Default)]
pub struct ScriptedControlPlaneFactory {
    script: Rc<RefCell<ControlPlaneScript>>,
}

impl ScriptedControlPlaneFactory {
    pub fn new(script: ControlPlaneScript) -> Self {
        Self {
            script: Rc::new(RefCell::new(script)),
        }
    }

    pub fn script(&self) -> Ref<'_, ControlPlaneScript> {
        self.script.borrow()
    }
}

impl ControlPlaneFactory for ScriptedControlPlaneFactory {
    fn with_api_key(&self, api_key: &str) -> Box<dyn ControlPlane> {
        self.script.borrow_mut().api_keys.push(api_key.to_string());
        Box::new(ScriptedControlPlane {
            script: Rc::clone(&self.script),
        })
    }
}

pub struct ScriptedControlPlane {
    script: Rc<RefCell<ControlPlaneScript>>,
}

impl ScriptedControlPlane {
    fn check(&self) -> Result<(), ControlPlaneError> {
        match &self.script.borrow().failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn environment_response(&self, uuid: &str, data: &Value) -> Value {
        self.script
            .borrow()
            .environment_response
            .clone()
            .unwrap_or_else(|| json!({ "uuid": uuid, "name": data["name"] }))
    }
}

impl ControlPlane for ScriptedControlPlane {
    fn authenticate(&mut self, _username: &str, _password: &str) -> Result<String, ControlPlaneError> {
        self.check()?;
        Ok("token".to_string())
    }

    fn list_organizations(&mut self) -> Result<Page<Organization>, ControlPlaneError> {
        self.check()?;
        let script = self.script.borrow();
        Ok(Page {
            count: Some(script.organizations.len() as u64),
            next: None,
            results: script.organizations.clone(),
        })
    }

    fn create_organization(&mut self, data: &Value) -> Result<Organization, ControlPlaneError> {
        self.check()?;
        let mut script = self.script.borrow_mut();
        script.created_organizations.push(data.clone());
        let organization = Organization {
            id: 100 + script.organizations.len() as i64,
            name: data["name"].as_str().unwrap_or_default().to_string(),
        };
        script.organizations.push(organization.clone());
        Ok(organization)
    }

    fn list_environments(
        &mut self,
        organization_id: Option<i64>,
    ) -> Result<Page<RemoteEnvironment>, ControlPlaneError> {
        self.check()?;
        let mut script = self.script.borrow_mut();
        script.listed_for.push(organization_id);
        Ok(Page {
            count: Some(script.environments.len() as u64),
            next: script.next_page.clone(),
            results: script.environments.clone(),
        })
    }

    fn create_environment(&mut self, data: &Value) -> Result<Value, ControlPlaneError> {
        self.check()?;
        self.script.borrow_mut().created.push(data.clone());
        Ok(self.environment_response("env-uuid-new", data))
    }

    fn update_environment(&mut self, id: &str, data: &Value) -> Result<Value, ControlPlaneError> {
        self.check()?;
        self.script
            .borrow_mut()
            .updated
            .push((id.to_string(), data.clone()));
        Ok(self.environment_response(id, data))
    }
}

/// Renders a short placeholder instead of the real template.
pub struct StubRenderer;

impl TemplateRenderer for StubRenderer {
    fn render_network(&self, params: &NetworkTemplateParams) -> Result<String, TemplateError> {
        Ok(format!(
            "network az_count={} second_octet={}",
            params.az_count, params.second_octet
        ))
    }
}

/// Ticker that never sleeps. With a limit, the tick after the limit cancels.
#[derive(Debug, Default)]
pub struct InstantTicker {
    limit: Option<usize>,
    pub ticks: Cell<usize>,
}

impl InstantTicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ticks: Cell::new(0),
        }
    }
}

impl Ticker for InstantTicker {
    fn wait(&self, _interval: Duration, cancel: &CancelToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        let ticks = self.ticks.get() + 1;
        self.ticks.set(ticks);
        if self.limit.is_some_and(|limit| ticks > limit) {
            cancel.cancel();
            return false;
        }
        true
    }
}

/// Session backed by a file in a fresh temporary directory.
pub fn temp_session(deployment: &str) -> (TempDir, Session) {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = SessionStore::new(temp.path().join("saved_settings.json"));
    let registry = Registry::standard().expect("registry");
    let session = Session::new(ConfigurationState::new(deployment), store, registry);
    (temp, session)
}

/// Fill region and credentials without running the identity check.
pub fn set_credentials(session: &mut Session) {
    for (key, value) in [
        (PropertyKey::AwsRegion, "us-west-2"),
        (PropertyKey::AwsAccessKey, "AKIAEXAMPLEKEY"),
        (PropertyKey::AwsSecretKey, "secret-access-key"),
    ] {
        session
            .update(key, PropertyValue::text(value))
            .expect("update");
    }
}

/// Owns every scripted collaborator for one test.
pub struct Harness {
    pub console: ScriptedConsole,
    pub providers: ScriptedProviderFactory,
    pub control_plane: ScriptedControlPlaneFactory,
    pub ticker: InstantTicker,
    pub cancel: CancelToken,
    renderer: StubRenderer,
}

impl Harness {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            console: ScriptedConsole::new(replies),
            providers: ScriptedProviderFactory::default(),
            control_plane: ScriptedControlPlaneFactory::default(),
            ticker: InstantTicker::new(),
            cancel: CancelToken::default(),
            renderer: StubRenderer,
        }
    }

    pub fn with_provider(mut self, script: ProviderScript) -> Self {
        self.providers = ScriptedProviderFactory::new(script);
        self
    }

    pub fn with_control_plane(mut self, script: ControlPlaneScript) -> Self {
        self.control_plane = ScriptedControlPlaneFactory::new(script);
        self
    }

    pub fn with_ticker(mut self, ticker: InstantTicker) -> Self {
        self.ticker = ticker;
        self
    }

    pub fn collaborators(&mut self) -> Collaborators<'_> {
        Collaborators {
            console: &mut self.console,
            providers: &self.providers,
            control_plane: &self.control_plane,
            templates: &self.renderer,
            ticker: &self.ticker,
            cancel: self.cancel.clone(),
            poll_interval: Duration::from_secs(10),
        }
    }
}
