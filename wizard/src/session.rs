//! A running wizard session: the configuration state, where it is persisted,
//! and the collaborators handlers talk to.
//!
//! Every property mutation goes through [`Session::update`] or
//! [`Session::clear`], which run the dependency invalidator and persist the
//! result before returning.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::core::invalidate::{Invalidation, on_property_changed};
use crate::core::property::{PropertyKey, PropertyValue, Registry};
use crate::core::state::ConfigurationState;
use crate::io::console::Console;
use crate::io::control_plane::ControlPlaneFactory;
use crate::io::provider::{AwsCredentials, Provider, ProviderFactory};
use crate::io::session_store::{LoadOutcome, SessionStore};
use crate::io::template::TemplateRenderer;
use crate::provisioning::{CancelToken, Ticker};

pub struct Session {
    pub state: ConfigurationState,
    store: SessionStore,
    registry: Registry,
}

impl Session {
    pub fn new(state: ConfigurationState, store: SessionStore, registry: Registry) -> Self {
        Self {
            state,
            store,
            registry,
        }
    }

    /// Restore the saved session and apply the deployment environment chosen
    /// on the command line.
    pub fn open(
        store: SessionStore,
        registry: Registry,
        deployment_environment: &str,
    ) -> Result<(Self, LoadOutcome)> {
        let (state, outcome) = store.load(deployment_environment);
        let mut session = Self::new(state, store, registry);
        if session.state.text(PropertyKey::DeploymentEnvironment) != Some(deployment_environment) {
            session.update(
                PropertyKey::DeploymentEnvironment,
                PropertyValue::text(deployment_environment),
            )?;
        }
        Ok((session, outcome))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Set `key`, invalidate what depended on its old value, and persist.
    pub fn update(&mut self, key: PropertyKey, value: PropertyValue) -> Result<Invalidation> {
        let old = self.state.properties.get(&key).cloned();
        let invalidation =
            on_property_changed(&self.registry, &mut self.state, key, old.as_ref(), Some(&value));
        self.state.properties.insert(key, value);
        log_invalidation(key, &invalidation);
        self.save()?;
        Ok(invalidation)
    }

    /// Unset `key` so it is asked again, invalidating its dependents.
    pub fn clear(&mut self, key: PropertyKey) -> Result<Invalidation> {
        let old = self.state.properties.remove(&key);
        let invalidation =
            on_property_changed(&self.registry, &mut self.state, key, old.as_ref(), None);
        log_invalidation(key, &invalidation);
        self.save()?;
        Ok(invalidation)
    }

    pub fn save(&self) -> Result<()> {
        self.store
            .save(&self.state)
            .with_context(|| format!("save session {}", self.store.path().display()))
    }

    /// Start over with only the deployment environment kept.
    pub fn reset(&mut self) -> Result<()> {
        let deployment = self.state.deployment_environment().to_string();
        info!(deployment = %deployment, "resetting session");
        self.state = ConfigurationState::new(&deployment);
        self.save()
    }

    /// Provider credentials, once region and both keys are set.
    pub fn credentials(&self) -> Option<AwsCredentials> {
        Some(AwsCredentials {
            region: self.state.text(PropertyKey::AwsRegion)?.to_string(),
            access_key: self.state.text(PropertyKey::AwsAccessKey)?.to_string(),
            secret_key: self.state.text(PropertyKey::AwsSecretKey)?.to_string(),
        })
    }
}

fn log_invalidation(key: PropertyKey, invalidation: &Invalidation) {
    if invalidation.is_empty() {
        debug!(key = %key, "property updated");
    } else {
        info!(
            key = %key,
            cleared = ?invalidation.cleared,
            derived = ?invalidation.derived,
            "property change invalidated dependents"
        );
    }
}

/// Collaborators shared by every handler for the duration of a run.
pub struct Collaborators<'a> {
    pub console: &'a mut dyn Console,
    pub providers: &'a dyn ProviderFactory,
    pub control_plane: &'a dyn ControlPlaneFactory,
    pub templates: &'a dyn TemplateRenderer,
    pub ticker: &'a dyn Ticker,
    pub cancel: CancelToken,
    pub poll_interval: Duration,
}

impl Collaborators<'_> {
    /// Connect a provider client for the session's credentials, telling the
    /// operator what is missing otherwise.
    pub fn provider(&mut self, session: &Session, purpose: &str) -> Option<Box<dyn Provider>> {
        let Some(credentials) = session.credentials() else {
            self.console.say(&format!(
                "You must set the AWS region and your AWS credentials before {purpose}.\n"
            ));
            return None;
        };
        match self.providers.connect(&credentials) {
            Ok(provider) => Some(provider),
            Err(err) => {
                self.console.say(&format!(
                    "Your AWS credentials could not be used ({err}). Please check them and try again.\n"
                ));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::RemoteResourceRef;

    fn store(temp: &tempfile::TempDir) -> SessionStore {
        SessionStore::new(temp.path().join("saved_settings.json"))
    }

    #[test]
    fn update_persists_and_invalidates() {
        let temp = tempfile::tempdir().expect("tempdir");
        let registry = Registry::standard().expect("registry");
        let mut session = Session::new(ConfigurationState::new("production"), store(&temp), registry);

        session
            .update(PropertyKey::AwsRegion, PropertyValue::text("us-west-2"))
            .expect("update");
        session
            .update(PropertyKey::ClusterArn, PropertyValue::text("arn:cluster/a"))
            .expect("update");
        let invalidation = session
            .update(PropertyKey::AwsRegion, PropertyValue::text("eu-west-1"))
            .expect("update");

        assert!(invalidation.cleared.contains(&PropertyKey::ClusterArn));
        let (saved, _) = store(&temp).load("production");
        assert_eq!(saved.text(PropertyKey::AwsRegion), Some("eu-west-1"));
        assert!(saved.get(PropertyKey::ClusterArn).is_none());
    }

    #[test]
    fn open_applies_a_different_deployment_environment() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut state = ConfigurationState::new("production");
        state
            .properties
            .insert(PropertyKey::StackName, PropertyValue::text("CloudReactor"));
        state.remote_resource = Some(RemoteResourceRef {
            id: "uuid".to_string(),
            name: "staging".to_string(),
        });
        store(&temp).save(&state).expect("save");

        let (session, outcome) =
            Session::open(store(&temp), Registry::standard().expect("registry"), "staging")
                .expect("open");

        assert_eq!(outcome, LoadOutcome::Restored);
        assert_eq!(session.state.deployment_environment(), "staging");
        assert!(session.state.get(PropertyKey::StackName).is_none());
        assert!(session.state.remote_resource.is_none());
    }

    #[test]
    fn open_with_same_environment_keeps_state() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut state = ConfigurationState::new("production");
        state
            .properties
            .insert(PropertyKey::StackName, PropertyValue::text("CloudReactor"));
        store(&temp).save(&state).expect("save");

        let (session, _) =
            Session::open(store(&temp), Registry::standard().expect("registry"), "production")
                .expect("open");
        assert_eq!(session.state, state);
    }

    #[test]
    fn reset_keeps_only_the_deployment_environment() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut session = Session::new(
            ConfigurationState::new("test"),
            store(&temp),
            Registry::standard().expect("registry"),
        );
        session
            .update(PropertyKey::AwsRegion, PropertyValue::text("us-west-2"))
            .expect("update");
        session.reset().expect("reset");
        assert_eq!(session.state, ConfigurationState::new("test"));
    }
}
