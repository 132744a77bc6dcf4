//! Durable session record (`saved_settings.json`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::state::ConfigurationState;

pub const SESSION_SCHEMA_VERSION: u32 = 1;

/// Versioned envelope around the persisted state.
#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    version: u32,
    state: ConfigurationState,
}

#[derive(Serialize)]
struct SessionRecordRef<'a> {
    version: u32,
    state: &'a ConfigurationState,
}

/// How a load produced its state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No record existed.
    Fresh,
    Restored,
    /// A record existed but could not be used; the reason is for the operator.
    Discarded(String),
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved state, or a fresh one when absent or unusable.
    pub fn load(&self, deployment_environment: &str) -> (ConfigurationState, LoadOutcome) {
        debug!(path = %self.path.display(), "loading session");
        if !self.path.exists() {
            return (
                ConfigurationState::new(deployment_environment),
                LoadOutcome::Fresh,
            );
        }
        match self.read_record() {
            Ok(state) => {
                debug!(properties = state.properties.len(), mode = ?state.mode, "session restored");
                (state, LoadOutcome::Restored)
            }
            Err(err) => {
                warn!(path = %self.path.display(), err = %format!("{err:#}"), "discarding unreadable session");
                (
                    ConfigurationState::new(deployment_environment),
                    LoadOutcome::Discarded(format!("{err:#}")),
                )
            }
        }
    }

    fn read_record(&self) -> Result<ConfigurationState> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read session {}", self.path.display()))?;
        let record: SessionRecord = serde_json::from_str(&contents)
            .with_context(|| format!("parse session {}", self.path.display()))?;
        if record.version != SESSION_SCHEMA_VERSION {
            anyhow::bail!(
                "unsupported session version {} (expected {})",
                record.version,
                SESSION_SCHEMA_VERSION
            );
        }
        Ok(record.state)
    }

    /// Atomically write the state (temp file + rename).
    pub fn save(&self, state: &ConfigurationState) -> Result<()> {
        debug!(path = %self.path.display(), mode = ?state.mode, phase = ?state.workflow_phase(), "writing session");
        let record = SessionRecordRef {
            version: SESSION_SCHEMA_VERSION,
            state,
        };
        let mut buf = serde_json::to_string_pretty(&record).context("serialize session")?;
        buf.push('\n');
        write_atomic(&self.path, &buf)
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp session {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace session {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::property::{PropertyKey, PropertyValue};
    use crate::core::state::{
        Mode, NetworkSelection, ProvisioningWorkflowState, RemoteResourceRef, WorkflowPhase,
    };
    use chrono::Utc;

    /// Save then load yields an equal state with every field populated.
    #[test]
    fn session_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(temp.path().join("saved_settings.json"));

        let mut state = ConfigurationState::new("staging");
        state.mode = Mode::Edit;
        state
            .properties
            .insert(PropertyKey::AwsRegion, PropertyValue::text("us-west-2"));
        state
            .properties
            .insert(PropertyKey::Subnets, PropertyValue::List(Vec::new()));
        state.properties.insert(
            PropertyKey::SecurityGroups,
            PropertyValue::List(vec!["sg-1".to_string()]),
        );
        state.aws_account_id = Some("123456789012".to_string());
        state.api_key_validated = true;
        state.network = Some(NetworkSelection {
            vpc_id: "vpc-1".to_string(),
            created_by_wizard: true,
        });
        state.stack_id_to_update = Some("arn:stack/1".to_string());
        state.workflow = Some(ProvisioningWorkflowState {
            phase: WorkflowPhase::Polling,
            submitted_at: Some(Utc::now()),
            finished_at: None,
            remote_stack_id: Some("arn:stack/1".to_string()),
            outputs: Default::default(),
            provider_status: Some("CREATE_IN_PROGRESS".to_string()),
            failure_reason: None,
        });
        state.remote_resource = Some(RemoteResourceRef {
            id: "uuid-1".to_string(),
            name: "staging".to_string(),
        });

        store.save(&state).expect("save");
        let (loaded, outcome) = store.load("production");
        assert_eq!(outcome, LoadOutcome::Restored);
        assert_eq!(loaded, state);
    }

    #[test]
    fn missing_file_starts_fresh() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(temp.path().join("missing.json"));
        let (state, outcome) = store.load("production");
        assert_eq!(outcome, LoadOutcome::Fresh);
        assert_eq!(state, ConfigurationState::new("production"));
    }

    #[test]
    fn corrupt_file_is_discarded_not_fatal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("saved_settings.json");
        fs::write(&path, "{not json").expect("write");
        let store = SessionStore::new(&path);

        let (state, outcome) = store.load("production");
        assert!(matches!(outcome, LoadOutcome::Discarded(_)));
        assert_eq!(state, ConfigurationState::new("production"));
    }

    #[test]
    fn unknown_version_is_discarded() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("saved_settings.json");
        fs::write(&path, r#"{"version": 99, "state": {}}"#).expect("write");
        let store = SessionStore::new(&path);

        let (_, outcome) = store.load("production");
        match outcome {
            LoadOutcome::Discarded(reason) => assert!(reason.contains("unsupported session version 99")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn save_leaves_no_temp_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("saved_settings.json");
        SessionStore::new(&path)
            .save(&ConfigurationState::new("production"))
            .expect("save");
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
        let contents = fs::read_to_string(&path).expect("read");
        assert!(contents.starts_with("{\n  \"version\": 1,"));
        assert!(contents.ends_with("}\n"));
    }
}
