use crate::domain::services::{DomainServices, SessionPolicy};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the configuration looked up inside the data directory.
pub const CONFIG_FILE_NAME: &str = "fiches.yaml";

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Where event logs, snapshots, outbox and documents live.
    /// Defaults to `~/.fiches`.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub outbox: OutboxConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub audit: AuditMirrorConfig,
    #[serde(default)]
    pub demo: DemoConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StoreConfig {
    /// Snapshot an aggregate every N events. 0 disables snapshots.
    #[serde(default = "default_snapshot_every")]
    pub snapshot_every: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_every: default_snapshot_every(),
        }
    }
}

fn default_snapshot_every() -> u64 {
    50
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct OutboxConfig {
    /// Dispatch attempts before an entry moves to the dead-letter file.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationSink {
    /// Notifications only go to the tracing log.
    #[default]
    Log,
    /// Notifications are appended to a JSONL file.
    File,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct NotificationConfig {
    #[serde(default)]
    pub sink: NotificationSink,
    /// File for the `file` sink. Defaults to `<data_dir>/notifications.jsonl`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct AuditMirrorConfig {
    /// Mirror audit records outside the event log.
    #[serde(default)]
    pub mirror: bool,
    /// Defaults to `<data_dir>/audit.jsonl`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct DemoConfig {
    /// Production deployments veto mutations by demonstration accounts.
    #[serde(default)]
    pub production: bool,
    #[serde(default)]
    pub demo_actors: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct SessionConfig {
    /// Require both contract signatures before the activity can be marked done.
    #[serde(default)]
    pub require_both_signatures: bool,
}

impl ServiceConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file as YAML: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `explicit` when given, else `<default data dir>/fiches.yaml`
    /// when it exists, else the built-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let candidate = default_data_dir()?.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "loading configuration");
            return Self::load(&candidate);
        }
        Ok(Self::default())
    }

    fn validate(&self) -> Result<()> {
        if self.outbox.max_attempts == 0 {
            anyhow::bail!("outbox.max_attempts must be at least 1");
        }

        if self.notifications.sink == NotificationSink::Log && self.notifications.path.is_some() {
            anyhow::bail!("notifications.path is only used with sink: file");
        }

        if let Some(blank) = self.demo.demo_actors.iter().position(|id| id.trim().is_empty()) {
            anyhow::bail!("demo.demo_actors[{}] must not be empty", blank);
        }

        if self.demo.production && self.demo.demo_actors.is_empty() {
            tracing::warn!("demo.production is set but no demo actors are configured");
        }

        Ok(())
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_data_dir(),
        }
    }

    pub fn logs_dir(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("logs"))
    }

    pub fn notifications_path(&self) -> Result<PathBuf> {
        match &self.notifications.path {
            Some(path) => Ok(path.clone()),
            None => Ok(self.data_dir()?.join("notifications.jsonl")),
        }
    }

    pub fn audit_path(&self) -> Result<PathBuf> {
        match &self.audit.path {
            Some(path) => Ok(path.clone()),
            None => Ok(self.data_dir()?.join("audit.jsonl")),
        }
    }

    pub fn domain_services(&self) -> DomainServices {
        DomainServices {
            session_policy: SessionPolicy {
                require_both_signatures: self.sessions.require_both_signatures,
            },
            ..DomainServices::default()
        }
    }
}

fn default_data_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".fiches"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_YAML: &str = include_str!("../fiches.yaml");

    #[test]
    fn test_default_config_validates() {
        let config = ServiceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.store.snapshot_every, 50);
        assert_eq!(config.outbox.max_attempts, 5);
        assert_eq!(config.notifications.sink, NotificationSink::Log);
    }

    #[test]
    fn test_sample_config_parses_and_validates() {
        let config: ServiceConfig = serde_yaml::from_str(SAMPLE_YAML).unwrap();
        assert!(config.validate().is_ok());
        assert!(!config.demo.production);
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
data_dir: /var/lib/fiches
store:
  snapshot_every: 10
outbox:
  max_attempts: 3
notifications:
  sink: file
  path: /var/spool/fiches/mail.jsonl
demo:
  production: true
  demo_actors: [demo-admin, demo-evs]
sessions:
  require_both_signatures: true
"#;
        let config: ServiceConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/var/lib/fiches"));
        assert_eq!(config.store.snapshot_every, 10);
        assert_eq!(config.notifications.sink, NotificationSink::File);
        assert_eq!(
            config.notifications_path().unwrap(),
            PathBuf::from("/var/spool/fiches/mail.jsonl")
        );
        assert_eq!(config.demo.demo_actors.len(), 2);
        assert!(config.domain_services().session_policy.require_both_signatures);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: ServiceConfig = serde_yaml::from_str("data_dir: /tmp/fiches\n").unwrap();
        assert_eq!(config.store.snapshot_every, 50);
        assert_eq!(config.audit_path().unwrap(), PathBuf::from("/tmp/fiches/audit.jsonl"));
    }

    #[test]
    fn test_validation_rejects_zero_attempts() {
        let config: ServiceConfig = serde_yaml::from_str("outbox:\n  max_attempts: 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_blank_demo_actor() {
        let config: ServiceConfig =
            serde_yaml::from_str("demo:\n  production: true\n  demo_actors: [\"  \"]\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_keys_fail_to_parse() {
        let result: Result<ServiceConfig, _> = serde_yaml::from_str("workflow: {}\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_reports_path_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "store: [not, a, map]\n").unwrap();

        let err = ServiceConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains(CONFIG_FILE_NAME));
    }
}
