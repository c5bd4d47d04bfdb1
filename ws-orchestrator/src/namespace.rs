//! Per-namespace and system-wide settings consumed by the orchestrator.
//!
//! The orchestrator only reads these settings; where they live is up to the
//! [`NamespaceConfigProvider`] implementation. [`NamespaceRegistry`] keeps them
//! in memory and can be loaded from a YAML file.

use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// System config key holding the domain workspaces are served under.
pub const DOMAIN_KEY: &str = "ONEPANEL_DOMAIN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Config {
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcsConfig {
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub endpoint: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRepositoryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Config>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcs: Option<GcsConfig>,
}

impl ArtifactRepositoryConfig {
    /// Storage backend token used in manifests: `gcs` when GCS is configured, else `s3`.
    pub fn repository_type(&self) -> &'static str {
        if self.gcs.is_some() {
            "gcs"
        } else {
            "s3"
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceConfig {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub artifact_repository: ArtifactRepositoryConfig,
}

/// Process-wide settings keyed by well known constants such as [`DOMAIN_KEY`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig(pub HashMap<String, String>);

impl SystemConfig {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn domain(&self) -> Result<&str> {
        self.get(DOMAIN_KEY)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| {
                OrchestratorError::Config(format!("system config is missing {}", DOMAIN_KEY))
            })
    }
}

#[async_trait]
pub trait NamespaceConfigProvider: Send + Sync {
    /// Namespaces the orchestrator manages, in a stable order.
    async fn list_enabled_namespaces(&self) -> Result<Vec<Namespace>>;

    async fn namespace_config(&self, namespace: &str) -> Result<NamespaceConfig>;

    async fn system_config(&self) -> Result<SystemConfig>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceEntry {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(flatten)]
    pub config: NamespaceConfig,
}

fn default_true() -> bool {
    true
}

/// In-memory provider, usually loaded from a YAML file:
///
/// ```yaml
/// system:
///   ONEPANEL_DOMAIN: example.com
/// namespaces:
///   - name: team-a
///     artifactRepository:
///       gcs: { bucket: models }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceRegistry {
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub namespaces: Vec<NamespaceEntry>,
}

impl NamespaceRegistry {
    pub fn new(system: SystemConfig) -> Self {
        Self {
            system,
            namespaces: Vec::new(),
        }
    }

    /// Registry whose system config only carries the serving domain.
    pub fn with_domain(domain: &str) -> Self {
        let mut system = HashMap::new();
        system.insert(DOMAIN_KEY.to_string(), domain.to_string());
        Self::new(SystemConfig(system))
    }

    /// Add or replace a namespace entry.
    pub fn insert(&mut self, name: &str, enabled: bool, config: NamespaceConfig) -> &mut Self {
        let entry = NamespaceEntry {
            name: name.to_string(),
            enabled,
            config,
        };

        match self.namespaces.iter_mut().find(|e| e.name == name) {
            Some(existing) => *existing = entry,
            None => self.namespaces.push(entry),
        }

        self
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml_ng::from_str(contents).map_err(|e| {
            OrchestratorError::Config(format!("invalid namespace configuration: {}", e))
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading namespace configuration from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }
}

#[async_trait]
impl NamespaceConfigProvider for NamespaceRegistry {
    async fn list_enabled_namespaces(&self) -> Result<Vec<Namespace>> {
        Ok(self
            .namespaces
            .iter()
            .filter(|e| e.enabled)
            .map(|e| Namespace {
                name: e.name.clone(),
            })
            .collect())
    }

    async fn namespace_config(&self, namespace: &str) -> Result<NamespaceConfig> {
        self.namespaces
            .iter()
            .find(|e| e.name == namespace)
            .map(|e| e.config.clone())
            .ok_or_else(|| {
                OrchestratorError::NotFound(format!("Namespace {} is not configured.", namespace))
            })
    }

    async fn system_config(&self) -> Result<SystemConfig> {
        Ok(self.system.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONFIG: &str = r#"
system:
  ONEPANEL_DOMAIN: example.com
namespaces:
  - name: team-a
    artifactRepository:
      gcs:
        bucket: models
  - name: team-b
    domain: b.example.com
    artifactRepository:
      s3:
        bucket: data
        endpoint: s3.amazonaws.com
  - name: archived
    enabled: false
"#;

    #[tokio::test]
    async fn test_load_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let registry = NamespaceRegistry::load(file.path()).unwrap();

        let system = registry.system_config().await.unwrap();
        assert_eq!(system.domain().unwrap(), "example.com");

        let enabled: Vec<_> = registry
            .list_enabled_namespaces()
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert_eq!(enabled, vec!["team-a", "team-b"]);

        let team_a = registry.namespace_config("team-a").await.unwrap();
        assert_eq!(team_a.artifact_repository.repository_type(), "gcs");
        assert_eq!(team_a.domain, None);

        let team_b = registry.namespace_config("team-b").await.unwrap();
        assert_eq!(team_b.artifact_repository.repository_type(), "s3");
        assert_eq!(team_b.domain.as_deref(), Some("b.example.com"));
    }

    #[tokio::test]
    async fn test_disabled_namespace_keeps_its_config() {
        let registry = NamespaceRegistry::from_yaml(CONFIG).unwrap();
        let archived = registry.namespace_config("archived").await.unwrap();
        assert_eq!(archived.artifact_repository.repository_type(), "s3");
    }

    #[tokio::test]
    async fn test_unknown_namespace_is_not_found() {
        let registry = NamespaceRegistry::from_yaml(CONFIG).unwrap();
        let err = registry.namespace_config("missing").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound(_)));
    }

    #[test]
    fn test_missing_domain() {
        let registry = NamespaceRegistry::from_yaml("namespaces: []").unwrap();
        assert!(matches!(
            registry.system.domain(),
            Err(OrchestratorError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let err = NamespaceRegistry::from_yaml("namespaces: {").unwrap_err();
        assert!(matches!(err, OrchestratorError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = NamespaceRegistry::load(&dir.path().join("namespaces.yaml")).unwrap_err();
        assert!(matches!(err, OrchestratorError::Io(_)));
    }

    #[test]
    fn test_insert_replaces_existing_entry() {
        let mut registry = NamespaceRegistry::with_domain("example.com");
        registry.insert("team-a", true, NamespaceConfig::default());
        registry.insert("team-a", false, NamespaceConfig::default());

        assert_eq!(registry.namespaces.len(), 1);
        assert!(!registry.namespaces[0].enabled);
    }
}
