//! Repository configuration: which manifests to validate, against which schemas.
//!
//! The configuration lives in the repository (default `.github/kubevalidator.yaml`)
//! and is read at the check suite's head commit:
//!
//! ```yaml
//! apiVersion: v1alpha1
//! kind: KubeValidatorConfig
//! spec:
//!   manifests:
//!     - glob: k8s/*.yaml
//!     - glob: deploy/**/*.yaml
//!       schemas:
//!         - name: deployment
//!           path: schemas/deployment.schema.json
//!         - name: labels
//!           schema: { type: object, required: [metadata] }
//! ```
//!
//! Resolution is all-or-nothing: every glob must compile and every schema must
//! load and compile, otherwise the caller gets a [`ConfigError`] and no
//! validation happens.

use std::sync::Arc;

use async_trait::async_trait;
use globset::{GlobBuilder, GlobMatcher};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::annotation::Annotation;
use crate::client::RepositoryClient;
use crate::error::{ClientError, ConfigError};
use crate::event::RepoRef;

/// Default location of the repository configuration file.
pub const DEFAULT_CONFIG_PATH: &str = ".github/kubevalidator.yaml";

pub const CONFIG_KIND: &str = "KubeValidatorConfig";
pub const CONFIG_API_VERSION: &str = "v1alpha1";

// ---------------------------------------------------------------------------
// Declarative model (as written in YAML)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestConfig {
    pub api_version: Option<String>,
    pub kind: String,
    pub spec: ManifestSpec,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ManifestSpec {
    #[serde(default)]
    pub manifests: Vec<ManifestEntry>,
}

/// One glob and the schemas that apply to files it matches.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ManifestEntry {
    pub glob: String,
    #[serde(default)]
    pub schemas: Vec<SchemaEntry>,
}

/// A schema reference: a repository file or an inline document.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SchemaEntry {
    pub name: String,
    pub path: Option<String>,
    pub schema: Option<serde_json::Value>,
}

impl ManifestConfig {
    /// Parse and check the configuration rules that do not need I/O.
    pub fn from_yaml(config_path: &str, text: &str) -> Result<Self, ConfigError> {
        let config: ManifestConfig =
            serde_yaml::from_str(text).map_err(|e| ConfigError::Parse {
                path: config_path.to_string(),
                message: e.to_string(),
                line: e.location().map(|loc| loc.line().max(1)),
            })?;
        config.check(config_path)?;
        Ok(config)
    }

    fn check(&self, config_path: &str) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            path: config_path.to_string(),
            reason,
        };

        if self.kind != CONFIG_KIND {
            return Err(invalid(format!(
                "kind must be {}, found '{}'",
                CONFIG_KIND, self.kind
            )));
        }
        if let Some(version) = &self.api_version {
            if version != CONFIG_API_VERSION {
                return Err(invalid(format!(
                    "unsupported apiVersion '{}' (expected {})",
                    version, CONFIG_API_VERSION
                )));
            }
        }
        if self.spec.manifests.is_empty() {
            return Err(invalid("spec.manifests must not be empty".to_string()));
        }

        for (i, entry) in self.spec.manifests.iter().enumerate() {
            if entry.glob.trim().is_empty() {
                return Err(invalid(format!("spec.manifests[{}].glob is empty", i)));
            }
            for (j, schema) in entry.schemas.iter().enumerate() {
                if schema.name.trim().is_empty() {
                    return Err(invalid(format!(
                        "spec.manifests[{}].schemas[{}].name is empty",
                        i, j
                    )));
                }
                match (&schema.path, &schema.schema) {
                    (Some(_), None) | (None, Some(_)) => {}
                    _ => {
                        return Err(invalid(format!(
                            "schema '{}' must set exactly one of path or schema",
                            schema.name
                        )))
                    }
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Resolved model
// ---------------------------------------------------------------------------

/// A loaded, compiled schema.
pub struct Schema {
    pub name: String,
    /// SHA-256 of the schema's canonical JSON; the schema's identity.
    pub digest: String,
    pub document: serde_json::Value,
    validator: jsonschema::Validator,
}

impl Schema {
    /// Compile a schema document.
    pub fn compile(name: &str, document: serde_json::Value) -> Result<Self, ConfigError> {
        let validator = jsonschema::validator_for(&document).map_err(|e| ConfigError::Schema {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            name: name.to_string(),
            digest: canonical_digest(&document),
            document,
            validator,
        })
    }

    pub fn validator(&self) -> &jsonschema::Validator {
        &self.validator
    }
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.name)
            .field("digest", &self.digest)
            .finish()
    }
}

/// Digest over the document with object keys sorted, so key order in the
/// source file does not change schema identity.
fn canonical_digest(document: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonicalize(document).to_string().as_bytes());
    hex::encode(hasher.finalize())
}

fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonicalize).collect())
        }
        other => other.clone(),
    }
}

/// A compiled manifest entry.
#[derive(Debug)]
pub struct ManifestRule {
    pub glob: String,
    matcher: GlobMatcher,
    pub schemas: Vec<Arc<Schema>>,
}

impl ManifestRule {
    pub fn new(glob: &str, schemas: Vec<Arc<Schema>>) -> Result<Self, globset::Error> {
        let matcher = GlobBuilder::new(glob)
            .literal_separator(true)
            .build()?
            .compile_matcher();
        Ok(Self {
            glob: glob.to_string(),
            matcher,
            schemas,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.matcher.is_match(path)
    }
}

/// A fully resolved configuration.
#[derive(Debug)]
pub struct Configuration {
    /// Where the configuration was read from (annotation target).
    pub source_path: String,
    /// Rules in declaration order.
    pub rules: Vec<ManifestRule>,
}

/// Output of a successful resolution.
#[derive(Debug)]
pub struct Resolution {
    pub config: Configuration,
    /// Informational annotation to include in the report.
    pub notice: Option<Annotation>,
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Produces a configuration for a repository at a commit.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn resolve(&self, repo: &RepoRef, git_ref: &str) -> Result<Resolution, ConfigError>;

    /// Path annotations about the configuration should point at.
    fn config_path(&self) -> &str;
}

/// Reads the configuration file from the repository itself, with an optional
/// service-wide default for repositories that have none.
pub struct RepositoryConfigSource {
    client: Arc<dyn RepositoryClient>,
    path: String,
    default_config: Option<String>,
}

impl RepositoryConfigSource {
    pub fn new(client: Arc<dyn RepositoryClient>) -> Self {
        Self {
            client,
            path: DEFAULT_CONFIG_PATH.to_string(),
            default_config: None,
        }
    }

    /// Read the configuration from a different repository path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// YAML used when the repository has no configuration file.
    pub fn with_default(mut self, yaml: impl Into<String>) -> Self {
        self.default_config = Some(yaml.into());
        self
    }

    async fn load_schema(
        &self,
        repo: &RepoRef,
        git_ref: &str,
        entry: &SchemaEntry,
    ) -> Result<Schema, ConfigError> {
        let document = match (&entry.path, &entry.schema) {
            (_, Some(inline)) => inline.clone(),
            (Some(path), None) => {
                let bytes = self
                    .client
                    .fetch_file_content(repo, git_ref, path)
                    .await
                    .map_err(|e| match e {
                        ClientError::NotFound { .. } => ConfigError::Schema {
                            name: entry.name.clone(),
                            reason: e.to_string(),
                        },
                        other => ConfigError::Fetch(other),
                    })?;
                // JSON schema files parse as YAML too.
                serde_yaml::from_slice::<serde_json::Value>(&bytes).map_err(|e| {
                    ConfigError::Schema {
                        name: entry.name.clone(),
                        reason: format!("{}: {}", path, e),
                    }
                })?
            }
            (None, None) => {
                return Err(ConfigError::Schema {
                    name: entry.name.clone(),
                    reason: "no path or inline schema".to_string(),
                })
            }
        };
        Schema::compile(&entry.name, document)
    }

    async fn build(
        &self,
        repo: &RepoRef,
        git_ref: &str,
        declared: &ManifestConfig,
    ) -> Result<Configuration, ConfigError> {
        let mut rules = Vec::with_capacity(declared.spec.manifests.len());
        for entry in &declared.spec.manifests {
            let mut schemas = Vec::with_capacity(entry.schemas.len());
            for schema in &entry.schemas {
                schemas.push(Arc::new(self.load_schema(repo, git_ref, schema).await?));
            }
            let rule = ManifestRule::new(&entry.glob, schemas).map_err(|e| ConfigError::Invalid {
                path: self.path.clone(),
                reason: format!("invalid glob '{}': {}", entry.glob, e),
            })?;
            rules.push(rule);
        }
        Ok(Configuration {
            source_path: self.path.clone(),
            rules,
        })
    }
}

#[async_trait]
impl ConfigSource for RepositoryConfigSource {
    async fn resolve(&self, repo: &RepoRef, git_ref: &str) -> Result<Resolution, ConfigError> {
        let (text, from_default) = match self
            .client
            .fetch_file_content(repo, git_ref, &self.path)
            .await
        {
            Ok(bytes) => {
                let text = String::from_utf8(bytes).map_err(|_| ConfigError::Parse {
                    path: self.path.clone(),
                    message: "configuration is not valid UTF-8".to_string(),
                    line: None,
                })?;
                (text, false)
            }
            Err(ClientError::NotFound { .. }) => match &self.default_config {
                Some(default) => {
                    debug!(repo = %repo, path = %self.path, "No repository configuration, using default");
                    (default.clone(), true)
                }
                None => {
                    return Err(ConfigError::Missing {
                        path: self.path.clone(),
                    })
                }
            },
            Err(e) => return Err(ConfigError::Fetch(e)),
        };

        let declared = ManifestConfig::from_yaml(&self.path, &text)?;
        let config = self.build(repo, git_ref, &declared).await?;

        let notice = if from_default {
            Some(Annotation::notice(
                &self.path,
                "",
                1,
                "Using default configuration",
                format!(
                    "{} was not found; the service default configuration was used.",
                    self.path
                ),
            ))
        } else if declared.api_version.is_none() {
            Some(Annotation::notice(
                &self.path,
                "",
                1,
                "apiVersion not set",
                format!("Assuming apiVersion {}.", CONFIG_API_VERSION),
            ))
        } else {
            None
        };

        Ok(Resolution { config, notice })
    }

    fn config_path(&self) -> &str {
        &self.path
    }
}
