use crate::error::{DemoError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Configuration keys
// ---------------------------------------------------------------------------

pub const COSMOS_ENDPOINT_KEY: &str = "Connection:AzureCosmosDB:Endpoint";
pub const COSMOS_DATABASE_KEY: &str = "Connection:AzureCosmosDB:DatabaseName";
pub const COSMOS_CONTAINER_KEY: &str = "Connection:AzureCosmosDB:ContainerName";
pub const OPENAI_ENDPOINT_KEY: &str = "Connection:AzureOpenAI:Endpoint";
pub const OPENAI_DEPLOYMENT_KEY: &str = "Connection:AzureOpenAI:DeploymentName";

/// Every key the demo reads, in the order the orchestrator checks them.
pub const REQUIRED_KEYS: [&str; 5] = [
    COSMOS_ENDPOINT_KEY,
    COSMOS_DATABASE_KEY,
    COSMOS_CONTAINER_KEY,
    OPENAI_ENDPOINT_KEY,
    OPENAI_DEPLOYMENT_KEY,
];

/// Separator used by environment variables in place of `:`.
pub const ENV_SEPARATOR: &str = "__";

pub const DEFAULT_ENVIRONMENT: &str = "Production";

// ---------------------------------------------------------------------------
// ConfigMap: flat, case-insensitive key/value configuration
// ---------------------------------------------------------------------------

/// Flattened configuration: colon-separated paths mapped to string values.
///
/// Keys are compared case-insensitively. Each `add_*` call layers on top of
/// what is already present, so later sources win.
#[derive(Debug, Clone, Default)]
pub struct ConfigMap {
    // lowercased key -> (original key, value)
    entries: BTreeMap<String, (String, String)>,
}

impl ConfigMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.entries
            .insert(key.to_ascii_lowercase(), (key, value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(key, value)` pairs using the casing of the source that set them last.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Layer a settings document (JSON or YAML) on top of the current entries.
    pub fn add_document(&mut self, source: &str) -> std::result::Result<(), serde_yaml::Error> {
        let value: serde_yaml::Value = serde_yaml::from_str(source)?;
        self.flatten_into("", &value);
        Ok(())
    }

    /// Layer a settings file. A missing file is skipped; an unreadable or
    /// malformed one is an error naming the path.
    pub fn add_file(&mut self, path: &Path) -> Result<bool> {
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(DemoError::SettingsFile {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })
            }
        };
        self.add_document(&source)
            .map_err(|e| DemoError::SettingsFile {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(true)
    }

    /// Layer environment variables. `Connection__AzureOpenAI__Endpoint`
    /// becomes `Connection:AzureOpenAI:Endpoint`.
    pub fn add_env_vars<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in vars {
            let key = key.as_ref();
            if key.is_empty() {
                continue;
            }
            self.set(key.replace(ENV_SEPARATOR, ":"), value);
        }
    }

    fn flatten_into(&mut self, prefix: &str, value: &serde_yaml::Value) {
        use serde_yaml::Value;

        let join = |segment: &str| {
            if prefix.is_empty() {
                segment.to_string()
            } else {
                format!("{prefix}:{segment}")
            }
        };

        match value {
            // A bare scalar document (or an empty file) has no key to store.
            Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null
                if prefix.is_empty() => {}
            Value::Mapping(map) => {
                for (k, v) in map {
                    let segment = match k {
                        Value::String(s) => s.clone(),
                        Value::Number(n) => n.to_string(),
                        Value::Bool(b) => b.to_string(),
                        _ => continue,
                    };
                    self.flatten_into(&join(&segment), v);
                }
            }
            Value::Sequence(items) => {
                for (i, v) in items.iter().enumerate() {
                    self.flatten_into(&join(&i.to_string()), v);
                }
            }
            Value::String(s) => self.set(prefix, s.clone()),
            Value::Number(n) => self.set(prefix, n.to_string()),
            Value::Bool(b) => self.set(prefix, b.to_string()),
            Value::Null => self.set(prefix, String::new()),
            Value::Tagged(tagged) => self.flatten_into(prefix, &tagged.value),
        }
    }
}

// ---------------------------------------------------------------------------
// Settings sources
// ---------------------------------------------------------------------------

/// Where the host looks for configuration.
#[derive(Debug, Clone)]
pub struct SettingsSources {
    pub content_root: PathBuf,
    pub environment: String,
}

impl SettingsSources {
    pub fn new(content_root: impl Into<PathBuf>, environment: impl Into<String>) -> Self {
        Self {
            content_root: content_root.into(),
            environment: environment.into(),
        }
    }

    pub fn base_file(&self) -> PathBuf {
        self.content_root.join("appsettings.json")
    }

    pub fn environment_file(&self) -> PathBuf {
        self.content_root
            .join(format!("appsettings.{}.json", self.environment))
    }

    /// Build the layered configuration: base file, environment file, then
    /// the given environment variables.
    pub fn load<I, K, V>(&self, env_vars: I) -> Result<ConfigMap>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = ConfigMap::new();
        for path in [self.base_file(), self.environment_file()] {
            if config.add_file(&path)? {
                tracing::debug!(path = %path.display(), "loaded settings file");
            }
        }
        config.add_env_vars(env_vars);
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// ConnectionSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AzureCosmosDb {
    pub endpoint: Option<String>,
    pub database_name: Option<String>,
    pub container_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AzureOpenAi {
    pub endpoint: Option<String>,
    pub deployment_name: Option<String>,
}

/// The `Connection` configuration section. Bound once at startup and never
/// mutated afterwards; missing values are reported when the demo reads them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionSettings {
    #[serde(rename = "AzureCosmosDB")]
    pub azure_cosmos_db: AzureCosmosDb,
    #[serde(rename = "AzureOpenAI")]
    pub azure_open_ai: AzureOpenAi,
}

fn present(config: &ConfigMap, key: &str) -> Option<String> {
    config
        .get(key)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn require<'a>(value: &'a Option<String>, key: &'static str, what: &'static str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or(DemoError::MissingSetting { key, what })
}

impl ConnectionSettings {
    pub fn bind(config: &ConfigMap) -> Self {
        Self {
            azure_cosmos_db: AzureCosmosDb {
                endpoint: present(config, COSMOS_ENDPOINT_KEY),
                database_name: present(config, COSMOS_DATABASE_KEY),
                container_name: present(config, COSMOS_CONTAINER_KEY),
            },
            azure_open_ai: AzureOpenAi {
                endpoint: present(config, OPENAI_ENDPOINT_KEY),
                deployment_name: present(config, OPENAI_DEPLOYMENT_KEY),
            },
        }
    }

    pub fn cosmos_endpoint(&self) -> Result<&str> {
        require(
            &self.azure_cosmos_db.endpoint,
            COSMOS_ENDPOINT_KEY,
            "Azure Cosmos DB for NoSQL endpoint",
        )
    }

    pub fn cosmos_database_name(&self) -> Result<&str> {
        require(
            &self.azure_cosmos_db.database_name,
            COSMOS_DATABASE_KEY,
            "Azure Cosmos DB for NoSQL database name",
        )
    }

    pub fn cosmos_container_name(&self) -> Result<&str> {
        require(
            &self.azure_cosmos_db.container_name,
            COSMOS_CONTAINER_KEY,
            "Azure Cosmos DB for NoSQL container name",
        )
    }

    pub fn openai_endpoint(&self) -> Result<&str> {
        require(
            &self.azure_open_ai.endpoint,
            OPENAI_ENDPOINT_KEY,
            "Azure OpenAI endpoint",
        )
    }

    pub fn openai_deployment_name(&self) -> Result<&str> {
        require(
            &self.azure_open_ai.deployment_name,
            OPENAI_DEPLOYMENT_KEY,
            "Azure OpenAI deployment name",
        )
    }

    /// Keys that are absent or empty, in check order.
    pub fn missing_keys(&self) -> Vec<&'static str> {
        let values = [
            &self.azure_cosmos_db.endpoint,
            &self.azure_cosmos_db.database_name,
            &self.azure_cosmos_db.container_name,
            &self.azure_open_ai.endpoint,
            &self.azure_open_ai.deployment_name,
        ];
        REQUIRED_KEYS
            .iter()
            .zip(values)
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| *k)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
