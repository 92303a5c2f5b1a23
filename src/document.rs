//! Deployment document model.
//!
//! Only the fields the client reads or writes are typed. Everything else is kept in `extra`
//! maps so a document round-trips through the client without losing data.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Condition type marking a permanently failed deployment.
pub const CONDITION_DEGRADED: &str = "Degraded";

/// Errors from document accessors.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("plugin {0:?} not found")]
    PluginNotFound(String),
    #[error("plugin {name:?} has an invalid spec: {source}")]
    InvalidPluginSpec {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The configuration object submitted to and returned by the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentDocument {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: DeploymentSpec,
    #[serde(default, skip_serializing_if = "DeploymentStatus::is_empty")]
    pub status: DeploymentStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applications: Vec<Application>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<Plugin>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<Secret>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plugin {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub spec: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_source: Option<SecretSource>,
}

impl Secret {
    /// Secret whose value is carried inline.
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secret_source: Some(SecretSource {
                literal_source: Some(LiteralSource { value: value.into() }),
                env_source: None,
            }),
        }
    }

    /// Inline value, if this is a literal secret.
    pub fn literal_value(&self) -> Option<&str> {
        self.secret_source
            .as_ref()
            .and_then(|s| s.literal_source.as_ref())
            .map(|l| l.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub literal_source: Option<LiteralSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_source: Option<EnvSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiteralSource {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvSource {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeploymentStatus {
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.extra.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl Condition {
    pub fn new(condition_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            condition_type: condition_type.into(),
            status: "True".into(),
            reason: None,
            message: message.into(),
            last_update_time: None,
            last_transition_time: None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.condition_type == CONDITION_DEGRADED
    }
}

impl DeploymentDocument {
    pub fn new(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            metadata: ObjectMeta::default(),
            spec: DeploymentSpec::default(),
            status: DeploymentStatus::default(),
            extra: Map::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.metadata.name = name.into();
    }

    /// Insert a secret, replacing any secret with the same name.
    pub fn set_secret(&mut self, secret: Secret) {
        match self.spec.secrets.iter_mut().find(|s| s.name == secret.name) {
            Some(existing) => *existing = secret,
            None => self.spec.secrets.push(secret),
        }
    }

    pub fn secret(&self, name: &str) -> Option<&Secret> {
        self.spec.secrets.iter().find(|s| s.name == name)
    }

    pub fn has_application(&self, name: &str) -> bool {
        self.spec.applications.iter().any(|a| a.name == name)
    }

    /// Remove every application named `name`. Returns whether anything was removed.
    pub fn delete_application(&mut self, name: &str) -> bool {
        let before = self.spec.applications.len();
        self.spec.applications.retain(|a| a.name != name);
        self.spec.applications.len() != before
    }

    /// Decode the spec of the plugin named `name`.
    pub fn plugin_spec<T: DeserializeOwned>(&self, name: &str) -> Result<T, DocumentError> {
        let plugin = self
            .spec
            .plugins
            .iter()
            .find(|p| p.metadata.name == name)
            .ok_or_else(|| DocumentError::PluginNotFound(name.to_string()))?;
        let spec = if plugin.spec.is_null() {
            Value::Object(Map::new())
        } else {
            plugin.spec.clone()
        };
        serde_json::from_value(spec)
            .map_err(|source| DocumentError::InvalidPluginSpec { name: name.to_string(), source })
    }

    /// Encode `spec` into the plugin named `name`, adding the plugin if it is missing.
    pub fn set_plugin_spec<T: Serialize>(
        &mut self,
        name: &str,
        kind: &str,
        spec: &T,
    ) -> Result<(), DocumentError> {
        let value = serde_json::to_value(spec)
            .map_err(|source| DocumentError::InvalidPluginSpec { name: name.to_string(), source })?;
        match self.spec.plugins.iter_mut().find(|p| p.metadata.name == name) {
            Some(plugin) => plugin.spec = value,
            None => self.spec.plugins.push(Plugin {
                kind: kind.to_string(),
                metadata: ObjectMeta { name: name.to_string(), ..ObjectMeta::default() },
                spec: value,
            }),
        }
        Ok(())
    }

    /// First status condition, the one that decides deployment health.
    pub fn first_condition(&self) -> Option<&Condition> {
        self.status.conditions.first()
    }
}
