//! Inbound deployment request and auth-mode resolution.

use crate::error::DeployError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// String that never prints its contents through `Debug` or `Display`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("\"\"")
        } else {
            f.write_str("\"<redacted>\"")
        }
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicAuthCredentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: SecretString,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IapCredentials {
    #[serde(default, rename = "oAuthClientId")]
    pub oauth_client_id: String,
    #[serde(default, rename = "oAuthClientSecret")]
    pub oauth_client_secret: SecretString,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<BasicAuthCredentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iap: Option<IapCredentials>,
}

/// Everything one orchestrator call needs to know about the deployment it drives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRequest {
    pub name: String,
    /// URL or path of the configuration document.
    pub config_file: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub email: String,
    /// Long-lived access token, attached to the document as a secret.
    #[serde(default)]
    pub token: SecretString,
    #[serde(default)]
    pub skip_init_project: bool,
    #[serde(default)]
    pub share_anonymous_usage: bool,
    #[serde(default)]
    pub endpoint_config: EndpointConfig,
}

/// The single authentication mode a prepared document is configured with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    BasicAuth { username: String, password: SecretString },
    Iap { client_id: String, client_secret: SecretString },
}

impl AuthMode {
    pub fn name(&self) -> &'static str {
        match self {
            AuthMode::BasicAuth { .. } => "basic_auth",
            AuthMode::Iap { .. } => "iap",
        }
    }
}

impl DeploymentRequest {
    pub fn new(name: impl Into<String>, config_file: impl Into<String>) -> Self {
        Self { name: name.into(), config_file: config_file.into(), ..Self::default() }
    }

    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<SecretString>,
    ) -> Self {
        self.endpoint_config.basic_auth =
            Some(BasicAuthCredentials { username: username.into(), password: password.into() });
        self
    }

    pub fn with_iap(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<SecretString>,
    ) -> Self {
        self.endpoint_config.iap = Some(IapCredentials {
            oauth_client_id: client_id.into(),
            oauth_client_secret: client_secret.into(),
        });
        self
    }

    /// Resolve exactly one auth mode. Complete basic-auth credentials win over IAP; a request
    /// with neither is a precondition failure.
    pub fn auth_mode(&self) -> Result<AuthMode, DeployError> {
        if let Some(basic) = &self.endpoint_config.basic_auth {
            if !basic.username.is_empty() && !basic.password.is_empty() {
                return Ok(AuthMode::BasicAuth {
                    username: basic.username.clone(),
                    password: basic.password.clone(),
                });
            }
        }
        if let Some(iap) = &self.endpoint_config.iap {
            if !iap.oauth_client_id.is_empty() && !iap.oauth_client_secret.is_empty() {
                return Ok(AuthMode::Iap {
                    client_id: iap.oauth_client_id.clone(),
                    client_secret: iap.oauth_client_secret.clone(),
                });
            }
        }
        Err(DeployError::precondition(
            "no auth mode: provide basic auth username/password or an IAP client id/secret",
        ))
    }
}
