//! Preparing phase: fetch the configuration document and fill it in from the request.
//!
//! Every failure here is a [`DeployError::Precondition`]; nothing in this module is retried.

use crate::document::{DeploymentDocument, Secret};
use crate::error::DeployError;
use crate::request::{AuthMode, DeploymentRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Name of the cloud plugin whose spec carries project, zone and auth settings.
pub const GCP_PLUGIN_NAME: &str = "gcp";
/// Plugin kind used when the plugin has to be added.
pub const GCP_PLUGIN_KIND: &str = "KfGcpPlugin";
/// Secret holding the caller's access token.
pub const ACCESS_TOKEN_SECRET: &str = "accessToken";
/// Secret holding the basic-auth password.
pub const BASIC_AUTH_PASSWORD_SECRET: &str = "password";
/// Secret holding the IAP OAuth client secret.
pub const IAP_CLIENT_SECRET: &str = "CLIENT_SECRET";
/// Application that reports anonymous usage; removed unless the caller opts in.
pub const USAGE_REPORTING_APPLICATION: &str = "spartakus";

/// Retrieves raw configuration bytes for a locator.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, DeployError>;
}

/// Fetches `http(s)://` locators over HTTP (status 200 required) and reads anything else,
/// including `file://` URLs, from the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct DefaultConfigSource {
    #[cfg(feature = "http")]
    client: reqwest::Client,
}

impl DefaultConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(feature = "http")]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    #[cfg(feature = "http")]
    async fn fetch_http(&self, locator: &str) -> Result<Vec<u8>, DeployError> {
        let failed = |e: &dyn std::fmt::Display| {
            DeployError::precondition(format!("failed fetching file {}: {}", locator, e))
        };
        let response = self.client.get(locator).send().await.map_err(|e| failed(&e))?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(failed(&format!("status {}", response.status())));
        }
        let body = response.bytes().await.map_err(|e| {
            DeployError::precondition(format!("could not read from config file {}: {}", locator, e))
        })?;
        Ok(body.to_vec())
    }

    #[cfg(not(feature = "http"))]
    async fn fetch_http(&self, locator: &str) -> Result<Vec<u8>, DeployError> {
        Err(DeployError::precondition(format!(
            "failed fetching file {}: http support is disabled",
            locator
        )))
    }
}

#[async_trait]
impl ConfigSource for DefaultConfigSource {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, DeployError> {
        if locator.starts_with("http://") || locator.starts_with("https://") {
            return self.fetch_http(locator).await;
        }
        let path = locator.strip_prefix("file://").unwrap_or(locator);
        tokio::fs::read(path).await.map_err(|e| {
            DeployError::precondition(format!("could not read from config file {}: {}", locator, e))
        })
    }
}

/// In-memory source returning the same bytes for every locator. Counts fetches.
#[derive(Debug, Default)]
pub struct StaticConfigSource {
    body: Vec<u8>,
    fetches: AtomicUsize,
}

impl StaticConfigSource {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self { body: body.into(), fetches: AtomicUsize::new(0) }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    async fn fetch(&self, _locator: &str) -> Result<Vec<u8>, DeployError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.body.clone())
    }
}

/// Parse a configuration document. YAML is a superset of JSON, so both are accepted.
pub fn parse_document(bytes: &[u8]) -> Result<DeploymentDocument, DeployError> {
    serde_yaml::from_slice(bytes)
        .map_err(|e| DeployError::precondition(format!("could not parse config file: {}", e)))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretRef {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<SecretRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Iap {
    #[serde(rename = "oAuthClientId")]
    pub oauth_client_id: String,
    #[serde(rename = "oAuthClientSecret", default, skip_serializing_if = "Option::is_none")]
    pub oauth_client_secret: Option<SecretRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<BasicAuth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iap: Option<Iap>,
}

/// Fields of the cloud plugin spec the client sets. Other fields pass through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcpPluginSpec {
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub skip_init_project: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<PluginAuth>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Fill a parsed document in from the request using the already resolved auth mode.
pub fn prepare_document(
    mut doc: DeploymentDocument,
    req: &DeploymentRequest,
    auth: &AuthMode,
) -> Result<DeploymentDocument, DeployError> {
    doc.set_name(req.name.clone());
    doc.set_secret(Secret::literal(ACCESS_TOKEN_SECRET, req.token.expose()));

    let mut plugin: GcpPluginSpec = doc.plugin_spec(GCP_PLUGIN_NAME).map_err(|e| {
        tracing::error!(error = %e, "failed to load plugin spec");
        DeployError::precondition(e)
    })?;
    plugin.project = req.project.clone();
    plugin.zone = req.zone.clone();
    plugin.email = req.email.clone();
    plugin.skip_init_project = req.skip_init_project;

    match auth {
        AuthMode::BasicAuth { username, password } => {
            plugin.auth = Some(PluginAuth {
                basic_auth: Some(BasicAuth {
                    username: username.clone(),
                    password: Some(SecretRef { name: BASIC_AUTH_PASSWORD_SECRET.to_string() }),
                }),
                iap: None,
            });
            doc.set_secret(Secret::literal(BASIC_AUTH_PASSWORD_SECRET, password.expose()));
        }
        AuthMode::Iap { client_id, client_secret } => {
            plugin.auth = Some(PluginAuth {
                basic_auth: None,
                iap: Some(Iap {
                    oauth_client_id: client_id.clone(),
                    oauth_client_secret: Some(SecretRef { name: IAP_CLIENT_SECRET.to_string() }),
                }),
            });
            doc.set_secret(Secret::literal(IAP_CLIENT_SECRET, client_secret.expose()));
        }
    }

    doc.set_plugin_spec(GCP_PLUGIN_NAME, GCP_PLUGIN_KIND, &plugin)
        .map_err(DeployError::precondition)?;

    if !req.share_anonymous_usage && doc.delete_application(USAGE_REPORTING_APPLICATION) {
        tracing::debug!(application = USAGE_REPORTING_APPLICATION, "removed usage reporting");
    }
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CONFIG: &str = r#"
apiVersion: kfdef.apps.kubeflow.org/v1beta1
kind: KfDef
metadata:
  name: template
spec:
  applications:
  - name: istio
  - name: spartakus
  plugins:
  - kind: KfGcpPlugin
    metadata:
      name: gcp
    spec:
      createPipelinePersistentStorage: true
  secrets:
  - name: accessToken
    secretSource:
      literalSource:
        value: stale
"#;

    fn request() -> DeploymentRequest {
        let mut req = DeploymentRequest::new("demo", "app.yaml").with_basic_auth("admin", "pw");
        req.project = "my-project".into();
        req.zone = "us-east1-d".into();
        req.email = "owner@example.com".into();
        req.token = "tok".into();
        req
    }

    fn prepare(req: &DeploymentRequest) -> Result<DeploymentDocument, DeployError> {
        let auth = req.auth_mode()?;
        prepare_document(parse_document(CONFIG.as_bytes())?, req, &auth)
    }

    #[test]
    fn fills_name_token_and_plugin_fields() {
        let doc = prepare(&request()).unwrap();
        assert_eq!(doc.name(), "demo");
        assert_eq!(doc.secret(ACCESS_TOKEN_SECRET).and_then(Secret::literal_value), Some("tok"));
        assert_eq!(doc.spec.secrets.iter().filter(|s| s.name == ACCESS_TOKEN_SECRET).count(), 1);

        let plugin: GcpPluginSpec = doc.plugin_spec(GCP_PLUGIN_NAME).unwrap();
        assert_eq!(plugin.project, "my-project");
        assert_eq!(plugin.zone, "us-east1-d");
        assert_eq!(plugin.email, "owner@example.com");
        assert_eq!(plugin.extra.get("createPipelinePersistentStorage"), Some(&json!(true)));
    }

    #[test]
    fn basic_auth_password_goes_to_a_secret() {
        let doc = prepare(&request()).unwrap();
        let plugin: GcpPluginSpec = doc.plugin_spec(GCP_PLUGIN_NAME).unwrap();
        let auth = plugin.auth.unwrap();
        assert!(auth.iap.is_none());
        let basic = auth.basic_auth.unwrap();
        assert_eq!(basic.username, "admin");
        assert_eq!(basic.password.unwrap().name, BASIC_AUTH_PASSWORD_SECRET);
        assert_eq!(
            doc.secret(BASIC_AUTH_PASSWORD_SECRET).and_then(Secret::literal_value),
            Some("pw")
        );
    }

    #[test]
    fn iap_client_secret_goes_to_a_secret() {
        let mut req = request();
        req.endpoint_config.basic_auth = None;
        let req = req.with_iap("client-id", "client-secret");
        let doc = prepare(&req).unwrap();

        let plugin: GcpPluginSpec = doc.plugin_spec(GCP_PLUGIN_NAME).unwrap();
        let iap = plugin.auth.and_then(|a| a.iap).unwrap();
        assert_eq!(iap.oauth_client_id, "client-id");
        assert_eq!(
            doc.secret(IAP_CLIENT_SECRET).and_then(Secret::literal_value),
            Some("client-secret")
        );
        assert!(doc.secret(BASIC_AUTH_PASSWORD_SECRET).is_none());
    }

    #[test]
    fn usage_reporting_removed_unless_shared() {
        let doc = prepare(&request()).unwrap();
        assert!(!doc.has_application(USAGE_REPORTING_APPLICATION));
        assert!(!serde_json::to_string(&doc).unwrap().contains(USAGE_REPORTING_APPLICATION));

        let mut req = request();
        req.share_anonymous_usage = true;
        assert!(prepare(&req).unwrap().has_application(USAGE_REPORTING_APPLICATION));
    }

    #[test]
    fn missing_plugin_is_a_precondition_failure() {
        let doc = DeploymentDocument::new("v1", "KfDef");
        let req = request();
        let auth = req.auth_mode().unwrap();
        assert!(matches!(prepare_document(doc, &req, &auth), Err(DeployError::Precondition(_))));
    }

    #[test]
    fn malformed_document_is_a_precondition_failure() {
        let err = parse_document(b"kind: [unterminated").unwrap_err();
        assert!(matches!(err, DeployError::Precondition(_)));
        assert!(matches!(parse_document(b"just a string"), Err(DeployError::Precondition(_))));
    }

    #[test]
    fn json_documents_parse_too() {
        let doc = parse_document(br#"{"apiVersion":"v1","kind":"KfDef","metadata":{"name":"x"}}"#)
            .unwrap();
        assert_eq!(doc.name(), "x");
    }

    #[tokio::test]
    async fn default_source_reads_files() {
        let name = format!("kfdeploy-prepare-{}.yaml", std::process::id());
        let path = std::env::temp_dir().join(name);
        tokio::fs::write(&path, CONFIG).await.unwrap();

        let source = DefaultConfigSource::new();
        let plain = source.fetch(path.to_str().unwrap()).await.unwrap();
        let url = format!("file://{}", path.display());
        let via_url = source.fetch(&url).await.unwrap();
        assert_eq!(plain, via_url);
        assert_eq!(plain, CONFIG.as_bytes());

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn default_source_missing_file_is_a_precondition_failure() {
        let source = DefaultConfigSource::new();
        let err = source.fetch("/nonexistent/kfdeploy/app.yaml").await.unwrap_err();
        assert!(matches!(err, DeployError::Precondition(ref m) if m.contains("app.yaml")));
    }
}
