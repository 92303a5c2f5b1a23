//! Deployment orchestrator.
//!
//! [`DeploymentClient::create_deployment`] drives one deployment through
//! `Preparing → Creating → AwaitingStatus` and ends in `Succeeded`, `Failed` or `TimedOut`:
//!
//! - **Preparing** resolves the auth mode, fetches and fills in the configuration document.
//!   Failures are preconditions and are never retried.
//! - **Creating** submits the document through the `create` endpoint inside a retry loop.
//! - **AwaitingStatus** polls `getLatest` inside a second, fresh retry loop until the first
//!   status condition is present and not degraded.
//!
//! Both endpoints sit behind one shared rate limiter. Every call emits one
//! [`DeployEvent::Outcome`]; successful calls also emit [`DeployEvent::Completed`].
//!
//! ```no_run
//! use kfdeploy::{CallContext, ClientConfig, DeploymentClient, DeploymentRequest};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = DeploymentClient::connect(&ClientConfig::new("deploy.example.com"))?;
//! let request = DeploymentRequest::new("demo", "https://example.com/app.yaml")
//!     .with_iap("client-id", "client-secret");
//! let ctx = CallContext::with_timeout(Duration::from_secs(20 * 60));
//! let deployed = client.create_deployment(&ctx, &request).await?;
//! println!("{} is up", deployed.name());
//! # Ok(())
//! # }
//! ```

use crate::config::{ClientConfig, DEFAULT_PROBER_PROJECT};
use crate::context::CallContext;
use crate::document::DeploymentDocument;
use crate::error::{CallError, ConfigError, DeployError};
use crate::phase::DeployPhase;
use crate::prepare::{parse_document, prepare_document, ConfigSource, DefaultConfigSource};
use crate::rate_limit::{RateLimitLayer, RateLimiter};
use crate::request::DeploymentRequest;
use crate::retry::RetryPolicy;
use crate::telemetry::{emit_best_effort, DeployEvent, LogSink, OutcomeCause, TelemetrySink};
use crate::transport::DocumentEndpoint;
use std::sync::Arc;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service, ServiceExt};
use tracing::Instrument;

/// Resilient client for the remote deployment service.
#[derive(Clone)]
pub struct DeploymentClient<S = LogSink> {
    create: DocumentEndpoint,
    get: DocumentEndpoint,
    source: Arc<dyn ConfigSource>,
    policy: RetryPolicy<DeployError>,
    sink: S,
    prober_project: String,
}

impl<S> std::fmt::Debug for DeploymentClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentClient")
            .field("policy", &self.policy)
            .field("prober_project", &self.prober_project)
            .finish_non_exhaustive()
    }
}

impl DeploymentClient<LogSink> {
    pub fn builder() -> DeploymentClientBuilder<LogSink> {
        DeploymentClientBuilder::new()
    }

    /// HTTP client for `config.instance`, with limiter, retry policy and prober project taken
    /// from `config`.
    #[cfg(feature = "http")]
    pub fn connect(config: &ClientConfig) -> Result<Self, ConfigError> {
        use crate::transport::{HttpEndpoint, CREATE_PATH, GET_PATH};

        config.validate()?;
        let http = reqwest::Client::builder().timeout(config.request_timeout()).build()?;
        let create: HttpEndpoint<DeploymentDocument> =
            HttpEndpoint::at(http.clone(), &config.instance, CREATE_PATH);
        let get: HttpEndpoint<DeploymentDocument> =
            HttpEndpoint::at(http.clone(), &config.instance, GET_PATH);
        tracing::debug!(create = create.url(), get = get.url(), "deployment endpoints configured");

        Self::builder()
            .endpoints(create, get)
            .rate_limiter(Arc::new(config.token_bucket()))
            .retry_policy(config.retry_policy()?)
            .config_source(DefaultConfigSource::with_client(http))
            .prober_project(config.prober_project.clone())
            .build()
    }
}

impl<S> DeploymentClient<S>
where
    S: TelemetrySink + Sync,
    S::Future: Send + 'static,
{
    pub fn retry_policy(&self) -> &RetryPolicy<DeployError> {
        &self.policy
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Create a deployment and wait until it reports a healthy condition.
    ///
    /// Returns the latest document on success. Terminal errors are returned unwrapped except
    /// when a retry loop runs out of time or is cancelled, in which case the last failure is
    /// wrapped in [`DeployError::DeadlineExceeded`] or [`DeployError::Cancelled`].
    pub async fn create_deployment(
        &self,
        ctx: &CallContext,
        req: &DeploymentRequest,
    ) -> Result<DeploymentDocument, DeployError> {
        let span = tracing::info_span!(
            "create_deployment",
            deployment = %req.name,
            project = %req.project,
        );
        let mut phase = DeployPhase::Preparing;
        let result = self.drive(ctx, req, &mut phase).instrument(span).await;

        let terminal = match &result {
            Ok(_) => DeployPhase::Succeeded,
            Err(e) if e.is_deadline_exceeded() => DeployPhase::TimedOut,
            Err(_) => DeployPhase::Failed,
        };
        match &result {
            Ok(_) => tracing::info!(
                deployment = %req.name,
                elapsed = ?ctx.elapsed(),
                "deployment succeeded"
            ),
            Err(e) => tracing::error!(
                deployment = %req.name,
                phase = %phase,
                outcome = %terminal,
                error = %e,
                "deployment failed"
            ),
        }

        self.record(ctx, req, terminal).await;
        result
    }

    async fn drive(
        &self,
        ctx: &CallContext,
        req: &DeploymentRequest,
        phase: &mut DeployPhase,
    ) -> Result<DeploymentDocument, DeployError> {
        let auth = req.auth_mode()?;
        let raw = self.source.fetch(&req.config_file).await?;
        let doc = prepare_document(parse_document(&raw)?, req, &auth)?;
        tracing::debug!(auth = auth.name(), "deployment document prepared");

        *phase = DeployPhase::Creating;
        let created = self.submit(ctx, doc).await?;
        tracing::info!("deployment created; awaiting status");

        *phase = DeployPhase::AwaitingStatus;
        self.await_status(ctx, created).await
    }

    /// Submit a prepared document through `create`, retrying transient failures.
    pub async fn submit(
        &self,
        ctx: &CallContext,
        doc: DeploymentDocument,
    ) -> Result<DeploymentDocument, DeployError> {
        self.policy
            .execute(ctx, || call(self.create.clone(), doc.clone()))
            .await
            .map_err(DeployError::from)
    }

    /// Poll `getLatest` with the created document until its first condition is present and
    /// not degraded. Runs its own retry loop with a freshly computed budget.
    pub async fn await_status(
        &self,
        ctx: &CallContext,
        created: DeploymentDocument,
    ) -> Result<DeploymentDocument, DeployError> {
        self.policy
            .execute(ctx, || {
                let poll = call(self.get.clone(), created.clone());
                async move { check_conditions(poll.await?) }
            })
            .await
            .map_err(DeployError::from)
    }

    /// Fetch the latest version of a document, retrying transient failures. No status check.
    pub async fn get_latest(
        &self,
        ctx: &CallContext,
        doc: &DeploymentDocument,
    ) -> Result<DeploymentDocument, DeployError> {
        self.policy
            .execute(ctx, || call(self.get.clone(), doc.clone()))
            .await
            .map_err(DeployError::from)
    }

    async fn record(&self, ctx: &CallContext, req: &DeploymentRequest, terminal: DeployPhase) {
        let cause = match terminal {
            DeployPhase::Succeeded => OutcomeCause::Ok,
            _ => OutcomeCause::Internal,
        };
        emit_best_effort(self.sink.clone(), DeployEvent::Outcome { cause, phase: terminal }).await;

        if terminal == DeployPhase::Succeeded {
            let prober = req.project == self.prober_project;
            let event = DeployEvent::Completed { duration: ctx.elapsed(), prober };
            emit_best_effort(self.sink.clone(), event).await;
        }
    }
}

async fn call(
    endpoint: DocumentEndpoint,
    doc: DeploymentDocument,
) -> Result<DeploymentDocument, DeployError> {
    endpoint.oneshot(doc).await.map_err(DeployError::from)
}

/// Decide whether a polled document is ready: no conditions yet is retryable, a degraded first
/// condition is permanent.
pub fn check_conditions(doc: DeploymentDocument) -> Result<DeploymentDocument, DeployError> {
    match doc.first_condition() {
        None => Err(DeployError::NotReady),
        Some(condition) if condition.is_degraded() => {
            Err(DeployError::Degraded(condition.message.clone()))
        }
        Some(_) => Ok(doc),
    }
}

/// Builder for [`DeploymentClient`].
pub struct DeploymentClientBuilder<S = LogSink> {
    create: Option<DocumentEndpoint>,
    get: Option<DocumentEndpoint>,
    limiter: Option<Arc<dyn RateLimiter>>,
    source: Option<Arc<dyn ConfigSource>>,
    policy: Option<RetryPolicy<DeployError>>,
    sink: S,
    prober_project: String,
}

impl DeploymentClientBuilder<LogSink> {
    pub fn new() -> Self {
        Self {
            create: None,
            get: None,
            limiter: None,
            source: None,
            policy: None,
            sink: LogSink,
            prober_project: DEFAULT_PROBER_PROJECT.to_owned(),
        }
    }
}

impl Default for DeploymentClientBuilder<LogSink> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> DeploymentClientBuilder<S> {
    /// The `create` and `getLatest` endpoints. The shared rate limiter is layered on at build.
    pub fn endpoints<C, G>(mut self, create: C, get: G) -> Self
    where
        C: Service<DeploymentDocument, Response = DeploymentDocument, Error = CallError>
            + Clone
            + Send
            + Sync
            + 'static,
        C::Future: Send + 'static,
        G: Service<DeploymentDocument, Response = DeploymentDocument, Error = CallError>
            + Clone
            + Send
            + Sync
            + 'static,
        G::Future: Send + 'static,
    {
        self.create = Some(BoxCloneSyncService::new(create));
        self.get = Some(BoxCloneSyncService::new(get));
        self
    }

    /// Limiter shared by both endpoints. Pass the same `Arc` to several clients to share one
    /// budget across them. Defaults to one token per second with a burst of 100.
    pub fn rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn config_source<C: ConfigSource + 'static>(mut self, source: C) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn shared_config_source(mut self, source: Arc<dyn ConfigSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy<DeployError>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn prober_project(mut self, project: impl Into<String>) -> Self {
        self.prober_project = project.into();
        self
    }

    pub fn sink<T>(self, sink: T) -> DeploymentClientBuilder<T>
    where
        T: TelemetrySink,
    {
        DeploymentClientBuilder {
            create: self.create,
            get: self.get,
            limiter: self.limiter,
            source: self.source,
            policy: self.policy,
            sink,
            prober_project: self.prober_project,
        }
    }

    pub fn build(self) -> Result<DeploymentClient<S>, ConfigError>
    where
        S: TelemetrySink,
    {
        let create = self.create.ok_or(ConfigError::Missing("create endpoint"))?;
        let get = self.get.ok_or(ConfigError::Missing("get endpoint"))?;
        let defaults = ClientConfig::default();
        let limiter = match self.limiter {
            Some(limiter) => limiter,
            None => Arc::new(defaults.token_bucket()) as Arc<dyn RateLimiter>,
        };
        let policy = match self.policy {
            Some(policy) => policy,
            None => defaults.retry_policy()?,
        };
        let source = self.source.unwrap_or_else(|| Arc::new(DefaultConfigSource::new()));

        let layer = RateLimitLayer::shared(limiter);
        Ok(DeploymentClient {
            create: BoxCloneSyncService::new(layer.layer(create)),
            get: BoxCloneSyncService::new(layer.layer(get)),
            source,
            policy,
            sink: self.sink,
            prober_project: self.prober_project,
        })
    }
}
