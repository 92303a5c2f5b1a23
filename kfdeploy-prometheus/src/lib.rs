//! Prometheus metrics sink for `kfdeploy`.
//! Bring your own `prometheus::Registry`; deployment metrics are registered into it.

use kfdeploy::telemetry::{DeployEvent, TelemetrySink};
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::convert::Infallible;
use std::future::{ready, Ready};
use std::sync::Arc;
use std::task::{Context, Poll};

/// Records deployment outcomes, latencies and completions.
///
/// | metric                          | kind      | source                                  |
/// |---------------------------------|-----------|-----------------------------------------|
/// | `deploy_requests_total{status}` | counter   | every outcome, labelled `OK`/`INTERNAL` |
/// | `deployment_latency_seconds`    | histogram | duration of every completion            |
/// | `deployments_done_raw_total`    | counter   | completions outside the prober project  |
/// | `deployments_done_user_total`   | counter   | completions outside the prober project  |
#[derive(Clone, Debug)]
pub struct PrometheusSink {
    registry: Arc<Registry>,
    requests: IntCounterVec,
    latency: Histogram,
    done_raw: IntCounter,
    done_user: IntCounter,
}

impl PrometheusSink {
    /// Create a sink and register its metrics into the provided registry.
    ///
    /// # Errors
    /// Returns an error if a metric cannot be registered (e.g. name conflict).
    pub fn new<R: Into<Arc<Registry>>>(registry: R) -> Result<Self, prometheus::Error> {
        let registry = registry.into();
        let requests = IntCounterVec::new(
            Opts::new("deploy_requests_total", "Number of deployment requests by terminal status"),
            &["status"],
        )?;
        let latency = Histogram::with_opts(HistogramOpts::new(
            "deployment_latency_seconds",
            "Time from request start until the deployment reported healthy",
        ))?;
        let done_raw = IntCounter::new(
            "deployments_done_raw_total",
            "Number of successful deployments excluding the prober project",
        )?;
        let done_user = IntCounter::new(
            "deployments_done_user_total",
            "Number of successful user deployments",
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(latency.clone()))?;
        registry.register(Box::new(done_raw.clone()))?;
        registry.register(Box::new(done_user.clone()))?;
        Ok(Self { registry, requests, latency, done_raw, done_user })
    }

    /// Expose the registry for HTTP scraping.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl tower_service::Service<DeployEvent> for PrometheusSink {
    type Response = ();
    type Error = Infallible;
    type Future = Ready<Result<(), Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: DeployEvent) -> Self::Future {
        match event {
            DeployEvent::Outcome { cause, .. } => {
                self.requests.with_label_values(&[cause.label()]).inc();
            }
            DeployEvent::Completed { duration, prober } => {
                self.latency.observe(duration.as_secs_f64());
                if prober {
                    tracing::trace!("prober deployment excluded from completion counts");
                } else {
                    self.done_raw.inc();
                    self.done_user.inc();
                }
            }
        }
        ready(Ok(()))
    }
}

impl TelemetrySink for PrometheusSink {
    type SinkError = Infallible;
}
