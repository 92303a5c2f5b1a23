#![allow(dead_code)]

use kfdeploy::{
    Backoff, CallError, Condition, DeployError, DeploymentDocument, DeploymentRequest,
    RetryPolicy, Sleeper,
};
use futures::future::Ready;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;

pub const CONFIG: &str = r#"
apiVersion: kfdef.apps.kubeflow.org/v1beta1
kind: KfDef
metadata:
  name: template
  namespace: kubeflow
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
"#;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn request() -> DeploymentRequest {
    let mut req = DeploymentRequest::new("demo", "https://example.com/app.yaml")
        .with_iap("client-id", "client-secret");
    req.project = "my-project".into();
    req.zone = "us-east1-d".into();
    req.email = "owner@example.com".into();
    req.token = "token".into();
    req
}

/// 3s initial delay growing x1.5 up to 60s, retrying what the orchestrator retries.
pub fn policy(sleeper: impl Sleeper + 'static) -> RetryPolicy<DeployError> {
    let backoff = Backoff::exponential(Duration::from_secs(3))
        .with_multiplier(1.5)
        .and_then(|b| b.with_max(Duration::from_secs(60)))
        .expect("backoff");
    RetryPolicy::builder()
        .backoff(backoff)
        .should_retry(DeployError::is_retryable)
        .with_sleeper(sleeper)
        .build()
        .expect("policy")
}

pub fn healthy() -> Vec<Condition> {
    vec![Condition::new("Available", "all components ready")]
}

pub fn degraded(message: &str) -> Vec<Condition> {
    vec![Condition::new("Degraded", message)]
}

/// What a scripted endpoint does with one request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Return the request document unchanged.
    Echo,
    /// Return the request document with these status conditions.
    Conditions(Vec<Condition>),
    Fail(CallError),
}

/// Endpoint double replaying a queue of replies, then a fallback for every later call.
#[derive(Clone)]
pub struct Script {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    fallback: Reply,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<DeploymentDocument>>>,
}

impl Script {
    pub fn new(replies: Vec<Reply>, fallback: Reply) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            fallback,
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn always(reply: Reply) -> Self {
        Self::new(Vec::new(), reply)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<DeploymentDocument> {
        self.seen.lock().unwrap().clone()
    }

    fn reply(&self, mut doc: DeploymentDocument) -> Result<DeploymentDocument, CallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(doc.clone());
        let next = self.replies.lock().unwrap().pop_front();
        match next.unwrap_or_else(|| self.fallback.clone()) {
            Reply::Echo => Ok(doc),
            Reply::Conditions(conditions) => {
                doc.status.conditions = conditions;
                Ok(doc)
            }
            Reply::Fail(err) => Err(err),
        }
    }
}

impl Service<DeploymentDocument> for Script {
    type Response = DeploymentDocument;
    type Error = CallError;
    type Future = Ready<Result<DeploymentDocument, CallError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, doc: DeploymentDocument) -> Self::Future {
        futures::future::ready(self.reply(doc))
    }
}
