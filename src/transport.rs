//! Unary endpoints of the remote deployment service.
//!
//! An endpoint is a `tower::Service` that performs exactly one round trip per call and resolves
//! it through [`classify`](crate::classify::classify). Retrying and rate limiting are layered on
//! top by the client; endpoints never retry on their own.

use crate::document::DeploymentDocument;
use crate::error::CallError;
use tower::util::BoxCloneSyncService;

/// Relative path of the create method.
pub const CREATE_PATH: &str = "/kfctl/apps/v1beta1/create";
/// Relative path of the get-latest method.
pub const GET_PATH: &str = "/kfctl/apps/v1beta1/get";

/// Type-erased endpoint taking and returning a deployment document.
pub type DocumentEndpoint = BoxCloneSyncService<DeploymentDocument, DeploymentDocument, CallError>;

/// Normalize a base address: trims trailing slashes and adds `http://` when no scheme is given.
pub fn sanitize_instance(instance: &str) -> String {
    let trimmed = instance.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

/// Join a base address and a method path.
pub fn endpoint_url(instance: &str, path: &str) -> String {
    format!("{}{}", sanitize_instance(instance), path)
}

#[cfg(feature = "http")]
pub use http::HttpEndpoint;

#[cfg(feature = "http")]
mod http {
    use super::*;
    use crate::classify::classify;
    use futures::future::BoxFuture;
    use serde::de::DeserializeOwned;
    use serde::Serialize;
    use std::marker::PhantomData;
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use tower_service::Service;

    /// JSON-over-HTTP endpoint: POSTs the request body to one URL and classifies the reply.
    pub struct HttpEndpoint<Resp> {
        client: reqwest::Client,
        url: Arc<str>,
        _response: PhantomData<fn() -> Resp>,
    }

    impl<Resp> HttpEndpoint<Resp> {
        pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
            Self { client, url: Arc::from(url.into()), _response: PhantomData }
        }

        /// Endpoint for `path` under the (sanitized) base address.
        pub fn at(client: reqwest::Client, instance: &str, path: &str) -> Self {
            Self::new(client, endpoint_url(instance, path))
        }

        pub fn url(&self) -> &str {
            &self.url
        }
    }

    impl<Resp> Clone for HttpEndpoint<Resp> {
        fn clone(&self) -> Self {
            Self { client: self.client.clone(), url: self.url.clone(), _response: PhantomData }
        }
    }

    impl<Resp> std::fmt::Debug for HttpEndpoint<Resp> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("HttpEndpoint").field("url", &self.url).finish()
        }
    }

    impl<Req, Resp> Service<Req> for HttpEndpoint<Resp>
    where
        Req: Serialize + Send + 'static,
        Resp: DeserializeOwned + Send + 'static,
    {
        type Response = Resp;
        type Error = CallError;
        type Future = BoxFuture<'static, Result<Resp, CallError>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Req) -> Self::Future {
            let client = self.client.clone();
            let url = self.url.clone();
            Box::pin(async move {
                let response = client.post(&*url).json(&req).send().await?;
                let status = response.status().as_u16();
                let body = response.bytes().await?;
                tracing::debug!(%url, status, bytes = body.len(), "endpoint responded");
                classify(status, &body)
            })
        }
    }
}
