// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP transport plumbing for the remote cluster.
//!
//! The remote Kubernetes API is reached through a cloud gateway that expects
//! an extra path segment in front of every API path. The client library owns
//! the request path, so the prefix cannot be configured there; instead the
//! whole transport is wrapped in a tower layer that rewrites outbound
//! requests. The same stack injects a Google Cloud bearer token per request
//! and traces request/response pairs for `--verbose` debugging.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use anyhow::Result;
use gcp_auth::TokenProvider;
use http::header::AUTHORIZATION;
use http::uri::Scheme;
use http::{HeaderValue, Request, Uri};
use hyper_util::rt::TokioExecutor;
use kube::client::ConfigExt;
use kube::{Client, Config};
use tower::{BoxError, Layer, Service, ServiceBuilder};
use tower_http::trace::TraceLayer;
use tracing::{debug, error};
use url::Url;

use crate::constants::{CLOUD_PLATFORM_SCOPE, REMOTE_API_PREFIX};

/// Rewrite a URI so its path starts with `prefix` and its scheme is https.
///
/// Requests already carrying the prefix are passed through unchanged apart
/// from the scheme; everything else gets `prefix` prepended. Forcing https
/// here avoids a redundant upgrade round-trip at the gateway.
fn prefixed_uri(uri: &Uri, prefix: &str) -> Result<Uri, http::Error> {
    let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());
    let rewritten = if uri.path().starts_with(prefix) {
        path_and_query.to_string()
    } else {
        format!("{prefix}{path_and_query}")
    };

    let mut parts = uri.clone().into_parts();
    parts.scheme = Some(Scheme::HTTPS);
    parts.path_and_query = Some(rewritten.parse()?);
    Uri::from_parts(parts).map_err(http::Error::from)
}

/// Layer mounting [`ApiPrefix`] onto a transport.
#[derive(Clone, Debug)]
pub struct ApiPrefixLayer {
    prefix: Arc<str>,
}

impl ApiPrefixLayer {
    /// Create a layer that prepends `prefix` to every outbound request path.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: Arc::from(prefix),
        }
    }
}

impl<S> Layer<S> for ApiPrefixLayer {
    type Service = ApiPrefix<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ApiPrefix {
            inner,
            prefix: self.prefix.clone(),
        }
    }
}

/// Transport middleware rewriting request URIs for the cloud gateway.
#[derive(Clone, Debug)]
pub struct ApiPrefix<S> {
    inner: S,
    prefix: Arc<str>,
}

impl<S, B> Service<Request<B>> for ApiPrefix<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        match prefixed_uri(req.uri(), &self.prefix) {
            Ok(uri) => {
                debug!(uri = %uri, "rewrote request for cloud gateway");
                *req.uri_mut() = uri;
            }
            // Rewriting only fails on URIs the inner client would reject anyway.
            Err(err) => error!(uri = %req.uri(), error = %err, "failed to rewrite request URI"),
        }
        self.inner.call(req)
    }
}

/// Layer mounting [`BearerAuth`] onto a transport.
#[derive(Clone)]
pub struct BearerAuthLayer {
    provider: Arc<dyn TokenProvider>,
}

impl BearerAuthLayer {
    /// Create a layer that authenticates requests with tokens from `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self { provider }
    }
}

impl<S> Layer<S> for BearerAuthLayer {
    type Service = BearerAuth<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BearerAuth {
            inner,
            provider: self.provider.clone(),
        }
    }
}

/// Transport middleware injecting a Google Cloud bearer token per request.
///
/// The token provider caches credentials and refreshes them before expiry, so
/// asking for a token on every request is cheap.
#[derive(Clone)]
pub struct BearerAuth<S> {
    inner: S,
    provider: Arc<dyn TokenProvider>,
}

impl<S, B> Service<Request<B>> for BearerAuth<S>
where
    S: Service<Request<B>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, BoxError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let provider = self.provider.clone();
        // Take the service that was polled ready, leave the clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let token = provider
                .token(&[CLOUD_PLATFORM_SCOPE])
                .await
                .map_err(BoxError::from)?;
            let mut value = HeaderValue::try_from(format!("Bearer {}", token.as_str()))
                .map_err(BoxError::from)?;
            value.set_sensitive(true);
            req.headers_mut().insert(AUTHORIZATION, value);
            inner.call(req).await.map_err(Into::into)
        })
    }
}

/// Build a client for the remote cluster.
///
/// The transport stack is, outermost first: base URI resolution against
/// `remote_server`, gateway path prefixing, bearer-token injection from the
/// ambient Google Cloud credential, and HTTP tracing, over a rustls HTTPS
/// connector.
///
/// # Errors
///
/// Fails when the server URL does not parse, the TLS connector cannot be
/// built, or no ambient Google Cloud credential is available. All of these
/// are fatal at startup.
pub async fn remote_client(remote_server: &Url) -> Result<Client> {
    let cluster_url: Uri = remote_server.as_str().parse()?;
    let mut config = Config::new(cluster_url);
    config.default_namespace = "default".to_string();

    let connector = config.rustls_https_connector()?;
    let http_client = hyper_util::client::legacy::Client::builder(TokioExecutor::new())
        .build::<_, kube::client::Body>(connector);

    let provider = gcp_auth::provider().await?;

    let service = ServiceBuilder::new()
        .layer(config.base_uri_layer())
        .layer(ApiPrefixLayer::new(REMOTE_API_PREFIX))
        .layer(BearerAuthLayer::new(provider))
        .layer(TraceLayer::new_for_http())
        .map_err(BoxError::from)
        .service(http_client);

    Ok(Client::new(service, config.default_namespace.clone()))
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod transport_tests;
