//! HTTP client abstraction for calling upstream providers
//!
//! This module provides a unified interface for making HTTP requests, allowing
//! different client implementations (hyper, mock clients for testing, etc.) to
//! be used interchangeably by the upstream AI and speech clients.
use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{Method, Request, StatusCode, header},
    response::IntoResponse,
};
use hyper_util::{client::legacy::Client, rt::TokioExecutor};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::errors::UpstreamError;

pub type HyperClient = Client<
    hyper_tls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>,
    axum::body::Body,
>;

/// Upstream responses larger than this are treated as unusable.
const MAX_UPSTREAM_RESPONSE_BYTES: usize = 32 * 1024 * 1024;

#[async_trait]
pub trait HttpClient: std::fmt::Debug {
    async fn request(
        &self,
        req: axum::extract::Request,
    ) -> Result<axum::response::Response, Box<dyn std::error::Error + Send + Sync>>;
}

#[async_trait]
impl HttpClient for HyperClient {
    async fn request(
        &self,
        req: axum::extract::Request,
    ) -> Result<axum::response::Response, Box<dyn std::error::Error + Send + Sync>> {
        self.request(req)
            .await
            .map(|res| res.into_response())
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
    }
}

/// Builds the pooled TLS client used for all upstream traffic.
pub fn create_hyper_client(
    pool_idle_timeout: Duration,
    pool_max_idle_per_host: usize,
) -> HyperClient {
    let https = hyper_tls::HttpsConnector::new();

    debug!(
        "HTTP client pool config: idle_timeout={}s, max_idle_per_host={}",
        pool_idle_timeout.as_secs(),
        pool_max_idle_per_host
    );

    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(pool_idle_timeout)
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .pool_timer(hyper_util::rt::TokioTimer::new())
        .build(https)
}

/// A completed upstream exchange: status plus the fully buffered body.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// POSTs a JSON payload and buffers the reply, bounding the whole exchange by `timeout`.
///
/// A single attempt is made. Non-success statuses are returned as-is so each provider client
/// can extract its own error message.
pub async fn post_json<C, P>(
    client: &C,
    service: &'static str,
    url: &Url,
    headers: &[(&'static str, &str)],
    payload: &P,
    timeout: Duration,
) -> Result<UpstreamResponse, UpstreamError>
where
    C: HttpClient + Send + Sync + ?Sized,
    P: Serialize + ?Sized,
{
    let body = serde_json::to_vec(payload).map_err(|e| UpstreamError::InvalidResponse {
        service,
        message: format!("could not encode request: {e}"),
    })?;

    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(url.as_str())
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(host) = url.host_str() {
        let host_value = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        builder = builder.header(header::HOST, host_value);
    }
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder
        .body(Body::from(body))
        .map_err(|e| UpstreamError::Transport {
            service,
            message: format!("could not build request: {e}"),
        })?;

    let exchange = async {
        let response = client
            .request(request)
            .await
            .map_err(|e| UpstreamError::Transport {
                service,
                message: e.to_string(),
            })?;
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), MAX_UPSTREAM_RESPONSE_BYTES)
            .await
            .map_err(|e| UpstreamError::Transport {
                service,
                message: format!("failed reading response body: {e}"),
            })?;
        Ok(UpstreamResponse { status, body })
    };

    match tokio::time::timeout(timeout, exchange).await {
        Ok(result) => result,
        Err(_) => Err(UpstreamError::Timeout { service, timeout }),
    }
}
