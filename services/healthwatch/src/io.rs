//! HTTP client abstraction for testability

use std::time::Duration;

use async_trait::async_trait;

use crate::HealthwatchError;

/// HTTP response from a request
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Abstraction over HTTP client for dependency injection
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait HttpClient: Send + Sync {
    /// Send a GET request, giving up after `timeout`
    async fn get(&self, url: &str, timeout: Duration) -> crate::Result<HttpResponse>;

    /// Send a POST request with form-encoded body
    async fn post_form(&self, url: &str, params: &[(&str, &str)]) -> crate::Result<HttpResponse>;

    /// Send a POST request with a JSON body
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> crate::Result<HttpResponse>;
}

/// Production HTTP client using reqwest
#[derive(Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client whose requests, body included, give up after `timeout` unless
    /// the call sets its own
    pub fn with_timeout(timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HealthwatchError::Http(format!("Building HTTP client: {}", e)))?;
        Ok(Self {
            client,
            timeout: Some(timeout),
        })
    }
}

/// Sort a reqwest failure into the error kinds the prober distinguishes
fn classify(method: &str, url: &str, timeout: Option<Duration>, e: reqwest::Error) -> HealthwatchError {
    if e.is_timeout() {
        HealthwatchError::Timeout(timeout.unwrap_or_default())
    } else if e.is_connect() {
        HealthwatchError::Connection(format!("{} {}: {}", method, url, e))
    } else {
        HealthwatchError::Http(format!("{} {} failed: {}", method, url, e))
    }
}

async fn into_response(
    method: &str,
    url: &str,
    timeout: Option<Duration>,
    response: reqwest::Response,
) -> crate::Result<HttpResponse> {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| classify(method, url, timeout, e))?;

    tracing::debug!("{} {} -> {} ({} bytes)", method, url, status, body.len());
    Ok(HttpResponse { status, body })
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    /// Only the status line and headers are awaited. The body is dropped unread.
    async fn get(&self, url: &str, timeout: Duration) -> crate::Result<HttpResponse> {
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify("GET", url, Some(timeout), e))?;

        let status = response.status().as_u16();
        tracing::debug!("GET {} -> {}", url, status);
        Ok(HttpResponse {
            status,
            body: String::new(),
        })
    }

    async fn post_form(&self, url: &str, params: &[(&str, &str)]) -> crate::Result<HttpResponse> {
        tracing::debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .form(params)
            .send()
            .await
            .map_err(|e| classify("POST", url, self.timeout, e))?;

        into_response("POST", url, self.timeout, response).await
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> crate::Result<HttpResponse> {
        tracing::debug!("POST {} (json)", url);
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| classify("POST", url, self.timeout, e))?;

        into_response("POST", url, self.timeout, response).await
    }
}
