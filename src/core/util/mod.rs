use std::{fmt::Debug, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use http::{
    header::{ACCEPT, CONTENT_TYPE},
    Request, Response,
};

/// Generic HTTP client.
///
/// The agent's admin API and the polling endpoint are reached through this trait, so any
/// transport can stand in for them, including an in-process fake during tests.
#[async_trait]
pub trait AsyncHttpClient: Debug {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>>;
}

/// Every admin API call exchanges JSON.
pub(crate) fn base_request() -> http::request::Builder {
    Request::builder()
        .header(CONTENT_TYPE, "application/json")
        .header(ACCEPT, "application/json")
}

/// [AsyncHttpClient] over `reqwest` with rustls.
#[derive(Debug, Clone)]
pub struct ReqwestClient(reqwest::Client);

impl ReqwestClient {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new() -> Result<Self> {
        Self::with_timeout(Self::DEFAULT_TIMEOUT)
    }

    /// Upper bound for a whole request, response body included.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .context("unable to build http_client")
            .map(Self)
    }
}

#[async_trait]
impl AsyncHttpClient for ReqwestClient {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let target = format!("{} {}", request.method(), request.uri());
        let request = reqwest::Request::try_from(request)
            .with_context(|| format!("unable to convert request for {target}"))?;

        let response = self
            .0
            .execute(request)
            .await
            .with_context(|| format!("{target} failed"))?;

        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .with_context(|| format!("failed to read the response body of {target}"))?;

        let mut converted = Response::new(body.to_vec());
        *converted.status_mut() = status;
        *converted.version_mut() = version;
        *converted.headers_mut() = headers;
        Ok(converted)
    }
}
