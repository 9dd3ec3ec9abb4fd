//! Typed access to the verifier agent's admin API.

use std::sync::Arc;

use http::{Method, StatusCode};
use serde_json::{json, Value as Json};
use tracing::{debug, warn};
use url::Url;

use crate::{
    config::BaseUrl,
    core::{
        did::{PublicDid, SetDidEndpoint},
        exchange::{ExchangeId, ExchangeRecord},
        proof_request::CreateProofRequest,
        util::{base_request, AsyncHttpClient},
    },
};

/// Failure of a single admin API call.
///
/// `Transport` and the protocol variants (`MalformedBody`, `EmptyBody`, `MissingField`) are
/// surfaced to callers as one "agent call failed" signal. `Status` only occurs when the client
/// was built with [AgentClient::strict_status].
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("unable to build agent request: {0}")]
    Request(String),
    #[error("agent request failed: {0:#}")]
    Transport(anyhow::Error),
    #[error("agent response is not valid JSON: {0}")]
    MalformedBody(#[source] serde_json::Error),
    #[error("agent response is empty")]
    EmptyBody,
    #[error("agent response is missing `{0}`")]
    MissingField(&'static str),
    #[error("agent responded with {status}: {body}")]
    Status { status: StatusCode, body: String },
}

#[derive(Debug, Clone)]
pub struct AgentClient {
    http_client: Arc<dyn AsyncHttpClient + Send + Sync>,
    admin_url: BaseUrl,
    strict_status: bool,
}

impl AgentClient {
    pub fn new(http_client: Arc<dyn AsyncHttpClient + Send + Sync>, admin_url: BaseUrl) -> Self {
        Self {
            http_client,
            admin_url,
            strict_status: false,
        }
    }

    /// Reject responses with a non-2xx status instead of decoding their body.
    ///
    /// Off by default: the agent reports some failures as JSON with an error status, and
    /// callers inspect the payload themselves.
    pub fn strict_status(mut self, strict: bool) -> Self {
        self.strict_status = strict;
        self
    }

    /// Call the admin API at `path`, relative to the admin base URL.
    ///
    /// A body is only sent with `POST`. Success means the transport succeeded and the body was
    /// valid JSON; the HTTP status is only checked in strict mode.
    pub async fn call(
        &self,
        path: &str,
        method: Method,
        body: Option<Json>,
    ) -> Result<Json, AgentError> {
        let url = self
            .admin_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| AgentError::Request(e.to_string()))?;
        self.send(url, method, body).await
    }

    async fn send(&self, url: Url, method: Method, body: Option<Json>) -> Result<Json, AgentError> {
        let body = match (&method, body) {
            (&Method::POST, Some(body)) => {
                serde_json::to_vec(&body).map_err(|e| AgentError::Request(e.to_string()))?
            }
            _ => Vec::new(),
        };

        debug!("{method} {url}");

        let request = base_request()
            .method(method.clone())
            .uri(url.as_str())
            .body(body)
            .map_err(|e| AgentError::Request(e.to_string()))?;

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(AgentError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = String::from_utf8_lossy(response.body()).into_owned();
            warn!("agent responded to {method} {url} with {status}: {body}");
            if self.strict_status {
                return Err(AgentError::Status { status, body });
            }
        }

        match serde_json::from_slice::<Json>(response.body()).map_err(AgentError::MalformedBody)? {
            Json::Null => Err(AgentError::EmptyBody),
            json => Ok(json),
        }
    }

    fn records_url(&self, id: &ExchangeId, action: Option<&str>) -> Result<Url, AgentError> {
        let mut url = self.admin_url.as_url().clone();
        {
            let Ok(mut path) = url.path_segments_mut() else {
                return Err(AgentError::Request(
                    "invalid base URL for the admin API".into(),
                ));
            };
            path.pop_if_empty()
                .extend(["present-proof", "records", id.as_str()]);
            if let Some(action) = action {
                path.push(action);
            }
        }
        Ok(url)
    }

    /// `POST /present-proof/create-request`
    pub async fn create_request(
        &self,
        request: &CreateProofRequest,
    ) -> Result<ExchangeId, AgentError> {
        let body = serde_json::to_value(request).map_err(|e| AgentError::Request(e.to_string()))?;
        let response = self
            .call("present-proof/create-request", Method::POST, Some(body))
            .await?;
        response
            .get("presentation_exchange_id")
            .and_then(Json::as_str)
            .map(ExchangeId::from)
            .ok_or(AgentError::MissingField("presentation_exchange_id"))
    }

    /// `GET /present-proof/records/{id}`
    pub async fn get_record(&self, id: &ExchangeId) -> Result<ExchangeRecord, AgentError> {
        let url = self.records_url(id, None)?;
        let response = self.send(url, Method::GET, None).await?;
        serde_json::from_value(response).map_err(AgentError::MalformedBody)
    }

    /// `POST /present-proof/records/{id}/verify-presentation`
    pub async fn verify_presentation(&self, id: &ExchangeId) -> Result<Json, AgentError> {
        let url = self.records_url(id, Some("verify-presentation"))?;
        self.send(url, Method::POST, Some(json!([id]))).await
    }

    /// `DELETE /present-proof/records/{id}`
    pub async fn delete_record(&self, id: &ExchangeId) -> Result<Json, AgentError> {
        let url = self.records_url(id, None)?;
        self.send(url, Method::DELETE, None).await
    }

    /// `GET /wallet/did/public`
    pub async fn public_did(&self) -> Result<PublicDid, AgentError> {
        let response = self.call("wallet/did/public", Method::GET, None).await?;
        let result = response
            .get("result")
            .filter(|r| !r.is_null())
            .cloned()
            .ok_or(AgentError::MissingField("result"))?;
        serde_json::from_value(result).map_err(AgentError::MalformedBody)
    }

    /// `GET /wallet/get-did-endpoint?did={did}`
    pub async fn did_endpoint(&self, did: &str) -> Result<Url, AgentError> {
        let mut url = self
            .admin_url
            .join("wallet/get-did-endpoint")
            .map_err(|e| AgentError::Request(e.to_string()))?;
        url.query_pairs_mut().append_pair("did", did);
        let response = self.send(url, Method::GET, None).await?;
        response
            .get("endpoint")
            .and_then(Json::as_str)
            .ok_or(AgentError::MissingField("endpoint"))?
            .parse()
            .map_err(|_| AgentError::MissingField("endpoint"))
    }

    /// `POST /wallet/set-did-endpoint`
    pub async fn set_did_endpoint(&self, body: &SetDidEndpoint) -> Result<Json, AgentError> {
        let body = serde_json::to_value(body).map_err(|e| AgentError::Request(e.to_string()))?;
        self.call("wallet/set-did-endpoint", Method::POST, Some(body))
            .await
    }
}
