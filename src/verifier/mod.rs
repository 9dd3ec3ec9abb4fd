use std::sync::Arc;

use anyhow::{bail, Result};
use serde_json::{Map, Value as Json};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    config::BaseUrl,
    core::{
        did::{DidEndpointInfo, ServiceBlock, SetDidEndpoint},
        exchange::{ExchangeId, ExchangeRecord},
        proof_request::CreateProofRequest,
        util::AsyncHttpClient,
    },
};

use agent::{AgentClient, AgentError};

pub mod agent;
pub mod handoff;
pub mod session;

/// Manages presentation exchanges held by a remote verifier agent.
///
/// The agent owns every exchange and every state transition. This type creates exchanges,
/// reads them back, and asks the agent to act on them; it never caches or writes exchange
/// state itself, so one instance can be shared freely between concurrent requests.
#[derive(Debug, Clone)]
pub struct Verifier {
    agent: AgentClient,
    proof_request: CreateProofRequest,
    public_url: BaseUrl,
    agent_endpoint: Url,
}

impl Verifier {
    /// Build a new verifier.
    pub fn builder() -> VerifierBuilder {
        VerifierBuilder::default()
    }

    /// Create an exchange from the configured proof request.
    ///
    /// ## Returns
    /// The exchange id assigned by the agent.
    pub async fn create_exchange(&self) -> Result<ExchangeId, AgentError> {
        self.create_exchange_with(&self.proof_request).await
    }

    pub async fn create_exchange_with(
        &self,
        request: &CreateProofRequest,
    ) -> Result<ExchangeId, AgentError> {
        let id = self.agent.create_request(request).await?;
        info!("created presentation exchange {id}");
        Ok(id)
    }

    /// The URL a wallet fetches the connectionless request from, usually shown as a QR code.
    pub fn wallet_fetch_url(&self, id: &ExchangeId) -> Result<Url> {
        let mut url = self.public_url.as_url().clone();
        {
            let Ok(mut path) = url.path_segments_mut() else {
                bail!("invalid public URL")
            };
            path.pop_if_empty()
                .extend(["webhooks", "pres_req", id.as_str()]);
        }
        Ok(url)
    }

    /// Assemble the out-of-band payload a wallet needs to answer the exchange's proof request.
    ///
    /// The exchange's request dict is combined with a `~service` block naming the agent's
    /// verification key and endpoint. Fails if any of the three lookups fails.
    pub async fn build_connectionless_payload(
        &self,
        id: &ExchangeId,
    ) -> Result<Map<String, Json>, AgentError> {
        let mut payload = self
            .get_record(id)
            .await?
            .presentation_request_dict
            .ok_or(AgentError::MissingField("presentation_request_dict"))?;

        let service = self.did_endpoint_info().await?.service();
        let service =
            serde_json::to_value(service).map_err(|e| AgentError::Request(e.to_string()))?;
        payload.insert(ServiceBlock::DECORATOR.to_owned(), service);

        Ok(payload)
    }

    /// Fetch the agent's public DID, its verkey, and its published endpoint.
    pub async fn did_endpoint_info(&self) -> Result<DidEndpointInfo, AgentError> {
        let public_did = self.agent.public_did().await?;
        let endpoint = self.agent.did_endpoint(&public_did.did).await?;
        Ok(DidEndpointInfo {
            public_did,
            endpoint,
        })
    }

    /// Fetch the current exchange record. Has no side effects.
    pub async fn get_record(&self, id: &ExchangeId) -> Result<ExchangeRecord, AgentError> {
        self.agent.get_record(id).await
    }

    /// Ask the agent to verify a received presentation.
    ///
    /// `true` means the agent processed the request, not that the presentation passed; that
    /// is read back from the record's state.
    pub async fn request_verification(&self, id: &ExchangeId) -> bool {
        match self.agent.verify_presentation(id).await {
            Ok(response) => {
                debug!("verification requested for {id}");
                is_truthy(&response)
            }
            Err(e) => {
                warn!("verification request for {id} failed: {e}");
                false
            }
        }
    }

    /// Remove the exchange from the agent so it cannot be used again.
    pub async fn delete_exchange(&self, id: &ExchangeId) -> bool {
        match self.agent.delete_record(id).await {
            Ok(_) => {
                debug!("deleted presentation exchange {id}");
                true
            }
            Err(e) => {
                warn!("deleting presentation exchange {id} failed: {e}");
                false
            }
        }
    }

    /// Publish the configured agent endpoint against the agent's public DID.
    pub async fn register_endpoint(&self) -> Result<(), AgentError> {
        let did = self.agent.public_did().await?.did;
        let body = SetDidEndpoint::new(did, self.agent_endpoint.clone());
        self.agent.set_did_endpoint(&body).await?;
        info!("published {} as endpoint of {}", body.endpoint, body.did);
        Ok(())
    }
}

/// Anything but `null` or `false` counts as processed, so `{}`, `[]`, `0` and `""` do too,
/// unlike loosely typed falsiness.
fn is_truthy(value: &Json) -> bool {
    !matches!(value, Json::Null | Json::Bool(false))
}

/// Builder struct for [Verifier].
#[derive(Debug, Clone, Default)]
pub struct VerifierBuilder {
    http_client: Option<Arc<dyn AsyncHttpClient + Send + Sync>>,
    admin_url: Option<BaseUrl>,
    public_url: Option<BaseUrl>,
    agent_endpoint: Option<Url>,
    proof_request: Option<CreateProofRequest>,
    strict_status: bool,
}

impl VerifierBuilder {
    /// Build the verifier.
    pub fn build(self) -> Result<Verifier> {
        let Self {
            http_client,
            admin_url,
            public_url,
            agent_endpoint,
            proof_request,
            strict_status,
        } = self;

        let Some(http_client) = http_client else {
            bail!("http client is required, see `with_http_client`")
        };

        let Some(admin_url) = admin_url else {
            bail!("admin url is required, see `with_admin_url`")
        };

        let Some(public_url) = public_url else {
            bail!("public url is required, see `with_public_url`")
        };

        let Some(agent_endpoint) = agent_endpoint else {
            bail!("agent endpoint is required, see `with_agent_endpoint`")
        };

        let proof_request = match proof_request {
            Some(proof_request) => proof_request,
            None => CreateProofRequest::bundled()?,
        };

        Ok(Verifier {
            agent: AgentClient::new(http_client, admin_url).strict_status(strict_status),
            proof_request,
            public_url,
            agent_endpoint,
        })
    }

    /// Set the client used to reach the agent's admin API.
    pub fn with_http_client(mut self, http_client: Arc<dyn AsyncHttpClient + Send + Sync>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    /// Set the base URL of the agent's admin API.
    pub fn with_admin_url(mut self, admin_url: BaseUrl) -> Self {
        self.admin_url = Some(admin_url);
        self
    }

    /// Set the URL wallets and browsers reach this service at.
    pub fn with_public_url(mut self, public_url: BaseUrl) -> Self {
        self.public_url = Some(public_url);
        self
    }

    /// Set the agent endpoint published by [Verifier::register_endpoint].
    pub fn with_agent_endpoint(mut self, endpoint: Url) -> Self {
        self.agent_endpoint = Some(endpoint);
        self
    }

    /// Set the proof request every exchange is created from. Defaults to the bundled request.
    pub fn with_proof_request(mut self, proof_request: CreateProofRequest) -> Self {
        self.proof_request = Some(proof_request);
        self
    }

    /// See [AgentClient::strict_status].
    pub fn strict_status(mut self, strict: bool) -> Self {
        self.strict_status = strict;
        self
    }
}
