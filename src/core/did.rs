use anyhow::bail;
use serde::{Deserialize, Serialize};
use url::Url;

/// The verifier agent's public DID and its verification key, from `GET /wallet/did/public`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicDid {
    pub did: String,
    pub verkey: String,
}

/// Everything a wallet needs to respond to a connectionless request: the key to encrypt for
/// and the endpoint to deliver to. Fetched from the agent on every use, never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DidEndpointInfo {
    pub public_did: PublicDid,
    pub endpoint: Url,
}

impl DidEndpointInfo {
    pub fn service(&self) -> ServiceBlock {
        ServiceBlock {
            recipient_keys: RecipientKeys::new(self.public_did.verkey.clone()),
            service_endpoint: self.endpoint.clone(),
        }
    }
}

/// The `~service` decorator attached to a connectionless proof request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBlock {
    pub recipient_keys: RecipientKeys,
    pub service_endpoint: Url,
}

impl ServiceBlock {
    pub const DECORATOR: &'static str = "~service";
}

/// Verification keys a wallet may encrypt its response for. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct RecipientKeys(Vec<String>);

impl RecipientKeys {
    pub fn new(verkey: String) -> Self {
        Self(vec![verkey])
    }
}

impl TryFrom<Vec<String>> for RecipientKeys {
    type Error = anyhow::Error;

    fn try_from(keys: Vec<String>) -> anyhow::Result<Self> {
        if keys.is_empty() {
            bail!("a service block needs at least one recipient key")
        }
        Ok(Self(keys))
    }
}

impl From<RecipientKeys> for Vec<String> {
    fn from(RecipientKeys(keys): RecipientKeys) -> Self {
        keys
    }
}

/// Body of `POST /wallet/set-did-endpoint`.
#[derive(Debug, Clone, Serialize)]
pub struct SetDidEndpoint {
    pub did: String,
    pub endpoint: Url,
    pub endpoint_type: &'static str,
}

impl SetDidEndpoint {
    pub fn new(did: String, endpoint: Url) -> Self {
        Self {
            did,
            endpoint,
            endpoint_type: "Endpoint",
        }
    }
}
