use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

const REQUEST_SENT: &str = "request_sent";
const PRESENTATION_RECEIVED: &str = "presentation_received";
const VERIFIED: &str = "verified";
const ABANDONED: &str = "abandoned";

/// Revealed attribute referent holding the prover's name.
pub const NAME_REFERENT: &str = "0_name_uuid";

/// Identifier of a presentation exchange, assigned by the verifier agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeId(pub String);

impl ExchangeId {
    /// Parse an identifier supplied by an untrusted caller, such as the raw body of a
    /// polling request. Surrounding whitespace is ignored and empty identifiers are rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ExchangeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ExchangeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// State of a presentation exchange as reported by the verifier agent.
///
/// The agent owns every transition; this type only observes them. States outside the
/// known set are kept verbatim in [ExchangeState::Other] and passed on unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExchangeState {
    RequestSent,
    PresentationReceived,
    Verified,
    Abandoned,
    Other(String),
}

impl ExchangeState {
    pub fn is_verified(&self) -> bool {
        matches!(self, ExchangeState::Verified)
    }
}

impl From<String> for ExchangeState {
    fn from(s: String) -> Self {
        match s.as_str() {
            REQUEST_SENT => ExchangeState::RequestSent,
            PRESENTATION_RECEIVED => ExchangeState::PresentationReceived,
            VERIFIED => ExchangeState::Verified,
            ABANDONED => ExchangeState::Abandoned,
            _ => ExchangeState::Other(s),
        }
    }
}

impl From<&str> for ExchangeState {
    fn from(s: &str) -> Self {
        s.to_owned().into()
    }
}

impl From<ExchangeState> for String {
    fn from(state: ExchangeState) -> Self {
        match state {
            ExchangeState::RequestSent => REQUEST_SENT.into(),
            ExchangeState::PresentationReceived => PRESENTATION_RECEIVED.into(),
            ExchangeState::Verified => VERIFIED.into(),
            ExchangeState::Abandoned => ABANDONED.into(),
            ExchangeState::Other(o) => o,
        }
    }
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeState::RequestSent => REQUEST_SENT,
            ExchangeState::PresentationReceived => PRESENTATION_RECEIVED,
            ExchangeState::Verified => VERIFIED,
            ExchangeState::Abandoned => ABANDONED,
            ExchangeState::Other(o) => o,
        }
        .fmt(f)
    }
}

/// A presentation exchange record fetched from `GET /present-proof/records/{id}`.
///
/// Only the fields this crate reads are typed; everything else the agent reports is kept in
/// `other` so the record can be handed back to the browser untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRecord {
    pub presentation_exchange_id: ExchangeId,
    pub state: ExchangeState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation_request_dict: Option<Map<String, Json>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation: Option<Presentation>,
    #[serde(flatten)]
    pub other: Map<String, Json>,
}

impl ExchangeRecord {
    /// Look up a revealed attribute by its referent.
    ///
    /// Returns `None` when the wallet has not submitted a presentation yet or when the
    /// presentation does not reveal the referent.
    pub fn revealed_attr(&self, referent: &str) -> Option<&RevealedAttr> {
        self.presentation
            .as_ref()?
            .requested_proof
            .revealed_attrs
            .get(referent)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presentation {
    #[serde(default)]
    pub requested_proof: RequestedProof,
    #[serde(flatten)]
    pub other: Map<String, Json>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestedProof {
    #[serde(default)]
    pub revealed_attrs: BTreeMap<String, RevealedAttr>,
    #[serde(flatten)]
    pub other: Map<String, Json>,
}

/// A credential attribute disclosed in plaintext.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevealedAttr {
    pub raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoded: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_proof_index: Option<u64>,
}
