//! The proof request sent to the verifier agent when an exchange is created.
//!
//! The request is configuration: the crate ships a default in `config/proof_request.json` and
//! deployments may point at their own file instead.

use std::{collections::BTreeMap, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_PROOF_REQUEST: &str = include_str!("../../config/proof_request.json");

/// Body of `POST /present-proof/create-request`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateProofRequest {
    pub proof_request: ProofRequestTemplate,
    #[serde(default)]
    pub trace: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
}

impl CreateProofRequest {
    /// The request bundled with the crate.
    pub fn bundled() -> Result<Self> {
        serde_json::from_str(DEFAULT_PROOF_REQUEST).context("bundled proof request is malformed")
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read proof request {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("unable to parse proof request {}", path.display()))
    }
}

/// Required attributes and predicates, with their issuer restrictions and revocation bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofRequestTemplate {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub requested_attributes: BTreeMap<String, RequestedAttribute>,
    #[serde(default)]
    pub requested_predicates: BTreeMap<String, RequestedPredicate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_revoked: Option<NonRevoked>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestedAttribute {
    pub name: String,
    #[serde(default)]
    pub restrictions: Vec<Restriction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_revoked: Option<NonRevoked>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestedPredicate {
    pub name: String,
    pub p_type: PredicateType,
    pub p_value: i64,
    #[serde(default)]
    pub restrictions: Vec<Restriction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_revoked: Option<NonRevoked>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredicateType {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = ">")]
    Gt,
}

/// Limits which credentials may satisfy a referent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restriction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_did: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cred_def_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<String>,
}

/// Non-revocation interval, in seconds since the epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonRevoked {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<u64>,
}
