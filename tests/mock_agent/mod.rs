//! An in-process stand-in for the verifier agent's admin API.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use http::{Method, Request, Response, StatusCode};
use serde_json::{json, Value as Json};
use vc_login::{
    config::BaseUrl,
    core::util::AsyncHttpClient,
    verifier::{handoff::Handoff, session::MemoryIdentityProvider, Verifier},
};

pub const ADMIN_URL: &str = "http://agent.test:8031";
pub const PUBLIC_URL: &str = "http://login.test:8888/wp-json/vc-api";
pub const AGENT_URL: &str = "http://agent.test:8030";
pub const DID: &str = "WgWxqztrNooG92RXvxSTWv";
pub const VERKEY: &str = "8HH5gYEeNc3z7PYXmd54d4x6qAfCNrqQqEB3nS7Zfu7K";
pub const DOMAIN: &str = "matrixgroup.net";

#[derive(Debug, Default)]
struct AgentState {
    records: BTreeMap<String, Json>,
    created: u64,
    endpoint: Option<String>,
    calls: Vec<(Method, String)>,
    offline: bool,
    /// Answer record deletes with a plaintext server error and keep the record.
    fail_deletes: bool,
    /// Move received presentations to `abandoned` instead of `verified`.
    reject_presentations: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MockAgent {
    state: Arc<Mutex<AgentState>>,
}

impl MockAgent {
    pub fn new() -> Self {
        let agent = Self::default();
        agent.state.lock().unwrap().endpoint = Some(AGENT_URL.to_string());
        agent
    }

    pub fn admin_url() -> BaseUrl {
        ADMIN_URL.parse().unwrap()
    }

    pub fn verifier(&self) -> Verifier {
        Verifier::builder()
            .with_http_client(Arc::new(self.clone()))
            .with_admin_url(Self::admin_url())
            .with_public_url(PUBLIC_URL.parse().unwrap())
            .with_agent_endpoint(AGENT_URL.parse().unwrap())
            .build()
            .unwrap()
    }

    pub fn handoff(&self, identities: MemoryIdentityProvider) -> Handoff {
        Handoff::new(self.verifier(), Arc::new(identities), DOMAIN)
    }

    /// The wallet submitted a presentation revealing `name`.
    pub fn receive_presentation(&self, id: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        let record = state.records.get_mut(id).expect("unknown exchange");
        record["state"] = json!("presentation_received");
        record["presentation"] = json!({
            "requested_proof": {
                "revealed_attrs": {
                    "0_name_uuid": {
                        "sub_proof_index": 0,
                        "raw": name,
                        "encoded": "1139481716457488690172217916278103335"
                    }
                },
                "self_attested_attrs": {},
                "unrevealed_attrs": {},
                "predicates": {
                    "0_birthdate_dateint_GE_uuid": { "sub_proof_index": 0 }
                }
            },
            "identifiers": [
                {
                    "schema_id": "VjJLSSJoRZgWzBC9KSEDRj:2:degree schema:18.62.94",
                    "cred_def_id": "VjJLSSJoRZgWzBC9KSEDRj:3:CL:18547:faber.agent.degree_schema"
                }
            ]
        });
    }

    /// Force a record into `state`, as if the agent had moved it there.
    pub fn set_state(&self, id: &str, new_state: &str) {
        let mut state = self.state.lock().unwrap();
        let record = state.records.get_mut(id).expect("unknown exchange");
        record["state"] = json!(new_state);
    }

    pub fn remove_presentation(&self, id: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(Json::Object(record)) = state.records.get_mut(id) {
            record.remove("presentation");
        }
    }

    pub fn reject_presentations(&self) {
        self.state.lock().unwrap().reject_presentations = true;
    }

    pub fn fail_deletes(&self) {
        self.state.lock().unwrap().fail_deletes = true;
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn has_record(&self, id: &str) -> bool {
        self.state.lock().unwrap().records.contains_key(id)
    }

    pub fn registered_endpoint(&self) -> Option<String> {
        self.state.lock().unwrap().endpoint.clone()
    }

    /// Calls made so far, as `(method, path)`.
    pub fn calls(&self) -> Vec<(Method, String)> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count_calls(&self, method: &Method, suffix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|(m, path)| m == method && path.ends_with(suffix))
            .count()
    }

    fn handle(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        body: &[u8],
    ) -> (StatusCode, Json) {
        let mut state = self.state.lock().unwrap();
        state.calls.push((method.clone(), path.to_string()));

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        match (method, segments.as_slice()) {
            (Method::POST, ["present-proof", "create-request"]) => {
                let Ok(request) = serde_json::from_slice::<Json>(body) else {
                    return (StatusCode::BAD_REQUEST, json!("malformed body"));
                };
                state.created += 1;
                let id = format!("ex-{}", state.created);
                let record = json!({
                    "presentation_exchange_id": id,
                    "state": "request_sent",
                    "role": "verifier",
                    "initiator": "self",
                    "trace": request["trace"],
                    "presentation_request": request["proof_request"],
                    "presentation_request_dict": {
                        "@type": "https://didcomm.org/present-proof/1.0/request-presentation",
                        "@id": format!("thread-{id}"),
                        "request_presentations~attach": [
                            {
                                "@id": "libindy-request-presentation-0",
                                "mime-type": "application/json",
                                "data": { "base64": "eyJuYW1lIjoiUHJvb2Ygb2YgRWR1Y2F0aW9uIn0=" }
                            }
                        ]
                    }
                });
                state.records.insert(id, record.clone());
                (StatusCode::OK, record)
            }
            (Method::GET, ["present-proof", "records", id]) => match state.records.get(*id) {
                Some(record) => (StatusCode::OK, record.clone()),
                None => (StatusCode::NOT_FOUND, Json::Null),
            },
            (Method::POST, ["present-proof", "records", id, "verify-presentation"]) => {
                let reject = state.reject_presentations;
                let Some(record) = state.records.get_mut(*id) else {
                    return (StatusCode::NOT_FOUND, Json::Null);
                };
                if record["state"] != "presentation_received" {
                    return (StatusCode::BAD_REQUEST, Json::Null);
                }
                if reject {
                    record["state"] = json!("abandoned");
                    record["verified"] = json!("false");
                } else {
                    record["state"] = json!("verified");
                    record["verified"] = json!("true");
                }
                (StatusCode::OK, record.clone())
            }
            (Method::DELETE, ["present-proof", "records", _]) if state.fail_deletes => {
                (StatusCode::INTERNAL_SERVER_ERROR, Json::Null)
            }
            (Method::DELETE, ["present-proof", "records", id]) => {
                match state.records.remove(*id) {
                    Some(_) => (StatusCode::OK, json!({})),
                    None => (StatusCode::NOT_FOUND, Json::Null),
                }
            }
            (Method::GET, ["wallet", "did", "public"]) => (
                StatusCode::OK,
                json!({
                    "result": {
                        "did": DID,
                        "verkey": VERKEY,
                        "posture": "posted",
                        "key_type": "ed25519",
                        "method": "sov"
                    }
                }),
            ),
            (Method::GET, ["wallet", "get-did-endpoint"]) => {
                if query != Some(&format!("did={DID}")[..]) {
                    return (StatusCode::BAD_REQUEST, Json::Null);
                }
                (
                    StatusCode::OK,
                    json!({ "did": DID, "endpoint": state.endpoint }),
                )
            }
            (Method::POST, ["wallet", "set-did-endpoint"]) => {
                let Ok(request) = serde_json::from_slice::<Json>(body) else {
                    return (StatusCode::BAD_REQUEST, Json::Null);
                };
                state.endpoint = request["endpoint"].as_str().map(str::to_owned);
                (StatusCode::OK, json!({}))
            }
            _ => (StatusCode::NOT_FOUND, Json::Null),
        }
    }
}

#[async_trait]
impl AsyncHttpClient for MockAgent {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        if self.state.lock().unwrap().offline {
            bail!("connection refused")
        }

        let (parts, body) = request.into_parts();
        let (status, json) = self.handle(parts.method, parts.uri.path(), parts.uri.query(), &body);

        // The agent answers unknown records and bad transitions with plain text.
        let body = match json {
            Json::Null => format!(
                "{}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or_default()
            )
            .into_bytes(),
            json => serde_json::to_vec(&json)?,
        };

        Ok(Response::builder().status(status).body(body)?)
    }
}
