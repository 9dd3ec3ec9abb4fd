use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header::LOCATION, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use base64::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use super::AppState;
use crate::{
    core::exchange::{ExchangeId, ExchangeRecord, ExchangeState},
    poll::PollConfig,
    verifier::{agent::AgentError, handoff::HandoffError},
};

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "vc-login"
    }))
}

/// GET /webhooks/pres_req/:exchange_id
///
/// Called by the wallet after scanning the QR code. Redirects to the out-of-band delivery
/// endpoint with the connectionless request, base64 encoded, in the `m` query parameter.
pub async fn wallet_fetch(
    State(state): State<Arc<AppState>>,
    Path(exchange_id): Path<String>,
) -> Result<Response, AppError> {
    let exchange_id = ExchangeId::from(exchange_id);
    info!("Wallet fetching connectionless request for exchange: {exchange_id}");

    let payload = state
        .verifier
        .build_connectionless_payload(&exchange_id)
        .await
        .map_err(|e| {
            error!("Failed to build connectionless request for {exchange_id}: {e}");
            AppError::from_agent(e, "Creating the connectionless request failed.")
        })?;

    let encoded = serde_json::to_vec(&payload)
        .map(|json| BASE64_STANDARD.encode(json))
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let mut location = state
        .public_url
        .join("webhooks/")
        .map_err(|e| AppError::Internal(e.to_string()))?;
    location.query_pairs_mut().append_pair("m", &encoded);

    debug!("Redirecting wallet to {location}");

    Ok((StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response())
}

/// Body of a verifier agent webhook. Only the fields acted upon are typed.
#[derive(Debug, Deserialize)]
pub struct AgentNotification {
    #[serde(default)]
    pub state: Option<ExchangeState>,
    #[serde(default)]
    pub presentation_exchange_id: Option<ExchangeId>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// POST /topic/:topic
///
/// Called by the verifier agent whenever an exchange changes state. Notifications may repeat.
pub async fn agent_topic(
    State(state): State<Arc<AppState>>,
    Path(topic): Path<String>,
    Json(notification): Json<AgentNotification>,
) -> Result<StatusCode, AppError> {
    debug!(
        "Agent notification on {topic}: {:?} for {:?}",
        notification.state, notification.presentation_exchange_id
    );

    match notification.state {
        Some(ExchangeState::PresentationReceived) => {
            let Some(exchange_id) = notification.presentation_exchange_id else {
                return Err(AppError::BadRequest(
                    "presentation_exchange_id is required".into(),
                ));
            };

            info!("Presentation received for {exchange_id}, requesting verification");
            if !state.verifier.request_verification(&exchange_id).await {
                return Err(AppError::BadGateway(
                    "Verifying the presentation failed.".into(),
                ));
            }
        }
        // Every other transition is observed by polling the record, so there is nothing to do.
        Some(
            ExchangeState::RequestSent
            | ExchangeState::Verified
            | ExchangeState::Abandoned
            | ExchangeState::Other(_),
        )
        | None => {}
    }

    Ok(StatusCode::OK)
}

/// POST /verified
///
/// Called by the browser while it waits. The body is the raw exchange id; the response is the
/// full exchange record.
pub async fn verified(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<ExchangeRecord>, AppError> {
    let Some(exchange_id) = ExchangeId::parse(&body) else {
        return Err(AppError::BadRequest("exchange id is required".into()));
    };

    let record = state
        .verifier
        .get_record(&exchange_id)
        .await
        .map_err(|e| {
            warn!("Failed to get record for {exchange_id}: {e}");
            AppError::from_agent(e, "Getting presentation record failed.")
        })?;

    Ok(Json(record))
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub pres_ex_id: Option<String>,
    pub timeout: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Exchange the browser polls for
    pub pres_ex_id: ExchangeId,
    /// URL to encode in the QR code for the wallet
    pub wallet_url: String,
    /// Polling endpoint
    pub status_url: String,
    #[serde(flatten)]
    pub poll: PollConfig,
}

/// GET /login
///
/// - `?pres_ex_id=<id>` completes a login and redirects home.
/// - `?timeout=true` acknowledges a timed out login.
/// - otherwise starts a login by creating a new exchange.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
) -> Result<Response, AppError> {
    if let Some(raw) = query.pres_ex_id {
        let Some(exchange_id) = ExchangeId::parse(&raw) else {
            return Err(AppError::BadRequest("exchange id is required".into()));
        };

        let session = state
            .handoff
            .authenticate(&exchange_id)
            .await
            .map_err(|e| {
                warn!("Authentication with {exchange_id} failed: {e}");
                AppError::from(e)
            })?;

        info!("Session {} established for {}", session.id, session.user.email);
        return Ok(Redirect::to(state.home_url.as_str()).into_response());
    }

    if query.timeout.is_some() {
        return Ok((
            StatusCode::OK,
            "Verifiable credential login has timed out.",
        )
            .into_response());
    }

    let exchange_id = state.verifier.create_exchange().await.map_err(|e| {
        error!("Failed to create presentation request: {e}");
        AppError::from_agent(e, "Failed to create presentation request.")
    })?;

    let wallet_url = state
        .verifier
        .wallet_fetch_url(&exchange_id)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let status_url = state
        .public_url
        .join("verified")
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(LoginResponse {
        pres_ex_id: exchange_id,
        wallet_url: wallet_url.to_string(),
        status_url: status_url.to_string(),
        poll: state.poll,
    })
    .into_response())
}

/// Request-terminating failure. Rendered as a short plaintext message.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Unauthorized(String),
    BadGateway(String),
    Internal(String),
}

impl AppError {
    fn from_agent(e: AgentError, message: &str) -> Self {
        match e {
            AgentError::Request(_) => AppError::Internal(message.into()),
            _ => AppError::BadGateway(message.into()),
        }
    }
}

impl From<HandoffError> for AppError {
    fn from(e: HandoffError) -> Self {
        match e {
            HandoffError::Fetch(_) => {
                AppError::NotFound("Getting presentation record failed.".into())
            }
            HandoffError::StateMismatch(_) | HandoffError::AttributeAbsent(_) => {
                AppError::Unauthorized("Presentation is not verified.".into())
            }
            HandoffError::Identity(_) => AppError::Internal("Login failed.".into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, message).into_response()
    }
}
