use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use url::Url;

use crate::{
    config::{BaseUrl, Config},
    core::util::AsyncHttpClient,
    poll::PollConfig,
    verifier::{handoff::Handoff, session::IdentityProvider, Verifier},
};

mod handlers;

pub use handlers::{AgentNotification, AppError, LoginResponse};

/// Shared by every handler. Holds no exchange state of its own.
#[derive(Debug, Clone)]
pub struct AppState {
    pub verifier: Verifier,
    pub handoff: Handoff,
    pub public_url: BaseUrl,
    pub home_url: Url,
    pub poll: PollConfig,
}

impl AppState {
    pub fn new(
        config: &Config,
        http_client: Arc<dyn AsyncHttpClient + Send + Sync>,
        identities: Arc<dyn IdentityProvider + Send + Sync>,
    ) -> Result<Self> {
        let verifier = Verifier::builder()
            .with_http_client(http_client)
            .with_admin_url(config.admin_url.clone())
            .with_public_url(config.public_url.clone())
            .with_agent_endpoint(config.agent_url.clone())
            .with_proof_request(config.proof_request.clone())
            .strict_status(config.strict_agent_status)
            .build()?;

        let handoff = Handoff::new(verifier.clone(), identities, &config.identity_domain);

        Ok(Self {
            verifier,
            handoff,
            public_url: config.public_url.clone(),
            home_url: config.home_url.clone(),
            poll: config.poll,
        })
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Wallet fetches the connectionless request here after scanning the QR code
        .route(
            "/webhooks/pres_req/:exchange_id",
            get(handlers::wallet_fetch),
        )
        // Verifier agent reports exchange state changes here
        .route("/topic/:topic", post(handlers::agent_topic))
        // Browser polls the exchange state here
        .route("/verified", post(handlers::verified))
        // Starts a login, completes it, or acknowledges a timeout
        .route("/login", get(handlers::login))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}
