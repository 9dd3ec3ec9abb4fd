use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vc_login::{
    config::Args,
    core::util::ReqwestClient,
    server::{create_router, AppState},
    verifier::session::MemoryIdentityProvider,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let addr = args.listen_addr();
    let config = args.into_config()?;

    let http_client = Arc::new(ReqwestClient::new()?);
    let identities = Arc::new(MemoryIdentityProvider::default());
    let state = Arc::new(AppState::new(&config, http_client, identities)?);

    if let Err(e) = state.verifier.register_endpoint().await {
        warn!("Failed to publish agent endpoint {}: {e}", config.agent_url);
    }

    info!("Admin API: {}", config.admin_url);
    info!("Public URL: {}", config.public_url);
    info!(
        "Polling every {:?} for up to {:?}",
        config.poll.interval, config.poll.max_wait
    );

    let app = create_router(state);

    info!("Listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
