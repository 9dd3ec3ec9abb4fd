use std::{path::PathBuf, str::FromStr};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use url::Url;

use crate::{core::proof_request::CreateProofRequest, poll::PollConfig};

/// Process-wide settings, built once at startup and handed to each component.
#[derive(Debug, Clone)]
pub struct Config {
    /// Verifier agent's admin API.
    pub admin_url: BaseUrl,
    /// Where this service is reachable by wallets and browsers.
    pub public_url: BaseUrl,
    /// Verifier agent's DIDComm endpoint, published against its public DID.
    pub agent_url: Url,
    /// Where a logged in user is sent.
    pub home_url: Url,
    /// Suffix of the identity key derived from a revealed name.
    pub identity_domain: String,
    pub poll: PollConfig,
    pub proof_request: CreateProofRequest,
    pub strict_agent_status: bool,
}

#[derive(Parser, Debug, Clone)]
#[command(about = "Verifiable credential login backed by a verifier agent")]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8888", env = "PORT")]
    pub port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    pub host: String,

    /// Log level
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,

    /// Verifier agent admin API
    #[arg(long, env = "ADMIN_URL")]
    pub admin_url: BaseUrl,

    /// Public URL of this service (used for the wallet fetch URL and out-of-band redirects)
    #[arg(long, env = "PUBLIC_URL")]
    pub public_url: BaseUrl,

    /// Verifier agent's public DIDComm endpoint
    #[arg(long, env = "AGENT_URL")]
    pub agent_url: Url,

    /// Redirect target after a successful login (defaults to the public URL)
    #[arg(long, env = "HOME_URL")]
    pub home_url: Option<Url>,

    /// Domain appended to revealed names to form identity keys
    #[arg(long, default_value = "matrixgroup.net", env = "IDENTITY_DOMAIN")]
    pub identity_domain: String,

    /// Time between status polls, in milliseconds
    #[arg(long, default_value = "200", env = "POLL_INTERVAL_MS")]
    pub poll_interval_ms: u64,

    /// Total polling budget before the login times out, in milliseconds
    #[arg(long, default_value = "60000", env = "POLL_MAX_WAIT_MS")]
    pub poll_max_wait_ms: u64,

    /// JSON proof request to send instead of the bundled one
    #[arg(long, env = "PROOF_REQUEST")]
    pub proof_request: Option<PathBuf>,

    /// Override the proof request's connection id
    #[arg(long, env = "CONNECTION_ID")]
    pub connection_id: Option<String>,

    /// Treat non-2xx admin API responses as failures
    #[arg(long, default_value = "false", env = "STRICT_AGENT_STATUS")]
    pub strict_agent_status: bool,
}

impl Args {
    pub fn into_config(self) -> Result<Config> {
        let mut proof_request = match &self.proof_request {
            Some(path) => CreateProofRequest::from_file(path)?,
            None => CreateProofRequest::bundled()?,
        };
        if let Some(connection_id) = self.connection_id {
            proof_request.connection_id = Some(connection_id);
        }

        let home_url = self
            .home_url
            .unwrap_or_else(|| self.public_url.as_url().clone());

        let identity_domain = self.identity_domain.trim().to_lowercase();
        anyhow::ensure!(
            !identity_domain.is_empty(),
            "identity domain must not be empty"
        );

        Ok(Config {
            admin_url: self.admin_url,
            public_url: self.public_url,
            agent_url: self.agent_url,
            home_url,
            identity_domain,
            poll: PollConfig::from_millis(self.poll_interval_ms, self.poll_max_wait_ms)
                .context("invalid polling configuration")?,
            proof_request,
            strict_agent_status: self.strict_agent_status,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A url that is always a base (can be safely join()'ed with further path elements without
/// mangling).
#[derive(Deserialize, Debug, Clone, Hash, PartialEq, Eq)]
#[serde(try_from = "String")]
pub struct BaseUrl(Url);

impl BaseUrl {
    pub fn as_url(&self) -> &Url {
        &self.0
    }
}

impl std::ops::Deref for BaseUrl {
    type Target = Url;

    fn deref(&self) -> &Url {
        &self.0
    }
}

impl TryFrom<String> for BaseUrl {
    type Error = url::ParseError;

    fn try_from(mut url: String) -> Result<Self, Self::Error> {
        // Make URL a base.
        if !url.ends_with('/') {
            url += "/"
        }
        url.parse().map(Self)
    }
}

impl FromStr for BaseUrl {
    type Err = url::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_owned())
    }
}

impl std::fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
