//! Turns a verified presentation exchange into a login.

use std::sync::Arc;

use base64::prelude::*;
use rand::RngCore;
use tracing::{info, warn};

use crate::core::exchange::{ExchangeId, ExchangeState, NAME_REFERENT};

use super::{
    agent::AgentError,
    session::{IdentityProvider, Session, User},
    Verifier,
};

#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    /// The record could not be read, including when it was already consumed.
    #[error("getting presentation record failed: {0}")]
    Fetch(#[source] AgentError),
    #[error("presentation exchange is {0}, not verified")]
    StateMismatch(ExchangeState),
    #[error("presentation does not reveal `{0}`")]
    AttributeAbsent(&'static str),
    #[error("identity provider failed: {0:#}")]
    Identity(anyhow::Error),
}

/// Logs users in from verified presentation exchanges.
#[derive(Debug, Clone)]
pub struct Handoff {
    verifier: Verifier,
    identities: Arc<dyn IdentityProvider + Send + Sync>,
    domain: String,
}

impl Handoff {
    pub fn new(
        verifier: Verifier,
        identities: Arc<dyn IdentityProvider + Send + Sync>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            verifier,
            identities,
            domain: domain.into(),
        }
    }

    /// Establish a session for the holder of a verified exchange.
    ///
    /// The exchange id comes from the browser and is not trusted: nothing happens unless the
    /// agent reports the exchange as verified. Once the name is read the exchange is deleted,
    /// so presenting the same id again fails at the fetch.
    pub async fn authenticate(&self, id: &ExchangeId) -> Result<Session, HandoffError> {
        let record = self
            .verifier
            .get_record(id)
            .await
            .map_err(HandoffError::Fetch)?;

        match &record.state {
            ExchangeState::Verified => {}
            state => {
                warn!("refusing to authenticate {id} in state {state}");
                return Err(HandoffError::StateMismatch(state.clone()));
            }
        }

        let name = record
            .revealed_attr(NAME_REFERENT)
            .ok_or(HandoffError::AttributeAbsent(NAME_REFERENT))?
            .raw
            .clone();

        // The login proceeds whether or not the delete succeeds.
        let (deleted, user) = tokio::join!(
            self.verifier.delete_exchange(id),
            self.resolve_user(&name)
        );
        if !deleted {
            warn!("presentation exchange {id} was not deleted and may linger on the agent");
        }

        let session = self
            .identities
            .establish_session(&user?)
            .await
            .map_err(HandoffError::Identity)?;
        info!("user {} logged in with exchange {id}", session.user.login);
        Ok(session)
    }

    async fn resolve_user(&self, name: &str) -> Result<User, HandoffError> {
        let (login, email) = identity_key(name, &self.domain);

        if let Some(user) = self
            .identities
            .find_by_email(&email)
            .await
            .map_err(HandoffError::Identity)?
        {
            return Ok(user);
        }

        info!("provisioning account {email}");
        self.identities
            .create_user(&login, &generate_secret(), &email)
            .await
            .map_err(HandoffError::Identity)
    }
}

/// Derive the login and identity key for a revealed name: whitespace removed, lower-cased,
/// with `@domain` appended for the key.
pub fn identity_key(name: &str, domain: &str) -> (String, String) {
    let login: String = name
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    let email = format!("{login}@{domain}");
    (login, email)
}

/// Random credential material for accounts that only ever log in with a presentation.
fn generate_secret() -> String {
    let mut bytes = [0u8; 64];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}
