//! Password-less login backed by verifiable credential presentations.
//!
//! A user logs in by presenting a credential from their mobile wallet. The proof request is
//! delivered connectionless (the request carries its own `~service` endpoint and key) and the
//! cryptographic verification is done by a remote verifier agent, reached through its admin
//! API. This crate drives the exchange and turns a verified presentation into a session.
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use vc_login::core::util::ReqwestClient;
//! use vc_login::poll::{PollConfig, PollOutcome, Poller};
//! use vc_login::verifier::{handoff::Handoff, session::MemoryIdentityProvider, Verifier};
//!
//! // Setup verifier.
//! let verifier = Verifier::builder()
//!     .with_http_client(Arc::new(ReqwestClient::new()?))
//!     .with_admin_url("http://agent.example.com:8031".parse()?)
//!     .with_public_url("https://login.example.com".parse()?)
//!     .with_agent_endpoint("http://agent.example.com:8030".parse()?)
//!     .build()?;
//!
//! // Publish the agent endpoint wallets will answer to.
//! verifier.register_endpoint().await?;
//!
//! // Create an exchange and show its wallet URL as a QR code.
//! let exchange_id = verifier.create_exchange().await?;
//! let qr_code = generate_qr_code(&verifier.wallet_fetch_url(&exchange_id)?);
//!
//! // Wait for the agent to report the presentation as verified.
//! let outcome = Poller::new(verifier.clone(), exchange_id.clone(), PollConfig::default())
//!     .run()
//!     .await?;
//!
//! // Log the holder in.
//! if let PollOutcome::Verified { .. } = outcome {
//!     let handoff = Handoff::new(verifier, Arc::new(MemoryIdentityProvider::default()), "example.com");
//!     let session = handoff.authenticate(&exchange_id).await?;
//! }
//! ```
//!
//! # Protocol Overview
//!
//! 1. *Login page*: the browser asks for a login; [`Verifier::create_exchange`] creates a
//!    presentation exchange on the agent from the configured [`CreateProofRequest`].
//! 2. *Wallet fetch*: the wallet scans the QR code and fetches
//!    `GET /webhooks/pres_req/{id}`. [`Verifier::build_connectionless_payload`] merges the
//!    request with the agent's `~service` block and the wallet is redirected to the
//!    out-of-band payload.
//! 3. *Presentation*: the wallet submits its proof directly to the agent.
//! 4. *Agent notification*: the agent calls `POST /topic/{topic}`; on
//!    `presentation_received` the presentation is sent for verification.
//! 5. *Polling*: meanwhile the browser polls `POST /verified` through a [`Poller`] until the
//!    record reads `verified` or the polling budget runs out.
//! 6. *Handoff*: the browser lands on `/login?pres_ex_id={id}`; [`Handoff::authenticate`]
//!    re-checks the state, reads the revealed name, deletes the exchange, and establishes a
//!    session.
//!
//! The exchange's state lives only on the agent. Nothing here caches it, and deleting the
//! exchange after use is what stops an id from being replayed.
//!
//! [`Verifier::create_exchange`]: crate::verifier::Verifier::create_exchange
//! [`Verifier::build_connectionless_payload`]: crate::verifier::Verifier::build_connectionless_payload
//! [`CreateProofRequest`]: crate::core::proof_request::CreateProofRequest
//! [`Poller`]: crate::poll::Poller
//! [`Handoff::authenticate`]: crate::verifier::handoff::Handoff::authenticate

pub mod config;
pub mod core;
pub mod poll;
pub mod server;
pub mod verifier;
