use std::time::Duration;

use http::Method;
use serde_json::json;
use tokio::time::Instant;
use vc_login::{
    core::{
        did::ServiceBlock,
        exchange::{ExchangeId, ExchangeState, NAME_REFERENT},
    },
    poll::{PollConfig, PollOutcome, Poller},
    verifier::{agent::AgentError, handoff::HandoffError, session::MemoryIdentityProvider},
};

mod mock_agent;

use mock_agent::{MockAgent, AGENT_URL, VERKEY};

#[tokio::test]
async fn verified_presentation_logs_in() {
    let agent = MockAgent::new();
    let verifier = agent.verifier();
    let identities = MemoryIdentityProvider::default();
    let handoff = agent.handoff(identities.clone());

    let id = verifier.create_exchange().await.unwrap();
    assert_eq!(id, ExchangeId::from("ex-1"));

    let record = verifier.get_record(&id).await.unwrap();
    assert_eq!(record.state, ExchangeState::RequestSent);

    agent.receive_presentation("ex-1", "Jane Doe");
    assert!(verifier.request_verification(&id).await);

    let record = verifier.get_record(&id).await.unwrap();
    assert_eq!(record.state, ExchangeState::Verified);
    assert_eq!(record.revealed_attr(NAME_REFERENT).unwrap().raw, "Jane Doe");

    let session = handoff.authenticate(&id).await.unwrap();
    assert_eq!(session.user.email, "janedoe@matrixgroup.net");
    assert_eq!(session.user.login, "janedoe");
    assert_eq!(identities.sessions().await, vec![session]);
    assert!(!agent.has_record("ex-1"));
}

#[tokio::test]
async fn returning_user_is_not_provisioned_twice() {
    let agent = MockAgent::new();
    let verifier = agent.verifier();
    let identities = MemoryIdentityProvider::default();
    let handoff = agent.handoff(identities.clone());

    for _ in 0..2 {
        let id = verifier.create_exchange().await.unwrap();
        agent.receive_presentation(id.as_str(), "Jane Doe");
        assert!(verifier.request_verification(&id).await);
        handoff.authenticate(&id).await.unwrap();
    }

    assert_eq!(identities.users().await.len(), 1);
    assert_eq!(identities.sessions().await.len(), 1);
}

#[tokio::test]
async fn replayed_exchange_id_fails() {
    let agent = MockAgent::new();
    let verifier = agent.verifier();
    let identities = MemoryIdentityProvider::default();
    let handoff = agent.handoff(identities.clone());

    let id = verifier.create_exchange().await.unwrap();
    agent.receive_presentation(id.as_str(), "Jane Doe");
    assert!(verifier.request_verification(&id).await);
    let first = handoff.authenticate(&id).await.unwrap();

    let replay = handoff.authenticate(&id).await;
    assert!(matches!(replay, Err(HandoffError::Fetch(_))));
    assert_eq!(identities.sessions().await, vec![first]);
}

#[tokio::test]
async fn failed_delete_does_not_block_login() {
    let agent = MockAgent::new();
    agent.fail_deletes();
    let verifier = agent.verifier();
    let identities = MemoryIdentityProvider::default();
    let handoff = agent.handoff(identities.clone());

    let id = verifier.create_exchange().await.unwrap();
    agent.receive_presentation(id.as_str(), "Jane Doe");
    assert!(verifier.request_verification(&id).await);

    let session = handoff.authenticate(&id).await.unwrap();
    assert_eq!(session.user.email, "janedoe@matrixgroup.net");
    assert_eq!(identities.sessions().await, vec![session]);

    assert_eq!(agent.count_calls(&Method::DELETE, "/records/ex-1"), 1);
    assert!(agent.has_record("ex-1"));
}

#[tokio::test]
async fn unverified_states_never_log_in() {
    for state in ["request_sent", "presentation_received", "abandoned"] {
        let agent = MockAgent::new();
        let verifier = agent.verifier();
        let identities = MemoryIdentityProvider::default();
        let handoff = agent.handoff(identities.clone());

        let id = verifier.create_exchange().await.unwrap();
        agent.receive_presentation(id.as_str(), "Jane Doe");
        agent.set_state(id.as_str(), state);

        let result = handoff.authenticate(&id).await;
        match result {
            Err(HandoffError::StateMismatch(observed)) => {
                assert_eq!(observed, ExchangeState::from(state))
            }
            other => panic!("expected a state mismatch for {state}, got {other:?}"),
        }

        assert!(identities.users().await.is_empty());
        assert!(identities.sessions().await.is_empty());
        assert!(agent.has_record(id.as_str()));
        assert_eq!(agent.count_calls(&Method::DELETE, id.as_str()), 0);
    }
}

#[tokio::test]
async fn rejected_presentation_is_abandoned() {
    let agent = MockAgent::new();
    agent.reject_presentations();
    let verifier = agent.verifier();
    let handoff = agent.handoff(MemoryIdentityProvider::default());

    let id = verifier.create_exchange().await.unwrap();
    agent.receive_presentation(id.as_str(), "Jane Doe");

    // Processed, but did not pass.
    assert!(verifier.request_verification(&id).await);
    assert_eq!(
        verifier.get_record(&id).await.unwrap().state,
        ExchangeState::Abandoned
    );
    assert!(matches!(
        handoff.authenticate(&id).await,
        Err(HandoffError::StateMismatch(ExchangeState::Abandoned))
    ));
}

#[tokio::test]
async fn missing_name_attribute_fails() {
    let agent = MockAgent::new();
    let verifier = agent.verifier();
    let identities = MemoryIdentityProvider::default();
    let handoff = agent.handoff(identities.clone());

    let id = verifier.create_exchange().await.unwrap();
    agent.receive_presentation(id.as_str(), "Jane Doe");
    assert!(verifier.request_verification(&id).await);
    agent.remove_presentation(id.as_str());

    assert!(matches!(
        handoff.authenticate(&id).await,
        Err(HandoffError::AttributeAbsent(NAME_REFERENT))
    ));
    assert!(identities.sessions().await.is_empty());
}

#[tokio::test]
async fn verification_is_refused_before_a_presentation_arrives() {
    let agent = MockAgent::new();
    let verifier = agent.verifier();

    let id = verifier.create_exchange().await.unwrap();
    assert!(!verifier.request_verification(&id).await);
    assert_eq!(
        verifier.get_record(&id).await.unwrap().state,
        ExchangeState::RequestSent
    );
}

#[tokio::test]
async fn get_record_is_idempotent() {
    let agent = MockAgent::new();
    let verifier = agent.verifier();

    let id = verifier.create_exchange().await.unwrap();
    agent.receive_presentation(id.as_str(), "Jane Doe");

    let first = verifier.get_record(&id).await.unwrap();
    let second = verifier.get_record(&id).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.state, ExchangeState::PresentationReceived);
}

#[tokio::test]
async fn connectionless_payload_carries_service_block() {
    let agent = MockAgent::new();
    let verifier = agent.verifier();

    let id = verifier.create_exchange().await.unwrap();
    let payload = verifier.build_connectionless_payload(&id).await.unwrap();

    assert_eq!(
        payload["@type"],
        "https://didcomm.org/present-proof/1.0/request-presentation"
    );
    assert_eq!(
        payload[ServiceBlock::DECORATOR],
        json!({
            "recipientKeys": [VERKEY],
            "serviceEndpoint": format!("{AGENT_URL}/")
        })
    );
}

#[tokio::test]
async fn connectionless_payload_for_unknown_exchange_fails() {
    let agent = MockAgent::new();
    let verifier = agent.verifier();

    let result = verifier
        .build_connectionless_payload(&"ex-unknown".into())
        .await;
    assert!(matches!(result, Err(AgentError::MalformedBody(_))));

    // The DID lookups would have succeeded on their own.
    assert!(verifier.did_endpoint_info().await.is_ok());
}

#[tokio::test]
async fn agent_outage_is_reported() {
    let agent = MockAgent::new();
    let verifier = agent.verifier();
    agent.set_offline(true);

    assert!(matches!(
        verifier.create_exchange().await,
        Err(AgentError::Transport(_))
    ));
    assert!(matches!(
        verifier.build_connectionless_payload(&"ex-1".into()).await,
        Err(AgentError::Transport(_))
    ));
}

#[tokio::test]
async fn register_endpoint_publishes_agent_url() {
    let agent = MockAgent::new();
    let verifier = vc_login::verifier::Verifier::builder()
        .with_http_client(std::sync::Arc::new(agent.clone()))
        .with_admin_url(MockAgent::admin_url())
        .with_public_url(mock_agent::PUBLIC_URL.parse().unwrap())
        .with_agent_endpoint("http://agent.example.com:9030".parse().unwrap())
        .build()
        .unwrap();

    verifier.register_endpoint().await.unwrap();
    assert_eq!(
        agent.registered_endpoint().as_deref(),
        Some("http://agent.example.com:9030/")
    );
}

#[tokio::test(start_paused = true)]
async fn polling_observes_verification() {
    let agent = MockAgent::new();
    let verifier = agent.verifier();
    let id = verifier.create_exchange().await.unwrap();

    let poller = Poller::new(verifier.clone(), id.clone(), PollConfig::default());
    let handle = poller.stop_handle();
    let task = tokio::spawn(poller.run());

    tokio::time::sleep(Duration::from_millis(1_050)).await;
    agent.receive_presentation(id.as_str(), "Jane Doe");
    assert!(verifier.request_verification(&id).await);

    assert_eq!(
        task.await.unwrap().unwrap(),
        PollOutcome::Verified {
            redirect: "/login?pres_ex_id=ex-1".into()
        }
    );
    assert!(!handle.state().polling);

    let polls = agent.count_calls(&Method::GET, "/records/ex-1");
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(agent.count_calls(&Method::GET, "/records/ex-1"), polls);
}

#[tokio::test(start_paused = true)]
async fn polling_times_out_without_notification() {
    let agent = MockAgent::new();
    let verifier = agent.verifier();
    let id = verifier.create_exchange().await.unwrap();
    let config = PollConfig::from_millis(200, 60_000).unwrap();

    let start = Instant::now();
    let outcome = Poller::new(verifier, id, config).run().await.unwrap();

    assert_eq!(
        outcome,
        PollOutcome::TimedOut {
            redirect: "/login?timeout=true".into()
        }
    );
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(60_000));
    assert!(elapsed <= Duration::from_millis(60_200));
}

#[tokio::test(start_paused = true)]
async fn polling_stops_on_agent_error() {
    let agent = MockAgent::new();
    let verifier = agent.verifier();
    let id = verifier.create_exchange().await.unwrap();
    agent.set_offline(true);

    let result = Poller::new(verifier, id, PollConfig::default()).run().await;
    assert!(result.is_err());
}
