use std::error::Error;

use serde_json::json;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use connect_sdk::{
    Connect, Credential, CredentialStore, InboundRequest, QueryParams, TokenVerifier,
};

const SECRET: &str = "integration secret";

fn store_for(base_url: &str) -> CredentialStore {
    let mut store = CredentialStore::new();
    store.register(Credential::new("tenant-1", "PUBKEY", SECRET, base_url));
    store
}

#[tokio::test]
async fn signed_request_carries_a_verifiable_token() -> Result<(), Box<dyn Error>> {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/api/2/issue/10001"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "10001"})))
        .mount(&mock_server)
        .await;

    let connect = Connect::builder()
        .issuer("tenant-1")
        .base_url(mock_server.uri())
        .store(store_for(&mock_server.uri()))
        .build()?;

    let response = connect
        .send_signed(
            reqwest::Method::GET,
            &format!("{}/rest/api/2/issue/10001?fields=summary", mock_server.uri()),
            None,
        )
        .await?;
    assert_eq!(response.status(), 200);

    // Replay the captured request through the verifier, the way the
    // receiving service would.
    let received = mock_server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);

    let authorization = received[0]
        .headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    assert!(authorization.as_deref().unwrap_or("").starts_with("JWT "));

    let mut query = QueryParams::new();
    query.insert("fields".to_string(), vec!["summary".to_string()]);

    let verifier = TokenVerifier::new(store_for(&mock_server.uri()), mock_server.uri());
    let payload = verifier.verify_request(&InboundRequest {
        method: "GET".to_string(),
        path: "/rest/api/2/issue/10001".to_string(),
        query,
        authorization,
        ..InboundRequest::default()
    })?;
    assert_eq!(payload["iss"], "tenant-1");
    assert!(payload.contains_key("qsh"));

    Ok(())
}

#[tokio::test]
async fn signed_request_attaches_the_json_body() -> Result<(), Box<dyn Error>> {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/api/2/issue"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "10002"})))
        .mount(&mock_server)
        .await;

    let connect = Connect::builder()
        .issuer("tenant-1")
        .base_url(mock_server.uri())
        .store(store_for(&mock_server.uri()))
        .build()?;

    let body = json!({"fields": {"summary": "Created over the wire"}});
    let response = connect
        .send_signed(
            reqwest::Method::POST,
            &format!("{}/rest/api/2/issue", mock_server.uri()),
            Some(&body),
        )
        .await?;
    assert_eq!(response.status(), 201);

    let received = mock_server.received_requests().await.unwrap();
    let sent: serde_json::Value = serde_json::from_slice(&received[0].body)?;
    assert_eq!(sent["fields"]["summary"], "Created over the wire");

    Ok(())
}

#[tokio::test]
async fn sending_to_an_unknown_tenant_never_hits_the_wire() -> Result<(), Box<dyn Error>> {
    let mock_server = MockServer::start().await;

    let connect = Connect::builder()
        .issuer("tenant-1")
        .base_url(mock_server.uri())
        .build()?;

    let result = connect
        .send_signed(
            reqwest::Method::GET,
            &format!("{}/rest/api/2/issue/10001", mock_server.uri()),
            None,
        )
        .await;
    assert!(result.is_err());

    let received = mock_server.received_requests().await.unwrap();
    assert!(received.is_empty());

    Ok(())
}

#[tokio::test]
async fn verifier_rejects_a_token_replayed_against_another_request() -> Result<(), Box<dyn Error>> {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let connect = Connect::builder()
        .issuer("tenant-1")
        .base_url(mock_server.uri())
        .store(store_for(&mock_server.uri()))
        .build()?;

    connect
        .send_signed(
            reqwest::Method::GET,
            &format!("{}/rest/api/2/issue/10001", mock_server.uri()),
            None,
        )
        .await?;

    let received = mock_server.received_requests().await.unwrap();
    let authorization = received[0]
        .headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let verifier = TokenVerifier::new(store_for(&mock_server.uri()), mock_server.uri());
    let replayed = InboundRequest {
        method: "GET".to_string(),
        path: "/rest/api/2/issue/99999".to_string(),
        authorization,
        ..InboundRequest::default()
    };
    assert!(verifier.verify_request(&replayed).is_err());

    Ok(())
}
