//! Integration Tests for the Invocation Server
//!
//! These tests run the server in-process on an ephemeral port and talk to it
//! over HTTP:
//! - Echo invocations and their signed receipts
//! - Delegated invocations and failure receipts
//! - Content negotiation and malformed envelopes
//! - Health and shutdown endpoints

use chrono::Duration as ChronoDuration;
use proptest::prelude::*;
use reqwest::{header, Client, StatusCode};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::time::timeout;

use invocation_core::{
    Capability, Delegation, Invocation, InvocationRequest, Receipt, ReceiptResponse, Signer,
    UcanBuilder,
};
use invocation_server::api::HealthResponse;
use invocation_server::{start, LifecycleState, RunningServer, ServerConfig};

// =============================================================================
// Test Helpers
// =============================================================================

async fn spawn_server(grace: Duration) -> RunningServer {
    let config = ServerConfig::default().with_shutdown_grace(grace);
    start(&config).await.expect("Failed to start server")
}

fn client() -> Client {
    Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .expect("Failed to build client")
}

fn echo(issuer: &Signer, server: &RunningServer, text: &str) -> Invocation {
    UcanBuilder::new(issuer)
        .audience(server.id().clone())
        .capability(Capability::new("test/echo", issuer.did().as_str()).with_caveat("echo", text))
        .invoke()
        .expect("Failed to create invocation")
}

async fn post(client: &Client, server: &RunningServer, invocations: &[&Invocation]) -> reqwest::Response {
    let body = InvocationRequest::new(invocations.iter().copied()).to_bytes().unwrap();
    client
        .post(server.url())
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCEPT, "application/json")
        .body(body)
        .send()
        .await
        .expect("Request failed")
}

async fn receipts(response: reqwest::Response) -> Vec<Receipt> {
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.bytes().await.unwrap();
    ReceiptResponse::from_bytes(&bytes).unwrap().decode_receipts().unwrap()
}

async fn echo_over_http(text: &str) -> Value {
    let server = spawn_server(Duration::ZERO).await;
    let alice = Signer::generate();
    let invocation = echo(&alice, &server, text);

    let receipts = receipts(post(&client(), &server, &[&invocation]).await).await;
    receipts[0].out().ok().cloned().expect("expected a success receipt")
}

// =============================================================================
// Echo
// =============================================================================

#[tokio::test]
async fn test_echo_receipt_is_signed_by_server() {
    let server = spawn_server(Duration::ZERO).await;
    let alice = Signer::generate();
    let invocation = echo(&alice, &server, "hello");

    let receipts = receipts(post(&client(), &server, &[&invocation]).await).await;

    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].issuer(), server.id());
    assert_eq!(receipts[0].ran(), invocation.id());
    assert_eq!(receipts[0].out().ok(), Some(&json!({ "echo": "hello" })));
}

#[tokio::test]
async fn test_echo_edge_payloads() {
    let payloads = vec![
        String::new(),
        "with \"quotes\" and \\ slashes".to_string(),
        "ünïcødé ✓".to_string(),
        "x".repeat(10_000),
    ];

    for text in payloads {
        assert_eq!(echo_over_http(&text).await, json!({ "echo": text }));
    }
}

#[tokio::test]
async fn test_distinct_payloads_are_independent() {
    let server = spawn_server(Duration::ZERO).await;
    let client = client();
    let alice = Signer::generate();
    let bob = Signer::generate();

    let a = echo(&alice, &server, "a");
    let b = echo(&bob, &server, "b");

    let (a_batch, b_batch) = ([&a], [&b]);
    let (ra, rb) = tokio::join!(post(&client, &server, &a_batch), post(&client, &server, &b_batch));
    let (ra, rb) = (receipts(ra).await, receipts(rb).await);

    assert_eq!(ra[0].out().ok(), Some(&json!({ "echo": "a" })));
    assert_eq!(rb[0].out().ok(), Some(&json!({ "echo": "b" })));
    assert_ne!(ra[0].ran(), rb[0].ran());
}

#[tokio::test]
async fn test_any_path_dispatches() {
    let server = spawn_server(Duration::ZERO).await;
    let alice = Signer::generate();
    let invocation = echo(&alice, &server, "nested");

    let response = client()
        .post(format!("{}/some/path", server.url()))
        .header(header::CONTENT_TYPE, "application/json")
        .body(InvocationRequest::new([&invocation]).to_bytes().unwrap())
        .send()
        .await
        .unwrap();

    let receipts = receipts(response).await;
    assert_eq!(receipts[0].out().ok(), Some(&json!({ "echo": "nested" })));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Any string comes back unchanged
    #[test]
    fn prop_echo_law(text in "\\PC{0,64}") {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let out = runtime.block_on(echo_over_http(&text));
        prop_assert_eq!(out, json!({ "echo": text }));
    }
}

// =============================================================================
// Delegation
// =============================================================================

fn delegate(from: &Signer, to: &Signer, capability: Capability) -> Delegation {
    UcanBuilder::new(from)
        .audience(to.did().clone())
        .capability(capability)
        .delegate()
        .expect("Failed to create delegation")
}

#[tokio::test]
async fn test_delegated_echo_succeeds() {
    let server = spawn_server(Duration::ZERO).await;
    let alice = Signer::generate();
    let bob = Signer::generate();

    let proof = delegate(&alice, &bob, Capability::new("test/*", alice.did().as_str()));
    let invocation = UcanBuilder::new(&bob)
        .audience(server.id().clone())
        .capability(Capability::new("test/echo", alice.did().as_str()).with_caveat("echo", "on behalf"))
        .proof(&proof)
        .invoke()
        .unwrap();

    let receipts = receipts(post(&client(), &server, &[&invocation]).await).await;
    assert_eq!(receipts[0].out().ok(), Some(&json!({ "echo": "on behalf" })));
}

#[tokio::test]
async fn test_failures_are_reported_in_receipts() {
    let server = spawn_server(Duration::ZERO).await;
    let alice = Signer::generate();
    let bob = Signer::generate();

    // Caveat escalation
    let pinned = delegate(&alice, &bob, Capability::new("test/echo", alice.did().as_str()).with_caveat("echo", "a"));
    let escalated = UcanBuilder::new(&bob)
        .audience(server.id().clone())
        .capability(Capability::new("test/echo", alice.did().as_str()).with_caveat("echo", "b"))
        .proof(&pinned)
        .invoke()
        .unwrap();

    // No proof at all
    let unproven = UcanBuilder::new(&bob)
        .audience(server.id().clone())
        .capability(Capability::new("test/echo", alice.did().as_str()).with_caveat("echo", "c"))
        .invoke()
        .unwrap();

    // Expired
    let expired = UcanBuilder::new(&alice)
        .audience(server.id().clone())
        .capability(Capability::new("test/echo", alice.did().as_str()).with_caveat("echo", "d"))
        .expires_in(ChronoDuration::seconds(-60))
        .invoke()
        .unwrap();

    // Wrong caveat shape
    let malformed = UcanBuilder::new(&alice)
        .audience(server.id().clone())
        .capability(Capability::new("test/echo", alice.did().as_str()).with_caveat("shout", "e"))
        .invoke()
        .unwrap();

    let receipts = receipts(post(&client(), &server, &[&escalated, &unproven, &expired, &malformed]).await).await;
    let names: Vec<_> = receipts
        .iter()
        .map(|r| r.out().error().map(|f| f.name.clone()))
        .collect();

    assert_eq!(
        names,
        vec![
            Some("Unauthorized".to_string()),
            Some("Unauthorized".to_string()),
            Some("Expired".to_string()),
            Some("MalformedCapability".to_string()),
        ]
    );
}

// =============================================================================
// Transport errors
// =============================================================================

#[tokio::test]
async fn test_unknown_ability_is_internal_error() {
    let server = spawn_server(Duration::ZERO).await;
    let alice = Signer::generate();
    let invocation = UcanBuilder::new(&alice)
        .audience(server.id().clone())
        .capability(Capability::new("test/missing", alice.did().as_str()))
        .invoke()
        .unwrap();

    let response = post(&client(), &server, &[&invocation]).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "HANDLER_NOT_FOUND");
}

#[tokio::test]
async fn test_content_negotiation() {
    let server = spawn_server(Duration::ZERO).await;
    let client = client();

    let response = client
        .post(server.url())
        .header(header::CONTENT_TYPE, "text/plain")
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let response = client
        .post(server.url())
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCEPT, "text/html")
        .body(r#"{"invocations":[]}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);

    let response = client
        .post(server.url())
        .header(header::CONTENT_TYPE, "application/json")
        .body("[1, 2, 3]")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Health and shutdown
// =============================================================================

#[tokio::test]
async fn test_health() {
    let server = spawn_server(Duration::ZERO).await;

    let response = client().get(format!("{}/health", server.url())).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health: HealthResponse = response.json().await.unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.id, server.id().to_string());
}

#[tokio::test]
async fn test_shutdown_closes_listener_after_grace() {
    let grace = Duration::from_millis(500);
    let server = spawn_server(grace).await;
    let client = client();
    let addr = server.addr();
    let controller = server.shutdown().clone();

    let requested = Instant::now();
    let response = client.post(format!("{}/shutdown", server.url())).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(requested.elapsed() < grace, "shutdown must answer before the grace delay");
    assert_eq!(controller.state(), LifecycleState::ShuttingDown);

    // Still serving during the grace delay
    let alice = Signer::generate();
    let invocation = echo(&alice, &server, "still here");
    let receipts = receipts(post(&client, &server, &[&invocation]).await).await;
    assert_eq!(receipts[0].out().ok(), Some(&json!({ "echo": "still here" })));

    // A second request does not restart the timer
    let response = client.get(format!("{}/shutdown", server.url())).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    timeout(Duration::from_secs(5), server.wait())
        .await
        .expect("server did not stop")
        .expect("server failed");

    assert!(requested.elapsed() >= grace);
    assert_eq!(controller.state(), LifecycleState::Stopped);
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}
