//! Integration tests for end-to-end webhook processing
//!
//! Requests go through the router into the relay, which runs a stand-in git
//! program and writes archives to an in-memory store.
#![cfg(unix)]

mod common;

use archive_relay_api::handle_webhook;
use archive_relay_core::parameters::ParameterName;
use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
};
use bytes::Bytes;
use common::{
    change, push_payload, sign, signed_push, webhook_request, RejectingArchiveStore,
    TestHarness, KNOWN_HOSTS,
};
use serial_test::serial;
use std::sync::Arc;

// ============================================================================
// Guards
// ============================================================================

/// Verify that an empty body is rejected before anything else is consulted
#[tokio::test]
#[serial]
async fn test_missing_body_returns_400() {
    let harness = TestHarness::new();

    let (status, body) = harness
        .send(webhook_request("repo:refs_changed", Some("sha256=00"), Vec::new()))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Body missing");
    assert_eq!(harness.parameters.fetch_count(), 0);
}

/// Verify that a ping is acknowledged without a signature or parameter fetch
#[tokio::test]
#[serial]
async fn test_ping_returns_204_without_signature() {
    let harness = TestHarness::new();

    let (status, body) = harness
        .send(webhook_request("diagnostics:ping", None, b"{\"test\":true}".to_vec()))
        .await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, serde_json::Value::Null);
    assert_eq!(harness.parameters.fetch_count(), 0);
    assert!(harness.git.branches().is_empty());
}

/// Verify that the body check comes before the ping check
#[tokio::test]
#[serial]
async fn test_ping_without_body_returns_400() {
    let harness = TestHarness::new();

    let (status, _) = harness
        .send(webhook_request("diagnostics:ping", None, Vec::new()))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// Verify that an unsigned push is rejected before parameters are fetched
#[tokio::test]
#[serial]
async fn test_missing_signature_returns_403() {
    let harness = TestHarness::new();
    let body = push_payload(vec![change("main", "BRANCH")]);

    let (status, response) = harness
        .send(webhook_request("repo:refs_changed", None, body))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(response["error"], "Signature missing");
    assert_eq!(harness.parameters.fetch_count(), 0);
    assert!(harness.store.is_empty());
}

/// Verify that a signature over different bytes is rejected
#[tokio::test]
#[serial]
async fn test_mismatched_signature_returns_403() {
    let harness = TestHarness::new();
    let body = push_payload(vec![change("main", "BRANCH")]);
    let signature = sign(b"some other body");

    let (status, response) = harness
        .send(webhook_request("repo:refs_changed", Some(&signature), body))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(response["error"], "Signature mismatch");
    assert!(harness.git.branches().is_empty());
    assert!(harness.scratch_files().is_empty());
}

/// Verify that a signed body that is not an event payload is a client error
#[tokio::test]
#[serial]
async fn test_malformed_payload_returns_400() {
    let harness = TestHarness::new();
    let body = b"{\"repository\": 42".to_vec();
    let signature = sign(&body);

    let (status, _) = harness
        .send(webhook_request("repo:refs_changed", Some(&signature), body))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(harness.git.branches().is_empty());
}

/// Verify that a missing parameter is a server error without detail
#[tokio::test]
#[serial]
async fn test_missing_parameter_returns_500() {
    let harness = TestHarness::new();
    harness
        .parameters
        .remove(&harness.qualified(ParameterName::SshKey));

    let (status, body) = harness.send(signed_push(vec![change("main", "BRANCH")])).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], 500);
    assert!(!body["error"].as_str().unwrap().contains("sshKey"));
    assert!(harness.git.branches().is_empty());
}

/// Verify that the signing secret is read on every request
#[tokio::test]
#[serial]
async fn test_rotated_secret_takes_effect_immediately() {
    let harness = TestHarness::new();
    harness
        .parameters
        .set(harness.qualified(ParameterName::SigningSecret), "rotated");

    let (status, _) = harness.send(signed_push(vec![change("main", "BRANCH")])).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(harness.store.is_empty());
}

// ============================================================================
// Archiving
// ============================================================================

/// Verify that one branch change produces one archive under project/repo/branch
#[tokio::test]
#[serial]
async fn test_branch_push_uploads_archive() {
    let harness = TestHarness::new();

    let (status, _) = harness.send(signed_push(vec![change("main", "BRANCH")])).await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(harness.store.keys(), vec!["PROJ/service/main.zip".to_string()]);
    assert_eq!(
        harness.store.get("PROJ/service/main.zip").unwrap(),
        Bytes::from_static(b"PK-main")
    );
}

/// Verify that tag changes are skipped entirely
#[tokio::test]
#[serial]
async fn test_tag_only_push_returns_204_without_archives() {
    let harness = TestHarness::new();

    let (status, _) = harness.send(signed_push(vec![change("v1.0.0", "TAG")])).await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(harness.store.is_empty());
    assert!(harness.git.branches().is_empty());
    assert!(harness.scratch_files().is_empty());
}

/// Verify that mixed changes archive every branch in order and skip tags
#[tokio::test]
#[serial]
async fn test_mixed_push_archives_each_branch() {
    let harness = TestHarness::new();

    let (status, _) = harness
        .send(signed_push(vec![
            change("main", "BRANCH"),
            change("v2.0.0", "TAG"),
            change("feature/login", "BRANCH"),
        ]))
        .await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(harness.git.branches(), vec!["main", "feature/login"]);
    assert_eq!(
        harness.store.keys(),
        vec![
            "PROJ/service/feature/login.zip".to_string(),
            "PROJ/service/main.zip".to_string(),
        ]
    );
}

/// Verify that every branch sees the configured known hosts, even after the
/// previous connection appended to the file
#[tokio::test]
#[serial]
async fn test_known_hosts_restored_before_each_branch() {
    let harness = TestHarness::new();

    harness
        .send(signed_push(vec![
            change("main", "BRANCH"),
            change("develop", "BRANCH"),
            change("release", "BRANCH"),
        ]))
        .await;

    let expected = KNOWN_HOSTS.trim_end().to_string();
    assert_eq!(harness.git.known_hosts_seen(), vec![expected; 3]);
}

/// Verify that credential files are gone once the request completes
#[tokio::test]
#[serial]
async fn test_credentials_removed_after_success() {
    let harness = TestHarness::new();

    harness
        .send(signed_push(vec![change("main", "BRANCH")]))
        .await;

    let identities = harness.git.identities();
    assert_eq!(identities.len(), 1);
    assert!(identities[0].starts_with(harness.scratch.path()));
    assert!(!identities[0].exists());
    assert!(harness.scratch_files().is_empty());
}

// ============================================================================
// Failures
// ============================================================================

/// Verify that a failing git process fails the request and is not stored
#[tokio::test]
#[serial]
async fn test_archive_failure_returns_500() {
    let harness = TestHarness::with_failing_branch("develop");

    let (status, _) = harness
        .send(signed_push(vec![
            change("main", "BRANCH"),
            change("develop", "BRANCH"),
            change("release", "BRANCH"),
        ]))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    // Completed uploads stay; processing stops at the failing branch.
    assert_eq!(harness.store.keys(), vec!["PROJ/service/main.zip".to_string()]);
    assert_eq!(harness.git.branches(), vec!["main", "develop"]);
    assert!(harness.scratch_files().is_empty());
}

/// Verify that an upload failure fails the request and still cleans up
#[tokio::test]
#[serial]
async fn test_upload_failure_returns_500_and_cleans_up() {
    let harness = TestHarness::with_store(Arc::new(RejectingArchiveStore));

    let (status, body) = harness.send(signed_push(vec![change("main", "BRANCH")])).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body["error"].as_str().unwrap().contains("AccessDenied"));
    assert!(harness.scratch_files().is_empty());
}

// ============================================================================
// Direct handler invocation
// ============================================================================

/// Verify the handler contract without the router
#[tokio::test]
#[serial]
async fn test_handle_webhook_directly() {
    let harness = TestHarness::new();
    let body = push_payload(vec![change("main", "BRANCH")]);

    let mut headers = HeaderMap::new();
    headers.insert("x-event-key", HeaderValue::from_static("repo:refs_changed"));
    headers.insert(
        "x-hub-signature",
        HeaderValue::from_str(&sign(&body)).unwrap(),
    );

    let status = handle_webhook(State(harness.state.clone()), headers, Bytes::from(body))
        .await
        .unwrap();

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(harness.store.len(), 1);
}
