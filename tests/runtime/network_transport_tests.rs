//! Network transport behaviour against a mocked HTTP tool server.

use httpmock::prelude::*;
use serde_json::json;
use std::time::Duration;
use switchyard::tool_runtime::{
    domain::NetworkTransportConfig,
    transport::{NetworkTransport, TransportError},
};

fn transport_for(server: &MockServer) -> NetworkTransport {
    let config = NetworkTransportConfig::new(server.url("/rpc")).expect("valid url");
    NetworkTransport::new(&config).expect("client should build")
}

#[tokio::test(flavor = "multi_thread")]
async fn posts_request_and_returns_result() {
    let server = MockServer::start_async().await;
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/rpc")
            .body_includes("\"method\":\"tools/list\"");
        then.status(200)
            .json_body(json!({"jsonrpc": "2.0", "id": 1, "result": {"tools": []}}));
    });
    let transport = transport_for(&server);

    let result = transport
        .send("tools/list", json!({}))
        .await
        .expect("request should succeed");

    assert_eq!(result, json!({"tools": []}));
    assert!(transport.is_connected());
    mock.assert();
}

#[tokio::test(flavor = "multi_thread")]
async fn error_envelope_becomes_protocol_error() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/rpc");
        then.status(200).json_body(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32601, "message": "Method not found"}
        }));
    });
    let transport = transport_for(&server);

    let error = transport
        .send("missing", json!({}))
        .await
        .expect_err("error envelope should fail the call");

    match error {
        TransportError::Protocol { code, message } => {
            assert_eq!(code, -32601);
            assert_eq!(message, "Method not found");
        }
        other => panic!("expected protocol error, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn non_success_status_is_reported() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/rpc");
        then.status(500).body("boom");
    });
    let transport = transport_for(&server);

    let error = transport
        .send("ping", json!({}))
        .await
        .expect_err("server error should fail the call");

    assert!(matches!(error, TransportError::HttpStatus { status: 500, .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn non_json_body_is_an_invalid_response() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/rpc");
        then.status(200).body("<html>maintenance</html>");
    });
    let transport = transport_for(&server);

    let error = transport
        .send("ping", json!({}))
        .await
        .expect_err("html should not decode");

    assert!(matches!(error, TransportError::InvalidResponse(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_server_times_out() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/rpc");
        then.status(200)
            .delay(Duration::from_millis(1_500))
            .json_body(json!({"jsonrpc": "2.0", "id": 1, "result": {}}));
    });
    let config = NetworkTransportConfig::new(server.url("/rpc"))
        .and_then(|config| config.with_timeout(Duration::from_millis(200)))
        .expect("valid config");
    let transport = NetworkTransport::new(&config).expect("client should build");

    let error = transport
        .send("slow", json!({}))
        .await
        .expect_err("request should time out");

    match error {
        TransportError::RequestTimeout { method, timeout } => {
            assert_eq!(method, "slow");
            assert_eq!(timeout, Duration::from_millis(200));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}
