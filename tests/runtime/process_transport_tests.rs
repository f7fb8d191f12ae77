//! Process transport behaviour against scripted tool servers.

use super::helpers::{
    ECHO_SERVER, EXIT_AFTER_FIRST_REQUEST, IGNORES_SLOW, IGNORES_TERM, REVERSED_PAIR,
    SILENT_SERVER, capture, noisy_echo_server, settings, shell, wait_until,
};
use rstest::rstest;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use switchyard::tool_runtime::{
    domain::{LogLevel, ProcessTransportConfig, RuntimeSettings},
    transport::{ProcessTransport, ProcessTransportState, TransportError},
};

async fn spawn(script: &str, settings: &RuntimeSettings) -> ProcessTransport {
    ProcessTransport::spawn(&shell(script), settings, capture())
        .await
        .expect("tool server should start")
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn echo_server_answers_requests(settings: RuntimeSettings) {
    let transport = spawn(ECHO_SERVER, &settings).await;

    let result = transport
        .send("ping", json!({"payload": "hello"}))
        .await
        .expect("ping should succeed");

    assert_eq!(result, json!({"payload": "hello"}));
    assert!(transport.is_connected());
    assert_eq!(transport.state(), ProcessTransportState::Connected);
    transport.close().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn responses_in_reverse_order_reach_their_callers(settings: RuntimeSettings) {
    let transport = spawn(REVERSED_PAIR, &settings).await;

    let (first, second) = tokio::join!(
        transport.send("first", json!({"n": 1})),
        transport.send("second", json!({"n": 2})),
    );

    assert_eq!(first.expect("first should resolve"), json!({"n": 1}));
    assert_eq!(second.expect("second should resolve"), json!({"n": 2}));
    transport.close().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unexpected_exit_rejects_pending_request_with_exit_code(settings: RuntimeSettings) {
    let transport = spawn(EXIT_AFTER_FIRST_REQUEST, &settings).await;

    let error = transport
        .send("ping", json!({}))
        .await
        .expect_err("request should be rejected when the process exits");

    match &error {
        TransportError::ProcessExited(exit) => assert_eq!(exit.code(), Some(1)),
        other => panic!("expected process exit, got {other:?}"),
    }
    assert!(error.to_string().contains("code 1"));
    assert!(!transport.is_connected());
    assert!(matches!(
        transport.send("again", json!({})).await,
        Err(TransportError::ProcessExited(_))
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn timeout_rejects_only_the_slow_request(settings: RuntimeSettings) {
    let short = settings
        .with_request_timeout(Duration::from_millis(400))
        .expect("positive timeout");
    let transport = spawn(IGNORES_SLOW, &short).await;

    let (slow, fast) = tokio::join!(
        transport.send("slow", json!({})),
        transport.send("fast", json!({"ok": true})),
    );

    assert!(matches!(slow, Err(TransportError::RequestTimeout { ref method, .. }) if method == "slow"));
    assert_eq!(fast.expect("fast should resolve"), json!({"ok": true}));
    assert!(transport.is_connected());
    assert_eq!(
        transport
            .send("after", json!({"still": "usable"}))
            .await
            .expect("transport should remain usable"),
        json!({"still": "usable"})
    );
    transport.close().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn close_rejects_pending_requests(settings: RuntimeSettings) {
    let transport = Arc::new(spawn(SILENT_SERVER, &settings).await);
    let caller = Arc::clone(&transport);
    let pending = tokio::spawn(async move { caller.send("hang", json!({})).await });

    assert!(wait_until(|| transport.pending_requests() == 1).await);
    transport.close().await;

    let outcome = pending.await.expect("caller task should finish");
    assert!(matches!(outcome, Err(TransportError::Closed)));
    assert!(!transport.is_connected());
    assert_eq!(transport.state(), ProcessTransportState::Closed);
    assert!(matches!(
        transport.send("late", json!({})).await,
        Err(TransportError::Closed | TransportError::ProcessExited(_))
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn close_is_idempotent(settings: RuntimeSettings) {
    let transport = spawn(ECHO_SERVER, &settings).await;

    transport.close().await;
    transport.close().await;

    assert!(!transport.is_connected());
    assert_eq!(transport.state(), ProcessTransportState::Closed);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn close_kills_a_process_that_ignores_termination(settings: RuntimeSettings) {
    let transport = spawn(IGNORES_TERM, &settings).await;

    transport.close().await;

    assert!(!transport.is_connected());
    assert_eq!(transport.state(), ProcessTransportState::Closed);
    assert!(wait_until(|| transport.exit().is_some()).await);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn missing_executable_is_a_spawn_failure(settings: RuntimeSettings) {
    let config = ProcessTransportConfig::new("/nonexistent/switchyard-tool-server")
        .expect("valid executable");

    let error = ProcessTransport::spawn(&config, &settings, capture())
        .await
        .expect_err("spawn should fail");

    match error {
        TransportError::SpawnFailure { command, reason } => {
            assert!(command.contains("/nonexistent/switchyard-tool-server"));
            assert!(reason.contains("not found"));
        }
        other => panic!("expected spawn failure, got {other:?}"),
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn immediate_exit_is_a_spawn_failure(settings: RuntimeSettings) {
    let error = ProcessTransport::spawn(&shell("exit 3"), &settings, capture())
        .await
        .expect_err("spawn should fail");

    match error {
        TransportError::SpawnFailure { command, reason } => {
            assert!(command.starts_with("sh"));
            assert!(reason.contains("code 3"));
        }
        other => panic!("expected spawn failure, got {other:?}"),
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn output_is_captured_and_malformed_frames_are_skipped(settings: RuntimeSettings) {
    let output = capture();
    let transport = ProcessTransport::spawn(&shell(&noisy_echo_server()), &settings, output.clone())
        .await
        .expect("tool server should start");

    let result = transport
        .send("ping", json!({"after": "noise"}))
        .await
        .expect("malformed frame should not break the stream");
    assert_eq!(result, json!({"after": "noise"}));

    assert!(
        wait_until(|| {
            output
                .snapshot()
                .iter()
                .any(|entry| entry.level() == LogLevel::Stderr && entry.message() == "warming up")
        })
        .await
    );
    let entries = output.snapshot();
    assert!(
        entries
            .iter()
            .any(|entry| entry.level() == LogLevel::Stdout && entry.message() == "not json")
    );
    assert!(
        entries
            .iter()
            .any(|entry| entry.level() == LogLevel::Stdout && entry.message().contains("\"after\""))
    );
    transport.close().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn oversized_frame_is_dropped_and_stream_continues(settings: RuntimeSettings) {
    let capped = settings.with_max_line_bytes(64).expect("positive cap");
    let script = format!(
        "printf '%0200d\\n' 0; {ECHO_SERVER}"
    );
    let output = capture();
    let transport = ProcessTransport::spawn(&shell(&script), &capped, output.clone())
        .await
        .expect("tool server should start");

    let result = transport
        .send("ping", json!({"n": 1}))
        .await
        .expect("stream should survive an oversized frame");

    assert_eq!(result, json!({"n": 1}));
    assert!(
        output
            .snapshot()
            .iter()
            .any(|entry| entry.message().contains("truncated"))
    );
    transport.close().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn write_to_closed_stdin_is_a_disconnection(settings: RuntimeSettings) {
    let transport = spawn("exec 0<&-; exec sleep 5", &settings).await;

    let error = transport
        .send("ping", json!({}))
        .await
        .expect_err("write should fail");

    assert!(matches!(error, TransportError::Disconnected), "got {error:?}");
    assert!(error.is_disconnection());
    transport.close().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn send_right_after_exit_is_a_disconnection(settings: RuntimeSettings) {
    // The background sleep keeps stdout open past the exit.
    let script = r#"while IFS= read -r line; do printf '%s\n' "$line" | sed 's/"method":"[^"]*","params"/"result"/'; case "$line" in *'"method":"quit"'*) sleep 3 & exit 0;; esac; done"#;
    let transport = spawn(script, &settings).await;
    transport
        .send("quit", json!({}))
        .await
        .expect("quit should be answered");

    let error = transport
        .send("ping", json!({}))
        .await
        .expect_err("process is gone");

    assert!(error.is_disconnection(), "got {error:?}");
    assert!(wait_until(|| transport.exit().is_some()).await);
    assert!(!transport.is_connected());
    transport.close().await;
}
