//! Invocation service: provisioning, calls with recovery, and stopping.

use super::helpers::{
    ECHO_SERVER, ERROR_SERVER, EXIT_AFTER_FIRST_REQUEST, IGNORES_SLOW, RuntimeContext, context,
    key, start_request, wait_until,
};
use rstest::rstest;
use serde_json::json;
use switchyard::tool_runtime::{
    domain::{InstanceId, InstanceKey, InstanceStatus},
    ports::InstanceStore,
    services::InvocationError,
    transport::{Transport, TransportError},
};

async fn record_of(
    context: &RuntimeContext,
    instance_id: InstanceId,
) -> (InstanceStatus, Option<u32>) {
    let record = context
        .store
        .find_instance(instance_id)
        .await
        .expect("lookup should succeed")
        .expect("record should exist");
    (record.status(), record.process_id())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn provisioned_instance_answers_calls(context: RuntimeContext, key: InstanceKey) {
    let instance_id = context.record_instance(key, InstanceStatus::Stopped);
    let provisioned = context
        .service
        .provision(start_request(instance_id, key, ECHO_SERVER))
        .await
        .expect("provision should succeed");

    let result = context
        .service
        .call(instance_id, "tools/call", json!({"name": "search"}))
        .await
        .expect("call should succeed");

    assert_eq!(result, json!({"name": "search"}));
    let (status, pid) = record_of(&context, instance_id).await;
    assert_eq!(status, InstanceStatus::Running);
    assert_eq!(pid, provisioned.process_id());
    context.registry.cleanup().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_provision_marks_instance_errored(context: RuntimeContext, key: InstanceKey) {
    let instance_id = context.record_instance(key, InstanceStatus::Stopped);

    let error = context
        .service
        .provision(start_request(instance_id, key, "exit 2"))
        .await
        .expect_err("provision should fail");

    assert!(matches!(error, InvocationError::Registry(_)));
    assert_eq!(record_of(&context, instance_id).await.0, InstanceStatus::Error);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn call_recovers_transport_after_restart(context: RuntimeContext, key: InstanceKey) {
    let instance_id = context.record_instance(key, InstanceStatus::Stopped);
    context.resolve_to(key, ECHO_SERVER);
    context
        .service
        .provision(start_request(instance_id, key, ECHO_SERVER))
        .await
        .expect("provision should succeed");
    let restarted = context.restarted();

    let result = restarted
        .service
        .call(instance_id, "ping", json!({"after": "restart"}))
        .await
        .expect("call should recover the transport");

    assert_eq!(result, json!({"after": "restart"}));
    assert!(restarted.registry.is_running(&key).await);
    restarted.registry.cleanup().await;
    context.registry.cleanup().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unrecoverable_instance_is_marked_stopped(context: RuntimeContext, key: InstanceKey) {
    let instance_id = context.record_instance(key, InstanceStatus::Running);

    let error = context
        .service
        .call(instance_id, "ping", json!({}))
        .await
        .expect_err("call should fail without configuration");

    assert!(matches!(error, InvocationError::NotRunning(id) if id == instance_id));
    assert!(error.to_string().contains("re-provision"));
    assert_eq!(
        record_of(&context, instance_id).await.0,
        InstanceStatus::Stopped
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stopped_instance_is_not_running(context: RuntimeContext, key: InstanceKey) {
    let instance_id = context.record_instance(key, InstanceStatus::Stopped);
    context.resolve_to(key, ECHO_SERVER);

    let error = context
        .service
        .call(instance_id, "ping", json!({}))
        .await
        .expect_err("stopped instance should refuse calls");

    assert!(matches!(error, InvocationError::NotRunning(_)));
    assert!(context.registry.get_transport(&key).await.is_none());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_instance_is_not_found(context: RuntimeContext) {
    let error = context
        .service
        .call(InstanceId::new(), "ping", json!({}))
        .await
        .expect_err("unknown instance should fail");

    assert!(matches!(error, InvocationError::InstanceNotFound(_)));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn protocol_error_is_surfaced_with_server_message(
    context: RuntimeContext,
    key: InstanceKey,
) {
    let instance_id = context.record_instance(key, InstanceStatus::Stopped);
    context
        .service
        .provision(start_request(instance_id, key, ERROR_SERVER))
        .await
        .expect("provision should succeed");

    let error = context
        .service
        .call(instance_id, "missing", json!({}))
        .await
        .expect_err("call should fail");

    match &error {
        InvocationError::CallFailed {
            source: TransportError::Protocol { code, message },
            ..
        } => {
            assert_eq!(*code, -32601);
            assert_eq!(message, "Method not found");
        }
        other => panic!("expected protocol failure, got {other:?}"),
    }
    assert!(error.to_string().contains("Method not found"));
    assert!(context.registry.is_running(&key).await);
    context.registry.cleanup().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn call_is_retried_once_after_process_death(context: RuntimeContext, key: InstanceKey) {
    let instance_id = context.record_instance(key, InstanceStatus::Stopped);
    context.resolve_to(key, ECHO_SERVER);
    let provisioned = context
        .service
        .provision(start_request(instance_id, key, EXIT_AFTER_FIRST_REQUEST))
        .await
        .expect("provision should succeed");
    let first_pid = provisioned.process_id();

    let result = context
        .service
        .call(instance_id, "ping", json!({"retried": true}))
        .await
        .expect("retry should succeed");

    assert_eq!(result, json!({"retried": true}));
    let replacement = context
        .registry
        .get_transport(&key)
        .await
        .expect("replacement should be registered");
    assert_ne!(replacement.process_id(), first_pid);
    assert_eq!(record_of(&context, instance_id).await.1, replacement.process_id());
    context.registry.cleanup().await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stop_kills_process_and_persists_stopped(context: RuntimeContext, key: InstanceKey) {
    let instance_id = context.record_instance(key, InstanceStatus::Stopped);
    let provisioned = context
        .service
        .provision(start_request(instance_id, key, ECHO_SERVER))
        .await
        .expect("provision should succeed");

    context
        .service
        .stop(instance_id)
        .await
        .expect("stop should succeed");

    assert!(wait_until(|| !provisioned.transport().is_connected()).await);
    assert!(context.registry.get_transport(&key).await.is_none());
    let (status, pid) = record_of(&context, instance_id).await;
    assert_eq!(status, InstanceStatus::Stopped);
    assert_eq!(pid, None);

    context
        .service
        .stop(instance_id)
        .await
        .expect("second stop should be a no-op");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stop_unknown_instance_is_not_found(context: RuntimeContext) {
    let error = context
        .service
        .stop(InstanceId::new())
        .await
        .expect_err("unknown instance should fail");

    assert!(matches!(error, InvocationError::InstanceNotFound(_)));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stop_during_in_flight_call_is_not_undone(context: RuntimeContext, key: InstanceKey) {
    let instance_id = context.record_instance(key, InstanceStatus::Stopped);
    context.resolve_to(key, ECHO_SERVER);
    let provisioned = context
        .service
        .provision(start_request(instance_id, key, IGNORES_SLOW))
        .await
        .expect("provision should succeed");
    let Transport::Process(process) = provisioned.transport().as_ref() else {
        panic!("expected a process transport");
    };

    let (outcome, ()) = tokio::join!(
        context.service.call(instance_id, "slow", json!({})),
        async {
            assert!(wait_until(|| process.pending_requests() == 1).await);
            context
                .service
                .stop(instance_id)
                .await
                .expect("stop should succeed");
        },
    );

    assert!(outcome.is_err());
    assert!(!context.registry.is_running(&key).await);
    assert!(context.registry.get_transport(&key).await.is_none());
    let (status, pid) = record_of(&context, instance_id).await;
    assert_eq!(status, InstanceStatus::Stopped);
    assert_eq!(pid, None);
}
