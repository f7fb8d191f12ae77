//! Shared fixtures and scripted tool servers for runtime integration tests.

use mockable::DefaultClock;
use rstest::fixture;
use std::sync::Arc;
use std::time::Duration;
use switchyard::tool_runtime::{
    adapters::memory::{InMemoryConfigResolver, InMemoryInstanceStore},
    domain::{
        InstanceId, InstanceKey, InstanceRecord, InstanceStatus, OwnerId, ProcessTransportConfig,
        RuntimeSettings, ServerId, TransportConfig, TransportKind,
    },
    services::{InvocationService, RuntimeRegistry, StartInstanceRequest},
    transport::OutputCapture,
};

/// Answers every request with its own params as the result.
pub const ECHO_SERVER: &str = r#"while IFS= read -r line; do printf '%s\n' "$line" | sed 's/"method":"[^"]*","params"/"result"/'; done"#;

/// Answers every request with a JSON-RPC "Method not found" error.
pub const ERROR_SERVER: &str = r#"while IFS= read -r line; do printf '%s\n' "$line" | sed 's/"method":.*$/"error":{"code":-32601,"message":"Method not found"}}/'; done"#;

/// Reads one request and exits with status 1 without answering.
pub const EXIT_AFTER_FIRST_REQUEST: &str = "read -r line; exit 1";

/// Echoes everything except requests for the `slow` method.
pub const IGNORES_SLOW: &str = r#"while IFS= read -r line; do case "$line" in *'"method":"slow"'*) ;; *) printf '%s\n' "$line" | sed 's/"method":"[^"]*","params"/"result"/';; esac; done"#;

/// Reads two requests, then answers them in reverse order.
pub const REVERSED_PAIR: &str = r#"read -r first; read -r second; for line in "$second" "$first"; do printf '%s\n' "$line" | sed 's/"method":"[^"]*","params"/"result"/'; done; cat > /dev/null"#;

/// Never answers; exits when stdin closes.
pub const SILENT_SERVER: &str = "cat > /dev/null";

/// Ignores SIGTERM and stdin EOF.
pub const IGNORES_TERM: &str = "trap '' TERM; while :; do sleep 1; done";

/// Prints a malformed frame and a stderr line, then behaves as [`ECHO_SERVER`].
#[must_use]
pub fn noisy_echo_server() -> String {
    format!("printf 'not json\\n'; echo 'warming up' >&2; {ECHO_SERVER}")
}

/// Settings with short close and spawn windows.
#[must_use]
pub fn fast_settings() -> RuntimeSettings {
    RuntimeSettings::default()
        .with_close_grace(Duration::from_millis(300))
        .with_reap_wait(Duration::from_millis(1_000))
        .with_spawn_settle(Duration::from_millis(150))
}

/// Provides fast runtime settings.
#[fixture]
pub fn settings() -> RuntimeSettings {
    fast_settings()
}

/// Provides a fresh instance key.
#[fixture]
pub fn key() -> InstanceKey {
    InstanceKey::new(OwnerId::new(), ServerId::new())
}

/// Builds a process configuration running `script` under `sh -c`.
#[must_use]
pub fn shell(script: &str) -> ProcessTransportConfig {
    ProcessTransportConfig::new("sh")
        .expect("sh is a valid executable")
        .with_args(["-c".to_owned(), script.to_owned()])
}

/// Creates an output capture with the default capacity.
#[must_use]
pub fn capture() -> OutputCapture {
    OutputCapture::new(200, Arc::new(DefaultClock))
}

/// Polls `condition` for up to two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// Registry type used across runtime tests.
pub type TestRegistry = RuntimeRegistry<InMemoryInstanceStore, DefaultClock>;

/// Invocation service type used across runtime tests.
pub type TestService =
    InvocationService<InMemoryInstanceStore, InMemoryConfigResolver, DefaultClock>;

/// Store, resolver, registry and service sharing one in-memory state.
pub struct RuntimeContext {
    /// Durable instance records.
    pub store: InMemoryInstanceStore,
    /// Recovery configurations.
    pub resolver: InMemoryConfigResolver,
    /// Registry under test.
    pub registry: Arc<TestRegistry>,
    /// Service wrapping the registry.
    pub service: TestService,
}

impl RuntimeContext {
    /// Creates a context with its own registry.
    #[must_use]
    pub fn new(settings: RuntimeSettings) -> Self {
        let store = InMemoryInstanceStore::new();
        let resolver = InMemoryConfigResolver::new();
        let registry = Arc::new(RuntimeRegistry::new(
            Arc::new(store.clone()),
            Arc::new(DefaultClock),
            settings,
        ));
        let service = InvocationService::new(Arc::clone(&registry), Arc::new(resolver.clone()));
        Self {
            store,
            resolver,
            registry,
            service,
        }
    }

    /// Creates a second context over the same store and resolver, as after a
    /// restart of the hosting process.
    #[must_use]
    pub fn restarted(&self) -> Self {
        let registry = Arc::new(RuntimeRegistry::new(
            Arc::new(self.store.clone()),
            Arc::new(DefaultClock),
            self.registry.settings().clone(),
        ));
        let service =
            InvocationService::new(Arc::clone(&registry), Arc::new(self.resolver.clone()));
        Self {
            store: self.store.clone(),
            resolver: self.resolver.clone(),
            registry,
            service,
        }
    }

    /// Records a process instance for `key` with `status`.
    pub fn record_instance(&self, key: InstanceKey, status: InstanceStatus) -> InstanceId {
        let instance_id = InstanceId::new();
        self.store
            .insert(InstanceRecord::new(
                instance_id,
                key,
                status,
                TransportKind::Process,
            ))
            .expect("record should be stored");
        instance_id
    }

    /// Records the recovery configuration for `key`.
    pub fn resolve_to(&self, key: InstanceKey, script: &str) {
        self.resolver
            .insert(key, TransportConfig::Process(shell(script)))
            .expect("configuration should be stored");
    }
}

/// Provides a runtime context with fast settings.
#[fixture]
pub fn context() -> RuntimeContext {
    RuntimeContext::new(fast_settings())
}

/// Builds a start request running `script`.
#[must_use]
pub fn start_request(
    instance_id: InstanceId,
    key: InstanceKey,
    script: &str,
) -> StartInstanceRequest {
    StartInstanceRequest::new(instance_id, key, TransportConfig::Process(shell(script)))
}
