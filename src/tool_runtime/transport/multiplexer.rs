//! Request/response correlation for a single transport.
//!
//! Each outgoing request takes a fresh id and parks a completion handle in the
//! inflight table. The reader task resolves handles by id, so responses may
//! arrive in any order. Once the transport terminates every parked handle is
//! rejected and later registrations fail immediately.

use super::jsonrpc::JsonRpcResponse;
use super::{TransportError, TransportResult};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

type Completion = oneshot::Sender<TransportResult<Value>>;

/// Receiving half handed to the caller of [`PendingRequests::register`].
pub type ResponseReceiver = oneshot::Receiver<TransportResult<Value>>;

#[derive(Debug, Default)]
struct Inflight {
    waiters: HashMap<u64, Completion>,
    terminal: Option<TransportError>,
}

/// Inflight request table keyed by JSON-RPC id.
#[derive(Debug)]
pub struct PendingRequests {
    next_id: AtomicU64,
    inflight: Mutex<Inflight>,
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingRequests {
    /// Creates an empty table; ids start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            inflight: Mutex::new(Inflight::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inflight> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocates an id and parks a completion handle for it.
    ///
    /// # Errors
    ///
    /// Returns the terminal error once the table has been shut down.
    pub fn register(&self) -> TransportResult<(u64, ResponseReceiver)> {
        let mut inflight = self.lock();
        if let Some(error) = &inflight.terminal {
            return Err(error.clone());
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        inflight.waiters.insert(id, sender);
        Ok((id, receiver))
    }

    /// Resolves the waiter matching `response`.
    ///
    /// Returns `false` when no request with that id is pending; such frames
    /// are dropped.
    pub fn complete(&self, response: JsonRpcResponse) -> bool {
        let Some(id) = response.correlation_id() else {
            return false;
        };
        let Some(waiter) = self.lock().waiters.remove(&id) else {
            debug!(id, "dropping response with no pending request");
            return false;
        };
        if waiter.send(response.into_result()).is_err() {
            debug!(id, "response arrived after the caller stopped waiting");
        }
        true
    }

    /// Removes a waiter without resolving it.
    pub fn forget(&self, id: u64) {
        self.lock().waiters.remove(&id);
    }

    /// Rejects every parked waiter and refuses further registrations.
    ///
    /// The first terminal error sticks; later calls only drain waiters that
    /// raced in before it was recorded. Returns the number rejected.
    pub fn reject_all(&self, error: &TransportError) -> usize {
        let drained: Vec<Completion> = {
            let mut inflight = self.lock();
            if inflight.terminal.is_none() {
                inflight.terminal = Some(error.clone());
            }
            inflight.waiters.drain().map(|(_, waiter)| waiter).collect()
        };
        let rejected = drained.len();
        for waiter in drained {
            if waiter.send(Err(error.clone())).is_err() {
                debug!("waiter gave up before rejection");
            }
        }
        rejected
    }

    /// Returns the number of requests awaiting a response.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Returns whether no request is awaiting a response.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits for the response to request `id`, enforcing `timeout`.
    ///
    /// A timed-out request is removed from the table; a late response for it
    /// is then dropped.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::RequestTimeout`] on deadline expiry, or the
    /// error the waiter was resolved or rejected with.
    pub async fn await_response(
        &self,
        id: u64,
        receiver: ResponseReceiver,
        method: &str,
        timeout: Duration,
    ) -> TransportResult<Value> {
        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                self.forget(id);
                Err(TransportError::RequestTimeout {
                    method: method.to_owned(),
                    timeout,
                })
            }
        }
    }
}
