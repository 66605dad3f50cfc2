//! Outstanding-call table.
//!
//! Maps each in-flight [`CallId`] to the oneshot that resolves its caller.
//! The read loop completes entries as responses arrive and drains the table
//! when the connection ends.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bridge_protocol::{CallId, Reply};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::error::RpcError;

pub type CallResult = Result<Reply, RpcError>;

#[derive(Default)]
struct Table {
    calls: HashMap<CallId, oneshot::Sender<CallResult>>,
    /// Set once drained; later registrations fail with this reason.
    closed: Option<String>,
}

/// Table of calls awaiting a response.
#[derive(Default)]
pub struct PendingCalls {
    table: Mutex<Table>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a waiter for `id`.
    pub fn register(self: &Arc<Self>, id: CallId) -> Result<PendingCall, RpcError> {
        let (tx, rx) = oneshot::channel();
        let mut table = self.lock();
        if let Some(reason) = &table.closed {
            return Err(RpcError::ConnectionClosed {
                reason: reason.clone(),
            });
        }
        if table.calls.contains_key(&id) {
            return Err(RpcError::Protocol(format!("call id {} is already pending", id)));
        }
        table.calls.insert(id, tx);
        drop(table);

        Ok(PendingCall {
            id,
            table: Arc::clone(self),
            rx,
        })
    }

    /// Resolve the call for `id`. Returns false when no such call is pending.
    pub fn complete(&self, id: CallId, result: CallResult) -> bool {
        let waiter = self.lock().calls.remove(&id);
        match waiter {
            Some(tx) => {
                // The caller may have gone away; its guard already cleaned up.
                let _ = tx.send(result);
                true
            }
            None => {
                warn!(call_id = %id, "response for unknown or completed call");
                false
            }
        }
    }

    /// Resolve the call for `id` locally as cancelled.
    pub fn cancel(&self, id: CallId) -> bool {
        let waiter = self.lock().calls.remove(&id);
        match waiter {
            Some(tx) => {
                debug!(call_id = %id, "call cancelled before send");
                let _ = tx.send(Err(RpcError::Cancelled));
                true
            }
            None => false,
        }
    }

    /// Fail every pending call with `ConnectionClosed` and refuse new ones.
    pub fn drain(&self, reason: &str) -> usize {
        let waiters: Vec<_> = {
            let mut table = self.lock();
            if table.closed.is_none() {
                table.closed = Some(reason.to_string());
            }
            table.calls.drain().collect()
        };

        let count = waiters.len();
        for (id, tx) in waiters {
            debug!(call_id = %id, reason, "failing pending call");
            let _ = tx.send(Err(RpcError::ConnectionClosed {
                reason: reason.to_string(),
            }));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.lock().calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed.is_some()
    }

    fn forget(&self, id: CallId) {
        self.lock().calls.remove(&id);
    }
}

impl std::fmt::Debug for PendingCalls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.lock();
        f.debug_struct("PendingCalls")
            .field("outstanding", &table.calls.len())
            .field("closed", &table.closed)
            .finish()
    }
}

/// A registered call. Dropping it removes the entry from the table.
#[derive(Debug)]
pub struct PendingCall {
    id: CallId,
    table: Arc<PendingCalls>,
    rx: oneshot::Receiver<CallResult>,
}

impl PendingCall {
    pub fn id(&self) -> CallId {
        self.id
    }

    /// Wait for the call to be resolved.
    pub async fn wait(mut self) -> CallResult {
        match (&mut self.rx).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::ConnectionClosed {
                reason: "call was dropped from the pending table".to_string(),
            }),
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        self.table.forget(self.id);
    }
}
