//! RPC request types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Correlation identifier for one request/response pair.
///
/// Allocated by the client from a per-connection counter; never reused
/// while a response could still arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(pub u64);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle of a target registered on the worker.
///
/// Handles are assigned in registration order starting at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetHandle(pub u32);

impl TargetHandle {
    /// Index of the target in the worker's registration table.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for TargetHandle {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for TargetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// RPC request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Caller-chosen id, echoed in the response.
    pub id: CallId,
    /// Target to invoke the method on.
    pub target: TargetHandle,
    /// Method name, matched exactly.
    pub method: String,
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}

impl Request {
    pub fn new(
        id: CallId,
        target: TargetHandle,
        method: impl Into<String>,
        args: Vec<serde_json::Value>,
    ) -> Self {
        Self {
            id,
            target,
            method: method.into(),
            args,
        }
    }
}
