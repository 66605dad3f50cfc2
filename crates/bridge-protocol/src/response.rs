//! RPC response types.

use serde::{Deserialize, Serialize};

use crate::error::Failure;
use crate::request::CallId;

/// Successful result of a call.
///
/// `Void` is the result of a method with no return value; `Value(Null)`
/// is an explicit null. The two stay distinct on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Reply {
    Void,
    Value(serde_json::Value),
}

impl Reply {
    /// Returns the carried value, or `None` for `Void`.
    pub fn into_value(self) -> Option<serde_json::Value> {
        match self {
            Self::Void => None,
            Self::Value(value) => Some(value),
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }
}

/// Outcome of a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "body", rename_all = "snake_case")]
pub enum Outcome {
    Success(Reply),
    Failure(Failure),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns the failure if it is fatal to the connection.
    pub fn protocol_failure(&self) -> Option<&Failure> {
        match self {
            Self::Failure(failure) if failure.kind.is_protocol() => Some(failure),
            _ => None,
        }
    }
}

/// RPC response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Request id echoed from the request.
    pub id: CallId,
    /// Result of the call.
    pub outcome: Outcome,
}

impl Response {
    /// Create a success response.
    pub fn success(id: CallId, reply: Reply) -> Self {
        Self {
            id,
            outcome: Outcome::Success(reply),
        }
    }

    /// Create a failure response.
    pub fn failure(id: CallId, failure: Failure) -> Self {
        Self {
            id,
            outcome: Outcome::Failure(failure),
        }
    }
}
