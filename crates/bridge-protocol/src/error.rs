//! Failure types carried inside RPC responses.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a failed call.
///
/// `UnknownTarget` and `UnresolvedMethod` are protocol failures: the peer
/// asked for something the worker never registered. The other kinds are
/// per-call failures that leave the connection usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// The invoked method returned an error or panicked.
    Application,
    /// The arguments could not be bound to the method's parameter types.
    InvalidArguments,
    /// No target is registered under the requested handle.
    UnknownTarget,
    /// No unique method matches the requested name and argument count.
    UnresolvedMethod,
}

impl FailureKind {
    /// Returns true if this failure is fatal to the connection.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::UnknownTarget | Self::UnresolvedMethod)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Application => "APPLICATION",
            Self::InvalidArguments => "INVALID_ARGUMENTS",
            Self::UnknownTarget => "UNKNOWN_TARGET",
            Self::UnresolvedMethod => "UNRESOLVED_METHOD",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure payload of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Failure classification.
    pub kind: FailureKind,
    /// Original failure text, as produced by the invoked method.
    pub message: String,
}

impl Failure {
    /// Create a new failure.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create an APPLICATION failure.
    pub fn application(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Application, message)
    }

    /// Create an INVALID_ARGUMENTS failure.
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidArguments, message)
    }

    /// Create an UNKNOWN_TARGET failure.
    pub fn unknown_target(target: impl fmt::Display) -> Self {
        Self::new(
            FailureKind::UnknownTarget,
            format!("no target registered with handle {}", target),
        )
    }

    /// Create an UNRESOLVED_METHOD failure.
    pub fn unresolved_method(method: &str, arity: usize, candidates: usize) -> Self {
        let message = if candidates == 0 {
            format!("no method '{}' taking {} argument(s)", method, arity)
        } else {
            format!(
                "method '{}' taking {} argument(s) is ambiguous ({} candidates)",
                method, arity, candidates
            )
        };
        Self::new(FailureKind::UnresolvedMethod, message)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Failure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_kinds() {
        assert!(FailureKind::UnknownTarget.is_protocol());
        assert!(FailureKind::UnresolvedMethod.is_protocol());
        assert!(!FailureKind::Application.is_protocol());
        assert!(!FailureKind::InvalidArguments.is_protocol());
    }

    #[test]
    fn test_kind_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&FailureKind::UnresolvedMethod).unwrap();
        assert_eq!(json, "\"UNRESOLVED_METHOD\"");
    }

    #[test]
    fn test_unresolved_method_message() {
        let missing = Failure::unresolved_method("Add", 3, 0);
        assert_eq!(missing.message, "no method 'Add' taking 3 argument(s)");

        let ambiguous = Failure::unresolved_method("Add", 2, 2);
        assert!(ambiguous.message.contains("ambiguous"));
        assert_eq!(ambiguous.to_string(), format!("UNRESOLVED_METHOD: {}", ambiguous.message));
    }
}
