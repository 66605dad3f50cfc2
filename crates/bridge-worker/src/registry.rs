//! Target registry and call dispatcher.
//!
//! Routes incoming requests to the registered target and method.

use std::panic::AssertUnwindSafe;

use bridge_protocol::{Failure, Outcome, Request, TargetHandle};
use futures::FutureExt;
use tracing::{debug, warn};

use crate::target::{panic_message, Method, Target};

/// Append-only table of targets, indexed by [`TargetHandle`].
#[derive(Debug, Default)]
pub struct Registry {
    targets: Vec<Target>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target under the next sequential handle.
    pub fn add(&mut self, target: Target) -> TargetHandle {
        let handle = TargetHandle(self.targets.len() as u32);
        debug!(handle = %handle, name = target.name(), methods = target.methods().len(), "registered target");
        self.targets.push(target);
        handle
    }

    pub fn get(&self, handle: TargetHandle) -> Option<&Target> {
        self.targets.get(handle.index())
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Resolve a method by exact name and argument count.
    pub fn resolve(&self, handle: TargetHandle, method: &str, arity: usize) -> Result<&Method, Failure> {
        let target = self
            .get(handle)
            .ok_or_else(|| Failure::unknown_target(handle))?;

        let mut candidates = target.methods().iter().filter(|m| m.matches(method, arity));
        match (candidates.next(), candidates.next()) {
            (Some(found), None) => Ok(found),
            (None, _) => Err(Failure::unresolved_method(method, arity, 0)),
            (Some(_), Some(_)) => Err(Failure::unresolved_method(
                method,
                arity,
                2 + candidates.count(),
            )),
        }
    }

    /// Resolve and run a request, capturing method errors and panics.
    pub async fn dispatch(&self, request: Request) -> Outcome {
        let Request {
            id,
            target,
            method,
            args,
        } = request;

        let invocation = match self.resolve(target, &method, args.len()) {
            Ok(found) => found.invoke(args),
            Err(failure) => {
                warn!(call_id = %id, target = %target, method = %method, error = %failure, "unresolved call");
                return Outcome::Failure(failure);
            }
        };

        match AssertUnwindSafe(invocation).catch_unwind().await {
            Ok(Ok(reply)) => Outcome::Success(reply),
            Ok(Err(failure)) => {
                debug!(call_id = %id, method = %method, error = %failure, "method failed");
                Outcome::Failure(failure)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(call_id = %id, method = %method, panic = %message, "method panicked");
                Outcome::Failure(Failure::application(message))
            }
        }
    }
}
