//! Target definitions.
//!
//! A [`Target`] is a named set of methods built from closures. Each method
//! is registered under a name and the arity of its typed argument tuple;
//! the worker resolves incoming calls against that `(name, arity)` key.
//!
//! ```ignore
//! let calculator = Target::new("calculator")
//!     .sync_method("Add", |(a, b): (i64, i64)| Ok::<_, String>(a + b))
//!     .method("TryHello", |(name,): (Option<String>,)| async move {
//!         Ok::<_, String>(name.map(|n| format!("Hello {}", n)))
//!     });
//! ```

use std::any::Any;
use std::fmt::{self, Display};
use std::future::Future;
use std::sync::Arc;

use bridge_protocol::{Failure, FromArgs, Reply};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Context handed to methods registered with a trailing context parameter.
///
/// The cancellation token is never cancelled: a call that reached the
/// worker always runs to completion.
#[derive(Debug, Clone)]
pub struct CallContext {
    cancellation: CancellationToken,
}

impl CallContext {
    pub(crate) fn detached() -> Self {
        Self {
            cancellation: CancellationToken::new(),
        }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

/// Whether a method takes the trailing [`CallContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    Plain,
    WithContext,
}

/// Conversion of a method's return value into a [`Reply`].
pub trait IntoReply {
    fn into_reply(self) -> Result<Reply, serde_json::Error>;
}

impl IntoReply for () {
    fn into_reply(self) -> Result<Reply, serde_json::Error> {
        Ok(Reply::Void)
    }
}

impl IntoReply for Reply {
    fn into_reply(self) -> Result<Reply, serde_json::Error> {
        Ok(self)
    }
}

impl IntoReply for Value {
    fn into_reply(self) -> Result<Reply, serde_json::Error> {
        Ok(Reply::Value(self))
    }
}

impl<T: Serialize> IntoReply for Option<T> {
    fn into_reply(self) -> Result<Reply, serde_json::Error> {
        serde_json::to_value(self).map(Reply::Value)
    }
}

impl<T: Serialize> IntoReply for Vec<T> {
    fn into_reply(self) -> Result<Reply, serde_json::Error> {
        serde_json::to_value(self).map(Reply::Value)
    }
}

macro_rules! scalar_reply {
    ($($ty:ty),+) => {
        $(
            impl IntoReply for $ty {
                fn into_reply(self) -> Result<Reply, serde_json::Error> {
                    serde_json::to_value(self).map(Reply::Value)
                }
            }
        )+
    };
}

scalar_reply!(
    bool, char, String, &'static str, i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32,
    f64
);

/// Wrapper returning any serializable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoReply for Json<T> {
    fn into_reply(self) -> Result<Reply, serde_json::Error> {
        serde_json::to_value(self.0).map(Reply::Value)
    }
}

pub(crate) type MethodFuture = BoxFuture<'static, Result<Reply, Failure>>;
pub(crate) type Invoker = Arc<dyn Fn(Vec<Value>, CallContext) -> MethodFuture + Send + Sync>;

/// A registered method.
#[derive(Clone)]
pub struct Method {
    name: String,
    arity: usize,
    signature: Signature,
    invoker: Invoker,
}

impl Method {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Argument count, excluding the context parameter.
    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn signature(&self) -> Signature {
        self.signature
    }

    pub(crate) fn matches(&self, name: &str, arity: usize) -> bool {
        self.name == name && self.arity == arity
    }

    /// Invoke the method. Panics inside the method body surface when the
    /// returned future is polled.
    pub(crate) fn invoke(&self, args: Vec<Value>) -> MethodFuture {
        let invoker = Arc::clone(&self.invoker);
        async move { invoker(args, CallContext::detached()).await }.boxed()
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// A named object exposing invocable methods.
#[derive(Debug, Clone)]
pub struct Target {
    name: String,
    methods: Vec<Method>,
}

impl Target {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Register an async method.
    pub fn method<A, F, Fut, R, E>(self, name: impl Into<String>, f: F) -> Self
    where
        A: FromArgs + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: IntoReply + Send + 'static,
        E: Display + Send + 'static,
    {
        self.push(name, A::ARITY, Signature::Plain, move |args, _ctx| {
            bind::<A>(args).map(|args| f(args))
        })
    }

    /// Register an async method taking the trailing [`CallContext`].
    pub fn method_with_context<A, F, Fut, R, E>(self, name: impl Into<String>, f: F) -> Self
    where
        A: FromArgs + Send + 'static,
        F: Fn(A, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: IntoReply + Send + 'static,
        E: Display + Send + 'static,
    {
        self.push(name, A::ARITY, Signature::WithContext, move |args, ctx| {
            bind::<A>(args).map(|args| f(args, ctx))
        })
    }

    /// Register a synchronous method.
    ///
    /// The body runs on tokio's blocking pool, so it may block without
    /// stalling other calls. It cannot be aborted by a forced shutdown.
    pub fn sync_method<A, F, R, E>(self, name: impl Into<String>, f: F) -> Self
    where
        A: FromArgs + Send + 'static,
        F: Fn(A) -> Result<R, E> + Send + Sync + 'static,
        R: IntoReply + Send + 'static,
        E: Display + Send + 'static,
    {
        let f = Arc::new(f);
        self.push(name, A::ARITY, Signature::Plain, move |args, _ctx| {
            let f = Arc::clone(&f);
            bind::<A>(args).map(|args| async move {
                match tokio::task::spawn_blocking(move || (*f)(args)).await {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(err) if err.is_panic() => Err(panic_message(err.into_panic().as_ref())),
                    Err(err) => Err(err.to_string()),
                }
            })
        })
    }

    fn push<F, Fut, R, E>(
        mut self,
        name: impl Into<String>,
        arity: usize,
        signature: Signature,
        f: F,
    ) -> Self
    where
        F: Fn(Vec<Value>, CallContext) -> Result<Fut, Failure> + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: IntoReply + Send + 'static,
        E: Display + Send + 'static,
    {
        let invoker: Invoker = Arc::new(move |args: Vec<Value>, ctx: CallContext| -> MethodFuture {
            match f(args, ctx) {
                Ok(fut) => async move {
                    match fut.await {
                        Ok(value) => value.into_reply().map_err(|e| {
                            Failure::application(format!("failed to serialize return value: {}", e))
                        }),
                        Err(e) => Err(Failure::application(e.to_string())),
                    }
                }
                .boxed(),
                Err(failure) => futures::future::ready(Err(failure)).boxed(),
            }
        });
        self.methods.push(Method {
            name: name.into(),
            arity,
            signature,
            invoker,
        });
        self
    }
}

fn bind<A: FromArgs>(args: Vec<Value>) -> Result<A, Failure> {
    A::from_args(args).map_err(|e| Failure::invalid_arguments(e.to_string()))
}

/// Text of a panic payload, for reporting as an application failure.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "method panicked".to_string()
    }
}
