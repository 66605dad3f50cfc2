//! Positional argument marshalling.
//!
//! The host turns a tuple of serializable values into the request's
//! argument list with [`IntoArgs`]; the worker binds the list back to a
//! typed tuple with [`FromArgs`]. Tuples of up to eight elements are
//! supported on both sides.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Errors binding an argument list to typed parameters.
#[derive(Debug, thiserror::Error)]
pub enum ArgumentError {
    #[error("expected {expected} argument(s), got {actual}")]
    Arity { expected: usize, actual: usize },

    #[error("argument {index} has the wrong type: {source}")]
    Type {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Conversion into a positional argument list.
pub trait IntoArgs {
    fn into_args(self) -> Result<Vec<Value>, serde_json::Error>;
}

/// Typed binding of a positional argument list.
pub trait FromArgs: Sized {
    /// Number of arguments this binding consumes.
    const ARITY: usize;

    fn from_args(args: Vec<Value>) -> Result<Self, ArgumentError>;
}

impl IntoArgs for Vec<Value> {
    fn into_args(self) -> Result<Vec<Value>, serde_json::Error> {
        Ok(self)
    }
}

impl IntoArgs for () {
    fn into_args(self) -> Result<Vec<Value>, serde_json::Error> {
        Ok(Vec::new())
    }
}

impl FromArgs for () {
    const ARITY: usize = 0;

    fn from_args(args: Vec<Value>) -> Result<Self, ArgumentError> {
        if !args.is_empty() {
            return Err(ArgumentError::Arity {
                expected: 0,
                actual: args.len(),
            });
        }
        Ok(())
    }
}

macro_rules! tuple_args {
    ($count:expr; $($name:ident),+) => {
        impl<$($name: Serialize),+> IntoArgs for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_args(self) -> Result<Vec<Value>, serde_json::Error> {
                let ($($name,)+) = self;
                Ok(vec![$(serde_json::to_value($name)?),+])
            }
        }

        impl<$($name: DeserializeOwned),+> FromArgs for ($($name,)+) {
            const ARITY: usize = $count;

            #[allow(non_snake_case)]
            fn from_args(args: Vec<Value>) -> Result<Self, ArgumentError> {
                let actual = args.len();
                if actual != Self::ARITY {
                    return Err(ArgumentError::Arity {
                        expected: Self::ARITY,
                        actual,
                    });
                }
                let mut args = args.into_iter().enumerate();
                $(
                    let (index, value) = args.next().ok_or(ArgumentError::Arity {
                        expected: Self::ARITY,
                        actual,
                    })?;
                    let $name = serde_json::from_value::<$name>(value)
                        .map_err(|source| ArgumentError::Type { index, source })?;
                )+
                Ok(($($name,)+))
            }
        }
    };
}

tuple_args!(1; A);
tuple_args!(2; A, B);
tuple_args!(3; A, B, C);
tuple_args!(4; A, B, C, D);
tuple_args!(5; A, B, C, D, E);
tuple_args!(6; A, B, C, D, E, F);
tuple_args!(7; A, B, C, D, E, F, G);
tuple_args!(8; A, B, C, D, E, F, G, H);
