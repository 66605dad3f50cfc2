//! Bridge Protocol Types
//!
//! Wire types and the frame codec shared by the host-side client and the
//! worker-side server.

pub mod args;
pub mod codec;
pub mod error;
pub mod request;
pub mod response;
pub mod transport;

pub use args::{ArgumentError, FromArgs, IntoArgs};
pub use codec::{
    encode, try_decode_one, CodecError, FrameCodec, Message, DEFAULT_MAX_FRAME_LEN,
    LENGTH_PREFIX_LEN,
};
pub use error::{Failure, FailureKind};
pub use request::{CallId, Request, TargetHandle};
pub use response::{Outcome, Reply, Response};
pub use transport::{StdioPair, Transport};
