//! Frame codec.
//!
//! # Wire format
//!
//! ```text
//! [4-byte length, u32 big-endian] [1-byte tag] [JSON body]
//! ```
//!
//! The length counts the tag byte plus the body. Tag `0x01` carries a
//! [`Request`], tag `0x02` a [`Response`]. String payloads are JSON
//! encoded inside the body, so NUL, CR, LF and multi-byte text never
//! affect frame boundaries.
//!
//! Any malformed frame is a connection-level error; there is no attempt
//! to resynchronize.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::request::Request;
use crate::response::Response;

/// Size of the length prefix.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Default upper bound on a frame's length field (16 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const TAG_REQUEST: u8 = 0x01;
const TAG_RESPONSE: u8 = 0x02;

/// A single frame's payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Response(Response),
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Self::Request(request)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

/// Codec errors. All of them are fatal to the connection.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("frame length {len} exceeds maximum of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    #[error("empty frame")]
    EmptyFrame,

    #[error("unknown frame tag 0x{0:02x}")]
    UnknownTag(u8),

    #[error("invalid frame payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode a message into a complete frame.
pub fn encode(message: &Message) -> Result<Vec<u8>, CodecError> {
    let (tag, body) = match message {
        Message::Request(request) => (TAG_REQUEST, serde_json::to_vec(request)?),
        Message::Response(response) => (TAG_RESPONSE, serde_json::to_vec(response)?),
    };
    let len = body.len() + 1;
    if len > u32::MAX as usize {
        return Err(CodecError::FrameTooLarge {
            len,
            max: u32::MAX as usize,
        });
    }

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + len);
    frame.extend_from_slice(&(len as u32).to_be_bytes());
    frame.push(tag);
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Try to decode one frame from the front of `buf`.
///
/// Returns `Ok(None)` when `buf` does not yet hold a complete frame, or
/// the decoded message with the number of bytes it occupied.
pub fn try_decode_one(
    buf: &[u8],
    max_frame_len: usize,
) -> Result<Option<(Message, usize)>, CodecError> {
    if buf.len() < LENGTH_PREFIX_LEN {
        return Ok(None);
    }

    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    prefix.copy_from_slice(&buf[..LENGTH_PREFIX_LEN]);
    let len = u32::from_be_bytes(prefix) as usize;

    if len == 0 {
        return Err(CodecError::EmptyFrame);
    }
    if len > max_frame_len {
        return Err(CodecError::FrameTooLarge {
            len,
            max: max_frame_len,
        });
    }

    let total = LENGTH_PREFIX_LEN + len;
    if buf.len() < total {
        return Ok(None);
    }

    let tag = buf[LENGTH_PREFIX_LEN];
    let body = &buf[LENGTH_PREFIX_LEN + 1..total];
    let message = match tag {
        TAG_REQUEST => Message::Request(serde_json::from_slice(body)?),
        TAG_RESPONSE => Message::Response(serde_json::from_slice(body)?),
        other => return Err(CodecError::UnknownTag(other)),
    };
    Ok(Some((message, total)))
}

/// Streaming codec for `FramedRead` / `FramedWrite`.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_len: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, CodecError> {
        match try_decode_one(src, self.max_frame_len)? {
            Some((message, consumed)) => {
                src.advance(consumed);
                Ok(Some(message))
            }
            None => {
                if src.len() >= LENGTH_PREFIX_LEN {
                    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
                    prefix.copy_from_slice(&src[..LENGTH_PREFIX_LEN]);
                    let wanted = LENGTH_PREFIX_LEN + u32::from_be_bytes(prefix) as usize;
                    src.reserve(wanted.saturating_sub(src.len()));
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), CodecError> {
        let frame = encode(&message)?;
        let len = frame.len() - LENGTH_PREFIX_LEN;
        if len > self.max_frame_len {
            return Err(CodecError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }
        dst.reserve(frame.len());
        dst.put_slice(&frame);
        Ok(())
    }
}
