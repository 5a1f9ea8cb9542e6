//! Frame codec.
//!
//! Every message travels as one frame:
//!
//! ```text
//! [length: u32 big-endian][body: JSON, `length` bytes]
//! ```
//!
//! Frames larger than [`MAX_FRAME_LEN`] are rejected.

use crate::core::error::{PeerError, PeerResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Length prefix size in bytes.
pub const HEADER_LEN: usize = 4;

/// Largest accepted frame body.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Result of decoding a frame from a buffer.
#[derive(Debug)]
pub enum DecodeResult<T> {
    /// A complete frame was decoded and consumed.
    Complete(T),
    /// More data is needed.
    Incomplete,
    /// The input is invalid.
    Invalid(String),
}

/// Encode a message into a frame.
pub fn encode_frame<T: Serialize>(message: &T) -> PeerResult<Bytes> {
    let body = serde_json::to_vec(message).map_err(|e| PeerError::codec(e.to_string()))?;
    if body.len() > MAX_FRAME_LEN {
        return Err(PeerError::codec(format!(
            "frame of {} bytes exceeds {} byte limit",
            body.len(),
            MAX_FRAME_LEN
        )));
    }

    let mut frame = BytesMut::with_capacity(HEADER_LEN + body.len());
    frame.put_u32(body.len() as u32);
    frame.put_slice(&body);
    Ok(frame.freeze())
}

/// Attempt to decode one frame from the front of `buffer`.
///
/// On `Complete` the frame's bytes are consumed; otherwise the buffer is
/// left untouched.
pub fn decode_frame<T: DeserializeOwned>(buffer: &mut BytesMut) -> DecodeResult<T> {
    if buffer.len() < HEADER_LEN {
        return DecodeResult::Incomplete;
    }

    let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
    if len > MAX_FRAME_LEN {
        return DecodeResult::Invalid(format!(
            "frame of {} bytes exceeds {} byte limit",
            len, MAX_FRAME_LEN
        ));
    }
    if buffer.len() < HEADER_LEN + len {
        return DecodeResult::Incomplete;
    }

    buffer.advance(HEADER_LEN);
    let body = buffer.split_to(len);
    match serde_json::from_slice(&body) {
        Ok(message) => DecodeResult::Complete(message),
        Err(e) => DecodeResult::Invalid(e.to_string()),
    }
}

/// Read one frame from `reader`, buffering partial input in `buffer`.
///
/// Returns `Ok(None)` on a clean end of stream between frames.
pub async fn read_frame<T, R>(reader: &mut R, buffer: &mut BytesMut) -> PeerResult<Option<T>>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    loop {
        match decode_frame(buffer) {
            DecodeResult::Complete(message) => return Ok(Some(message)),
            DecodeResult::Invalid(reason) => return Err(PeerError::codec(reason)),
            DecodeResult::Incomplete => {}
        }

        if reader.read_buf(buffer).await? == 0 {
            if buffer.is_empty() {
                return Ok(None);
            }
            return Err(PeerError::codec("connection closed mid-frame"));
        }
    }
}

/// Write one frame to `writer` and flush it.
pub async fn write_frame<T, W>(writer: &mut W, message: &T) -> PeerResult<()>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
