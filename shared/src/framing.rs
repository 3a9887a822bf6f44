//! Length-prefixed framing over a byte stream.
//!
//! A frame is a 4-byte big-endian payload length followed by exactly that
//! many payload bytes. Reads loop until the frame is complete or the peer
//! goes away; a peer that closes before a frame is complete yields
//! `Ok(None)` rather than an error.

use crate::protocol;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single payload. Anything larger ends the connection.
pub const MAX_FRAME_LEN: usize = 1 << 20;

const HEADER_LEN: usize = 4;

/// Failure on the byte stream. The connection should be treated as dead.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Writes one frame. Header and payload go out in a single write.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }

    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);

    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame, returning `None` if the peer closed before it was complete.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    if !read_full(reader, &mut header).await? {
        return Ok(None);
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut payload = vec![0u8; len];
    if !read_full(reader, &mut payload).await? {
        return Ok(None);
    }

    Ok(Some(payload))
}

/// Fills `buf` completely. Returns false on end of stream.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<bool, TransportError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Encodes `message` and writes it as one frame.
pub async fn send_message<W, T>(writer: &mut W, message: &T) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = protocol::encode(message)?;
    write_frame(writer, &payload).await
}

/// Reads one frame and decodes it.
///
/// The outer `Result` is the transport; the inner one is the payload. A
/// payload that fails to decode leaves the stream usable.
pub async fn recv_message<R, T>(
    reader: &mut R,
) -> Result<Option<Result<T, protocol::ProtocolError>>, TransportError>
where
    R: AsyncRead + Unpin,
    T: for<'de> Deserialize<'de>,
{
    Ok(read_frame(reader)
        .await?
        .map(|payload| protocol::decode(&payload)))
}
