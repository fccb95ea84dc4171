//! Minimal postcard-framed protocol between CLI and hub.
//!
//! A connection carries exactly one request. Change and Create answer with the
//! line-framed run stream (see `stream`); Subscribe answers with one JSON
//! notification per line for as long as the client stays connected.
use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::history::Message;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Apply the trailing user message of `messages` to an existing project.
    Change {
        project_id: String,
        messages: Vec<Message>,
    },
    Create {
        owner: String,
        prompt: String,
    },
    Subscribe {
        owner: String,
    },
}

#[derive(Debug)]
pub enum ProtocolError {
    Disconnect,
    Timeout,
    Io(std::io::Error),
    Decode(postcard::Error),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::Disconnect => {
                write!(f, "connection dropped while the request was being read")
            }
            ProtocolError::Io(e) => write!(f, "io error: {e}"),
            ProtocolError::Timeout => write!(f, "timed out while reading request"),
            ProtocolError::Decode(e) => write!(f, "decode error: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Serialize any frame-like value and write it to the sink.
pub async fn write_frame_to_stream<W: AsyncWrite + Unpin, T: Serialize>(
    sink: &mut W,
    frame: &T,
) -> Result<()> {
    let bytes = postcard::to_allocvec(frame).map_err(|e| eyre!(e))?;
    sink.write_all(&bytes).await?;
    sink.flush().await?;
    Ok(())
}

/// Read a single postcard frame from the stream, buffering as needed.
pub async fn read_frame_from_stream<R: AsyncRead + Unpin, T: serde::de::DeserializeOwned>(
    stream: &mut R,
    store: &mut Vec<u8>,
    per_read_timeout: Option<std::time::Duration>,
    total_timeout: Option<std::time::Duration>,
) -> std::result::Result<T, ProtocolError> {
    use std::time::Instant;

    let start = Instant::now();
    let per_read_timeout = per_read_timeout.unwrap_or(std::time::Duration::MAX);
    let total_timeout = total_timeout.unwrap_or(std::time::Duration::MAX);
    let mut chunk = [0u8; 4096];

    loop {
        if !store.is_empty() {
            match postcard::take_from_bytes::<T>(&store[..]) {
                Err(postcard::Error::DeserializeUnexpectedEnd) => {
                    // Need more bytes.
                }
                Err(e) => return Err(ProtocolError::Decode(e)),
                Ok((msg, rest)) => {
                    let consumed = store.len() - rest.len();
                    let _ = store.drain(0..consumed);
                    return Ok(msg);
                }
            }
        }

        if start.elapsed() > total_timeout {
            return Err(ProtocolError::Timeout);
        }

        match tokio::time::timeout(per_read_timeout, stream.read(&mut chunk)).await {
            Err(_) => {
                // per-read timeout, try again
            }
            Ok(Err(e)) => return Err(ProtocolError::Io(e)),
            Ok(Ok(0)) => return Err(ProtocolError::Disconnect),
            Ok(Ok(n)) => store.extend_from_slice(&chunk[..n]),
        }
    }
}
