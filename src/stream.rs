//! Line-framed response stream consumed incrementally by clients.
//!
//! Each frame is `<tag>:<json>\n`:
//! - `f:{"messageId":"msg-…"}` opens a turn,
//! - `0:"…"` carries a text fragment,
//! - `e:{"finishReason":…,"usage":{…},"isContinued":…}` closes a turn,
//! - `3:"…"` reports a run-level failure.
//!
//! Several turns share one physical stream. A turn that hands over to further work closes
//! with `tool-calls` and `isContinued: true`; `stop` only ever closes the final turn of a
//! successful run. There is no backchannel.
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt_tokens += rhs.prompt_tokens;
        self.completion_tokens += rhs.completion_tokens;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    Error,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finish {
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub is_continued: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Start { message_id: String },
    Text(String),
    Finish(Finish),
    Error(String),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartPayload {
    message_id: String,
}

#[derive(Debug)]
pub enum DecodeError {
    MissingTag,
    UnknownTag(String),
    Payload(serde_json::Error),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::MissingTag => write!(f, "frame has no `<tag>:` prefix"),
            DecodeError::UnknownTag(tag) => write!(f, "unknown frame tag: {tag:?}"),
            DecodeError::Payload(e) => write!(f, "bad frame payload: {e}"),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        DecodeError::Payload(e)
    }
}

impl Frame {
    /// Render as one newline-terminated line.
    pub fn encode(&self) -> String {
        match self {
            Frame::Start { message_id } => {
                format!("f:{}\n", serde_json::json!({ "messageId": message_id }))
            }
            Frame::Text(text) => format!("0:{}\n", serde_json::Value::from(text.as_str())),
            Frame::Finish(finish) => format!(
                "e:{}\n",
                serde_json::json!({
                    "finishReason": finish.finish_reason,
                    "usage": finish.usage,
                    "isContinued": finish.is_continued,
                })
            ),
            Frame::Error(message) => format!("3:{}\n", serde_json::Value::from(message.as_str())),
        }
    }

    /// Parse one line; the trailing newline is optional.
    pub fn decode(line: &str) -> Result<Frame, DecodeError> {
        let line = line.trim_end_matches(['\n', '\r']);
        let Some((tag, payload)) = line.split_once(':') else {
            return Err(DecodeError::MissingTag);
        };
        let payload = payload.trim_start();
        match tag {
            "f" => {
                let start: StartPayload = serde_json::from_str(payload)?;
                Ok(Frame::Start {
                    message_id: start.message_id,
                })
            }
            "0" => Ok(Frame::Text(serde_json::from_str(payload)?)),
            "e" => Ok(Frame::Finish(serde_json::from_str(payload)?)),
            "3" => Ok(Frame::Error(serde_json::from_str(payload)?)),
            other => Err(DecodeError::UnknownTag(other.to_string())),
        }
    }

    /// The frame that marks a run as completed successfully.
    pub fn is_final_stop(&self) -> bool {
        matches!(
            self,
            Frame::Finish(Finish {
                finish_reason: FinishReason::Stop,
                is_continued: false,
                ..
            })
        )
    }
}

/// Split text into pieces of at most `max_chars` characters, on char boundaries.
pub fn chunks(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut out = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == max_chars {
            out.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

/// Write handle for one run's stream. Clones share the same ordered channel.
#[derive(Clone, Debug)]
pub struct Sink {
    tx: UnboundedSender<Frame>,
}

impl Sink {
    pub fn new() -> (Sink, UnboundedReceiver<Frame>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Sink { tx }, rx)
    }

    /// Queue a frame. Frames are dropped once the reader has gone away.
    pub fn send(&self, frame: Frame) {
        if self.tx.send(frame).is_err() {
            tracing::trace!("stream: reader gone, dropping frame");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Open a new turn and return its message id.
    pub fn start_turn(&self) -> String {
        let message_id = format!("msg-{}", Uuid::new_v4().simple());
        self.send(Frame::Start {
            message_id: message_id.clone(),
        });
        message_id
    }

    pub fn text(&self, piece: &str) {
        if !piece.is_empty() {
            self.send(Frame::Text(piece.to_string()));
        }
    }

    pub fn finish(&self, finish_reason: FinishReason, usage: Usage, is_continued: bool) {
        self.send(Frame::Finish(Finish {
            finish_reason,
            usage,
            is_continued,
        }));
    }

    /// Close the open turn. Only the last turn of a run may say `stop`.
    pub fn close_turn(&self, usage: Usage, is_continued: bool) {
        let finish_reason = if is_continued {
            FinishReason::ToolCalls
        } else {
            FinishReason::Stop
        };
        self.finish(finish_reason, usage, is_continued);
    }

    /// Emit a complete turn as fixed-size text chunks followed by a finish frame.
    pub fn emit_turn(&self, text: &str, chunk_chars: usize, usage: Usage, is_continued: bool) {
        self.start_turn();
        for piece in chunks(text, chunk_chars) {
            self.text(piece);
        }
        self.close_turn(usage, is_continued);
    }

    /// Terminal failure: an error frame and a finish frame that does not signal success.
    pub fn fail(&self, message: &str) {
        self.send(Frame::Error(message.to_string()));
        self.finish(FinishReason::Error, Usage::default(), false);
    }
}

/// Encode frames onto `writer` until every `Sink` is dropped.
/// A failed write means the peer disconnected; the receiver is dropped so later frames are discarded.
pub async fn pump<W: AsyncWrite + Unpin>(
    mut rx: UnboundedReceiver<Frame>,
    writer: &mut W,
) -> std::io::Result<usize> {
    let mut written = 0;
    while let Some(frame) = rx.recv().await {
        writer.write_all(frame.encode().as_bytes()).await?;
        writer.flush().await?;
        written += 1;
    }
    Ok(written)
}

/// Collect whatever is already queued without waiting.
pub fn drain(rx: &mut UnboundedReceiver<Frame>) -> Vec<Frame> {
    let mut out = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        out.push(frame);
    }
    out
}
