//! Turn the hub's run stream into terminal output.
use eyre::{Result, eyre};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::stream::{FinishReason, Frame, Usage};

/// What a finished stream amounted to.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Rendered {
    pub turns: usize,
    pub completed: bool,
    pub error: Option<String>,
    pub usage: Usage,
}

impl Rendered {
    /// Success only when the final turn closed the run.
    pub fn into_result(self) -> Result<Usage> {
        if let Some(error) = self.error {
            return Err(eyre!("run failed: {error}"));
        }
        if !self.completed {
            return Err(eyre!("hub closed the stream before the run finished"));
        }
        Ok(self.usage)
    }
}

/// Print text frames as they arrive, one paragraph per turn.
pub async fn render_stream<R, W>(reader: R, out: &mut W) -> Result<Rendered>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut rendered = Rendered::default();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let frame = match Frame::decode(&line) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "cli: skipping undecodable frame");
                continue;
            }
        };
        if frame.is_final_stop() {
            rendered.completed = true;
        }
        match frame {
            Frame::Start { .. } => {
                if rendered.turns > 0 {
                    out.write_all(b"\n").await?;
                }
                rendered.turns += 1;
            }
            Frame::Text(text) => out.write_all(text.as_bytes()).await?,
            Frame::Finish(finish) => {
                rendered.usage += finish.usage;
                if finish.finish_reason != FinishReason::Error {
                    out.write_all(b"\n").await?;
                }
            }
            Frame::Error(message) => rendered.error = Some(message),
        }
        out.flush().await?;
    }
    Ok(rendered)
}
