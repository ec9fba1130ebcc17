// src/protocol/channel.rs

//! Stream plumbing between a worker process and the event sink.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::events::{AppEvent, EventSink, WorkerId};
use crate::protocol::{LineBuffer, Message, decode_line};

const READ_CHUNK: usize = 8 * 1024;

/// Decoder for one worker's stdout.
///
/// Feeds raw chunks through a [`LineBuffer`] and decodes each complete line.
/// Lines that fail to decode are logged and counted, never returned.
#[derive(Debug, Default)]
pub struct LineProtocolChannel {
    buffer: LineBuffer,
    decoded: u64,
    dropped: u64,
}

impl LineProtocolChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages completed by this chunk, in arrival order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Message> {
        let lines = self.buffer.push(chunk);
        lines.iter().filter_map(|line| self.decode(line)).collect()
    }

    /// Decode whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<Message> {
        let line = self.buffer.finish()?;
        self.decode(&line)
    }

    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn decode(&mut self, line: &str) -> Option<Message> {
        match decode_line(line) {
            Ok(msg) => {
                self.decoded += 1;
                Some(msg)
            }
            Err(err) => {
                self.dropped += 1;
                warn!(error = %err, "dropping non-protocol line from worker stdout");
                None
            }
        }
    }
}

/// Read worker stdout until EOF, emitting one [`AppEvent::Worker`] per line.
///
/// Returns the channel so callers can inspect decode statistics.
pub async fn pump_stdout<R>(worker: WorkerId, mut reader: R, sink: EventSink) -> LineProtocolChannel
where
    R: AsyncRead + Unpin,
{
    let mut channel = LineProtocolChannel::new();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                warn!(worker, error = %err, "reading worker stdout failed; closing stream");
                break;
            }
        };

        for msg in channel.feed(&buf[..n]) {
            debug!(worker, kind = %msg.kind, "worker message");
            sink.emit(AppEvent::Worker(msg)).await;
        }
    }

    if let Some(msg) = channel.finish() {
        debug!(worker, kind = %msg.kind, "worker message (unterminated)");
        sink.emit(AppEvent::Worker(msg)).await;
    }

    debug!(
        worker,
        decoded = channel.decoded(),
        dropped = channel.dropped(),
        "worker stdout closed"
    );
    channel
}

/// Read worker stderr until EOF; each read becomes one `error` message.
///
/// Stderr carries ad hoc diagnostics, so it is deliberately not line-split.
pub async fn pump_stderr<R>(worker: WorkerId, mut reader: R, sink: EventSink)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                debug!(worker, "stderr: {}", text.trim_end());
                sink.emit(AppEvent::Worker(Message::error(text))).await;
            }
            Err(err) => {
                warn!(worker, error = %err, "reading worker stderr failed; closing stream");
                break;
            }
        }
    }

    debug!(worker, "worker stderr closed");
}

/// Write `line` followed by a newline and flush.
pub async fn write_line<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut data = Vec::with_capacity(line.len() + 1);
    data.extend_from_slice(line.as_bytes());
    data.push(b'\n');
    writer.write_all(&data).await?;
    writer.flush().await
}
