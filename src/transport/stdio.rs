//! NDJSON command reader and state writer.
//!
//! Both sides are generic over tokio I/O so tests can drive them with
//! in-memory buffers; the CLI wires them to stdin and stdout.
//!
//! # Edge Cases Handled
//!
//! - Last line without `\n`: returned, the next read reports EOF.
//! - Empty lines: skipped.
//! - Invalid JSON or unknown command type: logged and skipped.
//! - Oversized lines: the read is capped, the rest of the line drained and
//!   skipped.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::StdioConfig;
use crate::error::{SessionError, ZoneGateError};
use crate::governance::GovernanceState;
use crate::session::{SessionCommand, SessionHandle};

/// Reads session commands, one JSON object per line.
#[derive(Debug)]
pub struct CommandReader<R> {
    reader: R,
    max_line_size: usize,
    skipped: u64,
}

impl CommandReader<BufReader<tokio::io::Stdin>> {
    /// Reader over stdin with limits from the environment.
    #[must_use]
    pub fn stdin() -> Self {
        let config = StdioConfig::from_env();
        Self::new(
            BufReader::with_capacity(config.buffer_size, tokio::io::stdin()),
            config.max_line_size,
        )
    }
}

impl<R: AsyncBufRead + Unpin> CommandReader<R> {
    /// Wraps a buffered reader.
    pub const fn new(reader: R, max_line_size: usize) -> Self {
        Self {
            reader,
            max_line_size,
            skipped: 0,
        }
    }

    /// Lines skipped so far (invalid, oversized, or not UTF-8).
    #[must_use]
    pub const fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Next command, or `None` at EOF.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub async fn next_command(&mut self) -> std::io::Result<Option<SessionCommand>> {
        let read_limit = self.max_line_size + 1;
        let mut buf: Vec<u8> = Vec::with_capacity(read_limit.min(8 * 1024));

        loop {
            buf.clear();
            let mut overflowed = false;

            loop {
                let available = self.reader.fill_buf().await?;
                if available.is_empty() {
                    if buf.is_empty() && !overflowed {
                        return Ok(None);
                    }
                    break;
                }

                if let Some(pos) = available.iter().position(|&b| b == b'\n') {
                    if !overflowed {
                        let room = read_limit.saturating_sub(buf.len());
                        buf.extend_from_slice(&available[..pos.min(room)]);
                        overflowed = pos > room;
                    }
                    self.reader.consume(pos + 1);
                    break;
                }

                if !overflowed {
                    let room = read_limit.saturating_sub(buf.len());
                    buf.extend_from_slice(&available[..available.len().min(room)]);
                    overflowed = available.len() > room;
                }
                let consumed = available.len();
                self.reader.consume(consumed);
            }

            if overflowed || buf.len() > self.max_line_size {
                warn!(limit = self.max_line_size, "command line exceeds size limit, skipping");
                self.skipped += 1;
                continue;
            }

            let Ok(line) = std::str::from_utf8(&buf) else {
                warn!("invalid UTF-8 in command line, skipping");
                self.skipped += 1;
                continue;
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<SessionCommand>(trimmed) {
                Ok(command) => return Ok(Some(command)),
                Err(e) => {
                    warn!(
                        error = %e,
                        line = %sanitize_for_log(trimmed, 200),
                        "invalid session command, skipping"
                    );
                    self.skipped += 1;
                }
            }
        }
    }
}

/// Writes governance states, one JSON object per line.
#[derive(Debug)]
pub struct StateWriter<W> {
    writer: W,
    written: u64,
}

impl StateWriter<tokio::io::Stdout> {
    /// Writer over stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W: AsyncWrite + Unpin> StateWriter<W> {
    /// Wraps a writer.
    pub const fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// States written so far.
    #[must_use]
    pub const fn written(&self) -> u64 {
        self.written
    }

    /// Writes one state line and flushes.
    ///
    /// # Errors
    ///
    /// Returns a JSON or I/O error.
    pub async fn write_state(&mut self, state: &GovernanceState) -> Result<(), ZoneGateError> {
        let mut line = serde_json::to_vec(state)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.writer.flush().await?;
        self.written += 1;
        Ok(())
    }

    /// Unwraps the inner writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Feeds commands from `reader` into the session until EOF, cancellation,
/// or the session closing. Returns the number of commands forwarded.
///
/// Samples that hit back-pressure are dropped; the loop keeps reading.
///
/// # Errors
///
/// Returns an I/O error from the reader.
pub async fn forward_commands<R: AsyncBufRead + Unpin>(
    reader: &mut CommandReader<R>,
    handle: &SessionHandle,
    cancel: &CancellationToken,
) -> Result<u64, ZoneGateError> {
    let mut forwarded = 0;
    loop {
        let command = tokio::select! {
            () = cancel.cancelled() => break,
            command = reader.next_command() => command?,
        };
        let Some(command) = command else {
            debug!("stdin closed");
            break;
        };

        match handle.submit(command).await {
            Ok(()) => forwarded += 1,
            Err(SessionError::Backpressure(_)) => {}
            Err(err) => {
                debug!(error = %err, "session no longer accepting commands");
                break;
            }
        }
    }
    Ok(forwarded)
}

/// Writes every published state change until the session drops its sender.
///
/// The state current at call time is written first.
///
/// # Errors
///
/// Returns a JSON or I/O error from the writer.
pub async fn publish_states<W: AsyncWrite + Unpin>(
    writer: &mut StateWriter<W>,
    states: watch::Receiver<GovernanceState>,
) -> Result<(), ZoneGateError> {
    let mut stream = WatchStream::new(states);
    while let Some(state) = stream.next().await {
        writer.write_state(&state).await?;
    }
    Ok(())
}

/// Truncates and strips control characters from untrusted input before logging.
fn sanitize_for_log(input: &str, max_len: usize) -> String {
    input
        .chars()
        .take(max_len)
        .map(|c| {
            if c.is_control() && c != '\t' {
                '\u{FFFD}'
            } else {
                c
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(input: &str, limit: usize) -> CommandReader<BufReader<&[u8]>> {
        CommandReader::new(BufReader::new(input.as_bytes()), limit)
    }

    #[tokio::test]
    async fn reads_commands_and_skips_noise() {
        let input = concat!(
            "{\"type\":\"pause_session\"}\n",
            "\n",
            "not json\n",
            "{\"type\":\"self_destruct\"}\n",
            "{\"type\":\"leave\",\"participant_id\":\"A\"}"
        );
        let mut reader = reader(input, 1024);

        assert_eq!(
            reader.next_command().await.unwrap(),
            Some(SessionCommand::PauseSession)
        );
        assert_eq!(
            reader.next_command().await.unwrap(),
            Some(SessionCommand::Leave {
                participant_id: "A".to_string()
            })
        );
        assert_eq!(reader.next_command().await.unwrap(), None);
        assert_eq!(reader.skipped(), 2);
    }

    #[tokio::test]
    async fn oversized_line_skipped() {
        let long = format!(
            "{{\"type\":\"leave\",\"participant_id\":\"{}\"}}\n{{\"type\":\"resume_session\"}}\n",
            "x".repeat(200)
        );
        let mut reader = reader(&long, 64);
        assert_eq!(
            reader.next_command().await.unwrap(),
            Some(SessionCommand::ResumeSession)
        );
        assert_eq!(reader.skipped(), 1);
    }

    #[tokio::test]
    async fn line_split_across_reads() {
        let mock = tokio_test::io::Builder::new()
            .read(b"{\"type\":\"mark_ab")
            .read(b"sent\",\"participant_id\":\"B\"}\n")
            .build();
        let mut reader = CommandReader::new(BufReader::new(mock), 1024);

        assert_eq!(
            reader.next_command().await.unwrap(),
            Some(SessionCommand::MarkAbsent {
                participant_id: "B".to_string()
            })
        );
        assert_eq!(reader.next_command().await.unwrap(), None);
    }

    #[tokio::test]
    async fn writer_emits_one_line_per_state() {
        let mut writer = StateWriter::new(Vec::new());
        writer.write_state(&GovernanceState::default()).await.unwrap();
        writer.write_state(&GovernanceState::default()).await.unwrap();
        assert_eq!(writer.written(), 2);

        let out = String::from_utf8(writer.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let json: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(json["phase"], "unlocked");
        assert_eq!(json["video_locked"], false);
    }

    #[tokio::test]
    async fn publish_stops_when_sender_dropped() {
        let (tx, rx) = watch::channel(GovernanceState::default());
        let mut writer = StateWriter::new(Vec::new());
        tx.send_modify(|state| state.paused = true);
        drop(tx);
        publish_states(&mut writer, rx).await.unwrap();
        assert_eq!(writer.written(), 1);
    }

    #[test]
    fn sanitize_strips_control_chars() {
        assert_eq!(sanitize_for_log("a\u{1b}[31mb\tc", 100), "a\u{FFFD}[31mb\tc");
        assert_eq!(sanitize_for_log("abcdef", 3), "abc");
    }
}
