//! Rover link transport
//!
//! This module provides an async TCP client that:
//! - Connects to the rover backend's frame stream
//! - Reads newline-delimited JSON frames in order into a channel, skipping
//!   lines that are not UTF-8 or longer than the configured cap
//! - Writes outbound commands without waiting for any reply
//! - Reports connection loss through a status value

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::command::{ChannelSink, Command};

/// Port used when the link URL does not name one
pub const DEFAULT_LINK_PORT: u16 = 8000;

/// Longest frame line kept by default
pub const DEFAULT_MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// Connectivity as seen by an outside observer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    Connected,
    Disconnected { reason: String },
}

/// One line read off the link
#[derive(Debug, PartialEq, Eq)]
enum RawLine {
    Text(String),
    /// Not UTF-8 or over the cap; the connection stays up
    Skipped,
    Eof,
}

/// Read one `\n`-terminated line holding at most `max_line_bytes` bytes.
///
/// The trailing `\n` / `\r\n` is stripped. An overlong line is drained up
/// to its newline in bounded reads, so memory stays within the cap.
async fn read_raw_line<R>(reader: &mut R, buf: &mut Vec<u8>, max_line_bytes: usize) -> std::io::Result<RawLine>
where
    R: AsyncBufRead + Unpin,
{
    let limit = max_line_bytes as u64 + 1;
    buf.clear();
    let n = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(RawLine::Eof);
    }

    if buf.last() != Some(&b'\n') && buf.len() > max_line_bytes {
        let mut discarded = buf.len();
        loop {
            buf.clear();
            let n = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
            discarded += n;
            if n == 0 || buf.last() == Some(&b'\n') {
                break;
            }
        }
        debug!(discarded, max_line_bytes, "Overlong link line skipped");
        return Ok(RawLine::Skipped);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }

    match String::from_utf8(std::mem::take(buf)) {
        Ok(line) => Ok(RawLine::Text(line)),
        Err(e) => {
            debug!(error = %e, "Link line is not UTF-8, skipped");
            Ok(RawLine::Skipped)
        }
    }
}

/// One live connection to the rover backend
pub struct LinkClient {
    frames: mpsc::Receiver<String>,
    commands: mpsc::UnboundedSender<Command>,
    reader_handle: JoinHandle<LinkStatus>,
    writer_handle: JoinHandle<()>,
}

impl LinkClient {
    /// Connect and start the reader and writer tasks
    ///
    /// # Arguments
    /// * `url` - URL like "tcp://localhost:8000"
    /// * `channel_capacity` - Frames buffered between the reader and processor
    /// * `max_line_bytes` - Longest frame line kept
    pub async fn connect(url: &str, channel_capacity: usize, max_line_bytes: usize) -> Result<Self> {
        info!(url = url, "Connecting to rover link");

        let (host, port) = parse_link_url(url)?;
        let stream = TcpStream::connect((host.as_str(), port))
            .await
            .with_context(|| format!("Failed to connect to {}:{}", host, port))?;
        let (read_half, mut write_half) = stream.into_split();

        let (frame_tx, frames) = mpsc::channel::<String>(channel_capacity.max(1));
        let (commands, mut command_rx) = mpsc::unbounded_channel::<Command>();

        let reader_handle = tokio::spawn(async move {
            let mut reader = BufReader::new(read_half);
            let mut buf = Vec::new();
            loop {
                match read_raw_line(&mut reader, &mut buf, max_line_bytes.max(1)).await {
                    Ok(RawLine::Skipped) => continue,
                    Ok(RawLine::Text(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if frame_tx.send(line).await.is_err() {
                            debug!("Frame receiver dropped, stopping reader");
                            return LinkStatus::Disconnected {
                                reason: "processor stopped".to_string(),
                            };
                        }
                    }
                    Ok(RawLine::Eof) => {
                        warn!("Rover link closed by peer");
                        return LinkStatus::Disconnected {
                            reason: "closed by peer".to_string(),
                        };
                    }
                    Err(e) => {
                        error!(error = %e, "Error reading from rover link");
                        return LinkStatus::Disconnected {
                            reason: e.to_string(),
                        };
                    }
                }
            }
        });

        let writer_handle = tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                let mut frame = command.to_frame();
                frame.push('\n');
                match write_half.write_all(frame.as_bytes()).await {
                    Ok(()) => debug!(token = command.token(), "Command sent"),
                    Err(e) => {
                        // Fire-and-forget: log and keep draining
                        warn!(error = %e, token = command.token(), "Failed to send command");
                    }
                }
            }
        });

        info!("Rover link connected");

        Ok(Self {
            frames,
            commands,
            reader_handle,
            writer_handle,
        })
    }

    /// Next raw frame, or `None` once the connection is gone
    pub async fn next_frame(&mut self) -> Option<String> {
        self.frames.recv().await
    }

    /// Sink that queues commands on this connection
    pub fn sink(&self) -> ChannelSink {
        ChannelSink::new(self.commands.clone())
    }

    /// Stop both tasks and report why the link ended
    pub async fn shutdown(self) -> LinkStatus {
        self.writer_handle.abort();
        let reader_handle = self.reader_handle;
        if !reader_handle.is_finished() {
            reader_handle.abort();
        }
        match reader_handle.await {
            Ok(status) => status,
            Err(_) => LinkStatus::Disconnected {
                reason: "shut down".to_string(),
            },
        }
    }
}

/// Parse link URL into host and port
///
/// Supports:
/// - tcp://localhost:8000
/// - tcp://192.168.4.1:9000
/// - tcp://rover.local (default port)
pub fn parse_link_url(url: &str) -> Result<(String, u16)> {
    let url_without_protocol = url
        .strip_prefix("tcp://")
        .context("Invalid link URL: must start with tcp://")?
        .trim_end_matches('/');

    if let Some((host, port_str)) = url_without_protocol.rsplit_once(':') {
        let port = port_str
            .parse::<u16>()
            .context("Invalid port number in link URL")?;
        Ok((host.to_string(), port))
    } else {
        Ok((url_without_protocol.to_string(), DEFAULT_LINK_PORT))
    }
}
