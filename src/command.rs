//! Outbound rover commands
//!
//! Commands are single dot-prefixed tokens written to the rover's serial
//! monitor. Delivery is fire-and-forget: nothing waits for an acknowledgement
//! and a failed send never rolls back local state.

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Forward,
    Left,
    Back,
    Right,
    CaptureImage,
    ClearMap,
    /// Free text from the operator console
    Raw(String),
}

impl Command {
    /// Map a driving key (`w`, `a`, `s`, `d`) to its command
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "w" => Some(Command::Forward),
            "a" => Some(Command::Left),
            "s" => Some(Command::Back),
            "d" => Some(Command::Right),
            _ => None,
        }
    }

    /// Parse an operator console line
    pub fn from_operator_input(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        if let Some(cmd) = Self::from_key(input) {
            return Some(cmd);
        }
        match input.to_ascii_lowercase().as_str() {
            "image" => Some(Command::CaptureImage),
            "clear" | "reset" => Some(Command::ClearMap),
            _ => Some(Command::Raw(input.to_string())),
        }
    }

    pub fn token(&self) -> &str {
        match self {
            Command::Forward => ".w",
            Command::Left => ".a",
            Command::Back => ".s",
            Command::Right => ".d",
            Command::CaptureImage => ".IMAGE",
            Command::ClearMap => ".CLEAR",
            Command::Raw(text) => text.as_str(),
        }
    }

    /// Frame written to the link: `{"type":"serial_write","line":"<token>"}`
    pub fn to_frame(&self) -> String {
        json!({ "type": "serial_write", "line": self.token() }).to_string()
    }
}

/// Fire-and-forget command destination
pub trait CommandSink {
    fn send(&self, command: Command);
}

/// Sink that forwards commands to the link writer task
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Command>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<Command>) -> Self {
        Self { tx }
    }
}

impl CommandSink for ChannelSink {
    fn send(&self, command: Command) {
        debug!(token = command.token(), "Queueing command");
        if let Err(e) = self.tx.send(command) {
            warn!(token = e.0.token(), "Command dropped, link writer is gone");
        }
    }
}

/// Sink used while no link is up
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl CommandSink for NullSink {
    fn send(&self, command: Command) {
        debug!(token = command.token(), "No link, command discarded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens() {
        assert_eq!(Command::Forward.token(), ".w");
        assert_eq!(Command::Left.token(), ".a");
        assert_eq!(Command::Back.token(), ".s");
        assert_eq!(Command::Right.token(), ".d");
        assert_eq!(Command::CaptureImage.token(), ".IMAGE");
        assert_eq!(Command::ClearMap.token(), ".CLEAR");
    }

    #[test]
    fn test_frame_encoding() {
        let frame: serde_json::Value = serde_json::from_str(&Command::ClearMap.to_frame()).unwrap();
        assert_eq!(frame["type"], "serial_write");
        assert_eq!(frame["line"], ".CLEAR");
    }

    #[test]
    fn test_operator_input() {
        assert_eq!(Command::from_operator_input("W"), Some(Command::Forward));
        assert_eq!(Command::from_operator_input(" d "), Some(Command::Right));
        assert_eq!(Command::from_operator_input("image"), Some(Command::CaptureImage));
        assert_eq!(Command::from_operator_input("reset"), Some(Command::ClearMap));
        assert_eq!(
            Command::from_operator_input("PING"),
            Some(Command::Raw("PING".to_string()))
        );
        assert_eq!(Command::from_operator_input("   "), None);
    }

    #[test]
    fn test_channel_sink_is_fire_and_forget() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);
        sink.send(Command::Forward);
        assert_eq!(rx.try_recv().unwrap(), Command::Forward);

        drop(rx);
        // Closed channel must not panic
        sink.send(Command::Back);
    }
}
