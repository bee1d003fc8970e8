//! Image chunk reassembly
//!
//! The rover streams a camera frame as base64 text split over several serial
//! lines, bracketed by marker lines:
//!
//! ```text
//! B64_IMAGE_START
//! /9j/4AAQSkZJRgABAQ...
//! ...
//! B64_IMAGE_END
//! ```
//!
//! While a capture is open every line is a chunk, so nothing else gets to
//! interpret those lines.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Serialize;

pub const IMAGE_START_MARKER: &str = "B64_IMAGE_START";
pub const IMAGE_END_MARKER: &str = "B64_IMAGE_END";

/// Mime type used when a frame does not name one
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// Upper bound on base64 text held by one open capture
pub const DEFAULT_IMAGE_MAX_BYTES: usize = 4 * 1024 * 1024;

/// A complete base64-encoded image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImagePayload {
    pub base64: String,
    pub mime: String,
    /// Decoded byte length, if the payload is valid base64
    pub decoded_len: Option<usize>,
}

impl ImagePayload {
    pub fn new(base64: impl Into<String>, mime: impl Into<String>) -> Self {
        let base64 = base64.into();
        let decoded_len = BASE64.decode(base64.as_bytes()).ok().map(|raw| raw.len());
        Self {
            base64,
            mime: mime.into(),
            decoded_len,
        }
    }

    /// Split a `data:<mime>;base64,<payload>` URL
    pub fn from_data_url(url: &str) -> Option<Self> {
        let rest = url.strip_prefix("data:")?;
        let (mime, payload) = rest.split_once(";base64,")?;
        Some(Self::new(payload.trim(), mime))
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.base64)
    }
}

/// Reassembler state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Capturing { chunks: Vec<String>, bytes: usize },
}

/// What the reassembler did with a line
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// Not image data; other line rules may look at it
    Passthrough,
    /// Consumed as a marker or chunk
    Consumed,
    /// END closed a non-empty capture
    Completed(ImagePayload),
}

/// Two-state machine joining chunk lines into one image.
///
/// Lives for one connection epoch; call [`ImageReassembler::reset`] when the
/// link reconnects. A capture that grows past `max_bytes` of chunk text is
/// abandoned and the machine returns to Idle.
#[derive(Debug, Clone)]
pub struct ImageReassembler {
    state: CaptureState,
    mime: String,
    max_bytes: usize,
}

impl ImageReassembler {
    pub fn new(mime: impl Into<String>, max_bytes: usize) -> Self {
        Self {
            state: CaptureState::Idle,
            mime: mime.into(),
            max_bytes: max_bytes.max(1),
        }
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self.state, CaptureState::Capturing { .. })
    }

    /// Drop any partial capture and return to Idle
    pub fn reset(&mut self) {
        self.state = CaptureState::Idle;
    }

    pub fn feed(&mut self, text: &str) -> LineOutcome {
        if text == IMAGE_START_MARKER {
            if let CaptureState::Capturing { chunks, .. } = &self.state {
                tracing::debug!(discarded_chunks = chunks.len(), "Image capture restarted");
            }
            self.state = CaptureState::Capturing {
                chunks: Vec::new(),
                bytes: 0,
            };
            return LineOutcome::Consumed;
        }

        match &mut self.state {
            CaptureState::Idle => LineOutcome::Passthrough,
            CaptureState::Capturing { chunks, bytes } => {
                if text != IMAGE_END_MARKER {
                    let chunk = text.trim();
                    *bytes += chunk.len();
                    if *bytes > self.max_bytes {
                        tracing::debug!(
                            chunks = chunks.len(),
                            max_bytes = self.max_bytes,
                            "Image capture too large, dropped"
                        );
                        self.state = CaptureState::Idle;
                    } else {
                        chunks.push(chunk.to_string());
                    }
                    return LineOutcome::Consumed;
                }

                let chunks = std::mem::take(chunks);
                self.state = CaptureState::Idle;
                if chunks.is_empty() {
                    tracing::debug!("Image end marker with no chunks");
                    return LineOutcome::Consumed;
                }
                LineOutcome::Completed(ImagePayload::new(chunks.concat(), self.mime.as_str()))
            }
        }
    }
}

impl Default for ImageReassembler {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_MIME, DEFAULT_IMAGE_MAX_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(r: &mut ImageReassembler, lines: &[&str]) -> Vec<ImagePayload> {
        lines
            .iter()
            .filter_map(|l| match r.feed(l) {
                LineOutcome::Completed(img) => Some(img),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_chunks_are_concatenated_in_order() {
        let mut r = ImageReassembler::default();
        let images = feed_all(&mut r, &["B64_IMAGE_START", "aGVs", "bG8=", "B64_IMAGE_END"]);
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].base64, "aGVsbG8=");
        assert_eq!(images[0].decoded_len, Some(5));
        assert_eq!(images[0].data_url(), "data:image/jpeg;base64,aGVsbG8=");
        assert_eq!(r.state(), &CaptureState::Idle);
    }

    #[test]
    fn test_chunks_are_trimmed() {
        let mut r = ImageReassembler::default();
        let images = feed_all(&mut r, &["B64_IMAGE_START", "  aGVs\r", "\tbG8= ", "B64_IMAGE_END"]);
        assert_eq!(images[0].base64, "aGVsbG8=");
    }

    #[test]
    fn test_restart_discards_partial_capture() {
        let mut r = ImageReassembler::default();
        let images = feed_all(
            &mut r,
            &["B64_IMAGE_START", "stale", "B64_IMAGE_START", "aGk=", "B64_IMAGE_END"],
        );
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].base64, "aGk=");
    }

    #[test]
    fn test_end_without_chunks_emits_nothing() {
        let mut r = ImageReassembler::default();
        assert_eq!(r.feed("B64_IMAGE_START"), LineOutcome::Consumed);
        assert_eq!(r.feed("B64_IMAGE_END"), LineOutcome::Consumed);
        assert!(!r.is_capturing());
    }

    #[test]
    fn test_idle_lines_pass_through() {
        let mut r = ImageReassembler::default();
        assert_eq!(r.feed("hello"), LineOutcome::Passthrough);
        assert_eq!(r.feed("B64_IMAGE_END"), LineOutcome::Passthrough);
    }

    #[test]
    fn test_capture_shadows_matrix_lines() {
        let mut r = ImageReassembler::default();
        r.feed("B64_IMAGE_START");
        assert_eq!(r.feed("RECV_ROVER_x,M,0000000000"), LineOutcome::Consumed);
    }

    #[test]
    fn test_oversized_capture_is_dropped() {
        let mut r = ImageReassembler::new("image/jpeg", 8);
        assert_eq!(r.feed("B64_IMAGE_START"), LineOutcome::Consumed);
        assert_eq!(r.feed("aGVsbG8="), LineOutcome::Consumed);
        assert!(r.is_capturing());

        // Ninth byte overflows the cap
        assert_eq!(r.feed("QQ=="), LineOutcome::Consumed);
        assert_eq!(r.state(), &CaptureState::Idle);
        assert_eq!(r.feed("B64_IMAGE_END"), LineOutcome::Passthrough);

        // A fresh capture within the cap still completes
        let images = feed_all(&mut r, &["B64_IMAGE_START", "aGk=", "B64_IMAGE_END"]);
        assert_eq!(images[0].base64, "aGk=");
    }

    #[test]
    fn test_reset_drops_capture() {
        let mut r = ImageReassembler::default();
        r.feed("B64_IMAGE_START");
        r.feed("abcd");
        r.reset();
        assert_eq!(r.feed("B64_IMAGE_END"), LineOutcome::Passthrough);
    }

    #[test]
    fn test_data_url_round_trip_and_invalid_base64() {
        let img = ImagePayload::from_data_url("data:image/png;base64,aGk=").unwrap();
        assert_eq!(img.mime, "image/png");
        assert_eq!(img.decoded_len, Some(2));

        assert!(ImagePayload::from_data_url("not a url").is_none());
        assert_eq!(ImagePayload::new("%%%", "image/jpeg").decoded_len, None);
    }
}
