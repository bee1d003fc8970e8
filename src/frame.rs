//! Inbound frame classification
//!
//! Every message on the link is one JSON object with a string `type`:
//!
//! ```text
//! {"type":"telemetry","row":{"ts":1712000000,"Temp1":2845,...}}
//! {"type":"serial_in","ts":1712000000.25,"line":"B64_IMAGE_START"}
//! {"type":"image","data_url":"data:image/jpeg;base64,..."}
//! ```
//!
//! Anything else is classified as [`Frame::Unknown`] and dropped by the
//! caller. Classification never fails.

use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::buffer::TelemetryRow;
use crate::image::{ImagePayload, DEFAULT_IMAGE_MIME};

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Telemetry(TelemetryRow),
    SerialLine { ts_ms: u64, text: String },
    Image(ImagePayload),
    Unknown,
}

/// Wall-clock time in milliseconds since the Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Classify a frame received now
pub fn classify(raw: &str) -> Frame {
    classify_at(raw, now_ms())
}

/// Classify a frame, using `received_ms` when a serial line has no timestamp
pub fn classify_at(raw: &str, received_ms: u64) -> Frame {
    let msg: Map<String, Value> = match serde_json::from_str(raw) {
        Ok(msg) => msg,
        Err(e) => {
            debug!(error = %e, "Dropping malformed frame");
            return Frame::Unknown;
        }
    };

    let frame = match msg.get("type").and_then(Value::as_str) {
        Some("telemetry") => classify_telemetry(&msg),
        Some("serial_in") => Some(classify_serial_in(&msg, received_ms)),
        Some("image") => classify_image(&msg),
        Some(other) => {
            debug!(frame_type = other, "Ignoring unknown frame type");
            None
        }
        None => {
            debug!("Dropping frame without a string type");
            None
        }
    };

    frame.unwrap_or(Frame::Unknown)
}

fn classify_telemetry(msg: &Map<String, Value>) -> Option<Frame> {
    let row = match msg.get("row") {
        Some(Value::Null) | None => msg.get("data"),
        row => row,
    };
    match row {
        Some(Value::Object(fields)) => Some(Frame::Telemetry(TelemetryRow::new(fields.clone()))),
        _ => {
            debug!("Telemetry frame without a row object");
            None
        }
    }
}

fn classify_serial_in(msg: &Map<String, Value>, received_ms: u64) -> Frame {
    let ts_ms = msg
        .get("ts")
        .and_then(Value::as_f64)
        .filter(|ts| ts.is_finite())
        .map(|secs| (secs * 1000.0).round() as u64)
        .unwrap_or(received_ms);

    let text = match msg.get("line") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    Frame::SerialLine { ts_ms, text }
}

fn classify_image(msg: &Map<String, Value>) -> Option<Frame> {
    // The backend nests image fields under `data`; accept both shapes
    let nested = msg.get("data").and_then(Value::as_object);
    let sources = std::iter::once(msg).chain(nested);

    for source in sources {
        if let Some(url) = source.get("data_url").and_then(Value::as_str) {
            if let Some(image) = ImagePayload::from_data_url(url) {
                return Some(Frame::Image(image));
            }
        }
        if let Some(b64) = source.get("b64").and_then(Value::as_str) {
            let mime = source
                .get("mime")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_IMAGE_MIME);
            return Some(Frame::Image(ImagePayload::new(b64.trim(), mime)));
        }
    }

    debug!("Image frame without data_url or b64");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: u64 = 1_712_000_000_000;

    #[test]
    fn test_malformed_frames_are_unknown() {
        assert_eq!(classify_at("not json", NOW), Frame::Unknown);
        assert_eq!(classify_at("[1,2,3]", NOW), Frame::Unknown);
        assert_eq!(classify_at(r#"{"type":123}"#, NOW), Frame::Unknown);
        assert_eq!(classify_at(r#"{"line":"x"}"#, NOW), Frame::Unknown);
        assert_eq!(classify_at(r#"{"type":"serial_out","line":"x"}"#, NOW), Frame::Unknown);
    }

    #[test]
    fn test_telemetry_row_and_data_fallback() {
        let frame = classify_at(r#"{"type":"telemetry","row":{"ts":5,"Temp1":2000}}"#, NOW);
        match frame {
            Frame::Telemetry(row) => {
                assert_eq!(row.fields["Temp1"], json!(2000));
                assert_eq!(row.timestamp, Some(5000.0));
            }
            other => panic!("expected telemetry, got {:?}", other),
        }

        let frame = classify_at(r#"{"type":"telemetry","row":null,"data":{"v":1}}"#, NOW);
        assert!(matches!(frame, Frame::Telemetry(row) if row.fields["v"] == json!(1)));

        assert_eq!(classify_at(r#"{"type":"telemetry"}"#, NOW), Frame::Unknown);
        assert_eq!(classify_at(r#"{"type":"telemetry","row":7}"#, NOW), Frame::Unknown);
    }

    #[test]
    fn test_serial_in_timestamp() {
        let frame = classify_at(r#"{"type":"serial_in","ts":1712000000.25,"line":"hi"}"#, NOW);
        assert_eq!(
            frame,
            Frame::SerialLine { ts_ms: 1_712_000_000_250, text: "hi".to_string() }
        );

        let frame = classify_at(r#"{"type":"serial_in","ts":"soon","line":"hi"}"#, NOW);
        assert_eq!(frame, Frame::SerialLine { ts_ms: NOW, text: "hi".to_string() });
    }

    #[test]
    fn test_serial_in_line_coercion() {
        let text_of = |raw: &str| match classify_at(raw, NOW) {
            Frame::SerialLine { text, .. } => text,
            other => panic!("expected serial line, got {:?}", other),
        };
        assert_eq!(text_of(r#"{"type":"serial_in","line":42}"#), "42");
        assert_eq!(text_of(r#"{"type":"serial_in","line":true}"#), "true");
        assert_eq!(text_of(r#"{"type":"serial_in","line":null}"#), "");
        assert_eq!(text_of(r#"{"type":"serial_in"}"#), "");
    }

    #[test]
    fn test_image_frames() {
        let frame = classify_at(r#"{"type":"image","data_url":"data:image/png;base64,aGk="}"#, NOW);
        assert!(matches!(frame, Frame::Image(img) if img.mime == "image/png" && img.base64 == "aGk="));

        let frame = classify_at(r#"{"type":"image","b64":"aGk=","mime":"image/bmp"}"#, NOW);
        assert!(matches!(frame, Frame::Image(img) if img.data_url() == "data:image/bmp;base64,aGk="));

        let frame = classify_at(
            r#"{"type":"image","data":{"data_url":"data:image/jpeg;base64,aGk=","raw_len":2}}"#,
            NOW,
        );
        assert!(matches!(frame, Frame::Image(img) if img.decoded_len == Some(2)));

        assert_eq!(classify_at(r#"{"type":"image"}"#, NOW), Frame::Unknown);
    }
}
