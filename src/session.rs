//! Monitor session state
//!
//! A [`Session`] owns every piece of decoder state for one monitor: the
//! console log, telemetry history, image reassembler, latest image and rover
//! map. Frames are applied one at a time, in arrival order; nothing here
//! blocks or fails.

use tracing::{debug, info};

use crate::buffer::{BoundedBuffer, ConsoleLine, TelemetryBuffer, TelemetryRow};
use crate::command::CommandSink;
use crate::config::{BufferConfig, ImageConfig};
use crate::fields::{resolve, Field};
use crate::frame::{classify, Frame};
use crate::grid::{decode_matrix_line, RoverMap};
use crate::image::{ImagePayload, ImageReassembler, LineOutcome};

/// Observable result of applying one frame
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Telemetry,
    ConsoleLine,
    Image,
    Map,
    Dropped,
}

#[derive(Debug)]
pub struct Session {
    console: BoundedBuffer<ConsoleLine>,
    telemetry: TelemetryBuffer,
    reassembler: ImageReassembler,
    latest_image: Option<ImagePayload>,
    map: RoverMap,
    epoch: u64,
}

impl Session {
    pub fn new(buffers: &BufferConfig, image: &ImageConfig) -> Self {
        Self {
            console: BoundedBuffer::new(buffers.console_max_lines),
            telemetry: TelemetryBuffer::new(buffers.telemetry_max_rows),
            reassembler: ImageReassembler::new(image.mime.as_str(), image.max_bytes),
            latest_image: None,
            map: RoverMap::new(),
            epoch: 0,
        }
    }

    /// Start a new connection epoch.
    ///
    /// Partial image captures and the rover map never carry over from a
    /// previous connection. History buffers and the last image are kept.
    pub fn begin_epoch(&mut self) {
        self.epoch += 1;
        self.reassembler.reset();
        self.map.clear();
        info!(epoch = self.epoch, "Session epoch started");
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Classify and apply one raw message from the link
    pub fn handle_raw(&mut self, raw: &str) -> Vec<Update> {
        self.handle_frame(classify(raw))
    }

    pub fn handle_frame(&mut self, frame: Frame) -> Vec<Update> {
        match frame {
            Frame::Telemetry(row) => {
                self.telemetry.push(row);
                vec![Update::Telemetry]
            }
            Frame::SerialLine { ts_ms, text } => self.handle_serial_line(ts_ms, text),
            Frame::Image(image) => {
                self.store_image(image);
                vec![Update::Image]
            }
            Frame::Unknown => vec![Update::Dropped],
        }
    }

    fn handle_serial_line(&mut self, ts_ms: u64, text: String) -> Vec<Update> {
        self.console.push(ConsoleLine {
            timestamp_ms: ts_ms,
            text: text.clone(),
        });

        let mut updates = vec![Update::ConsoleLine];
        match self.reassembler.feed(&text) {
            LineOutcome::Completed(image) => {
                self.store_image(image);
                updates.push(Update::Image);
            }
            LineOutcome::Consumed => {}
            LineOutcome::Passthrough => {
                if let Some(update) = decode_matrix_line(&text) {
                    self.map.apply(&update);
                    let pose = self.map.pose();
                    debug!(
                        pose_row = pose.row,
                        pose_col = pose.col,
                        direction = ?pose.direction,
                        pose_in_line = update.pose.is_some(),
                        "Rover map updated"
                    );
                    updates.push(Update::Map);
                }
            }
        }
        updates
    }

    fn store_image(&mut self, image: ImagePayload) {
        info!(
            mime = %image.mime,
            base64_len = image.base64.len(),
            decoded_len = ?image.decoded_len,
            "Image received"
        );
        self.latest_image = Some(image);
    }

    /// Restore the initial map and ask the rover to clear its own
    pub fn reset_map(&mut self, sink: &dyn CommandSink) {
        self.map.reset(sink);
        info!("Rover map reset");
    }

    pub fn console(&self) -> &BoundedBuffer<ConsoleLine> {
        &self.console
    }

    pub fn telemetry(&self) -> &TelemetryBuffer {
        &self.telemetry
    }

    /// Timestamped telemetry rows from the last `window_secs` seconds
    pub fn telemetry_window(&self, window_secs: f64) -> Vec<&TelemetryRow> {
        self.telemetry.window(window_secs)
    }

    pub fn latest_image(&self) -> Option<&ImagePayload> {
        self.latest_image.as_ref()
    }

    pub fn map(&self) -> &RoverMap {
        &self.map
    }

    pub fn is_capturing_image(&self) -> bool {
        self.reassembler.is_capturing()
    }

    /// Every semantic field resolved on the newest telemetry row
    pub fn latest_readings(&self) -> Vec<(Field, Option<f64>)> {
        match self.telemetry.latest() {
            Some(row) => Field::all().map(|f| (f, resolve(&row.fields, f))).collect(),
            None => Field::all().map(|f| (f, None)).collect(),
        }
    }
}
