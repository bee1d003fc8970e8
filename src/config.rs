//! Configuration management for the rover monitor
//!
//! Loads configuration from config.toml with environment variable overrides

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::buffer::{DEFAULT_CONSOLE_MAX_LINES, DEFAULT_TELEMETRY_MAX_ROWS};
use crate::image::{DEFAULT_IMAGE_MAX_BYTES, DEFAULT_IMAGE_MIME};
use crate::link::DEFAULT_MAX_LINE_BYTES;

/// Complete monitor configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub buffers: BufferConfig,
    #[serde(default)]
    pub image: ImageConfig,
}

/// Rover link connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub url: String,
    pub reconnect_delay_ms: u64,
    pub channel_capacity: usize,
    /// Longest frame line kept; longer lines are skipped
    pub max_line_bytes: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            url: "tcp://localhost:8000".to_string(),
            reconnect_delay_ms: 1000,
            channel_capacity: 256,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

/// History buffer sizes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub telemetry_max_rows: usize,
    pub console_max_lines: usize,
    /// Length of the charting window in seconds
    pub window_seconds: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            telemetry_max_rows: DEFAULT_TELEMETRY_MAX_ROWS,
            console_max_lines: DEFAULT_CONSOLE_MAX_LINES,
            window_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Mime type for images reassembled from serial chunks
    pub mime: String,
    /// Base64 text allowed in one capture before it is abandoned
    pub max_bytes: usize,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            mime: DEFAULT_IMAGE_MIME.to_string(),
            max_bytes: DEFAULT_IMAGE_MAX_BYTES,
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// Environment variables override config file values:
    /// - ROVER_LINK_URL: Override the link URL
    pub fn load(path: &str) -> Result<Self> {
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let mut config = Self::from_toml(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        if let Ok(url) = std::env::var("ROVER_LINK_URL") {
            tracing::info!("Using ROVER_LINK_URL from environment");
            config.link.url = url;
        }

        config.validate()?;

        Ok(config)
    }

    /// Parse TOML without validating
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.link.url.starts_with("tcp://") {
            anyhow::bail!("Invalid link URL: {} (must start with tcp://)", self.link.url);
        }

        if self.link.channel_capacity == 0 {
            anyhow::bail!("link.channel_capacity must be greater than 0");
        }

        if self.link.max_line_bytes == 0 {
            anyhow::bail!("link.max_line_bytes must be greater than 0");
        }

        if self.buffers.telemetry_max_rows == 0 {
            anyhow::bail!("buffers.telemetry_max_rows must be greater than 0");
        }

        if self.buffers.console_max_lines == 0 {
            anyhow::bail!("buffers.console_max_lines must be greater than 0");
        }

        if self.buffers.window_seconds == 0 {
            anyhow::bail!("buffers.window_seconds must be greater than 0");
        }

        if self.image.mime.trim().is_empty() {
            anyhow::bail!("image.mime must not be empty");
        }

        if self.image.max_bytes == 0 {
            anyhow::bail!("image.max_bytes must be greater than 0");
        }

        Ok(())
    }
}
