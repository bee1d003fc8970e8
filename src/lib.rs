//! Rover Monitor Library
//!
//! Decoding core for a live rover-monitoring link: frame classification,
//! image chunk reassembly, occupancy grid decoding, telemetry field resolution
//! and bounded history.

pub mod buffer;
pub mod command;
pub mod config;
pub mod fields;
pub mod frame;
pub mod grid;
pub mod image;
pub mod link;
pub mod session;
