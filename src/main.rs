//! Rover Monitor Service
//!
//! This service:
//! - Connects to the rover backend's frame stream over TCP
//! - Classifies each JSON frame and decodes telemetry, images and the map
//! - Keeps bounded console and telemetry history
//! - Forwards operator commands typed on stdin to the rover
//!
//! Architecture: link → reader task → channel → session → logs

use anyhow::{Context, Result};
use rover_monitor::command::{Command, CommandSink, NullSink};
use rover_monitor::config::Config;
use rover_monitor::fields::render_value;
use rover_monitor::link::LinkClient;
use rover_monitor::session::{Session, Update};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Apply an operator command. Clearing the map also resets local state.
fn dispatch_command(session: &mut Session, command: Command, sink: &dyn CommandSink) {
    match command {
        Command::ClearMap => session.reset_map(sink),
        other => sink.send(other),
    }
}

/// Log what a frame changed
fn report_updates(session: &Session, updates: &[Update], window_seconds: f64) {
    for update in updates {
        match update {
            Update::Map => {
                let pose = session.map().pose();
                let (x, y) = pose.display_coords();
                let obstacles = session.map().grid().iter().flatten().filter(|c| c.obstacle).count();
                info!(x, y, direction = ?pose.direction, obstacles, "Rover map updated");
            }
            Update::Telemetry => {
                let readings: Vec<String> = session
                    .latest_readings()
                    .into_iter()
                    .filter(|(_, v)| v.is_some())
                    .map(|(field, v)| format!("{}={}{}", field.key(), render_value(v, 2), field.quantity().unit()))
                    .collect();
                debug!(
                    window_rows = session.telemetry_window(window_seconds).len(),
                    readings = %readings.join(" "),
                    "Telemetry row stored"
                );
            }
            Update::ConsoleLine => {
                if let Some(line) = session.console().latest() {
                    debug!(ts_ms = line.timestamp_ms, line = %line.text, "Serial line");
                }
            }
            Update::Image => {}
            Update::Dropped => debug!("Frame dropped"),
        }
    }
}

/// Read operator commands from stdin
async fn read_operator_input(tx: mpsc::UnboundedSender<Command>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(command) = Command::from_operator_input(&line) {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
            }
            Ok(None) => {
                debug!("Operator input closed");
                break;
            }
            Err(e) => {
                error!(error = %e, "Error reading operator input");
                break;
            }
        }
    }
}

/// Connect, process frames until the link drops, then reconnect
async fn run_link(
    config: &Config,
    session: &mut Session,
    operator_rx: &mut mpsc::UnboundedReceiver<Command>,
) {
    let reconnect_delay = Duration::from_millis(config.link.reconnect_delay_ms);
    let window_seconds = config.buffers.window_seconds as f64;

    loop {
        // Commands typed while offline only affect local state
        while let Ok(command) = operator_rx.try_recv() {
            dispatch_command(session, command, &NullSink);
        }

        let mut client = match LinkClient::connect(
            &config.link.url,
            config.link.channel_capacity,
            config.link.max_line_bytes,
        )
        .await
        {
            Ok(client) => client,
            Err(e) => {
                error!(error = %e, "Rover link unavailable");
                tokio::time::sleep(reconnect_delay).await;
                continue;
            }
        };

        session.begin_epoch();
        let sink = client.sink();

        loop {
            tokio::select! {
                frame = client.next_frame() => {
                    let Some(raw) = frame else { break };
                    let updates = session.handle_raw(&raw);
                    report_updates(session, &updates, window_seconds);
                }
                Some(command) = operator_rx.recv() => {
                    info!(token = command.token(), "Operator command");
                    dispatch_command(session, command, &sink);
                }
            }
        }

        let status = client.shutdown().await;
        warn!(status = ?status, "Rover link lost, reconnecting");
        tokio::time::sleep(reconnect_delay).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("Rover monitor starting");

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path))?;
    info!(
        url = %config.link.url,
        telemetry_max_rows = config.buffers.telemetry_max_rows,
        console_max_lines = config.buffers.console_max_lines,
        "Configuration loaded successfully"
    );

    let mut session = Session::new(&config.buffers, &config.image);

    let (operator_tx, mut operator_rx) = mpsc::unbounded_channel::<Command>();
    tokio::spawn(read_operator_input(operator_tx));

    info!("Monitor running. Type w/a/s/d, image or clear. Press Ctrl+C to stop.");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully");
        }
        _ = run_link(&config, &mut session, &mut operator_rx) => {}
    }

    info!(
        console_lines = session.console().len(),
        telemetry_rows = session.telemetry().rows().len(),
        has_image = session.latest_image().is_some(),
        "Rover monitor stopped"
    );
    Ok(())
}
