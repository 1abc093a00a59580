//! Adapter lifecycle manager
//!
//! This module handles:
//! - Polling adapters for frame source detection
//! - Starting/stopping adapters when sources appear/disappear
//! - Feeding frames from the active adapter through the event engine
//! - Broadcasting the resulting events and flushing the combination tables

use crate::config::ServerConfig;
use crate::state::AppState;
use anyhow::Result;
use ore_adapters::{DemoAdapter, RecordingAdapter};
use ore_core::{Event, Frame};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const DETECTION_INTERVAL: Duration = Duration::from_secs(1);
const FRAME_INTERVAL: Duration = Duration::from_millis(16); // ~60Hz

/// Register the configured frame sources. A recording, when given, takes
/// precedence over the demo race.
pub async fn register_adapters(state: &AppState, config: &ServerConfig) {
    if let Some(path) = &config.recording {
        info!("Playing recording {}", path.display());
        state
            .register_adapter(Box::new(RecordingAdapter::new(path)))
            .await;
    }
    state.register_adapter(Box::new(DemoAdapter::new())).await;
}

/// Main manager loop, runs until `cancel` fires
pub async fn run(state: AppState, flush_interval: Duration, cancel: CancellationToken) {
    info!("Adapter manager started");

    let mut previous: Option<Arc<Frame>> = None;
    let mut last_detection: Option<Instant> = None;
    let mut last_flush = Instant::now();

    loop {
        // Rate limit detection checks to once per second
        if last_detection.map_or(true, |t| t.elapsed() >= DETECTION_INTERVAL) {
            match detection_cycle(&state).await {
                // A different source means a different frame history
                Ok(true) => previous = None,
                Ok(false) => {}
                Err(e) => error!("Error in detection cycle: {}", e),
            }
            last_detection = Some(Instant::now());
        }

        match frame_read_cycle(&state).await {
            Ok(Some(frame)) => {
                if process_frame(&state, &mut previous, frame).await {
                    flush(&state).await;
                    last_flush = Instant::now();
                }
            }
            Ok(None) => {}
            Err(e) => error!("Error reading frames: {}", e),
        }

        if last_flush.elapsed() >= flush_interval {
            flush(&state).await;
            last_flush = Instant::now();
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(FRAME_INTERVAL) => {}
        }
    }

    flush(&state).await;
    info!("Adapter manager stopped");
}

/// Run one engine cycle for `frame` and broadcast its events.
/// Returns true when the session changed.
pub async fn process_frame(
    state: &AppState,
    previous: &mut Option<Arc<Frame>>,
    frame: Frame,
) -> bool {
    let current = Arc::new(frame);
    let events = {
        let mut engine = state.engine.lock().await;
        engine.cycle(previous.as_ref(), &current)
    };

    let mut session_changed = false;
    for log in events {
        match &log.event {
            Event::SessionChanged { .. } => {
                info!("Session changed");
                session_changed = true;
            }
            Event::NewLap { driver, lap } if driver.is_main => {
                info!(laps = lap.completed_laps, time = ?lap.lap_time, "Lap completed");
            }
            _ => debug!(event = log.name(), "event"),
        }
        // Ignore error if no receivers (nobody is listening yet)
        let _ = state.events_tx.send(log);
    }

    *state.latest_frame.write().await = Some(Arc::clone(&current));
    *previous = Some(current);
    session_changed
}

async fn flush(state: &AppState) {
    match state.flush_tables().await {
        Ok(()) => debug!("Combination tables flushed"),
        Err(e) => warn!("Failed to flush combination tables: {}", e),
    }
}

/// Check all adapters for detection. Returns true when the active adapter changed.
async fn detection_cycle(state: &AppState) -> Result<bool> {
    let mut adapters = state.adapters.write().await;
    let mut active_adapter = state.active_adapter.write().await;
    let mut changed = false;

    // If we have an active adapter, check if it's still detected
    if let Some(active_key) = active_adapter.clone() {
        if let Some(adapter) = adapters.iter_mut().find(|a| a.key() == active_key) {
            if adapter.detect() && adapter.is_active() {
                return Ok(false);
            }
            info!("Source {} no longer available, stopping adapter", adapter.name());
            if let Err(e) = adapter.stop() {
                error!("Error stopping adapter {}: {}", adapter.name(), e);
            }
        }
        *active_adapter = None;
        changed = true;
    }

    // No active adapter, look for detected sources
    for adapter in adapters.iter_mut() {
        if adapter.detect() && !adapter.is_active() {
            info!("Source {} detected, starting adapter", adapter.name());
            match adapter.start() {
                Ok(()) => {
                    *active_adapter = Some(adapter.key().to_string());
                    info!("Adapter {} started successfully", adapter.name());
                    return Ok(true);
                }
                Err(e) => {
                    error!("Failed to start adapter {}: {}", adapter.name(), e);
                }
            }
        }
    }

    Ok(changed)
}

/// Read one frame from the active adapter
async fn frame_read_cycle(state: &AppState) -> Result<Option<Frame>> {
    let Some(active_key) = state.active_adapter.read().await.clone() else {
        return Ok(None);
    };

    let mut adapters = state.adapters.write().await;
    let Some(adapter) = adapters.iter_mut().find(|a| a.key() == active_key) else {
        return Ok(None);
    };

    match adapter.read_frame() {
        Ok(frame) => Ok(frame),
        Err(e) => {
            warn!("Error reading frame from {}: {}", adapter.name(), e);
            Ok(None)
        }
    }
}
