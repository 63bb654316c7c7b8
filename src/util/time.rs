//! Time utilities and coordinator cadences

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Render-loop tick rate driving the coordinator
pub const RENDER_TPS: u32 = 60;
pub const TICK_DURATION_MICROS: u64 = 1_000_000 / RENDER_TPS as u64;

/// Per-peer gain adjustment cadence (seconds between passes)
pub const GAIN_PASS_INTERVAL: f32 = 0.1; // ~10 Hz
/// Voice connection selection cadence (seconds between passes)
pub const CONNECT_PASS_INTERVAL: f32 = 1.0 / 3.0; // ~3 Hz

/// Minimum time between outbound pose sends (seconds)
pub const POSE_SEND_MIN_INTERVAL: f32 = 0.09;

/// How long a seat reservation waits for confirmation before it is dropped
pub const RESERVATION_TIMEOUT: Duration = Duration::from_secs(8);

/// How long advisory status text stays on screen
pub const STATUS_TTL: Duration = Duration::from_millis(2500);
