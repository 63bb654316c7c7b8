//! Application state shared across client tasks

use std::sync::Arc;

use crate::config::Config;
use crate::room::RoomHandle;

/// Shared client state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Commands in, polled room view out
    pub room: RoomHandle,
}

impl AppState {
    pub fn new(config: Config, room: RoomHandle) -> Self {
        Self {
            config: Arc::new(config),
            room,
        }
    }
}
