//! Plaza room client - session coordinator for a shared virtual space
//!
//! This is the headless client shell. It handles:
//! - The relay WebSocket connection (poses, seats, station status)
//! - The per-tick room coordinator (movement, reconciliation, voice, seating)
//! - Bridging voice commands to an attached RTC engine
//!
//! A renderer or UI embeds the same pieces and drives them through
//! `RoomHandle`; this binary runs the coordinator against a live relay.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use plaza_client::app::AppState;
use plaza_client::config::Config;
use plaza_client::room::voice::VoiceCommand;
use plaza_client::room::{Pose, RoomCoordinator};
use plaza_client::ws::client::run_relay;
use plaza_client::ws::protocol::ClientMsg;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    info!("Starting Plaza room client");
    info!("Relay: {}", config.relay_url);

    // Channel plumbing: the coordinator only ever sees queues
    let (net_tx, net_rx) = mpsc::unbounded_channel::<ClientMsg>();
    let (voice_tx, voice_rx) = mpsc::unbounded_channel::<VoiceCommand>();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let (coordinator, room) = RoomCoordinator::new(
        Pose::default(),
        config.arena_half_extent,
        net_tx.clone(),
        voice_tx,
        event_rx,
    );
    let state = AppState::new(config.clone(), room);

    // Relay connection
    tokio::spawn(run_relay(
        config.relay_url.clone(),
        config.display_name.clone(),
        net_rx,
        event_tx,
    ));

    // Voice capability bridge
    tokio::spawn(drive_voice_bridge(voice_rx));

    // The coordinator tick loop
    tokio::spawn(coordinator.run());

    // Periodic room summary for headless runs
    tokio::spawn(log_room_summary(state));

    shutdown_signal().await;

    info!("Leaving room");
    let _ = net_tx.send(ClientMsg::Bye);
    // Give the relay connection a moment to flush the goodbye
    tokio::time::sleep(Duration::from_millis(200)).await;

    info!("Client shutdown complete");
    Ok(())
}

/// Where an RTC engine attaches. Headless builds just trace the traffic;
/// the commands are fire-and-forget and safe to drop.
async fn drive_voice_bridge(mut commands: mpsc::UnboundedReceiver<VoiceCommand>) {
    while let Some(command) = commands.recv().await {
        debug!(?command, "voice command");
    }
}

/// Log a one-line room summary every few seconds
async fn log_room_summary(state: AppState) {
    let mut ticker = tokio::time::interval(Duration::from_secs(10));
    loop {
        ticker.tick().await;
        let view = state.room.view();
        info!(
            peers = view.remotes.len(),
            voice_links = view.voice_links.len(),
            seated = view.seated,
            status = view.status_text.as_deref().unwrap_or(""),
            "room summary"
        );
    }
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
