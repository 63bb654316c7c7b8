//! WebSocket client for the room relay
//!
//! Bridges the relay socket to the coordinator's channels: outbound
//! `ClientMsg` drains into the socket, inbound frames decode into
//! `RoomEvent`s. Reconnects with jittered backoff; the coordinator never
//! sees the socket, only the queues.

use std::time::Duration;

use anyhow::anyhow;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{info, warn};

use crate::room::{Pose, RoomEvent};
use crate::util::math::Vec3;
use crate::ws::protocol::{ClientMsg, ServerMsg};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(15);
const BACKOFF_JITTER_MILLIS: u64 = 500;

/// Why a connection attempt ended
enum Disconnect {
    /// The client is shutting down; do not reconnect
    LocalShutdown,
}

/// Run the relay connection until the client shuts down. Each successful
/// connection re-announces us with Hello; the relay replies with Welcome
/// and the room state flows from there.
pub async fn run_relay(
    url: String,
    display_name: String,
    mut outbound: mpsc::UnboundedReceiver<ClientMsg>,
    events: mpsc::UnboundedSender<RoomEvent>,
) {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                info!(url = %url, "connected to relay");
                backoff = INITIAL_BACKOFF;
                match drive(stream, &display_name, &mut outbound, &events).await {
                    Ok(Disconnect::LocalShutdown) => {
                        info!("relay connection closed, client shutting down");
                        return;
                    }
                    Err(error) => {
                        warn!(%error, "relay connection lost");
                    }
                }
            }
            Err(error) => {
                warn!(%error, "relay connection failed");
            }
        }

        let jitter = rand::thread_rng().gen_range(0..BACKOFF_JITTER_MILLIS);
        tokio::time::sleep(backoff + Duration::from_millis(jitter)).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

async fn drive(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    display_name: &str,
    outbound: &mut mpsc::UnboundedReceiver<ClientMsg>,
    events: &mpsc::UnboundedSender<RoomEvent>,
) -> anyhow::Result<Disconnect> {
    let (mut write, mut read) = stream.split();

    let hello = ClientMsg::Hello {
        display_name: display_name.to_owned(),
    };
    write.send(Message::Text(serde_json::to_string(&hello)?)).await?;

    loop {
        tokio::select! {
            msg = outbound.recv() => {
                let Some(msg) = msg else {
                    // Coordinator dropped its sender: we are done for good
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(Disconnect::LocalShutdown);
                };
                let leaving = matches!(msg, ClientMsg::Bye);
                write.send(Message::Text(serde_json::to_string(&msg)?)).await?;
                if leaving {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(Disconnect::LocalShutdown);
                }
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerMsg>(&text) {
                            Ok(msg) => {
                                if let Some(event) = event_from(msg) {
                                    if events.send(event).is_err() {
                                        return Ok(Disconnect::LocalShutdown);
                                    }
                                }
                            }
                            Err(error) => {
                                // Skip the frame; the stream itself is fine
                                warn!(%error, "malformed relay frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => return Err(anyhow!("closed by relay")),
                    Some(Ok(_)) => {}
                    Some(Err(error)) => return Err(error.into()),
                    None => return Err(anyhow!("relay stream ended")),
                }
            }
        }
    }
}

/// Map a decoded relay message onto a coordinator event
fn event_from(msg: ServerMsg) -> Option<RoomEvent> {
    match msg {
        ServerMsg::Welcome {
            participant_id,
            roster,
            stations,
        } => Some(RoomEvent::Welcome {
            participant_id,
            roster,
            stations,
        }),
        ServerMsg::PeerJoined { participant } => Some(RoomEvent::PeerJoined { participant }),
        ServerMsg::PeerLeft { participant_id } => Some(RoomEvent::PeerLeft { participant_id }),
        ServerMsg::PeerPose {
            participant_id,
            x,
            y,
            z,
            heading,
        } => Some(RoomEvent::PeerPose {
            participant_id,
            pose: Pose::new(Vec3::new(x, y, z), heading),
        }),
        ServerMsg::SeatUpdate {
            station_id,
            side,
            occupant,
        } => Some(RoomEvent::SeatUpdate {
            station_id,
            side,
            occupant,
        }),
        ServerMsg::StationStatus {
            station_id,
            game_mode,
            in_progress,
        } => Some(RoomEvent::StationStatus {
            station_id,
            game_mode,
            in_progress,
        }),
        ServerMsg::SeatResult {
            token,
            station_id,
            result,
        } => Some(RoomEvent::SeatResult {
            token,
            station_id,
            result,
        }),
        ServerMsg::Error { code, message } => {
            warn!(code = %code, message = %message, "relay reported an error");
            None
        }
    }
}
