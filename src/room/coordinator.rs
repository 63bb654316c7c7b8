//! Room coordinator: owns the five systems and drives them each tick

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use crate::room::locomotion::{Locomotion, MoveOrder};
use crate::room::quickplay::QuickPlay;
use crate::room::remotes::RemoteRoster;
use crate::room::seats::{SeatArbitrator, SeatIntent};
use crate::room::voice::{ProximityVoice, VoiceCommand, VoiceLink};
use crate::room::{HeldKeys, Participant, Pose, RoomCommand, RoomEvent};
use crate::util::math::Vec3;
use crate::util::time::{
    unix_millis, CONNECT_PASS_INTERVAL, GAIN_PASS_INTERVAL, TICK_DURATION_MICROS,
};
use crate::ws::protocol::{BoardGame, ClientMsg, SeatRejectReason, SeatRequestResult};

/// Seat state without timing internals, for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeatIntentView {
    #[default]
    None,
    Pending {
        station_id: Uuid,
    },
    Seated {
        station_id: Uuid,
    },
}

/// A remote participant's reconciled state, as the renderer sees it
#[derive(Debug, Clone)]
pub struct RemoteView {
    pub participant: Participant,
    pub speed: f32,
}

#[derive(Debug, Clone)]
pub struct StationView {
    pub id: Uuid,
    pub game_mode: BoardGame,
    pub in_progress: bool,
    pub free_seats: usize,
}

/// Everything the renderer needs, republished once per tick.
/// Readers poll; the coordinator is the only writer.
#[derive(Debug, Clone, Default)]
pub struct RoomView {
    pub local_id: Option<Uuid>,
    pub local_pose: Pose,
    pub local_speed: f32,
    pub seated: bool,
    pub camera_focus: Option<Vec3>,
    pub remotes: Vec<RemoteView>,
    pub voice_links: Vec<VoiceLink>,
    pub incoming_muted: bool,
    pub mic_available: Option<bool>,
    pub voice_error: Option<String>,
    pub seat_intent: SeatIntentView,
    pub stations: Vec<StationView>,
    pub status_text: Option<String>,
}

/// Handle for the UI layer: fire-and-forget commands in, polled view out
#[derive(Clone)]
pub struct RoomHandle {
    commands: mpsc::UnboundedSender<RoomCommand>,
    view: Arc<RwLock<RoomView>>,
}

impl RoomHandle {
    pub fn view(&self) -> RoomView {
        self.view.read().clone()
    }

    pub fn set_held_keys(&self, keys: HeldKeys) {
        let _ = self.commands.send(RoomCommand::SetHeldKeys(keys));
    }

    pub fn set_camera_forward(&self, x: f32, z: f32) {
        let _ = self.commands.send(RoomCommand::SetCameraForward(x, z));
    }

    pub fn set_move_order(&self, order: MoveOrder) {
        let _ = self.commands.send(RoomCommand::SetMoveOrder(order));
    }

    pub fn cancel_movement(&self) {
        let _ = self.commands.send(RoomCommand::CancelMovement);
    }

    pub fn request_join(&self, station_id: Uuid) {
        let _ = self.commands.send(RoomCommand::RequestJoin(station_id));
    }

    pub fn start_quick_play(&self, mode: BoardGame) {
        let _ = self.commands.send(RoomCommand::StartQuickPlay(mode));
    }

    pub fn set_incoming_muted(&self, muted: bool) {
        let _ = self.commands.send(RoomCommand::SetIncomingMuted(muted));
    }
}

/// The session coordinator. Single-threaded and cooperative: all network
/// and voice results arrive as queued events, drained once per tick.
pub struct RoomCoordinator {
    local_id: Option<Uuid>,
    locomotion: Locomotion,
    remotes: RemoteRoster,
    voice: ProximityVoice,
    seats: SeatArbitrator,
    quickplay: QuickPlay,

    keys: HeldKeys,
    camera_forward: (f32, f32),
    was_seated: bool,

    events: mpsc::UnboundedReceiver<RoomEvent>,
    commands: mpsc::UnboundedReceiver<RoomCommand>,
    net: mpsc::UnboundedSender<ClientMsg>,

    gain_elapsed: f32,
    connect_elapsed: f32,

    mic_available: Option<bool>,
    voice_error: Option<String>,

    view: Arc<RwLock<RoomView>>,
}

impl RoomCoordinator {
    pub fn new(
        spawn: Pose,
        arena_half_extent: f32,
        net: mpsc::UnboundedSender<ClientMsg>,
        voice_commands: mpsc::UnboundedSender<VoiceCommand>,
        events: mpsc::UnboundedReceiver<RoomEvent>,
    ) -> (Self, RoomHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let view = Arc::new(RwLock::new(RoomView::default()));

        let coordinator = Self {
            local_id: None,
            locomotion: Locomotion::new(spawn, arena_half_extent),
            remotes: RemoteRoster::new(),
            voice: ProximityVoice::new(voice_commands),
            seats: SeatArbitrator::new(net.clone()),
            quickplay: QuickPlay::new(),
            keys: HeldKeys::default(),
            camera_forward: (0.0, 1.0),
            was_seated: false,
            events,
            commands: command_rx,
            net,
            gain_elapsed: 0.0,
            connect_elapsed: 0.0,
            mic_available: None,
            voice_error: None,
            view: view.clone(),
        };

        let handle = RoomHandle {
            commands: command_tx,
            view,
        };
        (coordinator, handle)
    }

    /// Drive ticks at render cadence until both inbound channels close
    pub async fn run(mut self) {
        let mut ticker = interval(Duration::from_micros(TICK_DURATION_MICROS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last = Instant::now();

        loop {
            ticker.tick().await;
            let now = Instant::now();
            // A long stall should not turn into one giant integration step
            let dt = (now - last).as_secs_f32().min(0.25);
            last = now;

            if !self.tick(dt, now) {
                info!("room coordinator stopped");
                return;
            }
        }
    }

    /// One cooperative tick. Returns false once every input channel has
    /// closed and there is nothing left to coordinate.
    pub fn tick(&mut self, dt: f32, now: Instant) -> bool {
        let mut events_open = true;
        loop {
            match self.events.try_recv() {
                Ok(event) => self.handle_event(event, now),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    events_open = false;
                    break;
                }
            }
        }

        let mut commands_open = true;
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.handle_command(command, now),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    commands_open = false;
                    break;
                }
            }
        }

        if let Some(pose) = self.locomotion.tick(self.keys, self.camera_forward, dt) {
            let _ = self.net.send(ClientMsg::Pose {
                x: pose.position.x,
                y: pose.position.y,
                z: pose.position.z,
                heading: pose.heading,
            });
        }

        // Standing up locally releases the arbitrated seat
        let seated = self.locomotion.is_seated();
        if self.was_seated && !seated {
            self.seats.release();
        }
        self.was_seated = seated;

        self.remotes.tick_all(dt);

        self.gain_elapsed += dt;
        if self.gain_elapsed >= GAIN_PASS_INTERVAL {
            self.gain_elapsed = 0.0;
            let positions = self.remotes.positions();
            self.voice
                .update_gains(self.locomotion.pose().position, &positions);
        }
        self.connect_elapsed += dt;
        if self.connect_elapsed >= CONNECT_PASS_INTERVAL {
            self.connect_elapsed = 0.0;
            let positions = self.remotes.positions();
            self.voice
                .update_connections(self.locomotion.pose().position, &positions);
        }

        if let Some(station_id) = self.seats.expire(now) {
            self.quickplay
                .on_reservation_expired(station_id, &mut self.seats, now);
        }
        self.quickplay.tick(now);

        self.publish();

        events_open || commands_open
    }

    fn handle_event(&mut self, event: RoomEvent, now: Instant) {
        match event {
            RoomEvent::Welcome {
                participant_id,
                roster,
                stations,
            } => {
                info!(participant_id = %participant_id, peers = roster.len(), "joined room");
                self.local_id = Some(participant_id);
                let now_millis = unix_millis();
                for info in &roster {
                    if info.participant_id != participant_id {
                        self.remotes.insert(info, now_millis);
                    }
                }
                self.seats.load_stations(&stations, participant_id);
            }
            RoomEvent::PeerJoined { participant } => {
                if Some(participant.participant_id) != self.local_id {
                    debug!(peer = %participant.participant_id, "peer joined");
                    self.remotes.insert(&participant, unix_millis());
                }
            }
            RoomEvent::PeerLeft { participant_id } => {
                debug!(peer = %participant_id, "peer left");
                self.remotes.remove(&participant_id);
                self.voice.on_peer_left(participant_id);
                self.seats.on_peer_left(participant_id);
            }
            RoomEvent::PeerPose {
                participant_id,
                pose,
            } => {
                self.remotes.apply_pose(&participant_id, pose, unix_millis());
            }
            RoomEvent::SeatUpdate {
                station_id,
                side,
                occupant,
            } => {
                if let Some(local_id) = self.local_id {
                    self.seats.on_seat_update(local_id, station_id, side, occupant);
                }
            }
            RoomEvent::StationStatus {
                station_id,
                game_mode,
                in_progress,
            } => {
                self.seats.on_station_status(station_id, game_mode, in_progress);
            }
            RoomEvent::SeatResult {
                token,
                station_id,
                result,
            } => {
                let from_quickplay = self.quickplay.owns_token(token);
                let applied = self.seats.on_seat_result(token, station_id, result);
                self.quickplay
                    .on_seat_result(token, station_id, result, &mut self.seats, now);

                if !from_quickplay {
                    if let Some(SeatRequestResult::Rejected { reason }) = applied {
                        self.quickplay.note(reject_text(reason), now);
                    }
                }
            }
            RoomEvent::VoiceStatus {
                mic_available,
                last_error,
            } => {
                self.mic_available = mic_available;
                self.voice_error = last_error;
            }
        }
    }

    fn handle_command(&mut self, command: RoomCommand, now: Instant) {
        match command {
            RoomCommand::SetHeldKeys(keys) => self.keys = keys,
            RoomCommand::SetCameraForward(x, z) => self.camera_forward = (x, z),
            RoomCommand::SetMoveOrder(order) => self.locomotion.set_move_order(order),
            RoomCommand::CancelMovement => self.locomotion.cancel_movement(),
            RoomCommand::RequestJoin(station_id) => {
                self.seats.request_join(station_id, Uuid::new_v4(), now);
            }
            RoomCommand::StartQuickPlay(mode) => {
                let candidates = self
                    .seats
                    .eligible_stations(mode, self.locomotion.pose().position);
                self.quickplay
                    .start(mode, candidates, &mut self.seats, now);
            }
            RoomCommand::SetIncomingMuted(muted) => self.voice.set_muted(muted),
        }
    }

    fn publish(&mut self) {
        let remotes = self
            .remotes
            .iter()
            .map(|(id, remote)| RemoteView {
                participant: Participant {
                    id: *id,
                    display_name: remote.display_name.clone(),
                    pose: *remote.trajectory.pose(),
                    last_seen_at: remote.last_seen_at,
                },
                speed: remote.trajectory.speed(),
            })
            .collect();

        let stations = self
            .seats
            .stations()
            .map(|station| StationView {
                id: station.id,
                game_mode: station.game_mode,
                in_progress: station.in_progress,
                free_seats: station.seats.iter().filter(|s| s.occupant.is_none()).count(),
            })
            .collect();

        let seat_intent = match self.seats.intent() {
            SeatIntent::None => SeatIntentView::None,
            SeatIntent::Pending { station_id, .. } => SeatIntentView::Pending {
                station_id: *station_id,
            },
            SeatIntent::Seated { station_id } => SeatIntentView::Seated {
                station_id: *station_id,
            },
        };

        *self.view.write() = RoomView {
            local_id: self.local_id,
            local_pose: *self.locomotion.pose(),
            local_speed: self.locomotion.smoothed_speed(),
            seated: self.locomotion.is_seated(),
            camera_focus: self.locomotion.camera_focus(),
            remotes,
            voice_links: self.voice.links().cloned().collect(),
            incoming_muted: self.voice.is_muted(),
            mic_available: self.mic_available,
            voice_error: self.voice_error.clone(),
            seat_intent,
            stations,
            status_text: self.quickplay.status().map(str::to_owned),
        };
    }
}

fn reject_text(reason: SeatRejectReason) -> &'static str {
    match reason {
        SeatRejectReason::Full => "That table is full",
        SeatRejectReason::InProgress => "A game is already in progress there",
        SeatRejectReason::Other => "Couldn't take that seat",
    }
}
