//! Room coordination systems

pub mod coordinator;
pub mod locomotion;
pub mod quickplay;
pub mod remotes;
pub mod seats;
pub mod voice;

pub use coordinator::{RoomCoordinator, RoomHandle, RoomView};

use uuid::Uuid;

use crate::util::math::Vec3;
use crate::ws::protocol::{
    BoardGame, ParticipantInfo, SeatRequestResult, SeatSide, StationInfo,
};

/// Position plus heading of a participant
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub position: Vec3,
    /// Heading in radians, (-π, π]
    pub heading: f32,
}

impl Pose {
    pub fn new(position: Vec3, heading: f32) -> Self {
        Self { position, heading }
    }
}

/// One participant as known to this client
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: Uuid,
    pub display_name: String,
    pub pose: Pose,
    /// Unix millis of the last snapshot we saw for them
    pub last_seen_at: u64,
}

/// Snapshot of held directional keys for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeldKeys {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
}

impl HeldKeys {
    pub fn any(&self) -> bool {
        self.forward || self.back || self.left || self.right
    }
}

/// Inbound events, queued by the net/voice layers and drained once per tick
#[derive(Debug, Clone)]
pub enum RoomEvent {
    Welcome {
        participant_id: Uuid,
        roster: Vec<ParticipantInfo>,
        stations: Vec<StationInfo>,
    },
    PeerJoined {
        participant: ParticipantInfo,
    },
    PeerLeft {
        participant_id: Uuid,
    },
    PeerPose {
        participant_id: Uuid,
        pose: Pose,
    },
    SeatUpdate {
        station_id: Uuid,
        side: SeatSide,
        occupant: Option<Uuid>,
    },
    StationStatus {
        station_id: Uuid,
        game_mode: BoardGame,
        in_progress: bool,
    },
    SeatResult {
        token: Uuid,
        station_id: Uuid,
        result: SeatRequestResult,
    },
    /// Capability signals from the voice engine, republished verbatim
    VoiceStatus {
        mic_available: Option<bool>,
        last_error: Option<String>,
    },
}

/// Commands from the UI layer, drained once per tick alongside events
#[derive(Debug, Clone)]
pub enum RoomCommand {
    SetHeldKeys(HeldKeys),
    /// Camera forward direction projected onto the ground plane (x, z)
    SetCameraForward(f32, f32),
    SetMoveOrder(locomotion::MoveOrder),
    CancelMovement,
    RequestJoin(Uuid),
    StartQuickPlay(BoardGame),
    SetIncomingMuted(bool),
}
