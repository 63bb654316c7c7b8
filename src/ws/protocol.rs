//! Relay wire protocol message definitions
//! These are the wire types for client-relay communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Board games a station can host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardGame {
    Chess,
    Checkers,
    Reversi,
}

impl BoardGame {
    /// Short label used in advisory status text
    pub fn label(&self) -> &'static str {
        match self {
            Self::Chess => "chess",
            Self::Checkers => "checkers",
            Self::Reversi => "reversi",
        }
    }
}

/// Which side of a station a seat belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatSide {
    North,
    South,
}

/// Why a seat request was turned down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatRejectReason {
    /// Every seat at the station is taken
    Full,
    /// A game is already running at the station
    InProgress,
    Other,
}

/// Outcome of a seat request, echoed with the client's token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SeatRequestResult {
    Accepted,
    Rejected { reason: SeatRejectReason },
}

/// Messages sent from client to relay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Announce ourselves after connecting
    Hello { display_name: String },

    /// Throttled pose broadcast
    Pose {
        x: f32,
        y: f32,
        z: f32,
        /// Heading in radians
        heading: f32,
    },

    /// Ask for a seat at a station
    SeatRequest {
        station_id: Uuid,
        /// Client-chosen token echoed back in the result
        token: Uuid,
    },

    /// Stand up from a station we occupy
    SeatRelease { station_id: Uuid },

    /// Clean disconnect
    Bye,
}

/// Messages sent from relay to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// First message after Hello: our identity plus the current room
    Welcome {
        participant_id: Uuid,
        roster: Vec<ParticipantInfo>,
        stations: Vec<StationInfo>,
    },

    /// Someone entered the room
    PeerJoined { participant: ParticipantInfo },

    /// Someone left the room
    PeerLeft { participant_id: Uuid },

    /// Pose snapshot for one remote participant
    PeerPose {
        participant_id: Uuid,
        x: f32,
        y: f32,
        z: f32,
        heading: f32,
    },

    /// Replicated seat occupancy change
    SeatUpdate {
        station_id: Uuid,
        side: SeatSide,
        occupant: Option<Uuid>,
    },

    /// Replicated station availability change
    StationStatus {
        station_id: Uuid,
        game_mode: BoardGame,
        in_progress: bool,
    },

    /// Result of a seat request we made
    SeatResult {
        token: Uuid,
        station_id: Uuid,
        result: SeatRequestResult,
    },

    /// Error message
    Error { code: String, message: String },
}

/// Participant payload in Welcome/PeerJoined
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub participant_id: Uuid,
    pub display_name: String,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub heading: f32,
}

/// Station payload in Welcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationInfo {
    pub station_id: Uuid,
    pub game_mode: BoardGame,
    pub in_progress: bool,
    /// Where a seated camera should look (board center)
    pub focus_x: f32,
    pub focus_y: f32,
    pub focus_z: f32,
    pub seats: Vec<SeatInfo>,
}

/// One seat at a station
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatInfo {
    pub side: SeatSide,
    /// Pose a participant is placed in when seated here
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub heading: f32,
    pub occupant: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_msg_round_trips_through_tagged_json() {
        let msg = ClientMsg::SeatRequest {
            station_id: Uuid::new_v4(),
            token: Uuid::new_v4(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"seat_request\""));
        let back: ClientMsg = serde_json::from_str(&json).unwrap();
        match (msg, back) {
            (
                ClientMsg::SeatRequest {
                    station_id: a,
                    token: b,
                },
                ClientMsg::SeatRequest {
                    station_id: c,
                    token: d,
                },
            ) => {
                assert_eq!(a, c);
                assert_eq!(b, d);
            }
            _ => panic!("variant changed in transit"),
        }
    }

    #[test]
    fn seat_result_encodes_rejection_reason() {
        let msg = ServerMsg::SeatResult {
            token: Uuid::nil(),
            station_id: Uuid::nil(),
            result: SeatRequestResult::Rejected {
                reason: SeatRejectReason::InProgress,
            },
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"outcome\":\"rejected\""));
        assert!(json.contains("\"reason\":\"in_progress\""));
    }
}
