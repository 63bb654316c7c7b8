//! Exclusive station seating: reservations, confirmations, expiry

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::room::Pose;
use crate::util::math::Vec3;
use crate::util::time::RESERVATION_TIMEOUT;
use crate::ws::protocol::{
    BoardGame, ClientMsg, SeatInfo, SeatRequestResult, SeatSide, StationInfo,
};

/// The local participant's relationship to stations. Exactly one variant
/// holds at any time: no seat, one pending reservation, or one occupied seat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeatIntent {
    None,
    Pending {
        station_id: Uuid,
        token: Uuid,
        requested_at: Instant,
        expires_at: Instant,
    },
    Seated {
        station_id: Uuid,
    },
}

/// Replicated, confirmed state of one seat
#[derive(Debug, Clone)]
pub struct StationSeat {
    pub side: SeatSide,
    pub pose: Pose,
    pub occupant: Option<Uuid>,
}

/// Read model of one station, fed by replicated relay events
#[derive(Debug, Clone)]
pub struct Station {
    pub id: Uuid,
    pub game_mode: BoardGame,
    pub in_progress: bool,
    /// Board center, used for seated camera focus and distance ordering
    pub focus: Vec3,
    pub seats: Vec<StationSeat>,
}

impl Station {
    fn from_info(info: &StationInfo) -> Self {
        Self {
            id: info.station_id,
            game_mode: info.game_mode,
            in_progress: info.in_progress,
            focus: Vec3::new(info.focus_x, info.focus_y, info.focus_z),
            seats: info.seats.iter().map(seat_from_info).collect(),
        }
    }

    pub fn has_free_seat(&self) -> bool {
        self.seats.iter().any(|s| s.occupant.is_none())
    }

    fn holds(&self, participant: Uuid) -> bool {
        self.seats.iter().any(|s| s.occupant == Some(participant))
    }
}

fn seat_from_info(info: &SeatInfo) -> StationSeat {
    StationSeat {
        side: info.side,
        pose: Pose::new(Vec3::new(info.x, info.y, info.z), info.heading),
        occupant: info.occupant,
    }
}

/// Arbitrates the local participant's exclusive access to station seats.
/// Occupancy is confirmed only by replicated seat updates; the local
/// reservation is a time-bounded guard, never an authority.
pub struct SeatArbitrator {
    intent: SeatIntent,
    stations: HashMap<Uuid, Station>,
    net: mpsc::UnboundedSender<ClientMsg>,
}

impl SeatArbitrator {
    pub fn new(net: mpsc::UnboundedSender<ClientMsg>) -> Self {
        Self {
            intent: SeatIntent::None,
            stations: HashMap::new(),
            net,
        }
    }

    pub fn intent(&self) -> &SeatIntent {
        &self.intent
    }

    pub fn station(&self, id: &Uuid) -> Option<&Station> {
        self.stations.get(id)
    }

    pub fn stations(&self) -> impl Iterator<Item = &Station> {
        self.stations.values()
    }

    /// Replace the station read model, typically from Welcome. Recognizes a
    /// seat we already occupy after a reconnect.
    pub fn load_stations(&mut self, infos: &[StationInfo], local_id: Uuid) {
        self.stations = infos
            .iter()
            .map(|info| (info.station_id, Station::from_info(info)))
            .collect();
        if let Some(station) = self.stations.values().find(|s| s.holds(local_id)) {
            self.intent = SeatIntent::Seated {
                station_id: station.id,
            };
        }
    }

    /// Signal the intent to take a seat. A pending reservation for another
    /// station is superseded; the old one is left to expire remotely.
    /// Returns false when we already occupy that station.
    pub fn request_join(&mut self, station_id: Uuid, token: Uuid, now: Instant) -> bool {
        if self.intent == (SeatIntent::Seated { station_id }) {
            return false;
        }
        self.intent = SeatIntent::Pending {
            station_id,
            token,
            requested_at: now,
            expires_at: now + RESERVATION_TIMEOUT,
        };
        let _ = self.net.send(ClientMsg::SeatRequest { station_id, token });
        true
    }

    /// Stand up from the station we occupy
    pub fn release(&mut self) {
        if let SeatIntent::Seated { station_id } = self.intent {
            let _ = self.net.send(ClientMsg::SeatRelease { station_id });
            self.intent = SeatIntent::None;
        }
    }

    /// Apply a replicated seat-occupancy change. Assignment to the local
    /// participant confirms the matching pending reservation; a confirmation
    /// for any other station is recorded but never changes local intent.
    pub fn on_seat_update(
        &mut self,
        local_id: Uuid,
        station_id: Uuid,
        side: SeatSide,
        occupant: Option<Uuid>,
    ) {
        if let Some(station) = self.stations.get_mut(&station_id) {
            if let Some(seat) = station.seats.iter_mut().find(|s| s.side == side) {
                seat.occupant = occupant;
            }
        }

        if occupant == Some(local_id) {
            match self.intent {
                SeatIntent::Pending {
                    station_id: pending,
                    ..
                } if pending == station_id => {
                    self.intent = SeatIntent::Seated { station_id };
                }
                SeatIntent::Pending { station_id: pending, .. } => {
                    debug!(station = %station_id, pending = %pending,
                        "seat confirmation for a superseded station, ignoring");
                }
                _ => {}
            }
            return;
        }

        // Cleared or reassigned: drop local joined state only when the
        // replicated record no longer shows us anywhere at that station
        if let SeatIntent::Seated { station_id: seated } = self.intent {
            if seated == station_id {
                let still_here = self
                    .stations
                    .get(&station_id)
                    .map(|s| s.holds(local_id))
                    .unwrap_or(false);
                if !still_here {
                    self.intent = SeatIntent::None;
                }
            }
        }
    }

    /// Apply a request result echoed with our token. Returns the result when
    /// it matched the outstanding reservation, None when it was stale.
    pub fn on_seat_result(
        &mut self,
        token: Uuid,
        station_id: Uuid,
        result: SeatRequestResult,
    ) -> Option<SeatRequestResult> {
        match self.intent {
            SeatIntent::Pending {
                station_id: pending,
                token: pending_token,
                ..
            } if pending == station_id && pending_token == token => {
                if let SeatRequestResult::Rejected { .. } = result {
                    self.intent = SeatIntent::None;
                }
                // Accepted keeps the reservation pending until the seat
                // update replicates; expiry still guards against its loss
                Some(result)
            }
            _ => {
                debug!(station = %station_id, "stale seat result, discarding");
                None
            }
        }
    }

    /// Drop a pending reservation whose confirmation never arrived.
    /// Local safety valve only; no network message is sent.
    pub fn expire(&mut self, now: Instant) -> Option<Uuid> {
        if let SeatIntent::Pending {
            station_id,
            expires_at,
            ..
        } = self.intent
        {
            if now >= expires_at {
                debug!(station = %station_id, "seat reservation expired unconfirmed");
                self.intent = SeatIntent::None;
                return Some(station_id);
            }
        }
        None
    }

    pub fn on_station_status(&mut self, station_id: Uuid, game_mode: BoardGame, in_progress: bool) {
        if let Some(station) = self.stations.get_mut(&station_id) {
            station.game_mode = game_mode;
            station.in_progress = in_progress;
        }
    }

    /// Clear every seat a departed participant held
    pub fn on_peer_left(&mut self, peer: Uuid) {
        for station in self.stations.values_mut() {
            for seat in &mut station.seats {
                if seat.occupant == Some(peer) {
                    seat.occupant = None;
                }
            }
        }
    }

    /// Stations hosting the wanted game, not mid-game and with a free seat,
    /// ordered nearest first
    pub fn eligible_stations(&self, mode: BoardGame, origin: Vec3) -> Vec<Uuid> {
        let mut eligible: Vec<(&Station, f32)> = self
            .stations
            .values()
            .filter(|s| s.game_mode == mode && !s.in_progress && s.has_free_seat())
            .map(|s| (s, origin.distance_sq(&s.focus)))
            .collect();
        eligible.sort_by(|a, b| a.1.total_cmp(&b.1));
        eligible.into_iter().map(|(s, _)| s.id).collect()
    }
}
