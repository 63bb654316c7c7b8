//! Quick-play matchmaking: retry a ranked candidate list until one accepts

use std::collections::VecDeque;
use std::time::Instant;

use tracing::{debug, info};
use uuid::Uuid;

use crate::room::seats::SeatArbitrator;
use crate::util::time::STATUS_TTL;
use crate::ws::protocol::{BoardGame, SeatRejectReason, SeatRequestResult};

/// One matchmaking attempt across a candidate list. The head of `remaining`
/// is the station currently being tried.
#[derive(Debug, Clone)]
struct QuickPlaySession {
    token: Uuid,
    mode: BoardGame,
    remaining: VecDeque<Uuid>,
}

#[derive(Debug, Clone, Default)]
struct RejectionTally {
    full: u32,
    in_progress: u32,
    other: u32,
}

#[derive(Debug, Clone)]
struct StatusLine {
    text: String,
    set_at: Instant,
}

/// Finds a seat by walking an ordered list of eligible stations, advancing
/// on each rejection. Results from a superseded session token are ignored.
pub struct QuickPlay {
    session: Option<QuickPlaySession>,
    status: Option<StatusLine>,
    tally: RejectionTally,
}

impl QuickPlay {
    pub fn new() -> Self {
        Self {
            session: None,
            status: None,
            tally: RejectionTally::default(),
        }
    }

    pub fn is_searching(&self) -> bool {
        self.session.is_some()
    }

    /// Whether a result token belongs to the session in flight
    pub fn owns_token(&self, token: Uuid) -> bool {
        self.session
            .as_ref()
            .map(|s| s.token == token)
            .unwrap_or(false)
    }

    /// Advisory status text, if any is currently showing
    pub fn status(&self) -> Option<&str> {
        self.status.as_ref().map(|s| s.text.as_str())
    }

    /// Show an advisory line; it auto-clears after the status TTL
    pub fn note(&mut self, text: impl Into<String>, now: Instant) {
        self.status = Some(StatusLine {
            text: text.into(),
            set_at: now,
        });
    }

    /// Begin a new session over the given candidates, superseding any session
    /// in flight. The fresh token invalidates results from the old one.
    pub fn start(
        &mut self,
        mode: BoardGame,
        candidates: Vec<Uuid>,
        seats: &mut SeatArbitrator,
        now: Instant,
    ) {
        self.session = None;
        self.tally = RejectionTally::default();

        if candidates.is_empty() {
            self.note(format!("No open {} tables right now", mode.label()), now);
            return;
        }

        let token = Uuid::new_v4();
        let first = candidates[0];
        let remaining: VecDeque<Uuid> = candidates.into();
        info!(mode = mode.label(), candidates = remaining.len(), "quick play started");

        self.session = Some(QuickPlaySession {
            token,
            mode,
            remaining,
        });
        seats.request_join(first, token, now);
    }

    /// Handle a seat result. Only results carrying the live session's token
    /// for the station currently being tried can advance the session.
    pub fn on_seat_result(
        &mut self,
        token: Uuid,
        station_id: Uuid,
        result: SeatRequestResult,
        seats: &mut SeatArbitrator,
        now: Instant,
    ) {
        let Some(session) = &mut self.session else {
            return;
        };
        if session.token != token {
            debug!(station = %station_id, "result for a superseded quick play token, ignoring");
            return;
        }
        if session.remaining.front() != Some(&station_id) {
            return;
        }

        match result {
            SeatRequestResult::Accepted => {
                info!(station = %station_id, "quick play found a seat");
                self.session = None;
                self.status = None;
            }
            SeatRequestResult::Rejected { reason } => {
                match reason {
                    SeatRejectReason::Full => self.tally.full += 1,
                    SeatRejectReason::InProgress => self.tally.in_progress += 1,
                    SeatRejectReason::Other => self.tally.other += 1,
                }
                self.advance(seats, now);
            }
        }
    }

    /// A reservation the session was waiting on expired unconfirmed;
    /// treat it like a generic rejection and move on.
    pub fn on_reservation_expired(
        &mut self,
        station_id: Uuid,
        seats: &mut SeatArbitrator,
        now: Instant,
    ) {
        let Some(session) = &self.session else {
            return;
        };
        if session.remaining.front() != Some(&station_id) {
            return;
        }
        self.tally.other += 1;
        self.advance(seats, now);
    }

    /// Clear expired status text
    pub fn tick(&mut self, now: Instant) {
        if let Some(status) = &self.status {
            if now.duration_since(status.set_at) >= STATUS_TTL {
                self.status = None;
            }
        }
    }

    fn advance(&mut self, seats: &mut SeatArbitrator, now: Instant) {
        let Some(session) = &mut self.session else {
            return;
        };
        session.remaining.pop_front();

        if let Some(next) = session.remaining.front().copied() {
            debug!(station = %next, "quick play trying next station");
            seats.request_join(next, session.token, now);
            return;
        }

        let mode = session.mode;
        let text = if self.tally.other == 0 && self.tally.in_progress == 0 {
            format!("All {} tables are full", mode.label())
        } else if self.tally.other == 0 {
            format!("No fresh {} games to join", mode.label())
        } else {
            format!("Couldn't find a {} table", mode.label())
        };
        info!(mode = mode.label(), "quick play exhausted its candidates");
        self.session = None;
        self.note(text, now);
    }
}

impl Default for QuickPlay {
    fn default() -> Self {
        Self::new()
    }
}
