//! Distance-gated voice mesh: per-peer gain and bounded connection selection

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::util::math::{smoothstep, Vec3};

/// Distance at or under which a peer plays at full volume
pub const NEAR_FULL_GAIN: f32 = 2.0;
/// Distance at or past which a peer is silent
pub const FAR_SILENT: f32 = 36.0;
/// A peer inside this radius becomes a connection candidate
pub const START_RADIUS: f32 = 6.0;
/// A connected peer stays a candidate until it leaves this radius
pub const STOP_RADIUS: f32 = 7.2;
/// Hard cap on simultaneous voice connections
pub const MAX_VOICE_PEERS: usize = 8;

/// Lifecycle of one voice connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Live,
    Closing,
}

/// One live or pending voice connection
#[derive(Debug, Clone)]
pub struct VoiceLink {
    pub peer_id: Uuid,
    pub state: LinkState,
    pub volume: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HangupReason {
    OutOfRange,
    PeerLeft,
}

/// Fire-and-forget commands to the opaque voice capability.
/// Re-issuing the same set, or hanging up an absent peer, is safe there.
#[derive(Debug, Clone)]
pub enum VoiceCommand {
    Connect { peers: Vec<Uuid> },
    Hangup { peer: Uuid, reason: HangupReason },
    SetVolume { peer: Uuid, gain: f32 },
}

/// Playback gain for a peer at the given distance
pub fn distance_gain(distance: f32) -> f32 {
    1.0 - smoothstep(NEAR_FULL_GAIN, FAR_SILENT, distance)
}

/// Decides which nearby peers to hold voice connections with, and how loud
/// each one plays. Connection churn is bounded by hysteresis and by acting
/// only when the desired set actually changes.
pub struct ProximityVoice {
    commands: mpsc::UnboundedSender<VoiceCommand>,
    links: HashMap<Uuid, VoiceLink>,
    desired: HashSet<Uuid>,
    muted: bool,
}

impl ProximityVoice {
    pub fn new(commands: mpsc::UnboundedSender<VoiceCommand>) -> Self {
        Self {
            commands,
            links: HashMap::new(),
            desired: HashSet::new(),
            muted: false,
        }
    }

    /// Globally mute incoming audio. Connections are kept; gains go to zero.
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn links(&self) -> impl Iterator<Item = &VoiceLink> {
        self.links.values()
    }

    /// Peers currently held open (connecting or live)
    pub fn connected_count(&self) -> usize {
        self.links
            .values()
            .filter(|l| l.state != LinkState::Closing)
            .count()
    }

    /// Fast pass (~10 Hz): recompute playback volume for every known peer.
    /// Peers with a non-finite position are skipped, not zeroed, so one bad
    /// snapshot does not transiently mute them.
    pub fn update_gains(&mut self, self_position: Vec3, remotes: &[(Uuid, Vec3)]) {
        if !self_position.is_finite() {
            return;
        }
        for (peer, position) in remotes {
            if !position.is_finite() {
                continue;
            }
            let gain = if self.muted {
                0.0
            } else {
                distance_gain(self_position.distance(position))
            };
            let _ = self.commands.send(VoiceCommand::SetVolume { peer: *peer, gain });
            if let Some(link) = self.links.get_mut(peer) {
                if link.state != LinkState::Closing {
                    link.volume = gain;
                }
            }
        }
    }

    /// Slow pass (~3 Hz): pick the desired connection set and issue commands
    /// only when its membership changed since the previous pass.
    pub fn update_connections(&mut self, self_position: Vec3, remotes: &[(Uuid, Vec3)]) {
        // Links that were closing last pass are gone by now
        self.links.retain(|_, l| l.state != LinkState::Closing);

        if !self_position.is_finite() {
            return;
        }

        let mut candidates: Vec<(Uuid, f32)> = remotes
            .iter()
            .filter(|(_, position)| position.is_finite())
            .map(|(peer, position)| (*peer, self_position.distance(position)))
            .filter(|(peer, d)| {
                *d <= START_RADIUS || (self.desired.contains(peer) && *d <= STOP_RADIUS)
            })
            .collect();
        candidates.sort_by(|a, b| a.1.total_cmp(&b.1));
        candidates.truncate(MAX_VOICE_PEERS);

        let next: HashSet<Uuid> = candidates.iter().map(|(peer, _)| *peer).collect();

        if next != self.desired {
            for peer in self.desired.difference(&next) {
                let _ = self.commands.send(VoiceCommand::Hangup {
                    peer: *peer,
                    reason: HangupReason::OutOfRange,
                });
                if let Some(link) = self.links.get_mut(peer) {
                    link.state = LinkState::Closing;
                }
            }

            let ordered: Vec<Uuid> = candidates.iter().map(|(peer, _)| *peer).collect();
            debug!(peers = ordered.len(), "voice desired set changed");
            if !ordered.is_empty() {
                let _ = self.commands.send(VoiceCommand::Connect { peers: ordered });
            }

            for peer in next.difference(&self.desired) {
                self.links.insert(
                    *peer,
                    VoiceLink {
                        peer_id: *peer,
                        state: LinkState::Connecting,
                        volume: 0.0,
                    },
                );
            }
        }

        // A peer that survived a whole pass counts as established
        for peer in next.intersection(&self.desired) {
            if let Some(link) = self.links.get_mut(peer) {
                if link.state == LinkState::Connecting {
                    link.state = LinkState::Live;
                }
            }
        }

        self.desired = next;
    }

    /// Drop a departed peer immediately, outside the slow cadence
    pub fn on_peer_left(&mut self, peer: Uuid) {
        if self.desired.remove(&peer) {
            let _ = self.commands.send(VoiceCommand::Hangup {
                peer,
                reason: HangupReason::PeerLeft,
            });
        }
        self.links.remove(&peer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice() -> (ProximityVoice, mpsc::UnboundedReceiver<VoiceCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ProximityVoice::new(tx), rx)
    }

    fn at(x: f32) -> Vec3 {
        Vec3::new(x, 0.0, 0.0)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<VoiceCommand>) -> Vec<VoiceCommand> {
        let mut out = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            out.push(cmd);
        }
        out
    }

    #[test]
    fn gain_is_monotone_with_plateaus() {
        assert_eq!(distance_gain(0.0), 1.0);
        assert_eq!(distance_gain(NEAR_FULL_GAIN), 1.0);
        assert_eq!(distance_gain(FAR_SILENT), 0.0);
        assert_eq!(distance_gain(100.0), 0.0);

        let mut previous = 1.0;
        let mut d = NEAR_FULL_GAIN;
        while d <= FAR_SILENT {
            let g = distance_gain(d);
            assert!(g <= previous, "gain rose between {} and {}", d - 0.5, d);
            previous = g;
            d += 0.5;
        }
    }

    #[test]
    fn connections_are_capped_at_the_nearest_peers() {
        let (mut voice, mut rx) = voice();
        let remotes: Vec<(Uuid, Vec3)> = (0..20)
            .map(|i| (Uuid::new_v4(), at(0.5 + i as f32 * 0.25)))
            .collect();

        voice.update_connections(Vec3::ZERO, &remotes);

        assert_eq!(voice.connected_count(), MAX_VOICE_PEERS);
        let nearest: HashSet<Uuid> = remotes[..MAX_VOICE_PEERS]
            .iter()
            .map(|(id, _)| *id)
            .collect();
        let commands = drain(&mut rx);
        match &commands[..] {
            [VoiceCommand::Connect { peers }] => {
                assert_eq!(peers.len(), MAX_VOICE_PEERS);
                assert_eq!(peers.iter().copied().collect::<HashSet<_>>(), nearest);
            }
            other => panic!("expected one connect command, got {:?}", other),
        }
    }

    #[test]
    fn hysteresis_prevents_churn_at_the_boundary() {
        let (mut voice, mut rx) = voice();
        let peer = Uuid::new_v4();

        voice.update_connections(Vec3::ZERO, &[(peer, at(6.1))]);
        // 6.1 is outside START_RADIUS: nothing to connect yet
        assert!(drain(&mut rx).is_empty());

        voice.update_connections(Vec3::ZERO, &[(peer, at(5.9))]);
        assert_eq!(drain(&mut rx).len(), 1);

        // Oscillating between 6.1 and 6.9 stays inside STOP_RADIUS
        for pass in 0..20 {
            let d = if pass % 2 == 0 { 6.1 } else { 6.9 };
            voice.update_connections(Vec3::ZERO, &[(peer, at(d))]);
            assert!(
                drain(&mut rx).is_empty(),
                "churned on pass {} at distance {}",
                pass,
                d
            );
        }
        assert_eq!(voice.connected_count(), 1);

        // Past STOP_RADIUS the link is finally dropped
        voice.update_connections(Vec3::ZERO, &[(peer, at(7.3))]);
        let commands = drain(&mut rx);
        assert!(commands
            .iter()
            .any(|c| matches!(c, VoiceCommand::Hangup { reason: HangupReason::OutOfRange, .. })));
    }

    #[test]
    fn unchanged_set_reissues_nothing() {
        let (mut voice, mut rx) = voice();
        let remotes = vec![(Uuid::new_v4(), at(3.0)), (Uuid::new_v4(), at(4.0))];

        voice.update_connections(Vec3::ZERO, &remotes);
        drain(&mut rx);

        for _ in 0..10 {
            voice.update_connections(Vec3::ZERO, &remotes);
        }
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn surviving_a_pass_promotes_the_link_to_live() {
        let (mut voice, _rx) = voice();
        let peer = Uuid::new_v4();
        let remotes = vec![(peer, at(2.0))];

        voice.update_connections(Vec3::ZERO, &remotes);
        assert!(voice
            .links()
            .all(|l| l.state == LinkState::Connecting));

        voice.update_connections(Vec3::ZERO, &remotes);
        assert!(voice.links().all(|l| l.state == LinkState::Live));
    }

    #[test]
    fn mute_zeroes_gain_without_dropping_connections() {
        let (mut voice, mut rx) = voice();
        let peer = Uuid::new_v4();
        let remotes = vec![(peer, at(1.0))];

        voice.update_connections(Vec3::ZERO, &remotes);
        voice.set_muted(true);
        drain(&mut rx);

        voice.update_gains(Vec3::ZERO, &remotes);
        let commands = drain(&mut rx);
        match &commands[..] {
            [VoiceCommand::SetVolume { gain, .. }] => assert_eq!(*gain, 0.0),
            other => panic!("expected one volume command, got {:?}", other),
        }
        assert_eq!(voice.connected_count(), 1);
    }

    #[test]
    fn non_finite_positions_are_skipped_not_zeroed() {
        let (mut voice, mut rx) = voice();
        let good = Uuid::new_v4();
        let bad = Uuid::new_v4();

        voice.update_connections(Vec3::ZERO, &[(good, at(1.0)), (bad, at(1.5))]);
        voice.update_gains(Vec3::ZERO, &[(good, at(1.0)), (bad, at(1.5))]);
        drain(&mut rx);

        // One bad snapshot for `bad`: no volume command for it this pass
        voice.update_gains(
            Vec3::ZERO,
            &[(good, at(1.0)), (bad, Vec3::new(f32::NAN, 0.0, 0.0))],
        );
        let volumes: Vec<Uuid> = drain(&mut rx)
            .into_iter()
            .filter_map(|c| match c {
                VoiceCommand::SetVolume { peer, .. } => Some(peer),
                _ => None,
            })
            .collect();
        assert_eq!(volumes, vec![good]);

        // The stale link keeps its last applied volume
        let link = voice.links().find(|l| l.peer_id == bad).unwrap();
        assert!(link.volume > 0.9);
    }

    #[test]
    fn departed_peer_is_hung_up_immediately() {
        let (mut voice, mut rx) = voice();
        let peer = Uuid::new_v4();

        voice.update_connections(Vec3::ZERO, &[(peer, at(1.0))]);
        drain(&mut rx);

        voice.on_peer_left(peer);
        let commands = drain(&mut rx);
        assert!(matches!(
            commands[..],
            [VoiceCommand::Hangup {
                reason: HangupReason::PeerLeft,
                ..
            }]
        ));
        assert_eq!(voice.connected_count(), 0);
    }
}
