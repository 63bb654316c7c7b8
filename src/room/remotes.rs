//! Smoothing of remote participants' networked poses into continuous motion

use std::collections::HashMap;

use uuid::Uuid;

use crate::room::Pose;
use crate::util::math::{ema_factor, wrap_angle, Vec3};
use crate::ws::protocol::ParticipantInfo;

/// Fraction of the pose delta left after one second of smoothing
pub const SMOOTH_BASE: f32 = 0.001;
const SPEED_SMOOTH_BASE: f32 = 0.01;
// Close enough to the snapshot that we pin to it outright
const POSITION_SNAP_SQ: f32 = 1e-8;
const HEADING_SNAP: f32 = 1e-4;

/// Smooths one remote participant's sparse snapshots into a visual trajectory
#[derive(Debug, Clone)]
pub struct RemoteTrajectory {
    target: Pose,
    smoothed: Pose,
    prev_position: Vec3,
    speed: f32,
}

impl RemoteTrajectory {
    pub fn new(initial: Pose) -> Self {
        Self {
            target: initial,
            smoothed: initial,
            prev_position: initial.position,
            speed: 0.0,
        }
    }

    /// Ingest the latest network snapshot. Non-finite poses are dropped
    /// rather than poisoning the smoothed state.
    pub fn apply_snapshot(&mut self, pose: Pose) {
        if !pose.position.is_finite() || !pose.heading.is_finite() {
            return;
        }
        self.target = Pose::new(pose.position, wrap_angle(pose.heading));
    }

    /// Advance the smoothed pose toward the latest snapshot
    pub fn tick(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let alpha = ema_factor(SMOOTH_BASE, dt);

        let pos = &mut self.smoothed.position;
        if pos.distance_sq(&self.target.position) <= POSITION_SNAP_SQ {
            *pos = self.target.position;
        } else {
            pos.x += (self.target.position.x - pos.x) * alpha;
            pos.y += (self.target.position.y - pos.y) * alpha;
            pos.z += (self.target.position.z - pos.z) * alpha;
        }

        // Shortest arc: normalize the delta before blending
        let delta = wrap_angle(self.target.heading - self.smoothed.heading);
        if delta.abs() <= HEADING_SNAP {
            self.smoothed.heading = self.target.heading;
        } else {
            self.smoothed.heading = wrap_angle(self.smoothed.heading + delta * alpha);
        }

        let instantaneous = self.prev_position.distance(&self.smoothed.position) / dt;
        let speed_alpha = ema_factor(SPEED_SMOOTH_BASE, dt);
        self.speed += (instantaneous - self.speed) * speed_alpha;
        self.prev_position = self.smoothed.position;
    }

    pub fn pose(&self) -> &Pose {
        &self.smoothed
    }

    /// Smoothed speed estimate, for animation cues only
    pub fn speed(&self) -> f32 {
        self.speed
    }
}

/// One remote participant tracked by the coordinator
#[derive(Debug, Clone)]
pub struct RemoteParticipant {
    pub display_name: String,
    pub trajectory: RemoteTrajectory,
    pub last_seen_at: u64,
}

/// All remote participants, keyed by id. Single writer: the coordinator.
#[derive(Debug, Default)]
pub struct RemoteRoster {
    remotes: HashMap<Uuid, RemoteParticipant>,
}

impl RemoteRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, info: &ParticipantInfo, now_millis: u64) {
        let pose = Pose::new(Vec3::new(info.x, info.y, info.z), info.heading);
        self.remotes.insert(
            info.participant_id,
            RemoteParticipant {
                display_name: info.display_name.clone(),
                trajectory: RemoteTrajectory::new(pose),
                last_seen_at: now_millis,
            },
        );
    }

    pub fn remove(&mut self, id: &Uuid) -> Option<RemoteParticipant> {
        self.remotes.remove(id)
    }

    /// Apply a pose snapshot. Snapshots for ids the roster has not seen a
    /// join for are dropped; the roster events are authoritative.
    pub fn apply_pose(&mut self, id: &Uuid, pose: Pose, now_millis: u64) {
        if let Some(remote) = self.remotes.get_mut(id) {
            remote.trajectory.apply_snapshot(pose);
            remote.last_seen_at = now_millis;
        }
    }

    pub fn tick_all(&mut self, dt: f32) {
        for remote in self.remotes.values_mut() {
            remote.trajectory.tick(dt);
        }
    }

    pub fn len(&self) -> usize {
        self.remotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remotes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Uuid, &RemoteParticipant)> {
        self.remotes.iter()
    }

    /// Current smoothed positions, the shape the voice manager consumes
    pub fn positions(&self) -> Vec<(Uuid, Vec3)> {
        self.remotes
            .iter()
            .map(|(id, r)| (*id, r.trajectory.pose().position))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    #[test]
    fn repeated_snapshot_converges_exactly_and_holds() {
        let mut traj = RemoteTrajectory::new(Pose::default());
        let snapshot = Pose::new(Vec3::new(4.0, 0.0, -2.0), 1.0);

        for _ in 0..2000 {
            traj.apply_snapshot(snapshot);
            traj.tick(DT);
        }
        assert_eq!(traj.pose().position, snapshot.position);
        assert_eq!(traj.pose().heading, snapshot.heading);

        // Holding there: no oscillation or drift
        for _ in 0..100 {
            traj.apply_snapshot(snapshot);
            traj.tick(DT);
            assert_eq!(traj.pose().position, snapshot.position);
            assert_eq!(traj.pose().heading, snapshot.heading);
        }
    }

    #[test]
    fn heading_takes_the_shortest_arc_across_pi() {
        let mut traj = RemoteTrajectory::new(Pose::new(Vec3::ZERO, 3.0));
        traj.apply_snapshot(Pose::new(Vec3::ZERO, -3.0));

        // The short way from 3.0 to -3.0 crosses ±π, so the heading magnitude
        // must stay large the whole way; dipping near 0 means the long way.
        for _ in 0..2000 {
            traj.tick(DT);
            assert!(
                traj.pose().heading.abs() > 2.9,
                "went the long way: {}",
                traj.pose().heading
            );
        }
        assert!((traj.pose().heading - (-3.0)).abs() < 1e-3);
    }

    #[test]
    fn convergence_is_frame_rate_independent() {
        let snapshot = Pose::new(Vec3::new(10.0, 0.0, 0.0), 0.0);
        let mut at_60 = RemoteTrajectory::new(Pose::default());
        let mut at_10 = RemoteTrajectory::new(Pose::default());
        at_60.apply_snapshot(snapshot);
        at_10.apply_snapshot(snapshot);

        for _ in 0..60 {
            at_60.tick(1.0 / 60.0);
        }
        for _ in 0..10 {
            at_10.tick(1.0 / 10.0);
        }
        assert!((at_60.pose().position.x - at_10.pose().position.x).abs() < 1e-2);
    }

    #[test]
    fn non_finite_snapshot_is_ignored() {
        let mut traj = RemoteTrajectory::new(Pose::new(Vec3::new(1.0, 0.0, 1.0), 0.5));
        traj.apply_snapshot(Pose::new(Vec3::new(f32::NAN, 0.0, 0.0), 0.0));
        traj.tick(DT);
        assert!(traj.pose().position.is_finite());
        assert_eq!(traj.pose().position.x, 1.0);
    }

    #[test]
    fn speed_estimate_rises_while_converging_and_decays_at_rest() {
        let mut traj = RemoteTrajectory::new(Pose::default());
        traj.apply_snapshot(Pose::new(Vec3::new(5.0, 0.0, 0.0), 0.0));
        for _ in 0..30 {
            traj.tick(DT);
        }
        let moving_speed = traj.speed();
        assert!(moving_speed > 0.0);

        for _ in 0..2000 {
            traj.tick(DT);
        }
        assert!(traj.speed() < moving_speed * 0.05);
    }

    #[test]
    fn roster_drops_poses_for_unknown_participants() {
        let mut roster = RemoteRoster::new();
        roster.apply_pose(&Uuid::new_v4(), Pose::default(), 0);
        assert!(roster.is_empty());
    }
}
