//! Local participant movement and throttled pose emission

use crate::room::{HeldKeys, Pose};
use crate::util::math::{wrap_angle, Vec3};
use crate::util::time::POSE_SEND_MIN_INTERVAL;

/// Walking speed in units per second
pub const WALK_SPEED: f32 = 3.2;
/// Remaining distance below which a move order snaps to its destination
pub const ARRIVE_EPSILON: f32 = 0.25;
/// Duration of the heading alignment phase before sitting down
pub const ALIGN_SECS: f32 = 0.35;
/// Squared positional delta that forces an off-schedule pose send
pub const SEND_POSITION_EPSILON_SQ: f32 = 0.0625;
/// Heading delta in radians (~1.1°) that forces an off-schedule pose send
pub const SEND_HEADING_EPSILON: f32 = 0.02;
/// Fraction of the smoothed-speed delta left after one second
const SPEED_SMOOTH_BASE: f32 = 0.01;

/// Seat placement applied at the end of a move order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SitTarget {
    /// Pose the participant is placed in once seated
    pub seated_pose: Pose,
    /// Point the camera should focus on while seated
    pub camera_focus: Vec3,
}

/// A pending travel instruction, at most one active at a time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveOrder {
    pub dest_x: f32,
    pub dest_z: f32,
    pub final_heading: Option<f32>,
    pub sit: Option<SitTarget>,
}

/// Travel state of the local participant
#[derive(Debug, Clone, Copy, Default)]
enum Travel {
    #[default]
    Idle,
    Moving(MoveOrder),
    Aligning {
        sit: SitTarget,
        from_heading: f32,
        elapsed: f32,
    },
    Seated {
        camera_focus: Vec3,
    },
}

/// Time/delta gate in front of outbound pose sends
#[derive(Debug, Default)]
struct PoseEmitter {
    since_send: f32,
    last_sent: Option<Pose>,
    force: bool,
}

impl PoseEmitter {
    fn should_send(&mut self, pose: &Pose, dt: f32) -> bool {
        self.since_send += dt;
        let due = match &self.last_sent {
            None => true,
            Some(prev) => {
                self.force
                    || self.since_send >= POSE_SEND_MIN_INTERVAL
                    || prev.position.distance_sq(&pose.position) > SEND_POSITION_EPSILON_SQ
                    || wrap_angle(pose.heading - prev.heading).abs() > SEND_HEADING_EPSILON
            }
        };
        if due {
            self.since_send = 0.0;
            self.last_sent = Some(*pose);
            self.force = false;
        }
        due
    }
}

/// Simulates the local participant's pose from key input and move orders
pub struct Locomotion {
    pose: Pose,
    travel: Travel,
    smoothed_speed: f32,
    arena_half_extent: f32,
    emitter: PoseEmitter,
}

impl Locomotion {
    pub fn new(spawn: Pose, arena_half_extent: f32) -> Self {
        Self {
            pose: spawn,
            travel: Travel::Idle,
            smoothed_speed: 0.0,
            arena_half_extent,
            emitter: PoseEmitter::default(),
        }
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Smoothed speed estimate, for animation cues only
    pub fn smoothed_speed(&self) -> f32 {
        self.smoothed_speed
    }

    pub fn is_seated(&self) -> bool {
        matches!(self.travel, Travel::Seated { .. })
    }

    /// Camera focus target while seated
    pub fn camera_focus(&self) -> Option<Vec3> {
        match self.travel {
            Travel::Seated { camera_focus } => Some(camera_focus),
            _ => None,
        }
    }

    /// Replace any active order with a new one. Leaving a seat this way
    /// forces one unconditional pose send so the stand-up replicates.
    pub fn set_move_order(&mut self, mut order: MoveOrder) {
        if !order.dest_x.is_finite() {
            order.dest_x = self.pose.position.x;
        }
        if !order.dest_z.is_finite() {
            order.dest_z = self.pose.position.z;
        }
        order.dest_x = order.dest_x.clamp(-self.arena_half_extent, self.arena_half_extent);
        order.dest_z = order.dest_z.clamp(-self.arena_half_extent, self.arena_half_extent);
        if let Some(h) = order.final_heading {
            order.final_heading = h.is_finite().then(|| wrap_angle(h));
        }
        if self.is_seated() {
            self.emitter.force = true;
        }
        self.travel = Travel::Moving(order);
    }

    /// Drop any order and stand up if seated
    pub fn cancel_movement(&mut self) {
        if self.is_seated() {
            self.emitter.force = true;
        }
        self.travel = Travel::Idle;
    }

    /// Advance one tick. Returns the pose to broadcast if a send is due.
    pub fn tick(&mut self, keys: HeldKeys, camera_forward: (f32, f32), dt: f32) -> Option<Pose> {
        let prev_position = self.pose.position;

        if keys.any() {
            // Key input overrides and cancels any order, and stands us up
            if !matches!(self.travel, Travel::Idle) {
                if matches!(self.travel, Travel::Seated { .. } | Travel::Aligning { .. }) {
                    self.emitter.force = true;
                }
                self.travel = Travel::Idle;
            }
            if let Some(dir) = key_vector(keys, camera_forward) {
                self.step(dir, dt);
            }
        } else {
            match std::mem::take(&mut self.travel) {
                Travel::Idle => {}
                Travel::Seated { camera_focus } => {
                    self.travel = Travel::Seated { camera_focus };
                }
                Travel::Moving(order) => self.advance_order(order, dt),
                Travel::Aligning {
                    sit,
                    from_heading,
                    elapsed,
                } => self.advance_alignment(sit, from_heading, elapsed + dt),
            }
        }

        self.update_speed_estimate(prev_position, dt);

        self.emitter
            .should_send(&self.pose, dt)
            .then_some(self.pose)
    }

    fn advance_order(&mut self, order: MoveOrder, dt: f32) {
        let dx = order.dest_x - self.pose.position.x;
        let dz = order.dest_z - self.pose.position.z;
        let remaining = (dx * dx + dz * dz).sqrt();
        let step = WALK_SPEED * dt;

        if remaining <= ARRIVE_EPSILON || step >= remaining {
            // Snap exactly onto the destination, then align before sitting
            self.pose.position.x = order.dest_x;
            self.pose.position.z = order.dest_z;
            if let Some(h) = order.final_heading {
                self.pose.heading = h;
            }
            self.emitter.force = true;
            match order.sit {
                Some(sit) => {
                    self.travel = Travel::Aligning {
                        sit,
                        from_heading: self.pose.heading,
                        elapsed: 0.0,
                    };
                }
                None => self.travel = Travel::Idle,
            }
            return;
        }

        let (nx, nz) = (dx / remaining, dz / remaining);
        self.pose.position.x += nx * step;
        self.pose.position.z += nz * step;
        self.pose.heading = nx.atan2(nz);
        self.clamp_to_arena();
        self.travel = Travel::Moving(order);
    }

    fn advance_alignment(&mut self, sit: SitTarget, from_heading: f32, elapsed: f32) {
        if elapsed >= ALIGN_SECS {
            self.pose = sit.seated_pose;
            self.emitter.force = true;
            self.travel = Travel::Seated {
                camera_focus: sit.camera_focus,
            };
            return;
        }
        let t = elapsed / ALIGN_SECS;
        let delta = wrap_angle(sit.seated_pose.heading - from_heading);
        self.pose.heading = wrap_angle(from_heading + delta * t);
        self.travel = Travel::Aligning {
            sit,
            from_heading,
            elapsed,
        };
    }

    fn step(&mut self, dir: (f32, f32), dt: f32) {
        self.pose.position.x += dir.0 * WALK_SPEED * dt;
        self.pose.position.z += dir.1 * WALK_SPEED * dt;
        self.pose.heading = dir.0.atan2(dir.1);
        self.clamp_to_arena();
    }

    fn clamp_to_arena(&mut self) {
        let h = self.arena_half_extent;
        self.pose.position.x = self.pose.position.x.clamp(-h, h);
        self.pose.position.z = self.pose.position.z.clamp(-h, h);
    }

    fn update_speed_estimate(&mut self, prev_position: Vec3, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let instantaneous = prev_position.distance(&self.pose.position) / dt;
        let alpha = 1.0 - SPEED_SMOOTH_BASE.powf(dt);
        self.smoothed_speed += (instantaneous - self.smoothed_speed) * alpha;
    }
}

/// Camera-relative motion vector from held keys, normalized, on the ground plane
fn key_vector(keys: HeldKeys, camera_forward: (f32, f32)) -> Option<(f32, f32)> {
    let (fx, fz) = camera_forward;
    let len = (fx * fx + fz * fz).sqrt();
    let (fx, fz) = if len.is_finite() && len > 1e-4 {
        (fx / len, fz / len)
    } else {
        (0.0, 1.0)
    };
    // Right-hand vector on the ground plane
    let (rx, rz) = (fz, -fx);

    let ahead = (keys.forward as i8 - keys.back as i8) as f32;
    let side = (keys.right as i8 - keys.left as i8) as f32;
    let (mx, mz) = (fx * ahead + rx * side, fz * ahead + rz * side);

    let mag = (mx * mx + mz * mz).sqrt();
    if mag < 1e-4 {
        return None;
    }
    Some((mx / mag, mz / mag))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;
    const CAMERA_AHEAD: (f32, f32) = (0.0, 1.0);

    fn order_to(x: f32, z: f32) -> MoveOrder {
        MoveOrder {
            dest_x: x,
            dest_z: z,
            final_heading: None,
            sit: None,
        }
    }

    fn sit_order(x: f32, z: f32) -> MoveOrder {
        MoveOrder {
            dest_x: x,
            dest_z: z,
            final_heading: Some(0.0),
            sit: Some(SitTarget {
                seated_pose: Pose::new(Vec3::new(x, 0.4, z), 1.5),
                camera_focus: Vec3::new(x, 0.8, z + 1.0),
            }),
        }
    }

    #[test]
    fn move_order_lands_exactly_on_destination() {
        let mut sim = Locomotion::new(Pose::default(), 48.0);
        sim.set_move_order(order_to(5.0, 5.0));
        for _ in 0..600 {
            sim.tick(HeldKeys::default(), CAMERA_AHEAD, DT);
        }
        assert_eq!(sim.pose().position.x, 5.0);
        assert_eq!(sim.pose().position.z, 5.0);
        assert!(!sim.is_seated());
    }

    #[test]
    fn seating_waits_for_the_alignment_phase() {
        let mut sim = Locomotion::new(Pose::default(), 48.0);
        sim.set_move_order(sit_order(5.0, 5.0));

        // Walk until the position snaps onto the destination
        let mut arrived = false;
        for _ in 0..600 {
            sim.tick(HeldKeys::default(), CAMERA_AHEAD, DT);
            if sim.pose().position.x == 5.0 && sim.pose().position.z == 5.0 {
                arrived = true;
                break;
            }
        }
        assert!(arrived, "never arrived");
        assert!(!sim.is_seated(), "seated before alignment elapsed");

        // Alignment holds position and only then applies the seated pose
        let align_ticks = (ALIGN_SECS / DT).ceil() as usize + 1;
        for _ in 0..align_ticks {
            sim.tick(HeldKeys::default(), CAMERA_AHEAD, DT);
            assert_eq!(sim.pose().position.x, 5.0);
        }
        assert!(sim.is_seated());
        assert_eq!(sim.pose().position.y, 0.4);
        assert!((sim.pose().heading - 1.5).abs() < 1e-6);
        assert!(sim.camera_focus().is_some());
    }

    #[test]
    fn key_input_cancels_order_and_stands_up() {
        let mut sim = Locomotion::new(Pose::default(), 48.0);
        sim.set_move_order(sit_order(1.0, 1.0));
        for _ in 0..200 {
            sim.tick(HeldKeys::default(), CAMERA_AHEAD, DT);
        }
        assert!(sim.is_seated());

        let keys = HeldKeys {
            forward: true,
            ..Default::default()
        };
        sim.tick(keys, CAMERA_AHEAD, DT);
        assert!(!sim.is_seated());
        assert!(sim.camera_focus().is_none());
        assert!(sim.pose().position.z > 1.0);
    }

    #[test]
    fn keys_are_camera_relative() {
        let mut sim = Locomotion::new(Pose::default(), 48.0);
        let keys = HeldKeys {
            forward: true,
            ..Default::default()
        };
        // Camera looking down +x: forward key moves along +x
        sim.tick(keys, (1.0, 0.0), DT);
        assert!(sim.pose().position.x > 0.0);
        assert!(sim.pose().position.z.abs() < 1e-6);
    }

    #[test]
    fn position_clamps_to_arena_bounds() {
        let mut sim = Locomotion::new(Pose::new(Vec3::new(0.9, 0.0, 0.0), 0.0), 1.0);
        let keys = HeldKeys {
            forward: true,
            ..Default::default()
        };
        for _ in 0..120 {
            sim.tick(keys, (1.0, 0.0), DT);
        }
        assert_eq!(sim.pose().position.x, 1.0);
    }

    #[test]
    fn non_finite_destination_is_clamped_to_current_position() {
        let mut sim = Locomotion::new(Pose::new(Vec3::new(2.0, 0.0, 3.0), 0.0), 48.0);
        sim.set_move_order(order_to(f32::NAN, f32::INFINITY));
        for _ in 0..10 {
            sim.tick(HeldKeys::default(), CAMERA_AHEAD, DT);
        }
        assert_eq!(sim.pose().position.x, 2.0);
        assert_eq!(sim.pose().position.z, 3.0);
    }

    #[test]
    fn idle_sends_heartbeat_after_min_interval() {
        let mut sim = Locomotion::new(Pose::default(), 48.0);
        // First tick always sends
        assert!(sim.tick(HeldKeys::default(), CAMERA_AHEAD, DT).is_some());

        let mut sends = 0;
        let mut elapsed = 0.0;
        while elapsed < POSE_SEND_MIN_INTERVAL - DT {
            if sim.tick(HeldKeys::default(), CAMERA_AHEAD, DT).is_some() {
                sends += 1;
            }
            elapsed += DT;
        }
        assert_eq!(sends, 0, "sent while idle before the interval elapsed");
        // Crossing the interval emits again
        assert!(sim.tick(HeldKeys::default(), CAMERA_AHEAD, DT).is_some());
    }

    #[test]
    fn arrival_forces_an_unconditional_send() {
        let mut sim = Locomotion::new(Pose::default(), 48.0);
        sim.tick(HeldKeys::default(), CAMERA_AHEAD, DT);
        // Destination one small step away: arrival happens well inside
        // the send interval, the snap must still replicate immediately
        sim.set_move_order(order_to(0.1, 0.0));
        let sent = sim.tick(HeldKeys::default(), CAMERA_AHEAD, DT);
        let pose = sent.expect("arrival snap was not broadcast");
        assert_eq!(pose.position.x, 0.1);
    }
}
