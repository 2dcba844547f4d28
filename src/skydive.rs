//! Skydiver flight coordinator.
//!
//! The skydiver keeps a falling body in one of two poses and swaps between
//! them based on ground proximity:
//!
//! - `Vertical`: upright, feet towards the ground. Default near the ground.
//! - `Horizontal`: prone, chest towards the ground, body axis along the
//!   heading. Entered when there is enough altitude to rotate back upright
//!   before landing.
//!
//! The proximity thresholds are self-referential: the distance needed to
//! stand back up scales with the current fall speed and with how far the
//! body is from the upright pose, floored by a configured minimum. The
//! switch to prone requires twice that distance of clear air, so the two
//! transitions never oscillate. The thresholds are re-evaluated every tick:
//! a ground closing in mid-rotation aborts the prone task and stands the
//! body back up.
//!
//! While prone, the body generates lift against its airspeed, yaws its long
//! axis towards the travel direction and answers tilt input with pitch and
//! bank torques.

use bevy::prelude::*;

use crate::backend::AbilityPhysicsBackend;
use crate::correction::{
    look_rotation, rotate_towards, upright_target, RotationAuthority, RotationOwner,
};
use crate::events::{SkydiveEvent, SkydiveEventKind};
use crate::gravity::GravityContext;

/// Flight pose of the skydiver.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkydiveOrientation {
    #[default]
    Vertical,
    Horizontal,
}

/// A point on the body that generates lift.
///
/// The application point of the total lift force is the weighted centroid of
/// these points; each point's weight scales with how much its surface
/// direction currently faces the ground, so a banked body lifts off-center
/// and rights itself.
#[derive(Reflect, Debug, Clone, Copy)]
pub struct LiftPoint {
    /// Position local to the body.
    pub offset: Vec3,
    /// Surface direction local to the body.
    pub direction: Vec3,
    /// Relative contribution of this point.
    pub weight: f32,
}

#[derive(Reflect, Debug, Clone, Copy)]
struct RotationTask {
    target: Quat,
    goal: SkydiveOrientation,
    /// Finish even while the skydiver is disabled. Set for the
    /// rotate-back-upright task that a disable triggers.
    always_complete: bool,
}

/// Skydiver state machine and tuning.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct Skydiver {
    /// Angular budget for pose convergence in rad/s.
    pub rotation_speed: f32,
    /// Remaining angle below which a pose task snaps and completes, in rad.
    pub rotation_tolerance: f32,
    /// Lower bound for the ground clearance needed to stay prone, in m.
    pub min_ground_distance_floor: f32,
    /// Lift per m/s of airspeed into the body's back, in N.
    pub base_lift: f32,
    /// Lift application points, local to the body.
    pub lift_points: Vec<LiftPoint>,
    /// Torque per unit of tilt input, in N·m.
    pub tilt_torque: f32,
    /// Tilt angle beyond which tilt input damps angular velocity instead of
    /// adding torque, in rad.
    pub max_tilt_angle: f32,
    /// Yaw torque per radian of heading error, in N·m.
    pub heading_torque: f32,
    /// Horizontal speed below which heading alignment stays off, in m/s.
    pub heading_speed_threshold: f32,
    /// Heading error below which no alignment torque is applied, in rad.
    pub heading_tolerance: f32,
    /// Half extents of the downward ground probe.
    pub probe_half_extents: Vec3,

    enabled: bool,
    orientation: SkydiveOrientation,
    task: Option<RotationTask>,
    pub(crate) tilt_input: Vec2,
    pub(crate) added_lift: f32,
    /// Distance to the ground within the probe range, written by the
    /// backend. `None` means clear air.
    pub(crate) ground_distance: Option<f32>,
}

impl Default for Skydiver {
    fn default() -> Self {
        Self {
            rotation_speed: std::f32::consts::PI,
            rotation_tolerance: 0.02,
            min_ground_distance_floor: 5.0,
            base_lift: 2.0,
            lift_points: default_lift_points(),
            tilt_torque: 12.0,
            max_tilt_angle: std::f32::consts::FRAC_PI_4,
            heading_torque: 6.0,
            heading_speed_threshold: 1.0,
            heading_tolerance: 0.1,
            probe_half_extents: Vec3::new(0.5, 0.1, 0.5),
            enabled: true,
            orientation: SkydiveOrientation::Vertical,
            task: None,
            tilt_input: Vec2::ZERO,
            added_lift: 0.0,
            ground_distance: None,
        }
    }
}

/// Hands and feet of a prone body: the lift surface is the chest plane,
/// its normal along local -Z. In the prone pose those normals face the
/// ground and catch the airflow.
fn default_lift_points() -> Vec<LiftPoint> {
    [
        Vec3::new(-0.4, 0.7, 0.0),
        Vec3::new(0.4, 0.7, 0.0),
        Vec3::new(-0.25, -0.8, 0.0),
        Vec3::new(0.25, -0.8, 0.0),
    ]
    .into_iter()
    .map(|offset| LiftPoint {
        offset,
        direction: Vec3::NEG_Z,
        weight: 1.0,
    })
    .collect()
}

impl Skydiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pose convergence speed.
    pub fn with_rotation_speed(mut self, speed: f32) -> Self {
        self.rotation_speed = speed;
        self
    }

    /// Set the clearance floor for staying prone.
    pub fn with_min_ground_distance(mut self, floor: f32) -> Self {
        self.min_ground_distance_floor = floor;
        self
    }

    /// Set the base lift coefficient.
    pub fn with_base_lift(mut self, lift: f32) -> Self {
        self.base_lift = lift;
        self
    }

    /// Enable or disable the skydiver. Disabling while prone rotates the
    /// body back upright first, then goes inert.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn orientation(&self) -> SkydiveOrientation {
        self.orientation
    }

    /// Whether the body is in (or converging onto) the prone pose.
    pub fn is_horizontal(&self) -> bool {
        self.orientation == SkydiveOrientation::Horizontal
    }

    /// Whether a pose convergence is running.
    pub fn is_rotating(&self) -> bool {
        self.task.is_some()
    }

    /// Distance to the ground seen by the probe this tick, `None` in clear
    /// air.
    pub fn ground_distance(&self) -> Option<f32> {
        self.ground_distance
    }

    /// Tilt input: x banks, y pitches. Cleared by nothing; callers own it.
    pub fn set_tilt(&mut self, tilt: Vec2) {
        self.tilt_input = tilt;
    }

    /// Extra lift coefficient layered on top of `base_lift` (wingsuit).
    pub fn set_added_lift(&mut self, added: f32) {
        self.added_lift = added.max(0.0);
    }

    pub fn added_lift(&self) -> f32 {
        self.added_lift
    }

    /// Ground clearance needed to finish rotating upright before landing.
    ///
    /// `vertical_speed * angle_to_vertical / rotation_speed` is the distance
    /// fallen during the rotation; the configured floor keeps the threshold
    /// meaningful when falling slowly or already upright.
    pub fn min_ground_distance(&self, vertical_speed: f32, angle_to_vertical: f32) -> f32 {
        let rotation_time = angle_to_vertical / self.rotation_speed.max(1e-6);
        self.min_ground_distance_floor
            .max(vertical_speed.abs() * rotation_time)
    }

    /// Backend sensor input: distance to the ground within the probe range,
    /// `None` for clear air.
    pub fn set_ground_distance(&mut self, distance: Option<f32>) {
        self.ground_distance = distance;
    }

    /// How far down the backend's ground probe should reach this tick.
    pub fn probe_range(&self, rotation: Quat, up: Vec3, velocity: Vec3) -> f32 {
        let vertical_speed = velocity.dot(up).abs();
        let angle_to_vertical = rotation.angle_between(upright_target(rotation, up));
        2.0 * self.min_ground_distance(vertical_speed, angle_to_vertical)
    }
}

/// Prone pose: chest towards the ground, body axis along the current
/// heading. Falls back to keeping the current rotation when the heading is
/// degenerate.
fn horizontal_pose(rotation: Quat, up: Vec3) -> Quat {
    let forward = rotation * Vec3::NEG_Z;
    let heading = forward - up * forward.dot(up);
    let heading = if heading.length_squared() > 1e-8 {
        heading
    } else {
        let body_up = rotation * Vec3::Y;
        body_up - up * body_up.dot(up)
    };
    look_rotation(-up, heading).unwrap_or(rotation)
}

/// Advance every skydiver by one fixed tick.
pub fn drive_skydiver<B: AbilityPhysicsBackend>(world: &mut World) {
    let dt = B::get_fixed_timestep(world);

    let entities: Vec<Entity> = world
        .query_filtered::<Entity, With<Skydiver>>()
        .iter(world)
        .collect();

    for entity in entities {
        let Some(skydiver) = world.get::<Skydiver>(entity) else {
            continue;
        };
        let mut skydiver = skydiver.clone();
        let mut events: Vec<SkydiveEventKind> = Vec::new();

        if !skydiver.enabled
            && skydiver.orientation == SkydiveOrientation::Vertical
            && skydiver.task.is_none()
        {
            continue;
        }

        let gravity = world
            .get::<GravityContext>(entity)
            .copied()
            .unwrap_or_default();
        let up = gravity.up();
        let position = B::get_position(world, entity);
        let rotation = B::get_rotation(world, entity);
        let velocity = B::get_velocity(world, entity);

        if !skydiver.enabled {
            // Prone while disabled: force a rotation back upright, then the
            // next ticks skip this entity entirely.
            let already_returning = matches!(
                skydiver.task,
                Some(task) if task.goal == SkydiveOrientation::Vertical && task.always_complete
            );
            if !already_returning {
                skydiver.task = Some(RotationTask {
                    target: upright_target(rotation, up),
                    goal: SkydiveOrientation::Vertical,
                    always_complete: true,
                });
                claim_rotation(world, entity);
            }
        } else {
            // Re-checked every tick: a ground that closes in while the body
            // is still rotating prone replaces that task with a stand-up.
            let vertical_speed = gravity.vertical_component(velocity).abs();
            let angle_to_vertical = rotation.angle_between(upright_target(rotation, up));
            let min_distance = skydiver.min_ground_distance(vertical_speed, angle_to_vertical);
            let goal = skydiver
                .task
                .map_or(skydiver.orientation, |task| task.goal);

            match goal {
                SkydiveOrientation::Vertical => {
                    let clear = skydiver
                        .ground_distance
                        .map_or(true, |distance| distance > 2.0 * min_distance);
                    if skydiver.task.is_none() && clear && claim_rotation(world, entity) {
                        skydiver.task = Some(RotationTask {
                            target: horizontal_pose(rotation, up),
                            goal: SkydiveOrientation::Horizontal,
                            always_complete: false,
                        });
                    }
                }
                SkydiveOrientation::Horizontal => {
                    let close = skydiver
                        .ground_distance
                        .is_some_and(|distance| distance <= min_distance);
                    if close {
                        claim_rotation(world, entity);
                        skydiver.task = Some(RotationTask {
                            target: upright_target(rotation, up),
                            goal: SkydiveOrientation::Vertical,
                            always_complete: false,
                        });
                    }
                }
            }
        }

        if let Some(task) = skydiver.task {
            if skydiver.enabled || task.always_complete {
                let stepped = rotate_towards(rotation, task.target, skydiver.rotation_speed * dt);
                if stepped.angle_between(task.target) <= skydiver.rotation_tolerance {
                    B::move_rotation(world, entity, task.target);
                    skydiver.orientation = task.goal;
                    skydiver.task = None;
                    events.push(match task.goal {
                        SkydiveOrientation::Horizontal => SkydiveEventKind::RotatedHorizontal,
                        SkydiveOrientation::Vertical => {
                            release_rotation(world, entity);
                            SkydiveEventKind::RotatedVertical
                        }
                    });
                } else {
                    B::move_rotation(world, entity, stepped);
                }
            }
        } else if skydiver.enabled && skydiver.orientation == SkydiveOrientation::Horizontal {
            apply_lift::<B>(world, entity, &skydiver, position, rotation, velocity, up);
            align_heading::<B>(world, entity, &skydiver, rotation, velocity, up);
            apply_tilt::<B>(world, entity, &skydiver, rotation, up);
        }

        if let Some(mut component) = world.get_mut::<Skydiver>(entity) {
            *component = skydiver;
        }
        for kind in events {
            world.write_message(SkydiveEvent { entity, kind });
        }
    }
}

fn claim_rotation(world: &mut World, entity: Entity) -> bool {
    world
        .get_mut::<RotationAuthority>(entity)
        .map(|mut authority| authority.claim(RotationOwner::Skydiver))
        .unwrap_or(true)
}

fn release_rotation(world: &mut World, entity: Entity) {
    if let Some(mut authority) = world.get_mut::<RotationAuthority>(entity) {
        authority.release(RotationOwner::Skydiver);
    }
}

/// Lift opposes airspeed into the body's back and acts at the weighted
/// centroid of the lift points, so an uneven pose produces a righting
/// moment.
fn apply_lift<B: AbilityPhysicsBackend>(
    world: &mut World,
    entity: Entity,
    skydiver: &Skydiver,
    position: Vec3,
    rotation: Quat,
    velocity: Vec3,
    up: Vec3,
) {
    let lift_normal = rotation * Vec3::Z;
    let airspeed = (-velocity).dot(lift_normal);
    if airspeed <= 0.0 {
        return;
    }
    let lift = lift_normal * airspeed * (skydiver.base_lift + skydiver.added_lift);

    let mut total_weight = 0.0;
    let mut centroid = Vec3::ZERO;
    for point in &skydiver.lift_points {
        let direction = rotation * point.direction;
        let weight = point.weight * direction.dot(-up).max(0.0);
        total_weight += weight;
        centroid += (position + rotation * point.offset) * weight;
    }

    if total_weight > 1e-6 {
        B::apply_force_at_point(world, entity, lift, centroid / total_weight);
    } else {
        B::apply_force(world, entity, lift);
    }
}

/// Yaw the body's long axis towards the horizontal travel direction.
fn align_heading<B: AbilityPhysicsBackend>(
    world: &mut World,
    entity: Entity,
    skydiver: &Skydiver,
    rotation: Quat,
    velocity: Vec3,
    up: Vec3,
) {
    let horizontal = velocity - up * velocity.dot(up);
    if horizontal.length() < skydiver.heading_speed_threshold {
        return;
    }

    let body_axis = rotation * Vec3::Y;
    let heading = body_axis - up * body_axis.dot(up);
    let (Some(heading), Some(travel)) = (heading.try_normalize(), horizontal.try_normalize())
    else {
        return;
    };

    let angle = heading.angle_between(travel);
    if angle <= skydiver.heading_tolerance {
        return;
    }
    let sign = heading.cross(travel).dot(up).signum();
    B::apply_torque(world, entity, up * sign * skydiver.heading_torque * angle);
}

/// Pitch and bank from tilt input. Past the tilt limit the input stops
/// adding torque and instead bleeds off the angular velocity around the
/// tilt axes.
fn apply_tilt<B: AbilityPhysicsBackend>(
    world: &mut World,
    entity: Entity,
    skydiver: &Skydiver,
    rotation: Quat,
    up: Vec3,
) {
    let tilt = skydiver.tilt_input;
    if tilt == Vec2::ZERO {
        return;
    }

    let pitch_axis = rotation * Vec3::X;
    let bank_axis = rotation * Vec3::Y;
    let tilt_angle = (rotation * Vec3::Z).angle_between(up);

    if tilt_angle < skydiver.max_tilt_angle {
        let torque = pitch_axis * tilt.y * skydiver.tilt_torque
            + bank_axis * tilt.x * skydiver.tilt_torque;
        B::apply_torque(world, entity, torque);
    } else {
        let angular = B::get_angular_velocity(world, entity);
        let damped = angular
            - pitch_axis * angular.dot(pitch_axis)
            - bank_axis * angular.dot(bank_axis);
        B::set_angular_velocity(world, entity, damped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    #[test]
    fn threshold_collapses_to_floor_at_zero_speed() {
        let skydiver = Skydiver::new().with_min_ground_distance(5.0);
        assert_eq!(skydiver.min_ground_distance(0.0, PI), 5.0);
    }

    #[test]
    fn threshold_scales_with_fall_speed_and_misalignment() {
        let skydiver = Skydiver {
            rotation_speed: PI,
            min_ground_distance_floor: 5.0,
            ..Skydiver::default()
        };

        // Falling 20 m/s with a half-turn to go: one second of rotation,
        // twenty meters of clearance needed.
        let distance = skydiver.min_ground_distance(20.0, PI);
        assert!((distance - 20.0).abs() < 1e-4);

        // Sign of the vertical speed does not matter.
        assert_eq!(
            skydiver.min_ground_distance(-20.0, PI),
            skydiver.min_ground_distance(20.0, PI)
        );
    }

    #[test]
    fn probe_range_is_twice_the_threshold() {
        let skydiver = Skydiver {
            rotation_speed: PI,
            min_ground_distance_floor: 5.0,
            ..Skydiver::default()
        };
        // Upright and slow: threshold is the floor.
        let range = skydiver.probe_range(Quat::IDENTITY, Vec3::Y, Vec3::ZERO);
        assert!((range - 10.0).abs() < 1e-4);
    }

    #[test]
    fn horizontal_pose_faces_the_ground() {
        let pose = horizontal_pose(Quat::IDENTITY, Vec3::Y);

        let forward = pose * Vec3::NEG_Z;
        assert!((forward - Vec3::NEG_Y).length() < 1e-4, "chest down");

        // The body's long axis keeps the old heading.
        let body_axis = pose * Vec3::Y;
        assert!((body_axis - Vec3::NEG_Z).length() < 1e-4);

        // The back faces the sky: lift pushes up.
        let back = pose * Vec3::Z;
        assert!((back - Vec3::Y).length() < 1e-4);
    }

    #[test]
    fn horizontal_pose_handles_straight_down_look() {
        // Already looking at the ground: heading comes from the body's up.
        let looking_down = look_rotation(Vec3::NEG_Y, Vec3::X).unwrap();
        let pose = horizontal_pose(looking_down, Vec3::Y);

        let forward = pose * Vec3::NEG_Z;
        assert!((forward - Vec3::NEG_Y).length() < 1e-4);
    }

    #[test]
    fn added_lift_never_goes_negative() {
        let mut skydiver = Skydiver::new();
        skydiver.set_added_lift(-3.0);
        assert_eq!(skydiver.added_lift(), 0.0);

        skydiver.set_added_lift(1.5);
        assert_eq!(skydiver.added_lift(), 1.5);
    }

    #[test]
    fn default_lift_points_face_the_ground_when_prone() {
        let skydiver = Skydiver::default();
        assert_eq!(skydiver.lift_points.len(), 4);

        // In the prone pose the chest normals face the ground, so every
        // point carries full weight.
        let prone = horizontal_pose(Quat::IDENTITY, Vec3::Y);
        for point in &skydiver.lift_points {
            let direction = prone * point.direction;
            assert!(direction.dot(Vec3::NEG_Y) > 0.99);
        }
    }

    #[test]
    fn rotation_step_budget() {
        // A quarter turn at PI rad/s and 20 ms ticks is 25 ticks.
        let budget = PI * 0.02;
        let mut rotation = Quat::IDENTITY;
        let target = Quat::from_rotation_x(FRAC_PI_2);
        let mut ticks = 0;
        while rotation != target {
            rotation = rotate_towards(rotation, target, budget);
            ticks += 1;
            assert!(ticks <= 26, "convergence must not overshoot and oscillate");
        }
        assert!(ticks >= 25);
    }
}
