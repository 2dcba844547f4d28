//! Grapple hook controller.
//!
//! The grapple is a four-phase state machine advanced once per fixed tick:
//!
//! - `Idle`: nothing in flight. The backend keeps a pre-aim probe fresh so
//!   the launch direction can bend towards whatever the aim ray would hit.
//! - `Launching`: the rope tip flies in a straight line at `launch_speed`,
//!   swept segment by segment by the backend. Paying out more than
//!   `rope_length` from the launch point, or releasing the input mid-flight,
//!   retracts the rope.
//! - `ReelingTo`: the tip is attached; a spring-like pull acts on the body
//!   at its anchor and the equal and opposite reaction acts on the target.
//!   This phase is ended by input alone, never by distance.
//! - `ReelingIn`: the tip travels back to the anchor under constant
//!   acceleration; arrival snaps the body to its corrected orientation and
//!   returns to `Idle`.
//!
//! While reeling, the body is steered towards an upright pose that keeps
//! its heading, with an angle-capped step per tick (see
//! [`crate::correction`]).

use bevy::log::warn;
use bevy::prelude::*;

use crate::backend::AbilityPhysicsBackend;
use crate::collision::CastHit;
use crate::correction::{
    correction_bias, rotate_towards, upright_target, RotationAuthority, RotationOwner,
};
use crate::events::{GrappleEvent, GrappleEventKind};
use crate::gravity::GravityContext;

/// Phase of the grapple state machine.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GrapplePhase {
    #[default]
    Idle,
    Launching,
    ReelingTo,
    ReelingIn,
}

/// What the rope tip is attached to.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct GrappleTarget {
    /// Hit rigid body, `None` for a fixed world point.
    pub entity: Option<Entity>,
    /// Attachment point, local to the target body (world-space when
    /// `entity` is `None`).
    pub point: Vec3,
}

/// Grapple hook state machine and tuning.
///
/// Intent methods (`launch`, `release`, `set_aim`) only record the request;
/// the drive system advances the machine on the next fixed tick.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct GrappleController {
    /// Maximum rope extension in meters.
    pub rope_length: f32,
    /// Rope tip flight speed in m/s.
    pub launch_speed: f32,
    /// Pull strength in N per meter of rope between anchor and tip.
    pub reel_force: f32,
    /// Virtual mass of the hook, sets the reel-in acceleration
    /// (`reel_force / grapple_mass`).
    pub grapple_mass: f32,
    /// Constant upward assist while reeling to a target, in N.
    pub up_bias_force: f32,
    /// Angular budget for rotation correction in rad/s.
    pub correction_speed: f32,
    /// Correction bias at zero misalignment, in `[0, 1]`.
    pub min_correction_bias: f32,
    /// Radius of the swept sphere for tip collision.
    pub cast_radius: f32,
    /// Back-off applied to each sweep so grazing contacts are not skipped.
    pub cast_skin: f32,
    /// Rope anchor point, local to the body.
    pub anchor_offset: Vec3,

    enabled: bool,
    hold_input: bool,
    aim_origin: Vec3,
    aim_direction: Vec3,

    phase: GrapplePhase,
    needs_init: bool,
    rope_tip: Vec3,
    /// Where the tip started flying. Over-extension is measured against this
    /// point, not the moving anchor.
    rope_start: Vec3,
    launch_direction: Vec3,
    reel_speed: f32,
    target: Option<GrappleTarget>,
    anchor_world: Vec3,

    /// Pre-aim probe hit point along the aim ray, written by the backend.
    pub(crate) aim_probe: Option<Vec3>,
    /// Tip sweep result for this tick, written by the backend.
    pub(crate) launch_hit: Option<CastHit>,
}

impl Default for GrappleController {
    fn default() -> Self {
        Self {
            rope_length: 30.0,
            launch_speed: 60.0,
            reel_force: 40.0,
            grapple_mass: 1.0,
            up_bias_force: 0.0,
            correction_speed: std::f32::consts::PI,
            min_correction_bias: 0.2,
            cast_radius: 0.15,
            cast_skin: 0.05,
            anchor_offset: Vec3::ZERO,
            enabled: true,
            hold_input: false,
            aim_origin: Vec3::ZERO,
            aim_direction: Vec3::NEG_Z,
            phase: GrapplePhase::Idle,
            needs_init: false,
            rope_tip: Vec3::ZERO,
            rope_start: Vec3::ZERO,
            launch_direction: Vec3::NEG_Z,
            reel_speed: 0.0,
            target: None,
            anchor_world: Vec3::ZERO,
            aim_probe: None,
            launch_hit: None,
        }
    }
}

impl GrappleController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum rope extension.
    pub fn with_rope_length(mut self, length: f32) -> Self {
        self.rope_length = length;
        self
    }

    /// Set the tip flight speed.
    pub fn with_launch_speed(mut self, speed: f32) -> Self {
        self.launch_speed = speed;
        self
    }

    /// Set pull strength and virtual hook mass.
    pub fn with_reel(mut self, force: f32, grapple_mass: f32) -> Self {
        self.reel_force = force;
        self.grapple_mass = grapple_mass;
        self
    }

    /// Set the local anchor point of the rope.
    pub fn with_anchor_offset(mut self, offset: Vec3) -> Self {
        self.anchor_offset = offset;
        self
    }

    /// Request a launch. No-op while a cycle is already running.
    pub fn launch(&mut self) {
        if !self.enabled {
            warn!("grapple launch requested while disabled");
            return;
        }
        if self.phase != GrapplePhase::Idle {
            return;
        }
        self.hold_input = true;
        self.phase = GrapplePhase::Launching;
        self.needs_init = true;
    }

    /// Release the hold input. Warns when no cycle is running.
    pub fn release(&mut self) {
        if self.phase == GrapplePhase::Idle {
            warn!("grapple release requested with no rope in flight");
            return;
        }
        self.hold_input = false;
    }

    /// Update the aim ray (camera origin and facing).
    pub fn set_aim(&mut self, origin: Vec3, direction: Vec3) {
        self.aim_origin = origin;
        if let Some(direction) = direction.try_normalize() {
            self.aim_direction = direction;
        }
    }

    /// Enable or disable the grapple. Disabling suspends the current phase
    /// without clearing it; enabling resumes where it stopped.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn phase(&self) -> GrapplePhase {
        self.phase
    }

    /// Whether a grapple cycle is running.
    pub fn is_grappling(&self) -> bool {
        self.phase != GrapplePhase::Idle
    }

    /// Current world position of the rope tip.
    pub fn rope_tip(&self) -> Vec3 {
        self.rope_tip
    }

    /// Current attachment, if the tip is hooked.
    pub fn target(&self) -> Option<GrappleTarget> {
        self.target
    }

    /// Fraction of the rope paid out, clamped to `[0, 1]`. Zero while idle.
    /// While launching the payout is measured from the launch point.
    pub fn rope_usage(&self) -> f32 {
        let origin = match self.phase {
            GrapplePhase::Idle => return 0.0,
            GrapplePhase::Launching => self.rope_start,
            _ => self.anchor_world,
        };
        (origin.distance(self.rope_tip) / self.rope_length).clamp(0.0, 1.0)
    }

    /// Predicted end point of a launch from the current aim: the pre-aim
    /// probe hit when there is one, otherwise full rope extension along the
    /// aim ray.
    pub fn launch_end_point(&self) -> Vec3 {
        self.aim_probe
            .unwrap_or(self.aim_origin + self.aim_direction * self.rope_length)
    }

    /// What the pre-aim probe currently sees.
    pub fn aim_target(&self) -> Option<Vec3> {
        self.aim_probe
    }

    /// The aim ray as last set: origin and normalized direction.
    pub fn aim_ray(&self) -> (Vec3, Vec3) {
        (self.aim_origin, self.aim_direction)
    }

    /// Whether the launch ray still needs resolving this tick.
    pub fn pending_launch(&self) -> bool {
        self.needs_init
    }

    /// Backend sensor input: what the pre-aim probe hit along the aim ray.
    pub fn set_aim_probe(&mut self, probe: Option<Vec3>) {
        self.aim_probe = probe;
    }

    /// Backend sensor input: the tip sweep result for this tick.
    pub fn set_launch_hit(&mut self, hit: Option<CastHit>) {
        self.launch_hit = hit;
    }

    /// Launch ray for the initial tick.
    ///
    /// The origin is the aim origin shifted along the aim axis so it sits
    /// abreast of the rope anchor; the direction bends towards the pre-aim
    /// probe point when there is one.
    pub(crate) fn launch_ray(&self, anchor: Vec3) -> (Vec3, Vec3) {
        let along = (anchor - self.aim_origin).dot(self.aim_direction);
        let origin = self.aim_origin + self.aim_direction * along;
        let direction = self
            .aim_probe
            .and_then(|probe| (probe - origin).try_normalize())
            .unwrap_or(self.aim_direction);
        (origin, direction)
    }

    /// Sweep segment for this tick's tip flight: origin (backed off by the
    /// skin), direction and length. `None` unless launching. Backends cast
    /// this segment and report the result through [`Self::set_launch_hit`].
    pub fn sweep_segment(&self, anchor: Vec3, dt: f32) -> Option<(Vec3, Vec3, f32)> {
        if self.phase != GrapplePhase::Launching {
            return None;
        }
        let (tip, direction) = if self.needs_init {
            let (origin, direction) = self.launch_ray(anchor);
            (origin, direction)
        } else {
            (self.rope_tip, self.launch_direction)
        };
        let origin = tip - direction * self.cast_skin;
        Some((origin, direction, self.cast_skin + self.launch_speed * dt))
    }
}

/// Move a point towards a destination by at most `max_delta`, landing on the
/// destination exactly once within range.
pub(crate) fn move_towards(from: Vec3, to: Vec3, max_delta: f32) -> Vec3 {
    let delta = to - from;
    let distance = delta.length();
    if distance <= max_delta || distance < 1e-6 {
        to
    } else {
        from + delta * (max_delta / distance)
    }
}

/// Advance every grapple controller by one fixed tick.
pub fn drive_grapple<B: AbilityPhysicsBackend>(world: &mut World) {
    let dt = B::get_fixed_timestep(world);

    let entities: Vec<Entity> = world
        .query_filtered::<Entity, With<GrappleController>>()
        .iter(world)
        .collect();

    for entity in entities {
        let Some(controller) = world.get::<GrappleController>(entity) else {
            continue;
        };
        if !controller.enabled {
            continue;
        }
        let mut grapple = controller.clone();
        let mut events: Vec<GrappleEventKind> = Vec::new();

        let up = world
            .get::<GravityContext>(entity)
            .copied()
            .unwrap_or_default()
            .up();
        let position = B::get_position(world, entity);
        let rotation = B::get_rotation(world, entity);
        let anchor = position + rotation * grapple.anchor_offset;
        grapple.anchor_world = anchor;

        match grapple.phase {
            GrapplePhase::Idle => {}
            GrapplePhase::Launching => {
                if grapple.needs_init {
                    let (origin, direction) = grapple.launch_ray(anchor);
                    grapple.rope_start = origin;
                    grapple.rope_tip = origin;
                    grapple.launch_direction = direction;
                    grapple.needs_init = false;
                    events.push(GrappleEventKind::Launched);
                }

                if !grapple.hold_input {
                    // Released mid-flight: the rope comes back like a miss.
                    grapple.phase = GrapplePhase::ReelingIn;
                    grapple.reel_speed = 0.0;
                    grapple.launch_hit = None;
                } else if let Some(hit) = grapple.launch_hit.take() {
                    grapple.rope_tip = hit.point;
                    grapple.target = Some(attach_target::<B>(world, hit));
                    grapple.phase = GrapplePhase::ReelingTo;
                    if let Some(mut authority) = world.get_mut::<RotationAuthority>(entity) {
                        authority.claim(RotationOwner::Grapple);
                    }
                    events.push(GrappleEventKind::Hit {
                        target: hit.entity,
                        point: hit.point,
                    });
                } else {
                    grapple.rope_tip += grapple.launch_direction * grapple.launch_speed * dt;
                    if grapple.rope_tip.distance(grapple.rope_start) > grapple.rope_length {
                        grapple.phase = GrapplePhase::ReelingIn;
                        grapple.reel_speed = 0.0;
                    }
                }
            }
            GrapplePhase::ReelingTo => {
                grapple.launch_hit = None;
                let attachment = grapple.target.and_then(|target| match target.entity {
                    Some(body) => {
                        let transform = world.get::<Transform>(body)?;
                        Some(transform.translation + transform.rotation * target.point)
                    }
                    None => Some(target.point),
                });

                match attachment {
                    None => {
                        // Target despawned: retract from the last known tip.
                        grapple.target = None;
                        grapple.phase = GrapplePhase::ReelingIn;
                        grapple.reel_speed = 0.0;
                    }
                    Some(tip) => {
                        grapple.rope_tip = tip;
                        if !grapple.hold_input {
                            grapple.target = None;
                            grapple.phase = GrapplePhase::ReelingIn;
                            grapple.reel_speed = 0.0;
                            events.push(GrappleEventKind::Released);
                        } else {
                            let pull = (tip - anchor) * grapple.reel_force;
                            B::apply_force_at_point(world, entity, pull, anchor);
                            if grapple.up_bias_force > 0.0 {
                                B::apply_force(world, entity, up * grapple.up_bias_force);
                            }
                            if let Some(target) = grapple.target.and_then(|t| t.entity) {
                                B::apply_force_at_point(world, target, -pull, tip);
                            }
                            correct_rotation::<B>(world, entity, &grapple, up, dt, false);
                        }
                    }
                }
            }
            GrapplePhase::ReelingIn => {
                grapple.launch_hit = None;
                grapple.reel_speed += grapple.reel_force / grapple.grapple_mass * dt;
                grapple.rope_tip = move_towards(grapple.rope_tip, anchor, grapple.reel_speed * dt);

                let arrived = grapple.rope_tip == anchor;
                correct_rotation::<B>(world, entity, &grapple, up, dt, arrived);

                if arrived {
                    grapple.phase = GrapplePhase::Idle;
                    grapple.reel_speed = 0.0;
                    grapple.target = None;
                    grapple.hold_input = false;
                    if let Some(mut authority) = world.get_mut::<RotationAuthority>(entity) {
                        authority.release(RotationOwner::Grapple);
                    }
                    events.push(GrappleEventKind::ReelComplete);
                }
            }
        }

        if let Some(mut controller) = world.get_mut::<GrappleController>(entity) {
            *controller = grapple;
        }
        for kind in events {
            world.write_message(GrappleEvent { entity, kind });
        }
    }
}

/// Build the attachment record for a tip hit. Bodies with a transform are
/// tracked in their local space; anything else pins the tip to the world.
fn attach_target<B: AbilityPhysicsBackend>(world: &World, hit: CastHit) -> GrappleTarget {
    match hit.entity {
        Some(body) if world.get::<Transform>(body).is_some() => {
            let rotation = B::get_rotation(world, body);
            let position = B::get_position(world, body);
            GrappleTarget {
                entity: Some(body),
                point: rotation.inverse() * (hit.point - position),
            }
        }
        _ => GrappleTarget {
            entity: None,
            point: hit.point,
        },
    }
}

/// Step the body towards an upright pose that keeps its current heading.
///
/// The per-tick budget is `correction_speed * dt` scaled by the misalignment
/// bias; `snap` forces the remaining angle to zero (reel-in completion).
fn correct_rotation<B: AbilityPhysicsBackend>(
    world: &mut World,
    entity: Entity,
    grapple: &GrappleController,
    up: Vec3,
    dt: f32,
    snap: bool,
) {
    let owns_rotation = world
        .get_mut::<RotationAuthority>(entity)
        .map(|mut authority| authority.claim(RotationOwner::Grapple))
        .unwrap_or(true);
    if !owns_rotation {
        return;
    }

    let rotation = B::get_rotation(world, entity);
    let target = upright_target(rotation, up);

    let corrected = if snap {
        target
    } else {
        let misalignment = rotation.angle_between(target);
        let bias = correction_bias(misalignment, grapple.min_correction_bias);
        rotate_towards(rotation, target, grapple.correction_speed * dt * bias)
    };
    B::move_rotation(world, entity, corrected);
}
