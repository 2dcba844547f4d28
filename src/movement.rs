//! Ground movement abilities: run, jump and look.
//!
//! These are thin force/impulse layers next to the aerial abilities. They
//! read the shared [`GroundContact`] written by the backend's ground sensor
//! and never fight the grapple or skydiver for rotation: the look controller
//! only yaws while the [`RotationAuthority`] is unclaimed.

use bevy::prelude::*;

use crate::backend::AbilityPhysicsBackend;
use crate::collision::GroundContact;
use crate::correction::RotationAuthority;
use crate::events::{MovementEvent, MovementEventKind};
use crate::gravity::GravityContext;

/// Horizontal locomotion forces.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct RunController {
    /// Drive force while grounded, in N.
    pub ground_force: f32,
    /// Drive force while airborne, in N.
    pub air_force: f32,
    /// Speed along the drive direction above which no more force is added,
    /// in m/s.
    pub max_speed: f32,
    /// Slope angle beyond which the ground refuses drive force, in rad.
    pub max_incline_angle: f32,

    enabled: bool,
    move_input: Vec2,
    was_moving: bool,
}

impl Default for RunController {
    fn default() -> Self {
        Self {
            ground_force: 40.0,
            air_force: 10.0,
            max_speed: 8.0,
            max_incline_angle: std::f32::consts::FRAC_PI_4,
            enabled: true,
            move_input: Vec2::ZERO,
            was_moving: false,
        }
    }
}

impl RunController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set ground and air drive forces.
    pub fn with_forces(mut self, ground: f32, air: f32) -> Self {
        self.ground_force = ground;
        self.air_force = air;
        self
    }

    /// Set the drive speed cap.
    pub fn with_max_speed(mut self, speed: f32) -> Self {
        self.max_speed = speed;
        self
    }

    /// Movement input: x strafes right, y moves forward.
    pub fn set_move_input(&mut self, input: Vec2) {
        self.move_input = input;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Advance run controllers by one fixed tick.
pub fn drive_run<B: AbilityPhysicsBackend>(world: &mut World) {
    let entities: Vec<Entity> = world
        .query_filtered::<Entity, With<RunController>>()
        .iter(world)
        .collect();

    for entity in entities {
        let Some(run) = world.get::<RunController>(entity) else {
            continue;
        };
        let mut run = run.clone();
        let mut events: Vec<MovementEventKind> = Vec::new();

        let moving = run.enabled && run.move_input != Vec2::ZERO;
        if moving != run.was_moving {
            events.push(if moving {
                MovementEventKind::StartedMoving
            } else {
                MovementEventKind::StoppedMoving
            });
            run.was_moving = moving;
        }

        if moving {
            let gravity = world
                .get::<GravityContext>(entity)
                .copied()
                .unwrap_or_default();
            let contact = world
                .get::<GroundContact>(entity)
                .copied()
                .unwrap_or_default();
            let rotation = B::get_rotation(world, entity);

            let local = Vec3::new(run.move_input.x, 0.0, -run.move_input.y);
            let direction = gravity
                .project_on_up_plane(rotation * local)
                .normalize_or_zero();

            let blocked =
                contact.grounded && contact.slope_angle(gravity.up()) > run.max_incline_angle;
            if direction != Vec3::ZERO && !blocked {
                let speed_along = B::get_velocity(world, entity).dot(direction);
                if speed_along < run.max_speed {
                    let force = if contact.grounded {
                        run.ground_force
                    } else {
                        run.air_force
                    };
                    B::apply_force(world, entity, direction * force);
                }
            }
        }

        if let Some(mut component) = world.get_mut::<RunController>(entity) {
            *component = run;
        }
        for kind in events {
            world.write_message(MovementEvent { entity, kind });
        }
    }
}

/// Charged jump with input buffering and coyote time.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct JumpController {
    /// Impulse at full charge, in N·s.
    pub jump_impulse: f32,
    /// Fraction of the impulse applied at zero charge.
    pub min_charge: f32,
    /// Seconds of held input to reach full charge.
    pub charge_time: f32,
    /// Seconds a released jump waits for the ground before expiring.
    pub buffer_time: f32,
    /// Seconds after leaving the ground during which a jump still fires.
    pub coyote_time: f32,

    enabled: bool,
    charging: bool,
    charge: f32,
    jump_requested: bool,
    buffer_timer: f32,
    coyote_timer: f32,
    was_grounded: bool,
}

impl Default for JumpController {
    fn default() -> Self {
        Self {
            jump_impulse: 8.0,
            min_charge: 0.4,
            charge_time: 0.8,
            buffer_time: 0.15,
            coyote_time: 0.1,
            enabled: true,
            charging: false,
            charge: 0.0,
            jump_requested: false,
            buffer_timer: 0.0,
            coyote_timer: 0.0,
            was_grounded: false,
        }
    }
}

impl JumpController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the full-charge impulse.
    pub fn with_impulse(mut self, impulse: f32) -> Self {
        self.jump_impulse = impulse;
        self
    }

    /// Set buffer and coyote windows.
    pub fn with_windows(mut self, buffer: f32, coyote: f32) -> Self {
        self.buffer_time = buffer;
        self.coyote_time = coyote;
        self
    }

    /// Start charging a jump.
    pub fn press(&mut self) {
        if self.enabled && !self.charging {
            self.charging = true;
            self.charge = 0.0;
        }
    }

    /// Release the jump input, requesting the jump itself.
    pub fn release(&mut self) {
        if self.charging {
            self.charging = false;
            self.jump_requested = true;
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.charging = false;
            self.jump_requested = false;
            self.buffer_timer = 0.0;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current charge fraction in `[0, 1]`.
    pub fn charge(&self) -> f32 {
        self.charge
    }

    pub fn is_charging(&self) -> bool {
        self.charging
    }

    /// Impulse magnitude for the current charge.
    fn strength(&self) -> f32 {
        self.jump_impulse * (self.min_charge + (1.0 - self.min_charge) * self.charge)
    }
}

/// Advance jump controllers by one fixed tick.
pub fn drive_jump<B: AbilityPhysicsBackend>(world: &mut World) {
    let dt = B::get_fixed_timestep(world);

    let entities: Vec<Entity> = world
        .query_filtered::<Entity, With<JumpController>>()
        .iter(world)
        .collect();

    for entity in entities {
        let Some(jump) = world.get::<JumpController>(entity) else {
            continue;
        };
        let mut jump = jump.clone();
        let mut events: Vec<MovementEventKind> = Vec::new();

        let grounded = world
            .get::<GroundContact>(entity)
            .map(|contact| contact.grounded)
            .unwrap_or(false);
        if grounded && !jump.was_grounded {
            events.push(MovementEventKind::Landed);
        }
        jump.was_grounded = grounded;

        if grounded {
            jump.coyote_timer = jump.coyote_time;
        } else {
            jump.coyote_timer = (jump.coyote_timer - dt).max(0.0);
        }

        if jump.enabled {
            if jump.charging {
                jump.charge = (jump.charge + dt / jump.charge_time.max(1e-6)).min(1.0);
                events.push(MovementEventKind::ChargingJump(jump.charge));
            }

            let mut fire = false;
            if jump.jump_requested {
                jump.jump_requested = false;
                if grounded || jump.coyote_timer > 0.0 {
                    fire = true;
                } else {
                    jump.buffer_timer = jump.buffer_time;
                }
            } else if jump.buffer_timer > 0.0 {
                if grounded {
                    fire = true;
                    jump.buffer_timer = 0.0;
                } else {
                    jump.buffer_timer -= dt;
                }
            }

            if fire {
                let up = world
                    .get::<GravityContext>(entity)
                    .copied()
                    .unwrap_or_default()
                    .up();
                B::apply_impulse(world, entity, up * jump.strength());
                jump.charge = 0.0;
                jump.coyote_timer = 0.0;
                events.push(MovementEventKind::Jumped);
            }
        }

        if let Some(mut component) = world.get_mut::<JumpController>(entity) {
            *component = jump;
        }
        for kind in events {
            world.write_message(MovementEvent { entity, kind });
        }
    }
}

/// Yaw-only look rotation, gated by the rotation authority.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct LookController {
    /// Radians of yaw per unit of input.
    pub sensitivity: f32,

    enabled: bool,
    yaw_input: f32,
}

impl Default for LookController {
    fn default() -> Self {
        Self {
            sensitivity: 1.0,
            enabled: true,
            yaw_input: 0.0,
        }
    }
}

impl LookController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sensitivity(mut self, sensitivity: f32) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    /// Accumulate yaw input for the next tick. Positive turns right.
    pub fn add_yaw(&mut self, delta: f32) {
        self.yaw_input += delta;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.yaw_input = 0.0;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Apply accumulated yaw. Runs after the grapple and skydiver so a claimed
/// rotation authority wins the tick.
pub fn drive_look<B: AbilityPhysicsBackend>(world: &mut World) {
    let entities: Vec<Entity> = world
        .query_filtered::<Entity, With<LookController>>()
        .iter(world)
        .collect();

    for entity in entities {
        let Some(look) = world.get::<LookController>(entity) else {
            continue;
        };
        let mut look = look.clone();
        let yaw = std::mem::take(&mut look.yaw_input);

        let free = world
            .get::<RotationAuthority>(entity)
            .map(|authority| authority.is_free())
            .unwrap_or(true);

        if look.enabled && free && yaw != 0.0 {
            let up = world
                .get::<GravityContext>(entity)
                .copied()
                .unwrap_or_default()
                .up();
            let rotation = B::get_rotation(world, entity);
            let turned = Quat::from_axis_angle(up, -yaw * look.sensitivity) * rotation;
            B::move_rotation(world, entity, turned);
        }

        if let Some(mut component) = world.get_mut::<LookController>(entity) {
            *component = look;
        }
    }
}
