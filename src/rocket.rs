//! Rocket jump launcher and in-flight rockets.
//!
//! The launcher fires from a fixed-size clip with a minimum interval between
//! shots. A shot is refused while grounded (when configured), with an empty
//! clip, or inside the interval; it is blocked when an obstacle sits in the
//! clearance volume around the muzzle. Spawned rockets inherit the body's
//! velocity plus a forward boost.
//!
//! A rocket detonates on impact or at the end of its lifetime and then
//! pushes nearby bodies away for `explosion_duration` seconds with linear
//! distance falloff; the push origin is shifted down by `upwards_modifier`
//! so blasts toss bodies upward.

use bevy::log::warn;
use bevy::prelude::*;

use crate::backend::AbilityPhysicsBackend;
use crate::collision::GroundContact;
use crate::events::{
    RocketEvent, RocketEventKind, RocketJumpEvent, RocketJumpEventKind,
};
use crate::gravity::GravityContext;

/// An in-flight (or exploding) rocket.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct Rocket {
    /// Blast radius in m.
    pub explosion_radius: f32,
    /// Push force at the blast center, in N.
    pub explosion_force: f32,
    /// Seconds the blast keeps pushing.
    pub explosion_duration: f32,
    /// Downward shift of the push origin, lifting blast victims.
    pub upwards_modifier: f32,
    /// Seconds of flight before self-detonation.
    pub lifetime: f32,
    /// Radius of the rocket's collider.
    pub collider_radius: f32,

    age: f32,
    exploding: Option<f32>,
    /// Set by the backend when the rocket touches anything.
    pub(crate) impacted: bool,
    /// Bodies inside the blast radius this tick, written by the backend
    /// while exploding.
    pub(crate) blast_victims: Vec<Entity>,
    /// Muzzle velocity, consumed by the backend when it attaches the body.
    pub(crate) initial_velocity: Vec3,
}

impl Default for Rocket {
    fn default() -> Self {
        Self {
            explosion_radius: 5.0,
            explosion_force: 60.0,
            explosion_duration: 0.25,
            upwards_modifier: 1.0,
            lifetime: 4.0,
            collider_radius: 0.12,
            age: 0.0,
            exploding: None,
            impacted: false,
            blast_victims: Vec::new(),
            initial_velocity: Vec3::ZERO,
        }
    }
}

impl Rocket {
    /// Whether the blast is running.
    pub fn is_exploding(&self) -> bool {
        self.exploding.is_some()
    }

    /// Velocity the rocket left the muzzle with. Backends hand this to the
    /// body they attach.
    pub fn muzzle_velocity(&self) -> Vec3 {
        self.initial_velocity
    }

    /// Backend sensor input: the rocket touched something.
    pub fn mark_impacted(&mut self) {
        self.impacted = true;
    }

    /// Backend sensor input: bodies inside the blast radius this tick.
    pub fn set_blast_victims(&mut self, victims: Vec<Entity>) {
        self.blast_victims = victims;
    }

    /// Blast force on a victim at `victim_position`, with the push origin
    /// shifted down by the upwards modifier and linear falloff by the true
    /// distance from the rocket.
    fn blast_force(&self, rocket_position: Vec3, victim_position: Vec3, up: Vec3) -> Vec3 {
        let distance = rocket_position.distance(victim_position);
        let falloff = (1.0 - distance / self.explosion_radius).clamp(0.0, 1.0);
        let origin = rocket_position - up * self.upwards_modifier;
        let direction = (victim_position - origin).normalize_or_zero();
        direction * self.explosion_force * falloff
    }
}

/// Rocket launcher with clip and interval bookkeeping.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct RocketJumpController {
    /// Rockets per clip.
    pub clip_size: u32,
    /// Minimum seconds between shots.
    pub fire_interval: f32,
    /// Forward boost added to the inherited body velocity, in m/s.
    pub rocket_speed: f32,
    /// Muzzle position, local to the body.
    pub launch_offset: Vec3,
    /// Radius of the obstacle clearance check around the muzzle.
    pub clearance_radius: f32,
    /// Refuse shots while standing on the ground.
    pub require_airborne: bool,
    /// Template for spawned rockets.
    pub rocket: Rocket,

    enabled: bool,
    rockets_left: u32,
    interval_timer: f32,
    fire_requested: bool,
    reload_requested: bool,
    /// Set by the backend when the clearance volume is occupied.
    pub(crate) obstructed: bool,
}

impl Default for RocketJumpController {
    fn default() -> Self {
        Self {
            clip_size: 3,
            fire_interval: 0.5,
            rocket_speed: 25.0,
            launch_offset: Vec3::new(0.0, -0.5, -0.6),
            clearance_radius: 0.3,
            require_airborne: true,
            rocket: Rocket::default(),
            enabled: true,
            rockets_left: 3,
            interval_timer: 0.0,
            fire_requested: false,
            reload_requested: false,
            obstructed: false,
        }
    }
}

impl RocketJumpController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the clip size and fill the clip.
    pub fn with_clip_size(mut self, size: u32) -> Self {
        self.clip_size = size;
        self.rockets_left = size;
        self
    }

    /// Set the minimum interval between shots.
    pub fn with_fire_interval(mut self, interval: f32) -> Self {
        self.fire_interval = interval;
        self
    }

    /// Request a shot. Resolved on the next fixed tick.
    pub fn fire(&mut self) {
        if !self.enabled {
            warn!("rocket fire requested while disabled");
            return;
        }
        self.fire_requested = true;
    }

    /// Request a clip refill.
    pub fn reload(&mut self) {
        self.reload_requested = true;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.fire_requested = false;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Rockets remaining in the clip.
    pub fn rockets_left(&self) -> u32 {
        self.rockets_left
    }

    /// Clip fill fraction in `[0, 1]`.
    pub fn clip_fraction(&self) -> f32 {
        if self.clip_size == 0 {
            return 0.0;
        }
        self.rockets_left as f32 / self.clip_size as f32
    }

    /// Whether the launch clearance volume needs checking this tick.
    pub fn wants_clearance_check(&self) -> bool {
        self.enabled && self.fire_requested
    }

    /// Backend sensor input: whether the clearance volume is occupied.
    pub fn set_obstructed(&mut self, obstructed: bool) {
        self.obstructed = obstructed;
    }
}

/// Resolve launcher requests, spawning rockets.
pub fn drive_rocket_jump<B: AbilityPhysicsBackend>(world: &mut World) {
    let dt = B::get_fixed_timestep(world);

    let entities: Vec<Entity> = world
        .query_filtered::<Entity, With<RocketJumpController>>()
        .iter(world)
        .collect();

    for entity in entities {
        let Some(launcher) = world.get::<RocketJumpController>(entity) else {
            continue;
        };
        let mut launcher = launcher.clone();
        let mut events: Vec<RocketJumpEventKind> = Vec::new();

        launcher.interval_timer = (launcher.interval_timer - dt).max(0.0);

        if launcher.reload_requested {
            launcher.reload_requested = false;
            launcher.rockets_left = launcher.clip_size;
            events.push(RocketJumpEventKind::Reloaded);
        }

        if launcher.fire_requested && launcher.enabled {
            launcher.fire_requested = false;

            let grounded = world
                .get::<GroundContact>(entity)
                .map(|contact| contact.grounded)
                .unwrap_or(false);

            if launcher.rockets_left == 0
                || launcher.interval_timer > 0.0
                || (launcher.require_airborne && grounded)
            {
                events.push(RocketJumpEventKind::LaunchFailed);
            } else if launcher.obstructed {
                events.push(RocketJumpEventKind::LaunchBlocked);
            } else {
                let position = B::get_position(world, entity);
                let rotation = B::get_rotation(world, entity);
                let velocity = B::get_velocity(world, entity);

                let muzzle = position + rotation * launcher.launch_offset;
                let forward = rotation * Vec3::NEG_Z;
                let mut rocket = launcher.rocket.clone();
                rocket.initial_velocity = velocity + forward * launcher.rocket_speed;

                world.spawn((
                    rocket,
                    Transform::from_translation(muzzle).with_rotation(rotation),
                ));

                launcher.rockets_left -= 1;
                launcher.interval_timer = launcher.fire_interval;
                events.push(RocketJumpEventKind::Launched);
                if launcher.rockets_left == 0 {
                    events.push(RocketJumpEventKind::LastRocket);
                }
            }
        }
        launcher.fire_requested = false;

        if let Some(mut component) = world.get_mut::<RocketJumpController>(entity) {
            *component = launcher;
        }
        for kind in events {
            world.write_message(RocketJumpEvent { entity, kind });
        }
    }
}

/// Age rockets, detonate them and run their blasts.
pub fn drive_rockets<B: AbilityPhysicsBackend>(world: &mut World) {
    let dt = B::get_fixed_timestep(world);

    let entities: Vec<Entity> = world
        .query_filtered::<Entity, With<Rocket>>()
        .iter(world)
        .collect();

    for entity in entities {
        let Some(rocket) = world.get::<Rocket>(entity) else {
            continue;
        };
        let mut rocket = rocket.clone();
        let position = B::get_position(world, entity);
        let up = world
            .get::<GravityContext>(entity)
            .copied()
            .unwrap_or_default()
            .up();

        rocket.age += dt;

        if rocket.exploding.is_none() && (rocket.impacted || rocket.age >= rocket.lifetime) {
            rocket.exploding = Some(rocket.explosion_duration);
            B::set_velocity(world, entity, Vec3::ZERO);
            world.write_message(RocketEvent {
                rocket: entity,
                kind: RocketEventKind::Exploded { position },
            });
        }

        if let Some(remaining) = rocket.exploding {
            let victims = std::mem::take(&mut rocket.blast_victims);
            for victim in victims {
                if victim == entity {
                    continue;
                }
                let victim_position = B::get_position(world, victim);
                let force = rocket.blast_force(position, victim_position, up);
                B::apply_force(world, victim, force);
            }

            let remaining = remaining - dt;
            if remaining <= 0.0 {
                world.despawn(entity);
                continue;
            }
            rocket.exploding = Some(remaining);
        }

        if let Some(mut component) = world.get_mut::<Rocket>(entity) {
            *component = rocket;
        }
    }
}
