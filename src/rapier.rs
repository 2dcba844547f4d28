//! Rapier3D physics backend implementation.
//!
//! This module provides the physics backend for Bevy Rapier3D.
//! Enable with the `rapier3d` feature.
//!
//! Besides the rigid-body proxy, the backend plugin contributes the sensor
//! systems the abilities depend on (grapple sweeps, ground probes, blast
//! scans, vehicle probes) and the force bookkeeping that routes the
//! [`ForceAccumulator`] into Rapier's `ExternalForce`.

use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

use crate::backend::{AbilityPhysicsBackend, ForceAccumulator};
use crate::collision::{CastHit, GroundContact};
use crate::correction::RotationAuthority;
use crate::gravity::GravityContext;
use crate::grapple::{GrappleController, GrapplePhase};
use crate::rocket::{Rocket, RocketJumpController};
use crate::skydive::Skydiver;
use crate::vehicle::{PassengerController, Vehicle};
use crate::AbilitySet;

/// Extra reach below the collider bottom that still counts as ground
/// contact.
const GROUND_CONTACT_MARGIN: f32 = 0.15;

/// Rapier3D physics backend for the ability controllers.
///
/// Force and torque application goes through the [`ForceAccumulator`];
/// spatial queries are handled by dedicated Rapier systems that receive
/// `RapierContext` as a system parameter.
pub struct Rapier3dBackend;

impl AbilityPhysicsBackend for Rapier3dBackend {
    fn plugin() -> impl Plugin {
        Rapier3dBackendPlugin
    }

    fn get_position(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<Transform>(entity)
            .map(|t| t.translation)
            .or_else(|| {
                world
                    .get::<GlobalTransform>(entity)
                    .map(|t| t.translation())
            })
            .unwrap_or(Vec3::ZERO)
    }

    fn set_position(world: &mut World, entity: Entity, position: Vec3) {
        if let Some(mut transform) = world.get_mut::<Transform>(entity) {
            transform.translation = position;
        }
    }

    fn get_rotation(world: &World, entity: Entity) -> Quat {
        world
            .get::<Transform>(entity)
            .map(|t| t.rotation)
            .or_else(|| {
                world
                    .get::<GlobalTransform>(entity)
                    .map(|t| t.to_scale_rotation_translation().1)
            })
            .unwrap_or(Quat::IDENTITY)
    }

    fn move_rotation(world: &mut World, entity: Entity, rotation: Quat) {
        if let Some(mut transform) = world.get_mut::<Transform>(entity) {
            transform.rotation = rotation;
        }
    }

    fn get_velocity(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<Velocity>(entity)
            .map(|v| v.linvel)
            .unwrap_or(Vec3::ZERO)
    }

    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3) {
        if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
            vel.linvel = velocity;
        }
    }

    fn get_angular_velocity(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<Velocity>(entity)
            .map(|v| v.angvel)
            .unwrap_or(Vec3::ZERO)
    }

    fn set_angular_velocity(world: &mut World, entity: Entity, angular: Vec3) {
        if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
            vel.angvel = angular;
        }
    }

    fn apply_impulse(world: &mut World, entity: Entity, impulse: Vec3) {
        if let Some(mut ext_impulse) = world.get_mut::<ExternalImpulse>(entity) {
            ext_impulse.impulse += impulse;
        } else if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
            // Fallback: apply as velocity change if no ExternalImpulse component
            vel.linvel += impulse;
        }
    }

    fn set_rotation_locked(world: &mut World, entity: Entity, locked: bool) {
        let axes = if locked {
            LockedAxes::ROTATION_LOCKED
        } else {
            LockedAxes::empty()
        };
        if let Ok(mut entity) = world.get_entity_mut(entity) {
            entity.insert(axes);
        }
    }

    fn set_kinematic(world: &mut World, entity: Entity, kinematic: bool) {
        let body = if kinematic {
            RigidBody::KinematicPositionBased
        } else {
            RigidBody::Dynamic
        };
        if let Ok(mut entity) = world.get_entity_mut(entity) {
            entity.insert(body);
        }
    }

    fn get_mass(world: &World, entity: Entity) -> f32 {
        world
            .get::<ReadMassProperties>(entity)
            .map(|props| props.mass)
            .filter(|mass| *mass > 0.0 && mass.is_finite())
            .unwrap_or(1.0)
    }

    fn get_center_of_mass(world: &World, entity: Entity) -> Vec3 {
        let local = world
            .get::<ReadMassProperties>(entity)
            .map(|props| props.local_center_of_mass)
            .unwrap_or(Vec3::ZERO);
        Self::get_position(world, entity) + Self::get_rotation(world, entity) * local
    }

    fn get_fixed_timestep(world: &World) -> f32 {
        world
            .get_resource::<Time<Fixed>>()
            .map(|t| t.delta_secs())
            .filter(|&d| d > 0.0)
            .unwrap_or(1.0 / 60.0)
    }
}

/// Plugin that sets up Rapier3D-specific systems for the abilities.
pub struct Rapier3dBackendPlugin;

impl Plugin for Rapier3dBackendPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            FixedUpdate,
            prepare_accumulated_forces.in_set(AbilitySet::Preparation),
        );

        app.add_systems(
            FixedUpdate,
            (
                rapier_ground_contact,
                rapier_grapple_sensors,
                rapier_skydiver_ground_probe,
                rapier_rocket_clearance,
                rapier_passenger_probe,
                (attach_rocket_bodies, rapier_rocket_impacts, rapier_blast_scan).chain(),
            )
                .in_set(AbilitySet::Sensors),
        );

        app.add_systems(
            FixedUpdate,
            apply_accumulated_forces.in_set(AbilitySet::Sync),
        );
    }
}

/// Start of tick: subtract the forces applied last tick from
/// `ExternalForce`, restoring it to the external-only state.
pub fn prepare_accumulated_forces(
    mut bodies: Query<(&mut ExternalForce, &mut ForceAccumulator)>,
) {
    for (mut ext_force, mut accumulator) in &mut bodies {
        let (force, torque) = accumulator.prepare_new_frame();
        ext_force.force -= force;
        ext_force.torque -= torque;
    }
}

/// End of tick: add this tick's accumulated forces to `ExternalForce` and
/// remember them for the next subtraction.
pub fn apply_accumulated_forces(
    mut bodies: Query<(&mut ExternalForce, &mut ForceAccumulator)>,
) {
    for (mut ext_force, mut accumulator) in &mut bodies {
        let (force, torque) = accumulator.finalize_frame();
        ext_force.force += force;
        ext_force.torque += torque;
    }
}

fn exclude_self(entity: Entity) -> QueryFilter<'static> {
    QueryFilter::default()
        .exclude_rigid_body(entity)
        .exclude_sensors()
}

fn cast_options(max_distance: f32) -> ShapeCastOptions {
    ShapeCastOptions {
        max_time_of_impact: max_distance,
        stop_at_penetration: false,
        ..default()
    }
}

/// Get the distance from collider center to bottom for a given collider.
fn collider_bottom_offset(collider: &Collider) -> f32 {
    if let Some(capsule) = collider.as_capsule() {
        let segment = capsule.segment();
        let half_height = (segment.a().y - segment.b().y).abs() / 2.0;
        half_height + capsule.radius()
    } else if let Some(ball) = collider.as_ball() {
        ball.radius()
    } else if let Some(cuboid) = collider.as_cuboid() {
        cuboid.half_extents().y
    } else {
        0.0
    }
}

/// Short downward sweep shared by the run, jump and rocket controllers.
fn rapier_ground_contact(
    rapier_context: ReadRapierContext,
    mut bodies: Query<(
        Entity,
        &GlobalTransform,
        Option<&GravityContext>,
        Option<&Collider>,
        &mut GroundContact,
    )>,
) {
    let Ok(context) = rapier_context.single() else {
        return;
    };

    for (entity, transform, gravity, collider, mut contact) in &mut bodies {
        let position = transform.translation();
        let down = gravity.copied().unwrap_or_default().down();
        let bottom = collider.map(collider_bottom_offset).unwrap_or(0.0);
        let reach = bottom + GROUND_CONTACT_MARGIN;

        let probe = Collider::ball(0.1);
        let hit = context.cast_shape(
            position,
            Quat::IDENTITY,
            down,
            &*probe.raw,
            cast_options(reach + 1.0),
            exclude_self(entity),
        );

        match hit {
            Some((_, hit)) => {
                let normal = hit.details.map(|d| d.normal1).unwrap_or(-down);
                contact.grounded = hit.time_of_impact <= reach;
                contact.normal = normal;
                contact.distance = (hit.time_of_impact - bottom).max(0.0);
            }
            None => *contact = GroundContact::default(),
        }
    }
}

/// Pre-aim probe and tip sweep for the grapple.
fn rapier_grapple_sensors(
    rapier_context: ReadRapierContext,
    time: Res<Time<Fixed>>,
    mut grapples: Query<(Entity, &GlobalTransform, &mut GrappleController)>,
) {
    let Ok(context) = rapier_context.single() else {
        return;
    };
    let dt = time.delta_secs();

    for (entity, transform, mut grapple) in &mut grapples {
        if !grapple.is_enabled() {
            grapple.set_launch_hit(None);
            continue;
        }

        let probe = Collider::ball(grapple.cast_radius);

        // Keep the pre-aim probe fresh while idle and on the launch tick,
        // when it still shapes the launch direction.
        if grapple.phase() == GrapplePhase::Idle || grapple.pending_launch() {
            let (origin, direction) = grapple.aim_ray();
            let probe_hit = context
                .cast_shape(
                    origin,
                    Quat::IDENTITY,
                    direction,
                    &*probe.raw,
                    cast_options(grapple.rope_length),
                    exclude_self(entity),
                )
                .map(|(_, hit)| origin + direction * hit.time_of_impact);
            grapple.set_aim_probe(probe_hit);
        }

        let (position, rotation) = (
            transform.translation(),
            transform.to_scale_rotation_translation().1,
        );
        let anchor = position + rotation * grapple.anchor_offset;

        let sweep_hit = grapple.sweep_segment(anchor, dt).and_then(
            |(origin, direction, length)| {
                context
                    .cast_shape(
                        origin,
                        Quat::IDENTITY,
                        direction,
                        &*probe.raw,
                        cast_options(length),
                        exclude_self(entity),
                    )
                    .map(|(hit_entity, hit)| {
                        let normal = hit.details.map(|d| d.normal1).unwrap_or(-direction);
                        let point = origin + direction * hit.time_of_impact;
                        CastHit::new(hit.time_of_impact, normal, point, Some(hit_entity))
                    })
            },
        );
        grapple.set_launch_hit(sweep_hit);
    }
}

/// Long-range downward box cast feeding the skydiver's self-referential
/// proximity thresholds.
fn rapier_skydiver_ground_probe(
    rapier_context: ReadRapierContext,
    mut skydivers: Query<(
        Entity,
        &GlobalTransform,
        Option<&GravityContext>,
        Option<&Velocity>,
        &mut Skydiver,
    )>,
) {
    let Ok(context) = rapier_context.single() else {
        return;
    };

    for (entity, transform, gravity, velocity, mut skydiver) in &mut skydivers {
        let position = transform.translation();
        let rotation = transform.to_scale_rotation_translation().1;
        let up = gravity.copied().unwrap_or_default().up();
        let linvel = velocity.map(|v| v.linvel).unwrap_or(Vec3::ZERO);

        let range = skydiver.probe_range(rotation, up, linvel);
        let half = skydiver.probe_half_extents;
        let probe = Collider::cuboid(half.x, half.y, half.z);

        let ground_distance = context
            .cast_shape(
                position,
                Quat::IDENTITY,
                -up,
                &*probe.raw,
                cast_options(range),
                exclude_self(entity),
            )
            .map(|(_, hit)| hit.time_of_impact);
        skydiver.set_ground_distance(ground_distance);
    }
}

/// Overlap check of the muzzle clearance volume before a rocket launch.
fn rapier_rocket_clearance(
    rapier_context: ReadRapierContext,
    mut launchers: Query<(Entity, &GlobalTransform, &mut RocketJumpController)>,
) {
    let Ok(context) = rapier_context.single() else {
        return;
    };

    for (entity, transform, mut launcher) in &mut launchers {
        if !launcher.wants_clearance_check() {
            launcher.set_obstructed(false);
            continue;
        }

        let rotation = transform.to_scale_rotation_translation().1;
        let muzzle = transform.translation() + rotation * launcher.launch_offset;
        let volume = Collider::ball(launcher.clearance_radius);

        let mut blocked = false;
        context.intersect_shape(
            muzzle,
            Quat::IDENTITY,
            &*volume.raw,
            exclude_self(entity),
            |_| {
                blocked = true;
                false
            },
        );
        launcher.set_obstructed(blocked);
    }
}

/// Attach a Rapier body to freshly spawned rockets and hand them their
/// muzzle velocity.
fn attach_rocket_bodies(
    mut commands: Commands,
    rockets: Query<(Entity, &Rocket), Added<Rocket>>,
) {
    for (entity, rocket) in &rockets {
        commands.entity(entity).insert((
            RigidBody::Dynamic,
            Collider::ball(rocket.collider_radius),
            Velocity {
                linvel: rocket.muzzle_velocity(),
                angvel: Vec3::ZERO,
            },
            Ccd::enabled(),
            ActiveEvents::COLLISION_EVENTS,
            GravityScale(0.0),
        ));
    }
}

/// Mark rockets that touched anything; the drive system detonates them.
fn rapier_rocket_impacts(
    mut collisions: MessageReader<CollisionEvent>,
    mut rockets: Query<&mut Rocket>,
) {
    for event in collisions.read() {
        let CollisionEvent::Started(a, b, _) = event else {
            continue;
        };
        for entity in [*a, *b] {
            if let Ok(mut rocket) = rockets.get_mut(entity) {
                rocket.mark_impacted();
            }
        }
    }
}

/// Collect the bodies inside each running blast.
fn rapier_blast_scan(
    rapier_context: ReadRapierContext,
    mut rockets: Query<(Entity, &GlobalTransform, &mut Rocket)>,
) {
    let Ok(context) = rapier_context.single() else {
        return;
    };

    for (entity, transform, mut rocket) in &mut rockets {
        if !rocket.is_exploding() {
            continue;
        }

        let volume = Collider::ball(rocket.explosion_radius);
        let mut victims = Vec::new();
        context.intersect_shape(
            transform.translation(),
            Quat::IDENTITY,
            &*volume.raw,
            exclude_self(entity),
            |victim| {
                victims.push(victim);
                true
            },
        );
        rocket.set_blast_victims(victims);
    }
}

/// Short forward sweep finding the nearest boardable vehicle.
fn rapier_passenger_probe(
    rapier_context: ReadRapierContext,
    mut passengers: Query<(Entity, &GlobalTransform, &mut PassengerController)>,
    vehicles: Query<(), With<Vehicle>>,
) {
    let Ok(context) = rapier_context.single() else {
        return;
    };

    for (entity, transform, mut passenger) in &mut passengers {
        if passenger.is_seated() {
            passenger.set_vehicle_ahead(None);
            continue;
        }

        let rotation = transform.to_scale_rotation_translation().1;
        let forward = rotation * Vec3::NEG_Z;
        let probe = Collider::ball(0.3);

        let predicate = |hit: Entity| vehicles.contains(hit);
        let filter = exclude_self(entity).predicate(&predicate);

        let ahead = context
            .cast_shape(
                transform.translation(),
                Quat::IDENTITY,
                forward,
                &*probe.raw,
                cast_options(passenger.probe_distance),
                filter,
            )
            .map(|(vehicle, _)| vehicle);
        passenger.set_vehicle_ahead(ahead);
    }
}

/// Bundle for creating an ability-driven body with Rapier3D physics.
///
/// Provides the rigid body, velocity tracking, force/impulse sinks, mass
/// readback, the force accumulator the abilities write into, and the shared
/// gravity and rotation-arbitration components.
#[derive(Bundle, Default)]
pub struct Rapier3dAbilityBundle {
    pub rigid_body: RigidBody,
    pub velocity: Velocity,
    pub external_force: ExternalForce,
    pub external_impulse: ExternalImpulse,
    pub damping: Damping,
    pub mass_properties: ReadMassProperties,
    pub force_accumulator: ForceAccumulator,
    pub gravity: GravityContext,
    pub rotation_authority: RotationAuthority,
}

impl Rapier3dAbilityBundle {
    /// A dynamic body with mild damping, free to rotate so the correction
    /// and pose systems can steer it.
    pub fn new() -> Self {
        Self {
            rigid_body: RigidBody::Dynamic,
            damping: Damping {
                linear_damping: 0.2,
                angular_damping: 1.0,
            },
            ..Self::default()
        }
    }

    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.damping = Damping {
            linear_damping: linear,
            angular_damping: angular,
        };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.add_plugins(TransformPlugin);
        app.add_plugins(RapierPhysicsPlugin::<NoUserData>::default());
        app.insert_resource(Time::<Fixed>::from_hz(50.0));
        app
    }

    #[test]
    fn backend_position_round_trip() {
        let mut app = create_test_app();
        let entity = app
            .world_mut()
            .spawn((Transform::from_xyz(10.0, 20.0, -5.0), RigidBody::Dynamic))
            .id();
        app.update();

        let position = Rapier3dBackend::get_position(app.world(), entity);
        assert!((position - Vec3::new(10.0, 20.0, -5.0)).length() < 0.01);

        Rapier3dBackend::set_position(app.world_mut(), entity, Vec3::splat(1.0));
        let position = Rapier3dBackend::get_position(app.world(), entity);
        assert!((position - Vec3::splat(1.0)).length() < 1e-6);
    }

    #[test]
    fn backend_velocity_round_trip() {
        let mut app = create_test_app();
        let entity = app
            .world_mut()
            .spawn((
                Transform::default(),
                RigidBody::Dynamic,
                Velocity::linear(Vec3::new(3.0, 0.0, 4.0)),
            ))
            .id();
        app.update();

        let velocity = Rapier3dBackend::get_velocity(app.world(), entity);
        assert!((velocity - Vec3::new(3.0, 0.0, 4.0)).length() < 0.01);

        Rapier3dBackend::set_velocity(app.world_mut(), entity, Vec3::NEG_Y);
        assert!(
            (Rapier3dBackend::get_velocity(app.world(), entity) - Vec3::NEG_Y).length() < 0.01
        );
    }

    #[test]
    fn kinematic_toggle_swaps_body_type() {
        let mut app = create_test_app();
        let entity = app
            .world_mut()
            .spawn((Transform::default(), RigidBody::Dynamic))
            .id();
        app.update();

        Rapier3dBackend::set_kinematic(app.world_mut(), entity, true);
        assert_eq!(
            *app.world().get::<RigidBody>(entity).unwrap(),
            RigidBody::KinematicPositionBased
        );

        Rapier3dBackend::set_kinematic(app.world_mut(), entity, false);
        assert_eq!(
            *app.world().get::<RigidBody>(entity).unwrap(),
            RigidBody::Dynamic
        );
    }

    #[test]
    fn ability_bundle_creates_valid_entity() {
        let mut app = create_test_app();
        let entity = app
            .world_mut()
            .spawn((
                Transform::default(),
                Rapier3dAbilityBundle::new(),
                Collider::capsule_y(0.6, 0.3),
            ))
            .id();
        app.update();

        assert!(app.world().get::<RigidBody>(entity).is_some());
        assert!(app.world().get::<ForceAccumulator>(entity).is_some());
        assert!(app.world().get::<RotationAuthority>(entity).is_some());
    }
}
