//! Scripted analytic physics backend for deterministic ability tests.
//!
//! Instead of a full physics engine, bodies carry a [`TestBody`] that the
//! backend integrates explicitly, and the world geometry is an analytic
//! [`TestWorld`] (one wall plane, one ground plane). This makes the tick
//! arithmetic of the state machines exact and assertable.

#![allow(dead_code)]

use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;

use aerial_ability_controller::collision::CastHit;
use aerial_ability_controller::prelude::*;

/// Minimal rigid body: explicit velocity, unit-ish mass, kinematic flag.
#[derive(Component, Debug, Clone)]
pub struct TestBody {
    pub velocity: Vec3,
    pub angular: Vec3,
    pub mass: f32,
    pub kinematic: bool,
}

impl Default for TestBody {
    fn default() -> Self {
        Self {
            velocity: Vec3::ZERO,
            angular: Vec3::ZERO,
            mass: 1.0,
            kinematic: false,
        }
    }
}

impl TestBody {
    pub fn with_velocity(velocity: Vec3) -> Self {
        Self {
            velocity,
            ..Self::default()
        }
    }
}

/// Analytic scene: an optional wall plane and an optional ground plane.
#[derive(Resource, Debug, Clone, Default)]
pub struct TestWorld {
    /// Plane `point · normal == offset` that casts can hit.
    pub wall: Option<WallPlane>,
    /// Height of an infinite ground plane along world Y.
    pub ground_height: Option<f32>,
}

#[derive(Debug, Clone, Copy)]
pub struct WallPlane {
    pub normal: Vec3,
    pub offset: f32,
    /// Entity reported for hits against this plane.
    pub entity: Option<Entity>,
}

impl WallPlane {
    /// Intersect a segment sweep with the plane. Returns distance along the
    /// sweep, with a hair of slack so a segment ending exactly on the plane
    /// still hits.
    pub fn sweep(&self, origin: Vec3, direction: Vec3, length: f32) -> Option<f32> {
        let denom = direction.dot(self.normal);
        if denom.abs() < 1e-8 {
            return None;
        }
        let t = (self.offset - origin.dot(self.normal)) / denom;
        (t >= 0.0 && t <= length + 1e-5).then_some(t)
    }
}

pub struct TestBackend;

impl AbilityPhysicsBackend for TestBackend {
    fn plugin() -> impl Plugin {
        TestBackendPlugin
    }

    fn get_position(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<Transform>(entity)
            .map(|t| t.translation)
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
            .unwrap_or(Quat::IDENTITY)
    }

    fn move_rotation(world: &mut World, entity: Entity, rotation: Quat) {
        if let Some(mut transform) = world.get_mut::<Transform>(entity) {
            transform.rotation = rotation;
        }
    }

    fn get_velocity(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<TestBody>(entity)
            .map(|b| b.velocity)
            .unwrap_or(Vec3::ZERO)
    }

    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3) {
        if let Some(mut body) = world.get_mut::<TestBody>(entity) {
            body.velocity = velocity;
        }
    }

    fn get_angular_velocity(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<TestBody>(entity)
            .map(|b| b.angular)
            .unwrap_or(Vec3::ZERO)
    }

    fn set_angular_velocity(world: &mut World, entity: Entity, angular: Vec3) {
        if let Some(mut body) = world.get_mut::<TestBody>(entity) {
            body.angular = angular;
        }
    }

    fn apply_impulse(world: &mut World, entity: Entity, impulse: Vec3) {
        if let Some(mut body) = world.get_mut::<TestBody>(entity) {
            let mass = body.mass.max(1e-6);
            body.velocity += impulse / mass;
        }
    }

    fn set_rotation_locked(_world: &mut World, _entity: Entity, _locked: bool) {}

    fn set_kinematic(world: &mut World, entity: Entity, kinematic: bool) {
        if let Some(mut body) = world.get_mut::<TestBody>(entity) {
            body.kinematic = kinematic;
        }
    }

    fn get_mass(world: &World, entity: Entity) -> f32 {
        world.get::<TestBody>(entity).map(|b| b.mass).unwrap_or(1.0)
    }

    fn get_fixed_timestep(world: &World) -> f32 {
        world
            .get_resource::<Time<Fixed>>()
            .map(|t| t.delta_secs())
            .filter(|&d| d > 0.0)
            .unwrap_or(1.0 / 50.0)
    }
}

pub struct TestBackendPlugin;

impl Plugin for TestBackendPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<TestWorld>();

        app.add_systems(
            FixedUpdate,
            (
                test_ground_contact,
                test_grapple_sensors,
                test_skydiver_probe,
                test_passenger_probe,
                (test_attach_rocket_bodies, test_blast_scan).chain(),
            )
                .in_set(AbilitySet::Sensors),
        );

        app.add_systems(FixedUpdate, integrate_test_bodies.in_set(AbilitySet::Sync));
    }
}

/// Grounded when within one meter of the analytic ground plane.
const GROUND_CONTACT_RANGE: f32 = 1.0;

fn test_ground_contact(
    scene: Res<TestWorld>,
    mut bodies: Query<(&Transform, &mut GroundContact)>,
) {
    for (transform, mut contact) in &mut bodies {
        *contact = match scene.ground_height {
            Some(height) => {
                let distance = (transform.translation.y - height).max(0.0);
                GroundContact {
                    grounded: distance <= GROUND_CONTACT_RANGE,
                    normal: Vec3::Y,
                    distance,
                }
            }
            None => GroundContact::default(),
        };
    }
}

/// Mirror of the Rapier grapple sensors against the analytic wall plane.
fn test_grapple_sensors(
    scene: Res<TestWorld>,
    time: Res<Time<Fixed>>,
    mut grapples: Query<(&Transform, &mut GrappleController)>,
) {
    let dt = time.delta_secs();

    for (transform, mut grapple) in &mut grapples {
        if !grapple.is_enabled() {
            grapple.set_launch_hit(None);
            continue;
        }

        if grapple.phase() == GrapplePhase::Idle || grapple.pending_launch() {
            let (origin, direction) = grapple.aim_ray();
            let probe = scene.wall.and_then(|wall| {
                wall.sweep(origin, direction, grapple.rope_length)
                    .map(|t| origin + direction * t)
            });
            grapple.set_aim_probe(probe);
        }

        let anchor = transform.translation + transform.rotation * grapple.anchor_offset;
        let hit = grapple
            .sweep_segment(anchor, dt)
            .and_then(|(origin, direction, length)| {
                let wall = scene.wall?;
                let t = wall.sweep(origin, direction, length)?;
                Some(CastHit::new(
                    t,
                    wall.normal,
                    origin + direction * t,
                    wall.entity,
                ))
            });
        grapple.set_launch_hit(hit);
    }
}

/// Downward probe against the analytic ground plane.
fn test_skydiver_probe(
    scene: Res<TestWorld>,
    mut skydivers: Query<(
        &Transform,
        Option<&GravityContext>,
        Option<&TestBody>,
        &mut Skydiver,
    )>,
) {
    for (transform, gravity, body, mut skydiver) in &mut skydivers {
        let up = gravity.copied().unwrap_or_default().up();
        let velocity = body.map(|b| b.velocity).unwrap_or(Vec3::ZERO);
        let range = skydiver.probe_range(transform.rotation, up, velocity);

        let distance = scene
            .ground_height
            .map(|height| (transform.translation.y - height).max(0.0));
        skydiver.set_ground_distance(distance.filter(|d| *d <= range));
    }
}

fn test_passenger_probe(
    mut passengers: Query<(Entity, &Transform, &mut PassengerController)>,
    vehicles: Query<(Entity, &Transform), With<Vehicle>>,
) {
    for (_, transform, mut passenger) in &mut passengers {
        if passenger.is_seated() {
            passenger.set_vehicle_ahead(None);
            continue;
        }
        let forward = transform.rotation * Vec3::NEG_Z;
        let reach = passenger.probe_distance;

        let nearest = vehicles
            .iter()
            .filter_map(|(entity, vehicle)| {
                let to_vehicle = vehicle.translation - transform.translation;
                let along = to_vehicle.dot(forward);
                (along >= 0.0 && along <= reach).then_some((entity, along))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(entity, _)| entity);
        passenger.set_vehicle_ahead(nearest);
    }
}

/// Stand-in for the Rapier body attach: rockets get a `TestBody` carrying
/// their muzzle velocity.
fn test_attach_rocket_bodies(
    mut commands: Commands,
    rockets: Query<(Entity, &Rocket), Added<Rocket>>,
) {
    for (entity, rocket) in &rockets {
        commands
            .entity(entity)
            .insert(TestBody::with_velocity(rocket.muzzle_velocity()));
    }
}

/// Every test body within the blast radius is a victim.
fn test_blast_scan(
    mut rockets: Query<(Entity, &Transform, &mut Rocket)>,
    bodies: Query<(Entity, &Transform), With<TestBody>>,
) {
    for (rocket_entity, rocket_transform, mut rocket) in &mut rockets {
        if !rocket.is_exploding() {
            continue;
        }
        let victims = bodies
            .iter()
            .filter(|(entity, transform)| {
                *entity != rocket_entity
                    && transform.translation.distance(rocket_transform.translation)
                        <= rocket.explosion_radius
            })
            .map(|(entity, _)| entity)
            .collect();
        rocket.set_blast_victims(victims);
    }
}

/// Semi-implicit Euler over the accumulated forces: the analytic equivalent
/// of Rapier's integration step.
fn integrate_test_bodies(
    time: Res<Time<Fixed>>,
    mut bodies: Query<(&mut Transform, &mut TestBody, Option<&mut ForceAccumulator>)>,
) {
    let dt = time.delta_secs();
    for (mut transform, mut body, accumulator) in &mut bodies {
        if let Some(mut accumulator) = accumulator {
            let (force, torque) = accumulator.take();
            if !body.kinematic {
                let mass = body.mass.max(1e-6);
                body.velocity += force / mass * dt;
                body.angular += torque * dt;
            }
        }
        if !body.kinematic {
            transform.translation += body.velocity * dt;
        }
    }
}

pub const TEST_DT: f32 = 0.02;

/// Minimal app wired to the scripted backend at 50 Hz. Time advances by
/// exactly one fixed period per update, so every `tick` runs exactly one
/// `FixedUpdate` pass.
pub fn create_test_app() -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    app.add_plugins(TransformPlugin);
    app.add_plugins(AbilityControllerPlugin::<TestBackend>::default());
    app.insert_resource(Time::<Fixed>::from_seconds(TEST_DT as f64));
    app.insert_resource(TimeUpdateStrategy::ManualDuration(
        std::time::Duration::from_secs_f64(TEST_DT as f64),
    ));
    app.finish();
    app.cleanup();
    app.update();
    app
}

/// Run exactly one fixed tick.
pub fn tick(app: &mut App) {
    app.update();
}

pub fn run_ticks(app: &mut App, ticks: usize) {
    for _ in 0..ticks {
        tick(app);
    }
}

/// Drain all buffered messages of a type.
pub fn drain_messages<M: Message>(app: &mut App) -> Vec<M> {
    app.world_mut()
        .resource_mut::<Messages<M>>()
        .drain()
        .collect()
}

/// Run ticks while draining messages after each one, so nothing ages out of
/// the double buffer during long runs.
pub fn run_ticks_collecting<M: Message>(app: &mut App, ticks: usize) -> Vec<M> {
    let mut collected = Vec::new();
    for _ in 0..ticks {
        tick(app);
        collected.extend(drain_messages::<M>(app));
    }
    collected
}
