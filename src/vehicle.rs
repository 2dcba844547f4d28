//! Vehicle boarding and seating.
//!
//! A vehicle carries a fixed set of seats; seat 0 is the pilot seat and only
//! its occupant may drive. Boarding makes the passenger's body kinematic and
//! synchronises it to the seat every tick (the physics-engine replacement
//! for transform parenting); disembarking restores dynamics, offsets the
//! body away from the seat and hands it the vehicle's velocity.

use bevy::log::warn;
use bevy::prelude::*;

use crate::backend::AbilityPhysicsBackend;
use crate::events::{VehicleEvent, VehicleEventKind};
use crate::gravity::GravityContext;

/// A seat on a vehicle.
#[derive(Reflect, Debug, Clone, Copy)]
pub struct Seat {
    /// Seat position local to the vehicle.
    pub offset: Vec3,
    occupant: Option<Entity>,
}

impl Seat {
    pub fn new(offset: Vec3) -> Self {
        Self {
            offset,
            occupant: None,
        }
    }

    pub fn occupant(&self) -> Option<Entity> {
        self.occupant
    }
}

/// A drivable vehicle with seat bookkeeping.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct Vehicle {
    /// Forward drive force, in N.
    pub drive_force: f32,
    /// Yaw steer torque, in N·m.
    pub steer_torque: f32,
    /// Forward speed above which no more drive force is added, in m/s.
    pub max_speed: f32,

    seats: Vec<Seat>,
    drive_input: Vec2,
}

impl Vehicle {
    /// Build a vehicle with seats at the given local offsets. The first
    /// offset is the pilot seat.
    pub fn new(seat_offsets: impl IntoIterator<Item = Vec3>) -> Self {
        Self {
            drive_force: 120.0,
            steer_torque: 30.0,
            max_speed: 20.0,
            seats: seat_offsets.into_iter().map(Seat::new).collect(),
            drive_input: Vec2::ZERO,
        }
    }

    /// Set drive force and steer torque.
    pub fn with_drive(mut self, force: f32, torque: f32) -> Self {
        self.drive_force = force;
        self.steer_torque = torque;
        self
    }

    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }

    /// The pilot, the occupant of seat 0.
    pub fn pilot(&self) -> Option<Entity> {
        self.seats.first().and_then(|seat| seat.occupant)
    }

    /// Index of the first free seat.
    pub fn free_seat(&self) -> Option<usize> {
        self.seats.iter().position(|seat| seat.occupant.is_none())
    }

    /// Seat index of a passenger, if aboard.
    pub fn seat_of(&self, passenger: Entity) -> Option<usize> {
        self.seats
            .iter()
            .position(|seat| seat.occupant == Some(passenger))
    }

    /// Seat a passenger in the first free seat. Refuses a passenger that is
    /// already aboard and returns `None` when full.
    pub fn board(&mut self, passenger: Entity) -> Option<usize> {
        if self.seat_of(passenger).is_some() {
            warn!("passenger is already aboard this vehicle");
            return None;
        }
        let seat = self.free_seat()?;
        self.seats[seat].occupant = Some(passenger);
        Some(seat)
    }

    /// Free a passenger's seat. Returns the seat index that was freed.
    pub fn disembark(&mut self, passenger: Entity) -> Option<usize> {
        let seat = self.seat_of(passenger)?;
        self.seats[seat].occupant = None;
        Some(seat)
    }

    /// Drive input from the pilot: x steers, y accelerates. Consumed each
    /// tick.
    pub fn set_drive_input(&mut self, input: Vec2) {
        self.drive_input = input;
    }
}

/// Apply pilot drive input as force and steer torque.
pub fn drive_vehicles<B: AbilityPhysicsBackend>(world: &mut World) {
    let entities: Vec<Entity> = world
        .query_filtered::<Entity, With<Vehicle>>()
        .iter(world)
        .collect();

    for entity in entities {
        let Some(vehicle) = world.get::<Vehicle>(entity) else {
            continue;
        };
        let input = vehicle.drive_input;
        let (drive_force, steer_torque, max_speed) =
            (vehicle.drive_force, vehicle.steer_torque, vehicle.max_speed);
        let piloted = vehicle.pilot().is_some();

        if piloted && input != Vec2::ZERO {
            let up = world
                .get::<GravityContext>(entity)
                .copied()
                .unwrap_or_default()
                .up();
            let rotation = B::get_rotation(world, entity);
            let forward = rotation * Vec3::NEG_Z;

            let forward_speed = B::get_velocity(world, entity).dot(forward) * input.y.signum();
            if forward_speed < max_speed {
                B::apply_force(world, entity, forward * input.y * drive_force);
            }
            B::apply_torque(world, entity, up * -input.x * steer_torque);
        }

        if let Some(mut vehicle) = world.get_mut::<Vehicle>(entity) {
            vehicle.drive_input = Vec2::ZERO;
        }
    }
}

#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq)]
struct SeatAssignment {
    vehicle: Entity,
    seat: usize,
}

/// Lets a body board nearby vehicles and ride a seat.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct PassengerController {
    /// Forward probe reach for finding a vehicle, in m.
    pub probe_distance: f32,
    /// Exit offset from the seat, local to the vehicle.
    pub disembark_offset: Vec3,

    enabled: bool,
    seated: Option<SeatAssignment>,
    board_requested: bool,
    disembark_requested: bool,
    drive_input: Vec2,
    /// Closest boardable vehicle ahead, written by the backend.
    pub(crate) nearby_vehicle: Option<Entity>,
}

impl Default for PassengerController {
    fn default() -> Self {
        Self {
            probe_distance: 2.5,
            disembark_offset: Vec3::new(1.5, 0.5, 0.0),
            enabled: true,
            seated: None,
            board_requested: false,
            disembark_requested: false,
            drive_input: Vec2::ZERO,
            nearby_vehicle: None,
        }
    }
}

impl PassengerController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request boarding the vehicle ahead. Resolved on the next fixed tick.
    pub fn request_board(&mut self) {
        if !self.enabled {
            warn!("boarding requested while disabled");
            return;
        }
        self.board_requested = true;
    }

    /// Request leaving the current seat.
    pub fn request_disembark(&mut self) {
        if self.seated.is_none() {
            warn!("disembark requested while not seated");
            return;
        }
        self.disembark_requested = true;
    }

    /// Drive input forwarded to the vehicle while in the pilot seat.
    pub fn set_drive_input(&mut self, input: Vec2) {
        self.drive_input = input;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_seated(&self) -> bool {
        self.seated.is_some()
    }

    /// The vehicle currently ridden, if any.
    pub fn vehicle(&self) -> Option<Entity> {
        self.seated.map(|assignment| assignment.vehicle)
    }

    /// Whether this passenger sits in the pilot seat.
    pub fn is_pilot(&self) -> bool {
        self.seated.is_some_and(|assignment| assignment.seat == 0)
    }

    /// The vehicle the forward probe currently sees.
    pub fn vehicle_ahead(&self) -> Option<Entity> {
        self.nearby_vehicle
    }

    /// Backend sensor input: the nearest boardable vehicle ahead.
    pub fn set_vehicle_ahead(&mut self, vehicle: Option<Entity>) {
        self.nearby_vehicle = vehicle;
    }
}

/// Resolve boarding requests and synchronise seated passengers.
pub fn drive_passengers<B: AbilityPhysicsBackend>(world: &mut World) {
    let entities: Vec<Entity> = world
        .query_filtered::<Entity, With<PassengerController>>()
        .iter(world)
        .collect();

    for entity in entities {
        let Some(passenger) = world.get::<PassengerController>(entity) else {
            continue;
        };
        let mut passenger = passenger.clone();
        let mut events: Vec<(Entity, VehicleEventKind)> = Vec::new();

        if let Some(assignment) = passenger.seated {
            let vehicle_alive = world.get::<Vehicle>(assignment.vehicle).is_some();

            if passenger.disembark_requested || !vehicle_alive {
                let mut exit_velocity = Vec3::ZERO;
                let mut exit_position = B::get_position(world, entity);

                if vehicle_alive {
                    let vehicle_position = B::get_position(world, assignment.vehicle);
                    let vehicle_rotation = B::get_rotation(world, assignment.vehicle);
                    exit_velocity = B::get_velocity(world, assignment.vehicle);

                    if let Some(mut vehicle) = world.get_mut::<Vehicle>(assignment.vehicle) {
                        let seat_offset = vehicle
                            .seats
                            .get(assignment.seat)
                            .map(|seat| seat.offset)
                            .unwrap_or_default();
                        vehicle.disembark(entity);
                        exit_position = vehicle_position
                            + vehicle_rotation * (seat_offset + passenger.disembark_offset);
                    }
                }

                passenger.seated = None;
                B::set_kinematic(world, entity, false);
                B::set_position(world, entity, exit_position);
                B::set_velocity(world, entity, exit_velocity);
                events.push((assignment.vehicle, VehicleEventKind::Disembarked));
            } else {
                // Ride the seat.
                let vehicle_position = B::get_position(world, assignment.vehicle);
                let vehicle_rotation = B::get_rotation(world, assignment.vehicle);
                let seat_offset = world
                    .get::<Vehicle>(assignment.vehicle)
                    .and_then(|vehicle| vehicle.seats.get(assignment.seat))
                    .map(|seat| seat.offset)
                    .unwrap_or_default();

                B::set_position(world, entity, vehicle_position + vehicle_rotation * seat_offset);
                B::move_rotation(world, entity, vehicle_rotation);

                if assignment.seat == 0 && passenger.drive_input != Vec2::ZERO {
                    let input = passenger.drive_input;
                    if let Some(mut vehicle) = world.get_mut::<Vehicle>(assignment.vehicle) {
                        vehicle.set_drive_input(input);
                    }
                }
            }
        } else if passenger.board_requested && passenger.enabled {
            if let Some(vehicle_entity) = passenger.nearby_vehicle {
                let seat = world
                    .get_mut::<Vehicle>(vehicle_entity)
                    .and_then(|mut vehicle| vehicle.board(entity));
                if let Some(seat) = seat {
                    passenger.seated = Some(SeatAssignment {
                        vehicle: vehicle_entity,
                        seat,
                    });
                    B::set_kinematic(world, entity, true);
                    events.push((vehicle_entity, VehicleEventKind::Boarded { seat }));
                }
            }
        }

        passenger.board_requested = false;
        passenger.disembark_requested = false;

        if let Some(mut component) = world.get_mut::<PassengerController>(entity) {
            *component = passenger;
        }
        for (vehicle, kind) in events {
            world.write_message(VehicleEvent {
                vehicle,
                passenger: entity,
                kind,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entities(n: usize) -> Vec<Entity> {
        let mut world = World::new();
        (0..n).map(|_| world.spawn_empty().id()).collect()
    }

    #[test]
    fn first_boarder_takes_the_pilot_seat() {
        let riders = entities(3);
        let mut vehicle = Vehicle::new([Vec3::ZERO, Vec3::X]);

        assert_eq!(vehicle.board(riders[0]), Some(0));
        assert_eq!(vehicle.pilot(), Some(riders[0]));

        assert_eq!(vehicle.board(riders[1]), Some(1));
        assert_eq!(vehicle.board(riders[2]), None, "vehicle is full");
    }

    #[test]
    fn double_board_is_refused() {
        let riders = entities(1);
        let mut vehicle = Vehicle::new([Vec3::ZERO, Vec3::X]);

        assert_eq!(vehicle.board(riders[0]), Some(0));
        assert_eq!(vehicle.board(riders[0]), None);
        // The second seat stays free.
        assert_eq!(vehicle.free_seat(), Some(1));
    }

    #[test]
    fn disembark_frees_the_seat() {
        let riders = entities(2);
        let mut vehicle = Vehicle::new([Vec3::ZERO, Vec3::X]);
        vehicle.board(riders[0]);
        vehicle.board(riders[1]);

        assert_eq!(vehicle.disembark(riders[0]), Some(0));
        assert_eq!(vehicle.pilot(), None);
        assert_eq!(vehicle.free_seat(), Some(0));

        // A stranger cannot disembark.
        assert_eq!(vehicle.disembark(riders[0]), None);
    }

    #[test]
    fn disembark_requires_a_seat() {
        let mut passenger = PassengerController::new();
        passenger.request_disembark();
        assert!(!passenger.disembark_requested);
    }
}
