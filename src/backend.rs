//! Physics backend abstraction.
//!
//! This module defines the trait that physics backends must implement to
//! work with the ability controllers. The drive systems are generic over it,
//! so the physics engine can be swapped (Rapier3D included, scripted backends
//! for tests).
//!
//! A backend has two jobs:
//! - implement the rigid-body proxy below (reads and writes on a single body)
//! - provide a plugin that contributes its sensor systems (the spatial
//!   queries each ability needs, run in [`AbilitySet::Sensors`]) and flushes
//!   accumulated forces (run in [`AbilitySet::Sync`])
//!
//! [`AbilitySet::Sensors`]: crate::AbilitySet::Sensors
//! [`AbilitySet::Sync`]: crate::AbilitySet::Sync

use bevy::prelude::*;

/// Per-tick force and torque accumulator.
///
/// Drive systems never touch the engine's force component directly; they add
/// into this accumulator through the backend trait and the backend plugin
/// flushes it once per tick. Keeps multiple abilities on one body additive
/// instead of last-writer-wins.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct ForceAccumulator {
    pub force: Vec3,
    pub torque: Vec3,
    applied_force: Vec3,
    applied_torque: Vec3,
}

impl ForceAccumulator {
    /// Add a force acting through the center of mass.
    pub fn add_force(&mut self, force: Vec3) {
        self.force += force;
    }

    /// Add a force acting at a world-space point.
    ///
    /// `center_of_mass` is the body's world-space center of mass; the lever
    /// arm from it produces the torque contribution.
    pub fn add_force_at_point(&mut self, force: Vec3, point: Vec3, center_of_mass: Vec3) {
        self.force += force;
        self.torque += (point - center_of_mass).cross(force);
    }

    /// Add a raw torque.
    pub fn add_torque(&mut self, torque: Vec3) {
        self.torque += torque;
    }

    /// Take the accumulated values, leaving zero behind.
    pub fn take(&mut self) -> (Vec3, Vec3) {
        let out = (self.force, self.torque);
        self.force = Vec3::ZERO;
        self.torque = Vec3::ZERO;
        out
    }

    /// Start a new tick: returns what was applied last tick so the backend
    /// can subtract it from the engine's force component, preserving forces
    /// other systems wrote there.
    pub fn prepare_new_frame(&mut self) -> (Vec3, Vec3) {
        let out = (self.applied_force, self.applied_torque);
        self.applied_force = Vec3::ZERO;
        self.applied_torque = Vec3::ZERO;
        self.force = Vec3::ZERO;
        self.torque = Vec3::ZERO;
        out
    }

    /// End of tick: returns the accumulated values and records them as
    /// applied for the next `prepare_new_frame`.
    pub fn finalize_frame(&mut self) -> (Vec3, Vec3) {
        self.applied_force = self.force;
        self.applied_torque = self.torque;
        self.force = Vec3::ZERO;
        self.torque = Vec3::ZERO;
        (self.applied_force, self.applied_torque)
    }
}

/// Trait for physics backend implementations.
///
/// All methods are static and take the ECS world, so the generic exclusive
/// drive systems can interleave reads and writes freely. Entities missing
/// the backend's body components are treated as stationary with unit mass;
/// writes to them are dropped.
pub trait AbilityPhysicsBackend: 'static + Send + Sync {
    /// Returns the plugin that sets up this backend (sensor systems and
    /// force flushing).
    fn plugin() -> impl Plugin;

    /// World-space position of the body.
    fn get_position(world: &World, entity: Entity) -> Vec3;

    /// Teleport the body. Used for kinematic seat synchronisation.
    fn set_position(world: &mut World, entity: Entity, position: Vec3);

    /// World-space rotation of the body.
    fn get_rotation(world: &World, entity: Entity) -> Quat;

    /// Rotate the body directly, bypassing torque integration.
    ///
    /// Rotation correction and pose convergence go through this so the
    /// result is exact regardless of inertia.
    fn move_rotation(world: &mut World, entity: Entity, rotation: Quat);

    /// Linear velocity of the body.
    fn get_velocity(world: &World, entity: Entity) -> Vec3;

    /// Set the linear velocity of the body.
    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3);

    /// Angular velocity of the body.
    fn get_angular_velocity(world: &World, entity: Entity) -> Vec3;

    /// Set the angular velocity of the body.
    fn set_angular_velocity(world: &mut World, entity: Entity, angular: Vec3);

    /// Apply an instantaneous change in momentum.
    fn apply_impulse(world: &mut World, entity: Entity, impulse: Vec3);

    /// Lock or unlock the body's rotation axes.
    fn set_rotation_locked(world: &mut World, entity: Entity, locked: bool);

    /// Switch the body between dynamic and kinematic simulation.
    fn set_kinematic(world: &mut World, entity: Entity, kinematic: bool);

    /// Mass of the body.
    fn get_mass(_world: &World, _entity: Entity) -> f32 {
        1.0
    }

    /// World-space center of mass of the body.
    fn get_center_of_mass(world: &World, entity: Entity) -> Vec3 {
        Self::get_position(world, entity)
    }

    /// The fixed timestep delta in seconds.
    fn get_fixed_timestep(world: &World) -> f32;

    /// Accumulate a force through the center of mass.
    ///
    /// Applied over the physics timestep when the backend flushes.
    fn apply_force(world: &mut World, entity: Entity, force: Vec3) {
        if let Some(mut accumulator) = world.get_mut::<ForceAccumulator>(entity) {
            accumulator.add_force(force);
        }
    }

    /// Accumulate a force acting at a world-space point.
    fn apply_force_at_point(world: &mut World, entity: Entity, force: Vec3, point: Vec3) {
        let center_of_mass = Self::get_center_of_mass(world, entity);
        if let Some(mut accumulator) = world.get_mut::<ForceAccumulator>(entity) {
            accumulator.add_force_at_point(force, point, center_of_mass);
        }
    }

    /// Accumulate a torque.
    fn apply_torque(world: &mut World, entity: Entity, torque: Vec3) {
        if let Some(mut accumulator) = world.get_mut::<ForceAccumulator>(entity) {
            accumulator.add_torque(torque);
        }
    }
}

/// Empty plugin for backends that don't need additional setup.
pub struct NoOpBackendPlugin;

impl Plugin for NoOpBackendPlugin {
    fn build(&self, _app: &mut App) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_sums_forces() {
        let mut accumulator = ForceAccumulator::default();
        accumulator.add_force(Vec3::X);
        accumulator.add_force(Vec3::new(2.0, 3.0, 0.0));

        let (force, torque) = accumulator.take();
        assert_eq!(force, Vec3::new(3.0, 3.0, 0.0));
        assert_eq!(torque, Vec3::ZERO);
    }

    #[test]
    fn force_at_point_produces_lever_torque() {
        let mut accumulator = ForceAccumulator::default();
        // Force along +Y, one meter out on +X from the COM: torque about +Z.
        accumulator.add_force_at_point(Vec3::Y, Vec3::X, Vec3::ZERO);

        assert_eq!(accumulator.force, Vec3::Y);
        assert_eq!(accumulator.torque, Vec3::Z);
    }

    #[test]
    fn take_resets_to_zero() {
        let mut accumulator = ForceAccumulator::default();
        accumulator.add_torque(Vec3::Y);
        accumulator.take();

        assert_eq!(accumulator.force, Vec3::ZERO);
        assert_eq!(accumulator.torque, Vec3::ZERO);
    }

    #[test]
    fn frame_bookkeeping_round_trips() {
        let mut accumulator = ForceAccumulator::default();

        accumulator.add_force(Vec3::X * 5.0);
        let (applied, _) = accumulator.finalize_frame();
        assert_eq!(applied, Vec3::X * 5.0);

        // Next tick starts by handing back what was applied.
        let (to_subtract, _) = accumulator.prepare_new_frame();
        assert_eq!(to_subtract, Vec3::X * 5.0);

        // Nothing accumulated this tick: nothing applied.
        let (applied, torque) = accumulator.finalize_frame();
        assert_eq!(applied, Vec3::ZERO);
        assert_eq!(torque, Vec3::ZERO);
    }
}
