//! Spatial query result structures.
//!
//! These structures hold the results of physics queries (sphere casts,
//! box casts, overlap scans) used for grapple target acquisition, ground
//! proximity checks and launch obstruction checks.

use bevy::prelude::*;

/// Information about a sphere/box cast hit.
#[derive(Reflect, Debug, Clone, Copy, Default)]
pub struct CastHit {
    /// Distance along the cast direction to the hit.
    pub distance: f32,
    /// Normal of the surface at the hit point.
    pub normal: Vec3,
    /// World position of the hit point.
    pub point: Vec3,
    /// Entity that was hit (if any).
    pub entity: Option<Entity>,
}

impl CastHit {
    /// Create a cast hit result.
    pub fn new(distance: f32, normal: Vec3, point: Vec3, entity: Option<Entity>) -> Self {
        Self {
            distance,
            normal,
            point,
            entity,
        }
    }
}

/// Ground contact state shared by the movement abilities.
///
/// Written once per tick by the backend's ground sensor and read by the run,
/// jump and rocket controllers. The skydiver keeps its own long-range probe
/// because its thresholds depend on its own rotation state.
#[derive(Component, Reflect, Debug, Clone, Copy)]
#[reflect(Component)]
pub struct GroundContact {
    /// Whether the body stands within contact range of the ground.
    pub grounded: bool,
    /// Surface normal of the ground, world up when airborne.
    pub normal: Vec3,
    /// Distance to the ground along the down direction, up to the probe
    /// range.
    pub distance: f32,
}

impl Default for GroundContact {
    fn default() -> Self {
        Self {
            grounded: false,
            normal: Vec3::Y,
            distance: f32::MAX,
        }
    }
}

impl GroundContact {
    /// Angle in radians between the ground normal and `up`.
    pub fn slope_angle(&self, up: Vec3) -> f32 {
        self.normal.angle_between(up)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_4;

    #[test]
    fn default_is_airborne() {
        let contact = GroundContact::default();
        assert!(!contact.grounded);
        assert_eq!(contact.normal, Vec3::Y);
    }

    #[test]
    fn slope_angle_from_normal() {
        let contact = GroundContact {
            grounded: true,
            normal: Vec3::new(1.0, 1.0, 0.0).normalize(),
            distance: 0.0,
        };
        assert!((contact.slope_angle(Vec3::Y) - FRAC_PI_4).abs() < 1e-5);
    }

    #[test]
    fn cast_hit_fields() {
        let hit = CastHit::new(5.0, Vec3::Y, Vec3::new(10.0, 0.0, 0.0), None);

        assert_eq!(hit.distance, 5.0);
        assert_eq!(hit.normal, Vec3::Y);
        assert_eq!(hit.point, Vec3::new(10.0, 0.0, 0.0));
    }

    #[test]
    fn cast_hit_with_entity() {
        let mut world = World::new();
        let entity = world.spawn_empty().id();
        let hit = CastHit::new(3.0, Vec3::X, Vec3::ZERO, Some(entity));

        assert_eq!(hit.entity, Some(entity));
    }
}
