//! Gravity context for abilities.
//!
//! Every ability that cares about "up" reads it from this component instead
//! of assuming world-Y. This enables skydiving around non-vertical gravity
//! (rotating stations, walls) without touching the ability code.

use bevy::prelude::*;

/// Defines the "up" direction for an actor.
///
/// Abilities on the same entity read this component to orient lift forces,
/// rotation correction targets and ground probes. Entities without one fall
/// back to world up (`Vec3::Y`).
#[derive(Component, Reflect, Debug, Clone, Copy)]
#[reflect(Component)]
pub struct GravityContext {
    up: Vec3,
}

impl Default for GravityContext {
    fn default() -> Self {
        Self { up: Vec3::Y }
    }
}

impl GravityContext {
    /// Create a new context with the given up direction.
    ///
    /// The vector will be normalized. If zero-length, defaults to `Vec3::Y`.
    pub fn new(up: Vec3) -> Self {
        Self {
            up: up.try_normalize().unwrap_or(Vec3::Y),
        }
    }

    /// Get the "up" direction.
    #[inline]
    pub fn up(&self) -> Vec3 {
        self.up
    }

    /// Get the "down" direction (opposite of up).
    #[inline]
    pub fn down(&self) -> Vec3 {
        -self.up
    }

    /// Set the "up" direction. Zero-length vectors are ignored.
    pub fn set_up(&mut self, up: Vec3) {
        if let Some(normalized) = up.try_normalize() {
            self.up = normalized;
        }
    }

    /// Project a vector onto the plane perpendicular to up.
    pub fn project_on_up_plane(&self, vector: Vec3) -> Vec3 {
        vector - self.up * vector.dot(self.up)
    }

    /// Component of a vector along the up axis (signed).
    pub fn vertical_component(&self, vector: Vec3) -> f32 {
        vector.dot(self.up)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_world_up() {
        let gravity = GravityContext::default();
        assert_eq!(gravity.up(), Vec3::Y);
        assert_eq!(gravity.down(), Vec3::NEG_Y);
    }

    #[test]
    fn new_normalizes_input() {
        let gravity = GravityContext::new(Vec3::new(0.0, 10.0, 0.0));
        assert!((gravity.up() - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn zero_up_falls_back_to_world_up() {
        let gravity = GravityContext::new(Vec3::ZERO);
        assert_eq!(gravity.up(), Vec3::Y);

        let mut gravity = GravityContext::new(Vec3::X);
        gravity.set_up(Vec3::ZERO);
        assert_eq!(gravity.up(), Vec3::X);
    }

    #[test]
    fn project_on_up_plane_removes_vertical() {
        let gravity = GravityContext::default();
        let projected = gravity.project_on_up_plane(Vec3::new(3.0, 7.0, -4.0));
        assert_eq!(projected, Vec3::new(3.0, 0.0, -4.0));
        assert_eq!(gravity.vertical_component(Vec3::new(3.0, 7.0, -4.0)), 7.0);
    }
}
