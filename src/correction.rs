//! Shared rotation-correction math and rotation ownership arbitration.
//!
//! The grapple reel phases and the skydiver's orientation switching both
//! converge the body onto a target orientation with an angle-capped step
//! per fixed tick. The helpers here guarantee the step never overshoots:
//! once the per-tick budget covers the remaining misalignment, the result
//! is exactly the target.

use bevy::prelude::*;

/// Rotate `from` towards `to` by at most `max_angle` radians.
///
/// Returns `to` exactly when the remaining angle fits in the budget, so
/// convergence loops terminate without oscillating around the target.
pub fn rotate_towards(from: Quat, to: Quat, max_angle: f32) -> Quat {
    let angle = from.angle_between(to);
    if angle <= max_angle || angle <= 1e-6 {
        return to;
    }
    from.slerp(to, max_angle / angle)
}

/// Correction bias for a given misalignment angle (radians).
///
/// Scales linearly from `min_bias` at zero misalignment up to 1.0 at 180
/// degrees. Small errors get gentle correction (no jitter), large errors
/// get the full angular budget (no slow spiral recovery).
pub fn correction_bias(misalignment: f32, min_bias: f32) -> f32 {
    let t = (misalignment / std::f32::consts::PI).clamp(0.0, 1.0);
    min_bias + (1.0 - min_bias) * t
}

/// Build a rotation looking along `forward` with `up` as the approximate
/// up direction (bevy convention: forward is -Z, up is +Y).
///
/// Returns `None` when the basis is degenerate (zero or parallel inputs).
pub fn look_rotation(forward: Vec3, up: Vec3) -> Option<Quat> {
    let forward = forward.try_normalize()?;
    let right = forward.cross(up).try_normalize()?;
    let up = right.cross(forward);
    Some(Quat::from_mat3(&Mat3::from_cols(right, up, -forward)))
}

/// Target orientation that keeps the current heading but stands the body
/// upright against `up`.
///
/// The body's forward vector is projected onto the up-plane; when that
/// projection is degenerate (looking straight up or down) the heading is
/// recovered from the body's own up axis instead, which a prone body
/// carries along its travel direction.
pub fn upright_target(current: Quat, up: Vec3) -> Quat {
    let forward = current * Vec3::NEG_Z;
    let projected = forward - up * forward.dot(up);
    if let Some(target) = look_rotation(projected, up) {
        return target;
    }
    let body_up = current * Vec3::Y;
    let projected = body_up - up * body_up.dot(up);
    look_rotation(projected, up).unwrap_or(current)
}

/// Which ability currently owns the body's rotation.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationOwner {
    /// The grapple is correcting orientation during a reel phase.
    Grapple,
    /// The skydiver is converging onto a vertical/horizontal pose.
    Skydiver,
}

/// Arbitration record for body rotation writes.
///
/// At most one ability may rotate a body per tick. Abilities claim the
/// authority when they start a convergence task and release it when the
/// task completes; the look controller only rotates while the authority
/// is free.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct RotationAuthority {
    owner: Option<RotationOwner>,
}

impl RotationAuthority {
    /// Claim rotation ownership. Succeeds when free or already owned by
    /// the same ability.
    pub fn claim(&mut self, owner: RotationOwner) -> bool {
        match self.owner {
            None => {
                self.owner = Some(owner);
                true
            }
            Some(current) => current == owner,
        }
    }

    /// Release rotation ownership. Ignored unless `owner` holds it.
    pub fn release(&mut self, owner: RotationOwner) {
        if self.owner == Some(owner) {
            self.owner = None;
        }
    }

    /// Whether no ability owns rotation this tick.
    pub fn is_free(&self) -> bool {
        self.owner.is_none()
    }

    /// The current owner, if any.
    pub fn owner(&self) -> Option<RotationOwner> {
        self.owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    #[test]
    fn rotate_towards_caps_step() {
        let from = Quat::IDENTITY;
        let to = Quat::from_rotation_y(FRAC_PI_2);

        let stepped = rotate_towards(from, to, FRAC_PI_4);
        assert!((stepped.angle_between(from) - FRAC_PI_4).abs() < 1e-4);
        assert!((stepped.angle_between(to) - FRAC_PI_4).abs() < 1e-4);
    }

    #[test]
    fn rotate_towards_snaps_exactly_when_budget_covers_remainder() {
        let from = Quat::from_rotation_y(0.1);
        let to = Quat::from_rotation_y(0.3);

        let stepped = rotate_towards(from, to, 0.5);
        assert_eq!(stepped, to);
    }

    #[test]
    fn rotate_towards_is_identity_at_target() {
        let rotation = Quat::from_rotation_x(1.0);
        assert_eq!(rotate_towards(rotation, rotation, 0.01), rotation);
    }

    #[test]
    fn bias_grows_with_misalignment() {
        let min_bias = 0.2;
        assert!((correction_bias(0.0, min_bias) - min_bias).abs() < 1e-6);
        assert!((correction_bias(PI, min_bias) - 1.0).abs() < 1e-6);

        let mid = correction_bias(FRAC_PI_2, min_bias);
        assert!(mid > min_bias && mid < 1.0);
    }

    #[test]
    fn look_rotation_matches_bevy_convention() {
        let rotation = look_rotation(Vec3::NEG_Z, Vec3::Y).unwrap();
        assert!(rotation.angle_between(Quat::IDENTITY) < 1e-4);
    }

    #[test]
    fn look_rotation_rejects_degenerate_basis() {
        assert!(look_rotation(Vec3::ZERO, Vec3::Y).is_none());
        assert!(look_rotation(Vec3::Y, Vec3::Y).is_none());
    }

    #[test]
    fn upright_target_levels_a_tilted_body() {
        let tilted = Quat::from_rotation_x(0.4) * Quat::from_rotation_y(1.0);
        let target = upright_target(tilted, Vec3::Y);

        let up = target * Vec3::Y;
        assert!((up - Vec3::Y).length() < 1e-4);

        // Heading is preserved: projected forward stays put.
        let forward = (tilted * Vec3::NEG_Z).with_y(0.0).normalize();
        let corrected_forward = (target * Vec3::NEG_Z).normalize();
        assert!((forward - corrected_forward).length() < 1e-4);
    }

    #[test]
    fn upright_target_recovers_heading_when_looking_straight_down() {
        // Chest to the ground, head towards -Z: standing up should face -Z.
        let prone = look_rotation(Vec3::NEG_Y, Vec3::NEG_Z).unwrap();
        let target = upright_target(prone, Vec3::Y);

        assert!(((target * Vec3::Y) - Vec3::Y).length() < 1e-4);
        assert!(((target * Vec3::NEG_Z) - Vec3::NEG_Z).length() < 1e-4);
    }

    #[test]
    fn authority_claims_are_exclusive() {
        let mut authority = RotationAuthority::default();
        assert!(authority.is_free());

        assert!(authority.claim(RotationOwner::Grapple));
        assert!(authority.claim(RotationOwner::Grapple));
        assert!(!authority.claim(RotationOwner::Skydiver));

        authority.release(RotationOwner::Skydiver);
        assert_eq!(authority.owner(), Some(RotationOwner::Grapple));

        authority.release(RotationOwner::Grapple);
        assert!(authority.claim(RotationOwner::Skydiver));
    }
}
