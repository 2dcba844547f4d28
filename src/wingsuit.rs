//! Wingsuit controller.
//!
//! A thin layer over the [`Skydiver`]: deploying adds lift on top of the
//! skydiver's base coefficient and forwards tilt input; retracting removes
//! both. Deployment requires the body to already be in the prone pose, and
//! the suit folds on its own when the ground comes close or the skydiver
//! leaves the prone pose.

use bevy::log::warn;
use bevy::prelude::*;

use crate::events::{WingsuitEvent, WingsuitEventKind};
use crate::skydive::Skydiver;

#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct WingsuitController {
    /// Lift coefficient added to the skydiver's base while deployed.
    pub added_lift: f32,
    /// Ground distance below which the suit refuses to deploy and
    /// auto-retracts, in m.
    pub min_deploy_ground_distance: f32,

    enabled: bool,
    deployed: bool,
    deploy_requested: bool,
    retract_requested: bool,
    tilt_input: Vec2,
}

impl Default for WingsuitController {
    fn default() -> Self {
        Self {
            added_lift: 6.0,
            min_deploy_ground_distance: 10.0,
            enabled: true,
            deployed: false,
            deploy_requested: false,
            retract_requested: false,
            tilt_input: Vec2::ZERO,
        }
    }
}

impl WingsuitController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lift added while deployed.
    pub fn with_added_lift(mut self, lift: f32) -> Self {
        self.added_lift = lift;
        self
    }

    /// Request deployment. Resolved on the next fixed tick.
    pub fn deploy(&mut self) {
        if !self.enabled {
            warn!("wingsuit deploy requested while disabled");
            return;
        }
        self.deploy_requested = true;
    }

    /// Request retraction.
    pub fn retract(&mut self) {
        self.retract_requested = true;
    }

    /// Tilt input forwarded to the skydiver while deployed.
    pub fn set_tilt(&mut self, tilt: Vec2) {
        self.tilt_input = tilt;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_deployed(&self) -> bool {
        self.deployed
    }
}

/// Resolve wingsuit requests against the skydiver state.
pub fn drive_wingsuit(
    mut suits: Query<(Entity, &mut WingsuitController, &mut Skydiver)>,
    mut events: MessageWriter<WingsuitEvent>,
) {
    for (entity, mut suit, mut skydiver) in &mut suits {
        let too_low = skydiver
            .ground_distance()
            .is_some_and(|distance| distance <= suit.min_deploy_ground_distance);

        if suit.deployed {
            let forced = !suit.enabled || !skydiver.is_horizontal() || too_low;
            if suit.retract_requested || forced {
                suit.deployed = false;
                skydiver.set_added_lift(0.0);
                skydiver.set_tilt(Vec2::ZERO);
                events.write(WingsuitEvent {
                    entity,
                    kind: WingsuitEventKind::Retracted,
                });
            }
        } else if suit.deploy_requested && suit.enabled {
            let prone = skydiver.is_horizontal() && !skydiver.is_rotating();
            if prone && !too_low {
                suit.deployed = true;
                events.write(WingsuitEvent {
                    entity,
                    kind: WingsuitEventKind::Deployed,
                });
            } else {
                warn!("wingsuit deploy refused: not in stable prone flight");
            }
        }

        if suit.deployed {
            let added = suit.added_lift;
            let tilt = suit.tilt_input;
            skydiver.set_added_lift(added);
            skydiver.set_tilt(tilt);
        }

        suit.deploy_requested = false;
        suit.retract_requested = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deploy_while_disabled_is_refused() {
        let mut suit = WingsuitController::new();
        suit.set_enabled(false);
        suit.deploy();
        assert!(!suit.deploy_requested);
    }

    #[test]
    fn deploy_records_a_request() {
        let mut suit = WingsuitController::new();
        suit.deploy();
        assert!(suit.deploy_requested);
        assert!(!suit.is_deployed());
    }
}
