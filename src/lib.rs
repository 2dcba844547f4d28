//! # `aerial_ability_controller`
//!
//! Rigidbody traversal abilities for 3D action games, with physics backend
//! abstraction.
//!
//! This crate provides a set of per-entity ability controllers:
//! - A grapple hook with a swept-tip launch, spring reel physics and
//!   rotation correction
//! - A skydiver that swaps between upright and prone flight poses based on
//!   ground proximity, with multi-point lift and tilt steering
//! - A wingsuit layering extra lift onto the skydiver
//! - Run, charged jump and look controllers for ground movement
//! - A rocket launcher with clip bookkeeping and area blasts
//! - Vehicle boarding with seat synchronisation
//!
//! ## Architecture
//!
//! All ability state lives in components and every state machine advances
//! once per `FixedUpdate` tick. Physics access goes through the
//! [`AbilityPhysicsBackend`](backend::AbilityPhysicsBackend) trait; the
//! backend plugin contributes the spatial-query sensor systems and flushes
//! accumulated forces. A Rapier3D backend ships behind the `rapier3d`
//! feature (on by default).
//!
//! Each tick runs four phases, see [`AbilitySet`]: force bookkeeping
//! preparation, backend sensors, the ability drive systems, and the final
//! force application.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bevy::prelude::*;
//! use aerial_ability_controller::prelude::*;
//!
//! # #[cfg(feature = "rapier3d")]
//! # fn build() {
//! use bevy_rapier3d::prelude::*;
//!
//! App::new()
//!     .add_plugins(MinimalPlugins)
//!     .add_plugins(TransformPlugin)
//!     .add_plugins(RapierPhysicsPlugin::<NoUserData>::default())
//!     .add_plugins(AbilityControllerPlugin::<Rapier3dBackend>::default())
//!     .run();
//! # }
//! ```

use bevy::prelude::*;

pub mod backend;
pub mod collision;
pub mod correction;
pub mod events;
pub mod gravity;
pub mod grapple;
pub mod movement;
pub mod rocket;
pub mod skydive;
pub mod vehicle;
pub mod wingsuit;

#[cfg(feature = "rapier3d")]
pub mod rapier;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::backend::{AbilityPhysicsBackend, ForceAccumulator, NoOpBackendPlugin};
    pub use crate::collision::{CastHit, GroundContact};
    pub use crate::correction::{RotationAuthority, RotationOwner};
    pub use crate::events::{
        GrappleEvent, GrappleEventKind, MovementEvent, MovementEventKind, RocketEvent,
        RocketEventKind, RocketJumpEvent, RocketJumpEventKind, SkydiveEvent, SkydiveEventKind,
        VehicleEvent, VehicleEventKind, WingsuitEvent, WingsuitEventKind,
    };
    pub use crate::gravity::GravityContext;
    pub use crate::grapple::{GrappleController, GrapplePhase, GrappleTarget};
    pub use crate::movement::{JumpController, LookController, RunController};
    pub use crate::rocket::{Rocket, RocketJumpController};
    pub use crate::skydive::{LiftPoint, SkydiveOrientation, Skydiver};
    pub use crate::vehicle::{PassengerController, Seat, Vehicle};
    pub use crate::wingsuit::WingsuitController;
    pub use crate::{AbilityControllerPlugin, AbilitySet};

    #[cfg(feature = "rapier3d")]
    pub use crate::rapier::{Rapier3dAbilityBundle, Rapier3dBackend};
}

/// Execution phases of one fixed tick, chained in this order.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbilitySet {
    /// Backend force bookkeeping before anything reads or writes forces.
    Preparation,
    /// Backend spatial queries writing results into the ability components.
    Sensors,
    /// The ability drive systems.
    Abilities,
    /// Accumulated forces handed to the physics engine.
    Sync,
}

/// Main plugin for the ability controllers.
///
/// Generic over a physics backend `B` providing the actual physics
/// operations (casts, force application, body toggles).
///
/// # Type Parameters
/// - `B`: The physics backend implementation (e.g. `Rapier3dBackend`)
pub struct AbilityControllerPlugin<B: backend::AbilityPhysicsBackend> {
    _marker: std::marker::PhantomData<B>,
}

impl<B: backend::AbilityPhysicsBackend> Default for AbilityControllerPlugin<B> {
    fn default() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<B: backend::AbilityPhysicsBackend> Plugin for AbilityControllerPlugin<B> {
    fn build(&self, app: &mut App) {
        // Register core types
        app.register_type::<backend::ForceAccumulator>();
        app.register_type::<collision::GroundContact>();
        app.register_type::<correction::RotationAuthority>();
        app.register_type::<gravity::GravityContext>();
        app.register_type::<grapple::GrappleController>();
        app.register_type::<skydive::Skydiver>();
        app.register_type::<wingsuit::WingsuitController>();
        app.register_type::<movement::RunController>();
        app.register_type::<movement::JumpController>();
        app.register_type::<movement::LookController>();
        app.register_type::<rocket::RocketJumpController>();
        app.register_type::<rocket::Rocket>();
        app.register_type::<vehicle::Vehicle>();
        app.register_type::<vehicle::PassengerController>();

        // Ability notifications
        app.add_message::<events::GrappleEvent>();
        app.add_message::<events::SkydiveEvent>();
        app.add_message::<events::WingsuitEvent>();
        app.add_message::<events::MovementEvent>();
        app.add_message::<events::RocketJumpEvent>();
        app.add_message::<events::RocketEvent>();
        app.add_message::<events::VehicleEvent>();

        app.configure_sets(
            FixedUpdate,
            (
                AbilitySet::Preparation,
                AbilitySet::Sensors,
                AbilitySet::Abilities,
                AbilitySet::Sync,
            )
                .chain(),
        );

        // Add the physics backend plugin
        app.add_plugins(B::plugin());

        // Drive systems in FixedUpdate for consistent physics behavior.
        // The look controller runs last so claimed rotation wins the tick.
        app.add_systems(
            FixedUpdate,
            (
                grapple::drive_grapple::<B>,
                skydive::drive_skydiver::<B>,
                wingsuit::drive_wingsuit,
                movement::drive_run::<B>,
                movement::drive_jump::<B>,
                rocket::drive_rocket_jump::<B>,
                rocket::drive_rockets::<B>,
                vehicle::drive_vehicles::<B>,
                vehicle::drive_passengers::<B>,
                movement::drive_look::<B>,
            )
                .chain()
                .in_set(AbilitySet::Abilities),
        );
    }
}
