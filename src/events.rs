//! Ability notifications.
//!
//! Every observable transition in the ability state machines is mirrored as
//! a buffered message so game code (audio, VFX, HUD) can react without
//! polling component state. Messages are emitted by the drive systems, never
//! by the intent methods on the components themselves.

use bevy::prelude::*;

/// Grapple lifecycle notification.
#[derive(Message, Debug, Clone, Copy, PartialEq)]
pub struct GrappleEvent {
    /// The entity carrying the grapple.
    pub entity: Entity,
    pub kind: GrappleEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GrappleEventKind {
    /// The rope tip started flying.
    Launched,
    /// The rope tip attached to a surface. `target` is the hooked rigid
    /// body, `None` for plain world geometry.
    Hit {
        target: Option<Entity>,
        point: Vec3,
    },
    /// The hold input was released mid-cycle.
    Released,
    /// The rope tip returned to the anchor.
    ReelComplete,
}

/// Skydiver orientation notification.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkydiveEvent {
    pub entity: Entity,
    pub kind: SkydiveEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkydiveEventKind {
    /// The body finished converging onto the prone flight pose.
    RotatedHorizontal,
    /// The body finished converging onto the upright pose.
    RotatedVertical,
}

/// Wingsuit notification.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct WingsuitEvent {
    pub entity: Entity,
    pub kind: WingsuitEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WingsuitEventKind {
    Deployed,
    Retracted,
}

/// Ground movement notification.
#[derive(Message, Debug, Clone, Copy, PartialEq)]
pub struct MovementEvent {
    pub entity: Entity,
    pub kind: MovementEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MovementEventKind {
    StartedMoving,
    StoppedMoving,
    /// Jump charge fraction in `[0, 1]`, emitted while the jump input is held.
    ChargingJump(f32),
    Jumped,
    Landed,
}

/// Rocket launcher notification.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RocketJumpEvent {
    pub entity: Entity,
    pub kind: RocketJumpEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RocketJumpEventKind {
    /// A rocket left the launcher.
    Launched,
    /// Empty clip, fire interval, or the in-air requirement refused the shot.
    LaunchFailed,
    /// An obstacle sits inside the launch clearance volume.
    LaunchBlocked,
    /// The shot that just fired emptied the clip.
    LastRocket,
    /// The clip was refilled.
    Reloaded,
}

/// In-flight rocket notification.
#[derive(Message, Debug, Clone, Copy, PartialEq)]
pub struct RocketEvent {
    pub rocket: Entity,
    pub kind: RocketEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RocketEventKind {
    Exploded { position: Vec3 },
}

/// Vehicle seating notification.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct VehicleEvent {
    pub vehicle: Entity,
    pub passenger: Entity,
    pub kind: VehicleEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleEventKind {
    Boarded { seat: usize },
    Disembarked,
}
